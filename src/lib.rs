//! kb-distill — turns a bilateral support mailbox archive into a
//! deduplicated, topic-organized knowledge text.

pub mod config;
pub mod error;
pub mod export;
pub mod mailbox;
pub mod pipeline;
pub mod report;
pub mod text;
