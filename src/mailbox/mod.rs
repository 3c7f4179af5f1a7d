//! Mailbox loading: raw `.eml` directories into normalized message records.

pub mod html;
pub mod loader;
pub mod message;

pub use loader::{load_mailbox, parse_message};
pub use message::{LoadStats, Mailbox, Message, normalize_message_id, parse_message_ids};
