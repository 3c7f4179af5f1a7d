//! Distillation pipeline.
//!
//! Stages run strictly in sequence over the whole corpus:
//! 1. `matcher` — pair inbound inquiries with outbound replies
//! 2. `cleaner` — strip quotes and signatures from replies
//! 3. `classifier` — assign topics by keyword
//! 4. `extractor` — split replies into policy-like sentences
//! 5. `dedup` — group sentences corpus-wide and rank them per topic
//! 6. `assembler` — filter, generalize and lay out the document
//!
//! `processor` drives the stages and writes the outputs; `rules` holds
//! every table the stages match against.

pub mod assembler;
pub mod classifier;
pub mod cleaner;
pub mod dedup;
pub mod extractor;
pub mod matcher;
pub mod processor;
pub mod rules;
pub mod types;
