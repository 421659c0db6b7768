//! The write-completion pipeline (§4.5): ordered sync-cursor commit
//! across out-of-order device completions, and bad-block write-failure
//! recovery.

mod admission;
mod pipeline;

pub use admission::InflightGate;
pub use pipeline::{CommittedSector, CompletionPipeline, RecoveryReissue, SectorOutcome};
