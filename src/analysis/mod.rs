//! Local aggregation over fetched transcripts and stored evaluation rows.

pub mod aggregator;
pub mod insights;

pub use aggregator::*;
pub use insights::recommendations;
