// State Module - persistence, deduplication, and escalation tracking
// Everything here fails open: a broken store degrades to noisy, not silent

pub mod dedup;
pub mod escalation;
pub mod store;

pub use dedup::{AcceptDecision, DedupKey, DedupRecord, DedupStore, DedupStoreStats};
pub use escalation::{
    EscalationCoordinator, EscalationOutcome, EscalationState, EscalationStats,
};
pub use store::{JsonFileStore, MemoryStore, SharedStore, StateStore};
