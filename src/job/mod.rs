//! Job lifecycle: admission, staged execution with retries, cancellation and
//! the persisted job ledger.

pub mod error;
pub mod orchestrator;
pub mod retry;
pub mod store;
pub mod types;

pub use orchestrator::{Collaborators, Orchestrator, OrchestratorSettings};
pub use store::{JobStore, read_ledger};
pub use types::{JobRecord, JobState};
