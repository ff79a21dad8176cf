//! Work item orchestration.
//!
//! Submits a fan-in graph (N part work items feeding one combinator) in a
//! single request, tracks every handle concurrently, and assembles reports
//! and signed result links once all of them are terminal.

mod assembler;
mod poller;
mod progress;
mod runner;
mod submitter;
mod types;

pub use assembler::ResultAssembler;
pub use poller::{PollError, StatusPoller, TrackedGraph, TrackedWorkItem};
pub use progress::{ProgressCallback, ProgressEvent, ProgressNotifier, WorkItemRole};
pub use runner::WorkItemOrchestrator;
pub use submitter::WorkItemSubmitter;
pub use types::*;
