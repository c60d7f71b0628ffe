//! Resilient workflow execution engine.
//!
//! The orchestrator owns the outer attempt loop (fresh browser per attempt,
//! teardown on every exit path), the step sequencer runs the long ordered
//! interaction script, and the classifier decides which failures earn
//! another attempt. Browser access goes exclusively through the
//! `surface-adapter` seam, so the whole engine runs against scripted
//! surfaces in tests.

mod classify;
mod errors;
mod orchestrator;
mod report;
mod sequencer;
mod steps;

pub use classify::is_retryable;
pub use errors::WorkflowError;
pub use orchestrator::{EngineSettings, WorkflowEngine};
pub use report::{ArtifactError, ArtifactStore, FailingArtifactStore, MemoryArtifactStore};
pub use sequencer::{SequenceOutcome, SequencerConfig, StepSequencer};
pub use steps::{PauseKind, StepAction, StepRunner, Target};
