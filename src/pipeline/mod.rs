//! Three-stage lead pipeline
//!
//! Discovery, extraction and validation run strictly in order. Each stage
//! reads only its declared upstream artifacts back from disk and writes its
//! own artifact before the next one starts. Discovery is gated on operator
//! approval.

pub mod approval;
pub mod artifact;
pub mod enforce;
pub mod executor;
pub mod record;
pub mod runner;
pub mod stage;
pub mod state;

pub use approval::{
    ApprovalDecision, ApprovalError, ApprovalGate, ApprovalPolicy, ApprovalRequest, ApprovalWait,
    PolicyApproval, TerminalApproval,
};
pub use artifact::{parse_agent_json, ArtifactError, ArtifactStore};
pub use enforce::{enforce_records, reconcile_extraction, ValidationReport};
pub use executor::{StageError, StageExecutor, StageRequest};
pub use record::{Candidate, DiscoveryArtifact, ExtractedRecord, RECORD_KEYS};
pub use runner::{Pipeline, PipelineError, PipelineOptions, PipelineOutcome};
pub use stage::{standard_stages, AgentRole, PipelineStage, StageKind};
pub use state::{RunState, RunStateMachine, TransitionError};

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// Cancellation shared between the run and whoever may stop it (Ctrl-C)
///
/// ```rust
/// use jobscout::pipeline::CancelSignal;
///
/// # tokio_test::block_on(async {
/// let signal = CancelSignal::new();
/// let handle = signal.clone();
/// handle.cancel();
/// signal.cancelled().await;
/// assert!(signal.is_cancelled());
/// # });
/// ```
#[derive(Debug, Clone, Default)]
pub struct CancelSignal {
    inner: Arc<CancelInner>,
}

#[derive(Debug, Default)]
struct CancelInner {
    cancelled: AtomicBool,
    notify: Notify,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::SeqCst);
        self.inner.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`cancel`](Self::cancel) has been called
    pub async fn cancelled(&self) {
        loop {
            let notified = self.inner.notify.notified();
            if self.is_cancelled() {
                return;
            }
            notified.await;
        }
    }

    /// Cancel when the process receives Ctrl-C
    pub fn cancel_on_ctrl_c(&self) {
        let signal = self.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                signal.cancel();
            }
        });
    }
}
