//! Pipeline runner
//!
//! Drives the stages in order, writes each artifact, and stops at the approval
//! gate of `human_input` stages. A failed, rejected or cancelled run never
//! leaves artifacts for stages it did not finish.

use crate::config::PipelineSection;
use crate::criteria::SearchCriteria;
use crate::pipeline::approval::{
    self, ApprovalDecision, ApprovalError, ApprovalGate, ApprovalRequest, ApprovalWait,
};
use crate::pipeline::artifact::{parse_agent_json, ArtifactError, ArtifactStore};
use crate::pipeline::enforce::{
    enforce_records, reconcile_extraction, record_entries, ValidationReport,
};
use crate::pipeline::executor::{StageError, StageExecutor, StageRequest};
use crate::pipeline::record::{DiscoveryArtifact, ExtractedRecord};
use crate::pipeline::stage::{standard_stages, PipelineStage, StageKind};
use crate::pipeline::state::{RunState, RunStateMachine, TransitionError};
use crate::pipeline::CancelSignal;
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

/// Tunables for a run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineOptions {
    pub max_revisions: usize,
    pub approval_timeout: Option<Duration>,
    /// Run the validation agent before schema enforcement
    pub llm_validation: bool,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self::from_config(&PipelineSection::default())
    }
}

impl PipelineOptions {
    pub fn from_config(section: &PipelineSection) -> Self {
        Self {
            max_revisions: section.max_revisions,
            approval_timeout: section.approval_timeout(),
            llm_validation: section.llm_validation,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelReason {
    Interrupted,
    ApprovalTimeout(Duration),
}

impl fmt::Display for CancelReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interrupted => write!(f, "interrupted"),
            Self::ApprovalTimeout(limit) => {
                write!(f, "no approval decision within {}s", limit.as_secs())
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Stage '{stage}' failed: {source}")]
    Stage { stage: StageKind, source: StageError },
    #[error("Stage '{stage}' output rejected: {reason}")]
    Rejected { stage: StageKind, reason: String },
    #[error("Run cancelled during stage '{stage}': {reason}")]
    Cancelled { stage: StageKind, reason: CancelReason },
    #[error("Stage '{stage}' exceeded the revision limit ({max})")]
    RevisionLimit { stage: StageKind, max: usize },
    #[error("Approval of stage '{stage}' failed: {source}")]
    Approval {
        stage: StageKind,
        source: ApprovalError,
    },
    #[error(transparent)]
    State(#[from] TransitionError),
    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

impl PipelineError {
    pub fn stage(&self) -> Option<StageKind> {
        match self {
            Self::Stage { stage, .. }
            | Self::Rejected { stage, .. }
            | Self::Cancelled { stage, .. }
            | Self::RevisionLimit { stage, .. }
            | Self::Approval { stage, .. } => Some(*stage),
            Self::State(_) | Self::Artifact(_) => None,
        }
    }
}

/// Result of a completed run
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub run_id: Uuid,
    pub state: RunState,
    pub artifacts: Vec<PathBuf>,
    pub records: Vec<ExtractedRecord>,
    pub report: ValidationReport,
}

/// A stage's normalized output
struct StageOutput {
    value: Value,
    enforced: Option<(Vec<ExtractedRecord>, ValidationReport)>,
}

pub struct Pipeline {
    stages: Vec<PipelineStage>,
    executor: Arc<dyn StageExecutor>,
    gate: Arc<dyn ApprovalGate>,
    store: ArtifactStore,
    options: PipelineOptions,
    cancel: CancelSignal,
}

impl Pipeline {
    pub fn new(
        executor: Arc<dyn StageExecutor>,
        gate: Arc<dyn ApprovalGate>,
        store: ArtifactStore,
    ) -> Self {
        Self {
            stages: standard_stages(),
            executor,
            gate,
            store,
            options: PipelineOptions::default(),
            cancel: CancelSignal::new(),
        }
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_cancel_signal(mut self, cancel: CancelSignal) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn cancel_signal(&self) -> &CancelSignal {
        &self.cancel
    }

    pub async fn run(&self, criteria: &SearchCriteria) -> Result<PipelineOutcome, PipelineError> {
        let run_id = Uuid::new_v4();
        let span = tracing::info_span!("pipeline_run", run_id = %run_id);
        self.run_inner(run_id, criteria).instrument(span).await
    }

    async fn run_inner(
        &self,
        run_id: Uuid,
        criteria: &SearchCriteria,
    ) -> Result<PipelineOutcome, PipelineError> {
        info!(
            location = criteria.location(),
            num_leads = criteria.num_leads(),
            output_dir = %self.store.dir().display(),
            "Starting pipeline run"
        );

        let mut machine = RunStateMachine::new();
        self.store.clear(&self.stages)?;

        let mut artifacts = Vec::new();
        let mut records = Vec::new();
        let mut report = ValidationReport::default();

        for stage in &self.stages {
            let mut feedback: Vec<String> = Vec::new();

            loop {
                machine.transition(RunState::Running(stage.kind))?;

                let span = crate::stage_span!(stage = %stage.kind, attempt = feedback.len() + 1);
                let produced = tokio::select! {
                    result = self.produce(run_id, stage, criteria, &feedback).instrument(span) => result,
                    _ = self.cancel.cancelled() => {
                        self.discard_from(stage.kind);
                        return Err(self.cancel_run(&mut machine, stage.kind, CancelReason::Interrupted)?);
                    }
                };

                let output = match produced {
                    Ok(output) => output,
                    Err(source) => return Err(self.fail(&mut machine, stage.kind, source)?),
                };

                let path = match self.store.write_json(stage, &output.value) {
                    Ok(path) => path,
                    Err(e) => return Err(self.fail(&mut machine, stage.kind, e.into())?),
                };

                if let Some((stage_records, stage_report)) = output.enforced {
                    records = stage_records;
                    report = stage_report;
                }

                if !stage.human_input {
                    artifacts.push(path);
                    break;
                }

                machine.transition(RunState::AwaitingApproval(stage.kind))?;
                let request = ApprovalRequest {
                    stage,
                    artifact_path: &path,
                    artifact: &output.value,
                    revision: feedback.len(),
                };
                let wait = approval::wait_for_decision(
                    self.gate.as_ref(),
                    &request,
                    self.options.approval_timeout,
                    &self.cancel,
                )
                .await;

                match wait {
                    Ok(ApprovalWait::Decided(ApprovalDecision::Approve)) => {
                        if let Err(source) = self.check_approved(stage) {
                            return Err(self.fail(&mut machine, stage.kind, source)?);
                        }
                        info!(stage = %stage.kind, "Artifact approved");
                        artifacts.push(path);
                        break;
                    }
                    Ok(ApprovalWait::Decided(ApprovalDecision::Revise { feedback: note })) => {
                        if feedback.len() >= self.options.max_revisions {
                            machine.transition(RunState::Failed)?;
                            return Err(PipelineError::RevisionLimit {
                                stage: stage.kind,
                                max: self.options.max_revisions,
                            });
                        }
                        info!(stage = %stage.kind, feedback = %note, "Revision requested");
                        feedback.push(note);
                    }
                    Ok(ApprovalWait::Decided(ApprovalDecision::Reject { reason })) => {
                        warn!(stage = %stage.kind, reason = %reason, "Artifact rejected");
                        machine.transition(RunState::Rejected)?;
                        return Err(PipelineError::Rejected {
                            stage: stage.kind,
                            reason,
                        });
                    }
                    Ok(ApprovalWait::TimedOut) => {
                        let limit = self.options.approval_timeout.unwrap_or_default();
                        return Err(self.cancel_run(
                            &mut machine,
                            stage.kind,
                            CancelReason::ApprovalTimeout(limit),
                        )?);
                    }
                    Ok(ApprovalWait::Cancelled) => {
                        return Err(self.cancel_run(
                            &mut machine,
                            stage.kind,
                            CancelReason::Interrupted,
                        )?);
                    }
                    Err(source) => {
                        error!(stage = %stage.kind, error = %source, "Approval failed");
                        machine.transition(RunState::Failed)?;
                        return Err(PipelineError::Approval {
                            stage: stage.kind,
                            source,
                        });
                    }
                }
            }
        }

        machine.transition(RunState::Completed)?;
        report.log_summary();
        info!(records = records.len(), "Pipeline run completed");

        Ok(PipelineOutcome {
            run_id,
            state: machine.state(),
            artifacts,
            records,
            report,
        })
    }

    /// Run the stage and shape its reply into the stage's artifact
    async fn produce(
        &self,
        run_id: Uuid,
        stage: &PipelineStage,
        criteria: &SearchCriteria,
        feedback: &[String],
    ) -> Result<StageOutput, StageError> {
        let upstream = self.read_upstream(stage)?;

        let reply = if stage.kind == StageKind::Validation && !self.options.llm_validation {
            info!("Validation agent disabled, enforcing schema on extraction output");
            upstream_value(&upstream, StageKind::Extraction)?.clone()
        } else {
            let raw = self
                .executor
                .execute(StageRequest {
                    run_id,
                    stage,
                    criteria,
                    upstream: &upstream,
                    feedback,
                })
                .await?;
            parse_agent_json(&raw).map_err(|e| StageError::MalformedOutput {
                error: e.to_string(),
                raw,
            })?
        };

        match stage.kind {
            StageKind::Discovery => {
                let discovery = DiscoveryArtifact::from_value(reply)
                    .map_err(|e| StageError::Contract(e.to_string()))?;
                let found = discovery.candidates.len();
                if found != criteria.num_leads() as usize {
                    warn!(found, requested = criteria.num_leads(), "Candidate count differs from requested leads");
                }
                let value = serde_json::to_value(&discovery)
                    .map_err(|e| StageError::Contract(e.to_string()))?;
                Ok(StageOutput {
                    value,
                    enforced: None,
                })
            }
            StageKind::Extraction => {
                let entries =
                    record_entries(reply).map_err(|e| StageError::Contract(e.to_string()))?;
                let discovery =
                    DiscoveryArtifact::from_value(upstream_value(&upstream, StageKind::Discovery)?.clone())
                        .map_err(|e| StageError::Contract(format!("approved candidates: {e}")))?;
                let (entries, _) = reconcile_extraction(entries, &discovery.candidates);
                Ok(StageOutput {
                    value: Value::Array(entries),
                    enforced: None,
                })
            }
            StageKind::Validation => {
                let (records, report) =
                    enforce_records(reply).map_err(|e| StageError::Contract(e.to_string()))?;
                let value = serde_json::to_value(&records)
                    .map_err(|e| StageError::Contract(e.to_string()))?;
                Ok(StageOutput {
                    value,
                    enforced: Some((records, report)),
                })
            }
        }
    }

    fn read_upstream(&self, stage: &PipelineStage) -> Result<Vec<(StageKind, Value)>, StageError> {
        stage
            .upstream
            .iter()
            .map(|kind| {
                let source = self
                    .stages
                    .iter()
                    .find(|s| s.kind == *kind)
                    .ok_or_else(|| StageError::Contract(format!("unknown upstream stage '{kind}'")))?;
                Ok((*kind, self.store.read_json(source)?))
            })
            .collect()
    }

    /// The operator may have edited the file; it must still be a valid artifact
    fn check_approved(&self, stage: &PipelineStage) -> Result<(), StageError> {
        let value = self.store.read_json(stage)?;
        if stage.kind == StageKind::Discovery {
            let discovery = DiscoveryArtifact::from_value(value)
                .map_err(|e| StageError::Contract(format!("approved file: {e}")))?;
            info!(candidates = discovery.candidates.len(), "Approved candidates");
        }
        Ok(())
    }

    fn fail(
        &self,
        machine: &mut RunStateMachine,
        stage: StageKind,
        source: StageError,
    ) -> Result<PipelineError, PipelineError> {
        error!(stage = %stage, error = %source, "Stage failed");
        self.discard_from(stage);
        machine.transition(RunState::Failed)?;
        Ok(PipelineError::Stage { stage, source })
    }

    fn cancel_run(
        &self,
        machine: &mut RunStateMachine,
        stage: StageKind,
        reason: CancelReason,
    ) -> Result<PipelineError, PipelineError> {
        warn!(stage = %stage, reason = %reason, "Run cancelled");
        machine.transition(RunState::Cancelled)?;
        Ok(PipelineError::Cancelled { stage, reason })
    }

    /// Remove artifacts of this stage and every later one
    fn discard_from(&self, kind: StageKind) {
        let unfinished: Vec<PipelineStage> = self
            .stages
            .iter()
            .filter(|s| s.kind >= kind)
            .cloned()
            .collect();
        if let Err(e) = self.store.clear(&unfinished) {
            warn!(error = %e, "Failed to remove unfinished artifacts");
        }
    }
}

fn upstream_value(upstream: &[(StageKind, Value)], kind: StageKind) -> Result<&Value, StageError> {
    upstream
        .iter()
        .find(|(k, _)| *k == kind)
        .map(|(_, v)| v)
        .ok_or_else(|| StageError::Contract(format!("missing upstream artifact '{kind}'")))
}
