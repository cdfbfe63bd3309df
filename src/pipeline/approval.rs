//! Human approval gate
//!
//! Stages marked `human_input` stop after their artifact is written and wait
//! for an [`ApprovalDecision`]. The wait itself is bounded by an optional
//! timeout and by the run's [`CancelSignal`].

use crate::pipeline::record::DiscoveryArtifact;
use crate::pipeline::stage::{PipelineStage, StageKind};
use crate::pipeline::CancelSignal;
use async_trait::async_trait;
use serde_json::Value;
use std::io::{BufRead, Write};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Operator verdict on a stage artifact
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalDecision {
    /// Continue with the artifact as it is on disk now
    Approve,
    /// Re-run the stage with this feedback
    Revise { feedback: String },
    /// Stop the run
    Reject { reason: String },
}

/// What the gate is asked to review
#[derive(Debug)]
pub struct ApprovalRequest<'a> {
    pub stage: &'a PipelineStage,
    pub artifact_path: &'a Path,
    pub artifact: &'a Value,
    /// Revisions already made to this stage
    pub revision: usize,
}

#[derive(Debug, Error)]
pub enum ApprovalError {
    #[error("Approval prompt failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("Input closed while waiting for approval")]
    InputClosed,
    #[error("Stage '{0}' needs approval but no operator is available (use --auto-approve)")]
    OperatorRequired(StageKind),
}

#[async_trait]
pub trait ApprovalGate: Send + Sync {
    async fn review(&self, request: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError>;
}

/// How a wait for approval ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApprovalWait {
    Decided(ApprovalDecision),
    TimedOut,
    Cancelled,
}

/// Ask the gate, giving up on timeout or cancellation
pub async fn wait_for_decision(
    gate: &dyn ApprovalGate,
    request: &ApprovalRequest<'_>,
    timeout: Option<Duration>,
    cancel: &CancelSignal,
) -> Result<ApprovalWait, ApprovalError> {
    let deadline = async {
        match timeout {
            Some(limit) => tokio::time::sleep(limit).await,
            None => std::future::pending::<()>().await,
        }
    };

    tokio::select! {
        decision = gate.review(request) => decision.map(ApprovalWait::Decided),
        _ = deadline => Ok(ApprovalWait::TimedOut),
        _ = cancel.cancelled() => Ok(ApprovalWait::Cancelled),
    }
}

/// Parse one answer line. `None` means the line was not understood.
pub fn parse_decision(line: &str) -> Option<ApprovalDecision> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    match word.to_lowercase().as_str() {
        "" | "a" | "y" | "yes" | "approve" => Some(ApprovalDecision::Approve),
        "r" | "revise" if !rest.is_empty() => Some(ApprovalDecision::Revise {
            feedback: rest.to_string(),
        }),
        "x" | "n" | "no" | "reject" => Some(ApprovalDecision::Reject {
            reason: if rest.is_empty() {
                "rejected by operator".to_string()
            } else {
                rest.to_string()
            },
        }),
        _ => None,
    }
}

/// Short human-readable listing of an artifact
pub fn summarize_artifact(stage: StageKind, artifact: &Value, max_items: usize) -> Vec<String> {
    if stage == StageKind::Discovery {
        if let Ok(discovery) = DiscoveryArtifact::from_value(artifact.clone()) {
            let total = discovery.candidates.len();
            let mut lines = vec![format!("{total} candidate(s) found:")];
            for (i, candidate) in discovery.candidates.iter().take(max_items).enumerate() {
                let company = candidate
                    .company
                    .as_deref()
                    .map(|c| format!(" ({c})"))
                    .unwrap_or_default();
                lines.push(format!(
                    "  {}. {}{} {}",
                    i + 1,
                    candidate.title,
                    company,
                    candidate.url
                ));
            }
            if total > max_items {
                lines.push(format!("  ... and {} more", total - max_items));
            }
            return lines;
        }
    }

    match artifact {
        Value::Array(items) => vec![format!("{} entries", items.len())],
        other => vec![other.to_string()],
    }
}

const PROMPT: &str =
    "Approve [Enter/a], revise [r <feedback>] or reject [x <reason>]? ";

/// Read answers until one parses
pub fn prompt_decision<R: BufRead, W: Write>(
    reader: &mut R,
    writer: &mut W,
) -> Result<ApprovalDecision, ApprovalError> {
    loop {
        write!(writer, "{PROMPT}")?;
        writer.flush()?;

        let mut line = String::new();
        if reader.read_line(&mut line)? == 0 {
            return Err(ApprovalError::InputClosed);
        }
        match parse_decision(&line) {
            Some(decision) => return Ok(decision),
            None => writeln!(
                writer,
                "Not understood. Revising needs feedback text, e.g. 'r only keep NYC roles'."
            )?,
        }
    }
}

/// Gate that asks the operator on the terminal
pub struct TerminalApproval {
    max_display: usize,
}

impl TerminalApproval {
    const DEFAULT_MAX_DISPLAY: usize = 20;

    pub fn new() -> Self {
        Self {
            max_display: Self::DEFAULT_MAX_DISPLAY,
        }
    }

    pub fn with_max_display(mut self, max: usize) -> Self {
        self.max_display = max;
        self
    }
}

impl Default for TerminalApproval {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ApprovalGate for TerminalApproval {
    async fn review(&self, request: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError> {
        let mut text = vec![
            String::new(),
            format!(
                "== Review '{}' output ({}) ==",
                request.stage.agent.role,
                request.artifact_path.display()
            ),
        ];
        text.extend(summarize_artifact(
            request.stage.kind,
            request.artifact,
            self.max_display,
        ));
        text.push("You may edit the file before approving; the edited file is used.".to_string());

        // Stdin reads block, so the prompt runs off the async workers
        tokio::task::spawn_blocking(move || -> Result<ApprovalDecision, ApprovalError> {
            let mut stdout = std::io::stdout();
            for line in text {
                writeln!(stdout, "{line}")?;
            }
            prompt_decision(&mut std::io::stdin().lock(), &mut stdout)
        })
        .await
        .map_err(|e| ApprovalError::Io(std::io::Error::other(e)))?
    }
}

/// Fixed answer for unattended runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ApprovalPolicy {
    /// Approve every artifact as-is
    Approve,
    /// Reject at the first gate
    Reject,
    /// Fail the run at the first gate
    #[default]
    Fail,
}

pub struct PolicyApproval {
    policy: ApprovalPolicy,
}

impl PolicyApproval {
    pub fn new(policy: ApprovalPolicy) -> Self {
        Self { policy }
    }

    pub fn auto_approve() -> Self {
        Self::new(ApprovalPolicy::Approve)
    }
}

#[async_trait]
impl ApprovalGate for PolicyApproval {
    async fn review(&self, request: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError> {
        match self.policy {
            ApprovalPolicy::Approve => {
                tracing::info!(stage = %request.stage.kind, "Artifact approved by policy");
                Ok(ApprovalDecision::Approve)
            }
            ApprovalPolicy::Reject => Ok(ApprovalDecision::Reject {
                reason: "rejected by non-interactive policy".to_string(),
            }),
            ApprovalPolicy::Fail => Err(ApprovalError::OperatorRequired(request.stage.kind)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::stage::standard_stages;
    use serde_json::json;
    use std::io::Cursor;

    #[test]
    fn test_parse_decision() {
        assert_eq!(parse_decision(""), Some(ApprovalDecision::Approve));
        assert_eq!(parse_decision(" Yes \n"), Some(ApprovalDecision::Approve));
        assert_eq!(
            parse_decision("r only keep NYC roles"),
            Some(ApprovalDecision::Revise {
                feedback: "only keep NYC roles".to_string()
            })
        );
        assert_eq!(parse_decision("revise"), None);
        assert_eq!(
            parse_decision("x"),
            Some(ApprovalDecision::Reject {
                reason: "rejected by operator".to_string()
            })
        );
        assert_eq!(
            parse_decision("reject wrong city"),
            Some(ApprovalDecision::Reject {
                reason: "wrong city".to_string()
            })
        );
        assert_eq!(parse_decision("maybe"), None);
    }

    #[test]
    fn test_prompt_reprompts_until_understood() {
        let mut reader = Cursor::new(&b"maybe\nr\nr more banks\n"[..]);
        let mut output = Vec::new();

        let decision = prompt_decision(&mut reader, &mut output).unwrap();

        assert_eq!(
            decision,
            ApprovalDecision::Revise {
                feedback: "more banks".to_string()
            }
        );
        let output = String::from_utf8(output).unwrap();
        assert_eq!(output.matches("Not understood").count(), 2);
    }

    #[test]
    fn test_prompt_closed_input() {
        let mut reader = Cursor::new(&b""[..]);
        let result = prompt_decision(&mut reader, &mut Vec::new());
        assert!(matches!(result, Err(ApprovalError::InputClosed)));
    }

    #[test]
    fn test_summarize_discovery_artifact() {
        let artifact = json!({"candidates": [
            {"title": "Quant Intern", "company": "Acme", "url": "https://acme.com/jobs/1"},
            {"title": "Data Analyst", "url": "https://b.com"},
            {"title": "Consultant", "url": "https://c.com"}
        ]});

        let lines = summarize_artifact(StageKind::Discovery, &artifact, 2);

        assert_eq!(lines[0], "3 candidate(s) found:");
        assert_eq!(lines[1], "  1. Quant Intern (Acme) https://acme.com/jobs/1");
        assert_eq!(lines[2], "  2. Data Analyst https://b.com");
        assert_eq!(lines[3], "  ... and 1 more");
    }

    #[test]
    fn test_summarize_other_artifacts() {
        assert_eq!(
            summarize_artifact(StageKind::Extraction, &json!([1, 2]), 5),
            ["2 entries"]
        );
    }

    #[tokio::test]
    async fn test_policy_gates() {
        let stages = standard_stages();
        let artifact = json!({"candidates": []});
        let request = ApprovalRequest {
            stage: &stages[0],
            artifact_path: Path::new("opportunities.json"),
            artifact: &artifact,
            revision: 0,
        };

        assert_eq!(
            PolicyApproval::auto_approve().review(&request).await.unwrap(),
            ApprovalDecision::Approve
        );
        assert!(matches!(
            PolicyApproval::new(ApprovalPolicy::Reject).review(&request).await,
            Ok(ApprovalDecision::Reject { .. })
        ));
        assert!(matches!(
            PolicyApproval::new(ApprovalPolicy::Fail).review(&request).await,
            Err(ApprovalError::OperatorRequired(StageKind::Discovery))
        ));
    }

    struct NeverAnswers;

    #[async_trait]
    impl ApprovalGate for NeverAnswers {
        async fn review(&self, _: &ApprovalRequest<'_>) -> Result<ApprovalDecision, ApprovalError> {
            std::future::pending().await
        }
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let stages = standard_stages();
        let artifact = json!({});
        let request = ApprovalRequest {
            stage: &stages[0],
            artifact_path: Path::new("opportunities.json"),
            artifact: &artifact,
            revision: 0,
        };

        let outcome = wait_for_decision(
            &NeverAnswers,
            &request,
            Some(Duration::from_millis(20)),
            &CancelSignal::new(),
        )
        .await
        .unwrap();
        assert_eq!(outcome, ApprovalWait::TimedOut);
    }

    #[tokio::test]
    async fn test_wait_cancelled() {
        let stages = standard_stages();
        let artifact = json!({});
        let request = ApprovalRequest {
            stage: &stages[0],
            artifact_path: Path::new("opportunities.json"),
            artifact: &artifact,
            revision: 0,
        };
        let cancel = CancelSignal::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });

        let outcome = wait_for_decision(&NeverAnswers, &request, None, &cancel)
            .await
            .unwrap();
        assert_eq!(outcome, ApprovalWait::Cancelled);
    }
}
