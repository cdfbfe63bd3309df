//! jobscout
//!
//! Finds internship and associate job leads with a three-stage agent pipeline:
//! discovery (web search), extraction (scraping) and validation. The operator
//! approves the discovered candidates before anything else runs, and the
//! validated records are written out as CSV.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use jobscout::config::CriteriaSection;
//! use jobscout::criteria::SearchCriteria;
//! use jobscout::pipeline::{ArtifactStore, Pipeline, PolicyApproval};
//! use jobscout::testing::MockStageExecutor;
//! use std::num::NonZeroU32;
//! use std::sync::Arc;
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let criteria = SearchCriteria::new(
//!     &CriteriaSection::default(),
//!     "New York City".to_string(),
//!     NonZeroU32::new(5).unwrap(),
//!     vec!["Insurance".to_string()],
//! )?;
//!
//! let pipeline = Pipeline::new(
//!     Arc::new(MockStageExecutor::new()),
//!     Arc::new(PolicyApproval::auto_approve()),
//!     ArtifactStore::new("out"),
//! );
//! let outcome = pipeline.run(&criteria).await?;
//! println!("{} validated records", outcome.records.len());
//! # Ok(())
//! # }
//! ```

pub mod agent;
pub mod config;
pub mod consumer;
pub mod criteria;
pub mod error;
pub mod input;
pub mod llm;
pub mod observability;
pub mod pipeline;
pub mod testing;
pub mod tools;

pub use agent::{AgentExecutor, AgentSettings};
pub use config::{ConfigError, Credentials, JobScoutConfig};
pub use consumer::{consume, ConsumeOutcome, ConsumerError};
pub use criteria::{InputError, SearchCriteria};
pub use error::{JobScoutError, JobScoutResult};
pub use pipeline::{Pipeline, PipelineError, PipelineOutcome, StageKind};
pub use tools::{Tool, ToolDescription, ToolError, ToolSystem};
