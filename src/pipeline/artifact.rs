//! Stage artifacts on disk and JSON recovery from agent replies

use crate::pipeline::stage::PipelineStage;
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};

static CODE_FENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?s)```[A-Za-z0-9_-]*[ \t]*\r?\n(.*?)```").expect("code fence regex is valid")
});

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("Artifact {path} not found")]
    Missing { path: PathBuf },
    #[error("Failed to read artifact {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Failed to write artifact {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Artifact {path} is not valid JSON: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}

/// Directory holding the stage artifacts of a run
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    dir: PathBuf,
}

impl ArtifactStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, stage: &PipelineStage) -> PathBuf {
        self.dir.join(&stage.output_file)
    }

    /// Write pretty JSON through a temp file and rename, so readers never see a partial file
    pub fn write_json(&self, stage: &PipelineStage, value: &Value) -> Result<PathBuf, ArtifactError> {
        let path = self.path_for(stage);
        let tmp = self.dir.join(format!(".{}.tmp", stage.output_file));
        let write_err = |source| ArtifactError::Write {
            path: path.clone(),
            source,
        };

        std::fs::create_dir_all(&self.dir).map_err(write_err)?;

        let mut body = serde_json::to_vec_pretty(value)
            .map_err(|e| write_err(std::io::Error::new(std::io::ErrorKind::InvalidData, e)))?;
        body.push(b'\n');

        let mut file = std::fs::File::create(&tmp).map_err(write_err)?;
        file.write_all(&body).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        drop(file);

        std::fs::rename(&tmp, &path).map_err(write_err)?;
        info!(stage = %stage.kind, path = %path.display(), bytes = body.len(), "Artifact written");
        Ok(path)
    }

    pub fn read_json(&self, stage: &PipelineStage) -> Result<Value, ArtifactError> {
        let path = self.path_for(stage);
        let content = match std::fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(ArtifactError::Missing { path })
            }
            Err(source) => return Err(ArtifactError::Read { path, source }),
        };
        serde_json::from_str(&content).map_err(|source| ArtifactError::Parse { path, source })
    }

    pub fn exists(&self, stage: &PipelineStage) -> bool {
        self.path_for(stage).is_file()
    }

    /// Remove artifacts left by an earlier run so a failed run cannot leave stale downstream output
    pub fn clear(&self, stages: &[PipelineStage]) -> Result<(), ArtifactError> {
        for stage in stages {
            let path = self.path_for(stage);
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Removed stale artifact"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(source) => return Err(ArtifactError::Write { path, source }),
            }
        }
        Ok(())
    }
}

/// Recover a JSON value from an agent reply.
///
/// Tries the whole text, then fenced code blocks, then the first balanced
/// array or object. The error from parsing the whole text is returned if
/// nothing parses.
pub fn parse_agent_json(raw: &str) -> Result<Value, serde_json::Error> {
    let trimmed = raw.trim();
    let whole_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(e) => e,
    };

    for captures in CODE_FENCE.captures_iter(trimmed) {
        if let Ok(value) = serde_json::from_str::<Value>(captures[1].trim()) {
            return Ok(value);
        }
    }

    first_embedded_json(trimmed).ok_or(whole_err)
}

fn first_embedded_json(text: &str) -> Option<Value> {
    text.char_indices()
        .filter(|(_, ch)| matches!(ch, '[' | '{'))
        .find_map(|(start, _)| {
            serde_json::Deserializer::from_str(&text[start..])
                .into_iter::<Value>()
                .next()
                .and_then(Result::ok)
                .filter(|value| value.is_array() || value.is_object())
        })
}
