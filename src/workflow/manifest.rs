//! Feature manifest persistence.
//!
//! One JSON manifest per feature directory. Every completed step does a
//! full read-merge-write; the execution log and generated file list only
//! ever grow. Top-level fields written by other tools are carried through
//! untouched.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::context::ComplianceFramework;
use super::gate::AutomationMode;
use crate::core::write_atomic;

/// Manifest file name inside a feature directory.
pub const MANIFEST_FILE: &str = "feature-manifest.json";

/// Status value for a finished step.
pub const STATUS_COMPLETED: &str = "completed";

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed manifest {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write manifest {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureMetadata {
    pub name: String,
    pub slug: String,
    pub mode: AutomationMode,
    pub compliance: Option<ComplianceFramework>,
    pub risk_score: f64,
    pub created_at: DateTime<Utc>,
    pub run_id: String,
}

impl Default for FeatureMetadata {
    fn default() -> Self {
        Self {
            name: String::new(),
            slug: String::new(),
            mode: AutomationMode::default(),
            compliance: None,
            risk_score: 0.0,
            created_at: Utc::now(),
            run_id: String::new(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowStatus {
    pub current_phase: Option<String>,
    pub phases_completed: Vec<String>,
    pub phases_remaining: Vec<String>,
    pub last_updated: Option<DateTime<Utc>>,
}

/// Outcome of one step as recorded in the manifest.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentStatus {
    pub status: String,
    pub document: String,
    pub phase: String,
    pub output_file: String,
    pub completed_at: Option<DateTime<Utc>>,
    pub provider: String,
    pub model: String,
    pub tokens_used: u64,
    pub cost_usd: f64,
    pub validated: bool,
    pub validation_errors: Vec<String>,
}

impl DocumentStatus {
    pub fn is_completed(&self) -> bool {
        self.status == STATUS_COMPLETED
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Manifest {
    pub feature_metadata: FeatureMetadata,
    pub workflow_status: WorkflowStatus,
    /// Step number -> outcome
    pub document_status: BTreeMap<String, DocumentStatus>,
    /// Append-only, timestamped
    pub execution_log: Vec<String>,
    /// Append-only, relative to the feature directory
    pub generated_files: Vec<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl Manifest {
    pub fn new(metadata: FeatureMetadata) -> Self {
        Self { feature_metadata: metadata, ..Self::default() }
    }

    /// Step numbers recorded as completed.
    pub fn completed_steps(&self) -> BTreeSet<String> {
        self.document_status
            .iter()
            .filter(|(_, status)| status.is_completed())
            .map(|(number, _)| number.clone())
            .collect()
    }

    /// Merge one step's outcome. Log lines and files are appended, never
    /// replaced.
    pub fn apply(&mut self, update: &StepUpdate) {
        let now = update.status.completed_at.unwrap_or_else(Utc::now);

        self.document_status.insert(update.number.clone(), update.status.clone());
        self.execution_log.extend(update.log.iter().cloned());
        self.generated_files.extend(update.generated_files.iter().cloned());

        self.workflow_status.current_phase = Some(update.status.phase.clone());
        if update.phase_completed && !self.workflow_status.phases_completed.contains(&update.status.phase) {
            self.workflow_status.phases_completed.push(update.status.phase.clone());
        }
        self.workflow_status.phases_remaining = update.phases_remaining.clone();
        self.workflow_status.last_updated = Some(now);
    }
}

/// Everything a completed step contributes to the manifest.
#[derive(Debug, Clone, Default)]
pub struct StepUpdate {
    pub number: String,
    pub status: DocumentStatus,
    pub log: Vec<String>,
    pub generated_files: Vec<String>,
    /// The step finished the last pending step of its phase
    pub phase_completed: bool,
    pub phases_remaining: Vec<String>,
}

/// Timestamped execution log line.
pub fn log_line(message: &str) -> String {
    format!("{} {message}", Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true))
}

/// Reads and writes the manifest of one feature directory.
#[derive(Debug, Clone)]
pub struct ManifestStore {
    path: PathBuf,
}

impl ManifestStore {
    pub fn new(feature_dir: &Path) -> Self {
        Self { path: feature_dir.join(MANIFEST_FILE) }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the manifest, `None` when it does not exist yet.
    pub fn load(&self) -> Result<Option<Manifest>, ManifestError> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(source) => return Err(ManifestError::Read { path: self.path.clone(), source }),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| ManifestError::Parse { path: self.path.clone(), source })
    }

    pub fn save(&self, manifest: &Manifest) -> Result<(), ManifestError> {
        let mut json = serde_json::to_string_pretty(manifest).map_err(|e| ManifestError::Write {
            path: self.path.clone(),
            source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
        })?;
        json.push('\n');
        write_atomic(&self.path, json.as_bytes()).map_err(|source| ManifestError::Write { path: self.path.clone(), source })
    }

    /// Read, merge one step, write back atomically.
    ///
    /// A manifest that exists but cannot be parsed is an error and is left
    /// on disk as it is.
    pub fn record_step(&self, metadata: &FeatureMetadata, update: &StepUpdate) -> Result<Manifest, ManifestError> {
        let mut manifest = self.load()?.unwrap_or_else(|| Manifest::new(metadata.clone()));
        manifest.apply(update);
        self.save(&manifest)?;
        tracing::debug!(path = %self.path.display(), step = %update.number, "Manifest updated");
        Ok(manifest)
    }
}
