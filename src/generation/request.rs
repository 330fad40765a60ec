//! Content generation request types.

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Free-form project data gathered before the run.
pub type ProjectData = serde_json::Map<String, serde_json::Value>;

/// Kind of document a step produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    MvpEntrypoint,
    Prd,
    Srs,
    DesignDecisions,
    DesignAnalysis,
    Tasks,
    TaskProcessing,
    CompletionSummary,
    ProjectHistory,
    Enterprise,
}

impl ContentType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MvpEntrypoint => "mvp_entrypoint",
            Self::Prd => "prd",
            Self::Srs => "srs",
            Self::DesignDecisions => "design_decisions",
            Self::DesignAnalysis => "design_analysis",
            Self::Tasks => "tasks",
            Self::TaskProcessing => "task_processing",
            Self::CompletionSummary => "completion_summary",
            Self::ProjectHistory => "project_history",
            Self::Enterprise => "enterprise",
        }
    }

    /// Guess the content type from a workflow document name, defaulting to
    /// a PRD.
    pub fn infer(document_name: &str) -> Self {
        let name = document_name.to_ascii_lowercase();
        let rules: [(&str, Self); 10] = [
            ("mvp-entrypoint", Self::MvpEntrypoint),
            ("transition", Self::Enterprise),
            ("design-decisions", Self::DesignDecisions),
            ("gen-design", Self::DesignAnalysis),
            ("process-tasks", Self::TaskProcessing),
            ("tasks", Self::Tasks),
            ("completion", Self::CompletionSummary),
            ("history", Self::ProjectHistory),
            ("srs", Self::Srs),
            ("prd", Self::Prd),
        ];
        rules.iter().find(|(needle, _)| name.contains(needle)).map_or(Self::Prd, |(_, kind)| *kind)
    }

    /// Header label used in generated artifacts.
    pub fn label(self) -> String {
        self.as_str().to_uppercase()
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_json::from_value(serde_json::Value::String(s.trim().to_string()))
            .map_err(|_| format!("unknown content type: {s}"))
    }
}

/// Default output file for a document: `02-gen-prd.md` becomes `prd.md`.
pub fn default_output_file(document_name: &str) -> String {
    let stem = document_name.strip_suffix(".md").unwrap_or(document_name);
    let stem = stem
        .split_once('-')
        .filter(|(number, _)| number.chars().last().is_some_and(|c| c.is_ascii_digit()))
        .map_or(stem, |(_, rest)| rest);
    let stem = stem.strip_prefix("gen-").unwrap_or(stem);
    format!("{stem}.md")
}

/// Snapshot of the run state a step generates against.
#[derive(Debug, Clone, Default)]
pub struct GenerationContext {
    pub feature_name: String,
    pub feature_slug: String,
    pub feature_dir: PathBuf,
    pub step: String,
    pub phase: String,
    pub project_data: ProjectData,
    /// Artifacts of completed steps: step number -> path relative to `feature_dir`
    pub previous_outputs: BTreeMap<String, String>,
}

impl GenerationContext {
    /// String value of a project data field.
    pub fn field(&self, key: &str) -> Option<&str> {
        self.project_data.get(key).and_then(|v| v.as_str()).map(str::trim).filter(|v| !v.is_empty())
    }
}

/// A titled block of template text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSection {
    pub title: String,
    pub body: String,
}

impl TemplateSection {
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into() }
    }
}

/// Everything the pipeline needs to produce one artifact.
#[derive(Debug, Clone)]
pub struct ContentGenerationRequest {
    /// Workflow document whose body is embedded in the prompt
    pub document_path: PathBuf,
    pub context: GenerationContext,
    /// Output path relative to the feature directory
    pub output_file: String,
    pub content_type: ContentType,
    pub template_sections: Vec<TemplateSection>,
    pub directives: Vec<String>,
}

impl ContentGenerationRequest {
    pub fn new(
        document_path: impl Into<PathBuf>,
        context: GenerationContext,
        output_file: impl Into<String>,
        content_type: ContentType,
    ) -> Self {
        Self {
            document_path: document_path.into(),
            context,
            output_file: output_file.into(),
            content_type,
            template_sections: Vec::new(),
            directives: Vec::new(),
        }
    }

    /// File name of the workflow document.
    pub fn document_name(&self) -> String {
        self.document_path
            .file_name()
            .map_or_else(|| self.document_path.display().to_string(), |n| n.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_infer_standard_and_enterprise_documents() {
        assert_eq!(ContentType::infer("01-mvp-entrypoint.md"), ContentType::MvpEntrypoint);
        assert_eq!(ContentType::infer("04-gen-design-decisions-lite.md"), ContentType::DesignDecisions);
        assert_eq!(ContentType::infer("05-gen-design.md"), ContentType::DesignAnalysis);
        assert_eq!(ContentType::infer("07-process-tasks.md"), ContentType::TaskProcessing);
        assert_eq!(ContentType::infer("s01-mvp-to-scaling-transition.md"), ContentType::Enterprise);
        assert_eq!(ContentType::infer("s06-tasks-and-testing-scaling.md"), ContentType::Tasks);
        assert_eq!(ContentType::infer("notes.md"), ContentType::Prd);
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!("design_decisions".parse::<ContentType>().unwrap(), ContentType::DesignDecisions);
        assert!("poem".parse::<ContentType>().is_err());
        assert_eq!(ContentType::Srs.label(), "SRS");
    }

    #[test]
    fn test_default_output_file() {
        assert_eq!(default_output_file("02-gen-prd.md"), "prd.md");
        assert_eq!(default_output_file("s04-create-prd-scaling.md"), "create-prd-scaling.md");
        assert_eq!(default_output_file("readme.md"), "readme.md");
        assert_eq!(default_output_file("plan-notes.md"), "plan-notes.md");
    }

    #[test]
    fn test_field_ignores_blank_and_non_string() {
        let mut context = GenerationContext::default();
        context.project_data.insert("a".into(), serde_json::json!("  React "));
        context.project_data.insert("b".into(), serde_json::json!(""));
        context.project_data.insert("c".into(), serde_json::json!(3));
        assert_eq!(context.field("a"), Some("React"));
        assert_eq!(context.field("b"), None);
        assert_eq!(context.field("c"), None);
    }
}
