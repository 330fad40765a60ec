//! Content Pipeline Integration Tests
//!
//! Runs the pipeline against the offline provider, so nothing leaves the
//! machine.

use std::collections::BTreeMap;
use std::path::Path;

use planrun::ai::ProviderKind;
use planrun::core::Config;
use planrun::generation::{
    ContentGenerationRequest, ContentPipeline, ContentType, GenerationContext, GenerationOverrides, ProjectData,
    TemplateSection,
};
use planrun::WorkflowError;

fn offline_pipeline() -> ContentPipeline {
    ContentPipeline::new(Config::default())
        .with_overrides(GenerationOverrides { provider: Some("offline".to_string()), ..GenerationOverrides::default() })
}

fn request(document: &Path, feature_dir: &Path, output: &str, content_type: ContentType) -> ContentGenerationRequest {
    let context = GenerationContext {
        feature_name: "Invoice Export".to_string(),
        feature_slug: "invoice-export".to_string(),
        feature_dir: feature_dir.to_path_buf(),
        step: "04".to_string(),
        phase: "design".to_string(),
        project_data: ProjectData::new(),
        previous_outputs: BTreeMap::new(),
    };
    ContentGenerationRequest::new(document, context, output, content_type)
}

// ============================================================================
// Artifacts
// ============================================================================

#[tokio::test]
async fn test_offline_generation_writes_framed_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = offline_pipeline();
    let req = request(&dir.path().join("02-gen-prd.md"), &dir.path().join("feature"), "prd.md", ContentType::Prd);

    let artifact = pipeline.generate(&req).await.unwrap();

    assert_eq!(artifact.relative_path, "prd.md");
    assert_eq!(artifact.response.provider, ProviderKind::Offline);
    let written = std::fs::read_to_string(dir.path().join("feature/prd.md")).unwrap();
    assert_eq!(written, artifact.content);
    assert!(written.starts_with("# Invoice Export - PRD\n"));
    assert!(written.contains("*Generated by: 02-gen-prd.md | Step: 04 | Phase: design*"));

    let usage = pipeline.usage();
    assert_eq!(usage.calls, 1);
    assert!(usage.total_cost_usd.abs() < f64::EPSILON);
}

#[tokio::test]
async fn test_template_sections_shape_offline_draft() {
    let dir = tempfile::tempdir().unwrap();
    let mut pipeline = offline_pipeline();
    let mut req = request(&dir.path().join("06-tasks.md"), dir.path(), "tasks.md", ContentType::Tasks);
    req.template_sections =
        vec![TemplateSection::new("Milestones", "List them"), TemplateSection::new("Risks", "Name them")];

    let artifact = pipeline.generate(&req).await.unwrap();

    assert!(artifact.content.contains("### Milestones"));
    assert!(artifact.content.contains("### Risks"));
    assert!(!artifact.content.contains("### Open Questions"));
}

#[tokio::test]
async fn test_output_outside_feature_dir_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let feature_dir = dir.path().join("feature");
    let mut pipeline = offline_pipeline();
    let req = request(&dir.path().join("02-gen-prd.md"), &feature_dir, "../escape.md", ContentType::Prd);

    let err = pipeline.generate(&req).await.unwrap_err();

    assert!(matches!(err, WorkflowError::Request(_)));
    assert!(!dir.path().join("escape.md").exists());
    assert_eq!(pipeline.usage().calls, 0);
}

// ============================================================================
// Prompt Assembly
// ============================================================================

#[test]
fn test_selected_stack_is_documented_verbatim() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = offline_pipeline();
    let mut req = request(
        &dir.path().join("04-gen-design-decisions-lite.md"),
        dir.path(),
        "design-decisions.md",
        ContentType::DesignDecisions,
    );
    req.context.project_data.insert("recommended_tech_stack".into(), serde_json::json!("Rust + Axum + SQLite"));

    let prompt = pipeline.render_prompt(&req);

    assert!(prompt.contains("`Rust + Axum + SQLite`"));
    assert!(!prompt.contains("questionnaire"));
}

#[test]
fn test_missing_document_still_yields_prompt() {
    let dir = tempfile::tempdir().unwrap();
    let pipeline = offline_pipeline();
    let req = request(&dir.path().join("nowhere.md"), dir.path(), "srs.md", ContentType::Srs);

    let prompt = pipeline.render_prompt(&req);

    assert!(prompt.contains("# Workflow Document: nowhere.md"));
    assert!(prompt.contains("Invoice Export"));
    assert!(prompt.contains("## Output Requirements"));
}

#[test]
fn test_previous_outputs_are_excerpted() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("prd.md"), "requirement ".repeat(100)).unwrap();
    std::fs::write(dir.path().join("tiny.md"), "short").unwrap();
    let pipeline = offline_pipeline();
    let mut req = request(&dir.path().join("03-gen-srs.md"), dir.path(), "srs.md", ContentType::Srs);
    req.context.previous_outputs =
        BTreeMap::from([("02".to_string(), "prd.md".to_string()), ("05".to_string(), "tiny.md".to_string())]);

    let prompt = pipeline.render_prompt(&req);

    assert!(prompt.contains("## Previous Outputs\n### prd"));
    assert!(!prompt.contains("### tiny"));
    assert!(prompt.contains("..."));
}
