//! Content generation pipeline.
//!
//! Turns a workflow step into a markdown artifact: prompt assembly,
//! provider call, validation, post-processing and the artifact write.

mod extract;
mod pipeline;
mod postprocess;
mod prompt;
mod request;
mod validate;

pub use extract::{DocumentInstructions, InstructionExtractor, MarkdownExtractor};
pub use pipeline::{load_previous_outputs, ContentPipeline, GeneratedArtifact, GenerationOverrides, ResolvedProvider};
pub use postprocess::post_process;
pub use prompt::{
    build_prompt, decompose_stack, StackParts, CONTEXT_HEADING, PREVIOUS_OUTPUT_EXCERPT_CHARS,
    PREVIOUS_OUTPUT_MIN_CHARS, TECH_STACK_FIELD, TEMPLATE_HEADING,
};
pub use request::{
    default_output_file, ContentGenerationRequest, ContentType, GenerationContext, ProjectData, TemplateSection,
};
pub use validate::{validate_content, ValidationCriterion};
