//! Prompt assembly.
//!
//! Sections always appear in this order: workflow document, generation
//! context, project data with content-specific rules, previous outputs,
//! directives, template sections, closing requirements.

use std::collections::BTreeMap;

use crate::core::{PromptConfig, TechStackPolicy};

use super::request::{ContentGenerationRequest, ContentType, GenerationContext};

/// Heading of the structured context block.
pub const CONTEXT_HEADING: &str = "## Generation Context";

/// Heading of the template section block.
pub const TEMPLATE_HEADING: &str = "## Template Sections";

/// Previous outputs at or below this many characters are left out.
pub const PREVIOUS_OUTPUT_MIN_CHARS: usize = 100;

/// Characters of each previous output quoted in the prompt.
pub const PREVIOUS_OUTPUT_EXCERPT_CHARS: usize = 500;

/// Project data field holding the selected technology stack.
pub const TECH_STACK_FIELD: &str = "recommended_tech_stack";

const KEY_FIELDS: [(&str, &str); 6] = [
    ("project_name", "Project name"),
    ("primary_user", "Primary user"),
    ("user_pain_point", "Pain point"),
    (TECH_STACK_FIELD, "Tech stack"),
    ("business_model", "Business model"),
    ("key_success_metric", "Success metric"),
];

/// Backend, frontend and database named by a stack description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackParts {
    pub backend: String,
    pub frontend: String,
    pub database: String,
}

const NOT_SPECIFIED: &str = "Not specified";

/// Split a free-form stack description such as "Node.js + Express + SQLite".
pub fn decompose_stack(stack: &str) -> StackParts {
    let stack = stack.trim();
    if stack.is_empty() {
        return StackParts {
            backend: NOT_SPECIFIED.to_string(),
            frontend: NOT_SPECIFIED.to_string(),
            database: NOT_SPECIFIED.to_string(),
        };
    }
    let has = |needle: &str| stack.contains(needle);
    let lower = stack.to_lowercase();

    let backend = if has("Node.js") && has("Express") {
        "Node.js + Express".to_string()
    } else if has("Python") && has("FastAPI") {
        "Python + FastAPI".to_string()
    } else if has("Python") && has("Flask") {
        "Python + Flask".to_string()
    } else if has("Node.js") {
        "Node.js".to_string()
    } else if has("Python") {
        "Python".to_string()
    } else {
        stack.split('+').next().map_or_else(|| NOT_SPECIFIED.to_string(), |s| s.trim().to_string())
    };

    let frontend = if has("Vanilla JS") || lower.contains("vanilla") {
        "Vanilla JavaScript"
    } else if has("React") {
        "React"
    } else if has("Vue") {
        "Vue.js"
    } else if has("Angular") {
        "Angular"
    } else if has("HTML/CSS/JS") {
        "HTML/CSS/JavaScript"
    } else if has("JavaScript") || has("JS") {
        "JavaScript"
    } else {
        NOT_SPECIFIED
    };

    let database = ["SQLite", "PostgreSQL", "MySQL", "MongoDB"]
        .into_iter()
        .find(|db| stack.contains(*db))
        .unwrap_or(NOT_SPECIFIED);

    StackParts { backend, frontend: frontend.to_string(), database: database.to_string() }
}

/// Assemble the prompt for a request.
///
/// `document` is the workflow document body, or `None` when it could not
/// be read, in which case only its name is referenced.
pub fn build_prompt(
    request: &ContentGenerationRequest,
    document: Option<&str>,
    previous_outputs: &BTreeMap<String, String>,
    settings: &PromptConfig,
) -> String {
    let ctx = &request.context;
    let name = request.document_name();
    let mut parts: Vec<String> = Vec::new();

    match document {
        Some(body) => {
            parts.push(format!("# Workflow Document: {name}"));
            parts.push(format!("```markdown\n{}\n```", body.trim_end()));
            parts.push("Follow the instructions, questions and guidelines in the workflow document above.".to_string());
        }
        None => {
            parts.push(format!("# Workflow Document: {name}"));
            parts.push(format!(
                "Execute the instructions of the workflow document `{name}`. Its body is unavailable; rely on the context below."
            ));
        }
    }

    parts.push(format!(
        "{CONTEXT_HEADING}\n- Feature: {}\n- Feature slug: {}\n- Phase: {}\n- Step: {}\n- Output file: {}\n- Content type: {}",
        ctx.feature_name, ctx.feature_slug, ctx.phase, ctx.step, request.output_file, request.content_type
    ));

    if !ctx.project_data.is_empty() {
        let json = serde_json::to_string_pretty(&ctx.project_data).unwrap_or_default();
        parts.push(format!("## Project Data\n```json\n{json}\n```"));

        let facts: Vec<String> = KEY_FIELDS
            .iter()
            .filter_map(|(key, label)| ctx.field(key).map(|v| format!("- {label}: `{v}`")))
            .collect();
        if !facts.is_empty() {
            parts.push(format!(
                "## Key Facts\nThese values are real stakeholder answers. Use them verbatim.\n{}",
                facts.join("\n")
            ));
        }

        if let Some(rules) = content_rules(request.content_type, ctx) {
            parts.push(rules);
        }
    }

    if request.content_type == ContentType::DesignDecisions {
        parts.push(design_decisions_block(ctx, settings.tech_stack_policy));
    }

    let excerpts: Vec<String> = previous_outputs
        .iter()
        .filter(|(_, content)| content.chars().count() > PREVIOUS_OUTPUT_MIN_CHARS)
        .map(|(name, content)| format!("### {name}\n```\n{}\n```", excerpt(content)))
        .collect();
    if !excerpts.is_empty() {
        parts.push(format!("## Previous Outputs\n{}", excerpts.join("\n")));
    }

    if !request.directives.is_empty() {
        parts.push(format!("## Directives\n{}", bullets(&request.directives)));
    }

    let sections: Vec<String> = request
        .template_sections
        .iter()
        .filter(|s| !s.body.trim().is_empty())
        .map(|s| format!("### {}\n{}", s.title, s.body.trim()))
        .collect();
    if !sections.is_empty() {
        parts.push(format!("{TEMPLATE_HEADING}\n{}", sections.join("\n")));
    }

    if !settings.common_instructions.is_empty() {
        parts.push(format!("## Instructions\n{}", bullets(&settings.common_instructions)));
    }
    parts.push(output_requirements(request));

    parts.join("\n\n")
}

fn bullets(items: &[String]) -> String {
    items.iter().map(|i| format!("- {i}")).collect::<Vec<_>>().join("\n")
}

fn excerpt(content: &str) -> String {
    if content.chars().count() <= PREVIOUS_OUTPUT_EXCERPT_CHARS {
        return content.to_string();
    }
    let cut: String = content.chars().take(PREVIOUS_OUTPUT_EXCERPT_CHARS).collect();
    format!("{cut}...")
}

fn or<'a>(ctx: &'a GenerationContext, key: &str, fallback: &'a str) -> &'a str {
    ctx.field(key).unwrap_or(fallback)
}

fn content_rules(content_type: ContentType, ctx: &GenerationContext) -> Option<String> {
    let rules = match content_type {
        ContentType::MvpEntrypoint => vec![
            "Replace every placeholder field with the actual value from the project data".to_string(),
            "Write complete documentation from the collected answers".to_string(),
            "Never emit template field names or placeholder text".to_string(),
        ],
        ContentType::Tasks | ContentType::TaskProcessing => vec![
            format!("Use exactly this tech stack: `{}`", or(ctx, TECH_STACK_FIELD, "the specified stack")),
            format!("Target this user: `{}`", or(ctx, "primary_user", "the primary users")),
            format!("Address this pain point: `{}`", or(ctx, "user_pain_point", "the user needs")),
            format!("Align with the business model: `{}`", or(ctx, "business_model", "the business approach")),
            format!("Measure against: `{}`", or(ctx, "key_success_metric", "the success measures")),
            format!("Respect the stack reasoning: `{}`", or(ctx, "tech_stack_reasoning", "the technical decisions")),
        ],
        ContentType::Prd | ContentType::Srs | ContentType::DesignAnalysis | ContentType::Enterprise => vec![
            format!(
                "Ground every section in {} dealing with {}",
                or(ctx, "primary_user", "the users"),
                or(ctx, "user_pain_point", "their challenges")
            ),
            format!("Use the selected tech stack: {}", or(ctx, TECH_STACK_FIELD, "the chosen technologies")),
            format!("Align with the business value: {}", or(ctx, "business_model", "value creation")),
            format!("Target the success criteria: {}", or(ctx, "key_success_metric", "the success measures")),
        ],
        ContentType::DesignDecisions | ContentType::CompletionSummary | ContentType::ProjectHistory => {
            return None
        }
    };
    Some(format!("## {} Rules\n{}", content_type.label(), bullets(&rules)))
}

fn design_decisions_block(ctx: &GenerationContext, policy: TechStackPolicy) -> String {
    let Some(stack) = ctx.field(TECH_STACK_FIELD) else {
        return "## Technology Selection\n\
                No technology stack has been selected yet. Work through the questionnaire in the \
                workflow document using the stakeholder answers above, then record the chosen stack \
                and the reasoning behind each choice."
            .to_string();
    };

    let parts = decompose_stack(stack);
    let mut lines = vec![
        "## Selected Technology Stack".to_string(),
        format!("Selected stack: `{stack}`"),
        format!("- Backend: {}", parts.backend),
        format!("- Frontend: {}", parts.frontend),
        format!("- Database: {}", parts.database),
        format!(
            "- Selection reasoning: {}",
            or(ctx, "tech_stack_reasoning", "Chosen by the stakeholders during project initialization")
        ),
        String::new(),
        "Document these exact selections with rationale, learning resources and implementation guidance."
            .to_string(),
        format!(
            "Explain why they suit {} solving {}.",
            or(ctx, "primary_user", "the users"),
            or(ctx, "user_pain_point", "their challenges")
        ),
    ];

    match policy {
        TechStackPolicy::DocumentSelection => {
            lines.push("The selection is final: do not propose different technologies.".to_string());
        }
        TechStackPolicy::OfferAlternatives => {
            lines.push(format!(
                "After the selection, list the alternatives that were weighed ({}), including no-code and low-code options, with the trade-off that ruled each out.",
                or(ctx, "alternative_options", "none recorded")
            ));
        }
    }
    lines.join("\n")
}

fn output_requirements(request: &ContentGenerationRequest) -> String {
    let mut lines = vec![
        format!("- Generate the content of `{}`", request.output_file),
        format!("- Content type: {}", request.content_type),
        "- Use markdown headings, lists and tables for structure".to_string(),
        "- Follow the workflow document instructions precisely and include every required section".to_string(),
        "- Make the content practical and immediately actionable".to_string(),
        "- Reference sibling documents by relative path within the feature directory (for example `./prd.md`)"
            .to_string(),
    ];
    if request.content_type == ContentType::DesignDecisions {
        if let Some(stack) = request.context.field(TECH_STACK_FIELD) {
            lines.push(format!("- Every decision must be consistent with the selected stack `{stack}`"));
        }
    }
    format!("## Output Requirements\n{}", lines.join("\n"))
}
