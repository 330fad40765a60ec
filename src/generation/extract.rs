//! Best-effort extraction of instructions from workflow documents.
//!
//! Documents are free-form markdown. Nothing here fails: a document
//! without recognizable structure yields empty instructions.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use super::request::TemplateSection;

static FILE_REFERENCE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(read|generate|create|save(?:\s+as)?)\s+`([^`]+\.md)`").expect("valid file reference regex")
});

static AI_DIRECTIVE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bAI\s+(?:should|must|will)\s+(.+)").expect("valid directive regex"));

static THIS_DOCUMENT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bThis document\s+(.+)").expect("valid objective regex"));

/// Structured hints found in a workflow document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DocumentInstructions {
    pub objective: Option<String>,
    pub required_inputs: Vec<String>,
    pub expected_outputs: Vec<String>,
    pub directives: Vec<String>,
    pub template_sections: Vec<TemplateSection>,
    pub validation_criteria: Vec<String>,
}

impl DocumentInstructions {
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }
}

/// Pulls instructions out of a document body.
pub trait InstructionExtractor: Send + Sync {
    fn extract(&self, document: &str) -> DocumentInstructions;
}

/// Heading and bullet based extractor for markdown documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct MarkdownExtractor;

#[derive(Debug)]
struct Section<'a> {
    level: usize,
    title: &'a str,
    body: Vec<&'a str>,
}

impl Section<'_> {
    fn title_has(&self, needles: &[&str]) -> bool {
        let title = self.title.to_ascii_lowercase();
        needles.iter().any(|n| title.contains(n))
    }

    fn text(&self) -> String {
        self.body.iter().take_while(|l| l.trim() != "---").copied().collect::<Vec<_>>().join("\n").trim().to_string()
    }
}

fn heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    rest.starts_with(' ').then(|| (level, rest.trim()))
}

/// Split a document into heading sections, ignoring headings inside code fences.
fn sections(document: &str) -> Vec<Section<'_>> {
    let mut out = vec![Section { level: 0, title: "", body: Vec::new() }];
    let mut in_fence = false;

    for line in document.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
        }
        match heading(line) {
            Some((level, title)) if !in_fence => out.push(Section { level, title, body: Vec::new() }),
            _ => {
                if let Some(current) = out.last_mut() {
                    current.body.push(line);
                }
            }
        }
    }
    out
}

/// Bullet items of a block, or its non-empty lines when it has none.
fn items(lines: &[&str]) -> Vec<String> {
    let bullets: Vec<String> = lines.iter().filter_map(|l| bullet(l)).collect();
    if !bullets.is_empty() {
        return bullets;
    }
    lines.iter().map(|l| l.trim()).filter(|l| !l.is_empty() && *l != "---").map(str::to_string).collect()
}

fn bullet(line: &str) -> Option<String> {
    let trimmed = line.trim_start();
    let rest = ["- ", "* ", "+ "].iter().find_map(|p| trimmed.strip_prefix(p)).or_else(|| {
        let digits = trimmed.chars().take_while(char::is_ascii_digit).count();
        (digits > 0).then(|| trimmed[digits..].strip_prefix(". ")).flatten()
    })?;
    let rest = ["[ ] ", "[x] ", "[X] "].iter().find_map(|p| rest.strip_prefix(p)).unwrap_or(rest);
    let rest = rest.trim();
    (!rest.is_empty()).then(|| rest.to_string())
}

fn push_unique(list: &mut Vec<String>, item: String) {
    if !item.is_empty() && !list.contains(&item) {
        list.push(item);
    }
}

impl InstructionExtractor for MarkdownExtractor {
    fn extract(&self, document: &str) -> DocumentInstructions {
        let sections = sections(document);
        let mut found = DocumentInstructions::default();

        found.objective = sections
            .iter()
            .find(|s| s.level > 0 && s.title_has(&["purpose", "objective", "goal"]))
            .map(Section::text)
            .filter(|t| !t.is_empty())
            .or_else(|| THIS_DOCUMENT.captures(document).map(|c| c[1].trim().to_string()));

        for section in &sections {
            if section.level == 0 {
                continue;
            }
            if section.title_has(&["input", "prerequisite"]) {
                for item in items(&section.body) {
                    push_unique(&mut found.required_inputs, item);
                }
            }
            if section.title_has(&["output", "deliverable"]) {
                for item in items(&section.body) {
                    push_unique(&mut found.expected_outputs, item);
                }
            }
            if section.title_has(&["directive"]) {
                for item in items(&section.body) {
                    push_unique(&mut found.directives, item);
                }
            }
            if section.title_has(&["validation", "checklist", "acceptance"]) {
                for item in items(&section.body) {
                    push_unique(&mut found.validation_criteria, item);
                }
            }
        }

        for caps in FILE_REFERENCE.captures_iter(document) {
            let file = caps[2].to_string();
            if caps[1].eq_ignore_ascii_case("read") {
                push_unique(&mut found.required_inputs, file);
            } else {
                push_unique(&mut found.expected_outputs, file);
            }
        }

        for caps in AI_DIRECTIVE.captures_iter(document) {
            push_unique(&mut found.directives, caps[1].trim().to_string());
        }

        found.template_sections = template_sections(&sections);
        found
    }
}

fn template_sections(sections: &[Section<'_>]) -> Vec<TemplateSection> {
    let Some(start) = sections.iter().position(|s| s.level > 0 && s.title.eq_ignore_ascii_case("template"))
    else {
        return Vec::new();
    };
    let level = sections[start].level;

    let nested: Vec<TemplateSection> = sections[start + 1..]
        .iter()
        .take_while(|s| s.level > level)
        .map(|s| TemplateSection::new(s.title, s.text()))
        .filter(|s| !s.body.is_empty())
        .collect();

    if nested.is_empty() {
        let body = sections[start].text();
        if body.is_empty() {
            return Vec::new();
        }
        return vec![TemplateSection::new("Template", body)];
    }
    nested
}
