//! Offline provider.
//!
//! Produces a deterministic draft skeleton from the prompt itself, for runs
//! without any model backend. Costs nothing and never touches the network.

use async_trait::async_trait;

use super::{Completion, GenerationProvider, GenerationRequest, ProviderError, ProviderKind};
use crate::core::ProviderConfig;
use crate::generation::{CONTEXT_HEADING, TEMPLATE_HEADING};

const DEFAULT_SECTIONS: [&str; 4] = ["Overview", "Requirements", "Decisions", "Open Questions"];

/// Template-only provider.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineProvider;

impl OfflineProvider {
    fn draft(prompt: &str) -> String {
        let context = section_lines(prompt, CONTEXT_HEADING);
        let mut sections: Vec<String> = section_lines(prompt, TEMPLATE_HEADING)
            .iter()
            .filter_map(|line| line.strip_prefix("### "))
            .map(|title| title.trim().to_string())
            .collect();
        if sections.is_empty() {
            sections = DEFAULT_SECTIONS.iter().map(|s| (*s).to_string()).collect();
        }

        let mut out = String::from("## Draft\n\n");
        out.push_str("> Offline draft generated without a language model. Review and complete every section.\n\n");

        if !context.is_empty() {
            out.push_str("### Context\n\n");
            for line in &context {
                out.push_str(line);
                out.push('\n');
            }
            out.push('\n');
        }

        for title in &sections {
            out.push_str(&format!("### {title}\n\n"));
            out.push_str(&format!("- [ ] Document the {} for this feature\n", title.to_lowercase()));
            out.push_str("- [ ] Confirm with the feature owner\n\n");
        }

        out
    }
}

/// Non-empty lines between `heading` and the next `## ` heading.
fn section_lines<'a>(prompt: &'a str, heading: &str) -> Vec<&'a str> {
    prompt
        .lines()
        .skip_while(|line| line.trim() != heading)
        .skip(1)
        .take_while(|line| !line.starts_with("## "))
        .filter(|line| !line.trim().is_empty())
        .collect()
}

#[async_trait]
impl GenerationProvider for OfflineProvider {
    async fn send(
        &self,
        request: &GenerationRequest,
        _config: &ProviderConfig,
    ) -> Result<Completion, ProviderError> {
        Ok(Completion { content: Self::draft(&request.prompt), tokens_used: Some(0) })
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Offline
    }
}
