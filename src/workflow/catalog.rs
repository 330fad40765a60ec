//! Step catalog.
//!
//! Built once from `[workflow]` configuration. Steps are numbered in
//! sequence order and never change afterwards.

use std::collections::HashSet;

use serde::Serialize;

use crate::core::{ConfigError, WorkflowConfig};
use crate::generation::{default_output_file, ContentType};

/// Phase assigned to steps missing from `phase_mapping`.
pub const UNASSIGNED_PHASE: &str = "unassigned";

/// One workflow step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorkflowStep {
    /// Ordinal token such as "01" or "s04"
    pub number: String,
    pub document_name: String,
    pub phase: String,
    pub gate_name: String,
    /// Prerequisite step numbers, all earlier in the catalog
    pub dependencies: Vec<String>,
    pub compliance_impact: bool,
    pub content_type: ContentType,
    /// Artifact path relative to the feature directory
    pub output_file: String,
}

/// Ordered, validated list of steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepCatalog {
    steps: Vec<WorkflowStep>,
}

impl StepCatalog {
    /// Build and validate the catalog.
    ///
    /// Fails when a mapping references an unknown step, a dependency does
    /// not precede its step, a step sits in two phases, or two steps share
    /// an output file.
    pub fn from_config(config: &WorkflowConfig) -> Result<Self, ConfigError> {
        if config.numbered_sequence.is_empty() {
            return Err(ConfigError::Invalid("workflow.numbered_sequence is empty".to_string()));
        }

        let numbers: Vec<String> = (1..=config.numbered_sequence.len())
            .map(|i| format!("{}{i:02}", config.step_prefix))
            .collect();
        let known: HashSet<&str> = numbers.iter().map(String::as_str).collect();

        let referenced = config
            .phase_mapping
            .values()
            .flatten()
            .chain(config.dependency_chain.keys())
            .chain(config.dependency_chain.values().flatten())
            .chain(config.gate_names.keys())
            .chain(config.compliance_steps.iter());
        for number in referenced {
            if !known.contains(number.as_str()) {
                return Err(ConfigError::Invalid(format!("workflow configuration references unknown step '{number}'")));
            }
        }

        let mut steps = Vec::with_capacity(numbers.len());
        let mut outputs = HashSet::new();

        for (index, (number, document)) in numbers.iter().zip(&config.numbered_sequence).enumerate() {
            let phases: Vec<&String> = config
                .phase_mapping
                .iter()
                .filter(|(_, members)| members.contains(number))
                .map(|(phase, _)| phase)
                .collect();
            let phase = match phases.as_slice() {
                [] => {
                    tracing::warn!(step = %number, "Step has no phase, using '{UNASSIGNED_PHASE}'");
                    UNASSIGNED_PHASE.to_string()
                }
                [phase] => (*phase).clone(),
                _ => {
                    return Err(ConfigError::Invalid(format!("step {number} belongs to more than one phase")));
                }
            };

            let dependencies = config.dependency_chain.get(number).cloned().unwrap_or_default();
            for dep in &dependencies {
                let precedes = numbers[..index].contains(dep);
                if !precedes {
                    return Err(ConfigError::Invalid(format!(
                        "step {number} depends on {dep}, which does not precede it"
                    )));
                }
            }

            let overrides = config.documents.get(document);
            let content_type = match overrides.and_then(|d| d.content_type.as_deref()) {
                Some(tag) => tag.parse::<ContentType>().map_err(ConfigError::Invalid)?,
                None => ContentType::infer(document),
            };
            let output_file = overrides
                .and_then(|d| d.output_file.clone())
                .unwrap_or_else(|| default_output_file(document));
            if !outputs.insert(output_file.clone()) {
                return Err(ConfigError::Invalid(format!("output file '{output_file}' is produced by more than one step")));
            }

            steps.push(WorkflowStep {
                number: number.clone(),
                document_name: document.clone(),
                phase,
                gate_name: config.gate_names.get(number).cloned().unwrap_or_else(|| gate_name_for(document)),
                dependencies,
                compliance_impact: config.compliance_steps.contains(number),
                content_type,
                output_file,
            });
        }

        Ok(Self { steps })
    }

    pub fn steps(&self) -> &[WorkflowStep] {
        &self.steps
    }

    pub fn get(&self, number: &str) -> Option<&WorkflowStep> {
        self.steps.iter().find(|s| s.number == number)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Phase names in order of first appearance.
    pub fn phases(&self) -> Vec<&str> {
        let mut phases: Vec<&str> = Vec::new();
        for step in &self.steps {
            if !phases.contains(&step.phase.as_str()) {
                phases.push(&step.phase);
            }
        }
        phases
    }
}

/// Gate name derived from a document name: `02-gen-prd.md` becomes `gen_prd`.
fn gate_name_for(document: &str) -> String {
    default_output_file(document).trim_end_matches(".md").replace('-', "_")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    fn three_steps() -> WorkflowConfig {
        WorkflowConfig {
            numbered_sequence: vec!["a.md".into(), "b.md".into(), "c.md".into()],
            phase_mapping: BTreeMap::from([("only".to_string(), vec!["01".into(), "02".into(), "03".into()])]),
            dependency_chain: BTreeMap::from([("03".to_string(), vec!["01".into(), "02".into()])]),
            gate_names: BTreeMap::from([
                ("01".to_string(), "A".to_string()),
                ("02".to_string(), "B".to_string()),
                ("03".to_string(), "C".to_string()),
            ]),
            compliance_steps: vec!["02".into()],
            ..WorkflowConfig::default()
        }
    }

    #[test]
    fn test_default_catalog() {
        let catalog = StepCatalog::from_config(&WorkflowConfig::default()).unwrap();
        assert_eq!(catalog.len(), 9);
        let design = catalog.get("04").unwrap();
        assert_eq!(design.phase, "design");
        assert_eq!(design.gate_name, "design_decisions");
        assert_eq!(design.content_type, ContentType::DesignDecisions);
        assert_eq!(design.output_file, "design-decisions.md");
        assert_eq!(design.dependencies, vec!["02", "03"]);
        assert_eq!(catalog.phases(), vec!["foundation", "requirements", "design", "implementation", "completion"]);
    }

    #[test]
    fn test_custom_catalog() {
        let catalog = StepCatalog::from_config(&three_steps()).unwrap();
        let numbers: Vec<_> = catalog.steps().iter().map(|s| s.number.as_str()).collect();
        assert_eq!(numbers, vec!["01", "02", "03"]);
        assert!(catalog.get("02").unwrap().compliance_impact);
        assert!(!catalog.get("03").unwrap().compliance_impact);
        assert_eq!(catalog.get("01").unwrap().output_file, "a.md");
    }

    #[test]
    fn test_prefix() {
        let config = WorkflowConfig { step_prefix: "s".to_string(), phase_mapping: BTreeMap::new(), ..three_steps() };
        assert!(StepCatalog::from_config(&config).is_err());

        let config = WorkflowConfig {
            step_prefix: "s".to_string(),
            phase_mapping: BTreeMap::new(),
            dependency_chain: BTreeMap::new(),
            gate_names: BTreeMap::new(),
            compliance_steps: Vec::new(),
            ..three_steps()
        };
        let catalog = StepCatalog::from_config(&config).unwrap();
        assert_eq!(catalog.steps()[0].number, "s01");
        assert_eq!(catalog.steps()[0].phase, UNASSIGNED_PHASE);
        assert_eq!(catalog.steps()[0].gate_name, "a");
    }

    #[test]
    fn test_forward_dependency_rejected() {
        let mut config = three_steps();
        config.dependency_chain.insert("01".to_string(), vec!["02".to_string()]);
        let err = StepCatalog::from_config(&config).unwrap_err();
        assert!(err.to_string().contains("does not precede"));
    }

    #[test]
    fn test_self_dependency_rejected() {
        let mut config = three_steps();
        config.dependency_chain.insert("02".to_string(), vec!["02".to_string()]);
        assert!(StepCatalog::from_config(&config).is_err());
    }

    #[test]
    fn test_unknown_step_reference_rejected() {
        let mut config = three_steps();
        config.gate_names.insert("07".to_string(), "ghost".to_string());
        assert!(StepCatalog::from_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_phase_rejected() {
        let mut config = three_steps();
        config.phase_mapping.insert("other".to_string(), vec!["01".to_string()]);
        assert!(StepCatalog::from_config(&config).is_err());
    }

    #[test]
    fn test_duplicate_output_rejected() {
        let mut config = three_steps();
        config.numbered_sequence = vec!["01-prd.md".into(), "02-gen-prd.md".into(), "c.md".into()];
        assert!(StepCatalog::from_config(&config).is_err());
    }

    #[test]
    fn test_bad_content_type_rejected() {
        let mut config = three_steps();
        config.documents.insert(
            "a.md".to_string(),
            crate::core::DocumentConfig { content_type: Some("limerick".to_string()), output_file: None },
        );
        assert!(StepCatalog::from_config(&config).is_err());
    }
}
