//! Execution context for one run.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::catalog::WorkflowStep;
use super::gate::AutomationMode;
use crate::core::{expand_path, RiskConfig};
use crate::generation::{GenerationContext, ProjectData, TECH_STACK_FIELD};

/// Regulatory framework that forces compliance gates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComplianceFramework {
    #[serde(rename = "GDPR")]
    Gdpr,
    #[serde(rename = "SOC2")]
    Soc2,
    #[serde(rename = "PCI")]
    Pci,
    #[serde(rename = "HIPAA")]
    Hipaa,
    #[serde(rename = "ISO27001")]
    Iso27001,
}

impl ComplianceFramework {
    pub const ALL: [Self; 5] = [Self::Gdpr, Self::Soc2, Self::Pci, Self::Hipaa, Self::Iso27001];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Gdpr => "GDPR",
            Self::Soc2 => "SOC2",
            Self::Pci => "PCI",
            Self::Hipaa => "HIPAA",
            Self::Iso27001 => "ISO27001",
        }
    }
}

impl fmt::Display for ComplianceFramework {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ComplianceFramework {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s.chars().filter(|c| c.is_ascii_alphanumeric()).collect::<String>().to_uppercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == normalized)
            .ok_or_else(|| format!("unknown compliance framework '{s}' (expected GDPR, SOC2, PCI, HIPAA or ISO27001)"))
    }
}

/// Mutable state for one feature run.
#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub feature_name: String,
    pub feature_slug: String,
    pub mode: AutomationMode,
    /// Project root that relative configuration paths resolve against
    pub root: PathBuf,
    pub feature_dir: PathBuf,
    pub risk_score: f64,
    pub project_data: ProjectData,
    pub compliance: Option<ComplianceFramework>,
    pub architecture_impact: bool,
    pub multi_team: bool,
    /// Technologies named explicitly by the operator
    pub technologies: Vec<String>,
    /// Step number -> artifact path relative to the feature directory
    pub outputs: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// New context with a dated feature directory under `features_dir`.
    pub fn new(feature_name: &str, mode: AutomationMode, root: &Path, features_dir: &Path) -> Self {
        let feature_slug = slugify(feature_name);
        let date = chrono::Local::now().format("%Y-%m-%d");
        let feature_dir = root.join(expand_path(features_dir)).join(format!("{date}-{feature_slug}"));

        Self {
            feature_name: feature_name.trim().to_string(),
            feature_slug,
            mode,
            root: root.to_path_buf(),
            feature_dir,
            risk_score: 0.0,
            project_data: ProjectData::new(),
            compliance: None,
            architecture_impact: false,
            multi_team: false,
            technologies: Vec::new(),
            outputs: BTreeMap::new(),
        }
    }

    pub fn with_feature_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.feature_dir = dir.into();
        self
    }

    pub fn with_compliance(mut self, compliance: Option<ComplianceFramework>) -> Self {
        self.compliance = compliance;
        self
    }

    pub fn with_architecture_impact(mut self, impact: bool) -> Self {
        self.architecture_impact = impact;
        self
    }

    pub fn with_multi_team(mut self, multi_team: bool) -> Self {
        self.multi_team = multi_team;
        self
    }

    pub fn with_technologies(mut self, technologies: Vec<String>) -> Self {
        self.technologies = technologies;
        self
    }

    pub fn with_project_data(mut self, data: ProjectData) -> Self {
        self.project_data = data;
        self
    }

    /// Recompute and store the risk score.
    ///
    /// Base score plus a weight for each active flag, capped at 1.0.
    pub fn assess_risk(&mut self, risk: &RiskConfig) -> f64 {
        let mut score = risk.base_score;
        if self.compliance.is_some() {
            score += risk.compliance_weight;
        }
        if self.multi_team {
            score += risk.multi_team_weight;
        }
        if self.architecture_impact {
            score += risk.architecture_weight;
        }
        self.risk_score = score.clamp(0.0, 1.0);
        self.risk_score
    }

    /// Explicit technologies followed by the components of the selected
    /// stack in project data, deduplicated case-insensitively.
    pub fn technologies(&self) -> Vec<String> {
        let from_stack = self
            .project_data
            .get(TECH_STACK_FIELD)
            .and_then(|v| v.as_str())
            .map(|stack| stack.split(['+', ',']).map(str::trim).filter(|t| !t.is_empty()).map(String::from).collect())
            .unwrap_or_else(Vec::new);

        let mut all: Vec<String> = Vec::new();
        for tech in self.technologies.iter().cloned().chain(from_stack) {
            if !all.iter().any(|t| t.eq_ignore_ascii_case(&tech)) {
                all.push(tech);
            }
        }
        all
    }

    /// Snapshot handed to the generation pipeline for one step.
    pub fn generation_context(&self, step: &WorkflowStep) -> GenerationContext {
        GenerationContext {
            feature_name: self.feature_name.clone(),
            feature_slug: self.feature_slug.clone(),
            feature_dir: self.feature_dir.clone(),
            step: step.number.clone(),
            phase: step.phase.clone(),
            project_data: self.project_data.clone(),
            previous_outputs: self.outputs.clone(),
        }
    }

    /// Record a completed step's artifact.
    pub fn record_output(&mut self, step: &str, relative_path: &str) {
        self.outputs.insert(step.to_string(), relative_path.to_string());
    }
}

/// Lowercase, hyphen-separated slug. Empty input gives "feature".
pub fn slugify(name: &str) -> String {
    let mut slug = String::with_capacity(name.len());
    for c in name.trim().chars() {
        if c.is_alphanumeric() {
            slug.extend(c.to_lowercase());
        } else if !slug.ends_with('-') && !slug.is_empty() {
            slug.push('-');
        }
    }
    let slug = slug.trim_end_matches('-');
    if slug.is_empty() {
        "feature".to_string()
    } else {
        slug.to_string()
    }
}

/// Most recent existing feature directory for a slug, named either
/// `<slug>` or `<YYYY-MM-DD>-<slug>`.
pub fn find_feature_dir(features_root: &Path, slug: &str) -> Option<PathBuf> {
    let suffix = format!("-{slug}");
    let mut matches: Vec<PathBuf> = std::fs::read_dir(features_root)
        .ok()?
        .flatten()
        .filter(|entry| entry.file_type().is_ok_and(|t| t.is_dir()))
        .filter(|entry| {
            let name = entry.file_name().to_string_lossy().into_owned();
            name == slug || (name.ends_with(&suffix) && is_date_prefixed(&name[..name.len() - suffix.len()]))
        })
        .map(|entry| entry.path())
        .collect();
    matches.sort();
    matches.pop()
}

fn is_date_prefixed(prefix: &str) -> bool {
    chrono::NaiveDate::parse_from_str(prefix, "%Y-%m-%d").is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> ExecutionContext {
        ExecutionContext::new("Invoice Export", AutomationMode::Guided, Path::new("/tmp/project"), Path::new("features"))
    }

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Invoice Export"), "invoice-export");
        assert_eq!(slugify("  OAuth2 / SSO login!  "), "oauth2-sso-login");
        assert_eq!(slugify("***"), "feature");
        assert_eq!(slugify(""), "feature");
    }

    #[test]
    fn test_feature_dir_is_dated() {
        let ctx = context();
        let name = ctx.feature_dir.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.ends_with("-invoice-export"));
        assert!(is_date_prefixed(&name[..10]));
        assert!(ctx.feature_dir.starts_with("/tmp/project/features"));
    }

    #[test]
    fn test_assess_risk() {
        let risk = RiskConfig::default();
        let mut ctx = context();
        assert!((ctx.assess_risk(&risk) - 0.3).abs() < 1e-9);

        let mut ctx = context()
            .with_compliance(Some(ComplianceFramework::Gdpr))
            .with_multi_team(true)
            .with_architecture_impact(true);
        assert!((ctx.assess_risk(&risk) - 0.8).abs() < 1e-9);

        let heavy = RiskConfig { base_score: 0.9, ..RiskConfig::default() };
        assert!((ctx.assess_risk(&heavy) - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_technologies_merge_stack_field() {
        let mut data = ProjectData::new();
        data.insert(TECH_STACK_FIELD.to_string(), json!("React + Node.js, PostgreSQL"));
        let ctx = context().with_technologies(vec!["react".to_string(), "Redis".to_string()]).with_project_data(data);
        assert_eq!(ctx.technologies(), vec!["react", "Redis", "Node.js", "PostgreSQL"]);
    }

    #[test]
    fn test_compliance_parse() {
        assert_eq!("soc2".parse::<ComplianceFramework>().unwrap(), ComplianceFramework::Soc2);
        assert_eq!("ISO-27001".parse::<ComplianceFramework>().unwrap(), ComplianceFramework::Iso27001);
        assert!("fedramp".parse::<ComplianceFramework>().is_err());
    }

    #[test]
    fn test_find_feature_dir_picks_latest() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("2026-01-02-invoice-export")).unwrap();
        std::fs::create_dir(root.path().join("2026-03-04-invoice-export")).unwrap();
        std::fs::create_dir(root.path().join("2026-05-06-other")).unwrap();
        std::fs::create_dir(root.path().join("legacy-invoice-export")).unwrap();

        let found = find_feature_dir(root.path(), "invoice-export").unwrap();
        assert!(found.ends_with("2026-03-04-invoice-export"));
        assert!(find_feature_dir(root.path(), "missing").is_none());
        assert!(find_feature_dir(&root.path().join("nope"), "invoice-export").is_none());
    }
}
