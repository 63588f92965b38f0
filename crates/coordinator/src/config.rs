use crate::error::{CoordinatorError, Result};
use crate::tier::Tier;
use crawler_syntax::DEFAULT_TREE_CACHE_CAPACITY;
use crawler_workspace::Language;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

/// Environment override for the normal tier backoff window (milliseconds)
pub const ENV_BACKOFF_MS: &str = "CRAWLER_BACKOFF_MS";
/// Environment override for [`PropagationMode`] (`direct` | `transitive`)
pub const ENV_PROPAGATION: &str = "CRAWLER_PROPAGATION";

/// How far a public or unresolvable change ripples through the project graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropagationMode {
    /// Owning project plus projects referencing it directly
    #[default]
    Direct,
    /// Owning project plus everything that reaches it through references
    Transitive,
}

impl PropagationMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(Self::Direct),
            "transitive" => Some(Self::Transitive),
            _ => None,
        }
    }
}

/// What happens when an analyzer pass fails
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FaultPolicy {
    /// Finish the pass, then halt the coordinator and surface the failure
    FailFast,
    /// Report a synthetic failure diagnostic and keep going
    Diagnostic,
}

impl Default for FaultPolicy {
    fn default() -> Self {
        if cfg!(debug_assertions) {
            Self::FailFast
        } else {
            Self::Diagnostic
        }
    }
}

/// Which documents background analysis covers for a language
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackgroundAnalysisScope {
    ActiveFile,
    OpenFilesAndProjects,
    #[default]
    FullSolution,
}

/// Coordinator tuning knobs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Quiet period before the active-file tier runs
    pub active_file_backoff_ms: u64,
    /// Quiet period before the normal (document) tier runs
    pub normal_backoff_ms: u64,
    /// Quiet period before the low (project) tier runs
    pub low_backoff_ms: u64,
    /// Quiet period before propagation decisions run
    pub propagation_backoff_ms: u64,
    /// Lower bound for one backoff sleep
    pub min_backoff_slice_ms: u64,
    /// How long a blocking shutdown waits for in-flight work
    pub shutdown_grace_ms: u64,
    pub propagation: PropagationMode,
    pub fault_policy: FaultPolicy,
    pub default_scope: BackgroundAnalysisScope,
    /// Per-language scope overrides
    pub analysis_scope: BTreeMap<Language, BackgroundAnalysisScope>,
    /// Parsed document versions kept for edit classification
    pub tree_cache_capacity: usize,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            active_file_backoff_ms: 100,
            normal_backoff_ms: 1500,
            low_backoff_ms: 3000,
            propagation_backoff_ms: 500,
            min_backoff_slice_ms: 50,
            shutdown_grace_ms: 5000,
            propagation: PropagationMode::default(),
            fault_policy: FaultPolicy::default(),
            default_scope: BackgroundAnalysisScope::default(),
            analysis_scope: BTreeMap::new(),
            tree_cache_capacity: DEFAULT_TREE_CACHE_CAPACITY,
        }
    }
}

impl CoordinatorConfig {
    /// One-shot runs: no debounce, everything analyzed
    pub fn for_batch() -> Self {
        Self {
            active_file_backoff_ms: 0,
            normal_backoff_ms: 0,
            low_backoff_ms: 0,
            propagation_backoff_ms: 0,
            min_backoff_slice_ms: 1,
            fault_policy: FaultPolicy::Diagnostic,
            ..Default::default()
        }
    }

    /// Short windows that keep timing tests fast but ordered
    pub fn for_tests() -> Self {
        Self {
            active_file_backoff_ms: 10,
            normal_backoff_ms: 20,
            low_backoff_ms: 30,
            propagation_backoff_ms: 10,
            min_backoff_slice_ms: 1,
            shutdown_grace_ms: 1000,
            fault_policy: FaultPolicy::Diagnostic,
            ..Default::default()
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)
            .map_err(|e| CoordinatorError::invalid_config(format!("{e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml_str(&raw)
    }

    /// Apply `CRAWLER_BACKOFF_MS` / `CRAWLER_PROPAGATION` from the process environment
    pub fn with_env_overrides(self) -> Result<Self> {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    pub(crate) fn with_overrides_from(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(raw) = lookup(ENV_BACKOFF_MS) {
            self.normal_backoff_ms = raw.trim().parse().map_err(|_| {
                CoordinatorError::invalid_config(format!("{ENV_BACKOFF_MS}={raw} is not a number"))
            })?;
        }
        if let Some(raw) = lookup(ENV_PROPAGATION) {
            self.propagation = PropagationMode::parse(&raw).ok_or_else(|| {
                CoordinatorError::invalid_config(format!(
                    "{ENV_PROPAGATION}={raw} (expected direct|transitive)"
                ))
            })?;
        }
        self.validate()?;
        Ok(self)
    }

    pub fn validate(&self) -> Result<()> {
        if self.min_backoff_slice_ms == 0 {
            return Err(CoordinatorError::invalid_config(
                "min_backoff_slice_ms must be > 0",
            ));
        }
        if self.tree_cache_capacity == 0 {
            return Err(CoordinatorError::invalid_config(
                "tree_cache_capacity must be > 0",
            ));
        }
        Ok(())
    }

    pub fn backoff(&self, tier: Tier) -> Duration {
        Duration::from_millis(match tier {
            Tier::ActiveFile => self.active_file_backoff_ms,
            Tier::Normal => self.normal_backoff_ms,
            Tier::Low => self.low_backoff_ms,
            Tier::Propagation => self.propagation_backoff_ms,
        })
    }

    pub fn min_backoff_slice(&self) -> Duration {
        Duration::from_millis(self.min_backoff_slice_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }

    pub fn scope_for(&self, language: Language) -> BackgroundAnalysisScope {
        self.analysis_scope
            .get(&language)
            .copied()
            .unwrap_or(self.default_scope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_documented_windows() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.backoff(Tier::ActiveFile), Duration::from_millis(100));
        assert_eq!(config.backoff(Tier::Normal), Duration::from_millis(1500));
        assert_eq!(config.backoff(Tier::Low), Duration::from_millis(3000));
        assert_eq!(config.shutdown_grace(), Duration::from_secs(5));
        assert_eq!(config.propagation, PropagationMode::Direct);
    }

    #[test]
    fn parses_partial_toml() {
        let config = CoordinatorConfig::from_toml_str(
            r#"
normal_backoff_ms = 250
propagation = "transitive"
fault_policy = "diagnostic"
default_scope = "open_files_and_projects"

[analysis_scope]
python = "active_file"
"#,
        )
        .unwrap();

        assert_eq!(config.normal_backoff_ms, 250);
        assert_eq!(config.low_backoff_ms, 3000);
        assert_eq!(config.propagation, PropagationMode::Transitive);
        assert_eq!(config.fault_policy, FaultPolicy::Diagnostic);
        assert_eq!(
            config.scope_for(Language::Python),
            BackgroundAnalysisScope::ActiveFile
        );
        assert_eq!(
            config.scope_for(Language::Rust),
            BackgroundAnalysisScope::OpenFilesAndProjects
        );
    }

    #[test]
    fn loads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("coordinator.toml");
        std::fs::write(&path, "low_backoff_ms = 900\nshutdown_grace_ms = 10\n").unwrap();

        let config = CoordinatorConfig::load(&path).unwrap();
        assert_eq!(config.low_backoff_ms, 900);
        assert_eq!(config.shutdown_grace(), Duration::from_millis(10));
        assert!(CoordinatorConfig::load(dir.path().join("missing.toml")).is_err());
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(CoordinatorConfig::from_toml_str("min_backoff_slice_ms = 0").is_err());
        assert!(CoordinatorConfig::from_toml_str("propagation = \"sideways\"").is_err());
    }

    #[test]
    fn env_overrides_apply() {
        let config = CoordinatorConfig::default()
            .with_overrides_from(|key| match key {
                ENV_BACKOFF_MS => Some("42".to_string()),
                ENV_PROPAGATION => Some("Transitive".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.normal_backoff_ms, 42);
        assert_eq!(config.propagation, PropagationMode::Transitive);

        let bad = CoordinatorConfig::default()
            .with_overrides_from(|key| (key == ENV_BACKOFF_MS).then(|| "soon".to_string()));
        assert!(bad.is_err());
    }
}
