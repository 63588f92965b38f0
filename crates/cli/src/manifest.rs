use anyhow::{bail, Context, Result};
use crawler_coordinator::CoordinatorConfig;
use crawler_workspace::Language;
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

pub const MANIFEST_FILE: &str = "crawler.toml";

/// Parsed `crawler.toml`.
///
/// ```toml
/// [[project]]
/// name = "core"
/// dir = "crates/core"
/// language = "rust"
///
/// [[project]]
/// name = "app"
/// dir = "crates/app"
/// references = ["core"]
///
/// [coordinator]
/// normal_backoff_ms = 500
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(rename = "project", default)]
    pub projects: Vec<ProjectEntry>,
    #[serde(default)]
    pub coordinator: Option<CoordinatorConfig>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ProjectEntry {
    pub name: String,
    /// Directory relative to the manifest
    pub dir: PathBuf,
    #[serde(default = "default_language")]
    pub language: String,
    /// Assembly name other projects' `friends` refer to; defaults to `name`
    #[serde(default)]
    pub assembly: Option<String>,
    #[serde(default)]
    pub references: Vec<String>,
    /// Assembly names granted access to this project's internals
    #[serde(default)]
    pub friends: Vec<String>,
}

fn default_language() -> String {
    Language::Rust.as_str().to_string()
}

impl ProjectEntry {
    pub fn language(&self) -> Result<Language> {
        Language::from_name(&self.language).with_context(|| {
            format!(
                "project '{}': unknown language '{}'",
                self.name, self.language
            )
        })
    }
}

impl Manifest {
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let manifest: Self = toml::from_str(raw).context("Failed to parse manifest")?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_toml_str(&raw).with_context(|| format!("Invalid manifest {}", path.display()))
    }

    pub fn validate(&self) -> Result<()> {
        if self.projects.is_empty() {
            bail!("manifest declares no [[project]]");
        }
        let mut names = HashSet::new();
        for project in &self.projects {
            if !names.insert(project.name.as_str()) {
                bail!("duplicate project '{}'", project.name);
            }
            project.language()?;
        }
        for project in &self.projects {
            for reference in &project.references {
                if reference == &project.name {
                    bail!("project '{}' references itself", project.name);
                }
                if !names.contains(reference.as_str()) {
                    bail!(
                        "project '{}' references unknown project '{reference}'",
                        project.name
                    );
                }
            }
        }
        if let Some(config) = &self.coordinator {
            config.validate()?;
        }
        Ok(())
    }

    /// Coordinator settings for a long-running host: the `[coordinator]`
    /// table (or defaults) with environment overrides applied
    pub fn coordinator_config(&self) -> Result<CoordinatorConfig> {
        let config = self.coordinator.clone().unwrap_or_default();
        Ok(config.with_env_overrides()?)
    }
}
