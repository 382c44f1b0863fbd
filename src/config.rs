use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::archive::ArtifactLayout;
use crate::fetch::BROWSER_USER_AGENT;

const ENV_PREFIX: &str = "SPECMON";

/// One monitored product page. `url` is the key into the baseline store.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Target {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub targets: Vec<Target>,
    #[serde(default)]
    pub output: OutputSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub http: HttpSettings,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OutputSettings {
    pub specs_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub diff_dir: PathBuf,
    pub summary_dir: PathBuf,
}

impl Default for OutputSettings {
    fn default() -> Self {
        Self {
            specs_dir: "Specifications".into(),
            archive_dir: "Archives".into(),
            diff_dir: "Diff_Reports".into(),
            summary_dir: "Reports".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub path: PathBuf,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            path: "monitor_baselines.json".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpSettings {
    pub timeout_secs: u64,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            user_agent: BROWSER_USER_AGENT.to_string(),
        }
    }
}

fn default_concurrency() -> usize {
    4
}

impl Settings {
    /// Layer the config file with `SPECMON__*` environment overrides.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()
            .with_context(|| format!("Failed to load config {:?}", path))?;
        let mut settings: Settings = raw
            .try_deserialize()
            .with_context(|| format!("Invalid config {:?}", path))?;
        settings.concurrency = settings.concurrency.max(1);
        Ok(settings)
    }

    pub fn layout(&self) -> ArtifactLayout {
        ArtifactLayout::new(
            &self.output.specs_dir,
            &self.output.archive_dir,
            &self.output.diff_dir,
        )
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs.max(1))
    }
}
