use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DriftError;
use crate::types::RiskWeights;

/// Top-level configuration loaded from `.stagedrift.toml`.
///
/// Supports layered resolution: CLI flags > local config > defaults.
///
/// # Examples
///
/// ```
/// use stagedrift_core::DriftConfig;
///
/// let config = DriftConfig::default();
/// assert_eq!(config.pipeline.spec_file, "dvc.yaml");
/// assert_eq!(config.pipeline.code_suffix, ".py");
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DriftConfig {
    /// Where the pipeline description lives and how dependencies are classified.
    #[serde(default)]
    pub pipeline: PipelineConfig,
    /// Drift risk weights.
    #[serde(default)]
    pub risk: RiskWeights,
    /// Data-versioning cache puller.
    #[serde(default)]
    pub cache: CacheConfig,
    /// External tool invocation.
    #[serde(default)]
    pub tools: ToolsConfig,
    /// Report persistence.
    #[serde(default)]
    pub output: OutputConfig,
}

impl DriftConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Io`] if the file cannot be read,
    /// [`DriftError::Toml`] if the content is not valid TOML, or
    /// [`DriftError::Config`] if the values are inconsistent.
    pub fn from_file(path: &Path) -> Result<Self, DriftError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Toml`] if parsing fails, or
    /// [`DriftError::Config`] if validation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use stagedrift_core::DriftConfig;
    ///
    /// let toml = r#"
    /// [risk]
    /// rows = 0.25
    /// columns = 0.25
    /// duplicates = 0.25
    /// nulls = 0.25
    /// "#;
    /// let config = DriftConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.risk.duplicates, 0.25);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, DriftError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field invariants.
    ///
    /// # Errors
    ///
    /// Returns [`DriftError::Config`] on invalid weights, an empty cache
    /// command, or an empty pipeline file name.
    pub fn validate(&self) -> Result<(), DriftError> {
        self.risk.validate()?;
        if self.pipeline.spec_file.trim().is_empty() {
            return Err(DriftError::Config(
                "[pipeline] spec_file must not be empty".into(),
            ));
        }
        if self.cache.enabled && self.cache.command.is_empty() {
            return Err(DriftError::Config(
                "[cache] command must name a program when the cache is enabled".into(),
            ));
        }
        Ok(())
    }
}

/// Pipeline description settings.
///
/// # Examples
///
/// ```
/// use stagedrift_core::PipelineConfig;
///
/// let config = PipelineConfig::default();
/// assert_eq!(config.spec_file, "dvc.yaml");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline file, relative to the repository root (default: `dvc.yaml`).
    #[serde(default = "default_spec_file")]
    pub spec_file: String,
    /// Dependencies ending with this suffix are code (default: `.py`).
    #[serde(default = "default_code_suffix")]
    pub code_suffix: String,
}

fn default_spec_file() -> String {
    "dvc.yaml".into()
}

fn default_code_suffix() -> String {
    ".py".into()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            spec_file: default_spec_file(),
            code_suffix: default_code_suffix(),
        }
    }
}

/// Data-versioning cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Pull the cache after each checkout (default: true).
    #[serde(default = "default_cache_enabled")]
    pub enabled: bool,
    /// Program and arguments run in the workspace (default: `dvc pull`).
    #[serde(default = "default_cache_command")]
    pub command: Vec<String>,
}

fn default_cache_enabled() -> bool {
    true
}

fn default_cache_command() -> Vec<String> {
    vec!["dvc".into(), "pull".into()]
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_cache_enabled(),
            command: default_cache_command(),
        }
    }
}

/// External tool settings.
///
/// # Examples
///
/// ```
/// use stagedrift_core::ToolsConfig;
///
/// let tools = ToolsConfig::default();
/// assert_eq!(tools.git, "git");
/// assert_eq!(tools.timeout().map(|d| d.as_secs()), Some(600));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolsConfig {
    /// Git executable (default: `git`).
    #[serde(default = "default_git")]
    pub git: String,
    /// Per-invocation timeout in seconds; `0` disables it (default: 600).
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_git() -> String {
    "git".into()
}

fn default_timeout_secs() -> u64 {
    600
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            git: default_git(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl ToolsConfig {
    /// The timeout as a [`Duration`], or `None` when disabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

/// Report persistence settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Directory receiving one `<reference>.json` per comparison (default: `output`).
    #[serde(default = "default_output_dir")]
    pub dir: PathBuf,
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
        }
    }
}
