//! YAML configuration: cities, technologies, fetch parameters and output.
//!
//! ```yaml
//! cities:
//!   - { name: MOSCOW, code: 1 }
//!   - { name: KRASNODAR, code: 53, enabled: false }
//! technologies:
//!   - { name: Golang, search: golang, category: backend }
//! parser:
//!   max_concurrency: 4
//!   retry_count: 2
//!   url_template: "https://hh.ru/search/vacancy?text={search}&area={city}"
//! output:
//!   directory: data
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::AppError;
use crate::fetch::UrlTemplate;
use crate::output::OutputFormat;
use crate::pacing::Pacing;
use crate::report::TOTAL_KEY;

/// File name looked up in each search directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Environment variable pointing at a config file or a directory holding one.
pub const CONFIG_PATH_ENV: &str = "TECHDEMAND_CONFIG_PATH";

const MAX_CONFIG_BYTES: u64 = 1_048_576;

fn enabled_by_default() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CityConfig {
    pub name: String,
    /// Area code substituted into the query URL.
    pub code: u32,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TechnologyConfig {
    /// Display name, used as the key in reports.
    pub name: String,
    /// Search term substituted into the query URL.
    pub search: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub category: String,
    #[serde(default = "enabled_by_default")]
    pub enabled: bool,
}

/// Fetch parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    #[serde(alias = "max_goroutines")]
    pub max_concurrency: usize,
    pub timeout_seconds: u64,
    /// Total attempts per task.
    pub retry_count: u32,
    pub rate_limit_ms: u64,
    pub pacing: Pacing,
    #[serde(alias = "url_search_vacancies")]
    pub url_template: String,
    pub user_agent: String,
    /// Produce a report even if some tasks ended in a fetch failure.
    pub allow_partial: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 4,
            timeout_seconds: 10,
            retry_count: 2,
            rate_limit_ms: 200,
            pacing: Pacing::Off,
            url_template: "https://hh.ru/search/vacancy?text={search}&area={city}".to_string(),
            user_agent: concat!("techdemand/", env!("CARGO_PKG_VERSION")).to_string(),
            allow_partial: false,
        }
    }
}

impl ParserConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }

    pub fn rate_limit(&self) -> Duration {
        Duration::from_millis(self.rate_limit_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub directory: PathBuf,
    /// Prefix of the text and CSV file names.
    pub filename_prefix: String,
    pub formats: Vec<OutputFormat>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("data"),
            filename_prefix: "stats".to_string(),
            formats: vec![OutputFormat::Json, OutputFormat::Txt],
        }
    }
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub cities: Vec<CityConfig>,
    #[serde(default)]
    pub technologies: Vec<TechnologyConfig>,
    #[serde(default)]
    pub parser: ParserConfig,
    #[serde(default)]
    pub output: OutputConfig,
}

impl AppConfig {
    pub fn from_yaml_str(content: &str) -> Result<Self, AppError> {
        serde_yaml::from_str(content)
            .map_err(|e| AppError::ConfigError(format!("Invalid config YAML: {e}")))
    }

    pub fn from_path(path: &Path) -> Result<Self, AppError> {
        let metadata = std::fs::metadata(path).map_err(|e| {
            AppError::ConfigError(format!("Cannot read config {}: {e}", path.display()))
        })?;
        if metadata.len() > MAX_CONFIG_BYTES {
            return Err(AppError::ConfigError(format!(
                "Config file {} exceeds 1MB limit",
                path.display()
            )));
        }
        let content = std::fs::read_to_string(path)?;
        tracing::debug!(path = %path.display(), "Loaded config file");
        Self::from_yaml_str(&content)
    }

    /// Find the config file: `TECHDEMAND_CONFIG_PATH` first, then the
    /// `configs` directories around the working directory and the executable.
    pub fn discover() -> Result<PathBuf, AppError> {
        let cwd = std::env::current_dir().ok();
        let exe_dir = std::env::current_exe()
            .ok()
            .and_then(|p| p.parent().map(Path::to_path_buf));
        let env_path = std::env::var_os(CONFIG_PATH_ENV).map(PathBuf::from);

        let candidates = candidate_paths(cwd.as_deref(), exe_dir.as_deref(), env_path.as_deref());
        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .ok_or_else(|| {
                AppError::ConfigError(format!(
                    "No {CONFIG_FILE_NAME} found (searched {} locations); pass --config or set {CONFIG_PATH_ENV}",
                    candidates.len()
                ))
            })
    }

    pub fn enabled_cities(&self) -> Vec<CityConfig> {
        self.cities.iter().filter(|c| c.enabled).cloned().collect()
    }

    pub fn enabled_technologies(&self) -> Vec<TechnologyConfig> {
        self.technologies
            .iter()
            .filter(|t| t.enabled)
            .cloned()
            .collect()
    }

    pub fn validate(&self) -> Result<(), AppError> {
        let cities = self.enabled_cities();
        let technologies = self.enabled_technologies();

        if cities.is_empty() {
            return Err(AppError::ConfigError("No enabled cities".into()));
        }
        if technologies.is_empty() {
            return Err(AppError::ConfigError("No enabled technologies".into()));
        }
        if self.parser.max_concurrency == 0 {
            return Err(AppError::ConfigError(
                "parser.max_concurrency must be at least 1".into(),
            ));
        }
        if self.parser.retry_count == 0 {
            return Err(AppError::ConfigError(
                "parser.retry_count must be at least 1".into(),
            ));
        }
        UrlTemplate::parse(&self.parser.url_template)?;

        let mut codes = HashSet::new();
        for city in &cities {
            if !codes.insert(city.code) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate city code {} ({})",
                    city.code, city.name
                )));
            }
        }
        let mut names = HashSet::new();
        for tech in &technologies {
            if !names.insert(tech.name.as_str()) {
                return Err(AppError::ConfigError(format!(
                    "Duplicate technology name '{}'",
                    tech.name
                )));
            }
            if tech.name == TOTAL_KEY {
                return Err(AppError::ConfigError(format!(
                    "Technology name '{TOTAL_KEY}' is reserved for the grand total"
                )));
            }
            if tech.search.trim().is_empty() {
                return Err(AppError::ConfigError(format!(
                    "Technology '{}' has an empty search term",
                    tech.name
                )));
            }
        }

        Ok(())
    }

    /// Executor parameters derived from the `parser` section.
    pub fn run_config(&self) -> Result<RunConfig, AppError> {
        Ok(RunConfig {
            url_template: UrlTemplate::parse(&self.parser.url_template)?,
            max_concurrency: self.parser.max_concurrency,
            max_attempts: self.parser.retry_count,
            pacing: self.parser.pacing,
            rate_limit: self.parser.rate_limit(),
            ..RunConfig::default()
        })
    }
}

/// Search order for the config file.
fn candidate_paths(
    cwd: Option<&Path>,
    exe_dir: Option<&Path>,
    env_path: Option<&Path>,
) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(env_path) = env_path {
        if env_path.extension().is_some_and(|ext| ext == "yaml" || ext == "yml") {
            paths.push(env_path.to_path_buf());
        } else {
            paths.push(env_path.join(CONFIG_FILE_NAME));
        }
    }
    for base in [cwd, exe_dir].into_iter().flatten() {
        paths.push(base.join("configs").join(CONFIG_FILE_NAME));
        paths.push(base.join("..").join("configs").join(CONFIG_FILE_NAME));
    }
    if let Some(cwd) = cwd {
        paths.push(cwd.join(CONFIG_FILE_NAME));
    }
    paths
}

/// Parameters handed to the executor for one run.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub run_id: String,
    pub url_template: UrlTemplate,
    pub max_concurrency: usize,
    /// Total attempts per task.
    pub max_attempts: u32,
    pub pacing: Pacing,
    pub rate_limit: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            run_id: format!("run-{}", &Uuid::new_v4().to_string()[..8]),
            url_template: UrlTemplate::default(),
            max_concurrency: 4,
            max_attempts: 2,
            pacing: Pacing::Off,
            rate_limit: Duration::from_millis(200),
        }
    }
}

impl RunConfig {
    pub fn new(url_template: UrlTemplate) -> Self {
        Self {
            url_template,
            ..Self::default()
        }
    }

    pub fn with_run_id(mut self, id: impl Into<String>) -> Self {
        self.run_id = id.into();
        self
    }

    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max;
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_pacing(mut self, pacing: Pacing, rate_limit: Duration) -> Self {
        self.pacing = pacing;
        self.rate_limit = rate_limit;
        self
    }
}
