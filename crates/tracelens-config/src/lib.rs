//! Configuration for the tracelens server: a JSON file with per-field defaults,
//! environment overrides, and the category colour palette.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use tracelens_core::{Category, ThemeTokens};
use tracing::{debug, info};

/// Path of the JSON config file.
pub const CONFIG_PATH_VAR: &str = "TRACELENS_CONFIG";
/// Overrides [`TraceLensConfig::bind_addr`].
pub const BIND_ADDR_VAR: &str = "TRACELENS_BIND_ADDR";
/// Overrides [`TraceLensConfig::database_path`].
pub const DATABASE_VAR: &str = "TRACELENS_DATABASE";

// ─────────────────────────────────────────────────────────────────────────────
// Error
// ─────────────────────────────────────────────────────────────────────────────

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),
}

// ─────────────────────────────────────────────────────────────────────────────
// Server Config
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceLensConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    #[serde(default = "default_database_path")]
    pub database_path: PathBuf,
    /// JSON array of span records loaded into the store at startup.
    #[serde(default)]
    pub seed_path: Option<PathBuf>,
    /// Root spans per page when the request gives no limit.
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// Upper bound on spans fetched for one trace.
    #[serde(default = "default_trace_span_limit")]
    pub trace_span_limit: usize,
    #[serde(default)]
    pub display_utc_offset_minutes: i32,
    /// chrono format string for displayed start/end times.
    #[serde(default = "default_timestamp_format")]
    pub timestamp_format: String,
    #[serde(default)]
    pub theme: ThemePalette,
}

fn default_bind_addr() -> String {
    "0.0.0.0:8000".into()
}

fn default_database_path() -> PathBuf {
    PathBuf::from("data/traces.db")
}

fn default_page_size() -> usize {
    50
}

fn default_trace_span_limit() -> usize {
    1000
}

fn default_timestamp_format() -> String {
    "%Y-%m-%d %H:%M:%S%.3f".into()
}

impl Default for TraceLensConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            database_path: default_database_path(),
            seed_path: None,
            page_size: default_page_size(),
            trace_span_limit: default_trace_span_limit(),
            display_utc_offset_minutes: 0,
            timestamp_format: default_timestamp_format(),
            theme: ThemePalette::default(),
        }
    }
}

impl TraceLensConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    /// Loads `.env`, then the file named by `TRACELENS_CONFIG` (defaults when unset),
    /// then applies the individual variable overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => {
                info!("Loading config from {}", path);
                Self::load(Path::new(&path))?
            }
            Err(_) => {
                debug!("{} not set, using default config", CONFIG_PATH_VAR);
                Self::default()
            }
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// Applies the variable overrides read through `lookup`; empty values are ignored.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = non_empty(BIND_ADDR_VAR) {
            self.bind_addr = addr;
        }
        if let Some(path) = non_empty(DATABASE_VAR) {
            self.database_path = PathBuf::from(path);
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Theme Palette
// ─────────────────────────────────────────────────────────────────────────────

/// Category colours keyed by category id (`"LLM"`, `"TOOL"`, ...).
///
/// Categories missing from the map use the built-in palette.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ThemePalette {
    colors: HashMap<Category, String>,
}

impl ThemePalette {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_color(mut self, category: Category, color: impl Into<String>) -> Self {
        self.colors.insert(category, color.into());
        self
    }
}

impl ThemeTokens for ThemePalette {
    fn color(&self, category: Category) -> String {
        self.colors
            .get(&category)
            .cloned()
            .unwrap_or_else(|| fallback_color(category).to_string())
    }
}

fn fallback_color(category: Category) -> &'static str {
    match category {
        Category::Agent => "#54B399",
        Category::Llm => "#6092C0",
        Category::Tool => "#D36086",
        Category::Content => "#9170B8",
        Category::Embeddings => "#CA8EAE",
        Category::Retrieval => "#D6BF57",
        Category::Other => "#98A2B3",
    }
}
