use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Optional settings file read from the working directory.
pub const CONFIG_FILE: &str = "kwsearch.toml";

/// Process settings, resolved once at startup and immutable afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: PathBuf,
    pub collection_name: String,
    #[serde(default = "default_croissant_dir")]
    pub croissant_dir: String,
    #[serde(default = "default_index_dir")]
    pub index_dir: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default = "default_min_score")]
    pub min_score: f32,
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
}

fn default_croissant_dir() -> String { "croissant".to_string() }
fn default_index_dir() -> String { "lucene".to_string() }
fn default_port() -> u16 { 8001 }
fn default_max_results() -> usize { 100_000 }
fn default_min_score() -> f32 { 1.0 }
fn default_chunk_size() -> usize { 1024 }

impl Settings {
    /// Merges `kwsearch.toml`, then `DATA_DIR`/`COLLECTION_NAME`/`CROISSANT_DIR`,
    /// then `LUCENE_*` variables (later sources win).
    pub fn load() -> Result<Self> {
        Self::from_figment(Self::figment())
    }

    pub fn figment() -> Figment {
        Figment::new()
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(&["DATA_DIR", "COLLECTION_NAME", "CROISSANT_DIR"]))
            .merge(Env::prefixed("LUCENE_").map(|key| {
                // Keys arrive with their original case, e.g. `DIR`.
                if key.as_str().eq_ignore_ascii_case("dir") { "index_dir".into() } else { key.into() }
            }))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let mut settings: Self = figment
            .extract()
            .map_err(|e| Error::MissingConfig(e.to_string()))?;
        settings.data_dir = expand_path(settings.data_dir.to_string_lossy());
        settings.validate()?;
        tracing::debug!("Resolved settings: {:?}", settings);
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.collection_name.trim().is_empty() {
            return Err(Error::InvalidConfig("COLLECTION_NAME must not be empty".to_string()));
        }
        if self.max_results == 0 {
            return Err(Error::InvalidConfig("max_results must be greater than 0".to_string()));
        }
        if self.chunk_size == 0 {
            return Err(Error::InvalidConfig("chunk_size must be greater than 0".to_string()));
        }
        if !self.min_score.is_finite() {
            return Err(Error::InvalidConfig(format!("min_score must be finite, got {}", self.min_score)));
        }
        Ok(())
    }

    pub fn collection_path(&self) -> PathBuf {
        self.data_dir.join(&self.collection_name)
    }

    /// `DATA_DIR/COLLECTION_NAME/<index_dir>`
    pub fn index_path(&self) -> PathBuf {
        resolve_with_base(&self.collection_path(), &self.index_dir)
    }

    /// `DATA_DIR/COLLECTION_NAME/<croissant_dir>`
    pub fn croissant_path(&self) -> PathBuf {
        resolve_with_base(&self.collection_path(), &self.croissant_dir)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
