use serde::Deserialize;

use crate::cache::{CacheMode, InsertPolicy};
use crate::error::MapError;

/// Root configuration, parsed from TOML.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MapperConfig {
    #[serde(default)]
    pub cache: CacheConfig,

    /// Map nested objects and differing collections. With `false` only
    /// fields whose types match (modulo `Option`/`Box`) are copied.
    #[serde(default = "default_allow_recursion")]
    pub allow_recursion: bool,
}

fn default_allow_recursion() -> bool {
    true
}

impl Default for MapperConfig {
    fn default() -> Self {
        Self {
            cache: CacheConfig::default(),
            allow_recursion: default_allow_recursion(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheModeName {
    #[default]
    Unbounded,
    Bounded,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Deserialize)]
pub struct CacheConfig {
    #[serde(default)]
    pub mode: CacheModeName,
    /// Required with `mode = "bounded"`.
    #[serde(default)]
    pub capacity: Option<usize>,
    #[serde(default)]
    pub policy: InsertPolicy,
}

impl CacheConfig {
    /// Validate into the runtime cache mode.
    pub fn cache_mode(&self) -> Result<CacheMode, MapError> {
        match (self.mode, self.capacity) {
            (CacheModeName::Unbounded, None) => Ok(CacheMode::Unbounded),
            (CacheModeName::Unbounded, Some(_)) => Err(MapError::Configuration(
                "cache.capacity is only valid with mode = \"bounded\"".to_string(),
            )),
            (CacheModeName::Bounded, None) => Err(MapError::Configuration(
                "cache.capacity is required with mode = \"bounded\"".to_string(),
            )),
            (CacheModeName::Bounded, Some(0)) => Err(MapError::Configuration(
                "cache.capacity must be positive".to_string(),
            )),
            (CacheModeName::Bounded, Some(capacity)) => Ok(CacheMode::Bounded { capacity }),
        }
    }
}

impl MapperConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self, MapError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| MapError::Configuration(format!("{path}: {e}")))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(toml_str: &str) -> Result<Self, MapError> {
        toml::from_str(toml_str).map_err(|e| MapError::Configuration(e.to_string()))
    }
}
