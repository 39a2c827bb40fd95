//! Loader configuration
//!
//! Loaded from a JSON file or from `CEGS_*` environment variables.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{EgsError, Result};
use crate::{DEFAULT_PREFETCH_CAPACITY, DEFAULT_SUBSAMPLING_FACTOR};

/// Everything needed to build an [`crate::EgsDataLoader`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderConfig {
    /// Manifest file or directory of `cegs.*.scp` manifests
    pub source: PathBuf,
    /// Left context frames of the acoustic model
    pub left_context: usize,
    /// Right context frames of the acoustic model
    pub right_context: usize,
    /// Output frame subsampling factor (1 or 3)
    pub subsampling_factor: usize,
    /// References per batch group
    pub batch_size: usize,
    /// Number of ranks; required when `local_rank` is set
    pub world_size: Option<usize>,
    /// This process's rank
    pub local_rank: Option<usize>,
    /// Shuffle seed. Unset means fresh entropy for non-distributed loading
    /// and 0 for distributed loading.
    pub seed: Option<u64>,
    /// Collated groups buffered ahead of the consumer
    pub prefetch_capacity: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            source: PathBuf::new(),
            left_context: 0,
            right_context: 0,
            subsampling_factor: DEFAULT_SUBSAMPLING_FACTOR,
            batch_size: 1,
            world_size: None,
            local_rank: None,
            seed: None,
            prefetch_capacity: DEFAULT_PREFETCH_CAPACITY,
        }
    }
}

impl LoaderConfig {
    pub fn new(source: impl Into<PathBuf>, left_context: usize, right_context: usize) -> Self {
        Self {
            source: source.into(),
            left_context,
            right_context,
            ..Self::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| EgsError::configuration(format!("invalid loader config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| EgsError::io(path.display().to_string(), e))?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| EgsError::configuration(format!("cannot serialize loader config: {}", e)))
    }

    /// Read `CEGS_SOURCE`, `CEGS_LEFT_CONTEXT`, `CEGS_RIGHT_CONTEXT`,
    /// `CEGS_WORLD_SIZE`, `CEGS_LOCAL_RANK` and `CEGS_SEED`
    pub fn from_env() -> Result<Self> {
        let source = std::env::var("CEGS_SOURCE")
            .map_err(|_| EgsError::configuration("CEGS_SOURCE is not set"))?;
        let config = Self {
            source: PathBuf::from(source),
            left_context: env_parse("CEGS_LEFT_CONTEXT")?.unwrap_or(0),
            right_context: env_parse("CEGS_RIGHT_CONTEXT")?.unwrap_or(0),
            world_size: env_parse("CEGS_WORLD_SIZE")?,
            local_rank: env_parse("CEGS_LOCAL_RANK")?,
            seed: env_parse("CEGS_SEED")?,
            ..Self::default()
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.source.as_os_str().is_empty() {
            return Err(EgsError::configuration("source is empty"));
        }
        if self.subsampling_factor != 1 && self.subsampling_factor != 3 {
            return Err(EgsError::configuration(format!(
                "subsampling factor must be 1 or 3, got {}",
                self.subsampling_factor
            )));
        }
        if self.batch_size == 0 {
            return Err(EgsError::configuration("batch size must be positive"));
        }
        if self.prefetch_capacity == 0 {
            return Err(EgsError::configuration("prefetch capacity must be positive"));
        }
        validate_rank(self.world_size, self.local_rank)?;
        Ok(())
    }
}

/// `local_rank` needs a positive `world_size` larger than it
pub(crate) fn validate_rank(world_size: Option<usize>, local_rank: Option<usize>) -> Result<()> {
    let Some(rank) = local_rank else {
        return Ok(());
    };
    match world_size {
        None => Err(EgsError::configuration(
            "local_rank is set but world_size is not",
        )),
        Some(0) => Err(EgsError::configuration("world_size must be positive")),
        Some(world) if rank >= world => Err(EgsError::configuration(format!(
            "local_rank {} out of range for world_size {}",
            rank, world
        ))),
        Some(_) => Ok(()),
    }
}

fn env_parse<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| EgsError::configuration(format!("{}={:?}: {}", name, value, e))),
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = LoaderConfig::new("egs", 29, 29);
        assert_eq!(config.subsampling_factor, 3);
        assert_eq!(config.batch_size, 1);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_json_fills_defaults() {
        let config = LoaderConfig::from_json(r#"{"source": "egs", "left_context": 4}"#).unwrap();
        assert_eq!(config.left_context, 4);
        assert_eq!(config.prefetch_capacity, DEFAULT_PREFETCH_CAPACITY);
    }

    #[test]
    fn test_rank_validation() {
        assert!(validate_rank(None, None).is_ok());
        assert!(validate_rank(Some(4), None).is_ok());
        assert!(validate_rank(Some(4), Some(3)).is_ok());
        assert!(validate_rank(None, Some(0)).is_err());
        assert!(validate_rank(Some(0), Some(0)).is_err());
        assert!(validate_rank(Some(2), Some(2)).is_err());
    }

    #[test]
    fn test_bad_subsampling() {
        let mut config = LoaderConfig::new("egs", 0, 0);
        config.subsampling_factor = 2;
        assert!(matches!(
            config.validate(),
            Err(EgsError::Configuration { .. })
        ));
    }
}
