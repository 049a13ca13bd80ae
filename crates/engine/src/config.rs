//! Engine configuration, loaded from TOML.
//!
//! ```toml
//! flags = ["primary", "main"]
//! auto_assign = ["primary"]
//!
//! [store]
//! path = "gallery.db"
//! pool_size = 8
//! busy_timeout_ms = 5000
//!
//! [retry]
//! max_attempts = 3
//! base_delay_ms = 25
//! max_delay_ms = 1000
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use gallery_core::{FlagName, FlagRegistry, MAIN, PRIMARY};
use gallery_storage::StoreConfig;

use crate::error::EngineError;
use crate::retry::{RetryConfig, RetryPolicy};

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct GalleryConfig {
    pub store: StoreConfig,
    /// Recognized winner flags, highest presentation priority first.
    pub flags: Vec<String>,
    /// Flags handed to the first resource attached to a parent with no winner
    /// for that flag. `None` means every registered flag.
    pub auto_assign: Option<Vec<String>>,
    pub retry: RetryConfig,
}

impl Default for GalleryConfig {
    fn default() -> Self {
        Self {
            store: StoreConfig::default(),
            flags: vec![PRIMARY.to_string(), MAIN.to_string()],
            auto_assign: None,
            retry: RetryConfig::default(),
        }
    }
}

impl GalleryConfig {
    pub fn from_toml_str(contents: &str) -> Result<Self, EngineError> {
        let config: Self = toml::from_str(contents)
            .map_err(|e| EngineError::Config(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let contents = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("failed to read {}: {e}", path.display())))?;
        Self::from_toml_str(&contents)
    }

    pub fn validate(&self) -> Result<(), EngineError> {
        if self.store.pool_size == 0 {
            return Err(EngineError::Config("store.pool_size must be at least 1".into()));
        }
        let registry = self.registry()?;
        self.auto_assign_flags(&registry)?;
        Ok(())
    }

    pub fn registry(&self) -> Result<FlagRegistry, EngineError> {
        FlagRegistry::new(self.flags.iter().cloned())
            .map_err(|e| EngineError::Config(format!("flags: {e}")))
    }

    pub fn auto_assign_flags(&self, registry: &FlagRegistry) -> Result<Vec<FlagName>, EngineError> {
        match &self.auto_assign {
            None => Ok(registry.iter().cloned().collect()),
            Some(names) => names
                .iter()
                .map(|name| {
                    registry.resolve(name).map_err(|_| {
                        EngineError::Config(format!("auto_assign names unregistered flag {name:?}"))
                    })
                })
                .collect(),
        }
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry.clone().into()
    }
}
