//! Configuration for locating the engine's layer store.
//!
//! The engine keeps two trees under its data directory: one directory per
//! storage driver (whose presence selects the driver) and an `image/` tree
//! holding per-driver layer metadata:
//!
//! ```text
//! /var/lib/docker/
//! +-- overlay2/                                  # driver data; presence selects the driver
//! +-- image/
//!     +-- overlay2/
//!         +-- layerdb/sha256/<chain-id>/diff     # diff id
//!         +-- layerdb/sha256/<chain-id>/size     # decimal size in bytes
//!         +-- distribution/diffid-by-digest/sha256/<digest>   # diff id
//! ```
//!
//! A configuration file is optional. When present it is TOML:
//!
//! ```toml
//! engine_root = "/var/lib/docker"
//! # defaults to <engine_root>/image
//! image_root = "/var/lib/docker/image"
//! # skip probing and use this driver
//! driver = "overlay2"
//! ```

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::{LayerInfoError, Result};

/// Default data directory of the container engine.
pub const DEFAULT_ENGINE_ROOT: &str = "/var/lib/docker";

/// Where the layer store lives and which driver to read it with.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Engine data directory; its subdirectories are probed for a driver.
    #[serde(default = "default_engine_root")]
    pub engine_root: PathBuf,

    /// Root of the per-driver image metadata. Defaults to `<engine_root>/image`.
    #[serde(default)]
    pub image_root: Option<PathBuf>,

    /// Use this driver instead of probing the engine root.
    #[serde(default)]
    pub driver: Option<String>,
}

fn default_engine_root() -> PathBuf {
    PathBuf::from(DEFAULT_ENGINE_ROOT)
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            engine_root: default_engine_root(),
            image_root: None,
            driver: None,
        }
    }
}

impl StoreConfig {
    /// A configuration rooted at `engine_root` with all other fields defaulted.
    pub fn with_engine_root(engine_root: impl Into<PathBuf>) -> Self {
        Self {
            engine_root: engine_root.into(),
            ..Self::default()
        }
    }

    /// Parse configuration from TOML content.
    ///
    /// # Errors
    ///
    /// Returns [`LayerInfoError::ConfigParse`] if the content is not valid.
    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Read and parse a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| LayerInfoError::Config {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// The directory holding `<driver>/layerdb` and `<driver>/distribution`.
    pub fn image_root(&self) -> PathBuf {
        self.image_root
            .clone()
            .unwrap_or_else(|| self.engine_root.join("image"))
    }
}
