//! Error types for the layerinfo library.
//!
//! All fallible operations return a [`Result<T>`], an alias for
//! `Result<T, LayerInfoError>`.
//!
//! # Error Categories
//!
//! - **Probe errors**: [`NoRootDirectory`], [`NoSupportedDriver`], [`UnknownDriver`]
//! - **Build errors**: [`MissingIndexArea`], [`MissingDigestArea`]
//! - **Lookup errors**: [`UnknownDigest`], [`InvalidDigest`]
//! - **Configuration errors**: [`Config`], [`ConfigParse`]
//!
//! Read failures on individual layer entries are deliberately absent from this
//! list: the engine mutates the store while we read it, so a missing `diff` or
//! `size` file only means the entry is not ready yet.
//!
//! [`NoRootDirectory`]: LayerInfoError::NoRootDirectory
//! [`NoSupportedDriver`]: LayerInfoError::NoSupportedDriver
//! [`UnknownDriver`]: LayerInfoError::UnknownDriver
//! [`MissingIndexArea`]: LayerInfoError::MissingIndexArea
//! [`MissingDigestArea`]: LayerInfoError::MissingDigestArea
//! [`UnknownDigest`]: LayerInfoError::UnknownDigest
//! [`InvalidDigest`]: LayerInfoError::InvalidDigest
//! [`Config`]: LayerInfoError::Config
//! [`ConfigParse`]: LayerInfoError::ConfigParse

use std::path::PathBuf;

/// Result type alias for operations that may return a LayerInfoError.
pub type Result<T> = std::result::Result<T, LayerInfoError>;

/// Error types for layer store operations.
#[derive(Debug, thiserror::Error)]
pub enum LayerInfoError {
    /// The engine root directory could not be listed.
    #[error("cannot list engine root {path}: {source}")]
    NoRootDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// None of the registered drivers has a directory under the engine root.
    #[error("no supported storage driver found under {0}")]
    NoSupportedDriver(PathBuf),

    /// A driver id was selected that has no registered index builder.
    #[error("storage driver {0:?} is not registered")]
    UnknownDriver(String),

    /// The chain-id area (`layerdb/sha256`) could not be listed.
    #[error("cannot list layer database {path}: {source}")]
    MissingIndexArea {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The digest area (`distribution/diffid-by-digest/sha256`) could not be listed.
    #[error("cannot list digest index {path}: {source}")]
    MissingDigestArea {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The requested digest is not present in the current index.
    #[error("unknown layer digest: {0}")]
    UnknownDigest(String),

    /// A digest string is not of the form `sha256:<64 hex digits>`.
    #[error("invalid layer digest {0:?}")]
    InvalidDigest(String),

    /// The configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Config {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::StoreConfig`].
    #[error("invalid configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
