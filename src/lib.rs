//! Read-only digest to size index over a container engine's layer store.
//!
//! The engine's image metadata records, for each layer, its uncompressed size (keyed by chain
//! id) and the distribution digest it was pulled or pushed as (keyed by diff id).  This crate
//! joins the two on-disk indexes into [`LayerRecord`]s so that callers can attribute disk usage
//! to registry digests without talking to the engine daemon or a registry.
//!
//! # Example
//!
//! ```no_run
//! use layerinfo::LayerStore;
//!
//! // Probe /var/lib/docker for a supported driver and index its layers
//! let mut store = LayerStore::open()?;
//!
//! for record in store.records() {
//!     println!("{} {}", record.digest, record.size_bytes);
//! }
//!
//! // Pick up layers the engine added since
//! store.rebuild()?;
//! # Ok::<(), layerinfo::LayerInfoError>(())
//! ```
//!
//! The store is never written.  The engine may be creating and removing layers while we read;
//! entries that are only partially present are left out of the index rather than reported.

pub mod config;
pub mod driver;
pub mod error;
pub mod layer;
pub mod layerdb;
pub mod store;

mod util;

pub use config::StoreConfig;
pub use driver::{probe_driver, BuiltinDriver, DriverRegistry, LayerIndexBuilder};
pub use error::{LayerInfoError, Result};
pub use layer::{normalize_digest, LayerRecord};
pub use layerdb::Overlay2Builder;
pub use store::{LayerIndex, LayerStore};
