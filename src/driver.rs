//! Storage driver selection.
//!
//! A container engine keeps one directory per storage driver under its data root; the
//! driver that is in use is the one whose directory exists.  [`probe_driver`] finds it by
//! checking the ids in a [`DriverRegistry`] against the subdirectories of the root.
//!
//! Each registered id maps to a [`LayerIndexBuilder`] that knows how to read that driver's
//! layer metadata.  The shipped drivers form the closed set [`BuiltinDriver`]; the registry is
//! an explicit value rather than global state so that callers and tests can add their own.

use std::{
    collections::HashSet,
    ffi::CString,
    path::Path,
    sync::Arc,
};

use log::{debug, warn};
use rustix::fs::CWD;

use crate::{
    error::{LayerInfoError, Result},
    layer::LayerRecord,
    layerdb::Overlay2Builder,
    util::{list_subdirs, open_dir},
};

/// Reads one driver's on-disk layer metadata into digest/size records.
pub trait LayerIndexBuilder: Send + Sync {
    /// Builds the full record list for `driver` from the metadata under `image_root`.
    ///
    /// Only the absence of a whole index area is an error; entries that cannot be read are
    /// dropped from the result.
    fn build(&self, image_root: &Path, driver: &str) -> Result<Vec<LayerRecord>>;
}

/// The storage drivers supported out of the box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinDriver {
    /// The overlay2 copy-on-write driver.
    Overlay2,
}

impl BuiltinDriver {
    /// All builtin drivers, in probe priority order.
    pub const ALL: [BuiltinDriver; 1] = [BuiltinDriver::Overlay2];

    /// The directory name the engine uses for this driver.
    pub fn id(self) -> &'static str {
        match self {
            BuiltinDriver::Overlay2 => "overlay2",
        }
    }

    /// Looks up a builtin driver by id.
    pub fn from_id(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|driver| driver.id() == id)
    }
}

impl LayerIndexBuilder for BuiltinDriver {
    fn build(&self, image_root: &Path, driver: &str) -> Result<Vec<LayerRecord>> {
        match self {
            BuiltinDriver::Overlay2 => Overlay2Builder.build(image_root, driver),
        }
    }
}

/// An ordered table from driver id to the builder for that driver.
///
/// Registration order is probe priority: when the engine root contains directories for more
/// than one registered driver, the one registered first wins.
#[derive(Clone)]
pub struct DriverRegistry {
    entries: Vec<(String, Arc<dyn LayerIndexBuilder>)>,
}

impl std::fmt::Debug for DriverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.ids()).finish()
    }
}

impl Default for DriverRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl DriverRegistry {
    /// A registry with no drivers.
    pub fn empty() -> Self {
        Self { entries: vec![] }
    }

    /// A registry holding every [`BuiltinDriver`].
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        for driver in BuiltinDriver::ALL {
            registry.register(driver.id(), driver);
        }
        registry
    }

    /// Registers `builder` for `id`.
    ///
    /// Replacing an existing id keeps its priority; a new id goes last.
    pub fn register(&mut self, id: impl Into<String>, builder: impl LayerIndexBuilder + 'static) {
        let id = id.into();
        let builder: Arc<dyn LayerIndexBuilder> = Arc::new(builder);
        match self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            Some(entry) => entry.1 = builder,
            None => self.entries.push((id, builder)),
        }
    }

    /// The builder registered for `id`.
    pub fn get(&self, id: &str) -> Option<&Arc<dyn LayerIndexBuilder>> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == id)
            .map(|(_, builder)| builder)
    }

    /// Whether `id` is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Registered ids in priority order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(id, _)| id.as_str())
    }

    /// Builds the layer records for `driver`.
    ///
    /// # Errors
    ///
    /// [`LayerInfoError::UnknownDriver`] if nothing is registered for `driver`, otherwise
    /// whatever the driver's builder reports.
    pub fn build(&self, image_root: &Path, driver: &str) -> Result<Vec<LayerRecord>> {
        let builder = self
            .get(driver)
            .ok_or_else(|| LayerInfoError::UnknownDriver(driver.to_string()))?;
        builder.build(image_root, driver)
    }
}

/// Finds the active storage driver by looking for a registered driver's directory in `root`.
///
/// This only reads `root`; nothing is retained.
///
/// # Errors
///
/// - [`LayerInfoError::NoRootDirectory`] if `root` cannot be listed.
/// - [`LayerInfoError::NoSupportedDriver`] if no subdirectory is named after a registered driver.
pub fn probe_driver(root: impl AsRef<Path>, registry: &DriverRegistry) -> Result<String> {
    let root = root.as_ref();
    let subdirs: HashSet<CString> = open_dir(CWD, root)
        .and_then(|fd| list_subdirs(&fd))
        .map_err(|errno| LayerInfoError::NoRootDirectory {
            path: root.to_path_buf(),
            source: errno.into(),
        })?
        .into_iter()
        .collect();

    let mut present = registry.ids().filter(|id| {
        CString::new(*id)
            .map(|name| subdirs.contains(&name))
            .unwrap_or(false)
    });

    let Some(driver) = present.next() else {
        return Err(LayerInfoError::NoSupportedDriver(root.to_path_buf()));
    };

    let ignored: Vec<&str> = present.collect();
    if !ignored.is_empty() {
        warn!(
            "{}: found directories for several drivers, using {driver} and ignoring {}",
            root.display(),
            ignored.join(", ")
        );
    }
    debug!("{}: using storage driver {driver}", root.display());
    Ok(driver.to_string())
}
