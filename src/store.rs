//! The layer store facade.
//!
//! [`LayerStore`] is what callers hold: it picks a storage driver once, builds the layer index
//! for it, and answers size lookups from the retained index without touching the disk again.
//! Changes the engine makes afterwards are only seen after an explicit [`LayerStore::rebuild`].
//!
//! The retained index is an immutable [`LayerIndex`] behind an `Arc`.  A rebuild constructs a
//! new one and swaps the pointer, so a [`LayerStore::snapshot`] taken earlier keeps answering
//! from the index it was taken from.  `LayerStore` itself does no locking; an embedder that
//! shares one across threads wraps it in whatever lock it already uses.

use std::{collections::HashMap, path::PathBuf, sync::Arc};

use log::debug;

use crate::{
    config::StoreConfig,
    driver::{probe_driver, DriverRegistry},
    error::{LayerInfoError, Result},
    layer::LayerRecord,
};

/// An immutable digest to record index, as produced by one build.
#[derive(Debug, Default)]
pub struct LayerIndex {
    records: Vec<LayerRecord>,
    by_digest: HashMap<String, usize>,
}

impl LayerIndex {
    /// Indexes `records` by digest.  Should a digest occur twice, the later record wins.
    pub fn new(records: Vec<LayerRecord>) -> Self {
        let mut by_digest: HashMap<String, usize> = HashMap::with_capacity(records.len());
        let mut unique: Vec<LayerRecord> = Vec::with_capacity(records.len());
        for record in records {
            match by_digest.get(&record.digest) {
                Some(&i) => unique[i] = record,
                None => {
                    by_digest.insert(record.digest.clone(), unique.len());
                    unique.push(record);
                }
            }
        }
        Self {
            records: unique,
            by_digest,
        }
    }

    /// The records, in the (unspecified) order the builder produced them.
    pub fn records(&self) -> &[LayerRecord] {
        &self.records
    }

    /// The record for `digest` (`sha256:<hex>`).
    pub fn get(&self, digest: &str) -> Option<&LayerRecord> {
        self.by_digest.get(digest).map(|&i| &self.records[i])
    }

    /// Sizes for `digests`, in the same order.
    ///
    /// # Errors
    ///
    /// [`LayerInfoError::UnknownDigest`] naming the first digest not in the index.
    pub fn size_of<S: AsRef<str>>(&self, digests: &[S]) -> Result<Vec<i64>> {
        digests
            .iter()
            .map(|digest| {
                let digest = digest.as_ref();
                self.get(digest)
                    .map(|record| record.size_bytes)
                    .ok_or_else(|| LayerInfoError::UnknownDigest(digest.to_string()))
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.by_digest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_digest.is_empty()
    }

    /// Sum of all layer sizes, saturating.
    pub fn total_size(&self) -> i64 {
        self.records
            .iter()
            .fold(0i64, |acc, record| acc.saturating_add(record.size_bytes))
    }
}

/// Read-only view of a container engine's layers, keyed by distribution digest.
#[derive(Debug)]
pub struct LayerStore {
    driver: String,
    image_root: PathBuf,
    registry: DriverRegistry,
    index: Arc<LayerIndex>,
}

impl LayerStore {
    /// Opens the engine store at the default location with the builtin drivers.
    ///
    /// See [`LayerStore::open_with`].
    pub fn open() -> Result<Self> {
        Self::open_with(StoreConfig::default(), DriverRegistry::builtin())
    }

    /// Opens the store described by `config`, reading it with the drivers in `registry`.
    ///
    /// The driver is taken from `config.driver` if set, otherwise probed from
    /// `config.engine_root`.  The index is built once before returning, so the store can be
    /// queried immediately.
    ///
    /// # Errors
    ///
    /// Any probe error, [`LayerInfoError::UnknownDriver`] for a pinned driver that is not
    /// registered, or the error of the initial build.
    pub fn open_with(config: StoreConfig, registry: DriverRegistry) -> Result<Self> {
        let driver = match &config.driver {
            Some(driver) if registry.contains(driver) => driver.clone(),
            Some(driver) => return Err(LayerInfoError::UnknownDriver(driver.clone())),
            None => probe_driver(&config.engine_root, &registry)?,
        };

        let mut store = Self {
            driver,
            image_root: config.image_root(),
            registry,
            index: Arc::default(),
        };
        store.rebuild()?;
        Ok(store)
    }

    /// Re-reads the store and replaces the retained index with the result.
    ///
    /// On error the previous index is kept and stays queryable.
    pub fn rebuild(&mut self) -> Result<Vec<LayerRecord>> {
        let records = self.registry.build(&self.image_root, &self.driver)?;
        debug!("{}: indexed {} layers", self.driver, records.len());
        self.index = Arc::new(LayerIndex::new(records.clone()));
        Ok(records)
    }

    /// Sizes for `digests` (`sha256:<hex>`), in the same order, from the retained index.
    ///
    /// # Errors
    ///
    /// [`LayerInfoError::UnknownDigest`] if any digest is not in the index.
    pub fn size_of<S: AsRef<str>>(&self, digests: &[S]) -> Result<Vec<i64>> {
        self.index.size_of(digests)
    }

    /// The storage driver this store was opened with.
    pub fn driver(&self) -> &str {
        &self.driver
    }

    /// The records of the retained index.
    pub fn records(&self) -> &[LayerRecord] {
        self.index.records()
    }

    /// The record for `digest`, if it is indexed.
    pub fn get(&self, digest: &str) -> Option<&LayerRecord> {
        self.index.get(digest)
    }

    /// A handle to the current index that is unaffected by later rebuilds.
    pub fn snapshot(&self) -> Arc<LayerIndex> {
        Arc::clone(&self.index)
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Total size of all indexed layers.
    pub fn total_size(&self) -> i64 {
        self.index.total_size()
    }
}
