//! Layer index for the overlay2 driver.
//!
//! The engine records each layer in two independent indexes under
//! `<image_root>/<driver>/`:
//!
//! ```text
//! layerdb/sha256/<chain-id>/diff                      # diff id of the layer
//! layerdb/sha256/<chain-id>/size                      # uncompressed size, decimal
//! distribution/diffid-by-digest/sha256/<digest>       # diff id the digest was pulled as
//! ```
//!
//! The diff id is the join key.  [`Overlay2Builder`] scans the chain-id area first to learn
//! the size of every diff id, then the digest area to attach a distribution digest to each,
//! and finally keeps the layers for which both halves are known.
//!
//! The engine writes these files while we read them.  Every per-entry failure (a directory
//! that vanished, a file not written yet, a size that does not parse) only drops or degrades
//! that entry.  The build fails only when one of the two areas cannot be listed at all.

use std::{
    collections::HashMap,
    ffi::CStr,
    os::fd::OwnedFd,
    path::{Path, PathBuf},
};

use log::{debug, trace};
use rustix::fs::CWD;

use crate::{
    driver::LayerIndexBuilder,
    error::{LayerInfoError, Result},
    layer::LayerRecord,
    util::{list_names, open_dir, read_file_at},
};

/// Chain-id area, relative to the driver's metadata directory.
pub const LAYERDB_DIR: &str = "layerdb/sha256";
/// Digest area, relative to the driver's metadata directory.
pub const DIFFID_BY_DIGEST_DIR: &str = "distribution/diffid-by-digest/sha256";

const DIFF_FILE: &str = "diff";
const SIZE_FILE: &str = "size";

/// What is known about one diff id while the two indexes are being joined.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct PendingLayer {
    /// Raw digest (no algorithm prefix); empty until the digest pass finds one.
    digest: String,
    /// Size from the chain-id pass; zero when missing or unparseable.
    size_bytes: i64,
}

impl PendingLayer {
    fn is_complete(&self) -> bool {
        !self.digest.is_empty() && self.size_bytes != 0
    }
}

/// Diff id to partially-known layer, filled by the chain-id pass and then the digest pass.
#[derive(Debug, Default)]
pub(crate) struct JoinMap {
    layers: HashMap<String, PendingLayer>,
}

impl JoinMap {
    /// Records the size of the layer with `diff_id`, discarding any earlier record for it.
    ///
    /// An empty diff id means the `diff` file was not readable; such entries are skipped
    /// rather than all being filed under the same empty key.
    pub(crate) fn insert_size(&mut self, diff_id: String, size_bytes: i64) -> bool {
        if diff_id.is_empty() {
            return false;
        }
        self.layers.insert(
            diff_id,
            PendingLayer {
                digest: String::new(),
                size_bytes,
            },
        );
        true
    }

    /// Attaches `raw_digest` to the layer with `diff_id`, if the chain-id pass saw one.
    pub(crate) fn attach_digest(&mut self, diff_id: &str, raw_digest: &str) -> bool {
        match self.layers.get_mut(diff_id) {
            Some(pending) => {
                pending.digest = raw_digest.to_string();
                true
            }
            None => false,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.layers.len()
    }

    /// Consumes the map, keeping only layers with both a digest and a non-zero size.
    pub(crate) fn finish(self) -> Vec<LayerRecord> {
        self.layers
            .into_values()
            .filter(PendingLayer::is_complete)
            .map(|pending| LayerRecord::from_raw_digest(&pending.digest, pending.size_bytes))
            .collect()
    }
}

/// Reads a small metadata file, treating any failure as an absent (empty) value.
fn read_field(dirfd: &OwnedFd, name: &str, context: &CStr) -> String {
    match read_file_at(dirfd, name) {
        Ok(content) => String::from_utf8_lossy(&content).into_owned(),
        Err(err) => {
            trace!("{context:?}/{name}: {err}");
            String::new()
        }
    }
}

/// Parses the content of a `size` file.  The content is used verbatim; anything that is not a
/// plain decimal i64 counts as zero.
fn parse_size(content: &str) -> i64 {
    content.parse().unwrap_or(0)
}

/// The index builder for the overlay2 driver's on-disk layout.
#[derive(Debug, Clone, Copy, Default)]
pub struct Overlay2Builder;

impl Overlay2Builder {
    /// Chain-id pass: learn the size of every diff id in `layerdb/sha256`.
    fn scan_layerdb(&self, path: &Path, join: &mut JoinMap) -> Result<()> {
        let area = open_dir(CWD, path).map_err(|errno| LayerInfoError::MissingIndexArea {
            path: path.to_path_buf(),
            source: errno.into(),
        })?;
        let chain_ids = list_names(&area).map_err(|errno| LayerInfoError::MissingIndexArea {
            path: path.to_path_buf(),
            source: errno.into(),
        })?;

        let mut skipped = 0;
        for chain_id in &chain_ids {
            let (diff_id, size) = match open_dir(&area, chain_id.as_c_str()) {
                Ok(layer_dir) => (
                    read_field(&layer_dir, DIFF_FILE, chain_id),
                    parse_size(&read_field(&layer_dir, SIZE_FILE, chain_id)),
                ),
                Err(errno) => {
                    trace!("{chain_id:?}: {errno}");
                    (String::new(), 0)
                }
            };
            if !join.insert_size(diff_id, size) {
                skipped += 1;
            }
        }

        debug!(
            "{}: {} chain ids, {skipped} without a diff id",
            path.display(),
            chain_ids.len()
        );
        Ok(())
    }

    /// Digest pass: attach the distribution digest to each diff id seen in the chain-id pass.
    fn scan_digests(&self, path: &Path, join: &mut JoinMap) -> Result<()> {
        let area = open_dir(CWD, path).map_err(|errno| LayerInfoError::MissingDigestArea {
            path: path.to_path_buf(),
            source: errno.into(),
        })?;
        let digests = list_names(&area).map_err(|errno| LayerInfoError::MissingDigestArea {
            path: path.to_path_buf(),
            source: errno.into(),
        })?;

        let mut matched = 0;
        for digest in &digests {
            let Ok(raw_digest) = digest.to_str() else {
                trace!("{digest:?}: digest name is not UTF-8");
                continue;
            };
            let diff_id = match read_file_at(&area, digest.as_c_str()) {
                Ok(content) => String::from_utf8_lossy(&content).into_owned(),
                Err(err) => {
                    trace!("{raw_digest}: {err}");
                    continue;
                }
            };
            if join.attach_digest(&diff_id, raw_digest) {
                matched += 1;
            }
        }

        debug!(
            "{}: {} digests, {matched} matched a layer",
            path.display(),
            digests.len()
        );
        Ok(())
    }

    /// Joins the two indexes of the driver metadata directory `driver_root`.
    pub fn build_at(&self, driver_root: &Path) -> Result<Vec<LayerRecord>> {
        let mut join = JoinMap::default();
        self.scan_layerdb(&driver_root.join(LAYERDB_DIR), &mut join)?;
        self.scan_digests(&driver_root.join(DIFFID_BY_DIGEST_DIR), &mut join)?;

        let pending = join.len();
        let records = join.finish();
        debug!(
            "{}: {} layers, {} with digest and size",
            driver_root.display(),
            pending,
            records.len()
        );
        Ok(records)
    }
}

impl LayerIndexBuilder for Overlay2Builder {
    fn build(&self, image_root: &Path, driver: &str) -> Result<Vec<LayerRecord>> {
        self.build_at(&driver_metadata_root(image_root, driver))
    }
}

/// `<image_root>/<driver>`, the directory holding a driver's `layerdb` and `distribution`.
pub fn driver_metadata_root(image_root: &Path, driver: &str) -> PathBuf {
    image_root.join(driver)
}

#[cfg(test)]
mod tests {
    use std::{collections::HashSet, fs};

    use similar_asserts::assert_eq;

    use super::*;
    use crate::test::StoreFixture;

    fn build(fixture: &StoreFixture) -> Result<Vec<LayerRecord>> {
        Overlay2Builder.build(&fixture.image_root(), "overlay2")
    }

    fn sorted(mut records: Vec<LayerRecord>) -> Vec<(String, i64)> {
        records.sort_by(|a, b| a.digest.cmp(&b.digest));
        records
            .into_iter()
            .map(|r| (r.digest, r.size_bytes))
            .collect()
    }

    #[test]
    fn test_join_basic() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("100"));
        fixture.chain("B", Some("Y"), Some("0"));
        fixture.digest("d1", "X");
        fixture.digest("d2", "Y");
        fixture.digest("d3", "Z");

        assert_eq!(
            sorted(build(&fixture).unwrap()),
            vec![("sha256:d1".to_string(), 100)]
        );
    }

    #[test]
    fn test_empty_store() {
        let fixture = StoreFixture::overlay2();
        assert_eq!(build(&fixture).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_size_file() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), None);
        fixture.digest("d1", "X");
        assert_eq!(build(&fixture).unwrap().len(), 0);
    }

    #[test]
    fn test_unparseable_size() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("12ab"));
        fixture.chain("B", Some("Y"), Some("100\n"));
        fixture.chain("C", Some("Z"), Some("99999999999999999999"));
        fixture.digest("d1", "X");
        fixture.digest("d2", "Y");
        fixture.digest("d3", "Z");
        assert_eq!(build(&fixture).unwrap().len(), 0);
    }

    #[test]
    fn test_missing_diff_file_does_not_collide() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", None, Some("100"));
        fixture.chain("B", None, Some("200"));
        fixture.chain("C", Some("X"), Some("300"));
        // a digest whose diff id is empty would match the empty key if it existed
        fixture.digest("d0", "");
        fixture.digest("d1", "X");
        assert_eq!(
            sorted(build(&fixture).unwrap()),
            vec![("sha256:d1".to_string(), 300)]
        );
    }

    #[test]
    fn test_diff_id_is_verbatim() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("sha256:X"), Some("100"));
        fixture.chain("B", Some("sha256:Y\n"), Some("200"));
        fixture.digest("d1", "sha256:X");
        // trailing whitespace differs, no join
        fixture.digest("d2", "sha256:Y");
        assert_eq!(
            sorted(build(&fixture).unwrap()),
            vec![("sha256:d1".to_string(), 100)]
        );
    }

    #[test]
    fn test_stray_entries_are_ignored() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("100"));
        // a plain file in the chain-id area, and a directory in the digest area
        fs::write(fixture.layerdb().join("not-a-layer"), b"junk").unwrap();
        fs::create_dir(fixture.digests().join("d9")).unwrap();
        fixture.digest("d1", "X");
        assert_eq!(
            sorted(build(&fixture).unwrap()),
            vec![("sha256:d1".to_string(), 100)]
        );
    }

    #[test]
    fn test_negative_size_is_kept() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("-5"));
        fixture.digest("d1", "X");
        assert_eq!(
            sorted(build(&fixture).unwrap()),
            vec![("sha256:d1".to_string(), -5)]
        );
    }

    #[test]
    fn test_shared_diff_id_yields_one_record() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("100"));
        fixture.digest("d1", "X");
        fixture.digest("d2", "X");
        let records = build(&fixture).unwrap();
        assert_eq!(records.len(), 1);
        assert!(["sha256:d1", "sha256:d2"].contains(&records[0].digest.as_str()));
        assert_eq!(records[0].size_bytes, 100);
    }

    #[test]
    fn test_missing_index_area() {
        let fixture = StoreFixture::overlay2();
        fs::remove_dir_all(fixture.layerdb()).unwrap();
        assert!(matches!(
            build(&fixture),
            Err(LayerInfoError::MissingIndexArea { .. })
        ));
    }

    #[test]
    fn test_missing_digest_area() {
        let fixture = StoreFixture::overlay2();
        fixture.chain("A", Some("X"), Some("100"));
        fs::remove_dir_all(fixture.digests()).unwrap();
        assert!(matches!(
            build(&fixture),
            Err(LayerInfoError::MissingDigestArea { .. })
        ));
    }

    #[test]
    fn test_rebuild_is_set_equal() {
        let fixture = StoreFixture::overlay2();
        for i in 0..32 {
            fixture.chain(
                &format!("c{i}"),
                Some(format!("x{i}").as_str()),
                Some((i + 1).to_string().as_str()),
            );
            fixture.digest(&format!("d{i}"), &format!("x{i}"));
        }
        let first: HashSet<_> = build(&fixture).unwrap().into_iter().collect();
        let second: HashSet<_> = build(&fixture).unwrap().into_iter().collect();
        assert_eq!(first.len(), 32);
        assert!(first == second);
    }

    #[test]
    fn test_join_map() {
        let mut join = JoinMap::default();
        assert!(!join.insert_size(String::new(), 10));
        assert!(join.insert_size("X".into(), 10));
        assert!(join.insert_size("X".into(), 20));
        assert!(join.insert_size("Y".into(), 30));
        assert!(join.attach_digest("X", "d1"));
        assert!(!join.attach_digest("Z", "d9"));
        assert_eq!(join.len(), 2);
        let records = join.finish();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].digest, "sha256:d1");
        assert_eq!(records[0].size_bytes, 20);
    }

    #[test]
    fn test_driver_metadata_root() {
        assert_eq!(
            driver_metadata_root(Path::new("/var/lib/docker/image"), "overlay2"),
            PathBuf::from("/var/lib/docker/image/overlay2")
        );
    }
}
