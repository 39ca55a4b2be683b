// ==============================================================================
// Fingerprinted disk cache
// ==============================================================================
//
// Blobs live under `<workspace>/.robotcode_cache/<rf-version>/<kind>/` and are
// keyed by a hash of the absolute source path. Each blob is a JSON document
// `(meta, payload)` with a leading magic and format version; a load is
// accepted only when every fingerprint field matches the caller's
// expectation. Any mismatch, IO error, or decode error is a silent miss.
// Writes go to a temp file in the same directory and are renamed into place,
// so a concurrent reader never observes a partial blob. The whole directory
// is safe to delete at any time.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::environment::{hash_hex, EnvironmentProbe};

const CACHE_MAGIC: &str = "robot-cache";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheKind {
    Libdoc,
    Namespace,
    Imports,
}

impl CacheKind {
    fn as_str(self) -> &'static str {
        match self {
            CacheKind::Libdoc => "libdoc",
            CacheKind::Namespace => "namespace",
            CacheKind::Imports => "imports",
        }
    }
}

/// Everything that must match for a cached blob to be served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMeta {
    magic: String,
    format_version: u32,
    pub source: PathBuf,
    pub mtime: u64,
    pub content_hash: String,
    pub python_executable: String,
    pub sys_path_hash: String,
    pub robot_version: String,
}

#[derive(Serialize, Deserialize)]
struct CacheBlob<T> {
    meta: CacheMeta,
    payload: T,
}

pub struct DiskCache {
    root: PathBuf,
    probe: EnvironmentProbe,
}

impl DiskCache {
    pub fn new(workspace_root: &Path, probe: EnvironmentProbe) -> Self {
        let root = workspace_root
            .join(".robotcode_cache")
            .join(probe.robot_version.to_string());
        Self { root, probe }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The fingerprint for `source` as it looks right now. `None` when the
    /// file cannot be read (nothing to cache against).
    pub fn meta_for(&self, source: &Path) -> Option<CacheMeta> {
        let bytes = fs::read(source).ok()?;
        let mtime = fs::metadata(source)
            .ok()?
            .modified()
            .ok()?
            .duration_since(UNIX_EPOCH)
            .ok()?
            .as_secs();
        Some(CacheMeta {
            magic: CACHE_MAGIC.to_string(),
            format_version: FORMAT_VERSION,
            source: source.to_path_buf(),
            mtime,
            content_hash: hash_hex(&bytes),
            python_executable: self.probe.python_executable.clone(),
            sys_path_hash: self.probe.sys_path_hash.clone(),
            robot_version: self.probe.robot_version.to_string(),
        })
    }

    /// Load the blob for `source`, or miss. Every failure mode (missing
    /// file, corrupt JSON, any fingerprint mismatch) is a miss, never an
    /// error or partial data.
    pub fn load<T: DeserializeOwned>(&self, kind: CacheKind, expected: &CacheMeta) -> Option<T> {
        let path = self.blob_path(kind, &expected.source);
        let bytes = fs::read(&path).ok()?;
        let blob: CacheBlob<T> = match serde_json::from_slice(&bytes) {
            Ok(blob) => blob,
            Err(err) => {
                log::warn!("ignoring corrupt cache file {}: {err}", path.display());
                return None;
            }
        };
        if blob.meta != *expected {
            log::debug!("cache fingerprint mismatch for {}", expected.source.display());
            return None;
        }
        Some(blob.payload)
    }

    /// Serialize and atomically persist a blob. Failures are logged and
    /// swallowed: the cache is an accelerator, never a correctness
    /// dependency.
    pub fn store<T: Serialize>(&self, kind: CacheKind, meta: CacheMeta, payload: &T) {
        let path = self.blob_path(kind, &meta.source);
        let blob = CacheBlob {
            meta,
            payload,
        };
        let result = (|| -> std::io::Result<()> {
            let dir = path.parent().expect("blob path always has a parent");
            fs::create_dir_all(dir)?;
            let bytes = serde_json::to_vec(&blob)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            let tmp = path.with_extension(format!("tmp.{}", std::process::id()));
            fs::write(&tmp, bytes)?;
            fs::rename(&tmp, &path)?;
            Ok(())
        })();
        if let Err(err) = result {
            log::warn!("failed to write cache file {}: {err}", path.display());
        }
    }

    fn blob_path(&self, kind: CacheKind, source: &Path) -> PathBuf {
        let hashed = hash_hex(source.to_string_lossy().as_bytes());
        self.root
            .join(kind.as_str())
            .join(format!("{}.cache.json", &hashed[..32]))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use robot_ast::RobotVersion;

    fn cache_in(dir: &Path) -> DiskCache {
        DiskCache::new(dir, EnvironmentProbe::fixed("python3", RobotVersion::new(7, 0)))
    }

    fn write_source(dir: &Path, name: &str, contents: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn store_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let source = write_source(dir.path(), "lib.py", "def kw(): pass");

        let meta = cache.meta_for(&source).unwrap();
        cache.store(CacheKind::Libdoc, meta.clone(), &vec!["kw".to_string()]);

        let loaded: Vec<String> = cache.load(CacheKind::Libdoc, &meta).unwrap();
        assert_eq!(loaded, vec!["kw".to_string()]);
    }

    #[test]
    fn content_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let source = write_source(dir.path(), "lib.py", "v1");

        let meta = cache.meta_for(&source).unwrap();
        cache.store(CacheKind::Libdoc, meta, &1u32);

        fs::write(&source, "v2").unwrap();
        let fresh = cache.meta_for(&source).unwrap();
        assert_eq!(cache.load::<u32>(CacheKind::Libdoc, &fresh), None);
    }

    #[test]
    fn environment_change_invalidates() {
        let dir = tempfile::tempdir().unwrap();
        let source = write_source(dir.path(), "lib.py", "same");

        let cache = cache_in(dir.path());
        let meta = cache.meta_for(&source).unwrap();
        cache.store(CacheKind::Libdoc, meta, &1u32);

        let other = DiskCache::new(
            dir.path(),
            EnvironmentProbe::fixed("python3.12", RobotVersion::new(7, 0)),
        );
        let fresh = other.meta_for(&source).unwrap();
        assert_eq!(other.load::<u32>(CacheKind::Libdoc, &fresh), None);
    }

    #[test]
    fn corrupt_blob_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let source = write_source(dir.path(), "lib.py", "x");

        let meta = cache.meta_for(&source).unwrap();
        cache.store(CacheKind::Libdoc, meta.clone(), &7u32);

        // Clobber the blob on disk.
        let blob = cache.blob_path(CacheKind::Libdoc, &source);
        fs::write(&blob, b"{not json").unwrap();
        assert_eq!(cache.load::<u32>(CacheKind::Libdoc, &meta), None);
    }

    #[test]
    fn kinds_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        let source = write_source(dir.path(), "lib.py", "x");

        let meta = cache.meta_for(&source).unwrap();
        cache.store(CacheKind::Libdoc, meta.clone(), &1u32);
        assert_eq!(cache.load::<u32>(CacheKind::Namespace, &meta), None);
    }

    #[test]
    fn cache_layout_is_versioned() {
        let dir = tempfile::tempdir().unwrap();
        let cache = cache_in(dir.path());
        assert!(cache
            .root()
            .ends_with(Path::new(".robotcode_cache/7.0")));
    }
}
