//! # Filesystem Response Cache
//!
//! Persists raw API payloads keyed by request parameters, so repeating an
//! extraction never refetches data the API already served. A cache hit
//! returns the payload byte-identical to what was originally stored.
//!
//! Entries are plain files under the configured cache directory, written
//! atomically (temp file + rename). There is no eviction policy beyond an
//! optional TTL; stale entries are treated as misses and overwritten on the
//! next fetch. Manual deletion of the directory is the other supported
//! invalidation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A handler for filesystem cache interactions.
pub struct CacheHandler {
    /// Directory holding one file per cache entry.
    dir: PathBuf,
    /// Entries older than this are reported as misses.
    ttl: Option<Duration>,
}

impl CacheHandler {
    /// Creates a new CacheHandler rooted at `dir`, creating the directory
    /// if needed.
    pub fn new(dir: &Path, ttl: Option<Duration>) -> Result<Self, CacheError> {
        fs::create_dir_all(dir)?;
        Ok(Self {
            dir: dir.to_path_buf(),
            ttl,
        })
    }

    /// Returns the stored payload for `key`, or `None` on a miss.
    ///
    /// An entry past its TTL counts as a miss; the stale file is left in
    /// place and overwritten by the next [`CacheHandler::put`].
    pub fn get(&self, key: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let path = self.entry_path(key);
        if !path.is_file() {
            return Ok(None);
        }

        if self.is_stale(&path) {
            debug!(key, "cache entry expired");
            return Ok(None);
        }

        let payload = fs::read(&path)?;
        debug!(key, bytes = payload.len(), "cache hit");
        Ok(Some(payload))
    }

    /// Stores `payload` under `key`, replacing any previous entry.
    ///
    /// The write goes through a temporary file in the same directory so a
    /// crash mid-write never leaves a truncated entry behind.
    pub fn put(&self, key: &str, payload: &[u8]) -> Result<PathBuf, CacheError> {
        let path = self.entry_path(key);
        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, payload)?;
        fs::rename(&tmp, &path)?;
        debug!(key, bytes = payload.len(), "cache store");
        Ok(path)
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }

    fn is_stale(&self, path: &Path) -> bool {
        let Some(ttl) = self.ttl else {
            return false;
        };
        match fs::metadata(path).and_then(|m| m.modified()) {
            Ok(modified) => match modified.elapsed() {
                Ok(age) => age >= ttl,
                // Clock moved backwards; keep the entry rather than refetch.
                Err(_) => false,
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "cannot stat cache entry");
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_returns_byte_identical_payload() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheHandler::new(dir.path(), None).unwrap();

        let payload = br#"{"id":["tempo"],"size":[1],"value":[42]}"#.to_vec();
        cache.put("venezia_2020-01-01_2020-12-31-a1b2c3d4", &payload).unwrap();

        let fetched = cache
            .get("venezia_2020-01-01_2020-12-31-a1b2c3d4")
            .unwrap()
            .expect("entry should be present");
        assert_eq!(fetched, payload);
    }

    #[test]
    fn absent_key_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheHandler::new(dir.path(), None).unwrap();
        assert!(cache.get("mai_visto").unwrap().is_none());
    }

    #[test]
    fn expired_entry_is_a_miss() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheHandler::new(dir.path(), Some(Duration::ZERO)).unwrap();
        cache.put("scaduto", b"payload").unwrap();
        assert!(cache.get("scaduto").unwrap().is_none());
    }

    #[test]
    fn put_replaces_previous_entry() {
        let dir = tempfile::tempdir().unwrap();
        let cache = CacheHandler::new(dir.path(), None).unwrap();
        cache.put("k", b"first").unwrap();
        cache.put("k", b"second").unwrap();
        assert_eq!(cache.get("k").unwrap().unwrap(), b"second");
    }
}
