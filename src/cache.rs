//! ArtifactCache - persistent disk cache for resolved provider output.
//!
//! Entries are keyed on everything that affects the output of a request, so a
//! repeated request is served from disk instead of billing a provider again.

use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

use crate::fallback::{Capability, FallbackRequest, Output};

const DATA_EXT: &str = "bin";
const META_EXT: &str = "meta";

/// Persistent disk cache for resolved outputs.
pub struct ArtifactCache {
    cache_dir: PathBuf,
}

impl ArtifactCache {
    /// Does not create the directory; `store` creates it on demand.
    pub fn new(cache_dir: PathBuf) -> Self {
        Self { cache_dir }
    }

    /// Default: ~/.cache/shorts-relay/artifacts/
    pub fn default_dir() -> PathBuf {
        dirs::cache_dir()
            .unwrap_or_else(|| PathBuf::from(".cache"))
            .join("shorts-relay")
            .join("artifacts")
    }

    pub fn cache_dir(&self) -> &Path {
        &self.cache_dir
    }

    /// Generate deterministic SHA256 hash for a request.
    /// Returns a 32-character hex string (first 16 bytes of SHA256).
    pub fn hash_request(request: &FallbackRequest) -> String {
        let mut hasher = Sha256::new();
        hasher.update(request.cache_key().as_bytes());
        let result = hasher.finalize();
        hex::encode(&result[..16])
    }

    fn data_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", hash, DATA_EXT))
    }

    fn meta_path(&self, hash: &str) -> PathBuf {
        self.cache_dir.join(format!("{}.{}", hash, META_EXT))
    }

    /// Cached output for the request, if any.
    ///
    /// Text capabilities come back as `Output::Text`; an entry that is no
    /// longer valid UTF-8 is treated as a miss.
    pub fn get(&self, request: &FallbackRequest) -> Option<Output> {
        let hash = Self::hash_request(request);
        let bytes = std::fs::read(self.data_path(&hash)).ok()?;
        if bytes.is_empty() {
            return None;
        }
        if request.capability.produces_text() {
            String::from_utf8(bytes).ok().map(Output::Text)
        } else {
            Some(Output::Bytes(bytes))
        }
    }

    /// Store output under the request's hash, with the capability and payload
    /// alongside for listing.
    pub fn store(&self, request: &FallbackRequest, output: &Output) -> Result<PathBuf, std::io::Error> {
        std::fs::create_dir_all(&self.cache_dir)?;
        let hash = Self::hash_request(request);
        let path = self.data_path(&hash);
        std::fs::write(&path, output.as_bytes())?;
        std::fs::write(
            self.meta_path(&hash),
            format!("{}\n{}", request.capability, request.payload),
        )?;
        Ok(path)
    }

    /// Store and then evict down to `max_size_mb`.
    pub fn store_with_cleanup(
        &self,
        request: &FallbackRequest,
        output: &Output,
        max_size_mb: u64,
    ) -> Result<PathBuf, std::io::Error> {
        let path = self.store(request, output)?;
        self.cleanup_if_needed(max_size_mb)?;
        Ok(path)
    }

    /// Cached data files with their metadata.
    fn data_files(&self) -> Result<Vec<(PathBuf, std::fs::Metadata)>, std::io::Error> {
        let mut files = Vec::new();
        if !self.cache_dir.exists() {
            return Ok(files);
        }
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(DATA_EXT) {
                continue;
            }
            if let Ok(metadata) = entry.metadata() {
                if metadata.is_file() {
                    files.push((path, metadata));
                }
            }
        }
        Ok(files)
    }

    /// Remove old entries if the cache exceeds `max_size_mb`.
    /// Deletes oldest entries first (by modification time) until under limit.
    pub fn cleanup_if_needed(&self, max_size_mb: u64) -> Result<(), std::io::Error> {
        let max_size_bytes = max_size_mb * 1024 * 1024;
        let mut files = self.data_files()?;
        let mut total_size: u64 = files.iter().map(|(_, m)| m.len()).sum();

        if total_size <= max_size_bytes {
            return Ok(());
        }

        files.sort_by_key(|(_, m)| m.modified().unwrap_or(std::time::SystemTime::UNIX_EPOCH));

        for (path, metadata) in files {
            if total_size <= max_size_bytes {
                break;
            }
            if std::fs::remove_file(&path).is_ok() {
                total_size = total_size.saturating_sub(metadata.len());
                let _ = std::fs::remove_file(path.with_extension(META_EXT));
                log::debug!("Evicted {} from cache", path.display());
            }
        }

        Ok(())
    }

    pub fn total_size_bytes(&self) -> Result<u64, std::io::Error> {
        Ok(self.data_files()?.iter().map(|(_, m)| m.len()).sum())
    }

    /// List cached entries, sorted by hash.
    pub fn list_entries(&self) -> Result<Vec<CacheEntry>, std::io::Error> {
        let mut entries: Vec<CacheEntry> = self
            .data_files()?
            .into_iter()
            .map(|(path, metadata)| {
                let hash = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .unwrap_or("")
                    .to_string();
                let (capability, payload) = self.read_meta(&hash);
                CacheEntry {
                    hash,
                    capability,
                    payload,
                    size_bytes: metadata.len(),
                    path,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.hash.cmp(&b.hash));
        Ok(entries)
    }

    fn read_meta(&self, hash: &str) -> (Option<Capability>, Option<String>) {
        let Ok(meta) = std::fs::read_to_string(self.meta_path(hash)) else {
            return (None, None);
        };
        let (first, rest) = meta.split_once('\n').unwrap_or((meta.as_str(), ""));
        let capability = Capability::ALL.into_iter().find(|c| c.as_str() == first);
        (capability, Some(rest.to_string()))
    }

    /// Remove a cached entry by its hash.
    /// Returns true if an entry was removed, false if it didn't exist.
    pub fn remove(&self, hash: &str) -> Result<bool, std::io::Error> {
        let data_path = self.data_path(hash);
        let mut removed = false;
        if data_path.exists() {
            std::fs::remove_file(&data_path)?;
            removed = true;
        }
        let _ = std::fs::remove_file(self.meta_path(hash));
        Ok(removed)
    }

    /// Remove all entries. Returns the number of entries removed.
    pub fn clear_all(&self) -> Result<usize, std::io::Error> {
        if !self.cache_dir.exists() {
            return Ok(0);
        }
        let mut count = 0;
        for entry in std::fs::read_dir(&self.cache_dir)? {
            let path = entry?.path();
            match path.extension().and_then(|e| e.to_str()) {
                Some(DATA_EXT) => {
                    if std::fs::remove_file(&path).is_ok() {
                        count += 1;
                    }
                }
                Some(META_EXT) => {
                    let _ = std::fs::remove_file(&path);
                }
                _ => {}
            }
        }
        Ok(count)
    }
}

/// Information about a cached entry.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// First 32 hex chars of the request hash
    pub hash: String,
    pub capability: Option<Capability>,
    /// Text, prompt or query the entry was produced for
    pub payload: Option<String>,
    pub size_bytes: u64,
    pub path: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn cache_in(dir: &TempDir) -> ArtifactCache {
        ArtifactCache::new(dir.path().join("cache"))
    }

    #[test]
    fn test_default_dir_path_structure() {
        let dir = ArtifactCache::default_dir();
        let names: Vec<_> = dir
            .components()
            .filter_map(|c| c.as_os_str().to_str())
            .collect();
        let app = names.iter().position(|&s| s == "shorts-relay").unwrap();
        assert_eq!(names[app + 1], "artifacts");
    }

    #[test]
    fn test_hash_is_filesystem_safe() {
        let hash = ArtifactCache::hash_request(&FallbackRequest::text("what? !@#$%"));
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(hash.len(), 32);
    }

    #[test]
    fn test_hash_depends_on_params() {
        let a = ArtifactCache::hash_request(&FallbackRequest::speech("hi"));
        let b = ArtifactCache::hash_request(&FallbackRequest::speech("hi").with_language("de"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_get_returns_none_for_missing() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert!(cache.get(&FallbackRequest::speech("nothing here")).is_none());
    }

    #[test]
    fn test_store_and_get_bytes() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::speech("hello");

        let path = cache.store(&request, &Output::Bytes(b"ID3 audio".to_vec())).unwrap();
        assert!(path.exists());
        assert_eq!(cache.get(&request), Some(Output::Bytes(b"ID3 audio".to_vec())));
    }

    #[test]
    fn test_text_capability_round_trips_as_text() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::text("ask me something");

        cache
            .store(&request, &Output::Text("What is 2+2?".to_string()))
            .unwrap();
        assert_eq!(
            cache.get(&request),
            Some(Output::Text("What is 2+2?".to_string()))
        );
    }

    #[test]
    fn test_store_overwrites_existing() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::image_search("ocean");

        cache.store(&request, &Output::Bytes(vec![1])).unwrap();
        cache.store(&request, &Output::Bytes(vec![2, 2])).unwrap();
        assert_eq!(cache.get(&request), Some(Output::Bytes(vec![2, 2])));
    }

    #[test]
    fn test_empty_file_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::speech("x");
        let path = cache.store(&request, &Output::Bytes(vec![9])).unwrap();
        fs::write(&path, b"").unwrap();
        assert!(cache.get(&request).is_none());
    }

    #[test]
    fn test_list_entries_reads_metadata() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store(&FallbackRequest::image_search("red fox"), &Output::Bytes(vec![0; 2048]))
            .unwrap();

        let entries = cache.list_entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].capability, Some(Capability::ImageSearch));
        assert_eq!(entries[0].payload.as_deref(), Some("red fox"));
        assert_eq!(entries[0].size_bytes, 2048);
    }

    #[test]
    fn test_list_entries_without_metadata() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::speech("bare");
        cache.store(&request, &Output::Bytes(vec![1])).unwrap();
        fs::remove_file(cache.meta_path(&ArtifactCache::hash_request(&request))).unwrap();

        let entries = cache.list_entries().unwrap();
        assert!(entries[0].capability.is_none());
        assert!(entries[0].payload.is_none());
    }

    #[test]
    fn test_remove_entry() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::speech("bye");
        cache.store(&request, &Output::Bytes(vec![1])).unwrap();

        let hash = ArtifactCache::hash_request(&request);
        assert!(cache.remove(&hash).unwrap());
        assert!(cache.get(&request).is_none());
        assert!(!cache.meta_path(&hash).exists());
        assert!(!cache.remove(&hash).unwrap());
    }

    #[test]
    fn test_cleanup_zero_limit_removes_everything() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        for i in 0..3 {
            cache
                .store(&FallbackRequest::speech(format!("line {}", i)), &Output::Bytes(vec![0; 1024]))
                .unwrap();
        }
        assert_eq!(cache.total_size_bytes().unwrap(), 3072);

        cache.cleanup_if_needed(0).unwrap();
        assert_eq!(cache.total_size_bytes().unwrap(), 0);
        assert!(cache.list_entries().unwrap().is_empty());
    }

    #[test]
    fn test_cleanup_under_limit_keeps_entries() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        let request = FallbackRequest::speech("keep");
        cache
            .store_with_cleanup(&request, &Output::Bytes(vec![0; 1024]), 10)
            .unwrap();
        assert!(cache.get(&request).is_some());
    }

    #[test]
    fn test_cleanup_ignores_foreign_files() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        cache
            .store(&FallbackRequest::speech("a"), &Output::Bytes(vec![0; 10]))
            .unwrap();
        let notes = cache.cache_dir().join("notes.txt");
        fs::write(&notes, b"mine").unwrap();

        cache.cleanup_if_needed(0).unwrap();
        assert!(notes.exists());
    }

    #[test]
    fn test_clear_all() {
        let dir = TempDir::new().unwrap();
        let cache = cache_in(&dir);
        assert_eq!(cache.clear_all().unwrap(), 0);

        for q in ["a", "b"] {
            cache
                .store(&FallbackRequest::image_search(q), &Output::Bytes(vec![1]))
                .unwrap();
        }
        assert_eq!(cache.clear_all().unwrap(), 2);
        assert!(cache.list_entries().unwrap().is_empty());
        let leftovers = fs::read_dir(cache.cache_dir()).unwrap().count();
        assert_eq!(leftovers, 0);
    }

    #[test]
    fn test_nonexistent_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let cache = ArtifactCache::new(dir.path().join("missing"));
        assert!(cache.list_entries().unwrap().is_empty());
        assert_eq!(cache.total_size_bytes().unwrap(), 0);
        cache.cleanup_if_needed(0).unwrap();
    }
}
