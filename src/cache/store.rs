//! Two-tier cache store with single-flight fetch

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::Result;

use super::entry::{parse_headers, serialize_headers};
use super::{
    CacheEntry, CacheKey, RequestMirror, REQUEST_BODY_FILE, REQUEST_HEADERS_FILE,
    RESPONSE_BODY_FILE, RESPONSE_HEADERS_FILE,
};

/// Cache statistics
#[derive(Debug, Clone, Copy)]
pub struct CacheStats {
    /// Memory-tier hits
    pub memory_hits: usize,
    /// Disk-tier hits (memory miss, disk present)
    pub disk_hits: usize,
    /// Misses at both tiers
    pub misses: usize,
    /// Entries currently in the memory tier
    pub memory_size: usize,
}

/// Layered storage of captured exchanges.
///
/// The memory tier is strictly a cache of the disk tier: only `put` and
/// disk-read backfill populate it, so whatever it holds mirrors a
/// published entry directory. The disk tier is authoritative and survives
/// restart.
pub struct CacheStore {
    root: PathBuf,
    memory: DashMap<String, CacheEntry>,
    /// Per-key single-flight locks; distinct keys never contend
    locks: DashMap<String, Arc<Mutex<()>>>,
    memory_hits: AtomicUsize,
    disk_hits: AtomicUsize,
    misses: AtomicUsize,
}

impl CacheStore {
    /// Create a store rooted at the given cache directory
    #[must_use]
    pub fn new(root: PathBuf) -> Self {
        Self {
            root,
            memory: DashMap::new(),
            locks: DashMap::new(),
            memory_hits: AtomicUsize::new(0),
            disk_hits: AtomicUsize::new(0),
            misses: AtomicUsize::new(0),
        }
    }

    /// Absolute directory for one key's entry
    #[must_use]
    pub fn entry_dir(&self, key: &CacheKey) -> PathBuf {
        self.root.join(key.relative_dir())
    }

    /// Look up an entry: memory tier first, then disk.
    ///
    /// A disk hit backfills the memory tier before returning. Absence at
    /// both tiers is a normal result, not an error.
    pub fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let id = key.canonical();

        if let Some(entry) = self.memory.get(&id) {
            self.memory_hits.fetch_add(1, Ordering::Relaxed);
            debug!("memory hit: {id}");
            return Ok(Some(entry.clone()));
        }

        let dir = self.entry_dir(key);
        match read_entry(&dir)? {
            Some(entry) => {
                self.disk_hits.fetch_add(1, Ordering::Relaxed);
                debug!("disk hit: {id}");
                self.memory.insert(id, entry.clone());
                Ok(Some(entry))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
        }
    }

    /// Store an entry in both tiers.
    ///
    /// The memory tier is written immediately; the disk persist must
    /// complete before the call returns. On a disk failure the memory copy
    /// is removed again so the tiers cannot diverge.
    pub fn put(&self, key: &CacheKey, entry: &CacheEntry) -> Result<()> {
        let id = key.canonical();
        self.memory.insert(id.clone(), entry.clone());

        let dir = self.entry_dir(key);
        if let Err(e) = write_entry(&dir, entry) {
            warn!("disk persist failed for {id}: {e}");
            self.memory.remove(&id);
            return Err(e);
        }

        debug!("stored entry: {id}");
        Ok(())
    }

    /// Look up an entry, invoking `producer` to fetch it on a miss.
    ///
    /// At most one producer runs per key at a time: concurrent callers for
    /// an unresolved key await the winner's in-flight fetch and receive
    /// its entry. A failed producer leaves nothing cached; the next caller
    /// re-attempts.
    pub async fn fetch_or_create<F, Fut>(&self, key: &CacheKey, producer: F) -> Result<CacheEntry>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<CacheEntry>>,
    {
        let lock = {
            let slot = self
                .locks
                .entry(key.canonical())
                .or_insert_with(|| Arc::new(Mutex::new(())));
            Arc::clone(slot.value())
        };
        let _guard = lock.lock().await;

        // Losers of the lock race land here after the winner published
        if let Some(entry) = self.get(key)? {
            return Ok(entry);
        }

        let entry = producer().await?;
        self.put(key, &entry)?;
        Ok(entry)
    }

    /// Drop the memory tier, simulating a process restart.
    ///
    /// Disk entries are untouched; the next `get` per key reloads from
    /// disk.
    pub fn forget_memory(&self) {
        self.memory.clear();
    }

    /// Current statistics
    #[must_use]
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            memory_hits: self.memory_hits.load(Ordering::Relaxed),
            disk_hits: self.disk_hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            memory_size: self.memory.len(),
        }
    }
}

/// Read one entry directory; `None` unless both response files are present
fn read_entry(dir: &Path) -> Result<Option<CacheEntry>> {
    let headers_path = dir.join(RESPONSE_HEADERS_FILE);
    let body_path = dir.join(RESPONSE_BODY_FILE);

    if !headers_path.exists() || !body_path.exists() {
        return Ok(None);
    }

    let headers_text = fs::read_to_string(&headers_path)?;
    let (status, headers) = parse_headers(&headers_path.display().to_string(), &headers_text)?;
    let body = fs::read(&body_path)?;

    let request = read_request_mirror(dir)?;

    Ok(Some(CacheEntry {
        status,
        headers,
        body,
        request,
    }))
}

fn read_request_mirror(dir: &Path) -> Result<RequestMirror> {
    let headers_path = dir.join(REQUEST_HEADERS_FILE);
    let body_path = dir.join(REQUEST_BODY_FILE);

    let headers = if headers_path.exists() {
        let text = fs::read_to_string(&headers_path)?;
        parse_headers(&headers_path.display().to_string(), &text)?.1
    } else {
        Vec::new()
    };

    let body = if body_path.exists() {
        fs::read(&body_path)?
    } else {
        Vec::new()
    };

    Ok(RequestMirror { headers, body })
}

/// Persist one entry directory.
///
/// Each file is written to a temp name and renamed into place, with
/// `response_headers` published last: a concurrent reader gates on that
/// file, so it observes either no entry or a complete one.
fn write_entry(dir: &Path, entry: &CacheEntry) -> Result<()> {
    fs::create_dir_all(dir)?;

    publish(dir, REQUEST_BODY_FILE, &entry.request.body)?;
    publish(
        dir,
        REQUEST_HEADERS_FILE,
        serialize_headers(None, &entry.request.headers).as_bytes(),
    )?;
    publish(dir, RESPONSE_BODY_FILE, &entry.body)?;
    publish(
        dir,
        RESPONSE_HEADERS_FILE,
        serialize_headers(Some(entry.status), &entry.headers).as_bytes(),
    )?;

    Ok(())
}

fn publish(dir: &Path, name: &str, contents: &[u8]) -> Result<()> {
    let tmp = dir.join(format!(".tmp.{name}"));
    fs::write(&tmp, contents)?;
    fs::rename(&tmp, dir.join(name))?;
    Ok(())
}
