use crate::models::BlockedUrl;
use anyhow::{Context, Result};
use std::collections::HashSet;
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, info};

/// Persistent backing collection for blocked image URLs.
pub trait BlocklistStore: Send + Sync {
    fn load(&self) -> Result<Vec<String>>;
    fn append(&self, url: &str) -> Result<()>;
}

/// One `url` column per row, appended as URLs are blocked.
pub struct CsvBlocklistStore {
    path: PathBuf,
}

impl CsvBlocklistStore {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }
}

impl BlocklistStore for CsvBlocklistStore {
    fn load(&self) -> Result<Vec<String>> {
        if !self.path.exists() {
            debug!("Blocklist file does not exist yet: {}", self.path.display());
            return Ok(Vec::new());
        }

        let file = File::open(&self.path)
            .context(format!("Failed to open blocklist: {}", self.path.display()))?;
        let mut reader = csv::Reader::from_reader(file);

        let mut urls = Vec::new();
        for result in reader.deserialize::<BlockedUrl>() {
            let record = result.context("Failed to read blocklist row")?;
            urls.push(record.url);
        }

        Ok(urls)
    }

    fn append(&self, url: &str) -> Result<()> {
        let needs_header = std::fs::metadata(&self.path)
            .map(|m| m.len() == 0)
            .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!(
                "Failed to open blocklist for writing: {}",
                self.path.display()
            ))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer.serialize(BlockedUrl {
            url: url.to_string(),
        })?;
        writer.flush()?;

        Ok(())
    }
}

/// In-memory view of the blocklist, kept consistent with its backing store.
pub struct Blocklist {
    urls: RwLock<HashSet<String>>,
    store: Box<dyn BlocklistStore>,
}

impl Blocklist {
    /// Loads every persisted URL once.
    pub fn load(store: Box<dyn BlocklistStore>) -> Result<Self> {
        let urls: HashSet<String> = store.load()?.into_iter().collect();
        info!("Loaded {} blocked URLs", urls.len());

        Ok(Self {
            urls: RwLock::new(urls),
            store,
        })
    }

    pub fn contains(&self, url: &str) -> bool {
        self.urls
            .read()
            .map(|urls| urls.contains(url))
            .unwrap_or(false)
    }

    /// Blocks `url`. Returns `false` when it was empty or already blocked.
    ///
    /// The write lock is held across the persistent append, so readers see
    /// either neither or both.
    pub fn add(&self, url: &str) -> Result<bool> {
        let url = url.trim();
        if url.is_empty() {
            return Ok(false);
        }

        let mut urls = self
            .urls
            .write()
            .map_err(|_| anyhow::anyhow!("Blocklist lock poisoned"))?;
        if urls.contains(url) {
            return Ok(false);
        }

        self.store.append(url)?;
        urls.insert(url.to_string());
        info!(url, "Blocked image URL");

        Ok(true)
    }

    pub fn len(&self) -> usize {
        self.urls.read().map(|urls| urls.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sorted copy of all blocked URLs.
    pub fn snapshot(&self) -> Vec<String> {
        let mut urls: Vec<String> = self
            .urls
            .read()
            .map(|urls| urls.iter().cloned().collect())
            .unwrap_or_default();
        urls.sort();
        urls
    }
}
