use crate::models::Listing;
use anyhow::{Context, Result};
use std::collections::{BTreeSet, HashSet};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

/// What [`ListingStore::insert_new`] did with a candidate listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Insertion {
    /// Stored with the photos no other listing had.
    Inserted(Listing),
    /// A listing with this id was already stored.
    KnownId,
    /// Every candidate photo already belongs to a stored listing.
    NoUniquePhotos,
}

/// Persistent collection of ingested listings.
pub trait ListingStore: Send + Sync {
    fn contains_id(&self, id: &str) -> Result<bool>;
    /// Stores `id` with those `photos` not yet held by any listing. The id
    /// check, photo filter and write happen as one step.
    fn insert_new(&self, id: &str, photos: BTreeSet<String>) -> Result<Insertion>;
    fn all(&self) -> Result<Vec<Listing>>;
    fn len(&self) -> Result<usize>;
}

#[derive(Default)]
struct Index {
    listings: Vec<Listing>,
    ids: HashSet<String>,
    photos: HashSet<String>,
}

impl Index {
    fn add(&mut self, listing: Listing) {
        self.ids.insert(listing.id.clone());
        self.photos.extend(listing.photos.iter().cloned());
        self.listings.push(listing);
    }
}

/// Append-only CSV file of listings, fully indexed in memory.
///
/// Every insert is written to disk before the in-memory index is updated,
/// both under the same lock, so lookups always reflect completed writes.
pub struct CsvListingStore {
    path: PathBuf,
    index: Mutex<Index>,
}

impl CsvListingStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut index = Index::default();

        if path.exists() {
            let file = File::open(&path)
                .context(format!("Failed to open listing store: {}", path.display()))?;
            let mut reader = csv::Reader::from_reader(file);

            for result in reader.deserialize::<Listing>() {
                match result {
                    Ok(listing) => {
                        if index.ids.contains(&listing.id) {
                            warn!(id = %listing.id, "Duplicate listing row in store, keeping first");
                            continue;
                        }
                        index.add(listing);
                    }
                    Err(e) => warn!("Skipping unreadable listing row: {}", e),
                }
            }
        } else {
            debug!("Listing store does not exist yet: {}", path.display());
        }

        debug!(
            "Loaded {} listings from {}",
            index.listings.len(),
            path.display()
        );

        Ok(Self {
            path,
            index: Mutex::new(index),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Index>> {
        self.index
            .lock()
            .map_err(|_| anyhow::anyhow!("Listing store lock poisoned"))
    }

    fn append_row(&self, listing: &Listing) -> Result<()> {
        let needs_header = !self.path.exists()
            || std::fs::metadata(&self.path)
                .map(|m| m.len() == 0)
                .unwrap_or(true);

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .context(format!(
                "Failed to open listing store for writing: {}",
                self.path.display()
            ))?;

        let mut writer = csv::WriterBuilder::new()
            .has_headers(needs_header)
            .from_writer(file);
        writer
            .serialize(listing)
            .context(format!("Failed to write listing {}", listing.id))?;
        writer.flush()?;

        Ok(())
    }
}

impl ListingStore for CsvListingStore {
    fn contains_id(&self, id: &str) -> Result<bool> {
        Ok(self.lock()?.ids.contains(id))
    }

    fn insert_new(&self, id: &str, photos: BTreeSet<String>) -> Result<Insertion> {
        let mut index = self.lock()?;
        if index.ids.contains(id) {
            return Ok(Insertion::KnownId);
        }

        let unique: BTreeSet<String> = photos
            .into_iter()
            .filter(|photo| !index.photos.contains(photo))
            .collect();
        if unique.is_empty() {
            return Ok(Insertion::NoUniquePhotos);
        }

        let listing = Listing {
            id: id.to_string(),
            photos: unique,
        };
        self.append_row(&listing)?;
        index.add(listing.clone());

        Ok(Insertion::Inserted(listing))
    }

    fn all(&self) -> Result<Vec<Listing>> {
        Ok(self.lock()?.listings.clone())
    }

    fn len(&self) -> Result<usize> {
        Ok(self.lock()?.listings.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn holds_photo(store: &CsvListingStore, url: &str) -> bool {
        store.lock().unwrap().photos.contains(url)
    }

    fn photos(urls: &[&str]) -> BTreeSet<String> {
        urls.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn inserts_are_visible_and_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.csv");

        let store = CsvListingStore::open(&path).unwrap();
        assert_eq!(store.len().unwrap(), 0);

        store.insert_new("101", photos(&["a.jpg", "b.jpg"])).unwrap();
        store.insert_new("102", photos(&["c.jpg"])).unwrap();

        assert!(store.contains_id("101").unwrap());
        assert!(holds_photo(&store, "c.jpg"));
        assert!(!holds_photo(&store, "d.jpg"));

        let reopened = CsvListingStore::open(&path).unwrap();
        assert_eq!(reopened.all().unwrap(), store.all().unwrap());
        assert!(holds_photo(&reopened, "b.jpg"));
    }

    #[test]
    fn known_id_is_reported_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("listings.csv");
        let store = CsvListingStore::open(&path).unwrap();

        store.insert_new("101", photos(&["a.jpg"])).unwrap();
        assert_eq!(
            store.insert_new("101", photos(&["z.jpg"])).unwrap(),
            Insertion::KnownId
        );

        assert_eq!(store.len().unwrap(), 1);
        assert!(!holds_photo(&store, "z.jpg"));
        assert_eq!(CsvListingStore::open(&path).unwrap().len().unwrap(), 1);
    }

    #[test]
    fn photos_held_by_other_listings_are_filtered_at_insert() {
        let dir = tempfile::tempdir().unwrap();
        let store = CsvListingStore::open(dir.path().join("listings.csv")).unwrap();

        store.insert_new("101", photos(&["a.jpg", "b.jpg"])).unwrap();

        assert_eq!(
            store.insert_new("102", photos(&["b.jpg", "c.jpg"])).unwrap(),
            Insertion::Inserted(Listing::new("102", ["c.jpg".to_string()]))
        );
        assert_eq!(
            store.insert_new("103", photos(&["a.jpg", "c.jpg"])).unwrap(),
            Insertion::NoUniquePhotos
        );
        assert!(!store.contains_id("103").unwrap());
        assert_eq!(store.len().unwrap(), 2);
    }
}
