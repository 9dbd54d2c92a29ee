use crate::blocklist::Blocklist;
use crate::gallery::GalleryExtractor;
use crate::models::{Category, Listing, PageResult};
use crate::ssge_scraper;
use crate::store::{Insertion, ListingStore};
use anyhow::Result;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Raw response for one search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FetchOutcome {
    Document(String),
    Forbidden,
    /// Any other non-success status.
    Unavailable(u16),
}

pub trait PageFetcher: Send + Sync {
    fn fetch(&self, url: &str) -> Result<FetchOutcome>;
}

/// Source of gallery photos for a listing detail page.
pub trait PhotoSource: Send + Sync {
    fn photos(&self, listing_url: &str) -> Vec<String>;

    /// Releases any browser session held between listings.
    fn release_session(&self) {}
}

impl PhotoSource for GalleryExtractor {
    fn photos(&self, listing_url: &str) -> Vec<String> {
        self.extract(listing_url)
    }

    fn release_session(&self) {
        self.shutdown();
    }
}

/// Crawls search-results pages and persists listings with new photos.
pub struct PageCrawler {
    fetcher: Arc<dyn PageFetcher>,
    photos: Arc<dyn PhotoSource>,
    store: Arc<dyn ListingStore>,
    blocklist: Arc<Blocklist>,
}

impl PageCrawler {
    pub fn new(
        fetcher: Arc<dyn PageFetcher>,
        photos: Arc<dyn PhotoSource>,
        store: Arc<dyn ListingStore>,
        blocklist: Arc<Blocklist>,
    ) -> Self {
        Self {
            fetcher,
            photos,
            store,
            blocklist,
        }
    }

    /// Crawls one results page. Fetch problems end the page quietly as
    /// `Exhausted`/`FetchBlocked`; only store failures are errors.
    pub fn crawl_page(&self, url: &str, page: usize) -> Result<PageResult> {
        let html = match self.fetcher.fetch(url) {
            Ok(FetchOutcome::Document(html)) => html,
            Ok(FetchOutcome::Forbidden) => {
                warn!("Access forbidden on page {}", page);
                return Ok(PageResult::FetchBlocked);
            }
            Ok(FetchOutcome::Unavailable(status)) => {
                warn!("Page {} answered with status {}", page, status);
                return Ok(PageResult::Exhausted);
            }
            Err(e) => {
                warn!("Error fetching page {}: {:#}", page, e);
                return Ok(PageResult::Exhausted);
            }
        };

        let (cards, unlinked) = ssge_scraper::parse_listing_cards(&html)?;
        if cards.is_empty() && unlinked == 0 {
            info!("No more listings found on page {}", page);
            return Ok(PageResult::Exhausted);
        }
        if unlinked > 0 {
            debug!("Skipped {} cards without a detail link on page {}", unlinked, page);
        }

        let mut fetched = Vec::new();
        for card in cards {
            if self.store.contains_id(&card.id)? {
                debug!("Listing {} already exists, skipping", card.id);
                continue;
            }

            let photos = self.photos.photos(&card.link);
            if photos.is_empty() {
                info!("Listing {} has no images, skipping", card.id);
                continue;
            }

            // Another run may have stored this listing or its photos while
            // the gallery was being extracted.
            match self.store.insert_new(&card.id, self.unblocked(photos))? {
                Insertion::Inserted(listing) => fetched.push(listing),
                Insertion::KnownId => {
                    debug!("Listing {} was stored during extraction, skipping", card.id)
                }
                Insertion::NoUniquePhotos => {
                    info!("Listing {} has no unique images, skipping", card.id)
                }
            }
        }

        info!("Fetched {} listings from page {}", fetched.len(), page);
        Ok(PageResult::Listings(fetched))
    }

    /// Drops photos blocked by now, including those blocked mid-extraction.
    fn unblocked(&self, photos: Vec<String>) -> BTreeSet<String> {
        photos
            .into_iter()
            .filter(|photo| !self.blocklist.contains(photo))
            .collect()
    }

    /// Crawls `category` page after page from `first_page` until a page has no
    /// listing cards, could not be fetched, or `stop` returns true.
    pub fn crawl_pages(
        &self,
        category: &Category,
        first_page: usize,
        stop: &dyn Fn() -> bool,
    ) -> Result<Vec<Listing>> {
        let mut all = Vec::new();
        let mut page = first_page;

        loop {
            if stop() {
                info!("Stop requested, leaving {} at page {}", category, page);
                break;
            }

            let url = ssge_scraper::category_page_url(category, page);
            match self.crawl_page(&url, page)? {
                PageResult::Listings(listings) => all.extend(listings),
                PageResult::Exhausted | PageResult::FetchBlocked => break,
            }
            page += 1;
        }

        Ok(all)
    }

    /// Crawls a single page of `category`.
    pub fn crawl_category_page(&self, category: &Category, page: usize) -> Result<PageResult> {
        self.crawl_page(&ssge_scraper::category_page_url(category, page), page)
    }

    pub fn release_session(&self) {
        self.photos.release_session();
    }
}
