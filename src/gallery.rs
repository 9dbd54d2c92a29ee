//! Photo gallery extraction for a single listing.
//!
//! Galleries render their items asynchronously after each "next" click, so the
//! number of items visible in a snapshot is not a reliable page count. The
//! default strategy keeps paging until the item count has stayed the same for
//! `max_retries` consecutive snapshots, which also ends galleries that cycle
//! back to the first image. When the gallery shows an "X / Y" counter the
//! counter strategy pages exactly Y times instead.

use crate::blocklist::Blocklist;
use crate::browser::{GallerySelectors, NextControl, RenderingAgent};
use crate::error::AgentError;
use crate::parser::CounterParser;
use scraper::{Html, Selector};
use std::collections::BTreeSet;
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryStrategy {
    /// Stop after `max_retries` consecutive snapshots with an unchanged item count.
    Stability { max_retries: usize },
    /// Page as many times as the on-page counter says, or `default_count` if it
    /// cannot be read.
    Counter { default_count: usize },
}

impl Default for GalleryStrategy {
    fn default() -> Self {
        GalleryStrategy::Stability { max_retries: 10 }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorSettings {
    pub strategy: GalleryStrategy,
    /// Pause after opening the gallery and after each "next" click.
    pub click_settle: Duration,
    /// Pause before the listing tab is closed.
    pub final_settle: Duration,
}

impl Default for ExtractorSettings {
    fn default() -> Self {
        Self {
            strategy: GalleryStrategy::default(),
            click_settle: Duration::from_millis(500),
            final_settle: Duration::from_secs(5),
        }
    }
}

/// What a single gallery snapshot contained.
#[derive(Debug, Default)]
struct Snapshot {
    item_count: usize,
    image_urls: Vec<String>,
    counter: Option<(usize, usize)>,
}

/// Selectors compiled once per extractor.
struct CompiledSelectors {
    item: Selector,
    image: Selector,
    counter: Selector,
    counter_text: CounterParser,
}

impl CompiledSelectors {
    fn compile(selectors: &GallerySelectors) -> anyhow::Result<Self> {
        let parse = |css: &str| {
            Selector::parse(css)
                .map_err(|e| anyhow::anyhow!("Failed to parse selector {}: {:?}", css, e))
        };

        Ok(Self {
            item: parse(&selectors.item)?,
            image: parse(&selectors.image)?,
            counter: parse(&selectors.counter)?,
            counter_text: CounterParser::new()?,
        })
    }

    fn snapshot(&self, html: &str) -> Snapshot {
        let document = Html::parse_document(html);

        let mut snapshot = Snapshot::default();
        for item in document.select(&self.item) {
            snapshot.item_count += 1;

            let Some(img) = item.select(&self.image).next() else {
                continue;
            };
            let src = img
                .value()
                .attr("src")
                .filter(|s| !s.trim().is_empty())
                .or_else(|| img.value().attr("data-src"));

            if let Some(src) = src.map(str::trim).filter(|s| !s.is_empty()) {
                snapshot.image_urls.push(src.to_string());
            }
        }

        snapshot.counter = document
            .select(&self.counter)
            .next()
            .map(|el| el.text().collect::<Vec<_>>().join(" "))
            .and_then(|text| self.counter_text.parse(&text));

        snapshot
    }
}

/// Collects gallery images through a shared rendering agent.
///
/// The agent sits behind a mutex held for a whole extraction, so at most one
/// extraction drives the browser at any time.
pub struct GalleryExtractor {
    agent: Mutex<Box<dyn RenderingAgent>>,
    blocklist: Arc<Blocklist>,
    selectors: CompiledSelectors,
    settings: ExtractorSettings,
}

impl GalleryExtractor {
    pub fn new(
        agent: Box<dyn RenderingAgent>,
        blocklist: Arc<Blocklist>,
        selectors: &GallerySelectors,
        settings: ExtractorSettings,
    ) -> anyhow::Result<Self> {
        Ok(Self {
            agent: Mutex::new(agent),
            blocklist,
            selectors: CompiledSelectors::compile(selectors)?,
            settings,
        })
    }

    /// Distinct, non-blocked image URLs of the listing at `url`.
    ///
    /// Never fails: any browser error yields an empty list after being logged.
    pub fn extract(&self, url: &str) -> Vec<String> {
        let mut agent = match self.agent.lock() {
            Ok(agent) => agent,
            Err(poisoned) => poisoned.into_inner(),
        };

        match self.extract_with(&mut **agent, url) {
            Ok(images) => {
                info!("Extracted {} images from {}", images.len(), url);
                images.into_iter().collect()
            }
            Err(e) => {
                warn!(kind = e.kind(), "Gallery extraction failed for {}: {}", url, e);
                if agent.close_active_tab_and_return().is_err() || e.is_session_fatal() {
                    agent.shutdown();
                }
                Vec::new()
            }
        }
    }

    /// Tears down the browser session, waiting for any extraction in flight.
    pub fn shutdown(&self) {
        let mut agent = match self.agent.lock() {
            Ok(agent) => agent,
            Err(poisoned) => poisoned.into_inner(),
        };
        agent.shutdown();
    }

    fn extract_with(
        &self,
        agent: &mut dyn RenderingAgent,
        url: &str,
    ) -> Result<BTreeSet<String>, AgentError> {
        agent.open_and_navigate(url)?;

        if agent.try_open_gallery() {
            thread::sleep(self.settings.click_settle);
        } else {
            debug!("No gallery control on {}", url);
        }

        let images = match self.settings.strategy {
            GalleryStrategy::Stability { max_retries } => {
                self.collect_until_stable(agent, max_retries)?
            }
            GalleryStrategy::Counter { default_count } => {
                self.collect_by_counter(agent, default_count)?
            }
        };

        thread::sleep(self.settings.final_settle);
        agent.close_active_tab_and_return()?;

        Ok(images)
    }

    fn collect_until_stable(
        &self,
        agent: &mut dyn RenderingAgent,
        max_retries: usize,
    ) -> Result<BTreeSet<String>, AgentError> {
        let mut images = BTreeSet::new();
        let mut prev_item_count = 0;
        let mut retries = 0;

        loop {
            let snapshot = self.selectors.snapshot(&agent.current_document()?);
            self.absorb(&mut images, snapshot.image_urls);

            if snapshot.item_count == prev_item_count {
                retries += 1;
            } else {
                retries = 0;
            }
            prev_item_count = snapshot.item_count;

            if retries >= max_retries {
                debug!(
                    "Gallery stable at {} items after {} retries",
                    prev_item_count, retries
                );
                break;
            }

            if !self.advance(agent)? {
                break;
            }
        }

        Ok(images)
    }

    fn collect_by_counter(
        &self,
        agent: &mut dyn RenderingAgent,
        default_count: usize,
    ) -> Result<BTreeSet<String>, AgentError> {
        let mut images = BTreeSet::new();

        let first = self.selectors.snapshot(&agent.current_document()?);
        let total = match first.counter {
            Some((_, total)) => total,
            None => {
                debug!("Gallery counter unreadable, using {} pages", default_count);
                default_count
            }
        };
        self.absorb(&mut images, first.image_urls);

        for _ in 1..total {
            if !self.advance(agent)? {
                break;
            }
            let snapshot = self.selectors.snapshot(&agent.current_document()?);
            self.absorb(&mut images, snapshot.image_urls);
        }

        Ok(images)
    }

    /// Clicks "next" and waits for it to settle. `false` means pagination ended.
    ///
    /// A control that exists but rejects the click (disabled or hidden on the
    /// last slide) ends pagination like a missing one.
    fn advance(&self, agent: &mut dyn RenderingAgent) -> Result<bool, AgentError> {
        match agent.click_next() {
            Ok(NextControl::Found) => {
                thread::sleep(self.settings.click_settle);
                Ok(true)
            }
            Ok(NextControl::Absent) => {
                debug!("No next control, gallery ends here");
                Ok(false)
            }
            Err(e @ AgentError::Interaction { .. }) => {
                debug!("Next control not clickable, gallery ends here: {}", e);
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    fn absorb(&self, images: &mut BTreeSet<String>, urls: Vec<String>) {
        for url in urls {
            if !self.blocklist.contains(&url) {
                images.insert(url);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::blocklist::BlocklistStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    pub(crate) struct MemoryBlocklistStore(pub Vec<String>);

    impl BlocklistStore for MemoryBlocklistStore {
        fn load(&self) -> anyhow::Result<Vec<String>> {
            Ok(self.0.clone())
        }

        fn append(&self, _url: &str) -> anyhow::Result<()> {
            Ok(())
        }
    }

    pub(crate) fn blocklist(urls: &[&str]) -> Arc<Blocklist> {
        let store = MemoryBlocklistStore(urls.iter().map(|u| u.to_string()).collect());
        Arc::new(Blocklist::load(Box::new(store)).unwrap())
    }

    fn gallery_html(images: &[&str], counter: Option<&str>) -> String {
        let items: String = images
            .iter()
            .map(|src| {
                if let Some(lazy) = src.strip_prefix("lazy:") {
                    format!(
                        r#"<div class="lg-item"><img class="lg-object lg-image" data-src="{}"></div>"#,
                        lazy
                    )
                } else if src.is_empty() {
                    r#"<div class="lg-item"></div>"#.to_string()
                } else {
                    format!(
                        r#"<div class="lg-item"><img class="lg-object lg-image" src="{}"></div>"#,
                        src
                    )
                }
            })
            .collect();
        let counter = counter
            .map(|c| format!(r#"<div class="lg-counter">{}</div>"#, c))
            .unwrap_or_default();
        format!("<html><body>{}{}</body></html>", counter, items)
    }

    /// Replays one scripted document per snapshot; the last one repeats.
    pub(crate) struct ScriptedAgent {
        pub documents: Vec<String>,
        pub next_clicks: Option<usize>,
        pub reject_next_click: bool,
        pub fail_navigation: bool,
        pub snapshots: Arc<AtomicUsize>,
        pub clicks: Arc<AtomicUsize>,
        pub closed: Arc<AtomicUsize>,
        pub shutdowns: Arc<AtomicUsize>,
    }

    impl ScriptedAgent {
        pub(crate) fn new(documents: Vec<String>) -> Self {
            Self {
                documents,
                next_clicks: None,
                reject_next_click: false,
                fail_navigation: false,
                snapshots: Arc::new(AtomicUsize::new(0)),
                clicks: Arc::new(AtomicUsize::new(0)),
                closed: Arc::new(AtomicUsize::new(0)),
                shutdowns: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl RenderingAgent for ScriptedAgent {
        fn open_and_navigate(&mut self, url: &str) -> Result<(), AgentError> {
            if self.fail_navigation {
                return Err(AgentError::Navigation {
                    url: url.to_string(),
                    message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
                });
            }
            Ok(())
        }

        fn try_open_gallery(&mut self) -> bool {
            true
        }

        fn current_document(&mut self) -> Result<String, AgentError> {
            let n = self.snapshots.fetch_add(1, Ordering::SeqCst);
            let index = n.min(self.documents.len().saturating_sub(1));
            Ok(self.documents.get(index).cloned().unwrap_or_default())
        }

        fn click_next(&mut self) -> Result<NextControl, AgentError> {
            let clicks = self.clicks.fetch_add(1, Ordering::SeqCst);
            if self.reject_next_click {
                return Err(AgentError::Interaction {
                    selector: ".lg-next".to_string(),
                    message: "element is not visible".to_string(),
                });
            }
            match self.next_clicks {
                Some(limit) if clicks >= limit => Ok(NextControl::Absent),
                _ => Ok(NextControl::Found),
            }
        }

        fn close_active_tab_and_return(&mut self) -> Result<(), AgentError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        fn shutdown(&mut self) {
            self.shutdowns.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fast_settings(strategy: GalleryStrategy) -> ExtractorSettings {
        ExtractorSettings {
            strategy,
            click_settle: Duration::ZERO,
            final_settle: Duration::ZERO,
        }
    }

    fn extractor(agent: ScriptedAgent, blocked: &[&str], strategy: GalleryStrategy) -> GalleryExtractor {
        GalleryExtractor::new(
            Box::new(agent),
            blocklist(blocked),
            &GallerySelectors::default(),
            fast_settings(strategy),
        )
        .unwrap()
    }

    #[test]
    fn stalled_gallery_stops_after_max_retries() {
        let agent = ScriptedAgent::new(vec![gallery_html(&["a.jpg", "b.jpg", "c.jpg"], None)]);
        let snapshots = agent.snapshots.clone();
        let closed = agent.closed.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::Stability { max_retries: 10 });
        let mut images = extractor.extract("https://home.ss.ge/en/real-estate/flat-1");
        images.sort();

        assert_eq!(images, vec!["a.jpg", "b.jpg", "c.jpg"]);
        // one snapshot that changes the count from 0, then ten unchanged ones
        assert_eq!(snapshots.load(Ordering::SeqCst), 11);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn growing_gallery_resets_retries_and_collects_everything() {
        let agent = ScriptedAgent::new(vec![
            gallery_html(&["a.jpg"], None),
            gallery_html(&["a.jpg", "b.jpg"], None),
            gallery_html(&["a.jpg", "b.jpg", "lazy:c.jpg"], None),
        ]);
        let snapshots = agent.snapshots.clone();

        let extractor = extractor(agent, &["b.jpg"], GalleryStrategy::Stability { max_retries: 3 });
        let mut images = extractor.extract("https://home.ss.ge/en/real-estate/flat-2");
        images.sort();

        assert_eq!(images, vec!["a.jpg", "c.jpg"]);
        assert_eq!(snapshots.load(Ordering::SeqCst), 3 + 3);
    }

    #[test]
    fn missing_next_control_ends_pagination() {
        let mut agent = ScriptedAgent::new(vec![
            gallery_html(&["a.jpg"], None),
            gallery_html(&["a.jpg", "b.jpg"], None),
        ]);
        agent.next_clicks = Some(1);
        let snapshots = agent.snapshots.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::default());
        let images = extractor.extract("https://home.ss.ge/en/real-estate/flat-3");

        assert_eq!(images.len(), 2);
        assert_eq!(snapshots.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn rejected_next_click_keeps_collected_images() {
        let mut agent = ScriptedAgent::new(vec![gallery_html(&["a.jpg", "b.jpg"], None)]);
        agent.reject_next_click = true;
        let snapshots = agent.snapshots.clone();
        let closed = agent.closed.clone();
        let shutdowns = agent.shutdowns.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::default());
        let mut images = extractor.extract("https://home.ss.ge/en/real-estate/flat-8");
        images.sort();

        assert_eq!(images, vec!["a.jpg", "b.jpg"]);
        assert_eq!(snapshots.load(Ordering::SeqCst), 1);
        assert_eq!(closed.load(Ordering::SeqCst), 1);
        assert_eq!(shutdowns.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn rejected_next_click_ends_counter_paging() {
        let mut agent = ScriptedAgent::new(vec![gallery_html(&["a.jpg"], Some("1 / 5"))]);
        agent.reject_next_click = true;
        let clicks = agent.clicks.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::Counter { default_count: 30 });
        assert_eq!(extractor.extract("https://home.ss.ge/en/real-estate/flat-9"), vec!["a.jpg"]);
        assert_eq!(clicks.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn navigation_failure_yields_empty_list() {
        let mut agent = ScriptedAgent::new(vec![gallery_html(&["a.jpg"], None)]);
        agent.fail_navigation = true;
        let snapshots = agent.snapshots.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::default());
        assert!(extractor.extract("https://home.ss.ge/en/real-estate/flat-4").is_empty());
        assert_eq!(snapshots.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn gallery_without_items_is_empty_not_an_error() {
        let agent = ScriptedAgent::new(vec!["<html><body><p>no photos</p></body></html>".to_string()]);
        let snapshots = agent.snapshots.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::Stability { max_retries: 10 });
        assert!(extractor.extract("https://home.ss.ge/en/real-estate/flat-5").is_empty());
        assert_eq!(snapshots.load(Ordering::SeqCst), 10);
    }

    #[test]
    fn counter_bounds_snapshots_exactly() {
        let agent = ScriptedAgent::new(vec![
            gallery_html(&["a.jpg"], Some("1 / 3")),
            gallery_html(&["a.jpg", "b.jpg"], Some("2 / 3")),
            gallery_html(&["a.jpg", "b.jpg", "c.jpg"], Some("3 / 3")),
            gallery_html(&["a.jpg", "b.jpg", "c.jpg", "d.jpg"], Some("1 / 3")),
        ]);
        let snapshots = agent.snapshots.clone();
        let clicks = agent.clicks.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::Counter { default_count: 30 });
        let mut images = extractor.extract("https://home.ss.ge/en/real-estate/flat-6");
        images.sort();

        assert_eq!(images, vec!["a.jpg", "b.jpg", "c.jpg"]);
        assert_eq!(snapshots.load(Ordering::SeqCst), 3);
        assert_eq!(clicks.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn unreadable_counter_falls_back_to_default_count() {
        let agent = ScriptedAgent::new(vec![gallery_html(&["a.jpg", ""], Some("photos"))]);
        let snapshots = agent.snapshots.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::Counter { default_count: 4 });
        assert_eq!(extractor.extract("https://home.ss.ge/en/real-estate/flat-7"), vec!["a.jpg"]);
        assert_eq!(snapshots.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn shutdown_reaches_the_agent() {
        let agent = ScriptedAgent::new(Vec::new());
        let shutdowns = agent.shutdowns.clone();

        let extractor = extractor(agent, &[], GalleryStrategy::default());
        extractor.shutdown();
        assert_eq!(shutdowns.load(Ordering::SeqCst), 1);
    }
}
