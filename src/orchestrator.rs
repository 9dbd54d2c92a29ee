//! Crawl lifecycle: at most one manual run at a time, plus the recurring
//! background sweep of the first result pages.

use crate::crawler::PageCrawler;
use crate::logsink::LogSink;
use crate::models::{Category, Listing};
use anyhow::{Context, Result};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunKind {
    /// One page of the default category, page 1 unless configured otherwise.
    SinglePage,
    /// Every category, each paged until exhausted.
    FullSweep,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlState {
    Idle,
    Running(RunKind),
    /// Stop was requested; the worker has not reached a page boundary yet.
    StopRequested,
}

impl fmt::Display for CrawlState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CrawlState::Idle => write!(f, "idle"),
            CrawlState::Running(RunKind::SinglePage) => write!(f, "running (single page)"),
            CrawlState::Running(RunKind::FullSweep) => write!(f, "running (full sweep)"),
            CrawlState::StopRequested => write!(f, "stopping"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    /// Nothing was started; carries the state that prevented it.
    AlreadyRunning(CrawlState),
}

#[derive(Debug, Clone)]
pub struct CrawlOptions {
    pub default_category: Category,
    /// Page crawled by a single-page run.
    pub single_page: usize,
    pub sweep_categories: Vec<Category>,
    /// Pages crawled by every recurring cycle.
    pub recurring_pages: Vec<usize>,
    pub recurring_interval: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self {
            default_category: Category::default(),
            single_page: 1,
            sweep_categories: Category::all(),
            recurring_pages: vec![1, 2],
            recurring_interval: Duration::from_secs(300),
        }
    }
}

struct Shared {
    crawler: Arc<PageCrawler>,
    sink: Arc<LogSink>,
    options: CrawlOptions,
    state: Mutex<CrawlState>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

/// Owns the crawl state machine and the worker threads that act on it.
#[derive(Clone)]
pub struct Orchestrator {
    shared: Arc<Shared>,
}

impl Orchestrator {
    pub fn new(crawler: Arc<PageCrawler>, sink: Arc<LogSink>, options: CrawlOptions) -> Self {
        Self {
            shared: Arc::new(Shared {
                crawler,
                sink,
                options,
                state: Mutex::new(CrawlState::Idle),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> CrawlState {
        *self.shared.lock_state()
    }

    /// Starts a background run of `kind` unless a run is active or stopping.
    pub fn start(&self, kind: RunKind) -> Result<StartOutcome> {
        {
            let mut state = self.shared.lock_state();
            if *state != CrawlState::Idle {
                info!("Crawl already {}, ignoring start", *state);
                return Ok(StartOutcome::AlreadyRunning(*state));
            }
            *state = CrawlState::Running(kind);
        }

        let shared = self.shared.clone();
        let spawned = thread::Builder::new()
            .name("crawl-worker".to_string())
            .spawn(move || shared.run(kind));

        match spawned {
            Ok(handle) => {
                let mut worker = self.shared.lock_worker();
                // The previous worker already returned the state to Idle
                if let Some(previous) = worker.replace(handle) {
                    let _ = previous.join();
                }
                Ok(StartOutcome::Started)
            }
            Err(e) => {
                *self.shared.lock_state() = CrawlState::Idle;
                Err(e).context("Failed to spawn crawl worker")
            }
        }
    }

    /// Requests the active run to stop at its next page boundary and closes
    /// the browser session. Returns the state before the request.
    pub fn stop(&self) -> CrawlState {
        let previous = {
            let mut state = self.shared.lock_state();
            let previous = *state;
            if let CrawlState::Running(_) = previous {
                *state = CrawlState::StopRequested;
            }
            previous
        };

        info!("Stop requested while {}", previous);
        self.shared.crawler.release_session();
        previous
    }

    /// Blocks until the current manual run, if any, has finished.
    pub fn wait(&self) {
        let handle = self.shared.lock_worker().take();
        if let Some(handle) = handle {
            if handle.join().is_err() {
                error!("Crawl worker panicked");
            }
        }
    }

    /// Starts `kind` and blocks until it finishes.
    pub fn run_foreground(&self, kind: RunKind) -> Result<StartOutcome> {
        let outcome = self.start(kind)?;
        self.wait();
        Ok(outcome)
    }

    /// Spawns the recurring sweep. It runs for the life of the process and is
    /// not affected by start/stop.
    pub fn spawn_recurring(&self) -> Result<JoinHandle<()>> {
        let shared = self.shared.clone();
        thread::Builder::new()
            .name("recurring-sweep".to_string())
            .spawn(move || loop {
                shared.recurring_iteration();
                thread::sleep(shared.options.recurring_interval);
            })
            .context("Failed to spawn recurring sweep")
    }

    /// One recurring cycle with its logging; errors are logged, never returned.
    pub fn recurring_iteration(&self) -> Option<Vec<Listing>> {
        self.shared.recurring_iteration()
    }
}

impl Shared {
    fn lock_state(&self) -> MutexGuard<'_, CrawlState> {
        match self.state.lock() {
            Ok(state) => state,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn lock_worker(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        match self.worker.lock() {
            Ok(worker) => worker,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn stop_requested(&self) -> bool {
        !matches!(*self.lock_state(), CrawlState::Running(_))
    }

    fn run(&self, kind: RunKind) {
        info!("Crawl started: {:?}", kind);

        let result = match kind {
            RunKind::SinglePage => self
                .crawler
                .crawl_category_page(&self.options.default_category, self.options.single_page)
                .map(|page| page.into_listings()),
            RunKind::FullSweep => self.full_sweep(),
        };

        match result {
            Ok(listings) => info!("Crawl {:?} finished with {} new listings", kind, listings.len()),
            Err(e) => error!("Crawl {:?} failed: {:#}", kind, e),
        }

        *self.lock_state() = CrawlState::Idle;
    }

    fn full_sweep(&self) -> Result<Vec<Listing>> {
        let mut all = Vec::new();
        let stop = || self.stop_requested();

        for category in &self.options.sweep_categories {
            if stop() {
                info!("Stop requested, ending sweep before {}", category);
                break;
            }
            info!("Sweeping category {}", category);
            all.extend(self.crawler.crawl_pages(category, 1, &stop)?);
        }

        Ok(all)
    }

    fn recurring_cycle(&self) -> Result<Vec<Listing>> {
        let mut fetched = Vec::new();
        for page in &self.options.recurring_pages {
            let listings = self
                .crawler
                .crawl_category_page(&self.options.default_category, *page)?
                .into_listings();
            info!("Recurring sweep fetched {} listings from page {}", listings.len(), page);
            fetched.extend(listings);
        }
        Ok(fetched)
    }

    fn recurring_iteration(&self) -> Option<Vec<Listing>> {
        info!(
            "Recurring sweep fetching pages {:?} of {}",
            self.options.recurring_pages, self.options.default_category
        );

        match self.recurring_cycle() {
            Ok(listings) => {
                for listing in &listings {
                    info!("Fetched listing ID: {}", listing.id);
                    for photo in &listing.photos {
                        info!("Fetched image link: {}", photo);
                    }
                }

                let message = format!(
                    "Autostart fetched {} listings from the first {} pages.",
                    listings.len(),
                    self.options.recurring_pages.len()
                );
                if let Err(e) = self.sink.append(&message) {
                    warn!("Failed to write log sink: {:#}", e);
                }
                Some(listings)
            }
            Err(e) => {
                error!("Autostart error: {:#}", e);
                if let Err(sink_err) = self.sink.append(&format!("Autostart error: {:#}", e)) {
                    warn!("Failed to write log sink: {:#}", sink_err);
                }
                None
            }
        }
    }
}
