use crate::blocklist::{Blocklist, CsvBlocklistStore};
use crate::browser::{BrowserSettings, ChromeAgent, GallerySelectors};
use crate::crawler::PageCrawler;
use crate::gallery::{ExtractorSettings, GalleryExtractor};
use crate::logsink::LogSink;
use crate::orchestrator::{CrawlOptions, Orchestrator, RunKind, StartOutcome};
use crate::ssge_scraper::HttpFetcher;
use crate::store::{CsvListingStore, ListingStore};
use crate::tui::StatusReport;
use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listings_path: PathBuf,
    pub blocklist_path: PathBuf,
    pub log_path: PathBuf,
    pub browser: BrowserSettings,
    pub selectors: GallerySelectors,
    pub extractor: ExtractorSettings,
    pub crawl: CrawlOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            listings_path: PathBuf::from("listings.csv"),
            blocklist_path: PathBuf::from("blocked_urls.csv"),
            log_path: PathBuf::from("autostart.log"),
            browser: BrowserSettings::default(),
            selectors: GallerySelectors::default(),
            extractor: ExtractorSettings::default(),
            crawl: CrawlOptions::default(),
        }
    }
}

/// All long-lived components, wired together once at startup.
pub struct App {
    pub blocklist: Arc<Blocklist>,
    pub store: Arc<CsvListingStore>,
    pub extractor: Arc<GalleryExtractor>,
    pub sink: Arc<LogSink>,
    pub orchestrator: Orchestrator,
}

impl App {
    pub fn build(config: AppConfig) -> Result<Self> {
        let blocklist = Arc::new(
            Blocklist::load(Box::new(CsvBlocklistStore::new(&config.blocklist_path)))
                .context("Failed to load blocklist")?,
        );
        let store = Arc::new(
            CsvListingStore::open(&config.listings_path).context("Failed to open listing store")?,
        );
        let sink = Arc::new(LogSink::new(&config.log_path));

        let agent = ChromeAgent::new(config.browser.clone(), config.selectors.clone());
        let extractor = Arc::new(GalleryExtractor::new(
            Box::new(agent),
            blocklist.clone(),
            &config.selectors,
            config.extractor.clone(),
        )?);

        let crawler = Arc::new(PageCrawler::new(
            Arc::new(HttpFetcher::new()?),
            extractor.clone(),
            store.clone(),
            blocklist.clone(),
        ));
        let orchestrator = Orchestrator::new(crawler, sink.clone(), config.crawl);

        Ok(Self {
            blocklist,
            store,
            extractor,
            sink,
            orchestrator,
        })
    }

    pub fn status(&self) -> Result<StatusReport> {
        Ok(StatusReport {
            state: self.orchestrator.state(),
            listing_count: self.store.len()?,
            blocked_urls: self.blocklist.snapshot(),
            log: self.sink.read_all()?,
        })
    }

    /// Runs one console command and returns the line to show the operator.
    pub fn handle(&self, command: Command) -> Result<String> {
        match command {
            Command::Block(url) => {
                if self.blocklist.add(&url)? {
                    Ok(format!("Blocked {}", url))
                } else {
                    Ok("Already blocked or empty, nothing to do".to_string())
                }
            }
            Command::Start(kind) => Ok(match self.orchestrator.start(kind)? {
                StartOutcome::Started => format!("Started {:?}", kind),
                StartOutcome::AlreadyRunning(state) => format!("Crawl already {}", state),
            }),
            Command::Stop => {
                let previous = self.orchestrator.stop();
                Ok(format!("Stopped (was {})", previous))
            }
            Command::Status => {
                self.status()?.print()?;
                Ok(String::new())
            }
            Command::Help => Ok(Command::HELP.to_string()),
            Command::Quit => Ok("Bye".to_string()),
        }
    }
}

/// Operator commands read from the console while serving.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Block(String),
    Start(RunKind),
    Stop,
    Status,
    Help,
    Quit,
}

impl Command {
    pub const HELP: &'static str =
        "Commands: block <url> | start | start-full | stop | status | help | quit";

    pub fn parse(line: &str) -> Option<Command> {
        let line = line.trim();
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        match verb.to_lowercase().as_str() {
            "block" | "add_url" if !rest.is_empty() => Some(Command::Block(rest.to_string())),
            "start" | "start_scraper" => Some(Command::Start(RunKind::SinglePage)),
            "start-full" | "start_selenium" => Some(Command::Start(RunKind::FullSweep)),
            "stop" | "stop_scraper" => Some(Command::Stop),
            "status" => Some(Command::Status),
            "help" | "?" => Some(Command::Help),
            "quit" | "exit" => Some(Command::Quit),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_parse_with_aliases() {
        assert_eq!(
            Command::parse("block https://static.ss.ge/logo.png "),
            Some(Command::Block("https://static.ss.ge/logo.png".to_string()))
        );
        assert_eq!(Command::parse("block"), None);
        assert_eq!(Command::parse("start"), Some(Command::Start(RunKind::SinglePage)));
        assert_eq!(
            Command::parse("start_selenium"),
            Some(Command::Start(RunKind::FullSweep))
        );
        assert_eq!(Command::parse("STOP"), Some(Command::Stop));
        assert_eq!(Command::parse("  quit  "), Some(Command::Quit));
        assert_eq!(Command::parse("dance"), None);
        assert_eq!(Command::parse(""), None);
    }

    #[test]
    fn build_loads_existing_files_and_blocks_urls() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("blocked_urls.csv"),
            "url\nhttps://static.ss.ge/logo.png\n",
        )
        .unwrap();

        let config = AppConfig {
            listings_path: dir.path().join("listings.csv"),
            blocklist_path: dir.path().join("blocked_urls.csv"),
            log_path: dir.path().join("autostart.log"),
            ..AppConfig::default()
        };
        let app = App::build(config).unwrap();

        assert!(app.blocklist.contains("https://static.ss.ge/logo.png"));
        assert_eq!(
            app.handle(Command::Block("https://static.ss.ge/logo.png".into()))
                .unwrap(),
            "Already blocked or empty, nothing to do"
        );
        assert_eq!(
            app.handle(Command::Block("https://static.ss.ge/stamp.png".into()))
                .unwrap(),
            "Blocked https://static.ss.ge/stamp.png"
        );

        let status = app.status().unwrap();
        assert_eq!(status.listing_count, 0);
        assert_eq!(status.blocked_urls.len(), 2);
        assert_eq!(app.handle(Command::Stop).unwrap(), "Stopped (was idle)");
    }
}
