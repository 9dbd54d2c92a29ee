pub mod app;
pub mod blocklist;
pub mod browser;
pub mod crawler;
pub mod error;
pub mod gallery;
pub mod logging;
pub mod logsink;
pub mod models;
pub mod orchestrator;
pub mod parser;
pub mod ssge_scraper;
pub mod store;
pub mod tui;
