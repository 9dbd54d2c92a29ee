use anyhow::Result;
use clap::Parser;
use housegallery::blocklist::{Blocklist, CsvBlocklistStore};
use housegallery::browser::{BrowserSettings, ChromeAgent, GallerySelectors};
use housegallery::gallery::{ExtractorSettings, GalleryExtractor, GalleryStrategy};
use housegallery::logging;
use std::sync::Arc;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Extract the gallery images of one listing")]
struct Args {
    /// Listing detail page URL
    url: String,

    /// Path to the blocked image URLs CSV file
    #[clap(long, default_value = "blocked_urls.csv")]
    blocklist: String,

    /// Use the on-page counter instead of the stability heuristic
    #[clap(long)]
    counter: bool,

    /// Unchanged snapshots tolerated before giving up on a stalled gallery
    #[clap(long, default_value = "10")]
    max_retries: usize,

    /// Show the browser window
    #[clap(long)]
    headful: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let blocklist = Arc::new(Blocklist::load(Box::new(CsvBlocklistStore::new(
        &args.blocklist,
    )))?);

    let browser = BrowserSettings {
        headless: !args.headful,
        ..BrowserSettings::default()
    };
    let selectors = GallerySelectors::default();
    let settings = ExtractorSettings {
        strategy: if args.counter {
            GalleryStrategy::Counter { default_count: 30 }
        } else {
            GalleryStrategy::Stability {
                max_retries: args.max_retries,
            }
        },
        ..ExtractorSettings::default()
    };

    let extractor = GalleryExtractor::new(
        Box::new(ChromeAgent::new(browser, selectors.clone())),
        blocklist,
        &selectors,
        settings,
    )?;

    let images = extractor.extract(&args.url);
    extractor.shutdown();

    println!("Found {} images", images.len());
    for image in images {
        println!("{}", image);
    }

    Ok(())
}
