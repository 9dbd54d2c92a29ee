use anyhow::Result;
use clap::{Parser, Subcommand};
use housegallery::app::{App, AppConfig, Command};
use housegallery::gallery::GalleryStrategy;
use housegallery::logging;
use housegallery::orchestrator::RunKind;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Duration;
use tracing::info;

#[derive(Parser, Debug)]
#[clap(author, version, about = "Housegallery - listing photo collector for home.ss.ge")]
struct Args {
    /// Path to the listings CSV file
    #[clap(long, default_value = "listings.csv")]
    listings: PathBuf,

    /// Path to the blocked image URLs CSV file
    #[clap(long, default_value = "blocked_urls.csv")]
    blocklist: PathBuf,

    /// Path to the activity log read back by `status`
    #[clap(long, default_value = "autostart.log")]
    log_file: PathBuf,

    /// Show the browser window instead of running headless
    #[clap(long)]
    headful: bool,

    /// Bound gallery paging by the on-page "X / Y" counter instead of waiting for it to stabilize
    #[clap(long)]
    counter: bool,

    /// Enable debug output
    #[clap(short, long)]
    debug: bool,

    #[clap(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Start the recurring sweep and accept console commands (default)
    Serve {
        /// Seconds between recurring sweeps of the first result pages
        #[clap(long, default_value = "300")]
        interval: u64,

        /// Do not start the recurring sweep
        #[clap(long)]
        no_autostart: bool,
    },
    /// Crawl one page of the default category and exit
    Crawl {
        /// Result page to crawl
        #[clap(long, default_value = "1")]
        page: usize,
    },
    /// Crawl every category until its pages run out and exit
    Sweep,
    /// Add an image URL to the blocklist
    Block { url: String },
    /// Print crawl state, blocked URLs and the activity log
    Status,
}

fn main() -> Result<()> {
    let args = Args::parse();
    logging::init(args.debug);

    let mut config = AppConfig {
        listings_path: args.listings.clone(),
        blocklist_path: args.blocklist.clone(),
        log_path: args.log_file.clone(),
        ..AppConfig::default()
    };
    config.browser.headless = !args.headful;
    if args.counter {
        config.extractor.strategy = GalleryStrategy::Counter { default_count: 30 };
    }

    let command = args.command.unwrap_or(Cmd::Serve {
        interval: 300,
        no_autostart: false,
    });
    match &command {
        Cmd::Serve { interval, .. } => {
            config.crawl.recurring_interval = Duration::from_secs(*interval)
        }
        Cmd::Crawl { page } => config.crawl.single_page = *page,
        _ => {}
    }

    let app = App::build(config)?;
    info!(
        "Loaded {} listings and {} blocked URLs",
        app.status()?.listing_count,
        app.blocklist.len()
    );

    match command {
        Cmd::Serve { no_autostart, .. } => serve(&app, !no_autostart)?,
        Cmd::Crawl { .. } => {
            app.orchestrator.run_foreground(RunKind::SinglePage)?;
            app.extractor.shutdown();
        }
        Cmd::Sweep => {
            app.orchestrator.run_foreground(RunKind::FullSweep)?;
            app.extractor.shutdown();
        }
        Cmd::Block { url } => println!("{}", app.handle(Command::Block(url))?),
        Cmd::Status => app.status()?.print()?,
    }

    Ok(())
}

fn serve(app: &App, autostart: bool) -> Result<()> {
    if autostart {
        app.orchestrator.spawn_recurring()?;
    }

    println!("{}", Command::HELP);
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }

        match Command::parse(&line) {
            Some(Command::Quit) => break,
            Some(command) => match app.handle(command) {
                Ok(reply) if reply.is_empty() => {}
                Ok(reply) => println!("{}", reply),
                Err(e) => eprintln!("Error: {:#}", e),
            },
            None => println!("Unknown command. {}", Command::HELP),
        }
        io::stdout().flush()?;
    }

    app.orchestrator.stop();
    Ok(())
}
