use crate::orchestrator::CrawlState;
use crossterm::{
    execute,
    style::{Color, Print, ResetColor, SetForegroundColor},
};
use std::io;

/// Everything the status view shows, gathered up front.
pub struct StatusReport {
    pub state: CrawlState,
    pub listing_count: usize,
    pub blocked_urls: Vec<String>,
    pub log: String,
}

struct StatusLine {
    color: Color,
    text: String,
}

impl StatusLine {
    fn new(color: Color, text: impl Into<String>) -> Self {
        Self {
            color,
            text: text.into(),
        }
    }
}

impl StatusReport {
    fn lines(&self) -> Vec<StatusLine> {
        let state_color = match self.state {
            CrawlState::Idle => Color::DarkGrey,
            CrawlState::Running(_) => Color::Green,
            CrawlState::StopRequested => Color::Yellow,
        };

        let mut lines = vec![
            StatusLine::new(state_color, format!("🔍 Crawl: {}", self.state)),
            StatusLine::new(
                Color::White,
                format!("📁 {} listings stored", self.listing_count),
            ),
            StatusLine::new(
                Color::White,
                format!("⛔ {} blocked URLs", self.blocked_urls.len()),
            ),
        ];

        for url in &self.blocked_urls {
            lines.push(StatusLine::new(Color::DarkGrey, format!("  {}", url)));
        }

        if self.log.trim().is_empty() {
            lines.push(StatusLine::new(Color::DarkGrey, "📜 Log is empty"));
        } else {
            lines.push(StatusLine::new(Color::White, "📜 Log:"));
            for entry in self.log.lines() {
                let color = if entry.contains("error") || entry.contains("Error") {
                    Color::Red
                } else {
                    Color::Grey
                };
                lines.push(StatusLine::new(color, format!("  {}", entry)));
            }
        }

        lines
    }

    pub fn print(&self) -> io::Result<()> {
        let mut stdout = io::stdout();
        for line in self.lines() {
            execute!(
                stdout,
                SetForegroundColor(line.color),
                Print(format!("{}\n", line.text)),
                ResetColor
            )?;
        }
        Ok(())
    }
}
