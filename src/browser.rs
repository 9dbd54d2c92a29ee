//! Rendering agent backed by a single reusable headless Chrome session.

use crate::error::AgentError;
use headless_chrome::{Browser, LaunchOptions, Tab};
use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Result of looking for the gallery's "next image" control.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextControl {
    /// The control was found and clicked.
    Found,
    Absent,
}

/// Operations the gallery extractor needs from a live browser.
pub trait RenderingAgent: Send {
    /// Opens a new tab, focuses it and navigates to `url`.
    fn open_and_navigate(&mut self, url: &str) -> Result<(), AgentError>;

    /// Clicks the gallery-open control if it shows up within the wait timeout.
    /// Returns `false` when there is nothing to click.
    fn try_open_gallery(&mut self) -> bool;

    /// Rendered HTML of the active tab.
    fn current_document(&mut self) -> Result<String, AgentError>;

    fn click_next(&mut self) -> Result<NextControl, AgentError>;

    /// Closes the active tab and refocuses the first tab of the session.
    fn close_active_tab_and_return(&mut self) -> Result<(), AgentError>;

    /// Terminates the browser. The next operation starts a fresh session.
    fn shutdown(&mut self);
}

#[derive(Debug, Clone)]
pub struct GallerySelectors {
    pub open_control: String,
    pub next_control: String,
    pub item: String,
    pub image: String,
    pub counter: String,
}

impl Default for GallerySelectors {
    fn default() -> Self {
        Self {
            open_control: ".sc-1acce1b7-10".to_string(),
            next_control: ".lg-next".to_string(),
            item: "div.lg-item".to_string(),
            image: "img.lg-object.lg-image".to_string(),
            counter: ".lg-counter".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub headless: bool,
    pub window_size: (u32, u32),
    pub element_wait: Duration,
    /// How long an unused session may sit idle before Chrome is considered gone.
    pub idle_timeout: Duration,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            headless: true,
            window_size: (1280, 720),
            element_wait: Duration::from_secs(10),
            idle_timeout: Duration::from_secs(3600),
        }
    }
}

struct ChromeSession {
    // Dropping the browser kills the Chrome process
    browser: Browser,
    home: Arc<Tab>,
    active: Option<Arc<Tab>>,
}

/// Headless Chrome implementation of [`RenderingAgent`]. The session is
/// launched on first use and kept across listings.
pub struct ChromeAgent {
    settings: BrowserSettings,
    selectors: GallerySelectors,
    session: Option<ChromeSession>,
}

impl ChromeAgent {
    pub fn new(settings: BrowserSettings, selectors: GallerySelectors) -> Self {
        Self {
            settings,
            selectors,
            session: None,
        }
    }

    fn launch(&self) -> Result<ChromeSession, AgentError> {
        info!(
            "Launching browser (headless={}, window={}x{})",
            self.settings.headless, self.settings.window_size.0, self.settings.window_size.1
        );

        let args = vec![
            OsStr::new("--disable-gpu"),
            OsStr::new("--no-sandbox"),
            OsStr::new("--disable-dev-shm-usage"),
        ];

        let browser = Browser::new(LaunchOptions {
            headless: self.settings.headless,
            sandbox: false,
            window_size: Some(self.settings.window_size),
            idle_browser_timeout: self.settings.idle_timeout,
            args,
            ..Default::default()
        })
        .map_err(|e| AgentError::Launch(e.to_string()))?;

        let home = browser
            .wait_for_initial_tab()
            .map_err(|e| AgentError::Launch(e.to_string()))?;

        Ok(ChromeSession {
            browser,
            home,
            active: None,
        })
    }

    fn session(&mut self) -> Result<&mut ChromeSession, AgentError> {
        if self.session.is_none() {
            self.session = Some(self.launch()?);
        }
        self.session.as_mut().ok_or(AgentError::NoSession)
    }

    fn active_tab(&self) -> Result<Arc<Tab>, AgentError> {
        self.session
            .as_ref()
            .and_then(|s| s.active.clone())
            .ok_or(AgentError::NoSession)
    }
}

impl RenderingAgent for ChromeAgent {
    fn open_and_navigate(&mut self, url: &str) -> Result<(), AgentError> {
        let session = self.session()?;

        let tab = session
            .browser
            .new_tab()
            .map_err(|e| AgentError::Tab(e.to_string()))?;
        tab.activate().map_err(|e| AgentError::Tab(e.to_string()))?;
        session.active = Some(tab.clone());

        tab.navigate_to(url)
            .and_then(|t| t.wait_until_navigated())
            .map_err(|e| AgentError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;

        debug!("Navigated to {}", url);
        Ok(())
    }

    fn try_open_gallery(&mut self) -> bool {
        let tab = match self.active_tab() {
            Ok(tab) => tab,
            Err(_) => return false,
        };

        let element = match tab.wait_for_element_with_custom_timeout(
            &self.selectors.open_control,
            self.settings.element_wait,
        ) {
            Ok(element) => element,
            Err(e) => {
                debug!("No gallery control: {}", e);
                return false;
            }
        };

        match element.click() {
            Ok(_) => true,
            Err(e) => {
                debug!("Gallery control not clickable: {}", e);
                false
            }
        }
    }

    fn current_document(&mut self) -> Result<String, AgentError> {
        self.active_tab()?
            .get_content()
            .map_err(|e| AgentError::Snapshot(e.to_string()))
    }

    fn click_next(&mut self) -> Result<NextControl, AgentError> {
        let tab = self.active_tab()?;

        let element = match tab.find_element(&self.selectors.next_control) {
            Ok(element) => element,
            Err(_) => return Ok(NextControl::Absent),
        };

        element
            .click()
            .map_err(|e| AgentError::Interaction {
                selector: self.selectors.next_control.clone(),
                message: e.to_string(),
            })?;

        Ok(NextControl::Found)
    }

    fn close_active_tab_and_return(&mut self) -> Result<(), AgentError> {
        let session = self.session.as_mut().ok_or(AgentError::NoSession)?;

        if let Some(tab) = session.active.take() {
            tab.close(true).map_err(|e| AgentError::Tab(e.to_string()))?;
        }
        session
            .home
            .activate()
            .map_err(|e| AgentError::Tab(e.to_string()))?;

        Ok(())
    }

    fn shutdown(&mut self) {
        if self.session.take().is_some() {
            info!("Browser session closed");
        }
    }
}
