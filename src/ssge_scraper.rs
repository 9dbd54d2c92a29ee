use crate::crawler::{FetchOutcome, PageFetcher};
use crate::models::Category;
use crate::parser;
use anyhow::{Context, Result};
use reqwest::StatusCode;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::debug;

pub const BASE_URL: &str = "https://home.ss.ge";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/58.0.3029.110 Safari/537.36";

// Tbilisi
const CITY_ID: u32 = 95;
// USD
const CURRENCY_ID: u32 = 1;
const ADVANCED_SEARCH: &str = r#"{"individualEntityOnly":true}"#;

const CARD_SELECTOR: &str = "div.sc-8fa2c16a-0";
const LINK_SELECTOR: &str = "a[href]";

/// Search-results URL for one page of `category`.
pub fn category_page_url(category: &Category, page: usize) -> String {
    format!(
        "{}/en/real-estate/l/{}/{}?cityIdList={}&currencyId={}&advancedSearch={}&page={}",
        BASE_URL,
        category.kind.path_segment(),
        category.transaction.path_segment(),
        CITY_ID,
        CURRENCY_ID,
        urlencoding::encode(ADVANCED_SEARCH),
        page
    )
}

/// A listing card from a search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingCard {
    pub id: String,
    pub link: String,
}

/// Listing cards on a results page, plus the number of cards that had no
/// usable detail link.
pub fn parse_listing_cards(html: &str) -> Result<(Vec<ListingCard>, usize)> {
    let document = Html::parse_document(html);

    let card_selector = Selector::parse(CARD_SELECTOR)
        .map_err(|e| anyhow::anyhow!("Failed to parse card selector: {:?}", e))?;
    let link_selector = Selector::parse(LINK_SELECTOR)
        .map_err(|e| anyhow::anyhow!("Failed to parse link selector: {:?}", e))?;

    let mut cards = Vec::new();
    let mut unlinked = 0;

    for card in document.select(&card_selector) {
        let href = card
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"));

        match href.and_then(|href| parser::extract_listing_id(href).map(|id| (href, id))) {
            Some((href, id)) => cards.push(ListingCard {
                id,
                link: parser::absolute_url(BASE_URL, href),
            }),
            None => unlinked += 1,
        }
    }

    Ok((cards, unlinked))
}

/// Plain HTTP fetcher for search-results pages.
pub struct HttpFetcher {
    client: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(30))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { client })
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(&self, url: &str) -> Result<FetchOutcome> {
        debug!("Fetching listing page: {}", url);

        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .send()
            .context("Failed to fetch listing page")?;

        let status = response.status();
        if status == StatusCode::FORBIDDEN {
            return Ok(FetchOutcome::Forbidden);
        }
        if !status.is_success() {
            return Ok(FetchOutcome::Unavailable(status.as_u16()));
        }

        let body = response.text().context("Failed to read response body")?;
        Ok(FetchOutcome::Document(body))
    }
}
