use regex::Regex;

/// Listing id from a detail link: the last hyphen-delimited token of the path.
///
/// `/en/real-estate/3-room-flat-for-sale-vake-31524189` gives `31524189`.
/// Query strings, fragments and trailing slashes are ignored.
pub fn extract_listing_id(href: &str) -> Option<String> {
    let path = href.split(['?', '#']).next().unwrap_or_default();
    let segment = path.trim_end_matches('/').rsplit('/').next()?;

    let id = segment.rsplit('-').next()?.trim();
    if id.is_empty() {
        return None;
    }

    Some(id.to_string())
}

/// Reads gallery counters such as `"4 / 17"` as `(current, total)`.
pub struct CounterParser {
    pattern: Regex,
}

impl CounterParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            pattern: Regex::new(r"(\d+)\s*/\s*(\d+)")?,
        })
    }

    /// `None` when the text holds no counter or the total is zero.
    pub fn parse(&self, text: &str) -> Option<(usize, usize)> {
        let captures = self.pattern.captures(text)?;

        let current = captures.get(1)?.as_str().parse::<usize>().ok()?;
        let total = captures.get(2)?.as_str().parse::<usize>().ok()?;

        if total == 0 {
            return None;
        }

        Some((current, total))
    }
}

/// Makes a site-relative link absolute against `base`.
pub fn absolute_url(base: &str, href: &str) -> String {
    if href.starts_with("http") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{}{}", base.trim_end_matches('/'), href)
    } else {
        format!("{}/{}", base.trim_end_matches('/'), href)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn listing_id_is_last_hyphen_token() {
        assert_eq!(
            extract_listing_id("/en/real-estate/3-room-flat-for-sale-vake-31524189"),
            Some("31524189".to_string())
        );
        assert_eq!(
            extract_listing_id("https://home.ss.ge/en/real-estate/flat-101?page=2#photos"),
            Some("101".to_string())
        );
        assert_eq!(
            extract_listing_id("/en/real-estate/flat-102/"),
            Some("102".to_string())
        );
    }

    #[test]
    fn listing_id_missing_for_empty_links() {
        assert_eq!(extract_listing_id(""), None);
        assert_eq!(extract_listing_id("/"), None);
    }

    #[test]
    fn counter_is_parsed_with_or_without_spaces() {
        let counter = CounterParser::new().unwrap();
        assert_eq!(counter.parse("4 / 17"), Some((4, 17)));
        assert_eq!(counter.parse(" 1/3 "), Some((1, 3)));
        assert_eq!(counter.parse("photos"), None);
        assert_eq!(counter.parse("0 / 0"), None);
    }

    #[test]
    fn relative_links_are_resolved() {
        assert_eq!(
            absolute_url("https://home.ss.ge", "/en/real-estate/flat-1"),
            "https://home.ss.ge/en/real-estate/flat-1"
        );
        assert_eq!(
            absolute_url("https://home.ss.ge/", "https://other.ge/x-2"),
            "https://other.ge/x-2"
        );
    }
}
