use serde::ser::SerializeStruct;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeSet;
use std::fmt;

/// One real-estate unit with the gallery photos that were new when it was ingested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listing {
    pub id: String,
    pub photos: BTreeSet<String>,
}

impl Listing {
    pub fn new<I>(id: impl Into<String>, photos: I) -> Self
    where
        I: IntoIterator<Item = String>,
    {
        Self {
            id: id.into(),
            photos: photos.into_iter().collect(),
        }
    }
}

// Photos are stored as a single JSON array column so the CSV stays two fields wide
impl Serialize for Listing {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let photos = serde_json::to_string(&self.photos).map_err(serde::ser::Error::custom)?;

        let mut state = serializer.serialize_struct("Listing", 2)?;
        state.serialize_field("id", &self.id)?;
        state.serialize_field("photos", &photos)?;
        state.end()
    }
}

impl<'de> Deserialize<'de> for Listing {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct ListingHelper {
            id: String,
            photos: String,
        }

        let helper = ListingHelper::deserialize(deserializer)?;

        let photos = if helper.photos.trim().is_empty() {
            BTreeSet::new()
        } else {
            serde_json::from_str(&helper.photos).map_err(serde::de::Error::custom)?
        };

        Ok(Listing {
            id: helper.id,
            photos,
        })
    }
}

/// A forbidden image URL as persisted in the blocklist file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockedUrl {
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingKind {
    Flat,
    House,
    Land,
    Commercial,
}

impl ListingKind {
    pub const ALL: [ListingKind; 4] = [
        ListingKind::Flat,
        ListingKind::House,
        ListingKind::Land,
        ListingKind::Commercial,
    ];

    pub fn path_segment(&self) -> &'static str {
        match self {
            ListingKind::Flat => "Flat",
            ListingKind::House => "House",
            ListingKind::Land => "Land",
            ListingKind::Commercial => "Commercial-real-estate",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionType {
    ForSale,
    ForRent,
}

impl TransactionType {
    pub const ALL: [TransactionType; 2] = [TransactionType::ForSale, TransactionType::ForRent];

    pub fn path_segment(&self) -> &'static str {
        match self {
            TransactionType::ForSale => "For-Sale",
            TransactionType::ForRent => "For-Rent",
        }
    }
}

/// A search-results category: one listing kind under one transaction type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub kind: ListingKind,
    pub transaction: TransactionType,
}

impl Category {
    pub fn new(kind: ListingKind, transaction: TransactionType) -> Self {
        Self { kind, transaction }
    }

    /// Every kind crossed with every transaction type, kinds outermost.
    pub fn all() -> Vec<Category> {
        ListingKind::ALL
            .iter()
            .flat_map(|kind| {
                TransactionType::ALL
                    .iter()
                    .map(move |transaction| Category::new(*kind, *transaction))
            })
            .collect()
    }
}

impl Default for Category {
    fn default() -> Self {
        Category::new(ListingKind::Flat, TransactionType::ForSale)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}",
            self.kind.path_segment(),
            self.transaction.path_segment()
        )
    }
}

/// Outcome of crawling one search-results page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageResult {
    /// The page had listing cards; holds the listings newly persisted from it.
    Listings(Vec<Listing>),
    /// No listing cards, or the page could not be fetched.
    Exhausted,
    /// The site answered 403.
    FetchBlocked,
}

impl PageResult {
    pub fn into_listings(self) -> Vec<Listing> {
        match self {
            PageResult::Listings(listings) => listings,
            PageResult::Exhausted | PageResult::FetchBlocked => Vec::new(),
        }
    }
}
