//! Page context descriptor.
//!
//! Page detection happens outside relay; the core only reads the result to
//! key the agent cache and check agent allow-lists.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Kind of page the browser is currently showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PageType {
    ItemDetail,
    ItemEdit,
    ItemsLibrary,
    Search,
    Dashboard,
    Unknown,
}

impl PageType {
    pub const ALL: [PageType; 6] = [
        PageType::ItemDetail,
        PageType::ItemEdit,
        PageType::ItemsLibrary,
        PageType::Search,
        PageType::Dashboard,
        PageType::Unknown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PageType::ItemDetail => "item_detail",
            PageType::ItemEdit => "item_edit",
            PageType::ItemsLibrary => "items_library",
            PageType::Search => "search",
            PageType::Dashboard => "dashboard",
            PageType::Unknown => "unknown",
        }
    }
}

impl Default for PageType {
    fn default() -> Self {
        Self::Unknown
    }
}

impl std::fmt::Display for PageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PageType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        PageType::ALL
            .into_iter()
            .find(|page| page.as_str() == s)
            .ok_or_else(|| Error::UnknownPageType(s.to_string()))
    }
}

/// Descriptor of the current browsing environment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageContext {
    pub page_type: PageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub item_id: Option<String>,
}

impl PageContext {
    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            url: None,
            item_id: None,
        }
    }

    pub fn with_url(mut self, url: &str) -> Self {
        self.url = Some(url.to_string());
        self
    }

    pub fn with_item(mut self, item_id: &str) -> Self {
        self.item_id = Some(item_id.to_string());
        self
    }
}
