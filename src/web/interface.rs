//! Payloads returned by the read API.

use crate::mirror::{Component, IndexEntry};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub href: String,
}

impl Link {
    fn new(href: String) -> Self {
        Self { href }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfLinks {
    #[serde(rename = "self")]
    pub self_link: Link,
}

/// One row of `GET /registry`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListingEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "_links")]
    pub links: SelfLinks,
}

impl ListingEntry {
    pub fn new(entry: &IndexEntry, base: &str) -> Self {
        Self {
            name: entry.name.clone(),
            kind: entry.kind.clone(),
            links: SelfLinks {
                self_link: Link::new(item_href(base, &entry.name)),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemLinks {
    pub index: Link,
    #[serde(rename = "self")]
    pub self_link: Link,
}

/// Body of `GET /registry/:name`: the full document plus navigation links
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ItemResponse {
    #[serde(flatten)]
    pub component: Component,
    #[serde(rename = "_links")]
    pub links: ItemLinks,
}

impl ItemResponse {
    pub fn new(component: Component, base: &str) -> Self {
        let links = ItemLinks {
            index: Link::new(format!("{}/registry", base)),
            self_link: Link::new(item_href(base, &component.name)),
        };
        Self { component, links }
    }
}

fn item_href(base: &str, name: &str) -> String {
    format!("{}/registry/{}", base, name)
}

/// Response body returned for any request that did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub kind: ErrorResponseKind,
    pub details: String,
}

impl ErrorResponse {
    pub fn not_found<S: Into<String>>(details: S) -> Self {
        Self {
            kind: ErrorResponseKind::NotFound,
            details: details.into(),
        }
    }

    pub fn bad_request<S: Into<String>>(details: S) -> Self {
        Self {
            kind: ErrorResponseKind::BadRequest,
            details: details.into(),
        }
    }

    pub fn internal_error<S: Into<String>>(details: S) -> Self {
        Self {
            kind: ErrorResponseKind::InternalError,
            details: details.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorResponseKind {
    NotFound,
    BadRequest,
    InternalError,
}
