//! Public URLs for stored media.
//!
//! URLs mirror the store layout under a configured base URL, so they can be
//! computed before, during, or after an ingest without touching the disk.

use crate::config::{MediaConfig, SizeSpec};
use crate::store::MEDIA_EXTENSION;
use serde::ser::{Serialize, SerializeMap, Serializer};

/// Derives public URLs from a base URL and the size table.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    base_url: String,
    size_ids: Vec<String>,
}

impl UrlResolver {
    pub fn new(base_url: &str, sizes: &[SizeSpec]) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            size_ids: sizes.iter().map(|s| s.id.clone()).collect(),
        }
    }

    pub fn from_config(config: &MediaConfig) -> Self {
        Self::new(&config.base_url, &config.sizes)
    }

    /// `{base_url}/{id}-{size_id}.jpg`
    pub fn url_for(&self, id: &str, size_id: &str) -> String {
        format!("{}/{id}-{size_id}.{MEDIA_EXTENSION}", self.base_url)
    }

    /// `{base_url}/{id}.jpg`
    pub fn original_url_for(&self, id: &str) -> String {
        format!("{}/{id}.{MEDIA_EXTENSION}", self.base_url)
    }

    /// One URL per configured size, in size-table order.
    pub fn all_urls_for(&self, id: &str) -> SizeUrls {
        SizeUrls(
            self.size_ids
                .iter()
                .map(|size_id| (size_id.clone(), self.url_for(id, size_id)))
                .collect(),
        )
    }
}

/// Size id → URL mapping that keeps size-table order.
///
/// Serializes as a JSON/TOML map.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SizeUrls(Vec<(String, String)>);

impl SizeUrls {
    pub fn get(&self, size_id: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(id, _)| id == size_id)
            .map(|(_, url)| url.as_str())
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(id, _)| id.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(id, url)| (id.as_str(), url.as_str()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Serialize for SizeUrls {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (id, url) in &self.0 {
            map.serialize_entry(id, url)?;
        }
        map.end()
    }
}
