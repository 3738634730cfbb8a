//! Catalog enrichment client

use crate::cache::EnrichmentCache;
use crate::error::RemoteError;
use crate::gate::RequestGate;
use crate::http::{build_client, check_status, json_body};
use async_trait::async_trait;
use brickscan_core::{ColorVariant, EnrichmentRecord, PartVariant, ServiceConfig, ServiceReply};
use reqwest::{Client, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Entries requested per page of a list endpoint
const PAGE_SIZE: &str = "1000";
/// Upper bound on pages followed for one list
const MAX_PAGES: usize = 20;

/// Source of catalog metadata for identified items
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether lookups can return data at all
    fn is_enabled(&self) -> bool {
        true
    }

    async fn enrich(&self, item_id: &str) -> ServiceReply<EnrichmentRecord>;

    /// Colours the item is produced in, most common first
    async fn list_colors(&self, item_id: &str) -> ServiceReply<Vec<ColorVariant>> {
        self.enrich(item_id).await.map(|record| record.colors)
    }
}

/// Client for the Rebrickable parts catalog
///
/// Without an API key the client runs in no-op mode: every lookup returns
/// `Empty` and nothing is sent over the network.
pub struct RebrickableClient {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    gate: Arc<RequestGate>,
    cache: Arc<EnrichmentCache>,
}

impl RebrickableClient {
    pub fn new(config: &ServiceConfig, cache: Arc<EnrichmentCache>) -> Result<Self, RemoteError> {
        let gate = Arc::new(RequestGate::for_service("rebrickable", config));
        Self::with_gate(config, gate, cache)
    }

    pub fn with_gate(
        config: &ServiceConfig,
        gate: Arc<RequestGate>,
        cache: Arc<EnrichmentCache>,
    ) -> Result<Self, RemoteError> {
        let api_key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string);
        if api_key.is_none() {
            info!("No catalog API key configured, enrichment disabled");
        }
        Ok(Self {
            client: build_client(config)?,
            base_url: config.endpoint().to_string(),
            api_key,
            gate,
            cache,
        })
    }

    pub fn gate(&self) -> &Arc<RequestGate> {
        &self.gate
    }

    pub fn cache(&self) -> &Arc<EnrichmentCache> {
        &self.cache
    }

    /// GET a catalog resource; 404 comes back as `Ok(None)`
    async fn send_get(
        &self,
        api_key: &str,
        url: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<Value>, RemoteError> {
        debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(query)
            .header("Authorization", format!("key {}", api_key))
            .header("accept", "application/json")
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = check_status(response).await?;
        json_body(response).await.map(Some)
    }

    async fn get(
        &self,
        api_key: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<Value>, RemoteError> {
        let url = format!("{}{}", self.base_url, path);
        self.gate
            .execute(|| self.send_get(api_key, &url, query))
            .await
    }

    /// Every `results` entry of a paginated list, following `next` links
    async fn get_list(
        &self,
        api_key: &str,
        path: &str,
        query: &[(&str, &str)],
    ) -> Result<Option<Vec<Value>>, RemoteError> {
        let mut query = query.to_vec();
        query.push(("page_size", PAGE_SIZE));
        let Some(mut page) = self.get(api_key, path, &query).await? else {
            return Ok(None);
        };

        let mut items = Vec::new();
        for fetched in 1.. {
            items.extend(results(&page)?.iter().cloned());
            let Some(next) = opt_str(&page, "next") else {
                break;
            };
            if fetched >= MAX_PAGES {
                warn!("Stopping after {} pages of {}", MAX_PAGES, path);
                break;
            }
            let next_page = self
                .gate
                .execute(|| self.send_get(api_key, &next, &[]))
                .await?;
            let Some(next_page) = next_page else {
                break;
            };
            page = next_page;
        }
        Ok(Some(items))
    }

    /// Resolve `item_id`, falling back to a BrickLink-number search
    async fn fetch_record(
        &self,
        api_key: &str,
        item_id: &str,
    ) -> Result<Option<EnrichmentRecord>, RemoteError> {
        let direct = if is_path_safe(item_id) {
            self.get(api_key, &format!("/parts/{}/", item_id), &[]).await?
        } else {
            None
        };

        let (primary, variants) = match direct {
            Some(part) => (parse_part(&part)?, Vec::new()),
            None => {
                let found = self
                    .get_list(api_key, "/parts/", &[("bricklink_id", item_id)])
                    .await?;
                let Some(found) = found else {
                    return Ok(None);
                };
                let mut parts = found
                    .iter()
                    .map(parse_part)
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter();
                let Some(primary) = parts.next() else {
                    return Ok(None);
                };
                let variants = parts
                    .map(|p| PartVariant {
                        part_num: p.part_num,
                        name: p.name,
                        image_url: p.image_url,
                    })
                    .collect();
                (primary, variants)
            }
        };

        let colors = self.fetch_colors(api_key, &primary.part_num).await?;
        Ok(Some(EnrichmentRecord {
            item_id: item_id.to_string(),
            part_num: primary.part_num,
            name: primary.name,
            image_url: primary.image_url,
            part_url: primary.part_url,
            category_id: primary.category_id,
            material: primary.material,
            colors,
            variants,
        }))
    }

    async fn fetch_colors(
        &self,
        api_key: &str,
        part_num: &str,
    ) -> Result<Vec<ColorVariant>, RemoteError> {
        if !is_path_safe(part_num) {
            return Ok(Vec::new());
        }
        let Some(entries) = self
            .get_list(api_key, &format!("/parts/{}/colors/", part_num), &[])
            .await?
        else {
            return Ok(Vec::new());
        };
        let mut colors = entries
            .iter()
            .map(parse_color)
            .collect::<Result<Vec<_>, _>>()?;
        colors.sort_by(|a, b| {
            b.num_sets
                .cmp(&a.num_sets)
                .then_with(|| a.color_id.cmp(&b.color_id))
        });
        Ok(colors)
    }
}

#[async_trait]
impl CatalogLookup for RebrickableClient {
    fn name(&self) -> &'static str {
        "rebrickable"
    }

    fn is_enabled(&self) -> bool {
        self.api_key.is_some()
    }

    async fn enrich(&self, item_id: &str) -> ServiceReply<EnrichmentRecord> {
        let Some(api_key) = self.api_key.as_deref() else {
            return ServiceReply::Empty;
        };
        let item_id = item_id.trim();
        if item_id.is_empty() {
            return ServiceReply::Empty;
        }

        if let Some(cached) = self.cache.get(item_id) {
            debug!("Catalog cache hit for {}", item_id);
            return match cached {
                Some(record) => ServiceReply::Data(record),
                None => ServiceReply::Empty,
            };
        }

        match self.fetch_record(api_key, item_id).await {
            Ok(Some(record)) => {
                self.cache.insert(item_id, record.clone());
                ServiceReply::Data(record)
            }
            Ok(None) => {
                debug!("No catalog entry for {}", item_id);
                self.cache.insert_missing(item_id);
                ServiceReply::Empty
            }
            Err(e) => {
                warn!("Catalog lookup failed for {}: {}", item_id, e);
                ServiceReply::Failed(e.failure_reason())
            }
        }
    }
}

/// Fields of one catalog part
struct PartFields {
    part_num: String,
    name: String,
    image_url: Option<String>,
    part_url: Option<String>,
    category_id: Option<i64>,
    material: Option<String>,
}

fn is_path_safe(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && id != "."
        && id != ".."
}

fn results(body: &Value) -> Result<&Vec<Value>, RemoteError> {
    body.get("results")
        .and_then(|r| r.as_array())
        .ok_or_else(|| RemoteError::InvalidResponse("no results array".to_string()))
}

fn opt_str(value: &Value, key: &str) -> Option<String> {
    value
        .get(key)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn parse_part(value: &Value) -> Result<PartFields, RemoteError> {
    let part_num = opt_str(value, "part_num")
        .ok_or_else(|| RemoteError::InvalidResponse("part without part_num".to_string()))?;
    Ok(PartFields {
        name: opt_str(value, "name").unwrap_or_else(|| part_num.clone()),
        image_url: opt_str(value, "part_img_url"),
        part_url: opt_str(value, "part_url"),
        category_id: value.get("part_cat_id").and_then(|v| v.as_i64()),
        material: opt_str(value, "part_material"),
        part_num,
    })
}

fn parse_color(value: &Value) -> Result<ColorVariant, RemoteError> {
    let color_id = value
        .get("color_id")
        .and_then(|v| v.as_i64())
        .ok_or_else(|| RemoteError::InvalidResponse("colour without color_id".to_string()))?;
    let count = |key: &str| {
        value
            .get(key)
            .and_then(|v| v.as_u64())
            .map(|n| n.min(u32::MAX as u64) as u32)
            .unwrap_or(0)
    };
    Ok(ColorVariant {
        color_id,
        color_name: opt_str(value, "color_name").unwrap_or_else(|| color_id.to_string()),
        num_sets: count("num_sets"),
        num_set_parts: count("num_set_parts"),
        image_url: opt_str(value, "part_img_url"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_path_safety() {
        assert!(is_path_safe("3001"));
        assert!(is_path_safe("973pb1234c01"));
        assert!(is_path_safe("3001-1"));
        assert!(!is_path_safe("../admin"));
        assert!(!is_path_safe("a b"));
        assert!(!is_path_safe(".."));
        assert!(!is_path_safe(""));
    }

    #[test]
    fn test_parse_part() {
        let part = parse_part(&json!({
            "part_num": "3001",
            "name": "Brick 2 x 4",
            "part_cat_id": 11,
            "part_url": "https://rebrickable.com/parts/3001/",
            "part_img_url": null,
            "part_material": "Plastic"
        }))
        .unwrap();
        assert_eq!(part.part_num, "3001");
        assert_eq!(part.category_id, Some(11));
        assert!(part.image_url.is_none());
        assert_eq!(part.material.as_deref(), Some("Plastic"));
    }

    #[test]
    fn test_parse_part_without_number() {
        assert!(parse_part(&json!({"name": "Brick"})).is_err());
    }

    #[test]
    fn test_parse_color_defaults() {
        let color = parse_color(&json!({"color_id": 4})).unwrap();
        assert_eq!(color.color_name, "4");
        assert_eq!(color.num_sets, 0);
        assert!(parse_color(&json!({"color_name": "Red"})).is_err());
    }

    #[tokio::test]
    async fn test_no_key_is_noop() {
        let mut config = ServiceConfig::rebrickable();
        config.base_url = "http://127.0.0.1:9".to_string();
        config.api_key = Some("   ".to_string());
        let client = RebrickableClient::new(&config, Arc::new(EnrichmentCache::new())).unwrap();

        assert!(!client.is_enabled());
        assert_eq!(client.enrich("3001").await, ServiceReply::Empty);
        assert_eq!(client.list_colors("3001").await, ServiceReply::Empty);
        assert_eq!(client.gate().issued(), 0);
        assert!(client.cache().is_empty());
    }
}
