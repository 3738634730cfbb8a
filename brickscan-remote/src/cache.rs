use brickscan_core::EnrichmentRecord;
use parking_lot::RwLock;
use std::collections::HashMap;

/// Catalog records for one run, keyed by identification item id
///
/// `None` entries mark ids the catalog is known not to have. Entries are
/// never evicted or invalidated; failed lookups are never stored.
#[derive(Debug, Default)]
pub struct EnrichmentCache {
    entries: RwLock<HashMap<String, Option<EnrichmentRecord>>>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// `None` on a miss, `Some(None)` for a known-missing id
    pub fn get(&self, item_id: &str) -> Option<Option<EnrichmentRecord>> {
        self.entries.read().get(item_id).cloned()
    }

    pub fn insert(&self, item_id: &str, record: EnrichmentRecord) {
        self.entries.write().insert(item_id.to_string(), Some(record));
    }

    pub fn insert_missing(&self, item_id: &str) {
        self.entries.write().insert(item_id.to_string(), None);
    }

    pub fn contains(&self, item_id: &str) -> bool {
        self.entries.read().contains_key(item_id)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: &str) -> EnrichmentRecord {
        EnrichmentRecord {
            item_id: id.to_string(),
            part_num: id.to_string(),
            name: "Brick 2 x 4".to_string(),
            image_url: None,
            part_url: None,
            category_id: Some(11),
            material: None,
            colors: Vec::new(),
            variants: Vec::new(),
        }
    }

    #[test]
    fn test_cache_miss_hit_and_missing() {
        let cache = EnrichmentCache::new();
        assert!(cache.get("3001").is_none());

        cache.insert("3001", record("3001"));
        cache.insert_missing("9999");

        assert_eq!(cache.get("3001"), Some(Some(record("3001"))));
        assert_eq!(cache.get("9999"), Some(None));
        assert!(cache.contains("9999"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn test_cache_empty() {
        let cache = EnrichmentCache::new();
        assert!(cache.is_empty());
        assert!(!cache.contains("3001"));
    }
}
