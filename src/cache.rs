//! Per-calculation memo store for tracker lookups.
//!
//! Entries are valid only for the calculation that wrote them; the
//! orchestrator clears the store when each top-level call ends.

use crate::domain::{CampaignId, Period};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

/// Key-value memo with `exists/get/set/clear` semantics.
pub trait MemoStore: Send + Sync + fmt::Debug {
    fn exists(&self, key: &str) -> bool;
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn clear(&self);
}

pub fn offers_key(campaign: CampaignId) -> String {
    format!("offers:{}", campaign)
}

pub fn geo_key(campaign: CampaignId, period: Period) -> String {
    format!("geo:{}:{}:{}", campaign, period.start, period.end)
}

/// Process-local [`MemoStore`].
#[derive(Debug, Default)]
pub struct InMemoryMemo {
    entries: Mutex<HashMap<String, String>>,
}

impl InMemoryMemo {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MemoStore for InMemoryMemo {
    fn exists(&self, key: &str) -> bool {
        self.entries
            .lock()
            .map(|e| e.contains_key(key))
            .unwrap_or(false)
    }

    fn get(&self, key: &str) -> Option<String> {
        self.entries.lock().ok().and_then(|e| e.get(key).cloned())
    }

    fn set(&self, key: &str, value: String) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.insert(key.to_string(), value);
        }
    }

    fn clear(&self) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_set_get_clear() {
        let memo = InMemoryMemo::new();
        assert!(!memo.exists("a"));

        memo.set("a", "1".to_string());
        assert!(memo.exists("a"));
        assert_eq!(memo.get("a"), Some("1".to_string()));

        memo.clear();
        assert!(memo.is_empty());
        assert_eq!(memo.get("a"), None);
    }

    #[test]
    fn test_keys_include_window() {
        let period = Period::new(
            NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            NaiveDate::from_ymd_opt(2024, 1, 7).unwrap(),
        );
        assert_eq!(offers_key(CampaignId::new(5)), "offers:5");
        assert_eq!(geo_key(CampaignId::new(5), period), "geo:5:2024-01-01:2024-01-07");
    }
}
