//! In-memory conversation cache.
//!
//! Backs an OpenAI-compatible host shim: per conversation, an ordered item
//! list with duplicate-id rejection and cursor-style windowed listing. Every
//! mutation touches the entry's TTL. Per-conversation mutations are
//! serialized by a per-entry lock; different conversations are independent.

use crate::error::{OrchestrationError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, RwLock};

/// Listing order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListOrder {
    /// Insertion order.
    Asc,
    /// Reverse insertion order.
    Desc,
}

/// One item of a cached conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationItem {
    /// Unique id within the conversation.
    pub id: String,
    /// Item payload.
    pub payload: Value,
    /// When the item was first added.
    pub created_at: DateTime<Utc>,
}

impl ConversationItem {
    /// Item with the current timestamp.
    pub fn new(id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: id.into(),
            payload,
            created_at: Utc::now(),
        }
    }
}

/// One page of a cursor listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage {
    /// The items of this window.
    pub items: Vec<ConversationItem>,
    /// Whether more items follow the window.
    pub has_more: bool,
}

struct CacheEntry {
    items: Vec<ConversationItem>,
    ids: HashSet<String>,
    expires_at: Instant,
}

/// In-memory conversation store with TTL-tracked entries.
pub struct ConversationCache {
    entries: RwLock<HashMap<String, Arc<Mutex<CacheEntry>>>>,
    ttl: Duration,
}

impl ConversationCache {
    /// Cache whose entries expire `ttl` after their last mutation.
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }

    async fn entry(&self, conversation_id: &str, create: bool) -> Result<Arc<Mutex<CacheEntry>>> {
        {
            let entries = self.entries.read().await;
            if let Some(entry) = entries.get(conversation_id) {
                return Ok(entry.clone());
            }
        }
        if !create {
            return Err(OrchestrationError::UnknownConversation {
                id: conversation_id.to_string(),
            });
        }
        let mut entries = self.entries.write().await;
        Ok(entries
            .entry(conversation_id.to_string())
            .or_insert_with(|| {
                Arc::new(Mutex::new(CacheEntry {
                    items: Vec::new(),
                    ids: HashSet::new(),
                    expires_at: Instant::now() + self.ttl,
                }))
            })
            .clone())
    }

    /// Append items, creating the conversation when absent. Rejects any id
    /// already present without applying a partial batch.
    pub async fn add_items(
        &self,
        conversation_id: &str,
        items: Vec<ConversationItem>,
    ) -> Result<()> {
        let entry = self.entry(conversation_id, true).await?;
        let mut entry = entry.lock().await;

        let mut batch_ids = HashSet::new();
        for item in &items {
            if entry.ids.contains(&item.id) || !batch_ids.insert(item.id.clone()) {
                return Err(OrchestrationError::DuplicateItem {
                    id: item.id.clone(),
                });
            }
        }
        for item in items {
            entry.ids.insert(item.id.clone());
            entry.items.push(item);
        }
        entry.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    /// Replace an item's payload.
    pub async fn update_item(
        &self,
        conversation_id: &str,
        item_id: &str,
        payload: Value,
    ) -> Result<()> {
        let entry = self.entry(conversation_id, false).await?;
        let mut entry = entry.lock().await;
        let item = entry
            .items
            .iter_mut()
            .find(|item| item.id == item_id)
            .ok_or_else(|| {
                OrchestrationError::invalid_argument(format!("unknown item id '{item_id}'"))
            })?;
        item.payload = payload;
        entry.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    /// Remove an item.
    pub async fn remove_item(&self, conversation_id: &str, item_id: &str) -> Result<()> {
        let entry = self.entry(conversation_id, false).await?;
        let mut entry = entry.lock().await;
        let index = entry
            .items
            .iter()
            .position(|item| item.id == item_id)
            .ok_or_else(|| {
                OrchestrationError::invalid_argument(format!("unknown item id '{item_id}'"))
            })?;
        entry.items.remove(index);
        entry.ids.remove(item_id);
        entry.expires_at = Instant::now() + self.ttl;
        Ok(())
    }

    /// Cursor-style listing: the next `limit` items (1..=100) in `order`,
    /// starting after the item with id `after` when given.
    pub async fn list(
        &self,
        conversation_id: &str,
        limit: usize,
        order: ListOrder,
        after: Option<&str>,
    ) -> Result<ListPage> {
        if !(1..=100).contains(&limit) {
            return Err(OrchestrationError::invalid_argument(format!(
                "limit must be within 1..=100, got {limit}"
            )));
        }
        let entry = self.entry(conversation_id, false).await?;
        let entry = entry.lock().await;
        if entry.expires_at <= Instant::now() {
            return Err(OrchestrationError::UnknownConversation {
                id: conversation_id.to_string(),
            });
        }

        let mut ordered: Vec<ConversationItem> = entry.items.clone();
        if order == ListOrder::Desc {
            ordered.reverse();
        }

        let start = match after {
            Some(after_id) => {
                let position = ordered
                    .iter()
                    .position(|item| item.id == after_id)
                    .ok_or_else(|| {
                        OrchestrationError::invalid_argument(format!(
                            "unknown cursor item id '{after_id}'"
                        ))
                    })?;
                position + 1
            }
            None => 0,
        };

        let window: Vec<ConversationItem> = ordered.iter().skip(start).take(limit).cloned().collect();
        let has_more = ordered.len() > start + window.len();
        Ok(ListPage {
            items: window,
            has_more,
        })
    }

    /// Drop expired entries. Callers may run this periodically; reads of an
    /// expired entry already behave as if it were gone.
    pub async fn evict_expired(&self) {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let mut expired = Vec::new();
        for (id, entry) in entries.iter() {
            if let Ok(entry) = entry.try_lock() {
                if entry.expires_at <= now {
                    expired.push(id.clone());
                }
            }
        }
        for id in expired {
            entries.remove(&id);
        }
    }
}
