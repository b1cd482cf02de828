use chrono::{DateTime, Utc};
use reputebot_core::{CoreError, DatabaseError, Mention, ReplyOutcome};
use std::collections::HashMap;
use std::future::Future;
use tokio::sync::RwLock;

/// One ledger row: the mention and, once processed, its single reply attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub mention: Mention,
    pub outcome: Option<ReplyOutcome>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Append-only mention ledger.
pub trait MentionStore: Send + Sync {
    /// Appends a mention. Returns `false` when the id was already recorded.
    fn record_mention(
        &self,
        mention: &Mention,
    ) -> impl Future<Output = Result<bool, CoreError>> + Send;

    /// Flips `processed` and stores the outcome. A second call for the same
    /// id keeps the first outcome and succeeds.
    fn mark_processed(
        &self,
        id: &str,
        outcome: &ReplyOutcome,
    ) -> impl Future<Output = Result<(), CoreError>> + Send;

    fn is_processed(&self, id: &str) -> impl Future<Output = Result<bool, CoreError>> + Send;

    fn get_entry(
        &self,
        id: &str,
    ) -> impl Future<Output = Result<Option<LedgerEntry>, CoreError>> + Send;

    fn processed_ids(&self) -> impl Future<Output = Result<Vec<String>, CoreError>> + Send;

    /// Recorded but unprocessed mentions, oldest first.
    fn pending_mentions(&self) -> impl Future<Output = Result<Vec<Mention>, CoreError>> + Send;

    /// Clears the ledger. Returns the number of removed rows.
    fn reset(&self) -> impl Future<Output = Result<u64, CoreError>> + Send;
}

/// Ledger kept in process memory; lost on restart.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, LedgerEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl MentionStore for MemoryStore {
    async fn record_mention(&self, mention: &Mention) -> Result<bool, CoreError> {
        let mut entries = self.entries.write().await;
        if entries.contains_key(&mention.id) {
            return Ok(false);
        }
        let mut mention = mention.clone();
        mention.processed = false;
        entries.insert(
            mention.id.clone(),
            LedgerEntry {
                mention,
                outcome: None,
                processed_at: None,
            },
        );
        Ok(true)
    }

    async fn mark_processed(&self, id: &str, outcome: &ReplyOutcome) -> Result<(), CoreError> {
        let mut entries = self.entries.write().await;
        let entry = entries
            .get_mut(id)
            .ok_or_else(|| DatabaseError::UnknownMention {
                mention_id: id.to_string(),
            })?;
        if !entry.mention.processed {
            entry.mention.processed = true;
            entry.outcome = Some(outcome.clone());
            entry.processed_at = Some(Utc::now());
        }
        Ok(())
    }

    async fn is_processed(&self, id: &str) -> Result<bool, CoreError> {
        Ok(self
            .entries
            .read()
            .await
            .get(id)
            .is_some_and(|entry| entry.mention.processed))
    }

    async fn get_entry(&self, id: &str) -> Result<Option<LedgerEntry>, CoreError> {
        Ok(self.entries.read().await.get(id).cloned())
    }

    async fn processed_ids(&self) -> Result<Vec<String>, CoreError> {
        Ok(self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| entry.mention.processed)
            .map(|entry| entry.mention.id.clone())
            .collect())
    }

    async fn pending_mentions(&self) -> Result<Vec<Mention>, CoreError> {
        let mut pending: Vec<Mention> = self
            .entries
            .read()
            .await
            .values()
            .filter(|entry| !entry.mention.processed)
            .map(|entry| entry.mention.clone())
            .collect();
        pending.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| a.id.cmp(&b.id)));
        Ok(pending)
    }

    async fn reset(&self) -> Result<u64, CoreError> {
        let mut entries = self.entries.write().await;
        let removed = entries.len() as u64;
        entries.clear();
        Ok(removed)
    }
}
