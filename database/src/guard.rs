use crate::store::MentionStore;
use reputebot_core::{CoreError, ReplyOutcome};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Claim {
    InFlight,
    Processed,
}

/// At-most-once gate in front of the ledger.
///
/// `should_process` checks and claims in one critical section, so of any
/// number of concurrent callers for an unseen id exactly one is granted.
/// The claim holds until `mark_processed` or `release`.
pub struct DedupGuard<S> {
    store: Arc<S>,
    claims: Mutex<HashMap<String, Claim>>,
}

impl<S: MentionStore> DedupGuard<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            claims: Mutex::new(HashMap::new()),
        }
    }

    /// Loads every processed id from the ledger into memory.
    pub async fn warm_up(&self) -> Result<usize, CoreError> {
        let processed = self.store.processed_ids().await?;
        let count = processed.len();
        let mut claims = self.claims.lock().await;
        for id in processed {
            claims.insert(id, Claim::Processed);
        }
        info!("Dedup guard warmed with {} processed mentions", count);
        Ok(count)
    }

    /// `true` grants the caller the right to reply to this mention.
    ///
    /// Storage failures are returned as errors and grant nothing.
    pub async fn should_process(&self, id: &str) -> Result<bool, CoreError> {
        let mut claims = self.claims.lock().await;
        if let Some(claim) = claims.get(id) {
            debug!("Mention {} not granted: {:?}", id, claim);
            return Ok(false);
        }

        if self.store.is_processed(id).await? {
            claims.insert(id.to_string(), Claim::Processed);
            return Ok(false);
        }

        claims.insert(id.to_string(), Claim::InFlight);
        Ok(true)
    }

    /// Records the single reply attempt for `id`. Safe to call more than once.
    ///
    /// The id is pinned as processed in memory even when the ledger refuses
    /// the update (storage failure or an id it never recorded), so this
    /// process never grants it again. The ledger error is still returned.
    pub async fn mark_processed(&self, id: &str, outcome: &ReplyOutcome) -> Result<(), CoreError> {
        let mut claims = self.claims.lock().await;
        claims.insert(id.to_string(), Claim::Processed);

        if let Err(e) = self.store.mark_processed(id, outcome).await {
            warn!("Failed to record outcome for mention {}: {}", id, e);
            return Err(e);
        }
        debug!("Mention {} marked processed ({})", id, outcome.status());
        Ok(())
    }

    /// Drops an in-flight claim so a later poll may try again.
    /// Processed mentions stay processed.
    pub async fn release(&self, id: &str) {
        let mut claims = self.claims.lock().await;
        if claims.get(id) == Some(&Claim::InFlight) {
            claims.remove(id);
            debug!("Released claim on mention {}", id);
        }
    }

    pub async fn in_flight(&self) -> usize {
        self.claims
            .lock()
            .await
            .values()
            .filter(|claim| **claim == Claim::InFlight)
            .count()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }
}
