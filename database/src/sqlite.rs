use crate::store::{LedgerEntry, MentionStore};
use chrono::{DateTime, Utc};
use reputebot_core::{CoreError, DatabaseError, Mention, PostRef, ReplyOutcome, ReplyRef};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

/// SQLite-backed mention ledger.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

#[derive(Debug, sqlx::FromRow)]
struct MentionRow {
    id: String,
    cid: String,
    author_handle: String,
    target_handle: String,
    reply_root_uri: String,
    reply_root_cid: String,
    reply_parent_uri: String,
    reply_parent_cid: String,
    timestamp: DateTime<Utc>,
    processed: bool,
    reply_status: Option<String>,
    reply_detail: Option<String>,
    processed_at: Option<DateTime<Utc>>,
}

impl MentionRow {
    fn into_entry(self) -> LedgerEntry {
        let outcome = match (self.reply_status.as_deref(), self.reply_detail) {
            (Some("posted"), Some(uri)) => Some(ReplyOutcome::Posted { uri }),
            (Some("failed"), reason) => Some(ReplyOutcome::Failed {
                reason: reason.unwrap_or_default(),
            }),
            _ => None,
        };

        LedgerEntry {
            mention: Mention {
                id: self.id,
                cid: self.cid,
                author_handle: self.author_handle,
                target_handle: self.target_handle,
                timestamp: self.timestamp,
                reply_to: ReplyRef {
                    root: PostRef {
                        uri: self.reply_root_uri,
                        cid: self.reply_root_cid,
                    },
                    parent: PostRef {
                        uri: self.reply_parent_uri,
                        cid: self.reply_parent_cid,
                    },
                },
                processed: self.processed,
            },
            outcome,
            processed_at: self.processed_at,
        }
    }
}

const SELECT_MENTION: &str = r#"
    SELECT id, cid, author_handle, target_handle,
           reply_root_uri, reply_root_cid, reply_parent_uri, reply_parent_cid,
           timestamp, processed, reply_status, reply_detail, processed_at
    FROM mentions
"#;

fn sql_error(error: sqlx::Error) -> CoreError {
    CoreError::Database(DatabaseError::Sql(error))
}

impl Database {
    /// Opens (creating if needed) the database at `url` and applies migrations.
    pub async fn connect(url: &str) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?
            .create_if_missing(true)
            .busy_timeout(Duration::from_secs(5));

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let database = Self { pool };
        database.run_migrations().await?;
        info!("Connected to mention ledger at {}", url);
        Ok(database)
    }

    /// Private in-memory database. A single connection keeps it alive.
    pub async fn in_memory() -> Result<Self, CoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await
            .map_err(|e| DatabaseError::ConnectionFailed {
                reason: e.to_string(),
            })?;

        let database = Self { pool };
        database.run_migrations().await?;
        Ok(database)
    }

    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        MIGRATOR
            .run(&self.pool)
            .await
            .map_err(|e| DatabaseError::MigrationFailed {
                migration: e.to_string(),
            })?;
        debug!("Ledger migrations applied");
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

impl MentionStore for Database {
    async fn record_mention(&self, mention: &Mention) -> Result<bool, CoreError> {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO mentions (
                id, cid, author_handle, target_handle,
                reply_root_uri, reply_root_cid, reply_parent_uri, reply_parent_cid,
                timestamp, processed
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, 0)
            "#,
        )
        .bind(&mention.id)
        .bind(&mention.cid)
        .bind(&mention.author_handle)
        .bind(&mention.target_handle)
        .bind(&mention.reply_to.root.uri)
        .bind(&mention.reply_to.root.cid)
        .bind(&mention.reply_to.parent.uri)
        .bind(&mention.reply_to.parent.cid)
        .bind(mention.timestamp)
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn mark_processed(&self, id: &str, outcome: &ReplyOutcome) -> Result<(), CoreError> {
        let result = sqlx::query(
            r#"
            UPDATE mentions
            SET processed = 1, reply_status = ?, reply_detail = ?, processed_at = ?
            WHERE id = ? AND processed = 0
            "#,
        )
        .bind(outcome.status())
        .bind(outcome.detail())
        .bind(Utc::now())
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(sql_error)?;

        if result.rows_affected() == 0 {
            let exists: Option<(String,)> = sqlx::query_as("SELECT id FROM mentions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_error)?;
            if exists.is_none() {
                return Err(DatabaseError::UnknownMention {
                    mention_id: id.to_string(),
                }
                .into());
            }
            debug!("Mention {} already processed, keeping first outcome", id);
        }
        Ok(())
    }

    async fn is_processed(&self, id: &str) -> Result<bool, CoreError> {
        let processed: Option<(bool,)> =
            sqlx::query_as("SELECT processed FROM mentions WHERE id = ?")
                .bind(id)
                .fetch_optional(&self.pool)
                .await
                .map_err(sql_error)?;
        Ok(processed.is_some_and(|(processed,)| processed))
    }

    async fn get_entry(&self, id: &str) -> Result<Option<LedgerEntry>, CoreError> {
        let row = sqlx::query_as::<_, MentionRow>(&format!("{SELECT_MENTION} WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(row.map(MentionRow::into_entry))
    }

    async fn processed_ids(&self) -> Result<Vec<String>, CoreError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM mentions WHERE processed = 1")
            .fetch_all(&self.pool)
            .await
            .map_err(sql_error)?;
        Ok(rows.into_iter().map(|(id,)| id).collect())
    }

    async fn pending_mentions(&self) -> Result<Vec<Mention>, CoreError> {
        let rows = sqlx::query_as::<_, MentionRow>(&format!(
            "{SELECT_MENTION} WHERE processed = 0 ORDER BY timestamp ASC, id ASC"
        ))
        .fetch_all(&self.pool)
        .await
        .map_err(sql_error)?;
        Ok(rows
            .into_iter()
            .map(|row| row.into_entry().mention)
            .collect())
    }

    async fn reset(&self) -> Result<u64, CoreError> {
        let result = sqlx::query("DELETE FROM mentions")
            .execute(&self.pool)
            .await
            .map_err(sql_error)?;
        info!("Mention ledger reset ({} rows removed)", result.rows_affected());
        Ok(result.rows_affected())
    }
}
