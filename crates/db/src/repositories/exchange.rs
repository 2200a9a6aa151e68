use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use sqlx::Row;

use parley_core::{Exchange, ExchangeId, NewExchange, UserId};

use super::{ExchangeRepository, RepositoryError};
use crate::DbPool;

/// Durable exchange log backed by the `exchange` table.
pub struct SqlExchangeRepository {
    pool: DbPool,
}

impl SqlExchangeRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("invalid exchange timestamp `{raw}`: {e}")))
}

fn row_to_exchange(row: &sqlx::sqlite::SqliteRow) -> Result<Exchange, RepositoryError> {
    let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: i64 =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let query: String = row.try_get("query").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let response: String =
        row.try_get("response").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let intent: Option<String> =
        row.try_get("intent").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let metadata_json: Option<String> =
        row.try_get("metadata_json").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let timestamp_str: String =
        row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let metadata = metadata_json
        .map(|raw| serde_json::from_str::<Value>(&raw))
        .transpose()
        .map_err(|e| RepositoryError::Decode(format!("invalid exchange metadata: {e}")))?;

    Ok(Exchange {
        id: ExchangeId(id),
        user_id: UserId(user_id),
        query,
        response,
        intent,
        metadata,
        timestamp: parse_timestamp(&timestamp_str)?,
    })
}

#[async_trait::async_trait]
impl ExchangeRepository for SqlExchangeRepository {
    async fn record(&self, exchange: NewExchange) -> Result<Exchange, RepositoryError> {
        let metadata_json = exchange
            .metadata
            .as_ref()
            .map(serde_json::to_string)
            .transpose()
            .map_err(|e| RepositoryError::Decode(format!("unencodable exchange metadata: {e}")))?;

        // One statement, so the write lock is taken up front and the busy timeout applies.
        // `exchange_clock` holds the highest timestamp ever written, cleared rows included.
        let row = sqlx::query(
            "INSERT INTO exchange (user_id, query, response, intent, metadata_json, timestamp)
             SELECT ?, ?, ?, ?, ?,
                    MAX(?, COALESCE((SELECT high_water FROM exchange_clock WHERE id = 1), ''))
             RETURNING id, timestamp",
        )
        .bind(exchange.user_id.0)
        .bind(&exchange.query)
        .bind(&exchange.response)
        .bind(&exchange.intent)
        .bind(&metadata_json)
        .bind(format_timestamp(Utc::now()))
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let stored: String =
            row.try_get("timestamp").map_err(|e| RepositoryError::Decode(e.to_string()))?;

        Ok(exchange.into_exchange(ExchangeId(id), parse_timestamp(&stored)?))
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Exchange>, RepositoryError> {
        // SQLite treats a negative LIMIT as unbounded.
        let limit = match limit {
            Some(0) => return Ok(Vec::new()),
            Some(limit) => i64::try_from(limit).unwrap_or(i64::MAX),
            None => -1,
        };

        let rows = sqlx::query(
            "SELECT id, user_id, query, response, intent, metadata_json, timestamp
             FROM exchange
             WHERE user_id = ?
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(user_id.0)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_exchange).collect()
    }

    async fn clear_for_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        sqlx::query("DELETE FROM exchange WHERE user_id = ?")
            .bind(user_id.0)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::sync::Arc;

    use serde_json::json;

    use parley_core::{NewExchange, UserId};

    use super::SqlExchangeRepository;
    use crate::migrations::run_pending;
    use crate::repositories::ExchangeRepository;
    use crate::{connect_with_settings, DbPool};

    async fn setup() -> DbPool {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        pool
    }

    fn turn(user: i64, query: &str, metadata: Option<serde_json::Value>) -> NewExchange {
        NewExchange {
            user_id: UserId(user),
            query: query.to_string(),
            response: "ok".to_string(),
            intent: Some("fetch_data".to_string()),
            metadata,
        }
    }

    #[tokio::test]
    async fn record_assigns_ids_and_preserves_metadata() {
        let repo = SqlExchangeRepository::new(setup().await);
        let metadata = json!({ "confidence": 0.8, "action": { "type": "fetch_data" } });

        let first = repo.record(turn(1, "show leads", Some(metadata.clone()))).await.expect("record");
        let second = repo.record(turn(1, "again", None)).await.expect("record");

        assert!(second.id > first.id);
        assert!(second.timestamp >= first.timestamp);

        let listed = repo.list_for_user(UserId(1), None).await.expect("list");
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].query, "again");
        assert_eq!(listed[1].metadata, Some(metadata));
        assert_eq!(listed[0].metadata, None);
    }

    #[tokio::test]
    async fn limit_and_clear_follow_recorder_contract() {
        let repo = SqlExchangeRepository::new(setup().await);
        for index in 0..3 {
            repo.record(turn(9, &format!("q{index}"), None)).await.expect("record");
        }
        repo.record(turn(10, "other", None)).await.expect("record");

        let limited = repo.list_for_user(UserId(9), Some(2)).await.expect("list");
        assert_eq!(limited.iter().map(|e| e.query.as_str()).collect::<Vec<_>>(), vec!["q2", "q1"]);
        assert!(repo.list_for_user(UserId(9), Some(0)).await.expect("list").is_empty());

        repo.clear_for_user(UserId(9)).await.expect("clear");
        assert!(repo.list_for_user(UserId(9), None).await.expect("list").is_empty());
        assert_eq!(repo.list_for_user(UserId(10), None).await.expect("list").len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_records_into_file_database_all_succeed() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("exchanges.db").display());
        let pool = connect_with_settings(&url, 5, 30).await.expect("connect");
        run_pending(&pool).await.expect("migrations");
        let repo = Arc::new(SqlExchangeRepository::new(pool.clone()));

        let mut handles = Vec::new();
        for index in 0..100 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.record(turn(index % 4 + 1, &format!("q{index}"), None)).await
            }));
        }

        let mut ids = HashSet::new();
        for handle in handles {
            let recorded = handle.await.expect("join").expect("record under contention");
            ids.insert(recorded.id);
        }

        assert_eq!(ids.len(), 100);
        let mut total = 0;
        for user in 1..=4 {
            let listed = repo.list_for_user(UserId(user), None).await.expect("list");
            assert!(listed.windows(2).all(|pair| pair[0].timestamp >= pair[1].timestamp));
            total += listed.len();
        }
        assert_eq!(total, 100);
        pool.close().await;
    }

    #[tokio::test]
    async fn timestamps_stay_monotonic_after_newest_rows_are_cleared() {
        let pool = setup().await;
        let repo = SqlExchangeRepository::new(pool.clone());
        repo.record(turn(1, "before", None)).await.expect("record");
        sqlx::query(
            "INSERT INTO exchange (user_id, query, response, timestamp)
             VALUES (2, 'future', 'ok', '2999-01-01T00:00:00.000000Z')",
        )
        .execute(&pool)
        .await
        .expect("insert future row");

        repo.clear_for_user(UserId(2)).await.expect("clear");
        let after = repo.record(turn(1, "after", None)).await.expect("record");

        assert_eq!(after.timestamp.to_rfc3339(), "2999-01-01T00:00:00+00:00");
        let listed = repo.list_for_user(UserId(1), None).await.expect("list");
        assert_eq!(listed[0].timestamp, after.timestamp);
    }
}
