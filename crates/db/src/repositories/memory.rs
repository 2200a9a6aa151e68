use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use parley_core::{Exchange, ExchangeId, NewExchange, UserId};

use super::{ExchangeRepository, RepositoryError};

#[derive(Default)]
struct Ledger {
    exchanges: Vec<Exchange>,
    next_id: i64,
    last_timestamp: Option<DateTime<Utc>>,
}

/// Process-lifetime exchange log, the default recorder backend.
#[derive(Default)]
pub struct InMemoryExchangeRepository {
    ledger: RwLock<Ledger>,
}

#[async_trait::async_trait]
impl ExchangeRepository for InMemoryExchangeRepository {
    async fn record(&self, exchange: NewExchange) -> Result<Exchange, RepositoryError> {
        let mut ledger = self.ledger.write().await;
        ledger.next_id += 1;
        let id = ExchangeId(ledger.next_id);

        // Wall clock can step backwards; recorded timestamps must not.
        let now = Utc::now();
        let timestamp = match ledger.last_timestamp {
            Some(last) if last > now => last,
            _ => now,
        };
        ledger.last_timestamp = Some(timestamp);

        let recorded = exchange.into_exchange(id, timestamp);
        ledger.exchanges.push(recorded.clone());
        Ok(recorded)
    }

    async fn list_for_user(
        &self,
        user_id: UserId,
        limit: Option<usize>,
    ) -> Result<Vec<Exchange>, RepositoryError> {
        let ledger = self.ledger.read().await;
        let matching = ledger.exchanges.iter().rev().filter(|exchange| exchange.user_id == user_id);

        Ok(match limit {
            Some(limit) => matching.take(limit).cloned().collect(),
            None => matching.cloned().collect(),
        })
    }

    async fn clear_for_user(&self, user_id: UserId) -> Result<(), RepositoryError> {
        let mut ledger = self.ledger.write().await;
        ledger.exchanges.retain(|exchange| exchange.user_id != user_id);
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use parley_core::{ExchangeId, NewExchange, UserId};

    use crate::repositories::{ExchangeRepository, InMemoryExchangeRepository};

    fn turn(user: i64, query: &str) -> NewExchange {
        NewExchange {
            user_id: UserId(user),
            query: query.to_string(),
            response: format!("reply to {query}"),
            intent: Some("greeting".to_string()),
            metadata: Some(json!({ "confidence": 0.9 })),
        }
    }

    #[tokio::test]
    async fn lists_newest_first_and_scopes_by_user() {
        let repo = InMemoryExchangeRepository::default();
        repo.record(turn(1, "first")).await.expect("record");
        repo.record(turn(2, "other user")).await.expect("record");
        repo.record(turn(1, "second")).await.expect("record");

        let listed = repo.list_for_user(UserId(1), None).await.expect("list");
        let queries: Vec<&str> = listed.iter().map(|exchange| exchange.query.as_str()).collect();

        assert_eq!(queries, vec!["second", "first"]);
        assert!(listed[0].id > listed[1].id);
        assert!(listed[0].timestamp >= listed[1].timestamp);
    }

    #[tokio::test]
    async fn limit_caps_result_and_zero_yields_nothing() {
        let repo = InMemoryExchangeRepository::default();
        for index in 0..4 {
            repo.record(turn(7, &format!("q{index}"))).await.expect("record");
        }

        let two = repo.list_for_user(UserId(7), Some(2)).await.expect("list");
        let none = repo.list_for_user(UserId(7), Some(0)).await.expect("list");

        assert_eq!(two.len(), 2);
        assert_eq!(two[0].query, "q3");
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn clear_then_list_is_empty_and_leaves_other_users() {
        let repo = InMemoryExchangeRepository::default();
        repo.record(turn(1, "mine")).await.expect("record");
        repo.record(turn(2, "theirs")).await.expect("record");

        repo.clear_for_user(UserId(1)).await.expect("clear");
        repo.clear_for_user(UserId(1)).await.expect("clear twice");

        assert!(repo.list_for_user(UserId(1), None).await.expect("list").is_empty());
        assert_eq!(repo.list_for_user(UserId(2), None).await.expect("list").len(), 1);
    }

    #[tokio::test]
    async fn identifiers_keep_increasing_after_clear() {
        let repo = InMemoryExchangeRepository::default();
        let first = repo.record(turn(1, "a")).await.expect("record");
        repo.clear_for_user(UserId(1)).await.expect("clear");
        let second = repo.record(turn(1, "b")).await.expect("record");

        assert_eq!(first.id, ExchangeId(1));
        assert_eq!(second.id, ExchangeId(2));
    }

    #[tokio::test]
    async fn concurrent_records_receive_unique_ids() {
        let repo = Arc::new(InMemoryExchangeRepository::default());
        let mut handles = Vec::new();
        for index in 0..16 {
            let repo = Arc::clone(&repo);
            handles.push(tokio::spawn(async move {
                repo.record(turn(3, &format!("q{index}"))).await.expect("record").id
            }));
        }

        let mut ids = Vec::new();
        for handle in handles {
            ids.push(handle.await.expect("join"));
        }
        ids.sort();
        ids.dedup();

        assert_eq!(ids.len(), 16);
    }
}
