use chrono::{SecondsFormat, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use parley_core::{Filter, Record, ResourceKind};

use super::{RepositoryError, ResourceRepository};
use crate::fixtures::seed_records;

#[derive(Default)]
struct Collection {
    records: Vec<Record>,
    last_sequence: u64,
}

impl Collection {
    fn seeded(records: Vec<Record>) -> Self {
        let last_sequence = records.len() as u64;
        Self { records, last_sequence }
    }
}

#[derive(Default)]
struct Collections {
    leads: Collection,
    tasks: Collection,
    opportunities: Collection,
}

impl Collections {
    fn get(&self, kind: ResourceKind) -> &Collection {
        match kind {
            ResourceKind::Lead => &self.leads,
            ResourceKind::Task => &self.tasks,
            ResourceKind::Opportunity => &self.opportunities,
        }
    }

    fn get_mut(&mut self, kind: ResourceKind) -> &mut Collection {
        match kind {
            ResourceKind::Lead => &mut self.leads,
            ResourceKind::Task => &mut self.tasks,
            ResourceKind::Opportunity => &mut self.opportunities,
        }
    }
}

/// Deterministic in-memory stand-in for the CRM, used when a connection is in simulation mode.
///
/// Records keep insertion order and are never removed. Names come from a per-kind counter that
/// only moves forward, so they stay unique even if the collection were ever trimmed.
pub struct SimulatedResourceStore {
    collections: RwLock<Collections>,
}

impl SimulatedResourceStore {
    pub fn seeded() -> Self {
        let collections = Collections {
            leads: Collection::seeded(seed_records(ResourceKind::Lead)),
            tasks: Collection::seeded(seed_records(ResourceKind::Task)),
            opportunities: Collection::seeded(seed_records(ResourceKind::Opportunity)),
        };
        Self { collections: RwLock::new(collections) }
    }

    pub fn empty() -> Self {
        Self { collections: RwLock::new(Collections::default()) }
    }
}

impl Default for SimulatedResourceStore {
    fn default() -> Self {
        Self::seeded()
    }
}

#[async_trait::async_trait]
impl ResourceRepository for SimulatedResourceStore {
    async fn list(
        &self,
        kind: ResourceKind,
        filters: &[Filter],
    ) -> Result<Vec<Record>, RepositoryError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(kind)
            .records
            .iter()
            .filter(|record| filters.iter().all(|filter| filter.admits(kind, record)))
            .cloned()
            .collect())
    }

    async fn create(&self, kind: ResourceKind, data: Record) -> Result<Record, RepositoryError> {
        let mut collections = self.collections.write().await;
        let collection = collections.get_mut(kind);
        collection.last_sequence += 1;

        let name = kind.record_name(collection.last_sequence);
        let mut record = Record::new();
        record.insert("name".to_string(), Value::String(name.clone()));
        record.insert(
            "creation".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)),
        );
        record.extend(data);

        collection.records.push(record.clone());
        tracing::debug!(
            event_name = "simulation.resource.created",
            doctype = kind.doctype(),
            record_name = %name,
            "simulated record created"
        );
        Ok(record)
    }
}

/// `{"data": {"results": [...]}}`, the envelope callers receive for simulated reads.
pub fn wrap_list(records: Vec<Record>) -> Value {
    json!({ "data": { "results": records } })
}

/// `{"data": record}`, the envelope callers receive for simulated creates.
pub fn wrap_record(record: Record) -> Value {
    json!({ "data": record })
}
