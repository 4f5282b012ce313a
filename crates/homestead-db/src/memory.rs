//! In-process [`Store`] backed by a `BTreeMap`.
//!
//! Values are kept as serialized JSON so the memory store exercises the
//! same serde path as the `Dragonfly` store. Used by tests, by embedding
//! applications, and by the engine when no `Dragonfly` URL is configured.

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::RwLock;

use homestead_types::FarmerId;

use crate::entity::{Criteria, Entity, Record};
use crate::error::DbError;
use crate::store::Store;

/// One stored value with the index metadata computed at write time.
#[derive(Debug, Clone)]
struct Row {
    revision: u64,
    active: bool,
    owner: Option<FarmerId>,
    json: serde_json::Value,
}

/// Map key: entity kind plus the id's string form.
type RowKey = (&'static str, String);

/// Shared in-memory store. Clones share the same underlying map.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    rows: Arc<RwLock<BTreeMap<RowKey, Row>>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records across all kinds.
    pub async fn len(&self) -> usize {
        self.rows.read().await.len()
    }

    /// Whether nothing has been stored yet.
    pub async fn is_empty(&self) -> bool {
        self.rows.read().await.is_empty()
    }
}

fn decode<E: Entity>(row: &Row) -> Result<Record<E>, DbError> {
    Ok(Record {
        revision: row.revision,
        entity: serde_json::from_value(row.json.clone())?,
    })
}

impl Store for MemoryStore {
    async fn get<E: Entity>(&self, id: E::Id) -> Result<Record<E>, DbError> {
        let rows = self.rows.read().await;
        let row = rows
            .get(&(E::KIND, id.to_string()))
            .ok_or_else(|| DbError::NotFound {
                kind: E::KIND,
                id: id.to_string(),
            })?;
        decode(row)
    }

    async fn save<E: Entity>(&self, record: Record<E>) -> Result<Record<E>, DbError> {
        let key = (E::KIND, record.id().to_string());
        let json = serde_json::to_value(&record.entity)?;

        let mut rows = self.rows.write().await;
        let stored = rows.get(&key).map_or(0, |row| row.revision);
        if stored != record.revision {
            return Err(DbError::Conflict {
                kind: E::KIND,
                id: key.1,
                expected: record.revision,
            });
        }

        let revision = stored.saturating_add(1);
        rows.insert(
            key,
            Row {
                revision,
                active: record.entity.is_active(),
                owner: record.entity.owner(),
                json,
            },
        );
        Ok(Record {
            revision,
            entity: record.entity,
        })
    }

    async fn query<E: Entity>(&self, criteria: Criteria) -> Result<Vec<Record<E>>, DbError> {
        let rows = self.rows.read().await;
        rows.iter()
            .filter(|((kind, _), _)| *kind == E::KIND)
            .filter(|(_, row)| match criteria {
                Criteria::All => true,
                Criteria::Active => row.active,
                Criteria::OwnedBy(farmer) => row.owner == Some(farmer),
            })
            .map(|(_, row)| decode(row))
            .collect()
    }
}
