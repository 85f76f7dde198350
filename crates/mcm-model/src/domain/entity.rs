use std::collections::BTreeMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};

use super::EntityId;

/// A row type that can live in an entity collection.
///
/// The store owns id allocation: a fresh entity carries `None` and receives its id on first
/// insert.
pub trait Entity: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    fn id(&self) -> Option<EntityId>;
    fn set_id(&mut self, id: EntityId);
}

/// On-disk envelope of one collection.
///
/// `latest_id` is the highest id ever issued and never decreases, even when rows are deleted.
/// Rows are keyed by id; ids are issued in increasing order, so key order is insertion order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EntityRecord<T> {
    pub entity: String,
    pub latest_id: EntityId,
    pub dict: BTreeMap<EntityId, T>,
}

impl<T> EntityRecord<T> {
    /// Empty envelope; the first issued id will be `0`.
    pub fn empty(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
            latest_id: -1,
            dict: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn get(&self, id: EntityId) -> Option<&T> {
        self.dict.get(&id)
    }

    #[inline]
    pub fn contains(&self, id: EntityId) -> bool {
        self.dict.contains_key(&id)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.dict.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    /// Id the next insert without an id will receive.
    #[inline]
    pub fn next_id(&self) -> EntityId {
        self.latest_id + 1
    }

    pub fn values(&self) -> impl Iterator<Item = &T> {
        self.dict.values()
    }
}
