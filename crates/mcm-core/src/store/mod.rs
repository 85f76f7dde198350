//! File-backed entity store.
//!
//! Each collection is one JSON file holding an [`EntityRecord`]. Every mutation rewrites the
//! whole file through a temporary file in the same directory followed by a rename, so readers
//! observe either the previous or the next record, never a partial one.
//!
//! Operations on one collection are serialized by a per-collection lock held across the
//! read-modify-write. There is no cross-collection transaction.

mod matcher;

use std::{
    collections::HashMap,
    fs,
    io::Write,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, MutexGuard, RwLock},
};

use mcm_model::{Entity, EntityId, EntityQuery, EntityRecord};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, instrument, trace};

use crate::error::StoreError;

const EXTENSION: &str = "json";

/// Handle to the collections under one root directory.
///
/// Cloning is cheap; clones share the same collection table and locks.
#[derive(Clone)]
pub struct EntityStore {
    inner: Arc<StoreInner>,
}

struct StoreInner {
    root: PathBuf,
    collections: RwLock<HashMap<String, Arc<Collection>>>,
}

struct Collection {
    path: PathBuf,
    lock: Mutex<()>,
}

impl Collection {
    fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }
}

impl EntityStore {
    /// Open (creating if needed) `root` and register every `*.json` file by its stem.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root)?;

        let mut collections = HashMap::new();
        for entry in fs::read_dir(&root)? {
            let path = entry?.path();
            if !path.is_file() || path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            trace!(target: "mcm.store", collection = stem, path = %path.display(), "collection discovered");
            collections.insert(stem.to_string(), Arc::new(Collection::new(path.clone())));
        }

        debug!(target: "mcm.store", root = %root.display(), collections = collections.len(), "store opened");
        Ok(Self {
            inner: Arc::new(StoreInner {
                root,
                collections: RwLock::new(collections),
            }),
        })
    }

    pub fn root(&self) -> &Path {
        &self.inner.root
    }

    /// Names of all registered collections, sorted.
    pub fn collections(&self) -> Result<Vec<String>, StoreError> {
        let table = self
            .inner
            .collections
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("collections: {e}")))?;
        let mut names: Vec<String> = table.keys().cloned().collect();
        names.sort();
        Ok(names)
    }

    /// Make sure `collection` exists, creating an empty collection file under the root when it
    /// does not. Existing data is left untouched.
    pub fn ensure_collection(&self, collection: &str) -> Result<PathBuf, StoreError> {
        if let Ok(existing) = self.collection(collection) {
            return Ok(existing.path.clone());
        }
        let path = self.inner.root.join(format!("{collection}.{EXTENSION}"));
        if path.is_file() {
            self.register(collection, path.clone())?;
            return Ok(path);
        }
        self.reset_collection_file(collection, &path)
    }

    /// Write an empty record (`latestId = -1`) for `collection` at `path` and register it.
    pub fn reset_collection_file(
        &self,
        collection: &str,
        path: impl AsRef<Path>,
    ) -> Result<PathBuf, StoreError> {
        let path = path.as_ref().to_path_buf();
        let coll = Collection::new(path.clone());
        write_record(&coll, &EntityRecord::<serde_json::Value>::empty(collection))?;
        self.register(collection, path.clone())?;

        debug!(target: "mcm.store", collection, path = %path.display(), "collection reset");
        Ok(path)
    }

    /// Read the whole collection.
    pub fn get_all<T: Entity>(&self, collection: &str) -> Result<EntityRecord<T>, StoreError> {
        let coll = self.collection(collection)?;
        let _guard = lock(&coll, collection)?;
        read_record(collection, &coll)
    }

    /// Look up one row; `Ok(None)` when the id is not present.
    pub fn get_one_by_id<T: Entity>(
        &self,
        collection: &str,
        id: EntityId,
    ) -> Result<Option<T>, StoreError> {
        let mut record = self.get_all::<T>(collection)?;
        Ok(record.dict.remove(&id))
    }

    /// Insert a row without an id (issuing `latestId + 1`) or overwrite an existing one.
    ///
    /// Fails with [`StoreError::InvalidReference`] when the row carries an id that is not in the
    /// collection.
    #[instrument(level = "trace", target = "mcm.store", skip(self, entity), fields(id = ?entity.id()))]
    pub fn update_or_add<T: Entity>(&self, collection: &str, mut entity: T) -> Result<T, StoreError> {
        let coll = self.collection(collection)?;
        let _guard = lock(&coll, collection)?;
        let mut record: EntityRecord<T> = read_record(collection, &coll)?;

        let id = match entity.id() {
            Some(id) if record.contains(id) => id,
            Some(id) => {
                return Err(StoreError::InvalidReference {
                    collection: collection.to_string(),
                    id,
                });
            }
            None => {
                let id = record.next_id();
                record.latest_id = id;
                entity.set_id(id);
                id
            }
        };

        record.dict.insert(id, entity.clone());
        write_record(&coll, &record)?;

        trace!(target: "mcm.store", collection, id, latest_id = record.latest_id, "row written");
        Ok(entity)
    }

    /// Apply `f` to the row with `id` under the collection lock.
    ///
    /// The file is rewritten only when `f` returns `true`. Returns the row as it is after the
    /// call, or `None` when the id is absent.
    pub fn update_with<T, F>(
        &self,
        collection: &str,
        id: EntityId,
        f: F,
    ) -> Result<Option<T>, StoreError>
    where
        T: Entity,
        F: FnOnce(&mut T) -> bool,
    {
        let coll = self.collection(collection)?;
        let _guard = lock(&coll, collection)?;
        let mut record: EntityRecord<T> = read_record(collection, &coll)?;

        let Some(row) = record.dict.get_mut(&id) else {
            return Ok(None);
        };
        let changed = f(row);
        let row = row.clone();
        if changed {
            write_record(&coll, &record)?;
            trace!(target: "mcm.store", collection, id, "row updated in place");
        }
        Ok(Some(row))
    }

    /// Remove a row. Returns `false` (and leaves the file alone) when the id is absent.
    ///
    /// `latestId` is kept, so removed ids are never issued again.
    pub fn delete_by_id(&self, collection: &str, id: EntityId) -> Result<bool, StoreError> {
        let coll = self.collection(collection)?;
        let _guard = lock(&coll, collection)?;
        let mut record: EntityRecord<serde_json::Value> = read_record(collection, &coll)?;

        if record.dict.remove(&id).is_none() {
            return Ok(false);
        }
        write_record(&coll, &record)?;

        debug!(target: "mcm.store", collection, id, "row deleted");
        Ok(true)
    }

    /// Rows whose fields equal every `key=value` pair of `params`, in id order.
    pub fn query<T: Entity>(&self, collection: &str, params: &str) -> Result<Vec<T>, StoreError> {
        self.query_with(collection, &EntityQuery::parse(params))
    }

    pub fn query_with<T: Entity>(
        &self,
        collection: &str,
        query: &EntityQuery,
    ) -> Result<Vec<T>, StoreError> {
        let record = self.get_all::<T>(collection)?;
        let mut results = Vec::new();

        for row in record.dict.into_values() {
            let fields =
                serde_json::to_value(&row).map_err(|e| StoreError::Serialize(e.to_string()))?;
            if matcher::matches(&fields, query) {
                results.push(row);
            }
        }
        Ok(results)
    }

    fn collection(&self, name: &str) -> Result<Arc<Collection>, StoreError> {
        let table = self
            .inner
            .collections
            .read()
            .map_err(|e| StoreError::LockPoisoned(format!("collections: {e}")))?;
        table
            .get(name)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    fn register(&self, name: &str, path: PathBuf) -> Result<(), StoreError> {
        let mut table = self
            .inner
            .collections
            .write()
            .map_err(|e| StoreError::LockPoisoned(format!("collections: {e}")))?;
        table.insert(name.to_string(), Arc::new(Collection::new(path)));
        Ok(())
    }
}

fn lock<'a>(coll: &'a Collection, name: &str) -> Result<MutexGuard<'a, ()>, StoreError> {
    coll.lock
        .lock()
        .map_err(|e| StoreError::LockPoisoned(format!("{name}: {e}")))
}

fn read_record<T: DeserializeOwned>(
    name: &str,
    coll: &Collection,
) -> Result<EntityRecord<T>, StoreError> {
    let contents = fs::read_to_string(&coll.path)?;
    serde_json::from_str(&contents).map_err(|e| StoreError::CorruptData {
        collection: name.to_string(),
        reason: e.to_string(),
    })
}

fn write_record<T: Serialize>(coll: &Collection, record: &EntityRecord<T>) -> Result<(), StoreError> {
    let dir = match coll.path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
    serde_json::to_writer(&mut tmp, record).map_err(|e| StoreError::Serialize(e.to_string()))?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(&coll.path).map_err(|e| StoreError::Io(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use mcm_model::{SERVERS, ServerRecord, USERS, UserRecord};
    use tempfile::TempDir;

    fn fresh_store() -> (TempDir, EntityStore) {
        let dir = TempDir::new().unwrap();
        let store = EntityStore::open(dir.path()).unwrap();
        store
            .reset_collection_file(SERVERS, dir.path().join("servers.json"))
            .unwrap();
        store
            .reset_collection_file(USERS, dir.path().join("users.json"))
            .unwrap();
        (dir, store)
    }

    fn server(owner: i64, name: &str, runtime: &str) -> ServerRecord {
        ServerRecord::new(owner, name, runtime, format!("/home/mc/{name}"))
    }

    #[test]
    fn open_discovers_collections_by_stem() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("servers.json"), r#"{"entity":"servers","latestId":-1,"dict":{}}"#).unwrap();
        fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = EntityStore::open(dir.path()).unwrap();
        assert_eq!(store.collections().unwrap(), vec!["servers".to_string()]);
    }

    #[test]
    fn unknown_collection_is_not_found() {
        let (_dir, store) = fresh_store();
        let err = store.get_all::<ServerRecord>("worlds").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(name) if name == "worlds"));
    }

    #[test]
    fn unparsable_file_is_corrupt_data() {
        let (dir, store) = fresh_store();
        fs::write(dir.path().join("servers.json"), "{not json").unwrap();

        let err = store.get_all::<ServerRecord>(SERVERS).unwrap_err();
        assert!(matches!(err, StoreError::CorruptData { .. }));
    }

    #[test]
    fn reset_writes_empty_record() {
        let (_dir, store) = fresh_store();
        let record = store.get_all::<UserRecord>(USERS).unwrap();
        assert_eq!(record, EntityRecord::empty(USERS));
    }

    #[test]
    fn add_without_id_issues_next_id() {
        let (_dir, store) = fresh_store();

        let first = store.update_or_add(SERVERS, server(0, "mcsrv1", "1.14.1")).unwrap();
        assert_eq!(first.id, Some(0));

        let second = store.update_or_add(SERVERS, server(0, "mcsrv2", "1.14.1")).unwrap();
        assert_eq!(second.id, Some(1));

        let record = store.get_all::<ServerRecord>(SERVERS).unwrap();
        assert_eq!(record.latest_id, 1);
        assert_eq!(record.get(0), Some(&first));
        assert_eq!(record.get(1), Some(&second));
    }

    #[test]
    fn concurrent_writers_never_share_an_id() {
        const THREADS: i64 = 8;
        const PER_THREAD: i64 = 25;
        let (_dir, store) = fresh_store();

        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    (0..PER_THREAD)
                        .map(|i| {
                            let name = format!("srv-{t}-{i}");
                            store.update_or_add(SERVERS, server(t, &name, "1.14.1")).unwrap().id.unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut ids: Vec<EntityId> = workers.into_iter().flat_map(|w| w.join().unwrap()).collect();
        ids.sort_unstable();
        let total = THREADS * PER_THREAD;
        assert_eq!(ids, (0..total).collect::<Vec<_>>());

        let record = store.get_all::<ServerRecord>(SERVERS).unwrap();
        assert_eq!(record.latest_id, total - 1);
        assert_eq!(record.dict.len() as i64, total);
    }

    #[test]
    fn update_with_existing_id_overwrites_in_place() {
        let (_dir, store) = fresh_store();
        store.update_or_add(USERS, UserRecord::new("johndoe", "1234987a")).unwrap();

        let mut user: UserRecord = store.get_one_by_id(USERS, 0).unwrap().unwrap();
        user.username = "daffyduck".into();
        store.update_or_add(USERS, user).unwrap();

        let record = store.get_all::<UserRecord>(USERS).unwrap();
        assert_eq!(record.latest_id, 0);
        assert_eq!(record.len(), 1);
        assert_eq!(record.get(0).unwrap().username, "daffyduck");
    }

    #[test]
    fn update_with_unissued_id_is_invalid_reference() {
        let (_dir, store) = fresh_store();
        let err = store
            .update_or_add(SERVERS, server(0, "ghost", "1.13").with_id(5))
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidReference { id: 5, .. }));

        let record = store.get_all::<ServerRecord>(SERVERS).unwrap();
        assert!(record.is_empty());
        assert_eq!(record.latest_id, -1);
    }

    #[test]
    fn get_one_by_id_absent_is_none() {
        let (_dir, store) = fresh_store();
        let found: Option<ServerRecord> = store.get_one_by_id(SERVERS, 100).unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn delete_is_true_then_false() {
        let (_dir, store) = fresh_store();
        store.update_or_add(SERVERS, server(0, "mcsrv1", "1.14.1")).unwrap();

        assert!(store.delete_by_id(SERVERS, 0).unwrap());
        let after_first = store.get_all::<ServerRecord>(SERVERS).unwrap();
        assert!(after_first.is_empty());

        assert!(!store.delete_by_id(SERVERS, 0).unwrap());
        let after_second = store.get_all::<ServerRecord>(SERVERS).unwrap();
        assert_eq!(after_first, after_second);
    }

    #[test]
    fn deleted_ids_are_not_reissued() {
        let (_dir, store) = fresh_store();
        store.update_or_add(USERS, UserRecord::new("a", "h")).unwrap();
        store.delete_by_id(USERS, 0).unwrap();

        let next = store.update_or_add(USERS, UserRecord::new("b", "h")).unwrap();
        assert_eq!(next.id, Some(1));
    }

    #[test]
    fn query_empty_collection_returns_nothing() {
        let (_dir, store) = fresh_store();
        let found: Vec<ServerRecord> = store.query(SERVERS, "?ownerUserId=0").unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn query_single_and_multi_predicate() {
        let (_dir, store) = fresh_store();
        let a = store.update_or_add(SERVERS, server(1, "srv1", "1.13")).unwrap();
        let b = store.update_or_add(SERVERS, server(1, "srv2", "1.14.1")).unwrap();
        store.update_or_add(SERVERS, server(2, "srv3", "1.14")).unwrap();

        let single: Vec<ServerRecord> = store.query(SERVERS, "?ownerUserId=1").unwrap();
        assert_eq!(single, vec![a, b.clone()]);

        let multi: Vec<ServerRecord> = store
            .query(SERVERS, "?ownerUserId=1&runtime=1.14.1")
            .unwrap();
        assert_eq!(multi, vec![b]);
    }

    #[test]
    fn query_users_by_hash() {
        let (_dir, store) = fresh_store();
        let cash = store.update_or_add(USERS, UserRecord::new("johnnycash", "12345")).unwrap();
        let depp = store.update_or_add(USERS, UserRecord::new("johnnydepp", "12345")).unwrap();
        store.update_or_add(USERS, UserRecord::new("janicekepp", "asdf")).unwrap();

        let by_hash: Vec<UserRecord> = store.query(USERS, "passwordHash=12345").unwrap();
        assert_eq!(by_hash, vec![cash, depp.clone()]);

        let both: Vec<UserRecord> = store
            .query(USERS, "passwordHash=12345&username=johnnydepp")
            .unwrap();
        assert_eq!(both, vec![depp]);
    }

    #[test]
    fn update_with_rewrites_only_when_changed() {
        let (_dir, store) = fresh_store();
        store.update_or_add(SERVERS, server(0, "srv", "1.13")).unwrap();

        let row: Option<ServerRecord> = store
            .update_with(SERVERS, 0, |s: &mut ServerRecord| {
                s.mark_running(77);
                true
            })
            .unwrap();
        assert_eq!(row.unwrap().pid, Some(77));

        let untouched: Option<ServerRecord> = store
            .update_with(SERVERS, 0, |s: &mut ServerRecord| {
                s.mark_stopped();
                false
            })
            .unwrap();
        assert_eq!(untouched.unwrap().pid, None);

        let stored: ServerRecord = store.get_one_by_id(SERVERS, 0).unwrap().unwrap();
        assert_eq!(stored.pid, Some(77));
        assert!(stored.status);
    }

    #[test]
    fn update_with_missing_id_is_none() {
        let (_dir, store) = fresh_store();
        let row: Option<ServerRecord> = store.update_with(SERVERS, 3, |_| true).unwrap();
        assert!(row.is_none());
    }

    #[test]
    fn ensure_collection_keeps_existing_rows() {
        let (dir, store) = fresh_store();
        store.update_or_add(USERS, UserRecord::new("a", "h")).unwrap();

        let reopened = EntityStore::open(dir.path()).unwrap();
        reopened.ensure_collection(USERS).unwrap();
        let created = reopened.ensure_collection("worlds").unwrap();

        assert_eq!(reopened.get_all::<UserRecord>(USERS).unwrap().len(), 1);
        assert!(created.is_file());
        assert_eq!(
            reopened.collections().unwrap(),
            vec!["servers".to_string(), "users".to_string(), "worlds".to_string()]
        );
    }

    #[test]
    fn writes_leave_no_temporary_files() {
        let (dir, store) = fresh_store();
        for i in 0..5 {
            store.update_or_add(USERS, UserRecord::new(format!("u{i}"), "h")).unwrap();
        }
        let files = fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(files, 2);
    }
}
