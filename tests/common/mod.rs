#![allow(dead_code)]

use std::{
    collections::{BTreeMap, BTreeSet},
    sync::{Mutex, MutexGuard},
};

use async_trait::async_trait;
use k8s_openapi::{apimachinery::pkg::apis::meta::v1::Time, chrono::Utc};
use kube::{Resource, ResourceExt, core::ErrorResponse};
use replicator::{
    replica::Replicated,
    store::{ObjectStore, StoreError},
};

/// A write issued through the store, in order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Op {
    Create { namespace: String, name: String },
    Update { namespace: String, name: String },
    Delete { namespace: String, name: String },
}

struct State<K> {
    objects: BTreeMap<(String, String), K>,
    namespaces: BTreeSet<String>,
    next_version: u64,
    ops: Vec<Op>,
    conflict_next_update: bool,
    failing_gets: BTreeSet<String>,
    vanishing_deletes: BTreeSet<String>,
    fail_list_namespaces: bool,
}

/// In-memory cluster with resourceVersion checks, finalizer-gated deletion and
/// a log of every write made through [`ObjectStore`].
pub struct MemoryStore<K> {
    state: Mutex<State<K>>,
}

fn key<K: ResourceExt>(obj: &K) -> (String, String) {
    (obj.namespace().unwrap_or_default(), obj.name_any())
}

impl<K: Replicated> MemoryStore<K> {
    pub fn new(namespaces: &[&str]) -> Self {
        Self {
            state: Mutex::new(State {
                objects: BTreeMap::new(),
                namespaces: namespaces.iter().map(|ns| (*ns).to_owned()).collect(),
                next_version: 1,
                ops: Vec::new(),
                conflict_next_update: false,
                failing_gets: BTreeSet::new(),
                vanishing_deletes: BTreeSet::new(),
                fail_list_namespaces: false,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State<K>> {
        self.state.lock().unwrap()
    }

    /// Seeds an object as if someone else had created it.
    pub fn insert(&self, mut obj: K) {
        let mut state = self.lock();
        obj.meta_mut().resource_version = Some(state.next_version.to_string());
        state.next_version += 1;
        state.objects.insert(key(&obj), obj);
    }

    pub fn object(&self, namespace: &str, name: &str) -> Option<K> {
        self.lock()
            .objects
            .get(&(namespace.to_owned(), name.to_owned()))
            .cloned()
    }

    /// Edits an object out of band, bumping its resourceVersion.
    pub fn edit(&self, namespace: &str, name: &str, f: impl FnOnce(&mut K)) {
        let mut state = self.lock();
        let version = state.next_version;
        state.next_version += 1;

        let obj = state
            .objects
            .get_mut(&(namespace.to_owned(), name.to_owned()))
            .expect("object to edit");
        f(obj);
        obj.meta_mut().resource_version = Some(version.to_string());
    }

    /// Deletes an object out of band, honouring finalizers like the API server.
    pub fn request_deletion(&self, namespace: &str, name: &str) {
        let mut state = self.lock();
        let k = (namespace.to_owned(), name.to_owned());
        let obj = state.objects.get_mut(&k).expect("object to delete");

        if obj.finalizers().is_empty() {
            state.objects.remove(&k);
        } else {
            obj.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
        }
    }

    pub fn add_namespace(&self, namespace: &str) {
        self.lock().namespaces.insert(namespace.to_owned());
    }

    pub fn replicas(&self, name: &str) -> BTreeMap<String, K> {
        self.lock()
            .objects
            .iter()
            .filter(|((_, n), _)| n == name)
            .map(|((ns, _), obj)| (ns.clone(), obj.clone()))
            .collect()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.lock().ops.clone()
    }

    pub fn clear_ops(&self) {
        self.lock().ops.clear();
    }

    pub fn conflict_next_update(&self) {
        self.lock().conflict_next_update = true;
    }

    /// Every read in `namespace` fails with a server error until cleared.
    pub fn fail_gets_in(&self, namespace: &str) {
        self.lock().failing_gets.insert(namespace.to_owned());
    }

    /// The next delete in `namespace` finds the object already removed by
    /// someone else.
    pub fn vanish_on_delete_in(&self, namespace: &str) {
        self.lock().vanishing_deletes.insert(namespace.to_owned());
    }

    pub fn fail_list_namespaces(&self, fail: bool) {
        self.lock().fail_list_namespaces = fail;
    }
}

fn server_error(message: &str) -> StoreError {
    StoreError::Kube(kube::Error::Api(ErrorResponse {
        status: "Failure".to_owned(),
        message: message.to_owned(),
        reason: "InternalError".to_owned(),
        code: 500,
    }))
}

#[async_trait]
impl<K: Replicated> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, namespace: &str, name: &str) -> Result<Option<K>, StoreError> {
        if self.lock().failing_gets.contains(namespace) {
            return Err(server_error("injected read failure"));
        }

        Ok(self.object(namespace, name))
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StoreError> {
        let state = self.lock();
        if state.fail_list_namespaces {
            return Err(server_error("injected list failure"));
        }

        Ok(state.namespaces.iter().cloned().collect())
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let k = key(obj);

        if state.objects.contains_key(&k) {
            return Err(StoreError::Conflict(format!("{}/{} already exists", k.0, k.1)));
        }

        let mut created = obj.clone();
        created.meta_mut().resource_version = Some(state.next_version.to_string());
        state.next_version += 1;

        state.ops.push(Op::Create {
            namespace: k.0.clone(),
            name: k.1.clone(),
        });
        state.objects.insert(k, created.clone());

        Ok(created)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let k = key(obj);

        if std::mem::take(&mut state.conflict_next_update) {
            return Err(StoreError::Conflict("injected".to_owned()));
        }

        let stored = state.objects.get(&k).ok_or(StoreError::NotFound)?;
        if stored.meta().resource_version != obj.meta().resource_version {
            return Err(StoreError::Conflict("stale resourceVersion".to_owned()));
        }

        let mut updated = obj.clone();
        updated.meta_mut().deletion_timestamp = stored.meta().deletion_timestamp.clone();
        updated.meta_mut().resource_version = Some(state.next_version.to_string());
        state.next_version += 1;

        state.ops.push(Op::Update {
            namespace: k.0.clone(),
            name: k.1.clone(),
        });

        if updated.meta().deletion_timestamp.is_some() && updated.finalizers().is_empty() {
            state.objects.remove(&k);
        } else {
            state.objects.insert(k, updated.clone());
        }

        Ok(updated)
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), StoreError> {
        let mut state = self.lock();
        let k = (namespace.to_owned(), name.to_owned());

        if state.vanishing_deletes.remove(namespace) {
            state.objects.remove(&k);
            return Err(StoreError::NotFound);
        }

        let obj = state.objects.get_mut(&k).ok_or(StoreError::NotFound)?;

        if obj.finalizers().is_empty() {
            state.objects.remove(&k);
        } else {
            obj.meta_mut().deletion_timestamp = Some(Time(Utc::now()));
        }

        state.ops.push(Op::Delete {
            namespace: namespace.to_owned(),
            name: name.to_owned(),
        });

        Ok(())
    }
}
