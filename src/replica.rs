use std::{collections::BTreeMap, fmt::Debug};

use k8s_openapi::{
    ByteString, NamespaceResourceScope,
    api::core::v1::{ConfigMap, Secret},
};
use kube::{Resource, ResourceExt, api::ObjectMeta};
use serde::{Serialize, de::DeserializeOwned};

use crate::{config::ReplicationKeys, filter::Filter};

pub const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
pub const TLS_CERT_KEY: &str = "tls.crt";
pub const TLS_PRIVATE_KEY_KEY: &str = "tls.key";

/// How the target store validates a kind's payload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PayloadKind {
    Opaque,
    /// Must always carry certificate and private key entries, even empty ones.
    Tls,
}

/// A namespaced kind whose payload can be copied into other namespaces.
pub trait Replicated:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
    fn payload_kind(&self) -> PayloadKind;

    /// A fresh object carrying only the entries of `self` whose key passes `keys`,
    /// plus whatever the payload kind requires. Metadata is left empty.
    fn project_payload(&self, keys: &Filter) -> Self;

    /// Replaces the payload of `self` with the payload of `template`.
    fn overwrite_payload(&mut self, template: &Self);

    fn same_payload(&self, other: &Self) -> bool;
}

/// Builds the replica template for `source`: its name, its labels plus the
/// managed-by marker, and its filtered payload. The namespace is left for [`place`].
pub fn project<K: Replicated>(source: &K, keys: &Filter, config: &ReplicationKeys) -> K {
    let mut labels = source.labels().clone();
    labels.insert(
        config.managed_by_label.clone(),
        config.managed_by_value.clone(),
    );

    let mut replica = source.project_payload(keys);
    *replica.meta_mut() = ObjectMeta {
        name: Some(source.name_any()),
        labels: Some(labels),
        ..ObjectMeta::default()
    };

    replica
}

/// A copy of `template` bound to `namespace`.
pub fn place<K: Replicated>(template: &K, namespace: &str) -> K {
    let mut replica = template.clone();
    replica.meta_mut().namespace = Some(namespace.to_owned());
    replica
}

/// Overwrites labels and payload of an existing replica from the template,
/// keeping the server-owned metadata (resourceVersion, uid, ...) intact.
pub fn overwrite_from_template<K: Replicated>(existing: &mut K, template: &K) {
    existing.meta_mut().labels = template.meta().labels.clone();
    existing.overwrite_payload(template);
}

/// Whether an existing replica already looks exactly like the template.
pub fn in_sync<K: Replicated>(existing: &K, template: &K) -> bool {
    same_entries(&existing.meta().labels, &template.meta().labels)
        && existing.same_payload(template)
}

fn filtered<V: Clone>(
    entries: Option<&BTreeMap<String, V>>,
    keys: &Filter,
    into: &mut BTreeMap<String, V>,
) {
    for (key, value) in entries.into_iter().flatten() {
        if keys.matches(key) {
            into.insert(key.clone(), value.clone());
        }
    }
}

fn same_entries<V: PartialEq>(
    a: &Option<BTreeMap<String, V>>,
    b: &Option<BTreeMap<String, V>>,
) -> bool {
    let empty = BTreeMap::new();
    a.as_ref().unwrap_or(&empty) == b.as_ref().unwrap_or(&empty)
}

impl Replicated for ConfigMap {
    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::Opaque
    }

    fn project_payload(&self, keys: &Filter) -> Self {
        let mut data = BTreeMap::new();
        filtered(self.data.as_ref(), keys, &mut data);

        let mut binary_data = BTreeMap::new();
        filtered(self.binary_data.as_ref(), keys, &mut binary_data);

        ConfigMap {
            data: Some(data),
            binary_data: Some(binary_data),
            ..ConfigMap::default()
        }
    }

    fn overwrite_payload(&mut self, template: &Self) {
        self.data = template.data.clone();
        self.binary_data = template.binary_data.clone();
    }

    fn same_payload(&self, other: &Self) -> bool {
        same_entries(&self.data, &other.data) && same_entries(&self.binary_data, &other.binary_data)
    }
}

impl Replicated for Secret {
    fn payload_kind(&self) -> PayloadKind {
        match self.type_.as_deref() {
            Some(TLS_SECRET_TYPE) => PayloadKind::Tls,
            _ => PayloadKind::Opaque,
        }
    }

    fn project_payload(&self, keys: &Filter) -> Self {
        let mut data = BTreeMap::new();

        // The API server rejects TLS secrets without both entries.
        if self.payload_kind() == PayloadKind::Tls {
            data.insert(TLS_CERT_KEY.to_owned(), ByteString(Vec::new()));
            data.insert(TLS_PRIVATE_KEY_KEY.to_owned(), ByteString(Vec::new()));
        }

        filtered(self.data.as_ref(), keys, &mut data);

        Secret {
            type_: self.type_.clone(),
            data: Some(data),
            ..Secret::default()
        }
    }

    fn overwrite_payload(&mut self, template: &Self) {
        self.data = template.data.clone();
        self.string_data = None;
    }

    fn same_payload(&self, other: &Self) -> bool {
        same_entries(&self.data, &other.data)
    }
}
