//! Translates cluster events into reconcile requests.
//!
//! Source events pass through here before reaching the controller queue, and
//! namespace events fan out to the cached sources. Kept free of any client so
//! the mapping can be tested on plain objects.

use std::sync::Arc;

use k8s_openapi::api::core::v1::Namespace;
use kube::{ResourceExt, runtime::reflector::ObjectRef};

use crate::{config::ReplicationKeys, finalizer::has_finalizer, policy, replica::Replicated};

#[derive(Debug)]
pub enum Trigger<'a, K> {
    /// A source object was created, edited or marked for deletion.
    Source(&'a K),
    /// A namespace was created or changed.
    Namespace(&'a Namespace),
}

/// Maps one event to the sources that must be reconciled because of it.
///
/// A source event requests itself when it can matter: replication is enabled,
/// or our finalizer is still holding it. A namespace event fans out to every
/// enabled source in `sources`, since any of them may now have a new target;
/// namespaces on their way out request nothing.
pub fn requests<K: Replicated>(
    trigger: Trigger<'_, K>,
    sources: &[Arc<K>],
    keys: &ReplicationKeys,
) -> Vec<ObjectRef<K>> {
    match trigger {
        Trigger::Source(source) => {
            if policy::is_enabled(source.annotations(), keys)
                || has_finalizer(source, &keys.finalizer)
            {
                vec![ObjectRef::from_obj(source)]
            } else {
                Vec::new()
            }
        }
        Trigger::Namespace(namespace) => {
            if namespace.metadata.deletion_timestamp.is_some() {
                return Vec::new();
            }

            sources
                .iter()
                .filter(|s| policy::is_enabled(s.annotations(), keys))
                .map(|s| ObjectRef::from_obj(s.as_ref()))
                .collect()
        }
    }
}
