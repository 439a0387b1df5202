use kube::ResourceExt;
use tracing::info;

use crate::{
    replica::Replicated,
    store::{ObjectStore, StoreError},
};

pub fn has_finalizer<K: ResourceExt>(obj: &K, finalizer: &str) -> bool {
    obj.finalizers().iter().any(|f| f == finalizer)
}

/// Adds `finalizer` to the source unless it is already there. Returns the
/// source as it now stands in the store.
///
/// One read-modify-write guarded by the source's resourceVersion; a conflict is
/// returned to the caller rather than retried here.
pub async fn ensure_present<K: Replicated>(
    store: &dyn ObjectStore<K>,
    source: &K,
    finalizer: &str,
) -> Result<K, StoreError> {
    if has_finalizer(source, finalizer) {
        return Ok(source.clone());
    }

    info!("Adding finalizer");

    let mut updated = source.clone();
    updated.finalizers_mut().push(finalizer.to_owned());
    store.update(&updated).await
}

/// Removes `finalizer` from the source if present.
pub async fn ensure_absent<K: Replicated>(
    store: &dyn ObjectStore<K>,
    source: &K,
    finalizer: &str,
) -> Result<K, StoreError> {
    if !has_finalizer(source, finalizer) {
        return Ok(source.clone());
    }

    info!("Removing finalizer");

    let mut updated = source.clone();
    updated.finalizers_mut().retain(|f| f != finalizer);
    store.update(&updated).await
}
