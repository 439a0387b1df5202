use kube::ResourceExt;

/// Delta between the replicas found in the cluster and the replicas a source wants.
///
/// Replicas are matched by namespace only. A namespace present on both sides
/// lands in `retained`, never in `to_create_or_update`.
#[derive(Debug)]
pub struct Delta<'a, K> {
    /// Existing replicas whose namespace is no longer desired.
    pub to_delete: Vec<&'a K>,
    /// Desired replicas with no existing replica in their namespace.
    pub to_create_or_update: Vec<&'a K>,
    /// `(existing, desired)` pairs sharing a namespace.
    pub retained: Vec<(&'a K, &'a K)>,
}

/// Pairwise comparison by namespace name, quadratic in the number of
/// namespaces. Fine for tens of namespaces per source.
pub fn diff<'a, K: ResourceExt>(existing: &'a [K], desired: &'a [K]) -> Delta<'a, K> {
    let same_namespace = |a: &K, b: &K| a.namespace() == b.namespace();

    let mut delta = Delta {
        to_delete: Vec::new(),
        to_create_or_update: Vec::new(),
        retained: Vec::new(),
    };

    for e in existing {
        match desired.iter().find(|d| same_namespace(e, *d)) {
            Some(d) => delta.retained.push((e, d)),
            None => delta.to_delete.push(e),
        }
    }

    for d in desired {
        if !existing.iter().any(|e| same_namespace(e, d)) {
            delta.to_create_or_update.push(d);
        }
    }

    delta
}
