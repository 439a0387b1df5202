use std::collections::BTreeMap;

use crate::{
    config::ReplicationKeys,
    error::Error,
    filter::{Filter, PatternError},
};

/// Replication intent of a source, resolved from its annotations once per reconcile.
#[derive(Clone, Debug)]
pub struct ReplicationPolicy {
    pub namespaces: Filter,
    pub keys: Filter,
}

/// The master switch: the `enabled` annotation compared case-insensitively to `"true"`.
pub fn is_enabled(annotations: &BTreeMap<String, String>, keys: &ReplicationKeys) -> bool {
    annotations
        .get(&keys.enabled_annotation)
        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
}

impl ReplicationPolicy {
    pub fn resolve(
        annotations: &BTreeMap<String, String>,
        keys: &ReplicationKeys,
    ) -> Result<Self, Error> {
        let parse = |annotation: &String| {
            Filter::parse(annotations.get(annotation).map(String::as_str)).map_err(
                |source: PatternError| Error::Filter {
                    annotation: annotation.clone(),
                    source,
                },
            )
        };

        Ok(Self {
            namespaces: parse(&keys.replicate_to_annotation)?,
            keys: parse(&keys.replicate_keys_annotation)?,
        })
    }
}
