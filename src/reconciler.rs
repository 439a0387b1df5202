//! Converges the replicas of one source object.
//!
//! A reconcile loads the source, gates on the `enabled` annotation, makes sure
//! the finalizer protects it, discovers replicas in every other namespace and
//! then either tears them all down (source being deleted) or diffs them
//! against the desired set and applies the difference. Any failure aborts the
//! attempt; the next attempt starts from the top, which is safe because every
//! step is idempotent.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use kube::{ResourceExt, runtime::controller::Action};
use tracing::{error, info, instrument};

use crate::{
    backoff::RetryBackoff,
    config::ReplicationKeys,
    diff::diff,
    error::Error,
    finalizer::{self, has_finalizer},
    metrics::Metrics,
    policy::{self, ReplicationPolicy},
    replica::{self, Replicated},
    store::{ObjectStore, StoreError},
};

/// What a successful reconcile did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// The source no longer exists.
    Missing,
    /// Replication is not enabled; nothing was touched.
    Disabled,
    /// The source is being deleted; its replicas are gone and the finalizer released.
    TornDown { deleted: usize },
    /// Replicas match the source. `written` counts creates and updates.
    Converged { deleted: usize, written: usize },
}

pub struct Context<K: Replicated> {
    store: Arc<dyn ObjectStore<K>>,
    keys: Arc<ReplicationKeys>,
    resync_interval: Option<Duration>,
    backoff: RetryBackoff,
    metrics: Option<Metrics>,
}

impl<K: Replicated> Context<K> {
    pub fn new(store: Arc<dyn ObjectStore<K>>, keys: Arc<ReplicationKeys>) -> Self {
        Self {
            store,
            keys,
            resync_interval: None,
            backoff: RetryBackoff::default(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_resync_interval(mut self, interval: Option<Duration>) -> Self {
        self.resync_interval = interval;
        self
    }

    pub fn keys(&self) -> &ReplicationKeys {
        &self.keys
    }

    pub async fn converge(&self, namespace: &str, name: &str) -> Result<Outcome, Error> {
        let Some(source) = self.store.get(namespace, name).await.map_err(Error::Load)? else {
            return Ok(Outcome::Missing);
        };

        let deleting = source.meta().deletion_timestamp.is_some();
        let protected = has_finalizer(&source, &self.keys.finalizer);

        // A protected source being deleted still needs its teardown, even if
        // replication was switched off in the meantime.
        if !policy::is_enabled(source.annotations(), &self.keys) && !(deleting && protected) {
            info!("Replication not enabled");
            return Ok(Outcome::Disabled);
        }

        let source = if deleting {
            source
        } else {
            finalizer::ensure_present(self.store.as_ref(), &source, &self.keys.finalizer)
                .await
                .map_err(Error::AddFinalizer)?
        };

        let namespaces = self
            .store
            .list_namespaces()
            .await
            .map_err(Error::ListNamespaces)?;
        let targets: Vec<&str> = namespaces
            .iter()
            .map(String::as_str)
            .filter(|ns| *ns != namespace)
            .collect();

        let mut existing = Vec::new();
        for target in &targets {
            match self.store.get(target, name).await {
                Ok(Some(replica)) => existing.push(replica),
                Ok(None) => {}
                Err(source) => {
                    return Err(Error::Discover {
                        namespace: (*target).to_owned(),
                        source,
                    });
                }
            }
        }

        if deleting {
            info!(replicas = existing.len(), "Deleting");

            let mut deleted = 0;
            for replica in &existing {
                if self.delete_replica(replica).await? {
                    deleted += 1;
                }
            }

            finalizer::ensure_absent(self.store.as_ref(), &source, &self.keys.finalizer)
                .await
                .map_err(Error::RemoveFinalizer)?;

            return Ok(Outcome::TornDown { deleted });
        }

        info!("Creating or updating");

        let policy = ReplicationPolicy::resolve(source.annotations(), &self.keys)?;
        let template = replica::project(&source, &policy.keys, &self.keys);
        let desired: Vec<K> = targets
            .iter()
            .filter(|ns| policy.namespaces.matches(ns))
            .map(|ns| replica::place(&template, ns))
            .collect();

        let delta = diff(&existing, &desired);

        let mut deleted = 0;
        for replica in delta.to_delete {
            if self.delete_replica(replica).await? {
                deleted += 1;
            }
        }

        let mut written = 0;
        for replica in delta.to_create_or_update {
            if self.upsert(replica).await? {
                written += 1;
            }
        }
        for (current, desired) in delta.retained {
            if self.refresh(current, desired).await? {
                written += 1;
            }
        }

        Ok(Outcome::Converged { deleted, written })
    }

    /// Returns false when the replica was already gone.
    async fn delete_replica(&self, replica: &K) -> Result<bool, Error> {
        let namespace = replica.namespace().unwrap_or_default();

        match self.store.delete(&namespace, &replica.name_any()).await {
            Ok(()) => {
                info!(%namespace, "Deleted replica");
                Ok(true)
            }
            Err(StoreError::NotFound) => Ok(false),
            Err(source) => Err(Error::DeleteReplica { namespace, source }),
        }
    }

    async fn upsert(&self, desired: &K) -> Result<bool, Error> {
        let namespace = desired.namespace().unwrap_or_default();
        let replicate_err = |source: StoreError| Error::Replicate {
            namespace: namespace.clone(),
            source,
        };

        match self
            .store
            .get(&namespace, &desired.name_any())
            .await
            .map_err(replicate_err)?
        {
            None => {
                self.store.create(desired).await.map_err(replicate_err)?;
                info!(%namespace, "Created replica");
                Ok(true)
            }
            Some(current) => self.refresh(&current, desired).await,
        }
    }

    /// Overwrites `current` from the template unless it already matches.
    async fn refresh(&self, current: &K, desired: &K) -> Result<bool, Error> {
        if replica::in_sync(current, desired) {
            return Ok(false);
        }

        let namespace = current.namespace().unwrap_or_default();
        let mut updated = current.clone();
        replica::overwrite_from_template(&mut updated, desired);

        self.store
            .update(&updated)
            .await
            .map_err(|source| Error::Replicate {
                namespace: namespace.clone(),
                source,
            })?;

        info!(%namespace, "Updated replica");
        Ok(true)
    }
}

fn object_key<K: Replicated>(obj: &K) -> String {
    format!("{}/{}", obj.namespace().unwrap_or_default(), obj.name_any())
}

#[instrument(
    skip_all,
    fields(
        kind = %K::kind(&()),
        namespace = %source.namespace().unwrap_or_default(),
        name = %source.name_any(),
    )
)]
pub async fn reconcile<K: Replicated>(
    source: Arc<K>,
    ctx: Arc<Context<K>>,
) -> Result<Action, Error> {
    let namespace = source.namespace().ok_or(Error::MissingNamespace)?;

    let started = Instant::now();
    let outcome = ctx.converge(&namespace, &source.name_any()).await;
    if let Some(metrics) = &ctx.metrics {
        metrics.reconciled(&K::kind(&()), started.elapsed());
    }

    let outcome = outcome?;
    ctx.backoff.reset(&object_key(source.as_ref()));

    Ok(match outcome {
        Outcome::Converged { .. } => ctx
            .resync_interval
            .map_or_else(Action::await_change, Action::requeue),
        Outcome::Missing | Outcome::Disabled | Outcome::TornDown { .. } => Action::await_change(),
    })
}

pub fn error_policy<K: Replicated>(source: Arc<K>, err: &Error, ctx: Arc<Context<K>>) -> Action {
    let delay = ctx.backoff.next_delay(&object_key(source.as_ref()));
    if let Some(metrics) = &ctx.metrics {
        metrics.failed(&K::kind(&()), err.step());
    }

    error!(
        kind = %K::kind(&()),
        namespace = %source.namespace().unwrap_or_default(),
        name = %source.name_any(),
        step = err.step(),
        retry_in = ?delay,
        "Reconcile failed: {}",
        err
    );

    Action::requeue(delay)
}
