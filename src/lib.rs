use std::{future, sync::Arc};

use futures::{StreamExt, TryStreamExt};
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Secret};
use kube::{
    Api, Client,
    config::KubeConfigOptions,
    runtime::{
        Controller, WatchStreamExt,
        controller::{self, Action},
        reflector::{self, ObjectRef, Store},
        watcher,
    },
};
use prometheus::Registry;
use tracing::{debug, error, info, warn};

pub mod backoff;
pub mod config;
pub mod diff;
pub mod error;
pub mod filter;
pub mod finalizer;
pub mod metrics;
pub mod policy;
pub mod reconciler;
pub mod replica;
pub mod server;
pub mod store;
pub mod trigger;

use config::{ReplicationKeys, Settings};
use metrics::Metrics;
use reconciler::{Context, error_policy, reconcile};
use replica::Replicated;
use server::ServerState;
use store::KubeStore;
use trigger::Trigger;

pub async fn run(settings: Settings) -> anyhow::Result<()> {
    let options = KubeConfigOptions::default();

    // Load kubeconfig if it's present otherwise fall back to cluster config
    let config = kube::Config::from_kubeconfig(&options)
        .await
        .or_else(|_| kube::Config::incluster())?;
    let client = Client::try_from(config)?;

    let registry = Registry::new();
    let metrics = Metrics::new(&registry)?;
    let state = Arc::new(ServerState::new(registry));

    let listener = server::bind(settings.probe_addr).await?;
    let server_state = state.clone();
    tokio::spawn(async move {
        if let Err(e) = server::serve(listener, server_state).await {
            error!("Probe server error: {}", e);
        }
    });

    let keys = Arc::new(settings.keys.clone());
    let (configmap_cache, configmaps) =
        replicate::<ConfigMap>(client.clone(), keys.clone(), metrics.clone(), &settings);
    let (secret_cache, secrets) = replicate::<Secret>(client, keys, metrics, &settings);

    let ready = async {
        let synced = configmap_cache.wait_until_ready().await.is_ok()
            && secret_cache.wait_until_ready().await.is_ok();
        if synced {
            state.set_ready(true);
            info!("Replicating configmaps and secrets");
        }
    };

    futures::join!(configmaps, secrets, ready);

    state.set_ready(false);
    info!("Controllers stopped");

    Ok(())
}

/// Builds the controller for one replicated kind. Source events reach the
/// queue only when [`trigger::requests`] finds them relevant; namespace events
/// fan out to the enabled sources in the cache. Returns the cache alongside
/// the controller so callers can wait for its first sync.
fn replicate<K: Replicated>(
    client: Client,
    keys: Arc<ReplicationKeys>,
    metrics: Metrics,
    settings: &Settings,
) -> (Store<K>, impl Future<Output = ()> + use<K>) {
    let store = Arc::new(KubeStore::new(client.clone()));
    let ctx = Arc::new(
        Context::<K>::new(store, keys.clone())
            .with_resync_interval(settings.resync_interval)
            .with_metrics(metrics),
    );

    let (cache, writer) = reflector::store();
    let source_keys = keys.clone();
    let source_events = watcher(Api::<K>::all(client.clone()), watcher::Config::default())
        .default_backoff()
        .reflect(writer)
        .applied_objects()
        .try_filter(move |source| {
            let requested = trigger::requests(Trigger::Source(source), &[], &source_keys);
            future::ready(!requested.is_empty())
        });

    let sources = cache.clone();
    let ctl = Controller::for_stream(source_events, cache.clone())
        .with_config(controller::Config::default().concurrency(settings.concurrency))
        .watches(
            Api::<Namespace>::all(client),
            watcher::Config::default(),
            move |namespace| {
                trigger::requests(Trigger::Namespace(&namespace), &sources.state(), &keys)
            },
        )
        .shutdown_on_signal()
        .run(reconcile::<K>, error_policy::<K>, ctx)
        .for_each(log_result::<K>);

    (cache, ctl)
}

async fn log_result<K: Replicated>(
    res: Result<(ObjectRef<K>, Action), controller::Error<error::Error, watcher::Error>>,
) {
    match res {
        Ok((obj, action)) => debug!("Reconciled {}: {:?}", obj, action),
        Err(controller::Error::ReconcilerFailed(_, obj)) => {
            debug!("Reconcile of {} failed, retry scheduled", obj)
        }
        Err(e) => warn!("Controller error: {}", e),
    }
}
