use thiserror::Error;

use crate::{filter::PatternError, store::StoreError};

/// Failure of a single reconcile attempt. Every variant aborts the attempt and
/// is retried as a whole; the variant names the step that failed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("source object has no namespace")]
    MissingNamespace,

    #[error("failed to load source: {0}")]
    Load(#[source] StoreError),

    #[error("failed to add finalizer: {0}")]
    AddFinalizer(#[source] StoreError),

    #[error("failed to remove finalizer: {0}")]
    RemoveFinalizer(#[source] StoreError),

    #[error("failed to list namespaces: {0}")]
    ListNamespaces(#[source] StoreError),

    #[error("failed to check for replica in namespace '{namespace}': {source}")]
    Discover {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to evaluate filter in annotation '{annotation}': {source}")]
    Filter {
        annotation: String,
        #[source]
        source: PatternError,
    },

    #[error("failed to delete replica in namespace '{namespace}': {source}")]
    DeleteReplica {
        namespace: String,
        #[source]
        source: StoreError,
    },

    #[error("failed to replicate into namespace '{namespace}': {source}")]
    Replicate {
        namespace: String,
        #[source]
        source: StoreError,
    },
}

impl Error {
    /// Short name of the reconcile step, used as log context.
    pub fn step(&self) -> &'static str {
        match self {
            Self::MissingNamespace | Self::Load(_) => "load",
            Self::AddFinalizer(_) => "protect",
            Self::ListNamespaces(_) | Self::Discover { .. } => "discover",
            Self::Filter { .. } => "projection",
            Self::DeleteReplica { .. } | Self::Replicate { .. } => "converge",
            Self::RemoveFinalizer(_) => "unprotect",
        }
    }
}
