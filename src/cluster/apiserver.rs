//! `ClusterAccessor` backed by the Kubernetes API through `kube`.
//!
//! The accessor owns a small multi-threaded tokio runtime and blocks on it
//! for every call, so campaign workers stay plain threads. Deletes return as
//! soon as the API server accepted them; absence is confirmed by the verifier.
//!
//! This is the only place that classifies API failures: a 404 on a named
//! object becomes `PvtdError::NotFound`, everything else `PvtdError::ClusterApi`.

use std::time::Duration;

use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim};
use kube::api::{Api, DeleteParams, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Client, Config};
use tokio::runtime::Runtime;

use crate::cluster::accessor::ClusterAccessor;
use crate::cluster::types::{ClaimRef, StorageClaim, StorageVolume, TargetKind};
use crate::core::config::ClusterConfig;
use crate::core::errors::{PvtdError, Result};

const RUNTIME_THREADS: usize = 2;

/// Accessor that talks to the API server configured by kubeconfig or the
/// in-cluster service account.
pub struct KubeAccessor {
    runtime: Runtime,
    client: Client,
}

impl std::fmt::Debug for KubeAccessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeAccessor")
            .field("default_namespace", &self.client.default_namespace())
            .finish_non_exhaustive()
    }
}

impl KubeAccessor {
    /// Resolve client configuration and build the client.
    ///
    /// No request is sent here; an unreachable server surfaces on the first
    /// call.
    pub fn connect(cluster: &ClusterConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(RUNTIME_THREADS)
            .thread_name("pvtd-kube")
            .enable_all()
            .build()
            .map_err(|e| PvtdError::Runtime {
                details: format!("failed to start API client runtime: {e}"),
            })?;
        let client = runtime.block_on(async {
            let config = load_client_config(cluster).await?;
            Client::try_from(config).map_err(|e| PvtdError::ClusterApi {
                operation: "build client",
                details: e.to_string(),
            })
        })?;
        Ok(Self { runtime, client })
    }

    fn call<T, F>(&self, operation: &'static str, subject: Subject<'_>, fut: F) -> Result<T>
    where
        F: Future<Output = kube::Result<T>>,
    {
        self.runtime
            .block_on(fut)
            .map_err(|err| classify_failure(operation, err, subject))
    }

    fn claims_in(&self, namespace: &str) -> Api<PersistentVolumeClaim> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn volumes(&self) -> Api<PersistentVolume> {
        Api::all(self.client.clone())
    }
}

async fn load_client_config(cluster: &ClusterConfig) -> Result<Config> {
    let options = KubeConfigOptions {
        context: cluster
            .context
            .clone()
            .filter(|c| !c.trim().is_empty()),
        ..KubeConfigOptions::default()
    };
    let loaded = match (&cluster.kubeconfig, &options.context) {
        (Some(path), _) => {
            let kubeconfig = Kubeconfig::read_from(path).map_err(|e| PvtdError::ClusterApi {
                operation: "read kubeconfig",
                details: format!("{}: {e}", path.display()),
            })?;
            Config::from_custom_kubeconfig(kubeconfig, &options)
                .await
                .map_err(|e| e.to_string())
        }
        (None, Some(_)) => Config::from_kubeconfig(&options)
            .await
            .map_err(|e| e.to_string()),
        (None, None) => Config::infer().await.map_err(|e| e.to_string()),
    };
    let mut config = loaded.map_err(|details| PvtdError::ClusterApi {
        operation: "load client config",
        details,
    })?;
    if cluster.request_timeout_secs > 0 {
        let timeout = Duration::from_secs(cluster.request_timeout_secs);
        config.connect_timeout = Some(timeout);
        config.read_timeout = Some(timeout);
    }
    Ok(config)
}

/// What a single API call addresses, used when classifying its failure.
#[derive(Debug, Clone, Copy)]
enum Subject<'a> {
    Object {
        kind: TargetKind,
        name: &'a str,
        namespace: Option<&'a str>,
    },
    Collection,
}

impl<'a> Subject<'a> {
    const fn claim(name: &'a str, namespace: &'a str) -> Self {
        Self::Object {
            kind: TargetKind::Claim,
            name,
            namespace: Some(namespace),
        }
    }

    const fn volume(name: &'a str) -> Self {
        Self::Object {
            kind: TargetKind::Volume,
            name,
            namespace: None,
        }
    }
}

impl ClusterAccessor for KubeAccessor {
    fn list_claims(&self) -> Result<Vec<StorageClaim>> {
        let api: Api<PersistentVolumeClaim> = Api::all(self.client.clone());
        let list = self.call(
            "list claims",
            Subject::Collection,
            api.list(&ListParams::default()),
        )?;
        Ok(list.items.into_iter().map(StorageClaim::from).collect())
    }

    fn list_claims_in(&self, namespace: &str) -> Result<Vec<StorageClaim>> {
        let api = self.claims_in(namespace);
        let list = self.call(
            "list namespaced claims",
            Subject::Collection,
            api.list(&ListParams::default()),
        )?;
        Ok(list.items.into_iter().map(StorageClaim::from).collect())
    }

    fn list_volumes(&self) -> Result<Vec<StorageVolume>> {
        let api = self.volumes();
        let list = self.call(
            "list volumes",
            Subject::Collection,
            api.list(&ListParams::default()),
        )?;
        Ok(list.items.into_iter().map(StorageVolume::from).collect())
    }

    fn get_claim(&self, name: &str, namespace: &str) -> Result<StorageClaim> {
        let api = self.claims_in(namespace);
        self.call("read claim", Subject::claim(name, namespace), api.get(name))
            .map(StorageClaim::from)
    }

    fn get_volume(&self, name: &str) -> Result<StorageVolume> {
        let api = self.volumes();
        self.call("read volume", Subject::volume(name), api.get(name))
            .map(StorageVolume::from)
    }

    fn delete_claim(&self, name: &str, namespace: &str) -> Result<()> {
        let api = self.claims_in(namespace);
        self.call(
            "delete claim",
            Subject::claim(name, namespace),
            api.delete(name, &DeleteParams::default()),
        )
        .map(drop)
    }

    fn delete_volume(&self, name: &str) -> Result<()> {
        let api = self.volumes();
        self.call(
            "delete volume",
            Subject::volume(name),
            api.delete(name, &DeleteParams::default()),
        )
        .map(drop)
    }

    fn delete_claims_in(&self, namespace: &str) -> Result<()> {
        let api = self.claims_in(namespace);
        self.call(
            "bulk delete claims",
            Subject::Collection,
            api.delete_collection(&DeleteParams::default(), &ListParams::default()),
        )
        .map(drop)
    }
}

// ──────────────────── failure classification ────────────────────

fn classify_failure(operation: &'static str, err: kube::Error, subject: Subject<'_>) -> PvtdError {
    match (err, subject) {
        (
            kube::Error::Api(ae),
            Subject::Object {
                kind,
                name,
                namespace,
            },
        ) if ae.code == 404 => PvtdError::not_found(kind, name, namespace),
        (err, _) => PvtdError::ClusterApi {
            operation,
            details: err.to_string(),
        },
    }
}

// ──────────────────── object conversion ────────────────────

impl From<PersistentVolumeClaim> for StorageClaim {
    fn from(value: PersistentVolumeClaim) -> Self {
        Self {
            name: value.metadata.name.unwrap_or_default(),
            namespace: value.metadata.namespace.unwrap_or_default(),
            volume_name: value
                .spec
                .and_then(|spec| spec.volume_name)
                .filter(|v| !v.is_empty()),
        }
    }
}

impl From<PersistentVolume> for StorageVolume {
    fn from(value: PersistentVolume) -> Self {
        Self {
            name: value.metadata.name.unwrap_or_default(),
            claim_ref: value
                .spec
                .and_then(|spec| spec.claim_ref)
                .and_then(|r| {
                    Some(ClaimRef {
                        name: r.name?,
                        namespace: r.namespace,
                    })
                }),
        }
    }
}
