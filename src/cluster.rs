//! Read-only access to cluster RBAC state.
//!
//! Evaluation never talks to the API server for RBAC objects; it reads
//! from a local, eventually consistent view. The production implementation
//! is backed by reflector stores fed from watch streams; tests substitute
//! an in-memory fixture.

use std::fmt::Debug;
use std::sync::Arc;

use futures::StreamExt;
use k8s_openapi::api::core::v1::Namespace;
use k8s_openapi::api::rbac::v1::{ClusterRole, ClusterRoleBinding, Role, RoleBinding};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::{watcher, WatchStreamExt};
use kube::{Api, Client, Resource};
use serde::de::DeserializeOwned;

use crate::errors::{AppError, EvaluationError};

/// The cluster objects one evaluation reads: namespaces, bindings for each
/// scope, and the roles bindings refer to.
pub trait ClusterView: Send + Sync {
    fn namespace_names(&self) -> Result<Vec<String>, EvaluationError>;

    fn role_bindings(&self, namespace: &str) -> Result<Vec<Arc<RoleBinding>>, EvaluationError>;

    fn cluster_role_bindings(&self) -> Result<Vec<Arc<ClusterRoleBinding>>, EvaluationError>;

    fn role(&self, namespace: &str, name: &str) -> Result<Option<Arc<Role>>, EvaluationError>;

    fn cluster_role(&self, name: &str) -> Result<Option<Arc<ClusterRole>>, EvaluationError>;
}

/// [`ClusterView`] over reflector stores kept warm by background watch
/// tasks.
pub struct ReflectorView {
    namespaces: Store<Namespace>,
    role_bindings: Store<RoleBinding>,
    cluster_role_bindings: Store<ClusterRoleBinding>,
    roles: Store<Role>,
    cluster_roles: Store<ClusterRole>,
}

impl ReflectorView {
    /// Create the stores and spawn one watch task per object kind. Stores
    /// start empty; call [`ReflectorView::wait_until_ready`] before serving
    /// traffic.
    pub fn spawn(client: Client) -> Self {
        Self {
            namespaces: spawn_watch(Api::all(client.clone())),
            role_bindings: spawn_watch(Api::all(client.clone())),
            cluster_role_bindings: spawn_watch(Api::all(client.clone())),
            roles: spawn_watch(Api::all(client.clone())),
            cluster_roles: spawn_watch(Api::all(client)),
        }
    }

    /// Block until every store has seen its initial object list.
    pub async fn wait_until_ready(&self) -> Result<(), AppError> {
        let readiness = [
            ("namespaces", self.namespaces.wait_until_ready().await),
            ("rolebindings", self.role_bindings.wait_until_ready().await),
            (
                "clusterrolebindings",
                self.cluster_role_bindings.wait_until_ready().await,
            ),
            ("roles", self.roles.wait_until_ready().await),
            ("clusterroles", self.cluster_roles.wait_until_ready().await),
        ];
        for (kind, result) in readiness {
            result.map_err(|err| {
                AppError::internal(format!("reflector for {kind} failed to become ready: {err}"))
            })?;
        }
        Ok(())
    }
}

fn spawn_watch<K>(api: Api<K>) -> Store<K>
where
    K: Resource<DynamicType = ()>
        + Clone
        + DeserializeOwned
        + Debug
        + Send
        + Sync
        + 'static,
{
    let (store, writer): (Store<K>, Writer<K>) = reflector::store();
    let kind = K::kind(&()).to_string();
    tokio::spawn(async move {
        let stream = reflector::reflector(
            writer,
            watcher(api, watcher::Config::default()).default_backoff(),
        );
        futures::pin_mut!(stream);
        while let Some(event) = stream.next().await {
            if let Err(err) = event {
                tracing::warn!(kind = %kind, error = %err, "watch stream error");
            }
        }
    });
    store
}

impl ClusterView for ReflectorView {
    fn namespace_names(&self) -> Result<Vec<String>, EvaluationError> {
        Ok(self
            .namespaces
            .state()
            .iter()
            .filter_map(|namespace| namespace.metadata.name.clone())
            .collect())
    }

    fn role_bindings(&self, namespace: &str) -> Result<Vec<Arc<RoleBinding>>, EvaluationError> {
        Ok(self
            .role_bindings
            .state()
            .into_iter()
            .filter(|binding| binding.metadata.namespace.as_deref() == Some(namespace))
            .collect())
    }

    fn cluster_role_bindings(&self) -> Result<Vec<Arc<ClusterRoleBinding>>, EvaluationError> {
        Ok(self.cluster_role_bindings.state())
    }

    fn role(&self, namespace: &str, name: &str) -> Result<Option<Arc<Role>>, EvaluationError> {
        Ok(self
            .roles
            .get(&ObjectRef::new(name).within(namespace)))
    }

    fn cluster_role(&self, name: &str) -> Result<Option<Arc<ClusterRole>>, EvaluationError> {
        Ok(self.cluster_roles.get(&ObjectRef::new(name)))
    }
}
