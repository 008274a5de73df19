//! In-memory test doubles for the cluster view and identity resolver.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::rbac::v1::{
    ClusterRole, ClusterRoleBinding, PolicyRule, Role, RoleBinding, RoleRef, Subject,
};
use kube::core::ObjectMeta;

use crate::cluster::ClusterView;
use crate::errors::EvaluationError;
use crate::identity::{Identity, IdentityResolver};

/// A canned cluster. Built up with the `with_*` methods; list calls can be
/// made to fail wholesale to exercise cache-error handling.
#[derive(Default, Clone)]
pub struct ClusterFixture {
    namespaces: Vec<String>,
    role_bindings: Vec<RoleBinding>,
    cluster_role_bindings: Vec<ClusterRoleBinding>,
    roles: Vec<Role>,
    cluster_roles: Vec<ClusterRole>,
    failure: Option<String>,
}

impl ClusterFixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_namespace(mut self, name: &str) -> Self {
        self.namespaces.push(name.to_string());
        self
    }

    pub fn with_role(mut self, namespace: &str, name: &str, rules: Vec<PolicyRule>) -> Self {
        self.roles.push(Role {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some(namespace.to_string()),
                ..Default::default()
            },
            rules: Some(rules),
        });
        self
    }

    pub fn with_cluster_role(mut self, name: &str, rules: Vec<PolicyRule>) -> Self {
        self.cluster_roles.push(ClusterRole {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            rules: Some(rules),
            aggregation_rule: None,
        });
        self
    }

    pub fn with_role_binding(mut self, binding: RoleBinding) -> Self {
        self.role_bindings.push(binding);
        self
    }

    pub fn with_cluster_role_binding(mut self, binding: ClusterRoleBinding) -> Self {
        self.cluster_role_bindings.push(binding);
        self
    }

    /// Make every list call fail with the given reason.
    pub fn failing(mut self, reason: &str) -> Self {
        self.failure = Some(reason.to_string());
        self
    }

    fn check_failure(&self, what: &str) -> Result<(), EvaluationError> {
        match &self.failure {
            Some(reason) => Err(EvaluationError::cache_lookup(what, reason.clone())),
            None => Ok(()),
        }
    }
}

impl ClusterView for ClusterFixture {
    fn namespace_names(&self) -> Result<Vec<String>, EvaluationError> {
        self.check_failure("namespaces")?;
        Ok(self.namespaces.clone())
    }

    fn role_bindings(&self, namespace: &str) -> Result<Vec<Arc<RoleBinding>>, EvaluationError> {
        self.check_failure("rolebindings")?;
        Ok(self
            .role_bindings
            .iter()
            .filter(|binding| binding.metadata.namespace.as_deref() == Some(namespace))
            .cloned()
            .map(Arc::new)
            .collect())
    }

    fn cluster_role_bindings(&self) -> Result<Vec<Arc<ClusterRoleBinding>>, EvaluationError> {
        self.check_failure("clusterrolebindings")?;
        Ok(self
            .cluster_role_bindings
            .iter()
            .cloned()
            .map(Arc::new)
            .collect())
    }

    fn role(&self, namespace: &str, name: &str) -> Result<Option<Arc<Role>>, EvaluationError> {
        Ok(self
            .roles
            .iter()
            .find(|role| {
                role.metadata.namespace.as_deref() == Some(namespace)
                    && role.metadata.name.as_deref() == Some(name)
            })
            .cloned()
            .map(Arc::new))
    }

    fn cluster_role(&self, name: &str) -> Result<Option<Arc<ClusterRole>>, EvaluationError> {
        Ok(self
            .cluster_roles
            .iter()
            .find(|role| role.metadata.name.as_deref() == Some(name))
            .cloned()
            .map(Arc::new))
    }
}

/// Identity resolver answering from a fixed table keyed by
/// namespace/name. Unknown accounts resolve to an error, like a live
/// lookup against a cluster that does not have them.
#[derive(Default, Clone)]
pub struct StaticResolver {
    identities: HashMap<String, Identity>,
}

impl StaticResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_identity(mut self, namespace: &str, name: &str, identity: Identity) -> Self {
        self.identities
            .insert(format!("{namespace}/{name}"), identity);
        self
    }

    /// Convenience for the common case: a service account that resolves to
    /// its own bare name with the usual group memberships.
    pub fn with_service_account(self, namespace: &str, name: &str) -> Self {
        let identity = Identity {
            name: name.to_string(),
            uid: format!("uid-{name}"),
            groups: vec![
                "system:serviceaccounts".to_string(),
                format!("system:serviceaccounts:{namespace}"),
            ],
        };
        self.with_identity(namespace, name, identity)
    }
}

#[async_trait]
impl IdentityResolver for StaticResolver {
    async fn resolve_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Identity, EvaluationError> {
        self.identities
            .get(&format!("{namespace}/{name}"))
            .cloned()
            .ok_or_else(|| {
                EvaluationError::identity_resolution(format!(
                    "service account {namespace}/{name} not found"
                ))
            })
    }
}

pub fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
    PolicyRule {
        api_groups: Some(api_groups.iter().map(|s| s.to_string()).collect()),
        resources: Some(resources.iter().map(|s| s.to_string()).collect()),
        resource_names: None,
        non_resource_urls: None,
        verbs: verbs.iter().map(|s| s.to_string()).collect(),
    }
}

pub fn user_subject(name: &str) -> Subject {
    Subject {
        api_group: None,
        kind: "User".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

pub fn group_subject(name: &str) -> Subject {
    Subject {
        api_group: None,
        kind: "Group".to_string(),
        name: name.to_string(),
        namespace: None,
    }
}

pub fn sa_subject(name: &str, namespace: &str) -> Subject {
    Subject {
        api_group: None,
        kind: "ServiceAccount".to_string(),
        name: name.to_string(),
        namespace: Some(namespace.to_string()),
    }
}

pub fn role_binding(
    namespace: &str,
    name: &str,
    role_ref_kind: &str,
    role_ref_name: &str,
    subjects: Vec<Subject>,
) -> RoleBinding {
    RoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: role_ref_kind.to_string(),
            name: role_ref_name.to_string(),
        },
        subjects: Some(subjects),
    }
}

pub fn cluster_role_binding(
    name: &str,
    role_ref_name: &str,
    subjects: Vec<Subject>,
) -> ClusterRoleBinding {
    ClusterRoleBinding {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            ..Default::default()
        },
        role_ref: RoleRef {
            api_group: "rbac.authorization.k8s.io".to_string(),
            kind: "ClusterRole".to_string(),
            name: role_ref_name.to_string(),
        },
        subjects: Some(subjects),
    }
}
