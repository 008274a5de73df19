//! Aggregation of an identity's effective permissions within one scope.

use std::sync::Arc;

use k8s_openapi::api::rbac::v1::{ClusterRoleBinding, PolicyRule, RoleBinding};

use crate::cluster::ClusterView;
use crate::errors::EvaluationError;
use crate::identity::Identity;
use crate::rules::GrantSet;
use crate::subjects::subjects_match;

const ROLE_KIND: &str = "Role";

/// Effective grants an identity holds in one namespace: the normalized
/// union of rules from every role binding whose subjects match it.
///
/// A binding whose role reference cannot be resolved fails the whole
/// evaluation; an unresolvable reference cannot be proven safe, so it is
/// never skipped.
pub fn namespace_grants(
    identity: &Identity,
    bindings: &[Arc<RoleBinding>],
    view: &dyn ClusterView,
) -> Result<GrantSet, EvaluationError> {
    let mut grants = GrantSet::new();
    for binding in bindings {
        let binding_namespace = binding.metadata.namespace.as_deref().unwrap_or_default();
        let subjects = binding.subjects.as_deref().unwrap_or(&[]);
        if !subjects_match(subjects, identity, binding_namespace) {
            continue;
        }
        grants.extend_from_rules(&role_binding_rules(binding, view)?);
    }
    Ok(grants)
}

/// Effective grants an identity holds at cluster scope. Cluster role
/// bindings carry no namespace, so service account subjects are matched
/// against the empty namespace here.
pub fn cluster_grants(
    identity: &Identity,
    bindings: &[Arc<ClusterRoleBinding>],
    view: &dyn ClusterView,
) -> Result<GrantSet, EvaluationError> {
    let mut grants = GrantSet::new();
    for binding in bindings {
        let subjects = binding.subjects.as_deref().unwrap_or(&[]);
        if !subjects_match(subjects, identity, "") {
            continue;
        }
        let cluster_role = view.cluster_role(&binding.role_ref.name)?.ok_or_else(|| {
            EvaluationError::RoleReferenceNotFound {
                kind: "ClusterRole".to_string(),
                name: binding.role_ref.name.clone(),
                binding: binding.metadata.name.clone().unwrap_or_default(),
            }
        })?;
        grants.extend_from_rules(cluster_role.rules.as_deref().unwrap_or(&[]));
    }
    Ok(grants)
}

/// Resolve a role binding's reference: a `Role` in the binding's own
/// namespace, or a `ClusterRole` for any other reference kind.
fn role_binding_rules(
    binding: &RoleBinding,
    view: &dyn ClusterView,
) -> Result<Vec<PolicyRule>, EvaluationError> {
    let namespace = binding.metadata.namespace.as_deref().unwrap_or_default();
    let binding_name = binding.metadata.name.as_deref().unwrap_or_default();
    if binding.role_ref.kind == ROLE_KIND {
        let role = view.role(namespace, &binding.role_ref.name)?.ok_or_else(|| {
            EvaluationError::RoleReferenceNotFound {
                kind: ROLE_KIND.to_string(),
                name: binding.role_ref.name.clone(),
                binding: format!("{namespace}/{binding_name}"),
            }
        })?;
        Ok(role.rules.clone().unwrap_or_default())
    } else {
        let cluster_role = view.cluster_role(&binding.role_ref.name)?.ok_or_else(|| {
            EvaluationError::RoleReferenceNotFound {
                kind: "ClusterRole".to_string(),
                name: binding.role_ref.name.clone(),
                binding: format!("{namespace}/{binding_name}"),
            }
        })?;
        Ok(cluster_role.rules.clone().unwrap_or_default())
    }
}
