//! Per-request admission verdicts.
//!
//! One linear pass per request: resolve both identities, walk every
//! namespace and then cluster scope, compare the service account's
//! effective grants against the requester's, and fold the results into a
//! single allow/deny with a diagnostic message. Nothing is retried and no
//! state survives the request.

use k8s_openapi::api::rbac::v1::PolicyRule;
use kube::core::admission::AdmissionRequest;
use kube::core::response::{Status, StatusSummary};
use kube::core::DynamicObject;
use tracing::{debug, error, info, warn};

use crate::aggregate::{cluster_grants, namespace_grants};
use crate::cluster::ClusterView;
use crate::config::{EvaluatorConfig, NotFoundBehavior};
use crate::errors::EvaluationError;
use crate::escalation::escalated_grants;
use crate::identity::{
    extract_requester, extract_service_account_name, Identity, IdentityResolver,
};
use crate::metrics::AdmissionMetricsHelper;
use crate::rules::AtomicGrant;

/// Where an escalation was found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    Namespace(String),
    Cluster,
}

/// Terminal outcome of one evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decision {
    pub allowed: bool,
    pub message: String,
    pub code: u16,
}

impl Decision {
    pub fn allow(message: impl Into<String>) -> Self {
        Self {
            allowed: true,
            message: message.into(),
            code: 200,
        }
    }

    pub fn deny(message: impl Into<String>) -> Self {
        Self {
            allowed: false,
            message: message.into(),
            code: 403,
        }
    }

    /// Render into the status carried inside the admission response.
    pub fn into_status(self) -> Status {
        let summary = if self.allowed {
            StatusSummary::Success
        } else {
            StatusSummary::Failure
        };
        Status {
            status: Some(summary),
            message: self.message,
            reason: String::new(),
            details: None,
            code: self.code,
        }
    }
}

/// Evaluate one admission request.
///
/// The requester's identity comes from the request's userInfo; the target
/// service account is located inside the admitted object via the
/// configured JSON pointer and resolved through `resolver`. Failure to
/// produce the service account identity is routed through the configured
/// not-found behavior. Every other failure denies the request with the
/// underlying error text.
pub async fn decide(
    request: &AdmissionRequest<DynamicObject>,
    view: &dyn ClusterView,
    resolver: &dyn IdentityResolver,
    config: &EvaluatorConfig,
) -> Decision {
    let requester = extract_requester(&request.user_info);
    info!(
        request_uid = %request.uid,
        user = %requester.name,
        user_uid = %requester.uid,
        groups = ?requester.groups,
        "evaluating admission request"
    );

    let account_name = match extract_service_account_name(
        request.object.as_ref(),
        &config.service_account_pointer,
    ) {
        Ok(name) => name,
        Err(err) => return resolution_outcome(config.sa_not_found_behavior, &err),
    };
    let target_namespace = request.namespace.clone().unwrap_or_default();
    debug!(service_account = %account_name, namespace = %target_namespace, "service account extracted");

    let account = match resolver
        .resolve_service_account(&account_name, &target_namespace)
        .await
    {
        Ok(identity) => identity,
        Err(err) => return resolution_outcome(config.sa_not_found_behavior, &err),
    };
    debug!(
        service_account = %account.name,
        account_uid = %account.uid,
        groups = ?account.groups,
        "service account identity resolved"
    );

    match find_escalations(&requester, &account, view) {
        Ok(escalations) => match render(escalations) {
            Ok(decision) => decision,
            Err(err) => {
                error!(error = %err, "failed to render escalation report");
                Decision::deny(err.to_string())
            }
        },
        Err(err) => {
            error!(error = %err, "evaluation failed");
            Decision::deny(err.to_string())
        }
    }
}

/// Walk every namespace, then cluster scope, and collect the grants the
/// service account holds beyond the requester. The two identities'
/// grant sets are built independently per scope and only ever meet inside
/// the escalation comparison.
fn find_escalations(
    requester: &Identity,
    account: &Identity,
    view: &dyn ClusterView,
) -> Result<Vec<(Scope, Vec<AtomicGrant>)>, EvaluationError> {
    let mut escalations = Vec::new();

    let mut namespaces = view.namespace_names()?;
    namespaces.sort();
    for namespace in &namespaces {
        debug!(namespace = %namespace, "evaluating namespace scope");
        let bindings = view.role_bindings(namespace)?;
        let account_grants = namespace_grants(account, &bindings, view)?;
        let requester_grants = namespace_grants(requester, &bindings, view)?;
        let escalated = escalated_grants(&requester_grants, &account_grants);
        if !escalated.is_empty() {
            warn!(
                namespace = %namespace,
                escalated = escalated.len(),
                "service account holds grants the requester does not"
            );
            AdmissionMetricsHelper::record_escalations("namespace", escalated.len());
            escalations.push((Scope::Namespace(namespace.clone()), escalated));
        }
    }

    let bindings = view.cluster_role_bindings()?;
    let account_grants = cluster_grants(account, &bindings, view)?;
    let requester_grants = cluster_grants(requester, &bindings, view)?;
    let escalated = escalated_grants(&requester_grants, &account_grants);
    if !escalated.is_empty() {
        warn!(
            escalated = escalated.len(),
            "service account holds cluster-scope grants the requester does not"
        );
        AdmissionMetricsHelper::record_escalations("cluster", escalated.len());
        escalations.push((Scope::Cluster, escalated));
    }

    Ok(escalations)
}

/// Fold accumulated escalations into the final verdict. The message leads
/// with the cluster-scope clause, then one clause per namespace in the
/// order namespaces were evaluated.
fn render(escalations: Vec<(Scope, Vec<AtomicGrant>)>) -> Result<Decision, EvaluationError> {
    if escalations.is_empty() {
        return Ok(Decision::allow("Request allowed"));
    }

    let mut clauses = Vec::new();
    if let Some((_, grants)) = escalations
        .iter()
        .find(|(scope, _)| matches!(scope, Scope::Cluster))
    {
        clauses.push(format!(
            "Request would grant permissions at cluster scope that the requesting user does not hold: {}.",
            serialize_grants(grants)?
        ));
    }
    for (scope, grants) in &escalations {
        if let Scope::Namespace(namespace) = scope {
            clauses.push(format!(
                "Request would grant permissions in namespace {namespace} that the requesting user does not hold: {}.",
                serialize_grants(grants)?
            ));
        }
    }
    Ok(Decision::deny(clauses.join(" ")))
}

fn serialize_grants(grants: &[AtomicGrant]) -> Result<String, EvaluationError> {
    let rules: Vec<PolicyRule> = grants.iter().map(AtomicGrant::to_policy_rule).collect();
    Ok(serde_json::to_string(&rules)?)
}

fn resolution_outcome(behavior: NotFoundBehavior, err: &EvaluationError) -> Decision {
    error!(error = %err, "service account identity could not be resolved");
    match behavior {
        NotFoundBehavior::Deny => {
            AdmissionMetricsHelper::record_identity_resolution_failure("deny");
            Decision::deny(err.to_string())
        }
        NotFoundBehavior::Allow => {
            AdmissionMetricsHelper::record_identity_resolution_failure("allow");
            Decision::allow(err.to_string())
        }
    }
}
