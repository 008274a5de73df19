//! Request identities: the requesting user and the target service account.

use async_trait::async_trait;
use k8s_openapi::api::authentication::v1::{TokenReview, TokenReviewSpec, UserInfo};
use k8s_openapi::api::core::v1::{Secret, ServiceAccount};
use kube::api::PostParams;
use kube::core::DynamicObject;
use kube::{Api, Client};
use serde_json::Value;

use crate::errors::EvaluationError;
use crate::validation::validate_service_account_name;

/// A resolved principal. Built once per request, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub name: String,
    /// May be empty; not every authenticator reports a uid.
    pub uid: String,
    pub groups: Vec<String>,
}

/// Build the requester's identity from the userInfo the API server attached
/// to the admission request.
pub fn extract_requester(user_info: &UserInfo) -> Identity {
    Identity {
        name: user_info.username.clone().unwrap_or_default(),
        uid: user_info.uid.clone().unwrap_or_default(),
        groups: user_info.groups.clone().unwrap_or_default(),
    }
}

/// Locate the service account name inside the admitted object via a JSON
/// pointer expression. The target must be a string field.
pub fn extract_service_account_name(
    object: Option<&DynamicObject>,
    pointer: &str,
) -> Result<String, EvaluationError> {
    let object = object.ok_or_else(|| {
        EvaluationError::identity_resolution("admission request carries no object")
    })?;
    let value = serde_json::to_value(object).map_err(|err| {
        EvaluationError::identity_resolution(format!("encode admitted object: {err}"))
    })?;
    match value.pointer(pointer) {
        Some(Value::String(name)) => {
            validate_service_account_name(name)?;
            Ok(name.clone())
        }
        Some(other) => Err(EvaluationError::identity_resolution(format!(
            "expected string at json pointer {pointer}, found {}",
            value_kind(other)
        ))),
        None => Err(EvaluationError::identity_resolution(format!(
            "no value at json pointer {pointer} in admitted object"
        ))),
    }
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Resolves a service account to the identity the cluster authenticates it
/// as. Substitutable so evaluation can run against canned identities.
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    async fn resolve_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Identity, EvaluationError>;
}

/// Production resolver: reads the service account's token secret and sends
/// it through a TokenReview, keeping the plain account name but adopting
/// the uid and group memberships the authenticator reports.
pub struct TokenReviewResolver {
    client: Client,
}

impl TokenReviewResolver {
    pub fn new(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl IdentityResolver for TokenReviewResolver {
    async fn resolve_service_account(
        &self,
        name: &str,
        namespace: &str,
    ) -> Result<Identity, EvaluationError> {
        let accounts: Api<ServiceAccount> = Api::namespaced(self.client.clone(), namespace);
        let account = accounts.get(name).await.map_err(|err| {
            resolution_error(name, namespace, format!("get service account: {err}"))
        })?;

        let secret_name = account
            .secrets
            .as_deref()
            .unwrap_or(&[])
            .first()
            .and_then(|reference| reference.name.clone())
            .ok_or_else(|| resolution_error(name, namespace, "account has no token secret"))?;

        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets.get(&secret_name).await.map_err(|err| {
            resolution_error(name, namespace, format!("get secret {secret_name}: {err}"))
        })?;
        let token = secret
            .data
            .as_ref()
            .and_then(|data| data.get("token"))
            .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
            .unwrap_or_default();

        let review = TokenReview {
            spec: TokenReviewSpec {
                token: Some(token),
                ..Default::default()
            },
            ..Default::default()
        };
        let reviews: Api<TokenReview> = Api::all(self.client.clone());
        let created = reviews
            .create(&PostParams::default(), &review)
            .await
            .map_err(|err| resolution_error(name, namespace, format!("token review: {err}")))?;

        let user = created
            .status
            .and_then(|status| status.user)
            .unwrap_or_default();
        Ok(Identity {
            name: name.to_string(),
            uid: user.uid.unwrap_or_default(),
            groups: user.groups.unwrap_or_default(),
        })
    }
}

fn resolution_error(name: &str, namespace: &str, detail: impl AsRef<str>) -> EvaluationError {
    EvaluationError::identity_resolution(format!(
        "service account {namespace}/{name}: {}",
        detail.as_ref()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use kube::core::ObjectMeta;

    fn workload(data: serde_json::Value) -> DynamicObject {
        DynamicObject {
            types: None,
            metadata: ObjectMeta {
                name: Some("runner".to_string()),
                namespace: Some("ci".to_string()),
                ..Default::default()
            },
            data,
        }
    }

    #[test]
    fn requester_identity_copies_user_info() {
        let user_info = UserInfo {
            username: Some("alice".to_string()),
            uid: Some("u-1".to_string()),
            groups: Some(vec!["system:authenticated".to_string()]),
            extra: None,
        };
        let requester = extract_requester(&user_info);
        assert_eq!(requester.name, "alice");
        assert_eq!(requester.uid, "u-1");
        assert_eq!(requester.groups, vec!["system:authenticated".to_string()]);
    }

    #[test]
    fn empty_user_info_yields_empty_identity() {
        let requester = extract_requester(&UserInfo::default());
        assert!(requester.name.is_empty());
        assert!(requester.uid.is_empty());
        assert!(requester.groups.is_empty());
    }

    #[test]
    fn pointer_extracts_service_account_name() {
        let object = workload(serde_json::json!({
            "spec": { "serviceAccountName": "build-bot" }
        }));
        let name =
            extract_service_account_name(Some(&object), "/spec/serviceAccountName").unwrap();
        assert_eq!(name, "build-bot");
    }

    #[test]
    fn pointer_reaches_into_pod_templates() {
        let object = workload(serde_json::json!({
            "spec": { "template": { "spec": { "serviceAccountName": "deployer" } } }
        }));
        let name = extract_service_account_name(
            Some(&object),
            "/spec/template/spec/serviceAccountName",
        )
        .unwrap();
        assert_eq!(name, "deployer");
    }

    #[test]
    fn missing_pointer_target_is_an_error() {
        let object = workload(serde_json::json!({ "spec": {} }));
        let err = extract_service_account_name(Some(&object), "/spec/serviceAccountName")
            .unwrap_err();
        assert!(err.to_string().contains("/spec/serviceAccountName"));
    }

    #[test]
    fn non_string_pointer_target_is_an_error() {
        let object = workload(serde_json::json!({ "spec": { "serviceAccountName": 7 } }));
        let err = extract_service_account_name(Some(&object), "/spec/serviceAccountName")
            .unwrap_err();
        assert!(err.to_string().contains("found number"));
    }

    #[test]
    fn missing_object_is_an_error() {
        assert!(extract_service_account_name(None, "/spec/serviceAccountName").is_err());
    }
}
