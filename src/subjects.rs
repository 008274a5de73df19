//! Matching of binding subjects against a resolved identity.

use k8s_openapi::api::rbac::v1::Subject;

use crate::identity::Identity;

/// True when any subject of a binding references the identity. Service
/// account subjects only match inside the namespace the binding lives in;
/// cluster-scoped bindings pass an empty namespace here.
pub fn subjects_match(subjects: &[Subject], identity: &Identity, binding_namespace: &str) -> bool {
    subjects
        .iter()
        .any(|subject| subject_matches(subject, identity, binding_namespace))
}

pub fn subject_matches(subject: &Subject, identity: &Identity, binding_namespace: &str) -> bool {
    match subject.kind.as_str() {
        "User" => subject.name == identity.name,
        "ServiceAccount" => {
            subject.name == identity.name
                && subject.namespace.as_deref().unwrap_or_default() == binding_namespace
        }
        "Group" => identity.groups.iter().any(|group| group == &subject.name),
        _ => false,
    }
}
