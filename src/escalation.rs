//! Detection of grants a candidate holds beyond a base permission set.

use crate::rules::{AtomicGrant, GrantSet};

/// Return every candidate grant with no covering entry in `base`, in
/// candidate order. Both sets are normalized by construction, so the
/// comparison works key by key:
///
/// - a non-resource grant is covered only by a non-resource grant with the
///   identical URL;
/// - a resource grant is covered by a base grant with the same API group
///   and resource; when the candidate is restricted to one resource name,
///   the base grant must carry that same name. An unnamed base grant does
///   not cover a named candidate.
///
/// Verb sets play no part in coverage. A key present on both sides counts
/// as covered even when the candidate carries more verbs than the base.
pub fn escalated_grants(base: &GrantSet, candidate: &GrantSet) -> Vec<AtomicGrant> {
    candidate
        .grants()
        .iter()
        .filter(|grant| !base.grants().iter().any(|held| covers(held, grant)))
        .cloned()
        .collect()
}

fn covers(base: &AtomicGrant, candidate: &AtomicGrant) -> bool {
    match (base, candidate) {
        (
            AtomicGrant::NonResource { url: base_url, .. },
            AtomicGrant::NonResource { url, .. },
        ) => base_url == url,
        (
            AtomicGrant::Resource {
                api_group: base_group,
                resource: base_resource,
                resource_name: base_name,
                ..
            },
            AtomicGrant::Resource {
                api_group,
                resource,
                resource_name,
                ..
            },
        ) => {
            if base_group != api_group || base_resource != resource {
                return false;
            }
            match resource_name {
                Some(name) => base_name.as_ref() == Some(name),
                None => true,
            }
        }
        _ => false,
    }
}
