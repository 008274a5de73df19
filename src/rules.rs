//! Normalization of RBAC policy rules into comparable atomic grants.
//!
//! Kubernetes `PolicyRule`s are compound: one rule can span several API
//! groups, resources, resource names and non-resource URLs at once. Before
//! two permission sets can be compared they are expanded into atomic grants
//! carrying exactly one value per field, then merged so that each
//! (API group, resource, resource name) key and each non-resource URL
//! appears at most once.

use k8s_openapi::api::rbac::v1::PolicyRule;

/// The wildcard verb. Absorbs every other verb when sets are merged.
pub const VERB_ALL: &str = "*";

/// A deduplicated verb list. Collapses to the singleton `*` as soon as any
/// constituent contains the wildcard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerbSet(Vec<String>);

impl VerbSet {
    pub fn new<I>(verbs: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        let mut reduced: Vec<String> = Vec::new();
        for verb in verbs {
            let verb = verb.as_ref();
            if verb == VERB_ALL {
                return VerbSet(vec![VERB_ALL.to_string()]);
            }
            if !reduced.iter().any(|existing| existing == verb) {
                reduced.push(verb.to_string());
            }
        }
        VerbSet(reduced)
    }

    pub fn is_wildcard(&self) -> bool {
        self.0.first().map(String::as_str) == Some(VERB_ALL)
    }

    /// Union with another verb set. Wildcard on either side wins.
    pub fn merge(&mut self, other: &VerbSet) {
        if self.is_wildcard() {
            return;
        }
        if other.is_wildcard() {
            self.0 = vec![VERB_ALL.to_string()];
            return;
        }
        for verb in &other.0 {
            if !self.0.iter().any(|existing| existing == verb) {
                self.0.push(verb.clone());
            }
        }
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.0.clone()
    }
}

/// A single permission: one resource key or one non-resource URL, plus the
/// verbs it carries. Only ever constructed by [`GrantSet`] so the
/// one-value-per-field shape holds everywhere grants are compared.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AtomicGrant {
    Resource {
        api_group: String,
        resource: String,
        resource_name: Option<String>,
        verbs: VerbSet,
    },
    NonResource {
        url: String,
        verbs: VerbSet,
    },
}

impl AtomicGrant {
    pub fn verbs(&self) -> &VerbSet {
        match self {
            AtomicGrant::Resource { verbs, .. } | AtomicGrant::NonResource { verbs, .. } => verbs,
        }
    }

    fn verbs_mut(&mut self) -> &mut VerbSet {
        match self {
            AtomicGrant::Resource { verbs, .. } | AtomicGrant::NonResource { verbs, .. } => verbs,
        }
    }

    /// Two grants share a key when they address the same permission slot:
    /// identical non-resource URL, or identical API group, resource and
    /// resource-name restriction. A named grant and an unnamed grant on the
    /// same resource are distinct keys.
    pub fn shares_key(&self, other: &AtomicGrant) -> bool {
        match (self, other) {
            (
                AtomicGrant::NonResource { url, .. },
                AtomicGrant::NonResource { url: other_url, .. },
            ) => url == other_url,
            (
                AtomicGrant::Resource {
                    api_group,
                    resource,
                    resource_name,
                    ..
                },
                AtomicGrant::Resource {
                    api_group: other_group,
                    resource: other_resource,
                    resource_name: other_name,
                    ..
                },
            ) => {
                api_group == other_group
                    && resource == other_resource
                    && resource_name == other_name
            }
            _ => false,
        }
    }

    /// Render the grant back into the familiar `PolicyRule` wire shape,
    /// used when escalations are reported to the caller.
    pub fn to_policy_rule(&self) -> PolicyRule {
        match self {
            AtomicGrant::Resource {
                api_group,
                resource,
                resource_name,
                verbs,
            } => PolicyRule {
                api_groups: Some(vec![api_group.clone()]),
                resources: Some(vec![resource.clone()]),
                resource_names: resource_name.as_ref().map(|name| vec![name.clone()]),
                non_resource_urls: None,
                verbs: verbs.to_vec(),
            },
            AtomicGrant::NonResource { url, verbs } => PolicyRule {
                api_groups: None,
                resources: None,
                resource_names: None,
                non_resource_urls: Some(vec![url.clone()]),
                verbs: verbs.to_vec(),
            },
        }
    }
}

/// A normalized set of atomic grants: at most one entry per grant key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GrantSet {
    grants: Vec<AtomicGrant>,
}

impl GrantSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_rules(rules: &[PolicyRule]) -> Self {
        let mut set = Self::new();
        set.extend_from_rules(rules);
        set
    }

    /// Expand compound rules into atomic grants and fold them in.
    ///
    /// Every API group × resource combination yields one grant per resource
    /// name (or a single unnamed grant when the rule names none); every
    /// non-resource URL yields one grant. All of them carry the rule's
    /// reduced verb list.
    pub fn extend_from_rules(&mut self, rules: &[PolicyRule]) {
        for rule in rules {
            let verbs = VerbSet::new(&rule.verbs);
            let names: &[String] = rule.resource_names.as_deref().unwrap_or(&[]);
            for api_group in rule.api_groups.as_deref().unwrap_or(&[]) {
                for resource in rule.resources.as_deref().unwrap_or(&[]) {
                    if names.is_empty() {
                        self.merge_grant(AtomicGrant::Resource {
                            api_group: api_group.clone(),
                            resource: resource.clone(),
                            resource_name: None,
                            verbs: verbs.clone(),
                        });
                    } else {
                        for name in names {
                            self.merge_grant(AtomicGrant::Resource {
                                api_group: api_group.clone(),
                                resource: resource.clone(),
                                resource_name: Some(name.clone()),
                                verbs: verbs.clone(),
                            });
                        }
                    }
                }
            }
            for url in rule.non_resource_urls.as_deref().unwrap_or(&[]) {
                self.merge_grant(AtomicGrant::NonResource {
                    url: url.clone(),
                    verbs: verbs.clone(),
                });
            }
        }
    }

    /// Fold one grant in: union verb sets when the key already exists,
    /// append otherwise.
    pub fn merge_grant(&mut self, grant: AtomicGrant) {
        if let Some(existing) = self.grants.iter_mut().find(|held| held.shares_key(&grant)) {
            existing.verbs_mut().merge(grant.verbs());
        } else {
            self.grants.push(grant);
        }
    }

    pub fn merge(&mut self, other: GrantSet) {
        for grant in other.grants {
            self.merge_grant(grant);
        }
    }

    pub fn grants(&self) -> &[AtomicGrant] {
        &self.grants
    }

    pub fn is_empty(&self) -> bool {
        self.grants.is_empty()
    }

    pub fn len(&self) -> usize {
        self.grants.len()
    }

    pub fn to_rules(&self) -> Vec<PolicyRule> {
        self.grants.iter().map(AtomicGrant::to_policy_rule).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rule(api_groups: &[&str], resources: &[&str], verbs: &[&str]) -> PolicyRule {
        PolicyRule {
            api_groups: Some(api_groups.iter().map(|s| s.to_string()).collect()),
            resources: Some(resources.iter().map(|s| s.to_string()).collect()),
            resource_names: None,
            non_resource_urls: None,
            verbs: verbs.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn expands_group_resource_combinations() {
        let set = GrantSet::from_rules(&[rule(
            &["", "apps"],
            &["pods", "deployments"],
            &["get", "list"],
        )]);
        assert_eq!(set.len(), 4);
        assert!(set.grants().iter().all(|grant| match grant {
            AtomicGrant::Resource { verbs, .. } =>
                verbs.as_slice() == ["get".to_string(), "list".to_string()],
            AtomicGrant::NonResource { .. } => false,
        }));
    }

    #[test]
    fn expands_resource_names_individually() {
        let mut named = rule(&[""], &["secrets"], &["get"]);
        named.resource_names = Some(vec!["registry".to_string(), "signing-key".to_string()]);
        let set = GrantSet::from_rules(&[named]);
        assert_eq!(set.len(), 2);
        assert!(set.grants().iter().all(|grant| matches!(
            grant,
            AtomicGrant::Resource {
                resource_name: Some(_),
                ..
            }
        )));
    }

    #[test]
    fn expands_non_resource_urls() {
        let url_rule = PolicyRule {
            api_groups: None,
            resources: None,
            resource_names: None,
            non_resource_urls: Some(vec!["/healthz".to_string(), "/version".to_string()]),
            verbs: vec!["get".to_string()],
        };
        let set = GrantSet::from_rules(&[url_rule]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn merge_unions_verbs_on_matching_key() {
        let set = GrantSet::from_rules(&[
            rule(&[""], &["pods"], &["get"]),
            rule(&[""], &["pods"], &["list", "get"]),
        ]);
        assert_eq!(set.len(), 1);
        assert_eq!(
            set.grants()[0].verbs().as_slice(),
            ["get".to_string(), "list".to_string()]
        );
    }

    #[test]
    fn named_and_unnamed_grants_are_distinct_keys() {
        let mut named = rule(&[""], &["secrets"], &["get"]);
        named.resource_names = Some(vec!["registry".to_string()]);
        let set = GrantSet::from_rules(&[named, rule(&[""], &["secrets"], &["list"])]);
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn wildcard_collapses_verb_set() {
        let verbs = VerbSet::new(["get", "*", "list"]);
        assert!(verbs.is_wildcard());
        assert_eq!(verbs.as_slice(), [VERB_ALL.to_string()]);
    }

    #[test]
    fn wildcard_absorbs_on_merge() {
        let set = GrantSet::from_rules(&[
            rule(&[""], &["pods"], &["get", "list"]),
            rule(&[""], &["pods"], &["*"]),
        ]);
        assert_eq!(set.len(), 1);
        assert!(set.grants()[0].verbs().is_wildcard());
    }

    #[test]
    fn verb_sets_deduplicate() {
        let verbs = VerbSet::new(["get", "list", "get"]);
        assert_eq!(verbs.as_slice(), ["get".to_string(), "list".to_string()]);
    }

    #[test]
    fn normalization_is_a_fixed_point() {
        let mut named = rule(&["apps"], &["deployments"], &["update"]);
        named.resource_names = Some(vec!["api".to_string()]);
        let set = GrantSet::from_rules(&[
            rule(&["", "apps"], &["pods", "deployments"], &["get", "get"]),
            named,
            rule(&[""], &["pods"], &["*"]),
        ]);
        let renormalized = GrantSet::from_rules(&set.to_rules());
        assert_eq!(renormalized, set);
    }

    #[test]
    fn merging_a_set_with_itself_is_identity() {
        let mut set = GrantSet::from_rules(&[
            rule(&[""], &["pods"], &["get"]),
            rule(&["rbac.authorization.k8s.io"], &["roles"], &["bind"]),
        ]);
        let copy = set.clone();
        set.merge(copy);
        assert_eq!(
            set,
            GrantSet::from_rules(&[
                rule(&[""], &["pods"], &["get"]),
                rule(&["rbac.authorization.k8s.io"], &["roles"], &["bind"]),
            ])
        );
    }
}
