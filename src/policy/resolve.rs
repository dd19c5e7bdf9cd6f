//! Permission resolution
//!
//! Pure function of `(attributes, config snapshot)`. Merge order is domain
//! defaults, then role grants in role iteration order, then global grants;
//! ordering is stable for deterministic assertions.

use std::collections::{BTreeSet, HashSet};

use crate::domain::{AccessControlConfig, Permission, UserAttributes};

/// Compute the full permission set for a user's attributes.
///
/// A domain with no mapping gets only the global permissions. Duplicates are
/// keyed on `(resource, actions-set)`; conditions are not part of the key, so
/// a later variant that differs only in conditions is discarded (first wins).
pub fn resolve(attributes: &UserAttributes, config: &AccessControlConfig) -> Vec<Permission> {
    let mut out: Vec<Permission> = Vec::new();
    let mut seen: HashSet<(String, BTreeSet<String>)> = HashSet::new();

    if let Some(mapping) = config
        .domain_mappings
        .iter()
        .find(|m| m.domain == attributes.domain)
    {
        for perm in &mapping.default_permissions {
            push_unique(&mut out, &mut seen, perm);
        }
        if let Some(role_grants) = &mapping.role_based_permissions {
            for role in &attributes.roles {
                if let Some(perms) = role_grants.get(role) {
                    for perm in perms {
                        push_unique(&mut out, &mut seen, perm);
                    }
                }
            }
        }
    }

    for perm in &config.global_permissions {
        push_unique(&mut out, &mut seen, perm);
    }

    out
}

fn push_unique(
    out: &mut Vec<Permission>,
    seen: &mut HashSet<(String, BTreeSet<String>)>,
    perm: &Permission,
) {
    if seen.insert(perm.dedup_key()) {
        out.push(perm.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{AccessCondition, ConditionOperator, DomainServiceMapping};
    use pretty_assertions::assert_eq;
    use std::collections::HashMap;

    fn attrs(domain: &str, roles: &[&str]) -> UserAttributes {
        UserAttributes {
            domain: domain.to_string(),
            roles: roles.iter().map(|r| r.to_string()).collect(),
            department: None,
            organization: None,
        }
    }

    fn config_with_mapping() -> AccessControlConfig {
        let mut role_grants = HashMap::new();
        role_grants.insert(
            "admin".to_string(),
            vec![
                Permission::new("admin", &["access"]),
                Permission::new("workflow", &["read"]),
            ],
        );
        AccessControlConfig {
            domain_mappings: vec![DomainServiceMapping {
                domain: "acme.com".to_string(),
                allowed_services: vec!["workflow".to_string()],
                default_permissions: vec![Permission::new("workflow", &["read"])],
                role_based_permissions: Some(role_grants),
            }],
            global_permissions: vec![Permission::new("profile", &["read"])],
            workflows: vec![],
        }
    }

    #[test]
    fn test_unmapped_domain_gets_only_global_permissions() {
        let config = config_with_mapping();
        let perms = resolve(&attrs("unmapped.example", &[]), &config);
        assert_eq!(perms, vec![Permission::new("profile", &["read"])]);
    }

    #[test]
    fn test_merge_order_is_defaults_roles_global() {
        let config = config_with_mapping();
        let perms = resolve(&attrs("acme.com", &["admin"]), &config);
        assert_eq!(
            perms,
            vec![
                Permission::new("workflow", &["read"]),
                Permission::new("admin", &["access"]),
                Permission::new("profile", &["read"]),
            ]
        );
    }

    #[test]
    fn test_duplicate_role_grant_is_dropped() {
        // "workflow"/["read"] is granted both as a default and via the admin
        // role; only one survives.
        let config = config_with_mapping();
        let perms = resolve(&attrs("acme.com", &["admin"]), &config);
        let count = perms.iter().filter(|p| p.resource == "workflow").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_determinism() {
        let config = config_with_mapping();
        let a = resolve(&attrs("acme.com", &["admin"]), &config);
        let b = resolve(&attrs("acme.com", &["admin"]), &config);
        assert_eq!(a, b);
    }

    #[test]
    fn test_first_wins_over_conditional_variant() {
        let conditional = Permission::new("report", &["read"]).with_conditions(vec![
            AccessCondition {
                attribute: "attributes.department".to_string(),
                operator: ConditionOperator::Equals,
                value: "Finance".into(),
            },
        ]);
        let config = AccessControlConfig {
            domain_mappings: vec![DomainServiceMapping {
                domain: "acme.com".to_string(),
                allowed_services: vec![],
                default_permissions: vec![Permission::new("report", &["read"]), conditional],
                role_based_permissions: None,
            }],
            ..Default::default()
        };

        let perms = resolve(&attrs("acme.com", &[]), &config);
        assert_eq!(perms.len(), 1);
        assert!(perms[0].conditions.is_none());
    }

    #[test]
    fn test_unknown_roles_are_ignored() {
        let config = config_with_mapping();
        let perms = resolve(&attrs("acme.com", &["ghost"]), &config);
        assert_eq!(
            perms,
            vec![
                Permission::new("workflow", &["read"]),
                Permission::new("profile", &["read"]),
            ]
        );
    }

    #[test]
    fn test_action_order_insensitive_dedup() {
        let config = AccessControlConfig {
            global_permissions: vec![
                Permission::new("workflow", &["read", "execute"]),
                Permission::new("workflow", &["execute", "read"]),
            ],
            ..Default::default()
        };
        let perms = resolve(&attrs("any.example", &[]), &config);
        assert_eq!(perms.len(), 1);
        // first-seen ordering is preserved
        assert_eq!(perms[0].actions, vec!["read", "execute"]);
    }
}
