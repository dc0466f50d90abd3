/*!
 * # Role-Based Access Control (RBAC) Module
 *
 * Maps the four account roles onto resource permissions. Permissions are
 * `resource:action` strings; `resource:*` and `*` act as wildcards.
 */

use lazy_static::lazy_static;
use std::collections::{HashMap, HashSet};
use tracing::warn;

/// Role definition with associated permissions
#[derive(Debug, Clone)]
pub struct Role {
    pub name: &'static str,
    pub description: &'static str,
    pub permissions: Vec<&'static str>,
}

/// Roles that skip permission checks entirely
pub const PRIVILEGED_ROLES: [&str; 2] = ["superadmin", "admin"];

lazy_static! {
    pub static ref ROLES: HashMap<&'static str, Role> = {
        let mut roles = HashMap::new();

        roles.insert(
            "superadmin",
            Role {
                name: "superadmin",
                description: "Platform operator; manages tenants and the global catalog",
                permissions: vec!["*"],
            },
        );

        roles.insert(
            "admin",
            Role {
                name: "admin",
                description: "Store owner with full access to one store",
                permissions: vec!["*"],
            },
        );

        // Day-to-day store operations
        roles.insert(
            "staff",
            Role {
                name: "staff",
                description: "Store employee",
                permissions: vec![
                    "products:*",
                    "inventory:*",
                    "sales:*",
                    "customers:*",
                    "orders:*",
                    "invoices:*",
                    "pos:*",
                    "ai:*",
                    "audits:*",
                    "vendors:read",
                    "campaigns:read",
                    "expenses:read",
                    "settings:read",
                    "catalog:read",
                    "supplier:read",
                    "reports:read",
                    "shop:read",
                ],
            },
        );

        roles.insert(
            "customer",
            Role {
                name: "customer",
                description: "Storefront shopper",
                permissions: vec![
                    "products:read",
                    "campaigns:read",
                    "catalog:read",
                    "shop:*",
                ],
            },
        );

        roles
    };
}

/// All permissions granted by `role`
pub fn permissions_for_role(role: &str) -> Vec<String> {
    match ROLES.get(role) {
        Some(role) => role.permissions.iter().map(|p| p.to_string()).collect(),
        None => {
            warn!("Role not found: {}", role);
            vec![]
        }
    }
}

/// Union of permissions across roles
pub fn permissions_for_roles(roles: &[String]) -> HashSet<String> {
    roles
        .iter()
        .flat_map(|role| permissions_for_role(role))
        .collect()
}

pub fn is_privileged(roles: &[String]) -> bool {
    roles
        .iter()
        .any(|r| PRIVILEGED_ROLES.contains(&r.as_str()))
}

/// Check if a granted permission covers a required permission
pub fn permission_matches(granted: &str, required: &str) -> bool {
    if granted == "*" || granted == required {
        return true;
    }

    if let Some(prefix) = granted.strip_suffix(":*") {
        return required
            .split_once(':')
            .map_or(false, |(resource, _)| resource == prefix);
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("products:*", "products:read", true)]
    #[case("products:*", "productsx:read", false)]
    #[case("products:read", "products:write", false)]
    #[case("*", "tenants:write", true)]
    #[case("vendors:read", "vendors:read", true)]
    fn wildcard_matching(#[case] granted: &str, #[case] required: &str, #[case] expected: bool) {
        assert_eq!(permission_matches(granted, required), expected);
    }

    #[test]
    fn staff_cannot_write_settings() {
        let perms = permissions_for_role("staff");
        assert!(perms.iter().any(|p| permission_matches(p, "settings:read")));
        assert!(!perms.iter().any(|p| permission_matches(p, "settings:write")));
        assert!(perms.iter().any(|p| permission_matches(p, "sales:write")));
    }

    #[test]
    fn customers_can_shop_but_not_count_shelves() {
        let perms = permissions_for_role("customer");
        assert!(perms.iter().any(|p| permission_matches(p, "shop:write")));
        assert!(!perms.iter().any(|p| permission_matches(p, "audits:read")));
        assert!(!perms.iter().any(|p| permission_matches(p, "orders:read")));

        let staff = permissions_for_role("staff");
        assert!(staff.iter().any(|p| permission_matches(p, "audits:write")));
        assert!(!staff.iter().any(|p| permission_matches(p, "shop:write")));
    }

    #[test]
    fn unknown_role_has_no_permissions() {
        assert!(permissions_for_role("ghost").is_empty());
    }

    #[test]
    fn admin_and_superadmin_are_privileged() {
        assert!(is_privileged(&["admin".to_string()]));
        assert!(is_privileged(&["superadmin".to_string()]));
        assert!(!is_privileged(&["staff".to_string()]));
    }
}
