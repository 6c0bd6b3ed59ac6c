//! Roles and the access policy applied to every request

use serde::{Deserialize, Serialize};

/// Role carried in the bearer token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Controller,
    /// Warehouse operator: picks and ships, cannot edit the catalog
    Operador,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Controller => "controller",
            Role::Operador => "operador",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "admin" => Some(Role::Admin),
            "controller" => Some(Role::Controller),
            "operador" => Some(Role::Operador),
            _ => None,
        }
    }

    /// Access policy.
    ///
    /// Destructive deletes are reserved to `admin` across all resources.
    pub fn can(&self, resource: Resource, action: Action) -> bool {
        use Action::*;

        match (self, action) {
            (_, View) => true,
            (Role::Admin, _) => true,
            (_, Delete) => false,
            (Role::Controller, _) => true,
            (Role::Operador, Pick | Export) => resource == Resource::Requisition,
            (Role::Operador, _) => false,
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resources that can be accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resource {
    Requisition,
    Warehouse,
    Item,
}

impl Resource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Resource::Requisition => "requisition",
            Resource::Warehouse => "warehouse",
            Resource::Item => "item",
        }
    }
}

/// Actions that can be performed on resources
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    View,
    Create,
    Edit,
    Delete,
    Cancel,
    /// Per-line picking and the separation steps
    Pick,
    Export,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::View => "view",
            Action::Create => "create",
            Action::Edit => "edit",
            Action::Delete => "delete",
            Action::Cancel => "cancel",
            Action::Pick => "pick",
            Action::Export => "export",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESOURCES: [Resource; 3] = [Resource::Requisition, Resource::Warehouse, Resource::Item];

    #[test]
    fn test_everyone_can_view() {
        for role in [Role::Admin, Role::Controller, Role::Operador] {
            for resource in RESOURCES {
                assert!(role.can(resource, Action::View));
            }
        }
    }

    #[test]
    fn test_only_admin_deletes() {
        for resource in RESOURCES {
            assert!(Role::Admin.can(resource, Action::Delete));
            assert!(!Role::Controller.can(resource, Action::Delete));
            assert!(!Role::Operador.can(resource, Action::Delete));
        }
    }

    #[test]
    fn test_controller_creates_and_edits() {
        assert!(Role::Controller.can(Resource::Requisition, Action::Create));
        assert!(Role::Controller.can(Resource::Warehouse, Action::Edit));
        assert!(Role::Controller.can(Resource::Item, Action::Create));
        assert!(Role::Controller.can(Resource::Requisition, Action::Cancel));
    }

    #[test]
    fn test_operator_only_picks_and_exports_requisitions() {
        assert!(Role::Operador.can(Resource::Requisition, Action::Pick));
        assert!(Role::Operador.can(Resource::Requisition, Action::Export));
        assert!(!Role::Operador.can(Resource::Requisition, Action::Create));
        assert!(!Role::Operador.can(Resource::Requisition, Action::Cancel));
        assert!(!Role::Operador.can(Resource::Warehouse, Action::Create));
        assert!(!Role::Operador.can(Resource::Item, Action::Edit));
    }

    #[test]
    fn test_role_parse() {
        assert_eq!(Role::parse("controller"), Some(Role::Controller));
        assert_eq!(Role::parse("Admin"), None);
    }
}
