//! CK-008: Resource kind catalogue.
//!
//! The resource implementations live outside this crate. What the evaluator
//! needs from each kind is how it is named, which attribute its identifier
//! fills, which actions it accepts, and which it runs by default.

use crate::core::types::ResourceType;

/// Static description of one resource kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KindSpec {
    /// Attribute the primary identifier is stored under.
    pub identity: &'static str,
    /// Action used when the block does not set one.
    pub default_action: &'static str,
    /// Every action the kind accepts.
    pub actions: &'static [&'static str],
}

const FILE_ACTIONS: &[&str] = &["create", "delete", "edit", "nothing"];

/// Catalogue entry for a kind.
pub fn spec(kind: ResourceType) -> KindSpec {
    match kind {
        ResourceType::Directory => KindSpec {
            identity: "path",
            default_action: "create",
            actions: &["create", "delete", "nothing"],
        },
        ResourceType::Execute => KindSpec {
            identity: "command",
            default_action: "run",
            actions: &["run", "nothing"],
        },
        ResourceType::File | ResourceType::RemoteFile | ResourceType::Template => KindSpec {
            identity: "path",
            default_action: "create",
            actions: FILE_ACTIONS,
        },
        ResourceType::GemPackage => KindSpec {
            identity: "package_name",
            default_action: "install",
            actions: &["install", "uninstall", "upgrade", "nothing"],
        },
        ResourceType::Git => KindSpec {
            identity: "destination",
            default_action: "sync",
            actions: &["sync", "nothing"],
        },
        ResourceType::Link => KindSpec {
            identity: "link",
            default_action: "create",
            actions: &["create", "nothing"],
        },
        ResourceType::Package => KindSpec {
            identity: "name",
            default_action: "install",
            actions: &["install", "remove", "nothing"],
        },
        ResourceType::Service => KindSpec {
            identity: "name",
            default_action: "nothing",
            actions: &[
                "start", "stop", "restart", "reload", "enable", "disable", "nothing",
            ],
        },
    }
}

/// Whether `kind` receives the recipe directory after construction.
pub fn wants_recipe_dir(kind: ResourceType) -> bool {
    matches!(kind, ResourceType::RemoteFile | ResourceType::Template)
}

/// Whether `kind` receives the `node` binding after construction.
pub fn wants_node(kind: ResourceType) -> bool {
    kind == ResourceType::Template
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ck008_default_action_is_accepted() {
        for kind in ResourceType::ALL {
            let s = spec(kind);
            assert!(
                s.actions.contains(&s.default_action),
                "{} default '{}' not in its action list",
                kind,
                s.default_action
            );
        }
    }

    #[test]
    fn test_ck008_identity_attributes() {
        assert_eq!(spec(ResourceType::Execute).identity, "command");
        assert_eq!(spec(ResourceType::Git).identity, "destination");
        assert_eq!(spec(ResourceType::Template).identity, "path");
    }

    #[test]
    fn test_ck008_side_channels() {
        assert!(wants_recipe_dir(ResourceType::RemoteFile));
        assert!(wants_recipe_dir(ResourceType::Template));
        assert!(!wants_recipe_dir(ResourceType::File));
        assert!(wants_node(ResourceType::Template));
        assert!(!wants_node(ResourceType::RemoteFile));
    }

    #[test]
    fn test_ck008_service_defaults_to_nothing() {
        assert_eq!(spec(ResourceType::Service).default_action, "nothing");
        assert!(spec(ResourceType::Service).actions.contains(&"restart"));
    }
}
