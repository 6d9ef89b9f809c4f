//! Permission schema evaluated by the in-memory backend.
//!
//! Each `(namespace, permission)` pair expands into a union of rules:
//! - `This(relation)`: subjects stored directly under `relation`, including
//!   members of any subject-set stored there.
//! - `Computed(permission)`: another permission on the same object.
//! - `Arrow { tupleset, permission }`: follow the object's `tupleset` tuples to
//!   related objects and evaluate `permission` there (inheritance from a parent
//!   group or an owning domain).
//!
//! Names with no rules are treated as plain relations.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    This(&'static str),
    Computed(&'static str),
    Arrow {
        tupleset: &'static str,
        permission: &'static str,
    },
}

type PermissionTable = &'static [(&'static str, &'static str, &'static [Rule])];

#[derive(Debug, Clone, Copy)]
pub struct Schema {
    permissions: PermissionTable,
}

const PLATFORM_DOMAIN_GROUP: PermissionTable = &[
    ("platform", "admin", &[Rule::This("administrator")]),
    (
        "platform",
        "membership",
        &[Rule::This("administrator"), Rule::This("member")],
    ),
    (
        "domain",
        "admin",
        &[
            Rule::This("administrator"),
            Rule::Arrow {
                tupleset: "platform",
                permission: "admin",
            },
        ],
    ),
    ("domain", "delete", &[Rule::Computed("admin")]),
    ("domain", "share", &[Rule::Computed("admin")]),
    (
        "domain",
        "edit",
        &[Rule::Computed("admin"), Rule::This("editor")],
    ),
    (
        "domain",
        "view",
        &[Rule::Computed("edit"), Rule::This("viewer")],
    ),
    (
        "domain",
        "membership",
        &[Rule::Computed("view"), Rule::This("member")],
    ),
    (
        "group",
        "admin",
        &[
            Rule::This("administrator"),
            Rule::Arrow {
                tupleset: "parent_group",
                permission: "admin",
            },
            Rule::Arrow {
                tupleset: "domain",
                permission: "admin",
            },
        ],
    ),
    ("group", "delete", &[Rule::Computed("admin")]),
    ("group", "share", &[Rule::Computed("admin")]),
    (
        "group",
        "edit",
        &[
            Rule::Computed("admin"),
            Rule::This("editor"),
            Rule::Arrow {
                tupleset: "parent_group",
                permission: "edit",
            },
            Rule::Arrow {
                tupleset: "domain",
                permission: "edit",
            },
        ],
    ),
    (
        "group",
        "view",
        &[
            Rule::Computed("edit"),
            Rule::This("viewer"),
            Rule::Arrow {
                tupleset: "parent_group",
                permission: "view",
            },
            Rule::Arrow {
                tupleset: "domain",
                permission: "view",
            },
        ],
    ),
    (
        "group",
        "membership",
        &[
            Rule::Computed("view"),
            Rule::This("member"),
            Rule::Arrow {
                tupleset: "parent_group",
                permission: "membership",
            },
        ],
    ),
];

impl Schema {
    pub const fn new(permissions: PermissionTable) -> Self {
        Self { permissions }
    }

    /// Rules for a computed permission, `None` when `name` is a relation.
    pub fn rules(&self, namespace: &str, name: &str) -> Option<&'static [Rule]> {
        self.permissions
            .iter()
            .find(|(ns, perm, _)| *ns == namespace && *perm == name)
            .map(|(_, _, rules)| *rules)
    }
}

impl Default for Schema {
    fn default() -> Self {
        Self::new(PLATFORM_DOMAIN_GROUP)
    }
}
