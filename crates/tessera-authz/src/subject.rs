//! Subject reference parsing.
//!
//! # Purpose
//! A policy subject is either a plain principal identifier (`"alice"`) or a
//! subject-set reference (`"group:g1#member"`) meaning "everyone holding
//! `member` on `group:g1`".
//!
//! # Key invariants
//! - All three segments of a subject-set are non-empty and contain no `:`,
//!   `#`, or whitespace.
//! - Anything that does not match is a plain identifier. Parsing never fails.
//!
//! # Examples
//! ```rust
//! use tessera_authz::SubjectRef;
//!
//! let set = SubjectRef::parse("group:g1#member");
//! assert!(set.as_set().is_some());
//!
//! let plain = SubjectRef::parse("group:#member");
//! assert_eq!(plain.as_id(), Some("group:#member"));
//! ```
use crate::EntityType;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static SUBJECT_SET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([^:#\s]+):([^:#\s]+)#([^:#\s]+)$").expect("subject-set pattern compiles")
});

/// `namespace:object#relation` reference to a set of subjects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SubjectSet {
    pub namespace: String,
    pub object: String,
    pub relation: String,
}

impl SubjectSet {
    pub fn new(
        namespace: EntityType,
        object: impl Into<String>,
        relation: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.as_str().to_string(),
            object: object.into(),
            relation: relation.into(),
        }
    }
}

impl std::fmt::Display for SubjectSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}#{}", self.namespace, self.object, self.relation)
    }
}

/// Parsed form of a policy subject string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubjectRef {
    Id(String),
    Set(SubjectSet),
}

impl SubjectRef {
    /// Classify a subject string.
    ///
    /// Malformed set references (missing segments, wrong separators) fall back
    /// to [`SubjectRef::Id`] carrying the original string unchanged.
    pub fn parse(raw: &str) -> Self {
        match SUBJECT_SET.captures(raw) {
            Some(caps) => SubjectRef::Set(SubjectSet {
                namespace: caps[1].to_string(),
                object: caps[2].to_string(),
                relation: caps[3].to_string(),
            }),
            None => SubjectRef::Id(raw.to_string()),
        }
    }

    pub fn as_id(&self) -> Option<&str> {
        match self {
            SubjectRef::Id(id) => Some(id),
            SubjectRef::Set(_) => None,
        }
    }

    pub fn as_set(&self) -> Option<&SubjectSet> {
        match self {
            SubjectRef::Id(_) => None,
            SubjectRef::Set(set) => Some(set),
        }
    }
}
