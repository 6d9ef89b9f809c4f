//! Tessera relation-tuple authorization primitives.
//!
//! # Purpose
//! Models authorization questions as `(subject, relation/permission, object)`
//! tuples and owns the contract with the relation-tuple backend that answers
//! them.
//!
//! # How it fits
//! The auth service builds [`PolicyReq`] values and hands them to
//! [`PolicyAgent`]; the agent parses subjects, maps the typed vocabulary to
//! backend strings, and enforces fail-closed checks and all-or-nothing bulk
//! writes on top of any [`RelationTupleBackend`].
//!
//! # Key invariants
//! - Subjects are either plain principal IDs or `namespace:object#relation`
//!   subject-sets; anything malformed is a plain ID.
//! - Backend errors during a check are denials, never grants.
//! - A failed bulk mutation leaves no partial state behind.
//!
//! # Examples
//! ```rust
//! use std::sync::Arc;
//! use tessera_authz::{EntityType, InMemoryTupleStore, PolicyAgent, PolicyReq, Relation};
//!
//! let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
//! rt.block_on(async {
//!     let agent = PolicyAgent::new(Arc::new(InMemoryTupleStore::new()));
//!     let req = PolicyReq::user("alice", EntityType::Group, "g1").with_relation(Relation::Member);
//!     agent.add_policy(&req).await.unwrap();
//!     assert!(agent.check_policy(&req).await.is_ok());
//! });
//! ```
mod agent;
mod backend;
mod errors;
mod memory;
mod policy;
pub mod schema;
mod subject;
mod types;

pub use agent::{DEFAULT_LIST_ALL_LIMIT, DEFAULT_LIST_LIMIT, PolicyAgent};
pub use backend::{
    BackendError, BackendResult, CheckQuery, Page, RelationTuple, RelationTupleBackend,
    ResourceLookup, SubjectLookup, TupleDelta, TupleFilter, TupleSubject,
};
pub use errors::{PolicyError, PolicyResult};
pub use memory::InMemoryTupleStore;
pub use policy::{PolicyPage, PolicyReq, RelationQuery, RelationsPage};
pub use subject::{SubjectRef, SubjectSet};
pub use types::{EntityType, Permission, Relation, SubjectKind};
