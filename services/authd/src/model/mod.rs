//! Service data model.
//!
//! # Purpose
//! Credential descriptors, tenant domains, and groups shared by the service
//! layer and the storage collaborators.
mod domain;
mod group;
mod key;

pub use domain::{Domain, DomainPage, DomainReq, DomainStatus, DomainsPage};
pub use group::{Group, GroupPage, GroupReq, GroupsPage, MemberKind, Metadata};
pub use key::{IssuedToken, Key, KeyRequest, KeyType};
