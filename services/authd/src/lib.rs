//! Tessera auth service library crate.
//!
//! # Purpose
//! Exposes credential issuance, domain-gated authorization, tenant domains,
//! and hierarchical groups for use by the binary and tests.
//!
//! # Notes
//! Policy evaluation lives in `tessera-authz`; this crate owns credentials,
//! records, and the business rules layered over policy checks.
pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod model;
pub mod observability;
pub mod service;
pub mod store;
