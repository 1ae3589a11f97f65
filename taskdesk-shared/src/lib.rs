//! # TaskDesk Shared Library
//!
//! This crate contains the domain types and business rules used by the
//! TaskDesk API server and its admin tooling.
//!
//! ## Module Organization
//!
//! - `models`: Users, tasks and their validation rules
//! - `auth`: Password hashing, JWT tokens, principal resolution and the
//!   authorization policy
//! - `query`: The ordered task query pipeline (scope, status, search, sort, page)
//! - `export`: CSV encoding of task collections
//! - `repository`: Persistence ports with PostgreSQL and in-memory adapters
//! - `db`: Connection pooling and migrations

pub mod auth;
pub mod db;
pub mod export;
pub mod models;
pub mod query;
pub mod repository;

/// Current version of the TaskDesk shared library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
