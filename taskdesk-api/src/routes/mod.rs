/// API route handlers
///
/// This module contains all route handlers organized by resource:
///
/// - `health`: Health check endpoint
/// - `auth`: Registration, login, token refresh and the current profile
/// - `dashboard`: Scoped task and roster counters
/// - `tasks`: Task CRUD, toggle, listings and CSV export
/// - `users`: Admin user roster

pub mod auth;
pub mod dashboard;
pub mod health;
pub mod tasks;
pub mod users;

use serde::{Deserialize, Deserializer};

/// Distinguishes an explicit `null` from an absent field
///
/// Used with `#[serde(default, deserialize_with = "deserialize_some")]` on
/// `Option<Option<T>>` fields: absent gives `None`, `null` gives
/// `Some(None)`.
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}

/// Treats blank strings as absent
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
