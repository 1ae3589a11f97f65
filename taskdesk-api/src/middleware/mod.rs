/// Middleware modules for the API server
///
/// Bearer authentication lives in `taskdesk_shared::auth::middleware` so the
/// principal type stays next to the policy that consumes it.

pub mod security;
