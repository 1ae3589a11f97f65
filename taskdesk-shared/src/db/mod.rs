/// Database layer for TaskDesk
///
/// # Modules
///
/// - `pool`: PostgreSQL connection pool with health checks
/// - `migrations`: Embedded migration runner
///
/// Queries live on the models and in `repository::postgres`.

pub mod migrations;
pub mod pool;
