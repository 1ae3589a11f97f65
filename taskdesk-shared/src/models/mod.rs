/// Domain models for TaskDesk
///
/// This module contains the persisted entities and their PostgreSQL
/// operations.
///
/// # Models
///
/// - `user`: User accounts, roles and the owner summary embedded in tasks
/// - `task`: Tasks owned by users, plus creation/update payloads and their
///   validation rules
///
/// # Example
///
/// ```no_run
/// use taskdesk_shared::models::user::{CreateUser, Role, User};
/// use taskdesk_shared::db::pool::{create_pool, DatabaseConfig};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let admin = User::create(&pool, CreateUser {
///     name: "Ada".to_string(),
///     email: "ada@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     role: Role::Admin,
///     email_verified_at: None,
/// }).await?;
/// # Ok(())
/// # }
/// ```

pub mod task;
pub mod user;
