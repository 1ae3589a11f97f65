/// Authentication and authorization
///
/// # Modules
///
/// - [`password`]: Argon2id password hashing and the minimum length rule
/// - [`jwt`]: HS256 access/refresh tokens
/// - [`middleware`]: Principal resolution for Axum routers
/// - [`authorization`]: The role/ownership policy for task and user operations
///
/// # Example
///
/// ```no_run
/// use taskdesk_shared::auth::password::{hash_password, verify_password};
/// use taskdesk_shared::auth::jwt::issue_token_pair;
/// use uuid::Uuid;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let hash = hash_password("user_password")?;
/// assert!(verify_password("user_password", &hash)?);
///
/// let tokens = issue_token_pair(Uuid::new_v4(), "a-secret-of-at-least-thirty-two-bytes!!")?;
/// # Ok(())
/// # }
/// ```

pub mod authorization;
pub mod jwt;
pub mod middleware;
pub mod password;
