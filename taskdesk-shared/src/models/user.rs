/// User model and database operations
///
/// This module provides the User model, the closed `Role` enum consumed by
/// the authorization policy, and CRUD operations for the user roster.
///
/// # Schema
///
/// ```sql
/// CREATE TYPE user_role AS ENUM ('admin', 'user');
///
/// CREATE TABLE users (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     name VARCHAR(255) NOT NULL,
///     email CITEXT NOT NULL UNIQUE,
///     password_hash VARCHAR(255) NOT NULL,
///     role user_role NOT NULL DEFAULT 'user',
///     email_verified_at TIMESTAMPTZ,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT NOW(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
/// );
/// ```
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
/// let user = User::create(&pool, CreateUser {
///     name: "Grace".to_string(),
///     email: "grace@example.com".to_string(),
///     password_hash: "$argon2id$...".to_string(),
///     role: Role::User,
///     email_verified_at: None,
/// }).await?;
///
/// // Email lookup is case-insensitive
/// let found = User::find_by_email(&pool, "GRACE@example.com").await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use uuid::Uuid;

use crate::query::escape_like;

/// Columns selected for every user query.
///
/// `email` is a CITEXT column and is cast back to TEXT for decoding.
pub(crate) const USER_COLUMNS: &str =
    "id, name, email::text AS email, password_hash, role, email_verified_at, created_at, updated_at";

/// Role of a user account
///
/// The role split is flat: there is no hierarchy beyond admin/user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Manages the roster, sees and assigns every task
    Admin,

    /// Sees and manages only the tasks they own
    User,
}

impl Role {
    /// Converts role to string for display
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::User => "user",
        }
    }

    /// Parses a role name, case-insensitively
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "admin" => Some(Role::Admin),
            "user" => Some(Role::User),
            _ => None,
        }
    }

    /// Whether this role sees every task and may manage users
    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User model representing an account
///
/// Passwords are stored as Argon2id hashes and are never serialized.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct User {
    /// Unique user ID (UUID v4)
    pub id: Uuid,

    /// Display name
    pub name: String,

    /// Email address, unique across users (case-insensitive)
    pub email: String,

    /// Argon2id password hash
    #[serde(skip_serializing, default)]
    pub password_hash: String,

    /// Admin or regular user
    pub role: Role,

    /// When the email address was verified (None if never)
    pub email_verified_at: Option<DateTime<Utc>>,

    /// When the account was created
    pub created_at: DateTime<Utc>,

    /// When the account was last updated
    pub updated_at: DateTime<Utc>,
}

impl User {
    /// Owner summary embedded in task responses
    pub fn summary(&self) -> UserSummary {
        UserSummary {
            id: self.id,
            name: self.name.clone(),
            email: self.email.clone(),
        }
    }

    /// Whether this account holds the admin role
    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}

/// Public subset of a user embedded in task payloads
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: Uuid,
    pub name: String,
    pub email: String,
}

/// Input for creating a new user
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUser {
    /// Display name
    pub name: String,

    /// Email address (stored case-insensitively via CITEXT)
    pub email: String,

    /// Argon2id password hash (NOT plaintext password!)
    pub password_hash: String,

    /// Role to assign
    pub role: Role,

    /// Pre-verified accounts (e.g. admins created from the CLI)
    pub email_verified_at: Option<DateTime<Utc>>,
}

/// Input for updating an existing user
///
/// All fields are optional. Only non-None fields will be updated.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UpdateUser {
    /// New display name
    pub name: Option<String>,

    /// New email address
    pub email: Option<String>,

    /// New role
    pub role: Option<Role>,

    /// New password hash
    pub password_hash: Option<String>,
}

impl UpdateUser {
    /// Whether no field would change
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.email.is_none()
            && self.role.is_none()
            && self.password_hash.is_none()
    }
}

/// Roster filters used by the admin user listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserFilter {
    /// Case-insensitive substring of name or email
    pub search: Option<String>,

    /// Restrict to one role
    pub role: Option<Role>,
}

impl UserFilter {
    /// Returns true if the user passes every filter
    pub fn matches(&self, user: &User) -> bool {
        if let Some(role) = self.role {
            if user.role != role {
                return false;
            }
        }

        match self.search.as_deref() {
            Some(needle) => {
                let needle = needle.to_lowercase();
                user.name.to_lowercase().contains(&needle)
                    || user.email.to_lowercase().contains(&needle)
            }
            None => true,
        }
    }

    fn push_where(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE TRUE");

        if let Some(role) = self.role {
            builder.push(" AND role = ").push_bind(role);
        }

        if let Some(search) = self.search.as_deref() {
            let pattern = format!("%{}%", escape_like(search));
            builder
                .push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR email::text ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }
}

/// Roster counters shown on the admin user listing
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserStats {
    pub total: i64,
    pub admins: i64,
    pub users: i64,
}

impl User {
    /// Creates a new user in the database
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Email already exists (unique constraint `users_email_key`)
    /// - Database connection fails
    pub async fn create(pool: &PgPool, data: CreateUser) -> Result<Self, sqlx::Error> {
        let query = format!(
            "INSERT INTO users (name, email, password_hash, role, email_verified_at)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {USER_COLUMNS}"
        );

        sqlx::query_as::<_, User>(&query)
            .bind(data.name)
            .bind(data.email)
            .bind(data.password_hash)
            .bind(data.role)
            .bind(data.email_verified_at)
            .fetch_one(pool)
            .await
    }

    /// Finds a user by ID
    ///
    /// # Returns
    ///
    /// The user if found, None otherwise
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1");

        sqlx::query_as::<_, User>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Finds a user by email address
    ///
    /// Email lookup is case-insensitive (via CITEXT column type).
    pub async fn find_by_email(pool: &PgPool, email: &str) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1::citext");

        sqlx::query_as::<_, User>(&query)
            .bind(email)
            .fetch_optional(pool)
            .await
    }

    /// Updates an existing user
    ///
    /// Only non-None fields in `data` will be updated. The `updated_at`
    /// timestamp is always refreshed.
    ///
    /// # Returns
    ///
    /// The updated user if found, None if the user doesn't exist
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        data: UpdateUser,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("UPDATE users SET updated_at = NOW()");

        if let Some(name) = data.name {
            builder.push(", name = ").push_bind(name);
        }
        if let Some(email) = data.email {
            builder.push(", email = ").push_bind(email);
        }
        if let Some(role) = data.role {
            builder.push(", role = ").push_bind(role);
        }
        if let Some(password_hash) = data.password_hash {
            builder.push(", password_hash = ").push_bind(password_hash);
        }

        builder
            .push(" WHERE id = ")
            .push_bind(id)
            .push(" RETURNING ")
            .push(USER_COLUMNS);

        builder
            .build_query_as::<User>()
            .fetch_optional(pool)
            .await
    }

    /// Lists users matching `filter`, newest first
    pub async fn list(
        pool: &PgPool,
        filter: &UserFilter,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder.push(USER_COLUMNS).push(" FROM users");
        filter.push_where(&mut builder);
        builder
            .push(" ORDER BY created_at DESC, id ASC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);

        builder.build_query_as::<User>().fetch_all(pool).await
    }

    /// Counts users matching `filter`
    pub async fn count(pool: &PgPool, filter: &UserFilter) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM users");
        filter.push_where(&mut builder);

        builder.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Counts the roster by role
    pub async fn stats(pool: &PgPool) -> Result<UserStats, sqlx::Error> {
        let (total, admins, users): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE role = 'admin'),
                   COUNT(*) FILTER (WHERE role = 'user')
            FROM users
            "#,
        )
        .fetch_one(pool)
        .await?;

        Ok(UserStats {
            total,
            admins,
            users,
        })
    }
}
