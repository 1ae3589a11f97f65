/// Persistence ports
///
/// The API layer talks to storage only through the [`TaskRepository`] and
/// [`UserRepository`] traits. Two adapters implement both:
///
/// - [`postgres::PgRepository`]: sqlx/PostgreSQL, used in production
/// - [`memory::MemoryRepository`]: an in-process store used by tests and
///   `STORAGE_BACKEND=memory` runs
///
/// Both adapters enforce the same write-time rules: task payload
/// validation, owner existence, case-insensitive email uniqueness, and the
/// user deletion policy evaluated atomically with the delete itself.
///
/// # Example
///
/// ```
/// use taskdesk_shared::query::{ListingEntryPoint, PageRequest, Scope, TaskQuery};
/// use taskdesk_shared::repository::{memory::MemoryRepository, TaskRepository};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let repo = MemoryRepository::new();
/// let page = repo
///     .query_tasks(&TaskQuery::new(Scope::AllTasks), PageRequest::new(None, None, ListingEntryPoint::Api))
///     .await?;
/// assert_eq!(page.total, 0);
/// # Ok(())
/// # }
/// ```

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use futures::stream::BoxStream;
use uuid::Uuid;

use crate::auth::authorization::AuthzError;
use crate::auth::middleware::Principal;
use crate::models::task::{NewTask, Task, TaskChanges, TaskStats, TaskValidationError};
use crate::models::user::{CreateUser, UpdateUser, User, UserFilter, UserStats};
use crate::query::{Page, PageRequest, Scope, TaskQuery};

pub mod memory;
pub mod postgres;

/// Error type for repository operations
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The referenced task owner does not exist
    #[error("The selected user does not exist")]
    OwnerNotFound,

    #[error("Task validation failed")]
    Validation(Vec<TaskValidationError>),

    #[error("The email has already been taken")]
    DuplicateEmail,

    /// A user deletion was refused by the policy
    #[error(transparent)]
    Authorization(#[from] AuthzError),

    /// The user still owns tasks and cannot be deleted
    #[error("The user still owns tasks")]
    OwnerHasTasks,

    /// A serialization or deadlock failure persisted after a retry
    #[error("Concurrent modification conflict")]
    ConflictRace,
}

/// Date against which due dates are validated
pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

/// Task persistence port
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Checks the backing store is reachable
    async fn ping(&self) -> Result<(), RepositoryError>;

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, RepositoryError>;

    /// Validates and inserts a task
    ///
    /// Fails with `Validation` for a bad payload and `OwnerNotFound` if the
    /// owner does not exist.
    async fn insert_task(&self, task: NewTask) -> Result<Task, RepositoryError>;

    /// Validates and applies a partial update
    ///
    /// The mutations below only touch a task visible under `scope` at write
    /// time. None (or false) means no such task.
    async fn update_task(
        &self,
        id: Uuid,
        scope: Scope,
        changes: TaskChanges,
    ) -> Result<Option<Task>, RepositoryError>;

    /// Atomically flips `completed`
    async fn toggle_task(&self, id: Uuid, scope: Scope) -> Result<Option<Task>, RepositoryError>;

    /// Returns true if a task was deleted
    async fn delete_task(&self, id: Uuid, scope: Scope) -> Result<bool, RepositoryError>;

    async fn query_tasks(
        &self,
        query: &TaskQuery,
        page: PageRequest,
    ) -> Result<Page<Task>, RepositoryError>;

    /// Every task the query matches, in listing order, without pagination
    fn stream_tasks(&self, query: TaskQuery) -> BoxStream<'static, Result<Task, RepositoryError>>;

    async fn task_stats(&self, scope: Scope) -> Result<TaskStats, RepositoryError>;

    /// Most recently created tasks of one owner
    async fn recent_tasks(&self, owner: Uuid, limit: i64) -> Result<Vec<Task>, RepositoryError>;
}

/// User persistence port
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError>;

    /// Case-insensitive email lookup
    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError>;

    /// Fails with `DuplicateEmail` if the email is taken
    async fn create_user(&self, user: CreateUser) -> Result<User, RepositoryError>;

    /// Fails with `DuplicateEmail` if the new email is taken by someone else
    async fn update_user(&self, id: Uuid, changes: UpdateUser)
        -> Result<Option<User>, RepositoryError>;

    /// Users matching `filter`, newest first
    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, RepositoryError>;

    async fn user_stats(&self) -> Result<UserStats, RepositoryError>;

    /// Deletes a user on behalf of `principal`
    ///
    /// The deletion policy (admin only, no self deletion, never the last
    /// admin) and the owned-task check run atomically with the delete.
    /// Returns false if the user does not exist.
    async fn delete_user(&self, principal: &Principal, id: Uuid) -> Result<bool, RepositoryError>;
}
