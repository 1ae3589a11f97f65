/// PostgreSQL adapter for the repository ports
///
/// Single-statement operations delegate to the model methods. User deletion
/// runs in an explicit transaction that locks every admin row and the
/// target row before consulting the policy, so two concurrent deletions
/// cannot both observe more than one admin. Serialization and deadlock
/// failures are retried once.

use async_stream::stream;
use async_trait::async_trait;
use futures::stream::{BoxStream, StreamExt};
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::{debug, warn};
use uuid::Uuid;

use super::{today, RepositoryError, TaskRepository, UserRepository};
use crate::auth::authorization::{require, Operation, Target};
use crate::auth::middleware::Principal;
use crate::db::pool::health_check;
use crate::models::task::{
    NewTask, Task, TaskChanges, TaskRow, TaskStats, TASK_COLUMNS, TASK_OWNER_JOIN,
};
use crate::models::user::{CreateUser, UpdateUser, User, UserFilter, UserStats, USER_COLUMNS};
use crate::query::{Page, PageRequest, Scope, TaskQuery};

const EMAIL_UNIQUE_CONSTRAINT: &str = "users_email_key";
const TASK_OWNER_CONSTRAINT: &str = "tasks_user_id_fkey";

/// SQLSTATEs worth one retry: serialization_failure, deadlock_detected
const RETRYABLE_STATES: [&str; 2] = ["40001", "40P01"];

/// Repository backed by a PostgreSQL pool
#[derive(Debug, Clone)]
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn constraint_of(error: &sqlx::Error) -> Option<&str> {
    match error {
        sqlx::Error::Database(db) => db.constraint(),
        _ => None,
    }
}

/// Maps known constraint violations on writes to domain errors
fn map_write_error(error: sqlx::Error) -> RepositoryError {
    match constraint_of(&error) {
        Some(EMAIL_UNIQUE_CONSTRAINT) => RepositoryError::DuplicateEmail,
        Some(TASK_OWNER_CONSTRAINT) => RepositoryError::OwnerNotFound,
        _ => RepositoryError::Database(error),
    }
}

fn is_retryable(error: &RepositoryError) -> bool {
    match error {
        RepositoryError::Database(sqlx::Error::Database(db)) => db
            .code()
            .is_some_and(|code| RETRYABLE_STATES.contains(&&*code)),
        _ => false,
    }
}

impl PgRepository {
    async fn try_delete_user(
        &self,
        principal: &Principal,
        id: Uuid,
    ) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        // Admin rows first, in id order, then the target
        let admin_ids: Vec<Uuid> =
            sqlx::query_scalar("SELECT id FROM users WHERE role = 'admin' ORDER BY id FOR UPDATE")
                .fetch_all(&mut *tx)
                .await?;

        let target_query = format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1 FOR UPDATE");
        let Some(target) = sqlx::query_as::<_, User>(&target_query)
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
        else {
            return Ok(false);
        };

        require(
            principal,
            Operation::DeleteUser,
            Target::user(&target, admin_ids.len() as i64),
        )?;

        let owned: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE user_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        if owned > 0 {
            return Err(RepositoryError::OwnerHasTasks);
        }

        let deleted = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(|e| match constraint_of(&e) {
                Some(TASK_OWNER_CONSTRAINT) => RepositoryError::OwnerHasTasks,
                _ => RepositoryError::Database(e),
            })?
            .rows_affected()
            > 0;

        tx.commit().await?;
        Ok(deleted)
    }
}

#[async_trait]
impl TaskRepository for PgRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        health_check(&self.pool).await.map_err(RepositoryError::from)
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        Ok(Task::find_by_id(&self.pool, id).await?)
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, RepositoryError> {
        task.validate(today()).map_err(RepositoryError::Validation)?;

        let created = Task::create(&self.pool, task).await.map_err(map_write_error)?;
        debug!(task_id = %created.id, owner = %created.owner_user_id, "Task inserted");
        Ok(created)
    }

    async fn update_task(
        &self,
        id: Uuid,
        scope: Scope,
        changes: TaskChanges,
    ) -> Result<Option<Task>, RepositoryError> {
        changes.validate(today()).map_err(RepositoryError::Validation)?;

        Task::update(&self.pool, id, scope, changes)
            .await
            .map_err(map_write_error)
    }

    async fn toggle_task(&self, id: Uuid, scope: Scope) -> Result<Option<Task>, RepositoryError> {
        Ok(Task::toggle(&self.pool, id, scope).await?)
    }

    async fn delete_task(&self, id: Uuid, scope: Scope) -> Result<bool, RepositoryError> {
        Ok(Task::delete(&self.pool, id, scope).await?)
    }

    async fn query_tasks(
        &self,
        query: &TaskQuery,
        page: PageRequest,
    ) -> Result<Page<Task>, RepositoryError> {
        let total = Task::count(&self.pool, query).await?;
        let data = Task::list(&self.pool, query, page).await?;

        debug!(total, page = page.page, per_page = page.per_page, "Task query executed");
        Ok(Page::new(data, total, page))
    }

    fn stream_tasks(&self, query: TaskQuery) -> BoxStream<'static, Result<Task, RepositoryError>> {
        let pool = self.pool.clone();

        let tasks = stream! {
            let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
            builder.push(TASK_COLUMNS).push(" FROM tasks t").push(TASK_OWNER_JOIN);
            query.push_filters(&mut builder);
            query.push_order(&mut builder);

            let mut rows = builder.build_query_as::<TaskRow>().fetch(&pool);
            while let Some(row) = rows.next().await {
                let item: Result<Task, RepositoryError> =
                    row.map(Task::from).map_err(RepositoryError::from);
                let failed = item.is_err();
                yield item;
                if failed {
                    break;
                }
            }
        };

        tasks.boxed()
    }

    async fn task_stats(&self, scope: Scope) -> Result<TaskStats, RepositoryError> {
        Ok(Task::stats(&self.pool, scope).await?)
    }

    async fn recent_tasks(&self, owner: Uuid, limit: i64) -> Result<Vec<Task>, RepositoryError> {
        Ok(Task::recent_for_owner(&self.pool, owner, limit).await?)
    }
}

#[async_trait]
impl UserRepository for PgRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(User::find_by_id(&self.pool, id).await?)
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(User::find_by_email(&self.pool, email).await?)
    }

    async fn create_user(&self, user: CreateUser) -> Result<User, RepositoryError> {
        let created = User::create(&self.pool, user).await.map_err(map_write_error)?;
        debug!(user_id = %created.id, role = %created.role, "User inserted");
        Ok(created)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UpdateUser,
    ) -> Result<Option<User>, RepositoryError> {
        User::update(&self.pool, id, changes)
            .await
            .map_err(map_write_error)
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, RepositoryError> {
        let total = User::count(&self.pool, filter).await?;
        let data = User::list(&self.pool, filter, page.limit(), page.offset()).await?;
        Ok(Page::new(data, total, page))
    }

    async fn user_stats(&self) -> Result<UserStats, RepositoryError> {
        Ok(User::stats(&self.pool).await?)
    }

    async fn delete_user(&self, principal: &Principal, id: Uuid) -> Result<bool, RepositoryError> {
        let result = match self.try_delete_user(principal, id).await {
            Err(e) if is_retryable(&e) => {
                warn!(user_id = %id, error = %e, "User deletion conflicted, retrying once");
                match self.try_delete_user(principal, id).await {
                    Err(e) if is_retryable(&e) => Err(RepositoryError::ConflictRace),
                    other => other,
                }
            }
            other => other,
        };

        if let Err(ref e) = result {
            debug!(user_id = %id, error = %e, "User deletion refused");
        }
        result
    }
}
