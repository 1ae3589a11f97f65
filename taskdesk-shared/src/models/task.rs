/// Task model and database operations
///
/// A task belongs to exactly one owner. Every task returned from the store
/// carries a summary of its owner so callers never need a second lookup.
///
/// # Schema
///
/// ```sql
/// CREATE TABLE tasks (
///     id UUID PRIMARY KEY DEFAULT gen_random_uuid(),
///     user_id UUID NOT NULL REFERENCES users(id) ON DELETE RESTRICT,
///     title VARCHAR(255) NOT NULL,
///     description TEXT,
///     due_date DATE,
///     completed BOOLEAN NOT NULL DEFAULT FALSE,
///     created_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp(),
///     updated_at TIMESTAMPTZ NOT NULL DEFAULT clock_timestamp()
/// );
/// ```
///
/// # Example
///
/// ```no_run
/// use chrono::Utc;
/// use taskdesk_shared::models::task::{NewTask, Task};
/// use taskdesk_shared::db::pool::{create_pool, DatabaseConfig};
/// use uuid::Uuid;
///
/// # async fn example(owner: Uuid) -> Result<(), Box<dyn std::error::Error>> {
/// let pool = create_pool(DatabaseConfig::default()).await?;
///
/// let new_task = NewTask {
///     title: "Write quarterly report".to_string(),
///     description: None,
///     due_date: Some(Utc::now().date_naive()),
///     owner_user_id: owner,
///     completed: false,
/// };
/// assert!(new_task.validate(Utc::now().date_naive()).is_ok());
///
/// let task = Task::create(&pool, new_task).await?;
/// let flipped = Task::toggle(&pool, task.id).await?;
/// # Ok(())
/// # }
/// ```

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, QueryBuilder};
use thiserror::Error;
use uuid::Uuid;

use crate::models::user::UserSummary;
use crate::query::{PageRequest, Scope, TaskQuery};

/// Maximum title length, in characters
pub const TITLE_MAX_LEN: usize = 255;

/// Maximum description length, in characters
pub const DESCRIPTION_MAX_LEN: usize = 10_000;

/// Projection shared by every task query: the task joined with its owner.
///
/// Queries alias the task relation as `t` and the owner as `u`.
pub(crate) const TASK_COLUMNS: &str = "t.id, t.title, t.description, t.due_date, t.completed, \
     t.user_id AS owner_user_id, t.created_at, t.updated_at, \
     u.name AS owner_name, u.email::text AS owner_email";

/// Join clause paired with [`TASK_COLUMNS`]
pub(crate) const TASK_OWNER_JOIN: &str = " JOIN users u ON u.id = t.user_id";

/// A task together with its owner summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner: UserSummary,
}

/// Flat row produced by the task/owner join
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TaskRow {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub completed: bool,
    pub owner_user_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub owner_name: String,
    pub owner_email: String,
}

impl From<TaskRow> for Task {
    fn from(row: TaskRow) -> Self {
        Task {
            id: row.id,
            title: row.title,
            description: row.description,
            due_date: row.due_date,
            completed: row.completed,
            owner_user_id: row.owner_user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
            owner: UserSummary {
                id: row.owner_user_id,
                name: row.owner_name,
                email: row.owner_email,
            },
        }
    }
}

/// A rule violated by a task payload
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TaskValidationError {
    #[error("The title field is required")]
    TitleRequired,

    #[error("The title may not be greater than {TITLE_MAX_LEN} characters")]
    TitleTooLong,

    #[error("The description may not be greater than {DESCRIPTION_MAX_LEN} characters")]
    DescriptionTooLong,

    #[error("The due date must be today or a future date")]
    DueDateInPast,
}

impl TaskValidationError {
    /// Request field the error refers to
    pub fn field(&self) -> &'static str {
        match self {
            TaskValidationError::TitleRequired | TaskValidationError::TitleTooLong => "title",
            TaskValidationError::DescriptionTooLong => "description",
            TaskValidationError::DueDateInPast => "dueDate",
        }
    }
}

fn check_title(title: &str, errors: &mut Vec<TaskValidationError>) {
    if title.trim().is_empty() {
        errors.push(TaskValidationError::TitleRequired);
    } else if title.chars().count() > TITLE_MAX_LEN {
        errors.push(TaskValidationError::TitleTooLong);
    }
}

fn check_description(description: Option<&str>, errors: &mut Vec<TaskValidationError>) {
    if description.is_some_and(|d| d.chars().count() > DESCRIPTION_MAX_LEN) {
        errors.push(TaskValidationError::DescriptionTooLong);
    }
}

fn check_due_date(
    due_date: Option<NaiveDate>,
    today: NaiveDate,
    errors: &mut Vec<TaskValidationError>,
) {
    if due_date.is_some_and(|d| d < today) {
        errors.push(TaskValidationError::DueDateInPast);
    }
}

fn into_result(errors: Vec<TaskValidationError>) -> Result<(), Vec<TaskValidationError>> {
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Input for creating a task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTask {
    pub title: String,
    pub description: Option<String>,
    pub due_date: Option<NaiveDate>,
    pub owner_user_id: Uuid,
    pub completed: bool,
}

impl NewTask {
    /// Checks title, description and due date rules
    ///
    /// # Arguments
    ///
    /// * `today` - The current date; due dates before it are rejected
    ///
    /// # Errors
    ///
    /// Every violated rule, in field order
    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<TaskValidationError>> {
        let mut errors = Vec::new();
        check_title(&self.title, &mut errors);
        check_description(self.description.as_deref(), &mut errors);
        check_due_date(self.due_date, today, &mut errors);
        into_result(errors)
    }
}

/// Partial update of a task
///
/// `None` leaves a field untouched. For nullable columns the inner option
/// distinguishes "clear the value" (`Some(None)`) from "leave it".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskChanges {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub due_date: Option<Option<NaiveDate>>,
    pub completed: Option<bool>,
    pub owner_user_id: Option<Uuid>,
}

impl TaskChanges {
    /// Checks the supplied fields against the same rules as [`NewTask`]
    pub fn validate(&self, today: NaiveDate) -> Result<(), Vec<TaskValidationError>> {
        let mut errors = Vec::new();
        if let Some(title) = self.title.as_deref() {
            check_title(title, &mut errors);
        }
        if let Some(description) = &self.description {
            check_description(description.as_deref(), &mut errors);
        }
        if let Some(due_date) = self.due_date {
            check_due_date(due_date, today, &mut errors);
        }
        into_result(errors)
    }

    /// Applies the changes to an in-memory task
    pub fn apply_to(&self, task: &mut Task) {
        if let Some(title) = &self.title {
            task.title = title.clone();
        }
        if let Some(description) = &self.description {
            task.description = description.clone();
        }
        if let Some(due_date) = self.due_date {
            task.due_date = due_date;
        }
        if let Some(completed) = self.completed {
            task.completed = completed;
        }
        if let Some(owner) = self.owner_user_id {
            task.owner_user_id = owner;
        }
    }
}

/// Completion counters over a scoped task set
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStats {
    pub total: i64,
    pub completed: i64,
    pub pending: i64,
}

impl Task {
    /// Creates a task and returns it joined with its owner
    ///
    /// # Errors
    ///
    /// Returns a foreign key violation (`tasks_user_id_fkey`) if the owner
    /// does not exist.
    pub async fn create(pool: &PgPool, data: NewTask) -> Result<Self, sqlx::Error> {
        let query = format!(
            "WITH t AS (
                INSERT INTO tasks (user_id, title, description, due_date, completed)
                VALUES ($1, $2, $3, $4, $5)
                RETURNING *
             )
             SELECT {TASK_COLUMNS} FROM t{TASK_OWNER_JOIN}"
        );

        sqlx::query_as::<_, TaskRow>(&query)
            .bind(data.owner_user_id)
            .bind(data.title)
            .bind(data.description)
            .bind(data.due_date)
            .bind(data.completed)
            .fetch_one(pool)
            .await
            .map(Task::from)
    }

    /// Finds a task by ID
    pub async fn find_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Self>, sqlx::Error> {
        let query = format!("SELECT {TASK_COLUMNS} FROM tasks t{TASK_OWNER_JOIN} WHERE t.id = $1");

        Ok(sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .map(Task::from))
    }

    /// Applies a partial update to a task visible under `scope`
    ///
    /// # Returns
    ///
    /// The updated task, or None if no visible task has this id
    pub async fn update(
        pool: &PgPool,
        id: Uuid,
        scope: Scope,
        changes: TaskChanges,
    ) -> Result<Option<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "WITH t AS (UPDATE tasks SET updated_at = clock_timestamp()",
        );

        if let Some(title) = changes.title {
            builder.push(", title = ").push_bind(title);
        }
        if let Some(description) = changes.description {
            builder.push(", description = ").push_bind(description);
        }
        if let Some(due_date) = changes.due_date {
            builder.push(", due_date = ").push_bind(due_date);
        }
        if let Some(completed) = changes.completed {
            builder.push(", completed = ").push_bind(completed);
        }
        if let Some(owner) = changes.owner_user_id {
            builder.push(", user_id = ").push_bind(owner);
        }

        builder.push(" WHERE id = ").push_bind(id);
        if let Some(owner) = scope.owner() {
            builder.push(" AND user_id = ").push_bind(owner);
        }

        builder
            .push(" RETURNING *) SELECT ")
            .push(TASK_COLUMNS)
            .push(" FROM t")
            .push(TASK_OWNER_JOIN);

        Ok(builder
            .build_query_as::<TaskRow>()
            .fetch_optional(pool)
            .await?
            .map(Task::from))
    }

    /// Flips `completed` in a single statement
    ///
    /// Concurrent toggles never lose an update: each one negates the value
    /// the row holds at write time. Only a task visible under `scope` is
    /// touched.
    pub async fn toggle(pool: &PgPool, id: Uuid, scope: Scope) -> Result<Option<Self>, sqlx::Error> {
        let query = format!(
            "WITH t AS (
                UPDATE tasks
                SET completed = NOT completed, updated_at = clock_timestamp()
                WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)
                RETURNING *
             )
             SELECT {TASK_COLUMNS} FROM t{TASK_OWNER_JOIN}"
        );

        Ok(sqlx::query_as::<_, TaskRow>(&query)
            .bind(id)
            .bind(scope.owner())
            .fetch_optional(pool)
            .await?
            .map(Task::from))
    }

    /// Deletes a task visible under `scope`
    ///
    /// # Returns
    ///
    /// True if a row was deleted
    pub async fn delete(pool: &PgPool, id: Uuid, scope: Scope) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = $1 AND ($2::uuid IS NULL OR user_id = $2)")
            .bind(id)
            .bind(scope.owner())
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Runs a task query and returns one page of results
    pub async fn list(
        pool: &PgPool,
        query: &TaskQuery,
        page: PageRequest,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT ");
        builder
            .push(TASK_COLUMNS)
            .push(" FROM tasks t")
            .push(TASK_OWNER_JOIN);
        query.push_filters(&mut builder);
        query.push_order(&mut builder);
        builder
            .push(" LIMIT ")
            .push_bind(page.limit())
            .push(" OFFSET ")
            .push_bind(page.offset());

        Ok(builder
            .build_query_as::<TaskRow>()
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(Task::from)
            .collect())
    }

    /// Counts the tasks a query matches, ignoring pagination
    pub async fn count(pool: &PgPool, query: &TaskQuery) -> Result<i64, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM tasks t");
        query.push_filters(&mut builder);

        builder.build_query_scalar::<i64>().fetch_one(pool).await
    }

    /// Completion counters for a scope
    pub async fn stats(pool: &PgPool, scope: Scope) -> Result<TaskStats, sqlx::Error> {
        let mut builder = QueryBuilder::<Postgres>::new(
            "SELECT COUNT(*), COUNT(*) FILTER (WHERE t.completed) FROM tasks t",
        );
        TaskQuery::new(scope).push_filters(&mut builder);

        let (total, completed): (i64, i64) = builder.build_query_as().fetch_one(pool).await?;

        Ok(TaskStats {
            total,
            completed,
            pending: total - completed,
        })
    }

    /// Most recently created tasks of one owner
    pub async fn recent_for_owner(
        pool: &PgPool,
        owner: Uuid,
        limit: i64,
    ) -> Result<Vec<Self>, sqlx::Error> {
        let query = format!(
            "SELECT {TASK_COLUMNS} FROM tasks t{TASK_OWNER_JOIN}
             WHERE t.user_id = $1
             ORDER BY t.created_at DESC, t.id ASC
             LIMIT $2"
        );

        Ok(sqlx::query_as::<_, TaskRow>(&query)
            .bind(owner)
            .bind(limit)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(Task::from)
            .collect())
    }
}
