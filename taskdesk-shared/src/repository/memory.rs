/// In-memory adapter for the repository ports
///
/// Holds users and tasks behind one `tokio::sync::RwLock`. Every mutation
/// takes the write lock for its whole duration, which gives the same
/// atomicity the PostgreSQL adapter gets from transactions: a user deletion
/// checks the policy, the admin count and owned tasks, then removes the row
/// without anything interleaving.
///
/// Owner summaries are filled in on read, so renaming a user is reflected
/// in every task returned afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use async_stream::stream;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use futures::stream::{BoxStream, StreamExt};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{today, RepositoryError, TaskRepository, UserRepository};
use crate::auth::authorization::{require, Operation, Target};
use crate::auth::middleware::Principal;
use crate::models::task::{NewTask, Task, TaskChanges, TaskStats};
use crate::models::user::{CreateUser, Role, UpdateUser, User, UserFilter, UserStats};
use crate::query::{Page, PageRequest, Scope, TaskQuery};

/// Case-insensitive email match, lowercasing the way `citext` does
fn same_email(a: &str, b: &str) -> bool {
    a.to_lowercase() == b.to_lowercase()
}

#[derive(Debug, Default)]
struct MemoryState {
    users: HashMap<Uuid, User>,
    tasks: HashMap<Uuid, Task>,
    last_timestamp: Option<DateTime<Utc>>,
}

impl MemoryState {
    /// Current time, strictly after every timestamp handed out before
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_timestamp {
            Some(last) if now <= last => last + Duration::microseconds(1),
            _ => now,
        };
        self.last_timestamp = Some(stamp);
        stamp
    }

    fn email_taken(&self, email: &str, except: Option<Uuid>) -> bool {
        self.users
            .values()
            .any(|u| Some(u.id) != except && same_email(&u.email, email))
    }

    /// Whether a task with this id exists and is visible under `scope`
    fn visible(&self, id: Uuid, scope: Scope) -> bool {
        self.tasks
            .get(&id)
            .is_some_and(|t| scope.includes(t.owner_user_id))
    }

    fn hydrate(&self, task: &Task) -> Task {
        let mut task = task.clone();
        if let Some(owner) = self.users.get(&task.owner_user_id) {
            task.owner = owner.summary();
        }
        task
    }

    fn matching(&self, query: &TaskQuery) -> Vec<Task> {
        let mut tasks: Vec<Task> = self
            .tasks
            .values()
            .filter(|t| query.matches(t))
            .map(|t| self.hydrate(t))
            .collect();
        tasks.sort_by(TaskQuery::compare);
        tasks
    }
}

/// Repository that keeps everything in process memory
#[derive(Debug, Clone, Default)]
pub struct MemoryRepository {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TaskRepository for MemoryRepository {
    async fn ping(&self) -> Result<(), RepositoryError> {
        Ok(())
    }

    async fn find_task(&self, id: Uuid) -> Result<Option<Task>, RepositoryError> {
        let state = self.state.read().await;
        Ok(state.tasks.get(&id).map(|t| state.hydrate(t)))
    }

    async fn insert_task(&self, task: NewTask) -> Result<Task, RepositoryError> {
        task.validate(today()).map_err(RepositoryError::Validation)?;

        let mut state = self.state.write().await;
        let owner = state
            .users
            .get(&task.owner_user_id)
            .map(User::summary)
            .ok_or(RepositoryError::OwnerNotFound)?;

        let now = state.next_timestamp();
        let created = Task {
            id: Uuid::new_v4(),
            title: task.title,
            description: task.description,
            due_date: task.due_date,
            completed: task.completed,
            owner_user_id: task.owner_user_id,
            created_at: now,
            updated_at: now,
            owner,
        };
        state.tasks.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update_task(
        &self,
        id: Uuid,
        scope: Scope,
        changes: TaskChanges,
    ) -> Result<Option<Task>, RepositoryError> {
        changes.validate(today()).map_err(RepositoryError::Validation)?;

        let mut state = self.state.write().await;
        if let Some(owner) = changes.owner_user_id {
            if !state.users.contains_key(&owner) {
                return Err(RepositoryError::OwnerNotFound);
            }
        }
        if !state.visible(id, scope) {
            return Ok(None);
        }

        let now = state.next_timestamp();
        let Some(task) = state.tasks.get_mut(&id) else {
            return Ok(None);
        };
        changes.apply_to(task);
        task.updated_at = now;

        let updated = task.clone();
        Ok(Some(state.hydrate(&updated)))
    }

    async fn toggle_task(&self, id: Uuid, scope: Scope) -> Result<Option<Task>, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.visible(id, scope) {
            return Ok(None);
        }

        let now = state.next_timestamp();
        let Some(task) = state.tasks.get_mut(&id) else {
            return Ok(None);
        };
        task.completed = !task.completed;
        task.updated_at = now;

        let toggled = task.clone();
        Ok(Some(state.hydrate(&toggled)))
    }

    async fn delete_task(&self, id: Uuid, scope: Scope) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.visible(id, scope) {
            return Ok(false);
        }

        Ok(state.tasks.remove(&id).is_some())
    }

    async fn query_tasks(
        &self,
        query: &TaskQuery,
        page: PageRequest,
    ) -> Result<Page<Task>, RepositoryError> {
        let state = self.state.read().await;
        Ok(Page::from_sorted(state.matching(query), page))
    }

    fn stream_tasks(&self, query: TaskQuery) -> BoxStream<'static, Result<Task, RepositoryError>> {
        let state = Arc::clone(&self.state);

        let tasks = stream! {
            let snapshot = state.read().await.matching(&query);
            for task in snapshot {
                yield Ok::<Task, RepositoryError>(task);
            }
        };

        tasks.boxed()
    }

    async fn task_stats(&self, scope: Scope) -> Result<TaskStats, RepositoryError> {
        let state = self.state.read().await;
        let (total, completed) = state
            .tasks
            .values()
            .filter(|t| scope.includes(t.owner_user_id))
            .fold((0i64, 0i64), |(total, done), t| {
                (total + 1, done + i64::from(t.completed))
            });

        Ok(TaskStats {
            total,
            completed,
            pending: total - completed,
        })
    }

    async fn recent_tasks(&self, owner: Uuid, limit: i64) -> Result<Vec<Task>, RepositoryError> {
        let state = self.state.read().await;
        let mut tasks: Vec<Task> = state
            .tasks
            .values()
            .filter(|t| t.owner_user_id == owner)
            .map(|t| state.hydrate(t))
            .collect();
        tasks.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        tasks.truncate(limit.max(0) as usize);

        Ok(tasks)
    }
}

#[async_trait]
impl UserRepository for MemoryRepository {
    async fn find_user(&self, id: Uuid) -> Result<Option<User>, RepositoryError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| same_email(&u.email, email))
            .cloned())
    }

    async fn create_user(&self, user: CreateUser) -> Result<User, RepositoryError> {
        let mut state = self.state.write().await;
        if state.email_taken(&user.email, None) {
            return Err(RepositoryError::DuplicateEmail);
        }

        let now = state.next_timestamp();
        let created = User {
            id: Uuid::new_v4(),
            name: user.name,
            email: user.email,
            password_hash: user.password_hash,
            role: user.role,
            email_verified_at: user.email_verified_at,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());

        Ok(created)
    }

    async fn update_user(
        &self,
        id: Uuid,
        changes: UpdateUser,
    ) -> Result<Option<User>, RepositoryError> {
        let mut state = self.state.write().await;
        if !state.users.contains_key(&id) {
            return Ok(None);
        }
        if let Some(email) = changes.email.as_deref() {
            if state.email_taken(email, Some(id)) {
                return Err(RepositoryError::DuplicateEmail);
            }
        }

        let now = state.next_timestamp();
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(name) = changes.name {
            user.name = name;
        }
        if let Some(email) = changes.email {
            user.email = email;
        }
        if let Some(role) = changes.role {
            user.role = role;
        }
        if let Some(password_hash) = changes.password_hash {
            user.password_hash = password_hash;
        }
        user.updated_at = now;

        Ok(Some(user.clone()))
    }

    async fn list_users(
        &self,
        filter: &UserFilter,
        page: PageRequest,
    ) -> Result<Page<User>, RepositoryError> {
        let state = self.state.read().await;
        let mut users: Vec<User> = state
            .users
            .values()
            .filter(|u| filter.matches(u))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));

        Ok(Page::from_sorted(users, page))
    }

    async fn user_stats(&self) -> Result<UserStats, RepositoryError> {
        let state = self.state.read().await;
        let admins = state.users.values().filter(|u| u.role == Role::Admin).count() as i64;
        let total = state.users.len() as i64;

        Ok(UserStats {
            total,
            admins,
            users: total - admins,
        })
    }

    async fn delete_user(&self, principal: &Principal, id: Uuid) -> Result<bool, RepositoryError> {
        let mut state = self.state.write().await;
        let Some(target) = state.users.get(&id) else {
            return Ok(false);
        };

        let admin_count = state.users.values().filter(|u| u.role == Role::Admin).count() as i64;
        require(principal, Operation::DeleteUser, Target::user(target, admin_count))?;

        if state.tasks.values().any(|t| t.owner_user_id == id) {
            return Err(RepositoryError::OwnerHasTasks);
        }

        state.users.remove(&id);
        Ok(true)
    }
}
