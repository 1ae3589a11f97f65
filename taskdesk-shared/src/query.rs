/// Task query pipeline
///
/// A [`TaskQuery`] is the ordered description of a task listing: the
/// visibility scope first, then the optional status filter, then the
/// optional free-text search, then the fixed sort order. Pagination is kept
/// separate in [`PageRequest`] so the same query drives paged listings,
/// counts and unpaginated exports.
///
/// The scope is a constructor argument, so a query cannot exist without
/// one. The same structure compiles to SQL ([`TaskQuery::push_filters`])
/// and evaluates in memory ([`TaskQuery::matches`], [`TaskQuery::compare`]).
///
/// # Example
///
/// ```
/// use taskdesk_shared::query::{ListingEntryPoint, PageRequest, Scope, StatusFilter, TaskQuery};
/// use uuid::Uuid;
///
/// let owner = Uuid::new_v4();
/// let query = TaskQuery::new(Scope::OwnedBy(owner))
///     .with_status(StatusFilter::parse("pending"))
///     .with_search(Some("report".to_string()));
///
/// let page = PageRequest::new(Some(2), None, ListingEntryPoint::Api);
/// assert_eq!(page.per_page, 10);
/// assert_eq!(page.offset(), 10);
/// ```

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use sqlx::{Postgres, QueryBuilder};
use uuid::Uuid;

use crate::models::task::Task;

/// Largest page size a caller may request
pub const MAX_PER_PAGE: u32 = 100;

/// Mandatory visibility predicate derived from the principal's role
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// Every task in the store
    AllTasks,

    /// Only tasks owned by the given user
    OwnedBy(Uuid),
}

impl Scope {
    /// Whether a task with this owner is visible under the scope
    pub fn includes(&self, owner_user_id: Uuid) -> bool {
        match self {
            Scope::AllTasks => true,
            Scope::OwnedBy(owner) => *owner == owner_user_id,
        }
    }

    /// Owner the scope is restricted to, if any
    pub fn owner(&self) -> Option<Uuid> {
        match self {
            Scope::AllTasks => None,
            Scope::OwnedBy(owner) => Some(*owner),
        }
    }
}

/// Completion status filter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusFilter {
    Completed,
    Pending,
}

impl StatusFilter {
    /// Parses a `status` query value
    ///
    /// Matching is case-sensitive. Unrecognized values yield `None` and are
    /// ignored by the listing.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim() {
            "completed" => Some(StatusFilter::Completed),
            "pending" => Some(StatusFilter::Pending),
            _ => None,
        }
    }

    /// Value of `completed` this filter keeps
    pub fn completed(&self) -> bool {
        matches!(self, StatusFilter::Completed)
    }
}

/// Listing surface, which decides the default page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListingEntryPoint {
    /// `GET /v1/tasks`
    Api,

    /// `GET /v1/tasks/page`
    Page,
}

impl ListingEntryPoint {
    pub fn default_per_page(&self) -> u32 {
        match self {
            ListingEntryPoint::Api => 10,
            ListingEntryPoint::Page => 5,
        }
    }
}

/// One-based page request with a bounded page size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub per_page: u32,
}

impl PageRequest {
    /// Normalizes raw request values
    ///
    /// Pages below 1 become 1. Page sizes are clamped to `1..=MAX_PER_PAGE`
    /// and default per entry point.
    pub fn new(page: Option<i64>, per_page: Option<i64>, entry: ListingEntryPoint) -> Self {
        let page = page.unwrap_or(1).clamp(1, u32::MAX as i64) as u32;
        let per_page = per_page
            .map(|n| n.clamp(1, MAX_PER_PAGE as i64) as u32)
            .unwrap_or_else(|| entry.default_per_page());

        Self { page, per_page }
    }

    /// SQL `LIMIT`
    pub fn limit(&self) -> i64 {
        self.per_page as i64
    }

    /// SQL `OFFSET`
    pub fn offset(&self) -> i64 {
        (self.page as i64 - 1) * self.per_page as i64
    }
}

/// Escapes `\`, `%` and `_` so the input matches literally inside `LIKE`
pub fn escape_like(input: &str) -> String {
    let mut escaped = String::with_capacity(input.len());
    for c in input.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Ordered task query: scope, status, search, sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskQuery {
    scope: Scope,
    status: Option<StatusFilter>,
    search: Option<String>,
}

impl TaskQuery {
    pub fn new(scope: Scope) -> Self {
        Self {
            scope,
            status: None,
            search: None,
        }
    }

    pub fn with_status(mut self, status: Option<StatusFilter>) -> Self {
        self.status = status;
        self
    }

    /// Sets the search term; blank terms are ignored
    pub fn with_search(mut self, search: Option<String>) -> Self {
        self.search = search
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());
        self
    }

    pub fn scope(&self) -> Scope {
        self.scope
    }

    pub fn status(&self) -> Option<StatusFilter> {
        self.status
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    /// Evaluates scope, status and search against a task, in that order
    pub fn matches(&self, task: &Task) -> bool {
        if !self.scope.includes(task.owner_user_id) {
            return false;
        }

        if let Some(status) = self.status {
            if task.completed != status.completed() {
                return false;
            }
        }

        match self.search.as_deref() {
            Some(needle) => {
                let needle = needle.to_lowercase();
                task.title.to_lowercase().contains(&needle)
                    || task
                        .description
                        .as_deref()
                        .is_some_and(|d| d.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }

    /// Listing order: due date ascending with undated tasks last, then
    /// newest first, then id
    pub fn compare(a: &Task, b: &Task) -> Ordering {
        let by_due = match (a.due_date, b.due_date) {
            (Some(x), Some(y)) => x.cmp(&y),
            (Some(_), None) => Ordering::Less,
            (None, Some(_)) => Ordering::Greater,
            (None, None) => Ordering::Equal,
        };

        by_due
            .then_with(|| b.created_at.cmp(&a.created_at))
            .then_with(|| a.id.cmp(&b.id))
    }

    /// Appends the `WHERE` clause for a query over `tasks t`
    pub fn push_filters(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" WHERE ");
        match self.scope {
            Scope::AllTasks => {
                builder.push("TRUE");
            }
            Scope::OwnedBy(owner) => {
                builder.push("t.user_id = ").push_bind(owner);
            }
        }

        if let Some(status) = self.status {
            builder.push(" AND t.completed = ").push_bind(status.completed());
        }

        if let Some(search) = self.search.as_deref() {
            let pattern = format!("%{}%", escape_like(search));
            builder
                .push(" AND (t.title ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR t.description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
    }

    /// Appends the listing `ORDER BY`
    pub fn push_order(&self, builder: &mut QueryBuilder<'_, Postgres>) {
        builder.push(" ORDER BY t.due_date ASC NULLS LAST, t.created_at DESC, t.id ASC");
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub current_page: u32,
    pub last_page: u32,
    pub per_page: u32,
}

impl<T> Page<T> {
    /// Wraps one already-fetched page
    pub fn new(data: Vec<T>, total: i64, request: PageRequest) -> Self {
        let per_page = request.per_page.max(1) as i64;
        let last_page = ((total + per_page - 1) / per_page).max(1);

        Self {
            data,
            total,
            current_page: request.page,
            last_page: last_page.min(u32::MAX as i64) as u32,
            per_page: request.per_page,
        }
    }

    /// Cuts one page out of a fully sorted collection
    pub fn from_sorted(items: Vec<T>, request: PageRequest) -> Self {
        let total = items.len() as i64;
        let data = items
            .into_iter()
            .skip(request.offset() as usize)
            .take(request.per_page as usize)
            .collect();

        Self::new(data, total, request)
    }
}

/// Query string accepted by task listings and the export
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListParams {
    pub status: Option<String>,
    pub search: Option<String>,
    pub page: Option<i64>,
    #[serde(alias = "perPage")]
    pub per_page: Option<i64>,
}

impl ListParams {
    /// Builds the query for a scope
    pub fn to_query(&self, scope: Scope) -> TaskQuery {
        TaskQuery::new(scope)
            .with_status(self.status.as_deref().and_then(StatusFilter::parse))
            .with_search(self.search.clone())
    }

    pub fn page_request(&self, entry: ListingEntryPoint) -> PageRequest {
        PageRequest::new(self.page, self.per_page, entry)
    }
}
