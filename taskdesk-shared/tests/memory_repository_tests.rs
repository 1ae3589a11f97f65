/// Repository behaviour tests against the in-memory adapter
///
/// These cover the access-control and query properties end to end: scope,
/// filters, pagination, toggling, validation, export and user deletion.

use chrono::Duration;
use futures::StreamExt;
use taskdesk_shared::auth::authorization::{scope_for, AuthzError};
use taskdesk_shared::auth::middleware::Principal;
use taskdesk_shared::export::{csv_stream, encode_header};
use taskdesk_shared::models::task::{NewTask, TaskChanges, TaskValidationError};
use taskdesk_shared::models::user::{CreateUser, Role, User, UserFilter};
use taskdesk_shared::query::{ListingEntryPoint, PageRequest, Scope, StatusFilter, TaskQuery};
use taskdesk_shared::repository::memory::MemoryRepository;
use taskdesk_shared::repository::{today, RepositoryError, TaskRepository, UserRepository};
use uuid::Uuid;

async fn user(repo: &MemoryRepository, name: &str, role: Role) -> User {
    repo.create_user(CreateUser {
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase()),
        password_hash: "hash".to_string(),
        role,
        email_verified_at: None,
    })
    .await
    .expect("Should create user")
}

fn new_task(owner: Uuid, title: &str) -> NewTask {
    NewTask {
        title: title.to_string(),
        description: None,
        due_date: None,
        owner_user_id: owner,
        completed: false,
    }
}

fn api_page(page: Option<i64>, per_page: Option<i64>) -> PageRequest {
    PageRequest::new(page, per_page, ListingEntryPoint::Api)
}

/// Users A and B, three tasks: A owns two (one completed), B owns one
async fn scenario() -> (MemoryRepository, Principal, Principal, Principal) {
    let repo = MemoryRepository::new();
    let admin = user(&repo, "Admin", Role::Admin).await;
    let a = user(&repo, "Alice", Role::User).await;
    let b = user(&repo, "Bob", Role::User).await;

    let mut done = new_task(a.id, "Alice done");
    done.completed = true;
    repo.insert_task(done).await.unwrap();
    repo.insert_task(new_task(a.id, "Alice pending")).await.unwrap();
    repo.insert_task(new_task(b.id, "Bob pending")).await.unwrap();

    (
        repo,
        Principal::from(&admin),
        Principal::from(&a),
        Principal::from(&b),
    )
}

#[tokio::test]
async fn test_pending_filter_respects_scope() {
    let (repo, admin, alice, _) = scenario().await;
    let pending = |p: &Principal| TaskQuery::new(scope_for(p)).with_status(Some(StatusFilter::Pending));

    let as_alice = repo.query_tasks(&pending(&alice), api_page(None, None)).await.unwrap();
    assert_eq!(as_alice.total, 1);
    assert_eq!(as_alice.data[0].title, "Alice pending");

    let as_admin = repo.query_tasks(&pending(&admin), api_page(None, None)).await.unwrap();
    assert_eq!(as_admin.total, 2);
}

#[tokio::test]
async fn test_user_listing_never_leaks_other_owners() {
    let (repo, _, alice, _) = scenario().await;
    let searches = [None, Some("pending"), Some("bob"), Some(""), Some("%")];
    let statuses = [None, Some(StatusFilter::Completed), Some(StatusFilter::Pending)];

    for search in searches {
        for status in statuses {
            let query = TaskQuery::new(scope_for(&alice))
                .with_status(status)
                .with_search(search.map(str::to_string));
            let page = repo.query_tasks(&query, api_page(None, Some(100))).await.unwrap();

            assert!(
                page.data.iter().all(|t| t.owner_user_id == alice.user_id),
                "search={search:?} status={status:?}"
            );
        }
    }
}

#[tokio::test]
async fn test_search_treats_wildcards_literally() {
    let repo = MemoryRepository::new();
    let admin = user(&repo, "Admin", Role::Admin).await;
    repo.insert_task(new_task(admin.id, "100% done")).await.unwrap();
    repo.insert_task(new_task(admin.id, "1000 done")).await.unwrap();

    let query = TaskQuery::new(scope_for(&Principal::from(&admin))).with_search(Some("0%".to_string()));
    let page = repo.query_tasks(&query, api_page(None, None)).await.unwrap();

    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].title, "100% done");
}

#[tokio::test]
async fn test_pagination_two_two_one() {
    let repo = MemoryRepository::new();
    let owner = user(&repo, "Owner", Role::User).await;
    for i in 0..5 {
        repo.insert_task(new_task(owner.id, &format!("Task {i}"))).await.unwrap();
    }

    let query = TaskQuery::new(scope_for(&Principal::from(&owner)));
    let mut seen = Vec::new();
    for page in 1..=3 {
        let result = repo.query_tasks(&query, api_page(Some(page), Some(2))).await.unwrap();
        assert_eq!(result.last_page, 3);
        seen.push(result.data.len());
    }
    assert_eq!(seen, vec![2, 2, 1]);

    let beyond = repo.query_tasks(&query, api_page(Some(4), Some(2))).await.unwrap();
    assert!(beyond.data.is_empty());
}

#[tokio::test]
async fn test_listing_order_due_date_then_newest() {
    let repo = MemoryRepository::new();
    let owner = user(&repo, "Owner", Role::Admin).await;

    repo.insert_task(new_task(owner.id, "undated old")).await.unwrap();
    let mut later = new_task(owner.id, "due later");
    later.due_date = Some(today() + Duration::days(5));
    repo.insert_task(later).await.unwrap();
    let mut sooner = new_task(owner.id, "due sooner");
    sooner.due_date = Some(today() + Duration::days(1));
    repo.insert_task(sooner).await.unwrap();
    repo.insert_task(new_task(owner.id, "undated new")).await.unwrap();

    let page = repo
        .query_tasks(&TaskQuery::new(scope_for(&Principal::from(&owner))), api_page(None, None))
        .await
        .unwrap();
    let titles: Vec<_> = page.data.iter().map(|t| t.title.as_str()).collect();

    assert_eq!(titles, vec!["due sooner", "due later", "undated new", "undated old"]);
}

#[tokio::test]
async fn test_toggle_twice_restores_state() {
    let (repo, _, alice, _) = scenario().await;
    let task = repo
        .query_tasks(&TaskQuery::new(scope_for(&alice)), api_page(None, None))
        .await
        .unwrap()
        .data
        .remove(0);

    let once = repo.toggle_task(task.id, scope_for(&alice)).await.unwrap().unwrap();
    assert_eq!(once.completed, !task.completed);
    assert!(once.updated_at > task.updated_at);

    let twice = repo.toggle_task(task.id, scope_for(&alice)).await.unwrap().unwrap();
    assert_eq!(twice.completed, task.completed);

    assert!(repo.toggle_task(Uuid::new_v4(), Scope::AllTasks).await.unwrap().is_none());
}

#[tokio::test]
async fn test_mutations_respect_scope_at_write_time() {
    let (repo, _, alice, bob) = scenario().await;
    let task = repo
        .query_tasks(&TaskQuery::new(scope_for(&alice)), api_page(None, None))
        .await
        .unwrap()
        .data
        .remove(0);

    // Reassigned after the previous owner loaded it
    let reassign = TaskChanges {
        owner_user_id: Some(bob.user_id),
        ..Default::default()
    };
    repo.update_task(task.id, Scope::AllTasks, reassign).await.unwrap().unwrap();

    let stale = scope_for(&alice);
    assert!(repo.toggle_task(task.id, stale).await.unwrap().is_none());
    let rename = TaskChanges {
        title: Some("Hijacked".to_string()),
        ..Default::default()
    };
    assert!(repo.update_task(task.id, stale, rename).await.unwrap().is_none());
    assert!(!repo.delete_task(task.id, stale).await.unwrap());

    let current = repo.find_task(task.id).await.unwrap().unwrap();
    assert_eq!(current.owner_user_id, bob.user_id);
    assert_eq!(current.title, task.title);
    assert_eq!(current.completed, task.completed);

    assert!(repo.delete_task(task.id, scope_for(&bob)).await.unwrap());
}

#[tokio::test]
async fn test_due_date_validation() {
    let repo = MemoryRepository::new();
    let owner = user(&repo, "Owner", Role::User).await;

    let mut yesterday = new_task(owner.id, "Late");
    yesterday.due_date = Some(today() - Duration::days(1));
    match repo.insert_task(yesterday).await {
        Err(RepositoryError::Validation(errors)) => {
            assert_eq!(errors, vec![TaskValidationError::DueDateInPast])
        }
        other => panic!("Expected validation error, got {other:?}"),
    }

    let mut on_time = new_task(owner.id, "On time");
    on_time.due_date = Some(today());
    let created = repo.insert_task(on_time).await.unwrap();
    assert!(!created.completed);
    assert_eq!(created.owner.email, "owner@example.com");
}

#[tokio::test]
async fn test_owner_must_exist() {
    let repo = MemoryRepository::new();
    let owner = user(&repo, "Owner", Role::User).await;

    assert!(matches!(
        repo.insert_task(new_task(Uuid::new_v4(), "Orphan")).await,
        Err(RepositoryError::OwnerNotFound)
    ));

    let task = repo.insert_task(new_task(owner.id, "Mine")).await.unwrap();
    let reassign = TaskChanges {
        owner_user_id: Some(Uuid::new_v4()),
        ..Default::default()
    };
    assert!(matches!(
        repo.update_task(task.id, Scope::AllTasks, reassign).await,
        Err(RepositoryError::OwnerNotFound)
    ));
}

#[tokio::test]
async fn test_export_for_user_without_tasks_is_header_only() {
    let repo = MemoryRepository::new();
    let loner = user(&repo, "Loner", Role::User).await;
    let other = user(&repo, "Other", Role::User).await;
    repo.insert_task(new_task(other.id, "Not yours")).await.unwrap();

    let query = TaskQuery::new(scope_for(&Principal::from(&loner)));
    let chunks: Vec<_> = csv_stream(repo.stream_tasks(query)).collect().await;

    assert_eq!(chunks.len(), 1);
    assert_eq!(&chunks[0].as_ref().unwrap()[..], &encode_header().unwrap()[..]);
}

#[tokio::test]
async fn test_export_row_count_matches_scope() {
    let (repo, admin, alice, _) = scenario().await;

    let all: Vec<_> = repo.stream_tasks(TaskQuery::new(scope_for(&admin))).collect().await;
    assert_eq!(all.len(), 3);

    let mine: Vec<_> = repo.stream_tasks(TaskQuery::new(scope_for(&alice))).collect().await;
    assert_eq!(mine.len(), 2);
}

#[tokio::test]
async fn test_delete_sole_admin_is_protected() {
    let repo = MemoryRepository::new();
    let admin = user(&repo, "Admin", Role::Admin).await;
    // Acting principal that is not the persisted admin, to isolate the count rule
    let acting = Principal::new(Uuid::new_v4(), Role::Admin);

    assert!(matches!(
        repo.delete_user(&acting, admin.id).await,
        Err(RepositoryError::Authorization(AuthzError::LastAdminProtected))
    ));
    assert!(repo.find_user(admin.id).await.unwrap().is_some());
}

#[tokio::test]
async fn test_delete_one_of_two_admins_leaves_one() {
    let repo = MemoryRepository::new();
    let first = user(&repo, "First", Role::Admin).await;
    let second = user(&repo, "Second", Role::Admin).await;

    assert!(repo.delete_user(&Principal::from(&first), second.id).await.unwrap());
    assert_eq!(repo.user_stats().await.unwrap().admins, 1);
}

#[tokio::test]
async fn test_admin_cannot_delete_self() {
    let repo = MemoryRepository::new();
    let first = user(&repo, "First", Role::Admin).await;
    user(&repo, "Second", Role::Admin).await;

    assert!(matches!(
        repo.delete_user(&Principal::from(&first), first.id).await,
        Err(RepositoryError::Authorization(AuthzError::SelfDeletion))
    ));
}

#[tokio::test]
async fn test_concurrent_admin_deletions_keep_one_admin() {
    let repo = MemoryRepository::new();
    let x = user(&repo, "Xavier", Role::Admin).await;
    let y = user(&repo, "Yvonne", Role::Admin).await;

    let px = Principal::from(&x);
    let py = Principal::from(&y);

    // Each would be allowed in isolation; only one may win
    let (r1, r2) = tokio::join!(repo.delete_user(&px, y.id), repo.delete_user(&py, x.id));

    let outcomes = [r1, r2];
    assert_eq!(outcomes.iter().filter(|r| matches!(r, Ok(true))).count(), 1);
    assert!(outcomes.iter().any(|r| matches!(
        r,
        Err(RepositoryError::Authorization(AuthzError::LastAdminProtected))
    )));
    assert_eq!(repo.user_stats().await.unwrap().admins, 1);
}

#[tokio::test]
async fn test_owner_with_tasks_cannot_be_deleted() {
    let (repo, admin, alice, _) = scenario().await;

    assert!(matches!(
        repo.delete_user(&admin, alice.user_id).await,
        Err(RepositoryError::OwnerHasTasks)
    ));
    assert!(!repo.delete_user(&admin, Uuid::new_v4()).await.unwrap());
}

#[tokio::test]
async fn test_duplicate_email_is_case_insensitive() {
    let repo = MemoryRepository::new();
    user(&repo, "Ada", Role::User).await;

    let duplicate = repo
        .create_user(CreateUser {
            name: "Other Ada".to_string(),
            email: "ADA@example.com".to_string(),
            password_hash: "hash".to_string(),
            role: Role::User,
            email_verified_at: None,
        })
        .await;
    assert!(matches!(duplicate, Err(RepositoryError::DuplicateEmail)));

    let found = repo.find_user_by_email("Ada@Example.com").await.unwrap();
    assert!(found.is_some());

    repo.create_user(CreateUser {
        name: "Élodie".to_string(),
        email: "élodie@example.com".to_string(),
        password_hash: "hash".to_string(),
        role: Role::User,
        email_verified_at: None,
    })
    .await
    .unwrap();
    let found = repo.find_user_by_email("ÉLODIE@example.com").await.unwrap();
    assert_eq!(found.map(|u| u.name), Some("Élodie".to_string()));
}

#[tokio::test]
async fn test_user_listing_filters_and_stats() {
    let (repo, _, _, _) = scenario().await;

    let stats = repo.user_stats().await.unwrap();
    assert_eq!((stats.total, stats.admins, stats.users), (3, 1, 2));

    let filter = UserFilter {
        search: Some("ali".to_string()),
        role: Some(Role::User),
    };
    let page = repo.list_users(&filter, api_page(None, None)).await.unwrap();
    assert_eq!(page.total, 1);
    assert_eq!(page.data[0].name, "Alice");

    let newest_first = repo.list_users(&UserFilter::default(), api_page(None, None)).await.unwrap();
    let names: Vec<_> = newest_first.data.iter().map(|u| u.name.as_str()).collect();
    assert_eq!(names, vec!["Bob", "Alice", "Admin"]);
}

#[tokio::test]
async fn test_task_stats_and_recent() {
    let (repo, admin, alice, _) = scenario().await;

    let all = repo.task_stats(scope_for(&admin)).await.unwrap();
    assert_eq!((all.total, all.completed, all.pending), (3, 1, 2));

    let mine = repo.task_stats(scope_for(&alice)).await.unwrap();
    assert_eq!((mine.total, mine.completed, mine.pending), (2, 1, 1));

    let recent = repo.recent_tasks(alice.user_id, 10).await.unwrap();
    let titles: Vec<_> = recent.iter().map(|t| t.title.as_str()).collect();
    assert_eq!(titles, vec!["Alice pending", "Alice done"]);
}
