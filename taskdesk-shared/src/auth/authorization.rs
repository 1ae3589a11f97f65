/// Authorization policy
///
/// Pure decision logic: given the acting principal, the operation and its
/// target, decide whether the operation may proceed. Nothing here touches
/// storage. Callers that need persisted facts (the admin count for a user
/// deletion) read them first, inside the same transaction as the mutation,
/// and pass them in through [`Target`].
///
/// # Rules
///
/// 1. `CreateTask` and `ManageUsers` require the admin role.
/// 2. `ReadTask`, `UpdateTask`, `DeleteTask` and `ToggleTask` require a task
///    target owned by the principal, unless the principal is an admin.
/// 3. `ListTasks` and `ExportTasks` are always allowed; visibility comes
///    from [`scope_for`].
/// 4. `DeleteUser` requires the admin role, forbids deleting oneself and
///    refuses to remove the last admin.
///
/// # Example
///
/// ```
/// use taskdesk_shared::auth::authorization::{decide, Decision, DenyReason, Operation, Target};
/// use taskdesk_shared::auth::middleware::Principal;
/// use taskdesk_shared::models::user::Role;
/// use uuid::Uuid;
///
/// let user = Principal::new(Uuid::new_v4(), Role::User);
/// let someone_else = Uuid::new_v4();
///
/// let decision = decide(&user, Operation::ReadTask, Target::Task { owner_user_id: someone_else });
/// assert_eq!(decision, Decision::Deny(DenyReason::Forbidden));
/// ```

use uuid::Uuid;

use super::middleware::Principal;
use crate::models::task::Task;
use crate::models::user::{Role, User};
use crate::query::Scope;

/// Operations gated by the policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    CreateTask,
    ReadTask,
    UpdateTask,
    DeleteTask,
    ToggleTask,
    ListTasks,
    ExportTasks,
    DeleteUser,
    /// List, create, show and update users
    ManageUsers,
}

/// What an operation acts on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    None,
    Task {
        owner_user_id: Uuid,
    },
    /// A user, with the number of admins currently persisted
    User {
        id: Uuid,
        role: Role,
        admin_count: i64,
    },
}

impl Target {
    pub fn task(task: &Task) -> Self {
        Target::Task {
            owner_user_id: task.owner_user_id,
        }
    }

    pub fn user(user: &User, admin_count: i64) -> Self {
        Target::User {
            id: user.id,
            role: user.role,
            admin_count,
        }
    }
}

/// Why an operation was refused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    Forbidden,
    SelfDeletion,
    LastAdminProtected,
}

/// Outcome of a policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny(DenyReason),
}

impl Decision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Decision::Allow)
    }
}

/// Error type for refused operations
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthzError {
    #[error("This action is unauthorized")]
    Forbidden,

    #[error("You cannot delete your own account")]
    SelfDeletion,

    #[error("Cannot delete the last admin user")]
    LastAdminProtected,
}

impl From<DenyReason> for AuthzError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Forbidden => AuthzError::Forbidden,
            DenyReason::SelfDeletion => AuthzError::SelfDeletion,
            DenyReason::LastAdminProtected => AuthzError::LastAdminProtected,
        }
    }
}

fn admin_only(principal: &Principal) -> Decision {
    if principal.is_admin() {
        Decision::Allow
    } else {
        Decision::Deny(DenyReason::Forbidden)
    }
}

/// Decides whether `principal` may perform `operation` on `target`
pub fn decide(principal: &Principal, operation: Operation, target: Target) -> Decision {
    match operation {
        Operation::CreateTask | Operation::ManageUsers => admin_only(principal),

        Operation::ReadTask
        | Operation::UpdateTask
        | Operation::DeleteTask
        | Operation::ToggleTask => match target {
            Target::Task { owner_user_id }
                if principal.is_admin() || owner_user_id == principal.user_id =>
            {
                Decision::Allow
            }
            _ => Decision::Deny(DenyReason::Forbidden),
        },

        Operation::ListTasks | Operation::ExportTasks => Decision::Allow,

        Operation::DeleteUser => {
            if !principal.is_admin() {
                return Decision::Deny(DenyReason::Forbidden);
            }

            match target {
                Target::User { id, .. } if id == principal.user_id => {
                    Decision::Deny(DenyReason::SelfDeletion)
                }
                Target::User {
                    role: Role::Admin,
                    admin_count,
                    ..
                } if admin_count <= 1 => Decision::Deny(DenyReason::LastAdminProtected),
                Target::User { .. } => Decision::Allow,
                _ => Decision::Deny(DenyReason::Forbidden),
            }
        }
    }
}

/// Like [`decide`], as a `Result`
pub fn require(principal: &Principal, operation: Operation, target: Target) -> Result<(), AuthzError> {
    match decide(principal, operation, target) {
        Decision::Allow => Ok(()),
        Decision::Deny(reason) => {
            tracing::debug!(
                user_id = %principal.user_id,
                role = %principal.role,
                ?operation,
                ?reason,
                "Operation denied"
            );
            Err(reason.into())
        }
    }
}

/// Task visibility for listings and exports
pub fn scope_for(principal: &Principal) -> Scope {
    if principal.is_admin() {
        Scope::AllTasks
    } else {
        Scope::OwnedBy(principal.user_id)
    }
}
