// src/admin.rs
//
// Back office: account approval and suspension, deletion, and the
// assignment of project managers to clients.

use actix_web::{web, HttpRequest, HttpResponse};
use log::{info, warn};
use serde::Deserialize;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::error::{AppError, AppResult};
use crate::models::{ClientProfile, Role, User, UserSummary};
use crate::store::{Mutation, Store, UserFlags, UserFilter};

fn ensure_admin(actor: &Actor) -> AppResult<()> {
    access::ensure(actor, Action::Administer, Resource::None)
}

async fn load_user(store: &dyn Store, user_id: &str) -> AppResult<User> {
    store
        .user(user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", user_id))
}

pub async fn list_users(store: &dyn Store, actor: &Actor, filter: UserFilter) -> AppResult<Vec<UserSummary>> {
    ensure_admin(actor)?;
    let users = store.users(&filter).await?;
    Ok(users.iter().map(UserSummary::from).collect())
}

async fn set_flags(store: &dyn Store, user_id: &str, flags: UserFlags) -> AppResult<UserSummary> {
    load_user(store, user_id).await?;
    store
        .apply(vec![Mutation::UpdateUserFlags {
            user_id: user_id.to_string(),
            flags,
        }])
        .await?;
    let user = load_user(store, user_id).await?;
    Ok(UserSummary::from(&user))
}

/// Marks the account as approved by an admin. Approving twice is a no-op.
pub async fn approve_user(store: &dyn Store, actor: &Actor, user_id: &str) -> AppResult<UserSummary> {
    ensure_admin(actor)?;
    let user = set_flags(
        store,
        user_id,
        UserFlags {
            admin_verified: Some(true),
            ..Default::default()
        },
    )
    .await?;
    info!("User {} approved by {}", user_id, actor.user_id);
    Ok(user)
}

pub async fn set_suspended(
    store: &dyn Store,
    actor: &Actor,
    user_id: &str,
    suspended: bool,
) -> AppResult<UserSummary> {
    ensure_admin(actor)?;
    if user_id == actor.user_id {
        return Err(AppError::Validation("admins cannot suspend themselves".to_string()));
    }
    let user = set_flags(
        store,
        user_id,
        UserFlags {
            is_suspended: Some(suspended),
            ..Default::default()
        },
    )
    .await?;
    info!("User {} suspended={} by {}", user_id, suspended, actor.user_id);
    Ok(user)
}

/// Mutations that remove `user` and detach it from manager links on both
/// sides. Users still on active projects are refused.
pub(crate) async fn removal_plan(store: &dyn Store, user: &User) -> AppResult<Vec<Mutation>> {
    if !user.active_projects.is_empty() {
        warn!("Refusing to delete user {} with active projects", user.id);
        return Err(AppError::StateConflict(format!(
            "user {} has {} active projects",
            user.id,
            user.active_projects.len()
        )));
    }

    let mut mutations = Vec::new();
    match user.role {
        Role::Client => {
            if let Some(client) = store.client_by_user(&user.id).await? {
                for manager in client.manager {
                    mutations.push(Mutation::RemoveManagedClient {
                        manager_user_id: manager,
                        client_user_id: user.id.clone(),
                    });
                }
            }
        }
        Role::ProjectManager => {
            if let Some(manager) = store.manager_by_user(&user.id).await? {
                for client_user_id in manager.clients {
                    if let Some(client) = store.client_by_user(&client_user_id).await? {
                        mutations.push(Mutation::SetClientManagers {
                            client_user_id,
                            managers: client.manager.into_iter().filter(|m| *m != user.id).collect(),
                        });
                    }
                }
            }
        }
        Role::Freelancer | Role::Admin => {}
    }
    mutations.push(Mutation::DeleteUser { user_id: user.id.clone() });
    Ok(mutations)
}

/// Removes a user and its profile. Users still taking part in a project
/// cannot be deleted.
pub async fn delete_user(store: &dyn Store, actor: &Actor, user_id: &str) -> AppResult<()> {
    ensure_admin(actor)?;
    let user = load_user(store, user_id).await?;
    store.apply(removal_plan(store, &user).await?).await?;
    info!("User {} deleted by {}", user_id, actor.user_id);
    Ok(())
}

#[derive(Debug, Deserialize)]
pub struct AssignManagersRequest {
    pub client_id: String,
    pub primary: String,
    pub secondary: Option<String>,
}

async fn ensure_manager(store: &dyn Store, user_id: &str) -> AppResult<()> {
    store
        .manager_by_user(user_id)
        .await?
        .map(|_| ())
        .ok_or(AppError::ProfileMissing(Role::ProjectManager))
}

/// Replaces the client's manager pair and updates every affected
/// manager's client list in one unit.
pub async fn assign_managers(
    store: &dyn Store,
    actor: &Actor,
    request: AssignManagersRequest,
) -> AppResult<ClientProfile> {
    ensure_admin(actor)?;
    if request.secondary.as_deref() == Some(request.primary.as_str()) {
        return Err(AppError::Validation(
            "primary and secondary manager must differ".to_string(),
        ));
    }
    let client = store
        .client_by_user(&request.client_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::Client))?;

    let mut managers = vec![request.primary.clone()];
    managers.extend(request.secondary.clone());
    for manager in &managers {
        ensure_manager(store, manager).await?;
    }

    let mut mutations = vec![Mutation::SetClientManagers {
        client_user_id: client.user_id.clone(),
        managers: managers.clone(),
    }];
    for previous in client.manager.iter().filter(|m| !managers.contains(m)) {
        mutations.push(Mutation::RemoveManagedClient {
            manager_user_id: previous.clone(),
            client_user_id: client.user_id.clone(),
        });
    }
    for manager in &managers {
        mutations.push(Mutation::AddManagedClient {
            manager_user_id: manager.clone(),
            client_user_id: client.user_id.clone(),
        });
    }
    store.apply(mutations).await?;
    info!("Client {} now managed by {:?}", client.user_id, managers);

    store
        .client_by_user(&client.user_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::Client))
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub role: Option<Role>,
    pub admin_verified: Option<bool>,
}

/// GET /admin/users?role=&admin_verified=
pub async fn list_users_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    query: web::Query<UserListQuery>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let filter = UserFilter {
        role: query.role,
        admin_verified: query.admin_verified,
    };
    let users = list_users(data.store.as_ref(), &actor, filter).await?;
    Ok(HttpResponse::Ok().json(users))
}

/// POST /admin/users/{user_id}/approve
pub async fn approve_user_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let user = approve_user(data.store.as_ref(), &actor, &user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /admin/users/{user_id}/suspend
pub async fn suspend_user_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let user = set_suspended(data.store.as_ref(), &actor, &user_id, true).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /admin/users/{user_id}/unsuspend
pub async fn unsuspend_user_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let user = set_suspended(data.store.as_ref(), &actor, &user_id, false).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// DELETE /admin/users/{user_id}
pub async fn delete_user_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    delete_user(data.store.as_ref(), &actor, &user_id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// POST /admin/managers
pub async fn assign_managers_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AssignManagersRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let client = assign_managers(data.store.as_ref(), &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Ok().json(client))
}
