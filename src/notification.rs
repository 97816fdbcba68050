use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::info;
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::error::{AppError, AppResult};
use crate::models::{Notification, Role};
use crate::store::{Mutation, Store};

#[derive(Debug, Deserialize)]
pub struct CreateNotificationRequest {
    pub title: String,
    pub body: String,
    /// Omit to address every role.
    pub target_role: Option<Role>,
}

pub async fn create_notification(
    store: &dyn Store,
    actor: &Actor,
    request: CreateNotificationRequest,
) -> AppResult<Notification> {
    access::ensure(actor, Action::Administer, Resource::None)?;
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(AppError::Validation("title and body are required".to_string()));
    }
    let notification = Notification {
        id: Uuid::new_v4().to_string(),
        title: request.title.trim().to_string(),
        body: request.body.trim().to_string(),
        target_role: request.target_role,
        created_by: actor.user_id.clone(),
        created_at: Utc::now(),
    };
    store
        .apply(vec![Mutation::InsertNotification(notification.clone())])
        .await?;
    info!("Notification {} published for {:?}", notification.id, notification.target_role);
    Ok(notification)
}

pub async fn notifications_for(store: &dyn Store, actor: &Actor) -> AppResult<Vec<Notification>> {
    store.notifications_for(actor.role).await
}

/// POST /notifications
pub async fn create_notification_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateNotificationRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let notification = create_notification(data.store.as_ref(), &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(notification))
}

/// GET /notifications
pub async fn list_notifications_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let notifications = notifications_for(data.store.as_ref(), &actor).await?;
    Ok(HttpResponse::Ok().json(notifications))
}
