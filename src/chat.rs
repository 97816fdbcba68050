// File: chat.rs
//
// Direct and group chats, messages and link moderation. Messages are
// persisted first and then published through the relay.

use std::sync::LazyLock;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::Utc;
use log::{debug, info};
use regex::Regex;
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::chat_server::{Relay, RelayEvent};
use crate::error::{AppError, AppResult};
use crate::models::{Chat, Message, MessageStatus, Role};
use crate::store::{Mutation, Store};

static LINK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)\b(?:https?://|www\.)\S+|\b[a-z0-9][a-z0-9-]*\.(?:com|net|org|io|in|co|me|dev|app|xyz|link|ly)\b",
    )
    .expect("link pattern compiles")
});

/// Whether the text carries something that looks like a URL.
pub fn contains_link(content: &str) -> bool {
    LINK_PATTERN.is_match(content)
}

/// Stable id of the direct chat between two users, whichever side opens it.
pub fn direct_chat_id(a: &str, b: &str) -> String {
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    Uuid::new_v5(&Uuid::NAMESPACE_OID, format!("direct:{}:{}", first, second).as_bytes()).to_string()
}

async fn load_chat(store: &dyn Store, chat_id: &str) -> AppResult<Chat> {
    store
        .chat(chat_id)
        .await?
        .ok_or_else(|| AppError::not_found("chat", chat_id))
}

async fn member_chat(store: &dyn Store, actor: &Actor, chat_id: &str) -> AppResult<Chat> {
    let chat = load_chat(store, chat_id).await?;
    if !chat.has_member(&actor.user_id) {
        return Err(AppError::Permission(format!(
            "user {} is not a member of chat {}",
            actor.user_id, chat_id
        )));
    }
    Ok(chat)
}

/// Fetches the direct chat with `other_user_id`, creating it on first use.
pub async fn access_chat(store: &dyn Store, actor: &Actor, other_user_id: &str) -> AppResult<Chat> {
    if other_user_id == actor.user_id {
        return Err(AppError::Validation("cannot open a chat with yourself".to_string()));
    }
    let other = store
        .user(other_user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", other_user_id))?;

    let chat_id = direct_chat_id(&actor.user_id, &other.id);
    if let Some(chat) = store.chat(&chat_id).await? {
        return Ok(chat);
    }
    let chat = Chat {
        id: chat_id.clone(),
        chat_name: other.name,
        is_group_chat: false,
        users: vec![actor.user_id.clone(), other.id],
        group_admin: None,
        project_id: None,
        created_at: Utc::now(),
    };
    if let Err(e) = store.apply(vec![Mutation::InsertChat(chat.clone())]).await {
        // Lost a race with the other participant opening the same chat.
        return match store.chat(&chat_id).await? {
            Some(existing) => Ok(existing),
            None => Err(e),
        };
    }
    info!("Direct chat {} opened by {}", chat.id, actor.user_id);
    Ok(chat)
}

pub async fn fetch_chats(store: &dyn Store, actor: &Actor) -> AppResult<Vec<Chat>> {
    store.chats_for_user(&actor.user_id).await
}

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    pub users: Vec<String>,
}

/// Creates a group chat administered by the caller. Needs at least two
/// other members.
pub async fn create_group_chat(
    store: &dyn Store,
    actor: &Actor,
    request: CreateGroupRequest,
) -> AppResult<Chat> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("group name is required".to_string()));
    }
    let mut users = vec![actor.user_id.clone()];
    for user_id in request.users {
        if users.contains(&user_id) {
            continue;
        }
        if store.user(&user_id).await?.is_none() {
            return Err(AppError::not_found("user", &user_id));
        }
        users.push(user_id);
    }
    if users.len() < 3 {
        return Err(AppError::Validation(
            "a group chat needs at least two other members".to_string(),
        ));
    }

    let chat = Chat {
        id: Uuid::new_v4().to_string(),
        chat_name: name.to_string(),
        is_group_chat: true,
        users,
        group_admin: Some(actor.user_id.clone()),
        project_id: None,
        created_at: Utc::now(),
    };
    store.apply(vec![Mutation::InsertChat(chat.clone())]).await?;
    info!("Group chat {} created by {}", chat.id, actor.user_id);
    Ok(chat)
}

pub async fn rename_group(store: &dyn Store, actor: &Actor, chat_id: &str, name: &str) -> AppResult<Chat> {
    let chat = load_chat(store, chat_id).await?;
    access::ensure(actor, Action::ManageGroup, Resource::Chat(&chat))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::Validation("group name is required".to_string()));
    }
    store
        .apply(vec![Mutation::RenameChat {
            chat_id: chat.id.clone(),
            name: name.to_string(),
        }])
        .await?;
    load_chat(store, chat_id).await
}

pub async fn add_to_group(store: &dyn Store, actor: &Actor, chat_id: &str, user_id: &str) -> AppResult<Chat> {
    let chat = load_chat(store, chat_id).await?;
    access::ensure(actor, Action::ManageGroup, Resource::Chat(&chat))?;
    if store.user(user_id).await?.is_none() {
        return Err(AppError::not_found("user", user_id));
    }
    store
        .apply(vec![Mutation::AddChatMember {
            chat_id: chat.id.clone(),
            user_id: user_id.to_string(),
        }])
        .await?;
    load_chat(store, chat_id).await
}

/// Removes a member and drops their live subscriptions to the chat.
/// Participants of the chat's project stay in its group chat.
pub async fn remove_from_group(
    store: &dyn Store,
    relay: &dyn Relay,
    actor: &Actor,
    chat_id: &str,
    user_id: &str,
) -> AppResult<Chat> {
    let chat = load_chat(store, chat_id).await?;
    access::ensure(actor, Action::ManageGroup, Resource::Chat(&chat))?;
    if chat.group_admin.as_deref() == Some(user_id) {
        return Err(AppError::Validation("the group admin cannot be removed".to_string()));
    }
    if !chat.has_member(user_id) {
        return Err(AppError::not_found("chat member", user_id));
    }
    if let Some(project_id) = &chat.project_id {
        if let Some(project) = store.project(project_id).await? {
            if project.participants().iter().any(|p| p == user_id) {
                return Err(AppError::Validation(format!(
                    "{} takes part in project {} and stays in its chat",
                    user_id, project.id
                )));
            }
        }
    }
    store
        .apply(vec![Mutation::RemoveChatMember {
            chat_id: chat.id.clone(),
            user_id: user_id.to_string(),
        }])
        .await?;
    relay.evict(&chat.id, user_id);
    info!("User {} removed from chat {} by {}", user_id, chat.id, actor.user_id);
    load_chat(store, chat_id).await
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub chat_id: String,
    #[serde(default)]
    pub content: String,
    pub media: Option<String>,
}

/// Stores a message from a chat member. Messages carrying a link are held
/// as `pending` and only announced, without content, until moderated.
pub async fn send_message(
    store: &dyn Store,
    relay: &dyn Relay,
    actor: &Actor,
    request: SendMessageRequest,
) -> AppResult<Message> {
    let chat = member_chat(store, actor, &request.chat_id).await?;
    let content = request.content.trim().to_string();
    if content.is_empty() && request.media.is_none() {
        return Err(AppError::Validation("message is empty".to_string()));
    }
    let status = if contains_link(&content) {
        MessageStatus::Pending
    } else {
        MessageStatus::Approved
    };

    let message = Message {
        id: Uuid::new_v4().to_string(),
        sender: actor.user_id.clone(),
        chat: chat.id.clone(),
        content,
        status,
        media: request.media,
        created_at: Utc::now(),
    };
    store.apply(vec![Mutation::InsertMessage(message.clone())]).await?;

    match status {
        MessageStatus::Approved => relay.publish(&chat.id, RelayEvent::Message(message.clone())),
        MessageStatus::Pending => {
            debug!("Message {} held for link moderation", message.id);
            let moderators = moderation_audience(store, &chat).await?;
            relay.publish_to(
                &chat.id,
                &moderators,
                RelayEvent::PendingLink {
                    message_id: message.id.clone(),
                    chat_id: chat.id.clone(),
                },
            );
        }
    }
    Ok(message)
}

/// Members of the chat who may moderate its links.
async fn moderation_audience(store: &dyn Store, chat: &Chat) -> AppResult<Vec<String>> {
    let mut moderators = Vec::new();
    for member in &chat.users {
        if let Some(user) = store.user(member).await? {
            if matches!(user.role, Role::ProjectManager | Role::Admin) {
                moderators.push(user.id);
            }
        }
    }
    Ok(moderators)
}

/// Approved messages of a chat, oldest first.
pub async fn all_messages(store: &dyn Store, actor: &Actor, chat_id: &str) -> AppResult<Vec<Message>> {
    let chat = member_chat(store, actor, chat_id).await?;
    store.messages(&chat.id, MessageStatus::Approved).await
}

/// Link messages awaiting moderation in a chat.
pub async fn view_links(store: &dyn Store, actor: &Actor, chat_id: &str) -> AppResult<Vec<Message>> {
    let chat = load_chat(store, chat_id).await?;
    access::ensure(actor, Action::ModerateLinks, Resource::Chat(&chat))?;
    store.messages(&chat.id, MessageStatus::Pending).await
}

async fn moderated_message(store: &dyn Store, actor: &Actor, message_id: &str) -> AppResult<Message> {
    let message = store
        .message(message_id)
        .await?
        .ok_or_else(|| AppError::not_found("message", message_id))?;
    let chat = load_chat(store, &message.chat).await?;
    access::ensure(actor, Action::ModerateLinks, Resource::Chat(&chat))?;
    if message.status != MessageStatus::Pending {
        return Err(AppError::StateConflict(format!(
            "message {} is not awaiting moderation",
            message_id
        )));
    }
    Ok(message)
}

pub async fn approve_link(
    store: &dyn Store,
    relay: &dyn Relay,
    actor: &Actor,
    message_id: &str,
) -> AppResult<Message> {
    let mut message = moderated_message(store, actor, message_id).await?;
    store
        .apply(vec![Mutation::ApproveMessage { message_id: message.id.clone() }])
        .await?;
    message.status = MessageStatus::Approved;
    info!("Link message {} approved by {}", message.id, actor.user_id);
    relay.publish(&message.chat, RelayEvent::LinkApproved(message.clone()));
    Ok(message)
}

pub async fn discard_link(
    store: &dyn Store,
    relay: &dyn Relay,
    actor: &Actor,
    message_id: &str,
) -> AppResult<()> {
    let message = moderated_message(store, actor, message_id).await?;
    store
        .apply(vec![Mutation::DiscardMessage { message_id: message.id.clone() }])
        .await?;
    info!("Link message {} discarded by {}", message.id, actor.user_id);
    relay.publish(
        &message.chat,
        RelayEvent::LinkDiscarded {
            message_id: message.id,
            chat_id: message.chat.clone(),
        },
    );
    Ok(())
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct AccessChatRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct RenameRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct MemberRequest {
    pub user_id: String,
}

/// POST /chats
pub async fn access_chat_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<AccessChatRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let chat = access_chat(data.store.as_ref(), &actor, &payload.user_id).await?;
    Ok(HttpResponse::Ok().json(chat))
}

/// GET /chats
pub async fn fetch_chats_handler(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let chats = fetch_chats(data.store.as_ref(), &actor).await?;
    Ok(HttpResponse::Ok().json(chats))
}

/// POST /chats/group
pub async fn create_group_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateGroupRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let chat = create_group_chat(data.store.as_ref(), &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(chat))
}

/// PUT /chats/{chat_id}/name
pub async fn rename_group_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    chat_id: web::Path<String>,
    payload: web::Json<RenameRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let chat = rename_group(data.store.as_ref(), &actor, &chat_id, &payload.name).await?;
    Ok(HttpResponse::Ok().json(chat))
}

/// POST /chats/{chat_id}/members
pub async fn add_member_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    chat_id: web::Path<String>,
    payload: web::Json<MemberRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let chat = add_to_group(data.store.as_ref(), &actor, &chat_id, &payload.user_id).await?;
    Ok(HttpResponse::Ok().json(chat))
}

/// DELETE /chats/{chat_id}/members/{user_id}
pub async fn remove_member_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    path: web::Path<(String, String)>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let (chat_id, user_id) = path.into_inner();
    let chat = remove_from_group(data.store.as_ref(), data.relay.as_ref(), &actor, &chat_id, &user_id).await?;
    Ok(HttpResponse::Ok().json(chat))
}

/// POST /messages
pub async fn send_message_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SendMessageRequest>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let message = send_message(
        data.store.as_ref(),
        data.relay.as_ref(),
        &actor,
        payload.into_inner(),
    )
    .await?;
    Ok(HttpResponse::Created().json(message))
}

/// GET /messages/{chat_id}
pub async fn all_messages_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    chat_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let messages = all_messages(data.store.as_ref(), &actor, &chat_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// GET /messages/{chat_id}/links
pub async fn view_links_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    chat_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let messages = view_links(data.store.as_ref(), &actor, &chat_id).await?;
    Ok(HttpResponse::Ok().json(messages))
}

/// POST /messages/links/{message_id}/approve
pub async fn approve_link_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    message_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let message = approve_link(data.store.as_ref(), data.relay.as_ref(), &actor, &message_id).await?;
    Ok(HttpResponse::Ok().json(message))
}

/// DELETE /messages/links/{message_id}
pub async fn discard_link_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    message_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    discard_link(data.store.as_ref(), data.relay.as_ref(), &actor, &message_id).await?;
    Ok(HttpResponse::NoContent().finish())
}
