use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use bcrypt::{hash, DEFAULT_COST};
use chrono::Utc;
use log::{debug, error, info};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::error::{AppError, AppResult};
use crate::mailer::Mailer;
use crate::models::{
    ClientProfile, FreelancerProfile, ManagerProfile, Role, User, UserSummary,
};
use crate::store::{Mutation, Store, UserFlags};

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub username: String,
    pub name: String,
    pub email: String,
    pub password: String,
    pub role: Role,
    pub company: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
}

fn validate_registration(request: &RegisterRequest) -> AppResult<()> {
    if request.role == Role::Admin {
        return Err(AppError::Permission("admin accounts cannot self-register".to_string()));
    }
    if request.username.trim().is_empty() || request.name.trim().is_empty() {
        return Err(AppError::Validation("username and name are required".to_string()));
    }
    let email = request.email.trim();
    if !email.contains('@') || email.starts_with('@') || email.ends_with('@') {
        return Err(AppError::Validation(format!("'{}' is not an email address", email)));
    }
    if request.password.len() < 8 {
        return Err(AppError::Validation("password needs at least 8 characters".to_string()));
    }
    Ok(())
}

/// Creates the user and its role profile in one unit, then hands the
/// verification token to the mailer. A mail failure is logged and the
/// account kept; `resend_verification` retries it.
pub async fn register(
    store: &dyn Store,
    mailer: &dyn Mailer,
    request: RegisterRequest,
) -> AppResult<UserSummary> {
    validate_registration(&request)?;
    let email = request.email.trim().to_lowercase();
    if store.user_by_email(&email).await?.is_some() {
        return Err(AppError::StateConflict(format!("email {} is already registered", email)));
    }

    let password = request.password.clone();
    let hashed_password = tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST)).await??;

    let token = Uuid::new_v4().simple().to_string();
    let user = User {
        id: Uuid::new_v4().to_string(),
        username: request.username.trim().to_string(),
        name: request.name.trim().to_string(),
        email,
        hashed_password,
        role: request.role,
        verified: false,
        admin_verified: false,
        is_suspended: false,
        verification_token: Some(token.clone()),
        active_projects: Vec::new(),
        total_projects: 0,
        created_at: Utc::now(),
    };
    let profile = match user.role {
        Role::Client => Mutation::InsertClient(ClientProfile {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            credits: 0,
            company: request.company,
            manager: Vec::new(),
            transactions: Vec::new(),
        }),
        Role::Freelancer => Mutation::InsertFreelancer(FreelancerProfile {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            name: user.name.clone(),
            credits: 0,
            skills: request
                .skills
                .iter()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect(),
            transactions: Vec::new(),
        }),
        Role::ProjectManager => Mutation::InsertManager(ManagerProfile {
            id: Uuid::new_v4().to_string(),
            user_id: user.id.clone(),
            clients: Vec::new(),
        }),
        Role::Admin => {
            return Err(AppError::Permission("admin accounts cannot self-register".to_string()))
        }
    };

    store
        .apply(vec![Mutation::InsertUser(user.clone()), profile])
        .await?;
    info!("Registered {} {} ({})", user.role, user.id, user.email);
    if let Err(e) = mailer.send_verification(&user.email, &token).await {
        error!("Verification mail to {} failed: {}", user.email, e);
    }
    Ok(UserSummary::from(&user))
}

/// Sends the pending verification token again.
pub async fn resend_verification(store: &dyn Store, mailer: &dyn Mailer, email: &str) -> AppResult<()> {
    let email = email.trim().to_lowercase();
    let user = store
        .user_by_email(&email)
        .await?
        .ok_or_else(|| AppError::not_found("user", &email))?;
    let token = match (&user.verification_token, user.verified) {
        (Some(token), false) => token,
        _ => return Err(AppError::StateConflict(format!("{} is already verified", email))),
    };
    mailer.send_verification(&user.email, token).await?;
    info!("Verification mail resent to {}", user.email);
    Ok(())
}

pub async fn verify_email(store: &dyn Store, token: &str) -> AppResult<UserSummary> {
    let user = store
        .user_by_verification_token(token)
        .await?
        .ok_or_else(|| AppError::not_found("verification token", token))?;
    store
        .apply(vec![Mutation::UpdateUserFlags {
            user_id: user.id.clone(),
            flags: UserFlags {
                verified: Some(true),
                ..Default::default()
            },
        }])
        .await?;
    info!("Email verified for user {}", user.id);
    let user = store
        .user(&user.id)
        .await?
        .ok_or_else(|| AppError::not_found("user", &user.id))?;
    Ok(UserSummary::from(&user))
}

pub async fn get_user(store: &dyn Store, user_id: &str) -> AppResult<UserSummary> {
    store
        .user(user_id)
        .await?
        .map(|u| UserSummary::from(&u))
        .ok_or_else(|| AppError::not_found("user", user_id))
}

/// A freelancer with the number of their skills named by the query.
#[derive(Debug, Serialize)]
pub struct RankedFreelancer {
    #[serde(flatten)]
    pub freelancer: FreelancerProfile,
    pub score: usize,
}

fn normalize(skill: &str) -> String {
    skill.trim().to_lowercase()
}

/// Ranks freelancers by how many of their skills appear in the query.
/// Both sides are trimmed and lower-cased before comparing.
pub fn rank_freelancers(query: &[String], freelancers: Vec<FreelancerProfile>) -> Vec<RankedFreelancer> {
    let wanted: HashSet<String> = query.iter().map(|q| normalize(q)).collect();
    let mut ranked: Vec<RankedFreelancer> = freelancers
        .into_iter()
        .map(|freelancer| {
            let score = freelancer
                .skills
                .iter()
                .filter(|s| wanted.contains(&normalize(s)))
                .count();
            RankedFreelancer { freelancer, score }
        })
        .collect();
    ranked.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.freelancer.name.cmp(&b.freelancer.name))
    });
    ranked
}

pub async fn search_skills(
    store: &dyn Store,
    actor: &Actor,
    query: &[String],
) -> AppResult<Vec<RankedFreelancer>> {
    access::ensure(actor, Action::SearchFreelancers, Resource::None)?;
    let mut needles: Vec<String> = query
        .iter()
        .map(|q| normalize(q))
        .filter(|q| !q.is_empty())
        .collect();
    needles.sort();
    needles.dedup();
    if needles.is_empty() {
        return Err(AppError::Validation("at least one skill is required".to_string()));
    }
    let matches = store.freelancers_with_skills(&needles).await?;
    debug!("Skill search {:?} matched {} freelancers", needles, matches.len());
    Ok(rank_freelancers(&needles, matches))
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct VerifyQuery {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResendRequest {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct SkillQuery {
    pub skills: Vec<String>,
}

/// POST /auth/register
pub async fn register_handler(
    data: web::Data<AppState>,
    payload: web::Json<RegisterRequest>,
) -> AppResult<HttpResponse> {
    debug!("Received register request for {}", payload.email);
    let user = register(data.store.as_ref(), data.mailer.as_ref(), payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(user))
}

/// POST /auth/resend
pub async fn resend_verification_handler(
    data: web::Data<AppState>,
    payload: web::Json<ResendRequest>,
) -> AppResult<HttpResponse> {
    resend_verification(data.store.as_ref(), data.mailer.as_ref(), &payload.email).await?;
    Ok(HttpResponse::Accepted().finish())
}

/// GET /auth/verify?token=
pub async fn verify_email_handler(
    data: web::Data<AppState>,
    query: web::Query<VerifyQuery>,
) -> AppResult<HttpResponse> {
    let user = verify_email(data.store.as_ref(), &query.token).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// GET /users/me
pub async fn me_handler(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let user = get_user(data.store.as_ref(), &actor.user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// GET /users/{user_id}
pub async fn get_user_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    user_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    current_actor(&req, data.store.as_ref()).await?;
    let user = get_user(data.store.as_ref(), &user_id).await?;
    Ok(HttpResponse::Ok().json(user))
}

/// POST /freelancers/search
pub async fn search_skills_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SkillQuery>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let ranked = search_skills(data.store.as_ref(), &actor, &payload.skills).await?;
    Ok(HttpResponse::Ok().json(ranked))
}
