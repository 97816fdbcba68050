// src/project.rs
//
// Project lifecycle: creation by a client, review by a project manager and
// completion with credit settlement. Every transition is committed as one
// unit through `Store::apply`.

use std::collections::HashSet;

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ProfileRef, Project, ProjectStatus, Proposal, Role, Transaction, TransactionType,
};
use crate::store::{Mutation, ProjectFilter, Store};

#[derive(Debug, Deserialize)]
pub struct CreateProjectRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub skills: Option<Vec<String>>,
    pub budget: Option<i64>,
    pub deadline: Option<DateTime<Utc>>,
}

/// Share of the budget paid to one assigned freelancer on completion.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Payout {
    pub freelancer_id: String,
    pub amount: i64,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompleteProjectRequest {
    #[serde(default)]
    pub payouts: Vec<Payout>,
}

#[derive(Debug, Serialize)]
pub struct PayoutReceipt {
    pub freelancer_id: String,
    pub profile_id: String,
    pub amount: i64,
    pub transaction_id: String,
}

/// Outcome of a completion, listing every ledger entry it produced.
#[derive(Debug, Serialize)]
pub struct CompletionReport {
    pub project: Project,
    pub client_debit: Option<String>,
    pub payouts: Vec<PayoutReceipt>,
}

/// A project joined with its proposals, read from the proposal store.
#[derive(Debug, Serialize)]
pub struct ProjectDetail {
    #[serde(flatten)]
    pub project: Project,
    pub proposals: Vec<Proposal>,
}

fn required<T>(value: Option<T>, field: &str) -> AppResult<T> {
    value.ok_or_else(|| AppError::Validation(format!("{} is required", field)))
}

fn required_text(value: Option<String>, field: &str) -> AppResult<String> {
    let value = required(value, field)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::Validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

pub(crate) async fn load_project(store: &dyn Store, project_id: &str) -> AppResult<Project> {
    store
        .project(project_id)
        .await?
        .ok_or_else(|| AppError::not_found("project", project_id))
}

pub fn settlement_reference(project_id: &str, party: &str) -> String {
    format!("settle:{}:{}", project_id, party)
}

/// Inserts an `unapproved` project. The budget is checked against the
/// client's balance but not reserved.
pub async fn create_project(
    store: &dyn Store,
    actor: &Actor,
    request: CreateProjectRequest,
) -> AppResult<Project> {
    access::ensure(actor, Action::CreateProject, Resource::None)?;

    let title = required_text(request.title, "title")?;
    let description = required_text(request.description, "description")?;
    let skills: Vec<String> = required(request.skills, "skills")?
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    if skills.is_empty() {
        return Err(AppError::Validation("skills is required".to_string()));
    }
    let budget = required(request.budget, "budget")?;
    if budget <= 0 {
        return Err(AppError::Validation("budget must be greater than zero".to_string()));
    }
    let deadline = required(request.deadline, "deadline")?;

    let client = store
        .client_by_user(&actor.user_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::Client))?;
    if client.credits < budget {
        return Err(AppError::InsufficientCredits {
            balance: client.credits,
            required: budget,
        });
    }
    let user = store
        .user(&actor.user_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", &actor.user_id))?;

    let project = Project {
        id: Uuid::new_v4().to_string(),
        title,
        description,
        skills,
        budget,
        deadline,
        client: actor.user_id.clone(),
        client_name: user.name,
        assigned_manager: None,
        status: ProjectStatus::Unapproved,
        freelancers: Vec::new(),
        created_at: Utc::now(),
    };
    store.apply(vec![Mutation::InsertProject(project.clone())]).await?;
    info!("Project {} created by client {}", project.id, actor.user_id);
    Ok(project)
}

/// Unapproved projects from the clients assigned to the calling manager.
pub async fn unapproved_projects(store: &dyn Store, actor: &Actor) -> AppResult<Vec<Project>> {
    access::ensure(actor, Action::ReviewProjects, Resource::None)?;
    let manager = store
        .manager_by_user(&actor.user_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::ProjectManager))?;
    store
        .projects(&ProjectFilter {
            status: Some(ProjectStatus::Unapproved),
            clients: Some(manager.clients),
            ..Default::default()
        })
        .await
}

async fn reviewed_project(store: &dyn Store, actor: &Actor, project_id: &str) -> AppResult<Project> {
    access::ensure(actor, Action::ReviewProjects, Resource::None)?;
    let manager = store
        .manager_by_user(&actor.user_id)
        .await?
        .ok_or(AppError::ProfileMissing(Role::ProjectManager))?;
    let project = load_project(store, project_id).await?;
    access::ensure(actor, Action::DecideProject, Resource::ReviewedProject(&project, &manager))?;
    if project.status != ProjectStatus::Unapproved {
        warn!("Review of project {} refused: status {}", project.id, project.status);
        return Err(AppError::StateConflict(format!(
            "project {} is {}, only unapproved projects can be reviewed",
            project.id, project.status
        )));
    }
    Ok(project)
}

/// Opens the project, assigns the calling manager and creates the
/// project's group chat.
pub async fn accept_project(store: &dyn Store, actor: &Actor, project_id: &str) -> AppResult<Project> {
    let project = reviewed_project(store, actor, project_id).await?;

    let group_chat = Chat {
        id: Uuid::new_v4().to_string(),
        chat_name: project.title.clone(),
        is_group_chat: true,
        users: vec![project.client.clone(), actor.user_id.clone()],
        group_admin: Some(actor.user_id.clone()),
        project_id: Some(project.id.clone()),
        created_at: Utc::now(),
    };
    store
        .apply(vec![
            Mutation::TransitionProject {
                project_id: project.id.clone(),
                from: vec![ProjectStatus::Unapproved],
                to: ProjectStatus::Open,
            },
            Mutation::AssignProjectManager {
                project_id: project.id.clone(),
                manager_id: actor.user_id.clone(),
            },
            Mutation::AddActiveProject {
                user_id: project.client.clone(),
                project_id: project.id.clone(),
            },
            Mutation::AddActiveProject {
                user_id: actor.user_id.clone(),
                project_id: project.id.clone(),
            },
            Mutation::InsertChat(group_chat),
        ])
        .await?;
    info!("Project {} accepted by manager {}", project.id, actor.user_id);
    load_project(store, project_id).await
}

pub async fn reject_project(store: &dyn Store, actor: &Actor, project_id: &str) -> AppResult<Project> {
    let project = reviewed_project(store, actor, project_id).await?;
    store
        .apply(vec![Mutation::TransitionProject {
            project_id: project.id.clone(),
            from: vec![ProjectStatus::Unapproved],
            to: ProjectStatus::Rejected,
        }])
        .await?;
    info!("Project {} rejected by manager {}", project.id, actor.user_id);
    load_project(store, project_id).await
}

pub async fn project_detail(store: &dyn Store, actor: &Actor, project_id: &str) -> AppResult<ProjectDetail> {
    let project = load_project(store, project_id).await?;
    access::ensure(actor, Action::ViewProject, Resource::Project(&project))?;
    let proposals = store.proposals_for_project(project_id).await?;
    Ok(ProjectDetail { project, proposals })
}

/// Projects the caller takes part in, according to their role.
pub async fn projects_for_user(store: &dyn Store, actor: &Actor) -> AppResult<Vec<Project>> {
    let filter = match actor.role {
        Role::Client => ProjectFilter {
            clients: Some(vec![actor.user_id.clone()]),
            ..Default::default()
        },
        Role::ProjectManager => ProjectFilter {
            assigned_manager: Some(actor.user_id.clone()),
            ..Default::default()
        },
        Role::Freelancer => ProjectFilter {
            freelancer: Some(actor.user_id.clone()),
            ..Default::default()
        },
        Role::Admin => ProjectFilter::default(),
    };
    store.projects(&filter).await
}

fn validate_payouts(project: &Project, payouts: &[Payout]) -> AppResult<()> {
    if project.freelancers.is_empty() {
        if !payouts.is_empty() {
            return Err(AppError::Validation(
                "project has no freelancers to pay".to_string(),
            ));
        }
        return Ok(());
    }

    let assigned: HashSet<&str> = project
        .freelancers
        .iter()
        .map(|f| f.freelancer_id.as_str())
        .collect();
    let mut seen = HashSet::new();
    for payout in payouts {
        if payout.amount <= 0 {
            return Err(AppError::Validation(format!(
                "payout to {} must be greater than zero",
                payout.freelancer_id
            )));
        }
        if !assigned.contains(payout.freelancer_id.as_str()) {
            return Err(AppError::Validation(format!(
                "{} is not assigned to this project",
                payout.freelancer_id
            )));
        }
        if !seen.insert(payout.freelancer_id.as_str()) {
            return Err(AppError::Validation(format!(
                "{} appears twice in the payout split",
                payout.freelancer_id
            )));
        }
    }
    if seen.len() != assigned.len() {
        return Err(AppError::Validation(
            "every assigned freelancer needs a payout".to_string(),
        ));
    }
    let total = payouts
        .iter()
        .try_fold(0i64, |acc, p| acc.checked_add(p.amount))
        .ok_or_else(|| AppError::Validation("payout split overflows".to_string()))?;
    if total != project.budget {
        return Err(AppError::Validation(format!(
            "payouts sum to {}, budget is {}",
            total, project.budget
        )));
    }
    Ok(())
}

/// Completes the project and settles its budget in one unit: the status
/// change, participant counters, the client debit and one credit per
/// freelancer either all commit or none do.
pub async fn complete_project(
    store: &dyn Store,
    actor: &Actor,
    project_id: &str,
    payouts: Vec<Payout>,
) -> AppResult<CompletionReport> {
    let project = load_project(store, project_id).await?;
    access::ensure(actor, Action::CompleteProject, Resource::Project(&project))?;
    if !project.status.can_transition_to(ProjectStatus::Completed) {
        warn!("Completion of project {} refused: status {}", project.id, project.status);
        return Err(AppError::StateConflict(format!(
            "project {} is {} and cannot be completed",
            project.id, project.status
        )));
    }
    validate_payouts(&project, &payouts)?;

    let mut mutations = vec![Mutation::TransitionProject {
        project_id: project.id.clone(),
        from: vec![ProjectStatus::Open, ProjectStatus::Ongoing],
        to: ProjectStatus::Completed,
    }];
    for user_id in project.participants() {
        mutations.push(Mutation::CloseActiveProject {
            user_id,
            project_id: project.id.clone(),
        });
    }

    let mut client_debit = None;
    let mut receipts = Vec::with_capacity(payouts.len());
    if !payouts.is_empty() {
        let client = store
            .client_by_user(&project.client)
            .await?
            .ok_or(AppError::ProfileMissing(Role::Client))?;
        let client_ref = ProfileRef::client(&client.id);
        let debit_ref = settlement_reference(&project.id, &client.id);
        mutations.push(Mutation::AdjustCredits {
            owner: client_ref.clone(),
            delta: -project.budget,
        });
        mutations.push(Mutation::AppendTransaction(Transaction::new(
            debit_ref.clone(),
            &client_ref,
            TransactionType::Debit,
            project.budget,
            Some(project.id.clone()),
        )));
        client_debit = Some(debit_ref);

        for payout in &payouts {
            let freelancer = store
                .freelancer_by_user(&payout.freelancer_id)
                .await?
                .ok_or(AppError::ProfileMissing(Role::Freelancer))?;
            let owner = ProfileRef::freelancer(&freelancer.id);
            let reference = settlement_reference(&project.id, &freelancer.id);
            mutations.push(Mutation::AdjustCredits {
                owner: owner.clone(),
                delta: payout.amount,
            });
            mutations.push(Mutation::AppendTransaction(Transaction::new(
                reference.clone(),
                &owner,
                TransactionType::Credit,
                payout.amount,
                Some(project.id.clone()),
            )));
            receipts.push(PayoutReceipt {
                freelancer_id: payout.freelancer_id.clone(),
                profile_id: freelancer.id,
                amount: payout.amount,
                transaction_id: reference,
            });
        }
    }

    store.apply(mutations).await?;
    info!(
        "Project {} completed by {}; {} freelancer payouts settled",
        project.id,
        actor.user_id,
        receipts.len()
    );
    Ok(CompletionReport {
        project: load_project(store, project_id).await?,
        client_debit,
        payouts: receipts,
    })
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

/// POST /projects
pub async fn create_project_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<CreateProjectRequest>,
) -> AppResult<HttpResponse> {
    debug!("Received create_project request: {:?}", payload);
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let project = create_project(data.store.as_ref(), &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(project))
}

/// GET /projects
pub async fn list_projects(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let projects = projects_for_user(data.store.as_ref(), &actor).await?;
    Ok(HttpResponse::Ok().json(projects))
}

/// GET /projects/unapproved
pub async fn list_unapproved(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let projects = unapproved_projects(data.store.as_ref(), &actor).await?;
    Ok(HttpResponse::Ok().json(projects))
}

/// GET /projects/{project_id}
pub async fn get_project(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let detail = project_detail(data.store.as_ref(), &actor, &project_id).await?;
    Ok(HttpResponse::Ok().json(detail))
}

/// POST /projects/{project_id}/accept
pub async fn accept_project_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let project = accept_project(data.store.as_ref(), &actor, &project_id).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// POST /projects/{project_id}/reject
pub async fn reject_project_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let project = reject_project(data.store.as_ref(), &actor, &project_id).await?;
    Ok(HttpResponse::Ok().json(project))
}

/// POST /projects/{project_id}/complete
pub async fn complete_project_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
    payload: Option<web::Json<CompleteProjectRequest>>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let payouts = payload.map(|p| p.into_inner().payouts).unwrap_or_default();
    let report = complete_project(data.store.as_ref(), &actor, &project_id, payouts).await?;
    Ok(HttpResponse::Ok().json(report))
}
