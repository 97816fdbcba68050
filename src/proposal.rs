// src/proposal.rs
//
// Proposals sent by a project's manager to freelancers, and the
// freelancer's answer. Accepting joins the freelancer to the project and
// its group chat in the same unit.

use actix_web::{web, HttpRequest, HttpResponse};
use chrono::{DateTime, Utc};
use log::{debug, info, warn};
use serde::Deserialize;
use uuid::Uuid;

use crate::access::{self, Action, Resource};
use crate::app_state::AppState;
use crate::auth::{current_actor, Actor};
use crate::error::{AppError, AppResult};
use crate::models::{FreelancerAssignment, ProjectStatus, Proposal, ProposalStatus, Role};
use crate::project::load_project;
use crate::store::{Mutation, Store};

#[derive(Debug, Deserialize)]
pub struct SendProposalRequest {
    pub project_id: Option<String>,
    pub freelancer_id: Option<String>,
    pub description: Option<String>,
    pub deadline: Option<DateTime<Utc>>,
    pub project_role: Option<String>,
}

fn text_field(value: Option<String>, field: &str) -> AppResult<String> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::Validation(format!("{} is required", field))),
    }
}

async fn load_proposal(store: &dyn Store, proposal_id: &str) -> AppResult<Proposal> {
    store
        .proposal(proposal_id)
        .await?
        .ok_or_else(|| AppError::not_found("proposal", proposal_id))
}

pub async fn send_proposal(
    store: &dyn Store,
    actor: &Actor,
    request: SendProposalRequest,
) -> AppResult<Proposal> {
    let project_id = text_field(request.project_id, "project_id")?;
    let freelancer_id = text_field(request.freelancer_id, "freelancer_id")?;
    let description = text_field(request.description, "description")?;
    let project_role = text_field(request.project_role, "project_role")?;
    let deadline = request
        .deadline
        .ok_or_else(|| AppError::Validation("deadline is required".to_string()))?;

    let project = load_project(store, &project_id).await?;
    access::ensure(actor, Action::SendProposal, Resource::Project(&project))?;
    if !matches!(project.status, ProjectStatus::Open | ProjectStatus::Ongoing) {
        return Err(AppError::StateConflict(format!(
            "project {} is {} and takes no proposals",
            project.id, project.status
        )));
    }

    let freelancer = store
        .user(&freelancer_id)
        .await?
        .ok_or_else(|| AppError::not_found("user", &freelancer_id))?;
    if freelancer.role != Role::Freelancer {
        return Err(AppError::Validation(format!(
            "user {} is not a freelancer",
            freelancer_id
        )));
    }
    if project.has_freelancer(&freelancer_id) {
        return Err(AppError::StateConflict(format!(
            "freelancer {} is already on project {}",
            freelancer_id, project.id
        )));
    }
    if store.proposal_for(&project.id, &freelancer_id).await?.is_some() {
        return Err(AppError::StateConflict(format!(
            "a proposal to {} for project {} already exists",
            freelancer_id, project.id
        )));
    }

    let proposal = Proposal {
        id: Uuid::new_v4().to_string(),
        project_name: project.title.clone(),
        project_id: project.id.clone(),
        freelancer_id,
        sent_by: actor.user_id.clone(),
        description,
        deadline,
        project_role,
        status: ProposalStatus::Unapproved,
        created_at: Utc::now(),
    };
    store.apply(vec![Mutation::InsertProposal(proposal.clone())]).await?;
    info!(
        "Proposal {} sent to freelancer {} for project {}",
        proposal.id, proposal.freelancer_id, proposal.project_id
    );
    Ok(proposal)
}

fn ensure_pending(proposal: &Proposal) -> AppResult<()> {
    if proposal.status.is_terminal() {
        warn!("Proposal {} already {}", proposal.id, proposal.status);
        return Err(AppError::StateConflict(format!(
            "proposal {} is already {}",
            proposal.id, proposal.status
        )));
    }
    Ok(())
}

/// Accepts the proposal, assigns the freelancer, adds them to the
/// project's group chat and moves an open project to ongoing.
pub async fn accept_proposal(store: &dyn Store, actor: &Actor, proposal_id: &str) -> AppResult<Proposal> {
    let proposal = load_proposal(store, proposal_id).await?;
    access::ensure(actor, Action::RespondProposal, Resource::Proposal(&proposal))?;
    ensure_pending(&proposal)?;

    let project = load_project(store, &proposal.project_id).await?;
    if !matches!(project.status, ProjectStatus::Open | ProjectStatus::Ongoing) {
        return Err(AppError::StateConflict(format!(
            "project {} is {}",
            project.id, project.status
        )));
    }
    if project.has_freelancer(&proposal.freelancer_id) {
        return Err(AppError::StateConflict(format!(
            "freelancer {} is already on project {}",
            proposal.freelancer_id, project.id
        )));
    }
    let group_chat = store
        .group_chat_for_project(&project.id)
        .await?
        .ok_or_else(|| AppError::not_found("group chat for project", &project.id))?;

    store
        .apply(vec![
            Mutation::TransitionProposal {
                proposal_id: proposal.id.clone(),
                from: ProposalStatus::Unapproved,
                to: ProposalStatus::Accepted,
            },
            // Guards against a completion racing this acceptance.
            Mutation::TransitionProject {
                project_id: project.id.clone(),
                from: vec![ProjectStatus::Open, ProjectStatus::Ongoing],
                to: ProjectStatus::Ongoing,
            },
            Mutation::AddProjectFreelancer {
                project_id: project.id.clone(),
                assignment: FreelancerAssignment {
                    freelancer_id: proposal.freelancer_id.clone(),
                    role: proposal.project_role.clone(),
                },
            },
            Mutation::AddActiveProject {
                user_id: proposal.freelancer_id.clone(),
                project_id: project.id.clone(),
            },
            Mutation::AddChatMember {
                chat_id: group_chat.id,
                user_id: proposal.freelancer_id.clone(),
            },
        ])
        .await?;
    info!(
        "Proposal {} accepted; freelancer {} joined project {}",
        proposal.id, proposal.freelancer_id, project.id
    );
    load_proposal(store, proposal_id).await
}

pub async fn reject_proposal(store: &dyn Store, actor: &Actor, proposal_id: &str) -> AppResult<Proposal> {
    let proposal = load_proposal(store, proposal_id).await?;
    access::ensure(actor, Action::RespondProposal, Resource::Proposal(&proposal))?;
    ensure_pending(&proposal)?;
    store
        .apply(vec![Mutation::TransitionProposal {
            proposal_id: proposal.id.clone(),
            from: ProposalStatus::Unapproved,
            to: ProposalStatus::Rejected,
        }])
        .await?;
    info!("Proposal {} rejected by {}", proposal.id, actor.user_id);
    load_proposal(store, proposal_id).await
}

/// The calling freelancer's proposals.
pub async fn proposals_for_freelancer(store: &dyn Store, actor: &Actor) -> AppResult<Vec<Proposal>> {
    if actor.role != Role::Freelancer {
        return Err(AppError::Permission(
            "only freelancers receive proposals".to_string(),
        ));
    }
    store.proposals_for_freelancer(&actor.user_id).await
}

pub async fn proposals_for_project(
    store: &dyn Store,
    actor: &Actor,
    project_id: &str,
) -> AppResult<Vec<Proposal>> {
    let project = load_project(store, project_id).await?;
    access::ensure(actor, Action::ViewProject, Resource::Project(&project))?;
    store.proposals_for_project(project_id).await
}

// ─── HANDLERS ─────────────────────────────────────────────────────────────────

/// POST /proposals
pub async fn send_proposal_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    payload: web::Json<SendProposalRequest>,
) -> AppResult<HttpResponse> {
    debug!("Received send_proposal request: {:?}", payload);
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let proposal = send_proposal(data.store.as_ref(), &actor, payload.into_inner()).await?;
    Ok(HttpResponse::Created().json(proposal))
}

/// GET /proposals
pub async fn my_proposals(req: HttpRequest, data: web::Data<AppState>) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let proposals = proposals_for_freelancer(data.store.as_ref(), &actor).await?;
    Ok(HttpResponse::Ok().json(proposals))
}

/// GET /projects/{project_id}/proposals
pub async fn project_proposals(
    req: HttpRequest,
    data: web::Data<AppState>,
    project_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let proposals = proposals_for_project(data.store.as_ref(), &actor, &project_id).await?;
    Ok(HttpResponse::Ok().json(proposals))
}

/// POST /proposals/{proposal_id}/accept
pub async fn accept_proposal_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    proposal_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let proposal = accept_proposal(data.store.as_ref(), &actor, &proposal_id).await?;
    Ok(HttpResponse::Ok().json(proposal))
}

/// POST /proposals/{proposal_id}/reject
pub async fn reject_proposal_handler(
    req: HttpRequest,
    data: web::Data<AppState>,
    proposal_id: web::Path<String>,
) -> AppResult<HttpResponse> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let proposal = reject_proposal(data.store.as_ref(), &actor, &proposal_id).await?;
    Ok(HttpResponse::Ok().json(proposal))
}
