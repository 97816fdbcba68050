//! Capability checks, evaluated once per operation from the role of the
//! caller, the action and ownership of the resource.

use crate::auth::Actor;
use crate::error::{AppError, AppResult};
use crate::models::{Chat, ManagerProfile, Project, Proposal, Role};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    CreateProject,
    ReviewProjects,
    DecideProject,
    SendProposal,
    RespondProposal,
    CompleteProject,
    ViewProject,
    BuyCredits,
    HoldCredits,
    ModerateLinks,
    ManageGroup,
    Administer,
    SearchFreelancers,
}

#[derive(Debug, Clone, Copy)]
pub enum Resource<'a> {
    None,
    Project(&'a Project),
    /// A project together with the manager profile deciding on it.
    ReviewedProject(&'a Project, &'a ManagerProfile),
    Proposal(&'a Proposal),
    Chat(&'a Chat),
}

pub fn can(actor: &Actor, action: Action, resource: Resource<'_>) -> bool {
    use Action::*;
    let is = |role: Role| actor.role == role;
    match (action, resource) {
        (Administer, _) => is(Role::Admin),
        (CreateProject, _) | (BuyCredits, _) => is(Role::Client),
        (HoldCredits, _) => is(Role::Client) || is(Role::Freelancer),
        (ReviewProjects, _) => is(Role::ProjectManager),
        (SearchFreelancers, _) => is(Role::ProjectManager) || is(Role::Admin),
        (DecideProject, Resource::ReviewedProject(project, manager)) => {
            is(Role::ProjectManager)
                && manager.user_id == actor.user_id
                && manager.clients.contains(&project.client)
        }
        (SendProposal, Resource::Project(project)) => {
            is(Role::ProjectManager)
                && project.assigned_manager.as_deref() == Some(actor.user_id.as_str())
        }
        (RespondProposal, Resource::Proposal(proposal)) => {
            is(Role::Freelancer) && proposal.freelancer_id == actor.user_id
        }
        (CompleteProject, Resource::Project(project)) => {
            is(Role::Admin)
                || (is(Role::ProjectManager)
                    && project.assigned_manager.as_deref() == Some(actor.user_id.as_str()))
        }
        (ViewProject, Resource::Project(project)) => {
            is(Role::Admin) || project.participants().contains(&actor.user_id)
        }
        (ModerateLinks, Resource::Chat(chat)) => {
            is(Role::Admin) || (is(Role::ProjectManager) && chat.has_member(&actor.user_id))
        }
        (ManageGroup, Resource::Chat(chat)) => {
            chat.is_group_chat && chat.group_admin.as_deref() == Some(actor.user_id.as_str())
        }
        _ => false,
    }
}

pub fn ensure(actor: &Actor, action: Action, resource: Resource<'_>) -> AppResult<()> {
    if can(actor, action, resource) {
        Ok(())
    } else {
        Err(AppError::Permission(format!(
            "{} may not perform {:?}",
            actor.role, action
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ProjectStatus, ProposalStatus};
    use chrono::Utc;

    fn project(client: &str, manager: Option<&str>) -> Project {
        Project {
            id: "p1".into(),
            title: "Launch video".into(),
            description: "60s promo".into(),
            skills: vec!["editing".into()],
            budget: 500,
            deadline: Utc::now(),
            client: client.into(),
            client_name: "Ada".into(),
            assigned_manager: manager.map(str::to_string),
            status: ProjectStatus::Open,
            freelancers: vec![],
            created_at: Utc::now(),
        }
    }

    #[test]
    fn only_clients_create_projects() {
        for role in [Role::Freelancer, Role::ProjectManager, Role::Admin] {
            assert!(!can(&Actor::new("u", role), Action::CreateProject, Resource::None));
        }
        assert!(can(&Actor::new("u", Role::Client), Action::CreateProject, Resource::None));
    }

    #[test]
    fn deciding_requires_the_client_to_be_managed() {
        let p = project("client-a", None);
        let mine = ManagerProfile {
            id: "m".into(),
            user_id: "pm".into(),
            clients: vec!["client-a".into()],
        };
        let other = ManagerProfile {
            id: "m2".into(),
            user_id: "pm".into(),
            clients: vec!["client-b".into()],
        };
        let pm = Actor::new("pm", Role::ProjectManager);
        assert!(can(&pm, Action::DecideProject, Resource::ReviewedProject(&p, &mine)));
        assert!(!can(&pm, Action::DecideProject, Resource::ReviewedProject(&p, &other)));
    }

    #[test]
    fn completion_is_for_the_assigned_manager_or_admin() {
        let p = project("client-a", Some("pm"));
        assert!(can(&Actor::new("pm", Role::ProjectManager), Action::CompleteProject, Resource::Project(&p)));
        assert!(can(&Actor::new("root", Role::Admin), Action::CompleteProject, Resource::Project(&p)));
        assert!(!can(&Actor::new("pm2", Role::ProjectManager), Action::CompleteProject, Resource::Project(&p)));
        assert!(!can(&Actor::new("client-a", Role::Client), Action::CompleteProject, Resource::Project(&p)));
    }

    #[test]
    fn only_the_target_freelancer_responds() {
        let proposal = Proposal {
            id: "pr".into(),
            project_name: "Launch video".into(),
            project_id: "p1".into(),
            freelancer_id: "f1".into(),
            sent_by: "pm".into(),
            description: "cut the trailer".into(),
            deadline: Utc::now(),
            project_role: "editor".into(),
            status: ProposalStatus::Unapproved,
            created_at: Utc::now(),
        };
        assert!(can(&Actor::new("f1", Role::Freelancer), Action::RespondProposal, Resource::Proposal(&proposal)));
        assert!(!can(&Actor::new("f2", Role::Freelancer), Action::RespondProposal, Resource::Proposal(&proposal)));
    }

    #[test]
    fn mismatched_resource_is_denied() {
        let pm = Actor::new("pm", Role::ProjectManager);
        assert!(!can(&pm, Action::SendProposal, Resource::None));
        assert!(ensure(&pm, Action::Administer, Resource::None).is_err());
    }
}
