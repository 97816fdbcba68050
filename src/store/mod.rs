//! Persistence seam.
//!
//! Services read through typed queries and write exclusively through
//! [`Store::apply`], which commits a batch of [`Mutation`]s as one unit:
//! either every mutation (and its precondition) holds and all are
//! persisted, or none are.

mod memory;
mod mongo;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

pub use memory::MemoryStore;
pub use mongo::MongoStore;

use crate::error::AppResult;
use crate::models::{
    Chat, ClientProfile, FreelancerAssignment, FreelancerProfile, ManagerProfile, Message,
    MessageStatus, Notification, PaymentOrder, ProfileRef, Project, ProjectStatus, Proposal,
    ProposalStatus, Role, Transaction, User,
};

/// Flags an admin or the verification flow may flip on a user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UserFlags {
    pub verified: Option<bool>,
    pub admin_verified: Option<bool>,
    pub is_suspended: Option<bool>,
}

/// One write inside a transactional unit. Variants that move an entity
/// between states carry the state they expect to find.
#[derive(Debug, Clone)]
pub enum Mutation {
    InsertUser(User),
    InsertClient(ClientProfile),
    InsertFreelancer(FreelancerProfile),
    InsertManager(ManagerProfile),
    UpdateUserFlags { user_id: String, flags: UserFlags },
    /// Removes the user together with its role profile. Refused while the
    /// user still has active projects.
    DeleteUser { user_id: String },
    AddActiveProject { user_id: String, project_id: String },
    /// Drops the project from `active_projects` and bumps `total_projects`.
    CloseActiveProject { user_id: String, project_id: String },
    SetClientManagers { client_user_id: String, managers: Vec<String> },
    AddManagedClient { manager_user_id: String, client_user_id: String },
    RemoveManagedClient { manager_user_id: String, client_user_id: String },
    InsertProject(Project),
    TransitionProject { project_id: String, from: Vec<ProjectStatus>, to: ProjectStatus },
    AssignProjectManager { project_id: String, manager_id: String },
    /// Fails if the freelancer is already assigned.
    AddProjectFreelancer { project_id: String, assignment: FreelancerAssignment },
    /// Fails if a proposal for the same project and freelancer exists.
    InsertProposal(Proposal),
    TransitionProposal { proposal_id: String, from: ProposalStatus, to: ProposalStatus },
    /// Fails with `InsufficientCredits` if the balance would go negative.
    AdjustCredits { owner: ProfileRef, delta: i64 },
    /// Fails with `DuplicateTransaction` if the reference is known.
    AppendTransaction(Transaction),
    InsertOrder(PaymentOrder),
    MarkOrderPaid { order_id: String },
    InsertChat(Chat),
    AddChatMember { chat_id: String, user_id: String },
    RemoveChatMember { chat_id: String, user_id: String },
    RenameChat { chat_id: String, name: String },
    InsertMessage(Message),
    ApproveMessage { message_id: String },
    /// Deletes a message that is still pending moderation.
    DiscardMessage { message_id: String },
    InsertNotification(Notification),
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub role: Option<Role>,
    pub admin_verified: Option<bool>,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectFilter {
    pub status: Option<ProjectStatus>,
    /// Restricts to projects whose client is one of these user ids.
    pub clients: Option<Vec<String>>,
    pub assigned_manager: Option<String>,
    pub freelancer: Option<String>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        self.status.map_or(true, |s| project.status == s)
            && self
                .clients
                .as_ref()
                .map_or(true, |c| c.iter().any(|id| *id == project.client))
            && self
                .assigned_manager
                .as_ref()
                .map_or(true, |m| project.assigned_manager.as_ref() == Some(m))
            && self
                .freelancer
                .as_ref()
                .map_or(true, |f| project.has_freelancer(f))
    }
}

/// Offset pagination, newest first.
#[derive(Debug, Clone, Copy)]
pub struct PageRequest {
    pub skip: u64,
    pub limit: i64,
}

#[async_trait]
pub trait Store: Send + Sync {
    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()>;

    async fn user(&self, id: &str) -> AppResult<Option<User>>;
    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>>;
    async fn user_by_verification_token(&self, token: &str) -> AppResult<Option<User>>;
    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<User>>;
    /// Users with `verified=false` created before `cutoff`.
    async fn stale_unverified_users(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<User>>;

    async fn client_by_user(&self, user_id: &str) -> AppResult<Option<ClientProfile>>;
    async fn freelancer_by_user(&self, user_id: &str) -> AppResult<Option<FreelancerProfile>>;
    async fn manager_by_user(&self, user_id: &str) -> AppResult<Option<ManagerProfile>>;
    async fn client_profile(&self, profile_id: &str) -> AppResult<Option<ClientProfile>>;
    async fn freelancer_profile(&self, profile_id: &str) -> AppResult<Option<FreelancerProfile>>;
    /// Freelancers with at least one skill containing one of `needles`,
    /// compared case-insensitively.
    async fn freelancers_with_skills(&self, needles: &[String]) -> AppResult<Vec<FreelancerProfile>>;

    async fn project(&self, id: &str) -> AppResult<Option<Project>>;
    async fn projects(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>>;

    async fn proposal(&self, id: &str) -> AppResult<Option<Proposal>>;
    async fn proposal_for(&self, project_id: &str, freelancer_id: &str) -> AppResult<Option<Proposal>>;
    async fn proposals_for_project(&self, project_id: &str) -> AppResult<Vec<Proposal>>;
    async fn proposals_for_freelancer(&self, freelancer_id: &str) -> AppResult<Vec<Proposal>>;

    async fn transaction_by_ref(&self, transaction_id: &str) -> AppResult<Option<Transaction>>;
    /// Ledger rows for one owner profile, newest first.
    async fn transactions(&self, owner_profile_id: &str, page: PageRequest) -> AppResult<Vec<Transaction>>;
    async fn order(&self, order_id: &str) -> AppResult<Option<PaymentOrder>>;

    async fn chat(&self, id: &str) -> AppResult<Option<Chat>>;
    async fn chats_for_user(&self, user_id: &str) -> AppResult<Vec<Chat>>;
    async fn group_chat_for_project(&self, project_id: &str) -> AppResult<Option<Chat>>;
    async fn message(&self, id: &str) -> AppResult<Option<Message>>;
    /// Messages of a chat in the given state, oldest first.
    async fn messages(&self, chat_id: &str, status: MessageStatus) -> AppResult<Vec<Message>>;

    /// Notifications aimed at `role` or at everyone, newest first.
    async fn notifications_for(&self, role: Role) -> AppResult<Vec<Notification>>;
}
