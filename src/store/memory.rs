use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{Mutation, PageRequest, ProjectFilter, Store, UserFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ClientProfile, FreelancerProfile, ManagerProfile, Message, MessageStatus, Notification,
    OrderStatus, PaymentOrder, Project, Proposal, Role, Transaction, User,
};

#[derive(Debug, Clone, Default)]
struct State {
    users: HashMap<String, User>,
    clients: HashMap<String, ClientProfile>,
    freelancers: HashMap<String, FreelancerProfile>,
    managers: HashMap<String, ManagerProfile>,
    projects: HashMap<String, Project>,
    proposals: HashMap<String, Proposal>,
    transactions: Vec<Transaction>,
    orders: HashMap<String, PaymentOrder>,
    chats: HashMap<String, Chat>,
    messages: Vec<Message>,
    notifications: Vec<Notification>,
}

/// In-process store. A batch is applied to a copy of the state which
/// replaces the live state only if every mutation succeeds.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    fail_at: Mutex<Option<usize>>,
}

fn conflict(msg: impl Into<String>) -> AppError {
    AppError::StateConflict(msg.into())
}

fn poisoned<T>(_: T) -> AppError {
    AppError::Internal("memory store lock poisoned".to_string())
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `apply` fail when it reaches the mutation at `index`,
    /// after the earlier mutations of the batch were applied.
    pub fn fail_next_apply_at(&self, index: usize) {
        if let Ok(mut slot) = self.fail_at.lock() {
            *slot = Some(index);
        }
    }

    fn read<R>(&self, f: impl FnOnce(&State) -> R) -> AppResult<R> {
        let state = self.state.read().map_err(poisoned)?;
        Ok(f(&state))
    }
}

impl State {
    fn user_mut(&mut self, id: &str) -> AppResult<&mut User> {
        self.users
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("user", id))
    }

    fn project_mut(&mut self, id: &str) -> AppResult<&mut Project> {
        self.projects
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("project", id))
    }

    fn chat_mut(&mut self, id: &str) -> AppResult<&mut Chat> {
        self.chats
            .get_mut(id)
            .ok_or_else(|| AppError::not_found("chat", id))
    }

    fn manager_by_user_mut(&mut self, user_id: &str) -> AppResult<&mut ManagerProfile> {
        self.managers
            .values_mut()
            .find(|m| m.user_id == user_id)
            .ok_or(AppError::ProfileMissing(Role::ProjectManager))
    }

    fn apply(&mut self, mutation: Mutation) -> AppResult<()> {
        match mutation {
            Mutation::InsertUser(user) => {
                if self.users.values().any(|u| u.email == user.email) {
                    return Err(conflict(format!("email {} already registered", user.email)));
                }
                self.users.insert(user.id.clone(), user);
            }
            Mutation::InsertClient(profile) => {
                self.clients.insert(profile.id.clone(), profile);
            }
            Mutation::InsertFreelancer(profile) => {
                self.freelancers.insert(profile.id.clone(), profile);
            }
            Mutation::InsertManager(profile) => {
                self.managers.insert(profile.id.clone(), profile);
            }
            Mutation::UpdateUserFlags { user_id, flags } => {
                let user = self.user_mut(&user_id)?;
                if let Some(v) = flags.verified {
                    user.verified = v;
                    if v {
                        user.verification_token = None;
                    }
                }
                if let Some(v) = flags.admin_verified {
                    user.admin_verified = v;
                }
                if let Some(v) = flags.is_suspended {
                    user.is_suspended = v;
                }
            }
            Mutation::DeleteUser { user_id } => {
                let user = self.users.get(&user_id).ok_or_else(|| AppError::not_found("user", &user_id))?;
                if !user.active_projects.is_empty() {
                    return Err(AppError::StateConflict(format!("user {} has active projects", user_id)));
                }
                self.users.remove(&user_id);
                self.clients.retain(|_, p| p.user_id != user_id);
                self.freelancers.retain(|_, p| p.user_id != user_id);
                self.managers.retain(|_, p| p.user_id != user_id);
            }
            Mutation::AddActiveProject { user_id, project_id } => {
                let user = self.user_mut(&user_id)?;
                if !user.active_projects.contains(&project_id) {
                    user.active_projects.push(project_id);
                }
            }
            Mutation::CloseActiveProject { user_id, project_id } => {
                let user = self.user_mut(&user_id)?;
                user.active_projects.retain(|p| *p != project_id);
                user.total_projects += 1;
            }
            Mutation::SetClientManagers { client_user_id, managers } => {
                let client = self
                    .clients
                    .values_mut()
                    .find(|c| c.user_id == client_user_id)
                    .ok_or(AppError::ProfileMissing(Role::Client))?;
                client.manager = managers;
            }
            Mutation::AddManagedClient { manager_user_id, client_user_id } => {
                let manager = self.manager_by_user_mut(&manager_user_id)?;
                if !manager.clients.contains(&client_user_id) {
                    manager.clients.push(client_user_id);
                }
            }
            Mutation::RemoveManagedClient { manager_user_id, client_user_id } => {
                let manager = self.manager_by_user_mut(&manager_user_id)?;
                manager.clients.retain(|c| *c != client_user_id);
            }
            Mutation::InsertProject(project) => {
                self.projects.insert(project.id.clone(), project);
            }
            Mutation::TransitionProject { project_id, from, to } => {
                let project = self.project_mut(&project_id)?;
                if !from.contains(&project.status) {
                    return Err(conflict(format!(
                        "project {} is {}, cannot move to {}",
                        project_id, project.status, to
                    )));
                }
                project.status = to;
            }
            Mutation::AssignProjectManager { project_id, manager_id } => {
                self.project_mut(&project_id)?.assigned_manager = Some(manager_id);
            }
            Mutation::AddProjectFreelancer { project_id, assignment } => {
                let project = self.project_mut(&project_id)?;
                if project.has_freelancer(&assignment.freelancer_id) {
                    return Err(conflict(format!(
                        "freelancer {} already assigned to project {}",
                        assignment.freelancer_id, project_id
                    )));
                }
                project.freelancers.push(assignment);
            }
            Mutation::InsertProposal(proposal) => {
                let exists = self.proposals.values().any(|p| {
                    p.project_id == proposal.project_id && p.freelancer_id == proposal.freelancer_id
                });
                if exists {
                    return Err(conflict(format!(
                        "a proposal for freelancer {} on project {} already exists",
                        proposal.freelancer_id, proposal.project_id
                    )));
                }
                self.proposals.insert(proposal.id.clone(), proposal);
            }
            Mutation::TransitionProposal { proposal_id, from, to } => {
                let proposal = self
                    .proposals
                    .get_mut(&proposal_id)
                    .ok_or_else(|| AppError::not_found("proposal", &proposal_id))?;
                if proposal.status != from {
                    return Err(conflict(format!(
                        "proposal {} is already {}",
                        proposal_id, proposal.status
                    )));
                }
                proposal.status = to;
            }
            Mutation::AdjustCredits { owner, delta } => {
                let balance = match owner.role {
                    Role::Client => self.clients.get_mut(&owner.profile_id).map(|p| &mut p.credits),
                    Role::Freelancer => self
                        .freelancers
                        .get_mut(&owner.profile_id)
                        .map(|p| &mut p.credits),
                    other => return Err(AppError::Validation(format!("{} profiles hold no credits", other))),
                }
                .ok_or(AppError::ProfileMissing(owner.role))?;
                let next = balance
                    .checked_add(delta)
                    .ok_or_else(|| AppError::Validation("credit balance overflows".to_string()))?;
                if next < 0 {
                    return Err(AppError::InsufficientCredits {
                        balance: *balance,
                        required: delta.saturating_neg(),
                    });
                }
                *balance = next;
            }
            Mutation::AppendTransaction(tx) => {
                if self
                    .transactions
                    .iter()
                    .any(|t| t.transaction_id == tx.transaction_id)
                {
                    return Err(AppError::DuplicateTransaction(tx.transaction_id));
                }
                match tx.owner.role {
                    Role::Client => {
                        if let Some(p) = self.clients.get_mut(&tx.owner.profile_id) {
                            p.transactions.push(tx.id.clone());
                        }
                    }
                    Role::Freelancer => {
                        if let Some(p) = self.freelancers.get_mut(&tx.owner.profile_id) {
                            p.transactions.push(tx.id.clone());
                        }
                    }
                    _ => {}
                }
                self.transactions.push(tx);
            }
            Mutation::InsertOrder(order) => {
                self.orders.insert(order.id.clone(), order);
            }
            Mutation::MarkOrderPaid { order_id } => {
                let order = self
                    .orders
                    .get_mut(&order_id)
                    .ok_or_else(|| AppError::not_found("order", &order_id))?;
                if order.status != OrderStatus::Created {
                    return Err(conflict(format!("order {} already paid", order_id)));
                }
                order.status = OrderStatus::Paid;
            }
            Mutation::InsertChat(chat) => {
                self.chats.insert(chat.id.clone(), chat);
            }
            Mutation::AddChatMember { chat_id, user_id } => {
                let chat = self.chat_mut(&chat_id)?;
                if !chat.has_member(&user_id) {
                    chat.users.push(user_id);
                }
            }
            Mutation::RemoveChatMember { chat_id, user_id } => {
                self.chat_mut(&chat_id)?.users.retain(|u| *u != user_id);
            }
            Mutation::RenameChat { chat_id, name } => {
                self.chat_mut(&chat_id)?.chat_name = name;
            }
            Mutation::InsertMessage(message) => {
                self.messages.push(message);
            }
            Mutation::ApproveMessage { message_id } => {
                let message = self
                    .messages
                    .iter_mut()
                    .find(|m| m.id == message_id)
                    .ok_or_else(|| AppError::not_found("message", &message_id))?;
                if message.status != MessageStatus::Pending {
                    return Err(conflict(format!("message {} is not pending", message_id)));
                }
                message.status = MessageStatus::Approved;
            }
            Mutation::DiscardMessage { message_id } => {
                let before = self.messages.len();
                self.messages
                    .retain(|m| !(m.id == message_id && m.status == MessageStatus::Pending));
                if self.messages.len() == before {
                    return Err(conflict(format!("message {} is not pending", message_id)));
                }
            }
            Mutation::InsertNotification(notification) => {
                self.notifications.push(notification);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()> {
        let fail_at = self.fail_at.lock().map_err(poisoned)?.take();
        let mut live = self.state.write().map_err(poisoned)?;
        let mut staged = live.clone();
        for (index, mutation) in mutations.into_iter().enumerate() {
            if fail_at == Some(index) {
                return Err(AppError::Database(format!("injected failure at mutation {}", index)));
            }
            staged.apply(mutation)?;
        }
        *live = staged;
        Ok(())
    }

    async fn user(&self, id: &str) -> AppResult<Option<User>> {
        self.read(|s| s.users.get(id).cloned())
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.read(|s| s.users.values().find(|u| u.email == email).cloned())
    }

    async fn user_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        self.read(|s| {
            s.users
                .values()
                .find(|u| u.verification_token.as_deref() == Some(token))
                .cloned()
        })
    }

    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<User>> {
        self.read(|s| {
            let mut users: Vec<User> = s
                .users
                .values()
                .filter(|u| filter.role.map_or(true, |r| u.role == r))
                .filter(|u| filter.admin_verified.map_or(true, |v| u.admin_verified == v))
                .cloned()
                .collect();
            users.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            users
        })
    }

    async fn stale_unverified_users(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<User>> {
        self.read(|s| {
            s.users
                .values()
                .filter(|u| !u.verified && u.created_at < cutoff)
                .cloned()
                .collect()
        })
    }

    async fn client_by_user(&self, user_id: &str) -> AppResult<Option<ClientProfile>> {
        self.read(|s| s.clients.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn freelancer_by_user(&self, user_id: &str) -> AppResult<Option<FreelancerProfile>> {
        self.read(|s| s.freelancers.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn manager_by_user(&self, user_id: &str) -> AppResult<Option<ManagerProfile>> {
        self.read(|s| s.managers.values().find(|p| p.user_id == user_id).cloned())
    }

    async fn client_profile(&self, profile_id: &str) -> AppResult<Option<ClientProfile>> {
        self.read(|s| s.clients.get(profile_id).cloned())
    }

    async fn freelancer_profile(&self, profile_id: &str) -> AppResult<Option<FreelancerProfile>> {
        self.read(|s| s.freelancers.get(profile_id).cloned())
    }

    async fn freelancers_with_skills(&self, needles: &[String]) -> AppResult<Vec<FreelancerProfile>> {
        let needles: Vec<String> = needles.iter().map(|n| n.to_lowercase()).collect();
        self.read(|s| {
            s.freelancers
                .values()
                .filter(|f| {
                    f.skills.iter().any(|skill| {
                        let skill = skill.to_lowercase();
                        needles.iter().any(|n| skill.contains(n.as_str()))
                    })
                })
                .cloned()
                .collect()
        })
    }

    async fn project(&self, id: &str) -> AppResult<Option<Project>> {
        self.read(|s| s.projects.get(id).cloned())
    }

    async fn projects(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>> {
        self.read(|s| {
            let mut projects: Vec<Project> = s
                .projects
                .values()
                .filter(|p| filter.matches(p))
                .cloned()
                .collect();
            projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            projects
        })
    }

    async fn proposal(&self, id: &str) -> AppResult<Option<Proposal>> {
        self.read(|s| s.proposals.get(id).cloned())
    }

    async fn proposal_for(&self, project_id: &str, freelancer_id: &str) -> AppResult<Option<Proposal>> {
        self.read(|s| {
            s.proposals
                .values()
                .find(|p| p.project_id == project_id && p.freelancer_id == freelancer_id)
                .cloned()
        })
    }

    async fn proposals_for_project(&self, project_id: &str) -> AppResult<Vec<Proposal>> {
        self.read(|s| {
            let mut proposals: Vec<Proposal> = s
                .proposals
                .values()
                .filter(|p| p.project_id == project_id)
                .cloned()
                .collect();
            proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
            proposals
        })
    }

    async fn proposals_for_freelancer(&self, freelancer_id: &str) -> AppResult<Vec<Proposal>> {
        self.read(|s| {
            let mut proposals: Vec<Proposal> = s
                .proposals
                .values()
                .filter(|p| p.freelancer_id == freelancer_id)
                .cloned()
                .collect();
            proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            proposals
        })
    }

    async fn transaction_by_ref(&self, transaction_id: &str) -> AppResult<Option<Transaction>> {
        self.read(|s| {
            s.transactions
                .iter()
                .find(|t| t.transaction_id == transaction_id)
                .cloned()
        })
    }

    async fn transactions(&self, owner_profile_id: &str, page: PageRequest) -> AppResult<Vec<Transaction>> {
        self.read(|s| {
            s.transactions
                .iter()
                .rev()
                .filter(|t| t.user_id == owner_profile_id)
                .skip(page.skip as usize)
                .take(page.limit.max(0) as usize)
                .cloned()
                .collect()
        })
    }

    async fn order(&self, order_id: &str) -> AppResult<Option<PaymentOrder>> {
        self.read(|s| s.orders.get(order_id).cloned())
    }

    async fn chat(&self, id: &str) -> AppResult<Option<Chat>> {
        self.read(|s| s.chats.get(id).cloned())
    }

    async fn chats_for_user(&self, user_id: &str) -> AppResult<Vec<Chat>> {
        self.read(|s| {
            let mut chats: Vec<Chat> = s
                .chats
                .values()
                .filter(|c| c.has_member(user_id))
                .cloned()
                .collect();
            chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            chats
        })
    }

    async fn group_chat_for_project(&self, project_id: &str) -> AppResult<Option<Chat>> {
        self.read(|s| {
            s.chats
                .values()
                .find(|c| c.is_group_chat && c.project_id.as_deref() == Some(project_id))
                .cloned()
        })
    }

    async fn message(&self, id: &str) -> AppResult<Option<Message>> {
        self.read(|s| s.messages.iter().find(|m| m.id == id).cloned())
    }

    async fn messages(&self, chat_id: &str, status: MessageStatus) -> AppResult<Vec<Message>> {
        self.read(|s| {
            s.messages
                .iter()
                .filter(|m| m.chat == chat_id && m.status == status)
                .cloned()
                .collect()
        })
    }

    async fn notifications_for(&self, role: Role) -> AppResult<Vec<Notification>> {
        self.read(|s| {
            s.notifications
                .iter()
                .rev()
                .filter(|n| n.target_role.map_or(true, |r| r == role))
                .cloned()
                .collect()
        })
    }
}
