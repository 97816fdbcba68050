use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures_util::TryStreamExt;
use log::{error, info};
use mongodb::bson::{doc, to_bson, Bson, Document};
use mongodb::error::{ErrorKind, WriteFailure};
use mongodb::options::{ClientOptions, IndexOptions};
use mongodb::results::UpdateResult;
use mongodb::{Client, ClientSession, Collection, Database, IndexModel};
use serde::de::DeserializeOwned;

use super::{Mutation, PageRequest, ProjectFilter, Store, UserFilter};
use crate::error::{AppError, AppResult};
use crate::models::{
    Chat, ClientProfile, FreelancerProfile, ManagerProfile, Message, MessageStatus, Notification,
    OrderStatus, PaymentOrder, Project, Proposal, Role, Transaction, User,
};

const USERS: &str = "users";
const CLIENTS: &str = "clients";
const FREELANCERS: &str = "freelancers";
const MANAGERS: &str = "projectmanagers";
const PROJECTS: &str = "projects";
const PROPOSALS: &str = "proposals";
const TRANSACTIONS: &str = "transactions";
const ORDERS: &str = "payment_orders";
const CHATS: &str = "chats";
const MESSAGES: &str = "messages";
const NOTIFICATIONS: &str = "notifications";

/// MongoDB-backed store. Each `apply` batch runs inside one client-session
/// transaction, so the deployment must be a replica set.
pub struct MongoStore {
    client: Client,
    db: Database,
}

fn is_duplicate_key(err: &mongodb::error::Error) -> bool {
    match err.kind.as_ref() {
        ErrorKind::Write(WriteFailure::WriteError(write_error)) => write_error.code == 11000,
        _ => false,
    }
}

fn matched(result: UpdateResult, on_miss: impl FnOnce() -> AppError) -> AppResult<()> {
    if result.matched_count == 0 {
        Err(on_miss())
    } else {
        Ok(())
    }
}

async fn collect<T>(cursor: mongodb::Cursor<T>) -> AppResult<Vec<T>>
where
    T: DeserializeOwned + Unpin + Send + Sync,
{
    Ok(cursor.try_collect().await?)
}

impl MongoStore {
    pub async fn init(uri: &str, db_name: &str) -> AppResult<Self> {
        let client_options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(client_options)?;
        let db = client.database(db_name);
        let store = MongoStore { client, db };
        store.ensure_indexes().await?;
        info!("Connected to MongoDB database '{}'", db_name);
        Ok(store)
    }

    async fn ensure_indexes(&self) -> AppResult<()> {
        let unique = || IndexOptions::builder().unique(true).build();
        self.db
            .collection::<Document>(TRANSACTIONS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "transaction_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.db
            .collection::<Document>(PROPOSALS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "project_id": 1, "freelancer_id": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        self.db
            .collection::<Document>(USERS)
            .create_index(
                IndexModel::builder()
                    .keys(doc! { "email": 1 })
                    .options(unique())
                    .build(),
            )
            .await?;
        Ok(())
    }

    fn coll<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection::<T>(name)
    }

    fn raw(&self, name: &str) -> Collection<Document> {
        self.db.collection::<Document>(name)
    }

    fn balance_collection(&self, role: Role) -> AppResult<Collection<Document>> {
        match role {
            Role::Client => Ok(self.raw(CLIENTS)),
            Role::Freelancer => Ok(self.raw(FREELANCERS)),
            other => Err(AppError::Validation(format!("{} profiles hold no credits", other))),
        }
    }

    async fn find_all<T>(&self, name: &str, filter: Document) -> AppResult<Vec<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        let cursor = self.coll::<T>(name).find(filter).await?;
        collect(cursor).await
    }

    async fn find_one<T>(&self, name: &str, filter: Document) -> AppResult<Option<T>>
    where
        T: DeserializeOwned + Unpin + Send + Sync,
    {
        Ok(self.coll::<T>(name).find_one(filter).await?)
    }

    async fn apply_one(&self, session: &mut ClientSession, mutation: Mutation) -> AppResult<()> {
        match mutation {
            Mutation::InsertUser(user) => {
                let email = user.email.clone();
                self.coll::<User>(USERS)
                    .insert_one(&user)
                    .session(&mut *session)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            AppError::StateConflict(format!("email {} already registered", email))
                        } else {
                            e.into()
                        }
                    })?;
            }
            Mutation::InsertClient(profile) => {
                self.coll::<ClientProfile>(CLIENTS)
                    .insert_one(&profile)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::InsertFreelancer(profile) => {
                self.coll::<FreelancerProfile>(FREELANCERS)
                    .insert_one(&profile)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::InsertManager(profile) => {
                self.coll::<ManagerProfile>(MANAGERS)
                    .insert_one(&profile)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::UpdateUserFlags { user_id, flags } => {
                let mut set = Document::new();
                if let Some(v) = flags.verified {
                    set.insert("verified", v);
                }
                if let Some(v) = flags.admin_verified {
                    set.insert("admin_verified", v);
                }
                if let Some(v) = flags.is_suspended {
                    set.insert("is_suspended", v);
                }
                let mut update = doc! { "$set": set };
                if flags.verified == Some(true) {
                    update.insert("$unset", doc! { "verification_token": "" });
                }
                let result = self
                    .raw(USERS)
                    .update_one(doc! { "_id": &user_id }, update)
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("user", &user_id))?;
            }
            Mutation::DeleteUser { user_id } => {
                let result = self
                    .raw(USERS)
                    .delete_one(doc! { "_id": &user_id, "active_projects": { "$size": 0 } })
                    .session(&mut *session)
                    .await?;
                if result.deleted_count == 0 {
                    let exists = self
                        .raw(USERS)
                        .find_one(doc! { "_id": &user_id })
                        .session(&mut *session)
                        .await?
                        .is_some();
                    return Err(if exists {
                        AppError::StateConflict(format!("user {} has active projects", user_id))
                    } else {
                        AppError::not_found("user", &user_id)
                    });
                }
                for name in [CLIENTS, FREELANCERS, MANAGERS] {
                    self.raw(name)
                        .delete_many(doc! { "user_id": &user_id })
                        .session(&mut *session)
                        .await?;
                }
            }
            Mutation::AddActiveProject { user_id, project_id } => {
                let result = self
                    .raw(USERS)
                    .update_one(
                        doc! { "_id": &user_id },
                        doc! { "$addToSet": { "active_projects": &project_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("user", &user_id))?;
            }
            Mutation::CloseActiveProject { user_id, project_id } => {
                let result = self
                    .raw(USERS)
                    .update_one(
                        doc! { "_id": &user_id },
                        doc! {
                            "$pull": { "active_projects": &project_id },
                            "$inc": { "total_projects": 1_i64 },
                        },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("user", &user_id))?;
            }
            Mutation::SetClientManagers { client_user_id, managers } => {
                let result = self
                    .raw(CLIENTS)
                    .update_one(
                        doc! { "user_id": &client_user_id },
                        doc! { "$set": { "manager": managers } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::ProfileMissing(Role::Client))?;
            }
            Mutation::AddManagedClient { manager_user_id, client_user_id } => {
                let result = self
                    .raw(MANAGERS)
                    .update_one(
                        doc! { "user_id": &manager_user_id },
                        doc! { "$addToSet": { "clients": &client_user_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::ProfileMissing(Role::ProjectManager))?;
            }
            Mutation::RemoveManagedClient { manager_user_id, client_user_id } => {
                let result = self
                    .raw(MANAGERS)
                    .update_one(
                        doc! { "user_id": &manager_user_id },
                        doc! { "$pull": { "clients": &client_user_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::ProfileMissing(Role::ProjectManager))?;
            }
            Mutation::InsertProject(project) => {
                self.coll::<Project>(PROJECTS)
                    .insert_one(&project)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::TransitionProject { project_id, from, to } => {
                let result = self
                    .raw(PROJECTS)
                    .update_one(
                        doc! { "_id": &project_id, "status": { "$in": to_bson(&from)? } },
                        doc! { "$set": { "status": to_bson(&to)? } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || {
                    AppError::StateConflict(format!(
                        "project {} is not in a state that can move to {}",
                        project_id, to
                    ))
                })?;
            }
            Mutation::AssignProjectManager { project_id, manager_id } => {
                let result = self
                    .raw(PROJECTS)
                    .update_one(
                        doc! { "_id": &project_id },
                        doc! { "$set": { "assigned_manager": &manager_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("project", &project_id))?;
            }
            Mutation::AddProjectFreelancer { project_id, assignment } => {
                let result = self
                    .raw(PROJECTS)
                    .update_one(
                        doc! {
                            "_id": &project_id,
                            "freelancers.freelancer_id": { "$ne": &assignment.freelancer_id },
                        },
                        doc! { "$push": { "freelancers": to_bson(&assignment)? } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || {
                    AppError::StateConflict(format!(
                        "freelancer {} already assigned to project {}",
                        assignment.freelancer_id, project_id
                    ))
                })?;
            }
            Mutation::InsertProposal(proposal) => {
                self.coll::<Proposal>(PROPOSALS)
                    .insert_one(&proposal)
                    .session(&mut *session)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            AppError::StateConflict(format!(
                                "a proposal for freelancer {} on project {} already exists",
                                proposal.freelancer_id, proposal.project_id
                            ))
                        } else {
                            e.into()
                        }
                    })?;
            }
            Mutation::TransitionProposal { proposal_id, from, to } => {
                let result = self
                    .raw(PROPOSALS)
                    .update_one(
                        doc! { "_id": &proposal_id, "status": to_bson(&from)? },
                        doc! { "$set": { "status": to_bson(&to)? } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || {
                    AppError::StateConflict(format!("proposal {} is no longer {}", proposal_id, from))
                })?;
            }
            Mutation::AdjustCredits { owner, delta } => {
                let coll = self.balance_collection(owner.role)?;
                let result = coll
                    .update_one(
                        doc! { "_id": &owner.profile_id, "credits": { "$gte": -delta } },
                        doc! { "$inc": { "credits": delta } },
                    )
                    .session(&mut *session)
                    .await?;
                if result.matched_count == 0 {
                    let current = coll
                        .find_one(doc! { "_id": &owner.profile_id })
                        .session(&mut *session)
                        .await?;
                    return Err(match current {
                        None => AppError::ProfileMissing(owner.role),
                        Some(profile) => AppError::InsufficientCredits {
                            balance: profile.get_i64("credits").unwrap_or_default(),
                            required: -delta,
                        },
                    });
                }
            }
            Mutation::AppendTransaction(tx) => {
                self.coll::<Transaction>(TRANSACTIONS)
                    .insert_one(&tx)
                    .session(&mut *session)
                    .await
                    .map_err(|e| {
                        if is_duplicate_key(&e) {
                            AppError::DuplicateTransaction(tx.transaction_id.clone())
                        } else {
                            e.into()
                        }
                    })?;
                let coll = self.balance_collection(tx.owner.role)?;
                coll.update_one(
                    doc! { "_id": &tx.owner.profile_id },
                    doc! { "$push": { "transactions": &tx.id } },
                )
                .session(&mut *session)
                .await?;
            }
            Mutation::InsertOrder(order) => {
                self.coll::<PaymentOrder>(ORDERS)
                    .insert_one(&order)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::MarkOrderPaid { order_id } => {
                let result = self
                    .raw(ORDERS)
                    .update_one(
                        doc! { "_id": &order_id, "status": to_bson(&OrderStatus::Created)? },
                        doc! { "$set": { "status": to_bson(&OrderStatus::Paid)? } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || {
                    AppError::StateConflict(format!("order {} already paid", order_id))
                })?;
            }
            Mutation::InsertChat(chat) => {
                self.coll::<Chat>(CHATS)
                    .insert_one(&chat)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::AddChatMember { chat_id, user_id } => {
                let result = self
                    .raw(CHATS)
                    .update_one(
                        doc! { "_id": &chat_id },
                        doc! { "$addToSet": { "users": &user_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("chat", &chat_id))?;
            }
            Mutation::RemoveChatMember { chat_id, user_id } => {
                let result = self
                    .raw(CHATS)
                    .update_one(
                        doc! { "_id": &chat_id },
                        doc! { "$pull": { "users": &user_id } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("chat", &chat_id))?;
            }
            Mutation::RenameChat { chat_id, name } => {
                let result = self
                    .raw(CHATS)
                    .update_one(doc! { "_id": &chat_id }, doc! { "$set": { "chat_name": &name } })
                    .session(&mut *session)
                    .await?;
                matched(result, || AppError::not_found("chat", &chat_id))?;
            }
            Mutation::InsertMessage(message) => {
                self.coll::<Message>(MESSAGES)
                    .insert_one(&message)
                    .session(&mut *session)
                    .await?;
            }
            Mutation::ApproveMessage { message_id } => {
                let result = self
                    .raw(MESSAGES)
                    .update_one(
                        doc! { "_id": &message_id, "status": to_bson(&MessageStatus::Pending)? },
                        doc! { "$set": { "status": to_bson(&MessageStatus::Approved)? } },
                    )
                    .session(&mut *session)
                    .await?;
                matched(result, || {
                    AppError::StateConflict(format!("message {} is not pending", message_id))
                })?;
            }
            Mutation::DiscardMessage { message_id } => {
                let result = self
                    .raw(MESSAGES)
                    .delete_one(doc! { "_id": &message_id, "status": to_bson(&MessageStatus::Pending)? })
                    .session(&mut *session)
                    .await?;
                if result.deleted_count == 0 {
                    return Err(AppError::StateConflict(format!(
                        "message {} is not pending",
                        message_id
                    )));
                }
            }
            Mutation::InsertNotification(notification) => {
                self.coll::<Notification>(NOTIFICATIONS)
                    .insert_one(&notification)
                    .session(&mut *session)
                    .await?;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MongoStore {
    async fn apply(&self, mutations: Vec<Mutation>) -> AppResult<()> {
        let mut session = self.client.start_session().await?;
        session.start_transaction().await?;
        for mutation in mutations {
            if let Err(e) = self.apply_one(&mut session, mutation).await {
                if let Err(abort_err) = session.abort_transaction().await {
                    error!("Failed to abort transaction after '{}': {}", e, abort_err);
                }
                return Err(e);
            }
        }
        session.commit_transaction().await?;
        Ok(())
    }

    async fn user(&self, id: &str) -> AppResult<Option<User>> {
        self.find_one(USERS, doc! { "_id": id }).await
    }

    async fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.find_one(USERS, doc! { "email": email }).await
    }

    async fn user_by_verification_token(&self, token: &str) -> AppResult<Option<User>> {
        self.find_one(USERS, doc! { "verification_token": token }).await
    }

    async fn users(&self, filter: &UserFilter) -> AppResult<Vec<User>> {
        let mut query = Document::new();
        if let Some(role) = filter.role {
            query.insert("role", role.as_str());
        }
        if let Some(v) = filter.admin_verified {
            query.insert("admin_verified", v);
        }
        let cursor = self
            .coll::<User>(USERS)
            .find(query)
            .sort(doc! { "created_at": 1 })
            .await?;
        collect(cursor).await
    }

    async fn stale_unverified_users(&self, cutoff: DateTime<Utc>) -> AppResult<Vec<User>> {
        self.find_all(
            USERS,
            doc! { "verified": false, "created_at": { "$lt": cutoff.timestamp_millis() } },
        )
        .await
    }

    async fn client_by_user(&self, user_id: &str) -> AppResult<Option<ClientProfile>> {
        self.find_one(CLIENTS, doc! { "user_id": user_id }).await
    }

    async fn freelancer_by_user(&self, user_id: &str) -> AppResult<Option<FreelancerProfile>> {
        self.find_one(FREELANCERS, doc! { "user_id": user_id }).await
    }

    async fn manager_by_user(&self, user_id: &str) -> AppResult<Option<ManagerProfile>> {
        self.find_one(MANAGERS, doc! { "user_id": user_id }).await
    }

    async fn client_profile(&self, profile_id: &str) -> AppResult<Option<ClientProfile>> {
        self.find_one(CLIENTS, doc! { "_id": profile_id }).await
    }

    async fn freelancer_profile(&self, profile_id: &str) -> AppResult<Option<FreelancerProfile>> {
        self.find_one(FREELANCERS, doc! { "_id": profile_id }).await
    }

    async fn freelancers_with_skills(&self, needles: &[String]) -> AppResult<Vec<FreelancerProfile>> {
        if needles.is_empty() {
            return Ok(Vec::new());
        }
        let clauses: Vec<Document> = needles
            .iter()
            .map(|n| doc! { "skills": { "$regex": regex::escape(n), "$options": "i" } })
            .collect();
        self.find_all(FREELANCERS, doc! { "$or": clauses }).await
    }

    async fn project(&self, id: &str) -> AppResult<Option<Project>> {
        self.find_one(PROJECTS, doc! { "_id": id }).await
    }

    async fn projects(&self, filter: &ProjectFilter) -> AppResult<Vec<Project>> {
        let mut query = Document::new();
        if let Some(status) = filter.status {
            query.insert("status", status.as_str());
        }
        if let Some(clients) = &filter.clients {
            query.insert("client", doc! { "$in": clients.clone() });
        }
        if let Some(manager) = &filter.assigned_manager {
            query.insert("assigned_manager", manager.as_str());
        }
        if let Some(freelancer) = &filter.freelancer {
            query.insert("freelancers.freelancer_id", freelancer.as_str());
        }
        let mut projects: Vec<Project> = self.find_all(PROJECTS, query).await?;
        projects.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(projects)
    }

    async fn proposal(&self, id: &str) -> AppResult<Option<Proposal>> {
        self.find_one(PROPOSALS, doc! { "_id": id }).await
    }

    async fn proposal_for(&self, project_id: &str, freelancer_id: &str) -> AppResult<Option<Proposal>> {
        self.find_one(
            PROPOSALS,
            doc! { "project_id": project_id, "freelancer_id": freelancer_id },
        )
        .await
    }

    async fn proposals_for_project(&self, project_id: &str) -> AppResult<Vec<Proposal>> {
        let mut proposals: Vec<Proposal> =
            self.find_all(PROPOSALS, doc! { "project_id": project_id }).await?;
        proposals.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(proposals)
    }

    async fn proposals_for_freelancer(&self, freelancer_id: &str) -> AppResult<Vec<Proposal>> {
        let mut proposals: Vec<Proposal> = self
            .find_all(PROPOSALS, doc! { "freelancer_id": freelancer_id })
            .await?;
        proposals.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(proposals)
    }

    async fn transaction_by_ref(&self, transaction_id: &str) -> AppResult<Option<Transaction>> {
        self.find_one(TRANSACTIONS, doc! { "transaction_id": transaction_id })
            .await
    }

    async fn transactions(&self, owner_profile_id: &str, page: PageRequest) -> AppResult<Vec<Transaction>> {
        let cursor = self
            .coll::<Transaction>(TRANSACTIONS)
            .find(doc! { "user_id": owner_profile_id })
            .sort(doc! { "created_at": -1 })
            .skip(page.skip)
            .limit(page.limit)
            .await?;
        collect(cursor).await
    }

    async fn order(&self, order_id: &str) -> AppResult<Option<PaymentOrder>> {
        self.find_one(ORDERS, doc! { "_id": order_id }).await
    }

    async fn chat(&self, id: &str) -> AppResult<Option<Chat>> {
        self.find_one(CHATS, doc! { "_id": id }).await
    }

    async fn chats_for_user(&self, user_id: &str) -> AppResult<Vec<Chat>> {
        let mut chats: Vec<Chat> = self.find_all(CHATS, doc! { "users": user_id }).await?;
        chats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(chats)
    }

    async fn group_chat_for_project(&self, project_id: &str) -> AppResult<Option<Chat>> {
        self.find_one(CHATS, doc! { "project_id": project_id, "is_group_chat": true })
            .await
    }

    async fn message(&self, id: &str) -> AppResult<Option<Message>> {
        self.find_one(MESSAGES, doc! { "_id": id }).await
    }

    async fn messages(&self, chat_id: &str, status: MessageStatus) -> AppResult<Vec<Message>> {
        let mut messages: Vec<Message> = self
            .find_all(MESSAGES, doc! { "chat": chat_id, "status": to_bson(&status)? })
            .await?;
        messages.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(messages)
    }

    async fn notifications_for(&self, role: Role) -> AppResult<Vec<Notification>> {
        let mut notifications: Vec<Notification> = self
            .find_all(
                NOTIFICATIONS,
                doc! { "$or": [ { "target_role": Bson::Null }, { "target_role": role.as_str() } ] },
            )
            .await?;
        notifications.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(notifications)
    }
}
