#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use uuid::Uuid;

use creator_market::auth::Actor;
use creator_market::chat_server::{Relay, RelayEvent};
use creator_market::error::AppResult;
use creator_market::models::{
    ClientProfile, FreelancerProfile, ManagerProfile, Project, ProjectStatus, Proposal, Role, User,
};
use creator_market::payments::{self, GatewayOrder, PaymentGateway};
use creator_market::project::{self, CreateProjectRequest};
use creator_market::proposal::{self, SendProposalRequest};
use creator_market::store::{MemoryStore, Mutation, Store};

pub const PAYMENT_SECRET: &str = "payment_secret";

pub fn user(name: &str, role: Role) -> User {
    User {
        id: format!("{}-{}", name, Uuid::new_v4().simple()),
        username: name.to_string(),
        name: name.to_string(),
        email: format!("{}-{}@example.com", name, Uuid::new_v4().simple()),
        hashed_password: String::new(),
        role,
        verified: true,
        admin_verified: true,
        is_suspended: false,
        verification_token: None,
        active_projects: Vec::new(),
        total_projects: 0,
        created_at: Utc::now(),
    }
}

pub async fn seed_client(store: &MemoryStore, name: &str, credits: i64) -> (Actor, ClientProfile) {
    let u = user(name, Role::Client);
    let profile = ClientProfile {
        id: format!("cp-{}", u.id),
        user_id: u.id.clone(),
        credits,
        company: None,
        manager: Vec::new(),
        transactions: Vec::new(),
    };
    store
        .apply(vec![Mutation::InsertUser(u.clone()), Mutation::InsertClient(profile.clone())])
        .await
        .unwrap();
    (Actor::new(u.id, Role::Client), profile)
}

pub async fn seed_freelancer(store: &MemoryStore, name: &str, skills: &[&str]) -> (Actor, FreelancerProfile) {
    let u = user(name, Role::Freelancer);
    let profile = FreelancerProfile {
        id: format!("fp-{}", u.id),
        user_id: u.id.clone(),
        name: name.to_string(),
        credits: 0,
        skills: skills.iter().map(|s| s.to_string()).collect(),
        transactions: Vec::new(),
    };
    store
        .apply(vec![Mutation::InsertUser(u.clone()), Mutation::InsertFreelancer(profile.clone())])
        .await
        .unwrap();
    (Actor::new(u.id, Role::Freelancer), profile)
}

/// A project manager reviewing for the given client user ids.
pub async fn seed_manager(store: &MemoryStore, name: &str, clients: &[&str]) -> Actor {
    let u = user(name, Role::ProjectManager);
    let profile = ManagerProfile {
        id: format!("mp-{}", u.id),
        user_id: u.id.clone(),
        clients: clients.iter().map(|c| c.to_string()).collect(),
    };
    store
        .apply(vec![Mutation::InsertUser(u.clone()), Mutation::InsertManager(profile)])
        .await
        .unwrap();
    Actor::new(u.id, Role::ProjectManager)
}

pub async fn seed_admin(store: &MemoryStore) -> Actor {
    let u = user("admin", Role::Admin);
    store.apply(vec![Mutation::InsertUser(u.clone())]).await.unwrap();
    Actor::new(u.id, Role::Admin)
}

pub fn project_request(title: &str, budget: i64) -> CreateProjectRequest {
    CreateProjectRequest {
        title: Some(title.to_string()),
        description: Some("Edit and color grade".to_string()),
        skills: Some(vec!["video editing".to_string()]),
        budget: Some(budget),
        deadline: Some(Utc::now() + Duration::days(14)),
    }
}

pub fn proposal_request(project_id: &str, freelancer_id: &str) -> SendProposalRequest {
    SendProposalRequest {
        project_id: Some(project_id.to_string()),
        freelancer_id: Some(freelancer_id.to_string()),
        description: Some("Cut the trailer".to_string()),
        deadline: Some(Utc::now() + Duration::days(7)),
        project_role: Some("editor".to_string()),
    }
}

/// Client, manager and an open project reviewed by that manager.
pub struct OpenProject {
    pub client: Actor,
    pub client_profile: ClientProfile,
    pub manager: Actor,
    pub project: Project,
}

pub async fn open_project(store: &MemoryStore, credits: i64, budget: i64) -> OpenProject {
    let (client, client_profile) = seed_client(store, "client", credits).await;
    let manager = seed_manager(store, "pm", &[&client.user_id]).await;
    let created = project::create_project(store, &client, project_request("Launch video", budget))
        .await
        .unwrap();
    let project = project::accept_project(store, &manager, &created.id).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Open);
    OpenProject {
        client,
        client_profile,
        manager,
        project,
    }
}

/// Sends a proposal to the freelancer and has them accept it.
pub async fn hire(store: &MemoryStore, manager: &Actor, project_id: &str, freelancer: &Actor) -> Proposal {
    let sent = proposal::send_proposal(store, manager, proposal_request(project_id, &freelancer.user_id))
        .await
        .unwrap();
    proposal::accept_proposal(store, freelancer, &sent.id).await.unwrap()
}

/// Relay that records what was published, per chat, and to whom.
#[derive(Default, Clone)]
pub struct RecordingRelay {
    pub events: Arc<Mutex<Vec<(String, Option<Vec<String>>, RelayEvent)>>>,
    pub evicted: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingRelay {
    pub fn published(&self) -> Vec<(String, RelayEvent)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(chat_id, _, event)| (chat_id.clone(), event.clone()))
            .collect()
    }

    /// Recipients of each published event; `None` means the whole channel.
    pub fn audiences(&self) -> Vec<Option<Vec<String>>> {
        self.events.lock().unwrap().iter().map(|(_, audience, _)| audience.clone()).collect()
    }
}

impl Relay for RecordingRelay {
    fn publish(&self, chat_id: &str, event: RelayEvent) {
        self.events.lock().unwrap().push((chat_id.to_string(), None, event));
    }

    fn publish_to(&self, chat_id: &str, user_ids: &[String], event: RelayEvent) {
        self.events
            .lock()
            .unwrap()
            .push((chat_id.to_string(), Some(user_ids.to_vec()), event));
    }

    fn evict(&self, chat_id: &str, user_id: &str) {
        self.evicted.lock().unwrap().push((chat_id.to_string(), user_id.to_string()));
    }
}

/// Gateway double: hands out sequential order ids and checks signatures
/// with the real HMAC scheme.
#[derive(Default)]
pub struct StubGateway {
    pub created: Mutex<Vec<GatewayOrder>>,
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_order(&self, amount: i64, currency: &str, _receipt: &str) -> AppResult<GatewayOrder> {
        let mut created = self.created.lock().unwrap();
        let order = GatewayOrder {
            id: format!("order_{}", created.len() + 1),
            amount,
            currency: currency.to_string(),
        };
        created.push(order.clone());
        Ok(order)
    }

    fn verify_signature(&self, order_id: &str, payment_id: &str, signature: &str) -> bool {
        payments::verify_signature(PAYMENT_SECRET, order_id, payment_id, signature)
    }
}
