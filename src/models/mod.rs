pub mod chat;
pub mod ledger;
pub mod project;
pub mod proposal;
pub mod user;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use chat::{Chat, Message, MessageStatus};
pub use ledger::{OrderStatus, PaymentOrder, Transaction, TransactionType};
pub use project::{FreelancerAssignment, Project, ProjectStatus};
pub use proposal::{Proposal, ProposalStatus};
pub use user::{ClientProfile, FreelancerProfile, ManagerProfile, ProfileRef, Role, User, UserSummary};

/// Broadcast record. `target_role` of `None` reaches every role.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub body: String,
    pub target_role: Option<Role>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}
