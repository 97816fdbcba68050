use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProposalStatus {
    Unapproved,
    Accepted,
    Rejected,
}

impl ProposalStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProposalStatus::Unapproved)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProposalStatus::Unapproved => "unapproved",
            ProposalStatus::Accepted => "accepted",
            ProposalStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for ProposalStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Invitation from a project manager to a freelancer. The proposal
/// collection is the single source of truth for proposal status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    #[serde(rename = "_id")]
    pub id: String,
    pub project_name: String,
    pub project_id: String,
    /// Freelancer user id.
    pub freelancer_id: String,
    pub sent_by: String,
    pub description: String,
    pub deadline: DateTime<Utc>,
    pub project_role: String,
    pub status: ProposalStatus,
    pub created_at: DateTime<Utc>,
}
