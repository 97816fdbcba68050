use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    Unapproved,
    Open,
    Ongoing,
    Completed,
    Rejected,
}

impl ProjectStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectStatus::Unapproved => "unapproved",
            ProjectStatus::Open => "open",
            ProjectStatus::Ongoing => "ongoing",
            ProjectStatus::Completed => "completed",
            ProjectStatus::Rejected => "rejected",
        }
    }

    /// The only edges reachable through the lifecycle operations.
    pub fn can_transition_to(&self, next: ProjectStatus) -> bool {
        use ProjectStatus::*;
        matches!(
            (self, next),
            (Unapproved, Open)
                | (Unapproved, Rejected)
                | (Open, Ongoing)
                | (Open, Completed)
                | (Ongoing, Completed)
        )
    }
}

impl std::fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreelancerAssignment {
    pub freelancer_id: String,
    pub role: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(rename = "_id")]
    pub id: String,
    pub title: String,
    pub description: String,
    pub skills: Vec<String>,
    pub budget: i64,
    pub deadline: DateTime<Utc>,
    /// Client user id.
    pub client: String,
    /// Snapshot of the client's name at creation time.
    pub client_name: String,
    pub assigned_manager: Option<String>,
    pub status: ProjectStatus,
    #[serde(default)]
    pub freelancers: Vec<FreelancerAssignment>,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn has_freelancer(&self, freelancer_id: &str) -> bool {
        self.freelancers.iter().any(|f| f.freelancer_id == freelancer_id)
    }

    /// Every user that takes part in the project.
    pub fn participants(&self) -> Vec<String> {
        let mut ids = vec![self.client.clone()];
        ids.extend(self.assigned_manager.clone());
        ids.extend(self.freelancers.iter().map(|f| f.freelancer_id.clone()));
        ids
    }
}
