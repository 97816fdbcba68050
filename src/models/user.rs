use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Platform role carried in the bearer token and on the user record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Client,
    Freelancer,
    ProjectManager,
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Client => "client",
            Role::Freelancer => "freelancer",
            Role::ProjectManager => "project_manager",
            Role::Admin => "admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client" => Ok(Role::Client),
            "freelancer" => Ok(Role::Freelancer),
            "project_manager" => Ok(Role::ProjectManager),
            "admin" => Ok(Role::Admin),
            other => Err(format!("unknown role '{}'", other)),
        }
    }
}

/// Identity record. Authoritative for role and account flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    #[serde(rename = "_id")]
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "String::is_empty", default)]
    pub hashed_password: String,
    pub role: Role,
    pub verified: bool,
    pub admin_verified: bool,
    pub is_suspended: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verification_token: Option<String>,
    /// Projects the user currently takes part in. Set semantics.
    #[serde(default)]
    pub active_projects: Vec<String>,
    #[serde(default)]
    pub total_projects: i64,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
}

/// Public view of a user, without credentials.
#[derive(Debug, Clone, Serialize)]
pub struct UserSummary {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: String,
    pub role: Role,
    pub verified: bool,
    pub admin_verified: bool,
    pub is_suspended: bool,
    pub active_projects: Vec<String>,
    pub total_projects: i64,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        UserSummary {
            id: user.id.clone(),
            username: user.username.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
            role: user.role,
            verified: user.verified,
            admin_verified: user.admin_verified,
            is_suspended: user.is_suspended,
            active_projects: user.active_projects.clone(),
            total_projects: user.total_projects,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub credits: i64,
    #[serde(default)]
    pub company: Option<String>,
    /// Primary and secondary project manager user ids.
    #[serde(default)]
    pub manager: Vec<String>,
    /// Display-only back references into the ledger.
    #[serde(default)]
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FreelancerProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub credits: i64,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub transactions: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManagerProfile {
    #[serde(rename = "_id")]
    pub id: String,
    pub user_id: String,
    /// Client user ids this manager reviews projects for.
    #[serde(default)]
    pub clients: Vec<String>,
}

/// Ledger owner: the role profile holding a balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProfileRef {
    pub role: Role,
    pub profile_id: String,
}

impl ProfileRef {
    pub fn client(profile_id: impl Into<String>) -> Self {
        ProfileRef { role: Role::Client, profile_id: profile_id.into() }
    }

    pub fn freelancer(profile_id: impl Into<String>) -> Self {
        ProfileRef { role: Role::Freelancer, profile_id: profile_id.into() }
    }
}
