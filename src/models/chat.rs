use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A 1:1 or group conversation. Group chats created for a project carry
/// its id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chat {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_name: String,
    pub is_group_chat: bool,
    pub users: Vec<String>,
    pub group_admin: Option<String>,
    pub project_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Chat {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.users.iter().any(|u| u == user_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageStatus {
    Pending,
    Approved,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "_id")]
    pub id: String,
    pub sender: String,
    pub chat: String,
    pub content: String,
    pub status: MessageStatus,
    #[serde(default)]
    pub media: Option<String>,
    pub created_at: DateTime<Utc>,
}
