use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub const ADMIN_ID: &str = "admin123";
pub const ADMIN_EMAIL: &str = "admin@mynotes.com";
pub const ADMIN_DEFAULT_PASSWORD: &str = "admin123";

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub bio: String,
    pub avatar: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub is_suspended: bool,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Note {
    pub id: String,
    pub title: String,
    pub content: String,
    pub user_id: String,
    pub is_public: bool,
    #[serde(default)]
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: String,
    pub note_id: String,
    pub user_id: String,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

/// One user's like of one note. Bookmarks share the same shape.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Like {
    pub id: String,
    pub note_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Bookmark {
    pub id: String,
    pub note_id: String,
    pub user_id: String,
    pub created_at: DateTime<Utc>,
}

/// A single view event. `user_id` is `None` for anonymous viewers.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct View {
    pub id: String,
    pub note_id: String,
    #[serde(default)]
    pub user_id: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum NotificationPayload {
    #[serde(rename_all = "camelCase")]
    Like { note_id: String, from_user_id: String },
    #[serde(rename_all = "camelCase")]
    Comment {
        note_id: String,
        comment_id: String,
        from_user_id: String,
    },
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub id: String,
    pub target_user_id: String,
    pub payload: NotificationPayload,
    #[serde(default)]
    pub read: bool,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Admin {
    pub id: String,
    pub email: String,
    #[serde(rename = "password")]
    pub password_hash: String,
    #[serde(default)]
    pub token: Option<String>,
}

/// Every persisted collection at one instant.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    #[serde(default)]
    pub users: Vec<User>,
    #[serde(default)]
    pub notes: Vec<Note>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub likes: Vec<Like>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
    #[serde(default)]
    pub views: Vec<View>,
    #[serde(default)]
    pub notifications: Vec<Notification>,
    pub admin: Admin,
}

impl Snapshot {
    /// Empty collections plus a freshly provisioned admin record.
    pub fn with_admin(admin_password_hash: String) -> Self {
        Snapshot {
            users: vec![],
            notes: vec![],
            comments: vec![],
            likes: vec![],
            bookmarks: vec![],
            views: vec![],
            notifications: vec![],
            admin: Admin {
                id: ADMIN_ID.to_owned(),
                email: ADMIN_EMAIL.to_owned(),
                password_hash: admin_password_hash,
                token: None,
            },
        }
    }

    pub fn find_user(&self, user_id: &str) -> Option<&User> {
        self.users.iter().find(|user| user.id == user_id)
    }

    pub fn find_note(&self, note_id: &str) -> Option<&Note> {
        self.notes.iter().find(|note| note.id == note_id)
    }
}
