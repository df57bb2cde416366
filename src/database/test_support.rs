//! Record builders for unit tests. The admin hash is a placeholder so no
//! hashing happens unless a test asks for it.

use chrono::Utc;

use crate::api::common::generate_token;
use crate::models::{Comment, Like, Note, Snapshot, User, View};

pub fn snapshot() -> Snapshot {
    Snapshot::with_admin("unused".to_owned())
}

pub fn user(id: &str) -> User {
    User {
        id: id.to_owned(),
        name: id.to_owned(),
        email: format!("{}@example.com", id),
        password_hash: "unused".to_owned(),
        bio: String::new(),
        avatar: String::new(),
        created_at: Utc::now(),
        token: Some(generate_token()),
        is_suspended: false,
    }
}

pub fn note(id: &str, owner: &str, is_public: bool) -> Note {
    let now = Utc::now();
    Note {
        id: id.to_owned(),
        title: format!("title {}", id),
        content: format!("content {}", id),
        user_id: owner.to_owned(),
        is_public,
        image: None,
        created_at: now,
        updated_at: now,
    }
}

pub fn view(note_id: &str, user_id: Option<&str>) -> View {
    View {
        id: uuid::Uuid::new_v4().to_string(),
        note_id: note_id.to_owned(),
        user_id: user_id.map(str::to_owned),
        timestamp: Utc::now(),
    }
}

pub fn like(note_id: &str, user_id: &str) -> Like {
    Like {
        id: uuid::Uuid::new_v4().to_string(),
        note_id: note_id.to_owned(),
        user_id: user_id.to_owned(),
        created_at: Utc::now(),
    }
}

pub fn comment(note_id: &str, user_id: &str) -> Comment {
    Comment {
        id: uuid::Uuid::new_v4().to_string(),
        note_id: note_id.to_owned(),
        user_id: user_id.to_owned(),
        content: "nice".to_owned(),
        created_at: Utc::now(),
    }
}
