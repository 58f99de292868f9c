use chrono::Utc;

pub use uuid::{uuid, Uuid};
pub type Time = chrono::DateTime<Utc>;

mod auth;
pub use auth::{AuthToken, NewSession};

mod cascade;
pub use cascade::delete_thread;

mod comment;
pub use comment::{Author, Comment, CommentId, CommentNode, DeleteConfirmation, NewComment};

mod db;
pub use db::Db;

mod error;
pub use error::Error;

mod json;
pub use json::{from_json, to_json};

mod tree;
pub use tree::{build_forest, count_nodes, forest_ids};

mod user;
pub use user::{NewUser, User, UserId};

pub const STUB_UUID: Uuid = uuid!("ffffffff-ffff-ffff-ffff-ffffffffffff");

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub enum FeedMessage {
    Pong,
    CommentCreated(Comment),
    CommentDeleted(CommentId),
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Health {
    pub status: String,
    pub timestamp: Time,
}

// The functions below are used to validate the data sent by users before
// it reaches the store. Server and mock-server must agree on what they
// refuse, so both go through these.

pub fn validate_string(s: &str) -> Result<(), Error> {
    if s.contains('\0') {
        return Err(Error::NullByteInString(String::from(s)));
    }
    Ok(())
}

/// Returns the trimmed content, or an error if nothing is left after trimming
pub fn validate_content(s: &str) -> Result<String, Error> {
    validate_string(s)?;
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err(Error::EmptyContent);
    }
    Ok(String::from(trimmed))
}

pub fn validate_name(s: &str) -> Result<(), Error> {
    validate_string(s)?;
    if s.is_empty() || s.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(Error::InvalidName(String::from(s)));
    }
    Ok(())
}
