use uuid::Uuid;

use crate::{Error, Time, UserId, STUB_UUID};

#[derive(
    Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd, serde::Deserialize, serde::Serialize,
)]
pub struct CommentId(pub Uuid);

impl CommentId {
    pub fn stub() -> CommentId {
        CommentId(STUB_UUID)
    }
}

/// Projection of the user who wrote a comment
#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Author {
    pub name: String,
    pub avatar: Option<String>,

    /// Only sent back to the author, when echoing a freshly created comment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Comment {
    pub id: CommentId,
    pub author_id: UserId,
    pub author: Author,
    pub content: String,

    /// None for top-level comments
    pub parent_id: Option<CommentId>,

    pub created_at: Time,
    pub updated_at: Time,
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct CommentNode {
    #[serde(flatten)]
    pub comment: Comment,

    /// Direct replies, oldest first
    pub replies: Vec<CommentNode>,
}

impl CommentNode {
    pub fn leaf(comment: Comment) -> CommentNode {
        CommentNode {
            comment,
            replies: Vec::new(),
        }
    }

    pub fn id(&self) -> CommentId {
        self.comment.id
    }
}

// The derived drop would recurse once per level of replies
impl Drop for CommentNode {
    fn drop(&mut self) {
        let mut todo = std::mem::take(&mut self.replies);
        while let Some(mut n) = todo.pop() {
            todo.append(&mut n.replies);
        }
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NewComment {
    pub content: String,
    #[serde(default)]
    pub parent_id: Option<CommentId>,
}

impl NewComment {
    pub fn top_level(content: String) -> NewComment {
        NewComment {
            content,
            parent_id: None,
        }
    }

    pub fn reply(parent: CommentId, content: String) -> NewComment {
        NewComment {
            content,
            parent_id: Some(parent),
        }
    }

    /// Returns the content as it will be stored
    pub fn validate(&self) -> Result<String, Error> {
        crate::validate_content(&self.content)
    }
}

#[derive(Clone, Debug, Eq, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct DeleteConfirmation {
    pub message: String,

    /// Number of comments removed, the requested one included
    pub deleted: usize,
}

impl DeleteConfirmation {
    pub fn new(deleted: usize) -> DeleteConfirmation {
        DeleteConfirmation {
            message: String::from("Comment deleted successfully"),
            deleted,
        }
    }
}
