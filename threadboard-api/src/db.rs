use async_trait::async_trait;

use crate::{CommentId, UserId};

/// Store operations the cascade deletion needs. Implemented on top of the
/// sqlite store by the server and on top of plain memory by the mock server.
#[async_trait]
pub trait Db {
    /// Returns None if the comment does not exist
    async fn comment_author(&mut self, c: CommentId) -> anyhow::Result<Option<UserId>>;

    /// Direct replies of `c`, oldest first
    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<CommentId>>;

    async fn remove_comment(&mut self, c: CommentId) -> anyhow::Result<()>;
}
