use anyhow::Context;

use crate::{CommentId, Db, Error, UserId};

/// Deletes `root` and every reply transitively under it.
///
/// Only the author of `root` may do so; replies are removed whoever wrote
/// them. Replies are always removed before their parent, so a failure midway
/// never leaves a comment whose parent is already gone. The walk uses an
/// explicit worklist, as thread depth is unbounded.
///
/// Returns the removed ids, in removal order.
pub async fn delete_thread<D: Db + Send>(
    db: &mut D,
    actor: UserId,
    root: CommentId,
) -> anyhow::Result<Result<Vec<CommentId>, Error>> {
    let author = db
        .comment_author(root)
        .await
        .with_context(|| format!("fetching author of comment {:?}", root))?;
    match author {
        None => return Ok(Err(Error::NotFound(root))),
        Some(author) if author != actor => return Ok(Err(Error::PermissionDenied)),
        Some(_) => (),
    }

    let mut deleted = Vec::new();
    // (comment, replies already pushed)
    let mut todo = vec![(root, false)];
    while let Some((c, expanded)) = todo.pop() {
        if expanded {
            db.remove_comment(c)
                .await
                .with_context(|| format!("removing comment {:?}", c))?;
            deleted.push(c);
        } else {
            let replies = db
                .list_replies(c)
                .await
                .with_context(|| format!("listing replies of comment {:?}", c))?;
            todo.push((c, true));
            todo.extend(replies.into_iter().rev().map(|r| (r, false)));
        }
    }
    tracing::debug!(?root, num_deleted = deleted.len(), "deleted comment thread");
    Ok(Ok(deleted))
}
