mod board;
pub use board::{Board, ConnState, Refresh};

mod layout;
pub use layout::{layout, Alignment, CommentRow, LoadMoreRow, Row};

mod reconnect;
pub use reconnect::Backoff;

mod view;
pub use view::{NodeState, ViewConfig, ViewState};

pub mod api {
    pub use threadboard_api::*;
}

#[cfg(test)]
mod test_util {
    use chrono::{Duration, TimeZone, Utc};

    use crate::api::{Author, Comment, CommentId, CommentNode, Time, UserId, Uuid};

    pub fn time(minutes: i64) -> Time {
        Utc.with_ymd_and_hms(2017, 7, 10, 9, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    pub fn comment(author: UserId, minutes: i64) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            author_id: author,
            author: Author {
                name: String::from("someone"),
                avatar: None,
                email: None,
            },
            content: format!("written at {minutes}"),
            parent_id: None,
            created_at: time(minutes),
            updated_at: time(minutes),
        }
    }

    pub fn node(author: UserId, minutes: i64, replies: Vec<CommentNode>) -> CommentNode {
        let mut comment = comment(author, minutes);
        let mut replies = replies;
        for r in replies.iter_mut() {
            r.comment.parent_id = Some(comment.id);
        }
        comment.content = format!("{} with {} replies", comment.content, replies.len());
        CommentNode { comment, replies }
    }
}
