use crate::{
    api::{CommentNode, FeedMessage, UserId},
    layout, Row, ViewConfig, ViewState,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ConnState {
    Disconnected,
    Connected,
}

/// What the board needs from the network after handling something
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Refresh {
    Nothing,

    /// The forest is stale: fetch it again and hand it to `receive_forest`
    Refetch,
}

/// Client-side state of the comment board.
///
/// The board never patches its forest with feed events: any change
/// notification makes it ask for a full refetch, and the fetched forest
/// replaces the old one wholesale, the UI state being reconciled against it.
pub struct Board {
    forest: Vec<CommentNode>,
    view: ViewState,
    connection_state: ConnState,
    initial_load_completed: bool,
    viewer: Option<UserId>,
}

impl Board {
    pub fn new(config: ViewConfig, viewer: Option<UserId>) -> Board {
        Board {
            forest: Vec::new(),
            view: ViewState::new(config),
            connection_state: ConnState::Disconnected,
            initial_load_completed: false,
            viewer,
        }
    }

    pub fn forest(&self) -> &[CommentNode] {
        &self.forest
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut ViewState {
        &mut self.view
    }

    pub fn connection_state(&self) -> ConnState {
        self.connection_state
    }

    pub fn is_loaded(&self) -> bool {
        self.initial_load_completed
    }

    /// Nothing is replayed on reconnection, so whatever happened while
    /// disconnected is only learned through a full fetch
    pub fn connected(&mut self) -> Refresh {
        self.connection_state = ConnState::Connected;
        Refresh::Refetch
    }

    pub fn disconnected(&mut self) {
        self.connection_state = ConnState::Disconnected;
    }

    pub fn handle_feed_message(&mut self, msg: &FeedMessage) -> Refresh {
        match msg {
            FeedMessage::Pong => Refresh::Nothing,
            FeedMessage::CommentCreated(c) => {
                tracing::debug!(comment=?c.id, "comment created elsewhere");
                Refresh::Refetch
            }
            FeedMessage::CommentDeleted(id) => {
                tracing::debug!(comment=?id, "comment deleted elsewhere");
                Refresh::Refetch
            }
        }
    }

    pub fn receive_forest(&mut self, forest: Vec<CommentNode>) {
        self.view.reconcile(&forest);
        self.forest = forest;
        self.initial_load_completed = true;
    }

    pub fn rows(&self) -> Vec<Row<'_>> {
        layout(&self.forest, &self.view, self.viewer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{CommentId, Uuid},
        test_util::{comment, node},
    };

    #[test]
    fn feed_events_trigger_refetch() {
        let mut b = Board::new(ViewConfig::default(), None);
        assert_eq!(b.connection_state(), ConnState::Disconnected);
        assert_eq!(b.connected(), Refresh::Refetch);
        assert_eq!(b.handle_feed_message(&FeedMessage::Pong), Refresh::Nothing);
        assert_eq!(
            b.handle_feed_message(&FeedMessage::CommentCreated(comment(UserId::stub(), 0))),
            Refresh::Refetch
        );
        assert_eq!(
            b.handle_feed_message(&FeedMessage::CommentDeleted(CommentId(Uuid::new_v4()))),
            Refresh::Refetch
        );
        b.disconnected();
        assert_eq!(b.connection_state(), ConnState::Disconnected);
    }

    #[test]
    fn rebuild_keeps_expanded_threads_and_drafts() {
        let u = UserId::stub();
        let mut b = Board::new(ViewConfig::default(), Some(u));
        assert!(!b.is_loaded());
        let forest = vec![
            node(u, 0, vec![node(u, 1, vec![])]),
            node(u, 2, vec![node(u, 3, vec![])]),
        ];
        let (first, second) = (forest[0].id(), forest[1].id());
        let first_reply = forest[0].replies[0].id();
        b.receive_forest(forest.clone());
        assert!(b.is_loaded());
        b.view_mut().toggle_replies(first);
        b.view_mut().toggle_replies(second);
        b.view_mut().set_draft(first_reply, String::from("wip"));
        assert_eq!(b.rows().len(), 4);

        // the second thread got deleted, and a new reply appeared in the first
        let mut rebuilt = forest;
        rebuilt.pop();
        let mut new_reply = node(u, 4, vec![]);
        new_reply.comment.parent_id = Some(first);
        rebuilt[0].replies.push(new_reply);
        b.receive_forest(rebuilt);

        assert_eq!(b.rows().len(), 3);
        assert!(b.view().state(&first).expanded);
        assert!(!b.view().is_tracked(&second));
        assert_eq!(
            b.view().state(&first_reply).draft,
            Some(String::from("wip"))
        );
    }
}
