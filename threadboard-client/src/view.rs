use std::collections::{HashMap, HashSet};

use crate::api::{self, CommentId, CommentNode, NewComment};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ViewConfig {
    /// Number of replies revealed at once
    pub page_size: usize,

    /// Comments at this depth and deeper get highlighted
    pub max_distinguished_depth: usize,
}

impl Default for ViewConfig {
    fn default() -> ViewConfig {
        ViewConfig {
            page_size: 5,
            max_distinguished_depth: 3,
        }
    }
}

/// Transient UI state of one comment
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct NodeState {
    pub expanded: bool,
    pub visible_replies: usize,

    /// Some if the reply form is open
    pub draft: Option<String>,
}

impl NodeState {
    fn new(config: &ViewConfig) -> NodeState {
        NodeState {
            expanded: false,
            visible_replies: config.page_size,
            draft: None,
        }
    }
}

/// UI state of the whole board, keyed by comment. It outlives the forests it
/// is displayed with: every rebuild of the forest goes through `reconcile`.
#[derive(Clone, Debug)]
pub struct ViewState {
    config: ViewConfig,
    nodes: HashMap<CommentId, NodeState>,

    /// Draft of the top-level comment form
    pub root_draft: String,
}

impl ViewState {
    pub fn new(config: ViewConfig) -> ViewState {
        ViewState {
            config,
            nodes: HashMap::new(),
            root_draft: String::new(),
        }
    }

    pub fn config(&self) -> &ViewConfig {
        &self.config
    }

    pub fn state(&self, c: &CommentId) -> NodeState {
        self.nodes
            .get(c)
            .cloned()
            .unwrap_or_else(|| NodeState::new(&self.config))
    }

    pub fn is_tracked(&self, c: &CommentId) -> bool {
        self.nodes.contains_key(c)
    }

    fn state_mut(&mut self, c: CommentId) -> &mut NodeState {
        let config = self.config;
        self.nodes
            .entry(c)
            .or_insert_with(|| NodeState::new(&config))
    }

    pub fn toggle_replies(&mut self, c: CommentId) {
        let s = self.state_mut(c);
        s.expanded = !s.expanded;
    }

    pub fn load_more(&mut self, c: CommentId) {
        let page_size = self.config.page_size;
        let s = self.state_mut(c);
        s.visible_replies = s.visible_replies.saturating_add(page_size);
    }

    pub fn show_all(&mut self, c: CommentId, reply_count: usize) {
        let s = self.state_mut(c);
        s.visible_replies = std::cmp::max(s.visible_replies, reply_count);
    }

    /// Opens the reply form of `c`, or closes it (dropping the draft) if it was open
    pub fn toggle_reply_form(&mut self, c: CommentId) {
        let s = self.state_mut(c);
        s.draft = match s.draft {
            None => Some(String::new()),
            Some(_) => None,
        };
    }

    pub fn set_draft(&mut self, c: CommentId, text: String) {
        self.state_mut(c).draft = Some(text);
    }

    /// Turns the draft of `c` into a reply. The form closes on success and
    /// stays open with its draft on error.
    pub fn submit_reply(&mut self, c: CommentId) -> Result<NewComment, api::Error> {
        let s = self.state_mut(c);
        let content = api::validate_content(s.draft.as_deref().unwrap_or(""))?;
        s.draft = None;
        Ok(NewComment::reply(c, content))
    }

    pub fn submit_root(&mut self) -> Result<NewComment, api::Error> {
        let content = api::validate_content(&self.root_draft)?;
        self.root_draft.clear();
        Ok(NewComment::top_level(content))
    }

    /// Forgets the state of comments that are no longer in `forest`, keeping
    /// everything else as is. Returns the number of forgotten comments.
    pub fn reconcile(&mut self, forest: &[CommentNode]) -> usize {
        let alive = api::forest_ids(forest).into_iter().collect::<HashSet<_>>();
        let before = self.nodes.len();
        self.nodes.retain(|id, _| alive.contains(id));
        let dropped = before - self.nodes.len();
        if dropped > 0 {
            tracing::debug!(dropped, "forgot ui state of deleted comments");
        }
        dropped
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{UserId, Uuid},
        test_util::node,
    };

    #[test]
    fn pagination() {
        let mut v = ViewState::new(ViewConfig::default());
        let c = CommentId(Uuid::new_v4());
        assert_eq!(v.state(&c).visible_replies, 5);
        assert!(!v.state(&c).expanded);
        v.toggle_replies(c);
        v.load_more(c);
        assert_eq!(v.state(&c).visible_replies, 10);
        v.show_all(c, 23);
        assert_eq!(v.state(&c).visible_replies, 23);
        v.show_all(c, 3);
        assert_eq!(v.state(&c).visible_replies, 23);
        assert!(v.state(&c).expanded);
    }

    #[test]
    fn drafts() {
        let mut v = ViewState::new(ViewConfig::default());
        let c = CommentId(Uuid::new_v4());
        v.toggle_reply_form(c);
        assert_eq!(v.state(&c).draft, Some(String::new()));
        assert_eq!(v.submit_reply(c), Err(api::Error::EmptyContent));
        assert_eq!(v.state(&c).draft, Some(String::new()));
        v.set_draft(c, String::from("  hi there  "));
        assert_eq!(
            v.submit_reply(c),
            Ok(NewComment::reply(c, String::from("hi there")))
        );
        assert_eq!(v.state(&c).draft, None);

        v.root_draft = String::from("\n");
        assert_eq!(v.submit_root(), Err(api::Error::EmptyContent));
        v.root_draft = String::from("top");
        assert_eq!(v.submit_root(), Ok(NewComment::top_level(String::from("top"))));
        assert!(v.root_draft.is_empty());
    }

    #[test]
    fn reconcile_keeps_surviving_state() {
        let u = UserId::stub();
        let forest = vec![node(u, 0, vec![node(u, 1, vec![node(u, 2, vec![])])])];
        let a = forest[0].id();
        let b = forest[0].replies[0].id();
        let c = forest[0].replies[0].replies[0].id();

        let mut v = ViewState::new(ViewConfig::default());
        v.toggle_replies(a);
        v.toggle_replies(b);
        v.load_more(b);
        v.set_draft(c, String::from("half-written"));
        assert_eq!(v.reconcile(&forest), 0);

        // b (and thus c) got deleted
        let mut rebuilt = forest.clone();
        rebuilt[0].replies.clear();
        assert_eq!(v.reconcile(&rebuilt), 2);
        assert!(v.state(&a).expanded);
        assert!(!v.is_tracked(&b));
        assert!(!v.is_tracked(&c));
        assert_eq!(v.state(&b), NodeState::new(v.config()));
    }
}
