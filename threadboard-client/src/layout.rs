use crate::{
    api::{Comment, CommentId, CommentNode, UserId},
    ViewState,
};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Alignment {
    Left,
    Right,
}

impl Alignment {
    pub fn flip(self) -> Alignment {
        match self {
            Alignment::Left => Alignment::Right,
            Alignment::Right => Alignment::Left,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct CommentRow<'a> {
    pub comment: &'a Comment,
    pub depth: usize,
    pub alignment: Alignment,

    /// Depth reached the configured maximum distinguished depth
    pub highlighted: bool,

    pub reply_count: usize,
    pub expanded: bool,
    pub can_reply: bool,
    pub can_delete: bool,
    pub draft: Option<String>,
}

/// Shown under the visible replies of `parent` when some are still hidden
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoadMoreRow {
    pub parent: CommentId,
    pub depth: usize,
    pub alignment: Alignment,

    /// How many replies "load more" would reveal
    pub next_page: usize,
    pub remaining: usize,

    /// "Show all" is only offered when more than a page remains
    pub show_all: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub enum Row<'a> {
    Comment(CommentRow<'a>),
    LoadMore(LoadMoreRow),
}

enum Todo<'a> {
    Node {
        node: &'a CommentNode,
        depth: usize,
        alignment: Alignment,
    },
    LoadMore(LoadMoreRow),
}

/// Flattens `forest` into the rows to display, in display order.
///
/// Roots are left-aligned, and replies always take the alignment opposite to
/// their parent's. `viewer` is the logged-in user, if any.
pub fn layout<'a>(
    forest: &'a [CommentNode],
    view: &ViewState,
    viewer: Option<UserId>,
) -> Vec<Row<'a>> {
    let config = view.config();
    let mut rows = Vec::new();
    let mut todo = forest
        .iter()
        .rev()
        .map(|node| Todo::Node {
            node,
            depth: 0,
            alignment: Alignment::Left,
        })
        .collect::<Vec<_>>();
    while let Some(t) = todo.pop() {
        let (node, depth, alignment) = match t {
            Todo::LoadMore(row) => {
                rows.push(Row::LoadMore(row));
                continue;
            }
            Todo::Node {
                node,
                depth,
                alignment,
            } => (node, depth, alignment),
        };
        let state = view.state(&node.comment.id);
        let reply_count = node.replies.len();
        rows.push(Row::Comment(CommentRow {
            comment: &node.comment,
            depth,
            alignment,
            highlighted: depth >= config.max_distinguished_depth,
            reply_count,
            expanded: state.expanded,
            can_reply: viewer.is_some(),
            can_delete: viewer == Some(node.comment.author_id),
            draft: state.draft,
        }));
        if !state.expanded || reply_count == 0 {
            continue;
        }
        let visible = std::cmp::min(state.visible_replies, reply_count);
        let remaining = reply_count - visible;
        if remaining > 0 {
            todo.push(Todo::LoadMore(LoadMoreRow {
                parent: node.comment.id,
                depth,
                alignment,
                next_page: std::cmp::min(config.page_size, remaining),
                remaining,
                show_all: remaining > config.page_size,
            }));
        }
        todo.extend(node.replies[..visible].iter().rev().map(|r| Todo::Node {
            node: r,
            depth: depth + 1,
            alignment: alignment.flip(),
        }));
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        api::{Uuid, UserId},
        test_util::node,
        ViewConfig,
    };

    fn comments<'a>(rows: &'a [Row<'a>]) -> Vec<&'a CommentRow<'a>> {
        rows.iter()
            .filter_map(|r| match r {
                Row::Comment(c) => Some(c),
                Row::LoadMore(_) => None,
            })
            .collect()
    }

    #[test]
    fn replies_are_hidden_by_default() {
        let u = UserId::stub();
        let forest = vec![node(u, 0, vec![node(u, 1, vec![])]), node(u, 2, vec![])];
        let view = ViewState::new(ViewConfig::default());
        let rows = layout(&forest, &view, None);
        let rows = comments(&rows);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].reply_count, 1);
        assert!(rows.iter().all(|r| r.alignment == Alignment::Left));
        assert!(rows.iter().all(|r| !r.can_reply && !r.can_delete));
    }

    #[test]
    fn zig_zag_and_highlight() {
        let u = UserId::stub();
        // a chain five deep
        let mut chain = node(u, 5, vec![]);
        for i in (0..5).rev() {
            chain = node(u, i, vec![chain]);
        }
        let forest = vec![chain];
        let mut view = ViewState::new(ViewConfig::default());
        let mut cur = &forest[0];
        loop {
            view.toggle_replies(cur.id());
            match cur.replies.first() {
                Some(r) => cur = r,
                None => break,
            }
        }
        let rows = layout(&forest, &view, Some(u));
        let rows = comments(&rows);
        assert_eq!(
            rows.iter().map(|r| r.alignment).collect::<Vec<_>>(),
            vec![
                Alignment::Left,
                Alignment::Right,
                Alignment::Left,
                Alignment::Right,
                Alignment::Left,
                Alignment::Right,
            ]
        );
        assert_eq!(
            rows.iter().map(|r| r.highlighted).collect::<Vec<_>>(),
            vec![false, false, false, true, true, true]
        );
        assert_eq!(
            rows.iter().map(|r| r.depth).collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
        assert!(rows.iter().all(|r| r.can_delete && r.can_reply));
    }

    #[test]
    fn paginated_replies() {
        let u = UserId::stub();
        let other = UserId(Uuid::new_v4());
        let replies = (1..=12).map(|i| node(other, i, vec![])).collect::<Vec<_>>();
        let forest = vec![node(u, 0, replies)];
        let root = forest[0].id();
        let mut view = ViewState::new(ViewConfig::default());
        view.toggle_replies(root);

        let rows = layout(&forest, &view, Some(other));
        assert_eq!(comments(&rows).len(), 6);
        assert!(!comments(&rows)[0].can_delete);
        assert!(comments(&rows)[1].can_delete);
        assert_eq!(
            rows.last(),
            Some(&Row::LoadMore(LoadMoreRow {
                parent: root,
                depth: 0,
                alignment: Alignment::Left,
                next_page: 5,
                remaining: 7,
                show_all: true,
            }))
        );

        view.load_more(root);
        let rows = layout(&forest, &view, None);
        assert_eq!(comments(&rows).len(), 11);
        match rows.last() {
            Some(Row::LoadMore(l)) => {
                assert_eq!((l.next_page, l.remaining, l.show_all), (2, 2, false))
            }
            r => panic!("expected a load-more row, got {r:?}"),
        }

        view.show_all(root, 12);
        let rows = layout(&forest, &view, None);
        assert_eq!(rows.len(), 13);
        assert!(matches!(rows.last(), Some(Row::Comment(_))));
    }

    #[test]
    fn load_more_follows_its_replies() {
        let u = UserId::stub();
        let inner = (0..7).map(|i| node(u, 10 + i, vec![])).collect::<Vec<_>>();
        let forest = vec![node(u, 0, vec![node(u, 1, inner)]), node(u, 2, vec![])];
        let mut view = ViewState::new(ViewConfig::default());
        view.toggle_replies(forest[0].id());
        view.toggle_replies(forest[0].replies[0].id());
        let rows = layout(&forest, &view, None);
        // root, reply, 5 nested replies, load-more, second root
        assert_eq!(rows.len(), 9);
        match &rows[7] {
            Row::LoadMore(l) => {
                assert_eq!(l.parent, forest[0].replies[0].id());
                assert_eq!(l.alignment, Alignment::Right);
                assert_eq!(l.depth, 1);
            }
            r => panic!("expected a load-more row, got {r:?}"),
        }
        match &rows[8] {
            Row::Comment(c) => assert_eq!(c.comment.id, forest[1].id()),
            r => panic!("expected the second root, got {r:?}"),
        }
    }
}
