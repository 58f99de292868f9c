use std::fmt::Write;

use threadboard_client::{
    api::{CommentNode, Time},
    Alignment, Board, Row,
};

const DATE_FORMAT: &str = "%d.%m.%Y %H:%M";

fn format_date(t: &Time) -> String {
    t.format(DATE_FORMAT).to_string()
}

/// Expands every comment of the board. With `show_all`, every reply is
/// shown instead of only the first page of each comment.
pub fn expand_all(board: &mut Board, show_all: bool) {
    let mut todo = board
        .forest()
        .iter()
        .map(|n| (n.id(), n.replies.len()))
        .collect::<Vec<_>>();
    let mut stack = board.forest().iter().collect::<Vec<&CommentNode>>();
    while let Some(n) = stack.pop() {
        todo.extend(n.replies.iter().map(|r| (r.id(), r.replies.len())));
        stack.extend(n.replies.iter());
    }
    let view = board.view_mut();
    for (id, replies) in todo {
        if !view.state(&id).expanded {
            view.toggle_replies(id);
        }
        if show_all {
            view.show_all(id, replies);
        }
    }
}

fn write_row(out: &mut String, row: Row<'_>) -> std::fmt::Result {
    match row {
        Row::Comment(c) => {
            let indent = "    ".repeat(c.depth);
            let marker = match (c.alignment, c.highlighted) {
                (Alignment::Left, false) => "<",
                (Alignment::Right, false) => ">",
                (Alignment::Left, true) => "<<",
                (Alignment::Right, true) => ">>",
            };
            writeln!(
                out,
                "{indent}{marker} {} ({}) [{}]",
                c.comment.author.name,
                format_date(&c.comment.created_at),
                c.comment.id.0,
            )?;
            for line in c.comment.content.lines() {
                writeln!(out, "{indent}  {line}")?;
            }
            match (c.reply_count, c.expanded) {
                (0, _) | (_, true) => Ok(()),
                (1, false) => writeln!(out, "{indent}  (1 reply hidden)"),
                (n, false) => writeln!(out, "{indent}  ({n} replies hidden)"),
            }
        }
        Row::LoadMore(l) => {
            let indent = "    ".repeat(l.depth + 1);
            match l.show_all {
                false => writeln!(out, "{indent}... load {} more", l.next_page),
                true => writeln!(
                    out,
                    "{indent}... load {} more, or show all {}",
                    l.next_page, l.remaining
                ),
            }
        }
    }
}

pub fn render(board: &Board) -> String {
    let rows = board.rows();
    if rows.is_empty() {
        return String::from("No comments yet. Be the first to comment!\n");
    }
    let mut out = String::new();
    for row in rows {
        write_row(&mut out, row).expect("writing to a String");
    }
    out
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use threadboard_client::{
        api::{Author, Comment, CommentId, UserId, Uuid},
        ViewConfig,
    };

    use super::*;

    fn node(name: &str, content: &str, replies: Vec<CommentNode>) -> CommentNode {
        let t = Utc.with_ymd_and_hms(2017, 7, 10, 9, 0, 0).unwrap();
        CommentNode {
            comment: Comment {
                id: CommentId(Uuid::new_v4()),
                author_id: UserId::stub(),
                author: Author {
                    name: String::from(name),
                    avatar: None,
                    email: None,
                },
                content: String::from(content),
                parent_id: None,
                created_at: t,
                updated_at: t,
            },
            replies,
        }
    }

    #[test]
    fn empty_board() {
        let mut board = Board::new(ViewConfig::default(), None);
        board.receive_forest(Vec::new());
        assert_eq!(render(&board), "No comments yet. Be the first to comment!\n");
    }

    #[test]
    fn collapsed_then_expanded() {
        let mut board = Board::new(ViewConfig::default(), None);
        let replies = (0..7).map(|i| node("George", &format!("r{i}"), vec![])).collect();
        board.receive_forest(vec![node("Alex", "first\nsecond", replies)]);
        let out = render(&board);
        assert!(out.starts_with("< Alex (10.07.2017 09:00) ["));
        assert!(out.contains("\n  first\n  second\n  (7 replies hidden)\n"));

        expand_all(&mut board, false);
        let out = render(&board);
        assert_eq!(out.matches("> George").count(), 5);
        assert!(out.ends_with("    ... load 2 more\n"));

        expand_all(&mut board, true);
        assert_eq!(render(&board).matches("> George").count(), 7);
    }
}
