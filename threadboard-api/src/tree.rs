use std::collections::{hash_map, HashMap};

use crate::{Comment, CommentId, CommentNode};

/// Builds the reply forest out of a flat list of comments.
///
/// `records` is expected to be sorted by creation date, which then gives the
/// order of both the roots and the replies of each node. Comments whose
/// parent is not in `records` are logged and left out of the forest, along
/// with their own replies.
///
/// Runs in O(n): one pass to index the records, one pass to link them to
/// their parents, then an iterative walk from the roots to assemble the
/// nested nodes (so arbitrarily deep threads do not exhaust the stack).
pub fn build_forest(records: Vec<Comment>) -> Vec<CommentNode> {
    // First pass: one slot per comment id
    let mut index = HashMap::with_capacity(records.len());
    let mut slots = Vec::with_capacity(records.len());
    for c in records {
        match index.entry(c.id) {
            hash_map::Entry::Occupied(_) => {
                tracing::warn!(comment=?c.id, "ignoring duplicate comment record");
            }
            hash_map::Entry::Vacant(e) => {
                e.insert(slots.len());
                slots.push(Some(c));
            }
        }
    }

    // Second pass: link everyone to its parent
    let mut replies = vec![Vec::new(); slots.len()];
    let mut roots = Vec::new();
    for (i, c) in slots.iter().enumerate() {
        let Some(c) = c else { continue };
        match c.parent_id {
            None => roots.push(i),
            Some(parent) => match index.get(&parent) {
                Some(&p) => replies[p].push(i),
                None => {
                    tracing::warn!(
                        comment=?c.id,
                        ?parent,
                        "comment references a parent that does not exist, omitting it"
                    );
                }
            },
        }
    }

    // Assemble the nested nodes, children before their parent
    let mut forest = Vec::with_capacity(roots.len());
    for root in roots {
        // (slot, number of replies already visited)
        let mut stack: Vec<(usize, usize)> = vec![(root, 0)];
        // replies assembled so far for each frame of `stack`
        let mut built: Vec<Vec<CommentNode>> = vec![Vec::new()];
        while let Some((slot, visited)) = stack.last_mut() {
            if let Some(&next) = replies[*slot].get(*visited) {
                *visited += 1;
                stack.push((next, 0));
                built.push(Vec::with_capacity(replies[next].len()));
                continue;
            }
            let slot = *slot;
            stack.pop();
            let node_replies = built.pop().unwrap_or_default();
            let Some(comment) = slots[slot].take() else {
                continue;
            };
            let node = CommentNode {
                comment,
                replies: node_replies,
            };
            match built.last_mut() {
                Some(parent_replies) => parent_replies.push(node),
                None => forest.push(node),
            }
        }
    }
    forest
}

/// Total number of nodes in a forest
pub fn count_nodes(forest: &[CommentNode]) -> usize {
    let mut count = 0;
    let mut todo: Vec<&CommentNode> = forest.iter().collect();
    while let Some(n) = todo.pop() {
        count += 1;
        todo.extend(n.replies.iter());
    }
    count
}

/// Lists every comment id of a forest, in depth-first order
pub fn forest_ids(forest: &[CommentNode]) -> Vec<CommentId> {
    let mut res = Vec::new();
    let mut todo: Vec<&CommentNode> = forest.iter().rev().collect();
    while let Some(n) = todo.pop() {
        res.push(n.comment.id);
        todo.extend(n.replies.iter().rev());
    }
    res
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use chrono::{Duration, TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::{Author, Time, UserId};

    fn time(minutes: i64) -> Time {
        Utc.with_ymd_and_hms(2017, 7, 10, 10, 0, 0).unwrap() + Duration::minutes(minutes)
    }

    fn comment(author: &str, minutes: i64, parent: Option<CommentId>) -> Comment {
        Comment {
            id: CommentId(Uuid::new_v4()),
            author_id: UserId(Uuid::new_v4()),
            author: Author {
                name: String::from(author),
                avatar: None,
                email: None,
            },
            content: format!("{author} at {minutes}"),
            parent_id: parent,
            created_at: time(minutes),
            updated_at: time(minutes),
        }
    }

    #[test]
    fn nested_thread() {
        let a = comment("u1", 0, None);
        let b = comment("u2", 5, Some(a.id));
        let c = comment("u3", 10, Some(b.id));
        let forest = build_forest(vec![a.clone(), b.clone(), c.clone()]);
        assert_eq!(
            forest,
            vec![CommentNode {
                comment: a,
                replies: vec![CommentNode {
                    comment: b,
                    replies: vec![CommentNode::leaf(c)],
                }],
            }]
        );
    }

    #[test]
    fn replies_keep_input_order() {
        let a = comment("u1", 0, None);
        let d = comment("u4", 1, None);
        let b = comment("u2", 2, Some(a.id));
        let c = comment("u3", 3, Some(a.id));
        let forest = build_forest(vec![a.clone(), d.clone(), b.clone(), c.clone()]);
        assert_eq!(forest.len(), 2);
        assert_eq!(forest[0].id(), a.id);
        assert_eq!(forest[1].id(), d.id);
        assert_eq!(
            forest[0].replies.iter().map(|r| r.id()).collect::<Vec<_>>(),
            vec![b.id, c.id]
        );
    }

    #[test]
    fn orphans_are_omitted() {
        let a = comment("u1", 0, None);
        let b = comment("u2", 5, Some(a.id));
        let orphan = comment("u3", 6, Some(CommentId(Uuid::new_v4())));
        let forest = build_forest(vec![a.clone(), b.clone(), orphan.clone()]);
        assert_eq!(count_nodes(&forest), 2);
        assert!(!forest_ids(&forest).contains(&orphan.id));
    }

    #[test]
    fn orphan_replies_are_omitted_too() {
        let orphan = comment("u1", 0, Some(CommentId(Uuid::new_v4())));
        let reply = comment("u2", 1, Some(orphan.id));
        let root = comment("u3", 2, None);
        let forest = build_forest(vec![orphan, reply, root.clone()]);
        assert_eq!(forest, vec![CommentNode::leaf(root)]);
    }

    #[test]
    fn duplicates_appear_once() {
        let a = comment("u1", 0, None);
        let b = comment("u2", 1, Some(a.id));
        let forest = build_forest(vec![a.clone(), b.clone(), b.clone(), a.clone()]);
        assert_eq!(forest_ids(&forest), vec![a.id, b.id]);
    }

    #[test]
    fn self_parent_is_omitted() {
        let mut a = comment("u1", 0, None);
        a.parent_id = Some(a.id);
        assert_eq!(build_forest(vec![a]), Vec::new());
    }

    #[test]
    fn deep_thread_does_not_overflow() {
        let mut records = vec![comment("u1", 0, None)];
        for i in 1..100_000 {
            let parent = records[i - 1].id;
            records.push(comment("u1", i as i64, Some(parent)));
        }
        let forest = build_forest(records);
        assert_eq!(count_nodes(&forest), 100_000);
    }

    #[test]
    fn empty_input() {
        assert_eq!(build_forest(Vec::new()), Vec::new());
    }

    /// Builds records from a fuzzer-provided list of parent choices: `None`
    /// is a root, `Some(p)` points at record `p % len`, which may be the
    /// record itself, a later one, or a chain that never reaches a root.
    fn records_from(parents: &[Option<u16>]) -> Vec<Comment> {
        let ids = parents
            .iter()
            .map(|_| CommentId(Uuid::new_v4()))
            .collect::<Vec<_>>();
        parents
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let mut c = comment("fuzz", i as i64, None);
                c.id = ids[i];
                c.parent_id = p.map(|p| ids[p as usize % ids.len()]);
                c
            })
            .collect()
    }

    /// Ids whose parent chain reaches a root
    fn reachable(records: &[Comment]) -> HashSet<CommentId> {
        let parents = records
            .iter()
            .map(|c| (c.id, c.parent_id))
            .collect::<HashMap<_, _>>();
        records
            .iter()
            .filter(|c| {
                let mut cur = c.parent_id;
                for _ in 0..=records.len() {
                    match cur {
                        None => return true,
                        Some(p) => match parents.get(&p) {
                            None => return false,
                            Some(&pp) => cur = pp,
                        },
                    }
                }
                false
            })
            .map(|c| c.id)
            .collect()
    }

    #[test]
    fn fuzz_build_forest() {
        bolero::check!()
            .with_type::<Vec<Option<u16>>>()
            .for_each(|parents: &Vec<Option<u16>>| {
                let records = records_from(parents);
                let expected = reachable(&records);

                let forest = build_forest(records.clone());
                let ids = forest_ids(&forest);
                let unique = ids.iter().copied().collect::<HashSet<_>>();
                assert_eq!(ids.len(), unique.len(), "a node appears twice");
                assert_eq!(unique, expected);

                // Same set of nodes whatever the input order
                let mut reversed = records.clone();
                reversed.reverse();
                let rev_ids = forest_ids(&build_forest(reversed));
                assert_eq!(rev_ids.into_iter().collect::<HashSet<_>>(), expected);

                // Rebuilding identical input yields the identical forest
                assert_eq!(build_forest(records), forest);
            });
    }
}
