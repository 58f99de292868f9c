//! JSON encoding for payloads that may nest arbitrarily deep, like the
//! comment forest of a long reply chain.
//!
//! `serde_json` alone refuses to parse past 128 levels and recurses once per
//! level on both ends. These go through `serde_stacker`, which grows the
//! stack on the heap as needed.

use anyhow::Context;

pub fn to_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut ser = serde_json::Serializer::new(&mut out);
    value
        .serialize(serde_stacker::Serializer::new(&mut ser))
        .context("serializing to json")?;
    Ok(out)
}

pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> anyhow::Result<T> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    de.disable_recursion_limit();
    let value =
        T::deserialize(serde_stacker::Deserializer::new(&mut de)).context("parsing json")?;
    de.end().context("parsing json")?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    use super::*;
    use crate::{
        build_forest, count_nodes, forest_ids, Author, Comment, CommentId, CommentNode, UserId,
    };

    fn chain(depth: usize) -> Vec<Comment> {
        let t = Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap();
        let mut parent = None;
        (0..depth)
            .map(|_| {
                let c = Comment {
                    id: CommentId(Uuid::new_v4()),
                    author_id: UserId::stub(),
                    author: Author {
                        name: String::from("u1"),
                        avatar: None,
                        email: None,
                    },
                    content: String::from("deeper"),
                    parent_id: parent,
                    created_at: t,
                    updated_at: t,
                };
                parent = Some(c.id);
                c
            })
            .collect()
    }

    #[test]
    fn deep_forest_on_a_small_stack() {
        // 2 MiB is the default stack of spawned threads, and of tokio workers
        std::thread::Builder::new()
            .stack_size(2 << 20)
            .spawn(|| {
                let records = chain(100_000);
                let expected = records.iter().map(|c| c.id).collect::<Vec<_>>();
                let forest = build_forest(records);
                let json = to_json(&forest).unwrap();
                drop(forest);
                let parsed: Vec<CommentNode> = from_json(&json).unwrap();
                assert_eq!(count_nodes(&parsed), 100_000);
                assert_eq!(forest_ids(&parsed), expected);
            })
            .unwrap()
            .join()
            .unwrap();
    }

    #[test]
    fn trailing_garbage_is_refused() {
        assert_eq!(from_json::<Vec<u32>>(b"[1, 2]").unwrap(), vec![1, 2]);
        assert!(from_json::<Vec<u32>>(b"[1, 2] x").is_err());
    }
}
