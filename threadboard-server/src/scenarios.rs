#![cfg(test)]

use std::time::Duration;

use axum::Router;
use futures::{SinkExt, StreamExt};
use threadboard_api::{
    AuthToken, Comment, CommentId, CommentNode, DeleteConfirmation, Error as ApiError,
    FeedMessage, Health, NewComment, NewSession, NewUser, UserId, Uuid,
};
use tokio_tungstenite::tungstenite::Message;

use crate::{
    app,
    extractors::AppState,
    fuzz::{run_on_app, test_pool},
};

struct TestApp {
    app: Router,
    state: AppState,
    admin: Uuid,
    _dir: tempfile::TempDir,
}

impl TestApp {
    async fn new() -> TestApp {
        let dir = tempfile::tempdir().expect("creating tempdir");
        let admin = Uuid::new_v4();
        let state = AppState::new(test_pool(dir.path()).await, Some(AuthToken(admin)));
        TestApp {
            app: app(state.clone()),
            state,
            admin,
            _dir: dir,
        }
    }

    async fn user(&mut self, name: &str) -> (UserId, Uuid) {
        let id = UserId(Uuid::new_v4());
        let () = run_on_app(
            &mut self.app,
            "POST",
            "/api/admin/create-user",
            Some(self.admin),
            &NewUser::new(id, String::from(name), format!("{name}@example.com"), None),
        )
        .await
        .expect("creating user");
        let tok: AuthToken = run_on_app(
            &mut self.app,
            "POST",
            "/api/admin/create-session",
            Some(self.admin),
            &NewSession {
                user: String::from(name),
                device: String::from("test"),
            },
        )
        .await
        .expect("creating session");
        (id, tok.0)
    }

    async fn post(
        &mut self,
        tok: Uuid,
        parent: Option<CommentId>,
        content: &str,
    ) -> Result<Comment, ApiError> {
        run_on_app(
            &mut self.app,
            "POST",
            "/api/comments",
            Some(tok),
            &NewComment {
                content: String::from(content),
                parent_id: parent,
            },
        )
        .await
    }

    async fn delete(&mut self, tok: Uuid, c: CommentId) -> Result<DeleteConfirmation, ApiError> {
        run_on_app(
            &mut self.app,
            "DELETE",
            &format!("/api/comments/{}", c.0),
            Some(tok),
            &(),
        )
        .await
    }

    async fn forest(&mut self) -> Vec<CommentNode> {
        run_on_app(&mut self.app, "GET", "/api/comments", None, &())
            .await
            .expect("fetching comments")
    }
}

fn ids(forest: &[CommentNode]) -> Vec<(CommentId, Vec<CommentId>)> {
    forest
        .iter()
        .map(|n| (n.id(), threadboard_api::forest_ids(&n.replies)))
        .collect()
}

/// A root by u1, a reply to it by u2, and a reply to that by u1
async fn three_level_thread() -> (TestApp, [Uuid; 2], [CommentId; 3]) {
    let mut t = TestApp::new().await;
    let (_, u1) = t.user("u1").await;
    let (_, u2) = t.user("u2").await;
    let a = t.post(u1, None, "A").await.unwrap().id;
    let b = t.post(u2, Some(a), "B").await.unwrap().id;
    let c = t.post(u1, Some(b), "C").await.unwrap().id;
    (t, [u1, u2], [a, b, c])
}

#[tokio::test]
async fn thread_is_fetched_as_a_tree() {
    let (mut t, _, [a, b, c]) = three_level_thread().await;
    let forest = t.forest().await;
    assert_eq!(ids(&forest), vec![(a, vec![b, c])]);
    assert_eq!(forest[0].replies[0].replies[0].id(), c);
    assert_eq!(forest[0].comment.author.name, "u1");
    assert_eq!(forest[0].comment.author.email, None);
}

#[tokio::test]
async fn deleting_the_root_removes_everything() {
    let (mut t, [u1, _], [a, ..]) = three_level_thread().await;
    assert_eq!(t.delete(u1, a).await, Ok(DeleteConfirmation::new(3)));
    assert_eq!(t.forest().await, vec![]);
}

#[tokio::test]
async fn deleting_a_reply_keeps_its_ancestors() {
    let (mut t, [u1, u2], [a, b, c]) = three_level_thread().await;
    // c was written by u1, but goes away with b
    assert_eq!(t.delete(u2, b).await, Ok(DeleteConfirmation::new(2)));
    assert_eq!(ids(&t.forest().await), vec![(a, vec![])]);
    assert_eq!(t.delete(u1, c).await, Err(ApiError::NotFound(c)));
}

#[tokio::test]
async fn only_the_author_may_delete() {
    let (mut t, [_, u2], [a, b, c]) = three_level_thread().await;
    assert_eq!(t.delete(u2, a).await, Err(ApiError::PermissionDenied));
    assert_eq!(ids(&t.forest().await), vec![(a, vec![b, c])]);
    let missing = CommentId(Uuid::new_v4());
    assert_eq!(t.delete(u2, missing).await, Err(ApiError::NotFound(missing)));
}

#[tokio::test]
async fn new_replies_come_last() {
    let (mut t, [u1, u2], [a, b, _]) = three_level_thread().await;
    let d = t.post(u2, Some(a), "D").await.unwrap();
    assert_eq!(d.parent_id, Some(a));
    let forest = t.forest().await;
    assert_eq!(
        forest[0].replies.iter().map(|r| r.id()).collect::<Vec<_>>(),
        vec![b, d.id]
    );
    let e = t.post(u1, None, "E").await.unwrap();
    assert_eq!(t.forest().await.last().map(|n| n.id()), Some(e.id));
}

#[tokio::test]
async fn creation_is_validated() {
    let mut t = TestApp::new().await;
    let (alex, tok) = t.user("Alex").await;

    let c = t.post(tok, None, "  hello world \n").await.unwrap();
    assert_eq!(c.content, "hello world");
    assert_eq!(c.author_id, alex);
    assert_eq!(c.author.email.as_deref(), Some("Alex@example.com"));

    assert_eq!(t.post(tok, None, " \t ").await, Err(ApiError::EmptyContent));
    let missing = CommentId(Uuid::new_v4());
    assert_eq!(
        t.post(tok, Some(missing), "hi").await,
        Err(ApiError::NotFound(missing))
    );
    assert_eq!(
        t.post(Uuid::new_v4(), None, "hi").await,
        Err(ApiError::PermissionDenied)
    );
    assert_eq!(ids(&t.forest().await), vec![(c.id, vec![])]);
}

#[tokio::test]
async fn admin_routes() {
    let mut t = TestApp::new().await;
    let (alex, tok) = t.user("Alex").await;
    let whoami: Result<UserId, _> =
        run_on_app(&mut t.app, "GET", "/api/whoami", Some(tok), &()).await;
    assert_eq!(whoami, Ok(alex));

    let dup = NewUser::new(
        UserId(Uuid::new_v4()),
        String::from("Alex"),
        String::from("other@example.com"),
        None,
    );
    let res: Result<(), _> = run_on_app(
        &mut t.app,
        "POST",
        "/api/admin/create-user",
        Some(t.admin),
        &dup,
    )
    .await;
    assert_eq!(res, Err(ApiError::NameAlreadyUsed(String::from("Alex"))));

    // user tokens are not admin tokens
    let res: Result<(), _> =
        run_on_app(&mut t.app, "POST", "/api/admin/create-user", Some(tok), &dup).await;
    assert_eq!(res, Err(ApiError::PermissionDenied));

    let res: Result<AuthToken, _> = run_on_app(
        &mut t.app,
        "POST",
        "/api/admin/create-session",
        Some(t.admin),
        &NewSession {
            user: String::from("nobody"),
            device: String::from("test"),
        },
    )
    .await;
    assert_eq!(res, Err(ApiError::PermissionDenied));
}

#[tokio::test]
async fn health() {
    let mut t = TestApp::new().await;
    let h: Health = run_on_app(&mut t.app, "GET", "/api/health", None, &())
        .await
        .expect("querying health");
    assert_eq!(h.status, "OK");
}

#[tokio::test]
async fn long_reply_chain() {
    let mut t = TestApp::new().await;
    let (_, tok) = t.user("Alex").await;
    let mut chain = Vec::new();
    let mut parent = None;
    for i in 0..250 {
        let c = t.post(tok, parent, &format!("level {i}")).await.unwrap();
        parent = Some(c.id);
        chain.push(c.id);
    }

    let forest = t.forest().await;
    assert_eq!(threadboard_api::count_nodes(&forest), 250);
    assert_eq!(threadboard_api::forest_ids(&forest), chain);
    let mut deepest = &forest[0];
    while let Some(r) = deepest.replies.first() {
        deepest = r;
    }
    assert_eq!(deepest.comment.content, "level 249");

    assert_eq!(t.delete(tok, chain[0]).await, Ok(DeleteConfirmation::new(250)));
    assert_eq!(t.forest().await, vec![]);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_replies_all_land() {
    let mut t = TestApp::new().await;
    let (_, tok) = t.user("Alex").await;
    let root = t.post(tok, None, "root").await.unwrap().id;

    let tasks = (0..64)
        .map(|i| {
            let mut app = t.app.clone();
            tokio::spawn(async move {
                run_on_app::<_, Comment>(
                    &mut app,
                    "POST",
                    "/api/comments",
                    Some(tok),
                    &NewComment::reply(root, format!("reply {i}")),
                )
                .await
            })
        })
        .collect::<Vec<_>>();
    let mut created = Vec::new();
    for task in tasks {
        created.push(task.await.expect("joining task").expect("creating reply").id);
    }

    let forest = t.forest().await;
    assert_eq!(forest.len(), 1);
    let mut got = forest[0].replies.iter().map(|r| r.id()).collect::<Vec<_>>();
    got.sort();
    created.sort();
    assert_eq!(got, created);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_deletions_and_replies() {
    let mut t = TestApp::new().await;
    let (_, tok) = t.user("Alex").await;
    let keep = t.post(tok, None, "keep").await.unwrap().id;
    let mut doomed = Vec::new();
    for i in 0..16 {
        let c = t.post(tok, None, &format!("doomed {i}")).await.unwrap().id;
        t.post(tok, Some(c), "reply").await.unwrap();
        doomed.push(c);
    }

    let deletions = doomed
        .iter()
        .map(|&c| {
            let mut app = t.app.clone();
            tokio::spawn(async move {
                run_on_app::<_, DeleteConfirmation>(
                    &mut app,
                    "DELETE",
                    &format!("/api/comments/{}", c.0),
                    Some(tok),
                    &(),
                )
                .await
            })
        })
        .collect::<Vec<_>>();
    let replies = (0..16)
        .map(|i| {
            let mut app = t.app.clone();
            tokio::spawn(async move {
                run_on_app::<_, Comment>(
                    &mut app,
                    "POST",
                    "/api/comments",
                    Some(tok),
                    &NewComment::reply(keep, format!("kept {i}")),
                )
                .await
            })
        })
        .collect::<Vec<_>>();
    for task in deletions {
        assert_eq!(
            task.await.expect("joining task"),
            Ok(DeleteConfirmation::new(2))
        );
    }
    for task in replies {
        task.await.expect("joining task").expect("creating reply");
    }

    let forest = t.forest().await;
    assert_eq!(forest.len(), 1);
    assert_eq!(forest[0].id(), keep);
    assert_eq!(forest[0].replies.len(), 16);
}

async fn next_feed_message<S>(ws: &mut S) -> FeedMessage
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for feed message")
            .expect("feed closed")
            .expect("reading from feed");
        match msg {
            Message::Binary(b) => return serde_json::from_slice(&b).expect("parsing message"),
            Message::Ping(_) | Message::Pong(_) => continue,
            m => panic!("unexpected feed message {m:?}"),
        }
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn feed_receives_broadcasts() {
    let mut t = TestApp::new().await;
    let (_, tok) = t.user("Alex").await;

    let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("binding listener");
    let addr = listener.local_addr().expect("getting listener address");
    let server = axum::Server::from_tcp(listener)
        .expect("building server")
        .serve(app(t.state.clone()).into_make_service());
    tokio::spawn(server);

    let (mut ws, _) = tokio_tungstenite::connect_async(format!("ws://{addr}/ws/comment-feed"))
        .await
        .expect("connecting to the feed");
    assert_eq!(
        ws.next().await.map(|m| m.expect("reading from feed")),
        Some(Message::Text(String::from("ok")))
    );
    assert_eq!(t.state.feeds.len().await, 1);

    ws.send(Message::Text(String::from("ping"))).await.unwrap();
    assert_eq!(next_feed_message(&mut ws).await, FeedMessage::Pong);

    let c = t.post(tok, None, "hello").await.unwrap();
    match next_feed_message(&mut ws).await {
        FeedMessage::CommentCreated(got) => {
            assert_eq!(got.id, c.id);
            assert_eq!(got.content, "hello");
            assert_eq!(got.author.email, None);
        }
        m => panic!("expected a creation, got {m:?}"),
    }

    t.delete(tok, c.id).await.unwrap();
    assert_eq!(
        next_feed_message(&mut ws).await,
        FeedMessage::CommentDeleted(c.id)
    );

    // failed operations are not broadcast
    assert!(t.delete(tok, c.id).await.is_err());

    ws.close(None).await.unwrap();
    let since = std::time::Instant::now();
    while t.state.feeds.len().await != 0 && since.elapsed() <= Duration::from_secs(5) {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(t.state.feeds.len().await, 0);
}
