#![cfg(test)]

use std::{cmp, fmt::Debug, ops::RangeTo, panic::AssertUnwindSafe, path::Path};

use async_recursion::async_recursion;
use bolero::generator::TypeGenerator;
use axum::{
    extract::FromRequestParts,
    http::{self, request},
    Router,
};
use sqlx::sqlite::SqliteConnectOptions;
use threadboard_api::{
    AuthToken, Comment, CommentId, CommentNode, DeleteConfirmation, Error as ApiError,
    NewComment, NewSession, NewUser, UserId, Uuid,
};
use threadboard_mock_server::MockServer;
use tower::{Service, ServiceExt};

use crate::{app, create_sqlx_pool, extractors::*, Error, MIGRATOR};

macro_rules! do_tokio_test {
    ( $name:ident, $typ:ty, $fn:expr ) => {
        #[test]
        fn $name() {
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            bolero::check!()
                .with_type::<$typ>()
                .cloned()
                .for_each(move |v| {
                    let () = runtime.block_on($fn(v));
                })
        }
    };
}

/// Fresh migrated database in `dir`
pub async fn test_pool(dir: &Path) -> sqlx::SqlitePool {
    let pool = create_sqlx_pool(
        SqliteConnectOptions::new()
            .filename(dir.join("test.db"))
            .create_if_missing(true),
    )
    .await
    .expect("creating sqlx pool");
    MIGRATOR
        .run(&pool)
        .await
        .expect("failed applying migrations");
    pool
}

macro_rules! do_sqlx_test {
    ( $name:ident, $gen:expr, $fn:expr ) => {
        #[test]
        fn $name() {
            if std::env::var("RUST_LOG").is_ok() {
                let _ = tracing_subscriber::fmt().try_init();
            }
            let datadir = tempfile::tempdir().expect("creating tempdir");
            let runtime = AssertUnwindSafe(
                tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build()
                    .expect("failed initializing tokio runtime"),
            );
            let pool = AssertUnwindSafe(runtime.block_on(test_pool(datadir.path())));
            bolero::check!()
                .with_generator($gen)
                .cloned()
                .for_each(move |v| {
                    let pool = pool.clone();
                    // run the test
                    let idle_before = pool.num_idle();
                    let v_str = format!("{v:?}");
                    let idle_after_res: Result<usize, _> = {
                        let pool = pool.clone();
                        std::panic::catch_unwind(AssertUnwindSafe(|| {
                            runtime.block_on(async move {
                                let () = $fn(pool.clone(), v).await;
                                let mut idle_after = pool.num_idle();
                                let wait_release_since = std::time::Instant::now();
                                while idle_after < idle_before
                                    && wait_release_since.elapsed()
                                        <= std::time::Duration::from_secs(1)
                                {
                                    tokio::task::yield_now().await;
                                    idle_after = pool.num_idle();
                                }
                                idle_after
                            })
                        }))
                    };
                    runtime.block_on(async move {
                        // cleanup
                        let mut conn =
                            pool.acquire().await.expect("getting db cleanup connection");
                        sqlx::query(include_str!("../reset-test-db.sql"))
                            .execute(&mut *conn)
                            .await
                            .expect("failed cleaning up database");
                    });
                    // resume the panics
                    match idle_after_res {
                        Err(e) => std::panic::resume_unwind(e),
                        Ok(idle_after) => assert!(
                            idle_after >= idle_before,
                            "test {} held onto pool after exiting test: before there were {idle_before} connections, and after there were {idle_after} with value {v_str}",
                            stringify!($name)
                        ),
                    }
                });
        }
    };
}

do_tokio_test!(fuzz_preauth_extractor, String, |token| async move {
    if let Ok(req) = http::Request::builder()
        .method(http::Method::GET)
        .uri("/")
        .header(http::header::AUTHORIZATION, token)
        .body(())
    {
        let mut req = req.into_parts().0;
        let res = PreAuth::from_request_parts(&mut req, &()).await;
        match res {
            Ok(_) => (),
            Err(Error::Api(ApiError::PermissionDenied)) => (),
            Err(e) => panic!("got unexpected error: {e}"),
        }
    }
});

#[derive(Clone, Debug, bolero::generator::TypeGenerator)]
enum FuzzOp {
    CreateUser {
        #[generator(bolero::generator::gen_with::<String>().len(1..12usize))]
        name: String,
        avatar: Option<u8>,
    },
    CreateSession {
        uid: usize,
    },
    Whoami {
        sid: usize,
    },
    Post {
        sid: usize,
        parent: Option<usize>,
        #[generator(bolero::generator::gen_with::<String>().len(0..40usize))]
        content: String,
    },
    Delete {
        sid: usize,
        cid: usize,
    },
    FetchComments,
}

pub async fn call<Req, Resp>(
    app: &mut Router,
    req: request::Request<axum::body::Body>,
    req_body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    app.ready().await.expect("waiting for app to be ready");
    let resp = app.call(req).await.expect("running request");
    let status = resp.status();
    let body = hyper::body::to_bytes(resp.into_body())
        .await
        .expect("recovering resp bytes");
    if status.is_success() {
        if std::any::TypeId::of::<Resp>() == std::any::TypeId::of::<()>() {
            // the server returns an empty string in this situation, which does not parse properly with serde_json
            return Ok(serde_json::from_slice(b"null").unwrap());
        } else {
            return Ok(threadboard_api::from_json(&body).unwrap_or_else(|err| {
                panic!(
                    r#"
                        Failed parsing resp body!

                        The error is the following:
                        ---
                        {err:?}
                        ---

                        Response body is:
                        ---
                        {body:?}
                        ---

                        Request was:
                        ---
                        {req_body:?}
                        ---
                    "#
                )
            }));
        }
    }
    Err(ApiError::parse(&body)
        .unwrap_or_else(|err| panic!("parsing error response body {err}, body is {body:?}")))
}

pub async fn run_on_app<Req, Resp>(
    app: &mut Router,
    method: &str,
    uri: &str,
    token: Option<Uuid>,
    body: &Req,
) -> Result<Resp, ApiError>
where
    Req: Debug + serde::Serialize,
    Resp: 'static + for<'de> serde::Deserialize<'de>,
{
    let req = request::Builder::new()
        .method(method)
        .uri(uri)
        .header(http::header::CONTENT_TYPE, "application/json");
    let req = match token {
        Some(token) => req.header(http::header::AUTHORIZATION, format!("bearer {token}")),
        None => req,
    };
    let req = req
        .body(axum::body::Body::from(
            serde_json::to_vec(body).expect("serializing request body to json"),
        ))
        .expect("building request");
    call(app, req, body).await
}

fn compare<T>(name: &str, app_res: Result<T, ApiError>, mock_res: Result<T, ApiError>)
where
    T: Debug + PartialEq,
{
    assert_eq!(
        app_res, mock_res,
        "app and mock did not return the same result for {name}"
    );
}

/// Comment ids differ between app and mock, so errors naming them cannot be
/// compared as is
fn normalize<T>(res: Result<T, ApiError>) -> Result<T, ApiError> {
    res.map_err(|e| match e {
        ApiError::NotFound(_) => ApiError::NotFound(CommentId::stub()),
        e => e,
    })
}

fn resize_int(fuzz_id: usize, RangeTo { end }: RangeTo<usize>) -> Option<usize> {
    if end == 0 {
        return None;
    }
    let bucket_size = cmp::max(1, usize::MAX / end); // in case we rounded to 0
    let id = fuzz_id / bucket_size;
    Some(cmp::min(id, end - 1)) // in case id was actually over end - 1 due to rounding
}

/// What must agree between app and mock in a forest, ids and dates excluded
#[derive(Debug, PartialEq)]
struct Shape {
    author: UserId,
    content: String,
    replies: Vec<Shape>,
}

fn shape(forest: &[CommentNode]) -> Vec<Shape> {
    forest
        .iter()
        .map(|n| Shape {
            author: n.comment.author_id,
            content: n.comment.content.clone(),
            replies: shape(&n.replies),
        })
        .collect()
}

fn summarize(c: Comment) -> (UserId, String, Option<String>, String) {
    (c.author_id, c.author.name, c.author.email, c.content)
}

struct Session {
    app: AuthToken,
    mock: AuthToken,
}

struct Posted {
    app: CommentId,
    mock: CommentId,
}

struct ComparativeFuzzer {
    admin_token: Uuid,
    app: Router,
    mock: MockServer,
    sessions: Vec<Session>,
    comments: Vec<Posted>,
}

impl ComparativeFuzzer {
    fn new(pool: sqlx::SqlitePool) -> ComparativeFuzzer {
        let admin_token = Uuid::new_v4();
        let app = app(AppState::new(pool, Some(AuthToken(admin_token))));
        ComparativeFuzzer {
            admin_token,
            app,
            mock: MockServer::new(),
            sessions: Vec::new(),
            comments: Vec::new(),
        }
    }

    /// Tokens of session `sid`, or tokens no session has if there is none
    fn session(&self, sid: usize) -> (Uuid, AuthToken) {
        match resize_int(sid, ..self.sessions.len()) {
            Some(sid) => (self.sessions[sid].app.0, self.sessions[sid].mock),
            None => (AuthToken::stub().0, AuthToken::stub()),
        }
    }

    #[async_recursion]
    async fn execute_fuzz_op(&mut self, op: FuzzOp) {
        match op {
            FuzzOp::CreateUser { name, avatar } => {
                let new_user = NewUser::new(
                    UserId(Uuid::new_v4()),
                    name.clone(),
                    format!("{name}@example.com"),
                    avatar.map(|n| format!("https://i.pravatar.cc/60?img={n}")),
                );
                compare(
                    "CreateUser",
                    run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-user",
                        Some(self.admin_token),
                        &new_user,
                    )
                    .await,
                    self.mock.admin_create_user(new_user),
                )
            }
            FuzzOp::CreateSession { uid } => {
                if let Some(uid) = resize_int(uid, ..self.mock.test_num_users()) {
                    let session = NewSession {
                        user: String::from(self.mock.test_get_user_name(uid)),
                        device: String::from("fuzzer"),
                    };
                    let app_tok = run_on_app(
                        &mut self.app,
                        "POST",
                        "/api/admin/create-session",
                        Some(self.admin_token),
                        &session,
                    )
                    .await;
                    let mock_tok = self.mock.admin_create_session(session);
                    if let (&Ok(app), &Ok(mock)) = (&app_tok, &mock_tok) {
                        self.sessions.push(Session { app, mock });
                    }
                    compare("CreateSession", app_tok.map(|_| ()), mock_tok.map(|_| ()));
                } else {
                    self.execute_fuzz_op(FuzzOp::CreateUser {
                        name: String::from("user"),
                        avatar: None,
                    })
                    .await;
                    self.execute_fuzz_op(FuzzOp::CreateSession { uid }).await;
                }
            }
            FuzzOp::Whoami { sid } => {
                let (app_tok, mock_tok) = self.session(sid);
                compare(
                    "Whoami",
                    run_on_app(&mut self.app, "GET", "/api/whoami", Some(app_tok), &()).await,
                    self.mock.whoami(mock_tok),
                )
            }
            FuzzOp::Post {
                sid,
                parent,
                content,
            } => {
                let (app_tok, mock_tok) = self.session(sid);
                let (app_parent, mock_parent) =
                    match parent.and_then(|p| resize_int(p, ..self.comments.len())) {
                        Some(p) => (
                            Some(self.comments[p].app),
                            Some(self.comments[p].mock),
                        ),
                        None => (None, None),
                    };
                let app_res = run_on_app::<_, Comment>(
                    &mut self.app,
                    "POST",
                    "/api/comments",
                    Some(app_tok),
                    &NewComment {
                        content: content.clone(),
                        parent_id: app_parent,
                    },
                )
                .await;
                let mock_res = self.mock.create_comment(
                    mock_tok,
                    NewComment {
                        content,
                        parent_id: mock_parent,
                    },
                );
                if let (Ok(app), Ok(mock)) = (&app_res, &mock_res) {
                    assert_eq!(app.parent_id, app_parent);
                    self.comments.push(Posted {
                        app: app.id,
                        mock: mock.id,
                    });
                }
                compare(
                    "Post",
                    normalize(app_res.map(summarize)),
                    normalize(mock_res.map(summarize)),
                )
            }
            FuzzOp::Delete { sid, cid } => {
                let Some(cid) = resize_int(cid, ..self.comments.len()) else {
                    return;
                };
                let (app_tok, mock_tok) = self.session(sid);
                let app_res = run_on_app::<_, DeleteConfirmation>(
                    &mut self.app,
                    "DELETE",
                    &format!("/api/comments/{}", self.comments[cid].app.0),
                    Some(app_tok),
                    &(),
                )
                .await;
                let mock_res = self
                    .mock
                    .delete_comment(mock_tok, self.comments[cid].mock)
                    .await;
                compare("Delete", normalize(app_res), normalize(mock_res))
            }
            FuzzOp::FetchComments => {
                let app_res =
                    run_on_app::<_, Vec<CommentNode>>(&mut self.app, "GET", "/api/comments", None, &())
                        .await;
                compare(
                    "FetchComments",
                    app_res.map(|f| shape(&f)),
                    Ok(shape(&self.mock.fetch_comments())),
                )
            }
        }
    }
}

do_sqlx_test!(
    compare_with_mock,
    bolero::generator::gen_with::<Vec<FuzzOp>>().len(1..60usize),
    |pool, test: Vec<FuzzOp>| async move {
        let mut fuzzer = ComparativeFuzzer::new(pool);
        for op in test {
            fuzzer.execute_fuzz_op(op).await;
        }
        // catch whatever divergence the last operations left behind
        fuzzer.execute_fuzz_op(FuzzOp::FetchComments).await;
    }
);
