use anyhow::Context;
use axum::{
    extract::{Path, State, WebSocketUpgrade},
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};
use chrono::Utc;
use futures::StreamExt;
use threadboard_api::{
    AuthToken, Comment, CommentId, DeleteConfirmation, FeedMessage, Health, NewComment,
    NewSession, NewUser, UserId, Uuid,
};

use crate::{db, extractors::*, CommentFeeds, Error};

pub async fn health() -> Json<Health> {
    Json(Health {
        status: String::from("OK"),
        timestamp: Utc::now(),
    })
}

pub async fn admin_create_user(
    AdminAuth: AdminAuth,
    mut conn: SqliteConn,
    Json(data): Json<NewUser>,
) -> Result<(), Error> {
    let id = data.id;
    db::create_user(&mut *conn, data)
        .await
        .with_context(|| format!("creating user {:?}", id))??;
    Ok(())
}

pub async fn admin_create_session(
    AdminAuth: AdminAuth,
    mut conn: SqliteConn,
    Json(data): Json<NewSession>,
) -> Result<Json<AuthToken>, Error> {
    Ok(Json(
        db::create_session(&mut *conn, &data)
            .await
            .with_context(|| format!("creating session for {:?}", data.user))??,
    ))
}

pub async fn whoami(Auth(user): Auth) -> Json<UserId> {
    Json(user)
}

pub async fn fetch_comments(mut conn: SqliteConn) -> Result<impl IntoResponse, Error> {
    let comments = db::fetch_comments(&mut *conn)
        .await
        .context("fetching comment list")?;
    let forest = threadboard_api::build_forest(comments);
    // Json would overflow the stack on long reply chains
    let body = threadboard_api::to_json(&forest).context("serializing comment forest")?;
    Ok(([(header::CONTENT_TYPE, "application/json")], body))
}

pub async fn create_comment(
    Auth(user): Auth,
    State(feeds): State<CommentFeeds>,
    mut conn: SqliteConn,
    Json(data): Json<NewComment>,
) -> Result<(StatusCode, Json<Comment>), Error> {
    let comment = db::create_comment(&mut *conn, user, data)
        .await
        .with_context(|| format!("creating comment for {:?}", user))??;
    tracing::debug!(comment=?comment.id, author=?user, "comment created");
    // the author's email is only echoed back to the author
    let mut broadcast = comment.clone();
    broadcast.author.email = None;
    feeds.relay(FeedMessage::CommentCreated(broadcast)).await;
    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn delete_comment(
    Auth(user): Auth,
    State(feeds): State<CommentFeeds>,
    mut conn: SqliteConn,
    Path(id): Path<Uuid>,
) -> Result<Json<DeleteConfirmation>, Error> {
    let id = CommentId(id);
    let deleted = db::delete_comment(&mut *conn, user, id)
        .await
        .with_context(|| format!("deleting comment {:?} for {:?}", id, user))??;
    feeds.relay(FeedMessage::CommentDeleted(id)).await;
    Ok(Json(DeleteConfirmation::new(deleted.len())))
}

pub async fn comment_feed(
    ws: WebSocketUpgrade,
    State(feeds): State<CommentFeeds>,
) -> axum::response::Response {
    ws.on_upgrade(move |sock| async move {
        tracing::debug!("comment feed websocket connected");
        let (write, read) = sock.split();
        feeds.add(write, read).await;
    })
}
