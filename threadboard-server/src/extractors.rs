use std::ops::{Deref, DerefMut};

use anyhow::Context;
use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{self, request},
};
use threadboard_api::{AuthToken, UserId, Uuid};

use crate::{db, CommentFeeds, Error};

#[derive(Clone, axum::extract::FromRef)]
pub struct AppState {
    pub db: SqlitePool,
    pub feeds: CommentFeeds,
    pub admin_token: Option<AuthToken>,
}

impl AppState {
    pub fn new(pool: sqlx::SqlitePool, admin_token: Option<AuthToken>) -> AppState {
        AppState {
            db: SqlitePool::new(pool),
            feeds: CommentFeeds::new(),
            admin_token,
        }
    }
}

#[derive(Clone)]
pub struct SqlitePool(sqlx::SqlitePool);

impl SqlitePool {
    pub fn new(pool: sqlx::SqlitePool) -> SqlitePool {
        SqlitePool(pool)
    }

    pub async fn acquire(&self) -> Result<SqliteConn, Error> {
        Ok(SqliteConn(
            self.0.acquire().await.context("acquiring db connection")?,
        ))
    }
}

pub struct SqliteConn(sqlx::pool::PoolConnection<sqlx::Sqlite>);

#[async_trait]
impl FromRequestParts<AppState> for SqliteConn {
    type Rejection = Error;

    async fn from_request_parts(
        _req: &mut request::Parts,
        state: &AppState,
    ) -> Result<SqliteConn, Error> {
        state.db.acquire().await
    }
}

impl Deref for SqliteConn {
    type Target = sqlx::SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for SqliteConn {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

pub struct PreAuth(pub AuthToken);

#[async_trait]
impl<S: Sync> FromRequestParts<S> for PreAuth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, _state: &S) -> Result<PreAuth, Error> {
        let auth = req
            .headers
            .get(http::header::AUTHORIZATION)
            .ok_or_else(Error::permission_denied)?;
        let auth = auth.to_str().map_err(|_| Error::permission_denied())?;
        let mut auth = auth.split(' ');
        if !auth
            .next()
            .ok_or_else(Error::permission_denied)?
            .eq_ignore_ascii_case("bearer")
        {
            return Err(Error::permission_denied());
        }
        let token = auth.next().ok_or_else(Error::permission_denied)?;
        if auth.next().is_some() {
            return Err(Error::permission_denied());
        }
        let token = Uuid::try_from(token).map_err(|_| Error::permission_denied())?;
        Ok(PreAuth(AuthToken(token)))
    }
}

pub struct Auth(pub UserId);

#[async_trait]
impl FromRequestParts<AppState> for Auth {
    type Rejection = Error;

    async fn from_request_parts(req: &mut request::Parts, state: &AppState) -> Result<Auth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        let mut conn = SqliteConn::from_request_parts(req, state).await?;
        Ok(Auth(db::recover_session(&mut *conn, token).await??))
    }
}

pub struct AdminAuth;

#[async_trait]
impl FromRequestParts<AppState> for AdminAuth {
    type Rejection = Error;

    async fn from_request_parts(
        req: &mut request::Parts,
        state: &AppState,
    ) -> Result<AdminAuth, Error> {
        let token = PreAuth::from_request_parts(req, state).await?.0;
        if Some(token) == state.admin_token {
            Ok(AdminAuth)
        } else {
            Err(Error::permission_denied())
        }
    }
}
