use std::{net::SocketAddr, str::FromStr};

use anyhow::Context;
use axum::{
    routing::{delete, get, post},
    Router,
};
use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use structopt::StructOpt;
use threadboard_api::{AuthToken, Uuid};
use tower_http::trace::TraceLayer;

mod db;
mod error;
mod extractors;
mod feeds;
mod fuzz;
mod handlers;
mod scenarios;

use error::Error;
use extractors::AppState;
use feeds::CommentFeeds;

static MIGRATOR: Migrator = sqlx::migrate!();

#[derive(Debug, StructOpt)]
#[structopt(name = "threadboard-server", about = "Threaded comment board server")]
struct Opt {
    /// Address to listen on
    #[structopt(long, default_value = "127.0.0.1:5000")]
    listen: SocketAddr,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let db_url = std::env::var("DATABASE_URL").context("DATABASE_URL must be set")?;
    let admin_token = match std::env::var("ADMIN_TOKEN") {
        Ok(t) => Some(AuthToken(
            Uuid::try_parse(&t).context("ADMIN_TOKEN is not a valid uuid")?,
        )),
        Err(_) => {
            tracing::info!("ADMIN_TOKEN is not set, admin routes are disabled");
            None
        }
    };

    let options = SqliteConnectOptions::from_str(&db_url)
        .with_context(|| format!("parsing database url {:?}", db_url))?
        .create_if_missing(true);
    let db = create_sqlx_pool(options)
        .await
        .with_context(|| format!("opening database {:?}", db_url))?;
    MIGRATOR
        .run(&db)
        .await
        .context("failed applying migrations")?;

    let app = app(AppState::new(db, admin_token));

    tracing::info!("listening on {}", opt.listen);
    axum::Server::bind(&opt.listen)
        .serve(app.into_make_service())
        .await
        .context("serving axum webserver")
}

pub async fn create_sqlx_pool(options: SqliteConnectOptions) -> anyhow::Result<sqlx::SqlitePool> {
    SqlitePoolOptions::new()
        .max_connections(8)
        .connect_with(options)
        .await
        .context("connecting to the database")
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health))
        .route("/api/admin/create-user", post(handlers::admin_create_user))
        .route(
            "/api/admin/create-session",
            post(handlers::admin_create_session),
        )
        .route("/api/whoami", get(handlers::whoami))
        .route(
            "/api/comments",
            get(handlers::fetch_comments).post(handlers::create_comment),
        )
        .route("/api/comments/:id", delete(handlers::delete_comment))
        .route("/ws/comment-feed", get(handlers::comment_feed))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
