use anyhow::{anyhow, Context};
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use futures::TryStreamExt;
use sqlx::{sqlite::SqliteRow, Connection, Row, Sqlite, Transaction};
use threadboard_api::{
    Author, AuthToken, Comment, CommentId, Error as ApiError, NewComment, NewSession, NewUser,
    Time, UserId, Uuid,
};

pub async fn create_user(
    conn: &mut sqlx::SqliteConnection,
    user: NewUser,
) -> anyhow::Result<Result<(), ApiError>> {
    if let Err(e) = user.validate() {
        return Ok(Err(e));
    }
    let name_taken = sqlx::query("SELECT 1 FROM users WHERE name = ?")
        .bind(&user.name)
        .fetch_optional(&mut *conn)
        .await
        .context("checking for name conflicts")?;
    if name_taken.is_some() {
        return Ok(Err(ApiError::NameAlreadyUsed(user.name)));
    }
    let id_taken = sqlx::query("SELECT 1 FROM users WHERE id = ?")
        .bind(user.id.0)
        .fetch_optional(&mut *conn)
        .await
        .context("checking for uuid conflicts")?;
    if id_taken.is_some() {
        return Ok(Err(ApiError::UuidAlreadyUsed(user.id.0)));
    }
    sqlx::query("INSERT INTO users (id, name, email, avatar) VALUES (?, ?, ?, ?)")
        .bind(user.id.0)
        .bind(&user.name)
        .bind(&user.email)
        .bind(&user.avatar)
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting user {:?}", user.id))?;
    Ok(Ok(()))
}

pub async fn create_session(
    conn: &mut sqlx::SqliteConnection,
    session: &NewSession,
) -> anyhow::Result<Result<AuthToken, ApiError>> {
    if let Err(e) = session.validate() {
        return Ok(Err(e));
    }
    let user = sqlx::query("SELECT id FROM users WHERE name = ?")
        .bind(&session.user)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching user {:?}", session.user))?;
    let user = match user {
        None => return Ok(Err(ApiError::PermissionDenied)),
        Some(u) => u
            .try_get::<Uuid, _>("id")
            .context("retrieving the id field")?,
    };
    let token = Uuid::new_v4();
    sqlx::query("INSERT INTO sessions (id, user_id, device, created_at) VALUES (?, ?, ?, ?)")
        .bind(token)
        .bind(user)
        .bind(&session.device)
        .bind(Utc::now().timestamp_millis())
        .execute(&mut *conn)
        .await
        .with_context(|| format!("inserting session for user {:?}", user))?;
    Ok(Ok(AuthToken(token)))
}

pub async fn recover_session(
    conn: &mut sqlx::SqliteConnection,
    token: AuthToken,
) -> anyhow::Result<Result<UserId, ApiError>> {
    let res = sqlx::query("SELECT user_id FROM sessions WHERE id = ?")
        .bind(token.0)
        .fetch_optional(&mut *conn)
        .await
        .context("recovering session")?;
    match res {
        None => Ok(Err(ApiError::PermissionDenied)),
        Some(row) => Ok(Ok(UserId(
            row.try_get("user_id")
                .context("retrieving the user_id field")?,
        ))),
    }
}

const COMMENT_COLUMNS: &str = "
    c.id, c.author_id, c.parent_id, c.content, c.created_at, c.updated_at,
    u.name AS author_name, u.avatar AS author_avatar, u.email AS author_email
";

fn time_from_millis(ms: i64) -> anyhow::Result<Time> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| anyhow!("timestamp {ms} is out of range"))
}

/// Parses a row selected with `COMMENT_COLUMNS`. The author's email is only
/// kept if `with_email` is set.
fn comment_from_row(row: &SqliteRow, with_email: bool) -> anyhow::Result<Comment> {
    Ok(Comment {
        id: CommentId(row.try_get("id").context("retrieving the id field")?),
        author_id: UserId(
            row.try_get("author_id")
                .context("retrieving the author_id field")?,
        ),
        author: Author {
            name: row
                .try_get("author_name")
                .context("retrieving the author_name field")?,
            avatar: row
                .try_get("author_avatar")
                .context("retrieving the author_avatar field")?,
            email: match with_email {
                false => None,
                true => Some(
                    row.try_get("author_email")
                        .context("retrieving the author_email field")?,
                ),
            },
        },
        content: row
            .try_get("content")
            .context("retrieving the content field")?,
        parent_id: row
            .try_get::<Option<Uuid>, _>("parent_id")
            .context("retrieving the parent_id field")?
            .map(CommentId),
        created_at: time_from_millis(
            row.try_get("created_at")
                .context("retrieving the created_at field")?,
        )?,
        updated_at: time_from_millis(
            row.try_get("updated_at")
                .context("retrieving the updated_at field")?,
        )?,
    })
}

/// Every comment, oldest first, authors projected to their public fields
pub async fn fetch_comments(conn: &mut sqlx::SqliteConnection) -> anyhow::Result<Vec<Comment>> {
    let query = format!(
        "
            SELECT {COMMENT_COLUMNS}
                FROM comments c
            INNER JOIN users u
                ON u.id = c.author_id
            ORDER BY c.created_at ASC, c.rowid ASC
        "
    );
    let mut rows = sqlx::query(&query).fetch(&mut *conn);
    let mut res = Vec::new();
    while let Some(row) = rows.try_next().await.context("querying comments table")? {
        res.push(comment_from_row(&row, false)?);
    }
    Ok(res)
}

pub async fn fetch_comment(
    conn: &mut sqlx::SqliteConnection,
    id: CommentId,
    with_email: bool,
) -> anyhow::Result<Option<Comment>> {
    let query = format!(
        "
            SELECT {COMMENT_COLUMNS}
                FROM comments c
            INNER JOIN users u
                ON u.id = c.author_id
            WHERE c.id = ?
        "
    );
    let row = sqlx::query(&query)
        .bind(id.0)
        .fetch_optional(&mut *conn)
        .await
        .with_context(|| format!("fetching comment {:?}", id))?;
    row.map(|r| comment_from_row(&r, with_email)).transpose()
}

/// Opens a transaction that holds the database write lock from its first
/// statement on.
///
/// sqlx only issues a deferred `BEGIN`. A deferred transaction that reads
/// before writing gets SQLITE_BUSY right away, without waiting for the busy
/// timeout, when another connection took the write lock in between.
/// Starting with a write makes concurrent writers queue on the lock instead.
async fn begin_write(
    conn: &mut sqlx::SqliteConnection,
) -> anyhow::Result<Transaction<'_, Sqlite>> {
    let mut tx = conn.begin().await.context("starting transaction")?;
    // matches no row, but takes the write lock
    sqlx::query("UPDATE comments SET updated_at = updated_at WHERE 0")
        .execute(&mut *tx)
        .await
        .context("taking the write lock")?;
    Ok(tx)
}

/// Inserts a comment written by `author`, returning it with the author's
/// email populated
pub async fn create_comment(
    conn: &mut sqlx::SqliteConnection,
    author: UserId,
    data: NewComment,
) -> anyhow::Result<Result<Comment, ApiError>> {
    let content = match data.validate() {
        Ok(c) => c,
        Err(e) => return Ok(Err(e)),
    };
    let mut tx = begin_write(conn).await?;
    if let Some(parent) = data.parent_id {
        let exists = sqlx::query("SELECT 1 FROM comments WHERE id = ?")
            .bind(parent.0)
            .fetch_optional(&mut *tx)
            .await
            .with_context(|| format!("checking existence of parent {:?}", parent))?;
        if exists.is_none() {
            return Ok(Err(ApiError::NotFound(parent)));
        }
    }
    let id = CommentId(Uuid::new_v4());
    let now = Utc::now().timestamp_millis();
    sqlx::query(
        "
            INSERT INTO comments (id, author_id, parent_id, content, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?)
        ",
    )
    .bind(id.0)
    .bind(author.0)
    .bind(data.parent_id.map(|p| p.0))
    .bind(&content)
    .bind(now)
    .bind(now)
    .execute(&mut *tx)
    .await
    .with_context(|| format!("inserting comment {:?}", id))?;
    let comment = fetch_comment(&mut *tx, id, true)
        .await?
        .ok_or_else(|| anyhow!("comment {:?} vanished right after insertion", id))?;
    tx.commit().await.context("committing transaction")?;
    Ok(Ok(comment))
}

/// Cascade-deletes `root` on behalf of `actor`, all at once or not at all
pub async fn delete_comment(
    conn: &mut sqlx::SqliteConnection,
    actor: UserId,
    root: CommentId,
) -> anyhow::Result<Result<Vec<CommentId>, ApiError>> {
    let mut tx = begin_write(conn).await?;
    let res = threadboard_api::delete_thread(&mut SqliteDb { conn: &mut *tx }, actor, root)
        .await?;
    if res.is_ok() {
        tx.commit().await.context("committing transaction")?;
    }
    Ok(res)
}

pub struct SqliteDb<'a> {
    pub conn: &'a mut sqlx::SqliteConnection,
}

#[async_trait]
impl<'a> threadboard_api::Db for SqliteDb<'a> {
    async fn comment_author(&mut self, c: CommentId) -> anyhow::Result<Option<UserId>> {
        let row = sqlx::query("SELECT author_id FROM comments WHERE id = ?")
            .bind(c.0)
            .fetch_optional(&mut *self.conn)
            .await
            .context("querying comments table")?;
        row.map(|r| {
            Ok(UserId(
                r.try_get("author_id")
                    .context("retrieving the author_id field")?,
            ))
        })
        .transpose()
    }

    async fn list_replies(&mut self, c: CommentId) -> anyhow::Result<Vec<CommentId>> {
        let mut rows = sqlx::query(
            "SELECT id FROM comments WHERE parent_id = ? ORDER BY created_at ASC, rowid ASC",
        )
        .bind(c.0)
        .fetch(&mut *self.conn);
        let mut res = Vec::new();
        while let Some(r) = rows.try_next().await.context("querying comments table")? {
            res.push(CommentId(r.try_get("id").context("retrieving the id field")?));
        }
        Ok(res)
    }

    async fn remove_comment(&mut self, c: CommentId) -> anyhow::Result<()> {
        sqlx::query("DELETE FROM comments WHERE id = ?")
            .bind(c.0)
            .execute(&mut *self.conn)
            .await
            .context("deleting from comments table")?;
        Ok(())
    }
}
