use std::time::{Duration, Instant};

use anyhow::bail;
use futures::{SinkExt, StreamExt};
use threadboard_client::{api::FeedMessage, Backoff, Board, Refresh};
use tokio_tungstenite::tungstenite::Message;

use crate::{api::Api, render};

// Pings will be sent every PING_INTERVAL
const PING_INTERVAL: Duration = Duration::from_secs(10);
// Consider the connection lost after DISCONNECT_INTERVAL without a pong
const DISCONNECT_INTERVAL: Duration = Duration::from_secs(20);

async fn refetch(api: &Api, board: &mut Board, show_all: bool) -> anyhow::Result<()> {
    let forest = api.fetch_comments().await?;
    board.receive_forest(forest);
    render::expand_all(board, show_all);
    println!("----");
    print!("{}", render::render(board));
    Ok(())
}

/// Refetches the board. On failure the board is marked disconnected and
/// false is returned, so the caller goes through reconnection.
async fn resync(api: &Api, board: &mut Board, show_all: bool) -> bool {
    match refetch(api, board, show_all).await {
        Ok(()) => true,
        Err(err) => {
            tracing::warn!(?err, "failed fetching comments");
            board.disconnected();
            false
        }
    }
}

/// Follows the comment feed, printing the whole board again after every
/// change, until interrupted or until reconnecting failed `backoff.max_attempts`
/// times in a row
pub async fn watch(
    api: &Api,
    board: &mut Board,
    mut backoff: Backoff,
    show_all: bool,
) -> anyhow::Result<()> {
    let ws_url = api.feed_url()?;
    let mut first_attempt = true;
    'reconnect: loop {
        match first_attempt {
            true => first_attempt = false,
            false => {
                board.disconnected();
                let Some(delay) = backoff.next_delay() else {
                    bail!(
                        "lost the comment feed, and {} reconnection attempts failed",
                        backoff.attempts()
                    );
                };
                tracing::warn!(?delay, attempt = backoff.attempts(), "reconnecting to comment feed");
                tokio::time::sleep(delay).await;
            }
        }

        let mut sock = match tokio_tungstenite::connect_async(&ws_url).await {
            Ok((sock, _)) => sock,
            Err(err) => {
                tracing::warn!(?err, "failed connecting to comment feed");
                continue 'reconnect;
            }
        };
        match sock.next().await {
            Some(Ok(Message::Text(t))) if t == "ok" => (),
            msg => {
                tracing::warn!(?msg, "comment feed did not acknowledge the connection");
                continue 'reconnect;
            }
        }
        tracing::info!("connected to comment feed");
        if board.connected() == Refresh::Refetch && !resync(api, board, show_all).await {
            continue 'reconnect;
        }
        backoff.reset();

        let mut ping = tokio::time::interval(PING_INTERVAL);
        let mut last_pong = Instant::now();
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    let _ = sock.close(None).await;
                    tracing::info!("disconnected from comment feed");
                    return Ok(());
                }
                _ = ping.tick() => {
                    if last_pong.elapsed() > DISCONNECT_INTERVAL {
                        tracing::warn!("comment feed stopped answering pings");
                        continue 'reconnect;
                    }
                    if sock.send(Message::Text(String::from("ping"))).await.is_err() {
                        continue 'reconnect;
                    }
                }
                msg = sock.next() => {
                    let msg: FeedMessage = match msg {
                        None | Some(Err(_)) | Some(Ok(Message::Close(_))) => continue 'reconnect,
                        Some(Ok(Message::Binary(b))) => match serde_json::from_slice(&b) {
                            Ok(msg) => msg,
                            Err(err) => {
                                tracing::warn!(?err, "failed parsing comment feed message");
                                continue 'reconnect;
                            }
                        },
                        Some(Ok(_)) => continue,
                    };
                    if msg == FeedMessage::Pong {
                        last_pong = Instant::now();
                    }
                    if board.handle_feed_message(&msg) == Refresh::Refetch
                        && !resync(api, board, show_all).await
                    {
                        continue 'reconnect;
                    }
                }
            }
        }
    }
}
