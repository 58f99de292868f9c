use std::{collections::HashMap, sync::Arc};

use axum::extract::ws::Message;
use futures::{channel::mpsc, select, SinkExt, StreamExt};
use threadboard_api::{FeedMessage, Uuid};
use tokio::sync::RwLock;

/// Every websocket currently subscribed to the comment feed
#[derive(Clone, Debug)]
pub struct CommentFeeds(Arc<RwLock<HashMap<Uuid, mpsc::UnboundedSender<FeedMessage>>>>);

impl CommentFeeds {
    pub fn new() -> CommentFeeds {
        CommentFeeds(Arc::new(RwLock::new(HashMap::new())))
    }

    pub async fn len(&self) -> usize {
        self.0.read().await.len()
    }

    /// Registers the websocket, then answers "ok" on it and spawns the task
    /// relaying broadcasts to it. The subscriber is removed as soon as the
    /// socket closes, fails, or sends anything but a ping.
    pub async fn add<W, R>(self, mut write: W, read: R)
    where
        W: 'static + Send + Unpin + futures::Sink<Message>,
        <W as futures::Sink<Message>>::Error: Send,
        R: 'static + Send + Unpin + futures::Stream<Item = Result<Message, axum::Error>>,
    {
        // Note: if this were bounded, there would be a deadlock between the write-lock to remove a channel and the read-lock to send an event to all sockets
        let (sender, mut receiver) = mpsc::unbounded();
        let sender_id = Uuid::new_v4();
        self.0.write().await.insert(sender_id, sender);

        if write.send(Message::Text(String::from("ok"))).await.is_err() {
            self.0.write().await.remove(&sender_id);
            return;
        }

        let this = self.clone();
        let mut read = read.fuse();
        tokio::spawn(async move {
            macro_rules! remove_self {
                () => {{
                    this.0.write().await.remove(&sender_id);
                    tracing::debug!(?sender_id, "comment feed websocket disconnected");
                    return;
                }};
            }
            macro_rules! send_message {
                ( $msg:expr ) => {{
                    let msg: FeedMessage = $msg;
                    let json = match serde_json::to_vec(&msg) {
                        Ok(json) => json,
                        Err(err) => {
                            tracing::error!(?err, ?msg, "failed serializing message to json");
                            continue;
                        }
                    };
                    if write.send(Message::Binary(json)).await.is_err() {
                        remove_self!();
                    }
                }};
            }
            loop {
                select! {
                    msg = receiver.next() => match msg {
                        None => remove_self!(),
                        Some(msg) => send_message!(msg),
                    },
                    msg = read.next() => match msg {
                        None => remove_self!(),
                        Some(Ok(Message::Close(_))) => remove_self!(),
                        Some(Ok(Message::Text(msg))) if msg == "ping" => {
                            send_message!(FeedMessage::Pong);
                        }
                        // websocket-level keepalives are answered by the protocol layer
                        Some(Ok(Message::Ping(_) | Message::Pong(_))) => (),
                        Some(msg) => {
                            tracing::warn!("received unexpected message from client: {msg:?}");
                            remove_self!();
                        }
                    },
                }
            }
        });
    }

    /// Pushes `msg` to every subscriber, without waiting for delivery
    pub async fn relay(&self, msg: FeedMessage) {
        let feeds = self.0.read().await;
        tracing::debug!(subscribers = feeds.len(), "relaying feed message");
        for s in feeds.values() {
            // failure means the relay task is exiting and will deregister itself
            let _ = s.unbounded_send(msg.clone());
        }
    }
}
