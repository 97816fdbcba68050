//! Live relay for chat events: one pub/sub channel per chat id.
//!
//! Delivery is best effort. Messages are persisted before they are
//! published, and reconnecting clients pull history over HTTP.

use std::collections::HashMap;

use actix::prelude::*;
use log::{debug, error, info};
use serde::Serialize;

use crate::models::Message as ChatMessage;

/// Event fanned out to live subscribers of a chat channel.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    Message(ChatMessage),
    /// A link message awaits moderation. Carries no content.
    PendingLink { message_id: String, chat_id: String },
    LinkApproved(ChatMessage),
    LinkDiscarded { message_id: String, chat_id: String },
}

/// Publish side of the relay, the only part services depend on.
pub trait Relay: Send + Sync {
    fn publish(&self, chat_id: &str, event: RelayEvent);
    /// Delivers only to the listed users' sessions on the channel.
    fn publish_to(&self, chat_id: &str, user_ids: &[String], event: RelayEvent);
    /// Drops every subscription `user_id` holds on the channel.
    fn evict(&self, chat_id: &str, user_id: &str);
}

/// Serialized event delivered to a websocket session.
#[derive(Message, Clone)]
#[rtype(result = "()")]
pub struct WsEvent(pub String);

#[derive(Message)]
#[rtype(result = "()")]
pub struct Join {
    pub chat_id: String,
    pub user_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Leave {
    pub chat_id: String,
    pub addr: Recipient<WsEvent>,
}

/// Removes a session from every channel it joined.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub user_id: String,
    pub addr: Recipient<WsEvent>,
}

#[derive(Message)]
#[rtype(result = "()")]
pub struct Evict {
    pub chat_id: String,
    pub user_id: String,
}

/// `audience` of `None` reaches every subscriber of the channel.
#[derive(Message)]
#[rtype(result = "()")]
pub struct Publish {
    pub chat_id: String,
    pub audience: Option<Vec<String>>,
    pub event: RelayEvent,
}

#[derive(Default)]
pub struct ChatServer {
    channels: HashMap<String, Vec<(String, Recipient<WsEvent>)>>,
}

impl ChatServer {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Actor for ChatServer {
    type Context = Context<Self>;
}

impl Handler<Join> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Join, _: &mut Context<Self>) {
        info!("User {} joined channel {}", msg.user_id, msg.chat_id);
        let members = self.channels.entry(msg.chat_id).or_default();
        if !members.iter().any(|(_, addr)| addr == &msg.addr) {
            members.push((msg.user_id, msg.addr));
        }
    }
}

impl Handler<Leave> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Leave, _: &mut Context<Self>) {
        if let Some(members) = self.channels.get_mut(&msg.chat_id) {
            members.retain(|(_, addr)| addr != &msg.addr);
            if members.is_empty() {
                self.channels.remove(&msg.chat_id);
            }
        }
    }
}

impl Handler<Evict> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Evict, _: &mut Context<Self>) {
        if let Some(members) = self.channels.get_mut(&msg.chat_id) {
            members.retain(|(user_id, _)| *user_id != msg.user_id);
            if members.is_empty() {
                self.channels.remove(&msg.chat_id);
            }
        }
        info!("User {} evicted from channel {}", msg.user_id, msg.chat_id);
    }
}

impl Handler<Disconnect> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _: &mut Context<Self>) {
        info!("User {} disconnected (WS)", msg.user_id);
        for members in self.channels.values_mut() {
            members.retain(|(_, addr)| addr != &msg.addr);
        }
        self.channels.retain(|_, members| !members.is_empty());
    }
}

impl Handler<Publish> for ChatServer {
    type Result = ();

    fn handle(&mut self, msg: Publish, _: &mut Context<Self>) {
        let Some(members) = self.channels.get(&msg.chat_id) else {
            debug!("No live subscribers on channel {}", msg.chat_id);
            return;
        };
        let payload = match serde_json::to_string(&msg.event) {
            Ok(p) => p,
            Err(e) => {
                error!("Failed to serialize relay event: {}", e);
                return;
            }
        };
        for (user_id, addr) in members {
            if msg.audience.as_ref().is_some_and(|a| !a.contains(user_id)) {
                continue;
            }
            addr.do_send(WsEvent(payload.clone()));
        }
    }
}

impl Relay for Addr<ChatServer> {
    fn publish(&self, chat_id: &str, event: RelayEvent) {
        self.do_send(Publish {
            chat_id: chat_id.to_string(),
            audience: None,
            event,
        });
    }

    fn publish_to(&self, chat_id: &str, user_ids: &[String], event: RelayEvent) {
        self.do_send(Publish {
            chat_id: chat_id.to_string(),
            audience: Some(user_ids.to_vec()),
            event,
        });
    }

    fn evict(&self, chat_id: &str, user_id: &str) {
        self.do_send(Evict {
            chat_id: chat_id.to_string(),
            user_id: user_id.to_string(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    struct Sink(Arc<Mutex<Vec<String>>>);

    impl Actor for Sink {
        type Context = Context<Self>;
    }

    impl Handler<WsEvent> for Sink {
        type Result = ();

        fn handle(&mut self, msg: WsEvent, _: &mut Context<Self>) {
            self.0.lock().unwrap().push(msg.0);
        }
    }

    #[actix::test]
    async fn publish_reaches_only_the_joined_channel() {
        let server = ChatServer::new().start();
        let seen_a = Arc::new(Mutex::new(Vec::new()));
        let seen_b = Arc::new(Mutex::new(Vec::new()));
        let a = Sink(seen_a.clone()).start();
        let b = Sink(seen_b.clone()).start();

        server
            .send(Join { chat_id: "c1".into(), user_id: "u1".into(), addr: a.recipient() })
            .await
            .unwrap();
        server
            .send(Join { chat_id: "c2".into(), user_id: "u2".into(), addr: b.recipient() })
            .await
            .unwrap();
        server
            .send(Publish {
                chat_id: "c1".into(),
                audience: None,
                event: RelayEvent::LinkDiscarded { message_id: "m1".into(), chat_id: "c1".into() },
            })
            .await
            .unwrap();
        // Let the sinks drain their mailboxes.
        actix::clock::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(seen_a.lock().unwrap().len(), 1);
        assert!(seen_a.lock().unwrap()[0].contains("link_discarded"));
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[actix::test]
    async fn left_channels_stop_delivering() {
        let server = ChatServer::new().start();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Sink(seen.clone()).start();

        server
            .send(Join { chat_id: "c1".into(), user_id: "u1".into(), addr: sink.clone().recipient() })
            .await
            .unwrap();
        server
            .send(Leave { chat_id: "c1".into(), addr: sink.recipient() })
            .await
            .unwrap();
        server
            .send(Publish {
                chat_id: "c1".into(),
                audience: None,
                event: RelayEvent::PendingLink { message_id: "m1".into(), chat_id: "c1".into() },
            })
            .await
            .unwrap();
        actix::clock::sleep(std::time::Duration::from_millis(20)).await;

        assert!(seen.lock().unwrap().is_empty());
    }

    #[actix::test]
    async fn targeted_publish_and_eviction() {
        let server = ChatServer::new().start();
        let seen_pm = Arc::new(Mutex::new(Vec::new()));
        let seen_client = Arc::new(Mutex::new(Vec::new()));
        let pm = Sink(seen_pm.clone()).start();
        let client = Sink(seen_client.clone()).start();
        for (user_id, addr) in [("pm", pm.recipient()), ("client", client.recipient())] {
            server
                .send(Join { chat_id: "c1".into(), user_id: user_id.into(), addr })
                .await
                .unwrap();
        }

        server
            .send(Publish {
                chat_id: "c1".into(),
                audience: Some(vec!["pm".into()]),
                event: RelayEvent::PendingLink { message_id: "m1".into(), chat_id: "c1".into() },
            })
            .await
            .unwrap();
        server.send(Evict { chat_id: "c1".into(), user_id: "client".into() }).await.unwrap();
        server
            .send(Publish {
                chat_id: "c1".into(),
                audience: None,
                event: RelayEvent::LinkDiscarded { message_id: "m1".into(), chat_id: "c1".into() },
            })
            .await
            .unwrap();
        actix::clock::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(seen_pm.lock().unwrap().len(), 2);
        assert!(seen_client.lock().unwrap().is_empty());
    }
}
