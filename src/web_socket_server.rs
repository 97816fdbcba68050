use std::sync::Arc;
use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::auth::current_actor;
use crate::chat_server::{ChatServer, Disconnect, Join, Leave, WsEvent};
use crate::store::Store;

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(10);

/// Frames a client may send. Messages themselves go over HTTP.
#[derive(Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
enum ClientFrame {
    Join { chat_id: String },
    Leave { chat_id: String },
}

#[derive(Serialize)]
struct ServerNotice<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
    chat_id: &'a str,
}

pub struct WebSocketConnection {
    pub user_id: String,
    pub hb: Instant,
    pub addr: Addr<ChatServer>,
    store: Arc<dyn Store>,
}

impl WebSocketConnection {
    pub fn new(user_id: String, addr: Addr<ChatServer>, store: Arc<dyn Store>) -> Self {
        WebSocketConnection {
            user_id,
            hb: Instant::now(),
            addr,
            store,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                info!("WebSocket heartbeat failed for {}, disconnecting", act.user_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    /// Subscribes to a chat channel after confirming membership.
    fn join(&mut self, chat_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let store = self.store.clone();
        let lookup_id = chat_id.clone();
        async move { store.chat(&lookup_id).await }
            .into_actor(self)
            .map(move |res, act, ctx| match res {
                Ok(Some(chat)) if chat.has_member(&act.user_id) => {
                    act.addr.do_send(Join {
                        chat_id: chat.id.clone(),
                        user_id: act.user_id.clone(),
                        addr: ctx.address().recipient(),
                    });
                    notice(ctx, "joined", &chat.id);
                }
                Ok(_) => {
                    warn!("User {} may not join chat {}", act.user_id, chat_id);
                    notice(ctx, "join_refused", &chat_id);
                }
                Err(e) => {
                    warn!("Chat lookup failed for {}: {}", chat_id, e);
                    notice(ctx, "join_failed", &chat_id);
                }
            })
            .wait(ctx);
    }
}

fn notice(ctx: &mut ws::WebsocketContext<WebSocketConnection>, kind: &str, chat_id: &str) {
    if let Ok(text) = serde_json::to_string(&ServerNotice { kind, chat_id }) {
        ctx.text(text);
    }
}

impl Actor for WebSocketConnection {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.hb(ctx);
        debug!("WebSocket session started for {}", self.user_id);
    }

    fn stopped(&mut self, ctx: &mut Self::Context) {
        self.addr.do_send(Disconnect {
            user_id: self.user_id.clone(),
            addr: ctx.address().recipient(),
        });
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WebSocketConnection {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientFrame>(&text) {
                Ok(ClientFrame::Join { chat_id }) => self.join(chat_id, ctx),
                Ok(ClientFrame::Leave { chat_id }) => {
                    self.addr.do_send(Leave {
                        chat_id: chat_id.clone(),
                        addr: ctx.address().recipient(),
                    });
                    notice(ctx, "left", &chat_id);
                }
                Err(e) => debug!("Ignoring websocket frame from {}: {}", self.user_id, e),
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Err(e) => {
                warn!("WebSocket error for {}: {}", self.user_id, e);
                ctx.stop();
            }
            _ => {}
        }
    }
}

impl Handler<WsEvent> for WebSocketConnection {
    type Result = ();

    fn handle(&mut self, msg: WsEvent, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.text(msg.0);
    }
}

/// GET /ws
pub async fn ws_index(
    req: HttpRequest,
    stream: web::Payload,
    data: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let actor = current_actor(&req, data.store.as_ref()).await?;
    let session = WebSocketConnection::new(actor.user_id, data.chat_server.clone(), data.store.clone());
    ws::start(session, &req, stream)
}
