use crate::chat_server::{ChatServer, Relay};
use crate::config::Config;
use crate::mailer::Mailer;
use crate::payments::PaymentGateway;
use crate::store::Store;
use actix::Addr;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub chat_server: Addr<ChatServer>,
    pub store: Arc<dyn Store>,
    pub relay: Arc<dyn Relay>,
    pub mailer: Arc<dyn Mailer>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        chat_server: Addr<ChatServer>,
        store: Arc<dyn Store>,
        mailer: Arc<dyn Mailer>,
        gateway: Arc<dyn PaymentGateway>,
        config: Config,
    ) -> Self {
        let relay: Arc<dyn Relay> = Arc::new(chat_server.clone());
        AppState {
            chat_server,
            store,
            relay,
            mailer,
            gateway,
            config,
        }
    }
}
