// src/main.rs

use std::io;
use std::sync::Arc;

use actix::Actor;
use actix_web::{middleware::Logger, web, App, HttpServer};
use env_logger::Env;
use log::{error, info};

use creator_market::app_state::AppState;
use creator_market::auth::Authentication;
use creator_market::chat_server::ChatServer;
use creator_market::config::{Config, StoreBackend};
use creator_market::mailer::LogMailer;
use creator_market::payments::HttpPaymentGateway;
use creator_market::routes;
use creator_market::store::{MemoryStore, MongoStore, Store};
use creator_market::sweeper::StaleAccountSweeper;

#[actix_web::main]
async fn main() -> io::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = Config::from_env().map_err(|e| {
        error!("Invalid configuration: {}", e);
        io::Error::new(io::ErrorKind::InvalidInput, e.to_string())
    })?;

    let store: Arc<dyn Store> = match config.store {
        StoreBackend::Mongo => {
            let mongo = MongoStore::init(&config.mongo_uri, &config.database_name)
                .await
                .map_err(|e| {
                    error!("Failed to connect to MongoDB: {}", e);
                    io::Error::new(io::ErrorKind::Other, e.to_string())
                })?;
            Arc::new(mongo)
        }
        StoreBackend::Memory => {
            info!("Using the in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
    };

    let chat_server = ChatServer::new().start();
    StaleAccountSweeper::new(store.clone(), config.stale_account_days, config.sweep_interval).start();

    let state = AppState::new(
        chat_server,
        store,
        Arc::new(LogMailer {
            frontend_origin: config.frontend_origin.clone(),
        }),
        Arc::new(HttpPaymentGateway::new(config.payment.clone())),
        config.clone(),
    );

    let bind_address = config.bind_address.clone();
    let frontend_origin = config.frontend_origin.clone();
    let jwt_secret = config.jwt_secret.clone();
    info!("Server running at http://{}", bind_address);
    info!("Allowed CORS Origin: {}", frontend_origin);

    HttpServer::new(move || {
        App::new()
            .wrap(Authentication::new(&jwt_secret))
            .wrap(routes::cors(&frontend_origin))
            .wrap(Logger::default())
            .app_data(web::Data::new(state.clone()))
            .configure(routes::configure)
    })
    .bind(bind_address)?
    .run()
    .await
}
