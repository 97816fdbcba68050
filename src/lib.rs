pub mod access;
pub mod admin;
pub mod app_state;
pub mod auth;
pub mod chat;
pub mod chat_server;
pub mod config;
pub mod credits;
pub mod error;
pub mod mailer;
pub mod models;
pub mod notification;
pub mod payments;
pub mod project;
pub mod proposal;
pub mod routes;
pub mod store;
pub mod sweeper;
pub mod user_management;
pub mod web_socket_server;
