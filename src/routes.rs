// src/routes.rs

use actix_cors::Cors;
use actix_web::{http, web};

use crate::admin::{
    approve_user_handler, assign_managers_handler, delete_user_handler, list_users_handler,
    suspend_user_handler, unsuspend_user_handler,
};
use crate::chat::{
    access_chat_handler, add_member_handler, all_messages_handler, approve_link_handler,
    create_group_handler, discard_link_handler, fetch_chats_handler, remove_member_handler,
    rename_group_handler, send_message_handler, view_links_handler,
};
use crate::credits::{
    add_credits_handler, create_order_handler, prices_handler, remove_credits_handler,
    transactions_handler, verify_payment_handler,
};
use crate::notification::{create_notification_handler, list_notifications_handler};
use crate::project::{
    accept_project_handler, complete_project_handler, create_project_handler, get_project,
    list_projects, list_unapproved, reject_project_handler,
};
use crate::proposal::{
    accept_proposal_handler, my_proposals, project_proposals, reject_proposal_handler,
    send_proposal_handler,
};
use crate::user_management::{
    get_user_handler, me_handler, register_handler, resend_verification_handler, search_skills_handler,
    verify_email_handler,
};
use crate::web_socket_server::ws_index;

/// CORS policy for the front end. Wrap it outside `Authentication` so
/// rejected requests still carry the CORS headers.
pub fn cors(frontend_origin: &str) -> Cors {
    Cors::default()
        .allowed_origin(frontend_origin)
        .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
        .allowed_headers(vec![
            http::header::CONTENT_TYPE,
            http::header::ACCEPT,
            http::header::AUTHORIZATION,
        ])
        .supports_credentials()
        .max_age(3600)
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg
        // AUTH
        .service(
            web::scope("/auth")
                .route("/register", web::post().to(register_handler))
                .route("/verify", web::get().to(verify_email_handler))
                .route("/resend", web::post().to(resend_verification_handler)),
        )
        // USERS
        .service(
            web::scope("/users")
                .route("/me", web::get().to(me_handler))
                .route("/{user_id}", web::get().to(get_user_handler)),
        )
        .service(
            web::scope("/freelancers").route("/search", web::post().to(search_skills_handler)),
        )
        // PROJECTS
        .service(
            web::scope("/projects")
                .route("", web::post().to(create_project_handler))
                .route("", web::get().to(list_projects))
                .route("/unapproved", web::get().to(list_unapproved))
                .route("/{project_id}", web::get().to(get_project))
                .route("/{project_id}/accept", web::post().to(accept_project_handler))
                .route("/{project_id}/reject", web::post().to(reject_project_handler))
                .route("/{project_id}/complete", web::post().to(complete_project_handler))
                .route("/{project_id}/proposals", web::get().to(project_proposals)),
        )
        // PROPOSALS
        .service(
            web::scope("/proposals")
                .route("", web::post().to(send_proposal_handler))
                .route("", web::get().to(my_proposals))
                .route("/{proposal_id}/accept", web::post().to(accept_proposal_handler))
                .route("/{proposal_id}/reject", web::post().to(reject_proposal_handler)),
        )
        // CREDITS AND PAYMENTS
        .service(
            web::scope("/credits")
                .route("/add", web::post().to(add_credits_handler))
                .route("/remove", web::post().to(remove_credits_handler))
                .route("/transactions", web::get().to(transactions_handler)),
        )
        .service(
            web::scope("/payments")
                .route("/orders", web::post().to(create_order_handler))
                .route("/verify", web::post().to(verify_payment_handler)),
        )
        .route("/prices", web::get().to(prices_handler))
        // CHATS
        .service(
            web::scope("/chats")
                .route("", web::post().to(access_chat_handler))
                .route("", web::get().to(fetch_chats_handler))
                .route("/group", web::post().to(create_group_handler))
                .route("/{chat_id}/name", web::put().to(rename_group_handler))
                .route("/{chat_id}/members", web::post().to(add_member_handler))
                .route("/{chat_id}/members/{user_id}", web::delete().to(remove_member_handler)),
        )
        // MESSAGES
        .service(
            web::scope("/messages")
                .route("", web::post().to(send_message_handler))
                .route("/links/{message_id}/approve", web::post().to(approve_link_handler))
                .route("/links/{message_id}", web::delete().to(discard_link_handler))
                .route("/{chat_id}", web::get().to(all_messages_handler))
                .route("/{chat_id}/links", web::get().to(view_links_handler)),
        )
        .service(
            web::scope("/notifications")
                .route("", web::post().to(create_notification_handler))
                .route("", web::get().to(list_notifications_handler)),
        )
        // ADMIN
        .service(
            web::scope("/admin")
                .route("/users", web::get().to(list_users_handler))
                .route("/users/{user_id}/approve", web::post().to(approve_user_handler))
                .route("/users/{user_id}/suspend", web::post().to(suspend_user_handler))
                .route("/users/{user_id}/unsuspend", web::post().to(unsuspend_user_handler))
                .route("/users/{user_id}", web::delete().to(delete_user_handler))
                .route("/managers", web::post().to(assign_managers_handler)),
        )
        // WEBSOCKET route for real-time
        .service(web::resource("/ws").route(web::get().to(ws_index)));
}
