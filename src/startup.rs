use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;
use std::sync::Arc;

use crate::ai_client::AiClient;
use crate::auth::{SessionManager, TokenCodec};
use crate::configuration::Settings;
use crate::middleware::{AuthGate, RequestLogger};
use crate::routes::{
    delete_post, generate_posts, get_current_user, get_post, get_post_stats, get_recent_posts,
    get_sessions, health_check, list_posts, login, logout, logout_all, refresh, register,
    update_post_content, update_post_schedule,
};
use crate::store::{CredentialStore, PostStore};

/// Transport policy for session cookies; `secure` tracks the environment.
pub struct CookiePolicy {
    pub secure: bool,
}

pub fn run(
    listener: TcpListener,
    credential_store: Arc<dyn CredentialStore>,
    post_store: Arc<dyn PostStore>,
    settings: Settings,
) -> Result<Server, std::io::Error> {
    let codec = TokenCodec::new(&settings.jwt);
    let manager = Arc::new(SessionManager::new(credential_store.clone(), codec));

    let ai_client = settings
        .ai
        .as_ref()
        .map(|ai| AiClient::new(ai, reqwest::Client::new()));

    let credential_data: web::Data<dyn CredentialStore> = web::Data::from(credential_store);
    let post_data: web::Data<dyn PostStore> = web::Data::from(post_store);
    let manager_data = web::Data::from(manager.clone());
    let policy_data = web::Data::new(CookiePolicy {
        secure: settings.application.is_production(),
    });
    let ai_data = web::Data::new(ai_client);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            // Shared state
            .app_data(credential_data.clone())
            .app_data(post_data.clone())
            .app_data(manager_data.clone())
            .app_data(policy_data.clone())
            .app_data(ai_data.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            // Protected routes
            .service(
                web::scope("/auth")
                    .wrap(AuthGate::new(manager.clone()))
                    .route("/logout", web::post().to(logout))
                    .route("/logout-all", web::post().to(logout_all))
                    .route("/sessions", web::get().to(get_sessions))
                    .route("/me", web::get().to(get_current_user)),
            )
            .service(
                web::scope("/posts")
                    .wrap(AuthGate::new(manager.clone()))
                    .route("/generate", web::post().to(generate_posts))
                    .route("/stats", web::get().to(get_post_stats))
                    .route("/recent", web::get().to(get_recent_posts))
                    .route("", web::get().to(list_posts))
                    .route("/{post_id}", web::get().to(get_post))
                    .route("/{post_id}", web::delete().to(delete_post))
                    .route("/{post_id}/content", web::patch().to(update_post_content))
                    .route("/{post_id}/schedule", web::patch().to(update_post_schedule)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
