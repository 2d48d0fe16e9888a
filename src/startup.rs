use actix_web::dev::Server;
use actix_web::{web, App, HttpServer};
use std::net::TcpListener;

use crate::auth::AccessTokenCodec;
use crate::configuration::ApplicationSettings;
use crate::middleware::{JwtMiddleware, RequestLogger};
use crate::routes::{
    get_current_user, health_check, list_sessions, login, logout, refresh, register,
};
use crate::session::SessionService;

pub fn run(
    listener: TcpListener,
    service: SessionService,
    codec: AccessTokenCodec,
    app_settings: ApplicationSettings,
) -> Result<Server, std::io::Error> {
    let service = web::Data::new(service);
    let app_settings = web::Data::new(app_settings);

    let server = HttpServer::new(move || {
        App::new()
            .wrap(RequestLogger)
            // Shared state
            .app_data(service.clone())
            .app_data(app_settings.clone())
            // Public routes
            .route("/health_check", web::get().to(health_check))
            .route("/auth/register", web::post().to(register))
            .route("/auth/login", web::post().to(login))
            .route("/auth/refresh", web::post().to(refresh))
            .route("/auth/logout", web::post().to(logout))
            // Protected routes (require a Bearer access token)
            .service(
                web::scope("/auth")
                    .wrap(JwtMiddleware::new(codec.clone()))
                    .route("/me", web::get().to(get_current_user))
                    .route("/sessions", web::get().to(list_sessions)),
            )
    })
    .listen(listener)?
    .run();

    Ok(server)
}
