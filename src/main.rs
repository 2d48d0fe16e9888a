use std::net::TcpListener;
use std::sync::Arc;
use std::time::Duration;

use sqlx::postgres::PgPoolOptions;

use propdocs_auth::auth::{AccessTokenCodec, PasswordHasher};
use propdocs_auth::configuration::get_configuration;
use propdocs_auth::session::SessionService;
use propdocs_auth::startup::run;
use propdocs_auth::store::{spawn_expiry_purge, PgCredentialStore, PgTokenStore, TokenStore};
use propdocs_auth::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting authentication service");

    let configuration = match get_configuration() {
        Ok(config) => config,
        Err(e) => {
            tracing::error!("Failed to read configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Configuration error",
            ));
        }
    };

    // The signing configuration is validated before anything binds: a
    // missing secret must kill the process, not the first request.
    let codec = match AccessTokenCodec::from_settings(&configuration.jwt) {
        Ok(codec) => codec,
        Err(e) => {
            tracing::error!("Invalid signing configuration: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                "Signing configuration error",
            ));
        }
    };

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&configuration.database.connection_string())
        .await
        .map_err(|e| {
            tracing::error!("Failed to create connection pool: {}", e);
            std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Database connection error",
            )
        })?;

    sqlx::migrate!("./migrations").run(&pool).await.map_err(|e| {
        tracing::error!("Failed to run migrations: {}", e);
        std::io::Error::new(std::io::ErrorKind::Other, "Migration error")
    })?;

    let credentials = Arc::new(PgCredentialStore::new(pool.clone()));
    let tokens: Arc<dyn TokenStore> = Arc::new(PgTokenStore::new(pool));

    // Hourly TTL garbage collection of expired refresh-token records
    spawn_expiry_purge(tokens.clone(), Duration::from_secs(3600));

    let service = SessionService::new(
        credentials,
        tokens,
        PasswordHasher::default(),
        codec.clone(),
        configuration.jwt.clone(),
    );

    let address = configuration.application.address();
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on {}", address);

    let server = run(listener, service, codec, configuration.application.clone())?;
    server.await
}
