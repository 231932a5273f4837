use std::net::TcpListener;
use std::sync::Arc;

use postline::configuration::get_configuration;
use postline::startup::run;
use postline::store::{CredentialStore, PgStore, PostStore};
use postline::telemetry::init_telemetry;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    init_telemetry();

    tracing::info!("Starting application");

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

    let store = match PgStore::open(&configuration.database).await {
        Ok(store) => store,
        Err(e) => {
            tracing::error!("Failed to open store: {}", e);
            return Err(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "Store connection error",
            ));
        }
    };

    if let Err(e) = store.migrate().await {
        tracing::error!("Failed to run migrations: {}", e);
        return Err(std::io::Error::new(std::io::ErrorKind::Other, "Migration error"));
    }

    let address = format!("127.0.0.1:{}", configuration.application.port);
    let listener = TcpListener::bind(&address)?;
    tracing::info!("Server listening on {}", address);

    let store = Arc::new(store);
    let credential_store: Arc<dyn CredentialStore> = store.clone();
    let post_store: Arc<dyn PostStore> = store.clone();

    let server = run(listener, credential_store, post_store, configuration)?;
    let result = server.await;

    store.close().await;
    result
}
