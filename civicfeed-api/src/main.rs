use civicfeed_api::{
    config::Env,
    server::{self, AppOptions, ServerState},
    service::{PostService, media::LocalMediaStore, notify::BroadcastNotifier},
};
use civicfeed_common::snowflake::{NodeId, SnowflakeError};
use civicfeed_db::{DbError, client::DbClient};
use std::{net::SocketAddr, sync::Arc};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Error)]
enum InitError {
    #[error("Error parsing .env file: {0}")]
    Dotenv(#[from] dotenvy::Error),
    #[error("Error parsing environment: {0}")]
    Envy(#[from] envy::Error),
    #[error("Invalid snowflake node id: {0}")]
    Snowflake(#[from] SnowflakeError),
    #[error("Error setting up the database: {0}")]
    Db(#[from] DbError),
    #[error("Error binding tcp listener: {0}")]
    TcpBind(std::io::Error),
    #[error("Error serving server: {0}")]
    TcpServe(std::io::Error),
}

fn install_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "civicfeed_api=debug,civicfeed_db=debug,\
                tower_http=debug,axum::rejection=trace,sqlx=info"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn get_env() -> Result<Env, InitError> {
    if let Err(e) = dotenvy::dotenv() {
        if e.not_found() {
            debug!("No .dotenv file found");
        } else {
            return Err(e.into());
        }
    }

    envy::from_env().map_err(InitError::from)
}

fn shutdown_on_ctrl_c() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl-C, shutting down"),
            Err(err) => error!(%err, "Could not listen for Ctrl-C, shutting down"),
        }
        trigger.cancel();
    });
    token
}

#[tokio::main]
async fn main() -> Result<(), InitError> {
    install_tracing();
    let env = get_env()?;

    let db_client = DbClient::connect(
        &env.database_url,
        env.database_max_connections,
        NodeId::new(env.worker_id)?,
        NodeId::new(env.process_id)?,
    )
    .await?;
    db_client.migrate().await?;
    info!("Database migrated");

    let store = Arc::new(db_client);
    let media = Arc::new(LocalMediaStore::new(
        env.upload_dir.clone(),
        env.media_base_url.clone(),
    ));
    let notifier = Arc::new(BroadcastNotifier::new(env.status_channel_capacity));
    let posts = Arc::new(PostService::new(
        store.clone(),
        media,
        notifier,
        env.max_upload_bytes,
    ));

    let app = server::app(
        ServerState::new(store, posts),
        &AppOptions {
            api_prefix: env.api_prefix.clone(),
            upload_dir: Some(env.upload_dir.clone()),
            max_upload_bytes: env.max_upload_bytes,
        },
    );

    let server_address = SocketAddr::new(env.server_address, env.server_port);
    let listener = tokio::net::TcpListener::bind(server_address)
        .await
        .map_err(InitError::TcpBind)?;
    info!(%server_address, "Listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_on_ctrl_c().cancelled_owned())
        .await
        .map_err(InitError::TcpServe)?;

    Ok(())
}
