use std::{env, error::Error, sync::Arc};

use axum::http::{
    header::{AUTHORIZATION, CONTENT_TYPE},
    HeaderValue, Method,
};
use tokio::{fs, net, task};
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::{
    layer::SubscriberExt as _, util::SubscriberInitExt as _,
};

use building_maintenance::{
    collab::{LogNotifier, LogScheduler},
    config, db, http,
    store::{memory, Backend},
    Config, Workflow,
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let path = env::args().nth(1).unwrap_or_else(|| "config.toml".into());
    let config = fs::read_to_string(&path).await?;
    let config = toml::from_str::<Config>(&config)?;

    let backend: Arc<dyn Backend> = match &config.store {
        config::Store::Postgres { url } => {
            let (db_client, db_connection) =
                db::connect(url, config.workflow.conflict_retries).await?;

            task::spawn(async move {
                if let Err(e) = db_connection.await {
                    panic!("database connection failed: {e}");
                }
            });

            db_client.migrate().await?;
            Arc::new(db_client)
        }
        config::Store::Memory => Arc::new(memory::Store::seeded(&config.seed)),
    };

    let workflow =
        Workflow::new(backend, Arc::new(LogScheduler), Arc::new(LogNotifier))
            .with_calendar_slot(config.workflow.calendar_slot);

    let mut cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PATCH])
        .allow_headers([AUTHORIZATION, CONTENT_TYPE]);
    for origin in &config.http.cors.allowed_origins {
        cors = cors.allow_origin(origin.parse::<HeaderValue>()?);
    }

    let app = http::router(Arc::new(http::AppState::new(
        workflow,
        &config.jwt.secret,
        config.jwt.expiration_time,
    )))
    .layer(cors);

    let listener = net::TcpListener::bind(config.http.server.addr).await?;
    info!(addr = %config.http.server.addr, "listening");
    axum::serve(listener, app).await?;

    Ok(())
}
