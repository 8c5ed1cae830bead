use actix_cors::Cors;
use actix_files::Files;
use actix_web::{middleware::Logger, web, App, HttpServer};
use anyhow::Context;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod config;
mod error;
mod handlers;
mod message_database;

use config::{Config, LogFormat};
use message_database::MessageDatabase;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = tracing_subscriber::fmt().with_env_filter(filter);
    match format {
        LogFormat::Text => subscriber.init(),
        LogFormat::Json => subscriber.json().init(),
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    init_tracing(config.log_format);

    // No traffic until the store is on disk and readable
    let db = match MessageDatabase::load(&config.data_file) {
        Ok(db) => db,
        Err(e) => {
            tracing::error!(error = %e, "could not initialise message store");
            return Err(e.into());
        }
    };
    tracing::info!(
        path = %db.path().display(),
        messages = db.len()?,
        "message store ready"
    );
    let db = web::Data::new(db);

    let static_dir = config.static_dir.clone();
    let server = HttpServer::new(move || {
        let mut app = App::new()
            .app_data(db.clone())
            .configure(handlers::configure);
        if let Some(dir) = &static_dir {
            app = app.service(Files::new("/", dir).index_file("index.html"));
        }
        app.wrap(Cors::permissive()).wrap(Logger::default())
    })
    .bind((config.host.as_str(), config.port))
    .with_context(|| format!("could not bind {}:{}", config.host, config.port))?;

    tracing::info!(host = %config.host, port = config.port, "listening");
    server.run().await?;
    tracing::info!("server stopped");
    Ok(())
}
