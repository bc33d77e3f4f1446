//! Magic Link JSON API Server

use std::{process, sync::Arc};

use salvo::{
    affix_state::inject,
    oapi::{OpenApi, swagger_ui::SwaggerUi},
    prelude::*,
    trailing_slash::remove_slash,
};
use tracing::{error, info, warn};

use magiclink_app::{
    broker::SupabaseBroker,
    context::{AppContext, AppInitError},
};

use crate::{
    config::{ServerConfig, database::StoreKind},
    observability::{Observability, metrics_handler, request_logging},
    state::{Runtime, State},
};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod config;
mod debug;
mod extensions;
mod healthcheck;
mod observability;
mod router;
mod shutdown;
mod sign_in;
mod state;
#[cfg(test)]
mod test_helpers;

async fn app_context(
    config: &ServerConfig,
    broker: Arc<SupabaseBroker>,
) -> Result<AppContext, AppInitError> {
    let settings = config.app_settings();

    match (config.database.token_store, config.database.database_url.as_deref()) {
        (StoreKind::Postgres, Some(url)) => {
            AppContext::from_database_url(url, settings, broker).await
        }
        (StoreKind::Postgres, None) => Err(AppInitError::MissingDatabaseUrl),
        (StoreKind::Memory, _) => {
            warn!("using the in-memory token store; rate-limit history resets on restart");

            Ok(AppContext::in_memory(settings, broker))
        }
    }
}

/// Magic Link JSON API Server entry point
///
/// # Panics
///
/// Panics if the server fails to bind or serve requests
#[tokio::main]
pub async fn main() {
    let config = ServerConfig::load().unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging not initialized yet, must use eprintln for config errors"
        )]
        {
            eprintln!("Configuration error: {e}");
        }

        process::exit(1);
    });

    let observability = Observability::init(&config).unwrap_or_else(|e| {
        #[expect(
            clippy::print_stderr,
            reason = "logging failed to initialize, must use eprintln"
        )]
        {
            eprintln!("Observability error: {e}");
        }

        process::exit(1);
    });

    let runtime = Runtime {
        environment: config.runtime.app_env,
        site_url: config.runtime.site_url.clone(),
    };

    let settings = config.app_settings();

    info!(
        environment = ?runtime.environment,
        degradation = %settings.degradation,
        "starting magic link server"
    );

    let broker = match SupabaseBroker::new(config.broker.supabase()) {
        Ok(broker) => Arc::new(broker),
        Err(init_error) => {
            error!("failed to build session broker client: {init_error}");

            process::exit(1);
        }
    };

    let app = match app_context(&config, broker).await {
        Ok(app) => app,
        Err(init_error) => {
            error!("failed to initialize app context: {init_error}");

            process::exit(1);
        }
    };

    let addr = config.socket_addr();

    info!("Starting server on {addr}");

    let listener = TcpListener::new(addr).bind().await;

    let router = Router::new()
        .hoop(CatchPanic::new())
        .hoop(remove_slash())
        .hoop(request_logging)
        .hoop(inject(State::shared(app, runtime)))
        .push(Router::with_path("healthcheck").get(healthcheck::handler))
        .push(Router::with_path("metrics").get(metrics_handler))
        .push(router::app_router());

    let doc = OpenApi::new("Magic Link API", env!("CARGO_PKG_VERSION")).merge_router(&router);

    let router = router
        .push(doc.into_router("/api-doc/openapi.json"))
        .push(SwaggerUi::new("/api-doc/openapi.json").into_router("docs"));

    let server = Server::new(listener);

    let handle = server.handle();

    tokio::spawn(async move {
        if let Err(error) = shutdown::listen(handle).await {
            error!("failed to listen for shutdown signal: {error}");
        }
    });

    server.serve(router).await;

    observability.shutdown();
}
