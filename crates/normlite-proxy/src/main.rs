use normlite_core::NormliteConfig;
use std::io;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> io::Result<()> {
    setup_panic_handler();

    let config = match NormliteConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("failed to load configuration: {e}");
            std::process::exit(1);
        }
    };
    init_logging(&config.logging.level);

    info!(host = %config.server.host, port = config.server.port, backend = %config.client.backend, "starting normlite-proxy");

    let shutdown_signal = setup_graceful_shutdown();
    tokio::select! {
        result = normlite_proxy::run(config) => {
            if let Err(e) = result {
                error!(error = %e, "server error");
                std::process::exit(1);
            }
            info!("server stopped");
        }
        () = shutdown_signal => {
            info!("received shutdown signal, stopping");
        }
    }

    Ok(())
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry().with(filter).with(tracing_subscriber::fmt::layer()).init();
}

async fn setup_graceful_shutdown() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT"),
        () = terminate => info!("received SIGTERM"),
    }
}

fn setup_panic_handler() {
    std::panic::set_hook(Box::new(|panic_info| {
        let location = panic_info.location().unwrap_or_else(|| std::panic::Location::caller());
        let msg = match panic_info.payload().downcast_ref::<&'static str>() {
            Some(s) => (*s).to_string(),
            None => match panic_info.payload().downcast_ref::<String>() {
                Some(s) => s.clone(),
                None => "unknown panic payload".to_string(),
            },
        };
        error!(location = %location, message = %msg, "panic");
    }));
}
