use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use vigil::{
    config::{AppConfig, RoutesLoader},
    handlers::{Dispatcher, HandlerRegistry},
    notification::LogNotifier,
    persistence::{KeyValueStore, RedisKeyValueStore},
    queue::{declare_topology, QueuePublisher},
    router::RouteManager,
    supervisor::Supervisor,
    throttle::ThrottleStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the configuration directory.
    #[arg(long)]
    config_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the alert delivery pipeline.
    Run,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let subscriber =
        FmtSubscriber::builder().with_env_filter(EnvFilter::from_default_env()).finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let cli = Cli::parse();

    match cli.command {
        Commands::Run => run_pipeline(cli.config_dir.as_deref()).await?,
    }

    Ok(())
}

async fn run_pipeline(config_dir: Option<&str>) -> Result<(), Box<dyn std::error::Error>> {
    tracing::debug!("Loading application configuration...");
    let config = AppConfig::new(config_dir)?;
    tracing::debug!(amqp_url = %config.amqp_url, listen_address = %config.listen_address, "Configuration loaded.");

    let route_set = RoutesLoader::new(config.routes_config_path.clone()).load()?;
    tracing::info!(routes = route_set.routes.len(), "Routing configuration loaded.");
    let routes = Arc::new(RouteManager::new(route_set));

    // The shared store being down must not prevent startup; the throttle
    // store degrades to its in-process fallback.
    let primary: Option<Arc<dyn KeyValueStore>> =
        match RedisKeyValueStore::connect(&config.redis_url, config.kv_timeout_ms).await {
            Ok(store) => {
                tracing::info!("Connected to shared throttle backend.");
                Some(Arc::new(store))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Shared throttle backend unavailable, starting in fallback mode.");
                None
            }
        };
    let throttle = Arc::new(ThrottleStore::new(primary));

    tracing::debug!("Connecting to message broker...");
    let connection = QueuePublisher::connect(&config.amqp_url).await?;
    let publisher = Arc::new(
        QueuePublisher::new(&connection, config.queue.clone(), config.retry.clone()).await?,
    );
    {
        let channel = connection.create_channel().await?;
        declare_topology(&channel, &config.queue, &config.retry).await?;
        tracing::info!(exchange = %config.queue.exchange, "Queue topology declared.");
    }

    let dispatcher = Arc::new(Dispatcher::new(HandlerRegistry::new()));

    let supervisor = Supervisor::new(
        config,
        connection,
        publisher,
        throttle,
        routes,
        dispatcher,
        Arc::new(LogNotifier),
    );

    tracing::info!("Supervisor initialized, starting pipeline...");
    supervisor.run().await?;

    Ok(())
}
