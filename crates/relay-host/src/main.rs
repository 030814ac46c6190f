mod host;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use submission_relay::{
    EventBroadcaster, HttpIngestionClient, JsonFileStore, MessageRouter, RelayConfig,
    RelayController,
};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

const CONFIG_PATH_ENV: &str = "CODETRACK_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "relay.toml";
/// stdin 的阻塞读取线程不会随 Ctrl+C 结束，关闭运行时最多等待这么久。
const SHUTDOWN_GRACE: Duration = Duration::from_secs(1);

fn main() -> anyhow::Result<()> {
    init_tracing()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;
    let result = runtime.block_on(run());
    shutdown_runtime(runtime);
    result
}

fn shutdown_runtime(runtime: Runtime) {
    runtime.shutdown_timeout(SHUTDOWN_GRACE);
}

async fn run() -> anyhow::Result<()> {
    info!("starting codetrack relay host");
    let config = load_config()?;
    info!(
        api_base = %config.api_base,
        state_path = %config.state_path.display(),
        request_timeout_secs = config.request_timeout_secs,
        dedup_window_secs = config.dedup_window_secs,
        "relay config loaded"
    );

    let store = Arc::new(JsonFileStore::new(config.state_path.clone()));
    let client = HttpIngestionClient::from_config(&config)
        .context("failed to build ingestion http client")?;
    let events = Arc::new(EventBroadcaster::new(config.event_buffer_size));

    let mut event_stream = events.subscribe();
    let event_task = tokio::spawn(async move {
        while let Some(event) = event_stream.next_event().await {
            debug!(?event, "relay event");
        }
    });

    let controller = RelayController::hydrate(store, Arc::new(client), events)
        .await
        .with_dedup_window(config.dedup_window());
    let (router, router_task) = MessageRouter::new(controller).spawn(64);

    tokio::select! {
        result = host::serve(tokio::io::stdin(), tokio::io::stdout(), router) => {
            if let Err(err) = result {
                warn!(error = %format!("{err:#}"), "native messaging loop stopped with error");
            }
        }
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received, stopping relay host");
        }
    }

    let controller = router_task.await.context("router task panicked")?;
    info!(
        enabled = controller.is_enabled(),
        identified = controller.user_id().is_some(),
        "relay host shutdown complete"
    );
    drop(controller);
    let _ = event_task.await;
    Ok(())
}

fn load_config() -> anyhow::Result<RelayConfig> {
    let path = std::env::var(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH));

    if path.exists() {
        info!(path = %path.display(), "loading relay config from file");
        RelayConfig::from_file(&path)?.with_env_overrides()
    } else {
        info!(path = %path.display(), "config file not found, using environment");
        RelayConfig::from_env().context("failed to load relay config from environment")
    }
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    // stdout carries the native messaging frames.
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
    Ok(())
}
