use std::sync::Arc;
use std::time::Duration;

use embaudio::{AudioBackend, DeviceBackend, SimBackend};
use embconfig::get_config;
use embplayer::PlayerController;
use embserver::routes::{self, AppState};
use embserver::{embed, ServerBuilder};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = get_config();
    let backend: Arc<dyn AudioBackend> = match config.get_backend().as_str() {
        "sim" => {
            info!("using simulated playback backend");
            let sim = SimBackend::new(config.get_sim_duration_secs());
            sim.start_clock();
            sim
        }
        _ => DeviceBackend::new(),
    };

    let controller = PlayerController::new(
        backend,
        config.get_base_url(),
        Duration::from_millis(config.get_tick_interval_ms()),
    );
    embed::spawn_shell(controller.clone(), config.get_embed_source());

    let state = AppState {
        controller: controller.clone(),
        ws_url: format!("ws://127.0.0.1:{}/embed/ws", config.get_http_port()),
    };

    let mut server = ServerBuilder::new_configured().build();
    let info = server.info();
    server
        .add_route("/", move || {
            let info = info.clone();
            async move { info }
        })
        .await;
    server.add_router("/", routes::router(state)).await;

    server.start().await;
    server.wait().await;
    controller.shutdown();
    Ok(())
}
