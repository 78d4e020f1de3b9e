//! Full-stack protocol test: the conformance suite run over a real
//! WebSocket against the server router, with a simulated backend whose
//! clock advances in real time.

use std::sync::Arc;
use std::time::Duration;

use embaudio::{AudioBackend, SimBackend};
use embplayer::PlayerController;
use embserver::harness;
use embserver::routes::{router, AppState};
use embserver::Server;

async fn serve_router(controller: Arc<PlayerController>) -> String {
    let state = AppState {
        controller,
        ws_url: String::new(),
    };
    let mut server = Server::new("test", "http://127.0.0.1", 0);
    server.add_router("/", router(state)).await;
    let app = server.router().await;
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("ephemeral port");
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .await
            .unwrap();
    });
    format!("ws://{addr}/embed/ws")
}

#[tokio::test]
async fn conformance_suite_passes_over_websocket() {
    let backend = SimBackend::new(30.0);
    backend.start_clock();
    let controller = PlayerController::new(
        backend.clone() as Arc<dyn AudioBackend>,
        "http://localhost:8080",
        Duration::from_millis(50),
    );

    let ws_url = serve_router(controller.clone()).await;
    let report = harness::run_suite(&ws_url, &controller)
        .await
        .expect("suite completes");

    assert!(report.all_passed(), "conformance report: {report:?}");
    controller.shutdown();
    backend.stop_clock();
}

#[tokio::test]
async fn every_connection_gets_its_own_receiver() {
    let backend = SimBackend::new(30.0);
    let controller = PlayerController::new(
        backend as Arc<dyn AudioBackend>,
        "http://localhost:8080",
        Duration::from_millis(50),
    );

    let ws_url = serve_router(controller.clone()).await;
    let first = embremote::RemotePlayer::new(harness::connect_port(&ws_url).await.unwrap());
    let second = embremote::RemotePlayer::new(harness::connect_port(&ws_url).await.unwrap());

    first.wait_ready().await.expect("first ready");
    second.wait_ready().await.expect("second ready");
    controller.shutdown();
}
