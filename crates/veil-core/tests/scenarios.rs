//! End-to-end session scenarios through the public API.

use std::sync::Arc;
use veil_core::{
    ConnectionError, ConnectionSessionManager, ConnectionStatus, ErrorClass, ResilienceController,
    ServerCatalog, SimulatedTransport, TransportError, TransportProtocol, VpnServer,
};

fn server(id: &str, score: u8, ping: u32, available: bool) -> VpnServer {
    VpnServer::new(id, id, "SG", "10.0.0.1", TransportProtocol::WireGuard)
        .with_metrics(score, ping, 20)
        .with_availability(available)
}

fn tied_catalog() -> Arc<ServerCatalog> {
    Arc::new(ServerCatalog::with_servers(vec![
        server("sg-1", 95, 25, true),
        server("de-1", 95, 45, true),
    ]))
}

#[test]
fn score_tie_goes_to_lower_ping() {
    let catalog = tied_catalog();
    assert_eq!(catalog.select_best_server().unwrap().id, "sg-1");
}

#[test]
fn unavailable_catalog_selects_nothing() {
    let catalog = ServerCatalog::with_servers(vec![
        server("sg-1", 95, 25, false),
        server("de-1", 95, 45, false),
    ]);

    assert!(catalog.select_best_server().is_none());
    assert!(catalog.quick_connect_list(4).is_empty());
}

#[tokio::test]
async fn second_connect_is_rejected() {
    let manager = ConnectionSessionManager::new(
        tied_catalog(),
        Arc::new(SimulatedTransport::instant()),
        ResilienceController::with_defaults(),
    );

    let session = manager.connect(None).await.unwrap();
    assert_eq!(session.server().id, "sg-1");

    assert!(matches!(
        manager.connect(None).await,
        Err(ConnectionError::AlreadyConnected)
    ));
    assert!(manager.connection_summary().is_connected);
}

#[tokio::test]
async fn traffic_accumulates_across_updates() {
    let manager = ConnectionSessionManager::new(
        tied_catalog(),
        Arc::new(SimulatedTransport::instant()),
        ResilienceController::with_defaults(),
    );
    manager.connect(None).await.unwrap();

    manager.update_traffic(1000, 2000);
    manager.update_traffic(500, 500);

    let summary = manager.connection_summary();
    assert_eq!(summary.bytes_sent, 1500);
    assert_eq!(summary.bytes_received, 2500);
}

#[tokio::test]
async fn server_error_is_retryable_with_backoff() {
    let transport = Arc::new(SimulatedTransport::instant());
    transport.push_connect_result(Err(TransportError::Server { code: 503 }));
    let manager = ConnectionSessionManager::new(
        tied_catalog(),
        transport,
        ResilienceController::with_defaults(),
    );

    let err = manager.connect(None).await.unwrap_err();
    let class = err.error_class().unwrap();

    assert_eq!(manager.status(), ConnectionStatus::Error(ErrorClass::ServerError(503)));
    assert!(manager.resilience().should_retry(class, 1, 5));
    assert_eq!(manager.resilience().next_delay(1).as_secs(), 2);
}

#[test]
fn security_violation_never_retried() {
    let offline = ResilienceController::new(Default::default(), Arc::new(|| false));
    let online = ResilienceController::with_defaults();

    assert!(!offline.should_retry(ErrorClass::SecurityViolation, 1, 5));
    assert!(!online.should_retry(ErrorClass::SecurityViolation, 1, 5));
}
