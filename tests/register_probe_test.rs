//! Register Probe Integration Tests

use gbgate::config::Config;
use gbgate::domain::device::NoopObserver;
use gbgate::infrastructure::protocols::sip::SipMethod;
use gbgate::{probe_register, Gateway, GatewayError};
use std::sync::Arc;
use std::time::Duration;

const SERVER_ID: &str = "31011500002000000001";
const DEVICE_ID: &str = "34020000001320000009";

fn config() -> Config {
    let mut config = Config::default();
    config.sip.bind_address = "127.0.0.1".to_string();
    config.sip.bind_port = 0;
    config.sip.host = Some("127.0.0.1".to_string());
    config.sip.server_id = SERVER_ID.to_string();
    config
}

#[tokio::test]
async fn test_probe_registers_with_gateway() {
    let handle = Gateway::start(config(), Arc::new(NoopObserver), false)
        .await
        .unwrap();

    let response = probe_register(
        SERVER_ID,
        handle.local_addr(),
        DEVICE_ID,
        Duration::from_secs(2),
    )
    .await
    .unwrap();

    assert_eq!(response.status(), Some(200));
    assert_eq!(response.cseq_method, SipMethod::Register);
    assert_eq!(response.expires, Some(3600));
    assert_eq!(response.from.user(), Some(DEVICE_ID));

    let sessions = handle.tracker().snapshots().await;
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].gb_id, DEVICE_ID);
    assert!(sessions[0].registered);

    handle.stop();
    handle.join().await.unwrap();
}

#[tokio::test]
async fn test_probe_against_stopped_gateway_times_out() {
    let handle = Gateway::start(config(), Arc::new(NoopObserver), false)
        .await
        .unwrap();
    let addr = handle.local_addr();
    handle.stop();
    handle.join().await.unwrap();

    let err = probe_register(SERVER_ID, addr, DEVICE_ID, Duration::from_millis(300))
        .await
        .unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));
}
