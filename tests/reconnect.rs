#![cfg(feature = "reconnect")]
#![allow(
    clippy::unwrap_used,
    clippy::missing_panics_doc,
    reason = "Do not need additional syntax for setting up tests"
)]

mod common;

use std::sync::Arc;
use std::time::Duration;

use aprende_realtime::auth::AuthProvider;
use aprende_realtime::ws::config::ReconnectConfig;
use aprende_realtime::ws::reconnect::Reconnector;
use aprende_realtime::ws::{Config, ConnectionManager, ConnectionState, EventKind};
use common::{FakeFactory, OnOpen, StallingToken};
use tokio::time::{sleep, timeout};

fn fast(max_attempts: Option<u32>) -> ReconnectConfig {
    ReconnectConfig::new(
        max_attempts,
        Duration::from_millis(5),
        Duration::from_millis(20),
        2.0,
    )
}

async fn connected() -> (ConnectionManager, FakeFactory) {
    let factory = FakeFactory::new(OnOpen::Open);
    let manager =
        ConnectionManager::with_transport(Config::new("ws://host/x").unwrap(), factory.clone());
    manager.connect().await.unwrap();
    (manager, factory)
}

async fn wait_for_state(manager: &ConnectionManager, state: ConnectionState) {
    timeout(Duration::from_secs(2), async {
        while manager.state() != state {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn reconnects_after_unexpected_close() {
    let (manager, factory) = connected().await;
    let _reconnector = Reconnector::spawn(manager.clone(), fast(Some(3)));

    factory.last().drop_connection(1006);

    factory.wait_for_sockets(2).await;
    wait_for_state(&manager, ConnectionState::Connected).await;
    assert_eq!(factory.opened(), 2);
}

#[tokio::test]
async fn reconnects_after_transport_error() {
    let (manager, factory) = connected().await;
    let _reconnector = Reconnector::spawn(manager.clone(), fast(Some(3)));

    factory.last().fail("reset by peer");

    factory.wait_for_sockets(2).await;
    wait_for_state(&manager, ConnectionState::Connected).await;
}

#[tokio::test]
async fn gives_up_after_max_attempts() {
    let (manager, factory) = connected().await;
    let reconnector = Reconnector::spawn(manager.clone(), fast(Some(2)));

    factory.set_behavior(OnOpen::Fail("connection refused".to_owned()));
    factory.last().drop_connection(1006);

    timeout(Duration::from_secs(2), async {
        while !reconnector.is_finished() {
            sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap();

    assert_eq!(factory.opened(), 3, "initial connection plus two attempts");
    assert_eq!(manager.state(), ConnectionState::Error);
}

#[tokio::test]
async fn cancel_stops_reconnecting() {
    let (manager, factory) = connected().await;
    let reconnector = Reconnector::spawn(manager.clone(), fast(None));
    assert_eq!(manager.listener_count(EventKind::StateChange), 1);

    reconnector.cancel();
    manager.disconnect();
    sleep(Duration::from_millis(50)).await;

    assert_eq!(manager.listener_count(EventKind::StateChange), 0);
    assert_eq!(manager.state(), ConnectionState::Disconnected);
    assert_eq!(factory.opened(), 1);
}

#[tokio::test]
async fn cancel_during_attempt_leaves_manager_usable() {
    let factory = FakeFactory::new(OnOpen::Open);
    let auth = Arc::new(StallingToken::default());
    auth.release();
    let provider: Arc<dyn AuthProvider> = Arc::clone(&auth) as Arc<dyn AuthProvider>;
    let config = Config::new("ws://host/x").unwrap().with_auth(provider);
    let manager = ConnectionManager::with_transport(config, factory.clone());
    manager.connect().await.unwrap();

    auth.stall();
    let reconnector = Reconnector::spawn(manager.clone(), fast(None));
    factory.last().drop_connection(1006);
    // The attempt is now parked on the token request.
    wait_for_state(&manager, ConnectionState::Connecting).await;

    reconnector.cancel();
    wait_for_state(&manager, ConnectionState::Disconnected).await;
    assert_eq!(manager.listener_count(EventKind::StateChange), 0);

    auth.release();
    manager.connect().await.unwrap();
    assert_eq!(manager.state(), ConnectionState::Connected);
    assert_eq!(factory.opened(), 2);
}
