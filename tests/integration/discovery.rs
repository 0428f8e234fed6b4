use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use apireg_core::{Environment, Version};
use apireg_services::{EventKind, RegistrationEvent};

use crate::*;

fn recorder() -> (
    Arc<dyn apireg_services::RegistrationListener>,
    mpsc::UnboundedReceiver<RegistrationEvent>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |e: &RegistrationEvent| {
        let _ = tx.send(e.clone());
    };
    (Arc::new(listener), rx)
}

async fn next_event(rx: &mut mpsc::UnboundedReceiver<RegistrationEvent>) -> RegistrationEvent {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("timed out waiting for event")
        .expect("listener channel closed")
}

#[tokio::test]
async fn test_two_registries_see_each_other() {
    if !multicast_available() {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }

    let port = test_port();
    let reg0 = start("reg0", Environment::All, port).await.unwrap();
    let reg1 = start("reg1", Environment::All, port).await.unwrap();

    reg0.register_api("Something", Version::new(0, 1, 3), 8080)
        .await
        .unwrap();
    reg1.register_api("Other", Version::new(0, 1, 3), 8080)
        .await
        .unwrap();

    let settled = eventually(Duration::from_secs(2), || {
        !reg0.get_apis_by_api_name("Other").is_empty()
            && !reg1.get_apis_by_api_name("Something").is_empty()
    })
    .await;
    assert!(settled, "registries did not discover each other");

    let seen = reg0.get_apis_by_api_name("Other");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].version(), Version::new(0, 1, 3));
    assert_eq!(seen[0].host_port(), 8080);
    assert!(!seen[0].host_ip().is_unspecified(), "host ip comes from the packet source");

    // Neither registry lists its own service.
    assert!(reg0.get_apis_by_api_name("Something").is_empty());
    assert_eq!(reg1.get_available_apis().len(), 1);

    reg0.shutdown().await;
    reg1.shutdown().await;
}

#[tokio::test]
async fn test_environment_partitions_the_group() {
    if !multicast_available() {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }

    let port = test_port();
    let prod = start("prod", Environment::Prod, port).await.unwrap();
    let non_prod = start("non-prod", Environment::NonProd, port).await.unwrap();
    let all = start("all", Environment::All, port).await.unwrap();

    let v = Version::new(1, 0, 0);
    prod.register_api("p", v, 1001).await.unwrap();
    non_prod.register_api("n", v, 1002).await.unwrap();
    all.register_api("a", v, 1003).await.unwrap();

    let settled = eventually(Duration::from_secs(2), || {
        all.get_available_apis().len() == 2
            && prod.get_available_apis().len() == 1
            && non_prod.get_available_apis().len() == 1
    })
    .await;
    assert!(settled, "environments did not settle");

    // Give any wrongly accepted announcement time to show up.
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(prod.get_apis_by_api_name("n").is_empty());
    assert_eq!(prod.get_apis_by_api_name("a").len(), 1);
    assert!(non_prod.get_apis_by_api_name("p").is_empty());
    assert_eq!(non_prod.get_apis_by_api_name("a").len(), 1);
    assert_eq!(all.get_apis_by_api_name("p").len(), 1);
    assert_eq!(all.get_apis_by_api_name("n").len(), 1);

    prod.shutdown().await;
    non_prod.shutdown().await;
    all.shutdown().await;
}

#[tokio::test]
async fn test_silent_peer_expires_with_one_removed_event() {
    if !multicast_available() {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }

    let port = test_port();
    let watcher = start("watcher", Environment::All, port).await.unwrap();
    let (listener, mut events) = recorder();
    watcher.add_event_listener(listener);

    let peer = start("peer", Environment::All, port).await.unwrap();
    peer.register_api("ephemeral", Version::new(2, 0, 0), 7000)
        .await
        .unwrap();

    let added = next_event(&mut events).await;
    assert_eq!(added.kind, EventKind::Added);
    assert_eq!(added.api.name(), "ephemeral");

    // Peer stops resending; the 400ms lifespan runs out.
    peer.shutdown().await;
    drop(peer);

    let removed = next_event(&mut events).await;
    assert_eq!(removed.kind, EventKind::Removed);
    assert_eq!(removed.api.name(), "ephemeral");
    assert!(watcher.get_apis_by_api_name("ephemeral").is_empty());

    let extra = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert!(extra.is_err(), "unexpected extra event: {extra:?}");

    watcher.shutdown().await;
}

#[tokio::test]
async fn test_resends_keep_registration_alive() {
    if !multicast_available() {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }

    let port = test_port();
    let watcher = start("keeper", Environment::All, port).await.unwrap();
    let peer = start("kept", Environment::All, port).await.unwrap();
    peer.register_api("durable", Version::new(1, 0, 0), 7100)
        .await
        .unwrap();

    assert!(
        eventually(Duration::from_secs(2), || {
            !watcher.get_apis_by_api_name("durable").is_empty()
        })
        .await
    );

    // Well past one 400ms lifespan; resends every 100ms keep it fresh.
    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(watcher.get_apis_by_api_name("durable").len(), 1);

    peer.shutdown().await;
    watcher.shutdown().await;
}

#[tokio::test]
async fn test_removed_listener_stops_receiving() {
    if !multicast_available() {
        eprintln!("SKIP: multicast loopback not available");
        return;
    }

    let port = test_port();
    let watcher = start("quiet", Environment::All, port).await.unwrap();
    let (listener, mut events) = recorder();
    let id = watcher.add_event_listener(listener);
    assert!(watcher.remove_event_listener(id));

    let peer = start("loud", Environment::All, port).await.unwrap();
    peer.register_api("noise", Version::new(1, 0, 0), 7200)
        .await
        .unwrap();

    assert!(
        eventually(Duration::from_secs(2), || {
            !watcher.get_apis_by_api_name("noise").is_empty()
        })
        .await
    );
    let next = tokio::time::timeout(Duration::from_millis(300), events.recv()).await;
    assert!(matches!(next, Ok(None)), "expected closed channel, got {next:?}");

    peer.shutdown().await;
    watcher.shutdown().await;
}
