//! Smoke test for the crate's public re-export surface: a remote client and
//! server driven entirely through `stratakv::*`, with no direct dependency
//! on the member crates. If this compiles and passes, the re-exports in
//! `src/lib.rs` are complete enough for an external consumer.

use std::sync::Arc;

use stratakv::{Backend, Client, DeleteOptions, Facade, GetOptions, SetOptions};
use tokio::net::TcpListener;

#[tokio::test]
async fn public_surface_round_trips_a_node_over_the_wire() {
    let facade = Arc::new(Facade::builder(Backend::ByteOrderedTemporary).build().unwrap());

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
    tokio::spawn(async move {
        let _ = stratakv::serve(listener, facade, shutdown_rx).await;
    });

    let client = Client::connect(addr.to_string()).await.unwrap();
    client.set("group.g", "1", &SetOptions::default()).await.unwrap();
    client.set("group.g.child1", "2", &SetOptions::default()).await.unwrap();

    let node = client
        .get("group.g", &GetOptions::children())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(node.value, "1");
    assert_eq!(node.children.unwrap()["group.g.child1"], "2");

    client
        .delete("group.g", &DeleteOptions { children: true })
        .await
        .unwrap();
    assert!(client.get("group.g", &GetOptions::default()).await.unwrap().is_none());
    assert!(client
        .get("group.g.child1", &GetOptions::default())
        .await
        .unwrap()
        .is_none());
}

#[test]
fn public_surface_exposes_local_facade_without_the_network() {
    let mut db = Facade::builder(Backend::ByteOrderedTemporary).build().unwrap();
    db.set("k", "v", &SetOptions::default()).unwrap();
    assert_eq!(db.get("k", &GetOptions::default()).unwrap().unwrap().value, "v");
    db.close().unwrap();
}
