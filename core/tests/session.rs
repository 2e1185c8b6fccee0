//! Integration tests: sessions talking through the in-memory hub.

use std::time::Duration;

use textsync_core::ot::Operation;
use textsync_core::sync::{
    ClientDocument, MemoryChannel, MemoryHub, Session, SessionHandle, SyncConfig, SyncState,
};

const DOC: &str = "doc";

async fn join(hub: &MemoryHub, client_id: &str) -> (SessionHandle, MemoryChannel) {
    join_with(hub, client_id, SyncConfig::default()).await
}

async fn join_with(
    hub: &MemoryHub,
    client_id: &str,
    config: SyncConfig,
) -> (SessionHandle, MemoryChannel) {
    let document = hub.document(DOC).await.unwrap();
    let (channel, inbound) = hub.connect(DOC, client_id).await.unwrap();
    let client = ClientDocument::with_options(
        client_id.to_string(),
        DOC.to_string(),
        &document.content(),
        document.version(),
        config,
    );
    (Session::spawn(client, channel.clone(), inbound), channel)
}

/// Wait until every session is idle and matches the server; returns the text
async fn settle(hub: &MemoryHub, sessions: &[&SessionHandle]) -> String {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let document = hub.document(DOC).await.unwrap();
            let settled = sessions.iter().all(|session| {
                let snapshot = session.snapshot();
                snapshot.state == SyncState::Idle
                    && snapshot.version == document.version()
                    && snapshot.content == document.content()
            });
            if settled {
                return document.content();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("sessions did not converge")
}

#[tokio::test]
async fn test_concurrent_edits_converge() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "hello").await;
    let (alice, _) = join(&hub, "alice").await;
    let (bob, _) = join(&hub, "bob").await;

    let (a, b) = tokio::join!(
        alice.edit(Operation::insert(5, " world")),
        async {
            bob.edit(Operation::remove(0, "h")).await?;
            bob.edit(Operation::insert(0, "j")).await
        }
    );
    a.unwrap();
    b.unwrap();

    assert_eq!(settle(&hub, &[&alice, &bob]).await, "jello world");
}

#[tokio::test]
async fn test_typing_run_from_both_sides() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "").await;
    let (alice, _) = join(&hub, "alice").await;
    let (bob, _) = join(&hub, "bob").await;

    for (i, c) in "abc".chars().enumerate() {
        alice.edit(Operation::insert(i, c.to_string())).await.unwrap();
    }
    for c in "xyz".chars() {
        let len = bob.snapshot().content.chars().count();
        bob.edit(Operation::insert(len, c.to_string())).await.unwrap();
    }

    let content = settle(&hub, &[&alice, &bob]).await;
    let mut chars: Vec<char> = content.chars().collect();
    chars.sort_unstable();
    assert_eq!(chars, vec!['a', 'b', 'c', 'x', 'y', 'z']);
}

#[tokio::test(start_paused = true)]
async fn test_offline_edits_resync_on_reconnect() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "car").await;
    let (alice, alice_channel) = join(&hub, "alice").await;
    let (bob, _) = join(&hub, "bob").await;

    alice_channel.set_online(false);
    alice.edit(Operation::insert(3, "t")).await.unwrap();

    // Bob moves the server on while Alice cannot hear it
    bob.edit(Operation::insert(0, "s")).await.unwrap();
    bob.wait_for(|snapshot| snapshot.state == SyncState::Idle && snapshot.version == 1)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(hub.document(DOC).await.unwrap().content(), "scar");
    assert_eq!(alice.snapshot().state, SyncState::Queued);
    assert_eq!(alice.snapshot().content, "cart");

    // Alice's retry is stale (she is at version 0), so it is refused,
    // she pulls what she missed and resubmits
    alice_channel.set_online(true);
    assert_eq!(settle(&hub, &[&alice, &bob]).await, "scart");
}

#[tokio::test]
async fn test_selection_shared() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "car").await;
    let (alice, _) = join(&hub, "alice").await;
    let (bob, _) = join(&hub, "bob").await;

    alice.set_selection(2, 2).await.unwrap();
    let snapshot = tokio::time::timeout(
        Duration::from_secs(5),
        bob.wait_for(|snapshot| snapshot.remote_selections == [("alice".to_string(), 2)]),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(snapshot.remote_selections, vec![("alice".to_string(), 2)]);

    // Bob types in front of Alice's caret; his view of it moves along
    bob.edit(Operation::insert(0, "s")).await.unwrap();
    assert_eq!(bob.snapshot().remote_selections, vec![("alice".to_string(), 3)]);
}

#[tokio::test(start_paused = true)]
async fn test_caret_reannounced_on_heartbeat() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "car").await;
    let (bob, bob_channel) = join(&hub, "bob").await;
    // Edits stay queued long enough to watch several heartbeats go by
    let config = SyncConfig {
        submit_delay_ms: 60_000,
        ..SyncConfig::default()
    };
    let heartbeat = config.selection_heartbeat();
    let (alice, _) = join_with(&hub, "alice", config).await;

    // Bob misses the announcement of Alice's caret move
    bob_channel.set_online(false);
    alice.set_selection(2, 2).await.unwrap();
    alice
        .wait_for(|snapshot| snapshot.selection_focus == 2)
        .await
        .unwrap();
    bob_channel.set_online(true);
    assert!(!bob
        .snapshot()
        .remote_selections
        .contains(&("alice".to_string(), 2)));

    // The next heartbeat repeats it
    tokio::time::timeout(
        heartbeat * 2,
        bob.wait_for(|snapshot| snapshot.remote_selections == [("alice".to_string(), 2)]),
    )
    .await
    .unwrap()
    .unwrap();

    // While her edit is queued Alice's caret (now at 3) is not announced
    alice.edit(Operation::insert(0, "s")).await.unwrap();
    assert_eq!(alice.snapshot().selection_focus, 3);
    tokio::time::sleep(heartbeat * 3).await;
    assert_eq!(alice.snapshot().state, SyncState::Queued);
    assert_eq!(bob.snapshot().remote_selections, vec![("alice".to_string(), 2)]);

    // Once the edit lands Bob sees it with the caret right after it
    let snapshot = tokio::time::timeout(
        Duration::from_secs(120),
        bob.wait_for(|snapshot| {
            snapshot.content == "scar" && snapshot.remote_selections == [("alice".to_string(), 3)]
        }),
    )
    .await
    .unwrap()
    .unwrap();
    assert_eq!(snapshot.version, 1);
}

#[tokio::test]
async fn test_undo_reaches_server() {
    let hub = MemoryHub::new();
    hub.create_document(DOC, "car").await;
    let (alice, _) = join(&hub, "alice").await;
    let (bob, _) = join(&hub, "bob").await;

    alice.edit(Operation::insert(3, "t")).await.unwrap();
    assert_eq!(settle(&hub, &[&alice, &bob]).await, "cart");

    alice.undo().await.unwrap();
    assert_eq!(settle(&hub, &[&alice, &bob]).await, "car");

    alice.redo().await.unwrap();
    assert_eq!(settle(&hub, &[&alice, &bob]).await, "cart");
}
