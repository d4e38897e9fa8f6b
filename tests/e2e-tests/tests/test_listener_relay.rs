//! Scenario: status relay and process death
//!
//! An ability in one process listens for an ability in another through its
//! manager's relay, next to a plain client listener. The peer process then
//! dies and is launched again by a later load.

use samgr_e2e_tests::assertions::{
    assert_event_count, assert_not_published, assert_process_registered, assert_published,
};
use samgr_e2e_tests::{announce, id, report, wait_until, SamgrHarness, WAIT};

const MEDIA: &str = r#"
process: media_service
systemabilities:
  - id: 1201
    run_on_create: true
"#;

const AUDIO: &str = r#"
process: audio_service
systemabilities:
  - id: 3001
    run_on_create: true
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_peer_status_reaches_local_listener() {
    let name = "Peer status reaches local listeners";
    announce(name);
    let harness = SamgrHarness::new(&[MEDIA, AUDIO]).unwrap();
    harness.set_peers(id(1201), vec![id(3001)]);

    let result = async {
        println!("Step 1: Booting media_service, 1201 listens for 3001...");
        let media = harness.start_process("media_service").await?;
        harness.subscribe(id(3001), "client", 100).await?;
        if media.listeners_of(id(3001)) != vec![id(1201)] {
            return Err(format!("relay: {:?}", media.listeners_of(id(3001))));
        }
        // One relay subscription for the process plus the client's.
        let subscriptions = harness.registry.snapshot().subscriptions;
        if subscriptions != 2 {
            return Err(format!("expected 2 subscriptions, found {}", subscriptions));
        }
        println!("✓ Subscriptions in place\n");

        println!("Step 2: Booting audio_service...");
        harness.start_process("audio_service").await?;
        wait_until("added relayed", WAIT, || {
            harness.events.contains("1201 peer-added:3001")
                && harness.events.contains("client added:3001")
        })
        .await?;
        assert_event_count(&harness.events, "1201 peer-added:3001", 1)?;
        assert_event_count(&harness.events, "client added:3001", 1)?;
        println!("✓ Exactly one added per listener\n");

        println!("Step 3: Killing audio_service...");
        harness.kill_process("audio_service")?;
        wait_until("removed relayed", WAIT, || {
            harness.events.contains("1201 peer-removed:3001")
                && harness.events.contains("client removed:3001")
        })
        .await?;
        assert_not_published(&harness, id(3001))?;
        let processes = harness.registry.snapshot().processes;
        if processes.iter().any(|p| p == "audio_service") {
            return Err(format!("dead process still registered: {:?}", processes));
        }
        println!("✓ Death cleaned up and relayed\n");

        println!("Step 4: Loading 3001 relaunches audio_service...");
        harness.load(id(3001), "cb1", 100).await?;
        wait_until("cb1 answered", WAIT, || harness.events.contains("cb1 success:3001")).await?;
        assert_process_registered(&harness, "audio_service")?;
        assert_published(&harness, id(3001))?;
        if harness.launched() != vec!["audio_service".to_string()] {
            return Err(format!("unexpected launches: {:?}", harness.launched()));
        }
        wait_until("second added", WAIT, || {
            harness.events.count("1201 peer-added:3001") == 2
        })
        .await?;
        println!("✓ Relaunched and relayed again\n");
        Ok::<(), String>(())
    }
    .await;

    harness.shutdown().await;
    report(name, result);
}
