//! Scenario: callback ordering
//!
//! Three callbacks queue for the same ability before it publishes. They are
//! answered once each, in the order they were registered.

use samgr_e2e_tests::assertions::{assert_event_count, assert_in_order, assert_no_pending_load};
use samgr_e2e_tests::{announce, id, report, wait_until, SamgrHarness, WAIT};
use std::time::Duration;

const MEDIA: &str = r#"
process: media_service
systemabilities:
  - id: 1301
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_callbacks_answered_in_registration_order() {
    let name = "Callbacks are answered in registration order";
    announce(name);
    let harness = SamgrHarness::new(&[MEDIA]).unwrap();
    harness.set_start_delay(id(1301), Duration::from_millis(300));

    let result = async {
        println!("Step 1: Queueing cb1, cb2 and cb3...");
        harness.load(id(1301), "cb1", 100).await?;
        harness.load(id(1301), "cb2", 101).await?;
        harness.load(id(1301), "cb3", 100).await?;
        println!("✓ Three loads queued\n");

        println!("Step 2: Waiting for the ability to publish...");
        wait_until("all callbacks answered", WAIT, || {
            harness.events.count("cb3 success:1301") == 1
        })
        .await?;
        assert_in_order(
            &harness.events,
            &["1301 start", "cb1 success:1301", "cb2 success:1301", "cb3 success:1301"],
        )?;
        for cb in ["cb1", "cb2", "cb3"] {
            assert_event_count(&harness.events, &format!("{} success:1301", cb), 1)?;
            assert_event_count(&harness.events, &format!("{} fail:1301", cb), 0)?;
        }
        assert_no_pending_load(&harness, id(1301))?;
        if harness.launched().len() != 1 {
            return Err(format!("expected one launch: {:?}", harness.launched()));
        }
        println!("✓ FIFO delivery, one launch\n");
        Ok::<(), String>(())
    }
    .await;

    harness.shutdown().await;
    report(name, result);
}
