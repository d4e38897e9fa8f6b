//! Scenario: load timeout
//!
//! The hosting process cannot be launched. The waiting callback fails once
//! when the load timeout passes, and a later load starts from scratch.

use samgr_e2e_tests::assertions::{assert_event_count, assert_no_pending_load, assert_published};
use samgr_e2e_tests::harness::{manager_config, registry_config};
use samgr_e2e_tests::{announce, id, report, wait_until, SamgrHarness, WAIT};
use samgr_registry::RegistryConfig;
use std::time::{Duration, Instant};

const MEDIA: &str = r#"
process: media_service
systemabilities:
  - id: 1301
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_failed_launch_times_out_once() {
    let name = "Failed launch times out once";
    announce(name);
    let config = RegistryConfig {
        load_timeout: Duration::from_millis(300),
        ..registry_config()
    };
    let harness = SamgrHarness::with_configs(config, manager_config(), &[MEDIA]).unwrap();
    harness.refuse_launches(true);

    let result = async {
        println!("Step 1: Loading with launches refused...");
        let started = Instant::now();
        harness.load(id(1301), "cb1", 100).await?;
        wait_until("cb1 failed", WAIT, || harness.events.contains("cb1 fail:1301")).await?;
        if started.elapsed() < Duration::from_millis(300) {
            return Err(format!("failed after {:?}, before the timeout", started.elapsed()));
        }
        println!("✓ cb1 failed after {:?}\n", started.elapsed());

        println!("Step 2: Making sure it fails only once...");
        tokio::time::sleep(Duration::from_millis(600)).await;
        assert_event_count(&harness.events, "cb1 fail:1301", 1)?;
        assert_event_count(&harness.events, "cb1 success:1301", 0)?;
        assert_no_pending_load(&harness, id(1301))?;
        if !harness.registry.snapshot().starting_processes.is_empty() {
            return Err("process still marked as starting".to_string());
        }
        println!("✓ Exactly one failure, no leftovers\n");

        println!("Step 3: Loading again once launches work...");
        harness.refuse_launches(false);
        harness.load(id(1301), "cb2", 100).await?;
        wait_until("cb2 answered", WAIT, || harness.events.contains("cb2 success:1301")).await?;
        assert_published(&harness, id(1301))?;
        assert_event_count(&harness.events, "cb1 fail:1301", 1)?;
        if harness.launched().len() != 2 {
            return Err(format!("expected two launches: {:?}", harness.launched()));
        }
        println!("✓ Fresh load succeeded\n");
        Ok::<(), String>(())
    }
    .await;

    harness.shutdown().await;
    report(name, result);
}
