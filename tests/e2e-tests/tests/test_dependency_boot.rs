//! Scenario: dependency-gated boot
//!
//! A run-on-create ability depends on an ability hosted by another process.
//! Its start waits until the dependency publishes, and proceeds anyway when
//! the dependency never shows up within its timeout.

use samgr_e2e_tests::assertions::{assert_event_count, assert_published};
use samgr_e2e_tests::{announce, id, report, SamgrHarness};
use std::time::{Duration, Instant};

const AUDIO: &str = r#"
process: audio_service
systemabilities:
  - id: 1101
    run_on_create: true
    boot_phase: CoreStartPhase
"#;

const MEDIA: &str = r#"
process: media_service
systemabilities:
  - id: 1201
    run_on_create: true
    depends: [1101]
    depend_timeout: 5s
  - id: 1202
    run_on_create: true
    depends: [1999]
    depend_timeout: 300ms
    boot_phase: BootStartPhase
"#;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_start_waits_for_dependency() {
    let name = "Start waits for its dependency";
    announce(name);
    let harness = SamgrHarness::new(&[AUDIO, MEDIA]).unwrap();

    let result = async {
        println!("Step 1: Booting media_service before audio_service...");
        let boot_started = Instant::now();
        let (media, published_at) = tokio::join!(harness.start_process("media_service"), async {
            tokio::time::sleep(Duration::from_millis(600)).await;
            if harness.events.contains("1201 start") {
                return Err("1201 started before its dependency".to_string());
            }
            println!("Step 2: Booting audio_service...");
            let at = Instant::now();
            harness.start_process("audio_service").await?;
            Ok(at)
        });
        media?;
        let published_at = published_at?;
        println!("✓ Both processes booted in {:?}\n", boot_started.elapsed());

        println!("Step 3: Checking start times...");
        let started_at = harness
            .events
            .time_of("1201 start")
            .ok_or("1201 never started")?;
        let delay = started_at.saturating_duration_since(published_at);
        if started_at < published_at || delay > Duration::from_millis(500) {
            return Err(format!("1201 started {:?} after 1101 came up", delay));
        }
        assert_published(&harness, id(1101))?;
        assert_published(&harness, id(1201))?;
        assert_event_count(&harness.events, "1201 start", 1)?;
        println!("✓ 1201 started {:?} after its dependency\n", delay);
        Ok::<(), String>(())
    }
    .await;

    harness.shutdown().await;
    report(name, result);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_missing_dependency_does_not_block_boot() {
    let name = "Missing dependency does not block boot";
    announce(name);
    let harness = SamgrHarness::new(&[AUDIO, MEDIA]).unwrap();

    let result = async {
        println!("Step 1: Booting media_service with audio_service up...");
        harness.start_process("audio_service").await?;
        let started = Instant::now();
        harness.start_process("media_service").await?;
        let elapsed = started.elapsed();
        println!("✓ Boot finished in {:?}\n", elapsed);

        println!("Step 2: Checking the abilities...");
        if elapsed < Duration::from_millis(300) {
            return Err(format!("boot did not wait for 1999 ({:?})", elapsed));
        }
        assert_published(&harness, id(1202))?;
        assert_published(&harness, id(1201))?;
        println!("✓ 1202 started after its dependency timeout\n");
        Ok::<(), String>(())
    }
    .await;

    harness.shutdown().await;
    report(name, result);
}
