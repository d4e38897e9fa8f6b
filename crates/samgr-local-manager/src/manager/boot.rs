//! Phased boot.
//!
//! Boot targets are bucketed by boot phase. Within a phase every ability is
//! started on the boot pool at the same time, and the next phase begins once
//! all of them have finished or `max_phase_wait` has passed. A phase larger
//! than the pool's queue waits for room; whatever is still unqueued when the
//! phase deadline passes is queued in the background, so no target is ever
//! dropped. An ability with dependencies first polls the registry until they
//! are all published or its own dependency timeout runs out, then starts
//! either way.

use super::LocalAbilityManager;
use samgr_ability::{SystemAbility, SystemAbilityExt};
use samgr_common::AbilityId;
use samgr_profile::BootPhase;
use samgr_registry::SamgrClient;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Counts the unfinished tasks of one phase.
struct PhaseLatch {
    remaining: AtomicUsize,
    done: Notify,
}

impl PhaseLatch {
    fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            done: Notify::new(),
        }
    }

    fn count_down(&self) {
        let previous = self
            .remaining
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .unwrap_or(0);
        if previous <= 1 {
            self.done.notify_waiters();
        }
    }

    async fn wait(&self) {
        loop {
            let notified = self.done.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.remaining.load(Ordering::Acquire) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Counts down when dropped, so a panicking task still releases its phase.
struct CountDown(Arc<PhaseLatch>);

impl Drop for CountDown {
    fn drop(&mut self) {
        self.0.count_down();
    }
}

impl LocalAbilityManager {
    /// Starts the boot targets phase by phase: Boot, then Core, then Other.
    ///
    /// Targets are the local run-on-create abilities, or only `start_id`
    /// when the process was launched for it.
    pub async fn start_phased_boot(&self, start_id: Option<AbilityId>) {
        let mut phases: BTreeMap<BootPhase, Vec<Arc<dyn SystemAbility>>> = BTreeMap::new();
        for id in self.ability_ids() {
            let Some(ability) = self.get_ability(id) else {
                continue;
            };
            let attrs = ability.base().attrs();
            let target = match start_id {
                None => attrs.run_on_create,
                Some(start) => start == id,
            };
            if target {
                phases.entry(attrs.boot_phase).or_default().push(ability);
            }
        }

        for phase in BootPhase::ALL {
            if let Some(abilities) = phases.remove(&phase) {
                self.start_phase(phase, abilities).await;
            }
        }
    }

    async fn start_phase(&self, phase: BootPhase, abilities: Vec<Arc<dyn SystemAbility>>) {
        let started = Instant::now();
        let deadline = started + self.config.max_phase_wait;
        let count = abilities.len();
        let latch = Arc::new(PhaseLatch::new(count));
        info!("Starting {} abilities in {}", count, phase);

        let interval = self.config.dependency_check_interval;
        let mut targets = abilities.into_iter();
        let mut late = Vec::new();
        while let Some(ability) = targets.next() {
            let guard = CountDown(Arc::clone(&latch));
            let slot = match tokio::time::timeout_at(deadline, self.boot_pool.reserve()).await {
                Ok(Ok(slot)) => slot,
                Ok(Err(e)) => {
                    warn!("Boot task for ability {} not queued: {}", ability.base().id(), e);
                    continue;
                }
                Err(_) => {
                    late.push(ability);
                    late.extend(targets);
                    break;
                }
            };
            let samgr = Arc::clone(&self.samgr);
            slot.submit(async move {
                let _guard = guard;
                boot_ability(samgr, ability, interval).await;
            });
        }

        if !late.is_empty() {
            warn!(
                "{}: {} abilities not queued within {:?}, queueing them in the background",
                phase,
                late.len(),
                self.config.max_phase_wait
            );
            self.queue_late(late);
        } else if tokio::time::timeout_at(deadline, latch.wait()).await.is_err() {
            warn!(
                "{} did not finish within {:?}, moving on",
                phase, self.config.max_phase_wait
            );
        }
        info!("{} finished in {:?}", phase, started.elapsed());
    }

    /// Queues boot targets of a phase that already moved on.
    fn queue_late(&self, abilities: Vec<Arc<dyn SystemAbility>>) {
        let pool = self.boot_pool.clone();
        let samgr = Arc::clone(&self.samgr);
        let interval = self.config.dependency_check_interval;
        tokio::spawn(async move {
            for ability in abilities {
                match pool.reserve().await {
                    Ok(slot) => slot.submit(boot_ability(Arc::clone(&samgr), ability, interval)),
                    Err(e) => warn!("Boot task for ability {} not queued: {}", ability.base().id(), e),
                }
            }
        });
    }
}

async fn boot_ability(samgr: Arc<dyn SamgrClient>, ability: Arc<dyn SystemAbility>, interval: Duration) {
    let base = ability.base();
    let attrs = base.attrs();
    if !attrs.depends.is_empty() {
        let missing =
            wait_for_dependencies(samgr.as_ref(), &attrs.depends, attrs.depend_timeout, interval)
                .await;
        if !missing.is_empty() {
            warn!(
                "Ability {}: dependencies {:?} not published within {:?}, starting anyway",
                base.id(),
                missing,
                attrs.depend_timeout
            );
        }
    }
    if let Err(e) = ability.start().await {
        warn!("Boot start of ability {} failed: {}", base.id(), e);
    }
}

/// Polls until every id in `depends` is published or `timeout` passes.
/// Returns the ids still missing.
pub(crate) async fn wait_for_dependencies(
    samgr: &dyn SamgrClient,
    depends: &[AbilityId],
    timeout: Duration,
    interval: Duration,
) -> Vec<AbilityId> {
    let deadline = Instant::now() + timeout;
    loop {
        let missing = missing_dependencies(samgr, depends).await;
        if missing.is_empty() || Instant::now() >= deadline {
            return missing;
        }
        tokio::time::sleep(interval).await;
    }
}

async fn missing_dependencies(samgr: &dyn SamgrClient, depends: &[AbilityId]) -> Vec<AbilityId> {
    let mut missing = Vec::new();
    for &id in depends {
        match samgr.check_system_ability(id).await {
            Ok(Some(_)) => {}
            Ok(None) => missing.push(id),
            Err(e) => {
                debug!("Dependency check for {} failed: {}", id, e);
                missing.push(id);
            }
        }
    }
    missing
}
