// tests/ingest_scheduler.rs
//
// Tick-level behaviour: reconciliation, per-feed isolation, dormant feeds
// and the periodic driver.

mod common;

use anyhow::Result;
use async_trait::async_trait;
use common::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc, Mutex};
use std::time::Duration;

use firewatch_timeline::ingest::config::{EntityConfig, EntitySource, StaticEntitySource};
use firewatch_timeline::ingest::providers::FeedFactory;
use firewatch_timeline::ingest::run_tick;
use firewatch_timeline::ingest::scheduler::{spawn_scheduler, SchedulerCfg};
use firewatch_timeline::registry::Registry;
use firewatch_timeline::snapshot::SnapshotStore;
use firewatch_timeline::SharedRegistry;

fn registry(feeds: &[(&'static str, &Probe)]) -> SharedRegistry {
    let mut factory = FeedFactory::new();
    for (name, probe) in feeds {
        let probe = (*probe).clone();
        factory = factory.with(*name, move || probe.feed());
    }
    Registry::new(factory, SnapshotStore::disabled()).shared()
}

#[tokio::test]
async fn one_failing_feed_does_not_stop_the_others() {
    let good = Probe::with_upstream(vec![hotspot(ts(1))]);
    let bad = Probe::default();
    bad.fail.store(true, Ordering::SeqCst);

    let reg = registry(&[("good", &good), ("bad", &bad)]);
    let source = StaticEntitySource::new(vec![
        entity("a", 0, Some(2), &["bad", "good"]),
        entity("b", 0, Some(2), &["good", "unregistered"]),
    ]);

    let report = run_tick(&reg, &source).await;
    assert_eq!(report.entities, 2);
    assert_eq!(report.fetched, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(good.calls(), 2);

    let cache = reg.read().unwrap().cache("b", "good").unwrap();
    assert_eq!(cache.len(), 1);

    // unchanged closed window: nothing left to fetch for the good feeds
    let report = run_tick(&reg, &source).await;
    assert_eq!(report.satisfied, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(good.calls(), 2);
}

#[tokio::test]
async fn removed_feed_goes_dormant_but_keeps_its_data() {
    let hot = Probe::with_upstream(vec![hotspot(ts(1))]);
    let other = Probe::with_upstream(vec![hotspot(ts(1))]);
    let reg = registry(&[("hot", &hot), ("other", &other)]);
    let source = StaticEntitySource::new(vec![entity("a", 0, Some(2), &["hot", "other"])]);
    run_tick(&reg, &source).await;

    source.set(vec![entity("a", 0, Some(5), &["other"])]);
    let report = run_tick(&reg, &source).await;

    assert_eq!(report.fetched, 1);
    assert_eq!(hot.calls(), 1);
    assert_eq!(other.calls(), 2);
    let dormant = reg.read().unwrap().cache("a", "hot").unwrap();
    assert_eq!(dormant.len(), 1);
}

struct FailingSource;

#[async_trait]
impl EntitySource for FailingSource {
    async fn load(&self) -> Result<Vec<EntityConfig>> {
        anyhow::bail!("config store unavailable")
    }
}

#[tokio::test]
async fn config_reload_failure_keeps_previous_entities() {
    let probe = Probe::default();
    let reg = registry(&[("hot", &probe)]);
    run_tick(
        &reg,
        &StaticEntitySource::new(vec![entity("a", 0, Some(2), &["hot"])]),
    )
    .await;

    let report = run_tick(&reg, &FailingSource).await;
    assert_eq!(report.entities, 1);
    assert!(reg.read().unwrap().entity("a").is_some());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn registry_stays_readable_while_new_caches_open() {
    let (entered_tx, entered_rx) = mpsc::channel::<()>();
    let (release_tx, release_rx) = mpsc::channel::<()>();
    let (entered_tx, release_rx) = (Mutex::new(entered_tx), Mutex::new(release_rx));

    let hot = Probe::with_upstream(vec![hotspot(ts(1))]);
    let slow = Probe::default();
    let (hot_feed, slow_feed) = (hot.clone(), slow.clone());
    let factory = FeedFactory::new()
        .with("hot", move || hot_feed.feed())
        .with("slow", move || {
            // held here the way a large snapshot read would be
            let _ = entered_tx.lock().unwrap().send(());
            let _ = release_rx
                .lock()
                .unwrap()
                .recv_timeout(Duration::from_secs(5));
            slow_feed.feed()
        });
    let reg = Registry::new(factory, SnapshotStore::disabled()).shared();

    let source = StaticEntitySource::new(vec![entity("a", 0, Some(2), &["hot"])]);
    run_tick(&reg, &source).await;

    source.set(vec![
        entity("a", 0, Some(2), &["hot"]),
        entity("b", 0, Some(2), &["slow"]),
    ]);
    let tick = tokio::spawn({
        let (reg, source) = (reg.clone(), source.clone());
        async move { run_tick(&reg, &source).await }
    });

    tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
        .await
        .unwrap()
        .expect("cache open should start");
    {
        let guard = reg
            .try_read()
            .expect("registry must stay readable while caches open");
        assert!(guard.entity("a").is_some());
        assert_eq!(guard.cache("a", "hot").unwrap().len(), 1);
        assert!(guard.cache("b", "slow").is_none());
    }

    release_tx.send(()).unwrap();
    let report = tick.await.unwrap();
    assert_eq!(report.entities, 2);
    assert_eq!(report.failed, 0);
    assert!(reg.read().unwrap().cache("b", "slow").is_some());
    assert_eq!(slow.calls(), 1);
}

#[derive(Default)]
struct CountingSource {
    loads: AtomicUsize,
}

#[async_trait]
impl EntitySource for CountingSource {
    async fn load(&self) -> Result<Vec<EntityConfig>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Ok(Vec::new())
    }
}

#[tokio::test(start_paused = true)]
async fn scheduler_ticks_immediately_then_on_interval() {
    let reg = registry(&[]);
    let source = Arc::new(CountingSource::default());

    let handle = spawn_scheduler(
        SchedulerCfg { interval_secs: 60 },
        reg,
        source.clone() as Arc<dyn EntitySource>,
    );

    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);

    tokio::time::sleep(Duration::from_secs(61)).await;
    assert_eq!(source.loads.load(Ordering::SeqCst), 2);

    handle.abort();
}
