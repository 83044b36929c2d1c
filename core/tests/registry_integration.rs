use breaker_fleet::{
    BreakerConfig, BreakerError, BreakerRegistry, BreakerState, RegistryConfig, RejectReason,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock, Weak};
use std::time::Duration;

async fn healthy(registry: &BreakerRegistry, name: &str) -> Result<(), BreakerError<String>> {
    registry.execute(name, || async { Ok(()) }).await
}

async fn broken(registry: &BreakerRegistry, name: &str) -> Result<(), BreakerError<String>> {
    registry
        .execute(name, || async { Err("connection reset".to_string()) })
        .await
}

#[tokio::test(start_paused = true)]
async fn failing_dependency_does_not_affect_others() {
    let registry = BreakerRegistry::default();

    for _ in 0..20 {
        let _ = broken(&registry, "database").await;
        healthy(&registry, "cache").await.unwrap();
    }

    let states = registry.all_states();
    assert_eq!(states["database"].state, BreakerState::Open);
    assert_eq!(states["cache"].state, BreakerState::Closed);

    let summary = registry.health_summary();
    assert_eq!(summary.total_services, 2);
    assert_eq!(summary.unhealthy_names, vec!["database"]);
    assert_eq!(summary.healthy_percentage, 50.0);
}

#[tokio::test(start_paused = true)]
async fn external_api_preset_full_recovery_cycle() {
    let registry = BreakerRegistry::default();
    let preset = BreakerConfig::external_api();

    for _ in 0..preset.min_request_volume {
        let _ = broken(&registry, "external_api").await;
    }
    let breaker = registry.get_or_create("external_api");
    assert!(breaker.is_open());

    match healthy(&registry, "external_api").await {
        Err(BreakerError::Open {
            reason,
            last_failure,
            ..
        }) => {
            assert_eq!(reason, RejectReason::Open);
            assert_eq!(last_failure.as_deref(), Some("connection reset"));
        }
        other => panic!("expected rejection, got {other:?}"),
    }

    tokio::time::advance(preset.recovery_timeout).await;

    for _ in 0..preset.success_threshold {
        healthy(&registry, "external_api").await.unwrap();
    }
    assert!(breaker.is_closed());
    assert!(registry.health_summary().all_healthy());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_breaker() {
    let registry = Arc::new(BreakerRegistry::default());
    let mut handles = Vec::new();

    for i in 0..100u32 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            registry
                .execute("svc", || async move {
                    tokio::task::yield_now().await;
                    Ok::<_, String>(i)
                })
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(registry.len(), 1);
    let totals = registry.get_or_create("svc").totals();
    assert_eq!(totals.requests, 100);
    assert_eq!(totals.successes, 100);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_failures_fire_on_open_once() {
    let opened = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&opened);

    let registry = Arc::new(
        BreakerRegistry::builder()
            .default_config(BreakerConfig {
                failure_threshold: 5,
                min_request_volume: 5,
                recovery_timeout: Duration::from_secs(600),
                ..Default::default()
            })
            .on_open(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap(),
    );

    let mut handles = Vec::new();
    for _ in 0..64 {
        let registry = Arc::clone(&registry);
        handles.push(tokio::spawn(async move {
            let _ = broken(&registry, "flaky").await;
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(registry.health_summary().unhealthy_count, 1);
}

#[tokio::test(start_paused = true)]
async fn transition_hooks_can_read_the_registry() {
    let handle: Arc<OnceLock<Weak<BreakerRegistry>>> = Arc::new(OnceLock::new());
    let seen = Arc::new(AtomicUsize::new(usize::MAX));

    let hook_handle = Arc::clone(&handle);
    let hook_seen = Arc::clone(&seen);
    let registry = Arc::new(
        BreakerRegistry::builder()
            .on_open(move |_| {
                if let Some(registry) = hook_handle.get().and_then(Weak::upgrade) {
                    // Lock is already released, so this must not deadlock
                    let summary = registry.health_summary();
                    hook_seen.store(summary.unhealthy_count, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap(),
    );
    handle.set(Arc::downgrade(&registry)).unwrap();

    for _ in 0..10 {
        let _ = broken(&registry, "search").await;
    }

    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[test]
fn registry_config_loads_from_json() {
    let json = r#"{
        "default": { "call_timeout": "3s" },
        "presets": {
            "geocoder": {
                "failure_threshold": 2,
                "min_request_volume": 2,
                "recovery_timeout": "45s"
            }
        }
    }"#;

    let config: RegistryConfig = serde_json::from_str(json).unwrap();
    let registry = BreakerRegistry::new(config).unwrap();

    let geocoder = registry.get_or_create("geocoder");
    assert_eq!(geocoder.config().recovery_timeout, Duration::from_secs(45));
    assert_eq!(geocoder.config().failure_threshold, 2);

    // Explicit presets replace the standard set
    let database = registry.get_or_create("database");
    assert_eq!(database.config().call_timeout, Duration::from_secs(3));
}
