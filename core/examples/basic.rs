//! Basic registry usage example
//!
//! Run with `RUST_LOG=breaker_fleet=debug` to see transition logging.

use breaker_fleet::{BreakerConfig, BreakerError, BreakerRegistry};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

async fn charge(order: u32, healthy: bool) -> Result<String, String> {
    tokio::time::sleep(Duration::from_millis(20)).await;
    if healthy {
        Ok(format!("order {order} charged"))
    } else {
        Err(format!("payment gateway refused order {order}"))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    println!("=== Circuit Breaker Registry Example ===\n");

    let registry = BreakerRegistry::builder()
        .preset(
            "payment_api",
            BreakerConfig {
                failure_threshold: 3,
                min_request_volume: 3,
                recovery_timeout: Duration::from_secs(2),
                success_threshold: 2,
                call_timeout: Duration::from_millis(500),
                ..BreakerConfig::external_api()
            },
        )
        .on_open(|name| println!("🔴 Circuit '{name}' opened!"))
        .on_close(|name| println!("🟢 Circuit '{name}' closed!"))
        .on_half_open(|name| println!("🟡 Circuit '{name}' half-open, testing..."))
        .build()?;

    println!("--- Successful calls ---");
    for order in 1..=2 {
        match registry.execute("payment_api", || charge(order, true)).await {
            Ok(receipt) => println!("✓ {receipt}"),
            Err(e) => println!("✗ {e}"),
        }
    }

    println!("\n--- Triggering failures ---");
    for order in 3..=5 {
        if let Err(e) = registry.execute("payment_api", || charge(order, false)).await {
            println!("✗ {e}");
        }
    }

    println!("\n--- Attempting call while open ---");
    match registry.execute("payment_api", || charge(6, true)).await {
        Err(BreakerError::Open {
            time_until_retry, ..
        }) => println!("✗ rejected, retry in {time_until_retry:?}"),
        other => println!("unexpected: {other:?}"),
    }

    println!("\n--- Timeout ---");
    let slow = registry
        .execute_with_timeout(
            "search",
            || async {
                tokio::time::sleep(Duration::from_secs(2)).await;
                Ok::<_, String>("results")
            },
            Duration::from_millis(100),
        )
        .await;
    if let Err(e) = slow {
        println!("✗ {e}");
    }

    println!("\n--- Waiting for recovery ---");
    tokio::time::sleep(Duration::from_secs(2)).await;
    for order in 7..=8 {
        match registry.execute("payment_api", || charge(order, true)).await {
            Ok(receipt) => println!("✓ {receipt}"),
            Err(e) => println!("✗ {e}"),
        }
    }

    println!("\n--- Health ---");
    let summary = registry.health_summary();
    println!("{}", serde_json::to_string_pretty(&summary)?);
    for (name, snapshot) in registry.all_states() {
        println!(
            "{name}: {} (requests {}, failure rate {:.2})",
            snapshot.state, snapshot.totals.requests, snapshot.current_failure_rate
        );
    }

    registry.reset_all();
    println!("\nAfter reset: {}% healthy", registry.health_summary().healthy_percentage);

    Ok(())
}
