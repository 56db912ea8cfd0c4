//! Several workers compete for the same job lock over five in-memory
//! instances, one of which is broken. Run with
//! `RUST_LOG=debug cargo run -p redlock --example job_runner` to see the
//! quorum decisions.

use std::sync::Arc;
use std::time::Duration;

use redlock::prelude::*;
use redlock::telemetry::{LogFormat, TelemetryConfig};
use redlock_memory::{erased, faulty_instances, memory_instances};

#[tokio::main]
async fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    TelemetryConfig::builder()
        .service_name("job-runner")
        .log_level(std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()))
        .format(LogFormat::Compact)
        .build()
        .init()?;

    let mut all = erased(&memory_instances(4));
    all.extend(erased(&faulty_instances(1)));
    let factory = RedlockFactory::builder()
        .instances(InstanceSet::non_empty(all)?)
        .options(
            RedlockOptions::builder()
                .default_ttl(Duration::from_secs(2))
                .default_max_wait(Duration::from_millis(50))
                .default_max_retries(200)
                .build()?,
        )
        .build()?;
    let factory = Arc::new(factory);

    let mut workers = Vec::new();
    for id in 0..3 {
        let factory = Arc::clone(&factory);
        workers.push(tokio::spawn(async move {
            let lock = Arc::new(factory.create_default_async("nightly-report").await?);
            println!("worker {id} holds the lock until {}", lock.valid_until());

            let extender = factory.auto_extend(Arc::clone(&lock), Duration::from_millis(500));
            tokio::time::sleep(Duration::from_millis(1200)).await;
            let stats = extender.shutdown().await;

            lock.release_async().await;
            println!("worker {id} done, {} extensions", stats.success_count);
            Ok::<_, redlock::Error>(())
        }));
    }

    for worker in workers {
        worker.await??;
    }
    Ok(())
}
