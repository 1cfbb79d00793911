use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::{error, info};

use crate::pipeline::IntakeService;

/// Periodic "process ready accounts" trigger. Correctness does not depend
/// on its cadence: every claim is an atomic conditional transition.
pub struct Sweeper {
    service: Arc<IntakeService>,
    interval: Duration,
}

impl Sweeper {
    pub fn new(service: Arc<IntakeService>, interval: Duration) -> Self {
        Self { service, interval }
    }

    pub async fn start(self) {
        info!("🧹 Sweeper started (every {}s)", self.interval.as_secs());

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            if let Err(e) = self.service.process_ready_accounts().await {
                error!("Sweep failed: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::account::types::MINUTE_MS;
    use crate::account::{AccountStatus, AccountStore, CountryPolicy, PassphraseVault};
    use crate::client::mock::{ScriptedClient, VALID_CODE};
    use crate::config::PipelineConfig;
    use crate::storage::Storage;
    use std::sync::atomic::{AtomicU64, Ordering};

    #[tokio::test]
    async fn test_sweeper_decides_ready_accounts() {
        let store = Arc::new(AccountStore::new(Arc::new(Storage::temporary().unwrap())).unwrap());
        let vault = Arc::new(PassphraseVault::new("test-secret").unwrap());
        let time = Arc::new(AtomicU64::new(0));
        let clock_time = time.clone();
        let service = IntakeService::new(
            store.clone(),
            Arc::new(ScriptedClient::new()),
            vault,
            &PipelineConfig::default(),
        )
        .with_clock(Arc::new(move || clock_time.load(Ordering::SeqCst)));
        let service = Arc::new(service);

        service
            .upsert_country(&CountryPolicy {
                code: "1999".into(),
                name: "Testland".into(),
                max_capacity: 1,
                used_capacity: 0,
                reward_amount: 10,
                wait_minutes: 60,
                active: true,
            })
            .unwrap();
        let view = service.submit_phone("+19995550001", "u1").await.unwrap();
        service.submit_code("u1", &view.id, VALID_CODE).await.unwrap();
        time.store(61 * MINUTE_MS, Ordering::SeqCst);

        let sweeper = Sweeper::new(service.clone(), Duration::from_secs(300));
        let handle = tokio::spawn(sweeper.start());

        // The first tick fires immediately.
        let mut status = AccountStatus::PendingReview;
        for _ in 0..100 {
            status = store.get(&view.id).unwrap().unwrap().status;
            if status.is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        handle.abort();

        assert_eq!(status, AccountStatus::Accepted);
        assert_eq!(service.balance("u1").unwrap(), 10);
    }
}
