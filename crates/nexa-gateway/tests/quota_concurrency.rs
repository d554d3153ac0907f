use nexa_gateway::gateway::{GatewayError, SharedStore, Tenant, Tier, TierLimits};
use nexa_gateway::quota::QuotaEnforcer;
use nexa_gateway::store::InMemoryStore;
use std::sync::Arc;

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn simultaneous_requests_never_exceed_the_ceiling() {
    for _ in 0..20 {
        let store: Arc<dyn SharedStore> = Arc::new(InMemoryStore::new());
        let quota = Arc::new(QuotaEnforcer::new(store, TierLimits::default(), false));
        let tenant = Tenant::new("burst", Tier::Premium(3));

        let barrier = Arc::new(tokio::sync::Barrier::new(5));
        let handles: Vec<_> = (0..5)
            .map(|_| {
                let quota = quota.clone();
                let tenant = tenant.clone();
                let barrier = barrier.clone();
                tokio::spawn(async move {
                    barrier.wait().await;
                    quota.admit(&tenant).await
                })
            })
            .collect();

        let mut admitted = 0;
        let mut denied = 0;
        for h in futures::future::join_all(handles).await {
            match h.expect("join") {
                Ok(_) => admitted += 1,
                Err(GatewayError::QuotaExceeded { .. }) => denied += 1,
                Err(other) => panic!("unexpected error: {other}"),
            }
        }
        assert_eq!((admitted, denied), (3, 2));
    }
}
