use std::{sync::Arc, time::Duration};

use {
    tokio::time::MissedTickBehavior,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

use crate::{supervisor::TaskSupervisor, sync::SyncEngine};

pub const POLL_TASK: &str = "poll-loop";

/// Spawn the long-lived polling task for one login under `supervisor`.
///
/// The first cycle runs immediately; later cycles follow `interval`.
pub fn spawn_polling(
    engine: Arc<SyncEngine>,
    interval: Duration,
    cancel: CancellationToken,
    supervisor: &TaskSupervisor,
) {
    let login_id = engine.login_id().to_string();
    supervisor.spawn(&login_id, POLL_TASK, async move {
        run_polling(engine, interval, cancel).await;
        Ok(())
    });
}

/// Poll until `cancel` fires. A cycle already in flight finishes first;
/// its HTTP calls are bounded by the client timeout.
pub async fn run_polling(engine: Arc<SyncEngine>, interval: Duration, cancel: CancellationToken) {
    let login_id = engine.login_id().to_string();
    info!(login_id, interval_secs = interval.as_secs(), "starting hostex polling loop");

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!(login_id, "hostex polling stopped");
                break;
            }
            _ = ticker.tick() => {
                match engine.poll_once().await {
                    Ok(report) => debug!(login_id, ?report, "poll cycle finished"),
                    Err(e) => warn!(
                        login_id,
                        error = %e,
                        transient = e.is_transient(),
                        "hostex poll failed, retrying next interval"
                    ),
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use {
        super::*,
        crate::{client::HostexClient, echo::EchoCache, state::SyncState},
        chrono::TimeDelta,
        hostex_portal::MemorySink,
        mockito::Matcher,
        secrecy::Secret,
        serde_json::json,
    };

    #[tokio::test]
    async fn polls_immediately_and_stops_on_cancel() {
        let mut server = mockito::Server::new_async().await;
        let list = server
            .mock("GET", "/conversations")
            .match_query(Matcher::Any)
            .with_status(200)
            .with_body(json!({"error_code": 200, "data": {"conversations": []}}).to_string())
            .expect_at_least(1)
            .create_async()
            .await;

        let client = HostexClient::new(
            Secret::new("tok".into()),
            &server.url(),
            Duration::from_secs(5),
        )
        .unwrap();
        let engine = Arc::new(SyncEngine::new(
            "hostex_test",
            Arc::new(client),
            Arc::new(MemorySink::new()),
            Arc::new(EchoCache::default()),
            Arc::new(SyncState::new(TimeDelta::days(7))),
            10,
        ));

        let supervisor = TaskSupervisor::default();
        let cancel = CancellationToken::new();
        spawn_polling(engine, Duration::from_secs(3600), cancel.clone(), &supervisor);

        for _ in 0..100 {
            if list.matched_async().await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        cancel.cancel();

        assert!(supervisor.shutdown(Duration::from_secs(5)).await);
        assert!(supervisor.failures().is_empty());
        list.assert_async().await;
    }
}
