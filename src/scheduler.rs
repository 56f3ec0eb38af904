//! Fixed-interval cycle scheduler.
//!
//! Runs one cycle immediately at startup, then one per tick, forever.
//! The cycle body is awaited inside the loop, so cycles can never
//! overlap — a long cycle simply delays the next tick.

use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::cycle::CycleRunner;
use crate::error::AgentError;
use crate::proxy::{HandlerApi, StatsApi};

/// Drive the runner until shutdown, or until a fatal error.
///
/// Ordinary cycle errors are logged and the loop keeps ticking; only a
/// fatal provisioning error is returned to the caller, which treats it
/// as a deliberate process halt.
pub async fn run<H: HandlerApi, S: StatsApi>(
    mut runner: CycleRunner<H, S>,
    interval: Duration,
    shutdown: CancellationToken,
) -> Result<(), AgentError> {
    let mut ticker = tokio::time::interval(interval);
    // First tick fires immediately; a cycle that overruns its slot delays
    // the following tick instead of bursting to catch up.
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;

            _ = shutdown.cancelled() => {
                debug!("scheduler shutting down");
                return Ok(());
            }

            _ = ticker.tick() => {
                if let Err(e) = runner.run_cycle().await {
                    if e.is_fatal() {
                        error!(error = %e, "halting on unrecoverable provisioning failure");
                        return Err(e);
                    }
                    error!(error = %e, "cycle aborted");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgentConfig, DatabaseConfig};
    use crate::db::Database;
    use crate::proxy::MemoryProxy;

    async fn setup_runner(
        tolerate: bool,
    ) -> (CycleRunner<MemoryProxy, MemoryProxy>, MemoryProxy) {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 30,
        };
        let db = Database::connect(&config).await.unwrap();

        sqlx::raw_sql(
            r#"
            CREATE TABLE nodes (id INTEGER PRIMARY KEY, traffic_rate REAL NOT NULL DEFAULT 1.0);
            CREATE TABLE users (
                id INTEGER PRIMARY KEY,
                node_id INTEGER NOT NULL,
                email TEXT NOT NULL UNIQUE,
                credential TEXT NOT NULL,
                port INTEGER NOT NULL,
                enabled INTEGER NOT NULL DEFAULT 1,
                uplink_used INTEGER NOT NULL DEFAULT 0,
                downlink_used INTEGER NOT NULL DEFAULT 0,
                totals_updated_at INTEGER NOT NULL DEFAULT 0
            );
            CREATE TABLE node_heartbeats (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL,
                uptime_secs INTEGER NOT NULL,
                load_avg TEXT NOT NULL
            );
            CREATE TABLE node_online_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                node_id INTEGER NOT NULL,
                online_users INTEGER NOT NULL
            );
            CREATE TABLE user_traffic_logs (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                node_id INTEGER NOT NULL,
                uplink INTEGER NOT NULL,
                downlink INTEGER NOT NULL,
                rate REAL NOT NULL,
                traffic TEXT NOT NULL
            );
            INSERT INTO nodes (id, traffic_rate) VALUES (3, 1.0);
            INSERT INTO users (id, node_id, email, credential, port)
                VALUES (1, 3, 'a@x', 'cred-1', 10001);
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        let node = db.get_node(3).await.unwrap();
        let engine = MemoryProxy::new();

        let toml_str = format!(
            r#"
node_id = 3
tolerate_invalid_credentials = {tolerate}

[database]
url = "sqlite::memory:"

[proxy]
api_url = "http://127.0.0.1:10085"
"#
        );
        let agent_config: AgentConfig = toml::from_str(&toml_str).unwrap();

        let runner = CycleRunner::new(db, engine.clone(), engine.clone(), node, &agent_config);
        (runner, engine)
    }

    #[tokio::test]
    async fn shutdown_stops_the_loop() {
        let (runner, engine) = setup_runner(false).await;
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run(runner, Duration::from_secs(3600), shutdown.clone()));

        // Give the immediate first cycle time to finish, then stop.
        tokio::time::sleep(Duration::from_millis(200)).await;
        shutdown.cancel();

        handle.await.unwrap().unwrap();
        // Exactly the first, immediate cycle ran.
        assert_eq!(engine.user_count(), 1);
        assert_eq!(engine.call_count(), 1);
    }

    #[tokio::test]
    async fn fatal_provisioning_error_halts_the_loop() {
        let (runner, engine) = setup_runner(false).await;
        engine.fail_add("a@x");
        let shutdown = CancellationToken::new();

        let err = run(runner, Duration::from_secs(3600), shutdown)
            .await
            .unwrap_err();
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn tolerated_add_failures_keep_the_loop_running() {
        let (runner, engine) = setup_runner(true).await;
        engine.fail_add("a@x");
        let shutdown = CancellationToken::new();

        let handle = tokio::spawn(run(runner, Duration::from_millis(50), shutdown.clone()));

        // Let a few cycles run; every one retries the failing add.
        tokio::time::sleep(Duration::from_millis(220)).await;
        shutdown.cancel();
        handle.await.unwrap().unwrap();

        assert!(engine.call_count() >= 2);
    }
}
