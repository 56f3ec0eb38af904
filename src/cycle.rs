//! Cycle controller.
//!
//! Orchestrates one full cycle: connectivity check → heartbeat →
//! traffic collection → accounting writes → user reconciliation. Owns
//! the provisioned-user cache and the database retry counter; both are
//! only ever touched by the single active cycle.

use std::time::Instant;

use tracing::{debug, warn};

use crate::collector;
use crate::config::{AccountSettings, AgentConfig};
use crate::db::Database;
use crate::error::AgentError;
use crate::model::{Node, NodeHeartbeat, NodeOnlineSnapshot, Protocol, UserRecord};
use crate::proxy::{HandlerApi, StatsApi};
use crate::reconciler;
use crate::util::{format_bytes, system_load, unix_now};

/// Runs cycles against one node.
pub struct CycleRunner<H, S> {
    db: Database,
    handler: H,
    stats: S,
    node: Node,
    protocol: Protocol,
    account: AccountSettings,
    tolerate_invalid_credentials: bool,
    /// Best-effort mirror of the authoritative user set as of the last
    /// successfully completed cycle. Starts empty — the first cycle
    /// re-adds every authoritative user.
    provisioned: Vec<UserRecord>,
    /// Consecutive failed connectivity checks.
    db_retries: u64,
    started_at: Instant,
}

impl<H: HandlerApi, S: StatsApi> CycleRunner<H, S> {
    /// Create a runner for the given node.
    pub fn new(db: Database, handler: H, stats: S, node: Node, config: &AgentConfig) -> Self {
        Self {
            db,
            handler,
            stats,
            node,
            protocol: config.inbound.protocol,
            account: config.account.clone(),
            tolerate_invalid_credentials: config.tolerate_invalid_credentials,
            provisioned: Vec::new(),
            db_retries: 0,
            started_at: Instant::now(),
        }
    }

    /// Run one cycle.
    ///
    /// A failed connectivity check is a soft skip, not an error: the
    /// retry counter is bumped and `Ok(())` is returned so the scheduler
    /// keeps ticking. Any later failure aborts the remainder of the
    /// cycle; already-written traffic log rows are not rolled back.
    pub async fn run_cycle(&mut self) -> Result<(), AgentError> {
        if let Err(e) = self.db.ping().await {
            self.db_retries += 1;
            debug!(retries = self.db_retries, error = %e, "lost database connection, skipping cycle");
            return Ok(());
        }
        self.db_retries = 0;

        self.db
            .create_heartbeat(&NodeHeartbeat {
                node_id: self.node.id,
                uptime_secs: self.started_at.elapsed().as_secs(),
                load_avg: system_load(),
            })
            .await?;

        let report = collector::collect(&self.stats, &self.provisioned, &self.node).await?;

        for entry in &report.entries {
            // Row loss here only affects the per-cycle audit trail; the
            // cumulative totals are advanced separately below.
            if let Err(e) = self.db.create_traffic_log(entry).await {
                warn!(user_id = entry.user_id, error = %e, "failed to write traffic log row");
            }
        }

        if report.online_users > 0 {
            self.db
                .create_online_snapshot(&NodeOnlineSnapshot {
                    node_id: self.node.id,
                    online_users: report.online_users,
                })
                .await?;
        }

        self.db.bulk_advance_totals(&report.billed, unix_now()).await?;

        let authoritative = self.db.get_all_users(self.node.id).await?;
        let outcome = reconciler::reconcile(
            &self.handler,
            authoritative,
            &mut self.provisioned,
            self.protocol,
            &self.account,
            self.tolerate_invalid_credentials,
        )
        .await?;

        debug!(
            added = outcome.added,
            removed = outcome.removed,
            uplink = %format_bytes(report.raw_uplink_total),
            downlink = %format_bytes(report.raw_downlink_total),
            online = report.online_users,
            "cycle complete"
        );
        Ok(())
    }

    /// Consecutive failed connectivity checks.
    pub fn db_retries(&self) -> u64 {
        self.db_retries
    }

    /// Current provisioned-user cache.
    pub fn provisioned(&self) -> &[UserRecord] {
        &self.provisioned
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::proxy::{Call, MemoryProxy};
    use sqlx::AnyPool;

    async fn setup_db() -> Database {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            max_connections: 1,
            min_connections: 1,
            connect_timeout_secs: 30,
        };
        let db = Database::connect(&config).await.unwrap();

        let schema = r#"
            CREATE TABLE nodes (
                id INTEGER PRIMARY KEY,
                traffic_rate REAL NOT NULL DEFAULT 1.0
            );
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
        "#;
        sqlx::raw_sql(schema).execute(db.pool()).await.unwrap();

        sqlx::query("INSERT INTO nodes (id, traffic_rate) VALUES (3, 2.0)")
            .execute(db.pool())
            .await
            .unwrap();

        db
    }

    async fn insert_user(pool: &AnyPool, id: i64, email: &str) {
        sqlx::query(
            "INSERT INTO users (id, node_id, email, credential, port) VALUES (?, 3, ?, ?, ?)",
        )
        .bind(id)
        .bind(email)
        .bind(format!("cred-{id}"))
        .bind(10000 + id)
        .execute(pool)
        .await
        .unwrap();
    }

    fn test_config() -> AgentConfig {
        toml::from_str(
            r#"
node_id = 3

[database]
url = "sqlite::memory:"

[proxy]
api_url = "http://127.0.0.1:10085"
"#,
        )
        .unwrap()
    }

    async fn setup_runner() -> (CycleRunner<MemoryProxy, MemoryProxy>, MemoryProxy, AnyPool) {
        let db = setup_db().await;
        let node = db.get_node(3).await.unwrap();
        let engine = MemoryProxy::new();

        // Keep a handle on the single-connection pool so tests can poke
        // at the same in-memory database the runner uses.
        let pool = db.pool().clone();

        let runner = CycleRunner::new(db, engine.clone(), engine.clone(), node, &test_config());
        (runner, engine, pool)
    }

    async fn count(pool: &AnyPool, table: &str) -> i64 {
        let (n,): (i64,) = sqlx::query_as(&format!("SELECT COUNT(*) FROM {table}"))
            .fetch_one(pool)
            .await
            .unwrap();
        n
    }

    #[tokio::test]
    async fn first_cycle_provisions_all_authoritative_users() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;
        insert_user(&pool, 2, "b@x").await;

        runner.run_cycle().await.unwrap();

        assert_eq!(runner.provisioned().len(), 2);
        assert_eq!(engine.user_count(), 2);
        assert_eq!(count(&pool, "node_heartbeats").await, 1);
        // No user had traffic yet.
        assert_eq!(count(&pool, "user_traffic_logs").await, 0);
        assert_eq!(count(&pool, "node_online_logs").await, 0);
    }

    #[tokio::test]
    async fn cycle_accounts_traffic_and_advances_totals() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;

        // First cycle provisions the user.
        runner.run_cycle().await.unwrap();

        engine.set_traffic("a@x", 1500, 700);
        runner.run_cycle().await.unwrap();

        assert_eq!(count(&pool, "user_traffic_logs").await, 1);
        assert_eq!(count(&pool, "node_online_logs").await, 1);
        assert_eq!(count(&pool, "node_heartbeats").await, 2);

        // Rate 2.0: billed uplink 3000, downlink 1400.
        let (up, down): (i64, i64) =
            sqlx::query_as("SELECT uplink_used, downlink_used FROM users WHERE id = 1")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(up, 3000);
        assert_eq!(down, 1400);
    }

    #[tokio::test]
    async fn below_threshold_traffic_writes_log_but_no_online_snapshot() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;
        runner.run_cycle().await.unwrap();

        engine.set_traffic("a@x", 100, 50);
        runner.run_cycle().await.unwrap();

        assert_eq!(count(&pool, "user_traffic_logs").await, 1);
        assert_eq!(count(&pool, "node_online_logs").await, 0);
    }

    #[tokio::test]
    async fn failed_ping_skips_cycle_and_counts_retries() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;

        // Dropping the users table makes the ping succeed but everything
        // else fail, so break connectivity harder: close the pool.
        runner.db.pool().close().await;

        runner.run_cycle().await.unwrap();
        assert_eq!(runner.db_retries(), 1);

        runner.run_cycle().await.unwrap();
        assert_eq!(runner.db_retries(), 2);

        // Nothing reached the engine or the database.
        assert!(engine.calls().is_empty());
        assert_eq!(runner.provisioned().len(), 0);
        drop(pool);
    }

    #[tokio::test]
    async fn failed_stats_read_aborts_accounting_and_reconciliation() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;
        runner.run_cycle().await.unwrap();

        // New authoritative user appears, but the provisioned user's
        // stats read fails first.
        insert_user(&pool, 2, "b@x").await;
        engine.fail_stats("a@x");

        let err = runner.run_cycle().await.unwrap_err();
        assert!(!err.is_fatal());

        // Reconciliation never ran: the new user was not added.
        assert!(!engine.calls().contains(&Call::AddUser("b@x".to_string())));
        assert_eq!(runner.provisioned().len(), 1);

        // The heartbeat for the aborted cycle was still written.
        assert_eq!(count(&pool, "node_heartbeats").await, 2);
    }

    #[tokio::test]
    async fn removed_authoritative_user_is_deprovisioned() {
        let (mut runner, engine, pool) = setup_runner().await;
        insert_user(&pool, 1, "a@x").await;
        insert_user(&pool, 2, "b@x").await;
        runner.run_cycle().await.unwrap();

        sqlx::query("DELETE FROM users WHERE id = 2")
            .execute(&pool)
            .await
            .unwrap();
        runner.run_cycle().await.unwrap();

        assert_eq!(runner.provisioned().len(), 1);
        assert!(!engine.contains("b@x"));
    }
}
