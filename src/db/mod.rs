//! Persistence gateway for the panel database.
//!
//! CRUD-shaped operations over a SQLx `Any` pool: node metadata, the
//! authoritative user list, append-only accounting rows, and one bulk
//! conditional update that advances cumulative per-user totals.
//!
//! Supports PostgreSQL, MySQL, and SQLite through SQLx.

mod queries;

use std::collections::BTreeMap;
use std::time::Duration;

use sqlx::any::{AnyPoolOptions, AnyRow};
use sqlx::{AnyPool, Row};

use crate::config::DatabaseConfig;
use crate::error::AgentError;
use crate::model::{Node, NodeHeartbeat, NodeOnlineSnapshot, TrafficDelta, TrafficLogEntry, UserRecord};

/// Database type enum for query selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DatabaseType {
    /// PostgreSQL database.
    PostgreSQL,
    /// MySQL/MariaDB database.
    MySQL,
    /// SQLite database.
    SQLite,
}

impl DatabaseType {
    /// Detect database type from URL.
    pub fn from_url(url: &str) -> Option<Self> {
        if url.starts_with("postgres://") || url.starts_with("postgresql://") {
            Some(Self::PostgreSQL)
        } else if url.starts_with("mysql://") || url.starts_with("mariadb://") {
            Some(Self::MySQL)
        } else if url.starts_with("sqlite:") {
            Some(Self::SQLite)
        } else {
            None
        }
    }
}

/// Panel database gateway.
pub struct Database {
    pool: AnyPool,
    db_type: DatabaseType,
}

impl Database {
    /// Connect to the panel database.
    pub async fn connect(config: &DatabaseConfig) -> Result<Self, AgentError> {
        // Install database drivers for the "any" pool
        sqlx::any::install_default_drivers();

        let db_type = DatabaseType::from_url(&config.url)
            .ok_or_else(|| AgentError::Config("unsupported database URL scheme".to_string()))?;

        let pool = AnyPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await?;

        Ok(Self { pool, db_type })
    }

    /// Verify the database connection is live.
    pub async fn ping(&self) -> Result<(), sqlx::Error> {
        sqlx::query(queries::PING).execute(&self.pool).await?;
        Ok(())
    }

    /// Fetch metadata for a node.
    pub async fn get_node(&self, node_id: i64) -> Result<Node, AgentError> {
        let query = match self.db_type {
            DatabaseType::PostgreSQL => queries::GET_NODE_PG,
            DatabaseType::MySQL | DatabaseType::SQLite => queries::GET_NODE_MYSQL,
        };

        let row = sqlx::query(query)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or(AgentError::NodeNotFound(node_id))?;

        Ok(Node {
            id: row.try_get("id").map_err(sqlx::Error::from)?,
            traffic_rate: row.try_get("traffic_rate").map_err(sqlx::Error::from)?,
        })
    }

    /// Fetch the authoritative user list for a node.
    pub async fn get_all_users(&self, node_id: i64) -> Result<Vec<UserRecord>, sqlx::Error> {
        let query = match self.db_type {
            DatabaseType::PostgreSQL => queries::GET_USERS_PG,
            DatabaseType::MySQL | DatabaseType::SQLite => queries::GET_USERS_MYSQL,
        };

        let rows = sqlx::query(query).bind(node_id).fetch_all(&self.pool).await?;
        rows.into_iter().map(Self::parse_user_row).collect()
    }

    /// Insert a heartbeat row.
    pub async fn create_heartbeat(&self, heartbeat: &NodeHeartbeat) -> Result<(), sqlx::Error> {
        let query = match self.db_type {
            DatabaseType::PostgreSQL => queries::INSERT_HEARTBEAT_PG,
            DatabaseType::MySQL | DatabaseType::SQLite => queries::INSERT_HEARTBEAT_MYSQL,
        };

        sqlx::query(query)
            .bind(heartbeat.node_id)
            .bind(heartbeat.uptime_secs as i64)
            .bind(&heartbeat.load_avg)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert an online-users snapshot row.
    pub async fn create_online_snapshot(
        &self,
        snapshot: &NodeOnlineSnapshot,
    ) -> Result<(), sqlx::Error> {
        let query = match self.db_type {
            DatabaseType::PostgreSQL => queries::INSERT_ONLINE_PG,
            DatabaseType::MySQL | DatabaseType::SQLite => queries::INSERT_ONLINE_MYSQL,
        };

        sqlx::query(query)
            .bind(snapshot.node_id)
            .bind(i64::from(snapshot.online_users))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Insert one per-user traffic log row.
    pub async fn create_traffic_log(&self, entry: &TrafficLogEntry) -> Result<(), sqlx::Error> {
        let query = match self.db_type {
            DatabaseType::PostgreSQL => queries::INSERT_TRAFFIC_LOG_PG,
            DatabaseType::MySQL | DatabaseType::SQLite => queries::INSERT_TRAFFIC_LOG_MYSQL,
        };

        sqlx::query(query)
            .bind(entry.user_id)
            .bind(entry.node_id)
            .bind(entry.uplink as i64)
            .bind(entry.downlink as i64)
            .bind(entry.rate)
            .bind(&entry.traffic)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Advance cumulative per-user totals in a single conditional update.
    ///
    /// Builds one `UPDATE … SET x = x + CASE id WHEN …` statement keyed by
    /// user id, so the write cost stays flat regardless of how many users
    /// had traffic this cycle. No-op when the delta map is empty.
    pub async fn bulk_advance_totals(
        &self,
        deltas: &BTreeMap<i64, TrafficDelta>,
        now: i64,
    ) -> Result<(), sqlx::Error> {
        if deltas.is_empty() {
            return Ok(());
        }

        let db_type = self.db_type;
        let mut n = 0usize;
        let mut placeholder = move || {
            n += 1;
            match db_type {
                DatabaseType::PostgreSQL => format!("${n}"),
                DatabaseType::MySQL | DatabaseType::SQLite => "?".to_string(),
            }
        };

        let mut sql = String::from("UPDATE users SET uplink_used = uplink_used + CASE id");
        for _ in deltas {
            sql.push_str(&format!(" WHEN {} THEN {}", placeholder(), placeholder()));
        }
        sql.push_str(" ELSE 0 END, downlink_used = downlink_used + CASE id");
        for _ in deltas {
            sql.push_str(&format!(" WHEN {} THEN {}", placeholder(), placeholder()));
        }
        sql.push_str(&format!(" ELSE 0 END, totals_updated_at = {}", placeholder()));
        let id_list = deltas
            .keys()
            .map(|_| placeholder())
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" WHERE id IN ({id_list})"));

        let mut query = sqlx::query(&sql);
        for (user_id, delta) in deltas {
            query = query.bind(*user_id).bind(delta.uplink as i64);
        }
        for (user_id, delta) in deltas {
            query = query.bind(*user_id).bind(delta.downlink as i64);
        }
        query = query.bind(now);
        for user_id in deltas.keys() {
            query = query.bind(*user_id);
        }

        query.execute(&self.pool).await?;
        Ok(())
    }

    /// Get database type.
    pub fn database_type(&self) -> DatabaseType {
        self.db_type
    }

    /// Get the connection pool (for advanced usage).
    pub fn pool(&self) -> &AnyPool {
        &self.pool
    }

    /// Parse a user row from AnyRow.
    fn parse_user_row(row: AnyRow) -> Result<UserRecord, sqlx::Error> {
        // SQLite reports integers as i64, MySQL as i32; try both for port
        let port = row
            .try_get::<i32, _>("port")
            .or_else(|_| row.try_get::<i64, _>("port").map(|v| v as i32))?;

        Ok(UserRecord {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            credential: row.try_get("credential")?,
            port,
        })
    }
}

// Debug implementation (don't leak the connection URL)
impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("db_type", &self.db_type)
            .finish_non_exhaustive()
    }
}
