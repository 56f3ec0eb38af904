//! SQL query text for the panel schema, per database family.

/// Connectivity check.
pub const PING: &str = "SELECT 1";

/// Fetch node metadata (PostgreSQL).
pub const GET_NODE_PG: &str = r#"
SELECT id, traffic_rate
FROM nodes
WHERE id = $1
"#;

/// Fetch node metadata (MySQL/SQLite).
pub const GET_NODE_MYSQL: &str = r#"
SELECT id, traffic_rate
FROM nodes
WHERE id = ?
"#;

/// Fetch the authoritative user list for a node (PostgreSQL).
pub const GET_USERS_PG: &str = r#"
SELECT id, email, credential, port
FROM users
WHERE node_id = $1 AND enabled = TRUE
ORDER BY id
"#;

/// Fetch the authoritative user list for a node (MySQL/SQLite).
pub const GET_USERS_MYSQL: &str = r#"
SELECT id, email, credential, port
FROM users
WHERE node_id = ? AND enabled = 1
ORDER BY id
"#;

/// Insert a heartbeat row (PostgreSQL).
pub const INSERT_HEARTBEAT_PG: &str = r#"
INSERT INTO node_heartbeats (node_id, uptime_secs, load_avg)
VALUES ($1, $2, $3)
"#;

/// Insert a heartbeat row (MySQL/SQLite).
pub const INSERT_HEARTBEAT_MYSQL: &str = r#"
INSERT INTO node_heartbeats (node_id, uptime_secs, load_avg)
VALUES (?, ?, ?)
"#;

/// Insert an online-users snapshot row (PostgreSQL).
pub const INSERT_ONLINE_PG: &str = r#"
INSERT INTO node_online_logs (node_id, online_users)
VALUES ($1, $2)
"#;

/// Insert an online-users snapshot row (MySQL/SQLite).
pub const INSERT_ONLINE_MYSQL: &str = r#"
INSERT INTO node_online_logs (node_id, online_users)
VALUES (?, ?)
"#;

/// Insert a per-user traffic log row (PostgreSQL).
pub const INSERT_TRAFFIC_LOG_PG: &str = r#"
INSERT INTO user_traffic_logs (user_id, node_id, uplink, downlink, rate, traffic)
VALUES ($1, $2, $3, $4, $5, $6)
"#;

/// Insert a per-user traffic log row (MySQL/SQLite).
pub const INSERT_TRAFFIC_LOG_MYSQL: &str = r#"
INSERT INTO user_traffic_logs (user_id, node_id, uplink, downlink, rate, traffic)
VALUES (?, ?, ?, ?, ?, ?)
"#;
