//! Traffic collection pipeline.
//!
//! Reads per-user traffic deltas from the engine, applies the node's
//! billing rate, and shapes the results for persistence: one log entry
//! per active user plus a billed-delta map for the bulk totals update.

use std::collections::BTreeMap;

use crate::model::{Node, TrafficDelta, TrafficLogEntry, UserRecord};
use crate::proxy::{ProxyError, StatsApi};
use crate::util::format_bytes;

/// Raw uplink+downlink above this many bytes counts a user as online this
/// cycle. A heuristic for "had any meaningful activity", not a true
/// connection probe.
pub const ONLINE_TRAFFIC_THRESHOLD: u64 = 2048;

/// Everything one cycle's traffic collection produced.
#[derive(Debug, Default)]
pub struct TrafficReport {
    /// One entry per user with nonzero raw traffic, in provisioning order.
    pub entries: Vec<TrafficLogEntry>,
    /// Billed per-user deltas for the bulk totals update.
    pub billed: BTreeMap<i64, TrafficDelta>,
    /// Users whose raw traffic exceeded the online threshold.
    pub online_users: u32,
    /// Raw uplink total across all users (for the cycle summary).
    pub raw_uplink_total: u64,
    /// Raw downlink total across all users (for the cycle summary).
    pub raw_downlink_total: u64,
}

/// Collect traffic deltas for every provisioned user.
///
/// Reads are sequential; the first failed read aborts the whole
/// collection and, transitively, the rest of the cycle's accounting.
pub async fn collect<S: StatsApi + ?Sized>(
    stats: &S,
    provisioned: &[UserRecord],
    node: &Node,
) -> Result<TrafficReport, ProxyError> {
    let mut report = TrafficReport::default();

    for user in provisioned {
        let uplink = stats.user_uplink(&user.email).await?;
        let downlink = stats.user_downlink(&user.email).await?;

        if uplink + downlink == 0 {
            continue;
        }

        let billed_uplink = bill(uplink, node.traffic_rate);
        let billed_downlink = bill(downlink, node.traffic_rate);

        if uplink + downlink > ONLINE_TRAFFIC_THRESHOLD {
            report.online_users += 1;
        }
        report.raw_uplink_total += uplink;
        report.raw_downlink_total += downlink;

        report.entries.push(TrafficLogEntry {
            user_id: user.id,
            node_id: node.id,
            uplink,
            downlink,
            rate: node.traffic_rate,
            traffic: format_bytes(billed_uplink + billed_downlink),
        });
        report.billed.insert(
            user.id,
            TrafficDelta {
                uplink: billed_uplink,
                downlink: billed_downlink,
            },
        );
    }

    Ok(report)
}

/// Apply the billing rate to a raw byte count, truncating to whole bytes.
#[inline]
#[expect(clippy::cast_precision_loss, clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn bill(raw: u64, rate: f64) -> u64 {
    (rate * raw as f64) as u64
}
