//! Small helpers shared across the agent.

use std::time::{SystemTime, UNIX_EPOCH};

/// Format a byte count as a short human-readable size ("4.3K", "1G",
/// "500B"). One decimal place, trailing ".0" stripped.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [(u64, &str); 5] = [
        (1 << 50, "P"),
        (1 << 40, "T"),
        (1 << 30, "G"),
        (1 << 20, "M"),
        (1 << 10, "K"),
    ];

    for (factor, suffix) in UNITS {
        if bytes >= factor {
            #[expect(clippy::cast_precision_loss)]
            let value = bytes as f64 / factor as f64;
            let mut s = format!("{value:.1}");
            if s.ends_with(".0") {
                s.truncate(s.len() - 2);
            }
            return format!("{s}{suffix}");
        }
    }
    format!("{bytes}B")
}

/// Current system load averages formatted as "L1 L5 L15".
///
/// Platforms without load averages report "0.00 0.00 0.00".
pub fn system_load() -> String {
    let avg = sysinfo::System::load_average();
    format!("{:.2} {:.2} {:.2}", avg.one, avg.five, avg.fifteen)
}

/// Current unix timestamp in seconds.
pub fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
