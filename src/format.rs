//! Formatting helpers for human-readable byte sizes, rates and durations.

use std::time::Duration;

const KIB: u64 = 1024;
const MIB: u64 = KIB * 1024;
const GIB: u64 = MIB * 1024;

/// Formats a byte count as a human-readable string (B, KB, MB, GB).
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    if bytes >= GIB {
        format!("{:.2} GB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.2} MB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.2} KB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

/// Formats a transfer rate: MB/s above 1 MiB/s, KB/s otherwise.
#[allow(clippy::cast_precision_loss)]
#[must_use]
pub fn format_speed(bytes_per_sec: u64) -> String {
    if bytes_per_sec > MIB {
        format!("{:.2} MB/s", bytes_per_sec as f64 / MIB as f64)
    } else {
        format!("{:.2} KB/s", bytes_per_sec as f64 / KIB as f64)
    }
}

/// Estimates the remaining time in whole seconds, or `None` when the rate is zero.
#[must_use]
pub const fn eta_secs(total_wanted: u64, total_done: u64, rate: u64) -> Option<u64> {
    if rate == 0 {
        return None;
    }
    Some(total_wanted.saturating_sub(total_done) / rate)
}

/// Formats an ETA as `Ns`, `Mm Ss` or `Hh Mm`.
#[must_use]
pub fn format_eta(secs: u64) -> String {
    if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m", secs / 3600, (secs % 3600) / 60)
    }
}

/// Formats a duration as a human-readable string (e.g. "5.0s", "1m 05s", "1h 01m 05s").
#[must_use]
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!(
            "{}h {:02}m {:02}s",
            secs / 3600,
            (secs % 3600) / 60,
            secs % 60
        )
    } else if secs >= 60 {
        format!("{}m {:02}s", secs / 60, secs % 60)
    } else {
        format!("{}.{:01}s", secs, d.subsec_millis() / 100)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_bytes_units() {
        assert_eq!(format_bytes(500), "500 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(1_048_576), "1.00 MB");
        assert_eq!(format_bytes(1_073_741_824), "1.00 GB");
    }

    #[test]
    fn format_speed_switches_above_one_mib() {
        assert_eq!(format_speed(0), "0.00 KB/s");
        assert_eq!(format_speed(512), "0.50 KB/s");
        // Exactly 1 MiB/s is not above the threshold.
        assert_eq!(format_speed(1_048_576), "1024.00 KB/s");
        assert_eq!(format_speed(2 * 1_048_576), "2.00 MB/s");
    }

    #[test]
    fn eta_from_remaining_bytes() {
        assert_eq!(eta_secs(1000, 500, 50), Some(10));
        assert_eq!(format_eta(eta_secs(1000, 500, 50).unwrap()), "10s");
    }

    #[test]
    fn eta_unknown_without_rate() {
        assert_eq!(eta_secs(1000, 500, 0), None);
    }

    #[test]
    fn eta_never_underflows() {
        assert_eq!(eta_secs(100, 500, 10), Some(0));
    }

    #[test]
    fn format_eta_ranges() {
        assert_eq!(format_eta(59), "59s");
        assert_eq!(format_eta(60), "1m 0s");
        assert_eq!(format_eta(125), "2m 5s");
        assert_eq!(format_eta(3600), "1h 0m");
        assert_eq!(format_eta(7325), "2h 2m");
    }

    #[test]
    fn format_duration_units() {
        assert_eq!(format_duration(Duration::from_secs(5)), "5.0s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 05s");
        assert_eq!(format_duration(Duration::from_secs(3665)), "1h 01m 05s");
        assert_eq!(format_duration(Duration::from_millis(500)), "0.5s");
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn format_bytes_never_panics(bytes in 0u64..u64::MAX) {
                let _ = format_bytes(bytes);
            }

            #[test]
            fn format_speed_never_panics(rate in 0u64..u64::MAX) {
                let _ = format_speed(rate);
            }

            #[test]
            fn eta_is_bounded_by_remaining(wanted in 0u64..1 << 40, done in 0u64..1 << 40, rate in 1u64..1 << 30) {
                let eta = eta_secs(wanted, done, rate).unwrap();
                prop_assert!(eta <= wanted.saturating_sub(done));
            }
        }
    }
}
