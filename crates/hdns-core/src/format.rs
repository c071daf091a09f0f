//! Human-readable formatting of sizes, rates and timestamps

use chrono::{DateTime, SecondsFormat, Timelike, Utc};

const BYTE_UNITS: [&str; 9] = ["Bytes", "KB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];
const BYTE_RATE_UNITS: [&str; 9] = ["Bps", "KBps", "MBps", "GBps", "TBps", "PBps", "EBps", "ZBps", "YBps"];
const BIT_UNITS: [&str; 9] = ["bits", "Kb", "Mb", "Gb", "Tb", "Pb", "Eb", "Zb", "Yb"];
const BIT_RATE_UNITS: [&str; 9] = ["bps", "Kbps", "Mbps", "Gbps", "Tbps", "Pbps", "Ebps", "Zbps", "Ybps"];

/// Size in bytes, base 1024 (`1536 → "1.5 KB"`)
pub fn format_bytes(bytes: f64, decimals: usize) -> String {
    scaled(bytes, 1024.0, decimals, &BYTE_UNITS)
}

pub fn format_bytes_per_second(bytes: f64, decimals: usize) -> String {
    scaled(bytes, 1024.0, decimals, &BYTE_RATE_UNITS)
}

/// Size in bits, base 1000
pub fn format_bits(bits: f64, decimals: usize) -> String {
    scaled(bits, 1000.0, decimals, &BIT_UNITS)
}

pub fn format_bits_per_second(bits: f64, decimals: usize) -> String {
    scaled(bits, 1000.0, decimals, &BIT_RATE_UNITS)
}

fn scaled(value: f64, base: f64, decimals: usize, units: &[&str; 9]) -> String {
    if value == 0.0 || !value.is_finite() {
        return format!("0 {}", units[0]);
    }

    let mut scaled = value;
    let mut exponent = 0;
    while scaled.abs() >= base && exponent < units.len() - 1 {
        scaled /= base;
        exponent += 1;
    }
    let rounded = format!("{:.*}", decimals, scaled);
    format!("{} {}", trim_zeros(&rounded), units[exponent])
}

fn trim_zeros(number: &str) -> &str {
    if !number.contains('.') {
        return number;
    }
    number.trim_end_matches('0').trim_end_matches('.')
}

/// Unix seconds as an RFC 3339 timestamp with milliseconds, in UTC
pub fn format_unixtime(seconds: i64) -> Option<String> {
    DateTime::<Utc>::from_timestamp(seconds, 0).map(|t| t.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// `HH:MM:SS` of the UTC time of day for `seconds`
pub fn format_uptime(seconds: i64) -> Option<String> {
    let time = DateTime::<Utc>::from_timestamp(seconds, 0)?;
    Some(format!(
        "{:02}:{:02}:{:02}",
        time.hour(),
        time.minute(),
        time.second()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_use_binary_units() {
        assert_eq!(format_bytes(0.0, 2), "0 Bytes");
        assert_eq!(format_bytes(1536.0, 2), "1.5 KB");
        assert_eq!(format_bytes(1024.0 * 1024.0, 2), "1 MB");
        assert_eq!(format_bytes(512.0, 2), "512 Bytes");
        assert_eq!(format_bytes_per_second(2048.0, 0), "2 KBps");
    }

    #[test]
    fn bits_use_decimal_units() {
        assert_eq!(format_bits(0.0, 2), "0 bits");
        assert_eq!(format_bits(1500.0, 2), "1.5 Kb");
        assert_eq!(format_bits_per_second(12_345_678.0, 1), "12.3 Mbps");
    }

    #[test]
    fn timestamps_are_utc() {
        assert_eq!(format_unixtime(0).as_deref(), Some("1970-01-01T00:00:00.000Z"));
        assert_eq!(format_uptime(3_725).as_deref(), Some("01:02:05"));
        assert_eq!(format_uptime(86_400 + 59).as_deref(), Some("00:00:59"));
    }
}
