//! Best-effort extraction of readings from free-form OLT CLI output.

use regex_lite::Regex;

use crate::models::{onu_status, OnuStatus};
use crate::utils;

/// System readings scraped from a status command
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SystemReadings {
    pub cpu_usage: Option<f64>,
    pub memory_usage: Option<f64>,
    pub temperature: Option<f64>,
    pub uptime: Option<String>,
}

fn capture(pattern: &str, text: &str) -> Option<String> {
    let re = Regex::new(pattern).ok()?;
    let caps = re.captures(text)?;
    Some(caps.get(1)?.as_str().trim().to_string())
}

fn capture_f64(pattern: &str, text: &str) -> Option<f64> {
    capture(pattern, text)?.parse().ok()
}

pub fn parse_system_status(text: &str) -> SystemReadings {
    SystemReadings {
        cpu_usage: capture_f64(r"(?i)cpu[^\d\n]*?(\d+(?:\.\d+)?)\s*%", text),
        memory_usage: capture_f64(r"(?i)mem(?:ory)?[^\d\n]*?(\d+(?:\.\d+)?)\s*%", text),
        temperature: capture_f64(r"(?i)temp(?:erature)?[^\d\n-]*?(-?\d+(?:\.\d+)?)", text),
        uptime: capture(r"(?im)(?:up\s*time|uptime)\s*(?:is|:|=)?\s*(.+?)\s*$", text)
            .filter(|s| !s.is_empty()),
    }
}

/// Live ONU values from a vendor detail command. Missing fields stay None.
pub fn parse_onu_detail(text: &str) -> OnuStatus {
    let status = capture(
        r"(?im)^\s*(?:phase\s*state|run\s*state|onu\s*state|state|status)\s*(?:\([^)]*\))?\s*[:=]?\s*([A-Za-z]+)",
        text,
    )
    .map(|word| match word.to_ascii_lowercase().as_str() {
        "online" | "working" | "up" | "active" => onu_status::ONLINE.to_string(),
        _ => onu_status::OFFLINE.to_string(),
    });

    OnuStatus {
        status,
        signal_rx: capture_f64(r"(?i)rx\s*(?:optical\s*)?power[^\n\d-]*(-?\d+(?:\.\d+)?)", text),
        signal_tx: capture_f64(r"(?i)tx\s*(?:optical\s*)?power[^\n\d-]*(-?\d+(?:\.\d+)?)", text),
        distance: capture(r"(?i)distance[^\n\d]*(\d+)", text).and_then(|d| d.parse().ok()),
        uptime: capture(r"(?im)(?:online\s*duration|up\s*time|uptime)\s*[:=]?\s*(.+?)\s*$", text)
            .filter(|s| !s.is_empty()),
        last_update: None,
    }
}

/// Seconds from "1w2d3h4m5s", "5 days, 3 hours, 2 minutes" or "12:03:04" forms
pub fn parse_uptime_text(text: &str) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }

    if let Some(seconds) = utils::parse_mikrotik_uptime(text) {
        if !text.contains(char::is_whitespace) {
            return Some(seconds);
        }
    }

    let re = Regex::new(r"(?i)(\d+)\s*(weeks?|days?|hours?|minutes?|mins?|seconds?|secs?)\b").ok()?;
    let mut total = 0i64;
    let mut matched = false;
    for caps in re.captures_iter(text) {
        let value: i64 = caps.get(1)?.as_str().parse().ok()?;
        let unit = caps.get(2)?.as_str().to_ascii_lowercase();
        let multiplier = match unit.chars().next() {
            Some('w') => 604_800,
            Some('d') => 86_400,
            Some('h') => 3_600,
            Some('m') => 60,
            _ => 1,
        };
        total += value * multiplier;
        matched = true;
    }

    if let Some(clock) = capture(r"(\d+:\d{2}:\d{2})", text) {
        let parts: Vec<i64> = clock.split(':').filter_map(|p| p.parse().ok()).collect();
        if let [h, m, s] = parts.as_slice() {
            total += h * 3_600 + m * 60 + s;
            matched = true;
        }
    }

    matched.then_some(total)
}

/// sysUpTime ticks (hundredths of a second) as display text
pub fn format_ticks(ticks: u32) -> String {
    let secs = ticks as u64 / 100;
    format!(
        "{} days, {:02}:{:02}:{:02}",
        secs / 86_400,
        (secs % 86_400) / 3_600,
        (secs % 3_600) / 60,
        secs % 60
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_system_status() {
        let text = "System uptime is 3 days, 4 hours, 5 minutes\n\
                    CPU usage: 23%\n\
                    Memory usage: 41.5%\n\
                    Temperature: 47 C\n";
        let readings = parse_system_status(text);
        assert_eq!(readings.cpu_usage, Some(23.0));
        assert_eq!(readings.memory_usage, Some(41.5));
        assert_eq!(readings.temperature, Some(47.0));
        assert_eq!(readings.uptime.as_deref(), Some("3 days, 4 hours, 5 minutes"));
    }

    #[test]
    fn test_parse_system_status_garbage() {
        assert_eq!(parse_system_status("% Unknown command."), SystemReadings::default());
    }

    #[test]
    fn test_parse_huawei_onu_detail() {
        let text = "  Run state               : online\n\
                    \x20 ONT distance(m)         : 1234\n\
                    \x20 Rx optical power(dBm)   : -21.50\n\
                    \x20 Tx optical power(dBm)   : 2.31\n\
                    \x20 ONT online duration     : 2 day(s), 3 hour(s)\n";
        let status = parse_onu_detail(text);
        assert_eq!(status.status.as_deref(), Some("online"));
        assert_eq!(status.distance, Some(1234));
        assert_eq!(status.signal_rx, Some(-21.5));
        assert_eq!(status.signal_tx, Some(2.31));
        assert_eq!(status.uptime.as_deref(), Some("2 day(s), 3 hour(s)"));
    }

    #[test]
    fn test_parse_zte_onu_detail_los() {
        let status = parse_onu_detail("Phase state: LOS\nRx power: -28.1(dbm)\n");
        assert_eq!(status.status.as_deref(), Some("offline"));
        assert_eq!(status.signal_rx, Some(-28.1));
        assert_eq!(status.signal_tx, None);
        assert_eq!(status.distance, None);
    }

    #[test]
    fn test_parse_uptime_text() {
        assert_eq!(parse_uptime_text("1w2d3h4m5s"), Some(788_645));
        assert_eq!(parse_uptime_text("3 days, 4 hours, 5 minutes"), Some(3 * 86_400 + 4 * 3_600 + 300));
        assert_eq!(parse_uptime_text("2 days, 01:00:30"), Some(2 * 86_400 + 3_630));
        assert_eq!(parse_uptime_text("unknown"), None);
        assert_eq!(parse_uptime_text(""), None);
    }

    #[test]
    fn test_format_ticks() {
        assert_eq!(format_ticks(8_640_000 + 366_100), "1 days, 01:01:01");
    }
}
