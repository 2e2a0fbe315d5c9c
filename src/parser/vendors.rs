use regex_lite::Regex;

use super::{literal_status, OnuParser};
use crate::models::{onu_status, OnuRecord};

fn compile(pattern: &str) -> Option<Regex> {
    match Regex::new(pattern) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::error!("Invalid ONU line pattern {}: {}", pattern, e);
            None
        }
    }
}

/// Captures (port, id, serial, status) from a line, or None
fn capture4<'a>(re: &Option<Regex>, line: &'a str) -> Option<(&'a str, i64, &'a str, &'a str)> {
    let caps = re.as_ref()?.captures(line)?;
    let port = caps.get(1)?.as_str();
    let onu_id = caps.get(2)?.as_str().parse::<i64>().ok()?;
    let serial = caps.get(3)?.as_str();
    let status = caps.get(4)?.as_str();
    Some((port, onu_id, serial, status))
}

/// V-SOL: `gpon-onu_1/1:1  HWTC12345678  online  ...`
pub struct VsolParser {
    line: Option<Regex>,
}

impl VsolParser {
    pub fn new() -> Self {
        Self {
            line: compile(r"(?i)^\s*[eg]pon-onu_(\d+/\d+):(\d+)\s+(\S+)\s+(online|offline)\b"),
        }
    }
}

impl Default for VsolParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OnuParser for VsolParser {
    fn vendor(&self) -> &'static str {
        "VSOL"
    }

    fn parse_line(&self, line: &str) -> Option<OnuRecord> {
        let (port, id, serial, status) = capture4(&self.line, line)?;
        Some(OnuRecord::new(port, id, serial, literal_status(status)))
    }
}

/// Huawei `display ont info`: `0/1/1  1  HWTC12345678  [control flags]  online ...`.
/// Frame/slot/port may be padded ("0/ 1/1").
pub struct HuaweiParser {
    line: Option<Regex>,
}

impl HuaweiParser {
    pub fn new() -> Self {
        Self {
            line: compile(
                r"(?i)^\s*(\d+\s*/\s*\d+\s*/\s*\d+)\s+(\d+)\s+(\S+)\s+(?:\S+\s+)*?(online|offline)\b",
            ),
        }
    }
}

impl Default for HuaweiParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OnuParser for HuaweiParser {
    fn vendor(&self) -> &'static str {
        "Huawei"
    }

    fn parse_line(&self, line: &str) -> Option<OnuRecord> {
        let (port, id, serial, status) = capture4(&self.line, line)?;
        let port: String = port.chars().filter(|c| !c.is_whitespace()).collect();
        Some(OnuRecord::new(&port, id, serial, literal_status(status)))
    }
}

/// ZTE: `gpon-onu_1/1:1  ZTEG12345678  Working`. Only "Working" is online.
pub struct ZteParser {
    line: Option<Regex>,
}

impl ZteParser {
    pub fn new() -> Self {
        Self {
            line: compile(r"(?i)^\s*gpon-onu_(\d+/\d+(?:/\d+)?):(\d+)\s+(\S+)\s+(\S+)"),
        }
    }
}

impl Default for ZteParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OnuParser for ZteParser {
    fn vendor(&self) -> &'static str {
        "ZTE"
    }

    fn parse_line(&self, line: &str) -> Option<OnuRecord> {
        let (port, id, serial, phase) = capture4(&self.line, line)?;
        let status = if phase.eq_ignore_ascii_case("working") {
            onu_status::ONLINE
        } else {
            onu_status::OFFLINE
        };
        Some(OnuRecord::new(port, id, serial, status))
    }
}

/// Fiberhome: `1/1  1  FHTT12345678  online`
pub struct FiberhomeParser {
    line: Option<Regex>,
}

impl FiberhomeParser {
    pub fn new() -> Self {
        Self {
            line: compile(r"(?i)^\s*(\d+/\d+)\s+(\d+)\s+(\S+)\s+(online|offline)\b"),
        }
    }
}

impl Default for FiberhomeParser {
    fn default() -> Self {
        Self::new()
    }
}

impl OnuParser for FiberhomeParser {
    fn vendor(&self) -> &'static str {
        "Fiberhome"
    }

    fn parse_line(&self, line: &str) -> Option<OnuRecord> {
        let (port, id, serial, status) = capture4(&self.line, line)?;
        Some(OnuRecord::new(port, id, serial, literal_status(status)))
    }
}

/// Fallback for unknown brands: `<port>:<id>  <serial>  <status>` where the
/// port uses '/' or '-' separators and may carry an interface prefix.
pub struct GenericParser {
    line: Option<Regex>,
}

impl GenericParser {
    pub fn new() -> Self {
        Self {
            line: compile(r"^\s*(?:\S*?_)?(\d+(?:[/-]\d+)+)[:.](\d+)\s+(\S+)\s+(\S+)"),
        }
    }
}

impl Default for GenericParser {
    fn default() -> Self {
        Self::new()
    }
}

fn generic_status(word: &str) -> Option<&'static str> {
    match word.to_ascii_lowercase().as_str() {
        "online" | "up" | "working" | "active" => Some(onu_status::ONLINE),
        "offline" | "down" | "los" | "inactive" => Some(onu_status::OFFLINE),
        _ => None,
    }
}

impl OnuParser for GenericParser {
    fn vendor(&self) -> &'static str {
        "Generic"
    }

    fn parse_line(&self, line: &str) -> Option<OnuRecord> {
        let (port, id, serial, word) = capture4(&self.line, line)?;
        let status = generic_status(word)?;
        Some(OnuRecord::new(port, id, serial, status))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsol_epon_prefix() {
        let parser = VsolParser::new();
        let rec = parser.parse_line("epon-onu_2/3:14  VSOL00AA11BB  ONLINE").unwrap();
        assert_eq!(rec.pon_port, "2/3");
        assert_eq!(rec.onu_id, 14);
        assert_eq!(rec.status, onu_status::ONLINE);
    }

    #[test]
    fn test_huawei_rejects_header() {
        let parser = HuaweiParser::new();
        assert!(parser.parse_line("  F/S/P   ONT         SN         Control     Run").is_none());
        assert!(parser.parse_line("  -----------------------------------------").is_none());
    }

    #[test]
    fn test_zte_three_level_port() {
        let parser = ZteParser::new();
        let rec = parser.parse_line("gpon-onu_1/2/3:4  ZTEGC0FFEE00  working").unwrap();
        assert_eq!(rec.pon_port, "1/2/3");
        assert_eq!(rec.onu_id, 4);
        assert_eq!(rec.status, onu_status::ONLINE);
    }

    #[test]
    fn test_onu_id_overflow_is_skipped() {
        let parser = FiberhomeParser::new();
        assert!(parser.parse_line("1/1 99999999999999999999999 FHTT1 online").is_none());
    }

    #[test]
    fn test_generic_interface_prefix() {
        let parser = GenericParser::new();
        let rec = parser.parse_line("pon_0/4:9  BDCM00112233  up").unwrap();
        assert_eq!(rec.pon_port, "0/4");
        assert_eq!(rec.onu_id, 9);
        assert_eq!(rec.status, onu_status::ONLINE);
    }
}
