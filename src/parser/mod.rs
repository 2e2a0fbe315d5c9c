//! Vendor ONU listing parsers.
//!
//! `parse_onu_list_output` is the entry point: it picks a parser by brand
//! and runs it over the raw CLI text. Lines a parser does not recognise
//! (banners, headers, prompts) are skipped.

mod vendors;

use std::collections::HashMap;
use std::sync::OnceLock;

use crate::models::{onu_status, OnuRecord};

pub use vendors::{FiberhomeParser, GenericParser, HuaweiParser, VsolParser, ZteParser};

/// One vendor's ONU listing format
pub trait OnuParser: Send + Sync {
    /// Vendor label used in logs
    fn vendor(&self) -> &'static str;

    /// Parse one line; None when the line is not an ONU entry
    fn parse_line(&self, line: &str) -> Option<OnuRecord>;

    fn parse(&self, raw: &str) -> Vec<OnuRecord> {
        raw.lines().filter_map(|line| self.parse_line(line)).collect()
    }
}

/// Parsers keyed by normalized brand, with a generic fallback
pub struct ParserRegistry {
    parsers: HashMap<&'static str, Box<dyn OnuParser>>,
    fallback: Box<dyn OnuParser>,
}

impl ParserRegistry {
    pub fn new() -> Self {
        let mut parsers: HashMap<&'static str, Box<dyn OnuParser>> = HashMap::new();
        parsers.insert("vsol", Box::new(VsolParser::new()));
        parsers.insert("huawei", Box::new(HuaweiParser::new()));
        parsers.insert("zte", Box::new(ZteParser::new()));
        parsers.insert("fiberhome", Box::new(FiberhomeParser::new()));
        Self {
            parsers,
            fallback: Box::new(GenericParser::new()),
        }
    }

    pub fn for_brand(&self, brand: &str) -> &dyn OnuParser {
        self.parsers
            .get(normalize_brand(brand).as_str())
            .map(|p| p.as_ref())
            .unwrap_or(self.fallback.as_ref())
    }
}

impl Default for ParserRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn registry() -> &'static ParserRegistry {
    static REGISTRY: OnceLock<ParserRegistry> = OnceLock::new();
    REGISTRY.get_or_init(ParserRegistry::new)
}

/// Lowercase alphanumerics only: "V-SOL", "Vsol" and "VSOL" are the same brand
pub fn normalize_brand(brand: &str) -> String {
    brand
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

/// Parse raw ONU listing text for the given OLT brand
pub fn parse_onu_list_output(raw: &str, brand: &str) -> Vec<OnuRecord> {
    if raw.trim().is_empty() {
        return Vec::new();
    }
    let parser = registry().for_brand(brand);
    let records = parser.parse(raw);
    tracing::debug!("{} parser extracted {} ONUs", parser.vendor(), records.len());
    records
}

/// Literal online/offline token. Anything else is offline.
pub(crate) fn literal_status(token: &str) -> &'static str {
    if token.eq_ignore_ascii_case("online") {
        onu_status::ONLINE
    } else {
        onu_status::OFFLINE
    }
}

/// Split an SNMP table index into (pon_port, onu_id): the last component is
/// the ONU id, the rest form the port path. Single-component indices map to
/// port "0".
pub fn parse_snmp_index(index: &str) -> Option<(String, i64)> {
    let parts: Vec<&str> = index.trim_matches('.').split('.').filter(|p| !p.is_empty()).collect();
    let (last, port) = parts.split_last()?;
    let onu_id = last.parse::<i64>().ok()?;
    if port.is_empty() {
        return Some(("0".to_string(), onu_id));
    }
    if port.iter().any(|p| p.parse::<u64>().is_err()) {
        return None;
    }
    Some((port.join("/"), onu_id))
}

/// Raw SNMP optical power (hundredths of dBm) to dBm
pub fn scale_signal(raw: i64) -> f64 {
    crate::utils::round_to(raw as f64 * 0.01, 2)
}
