use std::net::Ipv4Addr;

use ipnetwork::Ipv4Network;

/// Normalize MAC address to lowercase with colons
pub fn normalize_mac(mac: &str) -> String {
    // Remove any existing separators
    let clean: String = mac
        .chars()
        .filter(|c| c.is_ascii_hexdigit())
        .collect();

    if clean.len() != 12 {
        return mac.to_lowercase();
    }

    clean
        .chars()
        .collect::<Vec<_>>()
        .chunks(2)
        .map(|c| c.iter().collect::<String>())
        .collect::<Vec<_>>()
        .join(":")
        .to_lowercase()
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
pub fn is_valid_ipv4(ip: &str) -> bool {
    ip.parse::<Ipv4Addr>().is_ok()
}

/// Parse CIDR notation and clear host bits, e.g. "10.0.0.7/24" -> 10.0.0.0/24
pub fn parse_cidr(cidr: &str) -> Result<Ipv4Network, String> {
    let net: Ipv4Network = cidr
        .trim()
        .parse()
        .map_err(|e| format!("Invalid CIDR {}: {}", cidr, e))?;
    Ipv4Network::new(net.network(), net.prefix())
        .map_err(|e| format!("Invalid CIDR {}: {}", cidr, e))
}

/// Number of usable host addresses (network and broadcast excluded)
pub fn usable_count(prefix_length: u8) -> u64 {
    if prefix_length >= 31 {
        return 0;
    }
    (1u64 << (32 - prefix_length as u32)) - 2
}

/// Usable host addresses of a network in ascending order
pub fn usable_hosts(net: Ipv4Network) -> impl Iterator<Item = Ipv4Addr> {
    let first = u32::from(net.network()) as u64 + 1;
    let count = usable_count(net.prefix());
    (first..first + count).map(|n| Ipv4Addr::from(n as u32))
}

/// Round to a fixed number of decimals
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Bytes to megabytes, 2 decimals
pub fn bytes_to_mb(bytes: i64) -> f64 {
    round_to(bytes as f64 / 1024.0 / 1024.0, 2)
}

/// Human-readable size, e.g. 1536 -> "1.50 KB"
pub fn format_bytes(bytes: i64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes.max(0) as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{:.2} {}", value, UNITS[unit])
}

/// Parse a RouterOS uptime string ("1w2d3h4m5s") into seconds.
/// Unknown unit letters are ignored.
pub fn parse_mikrotik_uptime(uptime: &str) -> Option<i64> {
    let mut total: i64 = 0;
    let mut digits = String::new();
    let mut matched = false;

    for c in uptime.trim().chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let multiplier = match c {
            'w' => 604_800,
            'd' => 86_400,
            'h' => 3_600,
            'm' => 60,
            's' => 1,
            _ => 0,
        };
        if let Ok(n) = digits.parse::<i64>() {
            if multiplier > 0 {
                total += n * multiplier;
                matched = true;
            }
        }
        digits.clear();
    }

    if matched {
        Some(total)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_mac() {
        assert_eq!(normalize_mac("AA:BB:CC:DD:EE:FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("AA-BB-CC-DD-EE-FF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("AABBCCDDEEFF"), "aa:bb:cc:dd:ee:ff");
        assert_eq!(normalize_mac("00:11:22:33:44:55"), "00:11:22:33:44:55");
    }

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(!is_valid_ipv4(""));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("; rm -rf /"));
    }

    #[test]
    fn test_parse_cidr_clears_host_bits() {
        let net = parse_cidr("10.0.0.7/24").unwrap();
        assert_eq!(net.network(), Ipv4Addr::new(10, 0, 0, 0));
        assert_eq!(net.prefix(), 24);
        assert!(parse_cidr("10.0.0.0/33").is_err());
        assert!(parse_cidr("garbage").is_err());
    }

    #[test]
    fn test_usable_count() {
        assert_eq!(usable_count(30), 2);
        assert_eq!(usable_count(29), 6);
        assert_eq!(usable_count(24), 254);
        assert_eq!(usable_count(31), 0);
        assert_eq!(usable_count(32), 0);
    }

    #[test]
    fn test_usable_hosts_excludes_network_and_broadcast() {
        let hosts: Vec<Ipv4Addr> = usable_hosts(parse_cidr("192.168.1.0/30").unwrap()).collect();
        assert_eq!(hosts, vec![Ipv4Addr::new(192, 168, 1, 1), Ipv4Addr::new(192, 168, 1, 2)]);

        let hosts: Vec<Ipv4Addr> = usable_hosts(parse_cidr("10.0.0.0/24").unwrap()).collect();
        assert_eq!(hosts.first(), Some(&Ipv4Addr::new(10, 0, 0, 1)));
        assert_eq!(hosts.last(), Some(&Ipv4Addr::new(10, 0, 0, 254)));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(1536), "1.50 KB");
        assert_eq!(format_bytes(5 * 1024 * 1024), "5.00 MB");
    }

    #[test]
    fn test_bytes_to_mb() {
        assert_eq!(bytes_to_mb(1_048_576), 1.0);
        assert_eq!(bytes_to_mb(1_572_864), 1.5);
        assert_eq!(bytes_to_mb(0), 0.0);
    }

    #[test]
    fn test_parse_mikrotik_uptime() {
        assert_eq!(parse_mikrotik_uptime("1w2d3h4m5s"), Some(604_800 + 172_800 + 10_800 + 240 + 5));
        assert_eq!(parse_mikrotik_uptime("5h30m"), Some(19_800));
        assert_eq!(parse_mikrotik_uptime("42s"), Some(42));
        assert_eq!(parse_mikrotik_uptime(""), None);
        assert_eq!(parse_mikrotik_uptime("never"), None);
    }
}
