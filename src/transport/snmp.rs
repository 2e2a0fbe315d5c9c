use std::time::Duration;

use snmp2::{Oid, SyncSession, Value};

use super::{run_blocking, DeviceEndpoint, SnmpValue, SnmpVersion, TransportError};

/// Upper bound on entries returned by one walk
const MAX_WALK_ENTRIES: usize = 10_000;

/// SNMP v1/v2c client over blocking UDP sessions
pub struct SnmpClient {
    timeout: Duration,
}

impl SnmpClient {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    /// Whole-operation deadline; a walk issues many requests
    fn deadline(&self) -> Duration {
        self.timeout * 6
    }

    pub async fn get(&self, endpoint: &DeviceEndpoint, oid: &str) -> Result<Option<SnmpValue>, TransportError> {
        let ep = endpoint.clone();
        let oid = oid.to_string();
        let timeout = self.timeout;
        run_blocking(self.deadline(), move || {
            let mut session = open_session(&ep, timeout)?;
            let target = to_oid(&oid)?;
            let mut pdu = session
                .get(&target)
                .map_err(|e| TransportError::Snmp(format!("GET {} failed: {:?}", oid, e)))?;
            let value = pdu.varbinds.next().and_then(|(_, value)| convert(&value));
            Ok(value)
        })
        .await
    }

    pub async fn walk(&self, endpoint: &DeviceEndpoint, root: &str) -> Result<Vec<(String, SnmpValue)>, TransportError> {
        let ep = endpoint.clone();
        let root = root.to_string();
        let timeout = self.timeout;
        run_blocking(self.deadline(), move || walk_blocking(&ep, &root, timeout)).await
    }
}

fn open_session(endpoint: &DeviceEndpoint, timeout: Duration) -> Result<SyncSession, TransportError> {
    let addr = format!("{}:{}", endpoint.host, endpoint.snmp_port);
    let community = endpoint.snmp_community.as_bytes();
    let session = match endpoint.snmp_version {
        SnmpVersion::V1 => SyncSession::new_v1(addr.as_str(), community, Some(timeout), 0),
        SnmpVersion::V2c => SyncSession::new_v2c(addr.as_str(), community, Some(timeout), 0),
    };
    session.map_err(|e| TransportError::Connect(format!("SNMP session to {} failed: {}", addr, e)))
}

fn walk_blocking(
    endpoint: &DeviceEndpoint,
    root: &str,
    timeout: Duration,
) -> Result<Vec<(String, SnmpValue)>, TransportError> {
    let root_parts = parse_oid(root)?;
    let mut session = open_session(endpoint, timeout)?;
    let mut current = root_parts.clone();
    let mut entries = Vec::new();

    while entries.len() < MAX_WALK_ENTRIES {
        let target = Oid::from(&current)
            .map_err(|e| TransportError::Snmp(format!("invalid OID {}: {:?}", root, e)))?;
        let mut pdu = session
            .getnext(&target)
            .map_err(|e| TransportError::Snmp(format!("GETNEXT under {} failed: {:?}", root, e)))?;

        let Some((next_oid, value)) = pdu.varbinds.next() else {
            break;
        };
        if matches!(value, Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance) {
            break;
        }
        let next_str = next_oid.to_id_string();
        let next_parts = parse_oid(&next_str)?;

        // Left the subtree, or the agent is not advancing
        if !next_parts.starts_with(&root_parts) || next_parts <= current {
            break;
        }

        if let Some(converted) = convert(&value) {
            entries.push((next_str, converted));
        }
        current = next_parts;
    }

    Ok(entries)
}

fn convert(value: &Value<'_>) -> Option<SnmpValue> {
    Some(match value {
        Value::Integer(v) => SnmpValue::Integer(*v),
        Value::OctetString(bytes) => SnmpValue::Bytes(bytes.to_vec()),
        Value::Counter32(v) => SnmpValue::Counter(*v as u64),
        Value::Unsigned32(v) => SnmpValue::Counter(*v as u64),
        Value::Counter64(v) => SnmpValue::Counter(*v),
        Value::Timeticks(v) => SnmpValue::Timeticks(*v),
        Value::ObjectIdentifier(oid) => SnmpValue::Oid(oid.to_id_string()),
        Value::IpAddress(addr) => SnmpValue::IpAddress(*addr),
        Value::Null => SnmpValue::Null,
        Value::EndOfMibView | Value::NoSuchObject | Value::NoSuchInstance => return None,
        _ => SnmpValue::Null,
    })
}

/// Parse dotted OID text, tolerating a leading dot
pub(crate) fn parse_oid(oid: &str) -> Result<Vec<u64>, TransportError> {
    oid.trim()
        .trim_start_matches('.')
        .split('.')
        .map(|part| {
            part.parse::<u64>()
                .map_err(|_| TransportError::Snmp(format!("invalid OID: {}", oid)))
        })
        .collect()
}

fn to_oid(oid: &str) -> Result<Oid<'static>, TransportError> {
    let parts = parse_oid(oid)?;
    Oid::from(&parts).map_err(|e| TransportError::Snmp(format!("invalid OID {}: {:?}", oid, e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oid() {
        assert_eq!(parse_oid(".1.3.6.1.2.1.1.1.0").unwrap(), vec![1, 3, 6, 1, 2, 1, 1, 1, 0]);
        assert_eq!(parse_oid("1.3.6").unwrap(), vec![1, 3, 6]);
        assert!(parse_oid("1.3.x").is_err());
        assert!(parse_oid("").is_err());
    }

    #[test]
    fn test_oid_subtree_ordering() {
        let root = parse_oid("1.3.6.1.4.1.37950").unwrap();
        let inside = parse_oid("1.3.6.1.4.1.37950.1.1").unwrap();
        let outside = parse_oid("1.3.6.1.4.1.37951").unwrap();
        assert!(inside.starts_with(&root));
        assert!(!outside.starts_with(&root));
        assert!(inside > root);
    }
}
