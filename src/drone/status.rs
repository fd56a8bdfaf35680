//! Vehicle status line parsing
//!
//! The Tello pushes lines such as `pitch:0;roll:0;yaw:0;bat:87;baro:12.3;`.

use std::collections::HashMap;

/// Parsed `key:value` pairs from one status line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DroneStatus {
    fields: HashMap<String, String>,
}

impl DroneStatus {
    /// Parse a status line; malformed entries are skipped
    pub fn parse(line: &str) -> Self {
        let fields = line
            .split(';')
            .filter_map(|entry| {
                let mut parts = entry.split(':');
                match (parts.next(), parts.next(), parts.next()) {
                    (Some(key), Some(value), None) if !key.trim().is_empty() => {
                        Some((key.trim().to_string(), value.trim().to_string()))
                    }
                    _ => None,
                }
            })
            .collect();

        Self { fields }
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    /// Battery percentage as reported
    pub fn battery(&self) -> Option<&str> {
        self.get("bat")
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_status_line() {
        let status = DroneStatus::parse("pitch:0;roll:-1;yaw:12;bat:87;baro:-12.34;\r\n");

        assert_eq!(status.battery(), Some("87"));
        assert_eq!(status.get("roll"), Some("-1"));
        assert_eq!(status.len(), 5);
    }

    #[test]
    fn test_malformed_entries_skipped() {
        let status = DroneStatus::parse("bat;a:b:c;:9;tof:10");

        assert_eq!(status.len(), 1);
        assert_eq!(status.get("tof"), Some("10"));
        assert!(status.battery().is_none());
    }

    #[test]
    fn test_empty_line() {
        assert!(DroneStatus::parse("").is_empty());
    }
}
