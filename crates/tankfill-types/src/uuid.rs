//! Bluetooth GATT identifiers for tank level sensors.
//!
//! Service and characteristic identifiers come from configuration as
//! strings. Two forms are accepted:
//!
//! - a 16-bit alias written as `0x` followed by four hex digits (`0x181A`),
//!   expanded onto the Bluetooth base UUID
//! - a full 128-bit UUID in lowercase hyphenated form
//!   (`0000181a-0000-1000-8000-00805f9b34fb`)
//!
//! Anything else, including the `0000xxxx-...` placeholders shipped in the
//! default configuration, is treated as unset.

use uuid::{Uuid, uuid};

/// The Bluetooth SIG base UUID that 16-bit aliases are expanded onto.
pub const BLUETOOTH_BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

/// Placeholder written into fresh configurations until the real service is known.
pub const PLACEHOLDER_SERVICE: &str = "0000xxxx-0000-1000-8000-00805f9b34fb";

/// Placeholder written into fresh configurations until the real characteristic is known.
pub const PLACEHOLDER_CHARACTERISTIC: &str = "0000xxxx-0000-1000-8000-00805f9b34fb";

/// Name prefix advertised by the Shelly BLU Distance sensor.
pub const DEFAULT_DEVICE_NAME_PREFIX: &str = "ShellyBLU";

/// Parse a configured GATT identifier.
///
/// Returns `None` when the string is not a valid 16-bit alias or
/// lowercase 128-bit UUID.
///
/// # Example
///
/// ```
/// use tankfill_types::uuid::parse_gatt_id;
///
/// let battery = parse_gatt_id("0x2A19").unwrap();
/// assert_eq!(battery.to_string(), "00002a19-0000-1000-8000-00805f9b34fb");
/// assert!(parse_gatt_id("0000xxxx-0000-1000-8000-00805f9b34fb").is_none());
/// ```
pub fn parse_gatt_id(value: &str) -> Option<Uuid> {
    let s = value.trim();
    if let Some(hex) = s.strip_prefix("0x") {
        if hex.len() == 4 && hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            let short = u16::from_str_radix(hex, 16).ok()?;
            return Some(from_short(short));
        }
        return None;
    }
    if is_lowercase_hyphenated(s) {
        return Uuid::parse_str(s).ok();
    }
    None
}

/// Whether a configured value is one of the shipped placeholders.
pub fn is_placeholder(value: &str) -> bool {
    value.trim().is_empty() || value.contains("xxxx")
}

/// Expand a 16-bit alias onto the Bluetooth base UUID.
pub fn from_short(short: u16) -> Uuid {
    let (_, d2, d3, d4) = BLUETOOTH_BASE_UUID.as_fields();
    Uuid::from_fields(u32::from(short), d2, d3, d4)
}

fn is_lowercase_hyphenated(s: &str) -> bool {
    const GROUPS: [usize; 5] = [8, 4, 4, 4, 12];
    let parts: Vec<&str> = s.split('-').collect();
    parts.len() == GROUPS.len()
        && parts.iter().zip(GROUPS).all(|(part, len)| {
            part.len() == len
                && part
                    .bytes()
                    .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_alias_expansion() {
        let id = parse_gatt_id("0x181a").unwrap();
        assert_eq!(id.to_string(), "0000181a-0000-1000-8000-00805f9b34fb");
        assert_eq!(parse_gatt_id("0x181A"), Some(id));
        assert_eq!(from_short(0x181A), id);
    }

    #[test]
    fn test_short_alias_rejects_wrong_width() {
        assert!(parse_gatt_id("0x18").is_none());
        assert!(parse_gatt_id("0x181a0").is_none());
        assert!(parse_gatt_id("0xZZZZ").is_none());
        assert!(parse_gatt_id("181a").is_none());
    }

    #[test]
    fn test_full_uuid_lowercase() {
        let s = "f0cd3001-95da-4f4b-9ac8-aa55d312af0c";
        assert_eq!(parse_gatt_id(s).unwrap().to_string(), s);
    }

    #[test]
    fn test_full_uuid_surrounding_whitespace() {
        assert!(parse_gatt_id("  0000181a-0000-1000-8000-00805f9b34fb ").is_some());
    }

    #[test]
    fn test_full_uuid_rejects_uppercase_and_other_forms() {
        assert!(parse_gatt_id("F0CD3001-95DA-4F4B-9AC8-AA55D312AF0C").is_none());
        assert!(parse_gatt_id("f0cd300195da4f4b9ac8aa55d312af0c").is_none());
        assert!(parse_gatt_id("{f0cd3001-95da-4f4b-9ac8-aa55d312af0c}").is_none());
        assert!(parse_gatt_id("").is_none());
    }

    #[test]
    fn test_placeholders_are_unset() {
        assert!(parse_gatt_id(PLACEHOLDER_SERVICE).is_none());
        assert!(parse_gatt_id(PLACEHOLDER_CHARACTERISTIC).is_none());
        assert!(is_placeholder(PLACEHOLDER_SERVICE));
        assert!(is_placeholder(""));
        assert!(!is_placeholder("0x181a"));
    }

    #[test]
    fn test_base_uuid() {
        assert_eq!(
            BLUETOOTH_BASE_UUID.to_string(),
            "00000000-0000-1000-8000-00805f9b34fb"
        );
    }
}
