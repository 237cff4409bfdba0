//! Raw advertisement data (AD structure) parsing.
//!
//! Each AD structure is `[len][type][len - 1 bytes of payload]`; a zero
//! length or a structure running past the buffer ends the walk.

use crate::ble::{peripheral_name, PeripheralName};

/// Incomplete list of 16-bit service UUIDs.
const AD_UUID16_INCOMPLETE: u8 = 0x02;
/// Complete list of 16-bit service UUIDs.
const AD_UUID16_COMPLETE: u8 = 0x03;
/// Shortened local name.
const AD_NAME_SHORT: u8 = 0x08;
/// Complete local name.
const AD_NAME_COMPLETE: u8 = 0x09;

/// Iterate over `(ad_type, payload)` pairs of well-formed AD structures.
fn ad_structures(data: &[u8]) -> impl Iterator<Item = (u8, &[u8])> {
    let mut i = 0;
    core::iter::from_fn(move || {
        if i >= data.len() {
            return None;
        }
        let len = data[i] as usize;
        if len == 0 || i + len >= data.len() {
            return None;
        }
        let item = (data[i + 1], &data[i + 2..i + 1 + len]);
        i += len + 1;
        Some(item)
    })
}

/// Check if raw advertisement data lists the given 16-bit service UUID.
pub fn advertises_service(data: &[u8], uuid: u16) -> bool {
    let uuid_le = uuid.to_le_bytes();

    ad_structures(data)
        .filter(|(ad_type, _)| *ad_type == AD_UUID16_INCOMPLETE || *ad_type == AD_UUID16_COMPLETE)
        .any(|(_, payload)| payload.chunks_exact(2).any(|chunk| chunk == uuid_le))
}

/// True when `filters` is empty or the advertisement lists any of them.
pub fn matches_filters(data: &[u8], filters: &[u16]) -> bool {
    filters.is_empty() || filters.iter().any(|&uuid| advertises_service(data, uuid))
}

/// Extract complete/shortened local name from advertisement data.
///
/// Non-ASCII bytes are dropped rather than guessed at; a name that ends up
/// empty counts as absent.
pub fn extract_device_name(data: &[u8]) -> Option<PeripheralName> {
    let (_, payload) = ad_structures(data)
        .find(|(ad_type, _)| *ad_type == AD_NAME_SHORT || *ad_type == AD_NAME_COMPLETE)?;

    let name = match core::str::from_utf8(payload) {
        Ok(s) => peripheral_name(s),
        Err(_) => {
            let mut name = PeripheralName::new();
            for &b in payload.iter().filter(|b| b.is_ascii()) {
                if name.push(b as char).is_err() {
                    break;
                }
            }
            name
        }
    };

    (!name.is_empty()).then_some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HID: u16 = 0x1812;
    const BATTERY: u16 = 0x180F;

    #[test]
    fn detect_uuid_in_advertisement() {
        // AD structure: len=3, type=0x03 (Complete 16-bit UUIDs), UUID=0x1812
        let ad_data = [0x03, 0x03, 0x12, 0x18];
        assert!(advertises_service(&ad_data, HID));
    }

    #[test]
    fn other_uuid_in_advertisement() {
        let ad_data = [0x03, 0x03, 0x0F, 0x18]; // Battery Service UUID
        assert!(!advertises_service(&ad_data, HID));
        assert!(advertises_service(&ad_data, BATTERY));
    }

    #[test]
    fn uuid_among_multiple_uuids() {
        // Multiple 16-bit UUIDs: 0x180F (Battery), 0x1812 (HID), 0x1801 (GATT)
        let ad_data = [
            0x07, 0x03, // len=7, type=0x03
            0x0F, 0x18, // Battery
            0x12, 0x18, // HID
            0x01, 0x18, // GATT
        ];
        assert!(advertises_service(&ad_data, HID));
    }

    #[test]
    fn incomplete_uuid_list() {
        let ad_data = [0x03, 0x02, 0x12, 0x18];
        assert!(advertises_service(&ad_data, HID));
    }

    #[test]
    fn empty_and_malformed_data() {
        assert!(!advertises_service(&[], HID));
        assert!(!advertises_service(&[0x00], HID));
        // len=5 runs past the buffer
        assert!(!advertises_service(&[0x05, 0x03, 0x12], HID));
    }

    #[test]
    fn empty_filter_matches_everything() {
        assert!(matches_filters(&[0x02, 0x01, 0x06], &[]));
        assert!(!matches_filters(&[0x02, 0x01, 0x06], &[HID]));
        assert!(matches_filters(&[0x03, 0x03, 0x0F, 0x18], &[HID, BATTERY]));
    }

    #[test]
    fn extract_complete_local_name() {
        let ad_data = [
            0x09, 0x09, // len=9, type=0x09
            b'K', b'e', b'y', b'b', b'o', b'a', b'r', b'd',
        ];
        assert_eq!(extract_device_name(&ad_data).as_deref(), Some("Keyboard"));
    }

    #[test]
    fn extract_shortened_local_name_after_flags() {
        let ad_data = [
            0x02, 0x01, 0x06, // Flags
            0x05, 0x08, b'B', b'T', b' ', b'K',
        ];
        assert_eq!(extract_device_name(&ad_data).as_deref(), Some("BT K"));
    }

    #[test]
    fn no_name_in_advertisement() {
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(extract_device_name(&ad_data), None);
    }

    #[test]
    fn name_truncated_to_capacity() {
        let mut ad_data = [0u8; 40];
        ad_data[0] = 35; // len
        ad_data[1] = 0x09; // Complete Local Name
        for b in &mut ad_data[2..37] {
            *b = b'X';
        }
        let name = extract_device_name(&ad_data).unwrap();
        assert_eq!(name.len(), 32);
    }

    #[test]
    fn invalid_utf8_keeps_ascii() {
        let ad_data = [0x04, 0x09, b'O', 0xFF, b'K'];
        assert_eq!(extract_device_name(&ad_data).as_deref(), Some("OK"));
    }
}
