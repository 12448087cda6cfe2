use heapless::Vec;

use super::MAX_SSID_LEN;
use crate::host::SCAN_RESULT_LEN;

const RSSI_OFFSET: usize = 8;
const SEC_SSID_LEN_OFFSET: usize = 9;
const SSID_OFFSET: usize = 12;
const BSSID_OFFSET: usize = 44;

/// One access point from an SSID scan.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ScanEntry {
    /// Whether the chip flagged the record as valid.
    pub valid: bool,
    pub rssi: u8,
    /// Raw security mode, see [`crate::host::Security::from_raw`].
    pub security: u8,
    pub ssid: Vec<u8, MAX_SSID_LEN>,
    pub bssid: [u8; 6],
}

impl ScanEntry {
    /// Decodes a scan result record.
    pub fn decode(record: &[u8; SCAN_RESULT_LEN]) -> Self {
        let rssi_byte = record[RSSI_OFFSET];
        let sec_ssid_len = record[SEC_SSID_LEN_OFFSET];
        let ssid_len = usize::from(sec_ssid_len >> 2).min(MAX_SSID_LEN);

        let mut ssid = Vec::new();
        // Cannot overflow: the length is clamped to capacity.
        let _ = ssid.extend_from_slice(&record[SSID_OFFSET..SSID_OFFSET + ssid_len]);

        let mut bssid = [0u8; 6];
        bssid.copy_from_slice(&record[BSSID_OFFSET..BSSID_OFFSET + 6]);

        Self {
            valid: rssi_byte & 0x01 != 0,
            rssi: rssi_byte >> 1,
            security: sec_ssid_len & 0x03,
            ssid,
            bssid,
        }
    }

    pub fn ssid_str(&self) -> Option<&str> {
        core::str::from_utf8(&self.ssid).ok()
    }
}

/// Network count carried in the first record of a scan.
pub(crate) fn network_count(record: &[u8; SCAN_RESULT_LEN]) -> u32 {
    u32::from_le_bytes([record[0], record[1], record[2], record[3]])
}
