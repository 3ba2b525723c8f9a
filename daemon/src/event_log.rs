use byteorder::{ByteOrder, LittleEndian};
use strum::{Display, FromRepr};

const RECORD_SIZE: usize = 5;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Display, FromRepr)]
#[repr(u8)]
pub enum LogEvent {
    #[strum(to_string = "no event")]
    NoEvent,
    #[strum(to_string = "brownout reset")]
    BrownoutReset,
    #[strum(to_string = "watchdog reset")]
    WatchdogReset,
    #[strum(to_string = "external reset")]
    ExternalReset,
    #[strum(to_string = "hard reset")]
    HardReset,
    #[strum(to_string = "store version changed")]
    StoreVersionChanged,
    #[strum(to_string = "firmware update")]
    FirmwareUpdate,
    #[strum(to_string = "system param saved")]
    SystemParamSaved,
    #[strum(to_string = "boot")]
    Boot,
    #[strum(to_string = "unknown event")]
    Unknown,
}

impl LogEvent {
    pub fn from_id(id: u8) -> Self {
        LogEvent::from_repr(id).unwrap_or(LogEvent::Unknown)
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub offset: usize,
    pub timestamp: i32,
    pub event: LogEvent,
}

/// Splits a raw event log into its records, each a little endian timestamp followed by an
/// event id. A partial record at the end is ignored.
pub fn decode(data: &[u8]) -> Vec<LogEntry> {
    data.chunks_exact(RECORD_SIZE)
        .enumerate()
        .map(|(record, chunk)| LogEntry {
            offset: record * RECORD_SIZE,
            timestamp: LittleEndian::read_i32(&chunk[..4]),
            event: LogEvent::from_id(chunk[4]),
        })
        .collect()
}

pub fn format(size: usize, entries: &[LogEntry]) -> String {
    let mut message = format!("Showing hub event logs (log size: {size})\n");
    for entry in entries {
        message += &format!(
            "{}: time: {} e: {}\n",
            entry.offset, entry.timestamp, entry.event
        );
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_are_five_bytes() {
        let data = [
            0x10, 0x00, 0x00, 0x00, 8, // boot at 16
            0x00, 0x01, 0x00, 0x00, 1, // brownout at 256
        ];
        let entries = decode(&data);
        assert_eq!(
            entries,
            vec![
                LogEntry {
                    offset: 0,
                    timestamp: 16,
                    event: LogEvent::Boot
                },
                LogEntry {
                    offset: 5,
                    timestamp: 256,
                    event: LogEvent::BrownoutReset
                },
            ]
        );
    }

    #[test]
    fn timestamps_are_signed_little_endian() {
        let entries = decode(&[0x78, 0x56, 0x34, 0x12, 5, 0xFF, 0xFF, 0xFF, 0xFF, 5]);
        assert_eq!(entries[0].timestamp, 0x1234_5678);
        assert_eq!(entries[1].timestamp, -1);
    }

    #[test]
    fn out_of_range_ids_are_unknown() {
        let entries = decode(&[1, 0, 0, 0, 9, 1, 0, 0, 0, 200]);
        assert_eq!(entries[0].event, LogEvent::Unknown);
        assert_eq!(entries[1].event, LogEvent::Unknown);
    }

    #[test]
    fn trailing_partial_record_is_dropped() {
        assert_eq!(decode(&[1, 0, 0, 0, 6, 0xFF, 0xFF]).len(), 1);
        assert!(decode(&[1, 2, 3]).is_empty());
    }

    #[test]
    fn formats_one_line_per_record() {
        let entries = decode(&[0x2C, 0x01, 0x00, 0x00, 6]);
        assert_eq!(
            format(5, &entries),
            "Showing hub event logs (log size: 5)\n0: time: 300 e: firmware update\n"
        );
    }
}
