//! Packet records from the first body segment.
//!
//! Each record is 12 bytes:
//!
//! | Offset | Size | Field |
//! |--------|------|-------|
//! | 0 | 4 | packet id (u32 LE) |
//! | 4 | 4 | unknown, passed through |
//! | 8 | 4 | timestamp (u32 LE) |
//!
//! Only the id and timestamp are interpreted.

use std::io::Read;

use byteorder::{ByteOrder, LittleEndian};
use serde::Serialize;

use crate::binary::ByteSource;
use crate::block::hex_bytes;
use crate::error::Result;

pub const PACKET_SIZE: u64 = 12;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Packet {
    #[serde(serialize_with = "hex_bytes")]
    raw:           Vec<u8>,
    pub id:        u32,
    pub timestamp: u32,
}

impl Packet {
    pub fn parse<R: Read>(src: &mut ByteSource<R>) -> Result<Self> {
        let raw = src.read_bytes(PACKET_SIZE)?;
        Ok(Self::from_raw(raw))
    }

    fn from_raw(raw: Vec<u8>) -> Self {
        let id = LittleEndian::read_u32(&raw[0..4]);
        let timestamp = LittleEndian::read_u32(&raw[8..12]);
        Self { raw, id, timestamp }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    /// The four bytes between id and timestamp.
    pub fn unknown(&self) -> &[u8] {
        &self.raw[4..8]
    }

    pub fn label(&self) -> String {
        format!("Packet #{}, UNKNOWN CONTENT, {}", self.id, self.timestamp)
    }
}

// ── Accumulator ──────────────────────────────────────────────────────────────

/// Packet ids and timestamps collected while walking a file.  Owned by the
/// caller and handed to the walk, so two walks never share entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PacketLog {
    pub ids:        Vec<u32>,
    pub timestamps: Vec<u32>,
}

impl PacketLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, packet: &Packet) {
        self.ids.push(packet.id);
        self.timestamps.push(packet.timestamp);
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Smallest and largest timestamp seen, if any.
    pub fn time_span(&self) -> Option<(u32, u32)> {
        let min = self.timestamps.iter().copied().min()?;
        let max = self.timestamps.iter().copied().max()?;
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn packet_bytes(id: u32, unknown: [u8; 4], timestamp: u32) -> Vec<u8> {
        let mut out = id.to_le_bytes().to_vec();
        out.extend_from_slice(&unknown);
        out.extend_from_slice(&timestamp.to_le_bytes());
        out
    }

    #[test]
    fn parses_id_and_timestamp() {
        let bytes = packet_bytes(7, [0xDE, 0xAD, 0xBE, 0xEF], 1500);
        let mut src = ByteSource::new(&bytes[..]);
        let packet = Packet::parse(&mut src).unwrap();
        assert_eq!(packet.id, 7);
        assert_eq!(packet.timestamp, 1500);
        assert_eq!(packet.unknown(), &[0xDE, 0xAD, 0xBE, 0xEF]);
        assert_eq!(packet.raw(), &bytes[..]);
        assert_eq!(packet.label(), "Packet #7, UNKNOWN CONTENT, 1500");
    }

    #[test]
    fn short_packet_fails() {
        let mut src = ByteSource::new(&[0u8; 11][..]);
        assert!(Packet::parse(&mut src).is_err());
    }

    #[test]
    fn log_tracks_span() {
        let mut log = PacketLog::new();
        assert_eq!(log.time_span(), None);
        for (id, ts) in [(1, 30), (2, 10), (3, 20)] {
            let bytes = packet_bytes(id, [0; 4], ts);
            log.record(&Packet::parse(&mut ByteSource::new(&bytes[..])).unwrap());
        }
        assert_eq!(log.len(), 3);
        assert_eq!(log.ids, vec![1, 2, 3]);
        assert_eq!(log.time_span(), Some((10, 30)));
    }
}
