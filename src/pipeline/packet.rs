//! Line protocol packets
//!
//! One decoded line carries one packet of three comma-separated fields:
//!
//! ```text
//! <int type>,<float x>,<float y>
//! ```
//!
//! Type `0` is a sample, type `1` resets the sample window, every other type
//! is reserved. Lines that don't match the grammar are protocol padding and
//! are dropped without error.

use crate::types::SamplePoint;

/// Packet type for a sample point
pub const PACKET_SAMPLE: i64 = 0;

/// Packet type for a window reset
pub const PACKET_RESET: i64 = 1;

/// A parsed protocol packet
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Packet {
    /// Append a point to the sample window
    Sample(SamplePoint),
    /// Clear the sample window
    Reset,
    /// Well-formed packet with an unmapped type
    Reserved { kind: i64 },
}

impl Packet {
    /// Parse a decoded line, returning `None` for malformed input
    pub fn parse(line: &str) -> Option<Self> {
        let mut fields = line.split(',');
        let kind = fields.next()?.trim().parse::<i64>().ok()?;
        let x = parse_coordinate(fields.next()?)?;
        let y = parse_coordinate(fields.next()?)?;
        if fields.next().is_some() {
            return None;
        }

        Some(match kind {
            PACKET_SAMPLE => Packet::Sample(SamplePoint::new(x, y)),
            PACKET_RESET => Packet::Reset,
            kind => Packet::Reserved { kind },
        })
    }
}

fn parse_coordinate(field: &str) -> Option<f64> {
    field.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_packet() {
        assert_eq!(
            Packet::parse("0,1.5,2.5"),
            Some(Packet::Sample(SamplePoint::new(1.5, 2.5)))
        );
        assert_eq!(
            Packet::parse("0, -3 , 4e2"),
            Some(Packet::Sample(SamplePoint::new(-3.0, 400.0)))
        );
    }

    #[test]
    fn test_reset_packet() {
        assert_eq!(Packet::parse("1,0,0"), Some(Packet::Reset));
    }

    #[test]
    fn test_reserved_type() {
        assert_eq!(Packet::parse("5,1.0,2.0"), Some(Packet::Reserved { kind: 5 }));
    }

    #[test]
    fn test_malformed_lines() {
        assert_eq!(Packet::parse("0,abc,2"), None);
        assert_eq!(Packet::parse("0,1"), None);
        assert_eq!(Packet::parse("0,1,2,3"), None);
        assert_eq!(Packet::parse("0.5,1,2"), None);
        assert_eq!(Packet::parse("x,1,2"), None);
        assert_eq!(Packet::parse("0,inf,2"), None);
        assert_eq!(Packet::parse("0,NaN,2"), None);
        assert_eq!(Packet::parse(""), None);
        assert_eq!(Packet::parse("hello world"), None);
    }
}
