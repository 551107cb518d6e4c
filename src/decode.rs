//! Boot-protocol style mouse report decoding.
//!
//! Report layout (HID 1.11, Appendix B.2, with the common wheel extension):
//! - byte 0: button bitmask, copied as-is
//! - byte 1: X displacement, two's-complement `i8`
//! - byte 2: Y displacement, two's-complement `i8`
//! - byte 3: wheel displacement, two's-complement `i8`
//!
//! Shorter reports are legal and simply carry fewer fields. Bytes past the wheel are
//! ignored. Decoding cannot fail.

/// Change carried by one input report.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReportDelta {
    /// New button bitmask, `None` for an empty report.
    pub buttons: Option<u8>,
    pub dx: i32,
    pub dy: i32,
    pub dwheel: i32,
}

impl ReportDelta {
    /// `true` if the report moves any axis.
    pub fn has_movement(&self) -> bool {
        self.dx != 0 || self.dy != 0 || self.dwheel != 0
    }
}

/// Reinterpret a one-byte field as a signed 8-bit delta.
#[inline]
pub fn sign_extend(byte: u8) -> i32 {
    i32::from(byte as i8)
}

/// Decode a raw report into a [`ReportDelta`].
pub fn decode(report: &[u8]) -> ReportDelta {
    let field = |i: usize| report.get(i).copied().map(sign_extend).unwrap_or(0);
    ReportDelta {
        buttons: report.first().copied(),
        dx: field(1),
        dy: field(2),
        dwheel: field(3),
    }
}
