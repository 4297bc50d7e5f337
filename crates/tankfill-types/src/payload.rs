//! Best-effort decoding of a distance from a raw characteristic value.
//!
//! The byte layout used by the distance sensor firmware has not been
//! confirmed against vendor documentation. The default layout reads an
//! unsigned 16-bit integer at offset 0, little-endian first with a
//! big-endian retry, and treats it as millimetres. [`PayloadLayout`] lets a
//! deployment override offset, byte order and scale per device.
//!
//! A payload that cannot be decoded yields a [`ParseError`]. Callers drop
//! the sample; a failed decode is never read as a zero distance.

use bytes::Buf;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{ParseError, ParseResult};

/// Width of the distance field in bytes.
pub const DISTANCE_FIELD_BYTES: usize = 2;

/// Byte order of the 16-bit distance field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum ByteOrder {
    /// Little-endian, retrying big-endian if that fails.
    #[default]
    LittleEndianFirst,
    /// Little-endian only.
    LittleEndian,
    /// Big-endian only.
    BigEndian,
}

/// Where and how the distance lives inside a payload.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PayloadLayout {
    /// Byte offset of the 16-bit field.
    pub offset: usize,
    /// Byte order of the field.
    pub byte_order: ByteOrder,
    /// Millimetres per raw unit.
    pub scale: f64,
}

impl Default for PayloadLayout {
    fn default() -> Self {
        Self {
            offset: 0,
            byte_order: ByteOrder::LittleEndianFirst,
            scale: 1.0,
        }
    }
}

impl PayloadLayout {
    /// Set the field offset.
    #[must_use]
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    /// Set the byte order.
    #[must_use]
    pub fn byte_order(mut self, byte_order: ByteOrder) -> Self {
        self.byte_order = byte_order;
        self
    }

    /// Set the raw-to-millimetre scale.
    #[must_use]
    pub fn scale(mut self, scale: f64) -> Self {
        self.scale = scale;
        self
    }

    /// Reject scales that would turn every sample into garbage.
    pub fn validate(&self) -> ParseResult<()> {
        if !self.scale.is_finite() || self.scale <= 0.0 {
            return Err(ParseError::InvalidValue(format!(
                "payload scale must be a positive number, got {}",
                self.scale
            )));
        }
        Ok(())
    }

    /// Number of bytes a payload needs for this layout.
    pub fn required_len(&self) -> usize {
        self.offset.saturating_add(DISTANCE_FIELD_BYTES)
    }

    /// Decode a distance in millimetres from `data`.
    ///
    /// # Errors
    ///
    /// Returns [`ParseError::InsufficientBytes`] if the field does not fit in
    /// `data`, or [`ParseError::InvalidValue`] if the layout is invalid.
    pub fn decode(&self, data: &[u8]) -> ParseResult<f64> {
        self.validate()?;
        let raw = match self.byte_order {
            ByteOrder::LittleEndian => read_u16(data, self.offset, true)?,
            ByteOrder::BigEndian => read_u16(data, self.offset, false)?,
            ByteOrder::LittleEndianFirst => read_u16(data, self.offset, true)
                .or_else(|_| read_u16(data, self.offset, false))?,
        };
        Ok(f64::from(raw) * self.scale)
    }
}

/// Decode a distance with the default layout.
///
/// # Example
///
/// ```
/// use tankfill_types::payload::decode_distance;
///
/// assert_eq!(decode_distance(&[0x26, 0x02]).unwrap(), 550.0);
/// assert!(decode_distance(&[0x26]).is_err());
/// ```
pub fn decode_distance(data: &[u8]) -> ParseResult<f64> {
    PayloadLayout::default().decode(data)
}

fn read_u16(data: &[u8], offset: usize, little_endian: bool) -> ParseResult<u16> {
    let end = offset.saturating_add(DISTANCE_FIELD_BYTES);
    let mut field = data.get(offset..end).ok_or(ParseError::InsufficientBytes {
        expected: end,
        actual: data.len(),
    })?;
    Ok(if little_endian {
        field.get_u16_le()
    } else {
        field.get_u16()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_little_endian_default() {
        // 550 = 0x0226
        assert_eq!(decode_distance(&[0x26, 0x02]).unwrap(), 550.0);
    }

    #[test]
    fn test_decode_ignores_trailing_bytes() {
        assert_eq!(decode_distance(&[0xE8, 0x03, 0xFF, 0x7F, 0x01]).unwrap(), 1000.0);
    }

    #[test]
    fn test_decode_max_value() {
        assert_eq!(decode_distance(&[0xFF, 0xFF]).unwrap(), 65535.0);
    }

    #[test]
    fn test_decode_zero_is_a_real_value() {
        assert_eq!(decode_distance(&[0x00, 0x00]).unwrap(), 0.0);
    }

    #[test]
    fn test_decode_empty_fails() {
        let err = decode_distance(&[]).unwrap_err();
        assert_eq!(
            err,
            ParseError::InsufficientBytes {
                expected: 2,
                actual: 0
            }
        );
    }

    #[test]
    fn test_decode_single_byte_fails() {
        assert!(matches!(
            decode_distance(&[0x26]),
            Err(ParseError::InsufficientBytes { .. })
        ));
    }

    #[test]
    fn test_decode_big_endian_layout() {
        let layout = PayloadLayout::default().byte_order(ByteOrder::BigEndian);
        assert_eq!(layout.decode(&[0x02, 0x26]).unwrap(), 550.0);
    }

    #[test]
    fn test_decode_offset_and_scale() {
        // Distance in centimetres at offset 3: 55 cm = 550 mm
        let layout = PayloadLayout::default()
            .offset(3)
            .byte_order(ByteOrder::LittleEndian)
            .scale(10.0);
        assert_eq!(layout.required_len(), 5);
        assert_eq!(layout.decode(&[0xAA, 0xBB, 0xCC, 55, 0]).unwrap(), 550.0);
        assert!(layout.decode(&[0xAA, 0xBB, 0xCC, 55]).is_err());
    }

    #[test]
    fn test_decode_rejects_bad_scale() {
        for scale in [0.0, -1.0, f64::NAN] {
            let layout = PayloadLayout::default().scale(scale);
            assert!(matches!(
                layout.decode(&[1, 0]),
                Err(ParseError::InvalidValue(_))
            ));
        }
    }

    #[test]
    fn test_decode_huge_offset_does_not_overflow() {
        let layout = PayloadLayout::default().offset(usize::MAX);
        assert!(layout.decode(&[1, 2, 3]).is_err());
    }
}

/// Panic-safety checks for arbitrary payloads.
///
/// ```bash
/// cargo test -p tankfill-types payload::proptests
/// ```
#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// Decoding random bytes never panics and never invents a value
        /// for a payload shorter than the field.
        #[test]
        fn decode_never_panics(data: Vec<u8>) {
            match decode_distance(&data) {
                Ok(value) => {
                    prop_assert!(data.len() >= DISTANCE_FIELD_BYTES);
                    prop_assert!(value.is_finite());
                }
                Err(_) => prop_assert!(data.len() < DISTANCE_FIELD_BYTES),
            }
        }

        /// The default layout agrees with a plain little-endian read.
        #[test]
        fn decode_matches_u16_le(value: u16, tail in proptest::collection::vec(any::<u8>(), 0..8)) {
            let mut data = value.to_le_bytes().to_vec();
            data.extend(tail);
            prop_assert_eq!(decode_distance(&data).unwrap(), f64::from(value));
        }

        /// Arbitrary layouts never panic.
        #[test]
        fn layout_decode_never_panics(offset in 0usize..64, data: Vec<u8>) {
            let _ = PayloadLayout::default().offset(offset).decode(&data);
        }
    }
}
