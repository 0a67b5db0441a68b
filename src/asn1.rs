//! Minimal BER-TLV reader for the definite length forms used by the LDS.

use alloc::vec::Vec;
use tracing::error;

use crate::error::Asn1Error;

/// Returns the number of bytes taken by the tag starting with `first`.
///
/// A first byte whose low five bits are all set announces a two byte tag
/// (`5F1F`, `7F61`, ...).
#[must_use]
pub const fn tag_len(first: u8) -> usize {
    if first & 0x1F == 0x1F {
        2
    } else {
        1
    }
}

/// Decodes an ASN.1 definite length.
///
/// # Arguments
///
/// * `data` - Bytes starting at the length field.
///
/// # Returns
///
/// A tuple of the decoded length and the number of bytes the length field used.
///
/// # Errors
///
/// * `Asn1Error::InvalidLength` for any first byte other than `00..7F`, `81` and `82`.
/// * `Asn1Error::Truncated` if the length field is cut short.
///
/// # Examples
///
/// ```
/// use emrtd_bac::asn1::decode_length;
///
/// assert_eq!(decode_length(&[0x5A]), Ok((0x5A, 1)));
/// assert_eq!(decode_length(&[0x81, 0xC8]), Ok((0xC8, 2)));
/// assert_eq!(decode_length(&[0x82, 0x01, 0x2C, 0xFF]), Ok((300, 3)));
/// assert!(decode_length(&[0x83, 0, 0, 0]).is_err());
/// ```
pub fn decode_length(data: &[u8]) -> Result<(usize, usize), Asn1Error> {
    let Some(&first) = data.first() else {
        error!("Can not decode ASN.1 length from empty data");
        return Err(Asn1Error::Truncated {
            expected: 1,
            found: 0,
        });
    };

    let consumed = match first {
        0x00..=0x7F => return Ok((usize::from(first), 1)),
        0x81 => 2,
        0x82 => 3,
        _ => {
            error!("Unsupported ASN.1 length byte {first:02X}");
            return Err(Asn1Error::InvalidLength(first));
        }
    };

    if data.len() < consumed {
        error!(
            "ASN.1 length field is incomplete, expected len: {consumed}, found len: {}",
            data.len()
        );
        return Err(Asn1Error::Truncated {
            expected: consumed,
            found: data.len(),
        });
    }

    let length = data[1..consumed]
        .iter()
        .fold(0_usize, |acc, &b| (acc << 8) | usize::from(b));
    Ok((length, consumed))
}

/// Encodes a length in the shortest ASN.1 definite form.
///
/// # Errors
///
/// * `Asn1Error::InvalidValue` if `length` is greater than `0xFFFF`.
///
/// # Examples
///
/// ```
/// use emrtd_bac::asn1::encode_length;
///
/// assert_eq!(encode_length(0x2A), Ok(vec![0x2A]));
/// assert_eq!(encode_length(0x80), Ok(vec![0x81, 0x80]));
/// assert_eq!(encode_length(0x1234), Ok(vec![0x82, 0x12, 0x34]));
/// ```
pub fn encode_length(length: usize) -> Result<Vec<u8>, Asn1Error> {
    match length {
        0..=0x7F => Ok(vec![length as u8]),
        0x80..=0xFF => Ok(vec![0x81, length as u8]),
        0x100..=0xFFFF => Ok(vec![0x82, (length >> 8) as u8, length as u8]),
        _ => {
            error!("Length {length} does not fit a 3 byte ASN.1 length");
            Err(Asn1Error::InvalidValue(length))
        }
    }
}

/// Forward-only cursor over a TLV encoded buffer.
///
/// The cursor does not know which tags are valid where; decoders check that.
#[derive(Debug, Clone)]
pub struct TlvCursor<'a> {
    buffer: &'a [u8],
    pos: usize,
}

impl<'a> TlvCursor<'a> {
    #[must_use]
    pub const fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, pos: 0 }
    }

    #[must_use]
    pub const fn position(&self) -> usize {
        self.pos
    }

    #[must_use]
    pub fn remaining(&self) -> &'a [u8] {
        &self.buffer[self.pos..]
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pos >= self.buffer.len()
    }

    /// Consumes exactly `len` bytes.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::Truncated` if fewer than `len` bytes remain.
    pub fn take(&mut self, len: usize) -> Result<&'a [u8], Asn1Error> {
        let rest = self.remaining();
        if rest.len() < len {
            error!(
                "TLV data is incomplete at offset {}, expected len: {len}, found len: {}",
                self.pos,
                rest.len()
            );
            return Err(Asn1Error::Truncated {
                expected: len,
                found: rest.len(),
            });
        }
        self.pos += len;
        Ok(&rest[..len])
    }

    /// Returns the tag at the cursor without consuming it.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::Truncated` at the end of the buffer.
    pub fn peek_tag(&self) -> Result<u16, Asn1Error> {
        self.clone().next_tag()
    }

    /// Reads a one or two byte tag.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::Truncated` at the end of the buffer.
    pub fn next_tag(&mut self) -> Result<u16, Asn1Error> {
        let first = *self.remaining().first().ok_or(Asn1Error::Truncated {
            expected: 1,
            found: 0,
        })?;
        let bytes = self.take(tag_len(first))?;
        Ok(bytes.iter().fold(0_u16, |acc, &b| (acc << 8) | u16::from(b)))
    }

    /// Reads a definite length field.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::InvalidLength` or `Asn1Error::Truncated`.
    pub fn next_length(&mut self) -> Result<usize, Asn1Error> {
        let (length, consumed) = decode_length(self.remaining())?;
        self.pos += consumed;
        Ok(length)
    }

    /// Reads a length field and the value it announces.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::InvalidLength` or `Asn1Error::Truncated`.
    pub fn next_value(&mut self) -> Result<&'a [u8], Asn1Error> {
        let length = self.next_length()?;
        self.take(length)
    }

    /// Reads a complete TLV and returns its tag and value.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::InvalidLength` or `Asn1Error::Truncated`.
    pub fn next_tlv(&mut self) -> Result<(u16, &'a [u8]), Asn1Error> {
        let tag = self.next_tag()?;
        let value = self.next_value()?;
        Ok((tag, value))
    }

    /// Reads a TLV that must carry `expected` as its tag.
    ///
    /// # Errors
    ///
    /// * `Asn1Error::InvalidTag` if another tag is found.
    /// * `Asn1Error::InvalidLength` or `Asn1Error::Truncated`.
    pub fn expect_tlv(&mut self, expected: u16) -> Result<&'a [u8], Asn1Error> {
        let found = self.next_tag()?;
        if found != expected {
            error!("Invalid tag, expected: {expected:02X}, found: {found:02X}");
            return Err(Asn1Error::InvalidTag { expected, found });
        }
        self.next_value()
    }
}

/// Checks the outer tag of `data` and returns its value.
///
/// # Errors
///
/// * `Asn1Error::InvalidTag` if the outer tag is not `expected`.
/// * `Asn1Error::InvalidLength` or `Asn1Error::Truncated`.
///
/// # Examples
///
/// ```
/// use emrtd_bac::asn1::unwrap_tlv;
///
/// assert_eq!(unwrap_tlv(&[0x60, 0x02, 0xAA, 0xBB], 0x60), Ok(&[0xAA, 0xBB][..]));
/// assert!(unwrap_tlv(&[0x61, 0x02, 0xAA, 0xBB], 0x60).is_err());
/// ```
pub fn unwrap_tlv(data: &[u8], expected: u16) -> Result<&[u8], Asn1Error> {
    TlvCursor::new(data).expect_tlv(expected)
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_length_valid_input() -> Result<(), Asn1Error> {
        assert_eq!(decode_length(&hex!("00"))?, (0, 1));
        assert_eq!(decode_length(&hex!("7F"))?, (0x7F, 1));
        assert_eq!(decode_length(&hex!("8180"))?, (0x80, 2));
        assert_eq!(decode_length(&hex!("82FFFF"))?, (0xFFFF, 3));
        assert_eq!(decode_length(&hex!("8201F4 AABB"))?, (500, 3));
        Ok(())
    }

    #[test]
    fn test_decode_length_invalid_input() {
        assert_eq!(decode_length(&hex!("80")), Err(Asn1Error::InvalidLength(0x80)));
        assert_eq!(
            decode_length(&hex!("83010000")),
            Err(Asn1Error::InvalidLength(0x83))
        );
        assert_eq!(
            decode_length(&hex!("82FF")),
            Err(Asn1Error::Truncated {
                expected: 3,
                found: 2
            })
        );
        assert!(decode_length(&[]).is_err());
    }

    #[test]
    fn test_encode_length_round_trip() -> Result<(), Asn1Error> {
        for n in 0..=0xFFFF_usize {
            let encoded = encode_length(n)?;
            assert_eq!(decode_length(&encoded)?, (n, encoded.len()));
        }
        assert_eq!(encode_length(0x10000), Err(Asn1Error::InvalidValue(0x10000)));
        Ok(())
    }

    #[test]
    fn test_cursor_walk() -> Result<(), Asn1Error> {
        // EF.COM from ICAO Doc 9303-11 Appendix D.4
        let com = hex!("60145F0104303130365F36063034303030305C026175");
        let mut outer = TlvCursor::new(&com);
        assert_eq!(outer.next_tag()?, 0x60);
        let body = outer.next_value()?;
        assert!(outer.is_empty());

        let mut cursor = TlvCursor::new(body);
        assert_eq!(cursor.peek_tag()?, 0x5F01);
        assert_eq!(cursor.next_tlv()?, (0x5F01, &b"0106"[..]));
        assert_eq!(cursor.expect_tlv(0x5F36)?, b"040000");
        assert_eq!(
            cursor.clone().expect_tlv(0x5F36),
            Err(Asn1Error::InvalidTag {
                expected: 0x5F36,
                found: 0x5C
            })
        );
        assert_eq!(cursor.expect_tlv(0x5C)?, &hex!("6175"));
        assert!(cursor.is_empty());
        assert!(cursor.next_tag().is_err());
        Ok(())
    }

    #[test]
    fn test_cursor_truncated_value() {
        let mut cursor = TlvCursor::new(&hex!("5F1F05414243"));
        assert_eq!(
            cursor.next_tlv(),
            Err(Asn1Error::Truncated {
                expected: 5,
                found: 3
            })
        );
    }

    #[test]
    fn test_tag_len() {
        assert_eq!(tag_len(0x5F), 2);
        assert_eq!(tag_len(0x7F), 2);
        assert_eq!(tag_len(0x61), 1);
        assert_eq!(tag_len(0x6F), 1);
        assert_eq!(tag_len(0xA1), 1);
    }
}
