use alloc::vec::Vec;
use tracing::debug;

use super::{malformed, parse_error, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// ISO/IEC 19794-5 facial record header, format identifier and version.
const FACIAL_RECORD_HEADER: &[u8] = b"FAC\x00010\x00";
// Facial record header, facial information and image information
const FACIAL_RECORD_PREAMBLE_LEN: usize = 14 + 20 + 12;

/// EF.DG2: encoded face of the holder.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dg2 {
    raw: RawDataGroup,
    image_count: u8,
    face_image: Vec<u8>,
}

impl Dg2 {
    /// Walks ICAO Doc 9303-10 Section 4.7.2 down to the first face image.
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Dg2;

        // Biometric Information Template Group Template
        let group = TlvCursor::new(raw.body())
            .expect_tlv(0x7F61)
            .map_err(malformed(id))?;
        let mut group = TlvCursor::new(group);

        let image_count = match group.expect_tlv(0x02).map_err(malformed(id))? {
            &[count] if count >= 1 => count,
            _ => {
                return Err(parse_error(id, "must contain at least one face image"));
            }
        };
        debug!("EF.DG2 holds {image_count} face images, decoding the first");

        // Only the first instance is decoded
        let instance = group.expect_tlv(0x7F60).map_err(malformed(id))?;
        let mut instance = TlvCursor::new(instance);
        // Biometric Header Template is skipped
        instance.expect_tlv(0xA1).map_err(malformed(id))?;

        let (tag, biometric_data) = instance.next_tlv().map_err(malformed(id))?;
        if tag != 0x5F2E && tag != 0x7F2E {
            return Err(parse_error(
                id,
                alloc::format!("biometric data block tag must be 5F2E or 7F2E, found {tag:02X}"),
            ));
        }
        if biometric_data.is_empty() {
            return Err(parse_error(id, "first biometric image must not be empty"));
        }

        let face_image = if biometric_data.starts_with(FACIAL_RECORD_HEADER) {
            biometric_data
                .get(FACIAL_RECORD_PREAMBLE_LEN..)
                .ok_or_else(|| parse_error(id, "invalid facial record structure"))?
        } else {
            biometric_data
        }
        .to_vec();

        Ok(Self {
            raw,
            image_count,
            face_image,
        })
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// Number of face images announced by the template group.
    #[must_use]
    pub const fn image_count(&self) -> u8 {
        self.image_count
    }

    /// The first face image, JPEG or JPEG 2000, without its facial record header.
    #[must_use]
    pub fn face_image(&self) -> &[u8] {
        &self.face_image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_dg2_facial_record() -> Result<(), EmrtdError> {
        let mut record = FACIAL_RECORD_HEADER.to_vec();
        record.resize(FACIAL_RECORD_PREAMBLE_LEN, 0x00);
        record.extend_from_slice(&hex!("FFD8FFE0FFD9"));
        assert_eq!(record.len(), 52);

        let mut bytes = hex!("7546 7F6143 020101 7F603D A10480020101 5F2E34").to_vec();
        bytes.extend_from_slice(&record);
        let dg2 = Dg2::decode(RawDataGroup::new(DataGroupId::Dg2, bytes)?)?;
        assert_eq!(dg2.image_count(), 1);
        assert_eq!(dg2.face_image(), hex!("FFD8FFE0FFD9"));
        Ok(())
    }

    #[test]
    fn test_decode_dg2_bare_image() -> Result<(), EmrtdError> {
        let bytes = hex!("751B 7F6118 020102 7F600F A10480020101 7F2E06FFD8FFE0FFD9 7F6000").to_vec();
        let dg2 = Dg2::decode(RawDataGroup::new(DataGroupId::Dg2, bytes)?)?;
        assert_eq!(dg2.image_count(), 2);
        assert_eq!(dg2.face_image(), hex!("FFD8FFE0FFD9"));
        Ok(())
    }

    #[test]
    fn test_decode_dg2_invalid() -> Result<(), EmrtdError> {
        // No face images
        let bytes = hex!("7509 7F6106 020100 7F6000").to_vec();
        let result = Dg2::decode(RawDataGroup::new(DataGroupId::Dg2, bytes)?);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        // Unknown biometric data block
        let bytes = hex!("7514 7F6111 020101 7F600B A10480020101 5F2F02FFD8").to_vec();
        let result = Dg2::decode(RawDataGroup::new(DataGroupId::Dg2, bytes)?);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        // Facial record header without the rest of the record
        let bytes = hex!("751A 7F6117 020101 7F6011 A10480020101 5F2E08 4641430030313000").to_vec();
        let result = Dg2::decode(RawDataGroup::new(DataGroupId::Dg2, bytes)?);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }
}
