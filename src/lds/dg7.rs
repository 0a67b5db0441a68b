use alloc::vec::Vec;

use super::{malformed, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// EF.DG7: displayed signature or usual mark.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dg7 {
    raw: RawDataGroup,
    image: Vec<u8>,
}

impl Dg7 {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Dg7;
        let mut cursor = TlvCursor::new(raw.body());
        // Number of instances, only the first one is kept
        cursor.expect_tlv(0x02).map_err(malformed(id))?;
        let image = cursor.expect_tlv(0x5F43).map_err(malformed(id))?.to_vec();
        Ok(Self { raw, image })
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// Encoded signature image.
    #[must_use]
    pub fn image(&self) -> &[u8] {
        &self.image
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_dg7() -> Result<(), EmrtdError> {
        let raw = RawDataGroup::new(DataGroupId::Dg7, hex!("670A 020101 5F4304FFD8FFD9").to_vec())?;
        let dg7 = Dg7::decode(raw)?;
        assert_eq!(dg7.image(), hex!("FFD8FFD9"));
        Ok(())
    }

    #[test]
    fn test_decode_dg7_invalid() -> Result<(), EmrtdError> {
        let raw = RawDataGroup::new(DataGroupId::Dg7, hex!("6707 5F4304FFD8FFD9").to_vec())?;
        let result = Dg7::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        let raw = RawDataGroup::new(DataGroupId::Dg7, hex!("6703 020101").to_vec())?;
        let result = Dg7::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }
}
