use alloc::{string::String, vec::Vec};
use tracing::{debug, warn};

use super::{malformed, tag_list, text, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// Fields of EF.DG12, `None` when the chip does not store them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dg12Details {
    pub issuing_authority: Option<String>,
    /// `YYYYMMDD`.
    pub date_of_issue: Option<String>,
    pub endorsements_or_observations: Option<String>,
    pub tax_or_exit_requirements: Option<String>,
    /// Image of the front of the document.
    pub front_image: Option<Vec<u8>>,
    /// Image of the rear of the document.
    pub rear_image: Option<Vec<u8>>,
    /// `YYYYMMDDHHMMSS`.
    pub personalization_time: Option<String>,
    pub personalization_device_serial_number: Option<String>,
}

/// EF.DG12: additional document details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dg12 {
    raw: RawDataGroup,
    tags: Vec<u16>,
    details: Dg12Details,
}

impl Dg12 {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Dg12;
        let mut cursor = TlvCursor::new(raw.body());
        let tags = tag_list(cursor.expect_tlv(0x5C).map_err(malformed(id))?)
            .map_err(malformed(id))?;

        let mut details = Dg12Details::default();
        while !cursor.is_empty() {
            let (tag, value) = cursor.next_tlv().map_err(malformed(id))?;
            match tag {
                0x5F19 => details.issuing_authority = Some(text(value)),
                0x5F26 => details.date_of_issue = Some(text(value)),
                0xA0 => debug!("Skipping other persons template in EF.DG12"),
                0x5F1B => details.endorsements_or_observations = Some(text(value)),
                0x5F1C => details.tax_or_exit_requirements = Some(text(value)),
                0x5F1D => details.front_image = Some(value.to_vec()),
                0x5F1E => details.rear_image = Some(value.to_vec()),
                0x5F55 => details.personalization_time = Some(text(value)),
                0x5F56 => details.personalization_device_serial_number = Some(text(value)),
                _ => warn!("Skipping unknown tag {tag:02X} in EF.DG12"),
            }
        }

        Ok(Self { raw, tags, details })
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// Tags announced by the `5C` tag list.
    #[must_use]
    pub fn tags(&self) -> &[u16] {
        &self.tags
    }

    #[must_use]
    pub const fn details(&self) -> &Dg12Details {
        &self.details
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_dg12() -> Result<(), EmrtdError> {
        let bytes = hex!(
            "6C3D 5C095F195F26A05F1D5F55
             5F1903 55544F
             5F2608 3230313230343135
             A007 020101 5F5001 41
             5F1D04 FFD8FFD9
             5F550E 3230313230343135313230303030"
        )
        .to_vec();
        let dg12 = Dg12::decode(RawDataGroup::new(DataGroupId::Dg12, bytes)?)?;
        assert_eq!(dg12.tags(), [0x5F19, 0x5F26, 0xA0, 0x5F1D, 0x5F55]);
        let details = dg12.details();
        assert_eq!(details.issuing_authority.as_deref(), Some("UTO"));
        assert_eq!(details.date_of_issue.as_deref(), Some("20120415"));
        assert_eq!(details.front_image.as_deref(), Some(&hex!("FFD8FFD9")[..]));
        assert_eq!(details.rear_image, None);
        assert_eq!(details.personalization_time.as_deref(), Some("20120415120000"));
        assert_eq!(details.personalization_device_serial_number, None);
        Ok(())
    }

    #[test]
    fn test_decode_dg12_invalid() -> Result<(), EmrtdError> {
        let bytes = hex!("6C05 5F1903 55544F").to_vec();
        let result = Dg12::decode(RawDataGroup::new(DataGroupId::Dg12, bytes)?);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }
}
