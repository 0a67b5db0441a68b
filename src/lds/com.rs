use alloc::{format, string::String, vec::Vec};
use tracing::warn;

use super::{malformed, parse_error, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// EF.COM: LDS and Unicode versions and the list of present data groups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Com {
    raw: RawDataGroup,
    lds_version: String,
    unicode_version: String,
    data_groups: Vec<DataGroupId>,
}

/// Groups `digits` in pairs separated by dots, `"0107"` becomes `"01.07"`.
fn dotted_version(digits: &[u8], expected_len: usize) -> Result<String, EmrtdError> {
    if digits.len() != expected_len || !digits.iter().all(u8::is_ascii_digit) {
        return Err(parse_error(
            DataGroupId::Com,
            format!(
                "version must be {expected_len} ASCII digits, found {}",
                crate::bytes2hex(digits)
            ),
        ));
    }
    Ok(digits
        .chunks(2)
        .map(|pair| pair.iter().map(|&b| char::from(b)).collect::<String>())
        .collect::<Vec<_>>()
        .join("."))
}

impl Com {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Com;
        let mut cursor = TlvCursor::new(raw.body());

        let lds_version = dotted_version(cursor.expect_tlv(0x5F01).map_err(malformed(id))?, 4)?;
        let unicode_version =
            dotted_version(cursor.expect_tlv(0x5F36).map_err(malformed(id))?, 6)?;

        let mut data_groups = Vec::new();
        for &tag in cursor.expect_tlv(0x5C).map_err(malformed(id))? {
            match DataGroupId::from_tag(tag) {
                Some(dg) => data_groups.push(dg),
                None => warn!("Skipping unknown data group tag {tag:02X} in EF.COM"),
            }
        }

        Ok(Self {
            raw,
            lds_version,
            unicode_version,
            data_groups,
        })
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// LDS version as `AA.BB`.
    #[must_use]
    pub fn lds_version(&self) -> &str {
        &self.lds_version
    }

    /// Unicode version as `AA.BB.CC`.
    #[must_use]
    pub fn unicode_version(&self) -> &str {
        &self.unicode_version
    }

    #[must_use]
    pub fn data_groups(&self) -> &[DataGroupId] {
        &self.data_groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    #[test]
    fn test_decode_com() -> Result<(), EmrtdError> {
        // EF.COM of ICAO Doc 9303-11 Appendix D.4
        let raw = RawDataGroup::new(
            DataGroupId::Com,
            hex!("60145F0104303130365F36063034303030305C026175").to_vec(),
        )?;
        let com = Com::decode(raw)?;
        assert_eq!(com.lds_version(), "01.06");
        assert_eq!(com.unicode_version(), "04.00.00");
        assert_eq!(com.data_groups(), [DataGroupId::Dg1, DataGroupId::Dg2]);
        Ok(())
    }

    #[test]
    fn test_decode_com_unknown_tag() -> Result<(), EmrtdError> {
        let raw = RawDataGroup::new(
            DataGroupId::Com,
            hex!("60165F0104303130375F36063034303030305C0461427577").to_vec(),
        )?;
        let com = Com::decode(raw)?;
        assert_eq!(
            com.data_groups(),
            [DataGroupId::Dg1, DataGroupId::Dg2, DataGroupId::Sod]
        );
        Ok(())
    }

    #[test]
    fn test_decode_com_invalid() -> Result<(), EmrtdError> {
        // Unicode version before LDS version
        let raw = RawDataGroup::new(
            DataGroupId::Com,
            hex!("60145F36063034303030305F0104303130375C026175").to_vec(),
        )?;
        let result = Com::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        // Version is not numeric
        let raw = RawDataGroup::new(
            DataGroupId::Com,
            hex!("60145F010430313A375F36063034303030305C026175").to_vec(),
        )?;
        let result = Com::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        // Tag list missing
        let raw = RawDataGroup::new(
            DataGroupId::Com,
            hex!("60105F0104303130375F3606303430303030").to_vec(),
        )?;
        let result = Com::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }
}
