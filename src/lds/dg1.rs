use alloc::{format, string::String, vec::Vec};
use core::ops::Range;
use tracing::debug;

use super::{malformed, parse_error, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError, mrz::split_names};

/// Layout of the MRZ stored in EF.DG1, chosen by its length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MrzLayout {
    /// Three lines of 30 characters.
    Td1,
    /// Two lines of 36 characters.
    Td2,
    /// Two lines of 44 characters.
    Other,
}

/// EF.DG1: the MRZ as stored on the chip, split into its data elements.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dg1 {
    raw: RawDataGroup,
    mrz: String,
    layout: MrzLayout,
    document_code: String,
    issuing_state: String,
    document_number: String,
    document_number_check: String,
    date_of_birth: String,
    date_of_birth_check: String,
    sex: String,
    date_of_expiry: String,
    date_of_expiry_check: String,
    nationality: String,
    optional_data: String,
    optional_data_check: Option<String>,
    composite_check: String,
    name: String,
}

fn field(mrz: &str, range: Range<usize>) -> Result<String, EmrtdError> {
    mrz.get(range.clone()).map(String::from).ok_or_else(|| {
        parse_error(
            DataGroupId::Dg1,
            format!("MRZ of {} characters has no field at {range:?}", mrz.len()),
        )
    })
}

impl Dg1 {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Dg1;
        let value = TlvCursor::new(raw.body())
            .expect_tlv(0x5F1F)
            .map_err(malformed(id))?;
        if !value.is_ascii() {
            return Err(parse_error(id, "MRZ contains non ASCII characters"));
        }
        let mrz = super::text(value);

        let layout = match value.len() {
            0x5A => MrzLayout::Td1,
            0x48 => MrzLayout::Td2,
            _ => MrzLayout::Other,
        };
        debug!("EF.DG1 holds a {layout:?} MRZ of {} characters", mrz.len());

        let m = mrz.as_str();
        let dg1 = match layout {
            MrzLayout::Td1 => Self {
                document_code: field(m, 0..2)?,
                issuing_state: field(m, 2..5)?,
                document_number: field(m, 5..14)?,
                document_number_check: field(m, 14..15)?,
                optional_data: field(m, 15..30)? + &field(m, 48..59)?,
                date_of_birth: field(m, 30..36)?,
                date_of_birth_check: field(m, 36..37)?,
                sex: field(m, 37..38)?,
                date_of_expiry: field(m, 38..44)?,
                date_of_expiry_check: field(m, 44..45)?,
                nationality: field(m, 45..48)?,
                optional_data_check: None,
                composite_check: field(m, 59..60)?,
                name: field(m, 60..90)?,
                raw,
                layout,
                mrz: mrz.clone(),
            },
            MrzLayout::Td2 => Self {
                document_code: field(m, 0..2)?,
                issuing_state: field(m, 2..5)?,
                name: field(m, 5..36)?,
                document_number: field(m, 36..45)?,
                document_number_check: field(m, 45..46)?,
                nationality: field(m, 46..49)?,
                date_of_birth: field(m, 49..55)?,
                date_of_birth_check: field(m, 55..56)?,
                sex: field(m, 56..57)?,
                date_of_expiry: field(m, 57..63)?,
                date_of_expiry_check: field(m, 63..64)?,
                optional_data: field(m, 64..71)?,
                optional_data_check: None,
                composite_check: field(m, 71..72)?,
                raw,
                layout,
                mrz: mrz.clone(),
            },
            MrzLayout::Other => Self {
                document_code: field(m, 0..2)?,
                issuing_state: field(m, 2..5)?,
                name: field(m, 5..44)?,
                document_number: field(m, 44..53)?,
                document_number_check: field(m, 53..54)?,
                nationality: field(m, 54..57)?,
                date_of_birth: field(m, 57..63)?,
                date_of_birth_check: field(m, 63..64)?,
                sex: field(m, 64..65)?,
                date_of_expiry: field(m, 65..71)?,
                date_of_expiry_check: field(m, 71..72)?,
                optional_data: field(m, 72..86)?,
                optional_data_check: Some(field(m, 86..87)?),
                composite_check: field(m, 87..88)?,
                raw,
                layout,
                mrz: mrz.clone(),
            },
        };
        Ok(dg1)
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// The MRZ characters without line breaks.
    #[must_use]
    pub fn mrz(&self) -> &str {
        &self.mrz
    }

    #[must_use]
    pub const fn layout(&self) -> MrzLayout {
        self.layout
    }

    /// Tag `5F03`.
    #[must_use]
    pub fn document_code(&self) -> &str {
        &self.document_code
    }

    /// Tag `5F28`.
    #[must_use]
    pub fn issuing_state(&self) -> &str {
        &self.issuing_state
    }

    /// Tag `5A`.
    #[must_use]
    pub fn document_number(&self) -> &str {
        &self.document_number
    }

    /// Tag `5F04`.
    #[must_use]
    pub fn document_number_check(&self) -> &str {
        &self.document_number_check
    }

    /// Tag `5F57`, `YYMMDD`.
    #[must_use]
    pub fn date_of_birth(&self) -> &str {
        &self.date_of_birth
    }

    /// Tag `5F05`.
    #[must_use]
    pub fn date_of_birth_check(&self) -> &str {
        &self.date_of_birth_check
    }

    /// Tag `5F35`.
    #[must_use]
    pub fn sex(&self) -> &str {
        &self.sex
    }

    /// Tag `59`, `YYMMDD`.
    #[must_use]
    pub fn date_of_expiry(&self) -> &str {
        &self.date_of_expiry
    }

    /// Tag `5F06`.
    #[must_use]
    pub fn date_of_expiry_check(&self) -> &str {
        &self.date_of_expiry_check
    }

    /// Tag `5F2C`.
    #[must_use]
    pub fn nationality(&self) -> &str {
        &self.nationality
    }

    /// Tag `53`. Both optional data fields concatenated for TD1.
    #[must_use]
    pub fn optional_data(&self) -> &str {
        &self.optional_data
    }

    /// Tag `5F02`, only present in the 44 character layout.
    #[must_use]
    pub fn optional_data_check(&self) -> Option<&str> {
        self.optional_data_check.as_deref()
    }

    /// Tag `5F07`.
    #[must_use]
    pub fn composite_check(&self) -> &str {
        &self.composite_check
    }

    /// Tag `5B`, name of the holder with fillers.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn last_name(&self) -> String {
        split_names(&self.name).0
    }

    #[must_use]
    pub fn first_names(&self) -> Vec<String> {
        split_names(&self.name).1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::vec;

    fn ef_dg1(mrz: &str) -> Result<RawDataGroup, EmrtdError> {
        let len = u8::try_from(mrz.len()).map_err(EmrtdError::IntCastError)?;
        let mut bytes = vec![0x61, len + 3, 0x5F, 0x1F, len];
        bytes.extend_from_slice(mrz.as_bytes());
        RawDataGroup::new(DataGroupId::Dg1, bytes)
    }

    #[test]
    fn test_decode_td3() -> Result<(), EmrtdError> {
        let dg1 = Dg1::decode(ef_dg1(
            "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\
             L898902C36UTO7408122F1204159ZE184226B<<<<<10",
        )?)?;
        assert_eq!(dg1.layout(), MrzLayout::Other);
        assert_eq!(dg1.document_code(), "P<");
        assert_eq!(dg1.issuing_state(), "UTO");
        assert_eq!(dg1.name(), "ERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<");
        assert_eq!(dg1.document_number(), "L898902C3");
        assert_eq!(dg1.document_number_check(), "6");
        assert_eq!(dg1.nationality(), "UTO");
        assert_eq!(dg1.date_of_birth(), "740812");
        assert_eq!(dg1.date_of_birth_check(), "2");
        assert_eq!(dg1.sex(), "F");
        assert_eq!(dg1.date_of_expiry(), "120415");
        assert_eq!(dg1.date_of_expiry_check(), "9");
        assert_eq!(dg1.optional_data(), "ZE184226B<<<<<");
        assert_eq!(dg1.optional_data_check(), Some("1"));
        assert_eq!(dg1.composite_check(), "0");
        assert_eq!(dg1.last_name(), "ERIKSSON");
        assert_eq!(dg1.first_names(), ["ANNA", "MARIA"]);
        Ok(())
    }

    #[test]
    fn test_decode_td1() -> Result<(), EmrtdError> {
        let dg1 = Dg1::decode(ef_dg1(
            "I<UTOD231458907<<<<<<<<<<<<<<<\
             7408122F1204159UTO<<<<<<<<<<<6\
             ERIKSSON<<ANNA<MARIA<<<<<<<<<<",
        )?)?;
        assert_eq!(dg1.layout(), MrzLayout::Td1);
        assert_eq!(dg1.document_code(), "I<");
        assert_eq!(dg1.issuing_state(), "UTO");
        assert_eq!(dg1.document_number(), "D23145890");
        assert_eq!(dg1.document_number_check(), "7");
        assert_eq!(dg1.optional_data(), "<".repeat(26));
        assert_eq!(dg1.date_of_birth(), "740812");
        assert_eq!(dg1.date_of_birth_check(), "2");
        assert_eq!(dg1.sex(), "F");
        assert_eq!(dg1.date_of_expiry(), "120415");
        assert_eq!(dg1.date_of_expiry_check(), "9");
        assert_eq!(dg1.nationality(), "UTO");
        assert_eq!(dg1.optional_data_check(), None);
        assert_eq!(dg1.composite_check(), "6");
        assert_eq!(dg1.last_name(), "ERIKSSON");
        assert_eq!(dg1.first_names(), ["ANNA", "MARIA"]);
        Ok(())
    }

    #[test]
    fn test_decode_td2() -> Result<(), EmrtdError> {
        let dg1 = Dg1::decode(ef_dg1(
            "I<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<\
             D231458907UTO7408122F1204159<<<<<<<6",
        )?)?;
        assert_eq!(dg1.layout(), MrzLayout::Td2);
        assert_eq!(dg1.name(), "ERIKSSON<<ANNA<MARIA<<<<<<<<<<<");
        assert_eq!(dg1.document_number(), "D23145890");
        assert_eq!(dg1.document_number_check(), "7");
        assert_eq!(dg1.nationality(), "UTO");
        assert_eq!(dg1.date_of_birth(), "740812");
        assert_eq!(dg1.sex(), "F");
        assert_eq!(dg1.date_of_expiry(), "120415");
        assert_eq!(dg1.optional_data(), "<<<<<<<");
        assert_eq!(dg1.composite_check(), "6");
        Ok(())
    }

    #[test]
    fn test_decode_short_mrz() -> Result<(), EmrtdError> {
        let result = Dg1::decode(ef_dg1("P<UTOERIKSSON<<ANNA")?);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }

    #[test]
    fn test_decode_wrong_tag() -> Result<(), EmrtdError> {
        let raw = RawDataGroup::new(DataGroupId::Dg1, alloc::vec![0x61, 0x04, 0x5F, 0x20, 0x01, 0x41])?;
        let result = Dg1::decode(raw);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }
}
