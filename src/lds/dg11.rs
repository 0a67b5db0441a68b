use alloc::{string::String, vec::Vec};
use tracing::warn;

use super::{malformed, tag_list, text, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// Fields of EF.DG11, `None` when the chip does not store them.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Dg11Details {
    pub full_name: Option<String>,
    pub personal_number: Option<String>,
    pub place_of_birth: Option<String>,
    /// Full date of birth, `YYYYMMDD`.
    pub date_of_birth: Option<String>,
    pub address: Option<String>,
    pub telephone: Option<String>,
    pub profession: Option<String>,
    pub title: Option<String>,
    pub personal_summary: Option<String>,
    pub proof_of_citizenship: Option<String>,
    pub other_td_numbers: Option<String>,
    pub custody_information: Option<String>,
}

/// EF.DG11: additional personal details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dg11 {
    raw: RawDataGroup,
    tags: Vec<u16>,
    details: Dg11Details,
}

impl Dg11 {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Dg11;
        let mut cursor = TlvCursor::new(raw.body());
        let tags = tag_list(cursor.expect_tlv(0x5C).map_err(malformed(id))?)
            .map_err(malformed(id))?;

        let mut details = Dg11Details::default();
        while !cursor.is_empty() {
            let (tag, value) = cursor.next_tlv().map_err(malformed(id))?;
            let slot = match tag {
                0x5F0E => &mut details.full_name,
                0x5F10 => &mut details.personal_number,
                0x5F11 => &mut details.place_of_birth,
                0x5F2B => &mut details.date_of_birth,
                0x5F42 => &mut details.address,
                0x5F12 => &mut details.telephone,
                0x5F13 => &mut details.profession,
                0x5F14 => &mut details.title,
                0x5F15 => &mut details.personal_summary,
                0x5F16 => &mut details.proof_of_citizenship,
                0x5F17 => &mut details.other_td_numbers,
                0x5F18 => &mut details.custody_information,
                _ => {
                    warn!("Skipping unknown tag {tag:02X} in EF.DG11");
                    continue;
                }
            };
            *slot = Some(text(value));
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
    pub const fn details(&self) -> &Dg11Details {
        &self.details
    }
}
