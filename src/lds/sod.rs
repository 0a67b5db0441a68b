use alloc::vec::Vec;
use tracing::debug;

use super::{malformed, parse_error, DataGroupId, RawDataGroup};
use crate::{asn1::TlvCursor, error::EmrtdError};

/// EF.SOD: the document security object, kept as an opaque PKCS#7 blob.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sod {
    raw: RawDataGroup,
    pkcs7: Vec<u8>,
}

impl Sod {
    pub(crate) fn decode(raw: RawDataGroup) -> Result<Self, EmrtdError> {
        let id = DataGroupId::Sod;
        let body = raw.body();
        let mut cursor = TlvCursor::new(body);
        let tag = cursor.next_tag().map_err(malformed(id))?;
        if tag != 0x30 {
            return Err(parse_error(
                id,
                alloc::format!("ContentInfo must be a SEQUENCE, found tag {tag:02X}"),
            ));
        }
        cursor.next_value().map_err(malformed(id))?;
        let pkcs7 = body[..cursor.position()].to_vec();
        debug!("EF.SOD holds a {} byte signed data structure", pkcs7.len());
        Ok(Self { raw, pkcs7 })
    }

    #[must_use]
    pub const fn raw(&self) -> &RawDataGroup {
        &self.raw
    }

    /// DER encoded CMS `ContentInfo` wrapping the signed data.
    #[must_use]
    pub fn pkcs7(&self) -> &[u8] {
        &self.pkcs7
    }
}
