//! Logical Data Structure, ICAO Doc 9303-10.
//!
//! Every data group is kept with its raw bytes so that the caller can hash
//! it against the document security object.

mod com;
mod dg1;
mod dg11;
mod dg12;
mod dg2;
mod dg7;
mod sod;

use alloc::{format, string::String, vec::Vec};
use core::{fmt, ops::Range};
use sha2::{Digest, Sha224, Sha256, Sha384, Sha512};
use tracing::{debug, error, warn};

use crate::{
    asn1::TlvCursor,
    crypto::sha1,
    error::{Asn1Error, EmrtdError},
};

pub use self::{
    com::Com,
    dg1::{Dg1, MrzLayout},
    dg11::{Dg11, Dg11Details},
    dg12::Dg12,
    dg2::Dg2,
    dg7::Dg7,
    sod::Sod,
};

/// Elementary files of the LDS1 application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DataGroupId {
    Com,
    Dg1,
    Dg2,
    Dg3,
    Dg4,
    Dg5,
    Dg6,
    Dg7,
    Dg8,
    Dg9,
    Dg10,
    Dg11,
    Dg12,
    Dg13,
    Dg14,
    Dg15,
    Dg16,
    Sod,
}

// (id, tag, file identifier, name)
const DATA_GROUPS: [(DataGroupId, u8, [u8; 2], &str); 18] = [
    (DataGroupId::Com, 0x60, [0x01, 0x1E], "EF.COM"),
    (DataGroupId::Dg1, 0x61, [0x01, 0x01], "EF.DG1"),
    (DataGroupId::Dg2, 0x75, [0x01, 0x02], "EF.DG2"),
    (DataGroupId::Dg3, 0x63, [0x01, 0x03], "EF.DG3"),
    (DataGroupId::Dg4, 0x76, [0x01, 0x04], "EF.DG4"),
    (DataGroupId::Dg5, 0x65, [0x01, 0x05], "EF.DG5"),
    (DataGroupId::Dg6, 0x66, [0x01, 0x06], "EF.DG6"),
    (DataGroupId::Dg7, 0x67, [0x01, 0x07], "EF.DG7"),
    (DataGroupId::Dg8, 0x68, [0x01, 0x08], "EF.DG8"),
    (DataGroupId::Dg9, 0x69, [0x01, 0x09], "EF.DG9"),
    (DataGroupId::Dg10, 0x6A, [0x01, 0x0A], "EF.DG10"),
    (DataGroupId::Dg11, 0x6B, [0x01, 0x0B], "EF.DG11"),
    (DataGroupId::Dg12, 0x6C, [0x01, 0x0C], "EF.DG12"),
    (DataGroupId::Dg13, 0x6D, [0x01, 0x0D], "EF.DG13"),
    (DataGroupId::Dg14, 0x6E, [0x01, 0x0E], "EF.DG14"),
    (DataGroupId::Dg15, 0x6F, [0x01, 0x0F], "EF.DG15"),
    (DataGroupId::Dg16, 0x70, [0x01, 0x10], "EF.DG16"),
    (DataGroupId::Sod, 0x77, [0x01, 0x1D], "EF.SOD"),
];

impl DataGroupId {
    /// Every elementary file known to the reader.
    pub const ALL: [Self; 18] = [
        Self::Com,
        Self::Dg1,
        Self::Dg2,
        Self::Dg3,
        Self::Dg4,
        Self::Dg5,
        Self::Dg6,
        Self::Dg7,
        Self::Dg8,
        Self::Dg9,
        Self::Dg10,
        Self::Dg11,
        Self::Dg12,
        Self::Dg13,
        Self::Dg14,
        Self::Dg15,
        Self::Dg16,
        Self::Sod,
    ];

    const fn entry(self) -> (DataGroupId, u8, [u8; 2], &'static str) {
        DATA_GROUPS[self as usize]
    }

    /// Outer tag of the file contents.
    #[must_use]
    pub const fn tag(self) -> u8 {
        self.entry().1
    }

    /// File identifier used with `SELECT`.
    #[must_use]
    pub const fn file_id(self) -> [u8; 2] {
        self.entry().2
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        self.entry().3
    }

    /// Looks up a data group by the tag listed in EF.COM.
    ///
    /// # Examples
    ///
    /// ```
    /// use emrtd_bac::DataGroupId;
    ///
    /// assert_eq!(DataGroupId::from_tag(0x75), Some(DataGroupId::Dg2));
    /// assert_eq!(DataGroupId::from_tag(0x42), None);
    /// ```
    #[must_use]
    pub fn from_tag(tag: u8) -> Option<Self> {
        DATA_GROUPS
            .iter()
            .find(|(_, t, _, _)| *t == tag)
            .map(|(id, _, _, _)| *id)
    }
}

impl fmt::Display for DataGroupId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Hash functions a document security object may use.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HashAlgorithm {
    Sha1,
    Sha224,
    Sha256,
    Sha384,
    Sha512,
}

pub(crate) fn parse_error(id: DataGroupId, reason: impl fmt::Display) -> EmrtdError {
    error!("{id} can not be decoded: {reason}");
    EmrtdError::DataGroupParseError(format!("{id}: {reason}"))
}

/// `map_err` adapter turning codec errors into `DataGroupParseError`.
pub(crate) fn malformed<E: fmt::Display>(id: DataGroupId) -> impl Fn(E) -> EmrtdError {
    move |err| parse_error(id, err)
}

pub(crate) fn text(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

/// Splits the value of a `5C` tag list into the tags it announces.
pub(crate) fn tag_list(value: &[u8]) -> Result<Vec<u16>, Asn1Error> {
    let mut cursor = TlvCursor::new(value);
    let mut tags = Vec::new();
    while !cursor.is_empty() {
        tags.push(cursor.next_tag()?);
    }
    Ok(tags)
}

/// Raw contents of a data group with the outer tag already checked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDataGroup {
    id: DataGroupId,
    bytes: Vec<u8>,
    body: Range<usize>,
}

impl RawDataGroup {
    /// Checks the outer tag and length of `bytes`.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::DataGroupParseError` if the outer tag is not the one of
    ///   `id` or the declared length runs past the data.
    pub fn new(id: DataGroupId, bytes: Vec<u8>) -> Result<Self, EmrtdError> {
        let body = {
            let mut cursor = TlvCursor::new(&bytes);
            let tag = cursor.next_tag().map_err(malformed(id))?;
            if tag != u16::from(id.tag()) {
                return Err(parse_error(
                    id,
                    format!("outer tag must be {:02X}, found {tag:02X}", id.tag()),
                ));
            }
            let length = cursor.next_length().map_err(malformed(id))?;
            let start = cursor.position();
            cursor.take(length).map_err(malformed(id))?;
            if !cursor.is_empty() {
                warn!(
                    "{id} has {} bytes after its declared length",
                    cursor.remaining().len()
                );
            }
            start..cursor.position()
        };
        Ok(Self { id, bytes, body })
    }

    #[must_use]
    pub const fn id(&self) -> DataGroupId {
        self.id
    }

    /// The whole data group, outer tag and length included.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// The value of the outer TLV.
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.bytes[self.body.clone()]
    }

    #[must_use]
    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }
}

/// A decoded data group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataGroup {
    Com(Com),
    Dg1(Dg1),
    Dg2(Dg2),
    Dg7(Dg7),
    Dg11(Dg11),
    Dg12(Dg12),
    Sod(Sod),
    /// Any data group without a dedicated decoder.
    Generic(RawDataGroup),
}

impl DataGroup {
    /// Decodes the contents of the elementary file `id`.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::DataGroupParseError` on the first tag mismatch or
    ///   out of bounds field.
    ///
    /// # Examples
    ///
    /// ```
    /// # use emrtd_bac::EmrtdError;
    /// #
    /// # fn main() -> Result<(), EmrtdError> {
    /// use emrtd_bac::{DataGroup, DataGroupId};
    ///
    /// let ef_com = b"\x60\x14\x5F\x01\x04\x30\x31\x30\x37\x5F\x36\x06\x30\x34\x30\x30\x30\x30\x5C\x02\x61\x75";
    /// let DataGroup::Com(com) = DataGroup::decode(DataGroupId::Com, ef_com.to_vec())? else {
    ///     unreachable!()
    /// };
    /// assert_eq!(com.lds_version(), "01.07");
    /// assert_eq!(com.data_groups(), [DataGroupId::Dg1, DataGroupId::Dg2]);
    /// #
    /// #     Ok(())
    /// # }
    /// ```
    pub fn decode(id: DataGroupId, bytes: Vec<u8>) -> Result<Self, EmrtdError> {
        let raw = RawDataGroup::new(id, bytes)?;
        debug!("Decoding {id}, {} bytes", raw.as_bytes().len());
        Ok(match id {
            DataGroupId::Com => Self::Com(Com::decode(raw)?),
            DataGroupId::Dg1 => Self::Dg1(Dg1::decode(raw)?),
            DataGroupId::Dg2 => Self::Dg2(Dg2::decode(raw)?),
            DataGroupId::Dg7 => Self::Dg7(Dg7::decode(raw)?),
            DataGroupId::Dg11 => Self::Dg11(Dg11::decode(raw)?),
            DataGroupId::Dg12 => Self::Dg12(Dg12::decode(raw)?),
            DataGroupId::Sod => Self::Sod(Sod::decode(raw)?),
            _ => Self::Generic(raw),
        })
    }

    fn raw_group(&self) -> &RawDataGroup {
        match self {
            Self::Com(dg) => dg.raw(),
            Self::Dg1(dg) => dg.raw(),
            Self::Dg2(dg) => dg.raw(),
            Self::Dg7(dg) => dg.raw(),
            Self::Dg11(dg) => dg.raw(),
            Self::Dg12(dg) => dg.raw(),
            Self::Sod(dg) => dg.raw(),
            Self::Generic(raw) => raw,
        }
    }

    #[must_use]
    pub fn id(&self) -> DataGroupId {
        self.raw_group().id()
    }

    /// The bytes as read from the chip.
    #[must_use]
    pub fn raw(&self) -> &[u8] {
        self.raw_group().as_bytes()
    }

    #[must_use]
    pub fn body(&self) -> &[u8] {
        self.raw_group().body()
    }

    /// Hash of the raw bytes, as stored in the document security object.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::CryptoPrimitiveFailure` if SHA-1 detects a collision attack.
    pub fn digest(&self, algorithm: HashAlgorithm) -> Result<Vec<u8>, EmrtdError> {
        let data = self.raw();
        Ok(match algorithm {
            HashAlgorithm::Sha1 => sha1(data)?,
            HashAlgorithm::Sha224 => Sha224::digest(data).to_vec(),
            HashAlgorithm::Sha256 => Sha256::digest(data).to_vec(),
            HashAlgorithm::Sha384 => Sha384::digest(data).to_vec(),
            HashAlgorithm::Sha512 => Sha512::digest(data).to_vec(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;

    const EF_COM: [u8; 22] = hex!("60145F0104303130375F36063034303030305C026175");

    #[test]
    fn test_data_group_table() {
        for (index, id) in DataGroupId::ALL.iter().enumerate() {
            assert_eq!(DATA_GROUPS[index].0, *id);
            assert_eq!(DataGroupId::from_tag(id.tag()), Some(*id));
        }
        assert_eq!(DataGroupId::Com.file_id(), [0x01, 0x1E]);
        assert_eq!(DataGroupId::Dg11.file_id(), [0x01, 0x0B]);
        assert_eq!(DataGroupId::Sod.file_id(), [0x01, 0x1D]);
        assert_eq!(DataGroupId::Dg4.tag(), 0x76);
        assert_eq!(DataGroupId::Dg15.to_string(), "EF.DG15");
        assert_eq!(DataGroupId::from_tag(0x71), None);
    }

    #[test]
    fn test_raw_data_group() -> Result<(), EmrtdError> {
        let raw = RawDataGroup::new(DataGroupId::Dg3, hex!("6303AABBCC").to_vec())?;
        assert_eq!(raw.body(), hex!("AABBCC"));
        assert_eq!(raw.as_bytes(), hex!("6303AABBCC"));

        let raw = RawDataGroup::new(DataGroupId::Dg14, hex!("6E8103AABBCC").to_vec())?;
        assert_eq!(raw.body(), hex!("AABBCC"));

        let result = RawDataGroup::new(DataGroupId::Dg3, hex!("6403AABBCC").to_vec());
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));

        let result = RawDataGroup::new(DataGroupId::Dg3, hex!("6304AABBCC").to_vec());
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::DataGroupParseError(_))));
        Ok(())
    }

    #[test]
    fn test_decode_generic() -> Result<(), EmrtdError> {
        let dg = DataGroup::decode(DataGroupId::Dg15, hex!("6F03010203").to_vec())?;
        assert!(matches!(dg, DataGroup::Generic(_)));
        assert_eq!(dg.id(), DataGroupId::Dg15);
        assert_eq!(dg.body(), hex!("010203"));
        assert_eq!(dg.raw(), hex!("6F03010203"));
        Ok(())
    }

    #[test]
    fn test_digest() -> Result<(), EmrtdError> {
        let dg = DataGroup::decode(DataGroupId::Com, EF_COM.to_vec())?;
        assert_eq!(dg.digest(HashAlgorithm::Sha1)?, sha1(&EF_COM)?);
        assert_eq!(
            dg.digest(HashAlgorithm::Sha256)?,
            Sha256::digest(EF_COM).to_vec()
        );
        assert_eq!(dg.digest(HashAlgorithm::Sha224)?.len(), 28);
        assert_eq!(dg.digest(HashAlgorithm::Sha384)?.len(), 48);
        assert_eq!(dg.digest(HashAlgorithm::Sha512)?.len(), 64);
        Ok(())
    }
}
