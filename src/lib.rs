//! A library that reads an eMRTD over Basic Access Control.
//!
//! A library that reads an eMRTD (Electronic Machine Readable Travel Document)
//! and decodes the data groups stored on its chip.
//!
//! The `emrtd_bac` crate parses and validates the MRZ printed on the document,
//! derives the BAC keys from it, establishes 3DES secure messaging with the chip
//! and reads the requested data groups over any contactless transport that
//! implements [`TagTransport`]. A PC/SC transport is included behind the `pcsc`
//! feature, which is enabled by default.
//!
//! **NOTE:**
//! Please note that this crate is provided 'as is' and is not considered production-ready. Use at your own risk.
//!
//! Currently Active Authentication (AA), Chip Authentication (CA), PACE, EAC and
//! Passive Authentication are **not** supported. [`DataGroup::digest`] returns
//! the hash of a data group for comparison with the document security object.
//!
//! # Quick Start
//!
//! ```no_run
//! use emrtd_bac::{other_mrz, DataGroup, DataGroupId, DocumentReader, EmrtdError, PcscTransport};
//! use tracing::info;
//!
//! fn main() -> Result<(), EmrtdError> {
//!     tracing_subscriber::fmt()
//!         .with_max_level(tracing::Level::TRACE)
//!         .init();
//!
//!     let doc_no = "DOCUMENT NUMBER";
//!     let birthdate = "BIRTH DATE IN YYMMDD";
//!     let expirydate = "EXPIRY DATE IN YYMMDD";
//!     let secret = other_mrz(doc_no, birthdate, expirydate)?;
//!
//!     let reader = DocumentReader::<PcscTransport>::new(PcscTransport::new(None)?);
//!     let groups = reader.read_document(&secret, &[DataGroupId::Com, DataGroupId::Dg1])?;
//!     for dg in &groups {
//!         match dg {
//!             DataGroup::Com(com) => info!("LDS version: {}", com.lds_version()),
//!             DataGroup::Dg1(dg1) => info!("Holder: {}", dg1.last_name()),
//!             _ => {}
//!         }
//!     }
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

extern crate alloc;
use alloc::string::String;
use core::fmt::Write;

pub mod apdu;
pub mod asn1;
pub mod bac;
pub mod crypto;
mod error;
pub mod lds;
pub mod mrz;
pub mod reader;
pub mod secure_messaging;
mod status;
pub mod transport;

pub use error::{Asn1Error, EmrtdError, SecureMessagingError};
pub use lds::{DataGroup, DataGroupId, HashAlgorithm};
pub use mrz::{other_mrz, MrzDocument, MrzFormat, Sex};
pub use reader::{DocumentReader, ReaderConfig, StatusSink};
pub use status::{status_meaning, SW_SUCCESS};
#[cfg(feature = "pcsc")]
pub use transport::{PcscChannel, PcscTransport};
pub use transport::{ResponseCallback, TagChannel, TagTransport};

/// Converts a byte slice to an uppercase hexadecimal string.
///
/// # Arguments
///
/// * `bytes` - Bytes to be converted to a hex string.
///
/// # Returns
///
/// A hex string representation of the input bytes.
///
/// # Example
///
/// ```
/// use emrtd_bac::bytes2hex;
///
/// let bytes = vec![0xDE, 0xAD, 0xBE, 0xEF];
/// let hex_string = bytes2hex(&bytes);
/// assert_eq!(hex_string, "DEADBEEF");
/// ```
#[must_use]
pub fn bytes2hex(bytes: &[u8]) -> String {
    bytes.iter().fold(String::new(), |mut acc, &byte| {
        write!(&mut acc, "{byte:02X}").expect("Writing to a String can not fail");
        acc
    })
}
