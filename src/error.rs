use alloc::string::String;
use core::fmt;
use std::num::TryFromIntError;

/// Failure kinds of the ASN.1 definite-length codec.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asn1Error {
    /// The leading length byte is not one of the supported definite forms.
    InvalidLength(u8),
    /// A tag was expected but the buffer holds something else.
    InvalidTag { expected: u16, found: u16 },
    /// The value cannot be encoded as a definite length of at most 3 bytes.
    InvalidValue(usize),
    /// The buffer ended before the announced number of bytes.
    Truncated { expected: usize, found: usize },
}

impl fmt::Display for Asn1Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::InvalidLength(byte) => write!(f, "unsupported length byte {byte:02X}"),
            Self::InvalidTag { expected, found } => {
                write!(f, "invalid tag, expected: {expected:02X}, found: {found:02X}")
            }
            Self::InvalidValue(value) => write!(f, "length {value} can not be encoded"),
            Self::Truncated { expected, found } => write!(
                f,
                "data is incomplete, expected len: {expected}, found len: {found}"
            ),
        }
    }
}

/// Failure kinds of a secured response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecureMessagingError {
    /// `DO'87'` does not start with the padding-content indicator `01`.
    Malformed87,
    /// `DO'8E'` does not match the MAC computed over the response.
    InvalidChecksum,
    /// `DO'99'` or `DO'8E'` is missing.
    MissingMandatoryFields,
}

impl fmt::Display for SecureMessagingError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::Malformed87 => write!(f, "DO'87' malformed, must be 87 L 01 <encdata>"),
            Self::InvalidChecksum => write!(f, "Encrypted message MAC is not correct"),
            Self::MissingMandatoryFields => write!(f, "Mandatory secure messaging fields missing"),
        }
    }
}

#[derive(Debug)]
#[non_exhaustive]
pub enum EmrtdError {
    SessionAlreadyInProgress,
    TransportUnavailable(String),
    TransportClosed,
    NoResponseFromTag,
    CardStatusError(u8, u8, String),
    Asn1DecodeError(Asn1Error),
    SecureMessagingError(SecureMessagingError),
    CryptoPrimitiveFailure(&'static str),
    MrzFormatInvalid(String),
    MrzChecksumMismatch(&'static str),
    DataGroupParseError(String),
    InvalidResponse(&'static str),
    InvalidArgument(&'static str),
    SscOverflow,
    #[cfg(feature = "pcsc")]
    PcscError(pcsc::Error),
    IntCastError(TryFromIntError),
}

impl fmt::Display for EmrtdError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Self::SessionAlreadyInProgress => write!(f, "A read session is already in progress"),
            Self::TransportUnavailable(ref reason) => {
                write!(f, "Contactless transport unavailable: {reason}")
            }
            Self::TransportClosed => write!(f, "Contactless channel was closed"),
            Self::NoResponseFromTag => write!(f, "No response from tag"),
            Self::CardStatusError(sw1, sw2, ref meaning) => write!(
                f,
                "APDU command failed with status code {sw1:02X} {sw2:02X}: {meaning}"
            ),
            Self::Asn1DecodeError(ref e) => write!(f, "ASN.1 decoding failed: {e}"),
            Self::SecureMessagingError(ref e) => write!(f, "Secure messaging failed: {e}"),
            Self::CryptoPrimitiveFailure(msg) => write!(f, "Cipher operation failed: {msg}"),
            Self::MrzFormatInvalid(ref msg) => write!(f, "MRZ is invalid: {msg}"),
            Self::MrzChecksumMismatch(field) => {
                write!(f, "MRZ check digit of {field} does not match")
            }
            Self::DataGroupParseError(ref msg) => write!(f, "Invalid data group: {msg}"),
            Self::InvalidResponse(msg) => write!(f, "Card response is invalid: {msg}"),
            Self::InvalidArgument(msg) => write!(f, "Invalid argument: {msg}"),
            Self::SscOverflow => write!(f, "SSC overflow"),
            #[cfg(feature = "pcsc")]
            Self::PcscError(ref e) => fmt::Display::fmt(&e, f),
            Self::IntCastError(ref e) => fmt::Display::fmt(&e, f),
        }
    }
}

impl std::error::Error for EmrtdError {}

impl From<Asn1Error> for EmrtdError {
    fn from(e: Asn1Error) -> Self {
        Self::Asn1DecodeError(e)
    }
}

impl From<SecureMessagingError> for EmrtdError {
    fn from(e: SecureMessagingError) -> Self {
        Self::SecureMessagingError(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloc::string::ToString;

    #[test]
    fn test_error_messages() {
        assert_eq!(EmrtdError::SscOverflow.to_string(), "SSC overflow");
        assert_eq!(
            EmrtdError::from(SecureMessagingError::MissingMandatoryFields).to_string(),
            "Secure messaging failed: Mandatory secure messaging fields missing"
        );
    }
}
