//! ISO/IEC 7816-4 status words.

use alloc::{format, string::String};

use crate::error::EmrtdError;

/// Status word of a successfully processed command.
pub const SW_SUCCESS: [u8; 2] = [0x90, 0x00];

/// Returns the English meaning of a status word.
///
/// Pairs that are not in the table produce `Unknown (SW1SW2)`.
///
/// # Example
///
/// ```
/// use emrtd_bac::status_meaning;
/// assert_eq!(status_meaning(0x6A, 0x82), "File not found");
/// assert_eq!(status_meaning(0x12, 0x34), "Unknown (1234)");
/// ```
#[must_use]
pub fn status_meaning(sw1: u8, sw2: u8) -> String {
    match (sw1, sw2) {
        (0x61, _) => {
            return format!(
                "SW2 indicates the number of response bytes still available - ({sw2:02X} bytes still available)"
            )
        }
        (0x64, _) => {
            return String::from(
                "State of non-volatile memory unchanged (SW2=00, other values are RFU)",
            )
        }
        (0x6C, _) => {
            return format!("Wrong length Le: SW2 indicates the exact length - (exact length: {sw2:02X})")
        }
        (0x63, x) if x & 0xF0 == 0xC0 => {
            return format!("Counter provided by X (valued from 0 to 15): {}", x & 0x0F)
        }
        _ => {}
    }

    let meaning = match (sw1, sw2) {
        (0x62, 0x00) | (0x65, 0x00) | (0x68, 0x00) | (0x69, 0x00) | (0x6A, 0x00) => {
            "No information given"
        }
        (0x62, 0x81) => "Part of returned data may be corrupted",
        (0x62, 0x82) => "End of file/record reached before reading Le bytes",
        (0x62, 0x83) => "Selected file invalidated",
        (0x62, 0x84) => "FCI not formatted according to ISO7816-4 section 5.1.5",
        (0x63, 0x81) => "File filled up by the last write",
        (0x63, 0x82) => "Card Key not supported",
        (0x63, 0x83) => "Reader Key not supported",
        (0x63, 0x84) => "Plain transmission not supported",
        (0x63, 0x85) => "Secured Transmission not supported",
        (0x63, 0x86) => "Volatile memory not available",
        (0x63, 0x87) => "Non Volatile memory not available",
        (0x63, 0x88) => "Key number not valid",
        (0x63, 0x89) => "Key length is not correct",
        (0x65, 0x81) => "Memory failure",
        (0x67, 0x00) => "Wrong length",
        (0x68, 0x81) => "Logical channel not supported",
        (0x68, 0x82) => "Secure messaging not supported",
        (0x69, 0x81) => "Command incompatible with file structure",
        (0x69, 0x82) => "Security status not satisfied",
        (0x69, 0x83) => "Authentication method blocked",
        (0x69, 0x84) => "Referenced data invalidated",
        (0x69, 0x85) => "Conditions of use not satisfied",
        (0x69, 0x86) => "Command not allowed (no current EF)",
        (0x69, 0x87) => "Expected SM data objects missing",
        (0x69, 0x88) => "SM data objects incorrect",
        (0x6A, 0x80) => "Incorrect parameters in the data field",
        (0x6A, 0x81) => "Function not supported",
        (0x6A, 0x82) => "File not found",
        (0x6A, 0x83) => "Record not found",
        (0x6A, 0x84) => "Not enough memory space in the file",
        (0x6A, 0x85) => "Lc inconsistent with TLV structure",
        (0x6A, 0x86) => "Incorrect parameters P1-P2",
        (0x6A, 0x87) => "Lc inconsistent with P1-P2",
        (0x6A, 0x88) => "Referenced data not found",
        (0x6B, 0x00) => "Wrong parameter(s) P1-P2",
        (0x6D, 0x00) => "Instruction code not supported or invalid",
        (0x6E, 0x00) => "Class not supported",
        (0x6F, 0x00) => "No precise diagnosis",
        _ => return format!("Unknown ({sw1:02X}{sw2:02X})"),
    };
    String::from(meaning)
}

/// Builds the error reported for a non-success status word.
#[must_use]
pub fn card_status_error(sw1: u8, sw2: u8) -> EmrtdError {
    EmrtdError::CardStatusError(sw1, sw2, status_meaning(sw1, sw2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_meaning_table() {
        assert_eq!(status_meaning(0x69, 0x82), "Security status not satisfied");
        assert_eq!(status_meaning(0x62, 0x00), "No information given");
        assert_eq!(status_meaning(0x63, 0x82), "Card Key not supported");
        assert_eq!(status_meaning(0x6F, 0x00), "No precise diagnosis");
    }

    #[test]
    fn test_status_meaning_parameterised() {
        assert!(status_meaning(0x61, 0x10).contains("10 bytes still available"));
        assert!(status_meaning(0x6C, 0xDF).contains("exact length: DF"));
        assert!(status_meaning(0x63, 0xC3).ends_with(": 3"));
        assert!(status_meaning(0x64, 0x00).starts_with("State of non-volatile memory"));
    }

    #[test]
    fn test_status_meaning_unknown() {
        assert_eq!(status_meaning(0x90, 0x01), "Unknown (9001)");
    }

    #[test]
    fn test_card_status_error() {
        let err = card_status_error(0x6A, 0x82);
        assert!(
            matches!(err, EmrtdError::CardStatusError(0x6A, 0x82, ref m) if m == "File not found")
        );
    }
}
