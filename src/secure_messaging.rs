//! 3DES secure messaging, ICAO Doc 9303-11 Section 9.8.
//!
//! See Appendix D.4 for a worked example:
//! <https://www.icao.int/publications/Documents/9303_p11_cons_en.pdf>

use alloc::vec::Vec;
use constant_time_eq::constant_time_eq;
use core::fmt;
use tracing::{error, trace, warn};

use crate::{
    apdu::{encode_le, Apdu, ResponseApdu},
    asn1::{encode_length, TlvCursor},
    bytes2hex,
    crypto::{pad, retail_mac, tdes_decrypt, tdes_encrypt, unpad, ZERO_IV},
    error::{EmrtdError, SecureMessagingError},
    status::{card_status_error, SW_SUCCESS},
};

/// Session keys and send sequence counter of one BAC session.
pub struct SecureChannel {
    ks_enc: Vec<u8>,
    ks_mac: Vec<u8>,
    ssc: u64,
}

impl fmt::Debug for SecureChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecureChannel")
            .field("ssc", &format_args!("{:016X}", self.ssc))
            .finish_non_exhaustive()
    }
}

impl SecureChannel {
    /// Creates a channel from session keys and the initial counter.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::InvalidArgument` if a key is not 16 bytes long.
    pub fn new(ks_enc: &[u8], ks_mac: &[u8], ssc: [u8; 8]) -> Result<Self, EmrtdError> {
        if ks_enc.len() != 16 || ks_mac.len() != 16 {
            error!(
                "Session keys must be 16 bytes long, found {} and {}",
                ks_enc.len(),
                ks_mac.len()
            );
            return Err(EmrtdError::InvalidArgument(
                "Session keys must be 16 bytes long",
            ));
        }
        Ok(Self {
            ks_enc: ks_enc.to_vec(),
            ks_mac: ks_mac.to_vec(),
            ssc: u64::from_be_bytes(ssc),
        })
    }

    /// Current send sequence counter.
    #[must_use]
    pub const fn ssc(&self) -> [u8; 8] {
        self.ssc.to_be_bytes()
    }

    fn increment_ssc(&mut self) -> Result<(), EmrtdError> {
        self.ssc = self.ssc.checked_add(1).ok_or_else(|| {
            error!("SSC can not be incremented any further");
            EmrtdError::SscOverflow
        })?;
        Ok(())
    }

    /// Wraps a command APDU for transmission.
    ///
    /// The counter is incremented once.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::SscOverflow` if the counter is exhausted.
    /// * `EmrtdError::IntCastError` if the protected body exceeds a short APDU.
    /// * Cipher failures.
    pub fn protect(&mut self, apdu: &Apdu) -> Result<Vec<u8>, EmrtdError> {
        let mut header = apdu.header();
        header[0] |= 0x0C;

        let mut payload = Vec::new();
        if let Some(data) = apdu.data().filter(|data| !data.is_empty()) {
            let encrypted_data = tdes_encrypt(&self.ks_enc, &pad(data), &ZERO_IV)?;
            let do87_value = [&[0x01][..], &encrypted_data[..]].concat();
            payload.push(0x87);
            payload.extend(encode_length(do87_value.len())?);
            payload.extend(do87_value);
        }

        if let Some(le) = apdu.le() {
            let le = encode_le(le)?;
            payload.push(0x97);
            payload.extend(encode_length(le.len())?);
            payload.extend(le);
        }

        self.increment_ssc()?;
        let n = pad(&[&self.ssc()[..], &pad(&header)[..], &payload[..]].concat());
        let cc = retail_mac(&self.ks_mac, &n)?;

        payload.extend([0x8E, 0x08]);
        payload.extend(cc);

        let protected_apdu = [
            &header[..],
            &[u8::try_from(payload.len()).map_err(EmrtdError::IntCastError)?][..],
            &payload[..],
            &[0x00][..],
        ]
        .concat();

        trace!("Protected APDU: {}", bytes2hex(&protected_apdu));
        Ok(protected_apdu)
    }

    /// Verifies and decrypts a secured response.
    ///
    /// A response whose status is not `9000` is returned unchanged. The
    /// counter is incremented once for every checked MAC.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::SecureMessagingError` with `Malformed87`, `InvalidChecksum`
    ///   or `MissingMandatoryFields`.
    /// * `EmrtdError::CardStatusError` if `DO'99'` is absent and the status
    ///   bytes in its place report an error.
    /// * `EmrtdError::Asn1DecodeError` for a malformed `DO'87'` length.
    /// * `EmrtdError::SscOverflow` if the counter is exhausted.
    pub fn unprotect(&mut self, response: &ResponseApdu) -> Result<ResponseApdu, EmrtdError> {
        if !response.is_success() {
            warn!(
                "Secured response carries status {:02X}{:02X}, passing it through",
                response.sw1(),
                response.sw2()
            );
            return Ok(response.clone());
        }

        let rapdu = response.data();
        trace!("R_APDU: {}", bytes2hex(rapdu));

        let mut cursor = TlvCursor::new(rapdu);
        let mut do87: &[u8] = &[];
        let mut encrypted_data: &[u8] = &[];

        // DO'87', present only when data is returned
        if rapdu.first() == Some(&0x87) {
            let value = cursor.expect_tlv(0x87)?;
            if value.first() != Some(&0x01) {
                error!("DO'87' malformed, must be 87 L 01 <encdata>");
                return Err(SecureMessagingError::Malformed87.into());
            }
            do87 = &rapdu[..cursor.position()];
            encrypted_data = &value[1..];
        }

        // DO'99', mandatory unless the card reports an error
        let start = cursor.position();
        let Ok(do99) = cursor.take(4) else {
            error!("DO'99' missing from secured response");
            return Err(SecureMessagingError::MissingMandatoryFields.into());
        };
        let (sw1, sw2) = (do99[2], do99[3]);
        if do99[..2] != [0x99, 0x02] {
            if [sw1, sw2] == SW_SUCCESS {
                error!("Unauthenticated success status without DO'99'");
                return Err(SecureMessagingError::MissingMandatoryFields.into());
            }
            warn!("Secured response without DO'99', status {sw1:02X}{sw2:02X}");
            return Err(card_status_error(sw1, sw2));
        }
        let do99 = &rapdu[start..cursor.position()];

        // DO'8E'
        let cc = match cursor.next_tlv() {
            Ok((0x8E, cc)) => cc,
            _ => {
                error!("DO'8E' missing from secured response");
                return Err(SecureMessagingError::MissingMandatoryFields.into());
            }
        };

        self.increment_ssc()?;
        let k = pad(&[&self.ssc()[..], do87, do99].concat());
        let computed_cc = retail_mac(&self.ks_mac, &k)?;
        if !constant_time_eq(&computed_cc, cc) {
            error!("MAC verification failed");
            return Err(SecureMessagingError::InvalidChecksum.into());
        }

        let data = if encrypted_data.is_empty() {
            Vec::new()
        } else {
            unpad(&tdes_decrypt(&self.ks_enc, encrypted_data, &ZERO_IV)?).to_vec()
        };
        Ok(ResponseApdu::new(data, sw1, sw2))
    }
}
