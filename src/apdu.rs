//! Command and response APDUs, ISO/IEC 7816-4 short form.

use alloc::vec::Vec;
use tracing::error;

use crate::{error::EmrtdError, status::SW_SUCCESS};

/// Application identifier of the eMRTD LDS1 application.
pub const EMRTD_AID: [u8; 7] = [0xA0, 0x00, 0x00, 0x02, 0x47, 0x10, 0x01];

pub const INS_SELECT: u8 = 0xA4;
pub const INS_READ_BINARY: u8 = 0xB0;
pub const INS_GET_CHALLENGE: u8 = 0x84;
pub const INS_MUTUAL_AUTHENTICATE: u8 = 0x82;

/// Encodes an expected response length.
///
/// `256` is encoded as `00`, `65536` as `00 00`.
///
/// # Errors
///
/// * `EmrtdError::InvalidArgument` if `le` is 0 or greater than 65536.
pub fn encode_le(le: usize) -> Result<Vec<u8>, EmrtdError> {
    match le {
        1..=0xFF => Ok(vec![u8::try_from(le).map_err(EmrtdError::IntCastError)?]),
        0x100 => Ok(vec![0x00]),
        0x101..=0xFFFF => Ok(u16::try_from(le)
            .map_err(EmrtdError::IntCastError)?
            .to_be_bytes()
            .to_vec()),
        0x10000 => Ok(vec![0x00, 0x00]),
        _ => {
            error!("Le must be between 1 and 65536, found {le}");
            Err(EmrtdError::InvalidArgument(
                "Le must be between 1 and 65536",
            ))
        }
    }
}

/// An Application Protocol Data Unit (APDU) command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Apdu {
    /// Class byte of the APDU
    cla: u8,
    /// Instruction byte of the APDU
    ins: u8,
    /// Parameter 1 byte of the APDU
    p1: u8,
    /// Parameter 2 byte of the APDU
    p2: u8,
    /// Command data field of the APDU
    data: Option<Vec<u8>>,
    /// Expected length of the response data field (Le)
    le: Option<usize>,
}

impl Apdu {
    /// Constructs a new APDU.
    ///
    /// # Example
    ///
    /// ```
    /// use emrtd_bac::apdu::Apdu;
    ///
    /// let apdu = Apdu::new(0x00, 0x84, 0x00, 0x00, None, Some(8));
    /// assert_eq!(apdu, Apdu::get_challenge());
    /// ```
    #[must_use]
    pub const fn new(
        cla: u8,
        ins: u8,
        p1: u8,
        p2: u8,
        data: Option<Vec<u8>>,
        le: Option<usize>,
    ) -> Self {
        Self {
            cla,
            ins,
            p1,
            p2,
            data,
            le,
        }
    }

    /// `SELECT` of an application by its AID.
    #[must_use]
    pub fn select_application(aid: &[u8]) -> Self {
        Self::new(0x00, INS_SELECT, 0x04, 0x0C, Some(aid.to_vec()), None)
    }

    /// `GET CHALLENGE` for an 8 byte nonce.
    #[must_use]
    pub const fn get_challenge() -> Self {
        Self::new(0x00, INS_GET_CHALLENGE, 0x00, 0x00, None, Some(8))
    }

    /// `MUTUAL AUTHENTICATE` carrying `E.IFD ‖ M.IFD`.
    #[must_use]
    pub fn mutual_authenticate(cmd_data: &[u8]) -> Self {
        Self::new(
            0x00,
            INS_MUTUAL_AUTHENTICATE,
            0x00,
            0x00,
            Some(cmd_data.to_vec()),
            Some(0x28),
        )
    }

    /// `SELECT` of an elementary file by its 2 byte file identifier.
    #[must_use]
    pub fn select_file(fid: [u8; 2]) -> Self {
        Self::new(0x00, INS_SELECT, 0x02, 0x0C, Some(fid.to_vec()), None)
    }

    /// `READ BINARY` of `le` bytes starting at `offset`.
    #[must_use]
    pub fn read_binary(offset: u16, le: usize) -> Self {
        let [p1, p2] = offset.to_be_bytes();
        Self::new(0x00, INS_READ_BINARY, p1, p2, None, Some(le))
    }

    #[must_use]
    pub const fn cla(&self) -> u8 {
        self.cla
    }

    #[must_use]
    pub const fn ins(&self) -> u8 {
        self.ins
    }

    #[must_use]
    pub const fn p1(&self) -> u8 {
        self.p1
    }

    #[must_use]
    pub const fn p2(&self) -> u8 {
        self.p2
    }

    #[must_use]
    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    #[must_use]
    pub const fn le(&self) -> Option<usize> {
        self.le
    }

    /// The command header `CLA INS P1 P2`.
    #[must_use]
    pub const fn header(&self) -> [u8; 4] {
        [self.cla, self.ins, self.p1, self.p2]
    }

    /// Serialises the command as a short APDU.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::IntCastError` if the data field is longer than 255 bytes.
    /// * `EmrtdError::InvalidArgument` if `Le` is outside `1..=256`.
    ///
    /// # Example
    ///
    /// ```
    /// # use emrtd_bac::EmrtdError;
    /// #
    /// # fn main() -> Result<(), EmrtdError> {
    /// use emrtd_bac::apdu::Apdu;
    ///
    /// assert_eq!(Apdu::select_file([0x01, 0x1E]).to_bytes()?, [0x00, 0xA4, 0x02, 0x0C, 0x02, 0x01, 0x1E]);
    /// assert_eq!(Apdu::read_binary(0x0104, 256).to_bytes()?, [0x00, 0xB0, 0x01, 0x04, 0x00]);
    /// #
    /// #     Ok(())
    /// # }
    /// ```
    pub fn to_bytes(&self) -> Result<Vec<u8>, EmrtdError> {
        let mut apdu_bytes = self.header().to_vec();
        if let Some(data) = &self.data {
            apdu_bytes.push(u8::try_from(data.len()).map_err(EmrtdError::IntCastError)?);
            apdu_bytes.extend_from_slice(data);
        }
        if let Some(le) = self.le {
            if le > 0x100 {
                error!("Short APDU can not expect {le} bytes");
                return Err(EmrtdError::InvalidArgument(
                    "Short APDU Le must be between 1 and 256",
                ));
            }
            apdu_bytes.extend(encode_le(le)?);
        }
        Ok(apdu_bytes)
    }
}

/// Response to an APDU: data field followed by the status word.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseApdu {
    data: Vec<u8>,
    sw1: u8,
    sw2: u8,
}

impl ResponseApdu {
    #[must_use]
    pub const fn new(data: Vec<u8>, sw1: u8, sw2: u8) -> Self {
        Self { data, sw1, sw2 }
    }

    /// Splits a raw card response into data and status word.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::InvalidResponse` if the response is shorter than the status word.
    pub fn from_bytes(response: &[u8]) -> Result<Self, EmrtdError> {
        if response.len() < 2 {
            error!(
                "Card response length should be greater than or equal to 2, found {}",
                response.len()
            );
            return Err(EmrtdError::InvalidResponse(
                "Card response is shorter than a status word",
            ));
        }
        let (data, status) = response.split_at(response.len() - 2);
        Ok(Self::new(data.to_vec(), status[0], status[1]))
    }

    #[must_use]
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }

    #[must_use]
    pub const fn sw1(&self) -> u8 {
        self.sw1
    }

    #[must_use]
    pub const fn sw2(&self) -> u8 {
        self.sw2
    }

    #[must_use]
    pub const fn status(&self) -> [u8; 2] {
        [self.sw1, self.sw2]
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status() == SW_SUCCESS
    }

    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        [&self.data[..], &[self.sw1, self.sw2][..]].concat()
    }
}
