//! Basic Access Control, ICAO Doc 9303-11 Section 4.3 and Appendix D.3.

use alloc::vec::Vec;
use constant_time_eq::constant_time_eq;
use core::{fmt, time::Duration};
use rand::{CryptoRng, RngCore};
use tracing::{error, info, trace};

use crate::{
    apdu::Apdu,
    crypto::{
        derive_key, pad, retail_mac, sha1, tdes_decrypt, tdes_encrypt, xor_slices, KDF_ENC,
        KDF_MAC, ZERO_IV,
    },
    error::{EmrtdError, SecureMessagingError},
    secure_messaging::SecureChannel,
    status::card_status_error,
    transport::{transceive, TagChannel},
};

/// Document basic access keys derived from the MRZ key.
pub struct AccessKeys {
    k_enc: Vec<u8>,
    k_mac: Vec<u8>,
}

impl fmt::Debug for AccessKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessKeys").finish_non_exhaustive()
    }
}

impl AccessKeys {
    /// Derives `K_enc` and `K_mac` from the MRZ key.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::InvalidArgument` if the MRZ key is empty.
    /// * `EmrtdError::CryptoPrimitiveFailure` if hashing fails.
    pub fn from_mrz_key(mrz_key: &str) -> Result<Self, EmrtdError> {
        if mrz_key.is_empty() {
            error!("Can not derive access keys from an empty MRZ key");
            return Err(EmrtdError::InvalidArgument("MRZ key is empty"));
        }
        let key_seed = &sha1(mrz_key.as_bytes())?[..16];
        Ok(Self {
            k_enc: derive_key(key_seed, KDF_ENC)?,
            k_mac: derive_key(key_seed, KDF_MAC)?,
        })
    }

    #[must_use]
    pub fn k_enc(&self) -> &[u8] {
        &self.k_enc
    }

    #[must_use]
    pub fn k_mac(&self) -> &[u8] {
        &self.k_mac
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BacState {
    Idle,
    KeysFromSeed,
    ChallengeSent,
    AuthenticateSent,
    SessionEstablished,
    Failed,
}

/// One run of the BAC key establishment.
#[derive(Debug)]
pub struct Bac {
    state: BacState,
    timeout: Duration,
}

impl Bac {
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self {
            state: BacState::Idle,
            timeout,
        }
    }

    #[must_use]
    pub const fn state(&self) -> BacState {
        self.state
    }

    /// Authenticates with the chip and returns the secure channel.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::CardStatusError` if the chip rejects a command.
    /// * `EmrtdError::SecureMessagingError` if the chip cryptogram MAC is wrong.
    /// * `EmrtdError::InvalidResponse` if the chip response is malformed or
    ///   does not echo the nonces.
    /// * Transport errors from [`transceive`].
    pub fn establish<C, R>(
        &mut self,
        channel: &mut C,
        rng: &mut R,
        mrz_key: &str,
    ) -> Result<SecureChannel, EmrtdError>
    where
        C: TagChannel + ?Sized,
        R: RngCore + CryptoRng,
    {
        let result = self.run(channel, rng, mrz_key);
        self.state = if result.is_ok() {
            BacState::SessionEstablished
        } else {
            BacState::Failed
        };
        result
    }

    fn run<C, R>(
        &mut self,
        channel: &mut C,
        rng: &mut R,
        mrz_key: &str,
    ) -> Result<SecureChannel, EmrtdError>
    where
        C: TagChannel + ?Sized,
        R: RngCore + CryptoRng,
    {
        trace!("Computing basic access keys...");
        let keys = AccessKeys::from_mrz_key(mrz_key)?;
        self.state = BacState::KeysFromSeed;

        info!("Establishing BAC session keys...");
        let response = transceive(channel, &Apdu::get_challenge().to_bytes()?, self.timeout)?;
        self.state = BacState::ChallengeSent;
        if !response.is_success() {
            error!(
                "Received invalid SW during GET CHALLENGE: {:02X} {:02X}",
                response.sw1(),
                response.sw2()
            );
            return Err(card_status_error(response.sw1(), response.sw2()));
        }
        let rnd_icc: [u8; 8] = response.data().try_into().map_err(|_| {
            error!(
                "GET CHALLENGE returned {} bytes instead of 8",
                response.data().len()
            );
            EmrtdError::InvalidResponse("Challenge must be 8 bytes long")
        })?;

        let mut rnd_ifd = [0_u8; 8];
        rng.fill_bytes(&mut rnd_ifd);
        let mut k_ifd = [0_u8; 16];
        rng.fill_bytes(&mut k_ifd);

        let cmd_data = authenticate_command(&keys, &rnd_ifd, &rnd_icc, &k_ifd)?;
        let response = transceive(
            channel,
            &Apdu::mutual_authenticate(&cmd_data).to_bytes()?,
            self.timeout,
        )?;
        self.state = BacState::AuthenticateSent;
        if !response.is_success() {
            error!(
                "Received invalid SW during MUTUAL AUTHENTICATE: {:02X} {:02X}",
                response.sw1(),
                response.sw2()
            );
            return Err(card_status_error(response.sw1(), response.sw2()));
        }

        session_from_response(&keys, &rnd_ifd, &rnd_icc, &k_ifd, response.data())
    }
}

/// Builds `E.IFD ‖ M.IFD` for MUTUAL AUTHENTICATE.
///
/// # Errors
///
/// Cipher failures.
pub fn authenticate_command(
    keys: &AccessKeys,
    rnd_ifd: &[u8; 8],
    rnd_icc: &[u8; 8],
    k_ifd: &[u8; 16],
) -> Result<Vec<u8>, EmrtdError> {
    let s = [&rnd_ifd[..], &rnd_icc[..], &k_ifd[..]].concat();
    let e_ifd = tdes_encrypt(keys.k_enc(), &s, &ZERO_IV)?;
    let m_ifd = retail_mac(keys.k_mac(), &pad(&e_ifd))?;
    Ok([e_ifd, m_ifd].concat())
}

/// Verifies the chip's MUTUAL AUTHENTICATE answer and derives the session.
///
/// # Errors
///
/// * `EmrtdError::InvalidResponse` for a response that is not 40 bytes or
///   does not echo both nonces.
/// * `EmrtdError::SecureMessagingError` with `InvalidChecksum` for a wrong MAC.
pub fn session_from_response(
    keys: &AccessKeys,
    rnd_ifd: &[u8; 8],
    rnd_icc: &[u8; 8],
    k_ifd: &[u8; 16],
    response: &[u8],
) -> Result<SecureChannel, EmrtdError> {
    if response.len() != 40 {
        error!(
            "MUTUAL AUTHENTICATE response must be 40 bytes, found {}",
            response.len()
        );
        return Err(EmrtdError::InvalidResponse(
            "MUTUAL AUTHENTICATE response must be 40 bytes long",
        ));
    }
    let (e_icc, m_icc) = response.split_at(32);

    let computed_m_icc = retail_mac(keys.k_mac(), &pad(e_icc))?;
    if !constant_time_eq(&computed_m_icc, m_icc) {
        error!("MAC verification of the chip cryptogram failed");
        return Err(SecureMessagingError::InvalidChecksum.into());
    }

    let r = tdes_decrypt(keys.k_enc(), e_icc, &ZERO_IV)?;
    if !constant_time_eq(&r[..8], rnd_icc) || !constant_time_eq(&r[8..16], rnd_ifd) {
        error!("Chip did not echo the authentication nonces");
        return Err(EmrtdError::InvalidResponse(
            "Chip did not echo the authentication nonces",
        ));
    }
    let k_icc = &r[16..32];

    let session_key_seed = xor_slices(k_ifd, k_icc)?;
    let ks_enc = derive_key(&session_key_seed, KDF_ENC)?;
    let ks_mac = derive_key(&session_key_seed, KDF_MAC)?;

    let mut ssc = [0_u8; 8];
    ssc[..4].copy_from_slice(&rnd_icc[4..]);
    ssc[4..].copy_from_slice(&rnd_ifd[4..]);

    info!("BAC session established");
    SecureChannel::new(&ks_enc, &ks_mac, ssc)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::transport::ResponseCallback;
    use hex_literal::hex;

    pub(crate) const MRZ_KEY: &str = "L898902C<369080619406236";

    #[derive(Clone, Debug)]
    pub(crate) struct MockRng {
        data: Vec<u8>,
        index: usize,
    }

    impl Default for MockRng {
        fn default() -> MockRng {
            MockRng {
                data: hex!("781723860C06C226
                            0B795240CB7049B01C19B33E32804F0B")
                .to_vec(),
                index: 0,
            }
        }
    }

    impl CryptoRng for MockRng {}

    impl RngCore for MockRng {
        fn next_u32(&mut self) -> u32 {
            unimplemented!()
        }

        fn next_u64(&mut self) -> u64 {
            unimplemented!()
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            for byte in dest.iter_mut() {
                *byte = self.data[self.index];
                self.index = (self.index + 1) % self.data.len();
            }
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    /// Chip answering with the canned responses of ICAO Doc 9303-11 Appendix D.3.
    struct IcaoChip {
        challenge_response: Vec<u8>,
        authenticate_response: Vec<u8>,
    }

    impl Default for IcaoChip {
        fn default() -> Self {
            Self {
                challenge_response: hex!("4608F91988702212 9000").to_vec(),
                authenticate_response: hex!(
                    "46B9342A41396CD7386BF5803104D7CEDC122B9132139BAF2EEDC94EE178534F
                     2F2D235D074D7449 9000"
                )
                .to_vec(),
            }
        }
    }

    impl TagChannel for IcaoChip {
        fn send_command(&mut self, command: &[u8], on_response: ResponseCallback) {
            if command == hex!("0084000008") {
                on_response(Ok(self.challenge_response.clone()));
            } else if command
                == hex!("0082000028 72C29C2371CC9BDB65B779B8E8D37B29ECC154AA56A8799FAE2F498F76ED92F2
                              5F1448EEA8AD90A7 28")
            {
                on_response(Ok(self.authenticate_response.clone()));
            } else {
                on_response(Ok(hex!("6D00").to_vec()));
            }
        }

        fn disconnect(&mut self) -> Result<(), EmrtdError> {
            Ok(())
        }
    }

    #[test]
    fn test_access_keys() -> Result<(), EmrtdError> {
        // Example taken from https://www.icao.int/publications/Documents/9303_p11_cons_en.pdf Appendix D.2
        let keys = AccessKeys::from_mrz_key(MRZ_KEY)?;
        assert_eq!(keys.k_enc(), hex!("AB94FDECF2674FDFB9B391F85D7F76F2"));
        assert_eq!(keys.k_mac(), hex!("7962D9ECE03D1ACD4C76089DCE131543"));

        let result = AccessKeys::from_mrz_key("");
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::InvalidArgument(_))));
        Ok(())
    }

    #[test]
    fn test_authenticate_command() -> Result<(), EmrtdError> {
        let keys = AccessKeys::from_mrz_key(MRZ_KEY)?;
        let cmd_data = authenticate_command(
            &keys,
            &hex!("781723860C06C226"),
            &hex!("4608F91988702212"),
            &hex!("0B795240CB7049B01C19B33E32804F0B"),
        )?;
        assert_eq!(
            cmd_data,
            hex!("72C29C2371CC9BDB65B779B8E8D37B29ECC154AA56A8799FAE2F498F76ED92F2
                  5F1448EEA8AD90A7")
        );
        Ok(())
    }

    #[test]
    fn test_establish_bac_session_keys() -> Result<(), EmrtdError> {
        let _ = tracing_subscriber::fmt()
            .with_max_level(tracing::Level::TRACE)
            .with_test_writer()
            .try_init();

        let mut bac = Bac::new(Duration::from_secs(1));
        assert_eq!(bac.state(), BacState::Idle);

        let mut chip = IcaoChip::default();
        let channel = bac.establish(&mut chip, &mut MockRng::default(), MRZ_KEY)?;
        assert_eq!(bac.state(), BacState::SessionEstablished);
        assert_eq!(channel.ssc(), hex!("887022120C06C226"));

        // The derived session keys must protect SELECT EF.COM as in Appendix D.4
        let mut channel = channel;
        assert_eq!(
            channel.protect(&Apdu::select_file([0x01, 0x1E]))?,
            hex!("0CA4020C158709016375432908C044F68E08BF8B92D635FF24F800")
        );
        Ok(())
    }

    #[test]
    fn test_establish_rejected_challenge() {
        let mut bac = Bac::new(Duration::from_secs(1));
        let mut chip = IcaoChip {
            challenge_response: hex!("6982").to_vec(),
            ..IcaoChip::default()
        };
        let result = bac.establish(&mut chip, &mut MockRng::default(), MRZ_KEY);
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::CardStatusError(0x69, 0x82, _))));
        assert_eq!(bac.state(), BacState::Failed);
    }

    #[test]
    fn test_establish_wrong_mrz_key() {
        // A wrong key produces a different E.IFD which the chip does not accept
        let mut bac = Bac::new(Duration::from_secs(1));
        let result = bac.establish(
            &mut IcaoChip::default(),
            &mut MockRng::default(),
            "L898902C<369080619406237",
        );
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::CardStatusError(0x6D, 0x00, _))));
        assert_eq!(bac.state(), BacState::Failed);
    }

    #[test]
    fn test_session_from_response_forged_mac() -> Result<(), EmrtdError> {
        let keys = AccessKeys::from_mrz_key(MRZ_KEY)?;
        let mut response = hex!(
            "46B9342A41396CD7386BF5803104D7CEDC122B9132139BAF2EEDC94EE178534F
             2F2D235D074D7449"
        );
        response[39] ^= 0x01;
        let result = session_from_response(
            &keys,
            &hex!("781723860C06C226"),
            &hex!("4608F91988702212"),
            &hex!("0B795240CB7049B01C19B33E32804F0B"),
            &response,
        );
        assert!(result.is_err_and(|e| matches!(
            e,
            EmrtdError::SecureMessagingError(SecureMessagingError::InvalidChecksum)
        )));
        Ok(())
    }

    #[test]
    fn test_session_from_response_wrong_nonce() -> Result<(), EmrtdError> {
        let keys = AccessKeys::from_mrz_key(MRZ_KEY)?;
        let result = session_from_response(
            &keys,
            &hex!("781723860C06C227"),
            &hex!("4608F91988702212"),
            &hex!("0B795240CB7049B01C19B33E32804F0B"),
            &hex!(
                "46B9342A41396CD7386BF5803104D7CEDC122B9132139BAF2EEDC94EE178534F
                 2F2D235D074D7449"
            ),
        );
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::InvalidResponse(_))));

        let result = session_from_response(
            &keys,
            &hex!("781723860C06C226"),
            &hex!("4608F91988702212"),
            &hex!("0B795240CB7049B01C19B33E32804F0B"),
            &[0; 32],
        );
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::InvalidResponse(_))));
        Ok(())
    }
}
