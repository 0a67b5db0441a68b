//! Reading a document: BAC followed by secured `SELECT` / `READ BINARY` of
//! every requested data group.

use alloc::{boxed::Box, format, vec::Vec};
use core::{
    marker::PhantomData,
    sync::atomic::{AtomicBool, Ordering},
    time::Duration,
};
use rand::{rngs::OsRng, CryptoRng, RngCore};
use std::sync::{Mutex, PoisonError};
use tracing::{debug, error, info, trace, warn};

use crate::{
    apdu::{Apdu, ResponseApdu, EMRTD_AID},
    asn1::decode_length,
    bac::Bac,
    error::EmrtdError,
    lds::{DataGroup, DataGroupId},
    secure_messaging::SecureChannel,
    status::card_status_error,
    transport::{transceive, TagChannel, TagTransport},
};

/// Highest offset `READ BINARY` can address with P1-P2.
const MAX_READ_OFFSET: usize = 0x7FFF;

/// Reader tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReaderConfig {
    /// How long to wait for the tag to answer a single command.
    pub response_timeout: Duration,
    /// Largest `Le` used for `READ BINARY`, between 1 and 256.
    pub max_read_length: usize,
    /// Send an unprotected `SELECT` of the eMRTD application before BAC.
    pub select_application: bool,
}

impl Default for ReaderConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_secs(5),
            max_read_length: 0xFF,
            select_application: true,
        }
    }
}

/// Advisory progress messages for the user.
pub type StatusSink = Box<dyn Fn(&str) + Send + Sync>;

/// Clears the in-progress flag when a read ends, however it ends.
struct SessionGuard<'a>(&'a AtomicBool);

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Reads data groups from an eMRTD over a [`TagTransport`].
///
/// Only one read may run at a time; a second call fails immediately with
/// `EmrtdError::SessionAlreadyInProgress`.
///
/// # Examples
///
/// ```no_run
/// # use emrtd_bac::EmrtdError;
/// #
/// # fn main() -> Result<(), EmrtdError> {
/// use emrtd_bac::{DataGroup, DataGroupId, DocumentReader, MrzDocument, PcscTransport};
///
/// let mrz = MrzDocument::parse(
///     "P<UTOERIKSSON<<ANNA<MARIA<<<<<<<<<<<<<<<<<<<\
///      L898902C36UTO7408122F1204159ZE184226B<<<<<10",
/// )?;
/// let Some(mrz_key) = mrz.mrz_key() else {
///     unreachable!()
/// };
///
/// let reader = DocumentReader::<PcscTransport>::new(PcscTransport::new(None)?);
/// for dg in reader.read_document(&mrz_key, &[DataGroupId::Com, DataGroupId::Dg1])? {
///     if let DataGroup::Dg1(dg1) = dg {
///         println!("{}", dg1.last_name());
///     }
/// }
/// #
/// #     Ok(())
/// # }
/// ```
pub struct DocumentReader<T: TagTransport, R: RngCore + CryptoRng + Default = OsRng> {
    transport: Mutex<T>,
    config: ReaderConfig,
    in_progress: AtomicBool,
    status_sink: Option<StatusSink>,
    rng: PhantomData<fn() -> R>,
}

impl<T: TagTransport, R: RngCore + CryptoRng + Default> DocumentReader<T, R> {
    #[must_use]
    pub fn new(transport: T) -> Self {
        Self::with_config(transport, ReaderConfig::default())
    }

    #[must_use]
    pub fn with_config(transport: T, config: ReaderConfig) -> Self {
        Self {
            transport: Mutex::new(transport),
            config,
            in_progress: AtomicBool::new(false),
            status_sink: None,
            rng: PhantomData,
        }
    }

    /// Installs a callback receiving progress messages.
    #[must_use]
    pub fn with_status_sink(mut self, sink: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.status_sink = Some(Box::new(sink));
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ReaderConfig {
        &self.config
    }

    fn status(&self, message: &str) {
        if let Some(sink) = &self.status_sink {
            sink(message);
        }
    }

    /// Connects to the tag, runs BAC with `mrz_key` and reads `groups` in order.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::SessionAlreadyInProgress` if another read is running.
    /// * `EmrtdError::InvalidArgument` if `max_read_length` is not in `1..=256`.
    /// * Any error of the transport, BAC, secure messaging or the decoders.
    ///   The first failure aborts the whole read.
    pub fn read_document(
        &self,
        mrz_key: &str,
        groups: &[DataGroupId],
    ) -> Result<Vec<DataGroup>, EmrtdError> {
        if self
            .in_progress
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            error!("A read session is already in progress");
            return Err(EmrtdError::SessionAlreadyInProgress);
        }
        let _guard = SessionGuard(&self.in_progress);

        if !(1..=0x100).contains(&self.config.max_read_length) {
            error!(
                "Maximum read length must be between 1 and 256, found {}",
                self.config.max_read_length
            );
            return Err(EmrtdError::InvalidArgument(
                "Maximum read length must be between 1 and 256",
            ));
        }

        let mut transport = self
            .transport
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        self.status("Hold your document against the reader");
        let mut channel = transport.connect()?;

        let result = self.read_session(&mut channel, mrz_key, groups);
        if let Err(err) = channel.disconnect() {
            warn!("Error while disconnecting from the tag: {err}");
        }

        match &result {
            Ok(_) => self.status("Document read successfully"),
            Err(err) => self.status(&format!("Reading failed: {err}")),
        }
        result
    }

    fn read_session<C: TagChannel>(
        &self,
        channel: &mut C,
        mrz_key: &str,
        groups: &[DataGroupId],
    ) -> Result<Vec<DataGroup>, EmrtdError> {
        if self.config.select_application {
            self.select_emrtd_application(channel)?;
        }

        self.status("Authenticating with the document");
        let mut bac = Bac::new(self.config.response_timeout);
        let mut sm = bac.establish(channel, &mut R::default(), mrz_key)?;

        let mut data_groups = Vec::with_capacity(groups.len());
        for &id in groups {
            self.status(&format!("Reading {id}"));
            let bytes = self.read_file(channel, &mut sm, id)?;
            data_groups.push(DataGroup::decode(id, bytes)?);
        }
        Ok(data_groups)
    }

    fn select_emrtd_application<C: TagChannel>(&self, channel: &mut C) -> Result<(), EmrtdError> {
        info!(
            "Selecting eMRTD Application `International AID`: {}...",
            crate::bytes2hex(&EMRTD_AID)
        );
        let apdu = Apdu::select_application(&EMRTD_AID).to_bytes()?;
        let response = transceive(channel, &apdu, self.config.response_timeout)?;
        if !response.is_success() {
            error!(
                "Received invalid SW during Select eMRTD Application command: {:02X} {:02X}",
                response.sw1(),
                response.sw2()
            );
            return Err(card_status_error(response.sw1(), response.sw2()));
        }
        Ok(())
    }

    /// Sends `apdu` over secure messaging and returns the verified response.
    fn secure_exchange<C: TagChannel>(
        &self,
        channel: &mut C,
        sm: &mut SecureChannel,
        apdu: &Apdu,
    ) -> Result<ResponseApdu, EmrtdError> {
        let protected = sm.protect(apdu)?;
        let response = transceive(channel, &protected, self.config.response_timeout)?;
        let response = sm.unprotect(&response)?;
        if !response.is_success() {
            error!(
                "Received invalid SW for command {}: {:02X} {:02X}",
                crate::bytes2hex(&apdu.header()),
                response.sw1(),
                response.sw2()
            );
            return Err(card_status_error(response.sw1(), response.sw2()));
        }
        Ok(response)
    }

    /// Selects the file of `id` and reads it completely.
    fn read_file<C: TagChannel>(
        &self,
        channel: &mut C,
        sm: &mut SecureChannel,
        id: DataGroupId,
    ) -> Result<Vec<u8>, EmrtdError> {
        info!("Reading {id}...");
        trace!("Selecting File {id}: {}...", crate::bytes2hex(&id.file_id()));
        self.secure_exchange(channel, sm, &Apdu::select_file(id.file_id()))?;

        trace!("Reading first 4 bytes from {id}...");
        let mut data = self
            .secure_exchange(channel, sm, &Apdu::read_binary(0, 4))?
            .into_data();
        if data.len() < 2 {
            error!(
                "{id} header must be at least 2 bytes long, found {}",
                data.len()
            );
            return Err(EmrtdError::InvalidResponse("Data group header is too short"));
        }
        let (value_len, len_len) = decode_length(&data[1..])?;
        let data_len = 1 + len_len + value_len;
        debug!("{id} is {data_len} bytes long");
        data.truncate(data_len);

        while data.len() < data_len {
            let offset = data.len();
            if offset > MAX_READ_OFFSET {
                error!("{id} is too large to be read with short READ BINARY, {data_len} bytes");
                return Err(EmrtdError::InvalidResponse(
                    "Data group is too large for READ BINARY offsets",
                ));
            }
            let le = (data_len - offset).min(self.config.max_read_length);
            trace!("Reading {le} bytes of {id} at offset {offset}...");
            let apdu = Apdu::read_binary(u16::try_from(offset).map_err(EmrtdError::IntCastError)?, le);
            let chunk = self.secure_exchange(channel, sm, &apdu)?.into_data();
            if chunk.is_empty() {
                error!("Requested {le} bytes of {id} at offset {offset} but received 0 bytes");
                return Err(EmrtdError::InvalidResponse(
                    "Card returned no data for READ BINARY",
                ));
            }
            data.extend_from_slice(&chunk);
        }

        if data.len() != data_len {
            error!(
                "Error while reading {id}, expected {data_len} bytes, found {}",
                data.len()
            );
            return Err(EmrtdError::InvalidResponse(
                "Card returned more data than requested",
            ));
        }
        Ok(data)
    }
}
