//! Contactless transport abstraction.
//!
//! A platform hands responses back through a completion callback. The reader
//! turns that into a blocking exchange bounded by a timeout.

use alloc::{boxed::Box, vec::Vec};
use core::time::Duration;
use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{debug, error, trace};

use crate::{apdu::ResponseApdu, bytes2hex, error::EmrtdError};

/// Completion callback receiving the raw response, status word included.
pub type ResponseCallback = Box<dyn FnOnce(Result<Vec<u8>, EmrtdError>) + Send + 'static>;

/// An open session with a tag.
pub trait TagChannel {
    /// Sends a command APDU. `on_response` is called at most once.
    fn send_command(&mut self, command: &[u8], on_response: ResponseCallback);

    /// Ends the session with the tag.
    ///
    /// # Errors
    ///
    /// Transport specific failures while releasing the tag.
    fn disconnect(&mut self) -> Result<(), EmrtdError>;
}

/// Something that can open a session with a tag.
pub trait TagTransport {
    type Channel: TagChannel;

    /// Waits for and connects to a tag.
    ///
    /// # Errors
    ///
    /// * `EmrtdError::TransportUnavailable` if no tag can be reached.
    fn connect(&mut self) -> Result<Self::Channel, EmrtdError>;
}

/// Sends `command` and blocks until its response arrives or `timeout` passes.
///
/// # Errors
///
/// * `EmrtdError::NoResponseFromTag` on timeout.
/// * `EmrtdError::TransportClosed` if the callback is dropped without being called.
/// * Any error the transport reports, or `EmrtdError::InvalidResponse` for a
///   response shorter than a status word.
pub fn transceive<C>(
    channel: &mut C,
    command: &[u8],
    timeout: Duration,
) -> Result<ResponseApdu, EmrtdError>
where
    C: TagChannel + ?Sized,
{
    let (sender, receiver) = bounded(1);

    trace!("Sending APDU: {}", bytes2hex(command));
    channel.send_command(
        command,
        Box::new(move |response| {
            if sender.try_send(response).is_err() {
                debug!("Dropping response that arrived after the reader stopped waiting");
            }
        }),
    );

    let raw = match receiver.recv_timeout(timeout) {
        Ok(response) => response?,
        Err(RecvTimeoutError::Timeout) => {
            error!("No response from tag within {timeout:?}");
            return Err(EmrtdError::NoResponseFromTag);
        }
        Err(RecvTimeoutError::Disconnected) => {
            error!("Transport dropped the response callback");
            return Err(EmrtdError::TransportClosed);
        }
    };

    let response = ResponseApdu::from_bytes(&raw)?;
    trace!(
        "APDU response ({:02X}{:02X}): {}",
        response.sw1(),
        response.sw2(),
        bytes2hex(response.data())
    );
    Ok(response)
}

#[cfg(feature = "pcsc")]
pub use self::pcsc_transport::{PcscChannel, PcscTransport};

#[cfg(feature = "pcsc")]
mod pcsc_transport {
    use alloc::{format, string::String};
    use pcsc::{Card, Context, Disposition, Protocols, Scope, ShareMode};
    use std::ffi::CString;
    use tracing::{error, info};

    use super::{ResponseCallback, TagChannel, TagTransport};
    use crate::error::EmrtdError;

    /// Transport over a PC/SC contactless reader.
    pub struct PcscTransport {
        context: Context,
        reader_name: Option<String>,
    }

    impl PcscTransport {
        /// Establishes a PC/SC context. Without a reader name the first
        /// reader found is used on every connect.
        ///
        /// # Errors
        ///
        /// * `EmrtdError::PcscError` if the PC/SC service is not reachable.
        pub fn new(reader_name: Option<&str>) -> Result<Self, EmrtdError> {
            let context = Context::establish(Scope::User).map_err(|err| {
                error!("Failed to establish PC/SC context: {err}");
                EmrtdError::PcscError(err)
            })?;
            Ok(Self {
                context,
                reader_name: reader_name.map(String::from),
            })
        }

        fn reader(&self) -> Result<CString, EmrtdError> {
            if let Some(name) = &self.reader_name {
                return CString::new(name.as_bytes()).map_err(|_| {
                    error!("Reader name {name} contains a NUL byte");
                    EmrtdError::TransportUnavailable(format!("invalid reader name {name}"))
                });
            }

            let mut readers_buf = [0; 2048];
            let mut readers = self
                .context
                .list_readers(&mut readers_buf)
                .map_err(EmrtdError::PcscError)?;
            let Some(reader) = readers.next() else {
                error!("No PC/SC readers are connected");
                return Err(EmrtdError::TransportUnavailable(String::from(
                    "no readers are connected",
                )));
            };
            Ok(reader.to_owned())
        }
    }

    impl TagTransport for PcscTransport {
        type Channel = PcscChannel;

        fn connect(&mut self) -> Result<PcscChannel, EmrtdError> {
            let reader = self.reader()?;
            info!("Using reader: {reader:?}");

            match self.context.connect(&reader, ShareMode::Shared, Protocols::ANY) {
                Ok(card) => Ok(PcscChannel { card: Some(card) }),
                Err(pcsc::Error::NoSmartcard) => {
                    error!("No card in reader {reader:?}");
                    Err(EmrtdError::TransportUnavailable(String::from(
                        "no card in reader",
                    )))
                }
                Err(err) => {
                    error!("Failed to connect to card: {err}");
                    Err(EmrtdError::PcscError(err))
                }
            }
        }
    }

    /// A connected PC/SC card. Transmission is synchronous, so the callback
    /// runs before `send_command` returns.
    pub struct PcscChannel {
        card: Option<Card>,
    }

    impl TagChannel for PcscChannel {
        fn send_command(&mut self, command: &[u8], on_response: ResponseCallback) {
            let Some(card) = &self.card else {
                on_response(Err(EmrtdError::TransportClosed));
                return;
            };

            let mut response_buffer = [0; pcsc::MAX_BUFFER_SIZE];
            let result = card
                .transmit(command, &mut response_buffer)
                .map(<[u8]>::to_vec)
                .map_err(|err| {
                    error!("PC/SC transmit failed: {err}");
                    match err {
                        pcsc::Error::RemovedCard | pcsc::Error::ResetCard => {
                            EmrtdError::TransportClosed
                        }
                        err => EmrtdError::PcscError(err),
                    }
                });
            on_response(result);
        }

        fn disconnect(&mut self) -> Result<(), EmrtdError> {
            let Some(card) = self.card.take() else {
                return Ok(());
            };
            card.disconnect(Disposition::LeaveCard).map_err(|(_, err)| {
                error!("Failed to disconnect from card: {err}");
                EmrtdError::PcscError(err)
            })
        }
    }

    impl Drop for PcscChannel {
        fn drop(&mut self) {
            if let Some(card) = self.card.take() {
                let _ = card.disconnect(Disposition::LeaveCard);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hex_literal::hex;
    use std::thread;

    struct ImmediateChannel {
        response: Vec<u8>,
    }

    impl TagChannel for ImmediateChannel {
        fn send_command(&mut self, _command: &[u8], on_response: ResponseCallback) {
            on_response(Ok(self.response.clone()));
        }

        fn disconnect(&mut self) -> Result<(), EmrtdError> {
            Ok(())
        }
    }

    /// Answers from another thread, like a platform NFC stack would.
    struct ThreadedChannel {
        delay: Duration,
        handles: Vec<thread::JoinHandle<()>>,
    }

    impl TagChannel for ThreadedChannel {
        fn send_command(&mut self, _command: &[u8], on_response: ResponseCallback) {
            let delay = self.delay;
            let handle = thread::spawn(move || {
                thread::sleep(delay);
                on_response(Ok(hex!("9000").to_vec()));
            });
            self.handles.push(handle);
        }

        fn disconnect(&mut self) -> Result<(), EmrtdError> {
            Ok(())
        }
    }

    struct DroppingChannel;

    impl TagChannel for DroppingChannel {
        fn send_command(&mut self, _command: &[u8], on_response: ResponseCallback) {
            drop(on_response);
        }

        fn disconnect(&mut self) -> Result<(), EmrtdError> {
            Ok(())
        }
    }

    #[test]
    fn test_transceive_immediate() -> Result<(), EmrtdError> {
        let mut channel = ImmediateChannel {
            response: hex!("4608F91988702212 9000").to_vec(),
        };
        let response = transceive(&mut channel, &hex!("0084000008"), Duration::from_secs(1))?;
        assert_eq!(response.data(), hex!("4608F91988702212"));
        assert!(response.is_success());
        Ok(())
    }

    #[test]
    fn test_transceive_from_other_thread() -> Result<(), EmrtdError> {
        let mut channel = ThreadedChannel {
            delay: Duration::from_millis(10),
            handles: Vec::new(),
        };
        let response = transceive(&mut channel, &hex!("0084000008"), Duration::from_secs(5))?;
        assert_eq!(response.status(), [0x90, 0x00]);
        Ok(())
    }

    #[test]
    fn test_transceive_timeout() {
        let mut channel = ThreadedChannel {
            delay: Duration::from_millis(500),
            handles: Vec::new(),
        };
        let result = transceive(&mut channel, &hex!("0084000008"), Duration::from_millis(20));
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::NoResponseFromTag)));

        // The late response must not panic when it finds nobody waiting.
        for handle in channel.handles.drain(..) {
            assert!(handle.join().is_ok());
        }
    }

    #[test]
    fn test_transceive_callback_dropped() {
        let result = transceive(&mut DroppingChannel, &hex!("0084000008"), Duration::from_secs(1));
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::TransportClosed)));
    }

    #[test]
    fn test_transceive_short_response() {
        let mut channel = ImmediateChannel {
            response: hex!("90").to_vec(),
        };
        let result = transceive(&mut channel, &hex!("0084000008"), Duration::from_secs(1));
        assert!(result.is_err_and(|e| matches!(e, EmrtdError::InvalidResponse(_))));
    }
}
