//! Byte Transports
//!
//! One seam for the operator-facing byte link: stdin/stdout for local use
//! against the simulated chip, or a serial port for driving the console
//! remotely. The receive half runs on its own task and pushes single bytes
//! into the ring buffer, taking the place a per-byte UART receive
//! interrupt holds on a microcontroller.

use crate::config::ConsoleConfig;
use crate::error::ConsoleError;
use ring_buffer::RingBuffer;
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tokio::task::JoinHandle;
use tokio_serial::SerialPortBuilderExt;
use tracing::{info, warn};

/// Reader/writer halves of an open transport
pub struct TransportPair {
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    pub writer: Box<dyn AsyncWrite + Send + Unpin>,
}

/// Open the transport named by the configuration
pub fn open_transport(config: &ConsoleConfig) -> Result<TransportPair, ConsoleError> {
    match config.transport.as_str() {
        "stdio" => {
            info!("using stdio transport");
            Ok(TransportPair {
                reader: Box::new(tokio::io::stdin()),
                writer: Box::new(tokio::io::stdout()),
            })
        }
        "serial" => {
            info!(
                device = %config.serial_device,
                baud = config.serial_baud,
                "opening serial transport"
            );
            let stream = tokio_serial::new(&config.serial_device, config.serial_baud)
                .open_native_async()?;
            let (reader, writer) = tokio::io::split(stream);
            Ok(TransportPair {
                reader: Box::new(reader),
                writer: Box::new(writer),
            })
        }
        other => Err(ConsoleError::UnknownTransport(other.to_string())),
    }
}

/// Feed received bytes into the ring buffer, one at a time
///
/// Under sustained overflow the oldest unread byte is dropped rather than
/// the link being stalled; the command channel prefers fresh input.
pub fn spawn_receiver<R>(mut reader: R, rx: Arc<RingBuffer>) -> JoinHandle<()>
where
    R: AsyncRead + Send + Unpin + 'static,
{
    tokio::spawn(async move {
        let mut byte = [0u8; 1];
        loop {
            match reader.read(&mut byte).await {
                Ok(0) => {
                    info!("transport closed, receiver stopping");
                    break;
                }
                Ok(_) => rx.write_overwrite(byte[0]),
                Err(error) => {
                    warn!(%error, "transport read failed, receiver stopping");
                    break;
                }
            }
        }
    })
}
