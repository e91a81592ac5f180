//! EEPROM Programmer Console
//!
//! Wires the full pipeline together: a transport feeds received bytes into
//! the ring buffer, the session state machine polls the packet parser and
//! drives the memory programmer, and prompt/status text flows back out the
//! same transport. The default wiring talks to the in-process simulated
//! chip; the pin seam is where a real GPIO backend would bind instead.

mod config;
mod dump;
mod error;
mod session;
mod transport;

pub use config::ConsoleConfig;
pub use dump::hex_dump;
pub use error::ConsoleError;
pub use session::Session;
pub use transport::{open_transport, spawn_receiver, TransportPair};

use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Initialize logging
pub fn init_logging() {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .with_target(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .expect("Failed to set tracing subscriber");
}
