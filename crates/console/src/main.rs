//! EEPROM Programmer Console - Main Entry Point

use ach_protocol::{PacketParser, ParserConfig};
use bus_driver::mock::MockChip;
use bus_driver::WallClockDelay;
use console::{init_logging, open_transport, spawn_receiver, ConsoleConfig, Session};
use memory_programmer::{MemoryProgrammer, ProgrammerConfig};
use ring_buffer::RingBuffer;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_logging();

    info!("=== EEPROM Programmer Console v{} ===", env!("CARGO_PKG_VERSION"));

    let config = ConsoleConfig::load()?;
    let (delimiter, terminator) = config.framing_bytes()?;

    let rx = Arc::new(RingBuffer::new(config.buffer_capacity));
    let transport = open_transport(&config)?;
    spawn_receiver(transport.reader, Arc::clone(&rx));

    // The hosted build drives the in-process simulated chip; a hardware
    // port binds real GPIO behind the same pin seam
    let chip = MockChip::new();
    info!(
        cells = MockChip::MEMORY_BYTES,
        "simulated AT28C16 wired to the bus driver"
    );

    let parser = PacketParser::new(ParserConfig {
        delimiter,
        terminator,
        page_size: config.page_size,
    });
    let programmer = MemoryProgrammer::new(
        chip.pins(),
        WallClockDelay,
        ProgrammerConfig {
            write_cycle_ms: config.write_cycle_ms,
        },
    );

    let mut session = Session::new(rx, parser, programmer, transport.writer);
    session.run(config.poll_interval()).await?;

    Ok(())
}
