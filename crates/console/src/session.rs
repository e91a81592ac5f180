//! Session State Machine
//!
//! Sequences one command cycle: instruction, then address, then (for
//! writes) data, then the bus transaction, with prompt and status text
//! sent back over the transport.
//! Every parser error falls back to the instruction stage; "not enough
//! bytes yet" prints nothing and the next poll retries.

use crate::dump::{hex_dump, DUMP_COLUMNS};
use ach_protocol::{Instruction, PacketParser, ParseError};
use bus_driver::{Delay, GpioPin};
use memory_programmer::{MemoryProgrammer, ProgrammerError};
use ring_buffer::RingBuffer;
use std::io;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

/// Current parsing stage of the command cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Instruction,
    Address,
    Data,
}

/// One interactive programmer session
pub struct Session<P: GpioPin, D: Delay, W: AsyncWrite + Unpin> {
    rx: Arc<RingBuffer>,
    parser: PacketParser,
    programmer: MemoryProgrammer<P, D>,
    out: W,
    stage: Stage,
    /// Last status line sent, for suppressing consecutive duplicates
    last_status: Option<&'static str>,
}

impl<P: GpioPin, D: Delay, W: AsyncWrite + Unpin> Session<P, D, W> {
    pub fn new(
        rx: Arc<RingBuffer>,
        parser: PacketParser,
        programmer: MemoryProgrammer<P, D>,
        out: W,
    ) -> Self {
        Self {
            rx,
            parser,
            programmer,
            out,
            stage: Stage::Instruction,
            last_status: None,
        }
    }

    /// Print the startup banner and the first prompt
    pub async fn start(&mut self) -> io::Result<()> {
        self.send_line("========== AT28C16 PROGRAMMER ==========").await?;
        self.send_line("Enter Instruction:").await
    }

    /// Run the poll loop until the transport fails
    pub async fn run(&mut self, poll_interval: Duration) -> io::Result<()> {
        self.start().await?;
        let mut ticker = tokio::time::interval(poll_interval);
        loop {
            ticker.tick().await;
            self.poll().await?;
        }
    }

    /// Advance the state machine by at most one stage
    pub async fn poll(&mut self) -> io::Result<()> {
        match self.stage {
            Stage::Instruction => self.poll_instruction().await,
            Stage::Address => self.poll_address().await,
            Stage::Data => self.poll_data().await,
        }
    }

    async fn poll_instruction(&mut self) -> io::Result<()> {
        match self.parser.parse_instruction(&self.rx) {
            Ok(None) => Ok(()),
            Ok(Some(instruction)) => {
                info!(code = %char::from(instruction.as_byte()), "instruction accepted");
                self.last_status = None;
                self.send_line(&format!("--- {} ---", instruction.describe())).await?;
                if instruction.is_ranged() {
                    self.send_line("Enter Addresses:").await?;
                } else {
                    self.send_line("Enter Address:").await?;
                }
                self.stage = Stage::Address;
                Ok(())
            }
            Err(error) => self.reject(error).await,
        }
    }

    async fn poll_address(&mut self) -> io::Result<()> {
        let parsed = self.parser.parse_address(&self.rx);
        match parsed {
            Ok(None) => Ok(()),
            Ok(Some((start, end))) => {
                self.last_status = None;
                let instruction = self.parser.packet().instruction;
                match instruction {
                    Some(Instruction::SingleRead) => {
                        self.send_line(&format!("--- Reading Address {start:03X} ---")).await?;
                        let byte = self.programmer.read_byte(start);
                        self.send_line(&format!("  {start:03X}: {byte:02X}")).await?;
                        self.complete("Read").await
                    }
                    Some(Instruction::MultiRead) => {
                        self.send_line(&format!(
                            "--- Reading Addresses {start:03X}:{end:03X} ---"
                        ))
                        .await?;
                        self.execute_multi_read(start, end).await
                    }
                    Some(Instruction::SingleWrite) => {
                        self.send_line(&format!("--- Writing Address {start:03X} ---")).await?;
                        self.send_line("Enter Data:").await?;
                        self.stage = Stage::Data;
                        Ok(())
                    }
                    Some(Instruction::MultiWrite) => {
                        self.send_line(&format!(
                            "--- Writing Addresses {start:03X}:{end:03X} ---"
                        ))
                        .await?;
                        self.send_line("Enter Data:").await?;
                        self.stage = Stage::Data;
                        Ok(())
                    }
                    None => self.resync().await,
                }
            }
            Err(error) => self.reject(error).await,
        }
    }

    async fn poll_data(&mut self) -> io::Result<()> {
        let packet = self.parser.packet();
        let (start, end) = (packet.start_address, packet.end_address);
        let count = (end - start) as usize + 1;

        let parsed = match self.parser.parse_data(&self.rx, count) {
            Ok(Some(data)) => Ok(Some(data.to_vec())),
            Ok(None) => Ok(None),
            Err(error) => Err(error),
        };
        match parsed {
            Ok(None) => Ok(()),
            Ok(Some(bytes)) => {
                self.last_status = None;
                for line in hex_dump(&bytes, DUMP_COLUMNS) {
                    self.send_line(&line).await?;
                }
                self.send_line("--- Writing Data ---").await?;
                let result = if count == 1 {
                    self.programmer.write_byte(start, bytes[0]);
                    Ok(())
                } else {
                    self.programmer.write_range(start, end, &bytes)
                };
                match result {
                    Ok(()) => self.complete("Write").await,
                    Err(error) => self.reject_programmer(error).await,
                }
            }
            Err(error) => self.reject(error).await,
        }
    }

    async fn execute_multi_read(&mut self, start: u16, end: u16) -> io::Result<()> {
        let bytes: Vec<u8> = match self.programmer.read_range(start, end) {
            Ok(reader) => reader.collect(),
            Err(error) => return self.reject_programmer(error).await,
        };
        for line in hex_dump(&bytes, DUMP_COLUMNS) {
            self.send_line(&line).await?;
        }
        self.complete("Read").await
    }

    /// Operation finished; back to the instruction prompt
    async fn complete(&mut self, operation: &str) -> io::Result<()> {
        info!(operation, "operation complete");
        self.send_line(&format!("--- {operation} Complete ---")).await?;
        self.resync().await
    }

    /// Parser already cleared the buffer and packet; report and restart
    /// the command cycle
    async fn reject(&mut self, error: ParseError) -> io::Result<()> {
        warn!(%error, "command rejected");
        let text = match error {
            ParseError::InvalidFormat => "Invalid Format",
            ParseError::InvalidData => "Invalid Data",
            ParseError::InvalidInstruction(_) => "Invalid Instruction",
            ParseError::InvalidAddress { .. } => "Invalid Address",
            ParseError::InvalidRange { .. } => "Invalid Range",
        };
        self.report_status(text).await?;
        if self.stage != Stage::Instruction {
            self.resync().await?;
        }
        Ok(())
    }

    async fn reject_programmer(&mut self, error: ProgrammerError) -> io::Result<()> {
        warn!(%error, "operation rejected");
        let text = match error {
            ProgrammerError::InvalidRange { .. } => "Invalid Range",
            ProgrammerError::ShortInput { .. } => "Short Input",
            ProgrammerError::BusFault(_) => "Bus Fault",
        };
        self.report_status(text).await?;
        self.resync().await
    }

    /// Send a status line unless it repeats the previous one
    async fn report_status(&mut self, text: &'static str) -> io::Result<()> {
        if self.last_status != Some(text) {
            self.send_line(&format!("!! {text}")).await?;
        }
        self.last_status = Some(text);
        Ok(())
    }

    /// Restart the command cycle at the instruction stage
    async fn resync(&mut self) -> io::Result<()> {
        self.parser.clear_packet();
        self.stage = Stage::Instruction;
        self.send_line("Enter Instruction:").await
    }

    async fn send_line(&mut self, line: &str) -> io::Result<()> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ach_protocol::ParserConfig;
    use bus_driver::mock::{MockChip, MockPin};
    use bus_driver::NoopDelay;
    use memory_programmer::ProgrammerConfig;
    use std::pin::Pin;
    use std::sync::Mutex;
    use std::task::{Context, Poll};

    /// Writer capturing transmitted text for assertions
    #[derive(Clone, Default)]
    struct CaptureWriter(Arc<Mutex<Vec<u8>>>);

    impl CaptureWriter {
        fn text(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    impl AsyncWrite for CaptureWriter {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    struct Harness {
        chip: MockChip,
        rx: Arc<RingBuffer>,
        out: CaptureWriter,
        session: Session<MockPin, NoopDelay, CaptureWriter>,
    }

    fn harness() -> Harness {
        let chip = MockChip::new();
        let rx = Arc::new(RingBuffer::new(256));
        let out = CaptureWriter::default();
        let session = Session::new(
            Arc::clone(&rx),
            PacketParser::new(ParserConfig::default()),
            MemoryProgrammer::new(chip.pins(), NoopDelay, ProgrammerConfig::default()),
            out.clone(),
        );
        Harness {
            chip,
            rx,
            out,
            session,
        }
    }

    fn feed(rx: &RingBuffer, bytes: &[u8]) {
        for &byte in bytes {
            rx.write_overwrite(byte);
        }
    }

    #[tokio::test]
    async fn test_single_write_walkthrough() {
        let mut h = harness();
        h.session.start().await.unwrap();

        feed(&h.rx, b"b\n");
        h.session.poll().await.unwrap();
        feed(&h.rx, b"0AB\n");
        h.session.poll().await.unwrap();
        feed(&h.rx, b"FF\n");
        h.session.poll().await.unwrap();

        assert_eq!(h.chip.cell(0x0AB), 0xFF);
        let text = h.out.text();
        assert!(text.contains("--- Single-Byte Write ---"));
        assert!(text.contains("--- Writing Address 0AB ---"));
        assert!(text.contains("--- Write Complete ---"));
    }

    #[tokio::test]
    async fn test_single_read_reports_cell() {
        let mut h = harness();
        h.chip.load(0x123, &[0x5A]);

        feed(&h.rx, b"a\n123\n");
        h.session.poll().await.unwrap();
        h.session.poll().await.unwrap();

        let text = h.out.text();
        assert!(text.contains("--- Reading Address 123 ---"));
        assert!(text.contains("  123: 5A"));
        assert!(text.contains("--- Read Complete ---"));
    }

    #[tokio::test]
    async fn test_multi_write_then_multi_read() {
        let mut h = harness();

        feed(&h.rx, b"d\n100 103\n");
        h.session.poll().await.unwrap();
        h.session.poll().await.unwrap();
        feed(&h.rx, b"DE AD BE EF\n");
        h.session.poll().await.unwrap();

        assert_eq!(h.chip.cell(0x100), 0xDE);
        assert_eq!(h.chip.cell(0x103), 0xEF);

        feed(&h.rx, b"c\n100 103\n");
        h.session.poll().await.unwrap();
        h.session.poll().await.unwrap();

        let text = h.out.text();
        assert!(text.contains("--- Reading Addresses 100:103 ---"));
        assert!(text.contains(" xDE xAD xBE xEF"));
        assert_eq!(h.chip.bus_conflicts(), 0);
    }

    #[tokio::test]
    async fn test_error_returns_to_instruction_stage() {
        let mut h = harness();

        feed(&h.rx, b"a\n");
        h.session.poll().await.unwrap();
        // Ranged input where a single address is expected
        feed(&h.rx, b"123 456\n");
        h.session.poll().await.unwrap();

        let text = h.out.text();
        assert!(text.contains("!! Invalid Format"));
        assert!(text.ends_with("Enter Instruction:\n"));

        // The cycle restarts cleanly after the error
        feed(&h.rx, b"a\n");
        h.session.poll().await.unwrap();
        assert!(h.out.text().contains("--- Single-Byte Read ---"));
    }

    #[tokio::test]
    async fn test_duplicate_statuses_suppressed() {
        let mut h = harness();

        feed(&h.rx, b"z\n");
        h.session.poll().await.unwrap();
        feed(&h.rx, b"z\n");
        h.session.poll().await.unwrap();

        let text = h.out.text();
        assert_eq!(text.matches("!! Invalid Instruction").count(), 1);

        // A different status still gets through
        feed(&h.rx, b"ax");
        h.session.poll().await.unwrap();
        assert!(h.out.text().contains("!! Invalid Format"));
    }

    #[tokio::test]
    async fn test_empty_buffer_prints_nothing() {
        let mut h = harness();
        h.session.poll().await.unwrap();
        assert!(h.out.text().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_write_range_rejected_before_data() {
        let mut h = harness();

        // 0x000..0x0FF covers 256 bytes, far beyond one 16-byte page
        feed(&h.rx, b"d\n000 0FF\n");
        h.session.poll().await.unwrap();
        h.session.poll().await.unwrap();
        h.session.poll().await.unwrap();

        let text = h.out.text();
        assert!(text.contains("!! Invalid Range"));
        assert!(h.chip.writes().is_empty());
    }
}
