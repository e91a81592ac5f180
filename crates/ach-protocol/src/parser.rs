//! Staged Packet Parser
//!
//! Consumes bytes queued in the ring buffer and produces validated
//! instruction, address, and data packets. The caller sequences the stages
//! (instruction, then address, then data where the instruction takes one);
//! each call either completes its stage, reports that not enough bytes have
//! arrived yet (`Ok(None)`, nothing consumed), or fails with a specific
//! [`ParseError`] after clearing both the ring buffer and the partial packet.

use crate::codec::{classify_separator, decode_hex, Separator};
use crate::error::ParseError;
use crate::framing::{
    CODED_ADDR_LEN, CODED_BYTE_LEN, DEFAULT_DELIMITER, DEFAULT_TERMINATOR, INSTRUCTION_LEN,
    PAGE_SIZE,
};
use crate::instruction::Instruction;
use crate::ADDRESS_MAX;
use ring_buffer::RingBuffer;
use tracing::debug;

/// Parser configuration
#[derive(Debug, Clone)]
pub struct ParserConfig {
    /// Character separating fields within one packet
    pub delimiter: u8,
    /// Character ending a packet
    pub terminator: u8,
    /// Maximum data bytes in one data packet
    pub page_size: usize,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            delimiter: DEFAULT_DELIMITER,
            terminator: DEFAULT_TERMINATOR,
            page_size: PAGE_SIZE,
        }
    }
}

/// Decoded command packet, populated stage by stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Packet {
    /// Accepted instruction, set by the instruction stage
    pub instruction: Option<Instruction>,
    /// First (or only) target address
    pub start_address: u16,
    /// Last target address; equals `start_address` for single modes
    pub end_address: u16,
    /// Data page for write instructions
    pub data: Vec<u8>,
}

impl Packet {
    /// Zero every field, dropping any partially decoded state
    pub fn clear(&mut self) {
        self.instruction = None;
        self.start_address = 0;
        self.end_address = 0;
        self.data.clear();
    }
}

/// Multi-stage parser for the ASCII-coded-hex command protocol
pub struct PacketParser {
    delimiter: u8,
    terminator: u8,
    page_size: usize,
    packet: Packet,
}

impl PacketParser {
    /// Create a parser with the given framing configuration
    pub fn new(config: ParserConfig) -> Self {
        Self {
            delimiter: config.delimiter,
            terminator: config.terminator,
            page_size: config.page_size,
            packet: Packet::default(),
        }
    }

    /// The packet decoded so far
    pub fn packet(&self) -> &Packet {
        &self.packet
    }

    /// Maximum data bytes one data packet may carry
    pub fn page_size(&self) -> usize {
        self.page_size
    }

    /// Drop any decoded packet state, e.g. when the session resynchronizes
    pub fn clear_packet(&mut self) {
        self.packet.clear();
    }

    /// Instruction stage: `<code><terminator>`
    ///
    /// Returns `Ok(None)` until both bytes are buffered; nothing is
    /// consumed in that case.
    pub fn parse_instruction(
        &mut self,
        rx: &RingBuffer,
    ) -> Result<Option<Instruction>, ParseError> {
        if rx.len() < INSTRUCTION_LEN {
            return Ok(None);
        }
        let (Ok(code), Ok(sep)) = (rx.read(), rx.read()) else {
            return Ok(None);
        };

        if classify_separator(sep, self.delimiter, self.terminator) != Separator::Terminator {
            return Err(self.abort(rx, ParseError::InvalidFormat));
        }
        let Some(instruction) = Instruction::from_byte(code) else {
            return Err(self.abort(rx, ParseError::InvalidInstruction(code)));
        };

        self.packet.clear();
        self.packet.instruction = Some(instruction);
        debug!(code = %char::from(code), "instruction accepted");
        Ok(Some(instruction))
    }

    /// Address stage: one field for single modes, start/end pair for
    /// ranged modes
    ///
    /// A lone address must be followed by the terminator; in a pair the
    /// first field takes the delimiter and the second the terminator. Any
    /// other placement is `InvalidFormat`. Addresses are range-checked
    /// here, before anything can reach the bus-driving layer.
    pub fn parse_address(&mut self, rx: &RingBuffer) -> Result<Option<(u16, u16)>, ParseError> {
        let Some(instruction) = self.packet.instruction else {
            return Err(self.abort(rx, ParseError::InvalidFormat));
        };

        let fields = if instruction.is_ranged() { 2 } else { 1 };
        if rx.len() < fields * (CODED_ADDR_LEN + 1) {
            return Ok(None);
        }

        let window = if instruction.is_ranged() {
            let Some(first) = self.read_field(rx, CODED_ADDR_LEN) else {
                return Ok(None);
            };
            let (start, sep) = first.map_err(|e| self.abort(rx, e))?;
            if sep != Separator::Delimiter {
                return Err(self.abort(rx, ParseError::InvalidFormat));
            }

            let Some(second) = self.read_field(rx, CODED_ADDR_LEN) else {
                return Ok(None);
            };
            let (end, sep) = second.map_err(|e| self.abort(rx, e))?;
            if sep != Separator::Terminator {
                return Err(self.abort(rx, ParseError::InvalidFormat));
            }

            let start = self.validate_address(rx, start)?;
            let end = self.validate_address(rx, end)?;
            if end <= start {
                return Err(self.abort(rx, ParseError::InvalidRange { start, end }));
            }
            (start, end)
        } else {
            let Some(field) = self.read_field(rx, CODED_ADDR_LEN) else {
                return Ok(None);
            };
            let (value, sep) = field.map_err(|e| self.abort(rx, e))?;
            // Exactly one address is expected, so a delimiter here is a
            // framing error just like any stray character
            if sep != Separator::Terminator {
                return Err(self.abort(rx, ParseError::InvalidFormat));
            }

            let address = self.validate_address(rx, value)?;
            (address, address)
        };

        self.packet.start_address = window.0;
        self.packet.end_address = window.1;
        debug!(start = window.0, end = window.1, "address accepted");
        Ok(Some(window))
    }

    /// Data stage: `count` two-digit fields, delimiter-separated,
    /// terminator-ended
    ///
    /// The first bad field aborts the whole page; an early terminator does
    /// not produce a short packet.
    pub fn parse_data(&mut self, rx: &RingBuffer, count: usize) -> Result<Option<&[u8]>, ParseError> {
        if count == 0 || count > self.page_size {
            let (start, end) = (self.packet.start_address, self.packet.end_address);
            return Err(self.abort(rx, ParseError::InvalidRange { start, end }));
        }
        if rx.len() < count * (CODED_BYTE_LEN + 1) {
            return Ok(None);
        }

        let mut page = Vec::with_capacity(count);
        for index in 0..count {
            let Some(field) = self.read_field(rx, CODED_BYTE_LEN) else {
                return Ok(None);
            };
            let (value, sep) = field.map_err(|e| self.abort(rx, e))?;

            let expected = if index + 1 == count {
                Separator::Terminator
            } else {
                Separator::Delimiter
            };
            if sep != expected {
                return Err(self.abort(rx, ParseError::InvalidFormat));
            }
            page.push(value as u8);
        }

        self.packet.data = page;
        debug!(bytes = count, "data page accepted");
        Ok(Some(&self.packet.data))
    }

    /// Read one coded field plus its framing byte
    ///
    /// `None` means the buffer underflowed mid-field; the stage entry
    /// checks make that unreachable in practice, and it is surfaced as
    /// "empty" rather than an error either way.
    fn read_field(
        &self,
        rx: &RingBuffer,
        width: usize,
    ) -> Option<Result<(u32, Separator), ParseError>> {
        let mut digits = [0u8; CODED_ADDR_LEN];
        for slot in digits.iter_mut().take(width) {
            match rx.read() {
                Ok(byte) => *slot = byte,
                Err(_) => return None,
            }
        }
        let Ok(sep) = rx.read() else {
            return None;
        };

        // Content validity is checked before framing so corrupt encoding
        // and misplaced framing stay distinct error kinds
        let Some(value) = decode_hex(&digits[..width]) else {
            return Some(Err(ParseError::InvalidData));
        };
        Some(Ok((
            value,
            classify_separator(sep, self.delimiter, self.terminator),
        )))
    }

    fn validate_address(&mut self, rx: &RingBuffer, address: u32) -> Result<u16, ParseError> {
        if address > ADDRESS_MAX as u32 {
            return Err(self.abort(
                rx,
                ParseError::InvalidAddress {
                    address: address as u16,
                },
            ));
        }
        Ok(address as u16)
    }

    /// Discard the buffered bytes and the partial packet, passing the
    /// error through for the caller to report
    fn abort(&mut self, rx: &RingBuffer, error: ParseError) -> ParseError {
        rx.reset();
        self.packet.clear();
        debug!(%error, "packet discarded");
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(rx: &RingBuffer, bytes: &[u8]) {
        for &byte in bytes {
            rx.write_overwrite(byte);
        }
    }

    fn parser() -> PacketParser {
        PacketParser::new(ParserConfig::default())
    }

    fn parser_with_instruction(rx: &RingBuffer, code: u8) -> PacketParser {
        let mut parser = parser();
        feed(rx, &[code, b'\n']);
        parser.parse_instruction(rx).unwrap().unwrap();
        parser
    }

    #[test]
    fn test_instruction_accepts_read() {
        let rx = RingBuffer::new(64);
        let mut parser = parser();

        feed(&rx, b"a\n");
        let instruction = parser.parse_instruction(&rx).unwrap();

        assert_eq!(instruction, Some(Instruction::SingleRead));
        assert_eq!(parser.packet().instruction, Some(Instruction::SingleRead));
    }

    #[test]
    fn test_instruction_rejects_bad_terminator() {
        let rx = RingBuffer::new(64);
        let mut parser = parser();

        feed(&rx, b"ax");
        assert_eq!(
            parser.parse_instruction(&rx),
            Err(ParseError::InvalidFormat)
        );
        // Error path cleared the buffer and the packet
        assert!(rx.is_empty());
        assert_eq!(parser.packet().instruction, None);
    }

    #[test]
    fn test_instruction_rejects_unknown_code() {
        let rx = RingBuffer::new(64);
        let mut parser = parser();

        feed(&rx, b"z\n");
        assert_eq!(
            parser.parse_instruction(&rx),
            Err(ParseError::InvalidInstruction(b'z'))
        );
    }

    #[test]
    fn test_instruction_waits_without_consuming() {
        let rx = RingBuffer::new(64);
        let mut parser = parser();

        feed(&rx, b"a");
        assert_eq!(parser.parse_instruction(&rx), Ok(None));
        assert_eq!(rx.len(), 1);

        // The missing byte arrives and the stage completes
        feed(&rx, b"\n");
        assert_eq!(
            parser.parse_instruction(&rx).unwrap(),
            Some(Instruction::SingleRead)
        );
    }

    #[test]
    fn test_single_address_accepted() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'a');

        feed(&rx, b"0AB\n");
        assert_eq!(parser.parse_address(&rx).unwrap(), Some((0x0AB, 0x0AB)));
        assert_eq!(parser.packet().start_address, 0x0AB);
        assert_eq!(parser.packet().end_address, 0x0AB);
    }

    #[test]
    fn test_single_address_rejects_delimiter() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'a');

        feed(&rx, b"0AB 1FF\n");
        assert_eq!(parser.parse_address(&rx), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn test_ranged_address_accepted() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"123 456\n");
        assert_eq!(parser.parse_address(&rx).unwrap(), Some((0x123, 0x456)));
    }

    #[test]
    fn test_ranged_address_rejects_terminator_after_first_field() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"123\n456\n");
        assert_eq!(parser.parse_address(&rx), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn test_ranged_address_rejects_delimiter_after_second_field() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"123 456 \n");
        assert_eq!(parser.parse_address(&rx), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn test_address_non_hex_is_data_error() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'a');

        feed(&rx, b"1G3\n");
        assert_eq!(parser.parse_address(&rx), Err(ParseError::InvalidData));
    }

    #[test]
    fn test_address_beyond_device_space() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'a');

        feed(&rx, b"800\n");
        assert_eq!(
            parser.parse_address(&rx),
            Err(ParseError::InvalidAddress { address: 0x800 })
        );
    }

    #[test]
    fn test_inverted_range_rejected_at_parse_time() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"456 123\n");
        assert_eq!(
            parser.parse_address(&rx),
            Err(ParseError::InvalidRange {
                start: 0x456,
                end: 0x123
            })
        );
    }

    #[test]
    fn test_degenerate_range_rejected() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"123 123\n");
        assert_eq!(
            parser.parse_address(&rx),
            Err(ParseError::InvalidRange {
                start: 0x123,
                end: 0x123
            })
        );
    }

    #[test]
    fn test_ranged_address_waits_for_both_fields() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'c');

        feed(&rx, b"123 4");
        assert_eq!(parser.parse_address(&rx), Ok(None));
        assert_eq!(rx.len(), 5);
    }

    #[test]
    fn test_data_page_accepted() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'd');

        feed(&rx, b"0A FF\n");
        let page = parser.parse_data(&rx, 2).unwrap().unwrap().to_vec();
        assert_eq!(page, vec![0x0A, 0xFF]);
    }

    #[test]
    fn test_data_non_hex_rejected() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'd');

        feed(&rx, b"0A FG\n");
        assert_eq!(parser.parse_data(&rx, 2), Err(ParseError::InvalidData));
    }

    #[test]
    fn test_data_early_terminator_is_format_error() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'd');

        feed(&rx, b"0A\nFF \n");
        assert_eq!(parser.parse_data(&rx, 2), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn test_data_trailing_delimiter_is_format_error() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'd');

        feed(&rx, b"0A FF ");
        assert_eq!(parser.parse_data(&rx, 2), Err(ParseError::InvalidFormat));
    }

    #[test]
    fn test_data_waits_without_consuming() {
        let rx = RingBuffer::new(64);
        let mut parser = parser_with_instruction(&rx, b'd');

        feed(&rx, b"0A F");
        assert_eq!(parser.parse_data(&rx, 2), Ok(None));
        assert_eq!(rx.len(), 4);
    }

    #[test]
    fn test_data_count_must_fit_page() {
        let rx = RingBuffer::new(256);
        let mut parser = parser_with_instruction(&rx, b'd');

        assert!(matches!(
            parser.parse_data(&rx, PAGE_SIZE + 1),
            Err(ParseError::InvalidRange { .. })
        ));
    }

    #[test]
    fn test_custom_framing_characters() {
        let rx = RingBuffer::new(64);
        let mut parser = PacketParser::new(ParserConfig {
            delimiter: b',',
            terminator: b';',
            page_size: PAGE_SIZE,
        });

        feed(&rx, b"c;");
        parser.parse_instruction(&rx).unwrap().unwrap();
        feed(&rx, b"100,200;");
        assert_eq!(parser.parse_address(&rx).unwrap(), Some((0x100, 0x200)));
    }

    #[test]
    fn test_success_leaves_following_bytes_buffered() {
        let rx = RingBuffer::new(64);
        let mut parser = parser();

        feed(&rx, b"a\n0AB\n");
        parser.parse_instruction(&rx).unwrap().unwrap();
        assert_eq!(rx.len(), 4);
        assert_eq!(parser.parse_address(&rx).unwrap(), Some((0x0AB, 0x0AB)));
    }
}
