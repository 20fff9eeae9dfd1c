/*!
    word format of the FPGA command/response FIFOs, and the synchronous channel trait used to reach them.

    The FPGA serializes each subnet block of a bus list onto its RS-485 line. Every 16-bit word
    pushed to the command FIFO is either one transmitted data byte (tagged with [DATA_TAG], the
    payload left-shifted past the start bit) or a control word whose high nibble selects an
    operation: end the frame, capture a hardware timestamp, idle for a delay, arm a response
    window, trigger transmission, raise the completion IRQ.

    The goal of this file is to gather the whole word format at one place, so what you see here is
    exactly what the FPGA expects, no more, no less.
*/

use core::time::Duration;
use bilge::prelude::*;

use crate::error::IlcResult;
use crate::topology::SUBNET_COUNT;

/// tag bits marking a command word as one transmitted data byte
pub const DATA_TAG: u16 = 0x1200;

/// terminates the frame currently assembled by the serializer
pub const TX_FRAME_END: u16 = 0x20da;
/// captures the transmit hardware timestamp, expanded to 8 raw words on the response side
pub const TX_TIMESTAMP: u16 = 0x3000;
/// idles the line without expecting an answer (broadcast tail), operand in µs
pub const TX_DELAY_US: u16 = 0x4000;
/// as [TX_DELAY_US] with the operand in ms
pub const TX_DELAY_MS: u16 = 0x5000;
/// arms the response window of a unicast frame, operand in µs
pub const TX_WAIT_RX_US: u16 = 0x6000;
/// raises the per-subnet completion IRQ, closing a subnet block
pub const TX_IRQ_TRIGGER: u16 = 0x7000;
/// starts transmission of the words buffered since the subnet header
pub const TX_SOFTWARE_TRIGGER: u16 = 0x8000;
/// as [TX_WAIT_RX_US] with the operand in ms
pub const TX_WAIT_RX_MS: u16 = 0x9000;

/// marks the end of one device answer in the response FIFO stream
pub const RX_FRAME_END: u16 = 0xa000;

/// command FIFO targets of the five modbus subnets, written as the first raw word of a subnet block
pub const SUBNET_TX: [u8; SUBNET_COUNT] = [9, 10, 11, 12, 17];
/// response FIFO sources matching [SUBNET_TX]
pub const SUBNET_RX: [u8; SUBNET_COUNT] = [13, 14, 15, 16, 21];

/// pack one payload byte into a tagged data word
pub const fn data_word(byte: u8) -> u16 {
    ((byte as u16) << 1) | DATA_TAG
}

/// strip the tag from a data word, recovering the payload byte
pub const fn data_byte(word: u16) -> u8 {
    ((word >> 1) & 0xff) as u8
}

/// decoded view of a control word: 12-bit operand below a 4-bit opcode nibble
#[bitsize(16)]
#[derive(FromBits, DebugBits, Copy, Clone, Eq, PartialEq)]
pub struct ControlWord {
    pub value: u12,
    pub opcode: u4,
}

/**
    synchronous channel to the FPGA command/response FIFOs.

    Calls block up to the given timeout; a timeout is reported as an error and handling it
    (retry, safety escalation) belongs to the caller, this crate never retries.
*/
pub trait FpgaChannel {
    /// push a complete bus list to the command FIFO
    fn write_command_fifo(&mut self, words: &[u16], timeout: Duration) -> IlcResult<()>;
    /// push a single-frame request to the request FIFO
    fn write_request_fifo(&mut self, words: &[u16], timeout: Duration) -> IlcResult<()>;
    /// pull response words, returns how many words were read
    fn read_u16_response_fifo(&mut self, out: &mut [u16], timeout: Duration) -> IlcResult<usize>;
}
