/*!
    modbus frame buffer for the FPGA command/response FIFOs.

    [ModbusBuffer] is a fixed-capacity array of 16-bit FIFO words with an explicit cursor. Typed
    writers append payload bytes big-endian, one tagged word per byte (see [crate::fifo]); control
    writers append the untagged serializer operations. Typed readers mirror the writers, stripping
    the tag and advancing the cursor by the words consumed.

    The cursor is the in-place patch mechanism of the whole subsystem: a bus list records
    [ModbusBuffer::index] while building, and later [ModbusBuffer::set_index]s back to rewrite one
    frame without touching the rest of the buffer. After the build phase only word *values* may
    change, never the count or order of frames.

    There is deliberately no capacity or underflow branching in the read/write path: running past
    the buffer is a programmer error surfaced by the array bounds check, not a runtime condition
    this hot path pays for.
*/

use bilge::prelude::*;

use crate::fifo::{self, ControlWord};

/// capacity in 16-bit words of one bus list buffer
pub const BUFFER_CAPACITY: usize = 5120;

/// largest operand of a µs-encoded delay or response-window control word
const MICROS_DIRECT_MAX: u32 = 4095;

/// CRC-16/modbus of the given byte stream: polynomial 0xa001 (reflected), init 0xffff, LSB first
pub fn crc16(bytes: impl IntoIterator<Item = u8>) -> u16 {
    let mut crc: u16 = 0xffff;
    for byte in bytes {
        crc ^= byte as u16;
        for _ in 0 .. 8 {
            crc = if crc & 0x0001 != 0 { (crc >> 1) ^ 0xa001 } else { crc >> 1 };
        }
    }
    crc
}

pub struct ModbusBuffer {
    words: [u16; BUFFER_CAPACITY],
    index: usize,
    length: usize,
}

impl ModbusBuffer {
    /// empty buffer, cursor at zero
    pub fn new() -> Self {
        Self {
            words: [0; BUFFER_CAPACITY],
            index: 0,
            length: 0,
        }
    }

    /// wrap words pulled from the response FIFO for reading
    pub fn from_response(words: &[u16]) -> Self {
        let mut buffer = Self::new();
        buffer.words[.. words.len()].copy_from_slice(words);
        buffer.length = words.len();
        buffer
    }

    pub fn index(&self) -> usize {
        self.index
    }
    pub fn set_index(&mut self, index: usize) {
        self.index = index;
    }
    pub fn inc_index(&mut self, inc: usize) {
        self.index += inc;
    }
    /// move the cursor back to the start of the buffer
    pub fn reset(&mut self) {
        self.index = 0;
    }

    /// overwrite one word in place, regardless of the cursor
    pub fn set(&mut self, index: usize, word: u16) {
        self.words[index] = word;
    }
    pub fn get(&self, index: usize) -> u16 {
        self.words[index]
    }

    /// freeze or restore the written length, the cursor is unaffected
    pub fn set_length(&mut self, length: usize) {
        self.length = length;
    }
    pub fn length(&self) -> usize {
        self.length
    }
    /// the built words, ready for the command FIFO
    pub fn words(&self) -> &[u16] {
        &self.words[.. self.length]
    }

    /// true when the cursor sits on a response end-of-frame marker, does not advance
    pub fn end_of_frame(&self) -> bool {
        self.words[self.index] == fifo::RX_FRAME_END
    }
    /// true when the cursor has consumed every word, does not advance
    pub fn end_of_buffer(&self) -> bool {
        self.index >= self.length
    }
    /// advance past the current frame, leaving the cursor on the first word of the next one
    pub fn skip_to_next_frame(&mut self) {
        while !self.end_of_frame() && !self.end_of_buffer() {
            self.index += 1;
        }
        self.index += 1;
    }

    fn push(&mut self, word: u16) {
        self.words[self.index] = word;
        self.index += 1;
    }

    fn write_bytes(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.push(fifo::data_word(byte));
        }
    }

    /// write one untagged word, used for the subnet address and frame-length slots
    pub fn write_raw(&mut self, word: u16) {
        self.push(word);
    }

    pub fn write_u8(&mut self, data: u8) {
        self.push(fifo::data_word(data));
    }
    pub fn write_i8(&mut self, data: i8) {
        self.write_u8(data as u8);
    }
    pub fn write_u16(&mut self, data: u16) {
        self.write_bytes(&data.to_be_bytes());
    }
    pub fn write_i16(&mut self, data: i16) {
        self.write_bytes(&data.to_be_bytes());
    }
    /// three low bytes of the value, big-endian; the setpoint format of force demands
    pub fn write_i24(&mut self, data: i32) {
        self.write_bytes(&data.to_be_bytes()[1 ..]);
    }
    pub fn write_i32(&mut self, data: i32) {
        self.write_bytes(&data.to_be_bytes());
    }
    pub fn write_u32(&mut self, data: u32) {
        self.write_bytes(&data.to_be_bytes());
    }
    pub fn write_f32(&mut self, data: f32) {
        self.write_bytes(&data.to_be_bytes());
    }
    pub fn write_f64(&mut self, data: f64) {
        self.write_bytes(&data.to_be_bytes());
    }

    /**
        CRC-16/modbus over the tag-stripped bytes of the previous `length` written words,
        appended low byte first, each byte tagged as data
    */
    pub fn write_crc(&mut self, length: usize) {
        let crc = self.calculate_crc(length);
        self.write_u8(crc as u8);
        self.write_u8((crc >> 8) as u8);
    }

    /// CRC-16/modbus of the `length` words preceding the cursor
    pub fn calculate_crc(&self, length: usize) -> u16 {
        crc16(self.words[self.index - length .. self.index]
            .iter()
            .map(|&word| fifo::data_byte(word)))
    }

    fn control(&mut self, opcode: u8, value: u16) {
        self.push(ControlWord::new(u12::new(value), u4::new(opcode)).into());
    }

    /**
        idle the line for `micros` µs after a broadcast.

        Values above 4095 µs do not fit the µs operand and are encoded in ms instead, always
        rounded up by at least one full ms: even exact multiples of 1000 µs get the extra
        millisecond, matching the deployed encoder bit for bit.
    */
    pub fn write_delay(&mut self, micros: u32) {
        if micros > MICROS_DIRECT_MAX {
            self.control(0x5, ((micros / 1000) + 1) as u16);
        } else {
            self.control(0x4, micros as u16);
        }
    }

    /// arm the response window of a unicast frame, same ms fallback as [Self::write_delay]
    pub fn write_wait_for_rx(&mut self, micros: u32) {
        if micros > MICROS_DIRECT_MAX {
            self.control(0x9, ((micros / 1000) + 1) as u16);
        } else {
            self.control(0x6, micros as u16);
        }
    }

    pub fn write_end_of_frame(&mut self) {
        self.push(fifo::TX_FRAME_END);
    }
    pub fn write_timestamp(&mut self) {
        self.push(fifo::TX_TIMESTAMP);
    }
    pub fn write_software_trigger(&mut self) {
        self.push(fifo::TX_SOFTWARE_TRIGGER);
    }
    pub fn write_trigger_irq(&mut self) {
        self.push(fifo::TX_IRQ_TRIGGER);
    }

    fn read_bytes<const N: usize>(&mut self) -> [u8; N] {
        let mut bytes = [0; N];
        for byte in &mut bytes {
            *byte = fifo::data_byte(self.words[self.index]);
            self.index += 1;
        }
        bytes
    }

    /// read one untagged word, used for the reported-length slot of a response
    pub fn read_raw(&mut self) -> u16 {
        let word = self.words[self.index];
        self.index += 1;
        word
    }

    pub fn read_u8(&mut self) -> u8 {
        self.read_bytes::<1>()[0]
    }
    pub fn read_i8(&mut self) -> i8 {
        self.read_u8() as i8
    }
    pub fn read_u16(&mut self) -> u16 {
        u16::from_be_bytes(self.read_bytes())
    }
    pub fn read_i16(&mut self) -> i16 {
        i16::from_be_bytes(self.read_bytes())
    }
    /// sign-extending counterpart of [Self::write_i24]
    pub fn read_i24(&mut self) -> i32 {
        let bytes = self.read_bytes::<3>();
        i32::from_be_bytes([bytes[0], bytes[1], bytes[2], 0]) >> 8
    }
    pub fn read_i32(&mut self) -> i32 {
        i32::from_be_bytes(self.read_bytes())
    }
    pub fn read_u32(&mut self) -> u32 {
        u32::from_be_bytes(self.read_bytes())
    }
    /// 48-bit device serial numbers
    pub fn read_u48(&mut self) -> u64 {
        let bytes = self.read_bytes::<6>();
        u64::from_be_bytes([0, 0, bytes[0], bytes[1], bytes[2], bytes[3], bytes[4], bytes[5]])
    }
    pub fn read_f32(&mut self) -> f32 {
        f32::from_be_bytes(self.read_bytes())
    }
    pub fn read_f64(&mut self) -> f64 {
        f64::from_be_bytes(self.read_bytes())
    }

    /// CRC as appended by [Self::write_crc], low byte first
    pub fn read_crc(&mut self) -> u16 {
        let low = self.read_u8() as u16;
        let high = self.read_u8() as u16;
        (high << 8) | low
    }

    /**
        raw hardware timestamp captured by the FPGA, 8 untagged words little-endian.

        The write side is a single [crate::fifo::TX_TIMESTAMP] control word which the FPGA
        expands to these 8 words on the response path.
    */
    pub fn read_timestamp(&mut self) -> u64 {
        let mut stamp: u64 = 0;
        for shift in 0 .. 8 {
            stamp |= ((self.words[self.index] & 0xff) as u64) << (shift * 8);
            self.index += 1;
        }
        stamp
    }

    /// step over a response end-of-frame marker
    pub fn read_end_of_frame(&mut self) {
        self.index += 1;
    }
}

impl Default for ModbusBuffer {
    fn default() -> Self {
        Self::new()
    }
}
