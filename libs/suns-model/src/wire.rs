//! Register/byte boundary
//!
//! Transports hand out registers as host `u16` words; the codec works on
//! big-endian bytes. These two functions are the only place the conversion
//! happens.

use bytes::{Buf, BufMut, BytesMut};

/// Big-endian byte image of a register array
pub fn registers_to_wire_bytes(registers: &[u16]) -> Vec<u8> {
    let mut buf = BytesMut::with_capacity(registers.len() * 2);
    for &register in registers {
        buf.put_u16(register);
    }
    buf.to_vec()
}

/// Registers of a big-endian byte image. A trailing odd byte becomes the
/// high byte of a final zero-padded register.
pub fn wire_bytes_to_registers(bytes: &[u8]) -> Vec<u16> {
    let mut buf = bytes;
    let mut registers = Vec::with_capacity(bytes.len().div_ceil(2));
    while buf.remaining() >= 2 {
        registers.push(buf.get_u16());
    }
    if buf.has_remaining() {
        registers.push(u16::from(buf.get_u8()) << 8);
    }
    registers
}
