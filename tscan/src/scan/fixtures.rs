//! Hand-built sections with valid CRC trailers for tests.

use crc::{Crc, CRC_32_MPEG_2};

const CRC_MPEG: Crc<u32> = Crc::<u32>::new(&CRC_32_MPEG_2);

/// Build a long-syntax section around `payload`.
pub fn build_section(
    table_id: u8,
    table_id_ext: u16,
    version: u8,
    section_number: u8,
    last_section_number: u8,
    payload: &[u8],
) -> Vec<u8> {
    let section_length = (5 + payload.len() + 4) as u16;
    let mut buf = Vec::with_capacity(3 + section_length as usize);
    buf.push(table_id);
    buf.push(0xB0 | ((section_length >> 8) as u8 & 0x0F));
    buf.push(section_length as u8);
    buf.push((table_id_ext >> 8) as u8);
    buf.push(table_id_ext as u8);
    buf.push(0xC0 | (version << 1) | 0x01);
    buf.push(section_number);
    buf.push(last_section_number);
    buf.extend_from_slice(payload);
    let crc = CRC_MPEG.checksum(&buf);
    buf.extend_from_slice(&crc.to_be_bytes());
    buf
}

/// Same section with the CRC trailer corrupted.
pub fn corrupt_crc(mut section: Vec<u8>) -> Vec<u8> {
    let last = section.len() - 1;
    section[last] ^= 0xFF;
    section
}
