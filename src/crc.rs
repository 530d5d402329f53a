//! Header and data check values, ASHRAE 135 Annex G.

/// Value of the header CRC register after a header with a correct check
/// octet has been run through it.
pub(crate) const HEADER_CRC_RESIDUE: u8 = 0x55;

/// Value of the data CRC register after the data and both check octets.
pub(crate) const DATA_CRC_RESIDUE: u16 = 0xF0B8;

/// Accumulate one octet into the header CRC, polynomial X^8 + X^7 + 1.
pub(crate) fn header_crc_update(crc: u8, data: u8) -> u8 {
    let mut crc = u16::from(crc ^ data);
    crc = crc
        ^ (crc << 1)
        ^ (crc << 2)
        ^ (crc << 3)
        ^ (crc << 4)
        ^ (crc << 5)
        ^ (crc << 6)
        ^ (crc << 7);
    ((crc & 0xfe) ^ ((crc >> 8) & 1)) as u8
}

/// Accumulate one octet into the data CRC, CRC-CCITT X^16 + X^12 + X^5 + 1.
pub(crate) fn data_crc_update(crc: u16, data: u8) -> u16 {
    let low = (crc & 0xff) ^ u16::from(data);
    (crc >> 8)
        ^ (low << 8)
        ^ (low << 3)
        ^ (low << 12)
        ^ (low >> 4)
        ^ (low & 0x0f)
        ^ ((low & 0x0f) << 7)
}

/// The header check octet transmitted for the five header octets.
pub(crate) fn header_crc(header: &[u8]) -> u8 {
    !header.iter().fold(0xFF, |crc, &b| header_crc_update(crc, b))
}

/// The data check value transmitted for `data`, least significant octet first.
pub(crate) fn data_crc(data: &[u8]) -> u16 {
    !data.iter().fold(0xFFFF, |crc, &b| data_crc_update(crc, b))
}
