use nom::bytes::streaming::{tag, take};
use nom::combinator::{consumed, map};
use nom::number::streaming::{be_u16, u8};
use nom::sequence::tuple;
use nom::Err::Incomplete;
use nom::IResult;

use crate::crc::{self, DATA_CRC_RESIDUE, HEADER_CRC_RESIDUE};
use crate::frame::{Decoded, Frame, FrameHeader, PREAMBLE1, PREAMBLE2};
use crate::types::Address;
use crate::buffer::Payload;
use crate::MAX_DATA_LEN;

type Buf = [u8];

pub(crate) fn parse_frame(buf: &Buf) -> (usize, Decoded) {
    match buf {
        [] | [PREAMBLE1] => return (0, Decoded::NeedData),
        [PREAMBLE1, PREAMBLE2, ..] => (),
        // a repeated first preamble octet is skipped on its own
        [PREAMBLE1, _, ..] => return (1, Decoded::Garbage),
        _ => {
            let skip = buf.iter().position(|&b| b == PREAMBLE1).unwrap_or(buf.len());
            return (skip, Decoded::Garbage);
        }
    }

    match frame(buf) {
        Ok((remaining, token)) => (buf.len() - remaining.len(), token),
        Err(Incomplete(_)) => (0, Decoded::NeedData),
        // the preamble is checked above, nothing else can fail
        Err(_) => (2, Decoded::Garbage),
    }
}

fn frame(buf: &Buf) -> IResult<&Buf, Decoded> {
    let (buf, _) = tag(&[PREAMBLE1, PREAMBLE2][..])(buf)?;
    let (buf, (header_bytes, header)) = consumed(header)(buf)?;
    let (buf, check) = u8(buf)?;

    let residue = header_bytes
        .iter()
        .chain(core::iter::once(&check))
        .fold(0xFF, |crc, &b| crc::header_crc_update(crc, b));
    if residue != HEADER_CRC_RESIDUE {
        // the length can't be trusted, resynchronize right after the header
        return Ok((buf, Decoded::Invalid(None)));
    }

    if header.length == 0 {
        return Ok((buf, valid(header, &[])));
    }

    let (buf, data) = take(header.length)(buf)?;
    let (buf, check) = take(2usize)(buf)?;
    let residue = data
        .iter()
        .chain(check)
        .fold(0xFFFF, |crc, &b| crc::data_crc_update(crc, b));

    if usize::from(header.length) > MAX_DATA_LEN || residue != DATA_CRC_RESIDUE {
        Ok((buf, Decoded::Invalid(Some(header))))
    } else {
        Ok((buf, valid(header, data)))
    }
}

fn header(buf: &Buf) -> IResult<&Buf, FrameHeader> {
    map(
        tuple((u8, u8, u8, be_u16)),
        |(frame_type, destination, source, length)| FrameHeader {
            frame_type: frame_type.into(),
            destination: Address::from_wire(destination),
            source: Address::from_wire(source),
            length,
        },
    )(buf)
}

fn valid(header: FrameHeader, data: &[u8]) -> Decoded {
    match Payload::from_slice(data) {
        Ok(data) => Decoded::Frame(Frame {
            frame_type: header.frame_type,
            destination: header.destination,
            source: header.source,
            data,
        }),
        Err(_) => Decoded::Invalid(Some(header)),
    }
}
