//! Wire helpers shared by the message model.
//!
//! Parsing follows the nom style `parse(input) -> IResult<&[u8], T>`.
//! Writing appends to a `Vec<u8>`; writers that enforce a length invariant
//! return `Result` so a message violating it is never put on the wire.

use nom::bytes::complete::take;
use nom::multi::length_data;
use nom::number::complete::{be_u16, be_u24, be_u8};
use nom::IResult;

use crate::Error;

pub(crate) fn parse_opaque8(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u8)(input)
}

pub(crate) fn parse_opaque16(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u16)(input)
}

pub(crate) fn parse_opaque24(input: &[u8]) -> IResult<&[u8], &[u8]> {
    length_data(be_u24)(input)
}

/// Parse `input` entirely as a sequence of `parser` items.
pub(crate) fn parse_items<'a, T, F>(mut input: &'a [u8], mut parser: F) -> IResult<&'a [u8], Vec<T>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    let mut items = Vec::new();
    while !input.is_empty() {
        let (rest, item) = parser(input)?;
        items.push(item);
        input = rest;
    }
    Ok((input, items))
}

/// A list behind an 8 bit length prefix. Every byte must belong to an item.
pub(crate) fn parse_list8<'a, T, F>(input: &'a [u8], parser: F) -> IResult<&'a [u8], Vec<T>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    let (rest, body) = parse_opaque8(input)?;
    let (_, items) = parse_items(body, parser)?;
    Ok((rest, items))
}

pub(crate) fn parse_list16<'a, T, F>(input: &'a [u8], parser: F) -> IResult<&'a [u8], Vec<T>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    let (rest, body) = parse_opaque16(input)?;
    let (_, items) = parse_items(body, parser)?;
    Ok((rest, items))
}

pub(crate) fn parse_list24<'a, T, F>(input: &'a [u8], parser: F) -> IResult<&'a [u8], Vec<T>>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    let (rest, body) = parse_opaque24(input)?;
    let (_, items) = parse_items(body, parser)?;
    Ok((rest, items))
}

/// Parse a 48 bit big endian integer (DTLS record sequence number).
pub(crate) fn be_u48(input: &[u8]) -> IResult<&[u8], u64> {
    let (input, bytes) = take(6_usize)(input)?;
    let value = bytes
        .iter()
        .fold(0_u64, |acc, b| (acc << 8) | u64::from(*b));
    Ok((input, value))
}

pub(crate) fn write_u24(output: &mut Vec<u8>, value: usize) {
    debug_assert!(value <= 0xFF_FFFF);
    output.extend_from_slice(&(value as u32).to_be_bytes()[1..]);
}

pub(crate) fn write_u48(output: &mut Vec<u8>, value: u64) {
    debug_assert!(value <= 0xFFFF_FFFF_FFFF);
    output.extend_from_slice(&value.to_be_bytes()[2..]);
}

/// Write `data` behind a length prefix of `width` bytes, requiring
/// `min <= data.len() <= max`.
pub(crate) fn write_opaque(
    output: &mut Vec<u8>,
    width: usize,
    data: &[u8],
    min: usize,
    max: usize,
    what: &str,
) -> Result<(), Error> {
    check_length(data.len(), min, max, what)?;
    write_length(output, width, data.len());
    output.extend_from_slice(data);
    Ok(())
}

pub(crate) fn write_opaque8(output: &mut Vec<u8>, data: &[u8], what: &str) -> Result<(), Error> {
    write_opaque(output, 1, data, 0, 0xFF, what)
}

pub(crate) fn write_opaque16(output: &mut Vec<u8>, data: &[u8], what: &str) -> Result<(), Error> {
    write_opaque(output, 2, data, 0, 0xFFFF, what)
}

/// Run `body` with a length prefix of `width` bytes that is patched after
/// the fact. The written body must satisfy `min <= len <= max`.
pub(crate) fn with_length<F>(
    output: &mut Vec<u8>,
    width: usize,
    min: usize,
    max: usize,
    what: &str,
    body: F,
) -> Result<(), Error>
where
    F: FnOnce(&mut Vec<u8>) -> Result<(), Error>,
{
    let start = output.len();
    output.resize(start + width, 0);
    body(output)?;
    let len = output.len() - start - width;
    check_length(len, min, max, what)?;
    let bytes = (len as u32).to_be_bytes();
    output[start..start + width].copy_from_slice(&bytes[4 - width..]);
    Ok(())
}

fn write_length(output: &mut Vec<u8>, width: usize, len: usize) {
    let bytes = (len as u32).to_be_bytes();
    output.extend_from_slice(&bytes[4 - width..]);
}

fn check_length(len: usize, min: usize, max: usize, what: &str) -> Result<(), Error> {
    if len < min || len > max {
        return Err(Error::InternalError(format!(
            "{} length {} outside {}..={}",
            what, len, min, max
        )));
    }
    Ok(())
}

/// Run a nom parser over a complete message body.
///
/// Any parse failure, and any trailing bytes, are a `decode_error`.
pub(crate) fn decode_all<'a, T, F>(input: &'a [u8], mut parser: F, what: &str) -> Result<T, Error>
where
    F: FnMut(&'a [u8]) -> IResult<&'a [u8], T>,
{
    match parser(input) {
        Ok((rest, value)) if rest.is_empty() => Ok(value),
        Ok((rest, _)) => Err(Error::DecodeError(format!(
            "{}: {} trailing bytes",
            what,
            rest.len()
        ))),
        Err(e) => Err(Error::DecodeError(format!("{}: {:?}", what, e))),
    }
}

/// A nom failure used by parsers rejecting a structurally valid but
/// semantically invalid value.
pub(crate) fn verify_failure(input: &[u8]) -> nom::Err<nom::error::Error<&[u8]>> {
    nom::Err::Failure(nom::error::Error::new(
        input,
        nom::error::ErrorKind::Verify,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn u48_roundtrip() {
        let mut out = Vec::new();
        write_u48(&mut out, 0x0102_0304_0506);
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
        let (rest, v) = be_u48(&out).unwrap();
        assert!(rest.is_empty());
        assert_eq!(v, 0x0102_0304_0506);
    }

    #[test]
    fn with_length_patches_prefix() {
        let mut out = vec![0xAA];
        with_length(&mut out, 2, 0, 0xFFFF, "test", |o| {
            o.extend_from_slice(&[1, 2, 3]);
            Ok(())
        })
        .unwrap();
        assert_eq!(out, [0xAA, 0x00, 0x03, 1, 2, 3]);
    }

    #[test]
    fn with_length_rejects_empty_when_min_is_one() {
        let mut out = Vec::new();
        let r = with_length(&mut out, 2, 1, 0xFFFF, "list", |_| Ok(()));
        assert!(matches!(r, Err(Error::InternalError(_))));
    }

    #[test]
    fn opaque_length_limits() {
        let mut out = Vec::new();
        assert!(write_opaque8(&mut out, &[0; 256], "x").is_err());
        assert!(write_opaque(&mut out, 2, &[], 1, 0xFFFF, "x").is_err());
        write_opaque16(&mut out, &[9, 9], "x").unwrap();
        assert_eq!(out, [0, 2, 9, 9]);
    }

    #[test]
    fn list_must_be_consumed_by_items() {
        let (rest, items) = parse_list8(&[4, 0, 1, 0, 2, 9], be_u16).unwrap();
        assert_eq!(items, vec![1, 2]);
        assert_eq!(rest, &[9]);
        assert!(parse_list8(&[3, 0, 1, 0], be_u16).is_err());
    }

    #[test]
    fn decode_all_rejects_trailing() {
        let r: Result<&[u8], Error> = decode_all(&[1, 7, 0], parse_opaque8, "x");
        assert!(matches!(r, Err(Error::DecodeError(_))));
        let v = decode_all(&[1, 7], parse_opaque8, "x").unwrap();
        assert_eq!(v, &[7]);
    }
}
