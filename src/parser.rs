//! Deserialize data from the bytecode protocol.
use bytes::Bytes;
use nom::{
    IResult,
    bytes::complete::take,
    multi::many_m_n,
    number::complete::{be_i16, be_i32},
};
use nombytes::NomBytes;

use crate::constants::MAX_PROTOCOL_ARRAY_SIZE;
use crate::error::{Error, Result};

/// Convert bytes to a validated UTF-8 string.
/// Returns an error if the bytes are not valid UTF-8.
pub fn bytes_to_string(bytes: &Bytes) -> std::result::Result<String, nom::Err<nom::error::Error<NomBytes>>> {
    std::str::from_utf8(bytes)
        .map(|s| s.to_string())
        .map_err(|_| {
            nom::Err::Failure(nom::error::Error::new(
                NomBytes::from(bytes.as_ref()),
                nom::error::ErrorKind::Verify,
            ))
        })
}

/// Convert optional bytes to a validated UTF-8 string.
/// Returns None for None input, error for invalid UTF-8.
pub fn bytes_to_string_opt(
    bytes: Option<Bytes>,
) -> std::result::Result<Option<String>, nom::Err<nom::error::Error<NomBytes>>> {
    match bytes {
        Some(b) => bytes_to_string(&b).map(Some),
        None => Ok(None),
    }
}

/// Parse a STRING: i16 length followed by that many UTF-8 bytes.
pub fn parse_string(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i16(s)?;
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, string) = take(length as u16)(s)?;
    Ok((s, string.into_bytes()))
}

/// Parse a NULLABLE_STRING: i16 length, where -1 denotes null.
pub fn parse_nullable_string(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i16(s)?;

    // Null string
    if length == -1 {
        return Ok((s, None));
    }

    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    let (s, string) = take(length as u16)(s)?;
    Ok((s, Some(string.into_bytes())))
}

/// Parse a BYTES blob: i32 length followed by raw bytes.
pub fn parse_bytes(s: NomBytes) -> IResult<NomBytes, Bytes> {
    let (s, length) = be_i32(s)?;
    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::Verify,
        )));
    }
    let (s, data) = take(length as usize)(s)?;
    Ok((s, data.into_bytes()))
}

/// Parse NULLABLE_BYTES: i32 length, where -1 denotes null.
pub fn parse_nullable_bytes(s: NomBytes) -> IResult<NomBytes, Option<Bytes>> {
    let (s, length) = be_i32(s)?;

    if length == -1 {
        return Ok((s, None));
    }

    if length < 0 {
        return Err(nom::Err::Failure(nom::error::Error::new(
            s,
            nom::error::ErrorKind::TooLarge,
        )));
    }

    let (s, data) = take(length as usize)(s)?;
    Ok((s, Some(data.into_bytes())))
}

/// Parse an ARRAY: i32 count followed by `count` items produced by `f`.
///
/// A count of -1 is the null array and parses to an empty vector.
pub fn parse_array<O, E, F>(f: F) -> impl FnMut(NomBytes) -> IResult<NomBytes, Vec<O>, E>
where
    F: nom::Parser<NomBytes, O, E> + Copy,
    E: nom::error::ParseError<NomBytes>,
{
    move |input: NomBytes| {
        let i = input.clone();
        let (i, length) = be_i32(i)?;

        // Null array
        if length == -1 {
            return Ok((i, vec![]));
        }

        // Validate array size bounds
        if !(0..=MAX_PROTOCOL_ARRAY_SIZE).contains(&length) {
            return Err(nom::Err::Failure(E::from_error_kind(
                i,
                nom::error::ErrorKind::TooLarge,
            )));
        }

        many_m_n(length as usize, length as usize, f)(i)
    }
}

/// Run a response-body parser over a frame, translating nom's failure modes
/// into crate errors.
///
/// A short input becomes [`Error::UnexpectedEof`]; everything else keeps
/// the offending bytes for diagnostics.
pub fn parse_frame<O, F>(frame: Bytes, mut f: F) -> Result<O>
where
    F: FnMut(NomBytes) -> IResult<NomBytes, O>,
{
    match f(NomBytes::new(frame.clone())) {
        Ok((_, parsed)) => Ok(parsed),
        Err(nom::Err::Incomplete(_)) => Err(Error::UnexpectedEof),
        Err(nom::Err::Error(e)) | Err(nom::Err::Failure(e)) => {
            // `complete` combinators report short input as ErrorKind::Eof.
            if e.code == nom::error::ErrorKind::Eof {
                Err(Error::UnexpectedEof)
            } else {
                Err(Error::ParsingError(frame))
            }
        }
    }
}
