//! Reader and writer for the `.npy` array format stored inside `.npz` archives.
//!
//! Layout: magic `\x93NUMPY`, major/minor version bytes, a little-endian
//! header length (u16 for v1, u32 for v2/v3), then a Python dict literal
//! such as `{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }`
//! padded with spaces, then the raw element bytes.

use nom::{
    branch::alt,
    bytes::complete::{tag, take_while},
    character::complete::{char, digit1, multispace0},
    combinator::{map, map_res, opt},
    multi::separated_list0,
    sequence::{delimited, preceded, separated_pair, tuple},
    IResult,
};

use crate::error::PipelineError;

const MAGIC: &[u8] = b"\x93NUMPY";

/// A decoded array, converted to `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct NpyArray {
    pub shape: Vec<usize>,
    pub fortran_order: bool,
    pub values: Vec<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Endian {
    Little,
    Big,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Float,
    Int,
    Uint,
    Bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Dtype {
    endian: Endian,
    kind: Kind,
    size: usize,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self, PipelineError> {
        let bytes = descr.as_bytes();
        if bytes.len() < 3 {
            return Err(PipelineError::malformed(format!("unsupported dtype {:?}", descr)));
        }
        let endian = match bytes[0] {
            b'<' | b'|' | b'=' => Endian::Little,
            b'>' => Endian::Big,
            _ => return Err(PipelineError::malformed(format!("unsupported dtype {:?}", descr))),
        };
        let size: usize = descr[2..]
            .parse()
            .map_err(|_| PipelineError::malformed(format!("unsupported dtype {:?}", descr)))?;
        let kind = match (bytes[1], size) {
            (b'f', 4 | 8) => Kind::Float,
            (b'i', 1 | 2 | 4 | 8) => Kind::Int,
            (b'u', 1 | 2 | 4 | 8) => Kind::Uint,
            (b'b', 1) => Kind::Bool,
            _ => return Err(PipelineError::malformed(format!("unsupported dtype {:?}", descr))),
        };
        Ok(Self { endian, kind, size })
    }

    fn decode(&self, chunk: &[u8]) -> f32 {
        let mut buf = [0u8; 8];
        buf[..self.size].copy_from_slice(chunk);
        if self.endian == Endian::Big {
            buf[..self.size].reverse();
        }
        match (self.kind, self.size) {
            (Kind::Float, 4) => f32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]),
            (Kind::Float, _) => f64::from_le_bytes(buf) as f32,
            (Kind::Int, 1) => buf[0] as i8 as f32,
            (Kind::Int, 2) => i16::from_le_bytes([buf[0], buf[1]]) as f32,
            (Kind::Int, 4) => i32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
            (Kind::Int, _) => i64::from_le_bytes(buf) as f32,
            (Kind::Uint, 1) | (Kind::Bool, _) => buf[0] as f32,
            (Kind::Uint, 2) => u16::from_le_bytes([buf[0], buf[1]]) as f32,
            (Kind::Uint, 4) => u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]) as f32,
            (Kind::Uint, _) => u64::from_le_bytes(buf) as f32,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum HeaderValue<'a> {
    Str(&'a str),
    Bool(bool),
    Shape(Vec<usize>),
}

fn quoted(input: &str) -> IResult<&str, &str> {
    alt((
        delimited(char('\''), take_while(|c| c != '\''), char('\'')),
        delimited(char('"'), take_while(|c| c != '"'), char('"')),
    ))(input)
}

fn comma(input: &str) -> IResult<&str, char> {
    delimited(multispace0, char(','), multispace0)(input)
}

fn shape(input: &str) -> IResult<&str, Vec<usize>> {
    delimited(
        preceded(char('('), multispace0),
        separated_list0(comma, map_res(digit1, str::parse::<usize>)),
        tuple((multispace0, opt(char(',')), multispace0, char(')'))),
    )(input)
}

fn value(input: &str) -> IResult<&str, HeaderValue<'_>> {
    alt((
        map(shape, HeaderValue::Shape),
        map(tag("True"), |_| HeaderValue::Bool(true)),
        map(tag("False"), |_| HeaderValue::Bool(false)),
        map(quoted, HeaderValue::Str),
    ))(input)
}

fn header_dict(input: &str) -> IResult<&str, Vec<(&str, HeaderValue<'_>)>> {
    delimited(
        preceded(char('{'), multispace0),
        separated_list0(
            comma,
            separated_pair(quoted, delimited(multispace0, char(':'), multispace0), value),
        ),
        tuple((multispace0, opt(char(',')), multispace0, char('}'))),
    )(input)
}

struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn parse_header(text: &str) -> Result<Header, PipelineError> {
    let (_, entries) = header_dict(text.trim())
        .map_err(|e| PipelineError::malformed(format!("invalid npy header: {}", e)))?;

    let mut descr = None;
    let mut fortran_order = false;
    let mut shape = None;
    for (key, value) in entries {
        match (key, value) {
            ("descr", HeaderValue::Str(s)) => descr = Some(Dtype::parse(s)?),
            ("fortran_order", HeaderValue::Bool(b)) => fortran_order = b,
            ("shape", HeaderValue::Shape(s)) => shape = Some(s),
            _ => {}
        }
    }

    Ok(Header {
        dtype: descr.ok_or_else(|| PipelineError::malformed("npy header has no descr"))?,
        fortran_order,
        shape: shape.ok_or_else(|| PipelineError::malformed("npy header has no shape"))?,
    })
}

/// Decode a complete `.npy` payload.
pub fn read_npy(bytes: &[u8]) -> Result<NpyArray, PipelineError> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(PipelineError::malformed("not an npy array (bad magic)"));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(PipelineError::malformed("truncated npy header"));
            }
            (
                u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize,
                12,
            )
        }
        v => return Err(PipelineError::malformed(format!("unsupported npy version {}", v))),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(PipelineError::malformed("truncated npy header"));
    }
    let text = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| PipelineError::malformed("npy header is not text"))?;
    let header = parse_header(text)?;

    let data = &bytes[data_start..];
    let needed = header
        .shape
        .iter()
        .try_fold(header.dtype.size, |acc, &dim| acc.checked_mul(dim))
        .ok_or_else(|| PipelineError::malformed("npy shape overflows"))?;
    if data.len() < needed {
        return Err(PipelineError::malformed(format!(
            "npy data truncated: expected {} bytes, found {}",
            needed,
            data.len()
        )));
    }

    let values = data[..needed]
        .chunks_exact(header.dtype.size)
        .map(|chunk| header.dtype.decode(chunk))
        .collect();

    Ok(NpyArray {
        shape: header.shape,
        fortran_order: header.fortran_order,
        values,
    })
}

/// Build a version 1.0 `.npy` payload from already-encoded element bytes.
pub fn npy_bytes(descr: &str, fortran_order: bool, shape: &[usize], payload: &[u8]) -> Vec<u8> {
    let dims = match shape {
        [single] => format!("({},)", single),
        _ => format!(
            "({})",
            shape.iter().map(|d| d.to_string()).collect::<Vec<_>>().join(", ")
        ),
    };
    let mut header = format!(
        "{{'descr': '{}', 'fortran_order': {}, 'shape': {}, }}",
        descr,
        if fortran_order { "True" } else { "False" },
        dims
    );
    // Pad so the data starts on a 64-byte boundary; header ends in a newline.
    let unpadded = MAGIC.len() + 4 + header.len() + 1;
    header.push_str(&" ".repeat((64 - unpadded % 64) % 64));
    header.push('\n');

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header.len() + payload.len());
    out.extend_from_slice(MAGIC);
    out.extend_from_slice(&[1, 0]);
    out.extend_from_slice(&(header.len() as u16).to_le_bytes());
    out.extend_from_slice(header.as_bytes());
    out.extend_from_slice(payload);
    out
}

/// Encode little-endian `f32` values in C order.
pub fn write_npy_f32(shape: &[usize], values: &[f32]) -> Vec<u8> {
    let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
    npy_bytes("<f4", false, shape, &payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_dict() {
        let (_, entries) =
            header_dict("{'descr': '<f4', 'fortran_order': False, 'shape': (3, 4), }").unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0], ("descr", HeaderValue::Str("<f4")));
        assert_eq!(entries[1], ("fortran_order", HeaderValue::Bool(false)));
        assert_eq!(entries[2], ("shape", HeaderValue::Shape(vec![3, 4])));
    }

    #[test]
    fn test_header_shapes() {
        assert_eq!(shape("(13000,)").unwrap().1, vec![13000]);
        assert_eq!(shape("()").unwrap().1, Vec::<usize>::new());
        assert_eq!(shape("(1, 52000)").unwrap().1, vec![1, 52000]);
    }

    #[test]
    fn test_write_then_read_f32() {
        let bytes = write_npy_f32(&[2, 3], &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!((bytes.len() - 24) % 64, 0);
        let array = read_npy(&bytes).unwrap();
        assert_eq!(array.shape, vec![2, 3]);
        assert!(!array.fortran_order);
        assert_eq!(array.values, vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_read_f64_big_endian() {
        let payload: Vec<u8> = [0.25f64, -1.5].iter().flat_map(|v| v.to_be_bytes()).collect();
        let bytes = npy_bytes(">f8", false, &[2], &payload);
        let array = read_npy(&bytes).unwrap();
        assert_eq!(array.values, vec![0.25, -1.5]);
    }

    #[test]
    fn test_read_integers() {
        let payload: Vec<u8> = [7i64, -3].iter().flat_map(|v| v.to_le_bytes()).collect();
        let array = read_npy(&npy_bytes("<i8", false, &[2], &payload)).unwrap();
        assert_eq!(array.values, vec![7.0, -3.0]);

        let array = read_npy(&npy_bytes("|u1", false, &[3], &[0, 1, 255])).unwrap();
        assert_eq!(array.values, vec![0.0, 1.0, 255.0]);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(read_npy(b"definitely not numpy").is_err());
        assert!(read_npy(&npy_bytes("<c16", false, &[1], &[0; 16])).is_err());

        // Header claims four floats, payload holds two.
        let bytes = npy_bytes("<f4", false, &[4], &[0; 8]);
        assert!(matches!(read_npy(&bytes), Err(PipelineError::MalformedContainer(_))));
    }
}
