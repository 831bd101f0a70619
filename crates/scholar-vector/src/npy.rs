//! NumPy `.npy` codec for dense 2-D float matrices.
//!
//! Reads format versions 1.0 to 3.0 with `f4`/`f8` little- or big-endian
//! data in C order. Always writes version 1.0 `<f4` with the header padded
//! so the data starts on a 64-byte boundary, as `numpy.save` does.

use std::path::Path;

use scholar_core::error::{Result, ScholarError};

const MAGIC: &[u8] = b"\x93NUMPY";
const HEADER_ALIGN: usize = 64;

/// Row-major `rows x cols` matrix of `f32`.
#[derive(Debug, Clone, PartialEq)]
pub struct Matrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl Matrix {
    /// Wrap row-major `data`; fails if its length is not `rows * cols`.
    pub fn new(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self> {
        if rows.checked_mul(cols) != Some(data.len()) {
            return Err(ScholarError::CorruptStore(format!(
                "matrix data has {} values, shape ({}, {}) needs {}",
                data.len(),
                rows,
                cols,
                rows.saturating_mul(cols)
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn into_data(self) -> Vec<f32> {
        self.data
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dtype {
    F32Le,
    F32Be,
    F64Le,
    F64Be,
}

impl Dtype {
    fn parse(descr: &str) -> Result<Self> {
        match descr {
            "<f4" | "=f4" => Ok(Dtype::F32Le),
            ">f4" => Ok(Dtype::F32Be),
            "<f8" | "=f8" => Ok(Dtype::F64Le),
            ">f8" => Ok(Dtype::F64Be),
            other => Err(corrupt(format!("unsupported dtype '{}'", other))),
        }
    }

    fn width(self) -> usize {
        match self {
            Dtype::F32Le | Dtype::F32Be => 4,
            Dtype::F64Le | Dtype::F64Be => 8,
        }
    }

    fn decode(self, chunk: &[u8]) -> f32 {
        match self {
            Dtype::F32Le => f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            Dtype::F32Be => f32::from_be_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]),
            Dtype::F64Le => f64::from_le_bytes(eight(chunk)) as f32,
            Dtype::F64Be => f64::from_be_bytes(eight(chunk)) as f32,
        }
    }
}

fn eight(chunk: &[u8]) -> [u8; 8] {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&chunk[..8]);
    buf
}

#[derive(Debug)]
struct Header {
    dtype: Dtype,
    fortran_order: bool,
    shape: Vec<usize>,
}

fn corrupt(msg: impl Into<String>) -> ScholarError {
    ScholarError::CorruptStore(format!("npy: {}", msg.into()))
}

/// Read a matrix from an `.npy` file.
pub fn read_matrix(path: &Path) -> Result<Matrix> {
    let bytes = std::fs::read(path)?;
    decode(&bytes).map_err(|e| match e {
        ScholarError::CorruptStore(msg) => {
            ScholarError::CorruptStore(format!("{} ({})", msg, path.display()))
        }
        other => other,
    })
}

/// Write a matrix to an `.npy` file, replacing any existing file.
pub fn write_matrix(path: &Path, matrix: &Matrix) -> Result<()> {
    std::fs::write(path, encode(matrix))?;
    Ok(())
}

/// Decode an in-memory `.npy` image.
pub fn decode(bytes: &[u8]) -> Result<Matrix> {
    if bytes.len() < 10 || &bytes[..6] != MAGIC {
        return Err(corrupt("missing magic string"));
    }

    let major = bytes[6];
    let (header_len, header_start) = match major {
        1 => (u16::from_le_bytes([bytes[8], bytes[9]]) as usize, 10),
        2 | 3 => {
            if bytes.len() < 12 {
                return Err(corrupt("truncated preamble"));
            }
            let len = u32::from_le_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]);
            (len as usize, 12)
        }
        other => return Err(corrupt(format!("unsupported format version {}", other))),
    };

    let data_start = header_start + header_len;
    if bytes.len() < data_start {
        return Err(corrupt("truncated header"));
    }
    let header_text = std::str::from_utf8(&bytes[header_start..data_start])
        .map_err(|_| corrupt("header is not valid text"))?;
    let header = parse_header(header_text)?;

    if header.fortran_order {
        return Err(corrupt("Fortran-ordered arrays are not supported"));
    }

    let (rows, cols) = match header.shape.as_slice() {
        [0] => (0, 0),
        [rows, cols] => (*rows, *cols),
        other => {
            return Err(corrupt(format!(
                "expected a 2-D matrix, found shape {:?}",
                other
            )))
        }
    };

    let width = header.dtype.width();
    let expected = rows
        .checked_mul(cols)
        .and_then(|n| n.checked_mul(width))
        .ok_or_else(|| corrupt("shape overflows"))?;
    let payload = &bytes[data_start..];
    if payload.len() != expected {
        return Err(corrupt(format!(
            "shape ({}, {}) needs {} data bytes, file has {}",
            rows,
            cols,
            expected,
            payload.len()
        )));
    }

    let data = payload
        .chunks_exact(width)
        .map(|chunk| header.dtype.decode(chunk))
        .collect();

    Matrix::new(rows, cols, data)
}

/// Encode a matrix as a version 1.0 `<f4` `.npy` image.
pub fn encode(matrix: &Matrix) -> Vec<u8> {
    let dict = format!(
        "{{'descr': '<f4', 'fortran_order': False, 'shape': ({}, {}), }}",
        matrix.rows, matrix.cols
    );
    // preamble (10) + dict + padding + '\n' must be a multiple of HEADER_ALIGN
    let unpadded = MAGIC.len() + 4 + dict.len() + 1;
    let padding = (HEADER_ALIGN - unpadded % HEADER_ALIGN) % HEADER_ALIGN;
    let header_len = dict.len() + padding + 1;

    let mut out = Vec::with_capacity(MAGIC.len() + 4 + header_len + matrix.data.len() * 4);
    out.extend_from_slice(MAGIC);
    out.push(1);
    out.push(0);
    out.extend_from_slice(&(header_len as u16).to_le_bytes());
    out.extend_from_slice(dict.as_bytes());
    out.extend(std::iter::repeat(b' ').take(padding));
    out.push(b'\n');
    for value in &matrix.data {
        out.extend_from_slice(&value.to_le_bytes());
    }
    out
}

fn parse_header(text: &str) -> Result<Header> {
    let descr = quoted_value(dict_value(text, "descr")?)?;
    let dtype = Dtype::parse(descr)?;

    let fortran = dict_value(text, "fortran_order")?;
    let fortran_order = if fortran.starts_with("True") {
        true
    } else if fortran.starts_with("False") {
        false
    } else {
        return Err(corrupt("malformed fortran_order"));
    };

    let shape_text = dict_value(text, "shape")?;
    let inner = shape_text
        .strip_prefix('(')
        .and_then(|rest| rest.split_once(')'))
        .map(|(inner, _)| inner)
        .ok_or_else(|| corrupt("malformed shape"))?;
    let shape = inner
        .split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            part.trim_end_matches('L')
                .parse::<usize>()
                .map_err(|_| corrupt(format!("bad shape component '{}'", part)))
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(Header {
        dtype,
        fortran_order,
        shape,
    })
}

/// Text following `'key':` in the header dict, leading whitespace removed.
fn dict_value<'a>(text: &'a str, key: &str) -> Result<&'a str> {
    for quote in ['\'', '"'] {
        let needle = format!("{quote}{key}{quote}");
        if let Some(pos) = text.find(&needle) {
            let rest = text[pos + needle.len()..].trim_start();
            return rest
                .strip_prefix(':')
                .map(str::trim_start)
                .ok_or_else(|| corrupt(format!("malformed entry for '{}'", key)));
        }
    }
    Err(corrupt(format!("header lacks '{}'", key)))
}

fn quoted_value(text: &str) -> Result<&str> {
    let quote = text
        .chars()
        .next()
        .filter(|c| *c == '\'' || *c == '"')
        .ok_or_else(|| corrupt("expected quoted string"))?;
    let rest = &text[1..];
    rest.find(quote)
        .map(|end| &rest[..end])
        .ok_or_else(|| corrupt("unterminated string"))
}
