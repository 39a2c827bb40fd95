//! Feature matrices: full, compressed and sparse storage
//!
//! `GeneralMatrix` mirrors what an example's feature stream may hold on disk.
//! The collator only ever needs the dense form, see [`GeneralMatrix::to_dense`].

use std::io::{Read, Write};

use ndarray::{Array1, Array2};

use super::io::{checked_area, parse_float, parse_word, KaldiReader, KaldiWriter, MAX_PREALLOC};
use crate::error::{EgsError, Result};

/// Feature storage of one input stream
#[derive(Debug, Clone, PartialEq)]
pub enum GeneralMatrix {
    Full(Array2<f32>),
    Compressed(CompressedMatrix),
    Sparse(SparseMatrix),
}

impl GeneralMatrix {
    pub fn num_rows(&self) -> usize {
        match self {
            GeneralMatrix::Full(m) => m.nrows(),
            GeneralMatrix::Compressed(m) => m.num_rows,
            GeneralMatrix::Sparse(m) => m.num_rows(),
        }
    }

    pub fn num_cols(&self) -> usize {
        match self {
            GeneralMatrix::Full(m) => m.ncols(),
            GeneralMatrix::Compressed(m) => m.num_cols,
            GeneralMatrix::Sparse(m) => m.num_cols(),
        }
    }

    /// Dense copy of the matrix
    pub fn to_dense(&self) -> Array2<f32> {
        match self {
            GeneralMatrix::Full(m) => m.clone(),
            GeneralMatrix::Compressed(m) => m.to_dense(),
            GeneralMatrix::Sparse(m) => m.to_dense(),
        }
    }

    pub(crate) fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        if reader.is_binary() {
            match reader.peek()? {
                Some(b'C') => Ok(GeneralMatrix::Compressed(CompressedMatrix::read(reader)?)),
                Some(b'S') => Ok(GeneralMatrix::Sparse(SparseMatrix::read(reader)?)),
                _ => Ok(GeneralMatrix::Full(read_matrix(reader)?)),
            }
        } else {
            // compressed matrices are printed as plain matrices in text mode
            reader.skip_whitespace()?;
            match reader.peek()? {
                Some(b'r') => Ok(GeneralMatrix::Sparse(SparseMatrix::read(reader)?)),
                _ => Ok(GeneralMatrix::Full(read_matrix(reader)?)),
            }
        }
    }

    pub(crate) fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        match self {
            GeneralMatrix::Full(m) => write_matrix(writer, m),
            GeneralMatrix::Compressed(m) => m.write(writer),
            GeneralMatrix::Sparse(m) => m.write(writer),
        }
    }
}

/// Read a full matrix (`FM`/`DM` in binary, `[ ... ]` in text).
/// Compressed input is decompressed.
pub fn read_matrix<R: Read>(reader: &mut KaldiReader<R>) -> Result<Array2<f32>> {
    if !reader.is_binary() {
        return read_text_matrix(reader);
    }
    if reader.peek()? == Some(b'C') {
        return Ok(CompressedMatrix::read(reader)?.to_dense());
    }
    let token = reader.read_token()?;
    let double = match token.as_str() {
        "FM" => false,
        "DM" => true,
        other => {
            return Err(EgsError::deserialization(format!(
                "expected matrix token FM or DM, got {}",
                other
            )))
        }
    };
    let rows = reader.read_size("matrix rows")?;
    let cols = reader.read_size("matrix cols")?;
    let count = checked_area(rows, cols, "matrix")?;
    let mut data = Vec::with_capacity(count.min(MAX_PREALLOC));
    for _ in 0..count {
        data.push(if double {
            reader.read_f64_raw()? as f32
        } else {
            reader.read_f32_raw()?
        });
    }
    Array2::from_shape_vec((rows, cols), data).map_err(|e| EgsError::deserialization(e.to_string()))
}

fn read_text_matrix<R: Read>(reader: &mut KaldiReader<R>) -> Result<Array2<f32>> {
    let open = reader.read_word()?;
    if open == "[]" {
        return Ok(Array2::zeros((0, 0)));
    }
    if open != "[" {
        return Err(EgsError::deserialization(format!("expected \"[\", got {:?}", open)));
    }

    let mut rows: Vec<Vec<f32>> = Vec::new();
    let mut current: Vec<f32> = Vec::new();
    loop {
        match reader.peek()? {
            None => return Err(EgsError::deserialization("end of stream inside matrix")),
            Some(b']') => {
                reader.get()?;
                match reader.peek()? {
                    Some(b'\r') => {
                        reader.get()?;
                        reader.get()?;
                    }
                    Some(b'\n') => {
                        reader.get()?;
                    }
                    _ => {}
                }
                if !current.is_empty() {
                    rows.push(current);
                }
                break;
            }
            Some(b'\n') | Some(b';') => {
                reader.get()?;
                if !current.is_empty() {
                    rows.push(std::mem::take(&mut current));
                }
            }
            Some(c) if c.is_ascii_whitespace() => {
                reader.get()?;
            }
            Some(_) => current.push(parse_float(&reader.read_number_word()?)?),
        }
    }

    let cols = rows.first().map(|r| r.len()).unwrap_or(0);
    if let Some(bad) = rows.iter().position(|r| r.len() != cols) {
        return Err(EgsError::deserialization(format!(
            "matrix row {} has {} columns, expected {}",
            bad,
            rows[bad].len(),
            cols
        )));
    }
    let num_rows = rows.len();
    let data: Vec<f32> = rows.into_iter().flatten().collect();
    Array2::from_shape_vec((num_rows, cols), data).map_err(|e| EgsError::deserialization(e.to_string()))
}

pub(crate) fn write_matrix<W: Write>(writer: &mut KaldiWriter<W>, m: &Array2<f32>) -> Result<()> {
    writer.write_token("FM")?;
    writer.write_size(m.nrows(), "matrix rows")?;
    writer.write_size(m.ncols(), "matrix cols")?;
    for v in m.iter() {
        writer.write_raw(&v.to_le_bytes())?;
    }
    Ok(())
}

/// Read a vector (`FV`/`DV` in binary, `[ ... ]` in text)
pub fn read_vector<R: Read>(reader: &mut KaldiReader<R>) -> Result<Array1<f32>> {
    if reader.is_binary() {
        let token = reader.read_token()?;
        let double = match token.as_str() {
            "FV" => false,
            "DV" => true,
            other => {
                return Err(EgsError::deserialization(format!(
                    "expected vector token FV or DV, got {}",
                    other
                )))
            }
        };
        let dim = reader.read_size("vector dim")?;
        let mut data = Vec::with_capacity(dim.min(MAX_PREALLOC));
        for _ in 0..dim {
            data.push(if double {
                reader.read_f64_raw()? as f32
            } else {
                reader.read_f32_raw()?
            });
        }
        return Ok(Array1::from(data));
    }

    let open = reader.read_word()?;
    if open == "[]" {
        return Ok(Array1::zeros(0));
    }
    if open != "[" {
        return Err(EgsError::deserialization(format!("expected \"[\", got {:?}", open)));
    }
    let mut data = Vec::new();
    loop {
        reader.skip_whitespace()?;
        match reader.peek()? {
            None => return Err(EgsError::deserialization("end of stream inside vector")),
            Some(b']') => {
                reader.get()?;
                return Ok(Array1::from(data));
            }
            Some(_) => data.push(parse_float(&reader.read_number_word()?)?),
        }
    }
}

pub(crate) fn write_vector<W: Write>(writer: &mut KaldiWriter<W>, v: &[f32]) -> Result<()> {
    writer.write_token("FV")?;
    writer.write_size(v.len(), "vector dim")?;
    for x in v {
        writer.write_raw(&x.to_le_bytes())?;
    }
    Ok(())
}

/// On-disk compression layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompressionFormat {
    /// `CM`: one byte per value with per-column percentile headers
    OneByteWithColHeaders,
    /// `CM2`: two bytes per value, linear in the global range
    TwoByte,
    /// `CM3`: one byte per value, linear in the global range
    OneByte,
}

impl CompressionFormat {
    fn token(self) -> &'static str {
        match self {
            CompressionFormat::OneByteWithColHeaders => "CM",
            CompressionFormat::TwoByte => "CM2",
            CompressionFormat::OneByte => "CM3",
        }
    }
}

/// Per-column quantiles of the `CM` layout
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PerColHeader {
    pub percentile_0: u16,
    pub percentile_25: u16,
    pub percentile_75: u16,
    pub percentile_100: u16,
}

#[derive(Debug, Clone, PartialEq)]
enum CompressedData {
    /// Column headers, then bytes in column-major order
    ColHeaders { headers: Vec<PerColHeader>, bytes: Vec<u8> },
    /// Row-major values
    TwoByte(Vec<u16>),
    /// Row-major values
    OneByte(Vec<u8>),
}

/// Lossy compressed matrix as stored in most example archives
#[derive(Debug, Clone, PartialEq)]
pub struct CompressedMatrix {
    pub format: CompressionFormat,
    pub min_value: f32,
    pub range: f32,
    pub num_rows: usize,
    pub num_cols: usize,
    data: CompressedData,
}

impl CompressedMatrix {
    fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        let format = match reader.read_token()?.as_str() {
            "CM" => CompressionFormat::OneByteWithColHeaders,
            "CM2" => CompressionFormat::TwoByte,
            "CM3" => CompressionFormat::OneByte,
            other => {
                return Err(EgsError::deserialization(format!(
                    "unknown compressed matrix token {}",
                    other
                )))
            }
        };
        let min_value = reader.read_f32_raw()?;
        let range = reader.read_f32_raw()?;
        let num_rows = raw_dim(reader.read_i32_raw()?, "compressed rows")?;
        let num_cols = raw_dim(reader.read_i32_raw()?, "compressed cols")?;

        let count = checked_area(num_rows, num_cols, "compressed matrix")?;
        let data = if count == 0 {
            CompressedData::OneByte(Vec::new())
        } else {
            match format {
                CompressionFormat::OneByteWithColHeaders => {
                    let mut headers = Vec::with_capacity(num_cols.min(MAX_PREALLOC));
                    for _ in 0..num_cols {
                        headers.push(PerColHeader {
                            percentile_0: reader.read_u16_raw()?,
                            percentile_25: reader.read_u16_raw()?,
                            percentile_75: reader.read_u16_raw()?,
                            percentile_100: reader.read_u16_raw()?,
                        });
                    }
                    let bytes = reader.read_bytes(count)?;
                    CompressedData::ColHeaders { headers, bytes }
                }
                CompressionFormat::TwoByte => {
                    let mut values = Vec::with_capacity(count.min(MAX_PREALLOC));
                    for _ in 0..count {
                        values.push(reader.read_u16_raw()?);
                    }
                    CompressedData::TwoByte(values)
                }
                CompressionFormat::OneByte => CompressedData::OneByte(reader.read_bytes(count)?),
            }
        };

        Ok(Self {
            format,
            min_value,
            range,
            num_rows,
            num_cols,
            data,
        })
    }

    fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        writer.write_token(self.format.token())?;
        writer.write_raw(&self.min_value.to_le_bytes())?;
        writer.write_raw(&self.range.to_le_bytes())?;
        writer.write_size_raw(self.num_rows, "compressed rows")?;
        writer.write_size_raw(self.num_cols, "compressed cols")?;
        match &self.data {
            CompressedData::ColHeaders { headers, bytes } => {
                for h in headers {
                    for p in [h.percentile_0, h.percentile_25, h.percentile_75, h.percentile_100] {
                        writer.write_raw(&p.to_le_bytes())?;
                    }
                }
                writer.write_raw(bytes)
            }
            CompressedData::TwoByte(values) => {
                for v in values {
                    writer.write_raw(&v.to_le_bytes())?;
                }
                Ok(())
            }
            CompressedData::OneByte(bytes) => writer.write_raw(bytes),
        }
    }

    /// Build a `CM3` matrix from raw bytes, row-major
    pub fn one_byte(min_value: f32, range: f32, num_rows: usize, num_cols: usize, bytes: Vec<u8>) -> Result<Self> {
        if num_rows.checked_mul(num_cols) != Some(bytes.len()) {
            return Err(EgsError::shape(format!(
                "compressed data has {} bytes for a {}x{} matrix",
                bytes.len(),
                num_rows,
                num_cols
            )));
        }
        Ok(Self {
            format: CompressionFormat::OneByte,
            min_value,
            range,
            num_rows,
            num_cols,
            data: CompressedData::OneByte(bytes),
        })
    }

    fn uint16_to_float(&self, value: u16) -> f32 {
        self.min_value + self.range * 1.525_902_2e-5_f32 * value as f32
    }

    fn uint8_to_float(&self, value: u8) -> f32 {
        self.min_value + self.range * (1.0 / 255.0) * value as f32
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.num_rows, self.num_cols));
        if self.num_rows == 0 || self.num_cols == 0 {
            return out;
        }
        match &self.data {
            CompressedData::ColHeaders { headers, bytes } => {
                for (c, (header, column)) in headers.iter().zip(bytes.chunks(self.num_rows)).enumerate() {
                    let p0 = self.uint16_to_float(header.percentile_0);
                    let p25 = self.uint16_to_float(header.percentile_25);
                    let p75 = self.uint16_to_float(header.percentile_75);
                    let p100 = self.uint16_to_float(header.percentile_100);
                    for (r, &byte) in column.iter().enumerate() {
                        out[[r, c]] = char_to_float(p0, p25, p75, p100, byte);
                    }
                }
            }
            CompressedData::TwoByte(values) => {
                for (slot, &v) in out.iter_mut().zip(values) {
                    *slot = self.uint16_to_float(v);
                }
            }
            CompressedData::OneByte(bytes) => {
                for (slot, &v) in out.iter_mut().zip(bytes) {
                    *slot = self.uint8_to_float(v);
                }
            }
        }
        out
    }
}

fn char_to_float(p0: f32, p25: f32, p75: f32, p100: f32, value: u8) -> f32 {
    let v = value as f32;
    if value <= 64 {
        p0 + (p25 - p0) * v * (1.0 / 64.0)
    } else if value <= 192 {
        p25 + (p75 - p25) * (v - 64.0) * (1.0 / 128.0)
    } else {
        p75 + (p100 - p75) * (v - 192.0) * (1.0 / 63.0)
    }
}

fn raw_dim(value: i32, what: &str) -> Result<usize> {
    usize::try_from(value).map_err(|_| EgsError::deserialization(format!("{}: negative value {}", what, value)))
}

/// One row of a sparse matrix
#[derive(Debug, Clone, PartialEq)]
pub struct SparseVector {
    pub dim: usize,
    /// `(column, value)` pairs with strictly increasing columns
    pub pairs: Vec<(usize, f32)>,
}

impl SparseVector {
    fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        if reader.is_binary() {
            reader.expect_token("SV")?;
            let dim = reader.read_size("sparse vector dim")?;
            let num_elems = reader.read_size("sparse vector elements")?;
            let mut pairs = Vec::with_capacity(num_elems.min(MAX_PREALLOC));
            for _ in 0..num_elems {
                let idx = reader.read_size("sparse index")?;
                let value = reader.read_f32()?;
                pairs.push((idx, value));
            }
            let vector = Self { dim, pairs };
            vector.check()?;
            return Ok(vector);
        }

        let dim_word = reader.read_word()?;
        let dim = dim_word
            .strip_prefix("dim=")
            .ok_or_else(|| EgsError::deserialization(format!("expected dim=, got {:?}", dim_word)))
            .and_then(parse_word::<usize>)?;
        if reader.read_word()? != "[" {
            return Err(EgsError::deserialization("sparse vector: expected ["));
        }
        let mut pairs = Vec::new();
        loop {
            let word = reader.read_word()?;
            if word == "]" {
                break;
            }
            let idx: usize = parse_word(&word)?;
            let value = parse_float(&reader.read_word()?)?;
            pairs.push((idx, value));
        }
        let vector = Self { dim, pairs };
        vector.check()?;
        Ok(vector)
    }

    fn check(&self) -> Result<()> {
        let mut last: Option<usize> = None;
        for &(idx, _) in &self.pairs {
            if idx >= self.dim || last.is_some_and(|l| idx <= l) {
                return Err(EgsError::deserialization(format!(
                    "sparse vector index {} out of order or beyond dim {}",
                    idx, self.dim
                )));
            }
            last = Some(idx);
        }
        Ok(())
    }
}

/// Row-wise sparse matrix, used for one-hot style inputs
#[derive(Debug, Clone, PartialEq)]
pub struct SparseMatrix {
    pub rows: Vec<SparseVector>,
}

impl SparseMatrix {
    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }

    pub fn num_cols(&self) -> usize {
        self.rows.first().map(|r| r.dim).unwrap_or(0)
    }

    pub fn to_dense(&self) -> Array2<f32> {
        let mut out = Array2::zeros((self.num_rows(), self.num_cols()));
        for (r, row) in self.rows.iter().enumerate() {
            for &(c, v) in &row.pairs {
                out[[r, c]] = v;
            }
        }
        out
    }

    fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        let num_rows = if reader.is_binary() {
            reader.expect_token("SM")?;
            reader.read_size("sparse rows")?
        } else {
            let word = reader.read_word()?;
            word.strip_prefix("rows=")
                .ok_or_else(|| EgsError::deserialization(format!("expected rows=, got {:?}", word)))
                .and_then(parse_word::<usize>)?
        };
        let mut rows = Vec::with_capacity(num_rows.min(MAX_PREALLOC));
        for _ in 0..num_rows {
            rows.push(SparseVector::read(reader)?);
        }
        let matrix = Self { rows };
        if let Some(bad) = matrix.rows.iter().position(|r| r.dim != matrix.num_cols()) {
            return Err(EgsError::deserialization(format!(
                "sparse row {} has dim {}, expected {}",
                bad,
                matrix.rows[bad].dim,
                matrix.num_cols()
            )));
        }
        Ok(matrix)
    }

    fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        writer.write_token("SM")?;
        writer.write_size(self.rows.len(), "sparse rows")?;
        for row in &self.rows {
            writer.write_token("SV")?;
            writer.write_size(row.dim, "sparse vector dim")?;
            writer.write_size(row.pairs.len(), "sparse vector elements")?;
            for &(idx, value) in &row.pairs {
                writer.write_size(idx, "sparse index")?;
                writer.write_f32(value)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn text(data: &[u8]) -> KaldiReader<&[u8]> {
        KaldiReader::with_mode(data, false)
    }

    #[test]
    fn test_text_matrix_rows() {
        let mut reader = text(b" [\n  1 2 3 \n  4 5 6 ]\n");
        let m = read_matrix(&mut reader).unwrap();
        assert_eq!(m, array![[1.0, 2.0, 3.0], [4.0, 5.0, 6.0]]);
        assert_eq!(reader.peek().unwrap(), None);
    }

    #[test]
    fn test_text_matrix_ragged_rows() {
        let mut reader = text(b"[ 1 2\n 3 ]");
        assert!(matches!(read_matrix(&mut reader), Err(EgsError::Deserialization { .. })));
    }

    #[test]
    fn test_text_matrix_empty_and_nonfinite() {
        assert_eq!(read_matrix(&mut text(b"[]")).unwrap().dim(), (0, 0));
        let m = read_matrix(&mut text(b"[ inf -inf ]")).unwrap();
        assert_eq!(m[[0, 0]], f32::INFINITY);
        assert_eq!(m[[0, 1]], f32::NEG_INFINITY);
    }

    #[test]
    fn test_binary_full_matrix() {
        let mut writer = KaldiWriter::new(Vec::new()).unwrap();
        let m = array![[0.5f32, -1.0], [2.0, 3.5], [4.0, 5.0]];
        GeneralMatrix::Full(m.clone()).write(&mut writer).unwrap();
        let bytes = writer.into_inner();
        let mut reader = KaldiReader::open(&bytes[..], 0).unwrap();
        assert_eq!(GeneralMatrix::read(&mut reader).unwrap(), GeneralMatrix::Full(m));
    }

    #[test]
    fn test_one_byte_compression_decodes_linearly() {
        let cm = CompressedMatrix::one_byte(-1.0, 2.0, 1, 3, vec![0, 255, 51]).unwrap();
        let dense = cm.to_dense();
        assert_eq!(dense[[0, 0]], -1.0);
        assert!((dense[[0, 1]] - 1.0).abs() < 1e-6);
        assert!((dense[[0, 2]] - (-0.6)).abs() < 1e-6);
    }

    #[test]
    fn test_col_header_compression_read() {
        // one column, two rows, percentiles spread over [0, 65535]
        let mut bytes = b"\0BCM ".to_vec();
        bytes.extend_from_slice(&0.0f32.to_le_bytes());
        bytes.extend_from_slice(&65535.0f32.to_le_bytes());
        bytes.extend_from_slice(&2i32.to_le_bytes());
        bytes.extend_from_slice(&1i32.to_le_bytes());
        for p in [0u16, 100, 300, 363] {
            bytes.extend_from_slice(&p.to_le_bytes());
        }
        bytes.extend_from_slice(&[64, 255]);

        let mut reader = KaldiReader::open(&bytes[..], 0).unwrap();
        let m = GeneralMatrix::read(&mut reader).unwrap();
        assert!(matches!(m, GeneralMatrix::Compressed(_)));
        let dense = m.to_dense();
        assert_eq!(dense.dim(), (2, 1));
        assert!((dense[[0, 0]] - 100.0).abs() < 1e-2);
        assert!((dense[[1, 0]] - 363.0).abs() < 1e-2);
    }

    fn full_header(rows: i32, cols: i32) -> Vec<u8> {
        let mut bytes = b"\0BFM ".to_vec();
        for dim in [rows, cols] {
            bytes.push(4);
            bytes.extend_from_slice(&dim.to_le_bytes());
        }
        bytes
    }

    #[test]
    fn test_huge_full_matrix_header() {
        let mut bytes = full_header(i32::MAX, i32::MAX);
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        let mut reader = KaldiReader::open(&bytes[..], 0).unwrap();
        assert!(matches!(read_matrix(&mut reader), Err(EgsError::Deserialization { .. })));
    }

    #[test]
    fn test_huge_two_byte_compressed_header() {
        let mut bytes = b"\0BCM2 ".to_vec();
        bytes.extend_from_slice(&0.0f32.to_le_bytes());
        bytes.extend_from_slice(&1.0f32.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        bytes.extend_from_slice(&[0, 0, 1, 0]);
        let mut reader = KaldiReader::open(&bytes[..], 0).unwrap();
        assert!(matches!(
            GeneralMatrix::read(&mut reader),
            Err(EgsError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_huge_sparse_row_count() {
        let mut bytes = b"\0BSM ".to_vec();
        bytes.push(4);
        bytes.extend_from_slice(&i32::MAX.to_le_bytes());
        let mut reader = KaldiReader::open(&bytes[..], 0).unwrap();
        assert!(matches!(
            GeneralMatrix::read(&mut reader),
            Err(EgsError::Deserialization { .. })
        ));
    }

    #[test]
    fn test_text_sparse_matrix() {
        let mut reader = text(b"rows=2 dim=4 [ 1 0.5 3 2 ] \ndim=4 [ ] \n");
        let m = GeneralMatrix::read(&mut reader).unwrap();
        assert_eq!(m.num_rows(), 2);
        assert_eq!(m.num_cols(), 4);
        assert_eq!(m.to_dense(), array![[0.0, 0.5, 0.0, 2.0], [0.0, 0.0, 0.0, 0.0]]);
    }

    #[test]
    fn test_sparse_index_out_of_range() {
        let mut reader = text(b"rows=1 dim=2 [ 2 1.0 ]");
        assert!(GeneralMatrix::read(&mut reader).is_err());
    }

    #[test]
    fn test_text_vector() {
        let mut reader = text(b" [ 0.25 1 ]\n");
        assert_eq!(read_vector(&mut reader).unwrap(), Array1::from(vec![0.25, 1.0]));
    }
}
