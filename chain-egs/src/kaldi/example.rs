//! Chain training example records
//!
//! Layout of one example:
//! `<Nnet3ChainEg> <NumInputs> n NnetIo.. <NumOutputs> n NnetChainSup.. </Nnet3ChainEg>`

use std::io::{Read, Write};

use ndarray::Array2;

use super::fst::Fst;
use super::io::{KaldiReader, KaldiWriter, MAX_PREALLOC};
use super::matrix::{read_vector, write_vector, GeneralMatrix};
use crate::error::{EgsError, Result};

const MAX_STREAMS: usize = 1_000_000;

/// Position of one row of an input or output stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Index {
    /// Sequence within the merged example
    pub n: i32,
    /// Frame
    pub t: i32,
    pub x: i32,
}

impl Index {
    pub fn new(n: i32, t: i32, x: i32) -> Self {
        Self { n, t, x }
    }
}

fn read_index_vector<R: Read>(reader: &mut KaldiReader<R>) -> Result<Vec<Index>> {
    reader.expect_token("<I1V>")?;
    let size = reader.read_size("index vector size")?;
    let mut indexes: Vec<Index> = Vec::with_capacity(size.min(MAX_PREALLOC));
    for i in 0..size {
        let index = if !reader.is_binary() {
            reader.expect_token("<I1>")?;
            Index::new(reader.read_i32()?, reader.read_i32()?, reader.read_i32()?)
        } else {
            let c = reader.read_u8_raw()? as i8;
            if (c as i32).abs() < 125 {
                match indexes.last() {
                    None => Index::new(0, c as i32, 0),
                    Some(prev) => Index::new(prev.n, prev.t + c as i32, prev.x),
                }
            } else if c == 127 {
                Index::new(reader.read_i32()?, reader.read_i32()?, reader.read_i32()?)
            } else {
                return Err(EgsError::deserialization(format!(
                    "unexpected character {} in index vector at position {}",
                    c, i
                )));
            }
        };
        indexes.push(index);
    }
    Ok(indexes)
}

fn write_index_vector<W: Write>(writer: &mut KaldiWriter<W>, indexes: &[Index]) -> Result<()> {
    writer.write_token("<I1V>")?;
    writer.write_size(indexes.len(), "index vector size")?;
    let mut prev: Option<&Index> = None;
    for index in indexes {
        let delta = match prev {
            None if index.n == 0 && index.x == 0 => Some(index.t),
            Some(p) if index.n == p.n && index.x == p.x => Some(index.t - p.t),
            _ => None,
        };
        match delta {
            Some(d) if d.abs() < 125 => writer.write_raw(&[d as i8 as u8])?,
            _ => {
                writer.write_raw(&[127])?;
                writer.write_i32(index.n)?;
                writer.write_i32(index.t)?;
                writer.write_i32(index.x)?;
            }
        }
        prev = Some(index);
    }
    Ok(())
}

/// A named input stream and its features
#[derive(Debug, Clone, PartialEq)]
pub struct NnetIo {
    pub name: String,
    pub indexes: Vec<Index>,
    pub features: GeneralMatrix,
}

impl NnetIo {
    /// Dense stream whose rows are frames `0..rows` of sequence 0
    pub fn new(name: impl Into<String>, features: Array2<f32>) -> Self {
        let indexes = (0..features.nrows() as i32).map(|t| Index::new(0, t, 0)).collect();
        Self {
            name: name.into(),
            indexes,
            features: GeneralMatrix::Full(features),
        }
    }

    fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        reader.expect_token("<NnetIo>")?;
        let name = reader.read_token()?;
        let indexes = read_index_vector(reader)?;
        let features = GeneralMatrix::read(reader)?;
        reader.expect_token("</NnetIo>")?;
        if indexes.len() != features.num_rows() {
            return Err(EgsError::deserialization(format!(
                "input {} has {} indexes for {} feature rows",
                name,
                indexes.len(),
                features.num_rows()
            )));
        }
        Ok(Self { name, indexes, features })
    }

    fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        writer.write_token("<NnetIo>")?;
        writer.write_token(&self.name)?;
        write_index_vector(writer, &self.indexes)?;
        self.features.write(writer)?;
        writer.write_token("</NnetIo>")
    }
}

/// Chain supervision for a merged batch of sequences.
///
/// The loader never inspects the graphs; it only reads `num_sequences` and
/// `frames_per_sequence` and forwards the value unchanged.
#[derive(Debug, Clone, PartialEq)]
pub struct Supervision {
    pub weight: f32,
    pub num_sequences: usize,
    /// Output frames per sequence, after subsampling
    pub frames_per_sequence: usize,
    pub label_dim: usize,
    /// Numerator graph of all sequences; `None` for end-to-end supervision
    pub fst: Option<Fst>,
    /// One graph per sequence for end-to-end supervision
    pub e2e_fsts: Vec<Fst>,
    pub alignment_pdfs: Vec<i32>,
}

impl Supervision {
    pub fn is_end_to_end(&self) -> bool {
        !self.e2e_fsts.is_empty()
    }

    pub fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        reader.expect_token("<Supervision>")?;
        reader.expect_token("<Weight>")?;
        let weight = reader.read_f32()?;
        reader.expect_token("<NumSequences>")?;
        let num_sequences = reader.read_size("num sequences")?;
        reader.expect_token("<FramesPerSeq>")?;
        let frames_per_sequence = reader.read_size("frames per sequence")?;
        reader.expect_token("<LabelDim>")?;
        let label_dim = reader.read_size("label dim")?;
        if num_sequences == 0 || frames_per_sequence == 0 || label_dim == 0 {
            return Err(EgsError::deserialization(format!(
                "supervision has num_sequences={} frames_per_sequence={} label_dim={}",
                num_sequences, frames_per_sequence, label_dim
            )));
        }

        let e2e = if reader.peek_token()? == Some(b'E') {
            reader.expect_token("<End2End>")?;
            reader.read_bool()?
        } else {
            false
        };

        let (fst, e2e_fsts) = if e2e {
            reader.expect_token("<Fsts>")?;
            let mut fsts = Vec::with_capacity(num_sequences.min(MAX_PREALLOC));
            for _ in 0..num_sequences {
                fsts.push(Fst::read(reader)?);
            }
            reader.expect_token("</Fsts>")?;
            (None, fsts)
        } else {
            (Some(Fst::read(reader)?), Vec::new())
        };

        let alignment_pdfs = if reader.peek_token()? == Some(b'A') {
            reader.expect_token("<AlignmentPdfs>")?;
            reader.read_i32_vector()?
        } else {
            Vec::new()
        };
        reader.expect_token("</Supervision>")?;

        Ok(Self {
            weight,
            num_sequences,
            frames_per_sequence,
            label_dim,
            fst,
            e2e_fsts,
            alignment_pdfs,
        })
    }

    pub fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        writer.write_token("<Supervision>")?;
        writer.write_token("<Weight>")?;
        writer.write_f32(self.weight)?;
        writer.write_token("<NumSequences>")?;
        writer.write_size(self.num_sequences, "num sequences")?;
        writer.write_token("<FramesPerSeq>")?;
        writer.write_size(self.frames_per_sequence, "frames per sequence")?;
        writer.write_token("<LabelDim>")?;
        writer.write_size(self.label_dim, "label dim")?;
        writer.write_token("<End2End>")?;
        writer.write_bool(self.is_end_to_end())?;
        if self.is_end_to_end() {
            writer.write_token("<Fsts>")?;
            for fst in &self.e2e_fsts {
                fst.write_compact_acceptor(writer)?;
            }
            writer.write_token("</Fsts>")?;
        } else {
            let fst = self.fst.as_ref().ok_or_else(|| EgsError::Internal {
                message: "supervision has neither a graph nor end-to-end graphs".into(),
            })?;
            fst.write_compact_acceptor(writer)?;
        }
        if !self.alignment_pdfs.is_empty() {
            writer.write_token("<AlignmentPdfs>")?;
            writer.write_i32_vector(&self.alignment_pdfs)?;
        }
        writer.write_token("</Supervision>")
    }
}

/// A named chain output stream
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutput {
    pub name: String,
    pub indexes: Vec<Index>,
    pub supervision: Supervision,
    /// Per-frame derivative weights; empty when all frames count fully
    pub deriv_weights: Vec<f32>,
}

impl ChainOutput {
    /// Output stream with one index per output frame, sequence-major
    pub fn new(name: impl Into<String>, supervision: Supervision) -> Self {
        let mut indexes = Vec::with_capacity(
            supervision
                .num_sequences
                .saturating_mul(supervision.frames_per_sequence)
                .min(MAX_PREALLOC),
        );
        for t in 0..supervision.frames_per_sequence as i32 {
            for n in 0..supervision.num_sequences as i32 {
                indexes.push(Index::new(n, t, 0));
            }
        }
        Self {
            name: name.into(),
            indexes,
            supervision,
            deriv_weights: Vec::new(),
        }
    }

    fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        reader.expect_token("<NnetChainSup>")?;
        let name = reader.read_token()?;
        let indexes = read_index_vector(reader)?;
        let supervision = Supervision::read(reader)?;
        let token = reader.read_token()?;
        let deriv_weights = match token.as_str() {
            "</NnetChainSup>" => Vec::new(),
            "<DW>" => {
                let weights = read_char_vector(reader)?;
                reader.expect_token("</NnetChainSup>")?;
                weights
            }
            "<DW2>" => {
                let weights = read_vector(reader)?.to_vec();
                reader.expect_token("</NnetChainSup>")?;
                weights
            }
            other => {
                return Err(EgsError::deserialization(format!(
                    "unexpected token {} in output {}",
                    other, name
                )))
            }
        };
        Ok(Self {
            name,
            indexes,
            supervision,
            deriv_weights,
        })
    }

    fn write<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        writer.write_token("<NnetChainSup>")?;
        writer.write_token(&self.name)?;
        write_index_vector(writer, &self.indexes)?;
        self.supervision.write(writer)?;
        if !self.deriv_weights.is_empty() {
            writer.write_token("<DW2>")?;
            write_vector(writer, &self.deriv_weights)?;
        }
        writer.write_token("</NnetChainSup>")
    }
}

/// Legacy derivative weights quantized to bytes
fn read_char_vector<R: Read>(reader: &mut KaldiReader<R>) -> Result<Vec<f32>> {
    if !reader.is_binary() {
        return Ok(read_vector(reader)?.to_vec());
    }
    let dim = reader.read_size("char vector dim")?;
    Ok(reader
        .read_bytes(dim)?
        .into_iter()
        .map(|b| b as f32 / 255.0)
        .collect())
}

/// One deserialized chain training example, owning all of its data
#[derive(Debug, Clone, PartialEq)]
pub struct ChainExample {
    pub inputs: Vec<NnetIo>,
    pub outputs: Vec<ChainOutput>,
}

impl ChainExample {
    pub fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        reader.expect_token("<Nnet3ChainEg>")?;
        reader.expect_token("<NumInputs>")?;
        let num_inputs = read_stream_count(reader, "inputs")?;
        let mut inputs = Vec::with_capacity(num_inputs.min(MAX_PREALLOC));
        for _ in 0..num_inputs {
            inputs.push(NnetIo::read(reader)?);
        }
        reader.expect_token("<NumOutputs>")?;
        let num_outputs = read_stream_count(reader, "outputs")?;
        let mut outputs = Vec::with_capacity(num_outputs.min(MAX_PREALLOC));
        for _ in 0..num_outputs {
            outputs.push(ChainOutput::read(reader)?);
        }
        reader.expect_token("</Nnet3ChainEg>")?;
        Ok(Self { inputs, outputs })
    }

    /// Serialize as a binary object, header included
    pub fn write<W: Write>(&self, out: W) -> Result<W> {
        let mut writer = KaldiWriter::new(out)?;
        writer.write_token("<Nnet3ChainEg>")?;
        writer.write_token("<NumInputs>")?;
        writer.write_size(self.inputs.len(), "input count")?;
        for input in &self.inputs {
            input.write(&mut writer)?;
        }
        writer.write_token("<NumOutputs>")?;
        writer.write_size(self.outputs.len(), "output count")?;
        for output in &self.outputs {
            output.write(&mut writer)?;
        }
        writer.write_token("</Nnet3ChainEg>")?;
        Ok(writer.into_inner())
    }

    /// Serialize to a fresh byte buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        self.write(Vec::new())
    }
}

fn read_stream_count<R: Read>(reader: &mut KaldiReader<R>, what: &str) -> Result<usize> {
    let count = reader.read_i32()?;
    usize::try_from(count)
        .ok()
        .filter(|c| (1..=MAX_STREAMS).contains(c))
        .ok_or_else(|| EgsError::deserialization(format!("invalid number of {}: {}", what, count)))
}
