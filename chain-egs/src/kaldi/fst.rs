//! Tropical-weight FSTs carried by chain supervision
//!
//! Binary supervision graphs are stored in the OpenFst compact-acceptor
//! layout; plain vector FSTs are accepted as well. Text mode uses the
//! tab-separated printer format terminated by an empty line.

use std::io::{Read, Write};

use super::io::{parse_float, parse_word, size_to_i32, KaldiReader, KaldiWriter, MAX_PREALLOC};
use crate::error::{EgsError, Result};

const FST_MAGIC: i32 = 2_125_659_606;

const HAS_ISYMBOLS: i32 = 0x1;
const HAS_OSYMBOLS: i32 = 0x2;
const IS_ALIGNED: i32 = 0x4;

const COMPACT_FILE_VERSION: i32 = 2;
const COMPACT_ALIGNED_FILE_VERSION: i32 = 1;
const VECTOR_FILE_VERSION: i32 = 2;

const PROPERTY_EXPANDED: u64 = 0x1;
const PROPERTY_ACCEPTOR: u64 = 0x1_0000;

const NO_LABEL: i32 = -1;
const NO_STATE: i32 = -1;

/// Largest state id accepted from the text printer format
const MAX_TEXT_STATE: usize = 1 << 20;

/// One transition
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FstArc {
    pub ilabel: i32,
    pub olabel: i32,
    pub weight: f32,
    pub nextstate: u32,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FstState {
    /// `None` for non-final states (tropical zero)
    pub final_weight: Option<f32>,
    pub arcs: Vec<FstArc>,
}

/// Owned tropical-semiring FST
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Fst {
    pub start: Option<u32>,
    pub states: Vec<FstState>,
}

impl Fst {
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn num_arcs(&self) -> usize {
        self.states.iter().map(|s| s.arcs.len()).sum()
    }

    /// Every arc has equal input and output labels
    pub fn is_acceptor(&self) -> bool {
        self.states
            .iter()
            .flat_map(|s| s.arcs.iter())
            .all(|a| a.ilabel == a.olabel)
    }

    fn ensure_state(&mut self, s: usize) {
        if s >= self.states.len() {
            self.states.resize_with(s + 1, FstState::default);
        }
    }

    fn check(&self) -> Result<()> {
        let n = self.states.len();
        if let Some(start) = self.start {
            if start as usize >= n {
                return Err(EgsError::deserialization(format!(
                    "fst start state {} out of range ({} states)",
                    start, n
                )));
            }
        }
        for arc in self.states.iter().flat_map(|s| s.arcs.iter()) {
            if arc.nextstate as usize >= n {
                return Err(EgsError::deserialization(format!(
                    "fst arc points to state {} of {}",
                    arc.nextstate, n
                )));
            }
        }
        Ok(())
    }

    /// Read one FST in the mode of the stream
    pub fn read<R: Read>(reader: &mut KaldiReader<R>) -> Result<Self> {
        if reader.is_binary() {
            read_binary(reader)
        } else {
            read_text(reader)
        }
    }

    /// Write in the binary compact-acceptor layout
    pub fn write_compact_acceptor<W: Write>(&self, writer: &mut KaldiWriter<W>) -> Result<()> {
        if !self.is_acceptor() {
            return Err(EgsError::Internal {
                message: "compact acceptor layout requires ilabel == olabel".into(),
            });
        }
        let num_compacts: usize = self
            .states
            .iter()
            .map(|s| s.arcs.len() + usize::from(s.final_weight.is_some()))
            .sum();

        write_header(
            writer,
            &FstHeader {
                fst_type: "compact_acceptor".into(),
                arc_type: "standard".into(),
                version: COMPACT_FILE_VERSION,
                flags: 0,
                properties: PROPERTY_EXPANDED | PROPERTY_ACCEPTOR,
                start: self.start.map(i64::from).unwrap_or(-1),
                num_states: count_to_i64(self.states.len(), "fst states")?,
                num_arcs: count_to_i64(self.num_arcs(), "fst arcs")?,
            },
        )?;

        let mut offset = 0usize;
        writer.write_raw(&0u32.to_le_bytes())?;
        for state in &self.states {
            offset += state.arcs.len() + usize::from(state.final_weight.is_some());
            let raw = u32::try_from(offset).map_err(|_| EgsError::Internal {
                message: format!("compact fst offset {} overflows uint32", offset),
            })?;
            writer.write_raw(&raw.to_le_bytes())?;
        }
        debug_assert_eq!(offset, num_compacts);

        for state in &self.states {
            if let Some(weight) = state.final_weight {
                write_compact(writer, NO_LABEL, weight, NO_STATE)?;
            }
            for arc in &state.arcs {
                let next = i32::try_from(arc.nextstate).map_err(|_| EgsError::Internal {
                    message: format!("fst state {} overflows int32", arc.nextstate),
                })?;
                write_compact(writer, arc.ilabel, arc.weight, next)?;
            }
        }
        Ok(())
    }
}

struct FstHeader {
    fst_type: String,
    arc_type: String,
    version: i32,
    flags: i32,
    properties: u64,
    start: i64,
    num_states: i64,
    num_arcs: i64,
}

fn read_string<R: Read>(reader: &mut KaldiReader<R>) -> Result<String> {
    let len = reader.read_i32_raw()?;
    let len = usize::try_from(len)
        .ok()
        .filter(|&l| l <= 4096)
        .ok_or_else(|| EgsError::deserialization(format!("fst header string length {}", len)))?;
    String::from_utf8(reader.read_bytes(len)?)
        .map_err(|_| EgsError::deserialization("fst header string is not UTF-8"))
}

fn read_header<R: Read>(reader: &mut KaldiReader<R>) -> Result<FstHeader> {
    let magic = reader.read_i32_raw()?;
    if magic != FST_MAGIC {
        return Err(EgsError::deserialization(format!("bad fst magic number {}", magic)));
    }
    Ok(FstHeader {
        fst_type: read_string(reader)?,
        arc_type: read_string(reader)?,
        version: reader.read_i32_raw()?,
        flags: reader.read_i32_raw()?,
        properties: reader.read_u64_raw()?,
        start: reader.read_i64_raw()?,
        num_states: reader.read_i64_raw()?,
        num_arcs: reader.read_i64_raw()?,
    })
}

fn write_header<W: Write>(writer: &mut KaldiWriter<W>, header: &FstHeader) -> Result<()> {
    writer.write_raw(&FST_MAGIC.to_le_bytes())?;
    for s in [&header.fst_type, &header.arc_type] {
        writer.write_raw(&size_to_i32(s.len(), "fst header string")?.to_le_bytes())?;
        writer.write_raw(s.as_bytes())?;
    }
    writer.write_raw(&header.version.to_le_bytes())?;
    writer.write_raw(&header.flags.to_le_bytes())?;
    writer.write_raw(&header.properties.to_le_bytes())?;
    writer.write_raw(&header.start.to_le_bytes())?;
    writer.write_raw(&header.num_states.to_le_bytes())?;
    writer.write_raw(&header.num_arcs.to_le_bytes())
}

fn count_to_i64(value: usize, what: &str) -> Result<i64> {
    i64::try_from(value).map_err(|_| EgsError::Internal {
        message: format!("{} {} overflows int64", what, value),
    })
}

fn write_compact<W: Write>(writer: &mut KaldiWriter<W>, label: i32, weight: f32, next: i32) -> Result<()> {
    writer.write_raw(&label.to_le_bytes())?;
    writer.write_raw(&weight.to_le_bytes())?;
    writer.write_raw(&next.to_le_bytes())
}

/// Skip padding up to the next 16-byte boundary of the underlying file
fn align_input<R: Read>(reader: &mut KaldiReader<R>) -> Result<()> {
    let rem = reader.position() % 16;
    if rem != 0 {
        reader.read_bytes((16 - rem) as usize)?;
    }
    Ok(())
}

fn weight_or_none(weight: f32) -> Option<f32> {
    (weight != f32::INFINITY).then_some(weight)
}

fn state_id(value: i64, num_states: usize, what: &str) -> Result<u32> {
    usize::try_from(value)
        .ok()
        .filter(|&v| v < num_states)
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| EgsError::deserialization(format!("{} {} out of range", what, value)))
}

fn read_binary<R: Read>(reader: &mut KaldiReader<R>) -> Result<Fst> {
    let header = read_header(reader)?;
    if header.flags & (HAS_ISYMBOLS | HAS_OSYMBOLS) != 0 {
        return Err(EgsError::deserialization("fst with symbol tables is not supported"));
    }
    if header.arc_type != "standard" {
        return Err(EgsError::deserialization(format!(
            "unsupported arc type {}",
            header.arc_type
        )));
    }
    let num_states = usize::try_from(header.num_states)
        .map_err(|_| EgsError::deserialization(format!("fst state count {}", header.num_states)))?;
    let start = if header.start < 0 {
        None
    } else {
        Some(state_id(header.start, num_states, "fst start state")?)
    };

    let fst = if header.fst_type.starts_with("compact") && header.fst_type.ends_with("acceptor") {
        let aligned = header.flags & IS_ALIGNED != 0 || header.version == COMPACT_ALIGNED_FILE_VERSION;
        read_compact_acceptor(reader, start, num_states, aligned)?
    } else if header.fst_type == "vector" {
        if header.version != VECTOR_FILE_VERSION {
            return Err(EgsError::deserialization(format!(
                "unsupported vector fst version {}",
                header.version
            )));
        }
        read_vector_fst(reader, start, num_states)?
    } else {
        return Err(EgsError::deserialization(format!(
            "unsupported fst type {}",
            header.fst_type
        )));
    };

    if fst.num_arcs() as i64 != header.num_arcs && header.num_arcs >= 0 {
        return Err(EgsError::deserialization(format!(
            "fst header declares {} arcs, found {}",
            header.num_arcs,
            fst.num_arcs()
        )));
    }
    fst.check()?;
    Ok(fst)
}

fn read_compact_acceptor<R: Read>(
    reader: &mut KaldiReader<R>,
    start: Option<u32>,
    num_states: usize,
    aligned: bool,
) -> Result<Fst> {
    if aligned {
        align_input(reader)?;
    }
    let mut offsets = Vec::with_capacity(num_states.saturating_add(1).min(MAX_PREALLOC));
    for _ in 0..=num_states {
        offsets.push(reader.read_u32_raw()? as usize);
    }
    if offsets.windows(2).any(|w| w[0] > w[1]) || offsets[0] != 0 {
        return Err(EgsError::deserialization("compact fst state offsets are not monotone"));
    }
    if aligned {
        align_input(reader)?;
    }

    let mut fst = Fst {
        start,
        states: Vec::with_capacity(num_states.min(MAX_PREALLOC)),
    };
    for s in 0..num_states {
        let mut state = FstState::default();
        for i in offsets[s]..offsets[s + 1] {
            let label = reader.read_i32_raw()?;
            let weight = reader.read_f32_raw()?;
            let next = reader.read_i32_raw()?;
            if label == NO_LABEL {
                if i != offsets[s] {
                    return Err(EgsError::deserialization(format!(
                        "final weight of state {} is not its first element",
                        s
                    )));
                }
                state.final_weight = weight_or_none(weight);
            } else {
                state.arcs.push(FstArc {
                    ilabel: label,
                    olabel: label,
                    weight,
                    nextstate: state_id(next as i64, num_states, "arc destination")?,
                });
            }
        }
        fst.states.push(state);
    }
    Ok(fst)
}

fn read_vector_fst<R: Read>(reader: &mut KaldiReader<R>, start: Option<u32>, num_states: usize) -> Result<Fst> {
    let mut fst = Fst {
        start,
        states: Vec::with_capacity(num_states.min(MAX_PREALLOC)),
    };
    for _ in 0..num_states {
        let final_weight = weight_or_none(reader.read_f32_raw()?);
        let num_arcs = reader.read_i64_raw()?;
        let num_arcs = usize::try_from(num_arcs)
            .map_err(|_| EgsError::deserialization(format!("state arc count {}", num_arcs)))?;
        let mut arcs = Vec::with_capacity(num_arcs.min(MAX_PREALLOC));
        for _ in 0..num_arcs {
            let ilabel = reader.read_i32_raw()?;
            let olabel = reader.read_i32_raw()?;
            let weight = reader.read_f32_raw()?;
            let next = reader.read_i32_raw()?;
            arcs.push(FstArc {
                ilabel,
                olabel,
                weight,
                nextstate: state_id(next as i64, num_states, "arc destination")?,
            });
        }
        fst.states.push(FstState { final_weight, arcs });
    }
    Ok(fst)
}

fn text_state(word: &str, line_no: usize) -> Result<usize> {
    let state: usize = parse_word(word)?;
    if state > MAX_TEXT_STATE {
        return Err(EgsError::deserialization(format!(
            "text fst line {}: state {} exceeds {}",
            line_no, state, MAX_TEXT_STATE
        )));
    }
    Ok(state)
}

fn read_text<R: Read>(reader: &mut KaldiReader<R>) -> Result<Fst> {
    // the text form starts on a fresh line
    while let Some(c) = reader.peek()? {
        if c == b'\n' || !c.is_ascii_whitespace() {
            break;
        }
        reader.get()?;
    }
    if reader.get()? != Some(b'\n') {
        return Err(EgsError::deserialization("text fst must start on a new line"));
    }

    let mut fst = Fst::default();
    let mut line_no = 0usize;
    while let Some(line) = reader.read_line()? {
        line_no += 1;
        let cols: Vec<&str> = line.split(|c: char| c == '\t' || c == ' ').filter(|c| !c.is_empty()).collect();
        if cols.is_empty() {
            break;
        }
        let src = text_state(cols[0], line_no)?;
        fst.ensure_state(src);
        if line_no == 1 {
            fst.start = Some(src as u32);
        }
        match cols.len() {
            1 => fst.states[src].final_weight = Some(0.0),
            2 => fst.states[src].final_weight = weight_or_none(parse_float(cols[1])?),
            3..=5 => {
                let dst = text_state(cols[1], line_no)?;
                fst.ensure_state(dst);
                let ilabel: i32 = parse_word(cols[2])?;
                let olabel: i32 = if cols.len() >= 4 { parse_word(cols[3])? } else { ilabel };
                let weight = if cols.len() == 5 { parse_float(cols[4])? } else { 0.0 };
                fst.states[src].arcs.push(FstArc {
                    ilabel,
                    olabel,
                    weight,
                    nextstate: dst as u32,
                });
            }
            n => {
                return Err(EgsError::deserialization(format!(
                    "text fst line {} has {} columns",
                    line_no, n
                )))
            }
        }
    }
    fst.check()?;
    Ok(fst)
}
