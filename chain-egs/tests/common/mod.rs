//! Helpers shared by the integration tests

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use chain_egs::kaldi::{ChainOutput, Fst, FstArc, FstState, NnetIo};
use chain_egs::{ChainExample, Supervision};
use ndarray::Array2;

/// Fresh directory under the system temp dir
pub fn temp_dir(tag: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("chain-egs-{}-{}", tag, uuid::Uuid::new_v4()));
    fs::create_dir_all(&dir).unwrap();
    dir
}

/// Acceptor accepting `frames` copies of label 1
pub fn linear_fst(frames: usize) -> Fst {
    let mut states: Vec<FstState> = (0..frames)
        .map(|s| FstState {
            final_weight: None,
            arcs: vec![FstArc {
                ilabel: 1,
                olabel: 1,
                weight: 0.0,
                nextstate: s as u32 + 1,
            }],
        })
        .collect();
    states.push(FstState {
        final_weight: Some(0.0),
        arcs: Vec::new(),
    });
    Fst {
        start: Some(0),
        states,
    }
}

pub fn supervision(num_sequences: usize, frames_per_sequence: usize) -> Supervision {
    Supervision {
        weight: 1.0,
        num_sequences,
        frames_per_sequence,
        label_dim: 8,
        fst: Some(linear_fst(frames_per_sequence)),
        e2e_fsts: Vec::new(),
        alignment_pdfs: Vec::new(),
    }
}

/// Row `r`, column `c` holds `r * 1000 + c`
pub fn numbered_features(rows: usize, cols: usize) -> Array2<f32> {
    Array2::from_shape_fn((rows, cols), |(r, c)| (r * 1000 + c) as f32)
}

pub fn example(rows: usize, cols: usize, sup: Supervision) -> ChainExample {
    ChainExample {
        inputs: vec![NnetIo::new("input", numbered_features(rows, cols))],
        outputs: vec![ChainOutput::new("output", sup)],
    }
}

pub fn write_example(dir: &Path, name: &str, example: &ChainExample) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, example.to_bytes().unwrap()).unwrap();
    path
}

pub fn write_manifest(path: &Path, lines: &[(&str, &str)]) {
    let text: String = lines
        .iter()
        .map(|(key, location)| format!("{} {}\n", key, location))
        .collect();
    fs::write(path, text).unwrap();
}
