//! Reader and writer for Kaldi nnet3 chain examples
//!
//! Covers the subset of the Kaldi object format that chain examples use:
//! tokens and basic types, matrices, vectors, index vectors, FSTs and the
//! example records themselves, in both binary and text mode.

pub mod example;
pub mod fst;
pub mod io;
pub mod matrix;

pub use example::{ChainExample, ChainOutput, Index, NnetIo, Supervision};
pub use fst::{Fst, FstArc, FstState};
pub use io::{KaldiReader, KaldiWriter};
pub use matrix::{CompressedMatrix, CompressionFormat, GeneralMatrix, SparseMatrix, SparseVector};
