//! In-memory example store
//!
//! Holds serialized examples keyed by location. Useful for tests and for
//! callers that already have example bytes in hand.

use std::collections::HashMap;

use bytes::{Buf, Bytes};
use parking_lot::RwLock;

use super::ExampleStore;
use crate::error::{EgsError, Result};
use crate::kaldi::{ChainExample, KaldiReader};

/// Store backed by a map from location to serialized example bytes
#[derive(Debug, Default)]
pub struct MemoryExampleStore {
    blobs: RwLock<HashMap<String, Bytes>>,
}

impl MemoryExampleStore {
    /// Empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Register raw bytes (header included) under `location`
    pub fn insert(&self, location: impl Into<String>, bytes: impl Into<Bytes>) {
        self.blobs.write().insert(location.into(), bytes.into());
    }

    /// Serialize `example` in binary mode and register it
    pub fn insert_example(&self, location: impl Into<String>, example: &ChainExample) -> Result<()> {
        let bytes = example.to_bytes()?;
        self.insert(location, bytes);
        Ok(())
    }

    /// Number of registered locations
    pub fn len(&self) -> usize {
        self.blobs.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.blobs.read().is_empty()
    }
}

impl ExampleStore for MemoryExampleStore {
    type Stream = KaldiReader<bytes::buf::Reader<Bytes>>;

    fn open(&self, location: &str) -> Result<Self::Stream> {
        // Bytes clones share the buffer
        let bytes = self.blobs.read().get(location).cloned().ok_or_else(|| {
            EgsError::io(
                location,
                std::io::Error::new(std::io::ErrorKind::NotFound, "no such in-memory example"),
            )
        })?;
        KaldiReader::open(bytes.reader(), 0)
    }

    fn read_one(&self, stream: &mut Self::Stream) -> Result<ChainExample> {
        ChainExample::read(stream)
    }

    fn close(&self, stream: Self::Stream) -> Result<()> {
        drop(stream);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kaldi::{ChainOutput, Fst, FstState, NnetIo, Supervision};
    use ndarray::Array2;

    #[test]
    fn test_unknown_location() {
        let store = MemoryExampleStore::new();
        assert!(matches!(store.fetch("missing"), Err(EgsError::Io { .. })));
    }

    #[test]
    fn test_insert_and_fetch() {
        let store = MemoryExampleStore::new();
        let example = ChainExample {
            inputs: vec![NnetIo::new("input", Array2::from_elem((3, 2), 0.5))],
            outputs: vec![ChainOutput::new(
                "output",
                Supervision {
                    weight: 1.0,
                    num_sequences: 1,
                    frames_per_sequence: 1,
                    label_dim: 2,
                    fst: Some(Fst {
                        start: Some(0),
                        states: vec![FstState {
                            final_weight: Some(0.0),
                            arcs: vec![],
                        }],
                    }),
                    e2e_fsts: vec![],
                    alignment_pdfs: vec![],
                },
            )],
        };
        store.insert_example("eg-1", &example).unwrap();
        assert_eq!(store.len(), 1);

        assert_eq!(store.fetch("eg-1").unwrap(), example);
    }
}
