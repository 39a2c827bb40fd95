//! Example storage
//!
//! An [`ExampleStore`] turns a location string from a manifest into one
//! deserialized [`ChainExample`]. Stores hand out fully owned examples, so
//! nothing read from a stream outlives the stream itself.

pub mod memory;
pub mod rxfile;

pub use memory::MemoryExampleStore;
pub use rxfile::{KaldiExampleStore, KaldiStream, Rxfilename};

use crate::error::Result;
use crate::kaldi::ChainExample;

/// Source of serialized chain examples
pub trait ExampleStore: Send + Sync {
    /// Open stream positioned at the start of one example
    type Stream;

    /// Open the stream for `location`, consuming the binary header if any
    fn open(&self, location: &str) -> Result<Self::Stream>;

    /// Deserialize exactly one example from the stream
    fn read_one(&self, stream: &mut Self::Stream) -> Result<ChainExample>;

    /// Release the stream
    fn close(&self, stream: Self::Stream) -> Result<()>;

    /// Open, read one example, close.
    ///
    /// The stream is an owned value: if reading fails it is dropped on the
    /// way out, which releases it just like `close`.
    fn fetch(&self, location: &str) -> Result<ChainExample> {
        let mut stream = self.open(location)?;
        let example = self.read_one(&mut stream)?;
        self.close(stream)?;
        Ok(example)
    }
}

impl<S: ExampleStore + ?Sized> ExampleStore for std::sync::Arc<S> {
    type Stream = S::Stream;

    fn open(&self, location: &str) -> Result<Self::Stream> {
        (**self).open(location)
    }

    fn read_one(&self, stream: &mut Self::Stream) -> Result<ChainExample> {
        (**self).read_one(stream)
    }

    fn close(&self, stream: Self::Stream) -> Result<()> {
        (**self).close(stream)
    }
}
