//! File, archive-offset, stdin and pipe inputs
//!
//! Locations follow the Kaldi rxfilename grammar:
//! `path`, `path:offset`, `-` (stdin) and `command |`.

use std::fmt;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::str::FromStr;

use tracing::{debug, warn};

use super::ExampleStore;
use crate::error::{EgsError, Result};
use crate::kaldi::{ChainExample, KaldiReader};

/// Parsed read location
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rxfilename {
    Stdin,
    File(PathBuf),
    /// Byte offset into an archive
    Offset { path: PathBuf, offset: u64 },
    /// Shell command whose stdout is read
    Pipe(String),
}

impl FromStr for Rxfilename {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        if s.is_empty() || s == "-" {
            return Ok(Rxfilename::Stdin);
        }
        if s.trim() != s {
            return Err(format!("rxfilename {:?} has leading or trailing whitespace", s));
        }
        if s.starts_with('|') {
            return Err(format!("{:?} is an output pipe, not an input", s));
        }
        if let Some(command) = s.strip_suffix('|') {
            let command = command.trim_end();
            if command.is_empty() {
                return Err("empty pipe command".into());
            }
            return Ok(Rxfilename::Pipe(command.to_string()));
        }
        if let Some((path, offset)) = s.rsplit_once(':') {
            if !path.is_empty() && !offset.is_empty() && offset.bytes().all(|b| b.is_ascii_digit()) {
                let offset = offset
                    .parse()
                    .map_err(|_| format!("archive offset {:?} does not fit in 64 bits", offset))?;
                return Ok(Rxfilename::Offset {
                    path: PathBuf::from(path),
                    offset,
                });
            }
        }
        Ok(Rxfilename::File(PathBuf::from(s)))
    }
}

impl fmt::Display for Rxfilename {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rxfilename::Stdin => write!(f, "-"),
            Rxfilename::File(path) => write!(f, "{}", path.display()),
            Rxfilename::Offset { path, offset } => write!(f, "{}:{}", path.display(), offset),
            Rxfilename::Pipe(command) => write!(f, "{} |", command),
        }
    }
}

/// An open example stream. Dropping it releases the file or reaps the
/// pipe's child process.
pub struct KaldiStream {
    reader: Option<KaldiReader<Box<dyn Read + Send>>>,
    child: Option<Child>,
    location: String,
}

impl KaldiStream {
    pub fn is_binary(&self) -> bool {
        self.reader.as_ref().is_some_and(|r| r.is_binary())
    }

    fn reader(&mut self) -> Result<&mut KaldiReader<Box<dyn Read + Send>>> {
        self.reader.as_mut().ok_or_else(|| EgsError::Internal {
            message: format!("stream for {} already closed", self.location),
        })
    }

    /// Close stdout and reap the child. With `kill`, a child that is still
    /// running is terminated instead of waited for.
    fn release(&mut self, kill: bool) -> Option<std::process::ExitStatus> {
        // a writer blocked on a full pipe sees EPIPE once stdout is closed
        self.reader.take();
        let mut child = self.child.take()?;
        if kill {
            if let Ok(Some(status)) = child.try_wait() {
                return Some(status);
            }
            let _ = child.kill();
        }
        child.wait().ok()
    }
}

impl Drop for KaldiStream {
    fn drop(&mut self) {
        self.release(true);
    }
}

/// Reads examples from files, archive offsets, stdin and pipes
#[derive(Debug, Clone, Default)]
pub struct KaldiExampleStore;

impl KaldiExampleStore {
    pub fn new() -> Self {
        Self
    }
}

impl ExampleStore for KaldiExampleStore {
    type Stream = KaldiStream;

    fn open(&self, location: &str) -> Result<KaldiStream> {
        let rx: Rxfilename = location
            .parse()
            .map_err(|reason: String| EgsError::io(location, std::io::Error::new(std::io::ErrorKind::InvalidInput, reason)))?;

        let (input, child, position): (Box<dyn Read + Send>, Option<Child>, u64) = match &rx {
            Rxfilename::Stdin => (Box::new(BufReader::new(std::io::stdin())), None, 0),
            Rxfilename::File(path) => {
                let file = File::open(path).map_err(|e| EgsError::io(location, e))?;
                (Box::new(BufReader::new(file)), None, 0)
            }
            Rxfilename::Offset { path, offset } => {
                let mut file = File::open(path).map_err(|e| EgsError::io(location, e))?;
                file.seek(SeekFrom::Start(*offset))
                    .map_err(|e| EgsError::io(location, e))?;
                (Box::new(BufReader::new(file)), None, *offset)
            }
            Rxfilename::Pipe(command) => {
                let mut child = Command::new("sh")
                    .arg("-c")
                    .arg(command)
                    .stdout(Stdio::piped())
                    .spawn()
                    .map_err(|e| EgsError::io(location, e))?;
                let stdout = child.stdout.take().ok_or_else(|| {
                    EgsError::io(location, std::io::Error::other("pipe has no stdout"))
                })?;
                (Box::new(BufReader::new(stdout)), Some(child), 0)
            }
        };

        let mut stream = KaldiStream {
            reader: None,
            child,
            location: location.to_string(),
        };
        // on a bad header the partially built stream is dropped and released
        stream.reader = Some(KaldiReader::open(input, position)?);
        debug!(
            "Opened {} ({} mode)",
            rx,
            if stream.is_binary() { "binary" } else { "text" }
        );
        Ok(stream)
    }

    fn read_one(&self, stream: &mut KaldiStream) -> Result<ChainExample> {
        ChainExample::read(stream.reader()?)
    }

    fn close(&self, mut stream: KaldiStream) -> Result<()> {
        if let Some(status) = stream.release(false) {
            if !status.success() {
                warn!("Pipe for {} exited with {}", stream.location, status);
            }
        }
        Ok(())
    }
}
