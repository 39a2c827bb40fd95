//! Token and basic-type primitives of the Kaldi object format
//!
//! Binary mode: tokens are words followed by one space, basic types carry a
//! one-byte size tag (negated for unsigned types) followed by little-endian
//! bytes. Text mode: whitespace-separated words.

use std::collections::VecDeque;
use std::io::{Read, Write};

use crate::error::{EgsError, Result};

/// Two-byte header that marks a binary-mode Kaldi object
pub const BINARY_HEADER: [u8; 2] = [0, b'B'];

/// Upper bound on capacity reserved from a size read off the stream.
/// Larger objects grow as their data actually arrives.
pub(crate) const MAX_PREALLOC: usize = 1 << 16;

/// Stream reader with lookahead, tracking the absolute byte position
pub struct KaldiReader<R> {
    inner: R,
    lookahead: VecDeque<u8>,
    binary: bool,
    position: u64,
}

impl<R: Read> KaldiReader<R> {
    /// Wrap a stream whose first byte sits at `position` in the underlying
    /// file. The mode is detected from the `\0B` header, which is consumed.
    pub fn open(inner: R, position: u64) -> Result<Self> {
        let mut reader = Self {
            inner,
            lookahead: VecDeque::new(),
            binary: false,
            position,
        };
        if reader.peek()? == Some(0) {
            let mut header = [0u8; 2];
            reader.read_exact(&mut header)?;
            if header != BINARY_HEADER {
                return Err(EgsError::deserialization(format!(
                    "invalid binary header {:?}",
                    header
                )));
            }
            reader.binary = true;
        }
        Ok(reader)
    }

    /// Wrap a stream with a known mode and no header
    pub fn with_mode(inner: R, binary: bool) -> Self {
        Self {
            inner,
            lookahead: VecDeque::new(),
            binary,
            position: 0,
        }
    }

    pub fn is_binary(&self) -> bool {
        self.binary
    }

    /// Absolute byte position of the next unread byte
    pub fn position(&self) -> u64 {
        self.position
    }

    pub fn into_inner(self) -> R {
        self.inner
    }

    fn fill(&mut self, n: usize) -> Result<usize> {
        let mut byte = [0u8; 1];
        while self.lookahead.len() < n {
            match self.inner.read(&mut byte) {
                Ok(0) => break,
                Ok(_) => self.lookahead.push_back(byte[0]),
                Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(EgsError::deserialization(format!("read failed: {}", e))),
            }
        }
        Ok(self.lookahead.len())
    }

    /// Next byte without consuming it
    pub fn peek(&mut self) -> Result<Option<u8>> {
        self.fill(1)?;
        Ok(self.lookahead.front().copied())
    }

    fn peek_at(&mut self, idx: usize) -> Result<Option<u8>> {
        self.fill(idx + 1)?;
        Ok(self.lookahead.get(idx).copied())
    }

    /// Consume one byte
    pub fn get(&mut self) -> Result<Option<u8>> {
        self.fill(1)?;
        let byte = self.lookahead.pop_front();
        if byte.is_some() {
            self.position += 1;
        }
        Ok(byte)
    }

    fn get_required(&mut self) -> Result<u8> {
        self.get()?
            .ok_or_else(|| EgsError::deserialization("unexpected end of stream"))
    }

    /// Fill `buf` completely or fail
    pub fn read_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let from_lookahead = self.lookahead.len().min(buf.len());
        for slot in buf.iter_mut().take(from_lookahead) {
            // lookahead holds at least from_lookahead bytes
            *slot = self.lookahead.pop_front().unwrap_or_default();
        }
        self.inner
            .read_exact(&mut buf[from_lookahead..])
            .map_err(|e| EgsError::deserialization(format!("short read: {}", e)))?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Read exactly `len` bytes. The buffer grows with the data read.
    pub fn read_bytes(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(len.min(MAX_PREALLOC));
        let mut chunk = [0u8; 4096];
        let mut remaining = len;
        while remaining > 0 {
            let n = remaining.min(chunk.len());
            self.read_exact(&mut chunk[..n])?;
            buf.extend_from_slice(&chunk[..n]);
            remaining -= n;
        }
        Ok(buf)
    }

    /// Skip whitespace including newlines
    pub fn skip_whitespace(&mut self) -> Result<()> {
        while let Some(c) = self.peek()? {
            if !c.is_ascii_whitespace() {
                break;
            }
            self.get()?;
        }
        Ok(())
    }

    /// Read a whitespace-delimited word after skipping leading whitespace
    pub fn read_word(&mut self) -> Result<String> {
        self.skip_whitespace()?;
        let mut word = Vec::new();
        while let Some(c) = self.peek()? {
            if c.is_ascii_whitespace() {
                break;
            }
            word.push(c);
            self.get()?;
        }
        if word.is_empty() {
            return Err(EgsError::deserialization("expected a word, found end of stream"));
        }
        String::from_utf8(word).map_err(|_| EgsError::deserialization("word is not valid UTF-8"))
    }

    /// Read a token and the single whitespace character that terminates it
    pub fn read_token(&mut self) -> Result<String> {
        let token = self.read_word()?;
        match self.get()? {
            Some(c) if c.is_ascii_whitespace() => Ok(token),
            _ => Err(EgsError::deserialization(format!(
                "token {} is not followed by whitespace",
                token
            ))),
        }
    }

    pub fn expect_token(&mut self, expected: &str) -> Result<()> {
        let token = self.read_token()?;
        if token != expected {
            return Err(EgsError::deserialization(format!(
                "expected token {}, got {}",
                expected,
                truncate(&token)
            )));
        }
        Ok(())
    }

    /// The character after an opening `<` of the next token, or the next
    /// character itself when the token is not bracketed.
    pub fn peek_token(&mut self) -> Result<Option<u8>> {
        if !self.binary {
            self.skip_whitespace()?;
        }
        match self.peek()? {
            Some(b'<') => self.peek_at(1),
            other => Ok(other),
        }
    }

    fn read_size_tag(&mut self, expected: i8, what: &str) -> Result<()> {
        let tag = self.get_required()? as i8;
        if tag != expected {
            return Err(EgsError::deserialization(format!(
                "{}: expected size tag {}, got {}",
                what, expected, tag
            )));
        }
        Ok(())
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        if self.binary {
            self.read_size_tag(4, "int32")?;
            self.read_i32_raw()
        } else {
            parse_word(&self.read_word()?)
        }
    }

    pub fn read_f32(&mut self) -> Result<f32> {
        if self.binary {
            match self.get_required()? {
                4 => self.read_f32_raw(),
                8 => Ok(f64::from_le_bytes(self.read_array()?) as f32),
                other => Err(EgsError::deserialization(format!(
                    "float: unexpected size tag {}",
                    other
                ))),
            }
        } else {
            parse_float(&self.read_word()?)
        }
    }

    pub fn read_bool(&mut self) -> Result<bool> {
        if !self.binary {
            self.skip_whitespace()?;
        }
        match self.get_required()? {
            b'T' => Ok(true),
            b'F' => Ok(false),
            other => Err(EgsError::deserialization(format!(
                "bool: expected T or F, got {:?}",
                other as char
            ))),
        }
    }

    /// Non-negative int32 converted to a size
    pub fn read_size(&mut self, what: &str) -> Result<usize> {
        let value = self.read_i32()?;
        usize::try_from(value)
            .map_err(|_| EgsError::deserialization(format!("{}: negative value {}", what, value)))
    }

    /// Kaldi integer vector: `[ a b c ]` in text, size-tagged raw int32s in binary
    pub fn read_i32_vector(&mut self) -> Result<Vec<i32>> {
        if self.binary {
            self.read_size_tag(4, "int32 vector")?;
            let len = self.read_size("int32 vector length")?;
            let mut values = Vec::with_capacity(len.min(MAX_PREALLOC));
            for _ in 0..len {
                values.push(self.read_i32_raw()?);
            }
            Ok(values)
        } else {
            self.skip_whitespace()?;
            if self.peek()? != Some(b'[') {
                return Err(EgsError::deserialization("int32 vector: expected ["));
            }
            self.get()?;
            let mut values = Vec::new();
            loop {
                self.skip_whitespace()?;
                if self.peek()? == Some(b']') {
                    self.get()?;
                    return Ok(values);
                }
                values.push(parse_word(&self.read_number_word()?)?);
            }
        }
    }

    /// Word that ends at whitespace or at a closing bracket
    pub(crate) fn read_number_word(&mut self) -> Result<String> {
        self.skip_whitespace()?;
        let mut word = Vec::new();
        while let Some(c) = self.peek()? {
            if c.is_ascii_whitespace() || c == b']' || c == b';' {
                break;
            }
            word.push(c);
            self.get()?;
        }
        if word.is_empty() {
            return Err(EgsError::deserialization("expected a number"));
        }
        String::from_utf8(word).map_err(|_| EgsError::deserialization("number is not valid UTF-8"))
    }

    /// Rest of the current line, without the terminator
    pub fn read_line(&mut self) -> Result<Option<String>> {
        if self.peek()?.is_none() {
            return Ok(None);
        }
        let mut line = Vec::new();
        while let Some(c) = self.get()? {
            if c == b'\n' {
                break;
            }
            line.push(c);
        }
        if line.last() == Some(&b'\r') {
            line.pop();
        }
        String::from_utf8(line)
            .map(Some)
            .map_err(|_| EgsError::deserialization("line is not valid UTF-8"))
    }

    fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn read_u8_raw(&mut self) -> Result<u8> {
        self.get_required()
    }

    pub fn read_u16_raw(&mut self) -> Result<u16> {
        Ok(u16::from_le_bytes(self.read_array()?))
    }

    pub fn read_i32_raw(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    pub fn read_u32_raw(&mut self) -> Result<u32> {
        Ok(u32::from_le_bytes(self.read_array()?))
    }

    pub fn read_i64_raw(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    pub fn read_u64_raw(&mut self) -> Result<u64> {
        Ok(u64::from_le_bytes(self.read_array()?))
    }

    pub fn read_f32_raw(&mut self) -> Result<f32> {
        Ok(f32::from_le_bytes(self.read_array()?))
    }

    pub fn read_f64_raw(&mut self) -> Result<f64> {
        Ok(f64::from_le_bytes(self.read_array()?))
    }
}

/// Binary-mode writer for the same primitives
pub struct KaldiWriter<W> {
    inner: W,
}

impl<W: Write> KaldiWriter<W> {
    /// Start a binary object, writing the `\0B` header
    pub fn new(mut inner: W) -> Result<Self> {
        inner.write_all(&BINARY_HEADER).map_err(write_err)?;
        Ok(Self { inner })
    }

    pub fn into_inner(self) -> W {
        self.inner
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        self.inner.write_all(bytes).map_err(write_err)
    }

    pub fn write_token(&mut self, token: &str) -> Result<()> {
        self.write_raw(token.as_bytes())?;
        self.write_raw(b" ")
    }

    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        self.write_raw(&[4])?;
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        self.write_raw(&[4])?;
        self.write_raw(&value.to_le_bytes())
    }

    pub fn write_bool(&mut self, value: bool) -> Result<()> {
        self.write_raw(if value { b"T" } else { b"F" })
    }

    pub fn write_size(&mut self, value: usize, what: &str) -> Result<()> {
        self.write_i32(size_to_i32(value, what)?)
    }

    /// Untagged little-endian int32, as used inside matrix and FST headers
    pub fn write_size_raw(&mut self, value: usize, what: &str) -> Result<()> {
        self.write_raw(&size_to_i32(value, what)?.to_le_bytes())
    }

    pub fn write_i32_vector(&mut self, values: &[i32]) -> Result<()> {
        self.write_raw(&[4])?;
        self.write_size(values.len(), "int32 vector length")?;
        for v in values {
            self.write_raw(&v.to_le_bytes())?;
        }
        Ok(())
    }
}

pub(crate) fn size_to_i32(value: usize, what: &str) -> Result<i32> {
    i32::try_from(value).map_err(|_| EgsError::Internal {
        message: format!("{} {} overflows int32", what, value),
    })
}

/// Element count of a `rows x cols` object read from the stream
pub(crate) fn checked_area(rows: usize, cols: usize, what: &str) -> Result<usize> {
    rows.checked_mul(cols)
        .ok_or_else(|| EgsError::deserialization(format!("{} {}x{} overflows", what, rows, cols)))
}

fn write_err(e: std::io::Error) -> EgsError {
    EgsError::Internal {
        message: format!("write failed: {}", e),
    }
}

fn truncate(token: &str) -> String {
    if token.len() > 20 {
        let cut: String = token.chars().take(17).collect();
        format!("{}...", cut)
    } else {
        token.to_string()
    }
}

pub(crate) fn parse_word<T: std::str::FromStr>(word: &str) -> Result<T> {
    word.parse()
        .map_err(|_| EgsError::deserialization(format!("cannot parse {:?} as a number", truncate(word))))
}

/// Float parsing that accepts the spellings the library prints for
/// non-finite values
pub(crate) fn parse_float(word: &str) -> Result<f32> {
    match word.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => Ok(f32::INFINITY),
        "-inf" | "-infinity" => Ok(f32::NEG_INFINITY),
        "nan" | "-nan" => Ok(f32::NAN),
        _ => parse_word(word),
    }
}
