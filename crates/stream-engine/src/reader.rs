//! Buffered file reader.
//!
//! Compressed data is pulled from storage in whole-window reads so the callback's
//! per-unit reads hit memory. Seeks inside the cached window only move the cursor.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};

/// Read cache over a seekable backing store.
pub struct BufferedReader<R> {
    inner: R,
    buf: Box<[u8]>,
    /// Store offset of `buf[0]`.
    window_start: u64,
    /// Valid bytes in `buf`.
    window_len: usize,
    /// Cursor inside `buf`.
    pos: usize,
}

impl<R: Read + Seek> BufferedReader<R> {
    /// Wrap `inner`, starting at its current position.
    pub fn with_capacity(capacity: usize, mut inner: R) -> io::Result<Self> {
        let window_start = inner.stream_position()?;
        Ok(Self {
            inner,
            buf: vec![0u8; capacity.max(1)].into_boxed_slice(),
            window_start,
            window_len: 0,
            pos: 0,
        })
    }

    /// Window capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.buf.len()
    }

    /// Logical position in the backing store.
    pub fn position(&self) -> u64 {
        self.window_start + self.pos as u64
    }

    fn refill(&mut self) -> io::Result<usize> {
        self.window_start += self.window_len as u64;
        self.window_len = 0;
        self.pos = 0;
        let mut filled = 0;
        while filled < self.buf.len() {
            match self.inner.read(&mut self.buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        self.window_len = filled;
        Ok(filled)
    }
}

impl<R: Read + Seek> Read for BufferedReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if out.is_empty() {
            return Ok(0);
        }
        if self.pos >= self.window_len && self.refill()? == 0 {
            return Ok(0);
        }
        let n = (self.window_len - self.pos).min(out.len());
        out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}

impl<R: Read + Seek> Seek for BufferedReader<R> {
    fn seek(&mut self, target: SeekFrom) -> io::Result<u64> {
        let absolute = match target {
            SeekFrom::Start(off) => off,
            SeekFrom::Current(delta) => offset_by(self.position(), delta)?,
            SeekFrom::End(delta) => {
                let end = self.inner.seek(SeekFrom::End(0))?;
                // Inner cursor moved; the window stays valid but must be re-anchored below.
                self.inner
                    .seek(SeekFrom::Start(self.window_start + self.window_len as u64))?;
                offset_by(end, delta)?
            }
        };

        let window_end = self.window_start + self.window_len as u64;
        if absolute >= self.window_start && absolute <= window_end {
            self.pos = (absolute - self.window_start) as usize;
            return Ok(absolute);
        }

        self.inner.seek(SeekFrom::Start(absolute))?;
        self.window_start = absolute;
        self.window_len = 0;
        self.pos = 0;
        Ok(absolute)
    }
}

fn offset_by(base: u64, delta: i64) -> io::Result<u64> {
    base.checked_add_signed(delta).ok_or_else(|| {
        io::Error::new(io::ErrorKind::InvalidInput, "seek before start of stream")
    })
}

/// Per-session reader, raw or buffered depending on configuration.
pub enum TrackReader {
    Raw(File),
    Buffered(BufferedReader<File>),
}

impl TrackReader {
    /// Wrap `file` (positioned where reading should start).
    pub fn new(file: File, buffered: bool, capacity: usize) -> io::Result<Self> {
        if buffered {
            Ok(TrackReader::Buffered(BufferedReader::with_capacity(
                capacity, file,
            )?))
        } else {
            Ok(TrackReader::Raw(file))
        }
    }

    pub fn is_buffered(&self) -> bool {
        matches!(self, TrackReader::Buffered(_))
    }

    /// Read until `buf` is full or the store is exhausted; returns the byte count.
    pub fn read_unit(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            match self.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }
        Ok(filled)
    }
}

impl Read for TrackReader {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            TrackReader::Raw(f) => f.read(buf),
            TrackReader::Buffered(r) => r.read(buf),
        }
    }
}

impl Seek for TrackReader {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            TrackReader::Raw(f) => f.seek(pos),
            TrackReader::Buffered(r) => r.seek(pos),
        }
    }
}
