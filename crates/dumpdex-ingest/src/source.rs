//! Dump file line source
//!
//! Opens a plain or gzip-compressed dump and yields its lines one at a time.
//! Invalid UTF-8 is replaced rather than rejected, and `\n` / `\r\n` endings
//! are stripped.

use flate2::read::GzDecoder;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs::File;
use std::io::{self, BufRead, BufReader, Read};
use std::path::Path;
use tracing::debug;

/// Read buffer size; dump lines routinely run to several megabytes
const READ_BUFFER_SIZE: usize = 256 * 1024;

/// Input compression, picked by file extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Compression {
    None,
    Gzip,
}

impl Compression {
    pub fn detect(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("gz") => Compression::Gzip,
            _ => Compression::None,
        }
    }
}

/// Open `path` as a buffered reader, decompressing when needed
///
/// With a progress bar, compressed bytes read from disk drive its position,
/// so the bar's length should be the file size.
pub fn open_dump(path: &Path, progress: Option<ProgressBar>) -> io::Result<Box<dyn BufRead + Send>> {
    let file = File::open(path)?;
    let compression = Compression::detect(path);
    debug!(path = %path.display(), ?compression, "Opening dump");

    let raw: Box<dyn Read + Send> = match progress {
        Some(bar) => Box::new(ProgressReader::new(file, bar)),
        None => Box::new(file),
    };

    let reader: Box<dyn Read + Send> = match compression {
        Compression::Gzip => Box::new(GzDecoder::new(raw)),
        Compression::None => raw,
    };

    Ok(Box::new(BufReader::with_capacity(READ_BUFFER_SIZE, reader)))
}

/// Iterator over the lines of a buffered reader
pub struct LineSource<R> {
    reader: R,
    buf: Vec<u8>,
    line_number: u64,
}

impl<R: BufRead> LineSource<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            line_number: 0,
        }
    }

    /// 1-based number of the last line returned
    pub fn line_number(&self) -> u64 {
        self.line_number
    }
}

impl<R: BufRead> Iterator for LineSource<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.buf.clear();
        match self.reader.read_until(b'\n', &mut self.buf) {
            Ok(0) => None,
            Ok(_) => {
                self.line_number += 1;
                if self.buf.ends_with(b"\n") {
                    self.buf.pop();
                    if self.buf.ends_with(b"\r") {
                        self.buf.pop();
                    }
                }
                Some(Ok(String::from_utf8_lossy(&self.buf).into_owned()))
            },
            Err(e) => Some(Err(e)),
        }
    }
}

/// Reader wrapper that advances a progress bar by the bytes it reads
pub struct ProgressReader<R> {
    inner: R,
    bar: ProgressBar,
}

impl<R: Read> ProgressReader<R> {
    pub fn new(inner: R, bar: ProgressBar) -> Self {
        Self { inner, bar }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.bar.inc(n as u64);
        Ok(n)
    }
}

/// Byte progress bar over a file of `size` bytes
pub fn byte_progress_bar(size: u64, message: &str) -> ProgressBar {
    let bar = ProgressBar::new(size);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-");
    bar.set_style(style);
    bar.set_message(message.to_string());
    bar
}
