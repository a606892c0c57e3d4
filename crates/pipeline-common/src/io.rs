//! Line-oriented I/O for stage processes.

use std::io::{self, BufRead, Write};

use tracing::debug;

/// Reads newline-delimited protocol lines.
///
/// Unlike [`BufRead::lines`], a line that is not valid UTF-8 is skipped rather
/// than ending the stream.
pub struct LineReader<R> {
    reader: R,
    buf: Vec<u8>,
}

impl<R: BufRead> LineReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            buf: Vec::with_capacity(4096),
        }
    }
}

impl<R: BufRead> Iterator for LineReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf) {
                Ok(0) => return None,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Some(Err(e)),
            }

            if self.buf.last() == Some(&b'\n') {
                self.buf.pop();
                if self.buf.last() == Some(&b'\r') {
                    self.buf.pop();
                }
            }

            match String::from_utf8(std::mem::take(&mut self.buf)) {
                Ok(line) => return Some(Ok(line)),
                Err(e) => {
                    debug!(len = e.as_bytes().len(), "Skipping non UTF-8 input line");
                }
            }
        }
    }
}

/// Write one protocol line and flush, so downstream stages see it immediately.
pub fn write_line<W: Write + ?Sized>(writer: &mut W, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()
}
