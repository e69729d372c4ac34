use std::io::{self, Write};

use sha2::{Digest, Sha256};

/// Writer adapter that hashes everything passing through it, so a download
/// is checksummed without reading the file back.
pub struct HashingWriter<W> {
    inner: W,
    hasher: Sha256,
    written: u64,
}

impl<W: Write> HashingWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            hasher: Sha256::new(),
            written: 0,
        }
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    /// Returns the inner writer and the lowercase hex SHA-256 of the data.
    pub fn finish(self) -> (W, String) {
        let hash = self.hasher.finalize();
        (self.inner, format!("{:x}", hash))
    }
}

impl<W: Write> Write for HashingWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.hasher.update(&buf[..written]);
        self.written += written as u64;
        Ok(written)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
