//! File utilities shared by the filters and the re-encryption pipeline:
//! content hashing, buffering to temporary files, same-directory temp files
//! for atomic replacement, a tee reader and a non-destructive peek.

use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use tempfile::NamedTempFile;

/// SHA-256 of a content stream
pub type ContentHash = [u8; 32];

/// Hash everything `reader` yields
pub fn hash_reader<R: Read>(mut reader: R) -> io::Result<ContentHash> {
    let mut hasher = Sha256::new();
    io::copy(&mut reader, &mut hasher)?;
    Ok(hasher.finalize().into())
}

/// Hash a file from its start and rewind it afterwards
pub fn hash_file(file: &mut File) -> io::Result<ContentHash> {
    file.seek(SeekFrom::Start(0))?;
    let hash = hash_reader(&mut *file);
    file.seek(SeekFrom::Start(0))?;
    hash
}

/// Buffer a non-seekable stream into an anonymous temp file, rewound to the start.
///
/// The file has no name on disk and disappears once dropped.
pub fn copy_to_temp<R: Read>(mut reader: R) -> io::Result<File> {
    let mut file = tempfile::tempfile()?;
    io::copy(&mut reader, &mut file)?;
    file.seek(SeekFrom::Start(0))?;
    Ok(file)
}

/// Create a named temp file next to `path` so it can later be renamed over it.
///
/// Dropping the returned handle removes the file.
pub fn sibling_tempfile(path: &Path) -> io::Result<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = path
        .file_name()
        .map(|name| format!(".{}.", name.to_string_lossy()))
        .unwrap_or_else(|| ".git-age.".to_string());

    tempfile::Builder::new().prefix(&prefix).tempfile_in(dir)
}

/// Atomically move a temp file over `dest` (same filesystem rename)
pub fn replace(tmp: NamedTempFile, dest: &Path) -> io::Result<()> {
    tmp.persist(dest).map(|_| ()).map_err(|e| e.error)
}

/// Reader that copies every byte it yields into a sink
pub struct TeeReader<R, W> {
    reader: R,
    sink: W,
}

impl<R: Read, W: Write> TeeReader<R, W> {
    pub fn new(reader: R, sink: W) -> Self {
        Self { reader, sink }
    }
}

impl<R: Read, W: Write> Read for TeeReader<R, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.reader.read(buf)?;
        self.sink.write_all(&buf[..n])?;
        Ok(n)
    }
}

/// Reader that can look ahead without consuming
pub struct PeekReader<R> {
    inner: R,
    buf: Vec<u8>,
    pos: usize,
}

impl<R: Read> PeekReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
            pos: 0,
        }
    }

    /// Return up to `n` upcoming bytes; fewer only if the stream ends first
    pub fn peek(&mut self, n: usize) -> io::Result<&[u8]> {
        while self.buf.len() - self.pos < n {
            let mut chunk = vec![0u8; n - (self.buf.len() - self.pos)];
            let read = match self.inner.read(&mut chunk) {
                Ok(read) => read,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            };
            if read == 0 {
                break;
            }
            self.buf.extend_from_slice(&chunk[..read]);
        }

        let end = (self.pos + n).min(self.buf.len());
        Ok(&self.buf[self.pos..end])
    }
}

impl<R: Read> Read for PeekReader<R> {
    fn read(&mut self, out: &mut [u8]) -> io::Result<usize> {
        if self.pos < self.buf.len() {
            let n = out.len().min(self.buf.len() - self.pos);
            out[..n].copy_from_slice(&self.buf[self.pos..self.pos + n]);
            self.pos += n;
            if self.pos == self.buf.len() {
                self.buf.clear();
                self.pos = 0;
            }
            return Ok(n);
        }
        self.inner.read(out)
    }
}
