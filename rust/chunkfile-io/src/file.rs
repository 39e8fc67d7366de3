use std::{
    fs::{File, OpenOptions},
    ops::Range,
    path::Path,
    sync::OnceLock,
};

use crate::{ReadAt, verify};

/// A `ReadAt` over a local file.
///
/// The file size is queried once, on first use, and cached for the lifetime
/// of the reader. The file is assumed not to change while the reader is open.
pub struct FileReader {
    file: File,
    size: OnceLock<u64>,
}

impl FileReader {
    pub fn new(file: File) -> FileReader {
        FileReader {
            file,
            size: Default::default(),
        }
    }

    /// Opens the file at `path` for reading.
    pub fn open<P: AsRef<Path>>(path: P) -> std::io::Result<FileReader> {
        let mut options = OpenOptions::new();
        options.read(true);
        Self::open_with(path, &options)
    }

    /// Opens the file at `path` with an explicit open mode.
    ///
    /// The reader only issues positional reads, so `options` must at least
    /// enable reading.
    pub fn open_with<P: AsRef<Path>>(path: P, options: &OpenOptions) -> std::io::Result<FileReader> {
        let path = path.as_ref();
        let file = options.open(path)?;
        log::debug!("opened {}", path.display());
        Ok(FileReader::new(file))
    }
}

impl FileReader {
    fn get_size(&self) -> std::io::Result<u64> {
        if let Some(&size) = self.size.get() {
            Ok(size)
        } else {
            let size = self.file.metadata()?.len();
            let _ = self.size.set(size);
            Ok(size)
        }
    }

    fn adjust_read_range(&self, range: Range<u64>) -> std::io::Result<Range<u64>> {
        let size = self.get_size()?;
        if range.start >= size || range.start == range.end {
            return Ok(0..0);
        }
        Ok(range.start..std::cmp::min(range.end, size))
    }
}

impl ReadAt for FileReader {
    fn size(&self) -> std::io::Result<u64> {
        self.get_size()
    }

    fn read_at(&self, range: Range<u64>) -> std::io::Result<Vec<u8>> {
        verify!(range.end >= range.start);
        let range = self.adjust_read_range(range)?;
        if range.is_empty() {
            return Ok(Vec::new());
        }
        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file_read_at_exact(&self.file, range.start, &mut buf)?;
        Ok(buf)
    }
}

#[cfg(unix)]
pub fn file_read_at_exact(file: &File, pos: u64, buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;

    file.read_exact_at(buf, pos)
}

#[cfg(windows)]
pub fn file_read_at_exact(file: &File, mut pos: u64, mut buf: &mut [u8]) -> std::io::Result<()> {
    use std::os::windows::fs::FileExt;

    while !buf.is_empty() {
        match file.seek_read(buf, pos) {
            Ok(0) => break,
            Ok(n) => {
                buf = &mut buf[n..];
                pos += n as u64;
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    if !buf.is_empty() {
        return Err(std::io::ErrorKind::UnexpectedEof.into());
    }
    Ok(())
}
