//! # File Access
//!
//! The reader never opens files. It pulls bytes through the [`FileAccess`]
//! trait, one positional read per buffer reload.
//!
//! Implementations are provided for `std::fs::File` (positional reads, no
//! shared seek position) and for in-memory images (`[u8]`, `Vec<u8>`), which
//! is what the tests and mapped files use.

use std::fs::File;
use std::io;

/// Random-access byte source backing a [`SectionReader`](crate::reader::SectionReader).
///
/// ## Implementation Notes
///
/// Implementations should:
/// - Return the number of bytes copied into `dst`, which is short only at end of file
/// - Never panic on offsets past the end (return `Ok(0)` instead)
/// - Avoid heap allocation, since reads may happen while capturing a crash
pub trait FileAccess
{
    /// Read up to `dst.len()` bytes starting at absolute `offset`.
    ///
    /// ## Errors
    ///
    /// Returns the underlying I/O error if the read itself failed.
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> io::Result<usize>;
}

impl FileAccess for [u8]
{
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> io::Result<usize>
    {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        let Some(available) = self.get(start..) else {
            return Ok(0);
        };
        let count = available.len().min(dst.len());
        dst[..count].copy_from_slice(&available[..count]);
        Ok(count)
    }
}

impl FileAccess for Vec<u8>
{
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> io::Result<usize>
    {
        self.as_slice().read_at(offset, dst)
    }
}

impl FileAccess for File
{
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> io::Result<usize>
    {
        let mut filled = 0;
        while filled < dst.len() {
            let position = offset + filled as u64;
            match positional_read(self, position, &mut dst[filled..]) {
                Ok(0) => break,
                Ok(count) => filled += count,
                Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
                Err(err) => return Err(err),
            }
        }
        Ok(filled)
    }
}

impl<T: FileAccess + ?Sized> FileAccess for &T
{
    fn read_at(&self, offset: u64, dst: &mut [u8]) -> io::Result<usize>
    {
        (**self).read_at(offset, dst)
    }
}

#[cfg(unix)]
fn positional_read(file: &File, offset: u64, dst: &mut [u8]) -> io::Result<usize>
{
    std::os::unix::fs::FileExt::read_at(file, dst, offset)
}

#[cfg(windows)]
fn positional_read(file: &File, offset: u64, dst: &mut [u8]) -> io::Result<usize>
{
    std::os::windows::fs::FileExt::seek_read(file, dst, offset)
}

#[cfg(test)]
mod tests
{
    use super::*;

    #[test]
    fn test_slice_read_clamps_at_end()
    {
        let data = [1u8, 2, 3, 4, 5];
        let mut dst = [0u8; 4];
        assert_eq!(data[..].read_at(3, &mut dst).unwrap(), 2);
        assert_eq!(&dst[..2], &[4, 5]);
    }

    #[test]
    fn test_slice_read_past_end_is_empty()
    {
        let data = vec![1u8, 2, 3];
        let mut dst = [0u8; 4];
        assert_eq!(data.read_at(3, &mut dst).unwrap(), 0);
        assert_eq!(data.read_at(u64::MAX, &mut dst).unwrap(), 0);
    }

    #[cfg(any(unix, windows))]
    #[test]
    fn test_file_read_at()
    {
        use std::io::Write;

        let path = std::env::temp_dir().join(format!("dwarfscan-file-{}.bin", std::process::id()));
        {
            let mut file = File::create(&path).unwrap();
            file.write_all(b"0123456789").unwrap();
        }
        let file = File::open(&path).unwrap();
        let mut dst = [0u8; 8];
        assert_eq!(file.read_at(6, &mut dst).unwrap(), 4);
        assert_eq!(&dst[..4], b"6789");
        assert_eq!(file.read_at(2, &mut dst[..3]).unwrap(), 3);
        assert_eq!(&dst[..3], b"234");
        std::fs::remove_file(&path).unwrap();
    }
}
