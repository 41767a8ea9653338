use std::fs::{File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::error::{Error, Result};
use crate::state::{NodeState, STATE_WIRE_SIZE};

/// A fixed-capacity array of [`NodeState`] records backed by a file, indexed
/// by node id.
///
/// The file is created lazily on first open and zero-padded to its full
/// capacity so every later positional read succeeds. Writes are visible to
/// subsequent reads immediately; durability across power loss is best-effort
/// (no per-write fsync).
///
/// A store file must be opened by exactly one node at a time.
#[derive(Debug)]
pub struct StateStore {
    file: File,
    capacity: usize,
}

impl StateStore {
    /// Opens the store at `path`, creating and zero-filling it if absent.
    pub fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                let mut file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .create(true)
                    .open(path)
                    .map_err(Error::Store)?;
                file.write_all(&vec![0u8; capacity * STATE_WIRE_SIZE])
                    .map_err(Error::Store)?;
                file
            }
            Err(err) => return Err(Error::Store(err)),
        };
        Ok(Self { file, capacity })
    }

    /// Reads the record at `index`.
    pub fn read(&mut self, index: u16) -> Result<NodeState> {
        self.seek_to(index)?;
        let mut buf = [0u8; STATE_WIRE_SIZE];
        self.file.read_exact(&mut buf).map_err(Error::Store)?;
        Ok(NodeState::from_bytes(&buf))
    }

    /// Writes the record at `index`.
    pub fn write(&mut self, index: u16, record: &NodeState) -> Result<()> {
        self.seek_to(index)?;
        self.file
            .write_all(&record.to_bytes())
            .map_err(Error::Store)
    }

    fn seek_to(&mut self, index: u16) -> Result<()> {
        if usize::from(index) >= self.capacity {
            return Err(Error::RecordIndex {
                index,
                capacity: self.capacity,
            });
        }
        self.file
            .seek(SeekFrom::Start(
                u64::from(index) * STATE_WIRE_SIZE as u64,
            ))
            .map_err(Error::Store)?;
        Ok(())
    }
}
