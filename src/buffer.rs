use std::ops::{Index, IndexMut};

use log::info;

use crate::error::{Error, ErrorKind, Result};
use crate::record::{VectorRecord, RECORD_SIZE};
use crate::shm::{OpenOptions, SharedRegion};

/// A fixed array of [`VectorRecord`]s living in a named shared-memory object.
///
/// Writes through this buffer are plain stores. Nothing coordinates them with
/// other processes that map the same name: a reader running alongside an
/// update pass can see a record with some components from the previous pass
/// and some from the current one. Callers that need consistent snapshots must
/// arrange that themselves.
#[derive(Debug)]
pub struct SharedVectorBuffer {
    region: SharedRegion,
}

impl SharedVectorBuffer {
    /// Acquires `/name` sized for `records` records with the default options.
    pub fn acquire(name: &str, records: usize) -> Result<Self> {
        Self::acquire_with(SharedRegion::options(), name, records)
    }

    pub fn acquire_with(options: OpenOptions, name: &str, records: usize) -> Result<Self> {
        let len = records.checked_mul(RECORD_SIZE).ok_or(Error::new(
            name,
            ErrorKind::Layout {
                len: usize::MAX,
                record_size: RECORD_SIZE,
            },
        ))?;
        let region = options.acquire(name, len)?;
        let buffer = Self::from_region(region)?;

        info!(
            "opened {} fd={} addr={:p} record_size={} region_size={}",
            buffer.region.name(),
            buffer.region.raw_fd().unwrap_or(-1),
            buffer.region.addr().unwrap_or(std::ptr::null()),
            RECORD_SIZE,
            buffer.byte_len(),
        );
        Ok(buffer)
    }

    /// Wraps an already mapped region. Fails if the mapping cannot be viewed
    /// as a whole number of aligned records.
    pub fn from_region(region: SharedRegion) -> Result<Self> {
        if bytemuck::try_cast_slice::<u8, VectorRecord>(&region[..]).is_err() {
            return Err(Error::new(
                region.name(),
                ErrorKind::Layout {
                    len: region.len(),
                    record_size: RECORD_SIZE,
                },
            ));
        }
        Ok(Self { region })
    }

    pub fn name(&self) -> &str {
        self.region.name()
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.region.len() / RECORD_SIZE
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn byte_len(&self) -> usize {
        self.region.len()
    }

    /// Size of the backing object as reported by the OS.
    pub fn object_len(&self) -> nix::Result<usize> {
        self.region.object_len()
    }

    pub fn records(&self) -> &[VectorRecord] {
        bytemuck::cast_slice(&self.region[..])
    }

    pub fn records_mut(&mut self) -> &mut [VectorRecord] {
        bytemuck::cast_slice_mut(&mut self.region[..])
    }

    pub fn get(&self, index: usize) -> Option<&VectorRecord> {
        self.records().get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut VectorRecord> {
        self.records_mut().get_mut(index)
    }

    /// Writes the zero vector to every record.
    pub fn initialize(&mut self) {
        self.records_mut().fill(VectorRecord::ZERO);
    }

    /// Unmaps, closes and unlinks. Dropping the buffer does the same but
    /// only logs failures.
    pub fn release(self) -> Result<()> {
        self.region.release()
    }
}

impl Index<usize> for SharedVectorBuffer {
    type Output = VectorRecord;
    fn index(&self, index: usize) -> &Self::Output {
        &self.records()[index]
    }
}

impl IndexMut<usize> for SharedVectorBuffer {
    fn index_mut(&mut self, index: usize) -> &mut Self::Output {
        &mut self.records_mut()[index]
    }
}
