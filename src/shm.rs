use std::num::NonZero;
use std::ops::{Deref, DerefMut};
use std::os::fd::{AsRawFd, IntoRawFd, OwnedFd, RawFd};

use log::{debug, warn};
use nix::errno::Errno;
use nix::libc::{c_void, off_t};
use nix::sys::mman::{shm_open, shm_unlink, MapFlags, ProtFlags};
use nix::sys::stat::{fstat, Mode};
use nix::{fcntl::OFlag, unistd};

use crate::error::{Error, ErrorKind, Result};
use crate::mmap_raw::MmapRaw;

pub struct OpenOptions {
    mode: Mode,
    oflg: OFlag,
    prot: ProtFlags,
    flgs: MapFlags,
    offset: usize,
    unlink_stale: bool,
}

impl OpenOptions {
    /// Opens the object `name` and maps `len` bytes of it.
    ///
    /// With `create` set (the default) this handle owns the object: it sizes
    /// it to `offset + len` bytes and unlinks it on release. Whatever was
    /// acquired before a failing step is closed and unlinked before the error
    /// is returned. Without `create` the handle only attaches to an existing
    /// object that is already large enough, and leaves the name in place.
    pub fn acquire(self, name: &str, len: usize) -> Result<SharedRegion> {
        let name = Self::prepend_slash(name);
        let owned = self.oflg.contains(OFlag::O_CREAT);

        if owned && self.unlink_stale {
            match shm_unlink(name.as_str()) {
                Ok(()) => debug!("removed stale shared memory object {}", name),
                Err(Errno::ENOENT) => (),
                Err(e) => debug!("could not remove stale object {}: {}", name, e),
            }
        }

        let fd = shm_open(name.as_str(), self.oflg, self.mode)
            .map_err(|e| Error::new(&name, ErrorKind::Create(e)))?;

        // From here on, dropping `region` closes the descriptor and, for the
        // owner, unlinks the name.
        let mut region = SharedRegion {
            name,
            fd: Some(fd),
            map: None,
            len,
            offset: self.offset,
            owned,
        };

        let object_len = self.offset.saturating_add(len);
        if owned {
            region.resize(object_len)?;
        } else {
            region.check_len(object_len)?;
        }
        region.map(self.prot, self.flgs)?;
        Ok(region)
    }

    /// Without `O_CREAT` the handle attaches to an object someone else owns.
    pub fn create(mut self, create: bool) -> Self {
        if create {
            self.oflg |= OFlag::O_CREAT;
        } else {
            self.oflg &= !OFlag::O_CREAT;
        }
        self
    }

    /// Remove any object already registered under the name before creating it.
    pub fn unlink_stale(mut self, unlink: bool) -> Self {
        self.unlink_stale = unlink;
        self
    }

    /// Map starting `offset` bytes into the object. Must be aligned to page boundary.
    pub fn offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }

    fn prepend_slash(name: &str) -> String {
        if name.starts_with('/') {
            String::from(name)
        } else {
            String::from("/") + name
        }
    }
}

impl Default for OpenOptions {
    fn default() -> Self {
        // A shared writable mapping needs a read/write descriptor.
        OpenOptions {
            mode: Mode::from_bits_truncate(0o666),
            oflg: OFlag::O_RDWR | OFlag::O_CREAT | OFlag::O_CLOEXEC,
            prot: ProtFlags::PROT_READ | ProtFlags::PROT_WRITE,
            flgs: MapFlags::MAP_SHARED,
            offset: 0,
            unlink_stale: true,
        }
    }
}

/// A named POSIX shared-memory object mapped into this process.
///
/// Teardown always runs unmap, then close, then (for the handle that created
/// the object) unlink, once.
#[derive(Debug)]
pub struct SharedRegion {
    name: String,
    fd: Option<OwnedFd>,
    map: Option<MmapRaw>,
    len: usize,
    offset: usize,
    owned: bool,
}

impl SharedRegion {
    pub fn options() -> OpenOptions {
        OpenOptions::default()
    }

    pub fn acquire(name: &str, len: usize) -> Result<Self> {
        SharedRegion::options().acquire(name, len)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Size of the mapping in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Size of the backing object as reported by the OS.
    pub fn object_len(&self) -> nix::Result<usize> {
        let fd = self.fd.as_ref().ok_or(Errno::EBADF)?;
        let stat = fstat(fd.as_raw_fd())?;
        Ok(stat.st_size as usize)
    }

    pub(crate) fn raw_fd(&self) -> Option<RawFd> {
        self.fd.as_ref().map(|fd| fd.as_raw_fd())
    }

    pub(crate) fn addr(&self) -> Option<*const c_void> {
        self.map.as_ref().map(|m| m.ptr.as_ptr() as *const c_void)
    }

    /// Whether releasing this handle removes the name.
    pub fn is_owner(&self) -> bool {
        self.owned
    }

    /// Unmaps, closes and unlinks if owned, reporting the first failure.
    pub fn release(mut self) -> Result<()> {
        self.teardown()
    }

    fn resize(&mut self, len: usize) -> Result<()> {
        let resize_err = |source| ErrorKind::Resize { len, source };
        let size = off_t::try_from(len)
            .map_err(|_| Error::new(&self.name, resize_err(Errno::EFBIG)))?;
        let fd = self
            .fd
            .as_ref()
            .ok_or(Error::new(&self.name, resize_err(Errno::EBADF)))?;
        unistd::ftruncate(fd, size).map_err(|e| Error::new(&self.name, resize_err(e)))
    }

    fn check_len(&self, expected: usize) -> Result<()> {
        let actual = self
            .object_len()
            .map_err(|e| Error::new(&self.name, ErrorKind::Create(e)))?;
        if actual < expected {
            return Err(Error::new(
                &self.name,
                ErrorKind::TooSmall { expected, actual },
            ));
        }
        Ok(())
    }

    fn map(&mut self, prot: ProtFlags, flgs: MapFlags) -> Result<()> {
        let len = NonZero::new(self.len).ok_or(Error::new(
            &self.name,
            ErrorKind::Resize {
                len: self.len,
                source: Errno::EINVAL,
            },
        ))?;
        let offset = off_t::try_from(self.offset)
            .map_err(|_| Error::new(&self.name, ErrorKind::Map(Errno::EINVAL)))?;
        let fd = self
            .fd
            .as_ref()
            .ok_or(Error::new(&self.name, ErrorKind::Map(Errno::EBADF)))?;
        let map = MmapRaw::new(len, prot, flgs, fd, offset)
            .map_err(|e| Error::new(&self.name, ErrorKind::Map(e)))?;
        self.map = Some(map);
        Ok(())
    }

    fn teardown(&mut self) -> Result<()> {
        let mut first = None;

        if let Some(map) = self.map.take() {
            debug!("unmapping {} bytes of {}", self.len, self.name);
            if let Err(e) = map.unmap() {
                first.get_or_insert(e);
            }
        }

        if let Some(fd) = self.fd.take() {
            debug!("closing descriptor of {}", self.name);
            if let Err(e) = unistd::close(fd.into_raw_fd()) {
                first.get_or_insert(e);
            }
        }

        if self.owned {
            self.owned = false;
            debug!("unlinking {}", self.name);
            // A peer may already have removed the name.
            match shm_unlink(self.name.as_str()) {
                Ok(()) | Err(Errno::ENOENT) => (),
                Err(e) => {
                    first.get_or_insert(e);
                }
            }
        }

        match first {
            None => Ok(()),
            Some(e) => Err(Error::new(&self.name, ErrorKind::Release(e))),
        }
    }
}

impl Deref for SharedRegion {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        self.map.as_deref().unwrap_or_default()
    }
}

impl DerefMut for SharedRegion {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.map.as_deref_mut().unwrap_or_default()
    }
}

impl Drop for SharedRegion {
    fn drop(&mut self) {
        if let Err(e) = self.teardown() {
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unique(tag: &str) -> String {
        format!("/shmvec-shm-{}-{}", std::process::id(), tag)
    }

    fn exists(name: &str) -> bool {
        shm_open(name, OFlag::O_RDONLY, Mode::empty()).is_ok()
    }

    #[test]
    fn prepends_slash() {
        assert_eq!(OpenOptions::prepend_slash("SharedMemory"), "/SharedMemory");
        assert_eq!(OpenOptions::prepend_slash("/SharedMemory"), "/SharedMemory");
    }

    #[test]
    fn acquire_sizes_object_and_maps_it() {
        let name = unique("size");
        let mut region = SharedRegion::acquire(&name, 4096 + 12).unwrap();
        assert_eq!(region.len(), 4096 + 12);
        assert_eq!(region.object_len().unwrap(), 4096 + 12);
        assert_eq!(region[..].len(), 4096 + 12);
        region[4100] = 7;
        assert_eq!(region[4100], 7);
        assert!(exists(&name));
        region.release().unwrap();
        assert!(!exists(&name));
    }

    #[test]
    fn drop_unlinks() {
        let name = unique("drop");
        {
            let _region = SharedRegion::acquire(&name, 64).unwrap();
            assert!(exists(&name));
        }
        assert!(!exists(&name));
    }

    #[test]
    fn stale_object_is_replaced() {
        let name = unique("stale");
        let stale = shm_open(
            name.as_str(),
            OFlag::O_RDWR | OFlag::O_CREAT,
            Mode::from_bits_truncate(0o600),
        )
        .unwrap();
        unistd::ftruncate(&stale, 1 << 20).unwrap();
        drop(stale);

        let region = SharedRegion::acquire(&name, 24).unwrap();
        assert_eq!(region.object_len().unwrap(), 24);
        assert!(region.iter().all(|b| *b == 0));
        region.release().unwrap();
    }

    #[test]
    fn keeping_stale_object_reuses_its_contents() {
        let name = unique("keep");
        let mut first = SharedRegion::acquire(&name, 64).unwrap();
        first[0] = 42;

        let second = SharedRegion::options()
            .unlink_stale(false)
            .acquire(&name, 64)
            .unwrap();
        assert_eq!(second[0], 42);

        second.release().unwrap();
        first.release().unwrap();
        assert!(!exists(&name));
    }

    #[test]
    fn oversized_request_fails_resize_and_cleans_up() {
        let name = unique("toolarge");
        let err = SharedRegion::acquire(&name, usize::MAX).unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Resize { .. }));
        assert_eq!(err.name(), name);
        assert!(!exists(&name));
    }

    #[test]
    fn zero_length_is_rejected() {
        let name = unique("zero");
        let err = SharedRegion::acquire(&name, 0).unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::Resize {
                source: Errno::EINVAL,
                ..
            }
        ));
        assert!(!exists(&name));
    }

    #[test]
    fn open_without_create_reports_creation_error() {
        let name = unique("nocreate");
        let err = SharedRegion::options()
            .create(false)
            .acquire(&name, 64)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Create(Errno::ENOENT)));
    }

    #[test]
    fn unaligned_offset_fails_map_and_cleans_up() {
        let name = unique("unaligned");
        let err = SharedRegion::options()
            .offset(1)
            .acquire(&name, 64)
            .unwrap_err();
        assert!(matches!(err.kind(), ErrorKind::Map(Errno::EINVAL)));
        assert!(!exists(&name));
    }

    #[test]
    fn offset_maps_tail_of_object() {
        // A multiple of every common page size.
        let offset = 1 << 16;
        let name = unique("offset");
        let mut region = SharedRegion::options()
            .offset(offset)
            .acquire(&name, 24)
            .unwrap();
        assert_eq!(region.len(), 24);
        assert_eq!(region.object_len().unwrap(), offset + 24);
        region[23] = 5;
        assert_eq!(region[23], 5);
        region.release().unwrap();
        assert!(!exists(&name));
    }

    #[test]
    fn attaching_handle_neither_resizes_nor_unlinks() {
        let name = unique("attach");
        let owner = SharedRegion::acquire(&name, 4096).unwrap();
        assert!(owner.is_owner());

        let peer = SharedRegion::options()
            .create(false)
            .acquire(&name, 64)
            .unwrap();
        assert!(!peer.is_owner());
        assert_eq!(peer.object_len().unwrap(), 4096);
        peer.release().unwrap();

        assert!(exists(&name));
        assert_eq!(owner.object_len().unwrap(), 4096);
        owner.release().unwrap();
        assert!(!exists(&name));
    }

    #[test]
    fn attaching_to_short_object_is_rejected() {
        let name = unique("short");
        let owner = SharedRegion::acquire(&name, 64).unwrap();
        let err = SharedRegion::options()
            .create(false)
            .acquire(&name, 128)
            .unwrap_err();
        assert!(matches!(
            err.kind(),
            ErrorKind::TooSmall {
                expected: 128,
                actual: 64
            }
        ));
        assert!(exists(&name));
        owner.release().unwrap();
    }
}
