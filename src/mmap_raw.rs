use std::mem::ManuallyDrop;
use std::num::NonZero;
use std::ops::{Deref, DerefMut};
use std::os::fd::AsFd;
use std::ptr::NonNull;

use log::warn;
use nix::libc::{c_void, off_t};
use nix::sys::mman::{mmap, munmap, MapFlags, ProtFlags};

/// One mapped span. Unmapped exactly once, either by `unmap` or on drop.
#[derive(Debug)]
pub(crate) struct MmapRaw {
    pub ptr: NonNull<c_void>,
    pub len: usize,
}

impl MmapRaw {
    pub fn new<F: AsFd>(
        len: NonZero<usize>,
        prot: ProtFlags,
        flgs: MapFlags,
        file: &F,
        off: off_t,
    ) -> nix::Result<Self> {
        let ptr = unsafe { mmap(None, len, prot, flgs, file, off)? };
        Ok(MmapRaw {
            ptr,
            len: len.into(),
        })
    }

    pub fn unmap(self) -> nix::Result<()> {
        let this = ManuallyDrop::new(self);
        unsafe { munmap(this.ptr, this.len) }
    }
}

impl Drop for MmapRaw {
    fn drop(&mut self) {
        if let Err(e) = unsafe { munmap(self.ptr, self.len) } {
            warn!("munmap of {} bytes at {:p} failed: {}", self.len, self.ptr, e);
        }
    }
}

impl Deref for MmapRaw {
    type Target = [u8];
    fn deref(&self) -> &Self::Target {
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr() as *const u8, self.len) }
    }
}

impl DerefMut for MmapRaw {
    fn deref_mut(&mut self) -> &mut [u8] {
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr() as *mut u8, self.len) }
    }
}
