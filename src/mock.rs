//! RAM-backed [`FlashDevice`] for tests: a single region of `PAGE_COUNT`
//! pages of `PAGE_SIZE` bytes each, erased (`0xFF`) on construction, with
//! NOR-flash-style write semantics (`write` logically ANDs with existing
//! content, so writing over un-erased flash is visibly wrong rather than
//! silently succeeding) — the same contract
//! [`embedded_nand::test::VirtualNandFlash`]-style mocks in this workspace
//! enforce.

use crate::address::{PageInfo, PageRegion};
use crate::device::{ErrorType, FlashDevice, FlashDeviceError, FlashErrorKind};

/// Injectable failure, returned once then cleared, so a test can force a
/// single write/read/erase to fail without otherwise touching the mock.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailInjection {
    pub write: bool,
    pub read: bool,
    pub erase: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    OutOfBounds,
    NotAligned,
    Injected,
}

impl FlashDeviceError for Error {
    fn kind(&self) -> FlashErrorKind {
        match self {
            Error::OutOfBounds => FlashErrorKind::OutOfBounds,
            Error::NotAligned => FlashErrorKind::NotAligned,
            Error::Injected => FlashErrorKind::Other,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VirtualFlashDevice<const PAGE_SIZE: usize, const PAGE_COUNT: usize> {
    storage: [[u8; PAGE_SIZE]; PAGE_COUNT],
    layout: [PageRegion; 1],
    write_block_size: u32,
    write_protected: bool,
    pub erase_count: [u32; PAGE_COUNT],
    pub fail_next: FailInjection,
}

impl<const PAGE_SIZE: usize, const PAGE_COUNT: usize> VirtualFlashDevice<PAGE_SIZE, PAGE_COUNT> {
    pub fn new(write_block_size: u32) -> Self {
        VirtualFlashDevice {
            storage: [[0xFF; PAGE_SIZE]; PAGE_COUNT],
            layout: [PageRegion {
                pages_count: PAGE_COUNT as u32,
                page_size: PAGE_SIZE as u32,
            }],
            write_block_size,
            write_protected: true,
            erase_count: [0; PAGE_COUNT],
            fail_next: FailInjection::default(),
        }
    }

    /// Read the raw bytes at `offset` for test assertions, bypassing the
    /// `FlashDevice` trait entirely.
    pub fn contents(&self, offset: u32, len: usize) -> &[u8] {
        let start = offset as usize % (PAGE_SIZE * PAGE_COUNT);
        let flat = self.storage.as_flattened();
        &flat[start..start + len]
    }

    pub fn is_write_protected(&self) -> bool {
        self.write_protected
    }
}

impl<const PAGE_SIZE: usize, const PAGE_COUNT: usize> ErrorType
    for VirtualFlashDevice<PAGE_SIZE, PAGE_COUNT>
{
    type Error = Error;
}

impl<const PAGE_SIZE: usize, const PAGE_COUNT: usize> FlashDevice
    for VirtualFlashDevice<PAGE_SIZE, PAGE_COUNT>
{
    fn page_layout(&self) -> &[PageRegion] {
        &self.layout
    }

    fn write_block_size(&self) -> u32 {
        self.write_block_size
    }

    fn page_info_by_offset(&self, offset: u32) -> Result<PageInfo, Self::Error> {
        if offset as u64 >= self.total_device_size() {
            return Err(Error::OutOfBounds);
        }
        let page_size = PAGE_SIZE as u32;
        let start_offset = (offset / page_size) * page_size;
        Ok(PageInfo {
            start_offset,
            size: page_size,
        })
    }

    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error> {
        if self.fail_next.read {
            self.fail_next.read = false;
            return Err(Error::Injected);
        }
        let capacity = self.total_device_size();
        if offset as u64 + buf.len() as u64 > capacity {
            return Err(Error::OutOfBounds);
        }
        let start = offset as usize;
        let flat = self.storage.as_flattened();
        buf.copy_from_slice(&flat[start..start + buf.len()]);
        Ok(())
    }

    fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), Self::Error> {
        if self.fail_next.write {
            self.fail_next.write = false;
            return Err(Error::Injected);
        }
        if !offset.is_multiple_of(self.write_block_size)
            || !(buf.len() as u32).is_multiple_of(self.write_block_size)
        {
            return Err(Error::NotAligned);
        }
        let capacity = self.total_device_size();
        if offset as u64 + buf.len() as u64 > capacity {
            return Err(Error::OutOfBounds);
        }
        let start = offset as usize;
        let flat = self.storage.as_flattened_mut();
        for (dst, src) in flat[start..start + buf.len()].iter_mut().zip(buf) {
            *dst &= *src;
        }
        Ok(())
    }

    fn erase(&mut self, offset: u32, len: u32) -> Result<(), Self::Error> {
        if self.fail_next.erase {
            self.fail_next.erase = false;
            return Err(Error::Injected);
        }
        let page_size = PAGE_SIZE as u32;
        if !offset.is_multiple_of(page_size) || !len.is_multiple_of(page_size) {
            return Err(Error::NotAligned);
        }
        let capacity = self.total_device_size();
        if offset as u64 + len as u64 > capacity {
            return Err(Error::OutOfBounds);
        }
        let first_page = (offset / page_size) as usize;
        let page_count = (len / page_size) as usize;
        for page in first_page..first_page + page_count {
            self.storage[page].fill(0xFF);
            self.erase_count[page] += 1;
        }
        Ok(())
    }

    fn set_write_protect(&mut self, enabled: bool) -> Result<(), Self::Error> {
        self.write_protected = enabled;
        Ok(())
    }
}
