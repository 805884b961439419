use flash_device::{FlashDevice, WriteUnprotectGuard};

use crate::error::{HookError, StreamError};
use crate::fmt::{debug, trace};

/// A verification hook invoked with the bytes just committed, their length,
/// and the absolute offset they landed at. Returning `Err` aborts the write
/// that triggered the commit.
pub type Hook<'h> = dyn FnMut(&[u8], usize, u32) -> Result<(), HookError> + 'h;

/// Buffers bytes in RAM and commits them to a [`FlashDevice`] a page at a
/// time, erasing each page ahead of the commit that lands on it (when the
/// `erase` feature is enabled) and write-protecting the device everywhere
/// except the instant of an erase or write call.
///
/// Borrows its device and staging buffer for its entire lifetime, so two
/// streamers can never address the same device concurrently and a streamer
/// can never outlive either.
pub struct Streamer<'d, 'b, 'h, D: FlashDevice> {
    device: &'d mut D,
    buf: &'b mut [u8],
    buf_len: u32,
    buf_bytes: u32,
    base_offset: u32,
    available: u32,
    bytes_written: u32,
    hook: Option<&'h mut Hook<'h>>,
    #[cfg(feature = "erase")]
    last_erased_page_start_offset: Option<u32>,
}

impl<'d, 'b, 'h, D: FlashDevice> Streamer<'d, 'b, 'h, D> {
    /// Start a new stream at `base_offset`, accepting at most `size` bytes
    /// (or everything up to the end of the device, when `size` is `0`).
    ///
    /// `buffer` must hold at least `buf_len` bytes, and `buf_len` must not
    /// exceed the page size of any region on the device: a page never spans
    /// more than one commit's worth of staged bytes. `base_offset` must be
    /// write-block aligned, and `base_offset + size` must not exceed the
    /// device's total addressable size.
    pub fn init(
        device: &'d mut D,
        buffer: &'b mut [u8],
        buf_len: usize,
        base_offset: u32,
        size: u32,
        hook: Option<&'h mut Hook<'h>>,
    ) -> Result<Self, StreamError<D>> {
        if buf_len == 0 || buffer.len() < buf_len {
            return Err(StreamError::BadArgument);
        }
        if !base_offset.is_multiple_of(device.write_block_size()) {
            return Err(StreamError::BadArgument);
        }
        if device
            .page_layout()
            .iter()
            .any(|region| buf_len as u32 > region.page_size)
        {
            return Err(StreamError::BadArgument);
        }

        let total_device_size = device.total_device_size();
        let end = base_offset as u64 + size as u64;
        if end > total_device_size {
            return Err(StreamError::BadArgument);
        }

        let available = if size == 0 {
            (total_device_size - base_offset as u64) as u32
        } else {
            size
        };

        debug!(
            "stream init at offset {}, {} bytes available, {} byte buffer",
            base_offset, available, buf_len
        );

        Ok(Streamer {
            device,
            buf: &mut buffer[..buf_len],
            buf_len: buf_len as u32,
            buf_bytes: 0,
            base_offset,
            available,
            bytes_written: 0,
            hook,
            #[cfg(feature = "erase")]
            last_erased_page_start_offset: None,
        })
    }

    /// Stage `data`, committing full buffers to the device as they fill.
    /// When `flush` is set, any leftover partial buffer is committed too
    /// before returning, even if `data` is empty.
    pub fn write(&mut self, data: &[u8], flush: bool) -> Result<(), StreamError<D>> {
        let len = data.len() as u32;
        let pending = self.bytes_written as u64 + self.buf_bytes as u64 + len as u64;
        if pending > self.available as u64 {
            return Err(StreamError::NoSpace);
        }

        let mut processed = 0u32;
        loop {
            let free = self.buf_len - self.buf_bytes;
            if len - processed < free {
                break;
            }
            let start = processed as usize;
            let end = start + free as usize;
            self.buf[self.buf_bytes as usize..self.buf_len as usize]
                .copy_from_slice(&data[start..end]);
            self.buf_bytes = self.buf_len;
            self.commit()?;
            processed += free;
        }

        if processed < len {
            let remaining = (len - processed) as usize;
            let dst_start = self.buf_bytes as usize;
            self.buf[dst_start..dst_start + remaining]
                .copy_from_slice(&data[processed as usize..]);
            self.buf_bytes += remaining as u32;
        }

        if flush && self.buf_bytes > 0 {
            self.commit()?;
        }

        Ok(())
    }

    /// Sugar for `write(&[], true)`: commit whatever is currently staged.
    pub fn flush(&mut self) -> Result<(), StreamError<D>> {
        self.write(&[], true)
    }

    /// Total bytes committed to the device so far. Does not count bytes
    /// still sitting in the staging buffer.
    pub fn bytes_written(&self) -> u32 {
        self.bytes_written
    }

    /// Erase the page containing `target_offset`, unless it's the same page
    /// the last call already erased. Exposed so a caller can pre-erase a
    /// page (e.g. the very first one) ahead of the first commit reaching it.
    #[cfg(feature = "erase")]
    pub fn erase_advance(&mut self, target_offset: u32) -> Result<(), D::Error> {
        let page = self.device.page_info_by_offset(target_offset)?;
        if self.last_erased_page_start_offset == Some(page.start_offset) {
            return Ok(());
        }
        self.last_erased_page_start_offset = Some(page.start_offset);

        trace!("erasing page at offset {}, size {}", page.start_offset, page.size);
        let mut guard = WriteUnprotectGuard::new(self.device)?;
        guard.device().erase(page.start_offset, page.size)
    }

    fn commit(&mut self) -> Result<(), StreamError<D>> {
        let write_addr = self.base_offset + self.bytes_written;
        let n = self.buf_bytes;

        #[cfg(feature = "erase")]
        {
            let target = write_addr + n;
            self.erase_advance(target).map_err(StreamError::Device)?;
        }

        {
            let mut guard = WriteUnprotectGuard::new(self.device).map_err(StreamError::Device)?;
            guard
                .device()
                .write(write_addr, &self.buf[..n as usize])
                .map_err(StreamError::Device)?;
        }

        trace!("committed {} bytes at offset {}", n, write_addr);

        if let Some(hook) = self.hook.as_deref_mut() {
            self.device
                .read(write_addr, &mut self.buf[..n as usize])
                .map_err(StreamError::Device)?;
            hook(&self.buf[..n as usize], n as usize, write_addr)?;
        }

        self.bytes_written += n;
        self.buf_bytes = 0;
        Ok(())
    }
}
