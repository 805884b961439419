use crate::address::{ByteAddress, PageInfo, PageRegion};

/// Generic error kinds a [`FlashDevice`] implementation maps its own error
/// type onto, mirroring the `NandFlashErrorKind` convention used across this
/// workspace so callers that don't care about a specific driver's error
/// enum can still branch on cause.
#[derive(Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[non_exhaustive]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FlashErrorKind {
    /// Offset or length violates a write-block or page alignment requirement.
    NotAligned,
    /// Offset or length falls outside the device's addressable range.
    OutOfBounds,
    /// Error specific to the implementation.
    Other,
}

/// A trait flash device errors implement so generic code can ask what kind
/// of failure occurred without knowing the concrete error type.
pub trait FlashDeviceError: core::fmt::Debug {
    fn kind(&self) -> FlashErrorKind;
}

/// Associates a [`FlashDevice`] implementation with its error type.
pub trait ErrorType {
    type Error: FlashDeviceError;
}

/// The flash device contract a buffered-write engine is written against.
///
/// Implementations are the external collaborator: they own the physical (or
/// simulated) storage, a concrete device never ships in this crate beyond
/// the [`crate::mock::VirtualFlashDevice`] used for tests.
pub trait FlashDevice: ErrorType {
    /// Page-layout regions, in ascending address order. Summed with
    /// [`total_device_size`](FlashDevice::total_device_size) this gives the
    /// device's total addressable size.
    fn page_layout(&self) -> &[PageRegion];

    /// The smallest legal write granularity and alignment for [`write`](FlashDevice::write).
    fn write_block_size(&self) -> u32;

    /// The `(start_offset, size)` of the page containing `offset`.
    fn page_info_by_offset(&self, offset: u32) -> Result<PageInfo, Self::Error>;

    /// Read `buf.len()` bytes starting at `offset`.
    fn read(&mut self, offset: u32, buf: &mut [u8]) -> Result<(), Self::Error>;

    /// Write `buf.len()` bytes at `offset`. Both must be write-block-aligned.
    fn write(&mut self, offset: u32, buf: &[u8]) -> Result<(), Self::Error>;

    /// Erase whole pages in `[offset, offset + len)`. Both must match page
    /// boundaries exactly.
    fn erase(&mut self, offset: u32, len: u32) -> Result<(), Self::Error>;

    /// Enable (`true`) or disable (`false`) write protection.
    fn set_write_protect(&mut self, enabled: bool) -> Result<(), Self::Error>;

    /// Total addressable size: the sum of `pages_count * page_size` over
    /// every region in [`page_layout`](FlashDevice::page_layout).
    fn total_device_size(&self) -> u64 {
        self.page_layout().iter().map(PageRegion::size).sum()
    }
}

/// RAII guard that disables write protection on construction and re-enables
/// it on drop, guaranteeing the disable/enable pairing holds around every
/// destructive device call even when an intermediate step returns early via
/// `?`.
pub struct WriteUnprotectGuard<'d, D: FlashDevice> {
    device: &'d mut D,
}

impl<'d, D: FlashDevice> WriteUnprotectGuard<'d, D> {
    pub fn new(device: &'d mut D) -> Result<Self, D::Error> {
        device.set_write_protect(false)?;
        Ok(WriteUnprotectGuard { device })
    }

    pub fn device(&mut self) -> &mut D {
        self.device
    }
}

impl<'d, D: FlashDevice> Drop for WriteUnprotectGuard<'d, D> {
    fn drop(&mut self) {
        // Best-effort: there is no error channel left to report through in a
        // Drop impl, and the original leaves write-protect re-enablement
        // unchecked on the same paths.
        let _ = self.device.set_write_protect(true);
    }
}

/// Convert a [`ByteAddress`] into the [`PageInfo`] of the page containing it,
/// via the device's own lookup. Exists so callers reaching for the typed
/// address don't have to unwrap it first.
pub fn page_info_at<D: FlashDevice>(
    device: &D,
    offset: ByteAddress,
) -> Result<PageInfo, D::Error> {
    device.page_info_by_offset(offset.as_u32())
}
