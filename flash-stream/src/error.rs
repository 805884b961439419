use flash_device::{FlashDevice, FlashDeviceError, FlashErrorKind};

/// Returned by a verification hook to reject the commit that just landed.
/// The payload is whatever the caller's hook wants to report; it carries no
/// meaning to the engine beyond "non-zero means stop".
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[error("verification hook rejected commit with code {0}")]
pub struct HookError(pub i32);

/// Everything that can go wrong driving a [`crate::Streamer`].
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StreamError<D: FlashDevice> {
    /// A parameter passed to `init` or `write` violates a precondition:
    /// misaligned `base_offset`, a staging buffer shorter than `buf_len`, a
    /// staging buffer larger than the device's page size, or a requested
    /// `size` that overruns the device.
    #[error("bad argument")]
    BadArgument,
    /// The stream has already accepted as many bytes as `size` allows.
    #[error("no space left in the configured region")]
    NoSpace,
    /// The underlying device rejected a read, write, erase, or
    /// write-protect call.
    #[error("flash device error")]
    Device(#[source] D::Error),
    /// A verification hook rejected a commit.
    #[error(transparent)]
    Hook(#[from] HookError),
}

impl<D: FlashDevice> Clone for StreamError<D>
where
    D::Error: Clone,
{
    fn clone(&self) -> Self {
        match self {
            StreamError::BadArgument => StreamError::BadArgument,
            StreamError::NoSpace => StreamError::NoSpace,
            StreamError::Device(e) => StreamError::Device(e.clone()),
            StreamError::Hook(e) => StreamError::Hook(*e),
        }
    }
}

impl<D: FlashDevice> PartialEq for StreamError<D>
where
    D::Error: PartialEq,
{
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (StreamError::BadArgument, StreamError::BadArgument) => true,
            (StreamError::NoSpace, StreamError::NoSpace) => true,
            (StreamError::Device(a), StreamError::Device(b)) => a == b,
            (StreamError::Hook(a), StreamError::Hook(b)) => a == b,
            _ => false,
        }
    }
}

impl<D: FlashDevice> FlashDeviceError for StreamError<D> {
    fn kind(&self) -> FlashErrorKind {
        match self {
            StreamError::BadArgument => FlashErrorKind::Other,
            StreamError::NoSpace => FlashErrorKind::OutOfBounds,
            StreamError::Device(e) => e.kind(),
            StreamError::Hook(_) => FlashErrorKind::Other,
        }
    }
}
