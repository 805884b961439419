#![no_std]
//! Abstract contract for a flash device with page-granularity erase and
//! write-block-aligned writes, plus a RAM-backed mock for exercising it.
//!
//! This crate has no opinion on how bytes are staged before they reach the
//! device — see the `flash-stream` crate for the buffered-write engine built
//! on top of [`FlashDevice`].

mod fmt;

pub mod address;
pub mod device;
pub mod mock;

pub use address::{ByteAddress, PageInfo, PageRegion};
pub use device::{ErrorType, FlashDevice, FlashDeviceError, FlashErrorKind, WriteUnprotectGuard};
