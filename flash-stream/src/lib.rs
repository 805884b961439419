#![no_std]
//! Buffers bytes in RAM and commits them to a flash device a page at a time,
//! built on top of [`flash_device::FlashDevice`].

mod fmt;

mod error;
mod streamer;

pub use error::{HookError, StreamError};
pub use streamer::{Hook, Streamer};

#[cfg(test)]
mod tests {
    use super::*;
    use core::cell::{Cell, RefCell};
    use flash_device::mock::VirtualFlashDevice;
    use flash_device::FlashDevice;
    use test_log::test;

    const PAGE_SIZE: usize = 4096;
    const PAGE_COUNT: usize = 32;
    const BASE_OFFSET: u32 = 65536;
    const BUF_LEN: usize = 512;
    const PATTERN: u8 = 0xAA;

    type TestDevice = VirtualFlashDevice<PAGE_SIZE, PAGE_COUNT>;

    fn new_device() -> TestDevice {
        TestDevice::new(1)
    }

    fn pattern<const N: usize>() -> [u8; N] {
        [PATTERN; N]
    }

    /// Mirrors every commit's canonical on-flash bytes into RAM via the
    /// verification hook, so a test can inspect what landed on the device
    /// without holding a second borrow of it alongside the `Streamer`.
    struct Recorder<const N: usize> {
        base: u32,
        mirror: RefCell<[u8; N]>,
        calls: Cell<usize>,
    }

    impl<const N: usize> Recorder<N> {
        fn new(base: u32) -> Self {
            Recorder {
                base,
                mirror: RefCell::new([0xFFu8; N]),
                calls: Cell::new(0),
            }
        }

        fn hook(&self) -> impl FnMut(&[u8], usize, u32) -> Result<(), HookError> + '_ {
            move |buf: &[u8], len: usize, offset: u32| {
                self.calls.set(self.calls.get() + 1);
                let start = (offset - self.base) as usize;
                self.mirror.borrow_mut()[start..start + len].copy_from_slice(&buf[..len]);
                Ok(())
            }
        }

        fn is_all(&self, start: u32, len: usize, value: u8) -> bool {
            let offset = (start - self.base) as usize;
            self.mirror.borrow()[offset..offset + len]
                .iter()
                .all(|&b| b == value)
        }
    }

    #[test]
    fn s1_partial_fill_then_top_up() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let recorder: Recorder<BUF_LEN> = Recorder::new(BASE_OFFSET);
        let mut hook = recorder.hook();
        let mut stream = Streamer::init(
            &mut device,
            &mut buf,
            BUF_LEN,
            BASE_OFFSET,
            0,
            Some(&mut hook),
        )
        .unwrap();

        stream.write(&pattern::<511>(), false).unwrap();
        assert_eq!(stream.bytes_written(), 0, "511 bytes should not trigger a commit");

        stream.write(&pattern::<1>(), false).unwrap();
        assert_eq!(stream.bytes_written(), BUF_LEN as u32);
        assert!(recorder.is_all(BASE_OFFSET, BUF_LEN, PATTERN));
    }

    #[test]
    fn s2_cross_buffer_write_then_flush() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let recorder: Recorder<1280> = Recorder::new(BASE_OFFSET);
        let mut hook = recorder.hook();
        let mut stream = Streamer::init(
            &mut device,
            &mut buf,
            BUF_LEN,
            BASE_OFFSET,
            0,
            Some(&mut hook),
        )
        .unwrap();

        stream.write(&pattern::<640>(), false).unwrap();
        assert!(recorder.is_all(BASE_OFFSET, 512, PATTERN));
        assert_eq!(stream.bytes_written(), 512);

        stream.write(&pattern::<384>(), false).unwrap();
        assert!(recorder.is_all(BASE_OFFSET + 512, 512, PATTERN));
        assert_eq!(stream.bytes_written(), 1024);

        stream.write(&pattern::<256>(), false).unwrap();
        assert_eq!(stream.bytes_written(), 1024, "256 bytes alone should not commit");

        stream.write(&[], true).unwrap();
        assert!(recorder.is_all(BASE_OFFSET + 1024, 256, PATTERN));
        assert_eq!(stream.bytes_written(), 1280);
    }

    #[test]
    fn s3_multi_page_streaming() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        const SPAN: usize = 4 * PAGE_SIZE;
        let recorder: Recorder<SPAN> = Recorder::new(BASE_OFFSET);
        let mut hook = recorder.hook();
        let mut stream = Streamer::init(
            &mut device,
            &mut buf,
            BUF_LEN,
            BASE_OFFSET,
            0,
            Some(&mut hook),
        )
        .unwrap();

        stream
            .write(&pattern::<{ 3 * PAGE_SIZE + 128 }>(), false)
            .unwrap();
        assert!(recorder.is_all(BASE_OFFSET, 3 * PAGE_SIZE, PATTERN));
        assert_eq!(stream.bytes_written(), (3 * PAGE_SIZE) as u32);

        stream.write(&pattern::<{ PAGE_SIZE - 128 }>(), false).unwrap();
        assert!(recorder.is_all(BASE_OFFSET, 4 * PAGE_SIZE, PATTERN));
        assert_eq!(stream.bytes_written(), (4 * PAGE_SIZE) as u32);
    }

    #[test]
    fn s4_invalid_init() {
        let mut device = new_device();
        let mut buf = [0u8; 0x10000];
        match Streamer::init(&mut device, &mut buf, 0x10000, BASE_OFFSET, 0, None) {
            Err(e) => assert_eq!(e, StreamError::BadArgument),
            Ok(_) => panic!("buf_len larger than the page size should be rejected"),
        }

        let total = device.total_device_size() as u32;
        let available = total - BASE_OFFSET;
        let mut buf2 = [0u8; BUF_LEN];
        match Streamer::init(
            &mut device,
            &mut buf2,
            BUF_LEN,
            BASE_OFFSET,
            available + 4,
            None,
        ) {
            Err(e) => assert_eq!(e, StreamError::BadArgument),
            Ok(_) => panic!("size beyond the device's capacity should be rejected"),
        }

        let stream =
            Streamer::init(&mut device, &mut buf2, BUF_LEN, BASE_OFFSET, 0, None).unwrap();
        assert_eq!(stream.bytes_written(), 0);
    }

    #[test]
    fn s5_hook_verification_then_failure() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];

        let calls: Cell<u32> = Cell::new(0);
        let last: Cell<(usize, u32)> = Cell::new((0, 0));
        let mut hook = |_buf: &[u8], len: usize, offset: u32| -> Result<(), HookError> {
            calls.set(calls.get() + 1);
            last.set((len, offset));
            if calls.get() == 2 {
                return Err(HookError(-1));
            }
            Ok(())
        };
        let mut stream = Streamer::init(
            &mut device,
            &mut buf,
            BUF_LEN,
            BASE_OFFSET,
            0,
            Some(&mut hook),
        )
        .unwrap();

        stream.write(&pattern::<640>(), false).unwrap();
        assert_eq!(calls.get(), 1);
        assert_eq!(last.get(), (512, BASE_OFFSET));

        let err = stream.write(&pattern::<384>(), false).unwrap_err();
        assert_eq!(err, StreamError::Hook(HookError(-1)));
        assert_eq!(calls.get(), 2);
        assert_eq!(last.get(), (512, BASE_OFFSET + 512));
        assert_eq!(stream.bytes_written(), 512);
    }

    #[test]
    fn s6_erase_bookmark() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 0, None).unwrap();

        // buf_len (512) fills exactly, so this write triggers one commit. Its
        // own erase-advance lookahead (W+N, both inside page 65536 since
        // buf_len < page_size) already erases the whole page before writing
        // the 512 bytes, so the written span is pattern and the rest of the
        // page is left erased.
        stream.write(&pattern::<BUF_LEN>(), false).unwrap();
        assert_eq!(device.contents(BASE_OFFSET, BUF_LEN), &[PATTERN; BUF_LEN][..]);
        assert_eq!(
            device.contents(BASE_OFFSET + BUF_LEN as u32, PAGE_SIZE - BUF_LEN),
            &[0xFFu8; PAGE_SIZE - BUF_LEN][..]
        );

        let page_index = (BASE_OFFSET as usize) / PAGE_SIZE;
        assert_eq!(device.erase_count[page_index], 1);

        stream.erase_advance(BASE_OFFSET).unwrap();
        assert_eq!(
            device.erase_count[page_index], 1,
            "page 65536 was already erased ahead of the commit above; erase_advance targeting \
             the same page is idempotent and must not erase again"
        );

        stream.erase_advance(BASE_OFFSET).unwrap();
        assert_eq!(device.erase_count[page_index], 1, "second erase_advance on the same page should not erase again");
    }

    #[test]
    fn failure_containment_leaves_bytes_written_unchanged() {
        let mut device = new_device();
        device.fail_next.write = true;
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 0, None).unwrap();

        let err = stream.write(&pattern::<BUF_LEN>(), false).unwrap_err();
        assert!(matches!(err, StreamError::Device(_)));
        assert_eq!(stream.bytes_written(), 0);
    }

    #[test]
    fn write_protect_is_re_enabled_after_commit() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 0, None).unwrap();
        stream.write(&pattern::<BUF_LEN>(), false).unwrap();
        assert!(device.is_write_protected());
    }

    #[test]
    fn zero_length_write_without_flush_is_a_no_op() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 0, None).unwrap();
        stream.write(&[], false).unwrap();
        assert_eq!(stream.bytes_written(), 0);
    }

    #[test]
    fn exact_buffer_fill_commits_once_and_empties_buffer() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 0, None).unwrap();
        stream.write(&pattern::<BUF_LEN>(), false).unwrap();
        assert_eq!(stream.bytes_written(), BUF_LEN as u32);
    }

    #[test]
    fn write_past_available_is_rejected_without_partial_commit() {
        let mut device = new_device();
        let mut buf = [0u8; BUF_LEN];
        let mut stream =
            Streamer::init(&mut device, &mut buf, BUF_LEN, BASE_OFFSET, 256, None).unwrap();
        let err = stream.write(&pattern::<257>(), false).unwrap_err();
        assert_eq!(err, StreamError::NoSpace);
        assert_eq!(stream.bytes_written(), 0);
    }
}
