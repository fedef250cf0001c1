//! Output-channel interface: the contract the core consumes.
//! Concrete back-ends (no-op, character-device, PWM) are external
//! collaborators discovered by the plugin loader; this module only
//! defines the seam.

use crate::wire::PixelFormat;

/// A local hardware output channel the node hosts.
///
/// Implementations must tolerate `update_pixels` being called concurrently
/// from the message-loop thread (unicast `PIX_DATA`) and the multicast
/// thread (group sync-output frames); if a back-end cannot, it must
/// serialize internally.
pub trait OutputChannel: Send + Sync {
    /// Node-unique, stable 0-based index.
    fn channel_index(&self) -> u32;

    /// Number of pixels this channel is configured for.
    fn pixel_count(&self) -> u32;

    /// Pixel format this channel expects.
    fn pixel_format(&self) -> PixelFormat;

    /// New pixel bytes have arrived for this channel, starting at `offset`
    /// pixels into the strip. No ordering is assumed against other
    /// channels; within a channel, the caller is responsible for
    /// sequencing offsets.
    fn update_pixels(&self, offset: u32, data: &[u8]);
}

pub mod testutil {
    //! A channel that absorbs pixel data with no further action, useful
    //! only for tests (grounded in `original_source`'s `DummyChannel`).
    //! Exported unconditionally (not `cfg(test)`) so integration tests
    //! under `tests/` can use it as a mock sink.

    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    pub struct DummyChannel {
        index: u32,
        pixel_count: u32,
        format: PixelFormat,
        calls: Mutex<Vec<(u32, Vec<u8>)>>,
        call_count: AtomicU32,
    }

    impl DummyChannel {
        pub fn new(index: u32, pixel_count: u32, format: PixelFormat) -> Self {
            Self {
                index,
                pixel_count,
                format,
                calls: Mutex::new(Vec::new()),
                call_count: AtomicU32::new(0),
            }
        }

        pub fn calls(&self) -> Vec<(u32, Vec<u8>)> {
            self.calls.lock().unwrap().clone()
        }

        pub fn call_count(&self) -> u32 {
            self.call_count.load(Ordering::SeqCst)
        }
    }

    impl OutputChannel for DummyChannel {
        fn channel_index(&self) -> u32 {
            self.index
        }

        fn pixel_count(&self) -> u32 {
            self.pixel_count
        }

        fn pixel_format(&self) -> PixelFormat {
            self.format
        }

        fn update_pixels(&self, offset: u32, data: &[u8]) {
            self.call_count.fetch_add(1, Ordering::SeqCst);
            self.calls.lock().unwrap().push((offset, data.to_vec()));
        }
    }
}
