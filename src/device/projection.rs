//! Live image projection with scoped update suspension
//!
//! In overlay mode the smudge reads the composited projection of the whole
//! image, which other parts of the application keep re-rendering. Reads
//! must see a consistent snapshot, so the projection supports blocking
//! update application for the duration of a read. Blocking is a guard
//! object: updates submitted while any guard is alive are queued and
//! applied when the last guard drops, on every exit path.

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::{Mutex, RwLock, RwLockReadGuard};

use super::{PaintDevice, SharedDevice};
use crate::geom::Rect;

/// One queued projection refresh
struct PendingUpdate {
    rect: Rect,
    /// Wide-domain RGBA rows for `rect`
    pixels: Vec<u16>,
}

/// The composited projection of an image, refreshed asynchronously by the
/// owning application and snapshot-read by overlay-mode smudging
pub struct ImageProjection {
    device: SharedDevice,
    pending: Mutex<Vec<PendingUpdate>>,
    block_depth: AtomicUsize,
}

impl ImageProjection {
    pub fn new(device: PaintDevice) -> Self {
        Self {
            device: super::shared(device),
            pending: Mutex::new(Vec::new()),
            block_depth: AtomicUsize::new(0),
        }
    }

    /// Shared handle to the projection device, e.g. for wrapping in a
    /// precise color source
    pub fn device(&self) -> SharedDevice {
        self.device.clone()
    }

    /// Read access to the projection content
    pub fn read(&self) -> RwLockReadGuard<'_, PaintDevice> {
        self.device.read()
    }

    pub fn is_blocked(&self) -> bool {
        self.block_depth.load(Ordering::Acquire) > 0
    }

    /// Submit a refreshed region. Applied immediately unless updates are
    /// currently blocked, in which case it is queued.
    pub fn submit_update(&self, rect: Rect, pixels: Vec<u16>) {
        debug_assert_eq!(pixels.len(), rect.area() * 4);
        if self.is_blocked() {
            tracing::trace!(?rect, "projection update queued while blocked");
            self.pending.lock().push(PendingUpdate { rect, pixels });
        } else {
            self.apply(&PendingUpdate { rect, pixels });
        }
    }

    /// Suspend update application until the returned guard drops
    pub fn block_updates(&self) -> UpdateBlockGuard<'_> {
        self.block_depth.fetch_add(1, Ordering::AcqRel);
        UpdateBlockGuard { projection: self }
    }

    fn apply(&self, update: &PendingUpdate) {
        let mut device = self.device.write();
        let rect = update.rect;
        for y in rect.top()..rect.bottom() {
            for x in rect.left()..rect.right() {
                let idx = ((y - rect.y) as usize * rect.width as usize
                    + (x - rect.x) as usize)
                    * 4;
                device.set_wide_pixel(
                    x,
                    y,
                    [
                        update.pixels[idx],
                        update.pixels[idx + 1],
                        update.pixels[idx + 2],
                        update.pixels[idx + 3],
                    ],
                );
            }
        }
    }

    fn unblock(&self) {
        if self.block_depth.fetch_sub(1, Ordering::AcqRel) == 1 {
            let queued = std::mem::take(&mut *self.pending.lock());
            if !queued.is_empty() {
                tracing::trace!(count = queued.len(), "applying queued projection updates");
            }
            for update in queued {
                self.apply(&update);
            }
        }
    }
}

/// RAII guard keeping projection updates suspended. Dropping the last
/// guard applies everything queued in the meantime.
#[must_use = "updates stay blocked only while the guard is alive"]
pub struct UpdateBlockGuard<'a> {
    projection: &'a ImageProjection,
}

impl Drop for UpdateBlockGuard<'_> {
    fn drop(&mut self) {
        self.projection.unblock();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::color::{Color, ColorSpace};

    fn projection(color: [u8; 4]) -> ImageProjection {
        ImageProjection::new(
            PaintDevice::filled(ColorSpace::Rgba8, 8, 8, &Color::from_rgba8(color)).unwrap(),
        )
    }

    fn red_update(rect: Rect) -> Vec<u16> {
        let mut pixels = Vec::with_capacity(rect.area() * 4);
        for _ in 0..rect.area() {
            pixels.extend_from_slice(&[65535, 0, 0, 65535]);
        }
        pixels
    }

    #[test]
    fn test_update_applies_when_unblocked() {
        let proj = projection([0, 0, 0, 255]);
        proj.submit_update(Rect::new(0, 0, 2, 2), red_update(Rect::new(0, 0, 2, 2)));
        assert_eq!(proj.read().wide_pixel(0, 0)[0], 65535);
    }

    #[test]
    fn test_blocked_updates_are_deferred() {
        let proj = projection([0, 0, 0, 255]);

        let guard = proj.block_updates();
        proj.submit_update(Rect::new(0, 0, 2, 2), red_update(Rect::new(0, 0, 2, 2)));

        // The snapshot is unaffected while the guard lives
        assert_eq!(proj.read().wide_pixel(0, 0)[0], 0);

        drop(guard);
        assert_eq!(proj.read().wide_pixel(0, 0)[0], 65535);
    }

    #[test]
    fn test_nested_guards_release_in_order() {
        let proj = projection([0, 0, 0, 255]);

        let outer = proj.block_updates();
        {
            let _inner = proj.block_updates();
            proj.submit_update(Rect::new(1, 1, 1, 1), red_update(Rect::new(1, 1, 1, 1)));
        }
        // Still blocked by the outer guard
        assert_eq!(proj.read().wide_pixel(1, 1)[0], 0);

        drop(outer);
        assert_eq!(proj.read().wide_pixel(1, 1)[0], 65535);
    }

    #[test]
    fn test_guard_released_on_early_return() {
        let proj = projection([0, 0, 0, 255]);

        fn read_with_early_return(proj: &ImageProjection, fail: bool) -> Option<[u16; 4]> {
            let _guard = proj.block_updates();
            if fail {
                return None;
            }
            Some(proj.read().wide_pixel(0, 0))
        }

        assert!(read_with_early_return(&proj, true).is_none());
        assert!(!proj.is_blocked());
    }
}
