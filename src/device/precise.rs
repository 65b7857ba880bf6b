//! Precision-preserving read-through cache over a canvas device
//!
//! Smudging reads the canvas back every stamp; doing that through the
//! canvas's 8-bit storage would compound a rounding error per stamp. The
//! wrapper keeps a 16-bit copy of every region read so far and hands
//! blends that copy instead. Written regions are narrowed back to the
//! canvas once per stamp, while the wide copy keeps the unrounded values
//! for the next read.

use rayon::prelude::*;

use super::{PaintDevice, SharedDevice};
use crate::color::ColorSpace;
use crate::geom::Rect;

/// Rows at or above this height get a parallel conversion pass
const PARALLEL_ROW_THRESHOLD: i32 = 64;

/// Wraps a shared canvas device and exposes a precise (16-bit) view of
/// every rectangle read through it
pub struct PreciseColorSource {
    source: SharedDevice,
    precise: PaintDevice,
    covered: Rect,
}

impl PreciseColorSource {
    pub fn new(source: SharedDevice) -> Self {
        let precise = {
            let guard = source.read();
            debug_assert_eq!(guard.color_space().channel_count(), 4);
            PaintDevice::with_bounds(ColorSpace::Rgba16, Rect::default())
        };
        Self {
            source,
            precise,
            covered: Rect::default(),
        }
    }

    /// The color space precise sampling and composition happen in
    pub fn precise_space(&self) -> ColorSpace {
        ColorSpace::Rgba16
    }

    /// The region currently held in the precise buffer
    pub fn covered_rect(&self) -> Rect {
        self.covered
    }

    /// Handle to the precise buffer for sampling and blitting
    pub fn precise_device(&self) -> &PaintDevice {
        &self.precise
    }

    pub fn precise_device_mut(&mut self) -> &mut PaintDevice {
        &mut self.precise
    }

    /// Ensure the precise buffer contains at least `rect`. Pixels already
    /// covered are never re-read, so precision written into the buffer
    /// survives later reads of overlapping rects. An empty rect is a no-op.
    pub fn read_rect(&mut self, rect: Rect) {
        let guard = self.source.read();
        let needed = rect.intersected(&guard.bounds());
        if needed.is_empty() || self.covered.contains_rect(&needed) {
            return;
        }

        let grown = self.covered.united(&needed);
        let mut next = PaintDevice::with_bounds(ColorSpace::Rgba16, grown);
        if !self.covered.is_empty() {
            next.copy_rect_from(self.precise.view(), self.covered);
        }
        // Widen everything newly covered, including any union gap, from
        // the canvas in one conversion pass per strip.
        for strip in grown.subtracted(&self.covered) {
            widen_rows(&mut next, &guard, strip);
        }

        tracing::trace!(?needed, ?grown, "precise cache grown");
        self.precise = next;
        self.covered = grown;
    }

    /// `read_rect` over a batch of rectangles
    pub fn read_rects(&mut self, rects: &[Rect]) {
        for rect in rects {
            self.read_rect(*rect);
        }
    }

    /// Narrow the given precise regions back into the canvas device
    pub fn write_rects(&mut self, rects: &[Rect]) {
        let mut guard = self.source.write();
        for rect in rects {
            let rect = rect.intersected(&self.covered).intersected(&guard.bounds());
            for y in rect.top()..rect.bottom() {
                for x in rect.left()..rect.right() {
                    guard.set_wide_pixel(x, y, self.precise.wide_pixel(x, y));
                }
            }
        }
    }
}

/// Widen `rect` of `src` into `dst` row by row, in parallel for tall rects
fn widen_rows(dst: &mut PaintDevice, src: &PaintDevice, rect: Rect) {
    let rect = rect.intersected(&src.bounds()).intersected(&dst.bounds());
    if rect.is_empty() {
        return;
    }

    let src_space = src.color_space();
    let src_bounds = src.bounds();
    let src_stride = src_bounds.width as usize * 4;
    let dst_bounds = dst.bounds();
    let dst_stride = dst_bounds.width as usize * 4;

    let src_data = src.data();
    let skip = (rect.top() - dst_bounds.y) as usize;
    let take = rect.height as usize;

    let convert_row = |dst_row: &mut [u16], canvas_y: i32| {
        let src_row_start = (canvas_y - src_bounds.y) as usize * src_stride;
        for x in rect.left()..rect.right() {
            let s = src_row_start + (x - src_bounds.x) as usize * 4;
            let d = (x - dst_bounds.x) as usize * 4;
            dst_row[d] = src_space.widen(src_data[s]);
            dst_row[d + 1] = src_space.widen(src_data[s + 1]);
            dst_row[d + 2] = src_space.widen(src_data[s + 2]);
            dst_row[d + 3] = src_space.widen(src_data[s + 3]);
        }
    };

    if rect.height >= PARALLEL_ROW_THRESHOLD {
        dst.data_mut()
            .par_chunks_mut(dst_stride)
            .skip(skip)
            .take(take)
            .enumerate()
            .for_each(|(i, row)| convert_row(row, rect.top() + i as i32));
    } else {
        dst.data_mut()
            .chunks_mut(dst_stride)
            .skip(skip)
            .take(take)
            .enumerate()
            .for_each(|(i, row)| convert_row(row, rect.top() + i as i32));
    }
}
