//! Per-frame batch queue

use crate::backend::GraphicsDevice;
use crate::scene::batch::{SortOrder, SourceBatch};
use crate::scene::drawable::{Drawable, FrameInfo};

/// Collects one frame's batches, orders them and issues them.
///
/// Opaque batches draw first, front to back. Blended batches follow, back to
/// front with depth writes disabled.
#[derive(Debug, Default)]
pub struct BatchQueue<'a> {
    opaque: Vec<SourceBatch<'a>>,
    blended: Vec<SourceBatch<'a>>,
    scratch: Vec<SourceBatch<'a>>,
}

impl<'a> BatchQueue<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collect every visible drawable, then sort. Drawables must already be
    /// updated for `frame`.
    pub fn from_drawables(
        drawables: impl IntoIterator<Item = &'a dyn Drawable>,
        frame: &FrameInfo,
    ) -> Self {
        let mut queue = Self::new();
        for drawable in drawables {
            queue.add_drawable(drawable, frame);
        }
        queue.sort();
        queue
    }

    /// Collect a drawable's batches. Drawables outside the frame's view mask
    /// contribute nothing.
    pub fn add_drawable(&mut self, drawable: &'a dyn Drawable, frame: &FrameInfo) {
        if drawable.view_mask() & frame.view_mask == 0 {
            return;
        }
        let mut scratch = std::mem::take(&mut self.scratch);
        drawable.collect_batches(frame, &mut scratch);
        for batch in scratch.drain(..) {
            self.add_batch(batch);
        }
        self.scratch = scratch;
    }

    pub fn add_batch(&mut self, batch: SourceBatch<'a>) {
        if batch.material.is_blended() {
            self.blended.push(batch);
        } else {
            self.opaque.push(batch);
        }
    }

    pub fn sort(&mut self) {
        self.opaque.sort_by(|a, b| {
            a.sort_key(SortOrder::FrontToBack)
                .total_cmp(&b.sort_key(SortOrder::FrontToBack))
        });
        self.blended.sort_by(|a, b| {
            a.sort_key(SortOrder::BackToFront)
                .total_cmp(&b.sort_key(SortOrder::BackToFront))
        });
    }

    /// Issue every batch, opaque first.
    pub fn draw<D: GraphicsDevice + ?Sized>(&self, device: &mut D) {
        for batch in &self.opaque {
            batch.issue_draw(device, true);
        }
        for batch in &self.blended {
            batch.issue_draw(device, false);
        }
        log::trace!(
            "drew {} opaque and {} blended batches",
            self.opaque.len(),
            self.blended.len()
        );
    }

    pub fn opaque(&self) -> &[SourceBatch<'a>] {
        &self.opaque
    }

    pub fn blended(&self) -> &[SourceBatch<'a>] {
        &self.blended
    }

    pub fn len(&self) -> usize {
        self.opaque.len() + self.blended.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.opaque.clear();
        self.blended.clear();
    }
}
