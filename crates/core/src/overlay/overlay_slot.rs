/// Hook invoked whenever a slot's visible contents change.
pub type Invalidate = Box<dyn Fn() + Send>;

/// One independently clearable piece of overlay render state.
///
/// Every visible change requests exactly one redraw; writes that leave the
/// slot looking the same request none.
pub struct OverlaySlot<T> {
    value: Option<T>,
    redraws: usize,
    invalidate: Option<Invalidate>,
}

impl<T: PartialEq> OverlaySlot<T> {
    pub fn new() -> Self {
        Self {
            value: None,
            redraws: 0,
            invalidate: None,
        }
    }

    pub fn with_invalidate(mut self, invalidate: Invalidate) -> Self {
        self.invalidate = Some(invalidate);
        self
    }

    /// Replaces the contents; redraws only if they differ from the current ones.
    pub fn set(&mut self, value: T) {
        if self.value.as_ref() == Some(&value) {
            return;
        }
        self.value = Some(value);
        self.request_redraw();
    }

    /// Empties the slot; a no-op when already empty.
    pub fn clear(&mut self) {
        if self.value.take().is_some() {
            self.request_redraw();
        }
    }

    pub fn get(&self) -> Option<&T> {
        self.value.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.value.is_none()
    }

    /// Number of redraws this slot has requested.
    pub fn redraw_count(&self) -> usize {
        self.redraws
    }

    fn request_redraw(&mut self) {
        self.redraws += 1;
        if let Some(invalidate) = &self.invalidate {
            invalidate();
        }
    }
}

impl<T: PartialEq> Default for OverlaySlot<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for OverlaySlot<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlaySlot")
            .field("value", &self.value)
            .field("redraws", &self.redraws)
            .finish()
    }
}
