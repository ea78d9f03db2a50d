//! Scroll position policy for the receive view.
//!
//! The viewer reports two kinds of movement: any position change (which
//! includes our own programmatic scrolls) and explicit user drags. Only the
//! latter is treated as the position the user wants to keep.

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ScrollState {
    current: usize,
    user_target: usize,
    maximum: usize,
    follow_tail: bool,
}

impl ScrollState {
    pub fn new(follow_tail: bool) -> Self {
        Self {
            follow_tail,
            ..Self::default()
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn user_target(&self) -> usize {
        self.user_target
    }

    pub fn maximum(&self) -> usize {
        self.maximum
    }

    pub fn follow_tail(&self) -> bool {
        self.follow_tail
    }

    pub fn set_follow_tail(&mut self, follow: bool) {
        self.follow_tail = follow;
    }

    /// Any position change, programmatic or not
    pub fn on_value_changed(&mut self, value: usize) {
        self.current = value.min(self.maximum);
    }

    /// The user dragged the slider
    pub fn on_slider_moved(&mut self, value: usize) {
        self.user_target = value.min(self.maximum);
        self.current = self.user_target;
    }

    /// The scrollable range changed (content grew or was cleared).
    ///
    /// Returns the position the view must be moved to.
    pub fn on_range_changed(&mut self, maximum: usize) -> usize {
        self.maximum = maximum;
        self.user_target = self.user_target.min(maximum);
        if self.follow_tail {
            self.current = maximum;
            self.user_target = maximum;
        } else {
            self.current = self.current.min(maximum);
        }
        self.current
    }

    /// New data arrived. Returns the position the view must be moved to.
    pub fn on_data_arrival(&mut self) -> usize {
        if self.follow_tail {
            self.user_target = self.maximum;
        }
        self.current = self.user_target;
        self.current
    }

    pub fn reset(&mut self) {
        self.current = 0;
        self.user_target = 0;
        self.maximum = 0;
    }
}
