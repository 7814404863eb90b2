//! Presented-frame counter

/// Counts presented frames since the session was initialized.
#[derive(Debug)]
pub struct FrameCounter {
    frame: u64,
}

impl FrameCounter {
    pub fn new() -> Self {
        Self { frame: 0 }
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    /// Count one presented frame and return the new frame number.
    pub fn advance(&mut self) -> u64 {
        self.frame = self.frame.saturating_add(1);
        self.frame
    }

    pub fn reset(&mut self) {
        self.frame = 0;
    }
}

impl Default for FrameCounter {
    fn default() -> Self {
        Self::new()
    }
}
