//! Trim window phases

use crate::session::config::FrameRange;
use std::fmt;

/// Where a session stands relative to its trim window.
///
/// `Disabled -> Armed -> Active -> Drained`. `Drained` is terminal until the
/// session is initialized again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TrimPhase {
    /// No frame range configured.
    #[default]
    Disabled,
    /// Tracking objects, waiting for the start frame.
    Armed,
    /// Inside the window: calls are recorded and mark what they touch.
    Active,
    /// Window closed and emitted.
    Drained,
}

impl TrimPhase {
    /// Phase a freshly initialized session starts in.
    pub fn initial(frames: Option<FrameRange>) -> Self {
        match frames {
            None => TrimPhase::Disabled,
            Some(range) if range.start == 0 => TrimPhase::Active,
            Some(_) => TrimPhase::Armed,
        }
    }

    /// Phase after the frame counter reaches `frame`. Moves at most one step.
    pub fn next(self, frames: Option<FrameRange>, frame: u64) -> Self {
        let Some(range) = frames else {
            return TrimPhase::Disabled;
        };
        match self {
            TrimPhase::Armed if frame >= range.start => TrimPhase::Active,
            TrimPhase::Active if frame >= range.end => TrimPhase::Drained,
            phase => phase,
        }
    }

    /// Object lifetimes are being followed.
    pub fn is_tracking(self) -> bool {
        matches!(self, TrimPhase::Armed | TrimPhase::Active)
    }

    /// Packets are buffered for the trimmed stream.
    pub fn is_recording(self) -> bool {
        self == TrimPhase::Active
    }

    pub fn is_drained(self) -> bool {
        self == TrimPhase::Drained
    }

    pub fn name(self) -> &'static str {
        match self {
            TrimPhase::Disabled => "disabled",
            TrimPhase::Armed => "armed",
            TrimPhase::Active => "active",
            TrimPhase::Drained => "drained",
        }
    }
}

impl fmt::Display for TrimPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_phase_follows_the_range() {
        assert_eq!(TrimPhase::initial(None), TrimPhase::Disabled);
        assert_eq!(TrimPhase::initial(Some(FrameRange::new(0, 3))), TrimPhase::Active);
        assert_eq!(TrimPhase::initial(Some(FrameRange::new(2, 3))), TrimPhase::Armed);
    }

    #[test]
    fn phases_advance_one_step_at_a_time() {
        let range = Some(FrameRange::new(2, 4));
        let mut phase = TrimPhase::initial(range);
        let mut seen = Vec::new();
        for frame in 1..=5 {
            phase = phase.next(range, frame);
            seen.push(phase);
        }
        assert_eq!(seen, vec![
            TrimPhase::Armed,
            TrimPhase::Active,
            TrimPhase::Active,
            TrimPhase::Drained,
            TrimPhase::Drained,
        ]);
    }

    #[test]
    fn queries_are_pure() {
        assert!(TrimPhase::Armed.is_tracking());
        assert!(!TrimPhase::Armed.is_recording());
        assert!(TrimPhase::Active.is_tracking() && TrimPhase::Active.is_recording());
        assert!(!TrimPhase::Drained.is_tracking());
        assert_eq!(TrimPhase::Drained.to_string(), "drained");
    }
}
