//! End-time latch for the auto-stop feature.
//!
//! Holds an optional playback position past which the controller pauses
//! playback. The latch is position-based, not wall-clock based: the tick loop
//! asks it whether the current position has reached the cap.

/// Pending auto-stop position (None if no cap is armed).
#[derive(Debug, Clone, Default)]
pub struct StopAt {
    end_time: Option<f64>,
}

impl StopAt {
    /// Creates a new inactive latch.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms the latch at `end_time`, or disarms it when `None`.
    pub fn set(&mut self, end_time: Option<f64>) {
        self.end_time = end_time.filter(|t| t.is_finite() && *t >= 0.0);
    }

    /// Disarms the latch.
    pub fn clear(&mut self) {
        self.end_time = None;
    }

    /// Returns the armed position, if any.
    pub fn end_time(&self) -> Option<f64> {
        self.end_time
    }

    /// Returns true if a cap is armed.
    pub fn is_active(&self) -> bool {
        self.end_time.is_some()
    }

    /// Returns true if playback at `position` has reached the armed cap.
    pub fn should_stop(&self, position: f64) -> bool {
        self.end_time.map(|end| position >= end).unwrap_or(false)
    }

    /// Disarms the latch if a seek to `position` jumped past the cap; an
    /// auto-stop that has already been passed must not fire later. Returns
    /// true if the latch was cleared.
    pub fn clear_if_passed(&mut self, position: f64) -> bool {
        match self.end_time {
            Some(end) if position > end => {
                self.end_time = None;
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latch_creation() {
        let latch = StopAt::new();
        assert!(!latch.is_active());
        assert_eq!(latch.end_time(), None);
        assert!(!latch.should_stop(1000.0));
    }

    #[test]
    fn test_latch_set_and_stop() {
        let mut latch = StopAt::new();
        latch.set(Some(30.0));
        assert!(latch.is_active());
        assert!(!latch.should_stop(29.9));
        assert!(latch.should_stop(30.0));
        assert!(latch.should_stop(31.0));
    }

    #[test]
    fn test_latch_set_none_disarms() {
        let mut latch = StopAt::new();
        latch.set(Some(30.0));
        latch.set(None);
        assert!(!latch.is_active());
    }

    #[test]
    fn test_latch_rejects_invalid_values() {
        let mut latch = StopAt::new();
        latch.set(Some(-1.0));
        assert!(!latch.is_active());
        latch.set(Some(f64::NAN));
        assert!(!latch.is_active());
    }

    #[test]
    fn test_clear_if_passed() {
        let mut latch = StopAt::new();
        latch.set(Some(30.0));

        // Seeking before the cap keeps it armed.
        assert!(!latch.clear_if_passed(10.0));
        assert!(latch.is_active());

        // Seeking past the cap disarms it.
        assert!(latch.clear_if_passed(45.0));
        assert!(!latch.is_active());
    }
}
