/*!
    Progress tracking for the offline pipeline.
*/

/**
    Frames processed against the estimated total.

    The estimate comes from the asset's duration and frame rate, so a source
    may deliver more frames than expected; the reported fraction is clamped
    to `[0, 1]` and never decreases.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ProgressState {
    frames: u64,
    total: u64,
    last: f64,
}

impl ProgressState {
    pub fn new(total: u64) -> Self {
        Self {
            frames: 0,
            total,
            last: 0.0,
        }
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /**
        Count one more processed frame and return the new fraction.
    */
    pub fn advance(&mut self) -> f64 {
        self.frames += 1;
        let fraction = if self.total == 0 {
            0.0
        } else {
            (self.frames as f64 / self.total as f64).clamp(0.0, 1.0)
        };
        self.last = self.last.max(fraction);
        self.last
    }

    pub fn fraction(&self) -> f64 {
        self.last
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fraction_tracks_frames() {
        let mut progress = ProgressState::new(4);
        assert_eq!(progress.advance(), 0.25);
        assert_eq!(progress.advance(), 0.5);
        assert_eq!(progress.frames(), 2);
        assert_eq!(progress.fraction(), 0.5);
    }

    #[test]
    fn overshoot_is_clamped() {
        let mut progress = ProgressState::new(2);
        for _ in 0..5 {
            let fraction = progress.advance();
            assert!((0.0..=1.0).contains(&fraction));
        }
        assert_eq!(progress.fraction(), 1.0);
    }

    #[test]
    fn unknown_total_reports_zero() {
        let mut progress = ProgressState::new(0);
        assert_eq!(progress.advance(), 0.0);
        assert_eq!(progress.frames(), 1);
    }
}
