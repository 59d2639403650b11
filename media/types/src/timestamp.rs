/*!
    Timestamp types for media timing.
*/

use std::time::Duration;

use crate::Rational;

/**
    Presentation timestamp in time_base units.

    This is the raw timestamp value from the media stream. To convert to
    a meaningful duration, you need the stream's time base.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Pts(pub i64);

impl Pts {
    pub const ZERO: Pts = Pts(0);

    /**
        Convert this PTS to a Duration using the given time base.

        Negative PTS values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        let seconds = self.0 as f64 * time_base.to_f64();
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /**
        Create a PTS from a Duration using the given time base.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        let seconds = duration.as_secs_f64();
        let pts = (seconds / time_base.to_f64()).round() as i64;
        Self(pts)
    }

    /**
        Shift this timestamp so that `origin` reads as zero.

        Both values are interpreted in `time_base`. Returns `None` if this
        timestamp lies before the origin.
    */
    #[inline]
    pub fn rebase(self, origin: Duration, time_base: Rational) -> Option<Self> {
        let origin_ticks = Self::from_duration(origin, time_base).0;
        let shifted = self.0.checked_sub(origin_ticks)?;
        (shifted >= 0).then_some(Self(shifted))
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<Pts> for i64 {
    fn from(pts: Pts) -> Self {
        pts.0
    }
}

/**
    Duration in time_base units.

    Similar to Pts but semantically represents a duration rather than a point in time.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    /**
        Convert this duration to a std Duration using the given time base.

        Negative values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        if self.0 <= 0 {
            return Duration::ZERO;
        }
        let seconds = self.0 as f64 * time_base.to_f64();
        Duration::from_secs_f64(seconds.max(0.0))
    }

    /**
        Create a MediaDuration from a std Duration using the given time base.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        let seconds = duration.as_secs_f64();
        let ticks = (seconds / time_base.to_f64()).round() as i64;
        Self(ticks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TB_1_1000: Rational = Rational { num: 1, den: 1000 };
    const TB_1_600: Rational = Rational { num: 1, den: 600 };

    #[test]
    fn pts_to_duration_quicktime() {
        // 600 ticks at 1/600 = 1 second
        assert_eq!(Pts(600).to_duration(TB_1_600), Duration::from_secs(1));
    }

    #[test]
    fn pts_negative_clamps_to_zero() {
        assert_eq!(Pts(-100).to_duration(TB_1_1000), Duration::ZERO);
    }

    #[test]
    fn pts_from_duration() {
        let pts = Pts::from_duration(Duration::from_millis(1500), TB_1_1000);
        assert_eq!(pts, Pts(1500));
    }

    #[test]
    fn rebase_subtracts_origin() {
        let origin = Duration::from_millis(2000);
        assert_eq!(Pts(2000).rebase(origin, TB_1_1000), Some(Pts(0)));
        assert_eq!(Pts(2033).rebase(origin, TB_1_1000), Some(Pts(33)));
    }

    #[test]
    fn rebase_before_origin_is_none() {
        let origin = Duration::from_millis(2000);
        assert_eq!(Pts(1999).rebase(origin, TB_1_1000), None);
    }

    #[test]
    fn rebase_across_time_bases() {
        // Origin established from a 1/1000 video clock, applied to 1/600 audio
        let origin = Pts(1000).to_duration(TB_1_1000);
        assert_eq!(Pts(900).rebase(origin, TB_1_600), Some(Pts(300)));
    }

    #[test]
    fn media_duration_round_trip() {
        let md = MediaDuration::from_duration(Duration::from_secs(2), TB_1_600);
        assert_eq!(md, MediaDuration(1200));
        assert_eq!(md.to_duration(TB_1_600), Duration::from_secs(2));
    }
}
