/*!
    Rational numbers for time bases and frame rates.
*/

use std::fmt;
use std::time::Duration;

/**
    A rational number represented as a numerator and denominator.

    Time bases (e.g. 1/600 for QuickTime, 1/90000 for MPEG-TS) and
    nominal frame rates (e.g. 30000/1001) are both expressed with this type.
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /**
        Create a new rational number.

        # Panics

        Panics if `den` is zero.
    */
    #[inline]
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "denominator cannot be zero");
        Self { num, den }
    }

    /**
        Convert to f64.
    */
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /**
        Returns true if the numerator is zero or the value is negative.
    */
    #[inline]
    pub fn is_non_positive(self) -> bool {
        self.to_f64() <= 0.0
    }

    /**
        Interpret this rational as a frame rate and return the interval
        between two consecutive frames.

        Returns `None` for a zero or negative rate.
    */
    pub fn frame_interval(self) -> Option<Duration> {
        if self.is_non_positive() {
            return None;
        }
        Some(Duration::from_secs_f64(1.0 / self.to_f64()))
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num, den)
    }
}

impl From<i32> for Rational {
    fn from(num: i32) -> Self {
        Self::new(num, 1)
    }
}
