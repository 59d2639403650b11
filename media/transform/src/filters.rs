/*!
    Simple built-in pixel filters.

    These stand in for a real style model when none is available, and make
    it easy to see at a glance that frames went through the transform.
*/

use std::{fmt, str::FromStr};

use media_types::{PixelFormat, VideoFrame};

use crate::{StyleTransform, TransformError};

/**
    A stateless per-pixel filter.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PixelFilter {
    /// Returns frames unchanged
    #[default]
    Identity,
    /// Rec. 601 luma
    Grayscale,
    /// Inverts every colour channel, leaving alpha alone
    Invert,
    /// Quantizes every colour channel to the given number of levels
    Posterize { levels: u8 },
}

impl PixelFilter {
    fn map_pixel(self, px: &mut [u8], red: usize, blue: usize) {
        match self {
            Self::Identity => {}
            Self::Grayscale => {
                let (r, g, b) = (px[red] as u32, px[1] as u32, px[blue] as u32);
                let y = ((r * 299 + g * 587 + b * 114 + 500) / 1000) as u8;
                px[0] = y;
                px[1] = y;
                px[2] = y;
            }
            Self::Invert => {
                for c in &mut px[..3] {
                    *c = 255 - *c;
                }
            }
            Self::Posterize { levels } => {
                let levels = levels.max(2) as u32;
                let step = 255 / (levels - 1);
                for c in &mut px[..3] {
                    let bucket = (*c as u32 * (levels - 1) + 127) / 255;
                    *c = (bucket * step).min(255) as u8;
                }
            }
        }
    }
}

impl StyleTransform for PixelFilter {
    fn apply(&mut self, frame: &VideoFrame) -> Result<VideoFrame, TransformError> {
        if !frame.is_well_formed() {
            return Err(TransformError::MalformedFrame {
                expected: frame.geometry().byte_len(),
                actual: frame.data.len(),
            });
        }

        let mut out = frame.clone();
        if *self == Self::Identity {
            return Ok(out);
        }

        let (red, blue) = match frame.format {
            PixelFormat::Rgba | PixelFormat::Rgb24 => (0, 2),
            _ => (2, 0),
        };
        let bpp = frame.format.bytes_per_pixel();
        for px in out.data.chunks_exact_mut(bpp) {
            self.map_pixel(px, red, blue);
        }
        Ok(out)
    }
}

impl fmt::Display for PixelFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identity => write!(f, "identity"),
            Self::Grayscale => write!(f, "grayscale"),
            Self::Invert => write!(f, "invert"),
            Self::Posterize { levels } => write!(f, "posterize:{levels}"),
        }
    }
}

impl FromStr for PixelFilter {
    type Err = TransformError;

    /**
        Parses `identity`, `grayscale`, `invert`, `posterize` or
        `posterize:<levels>`.
    */
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, arg) = match s.split_once(':') {
            Some((name, arg)) => (name, Some(arg)),
            None => (s, None),
        };
        match (name.trim().to_ascii_lowercase().as_str(), arg) {
            ("identity" | "none", None) => Ok(Self::Identity),
            ("grayscale" | "greyscale", None) => Ok(Self::Grayscale),
            ("invert", None) => Ok(Self::Invert),
            ("posterize", None) => Ok(Self::Posterize { levels: 4 }),
            ("posterize", Some(arg)) => match arg.trim().parse::<u8>() {
                Ok(levels) if levels >= 2 => Ok(Self::Posterize { levels }),
                _ => Err(TransformError::failed(format!(
                    "invalid posterize level count '{arg}'"
                ))),
            },
            _ => Err(TransformError::failed(format!("unknown filter '{s}'"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{Pts, Rational};

    fn pixel(bgra: [u8; 4]) -> VideoFrame {
        VideoFrame::new(bgra.to_vec(), 1, 1, PixelFormat::Bgra, Pts(3), Rational::new(1, 30))
    }

    #[test]
    fn identity_is_a_copy() {
        let frame = pixel([1, 2, 3, 4]);
        let out = PixelFilter::Identity.apply(&frame).unwrap();
        assert_eq!(out.data, frame.data);
        assert_eq!(out.pts, Pts(3));
    }

    #[test]
    fn invert_keeps_alpha() {
        let out = PixelFilter::Invert.apply(&pixel([0, 100, 255, 42])).unwrap();
        assert_eq!(out.data, vec![255, 155, 0, 42]);
    }

    #[test]
    fn grayscale_pure_red() {
        // BGRA red
        let out = PixelFilter::Grayscale.apply(&pixel([0, 0, 255, 255])).unwrap();
        assert_eq!(out.data, vec![76, 76, 76, 255]);
    }

    #[test]
    fn posterize_two_levels() {
        let mut filter = PixelFilter::Posterize { levels: 2 };
        let out = filter.apply(&pixel([10, 200, 127, 9])).unwrap();
        assert_eq!(out.data, vec![0, 255, 0, 9]);
    }

    #[test]
    fn malformed_frames_are_rejected() {
        let mut frame = pixel([0, 0, 0, 0]);
        frame.data.pop();
        assert!(PixelFilter::Invert.apply(&frame).is_err());
    }

    #[test]
    fn parse_names() {
        assert_eq!("grayscale".parse::<PixelFilter>().unwrap(), PixelFilter::Grayscale);
        assert_eq!("Invert".parse::<PixelFilter>().unwrap(), PixelFilter::Invert);
        assert_eq!(
            "posterize:6".parse::<PixelFilter>().unwrap(),
            PixelFilter::Posterize { levels: 6 }
        );
        assert!("posterize:1".parse::<PixelFilter>().is_err());
        assert!("sepia".parse::<PixelFilter>().is_err());
    }

    #[test]
    fn display_round_trips_through_parse() {
        let filter = PixelFilter::Posterize { levels: 3 };
        assert_eq!(filter.to_string().parse::<PixelFilter>().unwrap(), filter);
    }
}
