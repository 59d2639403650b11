/*!
    Decoded video frames and passthrough audio samples.
*/

use std::time::Duration;

use crate::{Geometry, MediaDuration, PixelFormat, Pts, Rational, Rotation};

/**
    A decoded or transformed video frame.

    Contains tightly packed pixel rows (no padding) in the format given by
    `format`. A frame is owned by exactly one pipeline stage at a time and
    is moved, never shared, from one stage to the next.
*/
#[derive(Clone, Debug)]
pub struct VideoFrame {
    /// Raw pixel data, `height` rows of `width * bytes_per_pixel` bytes.
    pub data: Vec<u8>,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel format of the data.
    pub format: PixelFormat,
    /// Presentation timestamp.
    pub pts: Pts,
    /// Time base for interpreting the PTS.
    pub time_base: Rational,
    /// Clockwise rotation still required to display the frame upright.
    pub orientation: Rotation,
}

impl VideoFrame {
    /**
        Create a new upright video frame.
    */
    pub fn new(
        data: Vec<u8>,
        width: u32,
        height: u32,
        format: PixelFormat,
        pts: Pts,
        time_base: Rational,
    ) -> Self {
        Self {
            data,
            width,
            height,
            format,
            pts,
            time_base,
            orientation: Rotation::Deg0,
        }
    }

    /**
        Create a frame filled with a single pixel value.

        `pixel` must be exactly `format.bytes_per_pixel()` bytes long.
    */
    pub fn filled(geometry: Geometry, pixel: &[u8], pts: Pts, time_base: Rational) -> Self {
        debug_assert_eq!(pixel.len(), geometry.format.bytes_per_pixel());
        let data = pixel.repeat(geometry.width as usize * geometry.height as usize);
        Self::new(
            data,
            geometry.width,
            geometry.height,
            geometry.format,
            pts,
            time_base,
        )
    }

    /**
        Set the orientation tag.
    */
    pub fn with_orientation(mut self, orientation: Rotation) -> Self {
        self.orientation = orientation;
        self
    }

    pub fn geometry(&self) -> Geometry {
        Geometry::new(self.width, self.height, self.format)
    }

    /**
        Returns true if the data length matches the frame geometry.
    */
    pub fn is_well_formed(&self) -> bool {
        self.data.len() == self.geometry().byte_len()
    }

    /**
        Returns the presentation time as a Duration.
    */
    pub fn presentation_time(&self) -> Duration {
        self.pts.to_duration(self.time_base)
    }
}

/**
    A chunk of audio copied through the pipeline untouched.

    The payload is whatever the source produced (usually an encoded
    packet); only the timestamp is ever rewritten, when the live pipeline
    rebases it onto the recording's origin.
*/
#[derive(Clone, Debug)]
pub struct AudioSample {
    /// Opaque payload.
    pub data: Vec<u8>,
    /// Presentation timestamp.
    pub pts: Pts,
    /// Duration of the audio carried by this sample.
    pub duration: MediaDuration,
    /// Time base for interpreting timestamps.
    pub time_base: Rational,
}

impl AudioSample {
    pub fn new(data: Vec<u8>, pts: Pts, duration: MediaDuration, time_base: Rational) -> Self {
        Self {
            data,
            pts,
            duration,
            time_base,
        }
    }

    /**
        Returns the presentation time as a Duration.
    */
    pub fn presentation_time(&self) -> Duration {
        self.pts.to_duration(self.time_base)
    }

    /**
        Returns the same sample stamped with a new timestamp.
    */
    pub fn restamped(mut self, pts: Pts) -> Self {
        self.pts = pts;
        self
    }
}

// Frames and samples move between lane threads
static_assertions::assert_impl_all!(VideoFrame: Send, Sync);
static_assertions::assert_impl_all!(AudioSample: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;

    const TB_1_1000: Rational = Rational { num: 1, den: 1000 };

    #[test]
    fn filled_frame_is_well_formed() {
        let geometry = Geometry::new(8, 4, PixelFormat::Bgra);
        let frame = VideoFrame::filled(geometry, &[1, 2, 3, 255], Pts(0), TB_1_1000);
        assert!(frame.is_well_formed());
        assert_eq!(&frame.data[..8], &[1, 2, 3, 255, 1, 2, 3, 255]);
        assert_eq!(frame.orientation, Rotation::Deg0);
    }

    #[test]
    fn truncated_frame_is_not_well_formed() {
        let mut frame = VideoFrame::new(vec![0; 10], 4, 4, PixelFormat::Rgb24, Pts(0), TB_1_1000);
        assert!(!frame.is_well_formed());
        frame.data.resize(4 * 4 * 3, 0);
        assert!(frame.is_well_formed());
    }

    #[test]
    fn frame_presentation_time() {
        let frame = VideoFrame::new(vec![], 0, 0, PixelFormat::Bgra, Pts(1500), TB_1_1000);
        assert_eq!(frame.presentation_time(), Duration::from_millis(1500));
    }

    #[test]
    fn restamp_keeps_payload() {
        let sample = AudioSample::new(vec![9, 9], Pts(500), MediaDuration(21), TB_1_1000);
        let moved = sample.restamped(Pts(0));
        assert_eq!(moved.pts, Pts(0));
        assert_eq!(moved.data, vec![9, 9]);
        assert_eq!(moved.duration, MediaDuration(21));
    }
}
