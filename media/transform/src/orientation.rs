/*!
    Orientation resolution.

    Decides, once per asset, whether frames are rotated before they reach
    the style transform ("baked in") or passed through with the source's
    display transform carried over to the output track.
*/

use serde::{Deserialize, Serialize};

use media_types::{DisplayTransform, Geometry, PixelFormat, Rotation, VideoFrame, VideoTrackInfo};

use crate::error::TransformError;

/**
    Which source rotations are baked into the output pixels.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RotationPolicy {
    /**
        Rotate pixels for every non-zero quarter turn and stamp an identity
        transform on the output. Output always displays upright, and the
        style transform always sees upright content.
    */
    #[default]
    BakeAll,
    /**
        Only bake a 90 degree rotation; every other angle passes through
        unrotated and keeps the source's display transform.
    */
    QuarterTurnOnly,
}

/**
    The orientation decision for one asset.
*/
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct OrientationPlan {
    /// Rotation encoded in the source's display transform.
    pub source_rotation: Rotation,
    /// Whether frames are rotated before the transform stage.
    pub rotate_frames: bool,
    /// Output track width in pixels.
    pub output_width: u32,
    /// Output track height in pixels.
    pub output_height: u32,
    /// Display transform to stamp on the output track.
    pub output_transform: DisplayTransform,
}

impl OrientationPlan {
    /**
        Resolve the plan for a video track.
    */
    pub fn resolve(video: &VideoTrackInfo, policy: RotationPolicy) -> Self {
        let source_rotation = video.rotation();
        let rotate_frames = match (policy, source_rotation) {
            (_, Rotation::Deg0) => false,
            (RotationPolicy::BakeAll, _) => true,
            (RotationPolicy::QuarterTurnOnly, rotation) => rotation == Rotation::Deg90,
        };

        let (output_width, output_height) = if rotate_frames && source_rotation.swaps_dimensions()
        {
            (video.height, video.width)
        } else {
            (video.width, video.height)
        };

        let output_transform = if rotate_frames {
            DisplayTransform::IDENTITY
        } else {
            video.transform
        };

        Self {
            source_rotation,
            rotate_frames,
            output_width,
            output_height,
            output_transform,
        }
    }

    /**
        Geometry of the output track's buffers.
    */
    pub fn output_geometry(&self, format: PixelFormat) -> Geometry {
        Geometry::new(self.output_width, self.output_height, format)
    }

    /**
        Bring a decoded frame into the orientation the transform stage and
        output track expect.

        Fails if the frame's pixel data does not match its geometry.
    */
    pub fn normalize(&self, frame: VideoFrame) -> Result<VideoFrame, TransformError> {
        if !self.rotate_frames {
            return Ok(frame.with_orientation(self.source_rotation));
        }
        Ok(rotate(frame, self.source_rotation)?.with_orientation(Rotation::Deg0))
    }
}

/**
    Rotate a packed frame clockwise by a quarter-turn multiple.

    The returned frame is tagged upright relative to the input's tag.
*/
pub fn rotate(frame: VideoFrame, rotation: Rotation) -> Result<VideoFrame, TransformError> {
    if !frame.is_well_formed() {
        return Err(TransformError::MalformedFrame {
            expected: frame.geometry().byte_len(),
            actual: frame.data.len(),
        });
    }
    if rotation == Rotation::Deg0 {
        return Ok(frame);
    }

    let bpp = frame.format.bytes_per_pixel();
    let (w, h) = (frame.width as usize, frame.height as usize);
    let (out_w, out_h) = if rotation.swaps_dimensions() {
        (h, w)
    } else {
        (w, h)
    };

    let mut data = vec![0u8; frame.data.len()];
    for y in 0..out_h {
        for x in 0..out_w {
            let (src_x, src_y) = match rotation {
                Rotation::Deg90 => (y, h - 1 - x),
                Rotation::Deg180 => (w - 1 - x, h - 1 - y),
                Rotation::Deg270 => (w - 1 - y, x),
                Rotation::Deg0 => (x, y),
            };
            let src = (src_y * w + src_x) * bpp;
            let dst = (y * out_w + x) * bpp;
            data[dst..dst + bpp].copy_from_slice(&frame.data[src..src + bpp]);
        }
    }

    let remaining = Rotation::from_degrees(
        frame.orientation.degrees() as f64 - rotation.degrees() as f64,
    );

    Ok(VideoFrame {
        data,
        width: out_w as u32,
        height: out_h as u32,
        ..frame
    }
    .with_orientation(remaining))
}
