/*!
    The per-frame video stage shared by offline and live processing.
*/

use tracing::warn;

use media_transform::{OrientationPlan, StyleTransform, render};
use media_types::{Error, Geometry, PixelFormat, Pts, Result, VideoFrame};

use crate::pool::{BufferPool, PooledBuffer};

/// Pixel layout of every buffer handed to a sink
pub const OUTPUT_FORMAT: PixelFormat = PixelFormat::Bgra;

/**
    Normalizes orientation, runs the style transform and renders the
    result into pooled output buffers.
*/
pub struct VideoStage {
    plan: OrientationPlan,
    geometry: Geometry,
    transform: Box<dyn StyleTransform>,
    pool: BufferPool,
    transform_failures: u64,
}

/**
    A frame after orientation and style transfer, before rendering.
*/
#[derive(Debug)]
pub struct StyledFrame {
    /// Timestamp of the decoded frame, untouched by the transform.
    pub pts: Pts,
    /// Upright frame as it went into the transform.
    pub upright: VideoFrame,
    /// Transform output, or the upright frame if the transform failed.
    pub styled: Option<VideoFrame>,
}

impl StyledFrame {
    /**
        The frame to show or write: the transform output when there is one.
    */
    pub fn output(&self) -> &VideoFrame {
        self.styled.as_ref().unwrap_or(&self.upright)
    }
}

impl VideoStage {
    pub fn new(plan: OrientationPlan, transform: Box<dyn StyleTransform>, pool: BufferPool) -> Self {
        Self {
            geometry: plan.output_geometry(OUTPUT_FORMAT),
            plan,
            transform,
            pool,
            transform_failures: 0,
        }
    }

    pub fn geometry(&self) -> Geometry {
        self.geometry
    }

    pub fn transform_failures(&self) -> u64 {
        self.transform_failures
    }

    /**
        Rotate `frame` upright if the plan asks for it and run the
        transform. A failing transform is logged and counted, and the
        upright frame is used in its place.

        Fails only for frames whose pixel data does not match their size.
    */
    pub fn stylize(&mut self, frame: VideoFrame) -> Result<StyledFrame> {
        let pts = frame.pts;
        let upright = self
            .plan
            .normalize(frame)
            .map_err(|e| Error::invalid_data(format!("frame at pts {}: {e}", pts.0)))?;
        let styled = match self.transform.apply(&upright) {
            Ok(mut styled) => {
                styled.pts = upright.pts;
                styled.time_base = upright.time_base;
                styled.orientation = upright.orientation;
                Some(styled)
            }
            Err(e) => {
                self.transform_failures += 1;
                warn!(pts = pts.0, error = %e, "transform failed, passing frame through");
                None
            }
        };
        Ok(StyledFrame {
            pts,
            upright,
            styled,
        })
    }

    /**
        Render a styled frame into a buffer from the pool, blocking while
        the pool is exhausted.

        Transform output that cannot be rendered (an unrelated pixel format,
        say) falls back to the upright frame.
    */
    pub fn render(&mut self, frame: &StyledFrame) -> Result<PooledBuffer> {
        let mut buffer = self.pool.acquire(self.geometry)?;
        if let Some(styled) = &frame.styled {
            match render(styled, &self.geometry, buffer.data_mut()) {
                Ok(()) => return Ok(buffer),
                Err(e) => {
                    self.transform_failures += 1;
                    warn!(pts = frame.pts.0, error = %e, "transform output unusable, passing frame through");
                }
            }
        }
        render(&frame.upright, &self.geometry, buffer.data_mut())
            .map_err(|e| Error::invalid_data(format!("frame at pts {}: {e}", frame.pts.0)))?;
        Ok(buffer)
    }
}
