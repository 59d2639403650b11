/*!
    The style transform boundary.
*/

use media_types::VideoFrame;

use crate::TransformError;

/**
    A per-frame image transform, typically a style-transfer model.

    The pipeline treats implementations as pure functions: it never relies
    on side effects, and the frame it passes in stays untouched so it can be
    used as a fallback when `apply` fails. The returned frame may have any
    size; the render step scales it back to the output geometry. Its
    timestamp and orientation are ignored, the pipeline keeps the input's.

    Calls may be slow (several frame intervals). The pipeline imposes no
    timeout, a hung transform stalls the lane that called it.

    Any `FnMut(&VideoFrame) -> Result<VideoFrame, TransformError> + Send`
    closure implements this trait.
*/
pub trait StyleTransform: Send {
    fn apply(&mut self, frame: &VideoFrame) -> Result<VideoFrame, TransformError>;
}

impl<F> StyleTransform for F
where
    F: FnMut(&VideoFrame) -> Result<VideoFrame, TransformError> + Send,
{
    fn apply(&mut self, frame: &VideoFrame) -> Result<VideoFrame, TransformError> {
        self(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{PixelFormat, Pts, Rational};

    fn frame() -> VideoFrame {
        VideoFrame::new(
            vec![10; 4 * 4],
            2,
            2,
            PixelFormat::Bgra,
            Pts(0),
            Rational::new(1, 30),
        )
    }

    #[test]
    fn closures_are_transforms() {
        let mut calls = 0;
        let mut t = |f: &VideoFrame| {
            calls += 1;
            let mut out = f.clone();
            out.data.iter_mut().for_each(|b| *b += 1);
            Ok::<_, TransformError>(out)
        };
        let out = t.apply(&frame()).unwrap();
        assert_eq!(out.data[0], 11);
        drop(t);
        assert_eq!(calls, 1);
    }

    #[test]
    fn boxed_transforms_forward() {
        let mut boxed: Box<dyn StyleTransform> =
            Box::new(|_: &VideoFrame| -> Result<VideoFrame, TransformError> {
                Err(TransformError::failed("model not loaded"))
            });
        let err = boxed.apply(&frame()).unwrap_err();
        assert_eq!(err.to_string(), "transform failed: model not loaded");
    }
}
