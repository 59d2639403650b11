/*!
    Frame orientation, rendering and the style transform boundary.

    This crate holds every per-frame operation the video lane performs
    between decoding and muxing:

    - **Orientation**: decide from the track's display transform whether
      pixels must be rotated before the style transform sees them, and what
      transform to stamp on the output track.
    - **Style transform**: the [`StyleTransform`] trait is the boundary to
      the external model. The pipeline only relies on it being a function
      from one frame to another.
    - **Rendering**: copy a transformed frame into a writable output buffer,
      scaling it back to the output geometry and swapping channel order
      when needed.

    # Example

    ```ignore
    use media_transform::{OrientationPlan, RotationPolicy, StyleTransform, render};

    let plan = OrientationPlan::resolve(&asset.video, RotationPolicy::BakeAll);
    let upright = plan.normalize(frame)?;
    let styled = model.apply(&upright).unwrap_or(upright);
    render(&styled, plan.output_geometry(PixelFormat::Bgra), &mut buffer)?;
    ```

    # Transform Failures

    A failing [`StyleTransform`] never aborts processing: callers substitute
    the untransformed frame. The error type exists so that failures can be
    counted and logged.
*/

pub use media_types::{DisplayTransform, Geometry, PixelFormat, Rotation, VideoFrame};

mod error;
mod filters;
mod orientation;
mod render;
mod style;

pub use error::TransformError;
pub use filters::PixelFilter;
pub use orientation::{OrientationPlan, RotationPolicy, rotate};
pub use render::{render, resize};
pub use style::StyleTransform;
