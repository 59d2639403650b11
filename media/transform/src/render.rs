/*!
    Rendering transformed frames into output buffers.
*/

use media_types::{Geometry, VideoFrame};

use crate::TransformError;

/**
    Copy `frame` into `dst`, laid out as `target`.

    The frame is scaled with nearest-neighbour sampling when its size
    differs from the target, and red/blue are swapped when the formats are
    a swizzle pair (BGRA and RGBA, for example). Any other format mismatch
    is an error.
*/
pub fn render(frame: &VideoFrame, target: &Geometry, dst: &mut [u8]) -> Result<(), TransformError> {
    let expected = frame.geometry().byte_len();
    if frame.data.len() != expected {
        return Err(TransformError::MalformedFrame {
            expected,
            actual: frame.data.len(),
        });
    }
    if dst.len() != target.byte_len() {
        return Err(TransformError::BufferSize {
            expected: target.byte_len(),
            actual: dst.len(),
        });
    }

    let swap = if frame.format == target.format {
        false
    } else if frame.format.is_swizzle_of(target.format) {
        true
    } else {
        return Err(TransformError::IncompatibleFormat {
            from: frame.format,
            to: target.format,
        });
    };

    if target.is_empty() {
        return Ok(());
    }
    if frame.width == 0 || frame.height == 0 {
        dst.fill(0);
        return Ok(());
    }

    // Same size and layout, plain copy
    if !swap && frame.width == target.width && frame.height == target.height {
        dst.copy_from_slice(&frame.data);
        return Ok(());
    }

    let bpp = target.format.bytes_per_pixel();
    let (src_w, src_h) = (frame.width as usize, frame.height as usize);
    let (dst_w, dst_h) = (target.width as usize, target.height as usize);

    for (y, row) in dst.chunks_exact_mut(target.stride()).enumerate() {
        let src_y = y * src_h / dst_h;
        let src_row = &frame.data[src_y * src_w * bpp..(src_y + 1) * src_w * bpp];
        for (x, px) in row.chunks_exact_mut(bpp).enumerate() {
            let src_x = x * src_w / dst_w;
            px.copy_from_slice(&src_row[src_x * bpp..(src_x + 1) * bpp]);
            if swap {
                px.swap(0, 2);
            }
        }
    }

    Ok(())
}

/**
    Scale a frame to `width` x `height`, keeping its format and timing.
*/
pub fn resize(frame: &VideoFrame, width: u32, height: u32) -> Result<VideoFrame, TransformError> {
    let target = Geometry::new(width, height, frame.format);
    let mut data = vec![0u8; target.byte_len()];
    render(frame, &target, &mut data)?;
    Ok(VideoFrame {
        data,
        width,
        height,
        ..frame.clone()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use media_types::{PixelFormat, Pts, Rational};

    const TB: Rational = Rational { num: 1, den: 30 };

    fn checker() -> VideoFrame {
        // 2x2: black, white / white, black
        let data = [0u8, 255, 255, 0]
            .iter()
            .flat_map(|&v| [v, v, v, 255])
            .collect();
        VideoFrame::new(data, 2, 2, PixelFormat::Bgra, Pts(7), TB)
    }

    #[test]
    fn same_geometry_copies() {
        let frame = checker();
        let mut dst = vec![0u8; frame.data.len()];
        render(&frame, &frame.geometry(), &mut dst).unwrap();
        assert_eq!(dst, frame.data);
    }

    #[test]
    fn upscale_nearest_neighbour() {
        let frame = checker();
        let target = Geometry::new(4, 4, PixelFormat::Bgra);
        let mut dst = vec![0u8; target.byte_len()];
        render(&frame, &target, &mut dst).unwrap();
        let lum: Vec<u8> = dst.chunks(4).map(|p| p[0]).collect();
        assert_eq!(
            lum,
            vec![
                0, 0, 255, 255, //
                0, 0, 255, 255, //
                255, 255, 0, 0, //
                255, 255, 0, 0,
            ]
        );
    }

    #[test]
    fn swizzle_swaps_red_and_blue() {
        let frame = VideoFrame::new(vec![1, 2, 3, 4], 1, 1, PixelFormat::Bgra, Pts(0), TB);
        let target = Geometry::new(1, 1, PixelFormat::Rgba);
        let mut dst = vec![0u8; 4];
        render(&frame, &target, &mut dst).unwrap();
        assert_eq!(dst, vec![3, 2, 1, 4]);
    }

    #[test]
    fn incompatible_formats_fail() {
        let frame = checker();
        let target = Geometry::new(2, 2, PixelFormat::Rgb24);
        let mut dst = vec![0u8; target.byte_len()];
        let err = render(&frame, &target, &mut dst).unwrap_err();
        assert!(matches!(err, TransformError::IncompatibleFormat { .. }));
    }

    #[test]
    fn wrong_buffer_size_fails() {
        let frame = checker();
        let mut dst = vec![0u8; 3];
        let err = render(&frame, &frame.geometry(), &mut dst).unwrap_err();
        assert!(matches!(err, TransformError::BufferSize { expected: 16, actual: 3 }));
    }

    #[test]
    fn malformed_frame_fails() {
        let mut frame = checker();
        frame.data.truncate(5);
        let mut dst = vec![0u8; 16];
        let err = render(&frame, &Geometry::new(2, 2, PixelFormat::Bgra), &mut dst).unwrap_err();
        assert!(matches!(err, TransformError::MalformedFrame { .. }));
    }

    #[test]
    fn resize_keeps_timing() {
        let out = resize(&checker(), 1, 1).unwrap();
        assert_eq!((out.width, out.height), (1, 1));
        assert_eq!(out.pts, Pts(7));
        assert_eq!(out.data, vec![0, 0, 0, 255]);
    }
}
