/*!
    Single-image processing.
*/

use std::path::Path;

use image::{DynamicImage, ImageDecoder, ImageError, ImageReader, RgbaImage};
use tracing::{debug, warn};

use media_transform::{StyleTransform, render};
use media_types::{Error, Geometry, PixelFormat, Pts, Rational, Result, VideoFrame};

/**
    Outcome of [`process_image`].
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StillReport {
    /// Width of the saved image, after orientation correction.
    pub width: u32,
    /// Height of the saved image, after orientation correction.
    pub height: u32,
    /// False if the transform failed and the image was saved unchanged.
    pub transformed: bool,
}

fn image_error(path: &Path, error: ImageError) -> Error {
    match error {
        ImageError::IoError(e) => Error::Io(e),
        ImageError::Unsupported(e) => {
            Error::unsupported_format(format!("{}: {e}", path.display()))
        }
        ImageError::Decoding(e) => Error::decode(format!("{}: {e}", path.display())),
        other => Error::invalid_data(format!("{}: {other}", path.display())),
    }
}

/**
    Load an image upright, honouring its EXIF orientation if it has one.
*/
pub fn load_upright(path: &Path) -> Result<RgbaImage> {
    let reader = ImageReader::open(path)?
        .with_guessed_format()
        .map_err(Error::Io)?;
    let mut decoder = reader.into_decoder().map_err(|e| image_error(path, e))?;
    let orientation = decoder.orientation().map_err(|e| image_error(path, e))?;
    let mut image = DynamicImage::from_decoder(decoder).map_err(|e| image_error(path, e))?;
    image.apply_orientation(orientation);
    debug!(path = %path.display(), ?orientation, "loaded image");
    Ok(image.into_rgba8())
}

/**
    Wrap an RGBA image as a single frame.
*/
pub fn frame_from_image(image: &RgbaImage) -> VideoFrame {
    VideoFrame::new(
        image.as_raw().clone(),
        image.width(),
        image.height(),
        PixelFormat::Rgba,
        Pts::ZERO,
        Rational::new(1, 1),
    )
}

/**
    Convert a frame to an RGBA image of `width` x `height`, scaling and
    swapping channels as needed.
*/
pub fn image_from_frame(frame: &VideoFrame, width: u32, height: u32) -> Result<RgbaImage> {
    let target = Geometry::new(width, height, PixelFormat::Rgba);
    let mut data = vec![0u8; target.byte_len()];
    render(frame, &target, &mut data).map_err(|e| Error::invalid_data(e.to_string()))?;
    RgbaImage::from_raw(width, height, data)
        .ok_or_else(|| Error::invalid_data("image buffer does not match its size"))
}

/**
    Save a frame as an image at its own size. The format follows the
    file extension.
*/
pub fn save_frame(frame: &VideoFrame, path: &Path) -> Result<()> {
    let image = image_from_frame(frame, frame.width, frame.height)?;
    image.save(path).map_err(|e| image_error(path, e))
}

/**
    Run `transform` over the image at `input` and save the result to
    `output` at the upright source size.

    A failing transform is logged and the upright image is saved as is.
*/
pub fn process_image(
    input: &Path,
    output: &Path,
    transform: &mut dyn StyleTransform,
) -> Result<StillReport> {
    let image = load_upright(input)?;
    let (width, height) = image.dimensions();
    let frame = frame_from_image(&image);

    let (styled, transformed) = match transform.apply(&frame) {
        Ok(styled) => (styled, true),
        Err(e) => {
            warn!(path = %input.display(), error = %e, "transform failed, saving image unchanged");
            (frame, false)
        }
    };

    let result = image_from_frame(&styled, width, height)?;
    result.save(output).map_err(|e| image_error(output, e))?;
    debug!(
        input = %input.display(),
        output = %output.display(),
        width,
        height,
        transformed,
        "image processed"
    );

    Ok(StillReport {
        width,
        height,
        transformed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;
    use media_transform::{PixelFilter, TransformError};

    fn write_test_image(path: &Path) {
        let image = RgbaImage::from_fn(4, 2, |x, _| Rgba([x as u8 * 10, 100, 200, 255]));
        image.save(path).unwrap();
    }

    #[test]
    fn invert_round_trips_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_test_image(&input);

        let mut filter = PixelFilter::Invert;
        let report = process_image(&input, &output, &mut filter).unwrap();
        assert_eq!(
            report,
            StillReport {
                width: 4,
                height: 2,
                transformed: true
            }
        );

        let saved = image::open(&output).unwrap().into_rgba8();
        assert_eq!(saved.dimensions(), (4, 2));
        assert_eq!(saved.get_pixel(1, 0), &Rgba([245, 155, 55, 255]));
    }

    #[test]
    fn transform_output_is_resized_to_source() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_test_image(&input);

        let mut shrink = |f: &VideoFrame| -> std::result::Result<VideoFrame, TransformError> {
            Ok(VideoFrame::new(vec![1, 2, 3, 255], 1, 1, PixelFormat::Bgra, f.pts, f.time_base))
        };
        process_image(&input, &output, &mut shrink).unwrap();

        let saved = image::open(&output).unwrap().into_rgba8();
        assert_eq!(saved.dimensions(), (4, 2));
        // BGRA output is swizzled back to RGBA
        assert!(saved.pixels().all(|p| *p == Rgba([3, 2, 1, 255])));
    }

    #[test]
    fn failed_transform_saves_original() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("in.png");
        let output = dir.path().join("out.png");
        write_test_image(&input);

        let mut failing = |_: &VideoFrame| -> std::result::Result<VideoFrame, TransformError> {
            Err(TransformError::failed("no model"))
        };
        let report = process_image(&input, &output, &mut failing).unwrap();
        assert!(!report.transformed);
        let saved = image::open(&output).unwrap().into_rgba8();
        assert_eq!(saved.get_pixel(3, 1), &Rgba([30, 100, 200, 255]));
    }

    #[test]
    fn missing_input_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut filter = PixelFilter::Identity;
        let err = process_image(&dir.path().join("nope.png"), &dir.path().join("out.png"), &mut filter)
            .unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn frame_converts_to_image() {
        let frame = VideoFrame::new(vec![9, 8, 7, 255], 1, 1, PixelFormat::Bgra, Pts(3), Rational::new(1, 30));
        let image = image_from_frame(&frame, 2, 2).unwrap();
        assert!(image.pixels().all(|p| *p == Rgba([7, 8, 9, 255])));
    }
}
