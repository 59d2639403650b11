/*!
    Pixel formats and frame geometry.
*/

/**
    Video pixel formats.

    The pipeline works on packed formats only: decoded frames are converted
    to a packed layout before they reach the transform stage, and encoders
    convert back to their native layout on their own.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum PixelFormat {
    /// Packed BGRA, 32bpp (the pipeline's working format)
    Bgra,
    /// Packed RGBA, 32bpp
    Rgba,
    /// Packed RGB, 24bpp
    Rgb24,
    /// Packed BGR, 24bpp
    Bgr24,
}

impl PixelFormat {
    /**
        Returns the number of bytes used by a single pixel.
    */
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra | Self::Rgba => 4,
            Self::Rgb24 | Self::Bgr24 => 3,
        }
    }

    /**
        Returns true if this format carries an alpha channel.
    */
    pub const fn has_alpha(self) -> bool {
        matches!(self, Self::Bgra | Self::Rgba)
    }

    /**
        Returns true if the red and blue channels are stored in swapped
        positions relative to `other`, with all other channels identical.
    */
    pub const fn is_swizzle_of(self, other: Self) -> bool {
        matches!(
            (self, other),
            (Self::Bgra, Self::Rgba)
                | (Self::Rgba, Self::Bgra)
                | (Self::Rgb24, Self::Bgr24)
                | (Self::Bgr24, Self::Rgb24)
        )
    }
}

/**
    Dimensions and layout of a packed frame buffer.

    Buffer pools are keyed by geometry: a buffer allocated for one geometry
    is only handed out again for the same geometry.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Geometry {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl Geometry {
    pub const fn new(width: u32, height: u32, format: PixelFormat) -> Self {
        Self {
            width,
            height,
            format,
        }
    }

    /**
        Number of bytes in a single row of pixels.
    */
    pub const fn stride(&self) -> usize {
        self.width as usize * self.format.bytes_per_pixel()
    }

    /**
        Number of bytes needed to hold a full frame.
    */
    pub const fn byte_len(&self) -> usize {
        self.stride() * self.height as usize
    }

    /**
        The same geometry with width and height exchanged.
    */
    pub const fn transposed(&self) -> Self {
        Self {
            width: self.height,
            height: self.width,
            format: self.format,
        }
    }

    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bytes_per_pixel() {
        assert_eq!(PixelFormat::Bgra.bytes_per_pixel(), 4);
        assert_eq!(PixelFormat::Rgb24.bytes_per_pixel(), 3);
    }

    #[test]
    fn swizzle_pairs() {
        assert!(PixelFormat::Bgra.is_swizzle_of(PixelFormat::Rgba));
        assert!(PixelFormat::Bgr24.is_swizzle_of(PixelFormat::Rgb24));
        assert!(!PixelFormat::Bgra.is_swizzle_of(PixelFormat::Bgra));
        assert!(!PixelFormat::Bgra.is_swizzle_of(PixelFormat::Rgb24));
    }

    #[test]
    fn geometry_sizes() {
        let g = Geometry::new(1920, 1080, PixelFormat::Bgra);
        assert_eq!(g.stride(), 1920 * 4);
        assert_eq!(g.byte_len(), 1920 * 1080 * 4);
    }

    #[test]
    fn geometry_transpose() {
        let g = Geometry::new(1920, 1080, PixelFormat::Bgra).transposed();
        assert_eq!((g.width, g.height), (1080, 1920));
        assert_eq!(g.format, PixelFormat::Bgra);
    }
}
