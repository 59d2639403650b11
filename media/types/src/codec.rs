/*!
    Codec identification.
*/

/**
    Codec identifiers.

    Video is always encoded with [`CodecId::H264`]; the audio codec is
    whatever the source carries, since audio is copied through untouched.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum CodecId {
    // Video codecs
    /// H.264 / AVC
    H264,
    /// H.265 / HEVC
    H265,

    // Audio codecs
    /// AAC (Advanced Audio Coding)
    Aac,
    /// Apple Lossless
    Alac,
    /// Opus
    Opus,
    /// MP3 (MPEG Audio Layer 3)
    Mp3,
    /// PCM signed 16-bit little-endian
    PcmS16Le,
    /// PCM 32-bit float little-endian
    PcmF32Le,
}

impl CodecId {
    /**
        Returns true if this is a video codec.
    */
    pub const fn is_video(self) -> bool {
        matches!(self, Self::H264 | Self::H265)
    }

    /**
        Returns true if this is an audio codec.
    */
    pub const fn is_audio(self) -> bool {
        !self.is_video()
    }

    /**
        Returns true if packets of this codec can be copied into a
        QuickTime container without re-encoding.
    */
    pub const fn supports_mov_passthrough(self) -> bool {
        matches!(
            self,
            Self::Aac | Self::Alac | Self::Mp3 | Self::PcmS16Le | Self::PcmF32Le
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn media_kinds() {
        assert!(CodecId::H264.is_video());
        assert!(!CodecId::H264.is_audio());
        assert!(CodecId::Aac.is_audio());
        assert!(CodecId::PcmS16Le.is_audio());
    }

    #[test]
    fn mov_passthrough() {
        assert!(CodecId::Aac.supports_mov_passthrough());
        assert!(!CodecId::Opus.supports_mov_passthrough());
        assert!(!CodecId::H264.supports_mov_passthrough());
    }
}
