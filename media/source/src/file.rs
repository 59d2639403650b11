/*!
    FFmpeg-backed file source.
*/

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use ffmpeg_next::{
    self as ffmpeg, Packet, codec, ffi,
    format::{self, Pixel, context::Input},
    media,
    software::scaling,
    util::frame::video::Video as FfmpegVideo,
};
use tracing::{debug, warn};

use media_types::{
    AudioSample, AudioTrackInfo, CodecId, DisplayTransform, Error, MediaAsset, MediaDuration,
    PixelFormat, Pts, Rational, Result, Rotation, VideoFrame, VideoTrackInfo,
};

use crate::{AudioReader, FrameSource, OpenedSource, TrackReader};

/**
    A media file decoded through FFmpeg.

    Video is decoded and converted to packed BGRA. Audio packets are read
    still encoded and handed out untouched.

    Each track gets its own demuxer over the same file, so the two readers
    never contend for a shared packet stream.
*/
#[derive(Clone, Debug)]
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /**
        Read the asset description without creating any readers.
    */
    pub fn probe(&self) -> Result<MediaAsset> {
        let input = open_input(&self.path)?;
        Ok(describe(&input)?.asset)
    }
}

impl FrameSource for FileSource {
    fn open(&self) -> Result<OpenedSource> {
        let video_input = open_input(&self.path)?;
        let layout = describe(&video_input)?;
        debug!(
            path = %self.path.display(),
            width = layout.asset.video.width,
            height = layout.asset.video.height,
            rotation = layout.asset.video.rotation().degrees(),
            audio = layout.asset.has_audio(),
            "opened file source"
        );

        let video = FileVideoReader::new(video_input, layout.video_index)?;

        let audio = match layout.audio_index {
            Some(index) => {
                let input = open_input(&self.path)?;
                let time_base = layout
                    .asset
                    .audio
                    .as_ref()
                    .map(|a| a.time_base)
                    .unwrap_or(Rational::new(1, 48_000));
                Some(Box::new(FileAudioReader {
                    input,
                    stream_index: index,
                    time_base,
                }) as AudioReader)
            }
            None => None,
        };

        Ok(OpenedSource {
            asset: layout.asset,
            video: Box::new(video),
            audio,
        })
    }
}

struct Layout {
    asset: MediaAsset,
    video_index: usize,
    audio_index: Option<usize>,
}

fn open_input(path: &Path) -> Result<Input> {
    ffmpeg::init().map_err(|e| Error::asset_unreadable(e.to_string()))?;
    format::input(path).map_err(|e| Error::asset_unreadable(format!("{}: {e}", path.display())))
}

fn rational(r: ffmpeg::Rational) -> Option<Rational> {
    (r.denominator() != 0).then(|| Rational::new(r.numerator(), r.denominator()))
}

fn describe(input: &Input) -> Result<Layout> {
    let stream = input
        .streams()
        .best(media::Type::Video)
        .ok_or_else(|| Error::asset_unreadable("no video track found"))?;

    let time_base = rational(stream.time_base())
        .ok_or_else(|| Error::asset_unreadable("video track has no time base"))?;
    let frame_rate = rational(stream.avg_frame_rate())
        .filter(|r| !r.is_non_positive())
        .or_else(|| rational(stream.rate()))
        .unwrap_or(Rational::new(30, 1));

    let decoder = codec::context::Context::from_parameters(stream.parameters())
        .and_then(|ctx| ctx.decoder().video())
        .map_err(|e| Error::asset_unreadable(format!("video decoder: {e}")))?;

    let duration = if stream.duration() > 0 {
        Pts(stream.duration()).to_duration(time_base)
    } else if input.duration() > 0 {
        Duration::from_secs_f64(input.duration() as f64 / ffi::AV_TIME_BASE as f64)
    } else {
        Duration::ZERO
    };

    let bitrate = match decoder.bit_rate() {
        0 if input.bit_rate() > 0 => Some(input.bit_rate() as u64),
        0 => None,
        rate => Some(rate as u64),
    };

    let video = VideoTrackInfo {
        width: decoder.width(),
        height: decoder.height(),
        frame_rate,
        time_base,
        transform: DisplayTransform::rotation(display_rotation(&stream)),
        bitrate,
        duration,
    };
    let video_index = stream.index();

    let (audio, audio_index) = match input.streams().best(media::Type::Audio) {
        Some(stream) => match describe_audio(&stream) {
            Ok(info) => (Some(info), Some(stream.index())),
            Err(e) => {
                warn!(error = %e, "ignoring audio track");
                (None, None)
            }
        },
        None => (None, None),
    };

    Ok(Layout {
        asset: MediaAsset { video, audio },
        video_index,
        audio_index,
    })
}

fn describe_audio(stream: &format::stream::Stream) -> Result<AudioTrackInfo> {
    let parameters = stream.parameters();
    let codec = match parameters.id() {
        codec::Id::AAC => CodecId::Aac,
        codec::Id::ALAC => CodecId::Alac,
        codec::Id::OPUS => CodecId::Opus,
        codec::Id::MP3 => CodecId::Mp3,
        codec::Id::PCM_S16LE => CodecId::PcmS16Le,
        codec::Id::PCM_F32LE => CodecId::PcmF32Le,
        other => {
            return Err(Error::unsupported_format(format!(
                "audio codec {other:?}"
            )));
        }
    };

    let time_base = rational(stream.time_base())
        .ok_or_else(|| Error::invalid_data("audio track has no time base"))?;

    let decoder = codec::context::Context::from_parameters(parameters.clone())
        .and_then(|ctx| ctx.decoder().audio())
        .map_err(|e| Error::unsupported_format(format!("audio decoder: {e}")))?;

    let extradata = unsafe {
        let par = (*stream.as_ptr()).codecpar;
        if (*par).extradata.is_null() || (*par).extradata_size <= 0 {
            Vec::new()
        } else {
            std::slice::from_raw_parts((*par).extradata, (*par).extradata_size as usize).to_vec()
        }
    };

    Ok(AudioTrackInfo {
        codec,
        channels: decoder.channels() as u16,
        sample_rate: decoder.rate(),
        time_base,
        bitrate: (decoder.bit_rate() > 0).then(|| decoder.bit_rate() as u64),
        frame_size: decoder.frame_size(),
        extradata,
    })
}

/**
    Read the clockwise quarter turn stored in the stream's display matrix.
*/
fn display_rotation(stream: &format::stream::Stream) -> Rotation {
    // av_display_rotation_get reports counter-clockwise degrees
    let degrees = unsafe {
        let par = (*stream.as_ptr()).codecpar;
        let side_data = ffi::av_packet_side_data_get(
            (*par).coded_side_data,
            (*par).nb_coded_side_data,
            ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).size < 9 * size_of::<i32>() {
            return Rotation::Deg0;
        }
        ffi::av_display_rotation_get((*side_data).data as *const i32)
    };
    if degrees.is_nan() {
        return Rotation::Deg0;
    }
    Rotation::from_degrees(-degrees)
}

struct FileVideoReader {
    input: Input,
    stream_index: usize,
    decoder: ffmpeg::decoder::Video,
    scaler: Option<scaling::Context>,
    time_base: Rational,
    last_pts: Option<Pts>,
    eof_sent: bool,
    finished: bool,
}

// The reader is moved onto its lane thread once and never shared
unsafe impl Send for FileVideoReader {}

impl FileVideoReader {
    fn new(input: Input, stream_index: usize) -> Result<Self> {
        let stream = input
            .stream(stream_index)
            .ok_or_else(|| Error::asset_unreadable("video track disappeared"))?;
        let time_base = rational(stream.time_base())
            .ok_or_else(|| Error::asset_unreadable("video track has no time base"))?;
        let decoder = codec::context::Context::from_parameters(stream.parameters())
            .and_then(|ctx| ctx.decoder().video())
            .map_err(|e| Error::asset_unreadable(format!("video decoder: {e}")))?;

        Ok(Self {
            input,
            stream_index,
            decoder,
            scaler: None,
            time_base,
            last_pts: None,
            eof_sent: false,
            finished: false,
        })
    }

    fn convert(&mut self, decoded: &FfmpegVideo) -> Result<VideoFrame> {
        let (width, height) = (decoded.width(), decoded.height());
        let scaler = match self.scaler.as_mut() {
            Some(scaler) => scaler,
            None => {
                let scaler = scaling::Context::get(
                    decoded.format(),
                    width,
                    height,
                    Pixel::BGRA,
                    width,
                    height,
                    scaling::Flags::BILINEAR,
                )
                .map_err(|e| Error::decode(format!("pixel conversion: {e}")))?;
                self.scaler.insert(scaler)
            }
        };

        let mut bgra = FfmpegVideo::empty();
        scaler
            .run(decoded, &mut bgra)
            .map_err(|e| Error::decode(format!("pixel conversion: {e}")))?;

        let row_len = width as usize * PixelFormat::Bgra.bytes_per_pixel();
        let stride = bgra.stride(0);
        let plane = bgra.data(0);
        let mut data = Vec::with_capacity(row_len * height as usize);
        for row in 0..height as usize {
            data.extend_from_slice(&plane[row * stride..row * stride + row_len]);
        }

        let pts = decoded
            .timestamp()
            .map(Pts)
            .or_else(|| self.last_pts.map(|p| Pts(p.0 + 1)))
            .unwrap_or(Pts::ZERO);
        self.last_pts = Some(pts);

        Ok(VideoFrame::new(
            data,
            width,
            height,
            PixelFormat::Bgra,
            pts,
            self.time_base,
        ))
    }
}

impl TrackReader<VideoFrame> for FileVideoReader {
    fn next(&mut self) -> Result<Option<VideoFrame>> {
        loop {
            if self.finished {
                return Ok(None);
            }

            let mut decoded = FfmpegVideo::empty();
            match self.decoder.receive_frame(&mut decoded) {
                Ok(()) => return self.convert(&decoded).map(Some),
                Err(ffmpeg::Error::Eof) => {
                    self.finished = true;
                    return Ok(None);
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffi::EAGAIN => {}
                Err(e) => return Err(Error::decode(e.to_string())),
            }

            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    self.decoder
                        .send_packet(&packet)
                        .map_err(|e| Error::decode(e.to_string()))?;
                }
                Err(ffmpeg::Error::Eof) if !self.eof_sent => {
                    self.eof_sent = true;
                    self.decoder
                        .send_eof()
                        .map_err(|e| Error::decode(e.to_string()))?;
                }
                Err(ffmpeg::Error::Eof) => {
                    self.finished = true;
                }
                Err(e) => return Err(Error::decode(e.to_string())),
            }
        }
    }
}

struct FileAudioReader {
    input: Input,
    stream_index: usize,
    time_base: Rational,
}

// The reader is moved onto its lane thread once and never shared
unsafe impl Send for FileAudioReader {}

impl TrackReader<AudioSample> for FileAudioReader {
    fn next(&mut self) -> Result<Option<AudioSample>> {
        loop {
            let mut packet = Packet::empty();
            match packet.read(&mut self.input) {
                Ok(()) => {
                    if packet.stream() != self.stream_index {
                        continue;
                    }
                    let pts = packet.pts().or(packet.dts()).unwrap_or(0);
                    return Ok(Some(AudioSample::new(
                        packet.data().unwrap_or(&[]).to_vec(),
                        Pts(pts),
                        MediaDuration(packet.duration()),
                        self.time_base,
                    )));
                }
                Err(ffmpeg::Error::Eof) => return Ok(None),
                Err(e) => return Err(Error::decode(e.to_string())),
            }
        }
    }
}
