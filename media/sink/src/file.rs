/*!
    FFmpeg-backed file sink.
*/

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    self as ffmpeg, Packet, codec, encoder, ffi,
    format::{self, Pixel, context::Output},
    software::scaling,
    util::frame::video::Video as FfmpegVideo,
};
use tracing::{debug, info};

use media_types::{
    AudioSample, AudioTrackInfo, CodecId, Error, Geometry, PixelFormat, Pts, Rational, Result,
    Rotation, TrackKind,
};

use crate::{
    ContainerFormat, FrameBuffer, FrameSink, Interleave, SinkConfig, SinkFactory, VideoSettings,
};

fn mux_err(context: &str) -> impl Fn(ffmpeg::Error) -> Error + '_ {
    move |e| Error::mux(format!("{context}: {e}"))
}

fn to_ffmpeg(r: Rational) -> ffmpeg::Rational {
    ffmpeg::Rational::new(r.num, r.den)
}

fn codec_id(codec: CodecId) -> Result<codec::Id> {
    Ok(match codec {
        CodecId::H264 => codec::Id::H264,
        CodecId::H265 => codec::Id::HEVC,
        CodecId::Aac => codec::Id::AAC,
        CodecId::Alac => codec::Id::ALAC,
        CodecId::Opus => codec::Id::OPUS,
        CodecId::Mp3 => codec::Id::MP3,
        CodecId::PcmS16Le => codec::Id::PCM_S16LE,
        CodecId::PcmF32Le => codec::Id::PCM_F32LE,
        other => return Err(Error::unsupported_format(format!("codec {other:?}"))),
    })
}

/**
    Encodes video as H.264 and copies audio packets into a QuickTime or
    MP4 file.

    The muxer interleaves packets by decode time, so a track stops
    reporting ready while it is more than [`INTERLEAVE_WINDOW`] ahead of
    the other.

    [`INTERLEAVE_WINDOW`]: crate::INTERLEAVE_WINDOW
*/
pub struct FileSink {
    path: PathBuf,
    output: Output,
    encoder: encoder::video::Encoder,
    scaler: scaling::Context,
    geometry: Geometry,
    video_stream: usize,
    video_time_base: ffmpeg::Rational,
    time_base: Rational,
    audio: Option<(usize, ffmpeg::Rational)>,
    fast_start: bool,
    started: bool,
    interleave: Interleave,
    frames: u64,
}

// The sink is only ever used by one thread at a time, behind the writer session's lock
unsafe impl Send for FileSink {}

impl FileSink {
    pub fn create(path: &Path, config: &SinkConfig) -> Result<Self> {
        let video = config
            .video
            .as_ref()
            .ok_or_else(|| Error::invalid_data("sink config has no video track"))?;
        if video.pixel_format != PixelFormat::Bgra {
            return Err(Error::unsupported_format(format!(
                "file sink expects BGRA buffers, got {:?}",
                video.pixel_format
            )));
        }

        ffmpeg::init().map_err(mux_err("init"))?;
        let mut output = format::output_as(path, config.format.ffmpeg_format_name())
            .map_err(|e| Error::mux(format!("{}: {e}", path.display())))?;
        let global_header = output
            .format()
            .flags()
            .contains(format::Flags::GLOBAL_HEADER);

        let (encoder, video_stream) = add_video_stream(&mut output, video, global_header)?;
        let audio = match &config.audio {
            Some(info) => {
                if config.format == ContainerFormat::QuickTime && !info.codec.supports_mov_passthrough() {
                    return Err(Error::unsupported_format(format!(
                        "{:?} audio cannot be copied into a QuickTime movie",
                        info.codec
                    )));
                }
                Some(add_audio_stream(&mut output, info)?)
            }
            None => None,
        };

        let scaler = scaling::Context::get(
            Pixel::BGRA,
            video.width,
            video.height,
            Pixel::YUV420P,
            video.width,
            video.height,
            scaling::Flags::BILINEAR,
        )
        .map_err(mux_err("pixel conversion"))?;

        debug!(
            path = %path.display(),
            width = video.width,
            height = video.height,
            bitrate = video.bitrate,
            audio = audio.is_some(),
            "file sink created"
        );

        let mut interleave = Interleave::default();
        if audio.is_none() {
            interleave.finish(TrackKind::Audio);
        }

        Ok(Self {
            path: path.to_path_buf(),
            output,
            encoder,
            scaler,
            geometry: video.geometry(),
            video_stream,
            video_time_base: to_ffmpeg(video.time_base),
            time_base: video.time_base,
            audio,
            fast_start: config.fast_start,
            started: false,
            interleave,
            frames: 0,
        })
    }

    fn drain_encoder(&mut self) -> Result<()> {
        let stream_time_base = self
            .output
            .stream(self.video_stream)
            .map(|s| s.time_base())
            .unwrap_or(self.video_time_base);

        let mut packet = Packet::empty();
        while self.encoder.receive_packet(&mut packet).is_ok() {
            packet.set_stream(self.video_stream);
            packet.rescale_ts(self.video_time_base, stream_time_base);
            packet
                .write_interleaved(&mut self.output)
                .map_err(mux_err("write video packet"))?;
        }
        Ok(())
    }
}

fn add_video_stream(
    output: &mut Output,
    video: &VideoSettings,
    global_header: bool,
) -> Result<(encoder::video::Encoder, usize)> {
    let codec = encoder::find(codec_id(video.codec)?)
        .ok_or_else(|| Error::unsupported_format("no H.264 encoder available"))?;

    let mut stream = output.add_stream(codec).map_err(mux_err("add video stream"))?;
    let index = stream.index();
    let time_base = to_ffmpeg(video.time_base);
    stream.set_time_base(time_base);

    let mut context = codec::context::Context::new_with_codec(codec)
        .encoder()
        .video()
        .map_err(mux_err("video encoder"))?;
    context.set_width(video.width);
    context.set_height(video.height);
    context.set_format(Pixel::YUV420P);
    context.set_time_base(time_base);
    context.set_frame_rate(Some(to_ffmpeg(video.frame_rate)));
    context.set_bit_rate(video.bitrate as usize);
    if global_header {
        context.set_flags(codec::Flags::GLOBAL_HEADER);
    }

    let encoder = context.open_as(codec).map_err(mux_err("open video encoder"))?;
    stream.set_parameters(&encoder);

    let rotation = video.transform.quarter_turn();
    if rotation != Rotation::Deg0 {
        unsafe {
            let par = (*stream.as_mut_ptr()).codecpar;
            let side_data = ffi::av_packet_side_data_new(
                &mut (*par).coded_side_data,
                &mut (*par).nb_coded_side_data,
                ffi::AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
                9 * size_of::<i32>(),
                0,
            );
            if side_data.is_null() {
                return Err(Error::mux("could not allocate display matrix"));
            }
            // Display matrices store counter-clockwise rotation
            ffi::av_display_rotation_set(
                (*side_data).data as *mut i32,
                -(rotation.degrees() as f64),
            );
        }
    }

    Ok((encoder, index))
}

fn add_audio_stream(output: &mut Output, info: &AudioTrackInfo) -> Result<(usize, ffmpeg::Rational)> {
    let id = codec_id(info.codec)?;
    let mut stream = output
        .add_stream(encoder::find(codec::Id::None))
        .map_err(mux_err("add audio stream"))?;
    let index = stream.index();
    let time_base = to_ffmpeg(info.time_base);
    stream.set_time_base(time_base);

    unsafe {
        let par = (*stream.as_mut_ptr()).codecpar;
        (*par).codec_type = ffi::AVMediaType::AVMEDIA_TYPE_AUDIO;
        (*par).codec_id = id.into();
        (*par).codec_tag = 0;
        (*par).sample_rate = info.sample_rate as i32;
        (*par).frame_size = info.frame_size as i32;
        (*par).bit_rate = info.bitrate.unwrap_or(0) as i64;
        ffi::av_channel_layout_default(&mut (*par).ch_layout, info.channels as i32);

        if !info.extradata.is_empty() {
            let len = info.extradata.len();
            let buf = ffi::av_mallocz(len + ffi::AV_INPUT_BUFFER_PADDING_SIZE as usize) as *mut u8;
            if buf.is_null() {
                return Err(Error::mux("could not allocate audio extradata"));
            }
            std::ptr::copy_nonoverlapping(info.extradata.as_ptr(), buf, len);
            (*par).extradata = buf;
            (*par).extradata_size = len as i32;
        }
    }

    Ok((index, time_base))
}

impl FrameSink for FileSink {
    fn start_session(&mut self, at: Pts) -> Result<()> {
        if self.started {
            return Err(Error::invalid_data("session already started"));
        }
        if self.fast_start {
            let mut options = ffmpeg::Dictionary::new();
            options.set("movflags", "faststart");
            self.output
                .write_header_with(options)
                .map_err(mux_err("write header"))?;
        } else {
            self.output
                .write_header()
                .map_err(mux_err("write header"))?;
        }
        self.started = true;
        debug!(at = at.0, "file sink session started");
        Ok(())
    }

    fn is_ready_for_more_data(&mut self, track: TrackKind) -> bool {
        self.interleave.is_ready(track)
    }

    fn append_video(&mut self, buffer: Box<dyn FrameBuffer>, pts: Pts) -> Result<()> {
        if !self.started || self.interleave.is_finished(TrackKind::Video) {
            return Err(Error::invalid_data("video append outside of session"));
        }
        if buffer.geometry() != self.geometry {
            return Err(Error::invalid_data(format!(
                "buffer geometry {:?} does not match track geometry {:?}",
                buffer.geometry(),
                self.geometry
            )));
        }

        let mut bgra = FfmpegVideo::new(Pixel::BGRA, self.geometry.width, self.geometry.height);
        let row_len = self.geometry.stride();
        let stride = bgra.stride(0);
        let src = buffer.data();
        let dst = bgra.data_mut(0);
        for row in 0..self.geometry.height as usize {
            dst[row * stride..row * stride + row_len]
                .copy_from_slice(&src[row * row_len..(row + 1) * row_len]);
        }
        // Buffer goes back to its pool as soon as the pixels are copied
        drop(buffer);

        let mut yuv = FfmpegVideo::empty();
        self.scaler
            .run(&bgra, &mut yuv)
            .map_err(mux_err("pixel conversion"))?;
        yuv.set_pts(Some(pts.0));

        self.encoder
            .send_frame(&yuv)
            .map_err(mux_err("encode video frame"))?;
        self.interleave.advance(TrackKind::Video, pts, self.time_base);
        self.frames += 1;
        self.drain_encoder()
    }

    fn append_audio(&mut self, sample: AudioSample, pts: Pts) -> Result<()> {
        let Some((index, stream_time_base)) = self.audio else {
            return Err(Error::invalid_data("sink has no audio track"));
        };
        if !self.started || self.interleave.is_finished(TrackKind::Audio) {
            return Err(Error::invalid_data("audio append outside of session"));
        }
        self.interleave.advance(TrackKind::Audio, pts, sample.time_base);
        let stream_time_base = self
            .output
            .stream(index)
            .map(|s| s.time_base())
            .unwrap_or(stream_time_base);

        let mut packet = Packet::copy(&sample.data);
        packet.set_pts(Some(pts.0));
        packet.set_dts(Some(pts.0));
        packet.set_duration(sample.duration.0);
        packet.set_stream(index);
        packet.rescale_ts(to_ffmpeg(sample.time_base), stream_time_base);
        packet
            .write_interleaved(&mut self.output)
            .map_err(mux_err("write audio packet"))
    }

    fn mark_track_finished(&mut self, track: TrackKind) {
        self.interleave.finish(track);
    }

    fn finalize(mut self: Box<Self>) -> Result<()> {
        if !self.started {
            return Err(Error::mux("finalize without a started session"));
        }
        self.encoder
            .send_eof()
            .map_err(mux_err("flush video encoder"))?;
        self.drain_encoder()?;
        self.output
            .write_trailer()
            .map_err(mux_err("write trailer"))?;

        info!(path = %self.path.display(), frames = self.frames, "file finalized");
        Ok(())
    }
}

/**
    Creates [`FileSink`]s.
*/
#[derive(Clone, Copy, Debug, Default)]
pub struct FileSinkFactory;

impl SinkFactory for FileSinkFactory {
    fn create(&self, path: &Path, config: &SinkConfig) -> Result<Box<dyn FrameSink>> {
        Ok(Box::new(FileSink::create(path, config)?))
    }
}
