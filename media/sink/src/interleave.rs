/*!
    Readiness for muxers that interleave their tracks.

    A muxer writing interleaved packets has to hold back whichever track is
    ahead until the other one catches up. Letting one lane run far ahead
    only grows that backlog, so a track reports itself not ready once it
    is more than a window ahead of the other, unfinished track.
*/

use std::time::Duration;

use media_types::{Pts, Rational, TrackKind};

/// How far one track may run ahead of the other
pub const INTERLEAVE_WINDOW: Duration = Duration::from_secs(1);

#[derive(Clone, Copy, Debug, Default)]
struct TrackClock {
    written: Duration,
    finished: bool,
}

/**
    Per-track write positions and finished flags.
*/
#[derive(Clone, Copy, Debug)]
pub struct Interleave {
    window: Duration,
    video: TrackClock,
    audio: TrackClock,
}

impl Default for Interleave {
    fn default() -> Self {
        Self::new(INTERLEAVE_WINDOW)
    }
}

impl Interleave {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            video: TrackClock::default(),
            audio: TrackClock::default(),
        }
    }

    fn clock(&self, track: TrackKind) -> &TrackClock {
        match track {
            TrackKind::Video => &self.video,
            TrackKind::Audio => &self.audio,
        }
    }

    fn clock_mut(&mut self, track: TrackKind) -> &mut TrackClock {
        match track {
            TrackKind::Video => &mut self.video,
            TrackKind::Audio => &mut self.audio,
        }
    }

    /**
        Record that `track` has been written up to `pts`.
    */
    pub fn advance(&mut self, track: TrackKind, pts: Pts, time_base: Rational) {
        let clock = self.clock_mut(track);
        clock.written = clock.written.max(pts.to_duration(time_base));
    }

    pub fn finish(&mut self, track: TrackKind) {
        self.clock_mut(track).finished = true;
    }

    pub fn is_finished(&self, track: TrackKind) -> bool {
        self.clock(track).finished
    }

    /**
        Whether `track` may take more data without running too far ahead.

        A finished track is never ready, and a track whose counterpart has
        finished is never held back.
    */
    pub fn is_ready(&self, track: TrackKind) -> bool {
        let this = self.clock(track);
        let other = self.clock(track.other());
        if this.finished {
            return false;
        }
        other.finished || this.written <= other.written + self.window
    }
}
