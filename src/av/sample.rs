use bytes::Bytes;

/// Represents an encoded audio or video sample.
///
/// A `MediaSample` is the basic unit of media data in the cueio pipeline. It
/// carries timing information (PTS/DTS in the stream's time scale), the key
/// frame flag the GOP aligner relies on, and the byte extent of the sample
/// inside its segment file, which the playlist writer needs for byte-range
/// and i-frames-only output.
#[derive(Debug, Clone)]
pub struct MediaSample {
    /// The encoded payload
    pub data: Bytes,
    /// Presentation timestamp in the stream's time scale
    pub pts: i64,
    /// Decoding timestamp in the stream's time scale
    pub dts: Option<i64>,
    /// Duration of the media content in this sample, in time scale ticks
    pub duration: i64,
    /// Whether this sample starts a GOP (IDR / key frame)
    pub is_key_frame: bool,
    /// Byte offset of the sample within its segment file
    pub start_byte_offset: u64,
    /// Size of the sample in bytes
    pub size: u64,
}

impl MediaSample {
    /// Creates a new media sample with the given payload.
    ///
    /// Timing fields default to zero and the sample is not a key frame;
    /// use the `with_*` builders to fill them in.
    pub fn new(data: impl Into<Bytes>) -> Self {
        let data = data.into();
        let size = data.len() as u64;
        Self {
            data,
            pts: 0,
            dts: None,
            duration: 0,
            is_key_frame: false,
            start_byte_offset: 0,
            size,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = pts;
        self
    }

    /// Sets the decoding timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the sample duration in time scale ticks.
    pub fn with_duration(mut self, duration: i64) -> Self {
        self.duration = duration;
        self
    }

    /// Marks this sample as a key frame.
    pub fn with_key_flag(mut self, is_key_frame: bool) -> Self {
        self.is_key_frame = is_key_frame;
        self
    }

    /// Sets the byte extent of the sample within its segment file.
    pub fn with_byte_range(mut self, start_byte_offset: u64, size: u64) -> Self {
        self.start_byte_offset = start_byte_offset;
        self.size = size;
        self
    }
}

/// A timed text sample (subtitle cue).
///
/// Text samples are never split at cue boundaries; a sample that straddles
/// an ad break is dispatched whole on the pre-break side.
#[derive(Debug, Clone)]
pub struct TextSample {
    /// Start time in the stream's time scale
    pub start_time: i64,
    /// End time in the stream's time scale
    pub end_time: i64,
    /// The cue text payload
    pub payload: String,
}

impl TextSample {
    /// Creates a text sample covering `[start_time, end_time)`.
    pub fn new(start_time: i64, end_time: i64, payload: impl Into<String>) -> Self {
        Self {
            start_time,
            end_time,
            payload: payload.into(),
        }
    }
}

/// Either kind of sample the alignment handler accepts.
#[derive(Debug, Clone)]
pub enum Sample {
    /// An audio or video sample
    Media(MediaSample),
    /// A timed text sample
    Text(TextSample),
}

impl From<MediaSample> for Sample {
    fn from(sample: MediaSample) -> Self {
        Sample::Media(sample)
    }
}

impl From<TextSample> for Sample {
    fn from(sample: TextSample) -> Self {
        Sample::Text(sample)
    }
}
