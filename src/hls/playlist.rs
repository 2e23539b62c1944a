use std::collections::VecDeque;
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use log::{debug, error, warn};

use super::bandwidth::BandwidthEstimator;
use super::tag::Tag;
use super::{
    language_to_shortest_form, segment_name_from_template, EncryptionMethod, HlsParams,
    HlsPlaylistType, MediaInfo, SpliceType,
};
use crate::error::{CueError, Result};
use crate::scte35::DeliveryRestrictions;

/// What the playlist advertises itself as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaPlaylistStreamType {
    /// Audio rendition
    Audio,
    /// Video rendition
    Video,
    /// Video rendition restricted to key frames
    VideoIFramesOnly,
    /// Subtitle rendition
    Subtitle,
}

/// `#EXTINF` entry state.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentInfoEntry {
    /// Rendered segment URI
    pub file_name: String,
    /// Start time in seconds
    pub start_time: f64,
    /// Start time in time scale ticks, kept for segment-template naming
    pub start_time_ticks: i64,
    /// Duration in seconds
    pub duration: f64,
    /// Whether an EXT-X-BYTERANGE line follows the EXTINF line
    pub use_byte_range: bool,
    /// First byte of the segment within its file
    pub start_byte_offset: u64,
    /// Segment size in bytes
    pub segment_file_size: u64,
    /// Where the previous segment ended, for byte-range adjacency
    pub previous_segment_end_offset: u64,
}

/// `#EXT-X-KEY` entry state.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptionInfoEntry {
    /// Encryption method
    pub method: EncryptionMethod,
    /// Key or license URI
    pub url: String,
    /// KEYID attribute; omitted when empty
    pub key_id: String,
    /// IV attribute; omitted when empty
    pub iv: String,
    /// KEYFORMAT attribute; omitted when empty
    pub key_format: String,
    /// KEYFORMATVERSIONS attribute; omitted when empty
    pub key_format_versions: String,
}

/// `#EXT-X-SIGNAL-EXIT` entry state.
#[derive(Debug, Clone, PartialEq)]
pub struct SignalExitEntry {
    /// Signalling dialect
    pub splice_type: SpliceType,
    /// Ad break duration in seconds
    pub duration: Option<f64>,
    /// segmentationEventId attribute
    pub event_id: Option<u32>,
    /// UPID bytes, rendered base64
    pub upid: Vec<u8>,
    /// segmentationTypeId attribute
    pub segmentation_type_id: Option<u8>,
    /// Delivery restriction flags
    pub restrictions: Option<DeliveryRestrictions>,
    /// SignalId attribute; omitted when empty
    pub signal_id: String,
    /// Paid (providerId/assetId) attribute; omitted when empty
    pub paid: String,
    /// MaxD attribute: maximum break duration in seconds
    pub max_duration: Option<u64>,
    /// MinD attribute: minimum break duration in seconds
    pub min_duration: Option<u64>,
    /// MaxAds attribute: maximum number of ads in the break
    pub max_ads: Option<u64>,
    /// MinAds attribute: minimum number of ads in the break
    pub min_ads: Option<u64>,
}

impl SignalExitEntry {
    /// An exit entry with only the dialect and duration set.
    pub fn new(splice_type: SpliceType, duration: Option<f64>) -> Self {
        Self {
            splice_type,
            duration,
            event_id: None,
            upid: Vec::new(),
            segmentation_type_id: None,
            restrictions: None,
            signal_id: String::new(),
            paid: String::new(),
            max_duration: None,
            min_duration: None,
            max_ads: None,
            min_ads: None,
        }
    }
}

/// One rendered playlist line (or multi-line fragment).
#[derive(Debug, Clone, PartialEq)]
pub enum HlsEntry {
    /// `#EXTINF` plus optional byte range and the segment URI
    SegmentInfo(SegmentInfoEntry),
    /// `#EXT-X-KEY`
    EncryptionInfo(EncryptionInfoEntry),
    /// `#EXT-X-DISCONTINUITY`
    Discontinuity,
    /// `#EXT-X-PLACEMENT-OPPORTUNITY`
    PlacementOpportunity,
    /// `#EXT-X-SIGNAL-EXIT`
    SignalExit(SignalExitEntry),
    /// `#EXT-X-SIGNAL-SPAN`
    SignalSpan {
        /// Signalling dialect
        splice_type: SpliceType,
        /// Seconds elapsed since the exit signal
        position: f64,
        /// Ad break duration in seconds
        duration: Option<f64>,
    },
    /// `#EXT-X-SIGNAL-RETURN`
    SignalReturn {
        /// Signalling dialect
        splice_type: SpliceType,
        /// Ad break duration in seconds
        duration: Option<f64>,
    },
}

impl HlsEntry {
    /// Renders the entry as its playlist fragment, without the trailing
    /// newline.
    pub fn render(&self) -> String {
        match self {
            HlsEntry::SegmentInfo(segment) => {
                let mut out = format!("#EXTINF:{:.3},", segment.duration);
                if segment.use_byte_range {
                    let _ = write!(out, "\n#EXT-X-BYTERANGE:{}", segment.segment_file_size);
                    if segment.previous_segment_end_offset + 1 != segment.start_byte_offset {
                        let _ = write!(out, "@{}", segment.start_byte_offset);
                    }
                }
                let _ = write!(out, "\n{}", segment.file_name);
                out
            }
            HlsEntry::EncryptionInfo(key) => {
                let mut out = String::new();
                let mut tag = Tag::new("#EXT-X-KEY", &mut out);
                tag.add_string("METHOD", key.method.as_attribute());
                tag.add_quoted_string("URI", &key.url);
                if !key.key_id.is_empty() {
                    tag.add_string("KEYID", &key.key_id);
                }
                if !key.iv.is_empty() {
                    tag.add_string("IV", &key.iv);
                }
                if !key.key_format_versions.is_empty() {
                    tag.add_quoted_string("KEYFORMATVERSIONS", &key.key_format_versions);
                }
                if !key.key_format.is_empty() {
                    tag.add_quoted_string("KEYFORMAT", &key.key_format);
                }
                out
            }
            HlsEntry::Discontinuity => "#EXT-X-DISCONTINUITY".to_string(),
            HlsEntry::PlacementOpportunity => "#EXT-X-PLACEMENT-OPPORTUNITY".to_string(),
            HlsEntry::SignalExit(exit) => {
                let mut out = String::new();
                let mut tag = Tag::new("#EXT-X-SIGNAL-EXIT", &mut out);
                if let Some(duration) = exit.duration {
                    tag.add_value(duration);
                }
                tag.add_string("SpliceType", exit.splice_type.as_attribute());
                if !exit.signal_id.is_empty() {
                    tag.add_string("SignalId", &exit.signal_id);
                }
                if !exit.paid.is_empty() {
                    tag.add_string("Paid", &exit.paid);
                }
                if let Some(event_id) = exit.event_id {
                    tag.add_number("segmentationEventId", event_id as u64);
                }
                if !exit.upid.is_empty() {
                    tag.add_string("segmentationUpid", &BASE64_STANDARD.encode(&exit.upid));
                }
                if let Some(type_id) = exit.segmentation_type_id {
                    tag.add_number("segmentationTypeId", type_id as u64);
                }
                if let Some(restrictions) = &exit.restrictions {
                    tag.add_number(
                        "webDeliveryAllowedFlag",
                        restrictions.web_delivery_allowed as u64,
                    );
                    tag.add_number(
                        "noRegionalBlackoutFlag",
                        restrictions.no_regional_blackout as u64,
                    );
                    tag.add_number("archiveAllowedFlag", restrictions.archive_allowed as u64);
                    tag.add_number(
                        "deviceRestrictions",
                        restrictions.device_restrictions as u64,
                    );
                }
                if let Some(max_duration) = exit.max_duration {
                    tag.add_number("MaxD", max_duration);
                }
                if let Some(min_duration) = exit.min_duration {
                    tag.add_number("MinD", min_duration);
                }
                if let Some(max_ads) = exit.max_ads {
                    tag.add_number("MaxAds", max_ads);
                }
                if let Some(min_ads) = exit.min_ads {
                    tag.add_number("MinAds", min_ads);
                }
                out
            }
            HlsEntry::SignalSpan {
                splice_type,
                position,
                duration,
            } => {
                let mut out = String::new();
                let mut tag = Tag::new("#EXT-X-SIGNAL-SPAN", &mut out);
                tag.add_value(*position);
                if let Some(duration) = duration {
                    tag.add_of_value(*duration);
                }
                tag.add_string("SpliceType", splice_type.as_attribute());
                out
            }
            HlsEntry::SignalReturn {
                splice_type,
                duration,
            } => {
                let mut out = String::new();
                let mut tag = Tag::new("#EXT-X-SIGNAL-RETURN", &mut out);
                if let Some(duration) = duration {
                    tag.add_value(*duration);
                }
                tag.add_string("SpliceType", splice_type.as_attribute());
                out
            }
        }
    }
}

struct KeyFrameInfo {
    timestamp: i64,
    start_byte_offset: u64,
    size: u64,
}

/// One stream's media playlist.
///
/// Entries accumulate in stream order; `write_to_file` renders the header
/// and entries deterministically and replaces the target file atomically.
/// Live playlists evict from the front to keep the advertised time-shift
/// window.
pub struct MediaPlaylist {
    params: HlsParams,
    file_name: String,
    name: String,
    group_id: String,

    media_info: MediaInfo,
    stream_type: MediaPlaylistStreamType,
    codec: String,
    language: String,
    characteristics: Vec<String>,
    use_byte_range: bool,
    time_scale: u32,

    entries: VecDeque<HlsEntry>,
    key_frames: VecDeque<KeyFrameInfo>,

    media_sequence_number: u64,
    discontinuity_sequence_number: u64,
    inserted_discontinuity_tag: bool,
    previous_segment_end_offset: u64,
    longest_segment_duration: f64,
    target_duration: u32,
    target_duration_set: bool,

    bandwidth_estimator: BandwidthEstimator,

    in_ad_state: bool,
    ad_duration: Option<f64>,
    ad_position: f64,
    ad_segments: u64,

    segments_to_be_removed: VecDeque<String>,
}

impl MediaPlaylist {
    /// Creates an empty playlist.
    ///
    /// `file_name` is the playlist path relative to the master playlist
    /// directory; `name` and `group_id` identify the rendition.
    pub fn new(params: HlsParams, file_name: &str, name: &str, group_id: &str) -> Self {
        let bandwidth_estimator = BandwidthEstimator::new(params.target_segment_duration);
        Self {
            params,
            file_name: file_name.to_string(),
            name: name.to_string(),
            group_id: group_id.to_string(),
            media_info: MediaInfo::default(),
            stream_type: MediaPlaylistStreamType::Audio,
            codec: String::new(),
            language: String::new(),
            characteristics: Vec::new(),
            use_byte_range: false,
            time_scale: 0,
            entries: VecDeque::new(),
            key_frames: VecDeque::new(),
            media_sequence_number: 0,
            discontinuity_sequence_number: 0,
            inserted_discontinuity_tag: false,
            previous_segment_end_offset: 0,
            longest_segment_duration: 0.0,
            target_duration: 0,
            target_duration_set: false,
            bandwidth_estimator,
            in_ad_state: false,
            ad_duration: None,
            ad_position: 0.0,
            ad_segments: 0,
            segments_to_be_removed: VecDeque::new(),
        }
    }

    /// The playlist file name relative to the master playlist directory.
    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    /// The rendition name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The rendition group.
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    /// The advertised stream type.
    pub fn stream_type(&self) -> MediaPlaylistStreamType {
        self.stream_type
    }

    /// The stream's media description.
    pub fn media_info(&self) -> &MediaInfo {
        &self.media_info
    }

    /// The rendition language in shortest form.
    pub fn language(&self) -> &str {
        &self.language
    }

    /// The first media sequence number currently in the playlist.
    pub fn media_sequence_number(&self) -> u64 {
        self.media_sequence_number
    }

    /// How many discontinuities were evicted from the window.
    pub fn discontinuity_sequence_number(&self) -> u64 {
        self.discontinuity_sequence_number
    }

    /// Stores the stream description.
    ///
    /// Fails with [`CueError::NoTimescale`] when no time scale is
    /// derivable from the media info.
    pub fn set_media_info(&mut self, media_info: MediaInfo) -> Result<()> {
        let time_scale = media_info.time_scale().unwrap_or(0);
        if time_scale == 0 {
            error!("media info for {} has no valid timescale", self.file_name);
            return Err(CueError::NoTimescale(format!(
                "stream {} carries no time scale",
                self.file_name
            )));
        }

        if let Some(video) = &media_info.video_info {
            self.stream_type = MediaPlaylistStreamType::Video;
            self.codec = video.codec.clone();
        } else if let Some(audio) = &media_info.audio_info {
            self.stream_type = MediaPlaylistStreamType::Audio;
            self.codec = audio.codec.clone();
        } else {
            self.stream_type = MediaPlaylistStreamType::Subtitle;
            self.codec = media_info
                .text_info
                .as_ref()
                .map(|t| t.codec.clone())
                .unwrap_or_default();
        }

        self.time_scale = time_scale;
        self.language = language_to_shortest_form(media_info.language().unwrap_or(""));
        self.use_byte_range = media_info.segment_template.is_none();
        self.characteristics = media_info.hls_characteristics.clone();
        self.media_info = media_info;
        Ok(())
    }

    /// Adds a media segment.
    ///
    /// `start_time` and `duration` are in time scale ticks. For
    /// i-frames-only playlists the buffered key frames expand into one
    /// entry each instead, with durations taken from timestamp deltas.
    pub fn add_segment(
        &mut self,
        file_name: &str,
        start_time: i64,
        duration: i64,
        start_byte_offset: u64,
        size: u64,
    ) {
        if self.stream_type == MediaPlaylistStreamType::VideoIFramesOnly {
            if self.key_frames.is_empty() {
                return;
            }

            if self.time_scale > 0 && (duration as f64 / self.time_scale as f64) < 1.0 {
                warn!("segment duration is less than 1 second; segments are not merged");
            }

            self.adjust_last_segment_info_entry_duration(self.key_frames[0].timestamp);

            while let Some(key_frame) = self.key_frames.pop_front() {
                // The last entry's duration is adjusted again once the next
                // key frame arrives.
                let next_timestamp = self
                    .key_frames
                    .front()
                    .map(|next| next.timestamp)
                    .unwrap_or(start_time + duration);
                self.add_segment_info_entry(
                    file_name,
                    key_frame.timestamp,
                    next_timestamp - key_frame.timestamp,
                    key_frame.start_byte_offset,
                    key_frame.size,
                );
            }
            return;
        }
        self.add_segment_info_entry(file_name, start_time, duration, start_byte_offset, size);
    }

    /// Records a video key frame. The first call flips the playlist to
    /// i-frames-only mode with byte ranges.
    pub fn add_key_frame(&mut self, timestamp: i64, start_byte_offset: u64, size: u64) {
        if self.stream_type != MediaPlaylistStreamType::VideoIFramesOnly {
            if self.stream_type != MediaPlaylistStreamType::Video {
                warn!("i-frames-only playlists apply to video renditions only");
                return;
            }
            self.stream_type = MediaPlaylistStreamType::VideoIFramesOnly;
            self.use_byte_range = true;
        }
        self.key_frames.push_back(KeyFrameInfo {
            timestamp,
            start_byte_offset,
            size,
        });
    }

    /// Adds an `EXT-X-KEY` entry. The first key after unencrypted entries
    /// is preceded by a discontinuity.
    pub fn add_encryption_info(
        &mut self,
        method: EncryptionMethod,
        url: &str,
        key_id: &str,
        iv: &str,
        key_format: &str,
        key_format_versions: &str,
    ) {
        if !self.inserted_discontinuity_tag {
            if !self.entries.is_empty() {
                self.entries.push_back(HlsEntry::Discontinuity);
            }
            self.inserted_discontinuity_tag = true;
        }
        self.entries
            .push_back(HlsEntry::EncryptionInfo(EncryptionInfoEntry {
                method,
                url: url.to_string(),
                key_id: key_id.to_string(),
                iv: iv.to_string(),
                key_format: key_format.to_string(),
                key_format_versions: key_format_versions.to_string(),
            }));
    }

    /// Adds an `#EXT-X-PLACEMENT-OPPORTUNITY` entry.
    pub fn add_placement_opportunity(&mut self) {
        self.entries.push_back(HlsEntry::PlacementOpportunity);
    }

    /// Opens an ad break with an `#EXT-X-SIGNAL-EXIT` entry. Subsequent
    /// segments emit interleaved span tags until the matching return.
    pub fn add_signal_exit(&mut self, exit: SignalExitEntry) {
        self.in_ad_state = true;
        self.ad_duration = exit.duration;
        self.ad_position = 0.0;
        self.ad_segments = 0;
        self.entries.push_back(HlsEntry::SignalExit(exit));
    }

    /// Adds an `#EXT-X-SIGNAL-SPAN` entry carrying the running position.
    pub fn add_signal_span(
        &mut self,
        splice_type: SpliceType,
        position: f64,
        duration: Option<f64>,
    ) {
        self.entries.push_back(HlsEntry::SignalSpan {
            splice_type,
            position,
            duration,
        });
    }

    /// Closes the ad break with an `#EXT-X-SIGNAL-RETURN` entry.
    pub fn add_signal_return(&mut self, splice_type: SpliceType, duration: Option<f64>) {
        self.entries.push_back(HlsEntry::SignalReturn {
            splice_type,
            duration,
        });
        self.in_ad_state = false;
    }

    /// The advertised peak bitrate.
    pub fn max_bitrate(&self) -> u64 {
        if let Some(bandwidth) = self.media_info.bandwidth {
            return bandwidth;
        }
        self.bandwidth_estimator.max()
    }

    /// The windowed average bitrate.
    pub fn avg_bitrate(&self) -> u64 {
        self.bandwidth_estimator.estimate()
    }

    /// The longest segment duration seen so far, in seconds.
    pub fn longest_segment_duration(&self) -> f64 {
        self.longest_segment_duration
    }

    /// Sets the advertised target duration.
    pub fn set_target_duration(&mut self, target_duration: u32) {
        if self.target_duration_set {
            if self.target_duration == target_duration {
                return;
            }
            debug!(
                "updating target duration from {} to {}",
                self.target_duration, target_duration
            );
        }
        self.target_duration = target_duration;
        self.target_duration_set = true;
    }

    /// Renders the playlist content.
    pub fn render(&mut self) -> String {
        if !self.target_duration_set {
            self.set_target_duration(self.longest_segment_duration.ceil() as u32);
        }

        let mut content = self.create_header();
        for entry in &self.entries {
            content.push_str(&entry.render());
            content.push('\n');
        }
        if self.params.playlist_type == HlsPlaylistType::Vod {
            content.push_str("#EXT-X-ENDLIST\n");
        }
        content
    }

    /// Renders the playlist and atomically replaces `file_path`.
    pub fn write_to_file(&mut self, file_path: &Path) -> Result<()> {
        let content = self.render();

        if let Some(parent) = file_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let temp_path = file_path.with_extension("m3u8.tmp");
        fs::write(&temp_path, content)?;
        fs::rename(&temp_path, file_path)?;
        Ok(())
    }

    fn create_header(&self) -> String {
        let mut header = format!(
            "#EXTM3U\n#EXT-X-VERSION:6\n## Generated with {} version {}\n#EXT-X-TARGETDURATION:{}\n",
            crate::PROJECT_URL,
            crate::VERSION,
            self.target_duration
        );

        match self.params.playlist_type {
            HlsPlaylistType::Vod => header.push_str("#EXT-X-PLAYLIST-TYPE:VOD\n"),
            HlsPlaylistType::Event => header.push_str("#EXT-X-PLAYLIST-TYPE:EVENT\n"),
            HlsPlaylistType::Live => {
                if self.media_sequence_number > 0 {
                    let _ = writeln!(
                        header,
                        "#EXT-X-MEDIA-SEQUENCE:{}",
                        self.media_sequence_number
                    );
                }
                if self.discontinuity_sequence_number > 0 {
                    let _ = writeln!(
                        header,
                        "#EXT-X-DISCONTINUITY-SEQUENCE:{}",
                        self.discontinuity_sequence_number
                    );
                }
            }
        }

        if self.stream_type == MediaPlaylistStreamType::VideoIFramesOnly {
            header.push_str("#EXT-X-I-FRAMES-ONLY\n");
        }

        // EXT-X-MAP comes last; the rest of the playlist is about segment
        // and key info.
        if let Some(init_segment_url) = &self.media_info.init_segment_url {
            let mut tag = Tag::new("#EXT-X-MAP", &mut header);
            tag.add_quoted_string("URI", init_segment_url);
            header.push('\n');
        } else if let (Some(media_file_url), Some((begin, end))) =
            (&self.media_info.media_file_url, self.media_info.init_range)
        {
            // Single-segment media only carries EXT-X-MAP when an init
            // range exists.
            let mut tag = Tag::new("#EXT-X-MAP", &mut header);
            tag.add_quoted_string("URI", media_file_url);
            tag.add_quoted_number_pair("BYTERANGE", end - begin + 1, '@', begin);
            header.push('\n');
        }

        header
    }

    fn add_segment_info_entry(
        &mut self,
        segment_file_name: &str,
        start_time: i64,
        duration: i64,
        start_byte_offset: u64,
        size: u64,
    ) {
        if self.time_scale == 0 {
            warn!(
                "timescale is not set; the duration of {} ticks cannot be converted",
                duration
            );
            self.entries.push_back(HlsEntry::SegmentInfo(SegmentInfoEntry {
                file_name: segment_file_name.to_string(),
                start_time: 0.0,
                start_time_ticks: start_time,
                duration: 0.0,
                use_byte_range: self.use_byte_range,
                start_byte_offset,
                segment_file_size: size,
                previous_segment_end_offset: self.previous_segment_end_offset,
            }));
            return;
        }

        let segment_duration_seconds = duration as f64 / self.time_scale as f64;

        // Inside an ad break every segment after the first carries a span
        // tag with the position reached so far.
        if self.in_ad_state {
            if self.ad_segments > 0 {
                self.add_signal_span(SpliceType::LiveDai, self.ad_position, self.ad_duration);
            }
            self.ad_position += segment_duration_seconds;
        }

        let start_time_seconds = start_time as f64 / self.time_scale as f64;
        self.longest_segment_duration = self
            .longest_segment_duration
            .max(segment_duration_seconds);
        self.bandwidth_estimator.add_block(size, segment_duration_seconds);

        self.entries.push_back(HlsEntry::SegmentInfo(SegmentInfoEntry {
            file_name: segment_file_name.to_string(),
            start_time: start_time_seconds,
            start_time_ticks: start_time,
            duration: segment_duration_seconds,
            use_byte_range: self.use_byte_range,
            start_byte_offset,
            segment_file_size: size,
            previous_segment_end_offset: self.previous_segment_end_offset,
        }));
        self.previous_segment_end_offset = start_byte_offset + size - 1;
        self.ad_segments += 1;
        self.slide_window();
    }

    fn adjust_last_segment_info_entry_duration(&mut self, next_timestamp: i64) {
        if self.time_scale == 0 {
            return;
        }
        let next_timestamp_seconds = next_timestamp as f64 / self.time_scale as f64;

        for entry in self.entries.iter_mut().rev() {
            if let HlsEntry::SegmentInfo(segment) = entry {
                segment.duration = next_timestamp_seconds - segment.start_time;
                self.longest_segment_duration =
                    self.longest_segment_duration.max(segment.duration);
                break;
            }
        }
    }

    fn latest_segment_start_time(&self) -> f64 {
        for entry in self.entries.iter().rev() {
            if let HlsEntry::SegmentInfo(segment) = entry {
                return segment.start_time;
            }
        }
        0.0
    }

    fn slide_window(&mut self) {
        if self.params.time_shift_buffer_depth <= 0.0
            || self.params.playlist_type != HlsPlaylistType::Live
        {
            return;
        }

        // The latest segment's start time is the current play time, which
        // keeps the latest segment in the list unconditionally.
        let current_play_time = self.latest_segment_start_time();
        if current_play_time <= self.params.time_shift_buffer_depth {
            return;
        }
        let timeshift_limit = current_play_time - self.params.time_shift_buffer_depth;

        // Keys travel with the segments they apply to: the most recent run
        // of consecutive EXT-X-KEY entries inside the evicted range is
        // reinserted at the head afterwards.
        let mut kept_keys: Vec<HlsEntry> = Vec::new();
        let mut previous_was_key = false;

        loop {
            let stop = match self.entries.front() {
                None => true,
                Some(HlsEntry::SegmentInfo(segment)) => {
                    segment.start_time + segment.duration > timeshift_limit
                }
                Some(_) => false,
            };
            if stop {
                break;
            }

            let entry = self.entries.pop_front().unwrap();
            match &entry {
                HlsEntry::EncryptionInfo(_) => {
                    if !previous_was_key {
                        kept_keys.clear();
                    }
                    kept_keys.push(entry);
                    previous_was_key = true;
                    continue;
                }
                HlsEntry::Discontinuity => {
                    self.discontinuity_sequence_number += 1;
                }
                HlsEntry::SegmentInfo(segment) => {
                    let start_time_ticks = segment.start_time_ticks;
                    self.remove_old_segment(start_time_ticks);
                    self.media_sequence_number += 1;
                }
                // Signal and placement entries leave the window silently.
                _ => {}
            }
            previous_was_key = false;
        }

        for key in kept_keys.into_iter().rev() {
            self.entries.push_front(key);
        }
    }

    fn remove_old_segment(&mut self, start_time_ticks: i64) {
        if self.params.preserved_segments_outside_live_window == 0 {
            return;
        }
        if self.stream_type == MediaPlaylistStreamType::VideoIFramesOnly {
            return;
        }
        let Some(template) = &self.media_info.segment_template else {
            return;
        };

        let segment_name = segment_name_from_template(
            template,
            start_time_ticks,
            self.media_sequence_number,
            self.media_info.bandwidth.unwrap_or(0),
        );
        self.segments_to_be_removed.push_back(segment_name);

        while self.segments_to_be_removed.len()
            > self.params.preserved_segments_outside_live_window
        {
            let stale = self.segments_to_be_removed.pop_front().unwrap();
            debug!("deleting {}", stale);
            if let Err(err) = fs::remove_file(&stale) {
                warn!("failed to delete {}: {}", stale, err);
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn entries(&self) -> &VecDeque<HlsEntry> {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn vod_params() -> HlsParams {
        HlsParams::default()
    }

    fn live_params(depth: f64) -> HlsParams {
        HlsParams {
            playlist_type: HlsPlaylistType::Live,
            time_shift_buffer_depth: depth,
            ..Default::default()
        }
    }

    fn video_media_info() -> MediaInfo {
        MediaInfo {
            video_info: Some(super::super::VideoInfo {
                codec: "avc1.64001f".to_string(),
                time_scale: 90_000,
                width: 1280,
                height: 720,
                frame_duration: 3000,
            }),
            ..Default::default()
        }
    }

    fn playlist(params: HlsParams) -> MediaPlaylist {
        let mut playlist = MediaPlaylist::new(params, "playlist.m3u8", "name", "group");
        playlist.set_media_info(video_media_info()).unwrap();
        playlist
    }

    #[test]
    fn test_no_timescale_rejected() {
        let mut playlist = MediaPlaylist::new(vod_params(), "playlist.m3u8", "name", "group");
        let result = playlist.set_media_info(MediaInfo::default());
        assert!(matches!(result, Err(CueError::NoTimescale(_))));
    }

    #[test]
    fn test_vod_header_with_iframes_and_map() {
        let mut playlist = playlist(vod_params());
        let mut media_info = video_media_info();
        media_info.init_segment_url = Some("init.mp4".to_string());
        playlist.set_media_info(media_info).unwrap();
        playlist.add_key_frame(0, 0, 1000);
        playlist.set_target_duration(10);

        let content = playlist.render();
        let expected_header = format!(
            "#EXTM3U\n#EXT-X-VERSION:6\n## Generated with {} version {}\n\
             #EXT-X-TARGETDURATION:10\n#EXT-X-PLAYLIST-TYPE:VOD\n#EXT-X-I-FRAMES-ONLY\n\
             #EXT-X-MAP:URI=\"init.mp4\"\n",
            crate::PROJECT_URL,
            crate::VERSION
        );
        assert!(
            content.starts_with(&expected_header),
            "header was:\n{}",
            content
        );
        assert!(content.ends_with("#EXT-X-ENDLIST\n"));
    }

    #[test]
    fn test_byte_range_adjacency() {
        let mut playlist = playlist(vod_params());
        // No segment template means byte ranges are on.
        playlist.add_segment("media.mp4", 0, 900_000, 0, 1000);
        playlist.add_segment("media.mp4", 900_000, 900_000, 1000, 1000);
        playlist.add_segment("media.mp4", 1_800_000, 900_000, 2500, 1000);

        let rendered: Vec<String> =
            playlist.entries().iter().map(|e| e.render()).collect();
        // First segment at offset 0: previous end (0) + 1 != 0, so @0.
        assert_eq!(rendered[0], "#EXTINF:10.000,\n#EXT-X-BYTERANGE:1000@0\nmedia.mp4");
        // Adjacent: no @ offset.
        assert_eq!(rendered[1], "#EXTINF:10.000,\n#EXT-X-BYTERANGE:1000\nmedia.mp4");
        // Gap: @ offset returns.
        assert_eq!(
            rendered[2],
            "#EXTINF:10.000,\n#EXT-X-BYTERANGE:1000@2500\nmedia.mp4"
        );
    }

    #[test]
    fn test_live_window_slide() {
        let mut playlist = playlist(live_params(30.0));
        playlist.add_encryption_info(
            EncryptionMethod::SampleAes,
            "skd://key",
            "",
            "",
            "com.apple.streamingkeydelivery",
            "1",
        );
        for i in 0..4i64 {
            playlist.add_segment(
                &format!("seg_{}.ts", i),
                i * 10 * 90_000,
                10 * 90_000,
                0,
                1000,
            );
        }

        // Latest start = 30s, depth 30 -> nothing evicted yet.
        assert_eq!(playlist.media_sequence_number(), 0);

        playlist.add_segment("seg_4.ts", 4 * 10 * 90_000, 10 * 90_000, 0, 1000);
        // Latest start = 40s, limit = 10s: the first segment (0..10s) goes.
        assert_eq!(playlist.media_sequence_number(), 1);

        // The key survived at the head.
        assert!(matches!(
            playlist.entries().front(),
            Some(HlsEntry::EncryptionInfo(_))
        ));
        // And the discontinuity that preceded it was NOT emitted (the key
        // came first in this playlist, so no discontinuity was inserted).
        assert_eq!(playlist.discontinuity_sequence_number(), 0);

        let header = playlist.render();
        assert!(header.contains("#EXT-X-MEDIA-SEQUENCE:1\n"));
    }

    #[test]
    fn test_discontinuity_sequence_counts_evictions() {
        let mut playlist = playlist(live_params(15.0));
        playlist.add_segment("seg_0.ts", 0, 10 * 90_000, 0, 1000);
        // A key after existing entries inserts a discontinuity first.
        playlist.add_encryption_info(EncryptionMethod::Aes128, "key.bin", "", "", "", "");
        playlist.add_segment("seg_1.ts", 10 * 90_000, 10 * 90_000, 0, 1000);
        playlist.add_segment("seg_2.ts", 20 * 90_000, 10 * 90_000, 0, 1000);
        playlist.add_segment("seg_3.ts", 30 * 90_000, 10 * 90_000, 0, 1000);

        // Limit = 30 - 15 = 15s: seg_0 (0..10) evicted along with the
        // discontinuity; the key is reinserted at the head.
        assert_eq!(playlist.media_sequence_number(), 1);
        assert_eq!(playlist.discontinuity_sequence_number(), 1);
        assert!(matches!(
            playlist.entries().front(),
            Some(HlsEntry::EncryptionInfo(_))
        ));

        let header = playlist.render();
        assert!(header.contains("#EXT-X-DISCONTINUITY-SEQUENCE:1\n"));
    }

    #[test]
    fn test_window_bound_invariant() {
        let depth = 25.0;
        let mut playlist = playlist(live_params(depth));
        let segment_duration = 10.0;
        for i in 0..20i64 {
            playlist.add_segment(
                &format!("seg_{}.ts", i),
                i * 10 * 90_000,
                10 * 90_000,
                0,
                1000,
            );
        }

        let front_start = playlist
            .entries()
            .iter()
            .find_map(|e| match e {
                HlsEntry::SegmentInfo(s) => Some(s.start_time),
                _ => None,
            })
            .unwrap();
        let latest_start = playlist.latest_segment_start_time();
        assert!(latest_start - front_start <= depth + segment_duration);
    }

    #[test]
    fn test_iframes_only_expansion() {
        let mut playlist = playlist(vod_params());
        playlist.add_key_frame(0, 0, 400);
        playlist.add_key_frame(3 * 90_000, 5000, 400);
        assert_eq!(playlist.stream_type(), MediaPlaylistStreamType::VideoIFramesOnly);

        // The 10s segment holds both key frames; the second runs to the
        // end of the segment.
        playlist.add_segment("seg_0.mp4", 0, 10 * 90_000, 0, 20_000);

        let segments: Vec<&SegmentInfoEntry> = playlist
            .entries()
            .iter()
            .filter_map(|e| match e {
                HlsEntry::SegmentInfo(s) => Some(s),
                _ => None,
            })
            .collect();
        assert_eq!(segments.len(), 2);
        assert_eq!(segments[0].duration, 3.0);
        assert_eq!(segments[1].duration, 7.0);
        assert!(segments[0].use_byte_range);

        // The next segment's first key frame fixes up the tail duration.
        playlist.add_key_frame(10 * 90_000, 0, 400);
        playlist.add_segment("seg_1.mp4", 10 * 90_000, 10 * 90_000, 0, 20_000);
        let last_of_first: Vec<f64> = playlist
            .entries()
            .iter()
            .filter_map(|e| match e {
                HlsEntry::SegmentInfo(s) => Some(s.duration),
                _ => None,
            })
            .collect();
        assert_eq!(last_of_first[1], 7.0);
    }

    #[test]
    fn test_ad_break_span_interleaving() {
        let mut playlist = playlist(vod_params());
        playlist.add_segment("seg_0.mp4", 0, 5 * 90_000, 0, 1000);

        let mut exit = SignalExitEntry::new(SpliceType::LiveDai, Some(30.0));
        exit.event_id = Some(0x12345679);
        exit.upid = vec![0x08, 0x08, 1, 2, 3, 4, 5, 6, 7, 9];
        exit.segmentation_type_id = Some(0x34);
        playlist.add_signal_exit(exit);

        playlist.add_segment("seg_1.mp4", 5 * 90_000, 5 * 90_000, 1000, 1000);
        playlist.add_segment("seg_2.mp4", 10 * 90_000, 5 * 90_000, 2000, 1000);
        playlist.add_signal_return(SpliceType::LiveDai, Some(30.0));
        playlist.add_segment("seg_3.mp4", 15 * 90_000, 5 * 90_000, 3000, 1000);

        let rendered: Vec<String> =
            playlist.entries().iter().map(|e| e.render()).collect();
        assert_eq!(
            rendered[1],
            "#EXT-X-SIGNAL-EXIT:30.000,SpliceType=LiveDAI,segmentationEventId=305419897,\
             segmentationUpid=CAgBAgMEBQYHCQ==,segmentationTypeId=52"
        );
        // First in-ad segment has no span; the second does, at 5 seconds.
        assert!(rendered[2].starts_with("#EXTINF"));
        assert_eq!(rendered[3], "#EXT-X-SIGNAL-SPAN:5.000/30.000,SpliceType=LiveDAI");
        assert!(rendered[4].starts_with("#EXTINF"));
        assert_eq!(rendered[5], "#EXT-X-SIGNAL-RETURN:30.000,SpliceType=LiveDAI");
        // After the return, no more spans.
        assert!(rendered[6].starts_with("#EXTINF"));
    }

    #[test]
    fn test_write_idempotence() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("playlist.m3u8");

        let mut playlist = playlist(vod_params());
        playlist.add_segment("seg_0.mp4", 0, 10 * 90_000, 0, 1000);
        playlist.write_to_file(&path).unwrap();
        let first = fs::read(&path).unwrap();
        playlist.write_to_file(&path).unwrap();
        let second = fs::read(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_placement_opportunity() {
        let mut playlist = playlist(vod_params());
        playlist.add_placement_opportunity();
        assert_eq!(
            playlist.entries().front().unwrap().render(),
            "#EXT-X-PLACEMENT-OPPORTUNITY"
        );
    }

    #[test]
    fn test_zero_duration_segment() {
        let mut playlist = playlist(vod_params());
        playlist.add_segment("seg.mp4", 0, 0, 0, 500);
        let rendered = playlist.entries().front().unwrap().render();
        assert!(rendered.starts_with("#EXTINF:0.000,"));
    }
}
