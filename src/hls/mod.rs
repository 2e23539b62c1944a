//! # HLS Media Playlist Generation
//!
//! This module maintains per-stream M3U8 media playlists for a packaging
//! pipeline:
//!
//! - [`MediaPlaylist`]: ordered playlist entries, deterministic
//!   serialization, and live sliding-window eviction
//! - [`SimpleHlsNotifier`]: the event-driven surface the muxer layer
//!   drives: new streams, segments, key frames, cue events, and
//!   encryption updates
//! - [`HlsParams`]: the packaging options that shape playlist output
//!
//! Master playlist composition is out of scope; only the per-stream media
//! playlists are produced here.

/// Bandwidth estimation for HLS variant selection.
pub mod bandwidth;
/// Notification hooks fired on playlist changes.
pub mod notifier;
/// Media playlist construction and serialization.
pub mod playlist;
/// HLS playlist tag types and formatting.
pub mod tag;

pub use bandwidth::BandwidthEstimator;
pub use notifier::{HlsNotifier, SimpleHlsNotifier};
pub use playlist::{HlsEntry, MediaPlaylist, MediaPlaylistStreamType};
pub use tag::Tag;

/// The playlist mode, which drives header tags and window behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HlsPlaylistType {
    /// Complete presentation; gets `#EXT-X-PLAYLIST-TYPE:VOD` and ENDLIST
    Vod,
    /// Append-only live presentation with a growing playlist
    Event,
    /// Live presentation with a sliding time-shift window
    Live,
}

/// EXT-X-KEY encryption method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncryptionMethod {
    /// No encryption
    None,
    /// Whole-segment AES-128 CBC
    Aes128,
    /// SAMPLE-AES (cbcs)
    SampleAes,
    /// SAMPLE-AES-CTR (cenc)
    SampleAesCenc,
}

impl EncryptionMethod {
    /// The METHOD attribute value.
    pub fn as_attribute(&self) -> &'static str {
        match self {
            EncryptionMethod::None => "NONE",
            EncryptionMethod::Aes128 => "AES-128",
            EncryptionMethod::SampleAes => "SAMPLE-AES",
            EncryptionMethod::SampleAesCenc => "SAMPLE-AES-CTR",
        }
    }
}

/// The splice signalling dialect for ad-break tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpliceType {
    /// Live dynamic ad insertion
    LiveDai,
    /// Alternate content signalling
    Altcon,
}

impl SpliceType {
    /// The SpliceType attribute value.
    pub fn as_attribute(&self) -> &'static str {
        match self {
            SpliceType::LiveDai => "LiveDAI",
            SpliceType::Altcon => "ALTCON",
        }
    }
}

/// Packaging options recognized by the playlist layer.
#[derive(Debug, Clone)]
pub struct HlsParams {
    /// Playlist mode
    pub playlist_type: HlsPlaylistType,
    /// Target segment duration in seconds; sizes the bandwidth estimator
    /// window
    pub target_segment_duration: f64,
    /// Live eviction horizon in seconds; zero or negative disables the
    /// sliding window
    pub time_shift_buffer_depth: f64,
    /// How many evicted segments stay on disk before being unlinked
    pub preserved_segments_outside_live_window: usize,
    /// Prefix prepended to segment URLs after rebasing
    pub base_url: String,
    /// Path of the master playlist; its directory rebases absolute segment
    /// paths
    pub master_playlist_output: String,
    /// Default EXT-X-KEY URI for FairPlay and identity key systems
    pub key_uri: String,
    /// Emit the additional legacy `com.widevine` EXT-X-KEY entry
    pub enable_legacy_widevine_hls_signaling: bool,
}

impl Default for HlsParams {
    fn default() -> Self {
        Self {
            playlist_type: HlsPlaylistType::Vod,
            target_segment_duration: 10.0,
            time_shift_buffer_depth: 0.0,
            preserved_segments_outside_live_window: 0,
            base_url: String::new(),
            master_playlist_output: String::new(),
            key_uri: String::new(),
            enable_legacy_widevine_hls_signaling: false,
        }
    }
}

/// Video stream description.
#[derive(Debug, Clone, Default)]
pub struct VideoInfo {
    /// RFC 6381 codec string
    pub codec: String,
    /// Ticks per second
    pub time_scale: u32,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Duration of one frame in time scale ticks
    pub frame_duration: i64,
}

/// Audio stream description.
#[derive(Debug, Clone, Default)]
pub struct AudioInfo {
    /// RFC 6381 codec string
    pub codec: String,
    /// Ticks per second
    pub time_scale: u32,
    /// BCP-47 language
    pub language: String,
    /// Channel count
    pub num_channels: u32,
}

/// Text stream description.
#[derive(Debug, Clone, Default)]
pub struct TextInfo {
    /// Codec/format name
    pub codec: String,
    /// Ticks per second
    pub time_scale: u32,
    /// BCP-47 language
    pub language: String,
}

/// Everything the playlist layer needs to know about one stream.
#[derive(Debug, Clone, Default)]
pub struct MediaInfo {
    /// Set when the stream carries video
    pub video_info: Option<VideoInfo>,
    /// Set when the stream carries audio
    pub audio_info: Option<AudioInfo>,
    /// Set when the stream carries text
    pub text_info: Option<TextInfo>,
    /// Overrides the per-track time scale when present
    pub reference_time_scale: Option<u32>,
    /// Advertised bandwidth; overrides the estimator
    pub bandwidth: Option<u64>,
    /// URL of the init segment, already rebased by the notifier
    pub init_segment_url: Option<String>,
    /// URL of the single media file for non-templated output
    pub media_file_url: Option<String>,
    /// Inclusive byte range of the init data inside the media file
    pub init_range: Option<(u64, u64)>,
    /// Segment naming template with `$Number$`/`$Time$`/`$Bandwidth$`
    pub segment_template: Option<String>,
    /// HLS CHARACTERISTICS values
    pub hls_characteristics: Vec<String>,
    /// Protection scheme, `cenc` or `cbcs`, when encrypted
    pub protection_scheme: Option<String>,
}

impl MediaInfo {
    /// The effective time scale for this stream, if any is derivable.
    pub fn time_scale(&self) -> Option<u32> {
        if let Some(time_scale) = self.reference_time_scale {
            return Some(time_scale);
        }
        if let Some(video) = &self.video_info {
            return Some(video.time_scale);
        }
        if let Some(audio) = &self.audio_info {
            return Some(audio.time_scale);
        }
        self.text_info.as_ref().map(|text| text.time_scale)
    }

    /// The stream language, if the stream kind carries one.
    pub fn language(&self) -> Option<&str> {
        if let Some(audio) = &self.audio_info {
            return Some(&audio.language);
        }
        self.text_info.as_ref().map(|text| text.language.as_str())
    }
}

/// Maps an ISO 639-2 language to its shortest BCP-47 form, keeping any
/// region or variant subtags intact.
pub fn language_to_shortest_form(language: &str) -> String {
    if language.is_empty() {
        return String::new();
    }
    let mut parts = language.splitn(2, '-');
    let primary = parts.next().unwrap_or("").to_ascii_lowercase();
    let rest = parts.next();

    let short = match primary.as_str() {
        "eng" => "en",
        "fra" | "fre" => "fr",
        "deu" | "ger" => "de",
        "spa" => "es",
        "ita" => "it",
        "por" => "pt",
        "rus" => "ru",
        "jpn" => "ja",
        "kor" => "ko",
        "zho" | "chi" => "zh",
        "nld" | "dut" => "nl",
        "swe" => "sv",
        "nor" => "no",
        "dan" => "da",
        "fin" => "fi",
        "pol" => "pl",
        "tur" => "tr",
        "ara" => "ar",
        "hin" => "hi",
        "ukr" => "uk",
        other => other,
    };

    match rest {
        Some(rest) => format!("{}-{}", short, rest),
        None => short.to_string(),
    }
}

/// Expands a segment-name template.
///
/// Supports `$Number$`, `$Time$`, and `$Bandwidth$` identifiers with
/// optional zero-padded width forms such as `$Number%05d$`; `$$` renders a
/// literal dollar sign.
pub fn segment_name_from_template(
    template: &str,
    time: i64,
    segment_index: u64,
    bandwidth: u64,
) -> String {
    let mut out = String::with_capacity(template.len() + 8);
    let mut rest = template;

    while let Some(start) = rest.find('$') {
        out.push_str(&rest[..start]);
        rest = &rest[start + 1..];
        let Some(end) = rest.find('$') else {
            // Unterminated identifier; emit as-is.
            out.push('$');
            break;
        };
        let identifier = &rest[..end];
        rest = &rest[end + 1..];

        if identifier.is_empty() {
            out.push('$');
            continue;
        }

        let (name, width) = match identifier.find('%') {
            Some(pos) => {
                let format = &identifier[pos + 1..];
                let width = format
                    .strip_prefix('0')
                    .and_then(|f| f.strip_suffix('d'))
                    .and_then(|digits| digits.parse::<usize>().ok())
                    .unwrap_or(0);
                (&identifier[..pos], width)
            }
            None => (identifier, 0),
        };

        let value = match name {
            "Number" => segment_index as i64,
            "Time" => time,
            "Bandwidth" => bandwidth as i64,
            _ => {
                // Unknown identifier; keep it verbatim.
                out.push('$');
                out.push_str(identifier);
                out.push('$');
                continue;
            }
        };
        out.push_str(&format!("{:0width$}", value, width = width));
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_language_shortening() {
        assert_eq!(language_to_shortest_form("eng"), "en");
        assert_eq!(language_to_shortest_form("en"), "en");
        assert_eq!(language_to_shortest_form("fre"), "fr");
        assert_eq!(language_to_shortest_form("eng-US"), "en-US");
        assert_eq!(language_to_shortest_form("xyz"), "xyz");
        assert_eq!(language_to_shortest_form(""), "");
    }

    #[test]
    fn test_media_info_time_scale() {
        let mut info = MediaInfo::default();
        assert_eq!(info.time_scale(), None);

        info.audio_info = Some(AudioInfo {
            time_scale: 48_000,
            ..Default::default()
        });
        assert_eq!(info.time_scale(), Some(48_000));

        info.reference_time_scale = Some(90_000);
        assert_eq!(info.time_scale(), Some(90_000));
    }

    #[test]
    fn test_segment_template() {
        assert_eq!(
            segment_name_from_template("seg_$Number$.ts", 0, 7, 0),
            "seg_7.ts"
        );
        assert_eq!(
            segment_name_from_template("seg_$Number%05d$.m4s", 0, 42, 0),
            "seg_00042.m4s"
        );
        assert_eq!(
            segment_name_from_template("media_$Time$_$Bandwidth$.ts", 900_000, 1, 128_000),
            "media_900000_128000.ts"
        );
        assert_eq!(segment_name_from_template("price$$.ts", 0, 0, 0), "price$.ts");
    }
}
