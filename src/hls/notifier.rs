use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine as _;
use log::{debug, info, warn};

use super::playlist::{MediaPlaylist, SignalExitEntry};
use super::{EncryptionMethod, HlsParams, HlsPlaylistType, MediaInfo, SpliceType};
use crate::chunking::CueEvent;
use crate::error::{CueError, Result};

/// Widevine DRM system ID.
pub const WIDEVINE_SYSTEM_ID: [u8; 16] = [
    0xed, 0xef, 0x8b, 0xa9, 0x79, 0xd6, 0x4a, 0xce, 0xa3, 0xc8, 0x27, 0xdc, 0xd5, 0x1d, 0x21,
    0xed,
];

/// W3C common (clear key) system ID.
pub const COMMON_SYSTEM_ID: [u8; 16] = [
    0x10, 0x77, 0xef, 0xec, 0xc0, 0xb2, 0x4d, 0x02, 0xac, 0xe3, 0x3c, 0x1e, 0x52, 0xe2, 0xfb,
    0x4b,
];

/// Apple FairPlay system ID.
pub const FAIRPLAY_SYSTEM_ID: [u8; 16] = [
    0x29, 0x70, 0x1f, 0xe4, 0x3c, 0xc7, 0x4a, 0x34, 0x8c, 0x5b, 0xae, 0x90, 0xc7, 0x43, 0x9a,
    0x47,
];

/// The event surface the muxer layer drives to keep playlists current.
pub trait HlsNotifier: Send {
    /// Initializes the notifier.
    fn init(&mut self) -> Result<()>;

    /// Registers a stream and returns its id for subsequent calls.
    fn notify_new_stream(
        &mut self,
        media_info: MediaInfo,
        playlist_name: &str,
        stream_name: &str,
        group_id: &str,
    ) -> Result<u32>;

    /// Adds a finished segment. Times are in the stream's time scale.
    fn notify_new_segment(
        &mut self,
        stream_id: u32,
        segment_name: &str,
        start_time: i64,
        duration: i64,
        start_byte_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Records a video key frame for i-frames-only playlists.
    fn notify_key_frame(
        &mut self,
        stream_id: u32,
        timestamp: i64,
        start_byte_offset: u64,
        size: u64,
    ) -> Result<()>;

    /// Records a cue event. Without a cue payload a placement opportunity
    /// is emitted.
    fn notify_cue_event(
        &mut self,
        stream_id: u32,
        timestamp: i64,
        cue: Option<&CueEvent>,
    ) -> Result<()>;

    /// Updates the stream's encryption info from DRM material.
    fn notify_encryption_update(
        &mut self,
        stream_id: u32,
        key_id: &[u8],
        system_id: &[u8],
        iv: &[u8],
        protection_system_specific_data: &[u8],
    ) -> Result<()>;

    /// Writes out all playlists.
    fn flush(&mut self) -> Result<()>;
}

/// File-writing [`HlsNotifier`] maintaining one [`MediaPlaylist`] per
/// registered stream.
pub struct SimpleHlsNotifier {
    params: HlsParams,
    output_dir: PathBuf,
    playlists: BTreeMap<u32, MediaPlaylist>,
    next_stream_id: u32,
}

impl SimpleHlsNotifier {
    /// Creates a notifier for the given packaging options.
    pub fn new(params: HlsParams) -> Self {
        let output_dir = Path::new(&params.master_playlist_output)
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Self {
            params,
            output_dir,
            playlists: BTreeMap::new(),
            next_stream_id: 0,
        }
    }

    /// The packaging options.
    pub fn params(&self) -> &HlsParams {
        &self.params
    }

    /// Read access to a registered playlist.
    pub fn playlist(&self, stream_id: u32) -> Option<&MediaPlaylist> {
        self.playlists.get(&stream_id)
    }

    /// Rebases a segment or init-segment path into a playlist URI.
    ///
    /// When the master playlist's directory prefixes the path, the prefix
    /// is stripped. A non-empty base URL is then prepended verbatim (a
    /// doubled slash is kept as-is); with no base URL the path is made
    /// relative to the media playlist's own directory instead.
    fn rebase_url(&self, path: &str, playlist_name: &str) -> String {
        let output_dir = self.output_dir.to_string_lossy();
        let stripped = if !output_dir.is_empty() {
            let prefix = format!("{}/", output_dir.trim_end_matches('/'));
            path.strip_prefix(&prefix).unwrap_or(path)
        } else {
            path
        };

        if !self.params.base_url.is_empty() {
            return format!("{}{}", self.params.base_url, stripped);
        }

        match Path::new(playlist_name).parent() {
            Some(parent) if !parent.as_os_str().is_empty() => {
                let playlist_dir = format!("{}/", parent.to_string_lossy());
                stripped
                    .strip_prefix(playlist_dir.as_str())
                    .unwrap_or(stripped)
                    .to_string()
            }
            _ => stripped.to_string(),
        }
    }

    fn playlist_mut(&mut self, stream_id: u32) -> Result<&mut MediaPlaylist> {
        self.playlists.get_mut(&stream_id).ok_or_else(|| {
            CueError::InvalidStream(format!("no stream with id {}", stream_id))
        })
    }

    fn target_duration(&self) -> u32 {
        self.playlists
            .values()
            .map(|p| p.longest_segment_duration().ceil() as u32)
            .max()
            .unwrap_or(0)
    }

    fn write_all_playlists(&mut self) -> Result<()> {
        let target_duration = self.target_duration();
        let output_dir = self.output_dir.clone();
        for playlist in self.playlists.values_mut() {
            playlist.set_target_duration(target_duration);
            let path = output_dir.join(playlist.file_name());
            playlist.write_to_file(&path)?;
        }
        Ok(())
    }
}

impl HlsNotifier for SimpleHlsNotifier {
    fn init(&mut self) -> Result<()> {
        info!(
            "hls notifier ready; media playlists go to {}",
            self.output_dir.display()
        );
        Ok(())
    }

    fn notify_new_stream(
        &mut self,
        mut media_info: MediaInfo,
        playlist_name: &str,
        stream_name: &str,
        group_id: &str,
    ) -> Result<u32> {
        let stream_id = self.next_stream_id;

        let stream_name = if stream_name.is_empty() {
            format!("stream_{}", stream_id)
        } else {
            stream_name.to_string()
        };

        if let Some(init_segment_url) = media_info.init_segment_url.take() {
            media_info.init_segment_url =
                Some(self.rebase_url(&init_segment_url, playlist_name));
        }

        let mut playlist =
            MediaPlaylist::new(self.params.clone(), playlist_name, &stream_name, group_id);
        playlist.set_media_info(media_info)?;

        self.playlists.insert(stream_id, playlist);
        self.next_stream_id += 1;
        debug!("registered stream {} -> {}", stream_id, playlist_name);
        Ok(stream_id)
    }

    fn notify_new_segment(
        &mut self,
        stream_id: u32,
        segment_name: &str,
        start_time: i64,
        duration: i64,
        start_byte_offset: u64,
        size: u64,
    ) -> Result<()> {
        let playlist_name = self
            .playlists
            .get(&stream_id)
            .map(|p| p.file_name().to_string())
            .ok_or_else(|| {
                CueError::InvalidStream(format!("no stream with id {}", stream_id))
            })?;
        let rebased = self.rebase_url(segment_name, &playlist_name);

        let playlist = self.playlist_mut(stream_id)?;
        playlist.add_segment(&rebased, start_time, duration, start_byte_offset, size);

        // Live playlists refresh as soon as the segment lands.
        if self.params.playlist_type == HlsPlaylistType::Live {
            self.write_all_playlists()?;
        }
        Ok(())
    }

    fn notify_key_frame(
        &mut self,
        stream_id: u32,
        timestamp: i64,
        start_byte_offset: u64,
        size: u64,
    ) -> Result<()> {
        self.playlist_mut(stream_id)?
            .add_key_frame(timestamp, start_byte_offset, size);
        Ok(())
    }

    fn notify_cue_event(
        &mut self,
        stream_id: u32,
        timestamp: i64,
        cue: Option<&CueEvent>,
    ) -> Result<()> {
        debug!("cue event on stream {} at {}", stream_id, timestamp);
        let playlist = self.playlist_mut(stream_id)?;

        let Some(cue) = cue else {
            playlist.add_placement_opportunity();
            return Ok(());
        };

        if cue.is_ad_start() {
            let descriptor = cue
                .splice_info
                .as_deref()
                .and_then(|section| section.segmentation());
            let mut exit = SignalExitEntry::new(
                SpliceType::LiveDai,
                (cue.duration_in_seconds > 0.0).then_some(cue.duration_in_seconds),
            );
            if let Some(descriptor) = descriptor {
                exit.event_id = Some(descriptor.segmentation_event_id);
                exit.upid = descriptor.upid_bytes();
                exit.segmentation_type_id = Some(descriptor.segmentation_type_id);
                exit.restrictions = descriptor.delivery_restrictions;
            }
            playlist.add_signal_exit(exit);
        } else if cue.is_ad_end() {
            playlist.add_signal_return(
                SpliceType::LiveDai,
                (cue.duration_in_seconds > 0.0).then_some(cue.duration_in_seconds),
            );
        } else {
            playlist.add_placement_opportunity();
        }
        Ok(())
    }

    fn notify_encryption_update(
        &mut self,
        stream_id: u32,
        key_id: &[u8],
        system_id: &[u8],
        iv: &[u8],
        protection_system_specific_data: &[u8],
    ) -> Result<()> {
        let key_uri = self.params.key_uri.clone();
        let legacy_widevine = self.params.enable_legacy_widevine_hls_signaling;
        let playlist = self.playlist_mut(stream_id)?;

        let method = match playlist.media_info().protection_scheme.as_deref() {
            Some("cenc") => EncryptionMethod::SampleAesCenc,
            _ => EncryptionMethod::SampleAes,
        };
        let iv_hex = if iv.is_empty() {
            String::new()
        } else {
            format!("0x{}", hex_encode(iv))
        };

        if system_id == &FAIRPLAY_SYSTEM_ID[..] {
            // FairPlay never carries IV or KEYID in the playlist; the key
            // server supplies both.
            playlist.add_encryption_info(
                EncryptionMethod::SampleAes,
                &key_uri,
                "",
                "",
                "com.apple.streamingkeydelivery",
                "1",
            );
            return Ok(());
        }

        if system_id == &WIDEVINE_SYSTEM_ID[..] {
            let data_uri = format!(
                "data:text/plain;base64,{}",
                BASE64_STANDARD.encode(protection_system_specific_data)
            );
            let key_id_hex = if key_id.is_empty() {
                String::new()
            } else {
                format!("0x{}", hex_encode(key_id))
            };
            playlist.add_encryption_info(
                method,
                &data_uri,
                &key_id_hex,
                &iv_hex,
                "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed",
                "1",
            );
            if legacy_widevine {
                playlist.add_encryption_info(
                    method,
                    &data_uri,
                    &key_id_hex,
                    &iv_hex,
                    "com.widevine",
                    "1",
                );
            }
            return Ok(());
        }

        if system_id != &COMMON_SYSTEM_ID[..] {
            warn!(
                "unrecognized DRM system id {}; signalling with identity key format",
                hex_encode(system_id)
            );
        }
        let url = if !key_uri.is_empty() {
            key_uri
        } else {
            format!(
                "data:text/plain;base64,{}",
                BASE64_STANDARD.encode(key_id)
            )
        };
        playlist.add_encryption_info(method, &url, "", &iv_hex, "identity", "");
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.write_all_playlists()
    }
}

fn hex_encode(data: &[u8]) -> String {
    let mut out = String::with_capacity(data.len() * 2);
    for byte in data {
        let _ = std::fmt::Write::write_fmt(&mut out, format_args!("{:02x}", byte));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hls::playlist::HlsEntry;
    use crate::hls::AudioInfo;
    use pretty_assertions::assert_eq;

    fn audio_media_info() -> MediaInfo {
        MediaInfo {
            audio_info: Some(AudioInfo {
                codec: "mp4a.40.2".to_string(),
                time_scale: 90_000,
                language: "eng".to_string(),
                num_channels: 2,
            }),
            ..Default::default()
        }
    }

    fn notifier_with_prefix() -> SimpleHlsNotifier {
        SimpleHlsNotifier::new(HlsParams {
            base_url: "http://testprefix.com/".to_string(),
            master_playlist_output: "anything/master.m3u8".to_string(),
            ..Default::default()
        })
    }

    #[test]
    fn test_rebase_strips_output_dir_and_prepends_base_url() {
        let mut notifier = notifier_with_prefix();
        let stream_id = notifier
            .notify_new_stream(audio_media_info(), "playlist.m3u8", "name", "group")
            .unwrap();
        notifier
            .notify_new_segment(stream_id, "anything/path/to/media1.ts", 0, 90_000, 0, 1000)
            .unwrap();

        let playlist = notifier.playlist(stream_id).unwrap();
        let rendered = playlist.entries().back().unwrap().render();
        assert!(rendered.ends_with("http://testprefix.com/path/to/media1.ts"));
    }

    #[test]
    fn test_rebase_keeps_foreign_absolute_path() {
        let notifier = notifier_with_prefix();
        assert_eq!(
            notifier.rebase_url("/var/somewhereelse/media1.ts", "playlist.m3u8"),
            "http://testprefix.com//var/somewhereelse/media1.ts"
        );
    }

    #[test]
    fn test_rebase_relative_to_playlist_without_base_url() {
        let notifier = SimpleHlsNotifier::new(HlsParams {
            master_playlist_output: "anything/master.m3u8".to_string(),
            ..Default::default()
        });
        assert_eq!(
            notifier.rebase_url("anything/video/path/to/media1.m4s", "video/playlist.m3u8"),
            "path/to/media1.m4s"
        );
    }

    #[test]
    fn test_rebase_init_segment() {
        let mut notifier = notifier_with_prefix();
        let mut media_info = audio_media_info();
        media_info.init_segment_url = Some("anything/path/to/init.mp4".to_string());
        let stream_id = notifier
            .notify_new_stream(media_info, "playlist.m3u8", "name", "group")
            .unwrap();
        assert_eq!(
            notifier
                .playlist(stream_id)
                .unwrap()
                .media_info()
                .init_segment_url
                .as_deref(),
            Some("http://testprefix.com/path/to/init.mp4")
        );
    }

    #[test]
    fn test_unknown_stream_rejected() {
        let mut notifier = notifier_with_prefix();
        assert!(matches!(
            notifier.notify_new_segment(7, "anything", 0, 0, 0, 0),
            Err(CueError::InvalidStream(_))
        ));
        assert!(matches!(
            notifier.notify_encryption_update(7, &[], &COMMON_SYSTEM_ID, &[], &[]),
            Err(CueError::InvalidStream(_))
        ));
    }

    #[test]
    fn test_identity_encryption_update() {
        let mut notifier = notifier_with_prefix();
        let stream_id = notifier
            .notify_new_stream(audio_media_info(), "playlist.m3u8", "name", "group")
            .unwrap();

        let key_id = vec![0x23u8; 16];
        let iv = vec![0x45u8; 16];
        notifier
            .notify_encryption_update(stream_id, &key_id, &COMMON_SYSTEM_ID, &iv, &[0x70; 10])
            .unwrap();

        let rendered = notifier
            .playlist(stream_id)
            .unwrap()
            .entries()
            .back()
            .unwrap()
            .render();
        let expected_uri = format!(
            "data:text/plain;base64,{}",
            BASE64_STANDARD.encode(&key_id)
        );
        assert_eq!(
            rendered,
            format!(
                "#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"{}\",\
                 IV=0x45454545454545454545454545454545,KEYFORMAT=\"identity\"",
                expected_uri
            )
        );
    }

    #[test]
    fn test_fairplay_encryption_update() {
        let mut notifier = SimpleHlsNotifier::new(HlsParams {
            key_uri: "skd://testing".to_string(),
            master_playlist_output: "anything/master.m3u8".to_string(),
            ..Default::default()
        });
        let stream_id = notifier
            .notify_new_stream(audio_media_info(), "playlist.m3u8", "name", "group")
            .unwrap();

        notifier
            .notify_encryption_update(stream_id, &[0x12; 16], &FAIRPLAY_SYSTEM_ID, &[], &[0x70; 10])
            .unwrap();

        let rendered = notifier
            .playlist(stream_id)
            .unwrap()
            .entries()
            .back()
            .unwrap()
            .render();
        assert_eq!(
            rendered,
            "#EXT-X-KEY:METHOD=SAMPLE-AES,URI=\"skd://testing\",\
             KEYFORMATVERSIONS=\"1\",KEYFORMAT=\"com.apple.streamingkeydelivery\""
        );
    }

    #[test]
    fn test_widevine_legacy_signaling_flag() {
        for legacy in [false, true] {
            let mut notifier = SimpleHlsNotifier::new(HlsParams {
                enable_legacy_widevine_hls_signaling: legacy,
                master_playlist_output: "anything/master.m3u8".to_string(),
                ..Default::default()
            });
            let mut media_info = audio_media_info();
            media_info.protection_scheme = Some("cenc".to_string());
            let stream_id = notifier
                .notify_new_stream(media_info, "playlist.m3u8", "name", "group")
                .unwrap();

            notifier
                .notify_encryption_update(
                    stream_id,
                    &[0x11; 16],
                    &WIDEVINE_SYSTEM_ID,
                    &[0x45; 16],
                    &[0x70; 10],
                )
                .unwrap();

            let key_entries = notifier
                .playlist(stream_id)
                .unwrap()
                .entries()
                .iter()
                .filter(|e| matches!(e, HlsEntry::EncryptionInfo(_)))
                .count();
            assert_eq!(key_entries, if legacy { 2 } else { 1 });

            let first_key = notifier
                .playlist(stream_id)
                .unwrap()
                .entries()
                .iter()
                .find_map(|e| match e {
                    HlsEntry::EncryptionInfo(key) => Some(key.clone()),
                    _ => None,
                })
                .unwrap();
            assert_eq!(first_key.method, EncryptionMethod::SampleAesCenc);
            assert_eq!(
                first_key.key_format,
                "urn:uuid:edef8ba9-79d6-4ace-a3c8-27dcd51d21ed"
            );
        }
    }

    #[test]
    fn test_cue_event_mapping() {
        use crate::scte35::{
            SegmentationDescriptor, SpliceCommand, SpliceInfoSection, SpliceTime,
        };
        use std::sync::Arc;

        let mut notifier = notifier_with_prefix();
        let stream_id = notifier
            .notify_new_stream(audio_media_info(), "playlist.m3u8", "name", "group")
            .unwrap();

        // A null cue is a placement opportunity.
        notifier.notify_cue_event(stream_id, 12345, None).unwrap();

        let start_section = Arc::new(
            SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(90_000)))
                .with_descriptor(SegmentationDescriptor {
                    segmentation_event_id: 42,
                    segmentation_type_id: 0x34,
                    ..Default::default()
                }),
        );
        let start = CueEvent::scte35(1.0, 30.0, start_section.clone());
        notifier
            .notify_cue_event(stream_id, 90_000, Some(&start))
            .unwrap();

        let end = CueEvent::synthetic_end(31.0, 30.0, start_section);
        notifier
            .notify_cue_event(stream_id, 31 * 90_000, Some(&end))
            .unwrap();

        let rendered: Vec<String> = notifier
            .playlist(stream_id)
            .unwrap()
            .entries()
            .iter()
            .map(|e| e.render())
            .collect();
        assert_eq!(rendered[0], "#EXT-X-PLACEMENT-OPPORTUNITY");
        assert!(rendered[1].starts_with("#EXT-X-SIGNAL-EXIT:30.000,SpliceType=LiveDAI"));
        assert!(rendered[1].contains("segmentationEventId=42"));
        assert_eq!(rendered[2], "#EXT-X-SIGNAL-RETURN:30.000,SpliceType=LiveDAI");
    }
}
