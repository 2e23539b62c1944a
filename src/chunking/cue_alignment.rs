use std::collections::VecDeque;
use std::sync::Arc;

use log::{debug, error, warn};

use super::sync_queue::{SyncPointQueue, ThreadToken};
use super::{CueEvent, StreamSink};
use crate::av::{Sample, StreamInfo, StreamType};
use crate::error::{CueError, Result};
use crate::scte35::SpliceInfoSection;

/// The max number of samples that are allowed to be buffered before we
/// shut down because there is likely a problem with the content or how the
/// pipeline was configured. This is about 20 seconds of buffer for audio
/// with 48kHz.
const MAX_BUFFER_SIZE: usize = 1000;

/// Whether a stream is inside or outside an ad break.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CueState {
    /// Between ad breaks, playing network content
    InProgram,
    /// Inside an ad break
    InAd,
}

struct StreamState {
    info: StreamInfo,
    samples: VecDeque<Sample>,
    cues: VecDeque<Arc<CueEvent>>,
    max_text_sample_end_time: f64,
    to_be_flushed: bool,
    cue_state: CueState,
}

impl StreamState {
    fn new(info: StreamInfo) -> Self {
        Self {
            info,
            samples: VecDeque::new(),
            cues: VecDeque::new(),
            max_text_sample_end_time: 0.0,
            to_be_flushed: false,
            cue_state: CueState::InProgram,
        }
    }
}

/// The time a sample occupies for cue ordering, in seconds.
///
/// Audio uses the sample midpoint: when the portion of a sample after the
/// cue point is bigger than the portion before it, the sample belongs after
/// the cue.
fn time_in_seconds(info: &StreamInfo, sample: &Sample) -> f64 {
    let scaled_time = match sample {
        Sample::Text(text) => text.start_time,
        Sample::Media(media) => match info.stream_type {
            StreamType::Audio => media.pts + media.duration / 2,
            _ => media.pts,
        },
    };
    scaled_time as f64 / info.time_scale as f64
}

fn text_end_time_in_seconds(info: &StreamInfo, sample: &Sample) -> Option<f64> {
    match sample {
        Sample::Text(text) => Some(text.end_time as f64 / info.time_scale as f64),
        Sample::Media(_) => None,
    }
}

enum MergeAction {
    DispatchSample,
    DispatchCue,
    Done,
}

/// Aligns cue points across parallel input streams.
///
/// One handler instance owns the states of all streams it merges; each
/// stream's methods are driven by the thread that produces that stream.
/// The only synchronization the handler touches is the shared
/// [`SyncPointQueue`].
///
/// Two modes fall out of the stream layout:
///
/// - *Video-anchored*: the video stream never buffers. Every key frame at
///   or past the hint promotes the pending cue to that exact time, and all
///   other streams split against the promoted time.
/// - *No-video*: every stream buffers until all of them hold a sample, then
///   the queue advances by handing out the next pending cue.
pub struct CueAlignmentHandler<S: StreamSink> {
    sync_points: Arc<SyncPointQueue>,
    token: ThreadToken,
    sink: S,
    streams: Vec<StreamState>,
    hint: f64,
    last_sync_time: f64,
}

impl<S: StreamSink> CueAlignmentHandler<S> {
    /// Creates a handler over the given streams, registered against
    /// `sync_points` and dispatching to `sink`.
    pub fn new(sync_points: Arc<SyncPointQueue>, infos: Vec<StreamInfo>, sink: S) -> Self {
        let token = sync_points.add_thread();
        // Seed with a negative time so a sync point at zero is respected.
        let hint = sync_points.get_hint(-1.0);
        Self {
            sync_points,
            token,
            sink,
            streams: infos.into_iter().map(StreamState::new).collect(),
            hint,
            last_sync_time: -1.0,
        }
    }

    /// The sink, for inspection after the pipeline completes.
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Consumes the handler, returning the sink.
    pub fn into_sink(self) -> S {
        self.sink
    }

    /// The ad-break state of a stream.
    pub fn cue_state(&self, stream_index: usize) -> CueState {
        self.streams[stream_index].cue_state
    }

    /// Accepts one sample from a stream.
    pub fn on_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()> {
        let stream = &mut self.streams[stream_index];
        if let Some(end_time) = text_end_time_in_seconds(&stream.info, &sample) {
            stream.max_text_sample_end_time = stream.max_text_sample_end_time.max(end_time);
        }

        if stream.info.stream_type == StreamType::Video {
            self.on_video_sample(stream_index, sample)
        } else {
            self.on_non_video_sample(stream_index, sample)
        }
    }

    /// Accepts an SCTE-35 splice section observed on a stream.
    ///
    /// Events of the wrong polarity for the stream's current cue state are
    /// ignored. An accepted START with a known duration also schedules a
    /// synthetic END at `start + duration`, which the real END suppresses
    /// if it arrives while the synthetic one is still pending.
    pub fn on_scte35(
        &mut self,
        stream_index: usize,
        section: Arc<SpliceInfoSection>,
    ) -> Result<()> {
        let descriptor = match section.segmentation() {
            Some(descriptor) => descriptor,
            None => {
                warn!("dropping splice section without a segmentation descriptor");
                return Ok(());
            }
        };
        let time = match section.splice_time_in_seconds() {
            Some(time) => time,
            None => {
                warn!("dropping splice section without a presentation time");
                return Ok(());
            }
        };

        let state = self.streams[stream_index].cue_state;
        let accepted = (descriptor.is_ad_start() && state == CueState::InProgram)
            || (descriptor.is_ad_end() && state == CueState::InAd);
        if !accepted {
            debug!(
                "ignoring segmentation type 0x{:02x} at {:.3}s in state {:?}",
                descriptor.segmentation_type_id, time, state
            );
            return Ok(());
        }

        let duration = descriptor.duration_in_seconds().unwrap_or(0.0);
        let event_id = descriptor.segmentation_event_id;
        let is_start = descriptor.is_ad_start();

        if descriptor.is_ad_end() {
            self.sync_points.cancel_synthetic_end(event_id);
        }

        debug!(
            "queueing ad-break {} at {:.3}s (event {}, duration {:.3}s)",
            if is_start { "start" } else { "end" },
            time,
            event_id,
            duration
        );
        self.sync_points
            .add(CueEvent::scte35(time, duration, section.clone()));
        if is_start && duration > 0.0 {
            // Schedule the fallback END in case the explicit one never
            // arrives; the real signal cancels it.
            self.sync_points
                .add(CueEvent::synthetic_end(time + duration, duration, section));
        }

        self.hint = self.sync_points.get_hint(self.last_sync_time);
        Ok(())
    }

    /// Marks a stream as finished. Once every stream is marked, remaining
    /// cues and samples drain and the sink is flushed.
    pub fn on_flush_request(&mut self, stream_index: usize) -> Result<()> {
        self.streams[stream_index].to_be_flushed = true;

        // All streams must flush together so cached samples can be cleared
        // and cues stay synchronized across them.
        if self.streams.iter().any(|s| !s.to_be_flushed) {
            return Ok(());
        }

        // It is possible that not all cues were handed out yet; the hint
        // advances as each one is consumed.
        while self.sync_points.has_more(self.hint) {
            let next_cue = self.sync_points.get_next(self.token, self.hint)?;
            self.use_new_sync_point(next_cue)?;
        }

        for index in 0..self.streams.len() {
            self.run_through_samples(index)?;
            debug_assert!(self.streams[index].samples.is_empty());

            // Extra cues at the end would produce empty periods downstream.
            // Text is the exception: a cue before the max end time still
            // splits real content.
            while let Some(cue) = self.streams[index].cues.pop_front() {
                if cue.time_in_seconds < self.streams[index].max_text_sample_end_time {
                    self.dispatch_cue(index, cue)?;
                } else {
                    warn!(
                        "ignoring extra cue in stream {} at {:.3}s at end of stream",
                        index, cue.time_in_seconds
                    );
                }
            }
        }

        for index in 0..self.streams.len() {
            self.sink.on_flush(index)?;
        }
        Ok(())
    }

    fn on_video_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()> {
        let sample_time = time_in_seconds(&self.streams[stream_index].info, &sample);
        let is_key_frame = matches!(&sample, Sample::Media(media) if media.is_key_frame);

        if is_key_frame && sample_time >= self.hint {
            let next_sync = match self.sync_points.promote_at(self.token, sample_time) {
                Some(sync) => sync,
                None => {
                    error!(
                        "failed to promote sync point at {:.3}s; video streams are not GOP-aligned",
                        sample_time
                    );
                    return Err(CueError::NotGopAligned(format!(
                        "no promotable sync point at {:.3}s",
                        sample_time
                    )));
                }
            };
            self.use_new_sync_point(next_sync)?;

            debug_assert_eq!(self.streams[stream_index].cues.len(), 1);
            if let Some(cue) = self.streams[stream_index].cues.pop_front() {
                self.dispatch_cue(stream_index, cue)?;
            }
        }

        self.sink.on_sample(stream_index, sample)
    }

    fn on_non_video_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()> {
        // Accept the sample: out immediately if it is before the hint,
        // buffered otherwise.
        self.accept_sample(stream_index, sample)?;

        // When every stream is buffering at the hint there is no video
        // stream to promote sync points, so take the next one from the
        // queue directly.
        if self.everyone_waiting_at_hint() {
            let next_sync = self.sync_points.get_next(self.token, self.hint)?;
            self.use_new_sync_point(next_sync)?;
        }
        Ok(())
    }

    fn accept_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()> {
        let stream = &mut self.streams[stream_index];
        stream.samples.push_back(sample);
        if stream.samples.len() > MAX_BUFFER_SIZE {
            error!(
                "stream {} buffered {} samples, the max is {}",
                stream_index,
                stream.samples.len(),
                MAX_BUFFER_SIZE
            );
            return Err(CueError::StreamsNotMultiplexed(format!(
                "stream {} exceeded {} buffered samples",
                stream_index, MAX_BUFFER_SIZE
            )));
        }
        self.run_through_samples(stream_index)
    }

    fn everyone_waiting_at_hint(&self) -> bool {
        self.streams.iter().all(|s| !s.samples.is_empty())
    }

    fn use_new_sync_point(&mut self, new_sync: Arc<CueEvent>) -> Result<()> {
        self.last_sync_time = new_sync.time_in_seconds;
        self.hint = self.sync_points.get_hint(new_sync.time_in_seconds);
        debug_assert!(self.hint > new_sync.time_in_seconds);

        for index in 0..self.streams.len() {
            self.streams[index].cues.push_back(new_sync.clone());
            self.run_through_samples(index)?;
        }
        Ok(())
    }

    /// Step through the stream's buffers until the cue finds its slot.
    /// Think of this as a merge sort between samples and cues.
    fn run_through_samples(&mut self, stream_index: usize) -> Result<()> {
        loop {
            let action = {
                let stream = &self.streams[stream_index];
                match (stream.cues.front(), stream.samples.front()) {
                    (Some(cue), Some(sample)) => {
                        if time_in_seconds(&stream.info, sample) < cue.time_in_seconds {
                            MergeAction::DispatchSample
                        } else {
                            MergeAction::DispatchCue
                        }
                    }
                    // With the cues all sent, everything up to the hint can
                    // go out.
                    (None, Some(sample))
                        if time_in_seconds(&stream.info, sample) < self.hint =>
                    {
                        MergeAction::DispatchSample
                    }
                    _ => MergeAction::Done,
                }
            };

            match action {
                MergeAction::DispatchSample => {
                    let sample = self.streams[stream_index].samples.pop_front().unwrap();
                    self.sink.on_sample(stream_index, sample)?;
                }
                MergeAction::DispatchCue => {
                    let cue = self.streams[stream_index].cues.pop_front().unwrap();
                    self.dispatch_cue(stream_index, cue)?;
                }
                MergeAction::Done => return Ok(()),
            }
        }
    }

    fn dispatch_cue(&mut self, stream_index: usize, cue: Arc<CueEvent>) -> Result<()> {
        let stream = &mut self.streams[stream_index];
        if cue.is_ad_start() && stream.cue_state == CueState::InProgram {
            stream.cue_state = CueState::InAd;
        } else if cue.is_ad_end() && stream.cue_state == CueState::InAd {
            stream.cue_state = CueState::InProgram;
        } else if cue.is_ad_start() || cue.is_ad_end() {
            debug!(
                "cue at {:.3}s has the wrong polarity for stream {} in state {:?}",
                cue.time_in_seconds, stream_index, stream.cue_state
            );
        }
        self.sink.on_cue(stream_index, cue)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::av::{MediaSample, TextSample};
    use crate::scte35::{
        SegmentationDescriptor, SpliceCommand, SpliceInfoSection, SpliceTime,
        SCTE35_TICKS_PER_SECOND,
    };
    use pretty_assertions::assert_eq;

    #[derive(Debug, PartialEq)]
    enum Output {
        Sample(usize, f64),
        Cue(usize, f64, bool),
        Flush(usize),
    }

    #[derive(Default)]
    struct RecordingSink {
        outputs: Vec<Output>,
    }

    impl StreamSink for RecordingSink {
        fn on_sample(&mut self, stream_index: usize, sample: Sample) -> Result<()> {
            let time = match &sample {
                Sample::Media(m) => m.pts as f64 / 90_000.0,
                Sample::Text(t) => t.start_time as f64 / 90_000.0,
            };
            self.outputs.push(Output::Sample(stream_index, time));
            Ok(())
        }

        fn on_cue(&mut self, stream_index: usize, cue: Arc<CueEvent>) -> Result<()> {
            self.outputs
                .push(Output::Cue(stream_index, cue.time_in_seconds, cue.is_ad_start()));
            Ok(())
        }

        fn on_flush(&mut self, stream_index: usize) -> Result<()> {
            self.outputs.push(Output::Flush(stream_index));
            Ok(())
        }
    }

    fn ad_start_section(pts: u64, duration_secs: u64) -> Arc<SpliceInfoSection> {
        Arc::new(
            SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(pts)))
                .with_descriptor(SegmentationDescriptor {
                    segmentation_event_id: 0x12345679,
                    segmentation_type_id: 0x34,
                    segmentation_duration: Some(duration_secs * SCTE35_TICKS_PER_SECOND),
                    ..Default::default()
                }),
        )
    }

    fn ad_end_section(pts: u64) -> Arc<SpliceInfoSection> {
        Arc::new(
            SpliceInfoSection::new(SpliceCommand::TimeSignal(SpliceTime::at(pts)))
                .with_descriptor(SegmentationDescriptor {
                    segmentation_event_id: 0x12345679,
                    segmentation_type_id: 0x35,
                    ..Default::default()
                }),
        )
    }

    fn video_sample(pts: i64, key: bool) -> Sample {
        MediaSample::new(vec![0u8; 16])
            .with_pts(pts)
            .with_duration(3000)
            .with_key_flag(key)
            .into()
    }

    fn audio_sample(pts: i64) -> Sample {
        MediaSample::new(vec![0u8; 16])
            .with_pts(pts)
            .with_duration(1920)
            .into()
    }

    fn video_audio_handler() -> CueAlignmentHandler<RecordingSink> {
        let queue = Arc::new(SyncPointQueue::new());
        CueAlignmentHandler::new(
            queue,
            vec![
                StreamInfo::new(StreamType::Video, 90_000),
                StreamInfo::new(StreamType::Audio, 90_000),
            ],
            RecordingSink::default(),
        )
    }

    #[test]
    fn test_video_cue_lands_on_key_frame() {
        let mut handler = video_audio_handler();

        // Ad break signalled at 5.0s with a 30s duration.
        handler
            .on_scte35(0, ad_start_section(5 * SCTE35_TICKS_PER_SECOND as u64, 30))
            .unwrap();

        // Audio up to 4.98s buffers or passes; video key frame at exactly
        // 5.0s promotes the cue.
        handler.on_sample(1, audio_sample(4 * 90_000)).unwrap();
        handler.on_sample(0, video_sample(4 * 90_000, true)).unwrap();
        handler
            .on_sample(0, video_sample(5 * 90_000, true))
            .unwrap();
        handler.on_sample(1, audio_sample(5 * 90_000)).unwrap();

        let outputs = &handler.sink().outputs;
        // The cue on the video stream precedes the 5.0s video sample.
        let video_cue = outputs
            .iter()
            .position(|o| matches!(o, Output::Cue(0, t, true) if *t == 5.0))
            .expect("video cue dispatched");
        let video_sample_at_5 = outputs
            .iter()
            .position(|o| matches!(o, Output::Sample(0, t) if *t == 5.0))
            .expect("video sample dispatched");
        assert!(video_cue < video_sample_at_5);
        assert_eq!(handler.cue_state(0), CueState::InAd);
    }

    #[test]
    fn test_not_gop_aligned_across_handlers() {
        // Two renditions share one queue (the VOD ad-cues layout). Their
        // key frames must land on the same instants.
        let queue = Arc::new(SyncPointQueue::new());
        queue.add(CueEvent::placement_opportunity(5.0, 0.0));

        let mut first = CueAlignmentHandler::new(
            queue.clone(),
            vec![StreamInfo::new(StreamType::Video, 90_000)],
            RecordingSink::default(),
        );
        let mut second = CueAlignmentHandler::new(
            queue.clone(),
            vec![StreamInfo::new(StreamType::Video, 90_000)],
            RecordingSink::default(),
        );

        first
            .on_sample(0, video_sample(5 * 90_000, true))
            .unwrap();

        // The second rendition's key frame lands half a second later; the
        // promoted point at 5.0s is not near it and nothing is pending.
        let result = second.on_sample(0, video_sample(495_000, true));
        assert!(matches!(result, Err(CueError::NotGopAligned(_))));
    }

    #[test]
    fn test_aligned_renditions_share_promotion() {
        let queue = Arc::new(SyncPointQueue::new());
        queue.add(CueEvent::placement_opportunity(5.0, 0.0));

        let mut first = CueAlignmentHandler::new(
            queue.clone(),
            vec![StreamInfo::new(StreamType::Video, 90_000)],
            RecordingSink::default(),
        );
        let mut second = CueAlignmentHandler::new(
            queue.clone(),
            vec![StreamInfo::new(StreamType::Video, 90_000)],
            RecordingSink::default(),
        );

        first.on_sample(0, video_sample(5 * 90_000, true)).unwrap();
        second.on_sample(0, video_sample(5 * 90_000, true)).unwrap();

        assert!(second
            .sink()
            .outputs
            .iter()
            .any(|o| matches!(o, Output::Cue(0, t, _) if *t == 5.0)));
    }

    #[test]
    fn test_audio_midpoint_ordering() {
        let mut handler = video_audio_handler();

        handler
            .on_scte35(0, ad_start_section(5 * SCTE35_TICKS_PER_SECOND as u64, 30))
            .unwrap();

        // Audio sample straddling 5.0s with midpoint before the cue:
        // pts 4.99s, duration 40ms -> midpoint 4.99 + 0.02 < 5.0.
        let before = MediaSample::new(vec![0u8; 4])
            .with_pts((4.98 * 90_000.0) as i64)
            .with_duration((0.02 * 90_000.0) as i64);
        // Midpoint after the cue.
        let after = MediaSample::new(vec![0u8; 4])
            .with_pts((4.995 * 90_000.0) as i64)
            .with_duration((0.04 * 90_000.0) as i64);
        handler.on_sample(1, before.into()).unwrap();
        handler.on_sample(1, after.into()).unwrap();

        handler.on_sample(0, video_sample(5 * 90_000, true)).unwrap();

        let outputs = &handler.sink().outputs;
        let cue = outputs
            .iter()
            .position(|o| matches!(o, Output::Cue(1, ..)))
            .expect("audio cue dispatched");
        let first_audio = outputs
            .iter()
            .position(|o| matches!(o, Output::Sample(1, t) if (*t - 4.98).abs() < 1e-9))
            .unwrap();
        let second_audio = outputs
            .iter()
            .position(|o| matches!(o, Output::Sample(1, t) if (*t - 4.995).abs() < 1e-9))
            .unwrap();
        assert!(first_audio < cue, "midpoint-before sample precedes cue");
        assert!(cue < second_audio, "midpoint-after sample follows cue");
    }

    #[test]
    fn test_wrong_polarity_ignored() {
        let mut handler = video_audio_handler();

        // An END without a preceding START is ignored.
        handler
            .on_scte35(0, ad_end_section(3 * SCTE35_TICKS_PER_SECOND as u64))
            .unwrap();
        assert!(!handler.sync_points.has_more(0.0));

        // A second START while already pending is queued only once the
        // stream state flips, so it is accepted here (still InProgram).
        handler
            .on_scte35(0, ad_start_section(5 * SCTE35_TICKS_PER_SECOND as u64, 0))
            .unwrap();
        assert!(handler.sync_points.has_more(5.0));
    }

    #[test]
    fn test_flush_drains_buffers() {
        let queue = Arc::new(SyncPointQueue::new());
        let mut handler = CueAlignmentHandler::new(
            queue,
            vec![
                StreamInfo::new(StreamType::Audio, 90_000),
                StreamInfo::new(StreamType::Text, 90_000),
            ],
            RecordingSink::default(),
        );

        handler.on_sample(0, audio_sample(0)).unwrap();
        handler
            .on_sample(1, TextSample::new(0, 90_000, "first").into())
            .unwrap();
        handler.on_flush_request(0).unwrap();
        assert!(handler
            .sink()
            .outputs
            .iter()
            .all(|o| !matches!(o, Output::Flush(_))));

        handler.on_flush_request(1).unwrap();

        let outputs = &handler.sink().outputs;
        assert!(outputs.contains(&Output::Sample(0, 0.0)));
        assert!(outputs.contains(&Output::Sample(1, 0.0)));
        assert!(outputs.contains(&Output::Flush(0)));
        assert!(outputs.contains(&Output::Flush(1)));
    }

    #[test]
    fn test_flush_drops_cue_past_text_end() {
        let queue = Arc::new(SyncPointQueue::new());
        let mut handler = CueAlignmentHandler::new(
            queue,
            vec![
                StreamInfo::new(StreamType::Audio, 90_000),
                StreamInfo::new(StreamType::Text, 90_000),
            ],
            RecordingSink::default(),
        );

        handler
            .on_scte35(0, ad_start_section(2 * SCTE35_TICKS_PER_SECOND as u64, 0))
            .unwrap();
        handler.on_sample(0, audio_sample(0)).unwrap();
        // The text sample runs until 3.0s, past the 2.0s cue.
        handler
            .on_sample(1, TextSample::new(0, 3 * 90_000, "long").into())
            .unwrap();

        handler.on_flush_request(0).unwrap();
        handler.on_flush_request(1).unwrap();

        let outputs = &handler.sink().outputs;
        // The audio stream has no text horizon, so its trailing cue is
        // dropped; the text stream keeps the cue at 2.0s (< 3.0s).
        assert!(!outputs
            .iter()
            .any(|o| matches!(o, Output::Cue(0, ..))));
        assert!(outputs
            .iter()
            .any(|o| matches!(o, Output::Cue(1, t, _) if *t == 2.0)));
    }

    #[test]
    fn test_buffer_overflow_fails() {
        let queue = Arc::new(SyncPointQueue::new());
        let mut handler = CueAlignmentHandler::new(
            queue,
            vec![
                StreamInfo::new(StreamType::Audio, 90_000),
                StreamInfo::new(StreamType::Audio, 90_000),
            ],
            RecordingSink::default(),
        );

        // Hold a cue far in the future so stream 0 keeps buffering while
        // stream 1 stays empty.
        handler
            .on_scte35(0, ad_start_section(10_000 * SCTE35_TICKS_PER_SECOND as u64, 0))
            .unwrap();

        let mut result = Ok(());
        for i in 0..=MAX_BUFFER_SIZE as i64 {
            // Every sample lands past the hint so nothing dispatches, and
            // the second stream never contributes a sample.
            result = handler.on_sample(0, audio_sample(10_000 * 90_000 + i * 1920));
            if result.is_err() {
                break;
            }
        }
        assert!(matches!(
            result,
            Err(CueError::StreamsNotMultiplexed(_))
        ));
    }

    #[test]
    fn test_synthetic_end_returns_to_program() {
        let mut handler = video_audio_handler();

        // START at 5s with a 10s duration and no real END.
        handler
            .on_scte35(0, ad_start_section(5 * SCTE35_TICKS_PER_SECOND as u64, 10))
            .unwrap();

        handler.on_sample(0, video_sample(5 * 90_000, true)).unwrap();
        assert_eq!(handler.cue_state(0), CueState::InAd);

        // Key frame at 15s promotes the synthetic END.
        handler
            .on_sample(0, video_sample(15 * 90_000, true))
            .unwrap();
        assert_eq!(handler.cue_state(0), CueState::InProgram);
    }

    #[test]
    fn test_real_end_cancels_synthetic() {
        let mut handler = video_audio_handler();

        handler
            .on_scte35(0, ad_start_section(5 * SCTE35_TICKS_PER_SECOND as u64, 10))
            .unwrap();
        handler.on_sample(0, video_sample(5 * 90_000, true)).unwrap();
        assert_eq!(handler.cue_state(0), CueState::InAd);

        // Real END at 12s cancels the synthetic END at 15s.
        handler
            .on_scte35(0, ad_end_section(12 * SCTE35_TICKS_PER_SECOND as u64))
            .unwrap();
        handler
            .on_sample(0, video_sample(12 * 90_000, true))
            .unwrap();
        assert_eq!(handler.cue_state(0), CueState::InProgram);

        // Nothing remains at 15s.
        assert!(!handler.sync_points.has_more(14.0));
    }
}
