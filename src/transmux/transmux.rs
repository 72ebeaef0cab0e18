// SPDX-License-Identifier: GPL-2.0-or-later

mod cache;
mod decrypt;
mod probe;

#[cfg(test)]
mod test;

pub use decrypt::DecryptError;
pub use probe::{min_probe_byte_length, ContainerFamily};

use async_recursion::async_recursion;
use bytes::{Bytes, BytesMut};
use cache::ChunkCache;
use common::{
    ArcClock, ArcEventSink, ArcMsgLogger, ChunkMetadata, EncryptionMethod, ErrorDetails,
    ErrorKind, ErrorPayload, KeyData, LogLevel, SegmentKey, TransmuxConfig, TransmuxEvent,
    TransmuxState, TransmuxerOptions, TypeSupported,
};
use decrypt::Decrypter;
use demux::{AdtsDemuxer, Demuxer, Fmp4Demuxer, Mp3Demuxer, SampleAesError, TsDemuxer};
use probe::RemuxerKind;
use remux::{Mp4Remuxer, PassthroughRemuxer, RemuxResult, Remuxer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PushError {
    #[error("decrypt: {0}")]
    Decrypt(#[from] DecryptError),

    #[error("sample-aes: {0}")]
    SampleAes(#[from] SampleAesError),
}

/// Output of one `push` or `flush` call. The chunk metadata cookie is
/// returned to the caller with its timing stamps filled in.
#[derive(Clone, Debug)]
pub struct TransmuxResult {
    pub remux: RemuxResult,
    pub chunk_meta: ChunkMetadata,
}

impl TransmuxResult {
    fn empty(chunk_meta: ChunkMetadata) -> Self {
        Self {
            remux: RemuxResult::default(),
            chunk_meta,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.remux.is_empty()
    }
}

/// Stateful segment pipeline: probes the container family, decrypts,
/// demuxes and remuxes pushed chunks into fragmented MP4.
///
/// Single owner, single thread. The host serializes calls; the only
/// nested invocation is the internal re-entry of `push` after an
/// offloaded decryption resolves.
pub struct Transmuxer {
    observer: ArcEventSink,
    logger: ArcMsgLogger,
    clock: ArcClock,
    options: TransmuxerOptions,
    type_supported: TypeSupported,
    id: u64,

    config: TransmuxConfig,
    state: TransmuxState,
    cache: ChunkCache,
    decrypter: Option<Decrypter>,
    demuxer: Option<Box<dyn Demuxer>>,
    remuxer: Option<Box<dyn Remuxer>>,
    family: Option<ContainerFamily>,
    remuxer_kind: Option<RemuxerKind>,
}

impl Transmuxer {
    #[must_use]
    #[allow(clippy::needless_pass_by_value)]
    pub fn new(
        observer: ArcEventSink,
        logger: ArcMsgLogger,
        clock: ArcClock,
        options: TransmuxerOptions,
        type_supported: TypeSupported,
        vendor: String,
        id: u64,
    ) -> Self {
        if !vendor.is_empty() {
            logger.log(LogLevel::Debug, &format!("transmuxer {id}: vendor '{vendor}'"));
        }
        Self {
            observer,
            logger,
            clock,
            options,
            type_supported,
            id,
            config: TransmuxConfig::default(),
            state: TransmuxState::default(),
            cache: ChunkCache::default(),
            decrypter: None,
            demuxer: None,
            remuxer: None,
            family: None,
            remuxer_kind: None,
        }
    }

    /// Replaces the segment parameters. Demuxer and remuxer are kept;
    /// the next push decides whether they need replacing.
    pub fn configure(&mut self, config: TransmuxConfig) {
        self.config = config;
        if let Some(decrypter) = &mut self.decrypter {
            decrypter.reset();
        }
    }

    #[async_recursion]
    pub async fn push(
        &mut self,
        data: Bytes,
        key: Option<&SegmentKey>,
        mut chunk_meta: ChunkMetadata,
        state: Option<TransmuxState>,
    ) -> Result<TransmuxResult, PushError> {
        chunk_meta.transmuxing.execute_start = self.clock.now_millis();

        if let Some(state) = state {
            self.state = state;
        }

        let key_data = KeyData::derive(&data, key);
        let mut data = data;

        if let Some(key_data) = &key_data {
            if key_data.method == EncryptionMethod::Aes128 {
                let decrypter = self.decrypter.get_or_insert_with(Decrypter::new);
                if self.options.enable_software_aes {
                    match decrypter.software_decrypt(&data, &key_data.key, key_data.iv)? {
                        Some(plaintext) => data = plaintext,
                        // Retained inside the decrypter until a whole
                        // block is available.
                        None => {
                            chunk_meta.transmuxing.execute_end = self.clock.now_millis();
                            return Ok(TransmuxResult::empty(chunk_meta));
                        }
                    }
                } else {
                    let plaintext = decrypter
                        .decrypt(data, &key_data.key, key_data.iv)
                        .await?;
                    // Re-enter with the plaintext on the clear branch.
                    return self.push(plaintext, None, chunk_meta, None).await;
                }
            }
        }

        // Reset policy.
        let state = self.state;
        if state.discontinuity || state.track_switch || state.init_segment_change {
            self.reset_init_segment();
        }
        if state.discontinuity || state.init_segment_change {
            self.reset_initial_timestamp();
        }
        if !state.contiguous {
            self.reset_contiguity();
        }

        if self.needs_probing() {
            let had_cache = self.cache.data_length() > 0;
            if had_cache {
                let mut joined = BytesMut::from(&self.cache.flush()[..]);
                joined.extend_from_slice(&data);
                data = joined.freeze();
            }

            match probe::select(&data) {
                Some(family) => self.configure_transmuxer(family),
                // Keep accumulating until a failed probe is conclusive.
                None if !had_cache || data.len() < probe::min_probe_byte_length() => {
                    self.cache.append(data);
                    chunk_meta.transmuxing.execute_end = self.clock.now_millis();
                    return Ok(TransmuxResult::empty(chunk_meta));
                }
                None => {
                    self.logger.log(
                        LogLevel::Warning,
                        "failed to identify container, treating as fmp4 passthrough",
                    );
                    self.configure_transmuxer(ContainerFamily::Fmp4);
                }
            }
        }

        let TransmuxState {
            contiguous,
            accurate_time_offset,
            time_offset,
            ..
        } = self.state;
        let demux_flush = !self.options.progressive;
        let id = self.id;

        let (Some(demuxer), Some(remuxer)) = (self.demuxer.as_mut(), self.remuxer.as_mut())
        else {
            chunk_meta.transmuxing.execute_end = self.clock.now_millis();
            return Ok(TransmuxResult::empty(chunk_meta));
        };

        let tracks = match &key_data {
            Some(key_data) if key_data.method == EncryptionMethod::SampleAes => {
                demuxer
                    .demux_sample_aes(data, key_data.clone(), time_offset)
                    .await?
            }
            _ => demuxer.demux(data, time_offset, contiguous, demux_flush),
        };
        let remux_result = remuxer.remux(tracks, time_offset, accurate_time_offset, false, id);

        // Later chunks of the same segment skip the resets.
        self.state.contiguous = true;
        self.state.discontinuity = false;
        self.state.track_switch = false;

        chunk_meta.transmuxing.execute_end = self.clock.now_millis();
        Ok(TransmuxResult {
            remux: remux_result,
            chunk_meta,
        })
    }

    /// Ends the current segment. Any decrypter residue is pushed
    /// through the pipeline first, then the demuxer is drained.
    pub async fn flush(
        &mut self,
        mut chunk_meta: ChunkMetadata,
    ) -> Result<Vec<TransmuxResult>, PushError> {
        chunk_meta.transmuxing.execute_start = self.clock.now_millis();

        let mut results = Vec::new();

        let residue = self.decrypter.as_mut().and_then(Decrypter::flush);
        if let Some(residue) = residue {
            let result = self.push(residue, None, chunk_meta.clone(), None).await?;
            results.push(result);
        }

        let bytes_seen = self.cache.data_length();
        self.cache.reset();

        let time_offset = self.state.time_offset;
        let accurate_time_offset = self.state.accurate_time_offset;
        let id = self.id;

        let (Some(demuxer), Some(remuxer)) = (self.demuxer.as_mut(), self.remuxer.as_mut())
        else {
            if bytes_seen >= probe::min_probe_byte_length() {
                // Enough was seen to decide that the content cannot be
                // identified.
                self.observer.emit(&TransmuxEvent::Error(ErrorPayload {
                    kind: ErrorKind::MediaError,
                    details: ErrorDetails::FragParsingError,
                    fatal: true,
                    reason: "failed to find demuxer by probing fragment data".to_owned(),
                }));
            }
            chunk_meta.transmuxing.execute_end = self.clock.now_millis();
            results.push(TransmuxResult::empty(chunk_meta));
            return Ok(results);
        };

        let tracks = demuxer.flush(time_offset);
        let remux_result = remuxer.remux(tracks, time_offset, accurate_time_offset, true, id);

        chunk_meta.transmuxing.execute_end = self.clock.now_millis();
        results.push(TransmuxResult {
            remux: remux_result,
            chunk_meta,
        });
        Ok(results)
    }

    /// Releases the demuxer and remuxer. Terminal.
    pub fn destroy(&mut self) {
        self.demuxer = None;
        self.remuxer = None;
        self.family = None;
        self.remuxer_kind = None;
    }

    // The content family may have changed.
    fn needs_probing(&self) -> bool {
        self.demuxer.is_none()
            || self.remuxer.is_none()
            || self.state.discontinuity
            || self.state.track_switch
    }

    // Instantiates the demuxer and remuxer for the probed family,
    // keeping instances whose kind is unchanged, then seeds the
    // instances. The double reset relative to the flag driven resets
    // is intended: fresh instances have no init state.
    fn configure_transmuxer(&mut self, family: ContainerFamily) {
        if self.family != Some(family) || self.demuxer.is_none() {
            self.demuxer = Some(self.new_demuxer(family));
            self.family = Some(family);
        }

        let kind = probe::remuxer_kind(family);
        if self.remuxer_kind != Some(kind) || self.remuxer.is_none() {
            self.remuxer = Some(self.new_remuxer(kind));
            self.remuxer_kind = Some(kind);
        }

        self.reset_init_segment();
        self.reset_initial_timestamp();
    }

    fn new_demuxer(&self, family: ContainerFamily) -> Box<dyn Demuxer> {
        match family {
            ContainerFamily::Fmp4 => Box::new(Fmp4Demuxer::new(self.logger.clone())),
            ContainerFamily::MpegTs => Box::new(TsDemuxer::new(self.logger.clone())),
            ContainerFamily::Aac => Box::new(AdtsDemuxer::new(self.logger.clone())),
            ContainerFamily::Mp3 => Box::new(Mp3Demuxer::new(self.logger.clone())),
        }
    }

    fn new_remuxer(&self, kind: RemuxerKind) -> Box<dyn Remuxer> {
        match kind {
            RemuxerKind::Passthrough => Box::new(PassthroughRemuxer::new(self.logger.clone())),
            RemuxerKind::Mp4 => Box::new(Mp4Remuxer::new(
                self.observer.clone(),
                self.logger.clone(),
                &self.type_supported,
            )),
        }
    }

    fn reset_init_segment(&mut self) {
        let (Some(demuxer), Some(remuxer)) = (self.demuxer.as_mut(), self.remuxer.as_mut())
        else {
            return;
        };
        demuxer.reset_init_segment(
            self.config.init_segment_data.clone(),
            self.config.audio_codec.as_deref(),
            self.config.video_codec.as_deref(),
            self.config.duration,
        );
        remuxer.reset_init_segment(
            self.config.init_segment_data.clone(),
            self.config.audio_codec.as_deref(),
            self.config.video_codec.as_deref(),
        );
    }

    fn reset_initial_timestamp(&mut self) {
        let (Some(demuxer), Some(remuxer)) = (self.demuxer.as_mut(), self.remuxer.as_mut())
        else {
            return;
        };
        demuxer.reset_timestamp(self.config.default_init_pts);
        remuxer.reset_timestamp(self.config.default_init_pts);
    }

    fn reset_contiguity(&mut self) {
        let (Some(demuxer), Some(remuxer)) = (self.demuxer.as_mut(), self.remuxer.as_mut())
        else {
            return;
        };
        demuxer.reset_contiguity();
        remuxer.reset_next_timestamp();
    }
}
