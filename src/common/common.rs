// SPDX-License-Identifier: GPL-2.0-or-later

pub mod time;
pub mod track;

use bytes::Bytes;
use serde::Deserialize;
use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Instant,
};

pub type ArcMsgLogger = Arc<dyn MsgLogger + Send + Sync>;

pub trait MsgLogger {
    fn log(&self, level: LogLevel, msg: &str);
}

/// Severity of the log message.
#[derive(Clone, Copy, Debug, Hash, PartialEq, Eq)]
pub enum LogLevel {
    /// Something requires attention.
    Error,

    /// Something may require attention.
    Warning,

    /// Standard information.
    Info,

    /// Verbose debugging information.
    Debug,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Error => write!(f, "error"),
            LogLevel::Warning => write!(f, "warning"),
            LogLevel::Info => write!(f, "info"),
            LogLevel::Debug => write!(f, "debug"),
        }
    }
}

pub struct DummyMsgLogger;

impl MsgLogger for DummyMsgLogger {
    fn log(&self, _: LogLevel, _: &str) {}
}

#[must_use]
pub fn new_dummy_msg_logger() -> Arc<impl MsgLogger> {
    Arc::new(DummyMsgLogger {})
}

// Thread safe dyn `EventSink`.
pub type ArcEventSink = Arc<dyn EventSink + Send + Sync>;

// One-way event bus shared with the host. The transmuxer only emits.
pub trait EventSink {
    fn emit(&self, event: &TransmuxEvent);
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransmuxEvent {
    Error(ErrorPayload),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ErrorPayload {
    pub kind: ErrorKind,
    pub details: ErrorDetails,
    pub fatal: bool,
    pub reason: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MediaError,
    MuxError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::MediaError => write!(f, "mediaError"),
            ErrorKind::MuxError => write!(f, "muxError"),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorDetails {
    FragParsingError,
    FragDecryptError,
}

impl fmt::Display for ErrorDetails {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorDetails::FragParsingError => write!(f, "fragParsingError"),
            ErrorDetails::FragDecryptError => write!(f, "fragDecryptError"),
        }
    }
}

pub struct DummyEventSink;

impl EventSink for DummyEventSink {
    fn emit(&self, _: &TransmuxEvent) {}
}

#[must_use]
pub fn new_dummy_event_sink() -> ArcEventSink {
    Arc::new(DummyEventSink {})
}

// Thread safe dyn `Clock`.
pub type ArcClock = Arc<dyn Clock + Send + Sync>;

/// Millisecond source for chunk timing stamps.
pub trait Clock {
    fn now_millis(&self) -> u64;
}

// Monotonic milliseconds since construction.
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            origin: Instant::now(),
        })
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> u64 {
        u64::try_from(self.origin.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

// Manually advanced clock.
#[derive(Default)]
pub struct ManualClock(AtomicU64);

impl ManualClock {
    #[must_use]
    pub fn new(now: u64) -> Arc<Self> {
        Arc::new(Self(AtomicU64::new(now)))
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncryptionMethod {
    Aes128,
    SampleAes,
    Other(String),
}

impl fmt::Display for EncryptionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EncryptionMethod::Aes128 => write!(f, "AES-128"),
            EncryptionMethod::SampleAes => write!(f, "SAMPLE-AES"),
            EncryptionMethod::Other(v) => write!(f, "{v}"),
        }
    }
}

/// Decryption attributes as supplied by the playlist layer.
/// Any of the fields may be missing.
#[derive(Clone, Debug, Default)]
pub struct SegmentKey {
    pub method: Option<EncryptionMethod>,
    pub key: Option<Bytes>,
    pub iv: Option<[u8; 16]>,
}

/// Fully resolved decryption parameters for one segment.
#[derive(Clone, Debug)]
pub struct KeyData {
    pub method: EncryptionMethod,
    pub key: Bytes,
    pub iv: [u8; 16],
}

impl KeyData {
    // The segment is treated as clear unless method, key and iv are
    // all present and there is data to decrypt.
    #[must_use]
    pub fn derive(data: &[u8], key: Option<&SegmentKey>) -> Option<Self> {
        let key = key?;
        if data.is_empty() {
            return None;
        }
        match (&key.method, &key.key, key.iv) {
            (Some(method), Some(key), Some(iv)) => Some(Self {
                method: method.clone(),
                key: key.clone(),
                iv,
            }),
            _ => None,
        }
    }
}

/// Transmux timing stamps in clock milliseconds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TimingRecord {
    pub execute_start: u64,
    pub execute_end: u64,
}

// Cookie identifying one chunk of a segment. The transmuxer stamps
// `transmuxing` and returns the rest to the caller untouched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChunkMetadata {
    pub level: u32,
    pub sn: u64,
    pub part: i32,
    pub size: usize,
    pub transmuxing: TimingRecord,
}

impl ChunkMetadata {
    #[must_use]
    pub fn new(level: u32, sn: u64, part: i32) -> Self {
        Self {
            level,
            sn,
            part,
            size: 0,
            transmuxing: TimingRecord::default(),
        }
    }
}

/// Per-configure transmux parameters. Immutable between configures.
#[derive(Clone, Debug, Default)]
pub struct TransmuxConfig {
    pub audio_codec: Option<String>,
    pub video_codec: Option<String>,
    pub init_segment_data: Option<Bytes>,

    /// Segment duration in seconds.
    pub duration: f64,

    /// Initial presentation timestamp in 90 kHz ticks.
    pub default_init_pts: Option<i64>,
}

/// Per-push continuity flags and time offsets.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransmuxState {
    pub discontinuity: bool,
    pub contiguous: bool,
    pub accurate_time_offset: bool,
    pub track_switch: bool,
    pub init_segment_change: bool,

    /// Playlist-relative start time of this chunk in seconds.
    pub time_offset: f64,
}

impl TransmuxState {
    #[must_use]
    pub fn new(
        discontinuity: bool,
        contiguous: bool,
        accurate_time_offset: bool,
        track_switch: bool,
        init_segment_change: bool,
        time_offset: f64,
    ) -> Self {
        Self {
            discontinuity,
            contiguous,
            accurate_time_offset,
            track_switch,
            init_segment_change,
            time_offset,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TransmuxerOptions {
    /// Use the progressive software cipher instead of offloading
    /// whole-segment decryption to the blocking pool.
    #[serde(rename = "enableSoftwareAES")]
    pub enable_software_aes: bool,

    /// Chunks are delivered progressively. Inverted into the demuxer's
    /// flush flag for whole-segment delivery.
    pub progressive: bool,
}

impl Default for TransmuxerOptions {
    fn default() -> Self {
        Self {
            enable_software_aes: true,
            progressive: false,
        }
    }
}

/// Source buffer capabilities reported by the host.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct TypeSupported {
    pub mp4: bool,
    pub mpeg: bool,
    pub mp3: bool,
}

impl Default for TypeSupported {
    fn default() -> Self {
        Self {
            mp4: true,
            mpeg: false,
            mp3: false,
        }
    }
}
