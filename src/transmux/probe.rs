// SPDX-License-Identifier: GPL-2.0-or-later

use demux::{
    probe_adts, probe_fmp4, probe_mp3, probe_ts, ADTS_MIN_PROBE_BYTE_LENGTH,
    FMP4_MIN_PROBE_BYTE_LENGTH, MP3_MIN_PROBE_BYTE_LENGTH, TS_MIN_PROBE_BYTE_LENGTH,
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ContainerFamily {
    Fmp4,
    MpegTs,
    Aac,
    Mp3,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RemuxerKind {
    Passthrough,
    Mp4,
}

pub(crate) fn remuxer_kind(family: ContainerFamily) -> RemuxerKind {
    match family {
        ContainerFamily::Fmp4 => RemuxerKind::Passthrough,
        ContainerFamily::MpegTs | ContainerFamily::Aac | ContainerFamily::Mp3 => RemuxerKind::Mp4,
    }
}

struct ProbeEntry {
    family: ContainerFamily,
    probe: fn(&[u8]) -> bool,
    min_probe_byte_length: usize,
}

// First match wins. Fragmented MP4 short-circuits the common path, and
// ADTS comes before MP3 so its stricter sync pattern wins ambiguous
// sync words.
const PROBE_TABLE: [ProbeEntry; 4] = [
    ProbeEntry {
        family: ContainerFamily::Fmp4,
        probe: probe_fmp4,
        min_probe_byte_length: FMP4_MIN_PROBE_BYTE_LENGTH,
    },
    ProbeEntry {
        family: ContainerFamily::MpegTs,
        probe: probe_ts,
        min_probe_byte_length: TS_MIN_PROBE_BYTE_LENGTH,
    },
    ProbeEntry {
        family: ContainerFamily::Aac,
        probe: probe_adts,
        min_probe_byte_length: ADTS_MIN_PROBE_BYTE_LENGTH,
    },
    ProbeEntry {
        family: ContainerFamily::Mp3,
        probe: probe_mp3,
        min_probe_byte_length: MP3_MIN_PROBE_BYTE_LENGTH,
    },
];

pub(crate) fn select(data: &[u8]) -> Option<ContainerFamily> {
    PROBE_TABLE
        .iter()
        .find(|entry| (entry.probe)(data))
        .map(|entry| entry.family)
}

/// Bytes required before a failed probe is considered conclusive.
#[must_use]
pub fn min_probe_byte_length() -> usize {
    PROBE_TABLE
        .iter()
        .map(|entry| entry.min_probe_byte_length)
        .max()
        .unwrap_or(0)
        .max(1024)
}
