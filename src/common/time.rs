// SPDX-License-Identifier: GPL-2.0-or-later

/// Timescale shared by MPEG-TS timestamps and the remuxed output.
pub const MPEG_TS_TIMESCALE: u32 = 90000;

// PES timestamps are 33-bit counters in 90 kHz ticks.
pub const PTS_ROLLOVER: i64 = 1 << 33;
const ROLLOVER_WINDOW: i64 = 1 << 32;

// Shifts `value` by whole rollover periods until it lands within half a
// period of `reference`. Timestamps closer than 13.25 hours apart are
// unaffected.
#[must_use]
pub fn normalize_pts(mut value: i64, reference: Option<i64>) -> i64 {
    let Some(reference) = reference else {
        return value;
    };
    if reference < value {
        while value > reference + ROLLOVER_WINDOW {
            value -= PTS_ROLLOVER;
        }
    } else {
        while value < reference - ROLLOVER_WINDOW {
            value += PTS_ROLLOVER;
        }
    }
    value
}

#[must_use]
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::as_conversions
)]
pub fn seconds_to_ticks(seconds: f64) -> i64 {
    (seconds * f64::from(MPEG_TS_TIMESCALE)) as i64
}

#[must_use]
#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
pub fn ticks_to_seconds(ticks: i64) -> f64 {
    ticks as f64 / f64::from(MPEG_TS_TIMESCALE)
}
