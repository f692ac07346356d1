//! Producer-facing error type.
//!
//! The mix path itself never returns an error (see crate-level docs and
//! spec §7): a tick always produces `SamplesToDo` samples of something. This
//! type is only for setup/control-plane calls that happen outside the
//! real-time tick, such as building a `Device` or attaching an HRTF set.

use thiserror::Error;

/// Errors raised by producer-facing (non-real-time) entry points.
#[derive(Debug, Error, PartialEq)]
pub enum MixerError {
    #[error("device must have at least one output channel")]
    NoOutputChannels,
    #[error("device output channel count {0} exceeds MAX_OUTPUT_CHANNELS")]
    TooManyOutputChannels(usize),
    #[error("hrtf data set sample rate {set_rate} does not match device rate {device_rate}")]
    HrtfSampleRateMismatch { set_rate: u32, device_rate: u32 },
    #[error("send index {0} is out of range (MAX_SENDS)")]
    SendOutOfRange(usize),
}
