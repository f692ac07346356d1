//! Core voice parameter calculator and mix loop for a spatial audio engine.
//!
//! This crate owns the per-buffer update step that turns a sound source's
//! logical state (position, velocity, gain, cone, distance model, filters,
//! channel layout) into concrete per-output-channel mix parameters, and the
//! per-buffer mix step that produces interleaved PCM for a backend.
//!
//! Buffer/source/listener lifecycles, device enumeration and backend I/O, the
//! synthesizer, concrete effects, the HRTF data-set loader, SIMD mixer
//! kernels and config parsing are all named external collaborators; this
//! crate only defines the traits it needs from them.

pub mod backend;
pub mod buffer;
pub mod device;
pub mod effect;
pub mod error;
pub mod filter;
pub mod flags;
pub mod format;
pub mod hrtf;
pub mod listener;
pub mod math;
pub mod pan;
pub mod source;
pub mod stepping;
pub mod tunables;
pub mod voice;

pub use error::MixerError;
pub use tunables::Tunables;
