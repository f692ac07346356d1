//! Effect-slot capability set (spec.md §6 "Effect-facing").
//!
//! The source this spec is distilled from dispatches through a tagged
//! struct of function pointers (`V((*slot)->EffectState, process)`);
//! spec.md §9's design notes ask for a capability set instead. Concrete
//! effects (reverb, echo, ...) stay external per spec.md §1 — this module
//! only defines the trait and the `Null` effect used when a slot is empty.

use crate::buffer::PlanarBuffer;

/// Distance-model-relevant parameters a reverb-family effect can report, so
/// the voice updater can drive apparent-distance and air-absorption
/// modifiers for sends that are `AuxSendAuto` (spec.md §4.6 step 2).
#[derive(Copy, Clone, Debug)]
pub struct ReverbProperties {
    pub decay_time: f32,
    pub room_rolloff_factor: f32,
    pub air_absorption_gain_hf: f32,
}

/// One effect slot's processing capability. `update` is called only when
/// the slot is dirty; `process` runs every tick.
pub trait EffectState {
    /// Called when the slot's `NeedsUpdate` flag swaps true; recomputes
    /// whatever per-sample-rate coefficients the effect needs.
    fn update(&mut self, device_freq: u32);

    /// Reads `samples` frames from `wet_in` and accumulates the processed
    /// result into `dry_out`'s first `num_channels` channels.
    fn process(&mut self, samples: usize, wet_in: &PlanarBuffer, dry_out: &mut PlanarBuffer, num_channels: usize);

    /// `Some` only for reverb-family effects, consulted by
    /// `voice::send_room_parameters` when a send is `AuxSendAuto`.
    fn reverb_properties(&self) -> Option<ReverbProperties> {
        None
    }
}

/// The effect state of an empty slot: produces silence and reports no
/// reverb properties, so `AuxSendAuto` sends fall back to defaults.
#[derive(Default)]
pub struct NullEffect;

impl EffectState for NullEffect {
    fn update(&mut self, _device_freq: u32) {}

    fn process(&mut self, _samples: usize, _wet_in: &PlanarBuffer, _dry_out: &mut PlanarBuffer, _num_channels: usize) {
    }
}

/// One effect slot: its processing capability plus the dirty flag the mix
/// loop consumes once per tick (spec.md §4.8 step f).
pub struct EffectSlot {
    pub state: Box<dyn EffectState + Send>,
    pub needs_update: crate::flags::UpdateFlag,
    pub wet_buffer: PlanarBuffer,
    /// `AuxSendAuto`: whether sends routed here drive their room parameters
    /// from this slot's effect instead of the source's own defaults.
    pub aux_send_auto: bool,
}

impl EffectSlot {
    pub fn new(state: Box<dyn EffectState + Send>) -> Self {
        Self {
            state,
            needs_update: crate::flags::UpdateFlag::new(true),
            wet_buffer: PlanarBuffer::new(),
            aux_send_auto: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_effect_reports_no_reverb_properties() {
        let effect = NullEffect;
        assert!(effect.reverb_properties().is_none());
    }
}
