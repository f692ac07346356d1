//! Backend and synth collaborator traits (spec.md §6 "Backend-facing").
//!
//! Device enumeration, backend I/O and the MIDI synthesizer are named
//! external collaborators per spec.md §1; this module only defines the
//! interfaces `device::mix_cycle` calls through.

/// FPU mode scope guard (spec.md §4.8 steps 1/3, §9): saves the current
/// MXCSR on entry, sets denormals-are-zero, flush-to-zero, round-to-nearest
/// and masks all FPU exceptions, then restores the saved value on exit. A
/// thread-local save slot stands in for the RAII-scoped guard since
/// `Backend::lock`/`unlock` are separate trait calls rather than a single
/// scope object.
#[cfg(any(target_arch = "x86", target_arch = "x86_64"))]
mod fpu {
    use core::cell::Cell;

    thread_local! {
        static SAVED_MXCSR: Cell<u32> = const { Cell::new(0) };
    }

    #[allow(deprecated)]
    fn getcsr() -> u32 {
        #[cfg(target_arch = "x86_64")]
        use core::arch::x86_64::_mm_getcsr;
        #[cfg(target_arch = "x86")]
        use core::arch::x86::_mm_getcsr;
        unsafe { _mm_getcsr() }
    }

    #[allow(deprecated)]
    fn setcsr(v: u32) {
        #[cfg(target_arch = "x86_64")]
        use core::arch::x86_64::_mm_setcsr;
        #[cfg(target_arch = "x86")]
        use core::arch::x86::_mm_setcsr;
        unsafe { _mm_setcsr(v) }
    }

    /// Saves the current MXCSR, then treats denormals as zero while
    /// masking all FPU exceptions.
    pub fn enter() {
        SAVED_MXCSR.with(|saved| {
            saved.set(getcsr());
            setcsr(0x9fc0);
        });
    }

    /// Restores the MXCSR saved by the matching `enter`.
    pub fn restore() {
        SAVED_MXCSR.with(|saved| setcsr(saved.get()));
    }
}

#[cfg(not(any(target_arch = "x86", target_arch = "x86_64")))]
mod fpu {
    pub fn enter() {}
    pub fn restore() {}
}

/// Scoped lock the mix loop holds around the parts of a tick that touch
/// shared context/voice lists (spec.md §4.8 steps c/h), paired with the FPU
/// mode scope above: `lock` acquires both, `unlock` releases both in
/// reverse order. Implementors that add their own serialization (a mutex,
/// say) should still call through to `fpu::enter`/`fpu::restore` (or
/// equivalent) around it, the way `NullBackend` does below.
pub trait Backend {
    fn lock(&self);
    fn unlock(&self);
}

/// A backend that never actually locks anything beyond the FPU mode scope,
/// for tests and for hosts that already serialize calls to `mix_cycle`
/// themselves.
#[derive(Default)]
pub struct NullBackend;

impl Backend for NullBackend {
    fn lock(&self) {
        fpu::enter();
    }
    fn unlock(&self) {
        fpu::restore();
    }
}

/// The MIDI synthesizer, run once per tick directly into the output bus
/// before voices are mixed (spec.md §4.8 step d).
pub trait Synth {
    fn process(&mut self, samples: usize, out: &mut crate::buffer::PlanarBuffer, out_channels: usize);
}

/// A synth that produces silence, for tests and for devices with no synth
/// attached.
#[derive(Default)]
pub struct NullSynth;

impl Synth for NullSynth {
    fn process(&mut self, _samples: usize, _out: &mut crate::buffer::PlanarBuffer, _out_channels: usize) {}
}
