/// Submerged-listener preset
///
/// Maps how many faces of the listener are covered by liquid to a low-pass
/// setting: the more faces, the lower the cutoff and the stronger the
/// resonance. Thick liquids muffle more than thin ones. Targets glide over
/// 500 ms so walking into water does not click.
use super::low_pass::{LowPassFilter, FLAT_CUTOFF_HZ, FLAT_RESONANCE};
use crate::pitch::{ParamHandle, SmoothedParam, DEFAULT_SMOOTHING};
use harmonics_core::clock::{system_clock, SharedClock};

/// Covered faces beyond this count do not deepen the effect
pub const MAX_EFFECTIVE_FACES: u32 = 4;

const OPEN_CUTOFF_HZ: f32 = 1_800.0;
const OPEN_RESONANCE: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liquid {
    Thin,
    Thick,
}

impl Liquid {
    fn minimum_cutoff(self) -> f32 {
        match self {
            Liquid::Thin => 300.0,
            Liquid::Thick => 200.0,
        }
    }

    fn maximum_resonance(self) -> f32 {
        match self {
            Liquid::Thin => 2.0,
            Liquid::Thick => 2.5,
        }
    }
}

/// Target low-pass setting for `covered_faces` faces of `liquid`
pub fn underwater_setting(covered_faces: u32, liquid: Liquid) -> (f32, f32) {
    if covered_faces == 0 {
        return (FLAT_CUTOFF_HZ, FLAT_RESONANCE);
    }
    let depth = covered_faces.min(MAX_EFFECTIVE_FACES) as f32 / MAX_EFFECTIVE_FACES as f32;
    let cutoff = OPEN_CUTOFF_HZ + (liquid.minimum_cutoff() - OPEN_CUTOFF_HZ) * depth;
    let resonance = OPEN_RESONANCE + (liquid.maximum_resonance() - OPEN_RESONANCE) * depth;
    (cutoff, resonance)
}

/// Shared targets for one or more underwater low-pass filters
#[derive(Debug, Clone)]
pub struct UnderwaterPreset {
    cutoff: ParamHandle,
    resonance: ParamHandle,
}

impl UnderwaterPreset {
    /// Starts flat (not submerged)
    pub fn new() -> Self {
        Self {
            cutoff: ParamHandle::new(FLAT_CUTOFF_HZ),
            resonance: ParamHandle::new(FLAT_RESONANCE),
        }
    }

    /// A low-pass filter that follows this preset on the system clock
    pub fn filter(&self) -> LowPassFilter {
        self.filter_with_clock(system_clock())
    }

    pub fn filter_with_clock(&self, clock: SharedClock) -> LowPassFilter {
        LowPassFilter::live(
            SmoothedParam::with_clock(self.cutoff.clone(), DEFAULT_SMOOTHING, clock.clone()),
            SmoothedParam::with_clock(self.resonance.clone(), DEFAULT_SMOOTHING, clock),
        )
    }

    /// Retarget for the listener's current surroundings
    pub fn update(&self, covered_faces: u32, liquid: Liquid) {
        let (cutoff, resonance) = underwater_setting(covered_faces, liquid);
        self.cutoff.set(cutoff);
        self.resonance.set(resonance);
    }

    /// Glide back to the transparent setting
    pub fn clear(&self) {
        self.update(0, Liquid::Thin);
    }

    pub fn is_submerged(&self) -> bool {
        self.cutoff.get() < FLAT_CUTOFF_HZ
    }
}

impl Default for UnderwaterPreset {
    fn default() -> Self {
        Self::new()
    }
}
