/// Effect chain for processing PCM blocks
///
/// Effects are applied in order. A block may change length on the way through
/// (pitch shifting resamples), so each effect returns a fresh block rather than
/// working in place.
use crate::error::Result;
use harmonics_core::Sample;
use std::borrow::Cow;

/// A deterministic, resettable transform over blocks of mono samples.
///
/// Implementations own all of their mutable state; nothing is shared between
/// instances. They must not keep references to an input block past the call.
pub trait AudioEffect: Send {
    /// Process one block that starts at `time_secs` of stream time
    fn process(&mut self, block: &[Sample], time_secs: f64, sample_rate: u32)
        -> Result<Vec<Sample>>;

    /// Zero all filter state. Idempotent.
    fn reset(&mut self);

    /// Human-readable name with current parameters (for logging)
    fn name(&self) -> String;

    /// Playback speed this effect imposes (`1.0` unless it resamples)
    fn speed_multiplier(&self) -> f64;
}

/// Ordered list of effects, fixed once built
#[derive(Default)]
pub struct EffectChain {
    effects: Vec<Box<dyn AudioEffect>>,
}

impl EffectChain {
    /// Create a new empty (pass-through) chain
    pub fn new() -> Self {
        Self {
            effects: Vec::new(),
        }
    }

    /// Append an effect while building the chain
    #[must_use]
    pub fn with_effect(mut self, effect: impl AudioEffect + 'static) -> Self {
        self.effects.push(Box::new(effect));
        self
    }

    pub fn from_effects(effects: Vec<Box<dyn AudioEffect>>) -> Self {
        Self { effects }
    }

    /// Insert an effect ahead of everything already in the chain
    pub fn prepend(&mut self, effect: impl AudioEffect + 'static) {
        self.effects.insert(0, Box::new(effect));
    }

    /// Fold `block` through every effect in order.
    ///
    /// An empty chain hands the input back borrowed, without copying.
    pub fn process<'a>(
        &mut self,
        block: &'a [Sample],
        time_secs: f64,
        sample_rate: u32,
    ) -> Result<Cow<'a, [Sample]>> {
        let mut effects = self.effects.iter_mut();
        let Some(first) = effects.next() else {
            return Ok(Cow::Borrowed(block));
        };

        let mut current = first.process(block, time_secs, sample_rate)?;
        for effect in effects {
            current = effect.process(&current, time_secs, sample_rate)?;
        }

        Ok(Cow::Owned(current))
    }

    /// Reset all effects in the chain
    pub fn reset(&mut self) {
        for effect in &mut self.effects {
            effect.reset();
        }
    }

    /// First non-unity speed multiplier in the chain
    pub fn speed_multiplier(&self) -> f64 {
        self.effects
            .iter()
            .map(|effect| effect.speed_multiplier())
            .find(|multiplier| *multiplier != 1.0)
            .unwrap_or(1.0)
    }

    pub fn len(&self) -> usize {
        self.effects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.effects.is_empty()
    }

    pub fn name(&self) -> String {
        let names: Vec<String> = self.effects.iter().map(|effect| effect.name()).collect();
        format!("EffectChain[{}]", names.join(", "))
    }
}

impl std::fmt::Debug for EffectChain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}
