//! Property-based tests for the effect chain and effects
//!
//! These check invariants that must hold for every input:
//! - an empty chain is the identity
//! - reset returns every effect to its first-call behaviour
//! - pitch shifting changes length by the pitch factor
//! - filters never emit garbage for full-scale input

use harmonics_dsp::effects::{
    mixer, BitCrush, EffectChain, EqBand, Equalizer, HighPassFilter, LowPassFilter, Mixer,
    PitchShift, Reverb, SecondarySource,
};
use harmonics_dsp::{AudioEffect, PitchFunction};
use proptest::prelude::*;

const SAMPLE_RATE: u32 = 48_000;

fn sine(freq: f64, amplitude: f64, sample_rate: u32, len: usize) -> Vec<i16> {
    (0..len)
        .map(|i| {
            let t = i as f64 / f64::from(sample_rate);
            (amplitude * (2.0 * std::f64::consts::PI * freq * t).sin()).round() as i16
        })
        .collect()
}

/// One instance of every effect kind
fn all_effects() -> Vec<Box<dyn AudioEffect>> {
    vec![
        Box::new(PitchShift::constant(1.5)),
        Box::new(PitchShift::new(PitchFunction::oscillate(1.0, 0.3, 2.0))),
        Box::new(LowPassFilter::new(1_200.0, 3.0)),
        Box::new(HighPassFilter::new(400.0, 0.707)),
        Box::new(Equalizer::new(vec![
            EqBand::new(200.0, 1.0, 6.0),
            EqBand::new(2_000.0, 2.0, -6.0),
        ])),
        Box::new(BitCrush::new(0.3)),
        Box::new(Reverb::new(0.7, 0.4, 0.5)),
        Box::new(Mixer::new(
            SecondarySource::Generator(mixer::tone(220.0, 0.3)),
            0.4,
        )),
    ]
}

#[test]
fn reset_restores_first_call_output() {
    let input = sine(440.0, 12_000.0, SAMPLE_RATE, 4_800);

    for mut effect in all_effects() {
        let first = effect.process(&input, 0.0, SAMPLE_RATE).unwrap();
        // drive into steady state
        for block in 1..5 {
            effect
                .process(&input, f64::from(block) * 0.1, SAMPLE_RATE)
                .unwrap();
        }
        effect.reset();
        let again = effect.process(&input, 0.0, SAMPLE_RATE).unwrap();
        assert_eq!(again, first, "{} not fully reset", effect.name());

        // reset is idempotent
        effect.reset();
        effect.reset();
        let third = effect.process(&input, 0.0, SAMPLE_RATE).unwrap();
        assert_eq!(third, first, "{} double reset differs", effect.name());
    }
}

#[test]
fn flat_low_pass_is_near_identity() {
    let sample_rate = 44_100;
    let input = sine(100.0, 10_000.0, sample_rate, 44_100);
    let mut filter = LowPassFilter::new(20_000.0, 0.707);
    let out = filter.process(&input, 0.0, sample_rate).unwrap();

    assert_eq!(out.len(), input.len());
    let worst = input
        .iter()
        .zip(&out)
        .skip(64)
        .map(|(a, b)| (i32::from(*a) - i32::from(*b)).abs())
        .max()
        .unwrap();
    // phase lag of the 20 kHz section at 100 Hz is about 15 LSB
    assert!(worst <= 20, "max deviation {worst}");
}

#[test]
fn constant_pitch_through_chain_halves_stream() {
    let input = sine(440.0, 8_000.0, SAMPLE_RATE, 48_000);
    let mut chain = EffectChain::new().with_effect(PitchShift::constant(2.0));

    let total: usize = input
        .chunks(1_200)
        .enumerate()
        .map(|(i, block)| {
            chain
                .process(block, i as f64 * 0.025, SAMPLE_RATE)
                .unwrap()
                .len()
        })
        .sum();

    assert!((23_999..=24_001).contains(&total), "got {total}");
    assert_eq!(chain.speed_multiplier(), 2.0);
}

proptest! {
    #[test]
    fn empty_chain_is_identity(block in prop::collection::vec(any::<i16>(), 0..2_048), time in 0.0f64..1_000.0) {
        let mut chain = EffectChain::new();
        let out = chain.process(&block, time, SAMPLE_RATE).unwrap();
        prop_assert_eq!(&*out, &block[..]);
    }

    #[test]
    fn pitch_shift_length(
        len in 1usize..10_000,
        pitch in prop::sample::select(vec![0.5f32, 1.0, 2.0]),
    ) {
        let block: Vec<i16> = (0..len).map(|i| (i % 1_000) as i16).collect();
        let mut shift = PitchShift::constant(pitch);
        let out = shift.process(&block, 0.0, SAMPLE_RATE).unwrap();

        let expected = (len as f64 / f64::from(pitch)).round() as i64;
        prop_assert!((out.len() as i64 - expected).abs() <= 1);
    }

    #[test]
    fn filters_stay_bounded(
        block in prop::collection::vec(any::<i16>(), 1..4_096),
        cutoff in 20.0f32..20_000.0,
        resonance in 0.1f32..20.0,
    ) {
        let mut chain = EffectChain::new()
            .with_effect(LowPassFilter::new(cutoff, resonance))
            .with_effect(HighPassFilter::new(cutoff / 4.0, 0.707))
            .with_effect(Reverb::default());
        // twice, so filter state carries over
        let first = chain.process(&block, 0.0, SAMPLE_RATE).unwrap().into_owned();
        let second = chain.process(&block, 0.1, SAMPLE_RATE).unwrap().into_owned();
        prop_assert_eq!(first.len(), block.len());
        prop_assert_eq!(second.len(), block.len());
    }

    #[test]
    fn bit_crush_preserves_length(
        block in prop::collection::vec(any::<i16>(), 0..2_048),
        quality in 0.0f32..=1.0,
    ) {
        let mut crush = BitCrush::new(quality);
        let out = crush.process(&block, 0.0, SAMPLE_RATE).unwrap();
        prop_assert_eq!(out.len(), block.len());
    }

    #[test]
    fn mixer_output_matches_primary_length(
        block in prop::collection::vec(any::<i16>(), 0..1_024),
        mix in 0.0f32..=1.0,
    ) {
        let mut effect = Mixer::new(SecondarySource::Generator(mixer::noise(0.5)), mix);
        let out = effect.process(&block, 0.0, SAMPLE_RATE).unwrap();
        prop_assert_eq!(out.len(), block.len());
    }
}
