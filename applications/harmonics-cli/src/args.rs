/// Command-line arguments
use clap::{Args, Parser, Subcommand};
use harmonics_dsp::effects::{
    mixer, underwater_setting, BitCrush, EqBand, Equalizer, HighPassFilter, Liquid,
    LowPassFilter, Mixer, Reverb, SecondarySource,
};
use harmonics_dsp::{EffectChain, PitchFunction};
use harmonics_stream::AudioSource;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "harmonics")]
#[command(about = "Decode audio through a pitch and effects pipeline", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, global = true, env = "HARMONICS_CONFIG")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render a file or URL through the effect chain
    Render(RenderArgs),
    /// Resolve a page URL to a direct audio URL and print it as JSON
    Resolve {
        /// Page URL understood by yt-dlp
        reference: String,
    },
}

#[derive(Args, Debug, Clone)]
pub struct RenderArgs {
    /// Local path, direct audio URL or page URL
    pub input: String,

    /// WAV file to write; raw s16le mono PCM goes to stdout when omitted
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Seconds to skip at the start of the input
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Playback pitch (1.0 = unchanged, 2.0 = an octave up and twice as fast)
    #[arg(short, long, default_value_t = 1.0)]
    pub pitch: f32,

    /// Glide linearly from --pitch to this pitch over --glide-secs
    #[arg(long)]
    pub glide_to: Option<f32>,

    #[arg(long, default_value_t = 10.0)]
    pub glide_secs: f64,

    /// Vibrato depth around --pitch
    #[arg(long, conflicts_with = "glide_to")]
    pub vibrato: Option<f32>,

    #[arg(long, default_value_t = 5.0)]
    pub vibrato_hz: f64,

    /// Low-pass cutoff in Hz
    #[arg(long)]
    pub lowpass: Option<f32>,

    /// Low-pass resonance (Q)
    #[arg(long, default_value_t = 0.707)]
    pub resonance: f32,

    /// Underwater muffling: covered faces 1-4 (overrides --lowpass)
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=6))]
    pub underwater: Option<u32>,

    /// Use the thick-liquid underwater curve
    #[arg(long, requires = "underwater")]
    pub thick: bool,

    /// High-pass cutoff in Hz
    #[arg(long)]
    pub highpass: Option<f32>,

    /// Peaking EQ band as FREQ:Q:GAIN_DB, repeatable
    #[arg(long = "eq", value_name = "FREQ:Q:GAIN_DB", value_parser = parse_band)]
    pub eq: Vec<EqBand>,

    /// Bit-crush quality from 0.0 (harsh) to 1.0 (clean)
    #[arg(long)]
    pub bitcrush: Option<f32>,

    /// Reverb room size in [0, 1]
    #[arg(long)]
    pub reverb: Option<f32>,

    #[arg(long, default_value_t = 0.5)]
    pub damping: f32,

    #[arg(long, default_value_t = 0.3)]
    pub wet: f32,

    /// Mix in a sine tone at this frequency (Hz)
    #[arg(long)]
    pub tone: Option<f32>,

    /// Mix in white noise
    #[arg(long, conflicts_with = "tone")]
    pub noise: bool,

    /// Secondary level for --tone / --noise
    #[arg(long, default_value_t = 0.25)]
    pub mix: f32,
}

impl RenderArgs {
    pub fn source(&self) -> AudioSource {
        AudioSource::parse(&self.input)
    }

    pub fn pitch_function(&self) -> PitchFunction {
        if let Some(end) = self.glide_to {
            PitchFunction::linear(self.pitch, end, self.glide_secs)
        } else if let Some(depth) = self.vibrato {
            PitchFunction::oscillate(self.pitch, depth, self.vibrato_hz)
        } else {
            PitchFunction::constant(self.pitch)
        }
    }

    /// Effects in a fixed order: filters, EQ, crush, reverb, then the mixer.
    /// Pitch shifting is prepended by the session.
    pub fn effect_chain(&self) -> EffectChain {
        let mut chain = EffectChain::new();

        let low_pass = match self.underwater {
            Some(faces) if faces > 0 => {
                let liquid = if self.thick { Liquid::Thick } else { Liquid::Thin };
                Some(underwater_setting(faces, liquid))
            }
            _ => self.lowpass.map(|cutoff| (cutoff, self.resonance)),
        };
        if let Some((cutoff, resonance)) = low_pass {
            chain = chain.with_effect(LowPassFilter::new(cutoff, resonance));
        }
        if let Some(cutoff) = self.highpass {
            chain = chain.with_effect(HighPassFilter::new(cutoff, 0.707));
        }
        if !self.eq.is_empty() {
            chain = chain.with_effect(Equalizer::new(self.eq.clone()));
        }
        if let Some(quality) = self.bitcrush {
            chain = chain.with_effect(BitCrush::new(quality));
        }
        if let Some(room) = self.reverb {
            chain = chain.with_effect(Reverb::new(room, self.damping, self.wet));
        }

        let secondary = match (self.tone, self.noise) {
            (Some(frequency), _) => Some(mixer::tone(frequency, 0.5)),
            (None, true) => Some(mixer::noise(0.5)),
            (None, false) => None,
        };
        if let Some(generator) = secondary {
            chain = chain.with_effect(Mixer::new(SecondarySource::Generator(generator), self.mix));
        }

        chain
    }
}

/// Parse `FREQ:Q:GAIN_DB`
fn parse_band(value: &str) -> Result<EqBand, String> {
    let parts: Vec<&str> = value.split(':').collect();
    let [frequency, q, gain] = parts.as_slice() else {
        return Err(format!("expected FREQ:Q:GAIN_DB, got '{value}'"));
    };
    let number = |field: &str, name: &str| {
        field
            .trim()
            .parse::<f32>()
            .map_err(|_| format!("invalid {name} '{field}' in '{value}'"))
    };
    let frequency = number(frequency, "frequency")?;
    if frequency <= 0.0 {
        return Err(format!("frequency must be positive in '{value}'"));
    }
    Ok(EqBand::new(frequency, number(q, "Q")?, number(gain, "gain")?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn render(args: &[&str]) -> RenderArgs {
        let argv = ["harmonics", "render"].iter().chain(args);
        match Cli::try_parse_from(argv).unwrap().command {
            Commands::Render(args) => args,
            Commands::Resolve { .. } => panic!("expected render"),
        }
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_are_a_passthrough() {
        let args = render(&["song.flac"]);
        assert!(args.effect_chain().is_empty());
        assert_eq!(args.pitch_function().constant_value(), Some(1.0));
        assert!(matches!(args.source(), AudioSource::File(_)));
        assert!(args.output.is_none());
    }

    #[test]
    fn builds_chain_in_order() {
        let args = render(&[
            "https://cdn.example.com/a.mp3",
            "--lowpass",
            "800",
            "--highpass",
            "60",
            "--eq",
            "1000:1.0:6",
            "--eq",
            "4000:2:-3",
            "--bitcrush",
            "0.5",
            "--reverb",
            "0.8",
            "--tone",
            "440",
        ]);
        assert_eq!(args.eq.len(), 2);
        assert_eq!(args.eq[1].gain_db(), -3.0);
        let chain = args.effect_chain();
        assert_eq!(chain.len(), 6);
        assert!(matches!(args.source(), AudioSource::Url(_)));
    }

    #[test]
    fn underwater_replaces_low_pass() {
        let args = render(&["a.ogg", "--lowpass", "5000", "--underwater", "4", "--thick"]);
        assert_eq!(args.effect_chain().len(), 1);

        // zero covered faces means no filter unless --lowpass asks for one
        let args = render(&["a.ogg", "--underwater", "0"]);
        assert!(args.effect_chain().is_empty());
    }

    #[test]
    fn pitch_shapes() {
        let args = render(&["a.ogg", "--pitch", "1.5", "--glide-to", "0.5"]);
        let mut pitch = args.pitch_function();
        assert!(pitch.constant_value().is_none());
        assert!((pitch.pitch_at(0.0) - 1.5).abs() < 1e-6);

        let args = render(&["a.ogg", "--vibrato", "0.1"]);
        assert!(args.pitch_function().constant_value().is_none());

        assert!(Cli::try_parse_from([
            "harmonics", "render", "a.ogg", "--vibrato", "0.1", "--glide-to", "2"
        ])
        .is_err());
    }

    #[test]
    fn rejects_malformed_bands() {
        for band in ["1000", "1000:1", "abc:1:2", "-5:1:0", "1:2:3:4"] {
            assert!(parse_band(band).is_err(), "{band} should be rejected");
        }
        let band = parse_band(" 250 : 0.7 : 4.5 ").unwrap();
        assert_eq!(band.frequency, 250.0);
        assert_eq!(band.gain_db(), 4.5);
    }

    #[test]
    fn thick_requires_underwater() {
        assert!(Cli::try_parse_from(["harmonics", "render", "a.ogg", "--thick"]).is_err());
    }
}
