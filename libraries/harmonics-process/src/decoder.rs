//! ffmpeg command line for raw mono PCM output

use harmonics_core::PipelineConfig;

const PROTOCOL_WHITELIST: &str = "file,http,https,tcp,tls,crypto,hls,applehttp";
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Builds the argument vector for one decoder process
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderCommand {
    program: String,
    input: String,
    sample_rate: u32,
    start_offset: f64,
}

impl DecoderCommand {
    pub fn new(program: impl Into<String>, input: impl Into<String>, sample_rate: u32) -> Self {
        Self {
            program: program.into(),
            input: input.into(),
            sample_rate,
            start_offset: 0.0,
        }
    }

    pub fn from_config(config: &PipelineConfig, input: impl Into<String>) -> Self {
        Self::new(
            config.ffmpeg_path.to_string_lossy().into_owned(),
            input,
            config.sample_rate,
        )
    }

    /// Seek to `seconds` before decoding. Non-positive offsets are ignored.
    #[must_use]
    pub fn start_at(mut self, seconds: f64) -> Self {
        self.start_offset = seconds;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn is_network_input(&self) -> bool {
        let lower = self.input.to_ascii_lowercase();
        ["http://", "https://", "tcp://", "tls://"]
            .iter()
            .any(|scheme| lower.starts_with(scheme))
    }

    pub fn args(&self) -> Vec<String> {
        let mut args = Vec::with_capacity(24);

        // -ss before -i seeks on the input, which is much faster
        if self.start_offset > 0.0 {
            args.extend(["-ss".to_string(), seek_string(self.start_offset)]);
        }

        args.extend([
            "-protocol_whitelist".to_string(),
            PROTOCOL_WHITELIST.to_string(),
        ]);

        if self.is_network_input() {
            args.extend([
                "-user_agent".to_string(),
                USER_AGENT.to_string(),
                "-reconnect".to_string(),
                "1".to_string(),
                "-reconnect_streamed".to_string(),
                "1".to_string(),
                "-reconnect_delay_max".to_string(),
                "2".to_string(),
            ]);
        }

        args.extend([
            "-i".to_string(),
            self.input.clone(),
            "-f".to_string(),
            "s16le".to_string(),
            "-ar".to_string(),
            self.sample_rate.to_string(),
            "-ac".to_string(),
            "1".to_string(),
            "-loglevel".to_string(),
            "warning".to_string(),
            "pipe:1".to_string(),
        ]);
        args
    }
}

/// Format seconds as `H:MM:SS.mmm`
pub fn seek_string(seconds: f64) -> String {
    let total_millis = (seconds.max(0.0) * 1_000.0).round() as u64;
    let millis = total_millis % 1_000;
    let total_secs = total_millis / 1_000;
    format!(
        "{}:{:02}:{:02}.{:03}",
        total_secs / 3_600,
        (total_secs / 60) % 60,
        total_secs % 60,
        millis
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seek_string_formats() {
        assert_eq!(seek_string(0.0), "0:00:00.000");
        assert_eq!(seek_string(61.5), "0:01:01.500");
        assert_eq!(seek_string(3_723.042), "1:02:03.042");
        assert_eq!(seek_string(-4.0), "0:00:00.000");
    }

    #[test]
    fn file_input_has_no_network_flags() {
        let args = DecoderCommand::new("ffmpeg", "/music/track.flac", 48_000).args();
        assert!(!args.contains(&"-reconnect".to_string()));
        assert!(!args.contains(&"-ss".to_string()));
        assert_eq!(
            &args[args.len() - 11..],
            &[
                "-i",
                "/music/track.flac",
                "-f",
                "s16le",
                "-ar",
                "48000",
                "-ac",
                "1",
                "-loglevel",
                "warning",
                "pipe:1"
            ]
        );
    }

    #[test]
    fn network_input_reconnects_and_seeks_before_input() {
        let args = DecoderCommand::new("ffmpeg", "https://cdn.example.com/a.webm", 44_100)
            .start_at(90.25)
            .args();

        assert_eq!(args[0], "-ss");
        assert_eq!(args[1], "0:01:30.250");
        let reconnect = args.iter().position(|a| a == "-reconnect").unwrap();
        let input = args.iter().position(|a| a == "-i").unwrap();
        assert!(reconnect < input);
        assert!(args.contains(&"44100".to_string()));
    }

    #[test]
    fn config_supplies_program_and_rate() {
        let config = PipelineConfig::default();
        let command = DecoderCommand::from_config(&config, "song.mp3");
        assert_eq!(command.program(), "ffmpeg");
        assert!(command.args().contains(&"48000".to_string()));
    }
}
