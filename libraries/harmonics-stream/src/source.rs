/// Where a session's audio comes from
use crate::error::Result;
use harmonics_process::{ResolvedSource, UrlResolver};
use std::fmt;
use std::path::{Path, PathBuf};

const DIRECT_AUDIO_EXTENSIONS: &[&str] = &[
    "mp3", "ogg", "oga", "opus", "flac", "wav", "m4a", "aac", "webm", "weba",
];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum AudioSource {
    /// Local file, handed to the decoder as-is
    File(PathBuf),
    /// Direct audio URL the decoder can open
    Url(String),
    /// Page URL that needs the resolver first
    Resolvable(String),
}

/// What the decoder should open, plus whatever the resolver learned
#[derive(Debug, Clone, PartialEq)]
pub struct DecoderInput {
    pub location: String,
    pub duration_secs: Option<f64>,
    pub title: Option<String>,
}

impl AudioSource {
    /// Classify user input: existing paths are files, URLs with an audio file
    /// extension are direct, any other URL is resolved first.
    pub fn parse(input: &str) -> Self {
        let lower = input.to_ascii_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            return AudioSource::File(PathBuf::from(input));
        }

        let path = lower
            .split(['?', '#'])
            .next()
            .unwrap_or_default();
        let direct = Path::new(path)
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| DIRECT_AUDIO_EXTENSIONS.contains(&ext));

        if direct {
            AudioSource::Url(input.to_string())
        } else {
            AudioSource::Resolvable(input.to_string())
        }
    }

    /// Stable identifier for caching and logging
    pub fn key(&self) -> String {
        match self {
            AudioSource::File(path) => format!("file:{}", path.display()),
            AudioSource::Url(url) => format!("url:{url}"),
            AudioSource::Resolvable(url) => format!("resolve:{url}"),
        }
    }

    pub fn is_network(&self) -> bool {
        !matches!(self, AudioSource::File(_))
    }

    /// Blocking: may run the resolver
    pub fn decoder_input(&self, resolver: &dyn UrlResolver) -> Result<DecoderInput> {
        match self {
            AudioSource::File(path) => Ok(DecoderInput {
                location: path.to_string_lossy().into_owned(),
                duration_secs: None,
                title: path
                    .file_stem()
                    .map(|stem| stem.to_string_lossy().into_owned()),
            }),
            AudioSource::Url(url) => Ok(DecoderInput {
                location: url.clone(),
                duration_secs: None,
                title: None,
            }),
            AudioSource::Resolvable(url) => {
                let ResolvedSource {
                    url,
                    duration_secs,
                    title,
                    ..
                } = resolver.resolve(url)?;
                Ok(DecoderInput {
                    location: url,
                    duration_secs,
                    title,
                })
            }
        }
    }
}

impl fmt::Display for AudioSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AudioSource::File(path) => write!(f, "{}", path.display()),
            AudioSource::Url(url) | AudioSource::Resolvable(url) => f.write_str(url),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harmonics_process::ProcessError;
    use std::collections::HashMap;

    struct Fixed;

    impl UrlResolver for Fixed {
        fn resolve(&self, reference: &str) -> harmonics_process::Result<ResolvedSource> {
            if reference.contains("missing") {
                return Err(ProcessError::SourceResolution("not found".into()));
            }
            Ok(ResolvedSource {
                url: "https://cdn.example.com/stream.webm".into(),
                duration_secs: Some(180.0),
                title: Some("Resolved".into()),
                http_headers: HashMap::new(),
            })
        }
    }

    #[test]
    fn classifies_inputs() {
        assert_eq!(
            AudioSource::parse("/music/a.flac"),
            AudioSource::File(PathBuf::from("/music/a.flac"))
        );
        assert_eq!(
            AudioSource::parse("https://example.com/song.MP3?token=1"),
            AudioSource::Url("https://example.com/song.MP3?token=1".into())
        );
        assert_eq!(
            AudioSource::parse("https://www.youtube.com/watch?v=abc"),
            AudioSource::Resolvable("https://www.youtube.com/watch?v=abc".into())
        );
    }

    #[test]
    fn resolvable_sources_go_through_resolver() {
        let input = AudioSource::Resolvable("https://example.com/watch?v=1".into())
            .decoder_input(&Fixed)
            .unwrap();
        assert_eq!(input.location, "https://cdn.example.com/stream.webm");
        assert_eq!(input.duration_secs, Some(180.0));

        let failed = AudioSource::Resolvable("https://example.com/missing".into())
            .decoder_input(&Fixed);
        assert!(failed.is_err());
    }

    #[test]
    fn files_use_their_stem_as_title() {
        let input = AudioSource::File(PathBuf::from("/tmp/intro.ogg"))
            .decoder_input(&Fixed)
            .unwrap();
        assert_eq!(input.location, "/tmp/intro.ogg");
        assert_eq!(input.title.as_deref(), Some("intro"));
        assert!(!AudioSource::File(PathBuf::from("x")).is_network());
    }

    #[test]
    fn keys_distinguish_kinds() {
        let url = "https://example.com/a.mp3";
        assert_ne!(
            AudioSource::Url(url.into()).key(),
            AudioSource::Resolvable(url.into()).key()
        );
    }
}
