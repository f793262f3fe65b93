/// Harmonics - render audio through a pitch and effects pipeline
use anyhow::Context;
use clap::Parser;
use harmonics_cli::{output, Cli, Commands, RenderArgs};
use harmonics_core::PipelineConfig;
use harmonics_process::{LifecycleRegistry, UrlResolver, YtDlpResolver};
use harmonics_stream::{SessionKey, SessionManager};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr: stdout may carry PCM
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "harmonics=info".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Render(args) => {
            let registry = Arc::new(LifecycleRegistry::new());
            let sessions = SessionManager::new(config, registry);
            let result = render(&sessions, args).await;

            let report = sessions.shutdown().await;
            if !report.is_clean() {
                tracing::warn!(failures = report.failures.len(), "Shutdown left failures");
            }
            result?;
        }
        Commands::Resolve { reference } => {
            resolve(&config, reference).await?;
        }
    }

    Ok(())
}

async fn render(sessions: &SessionManager, args: RenderArgs) -> anyhow::Result<()> {
    let sample_rate = sessions.config().sample_rate;
    let playback = sessions
        .play(
            SessionKey::random(),
            args.source(),
            args.pitch_function(),
            args.effect_chain(),
            args.start,
        )
        .await
        .with_context(|| format!("failed to start {}", args.input))?;

    tracing::info!(
        title = playback.title.as_deref().unwrap_or("unknown"),
        duration = ?playback.duration_secs,
        "Rendering {}",
        args.input
    );

    // Ctrl-C closes the stream; the sink then finishes what it has
    let control = playback.stream.control();
    let interrupt = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, finishing output");
            control.close();
        }
    });

    let mut stream = playback.stream;
    let target = args.output.clone();
    let written = tokio::task::spawn_blocking(move || match target {
        Some(path) => output::write_wav(&mut stream, &path, sample_rate),
        None => output::write_raw(&mut stream, &mut std::io::stdout().lock()),
    })
    .await??;
    interrupt.abort();

    tracing::info!(
        samples = written,
        seconds = written as f64 / f64::from(sample_rate),
        "Render complete"
    );
    Ok(())
}

async fn resolve(config: &PipelineConfig, reference: String) -> anyhow::Result<()> {
    let resolver = YtDlpResolver::from_config(config);
    let source = tokio::task::spawn_blocking(move || resolver.resolve(&reference)).await??;

    let json = serde_json::json!({
        "url": source.url,
        "title": source.title,
        "duration": source.duration_secs,
        "http_headers": source.http_headers,
    });
    println!("{}", serde_json::to_string_pretty(&json)?);
    Ok(())
}
