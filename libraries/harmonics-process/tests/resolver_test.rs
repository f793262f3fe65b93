//! yt-dlp resolution through stand-in scripts
#![cfg(unix)]

use harmonics_core::ManualClock;
use harmonics_process::{CachedResolver, ProcessError, UrlResolver, YtDlpResolver};
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

fn write_script(dir: &Path, name: &str, body: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
    path.to_string_lossy().into_owned()
}

// One test so no other thread forks while the scripts are being written
#[test]
fn resolves_through_external_program() {
    let dir = tempfile::tempdir().unwrap();
    let good = write_script(
        dir.path(),
        "resolver-ok",
        r#"echo '{"url":"https://cdn.example.com/audio.webm","duration":245.5,"title":"Demo"}'"#,
    );
    let bad = write_script(dir.path(), "resolver-fail", "echo 'ERROR: unavailable' >&2; exit 1");

    let resolver = YtDlpResolver::new(&good);
    let source = resolver.resolve("https://example.com/watch?v=demo").unwrap();
    assert_eq!(source.url, "https://cdn.example.com/audio.webm");
    assert_eq!(source.duration_secs, Some(245.5));
    assert_eq!(source.title.as_deref(), Some("Demo"));

    let failing = YtDlpResolver::new(&bad);
    match failing.resolve("https://example.com/watch?v=gone") {
        Err(ProcessError::SourceResolution(message)) => assert!(message.contains("unavailable")),
        other => panic!("expected resolution error, got {other:?}"),
    }

    let missing = YtDlpResolver::new(dir.path().join("nope").to_string_lossy());
    assert!(matches!(
        missing.resolve("x"),
        Err(ProcessError::Spawn { .. })
    ));

    let cached = CachedResolver::new(
        resolver,
        4,
        Duration::from_secs(3_600),
        Arc::new(ManualClock::new()),
    );
    let first = cached.resolve("https://example.com/watch?v=demo").unwrap();
    // the script is gone; a second resolution must come from the cache
    fs::remove_file(&good).unwrap();
    let second = cached.resolve("https://example.com/watch?v=demo").unwrap();
    assert_eq!(first, second);
}
