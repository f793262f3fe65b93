//! Decoder subprocess supervision
//!
//! Every spawned process is registered with the [`LifecycleRegistry`] before
//! its output is handed to the caller. A monitor thread drains stderr into the
//! log so the pipe never fills, and unregisters the process once it exits on
//! its own.

use crate::error::{ProcessError, Result};
use crate::registry::{lock, LifecycleRegistry, Resource, ResourceId};
use crossbeam_channel::RecvTimeoutError;
use harmonics_core::PipelineConfig;
use std::fmt;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStderr, ChildStdin, Command, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, trace, warn};

const EXIT_POLL: Duration = Duration::from_millis(10);
const READY_PROBE_BYTES: usize = 4_096;

/// A running decoder process owned by the registry
pub struct ProcessHandle {
    label: String,
    pid: u32,
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    kill_grace: Duration,
    released: Arc<AtomicBool>,
}

impl ProcessHandle {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    pub(crate) fn describe(&self) -> String {
        format!("{} (pid {})", self.label, self.pid)
    }

    /// Ask the process to quit, then kill it once the grace period runs out
    pub(crate) fn terminate(mut self) -> Result<()> {
        self.released.store(true, Ordering::Release);

        if let Some(mut stdin) = self.stdin.take() {
            // ffmpeg stops on "q"; closing stdin covers everything else
            if let Err(e) = stdin.write_all(b"q\n").and_then(|()| stdin.flush()) {
                trace!(process = %self.label, "stdin already closed: {}", e);
            }
        }

        let deadline = Instant::now() + self.kill_grace;
        loop {
            if let Some(status) = lock(&self.child).try_wait()? {
                debug!(process = %self.label, pid = self.pid, %status, "Process stopped");
                return Ok(());
            }
            if Instant::now() >= deadline {
                break;
            }
            thread::sleep(EXIT_POLL);
        }

        debug!(process = %self.label, pid = self.pid, "Grace period elapsed, killing");
        let mut child = lock(&self.child);
        match child.kill() {
            Ok(()) => {}
            // already reaped between the last poll and now
            Err(e) if e.kind() == io::ErrorKind::InvalidInput => {}
            Err(e) => return Err(e.into()),
        }
        child.wait()?;
        Ok(())
    }
}

impl fmt::Debug for ProcessHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessHandle")
            .field("label", &self.label)
            .field("pid", &self.pid)
            .finish_non_exhaustive()
    }
}

/// Byte source over a decoder's stdout
///
/// Bytes consumed while probing for readiness are kept and served first.
pub struct DecoderOutput {
    pending: Cursor<Vec<u8>>,
    inner: Box<dyn Read + Send>,
}

impl DecoderOutput {
    pub fn new(reader: impl Read + Send + 'static) -> Self {
        Self {
            pending: Cursor::new(Vec::new()),
            inner: Box::new(reader),
        }
    }

    fn has_pending(&self) -> bool {
        (self.pending.position() as usize) < self.pending.get_ref().len()
    }

    /// Wait until at least one byte is available or the process is gone
    ///
    /// A probe thread performs the first blocking read; this call checks on
    /// it every `poll` and gives up after `timeout`.
    pub fn wait_until_readable(self, timeout: Duration, poll: Duration) -> Readiness {
        if self.has_pending() {
            return Readiness::Ready(self);
        }

        let (tx, rx) = crossbeam_channel::bounded(1);
        let mut inner = self.inner;
        let probe = thread::Builder::new()
            .name("decoder-ready".into())
            .spawn(move || {
                let mut first = vec![0u8; READY_PROBE_BYTES];
                let result = loop {
                    match inner.read(&mut first) {
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        other => break other,
                    }
                };
                // receiver is gone if the caller timed out
                let _ = tx.send((inner, first, result));
            });
        if let Err(e) = probe {
            return Readiness::Failed(e);
        }

        let deadline = Instant::now() + timeout;
        loop {
            let now = Instant::now();
            if now >= deadline {
                debug!(?timeout, "Decoder produced no output in time");
                return Readiness::TimedOut;
            }
            match rx.recv_timeout(poll.min(deadline - now)) {
                Ok((inner, mut first, Ok(read))) if read > 0 => {
                    first.truncate(read);
                    return Readiness::Ready(DecoderOutput {
                        pending: Cursor::new(first),
                        inner,
                    });
                }
                Ok((_, _, Ok(_))) | Err(RecvTimeoutError::Disconnected) => {
                    return Readiness::Exited;
                }
                Ok((_, _, Err(e))) => return Readiness::Failed(e),
                Err(RecvTimeoutError::Timeout) => trace!("Waiting for decoder output"),
            }
        }
    }
}

impl Read for DecoderOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.has_pending() {
            return self.pending.read(buf);
        }
        self.inner.read(buf)
    }
}

impl fmt::Debug for DecoderOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderOutput")
            .field("pending", &self.pending.get_ref().len())
            .finish_non_exhaustive()
    }
}

/// Result of [`DecoderOutput::wait_until_readable`]
#[derive(Debug)]
pub enum Readiness {
    Ready(DecoderOutput),
    /// Output closed before any byte arrived
    Exited,
    TimedOut,
    Failed(io::Error),
}

impl Readiness {
    pub fn is_ready(&self) -> bool {
        matches!(self, Readiness::Ready(_))
    }

    pub fn into_output(self) -> Option<DecoderOutput> {
        match self {
            Readiness::Ready(output) => Some(output),
            _ => None,
        }
    }
}

/// A freshly spawned, already registered process
#[derive(Debug)]
pub struct SpawnedProcess {
    pub id: ResourceId,
    pub pid: u32,
    pub output: DecoderOutput,
}

#[derive(Debug, Clone)]
pub struct SubprocessManager {
    registry: Arc<LifecycleRegistry>,
    kill_grace: Duration,
}

impl SubprocessManager {
    pub fn new(registry: Arc<LifecycleRegistry>, kill_grace: Duration) -> Self {
        Self {
            registry,
            kill_grace,
        }
    }

    pub fn from_config(registry: Arc<LifecycleRegistry>, config: &PipelineConfig) -> Self {
        Self::new(registry, config.kill_grace())
    }

    pub fn registry(&self) -> &Arc<LifecycleRegistry> {
        &self.registry
    }

    /// Start `program` with piped stdio and register it
    ///
    /// Nothing is registered when the launch fails.
    pub fn spawn(&self, program: &str, args: &[String]) -> Result<SpawnedProcess> {
        let mut child = Command::new(program)
            .args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|source| {
                error!(program, "Failed to start process: {}", source);
                ProcessError::Spawn {
                    program: program.to_string(),
                    source,
                }
            })?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(ProcessError::Lifecycle(format!(
                "{program} started without piped stdio"
            )));
        };

        let label = Path::new(program)
            .file_name()
            .map_or_else(|| program.to_string(), |name| name.to_string_lossy().into_owned());
        let pid = child.id();
        let child = Arc::new(Mutex::new(child));
        let released = Arc::new(AtomicBool::new(false));

        let id = self.registry.register(Resource::Process(ProcessHandle {
            label: label.clone(),
            pid,
            child: Arc::clone(&child),
            stdin: Some(stdin),
            kill_grace: self.kill_grace,
            released: Arc::clone(&released),
        }));

        let monitor = Monitor {
            id,
            label: label.clone(),
            child,
            released,
            registry: Arc::clone(&self.registry),
        };
        if let Err(e) = thread::Builder::new()
            .name(format!("{label}-stderr"))
            .spawn(move || monitor.run(stderr))
        {
            self.registry.destroy(id)?;
            return Err(e.into());
        }

        debug!(id, pid, process = %label, "Spawned process");
        Ok(SpawnedProcess {
            id,
            pid,
            output: DecoderOutput::new(stdout),
        })
    }

    /// Stop a process. Unknown or already destroyed ids are a no-op.
    pub fn destroy(&self, id: ResourceId) -> Result<()> {
        self.registry.destroy(id).map(|_| ())
    }
}

/// Drains stderr and reports how the process ended
struct Monitor {
    id: ResourceId,
    label: String,
    child: Arc<Mutex<Child>>,
    released: Arc<AtomicBool>,
    registry: Arc<LifecycleRegistry>,
}

impl Monitor {
    fn run(self, stderr: ChildStderr) {
        for line in BufReader::new(stderr).lines() {
            match line {
                Ok(line) if line.trim().is_empty() => {}
                Ok(line) => debug!(process = %self.label, id = self.id, "{}", line),
                Err(e) => {
                    debug!(process = %self.label, "stderr unreadable: {}", e);
                    break;
                }
            }
        }

        let status = loop {
            {
                let mut child = lock(&self.child);
                if self.released.load(Ordering::Acquire) {
                    return;
                }
                match child.try_wait() {
                    Ok(Some(status)) => break status,
                    Ok(None) => {}
                    Err(e) => {
                        warn!(process = %self.label, "Could not query exit status: {}", e);
                        return;
                    }
                }
            }
            thread::sleep(EXIT_POLL);
        };

        if status.success() {
            info!(process = %self.label, id = self.id, "Process completed");
        } else {
            warn!(process = %self.label, id = self.id, code = ?status.code(), "Process exited with {}", status);
        }

        if let Err(e) = self.registry.destroy(self.id) {
            warn!(process = %self.label, id = self.id, "Cleanup after exit failed: {}", e);
        }
    }
}
