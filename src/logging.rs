/*!
 * Logging and tracing initialization
 *
 * The engine logs in two stages, following the job controller's lifecycle (§4.5):
 * a bootstrap stdout logger is active while sources and the target root are being
 * resolved. That same process sets up a file layer pointed at a [`SharedFileWriter`]
 * that starts out empty (and so discards everything written to it); once the dated
 * target directory exists, [`attach_target_log`] opens `<targetRoot>/log.txt` and
 * swaps it into that writer, so the one global subscriber installed at startup
 * starts actually writing to the file without ever being reinstalled.
 */

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};

use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan, MakeWriter},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::error::{BackupError, Result};

/// A `tracing-subscriber` writer whose backing file can be swapped in after
/// the global subscriber has already been installed. Before a file is set,
/// writes are silently discarded; this is what lets [`attach_target_log`]
/// start writing to `<targetRoot>/log.txt` without a second
/// `set_global_default` call, which can only ever succeed once per process.
#[derive(Clone, Default)]
struct SharedFileWriter(Arc<Mutex<Option<File>>>);

impl SharedFileWriter {
    fn set(&self, file: File) {
        *self.0.lock().unwrap() = Some(file);
    }
}

impl Write for SharedFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self.0.lock().unwrap().as_mut() {
            Some(file) => file.write(buf),
            None => Ok(buf.len()),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self.0.lock().unwrap().as_mut() {
            Some(file) => file.flush(),
            None => Ok(()),
        }
    }
}

impl<'a> MakeWriter<'a> for SharedFileWriter {
    type Writer = SharedFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// The writer backing the per-run file layer installed by
/// [`init_bootstrap_logging`]. Set once; [`attach_target_log`] reaches into
/// it later to point it at the actual log file.
static TARGET_LOG_WRITER: OnceLock<SharedFileWriter> = OnceLock::new();

fn env_filter(level: Level) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("frontguard={level}")))
        .map_err(|e| BackupError::Config(format!("failed to build log filter: {e}")))
}

/// Initialize the global subscriber. Called once at process start, before
/// the target backup directory is known: installs both the stdout layer and
/// a file layer that discards output until [`attach_target_log`] gives it
/// somewhere to write.
pub fn init_bootstrap_logging(level: Level) -> Result<()> {
    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    let writer = SharedFileWriter::default();
    let file_layer = fmt::layer()
        .with_writer(writer.clone())
        .with_target(true)
        .with_ansi(false)
        .with_span_events(FmtSpan::NONE);

    TARGET_LOG_WRITER
        .set(writer)
        .map_err(|_| BackupError::Config("logging was already initialized".into()))?;

    tracing_subscriber::registry()
        .with(env_filter(level)?)
        .with(fmt_layer)
        .with(file_layer)
        .init();
    Ok(())
}

/// Points the file layer installed by [`init_bootstrap_logging`] at
/// `<targetRoot>/log.txt`, so every event from here on is also written
/// there. Must be called after `init_bootstrap_logging`.
pub fn attach_target_log(log_path: &Path) -> Result<()> {
    let file = File::create(log_path)
        .map_err(|e| BackupError::Config(format!("failed to create {}: {e}", log_path.display())))?;

    // Absent in tests that exercise `job::run` without going through
    // `main`'s `init_bootstrap_logging` call; the file is still created
    // (satisfying the on-disk layout), it just has nothing wired up to
    // write to it.
    if let Some(writer) = TARGET_LOG_WRITER.get() {
        writer.set(file);
    }
    Ok(())
}

/// Installs a subscriber that writes to the test harness's captured output
/// instead of stdout. Exposed (not `#[cfg(test)]`) so integration tests in
/// `tests/` can call it too; idempotent, so every test can call it
/// unconditionally.
pub fn init_test_logging() {
    use std::sync::Once;
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        let fmt_layer = fmt::layer().with_test_writer().with_target(false).compact();
        let writer = SharedFileWriter::default();
        let _ = TARGET_LOG_WRITER.set(writer);
        let _ = tracing_subscriber::registry()
            .with(EnvFilter::new("frontguard=debug"))
            .with(fmt_layer)
            .try_init();
    });
}
