//! Console logging for the engine's `tracing` events.

use std::io::{self, Write};
use std::panic::{self, PanicHookInfo};
use std::str::FromStr;
use std::sync::{Mutex, Once};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::fmt::{self, writer::MakeWriter};
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

const TRACING_PREFIX: &str = "[waterfall] ";
const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::INFO;

static PANIC_HOOK_INSTALLED: Once = Once::new();
static TRACING_INSTALLED: Once = Once::new();
static LOG_LEVEL: Mutex<LevelFilter> = Mutex::new(DEFAULT_LOG_LEVEL);

fn current_level() -> LevelFilter {
    LOG_LEVEL.lock().map_or(DEFAULT_LOG_LEVEL, |guard| *guard)
}

/// Updates the console level at runtime. Unknown names fall back to `info`.
///
/// `RUST_LOG` still applies on top of this level.
pub fn set_log_level(level: &str) {
    let parsed = LevelFilter::from_str(level).unwrap_or(DEFAULT_LOG_LEVEL);
    if let Ok(mut guard) = LOG_LEVEL.lock() {
        *guard = parsed;
    }
}

/// Installs a stderr subscriber (idempotent).
///
/// Filtering follows `RUST_LOG` when set, `info` otherwise, further narrowed by
/// [`set_log_level`]. Fails quietly if another global subscriber is already set.
pub fn install_tracing() {
    TRACING_INSTALLED.call_once(|| {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
        let console = fmt::layer()
            .with_writer(PrefixedWriter)
            .with_ansi(false)
            .with_target(true)
            .with_filter(filter_fn(|metadata| *metadata.level() <= current_level()));

        if tracing_subscriber::registry()
            .with(filter)
            .with(console)
            .try_init()
            .is_err()
        {
            eprintln!("{TRACING_PREFIX}a global tracing subscriber is already installed");
        }
    });
}

/// Routes panics through `tracing` before the previous hook runs (idempotent).
pub fn install_panic_logger() {
    PANIC_HOOK_INSTALLED.call_once(|| {
        let previous = panic::take_hook();
        panic::set_hook(Box::new(move |info| {
            log_panic(info);
            previous(info);
        }));
    });
}

fn log_panic(info: &PanicHookInfo<'_>) {
    let message = panic_message(info);
    let location = info
        .location()
        .map(|location| format!("{}:{}", location.file(), location.line()))
        .unwrap_or_default();
    tracing::error!(target: "waterfall::panic", %message, %location, "panicked");
}

fn panic_message(info: &PanicHookInfo<'_>) -> String {
    if let Some(message) = info.payload().downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = info.payload().downcast_ref::<String>() {
        message.clone()
    } else {
        "Unknown panic".to_owned()
    }
}

#[derive(Clone, Default)]
struct PrefixedWriter;

impl<'a> MakeWriter<'a> for PrefixedWriter {
    type Writer = PrefixedWriterInner<io::Stderr>;

    fn make_writer(&'a self) -> Self::Writer {
        PrefixedWriterInner {
            inner: io::stderr(),
            wrote_prefix: false,
        }
    }
}

struct PrefixedWriterInner<W> {
    inner: W,
    wrote_prefix: bool,
}

impl<W: Write> Write for PrefixedWriterInner<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if !self.wrote_prefix {
            self.inner.write_all(TRACING_PREFIX.as_bytes())?;
            self.wrote_prefix = true;
        }
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

#[cfg(test)]
mod tests {
    use tracing::Level;

    use super::*;

    #[test]
    fn log_level_narrows_console_output() {
        install_tracing();
        install_tracing();
        set_log_level("warn");
        assert_eq!(current_level(), LevelFilter::WARN);
        assert!(Level::ERROR <= current_level());
        assert!(Level::INFO > current_level());
        set_log_level("not a level");
        assert_eq!(current_level(), DEFAULT_LOG_LEVEL);
    }
}
