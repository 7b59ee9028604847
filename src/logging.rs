//! Process-wide logger setup.
//!
//! Every module logs through the `log` facade. This installs `env_logger`
//! with a timestamped line format and mirrors each line into a daily log
//! file under `<exe_dir>/logs/`.

use chrono::Local;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::PathBuf;

use crate::paths;

/// Writes every log line to stderr and, when available, the log file.
struct TeeWriter {
    file: Option<File>,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let _ = io::stderr().write_all(buf);
        if let Some(file) = self.file.as_mut() {
            // best effort
            let _ = file.write_all(buf);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        if let Some(file) = self.file.as_mut() {
            let _ = file.flush();
        }
        Ok(())
    }
}

/// Returns today's log file path: `<exe_dir>/logs/table_scout_YYYY-MM-DD.log`
pub fn log_file_path() -> PathBuf {
    paths::get_logs_dir().join(format!(
        "table_scout_{}.log",
        Local::now().format("%Y-%m-%d")
    ))
}

fn open_log_file() -> Option<File> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file_path())
        .ok()
}

/// Initializes logging. `RUST_LOG` overrides the default `info` filter.
pub fn init() {
    let writer = TeeWriter {
        file: open_log_file(),
    };

    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format(|buf, record| {
            writeln!(
                buf,
                "[{}] {:<5} {}",
                Local::now().format("%H:%M:%S%.3f"),
                record.level(),
                record.args()
            )
        })
        .target(env_logger::Target::Pipe(Box::new(writer)))
        .try_init();

    install_panic_hook();
}

/// Records panics in the log file, even when they happen on worker threads.
fn install_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let msg = if let Some(s) = panic_info.payload().downcast_ref::<&str>() {
            s.to_string()
        } else if let Some(s) = panic_info.payload().downcast_ref::<String>() {
            s.clone()
        } else {
            "Unknown panic".to_string()
        };
        let location = panic_info
            .location()
            .map(|loc| format!(" at {}:{}:{}", loc.file(), loc.line(), loc.column()))
            .unwrap_or_default();

        let line = format!("[PANIC]{} {}\n", location, msg);
        eprint!("{}", line);
        if let Some(mut file) = open_log_file() {
            let _ = file.write_all(line.as_bytes());
        }
    }));
}
