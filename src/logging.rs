use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

pub const MASTHEAD: &str = "\
*********************************************************************
* LD Score Regression (LDSC)
* Rust edition
*********************************************************************";

pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// Human-readable run transcript. Every line goes to the `.log` file and is
/// mirrored to the console through `tracing`.
pub struct RunLog {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl RunLog {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Opens `<prefix>.log` and writes the masthead plus the options header.
    pub fn for_prefix(prefix: &str, options: &[String]) -> Result<Self> {
        let mut log = Self::open(Path::new(&format!("{prefix}.log")))?;
        log.line(MASTHEAD)?;
        if !options.is_empty() {
            log.line("Options:")?;
            for opt in options {
                log.line(opt)?;
            }
        }
        log.line("")?;
        Ok(log)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn line(&mut self, message: &str) -> Result<()> {
        for part in message.lines() {
            info!("{part}");
        }
        writeln!(self.writer, "{message}")?;
        Ok(())
    }

    pub fn warn(&mut self, message: &str) -> Result<()> {
        warn!("{message}");
        writeln!(self.writer, "{message}")?;
        Ok(())
    }

    pub fn close(mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

impl Drop for RunLog {
    fn drop(&mut self) {
        let _ = self.writer.flush();
    }
}
