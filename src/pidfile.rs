//! PID file creation at `/run/<progname>.pid`.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

pub struct PidFile {
    path: PathBuf,
}

impl PidFile {
    pub fn create(progname: &str) -> Result<Self> {
        let path = Path::new("/run").join(format!("{progname}.pid"));
        fs::write(&path, format!("{}\n", std::process::id()))
            .with_context(|| format!("could not write pid file '{}'", path.display()))?;
        Ok(PidFile { path })
    }
}

impl Drop for PidFile {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.path);
    }
}
