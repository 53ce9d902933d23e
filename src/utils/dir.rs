use std::{
    env, io,
    path::{Path, PathBuf},
};

use anyhow::Result;

use crate::config::CONFIG_FILE_NAME;

pub const APPLICATION_DIR_NAME: &str = "windowtrail";

pub fn create_application_default_path() -> Result<PathBuf> {
    let path = {
        #[cfg(windows)]
        {
            let mut path = env::var("APPDATA")
                .map(PathBuf::from)
                .map_err(|_| anyhow::anyhow!("APPDATA should be present on Windows"))?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
        #[cfg(not(windows))]
        {
            let mut path = env::var("XDG_STATE_HOME")
                .map(PathBuf::from)
                .or_else(|_| {
                    env::var("HOME").map(|home| {
                        let mut path = PathBuf::from(home);
                        path.push(".local/state");
                        path
                    })
                })
                .map_err(|_| anyhow::anyhow!("Couldn't find neither XDG_STATE_HOME nor HOME"))?;
            path.push(APPLICATION_DIR_NAME);
            path
        }
    };

    ensure_dir(&path)?;
    Ok(path)
}

pub fn ensure_dir(path: &Path) -> Result<()> {
    match std::fs::create_dir_all(path) {
        Ok(_) => Ok(()),
        Err(v) if v.kind() == io::ErrorKind::AlreadyExists => Ok(()),
        Err(v) => Err(v.into()),
    }
}

/// Directories used by the daemon inside the application directory.
#[derive(Debug, Clone)]
pub struct AppLayout {
    pub root: PathBuf,
}

impl AppLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Activity logs, the error log and tracing output.
    pub fn logs(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Staging area for flushes. Lives next to the logs so that renames stay on one file system.
    pub fn temp(&self) -> PathBuf {
        self.root.join("temp")
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join("config").join(CONFIG_FILE_NAME)
    }
}
