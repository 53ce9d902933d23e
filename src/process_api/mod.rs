//! Process introspection used to resolve executables, working directories and open files of the
//! process owning a window.

#[cfg(feature = "win")]
mod win;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use parking_lot::Mutex;
use sysinfo::{Pid, ProcessRefreshKind, ProcessesToUpdate, System};
use tracing::instrument;

/// Point in time view of a process.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ProcessSnapshot {
    pub pid: u32,
    /// Image name, for example `winword.exe`.
    pub name: String,
    pub exe: Option<PathBuf>,
    pub cwd: Option<PathBuf>,
    pub cmdline: Vec<String>,
}

impl ProcessSnapshot {
    /// Full executable path, empty when the OS refused to report it.
    pub fn application_path(&self) -> String {
        self.exe
            .as_deref()
            .map(|v| v.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Basename of the executable, falling back to the process name. Both separators are
    /// accepted so that Windows paths split the same way on every host.
    pub fn application_name(&self) -> String {
        let exe = self.exe.as_deref().map(Path::to_string_lossy);
        exe.as_deref()
            .and_then(|v| v.rsplit(['\\', '/']).next())
            .filter(|v| !v.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| self.name.clone())
    }

    /// Working directory unless it is the system directory, which tells nothing about the user's
    /// work.
    pub fn meaningful_cwd(&self) -> Option<&Path> {
        let windir = std::env::var_os("WINDIR").map(PathBuf::from);
        self.cwd
            .as_deref()
            .filter(|cwd| !cwd.as_os_str().is_empty())
            .filter(|cwd| windir.as_deref().map_or(true, |w| !paths_equal(cwd, w)))
    }

    pub fn has_name(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
    }
}

fn paths_equal(a: &Path, b: &Path) -> bool {
    a.to_string_lossy()
        .trim_end_matches(['\\', '/'])
        .eq_ignore_ascii_case(b.to_string_lossy().trim_end_matches(['\\', '/']))
}

#[cfg_attr(test, mockall::automock)]
pub trait ProcessInspector: Send + Sync {
    fn snapshot(&self, pid: u32) -> Result<ProcessSnapshot>;

    /// Files currently held open by the process. Empty when the platform doesn't expose them.
    fn open_files(&self, pid: u32) -> Result<Vec<PathBuf>>;
}

/// [ProcessInspector] backed by sysinfo. The [System] is kept between calls so that only the
/// requested process is refreshed.
pub struct SysinfoInspector {
    system: Mutex<System>,
}

impl SysinfoInspector {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }
}

impl Default for SysinfoInspector {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessInspector for SysinfoInspector {
    #[instrument(skip(self))]
    fn snapshot(&self, pid: u32) -> Result<ProcessSnapshot> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock();
        system.refresh_processes_specifics(
            ProcessesToUpdate::Some(&[sys_pid]),
            true,
            ProcessRefreshKind::everything(),
        );
        let process = system
            .process(sys_pid)
            .ok_or_else(|| anyhow!("Process {pid} is not running"))?;

        Ok(ProcessSnapshot {
            pid,
            name: process.name().to_string_lossy().into_owned(),
            exe: process.exe().map(Path::to_path_buf),
            cwd: process.cwd().map(Path::to_path_buf),
            cmdline: process
                .cmd()
                .iter()
                .map(|v| v.to_string_lossy().into_owned())
                .collect(),
        })
    }

    fn open_files(&self, pid: u32) -> Result<Vec<PathBuf>> {
        list_open_files(pid)
    }
}

#[cfg(target_os = "linux")]
fn list_open_files(pid: u32) -> Result<Vec<PathBuf>> {
    let mut files = vec![];
    for entry in std::fs::read_dir(format!("/proc/{pid}/fd"))? {
        let Ok(entry) = entry else { continue };
        if let Ok(target) = std::fs::read_link(entry.path()) {
            if target.is_absolute() {
                files.push(target);
            }
        }
    }
    Ok(files)
}

#[cfg(all(not(target_os = "linux"), feature = "win"))]
fn list_open_files(pid: u32) -> Result<Vec<PathBuf>> {
    win::open_files(pid)
}

#[cfg(all(not(target_os = "linux"), not(feature = "win")))]
fn list_open_files(pid: u32) -> Result<Vec<PathBuf>> {
    anyhow::bail!("Open files of {pid} can't be listed on this platform")
}
