//! Locating executables and asking them what version they are.

use crate::error::OsTagError;
use crate::ostags::OsTag;
use crate::prelude::*;
use indexmap::IndexMap;
use std::io::Read;
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

/// How long a version probe may run before the child is killed. Hung
/// third-party binaries must not stall test collection.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(10);
const VERSION_PROBE_POLL: Duration = Duration::from_millis(50);

/// Find an executable by logical name, appending the current host's
/// executable suffix if the name doesn't already carry it.
///
/// If `search_dir` is given, only that directory is searched; otherwise
/// every entry of the process `PATH`. Absence is `Ok(None)`, not an error --
/// probing several candidate tool locations and finding nothing is a normal
/// outcome, and whether it's fatal is the caller's call (as is warning
/// about it).
pub fn locate(name: &str, search_dir: Option<&Path>) -> Result<Option<PathBuf>, OsTagError> {
    let (exe_suffix, _) = OsTag::current()?.suffixes();
    let file_name = if !exe_suffix.is_empty() && !name.ends_with(exe_suffix) {
        format!("{name}{exe_suffix}")
    } else {
        name.to_string()
    };

    let candidates: Vec<PathBuf> = match search_dir {
        Some(dir) => vec![dir.join(&file_name)],
        None => match std::env::var_os("PATH") {
            Some(path) => std::env::split_paths(&path)
                .map(|dir| dir.join(&file_name))
                .collect(),
            None => vec![],
        },
    };

    for candidate in candidates {
        if candidate.is_file() {
            debug!("found {name} at {}", candidate.display());
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

/// Ask an executable for its version with the conventional `-v` flag.
/// See [`version_of_with`] for the rules.
pub fn version_of(path: &Path) -> Option<String> {
    version_of_with(path, "-v")
}

/// Run `<path> <flag>` and extract a version token from its output.
///
/// The parse is deliberately narrow: it takes the text after the first `:`
/// on the first line of combined output, trimmed. That is only correct for
/// binaries whose first line reads `<program name>: <version>` (MODFLOW 6
/// and friends do); it is not a general version-string parser.
///
/// Every failure mode -- spawn error, non-zero exit, timeout, output that
/// doesn't match -- yields `None`. Version probing is best-effort across
/// heterogeneous third-party binaries, and a binary that fails `-v` once
/// will fail it again, so nothing here retries.
pub fn version_of_with(path: &Path, flag: &str) -> Option<String> {
    probe_version(path, flag, VERSION_PROBE_TIMEOUT)
}

fn drain_pipe(pipe: impl Read + Send + 'static) -> std::thread::JoinHandle<String> {
    std::thread::spawn(move || {
        let mut pipe = pipe;
        let mut buf = String::new();
        let _ = pipe.read_to_string(&mut buf);
        buf
    })
}

fn probe_version(path: &Path, flag: &str, timeout: Duration) -> Option<String> {
    let mut child = Command::new(path)
        .arg(flag)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .ok()?;

    // Drain both pipes off-thread while we wait: a chatty child that fills
    // the pipe buffer would otherwise block on write and never exit.
    let stdout = drain_pipe(child.stdout.take()?);
    let stderr = drain_pipe(child.stderr.take()?);

    let deadline = Instant::now() + timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) => {
                if Instant::now() >= deadline {
                    warn!("version probe of {} timed out, killing it", path.display());
                    let _ = child.kill();
                    let _ = child.wait();
                    let _ = (stdout.join(), stderr.join());
                    return None;
                }
                std::thread::sleep(VERSION_PROBE_POLL);
            }
            Err(_) => return None,
        }
    };

    // combined output: -v chatter lands on either stream depending on the tool
    let mut output = stdout.join().ok()?;
    output.push_str(&stderr.join().ok()?);

    if !status.success() {
        debug!("version probe of {} exited with {status}", path.display());
        return None;
    }

    let first_line = output.lines().next()?;
    let (_, version) = first_line.split_once(':')?;
    let version = version.trim();
    if version.is_empty() {
        None
    } else {
        Some(version.to_string())
    }
}

/// A name -> path mapping for the tools a test session resolved once at
/// startup. One canonical store with two access styles: `get` for optional
/// lookup and `Index` for the "I know it's there" sites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Executables {
    paths: IndexMap<String, PathBuf>,
}

impl Executables {
    pub fn new<I, S, P>(entries: I) -> Executables
    where
        I: IntoIterator<Item = (S, P)>,
        S: Into<String>,
        P: Into<PathBuf>,
    {
        Executables {
            paths: entries
                .into_iter()
                .map(|(name, path)| (name.into(), path.into()))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&PathBuf> {
        self.paths.get(name)
    }

    pub fn get_or(&self, name: &str, default: &Path) -> PathBuf {
        self.get(name).cloned().unwrap_or_else(|| default.to_path_buf())
    }

    pub fn insert(&mut self, name: impl Into<String>, path: impl Into<PathBuf>) {
        self.paths.insert(name.into(), path.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PathBuf)> {
        self.paths.iter().map(|(name, path)| (name.as_str(), path))
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl std::ops::Index<&str> for Executables {
    type Output = PathBuf;

    fn index(&self, name: &str) -> &PathBuf {
        // mirrors the map-access contract: indexing a missing tool panics
        &self.paths[name]
    }
}

impl<S: Into<String>, P: Into<PathBuf>> FromIterator<(S, P)> for Executables {
    fn from_iter<I: IntoIterator<Item = (S, P)>>(iter: I) -> Executables {
        Executables::new(iter)
    }
}
