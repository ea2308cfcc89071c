//! MODFLOW 6, the Python runtime, and GitHub Actions refer to operating
//! systems differently. This module translates between the three naming
//! schemes and derives binary file suffixes from any of them.
//!
//! All conversions route through the MODFLOW scheme as the canonical pivot:
//! there are per-scheme parse and render tables, and every pairwise
//! conversion is parse-then-render. That keeps each mapping in exactly one
//! place -- two independently-maintained pairwise tables can't drift apart,
//! and the lossy collapses (32/64-bit Windows, Intel/ARM macOS) are decided
//! at a single point instead of several.

use crate::error::OsTagError;
use std::env::consts::{ARCH, OS};
use std::fmt;

/// One of the three OS naming conventions in play.
///
/// - `Modflow`: the tags MODFLOW 6 build tooling uses to name release
///   artifacts (`win32`, `win64`, `linux`, `mac`, `macarm`).
/// - `Python`: what Python's `platform.system()` reports (`Windows`,
///   `Linux`, `Darwin`). Most upstream test configuration is written in
///   these terms.
/// - `Github`: GitHub Actions runner labels (`Windows`, `Linux`, `macOS`).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Scheme {
    Modflow,
    Python,
    Github,
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Scheme::Modflow => "modflow",
            Scheme::Python => "python",
            Scheme::Github => "github",
        })
    }
}

impl std::str::FromStr for Scheme {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "modflow" => Ok(Scheme::Modflow),
            "python" => Ok(Scheme::Python),
            "github" => Ok(Scheme::Github),
            other => Err(eyre::eyre!("unknown OS tag scheme: {other:?}")),
        }
    }
}

/// Resolution order for tags supplied without a scheme (see
/// [`binary_suffixes`]). Callers get tags from heterogeneous sources -- CLI
/// flags, CI environment variables, live host queries -- and shouldn't have
/// to know which scheme produced the string.
const SCHEME_PRIORITY: [Scheme; 3] = [Scheme::Modflow, Scheme::Python, Scheme::Github];

/// A supported operating system, identified canonically (i.e. in MODFLOW's
/// vocabulary, the only scheme that distinguishes all five variants).
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum OsTag {
    Win32,
    Win64,
    Linux,
    Mac,
    MacArm,
}

impl OsTag {
    /// Identify the running host.
    ///
    /// Windows resolves to [`OsTag::Win64`]/[`OsTag::Win32`] by how this
    /// crate was compiled; macOS resolves the chip via the processor
    /// architecture.
    pub fn current() -> Result<OsTag, OsTagError> {
        match OS {
            "windows" => {
                if cfg!(target_pointer_width = "64") {
                    Ok(OsTag::Win64)
                } else {
                    Ok(OsTag::Win32)
                }
            }
            "linux" => Ok(OsTag::Linux),
            "macos" => Ok(Self::darwin_variant()),
            other => Err(OsTagError::UnsupportedPlatform {
                system: other.to_string(),
            }),
        }
    }

    // The python and github schemes never distinguished mac chip
    // architectures, so parsing their mac tags has to consult the live host.
    fn darwin_variant() -> OsTag {
        if ARCH == "aarch64" {
            OsTag::MacArm
        } else {
            OsTag::Mac
        }
    }

    /// Parse a tag belonging to a known scheme.
    ///
    /// The python and github schemes carry less information than the
    /// modflow scheme, so two resolutions happen here by policy:
    ///
    /// - their single Windows tag always resolves to `Win64` (the 32/64-bit
    ///   distinction is unrecoverable from that direction);
    /// - their mac tags (`Darwin`/`macOS`) resolve to `Mac` or `MacArm`
    ///   according to the *current host's* processor architecture.
    pub fn parse(tag: &str, scheme: Scheme) -> Result<OsTag, OsTagError> {
        let known = match scheme {
            Scheme::Modflow => match tag {
                "win32" => Some(OsTag::Win32),
                "win64" => Some(OsTag::Win64),
                "linux" => Some(OsTag::Linux),
                "mac" => Some(OsTag::Mac),
                "macarm" => Some(OsTag::MacArm),
                _ => None,
            },
            Scheme::Python => match tag {
                "Windows" => Some(OsTag::Win64),
                "Linux" => Some(OsTag::Linux),
                "Darwin" => Some(Self::darwin_variant()),
                _ => None,
            },
            Scheme::Github => match tag {
                "Windows" => Some(OsTag::Win64),
                "Linux" => Some(OsTag::Linux),
                "macOS" => Some(Self::darwin_variant()),
                _ => None,
            },
        };
        known.ok_or_else(|| OsTagError::InvalidTag {
            tag: tag.to_string(),
            scheme,
        })
    }

    /// Render this identity as a tag in the given scheme.
    ///
    /// Total, but lossy toward the python and github schemes: both Windows
    /// variants render as `"Windows"`, and both mac variants render as
    /// `"Darwin"`/`"macOS"`. Those schemes never made the distinction in
    /// the first place.
    pub fn as_str(&self, scheme: Scheme) -> &'static str {
        match scheme {
            Scheme::Modflow => match self {
                OsTag::Win32 => "win32",
                OsTag::Win64 => "win64",
                OsTag::Linux => "linux",
                OsTag::Mac => "mac",
                OsTag::MacArm => "macarm",
            },
            Scheme::Python => match self {
                OsTag::Win32 | OsTag::Win64 => "Windows",
                OsTag::Linux => "Linux",
                OsTag::Mac | OsTag::MacArm => "Darwin",
            },
            Scheme::Github => match self {
                OsTag::Win32 | OsTag::Win64 => "Windows",
                OsTag::Linux => "Linux",
                OsTag::Mac | OsTag::MacArm => "macOS",
            },
        }
    }

    /// Parse a tag without knowing which scheme produced it, trying each
    /// scheme in [`SCHEME_PRIORITY`] order. The modflow attempt is
    /// case-insensitive and additionally accepts `darwin` (both historical
    /// accommodations for tags read back from file names); the python and
    /// github attempts are exact-case like [`OsTag::parse`].
    pub fn parse_any(tag: &str) -> Result<OsTag, OsTagError> {
        let lowered = tag.to_ascii_lowercase();
        for scheme in SCHEME_PRIORITY {
            let attempt = match scheme {
                Scheme::Modflow if lowered == "darwin" => Ok(Self::darwin_variant()),
                Scheme::Modflow => OsTag::parse(&lowered, scheme),
                _ => OsTag::parse(tag, scheme),
            };
            if let Ok(found) = attempt {
                return Ok(found);
            }
        }
        Err(OsTagError::UnrecognizedTag {
            tag: tag.to_string(),
        })
    }

    /// The `(executable_suffix, library_suffix)` pair for this OS.
    pub fn suffixes(&self) -> (&'static str, &'static str) {
        match self {
            OsTag::Win32 | OsTag::Win64 => (".exe", ".dll"),
            OsTag::Linux => ("", ".so"),
            OsTag::Mac | OsTag::MacArm => ("", ".dylib"),
        }
    }
}

impl fmt::Display for OsTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str(Scheme::Modflow))
    }
}

/// Convert a tag from one scheme to another, pivoting through the canonical
/// modflow form.
///
/// For any pair of schemes that both represent the identity exactly,
/// `convert(convert(t, a, b), b, a) == t` holds by construction.
pub fn convert(tag: &str, from: Scheme, to: Scheme) -> Result<&'static str, OsTagError> {
    Ok(OsTag::parse(tag, from)?.as_str(to))
}

pub fn python_to_modflow(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Python, Scheme::Modflow)
}

pub fn modflow_to_python(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Modflow, Scheme::Python)
}

pub fn github_to_modflow(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Github, Scheme::Modflow)
}

pub fn modflow_to_github(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Modflow, Scheme::Github)
}

pub fn python_to_github(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Python, Scheme::Github)
}

pub fn github_to_python(tag: &str) -> Result<&'static str, OsTagError> {
    convert(tag, Scheme::Github, Scheme::Python)
}

/// The running host's tag in the given scheme.
pub fn get_ostag(scheme: Scheme) -> Result<&'static str, OsTagError> {
    Ok(OsTag::current()?.as_str(scheme))
}

/// The running host's tag as MODFLOW names it, e.g. `"linux"`.
pub fn get_modflow_ostag() -> Result<&'static str, OsTagError> {
    get_ostag(Scheme::Modflow)
}

/// The running host's tag as GitHub Actions names it, e.g. `"macOS"`.
pub fn get_github_ostag() -> Result<&'static str, OsTagError> {
    get_ostag(Scheme::Github)
}

/// Executable and library suffixes for the given OS tag, or for the running
/// host if no tag is given.
///
/// The tag may come from any of the three schemes; see [`OsTag::parse_any`]
/// for the resolution order. An unresolvable tag is a hard error -- a wrong
/// suffix pair would silently corrupt the paths used to locate binaries
/// downstream.
pub fn binary_suffixes(ostag: Option<&str>) -> Result<(&'static str, &'static str), OsTagError> {
    let identity = match ostag {
        Some(tag) => OsTag::parse_any(tag)?,
        None => OsTag::current()?,
    };
    Ok(identity.suffixes())
}
