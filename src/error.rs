use crate::ostags::Scheme;
use thiserror::Error;

/// Errors from the OS tag registry and converter.
///
/// Absence of an executable and failed version probes are *not* errors --
/// those are `None` results. This enum only covers the cases the spec treats
/// as fatal: a host we don't know, or a tag string nobody recognizes.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OsTagError {
    /// The running host is not one of the known OS families. There is no
    /// point retrying: the platform can't change within a process lifetime.
    #[error("unsupported operating system: {system}")]
    UnsupportedPlatform { system: String },

    /// The tag is not a valid member of the given scheme.
    #[error("invalid or unsupported {scheme} OS tag: {tag:?}")]
    InvalidTag { tag: String, scheme: Scheme },

    /// The tag is not recognized under *any* scheme. Returned by
    /// scheme-agnostic resolution after the whole fallback list is
    /// exhausted; a caller hitting this has a configuration bug, not a
    /// transient condition.
    #[error("OS tag {tag:?} not recognized under any scheme")]
    UnrecognizedTag { tag: String },
}
