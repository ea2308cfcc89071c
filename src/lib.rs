//! Developer tooling supporting MODFLOW 6 test suites.
//!
//! The interesting part is [`ostags`]: MODFLOW 6 build tooling, the Python
//! runtime, and GitHub Actions all refer to the same small set of operating
//! systems by different names, and test infrastructure constantly has to
//! translate between them (and derive binary file suffixes from them). The
//! rest is supporting glue: locating executables on disk and asking them for
//! their versions ([`executables`]), fetching release artifacts from GitHub
//! ([`download`]), zip handling that doesn't strip execute bits ([`zip`]),
//! and assorted test-suite helpers ([`misc`]).

pub mod download;
pub mod error;
pub mod executables;
pub mod misc;
pub mod ostags;
mod prelude;
pub mod zip;

pub use error::OsTagError;
pub use executables::Executables;
pub use ostags::{binary_suffixes, convert, OsTag, Scheme};
