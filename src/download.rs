//! GitHub release discovery and artifact download helpers.
//!
//! Thin wrappers over the GitHub REST API, just enough to find and fetch
//! platform-specific release archives of compiled MODFLOW binaries. API
//! pagination is deliberately not handled here.

use crate::ostags::{get_modflow_ostag, OsTag, Scheme};
use crate::prelude::*;
use crate::zip::{extract_tar_gz, extract_zip};
use indexmap::IndexMap;
use std::io;
use std::time::Duration;
use ureq::Agent;

/// The repository MODFLOW-based binaries are released from.
pub const DEFAULT_REPO: &str = "MODFLOW-USGS/executables";
/// The repository MODFLOW 6 nightly builds are released from.
pub const NIGHTLY_REPO: &str = "MODFLOW-USGS/modflow6-nightly-build";

static AGENT: Lazy<Agent> = Lazy::new(|| {
    ureq::AgentBuilder::new()
        .user_agent(concat!("modflow-devtools/", env!("CARGO_PKG_VERSION")))
        .timeout(Duration::from_secs(60))
        .build()
});

// Transient conditions worth a bounded retry; everything else surfaces
// immediately. 429 shows up when GitHub rate-limits anonymous clients.
const SLEEP_TIMES: &[u64] = &[250, 500, 1000, 2000, 4000]; // milliseconds
const RETRY_STATUS: &[u16] = &[429, 500, 502, 503];
const RETRY_ERRORKIND: &[ureq::ErrorKind] = &[
    ureq::ErrorKind::Dns,
    ureq::ErrorKind::ConnectionFailed,
    ureq::ErrorKind::TooManyRedirects,
    ureq::ErrorKind::Io,
    ureq::ErrorKind::ProxyConnect,
];

fn call_with_retry(req: ureq::Request) -> Result<ureq::Response, ureq::Error> {
    let mut sleeps = SLEEP_TIMES.iter();
    loop {
        let result = req.clone().call();
        match &result {
            Ok(_) => return result,
            Err(ureq::Error::Status(status, _)) => {
                if !RETRY_STATUS.contains(status) {
                    return result;
                }
            }
            Err(err @ ureq::Error::Transport(_)) => {
                if !RETRY_ERRORKIND.contains(&err.kind()) {
                    return result;
                }
            }
        }
        match sleeps.next() {
            Some(ms) => {
                debug!("transient request failure, retrying in {ms}ms");
                std::thread::sleep(Duration::from_millis(*ms));
            }
            None => return result,
        }
    }
}

// Bears a GITHUB_TOKEN if one is set and the URL is GitHub's; anonymous API
// requests are rate-limited to 60/hour.
fn get(url: &str) -> ureq::Request {
    let mut req = AGENT.get(url);
    if url.contains("github.com") {
        if let Ok(token) = std::env::var("GITHUB_TOKEN") {
            if !token.is_empty() {
                req = req.set("Authorization", &format!("Bearer {token}"));
            }
        }
    }
    req
}

fn api_get(url: &str) -> Result<ureq::Response> {
    Ok(call_with_retry(
        get(url).set("Accept", "application/vnd.github+json"),
    )
    .wrap_err_with(|| format!("GitHub API request failed: {url}"))?)
}

/// A GitHub release.
#[derive(Debug, Clone, Deserialize)]
pub struct Release {
    /// Tag name, e.g. `"6.4.1"`.
    pub tag_name: String,
    /// Attached downloadable files.
    pub assets: Vec<Asset>,
}

/// A single release asset.
#[derive(Debug, Clone, Deserialize)]
pub struct Asset {
    /// File name, e.g. `"linux.zip"`.
    pub name: String,
    /// Direct download URL.
    pub browser_download_url: Url,
}

impl Release {
    /// The asset with the given file name, if the release carries one.
    pub fn asset(&self, name: &str) -> Option<&Asset> {
        self.assets.iter().find(|a| a.name == name)
    }
}

/// Fetch the latest release of a repository (`"owner/name"` form).
pub fn latest_release(repo: &str) -> Result<Release> {
    let url = format!("https://api.github.com/repos/{repo}/releases/latest");
    debug!("requesting latest release of {repo}");
    Ok(api_get(&url)?.into_json()?)
}

/// Fetch the release with the given tag.
pub fn get_release(repo: &str, tag: &str) -> Result<Release> {
    let url = format!("https://api.github.com/repos/{repo}/releases/tags/{tag}");
    debug!("requesting release {tag} of {repo}");
    Ok(api_get(&url)?.into_json()?)
}

/// The latest release's tag, e.g. `"6.4.1"`.
pub fn latest_version(repo: &str) -> Result<String> {
    Ok(latest_release(repo)?.tag_name)
}

/// Map a release's asset file names to their download URLs, for the latest
/// release or the given tag.
pub fn release_assets(repo: &str, version: Option<&str>) -> Result<IndexMap<String, Url>> {
    let release = match version {
        Some(tag) => get_release(repo, tag)?,
        None => latest_release(repo)?,
    };
    Ok(release
        .assets
        .into_iter()
        .map(|a| (a.name, a.browser_download_url))
        .collect())
}

fn file_name_of(url: &Url) -> Result<String> {
    url.path_segments()
        .and_then(|segments| segments.last())
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .ok_or_else(|| eyre!("cannot infer a file name from {url}"))
}

/// Download an archive and extract it into `path` (created if needed).
///
/// The archive is staged as a temp file in `path`, then dispatched on its
/// file name: `.zip` (and self-extracting `.exe` bundles) go through
/// attribute-preserving zip extraction, `.tar.gz`/`.tgz` through the
/// tarball path. Returns the path the archive was extracted into.
pub fn download_and_unzip(url: &Url, path: &Path, delete_archive: bool) -> Result<PathBuf> {
    let file_name = file_name_of(url)?;
    std::fs::create_dir_all(path)?;

    info!("downloading {url}");
    let resp = call_with_retry(get(url.as_str()))
        .wrap_err_with(|| format!("downloading {url}"))?;

    let mut staged = tempfile::NamedTempFile::new_in(path)?;
    let bytes = io::copy(&mut resp.into_reader(), &mut staged)?;
    let archive = path.join(&file_name);
    staged.persist(&archive)?;
    debug!("downloaded {bytes} bytes to {}", archive.display());

    if file_name.ends_with(".zip") || file_name.ends_with(".exe") {
        extract_zip(&archive, path)?;
    } else if file_name.ends_with(".tar.gz") || file_name.ends_with(".tgz") {
        extract_tar_gz(&archive, path)?;
    } else {
        bail!("don't know how to extract {file_name}");
    }

    if delete_archive {
        std::fs::remove_file(&archive)?;
    }
    info!("extracted {file_name} to {}", path.display());
    Ok(path.to_path_buf())
}

// Release archives of compiled binaries are named by modflow ostag; accept
// a tag in any scheme, or default to the running host.
fn asset_zip_name(ostag: Option<&str>) -> Result<String> {
    let tag = match ostag {
        Some(tag) => OsTag::parse_any(tag)?.as_str(Scheme::Modflow),
        None => get_modflow_ostag()?,
    };
    Ok(format!("{tag}.zip"))
}

/// Download the MODFLOW binary executables for a platform into `dest`.
///
/// `version` picks a release tag (latest if `None`); `ostag` picks the
/// platform archive (the running host if `None`, any scheme accepted).
pub fn fetch_executables(dest: &Path, version: Option<&str>, ostag: Option<&str>) -> Result<PathBuf> {
    let zip_name = asset_zip_name(ostag)?;
    let release = match version {
        Some(tag) => get_release(DEFAULT_REPO, tag)?,
        None => latest_release(DEFAULT_REPO)?,
    };
    let asset = release
        .asset(&zip_name)
        .ok_or_else(|| eyre!("release {} of {DEFAULT_REPO} has no asset {zip_name}", release.tag_name))?;
    download_and_unzip(&asset.browser_download_url, dest, true)
}

/// Download the latest MODFLOW 6 nightly-build executables into `dest`.
pub fn fetch_nightly(dest: &Path, ostag: Option<&str>) -> Result<PathBuf> {
    let zip_name = asset_zip_name(ostag)?;
    let url = Url::parse(&format!(
        "https://github.com/{NIGHTLY_REPO}/releases/latest/download/{zip_name}"
    ))?;
    download_and_unzip(&url, dest, true)
}
