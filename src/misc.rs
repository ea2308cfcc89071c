//! Assorted test-suite helpers: subprocess plumbing, CI detection, model
//! directory discovery, and presence probes.

use crate::executables::locate;
use crate::prelude::*;
use std::fs;
use std::process::Command;

/// Run a command, returning `(stdout, stderr, status code)`. Output is
/// captured, not inherited; a signal-terminated child reports status `-1`.
pub fn run_cmd(program: &str, args: &[&str], cwd: Option<&Path>) -> Result<(String, String, i32)> {
    let mut cmd = Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    trace!("running: {program} {}", args.join(" "));
    let output = cmd
        .output()
        .wrap_err_with(|| format!("running {program}"))?;
    Ok((
        String::from_utf8_lossy(&output.stdout).into_owned(),
        String::from_utf8_lossy(&output.stderr).into_owned(),
        output.status.code().unwrap_or(-1),
    ))
}

/// Whether we're running under CI. GitHub Actions always sets `CI`.
pub fn is_in_ci() -> bool {
    std::env::var_os("CI").is_some_and(|v| !v.is_empty())
}

/// The current git branch, lowercased.
///
/// On GitHub Actions this comes from `GITHUB_REF` (no git checkout
/// required); otherwise git itself is asked.
pub fn get_current_branch() -> Result<String> {
    if let Ok(git_ref) = std::env::var("GITHUB_REF") {
        if let Some(name) = git_ref.trim_end_matches('/').rsplit('/').next() {
            if !name.is_empty() {
                return Ok(name.to_lowercase());
            }
        }
    }

    let (stdout, stderr, status) = run_cmd("git", &["rev-parse", "--abbrev-ref", "HEAD"], None)
        .wrap_err("'git' required to determine current branch")?;
    if status == 0 && !stdout.trim().is_empty() {
        Ok(stdout.trim().to_lowercase())
    } else {
        Err(eyre!("could not determine current branch: {stderr}"))
    }
}

/// Package file types named in a MODFLOW 6 name file that match one of the
/// given keys (case-insensitive substring). Blank lines and `#`/`!`
/// comments are skipped.
pub fn get_namefile_ftypes(namefile: &Path, keys: &[&str]) -> Result<Vec<String>> {
    let contents = fs::read_to_string(namefile)
        .wrap_err_with(|| format!("reading name file {}", namefile.display()))?;
    let mut ftypes = Vec::new();
    for line in contents.lines() {
        let mut fields = line.split_whitespace();
        let (Some(ftype), Some(_)) = (fields.next(), fields.next()) else {
            continue;
        };
        if ftype == "#" || ftype == "!" {
            continue;
        }
        let lowered = ftype.to_lowercase();
        if keys.iter().any(|key| lowered.contains(&key.to_lowercase())) {
            ftypes.push(ftype.to_string());
        }
    }
    Ok(ftypes)
}

/// Finds model directories under a root by the presence of a simulation
/// name file.
///
/// ```no_run
/// # use modflow_devtools::misc::ModelSearch;
/// let models = ModelSearch::new("/path/to/examples")
///     .prefix("test")
///     .exclude("large")
///     .packages(&["wel", "drn"])
///     .find()
///     .unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ModelSearch {
    root: PathBuf,
    namefile: String,
    prefix: Option<String>,
    excluded: Vec<String>,
    selected: Vec<String>,
    packages: Vec<String>,
}

impl ModelSearch {
    pub fn new(root: impl Into<PathBuf>) -> ModelSearch {
        ModelSearch {
            root: root.into(),
            namefile: "mfsim.nam".to_string(),
            prefix: None,
            excluded: Vec::new(),
            selected: Vec::new(),
            packages: Vec::new(),
        }
    }

    /// Look for a different name file (default `mfsim.nam`).
    pub fn namefile(mut self, namefile: impl Into<String>) -> ModelSearch {
        self.namefile = namefile.into();
        self
    }

    /// Only consider models whose directory name starts with `prefix`.
    pub fn prefix(mut self, prefix: impl Into<String>) -> ModelSearch {
        self.prefix = Some(prefix.into());
        self
    }

    /// Skip models whose path contains the given substring.
    pub fn exclude(mut self, pattern: impl Into<String>) -> ModelSearch {
        self.excluded.push(pattern.into());
        self
    }

    /// Only keep models whose directory name contains one of the given
    /// substrings.
    pub fn select(mut self, name: impl Into<String>) -> ModelSearch {
        self.selected.push(name.into());
        self
    }

    /// Only keep models whose name file references one of the given
    /// package file types.
    pub fn packages(mut self, packages: &[&str]) -> ModelSearch {
        self.packages = packages.iter().map(|p| p.to_string()).collect();
        self
    }

    /// Run the search. A missing root yields an empty list, not an error.
    ///
    /// Models named `*_dev*` are dropped when the current branch looks like
    /// master or a release branch; if the branch can't be determined (no
    /// git, exported tarball) they are kept.
    pub fn find(&self) -> Result<Vec<PathBuf>> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }

        let mut namefiles = Vec::new();
        self.walk(&self.root, &mut namefiles)?;

        let mut models = Vec::new();
        for namefile in namefiles {
            let path_str = namefile.to_string_lossy();
            if self.excluded.iter().any(|e| path_str.contains(e.as_str())) {
                continue;
            }
            if !self.packages.is_empty() {
                let keys: Vec<&str> = self.packages.iter().map(String::as_str).collect();
                if get_namefile_ftypes(&namefile, &keys)?.is_empty() {
                    continue;
                }
            }
            let Some(model) = namefile.parent() else {
                continue;
            };
            let name = model.file_name().unwrap_or_default().to_string_lossy();
            if !self.selected.is_empty() && !self.selected.iter().any(|s| name.contains(s.as_str()))
            {
                continue;
            }
            models.push(model.to_path_buf());
        }

        if let Ok(branch) = get_current_branch() {
            if branch.contains("master") || branch.contains("release") {
                models.retain(|model| {
                    !model
                        .file_name()
                        .unwrap_or_default()
                        .to_string_lossy()
                        .to_lowercase()
                        .contains("_dev")
                });
            }
        }

        models.sort();
        Ok(models)
    }

    fn walk(&self, dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
        for entry in fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                self.walk(&path, out)?;
            } else if path.file_name().is_some_and(|n| n == self.namefile.as_str()) {
                let dir_name = path
                    .parent()
                    .and_then(Path::file_name)
                    .unwrap_or_default()
                    .to_string_lossy()
                    .into_owned();
                match &self.prefix {
                    Some(prefix) if !dir_name.starts_with(prefix.as_str()) => {}
                    _ => out.push(path.clone()),
                }
            }
        }
        Ok(())
    }
}

/// Memoizes "is this executable available" probes.
///
/// The probe result can't change the answer within a test session, so
/// repeated checks shouldn't keep walking `PATH`. Explicit and injectable
/// rather than a process global, so tests can reset between cases.
#[derive(Debug, Clone, Default)]
pub struct ProbeCache {
    seen: HashMap<String, bool>,
}

impl ProbeCache {
    pub fn new() -> ProbeCache {
        ProbeCache::default()
    }

    /// Whether `name` resolves to an executable on `PATH`. Idempotent per
    /// name: the first call probes, later calls replay the answer.
    pub fn has_exe(&mut self, name: &str) -> bool {
        if let Some(&present) = self.seen.get(name) {
            return present;
        }
        let present = matches!(locate(name, None), Ok(Some(_)));
        self.seen.insert(name.to_string(), present);
        present
    }

    pub fn reset(&mut self) {
        self.seen.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn write_namefile(dir: &Path, lines: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("mfsim.nam"), lines).unwrap();
    }

    #[cfg(unix)]
    #[test]
    fn test_run_cmd_captures_output() {
        let (stdout, _, status) = run_cmd("echo", &["hello"], None).unwrap();
        assert_eq!(status, 0);
        assert_eq!(stdout.trim(), "hello");
    }

    #[test]
    fn test_run_cmd_missing_program_is_error() {
        assert!(run_cmd("no-such-program-here", &[], None).is_err());
    }

    #[test]
    fn test_namefile_ftypes() {
        let dir = tempfile::tempdir().unwrap();
        let namefile = dir.path().join("test.nam");
        fs::write(
            &namefile,
            "# a comment\n\
             ! another\n\
             \n\
             WEL6 model.wel\n\
             DRN6 model.drn\n\
             orphan\n\
             NPF6 model.npf\n",
        )
        .unwrap();
        let ftypes = get_namefile_ftypes(&namefile, &["wel", "npf"]).unwrap();
        assert_eq!(ftypes, vec!["WEL6", "NPF6"]);
        assert!(get_namefile_ftypes(&namefile, &["sfr"]).unwrap().is_empty());
    }

    #[test]
    fn test_model_search_missing_root_is_empty() {
        let models = ModelSearch::new("/no/such/place").find().unwrap();
        assert!(models.is_empty());
    }

    #[test]
    fn test_model_search_filters() {
        let root = tempfile::tempdir().unwrap();
        write_namefile(&root.path().join("test_one"), "WEL6 a.wel\n");
        write_namefile(&root.path().join("test_two"), "DRN6 a.drn\n");
        write_namefile(&root.path().join("other"), "WEL6 b.wel\n");
        write_namefile(&root.path().join("test_skipme"), "WEL6 c.wel\n");

        let search = ModelSearch::new(root.path());
        assert_eq!(search.find().unwrap().len(), 4);

        let models = search.clone().prefix("test").find().unwrap();
        assert_eq!(models.len(), 3);

        let models = search.clone().prefix("test").exclude("skipme").find().unwrap();
        assert_eq!(models.len(), 2);

        let models = search
            .clone()
            .prefix("test")
            .exclude("skipme")
            .packages(&["wel"])
            .find()
            .unwrap();
        assert_eq!(models.len(), 1);
        assert!(models[0].ends_with("test_one"));

        let models = search.select("two").find().unwrap();
        assert_eq!(models.len(), 1);
        assert!(models[0].ends_with("test_two"));
    }

    #[test]
    fn test_probe_cache() {
        let mut cache = ProbeCache::new();
        assert!(!cache.has_exe("definitely-not-an-executable-name"));
        // replayed from cache, same answer
        assert!(!cache.has_exe("definitely-not-an-executable-name"));
        cache.reset();
        assert!(!cache.has_exe("definitely-not-an-executable-name"));
    }
}
