//! Archive handling that preserves file attributes.
//!
//! The stock zip format records unix modes but naive extraction drops them,
//! which strips the execute bit from every binary in a release archive --
//! the whole reason these helpers exist. Extraction here restores recorded
//! modes, materializes symlink entries, and refuses archive members that
//! would land outside the destination root.

use crate::prelude::*;
use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, Read};
use std::path::Component;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// Extract every member of a zip archive into `dest`, creating it if
/// needed.
///
/// Unix modes recorded in the archive are restored (only non-zero modes;
/// archives built on Windows record nothing and get platform defaults).
/// Symlink entries (unix mode type `0xa000`) are created after all regular
/// members, longest path first, so a symlinked directory can't redirect a
/// shorter link created later. Members or symlink targets that escape
/// `dest` are an error.
pub fn extract_zip(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).wrap_err_with(|| format!("opening archive {}", archive.display()))?;
    let mut z = ZipArchive::new(file)?;
    fs::create_dir_all(dest)?;

    let mut symlinks: Vec<(PathBuf, Vec<u8>)> = Vec::new();
    for i in 0..z.len() {
        let mut entry = z.by_index(i)?;
        let rel = entry
            .enclosed_name()
            .map(Path::to_path_buf)
            .ok_or_else(|| eyre!("archive member {:?} escapes the extraction root", entry.name()))?;

        if let Some(mode) = entry.unix_mode() {
            if mode & 0xf000 == 0xa000 {
                let mut target = Vec::new();
                entry.read_to_end(&mut target)?;
                symlinks.push((rel, target));
                continue;
            }
        }

        let out = dest.join(&rel);
        if entry.is_dir() {
            fs::create_dir_all(&out)?;
        } else {
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            let mut f = File::create(&out)
                .wrap_err_with(|| format!("writing member {}", out.display()))?;
            io::copy(&mut entry, &mut f)?;
            #[cfg(unix)]
            if let Some(mode) = entry.unix_mode() {
                use std::os::unix::fs::PermissionsExt;
                if mode != 0 {
                    fs::set_permissions(&out, fs::Permissions::from_mode(mode))?;
                }
            }
        }
    }

    symlinks.sort_unstable_by_key(|(rel, _)| rel.components().count());
    for (rel, target) in symlinks.into_iter().rev() {
        let target = String::from_utf8(target)?;
        if symlink_escapes(&rel, &target) {
            bail!("symlink {} -> {target} escapes the extraction root", rel.display());
        }
        #[cfg(unix)]
        {
            // the archive may carry no explicit dir entry for the link's parent
            let out = dest.join(&rel);
            if let Some(parent) = out.parent() {
                fs::create_dir_all(parent)?;
            }
            std::os::unix::fs::symlink(&target, out)?;
        }
        #[cfg(not(unix))]
        {
            let _ = (rel, target);
            bail!("symlink entries are not supported on this platform");
        }
    }
    Ok(())
}

// A symlink resolves against its parent directory; track depth within the
// destination and reject any target that walks above it.
fn symlink_escapes(source: &Path, target: &str) -> bool {
    let mut depth = source.components().count().saturating_sub(1);
    for component in Path::new(target).components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return true;
                }
                depth -= 1;
            }
            Component::Normal(_) => depth += 1,
            Component::RootDir | Component::Prefix(_) => return true,
        }
    }
    false
}

/// Extract a gzipped tarball into `dest`. `tar` restores modes natively.
pub fn extract_tar_gz(archive: &Path, dest: &Path) -> Result<()> {
    let file =
        File::open(archive).wrap_err_with(|| format!("opening archive {}", archive.display()))?;
    fs::create_dir_all(dest)?;
    tar::Archive::new(GzDecoder::new(file)).unpack(dest)?;
    Ok(())
}

/// Deflate-compress the given files, plus every file found under the given
/// directories, into a new zip at `zip_path`.
///
/// Entries in `files` that are not regular files are silently skipped. If
/// `patterns` is non-empty, only files whose *name* contains one of the
/// patterns (substring match) are kept. Archive member names are basenames,
/// and source unix modes are recorded. Ending up with nothing to compress
/// is an error; returns the number of members written otherwise.
pub fn compress_all(
    zip_path: &Path,
    files: &[PathBuf],
    dirs: &[PathBuf],
    patterns: &[&str],
) -> Result<usize> {
    let mut sources: Vec<PathBuf> = files.iter().filter(|p| p.is_file()).cloned().collect();
    for dir in dirs {
        collect_files(dir, &mut sources)
            .wrap_err_with(|| format!("walking {}", dir.display()))?;
    }
    if !patterns.is_empty() {
        sources.retain(|path| match path.file_name().and_then(|n| n.to_str()) {
            Some(name) => patterns.iter().any(|p| name.contains(p)),
            None => false,
        });
    }
    if sources.is_empty() {
        bail!("no files to add to {}", zip_path.display());
    }

    let mut writer = ZipWriter::new(
        File::create(zip_path).wrap_err_with(|| format!("creating {}", zip_path.display()))?,
    );
    for source in &sources {
        let arcname = source
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| eyre!("non-UTF-8 file name: {}", source.display()))?;
        #[allow(unused_mut)]
        let mut options = FileOptions::default().compression_method(CompressionMethod::Deflated);
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            options = options.unix_permissions(fs::metadata(source)?.permissions().mode());
        }
        writer.start_file(arcname, options)?;
        io::copy(&mut File::open(source)?, &mut writer)?;
    }
    writer.finish()?;
    debug!("wrote {} members to {}", sources.len(), zip_path.display());
    Ok(sources.len())
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(&path, out)?;
        } else if path.is_file() && !out.contains(&path) {
            out.push(path);
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    // the shortest legal zip: a bare end-of-central-directory record
    const EMPTY_ZIP: &[u8] = b"PK\x05\x06\x00\x00\x00\x00\x00\x00\x00\x00\
        \x00\x00\x00\x00\x00\x00\x00\x00\x00\x00";

    #[test]
    fn test_extract_empty_archive() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("empty.zip");
        std::fs::write(&archive, EMPTY_ZIP).unwrap();
        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        assert!(fs::read_dir(&dest).unwrap().next().is_none());
    }

    #[test]
    fn test_compress_then_extract_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("data.txt"), "hello world").unwrap();
        fs::create_dir(input.join("nested")).unwrap();
        fs::write(input.join("nested").join("more.txt"), "nested").unwrap();

        let archive = dir.path().join("output.zip");
        let count = compress_all(&archive, &[], &[input], &[]).unwrap();
        assert_eq!(count, 2);

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        // arcnames are basenames, so nesting flattens
        assert_eq!(fs::read_to_string(dest.join("data.txt")).unwrap(), "hello world");
        assert_eq!(fs::read_to_string(dest.join("more.txt")).unwrap(), "nested");
    }

    #[test]
    fn test_compress_patterns_filter_by_name() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("mf6.txt"), "keep").unwrap();
        fs::write(input.join("other.log"), "drop").unwrap();

        let archive = dir.path().join("filtered.zip");
        assert_eq!(compress_all(&archive, &[], &[input], &["mf6"]).unwrap(), 1);

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        assert!(dest.join("mf6.txt").is_file());
        assert!(!dest.join("other.log").exists());
    }

    #[test]
    fn test_compress_nothing_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("nope.zip");
        assert!(compress_all(&archive, &[], &[], &[]).is_err());
        assert!(!archive.exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_preserves_execute_permission() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let exe = dir.path().join("mf6");
        fs::write(&exe, "#!/bin/sh\necho 'mf6: 6.4.1'\n").unwrap();
        fs::set_permissions(&exe, fs::Permissions::from_mode(0o755)).unwrap();

        let archive = dir.path().join("bin.zip");
        compress_all(&archive, &[exe], &[], &[]).unwrap();

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        let extracted = dest.join("mf6");
        let mode = fs::metadata(&extracted).unwrap().permissions().mode();
        assert_ne!(mode & 0o111, 0, "execute bit lost: {mode:o}");
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_materializes_symlinks() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("links.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("libmf6.so.6.4.1", FileOptions::default())
            .unwrap();
        io::Write::write_all(&mut writer, b"not really a library").unwrap();
        writer
            .add_symlink("libmf6.so", "libmf6.so.6.4.1", FileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        let link = dest.join("libmf6.so");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_to_string(&link).unwrap(), "not really a library");
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_symlink_without_parent_dir_entry() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("bare-link.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .add_symlink("sub/link", "data.txt", FileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        extract_zip(&archive, &dest).unwrap();
        let link = dest.join("sub").join("link");
        assert!(fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(&link).unwrap(), PathBuf::from("data.txt"));
    }

    #[test]
    fn test_extract_rejects_escaping_members() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .start_file("../evil.txt", FileOptions::default())
            .unwrap();
        io::Write::write_all(&mut writer, b"gotcha").unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        assert!(extract_zip(&archive, &dest).is_err());
        assert!(!dir.path().join("evil.txt").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_extract_rejects_escaping_symlink_targets() {
        let dir = tempfile::tempdir().unwrap();
        let archive = dir.path().join("evil-link.zip");
        let mut writer = ZipWriter::new(File::create(&archive).unwrap());
        writer
            .add_symlink("shadow", "../../../etc/shadow", FileOptions::default())
            .unwrap();
        writer.finish().unwrap();

        let dest = dir.path().join("out");
        assert!(extract_zip(&archive, &dest).is_err());
    }

    #[test]
    fn test_symlink_escape_detection() {
        for (source, target) in [
            ("foo", ".."),
            ("foo/bar", "../../outside"),
            ("foo", "/etc/shadow"),
        ] {
            assert!(symlink_escapes(Path::new(source), target), "{source} -> {target}");
        }
        for (source, target) in [
            ("foo/bar", ".."),
            ("foo", "./baz/bar"),
            ("foo/bar/baz", "../sibling"),
        ] {
            assert!(!symlink_escapes(Path::new(source), target), "{source} -> {target}");
        }
    }

    #[test]
    fn test_tar_gz_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("input");
        fs::create_dir(&input).unwrap();
        fs::write(input.join("data.txt"), "tarred").unwrap();

        let archive = dir.path().join("bundle.tar.gz");
        let gz = flate2::write::GzEncoder::new(
            File::create(&archive).unwrap(),
            flate2::Compression::default(),
        );
        let mut builder = tar::Builder::new(gz);
        builder.append_dir_all(".", &input).unwrap();
        builder.into_inner().unwrap().finish().unwrap();

        let dest = dir.path().join("out");
        extract_tar_gz(&archive, &dest).unwrap();
        assert_eq!(fs::read_to_string(dest.join("data.txt")).unwrap(), "tarred");
    }
}
