//! IPA archive inspection.
//!
//! An `.ipa` is a zip archive laid out as `Payload/<Name>.app/...`. Entries are
//! listed from the central directory without extracting anything; extraction
//! is limited to the manifest entry or the application-bundle subtree and
//! never writes outside the destination directory.
//!
//! Extraction runs in two passes. Directories and regular files are written
//! first, refusing any path that goes through an existing symlink. Symlinks
//! are created afterwards, so no later entry can be written through one.

use crate::delivery::error::{Error, ErrorExt, Result};
use regex::Regex;
use std::{
    fs::File,
    io::Read,
    path::{Component, Path, PathBuf},
    sync::LazyLock,
};

/// `Payload/<one .app directory>/Info.plist`
static INFO_PLIST_ENTRY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^Payload/[^/]+\.app/Info\.plist$").expect("manifest entry pattern is valid")
});

const S_IFMT: u32 = 0o170000;
const S_IFLNK: u32 = 0o120000;

/// Lists entry names in central directory order.
pub async fn list_entries(ipa_path: &Path) -> Result<Vec<String>> {
    let ipa_path = ipa_path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let archive = open_archive(&ipa_path)?;
        Ok(archive.file_names().map(str::to_string).collect())
    })
    .await?
}

/// Locates the application manifest entry.
///
/// When several entries match, the first one in archive listing order wins.
/// Well-formed IPAs carry exactly one application bundle, so this only
/// matters for unusual archives; they are not rejected.
pub fn find_info_plist_entry(entries: &[String]) -> Option<&str> {
    entries
        .iter()
        .map(String::as_str)
        .find(|entry| is_info_plist_entry(entry))
}

/// True for `Payload/<Name>.app/Info.plist`.
pub fn is_info_plist_entry(entry: &str) -> bool {
    INFO_PLIST_ENTRY.is_match(entry)
}

/// The `Payload/<Name>.app` directory entry containing `info_plist_entry`.
pub fn app_bundle_entry(info_plist_entry: &str) -> &str {
    info_plist_entry
        .strip_suffix("/Info.plist")
        .unwrap_or(info_plist_entry)
}

/// Extracts a single entry below `dest`, returning the extracted file path.
pub async fn extract_entry(ipa_path: &Path, entry_name: &str, dest: &Path) -> Result<PathBuf> {
    let ipa_path = ipa_path.to_path_buf();
    let entry_name = entry_name.to_string();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut archive = open_archive(&ipa_path)?;
        let mut entry = archive.by_name(&entry_name).map_err(|e| {
            Error::infrastructure_with(
                format!("Archive entry {} not found in {}: {}", entry_name, ipa_path.display(), e),
                e,
            )
        })?;
        let relative = entry
            .enclosed_name()
            .ok_or_else(|| unsafe_entry_error(&entry_name))?;
        let is_dir = entry.is_dir();
        let mode = entry.unix_mode();
        let mut symlinks = Vec::new();
        write_entry(&mut entry, &relative, is_dir, mode, &dest, &mut symlinks)?;
        create_symlinks(&dest, symlinks)?;
        Ok(dest.join(relative))
    })
    .await?
}

/// Extracts every entry under `prefix/` below `dest` and returns the path of
/// the extracted `prefix` directory.
pub async fn extract_subtree(ipa_path: &Path, prefix: &str, dest: &Path) -> Result<PathBuf> {
    let ipa_path = ipa_path.to_path_buf();
    let prefix = prefix.trim_end_matches('/').to_string();
    let dest = dest.to_path_buf();

    tokio::task::spawn_blocking(move || {
        let mut archive = open_archive(&ipa_path)?;
        let subtree = format!("{}/", prefix);
        let mut extracted = 0usize;
        let mut symlinks = Vec::new();

        for index in 0..archive.len() {
            let mut entry = archive.by_index(index)?;
            let name = entry.name().to_string();
            if !name.starts_with(&subtree) {
                continue;
            }
            let relative = entry
                .enclosed_name()
                .ok_or_else(|| unsafe_entry_error(&name))?;
            let is_dir = entry.is_dir();
            let mode = entry.unix_mode();
            write_entry(&mut entry, &relative, is_dir, mode, &dest, &mut symlinks)?;
            extracted += 1;
        }
        create_symlinks(&dest, symlinks)?;

        if extracted == 0 {
            return Err(Error::infrastructure(format!(
                "Archive {} has no entries under {}",
                ipa_path.display(),
                subtree
            )));
        }
        log::debug!("Extracted {} entries under {}", extracted, subtree);
        Ok(dest.join(prefix))
    })
    .await?
}

fn open_archive(path: &Path) -> Result<zip::ZipArchive<File>> {
    let file = File::open(path).fs_context("opening archive", path)?;
    zip::ZipArchive::new(file).map_err(|e| {
        Error::infrastructure_with(
            format!("Failed to read zip archive {}: {}", path.display(), e),
            e,
        )
    })
}

fn unsafe_entry_error(name: &str) -> Error {
    Error::infrastructure(format!(
        "Archive entry {} has an unsafe path and was not extracted",
        name
    ))
}

/// A symlink entry held back until every file and directory is written.
struct PendingSymlink {
    relative: PathBuf,
    target: String,
}

fn write_entry<R: Read>(
    reader: &mut R,
    relative: &Path,
    is_dir: bool,
    unix_mode: Option<u32>,
    root: &Path,
    symlinks: &mut Vec<PendingSymlink>,
) -> Result<()> {
    if unix_mode.is_some_and(|mode| mode & S_IFMT == S_IFLNK) {
        let mut target = String::new();
        reader
            .read_to_string(&mut target)
            .fs_context("reading symlink target for", &root.join(relative))?;
        symlinks.push(PendingSymlink {
            relative: relative.to_path_buf(),
            target,
        });
        return Ok(());
    }

    ensure_no_symlinks(root, relative)?;
    let out = root.join(relative);

    if is_dir {
        std::fs::create_dir_all(&out).fs_context("creating directory", &out)?;
        return Ok(());
    }
    if let Some(parent) = out.parent() {
        std::fs::create_dir_all(parent).fs_context("creating directory", parent)?;
    }

    let mut file = File::create(&out).fs_context("creating file", &out)?;
    std::io::copy(reader, &mut file).fs_context("writing file", &out)?;

    #[cfg(unix)]
    if let Some(mode) = unix_mode {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(&out, std::fs::Permissions::from_mode(mode & 0o7777))
            .fs_context("setting permissions on", &out)?;
    }

    Ok(())
}

/// Fails when any existing component of `relative` below `root` is a symlink.
fn ensure_no_symlinks(root: &Path, relative: &Path) -> Result<()> {
    let mut current = root.to_path_buf();
    for component in relative.components() {
        current.push(component);
        match std::fs::symlink_metadata(&current) {
            Ok(metadata) if metadata.file_type().is_symlink() => {
                return Err(Error::infrastructure(format!(
                    "Archive entry {} passes through a symlink and was not extracted",
                    relative.display()
                )));
            }
            Ok(_) => {}
            // Nothing exists below a missing component
            Err(_) => break,
        }
    }
    Ok(())
}

fn create_symlinks(root: &Path, symlinks: Vec<PendingSymlink>) -> Result<()> {
    for link in symlinks {
        if let Some(parent) = link.relative.parent() {
            ensure_no_symlinks(root, parent)?;
            let dir = root.join(parent);
            std::fs::create_dir_all(&dir).fs_context("creating directory", &dir)?;
        }
        write_symlink(&link.target, &link.relative, &root.join(&link.relative))?;
    }
    Ok(())
}

#[cfg(unix)]
fn write_symlink(target: &str, relative: &Path, out: &Path) -> Result<()> {
    if !symlink_stays_inside(relative, Path::new(target)) {
        return Err(Error::infrastructure(format!(
            "Archive symlink {} points outside the archive ({})",
            relative.display(),
            target
        )));
    }
    std::os::unix::fs::symlink(target, out).fs_context("creating symlink", out)
}

#[cfg(not(unix))]
fn write_symlink(target: &str, relative: &Path, out: &Path) -> Result<()> {
    log::warn!(
        "Skipping symlink {} -> {} (unsupported on this platform)",
        relative.display(),
        target
    );
    let _ = out;
    Ok(())
}

/// Lexically resolves `target` relative to the link's directory and checks it
/// does not climb above the extraction root.
fn symlink_stays_inside(link: &Path, target: &Path) -> bool {
    if target.is_absolute() {
        return false;
    }
    let mut depth: usize = link
        .parent()
        .map(|p| p.components().filter(|c| matches!(c, Component::Normal(_))).count())
        .unwrap_or(0);
    for component in target.components() {
        match component {
            Component::Normal(_) => depth += 1,
            Component::ParentDir => {
                if depth == 0 {
                    return false;
                }
                depth -= 1;
            }
            Component::CurDir => {}
            Component::RootDir | Component::Prefix(_) => return false,
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::SimpleFileOptions;

    fn build_zip(path: &Path, entries: &[(&str, &str)]) {
        let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
        let options = SimpleFileOptions::default();
        for (name, data) in entries {
            if name.ends_with('/') {
                zip.add_directory(*name, options).unwrap();
            } else {
                zip.start_file(*name, options).unwrap();
                zip.write_all(data.as_bytes()).unwrap();
            }
        }
        zip.finish().unwrap();
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn finds_manifest_directly_inside_app_bundle() {
        let entries = names(&[
            "Payload/",
            "Payload/Demo.app/",
            "Payload/Demo.app/Frameworks/Lib.framework/Info.plist",
            "Payload/Demo.app/Info.plist",
        ]);
        assert_eq!(find_info_plist_entry(&entries), Some("Payload/Demo.app/Info.plist"));
    }

    #[test]
    fn first_matching_manifest_wins() {
        let entries = names(&["Payload/B.app/Info.plist", "Payload/A.app/Info.plist"]);
        assert_eq!(find_info_plist_entry(&entries), Some("Payload/B.app/Info.plist"));
    }

    #[test]
    fn rejects_manifests_outside_the_expected_shape() {
        let entries = names(&[
            "Info.plist",
            "Payload/Info.plist",
            "Payload/Demo/Info.plist",
            "Other/Demo.app/Info.plist",
            "Payload/Demo.app/Info.plist.bak",
        ]);
        assert_eq!(find_info_plist_entry(&entries), None);
    }

    #[test]
    fn app_bundle_entry_strips_manifest_name() {
        assert_eq!(app_bundle_entry("Payload/Demo.app/Info.plist"), "Payload/Demo.app");
    }

    #[tokio::test]
    async fn lists_entries_in_archive_order() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Demo.ipa");
        build_zip(
            &ipa,
            &[
                ("Payload/", ""),
                ("Payload/Demo.app/", ""),
                ("Payload/Demo.app/Demo", "binary"),
                ("Payload/Demo.app/Info.plist", "plist"),
            ],
        );

        let entries = list_entries(&ipa).await.unwrap();
        assert_eq!(
            entries,
            names(&[
                "Payload/",
                "Payload/Demo.app/",
                "Payload/Demo.app/Demo",
                "Payload/Demo.app/Info.plist",
            ])
        );
    }

    #[tokio::test]
    async fn listing_a_non_zip_file_fails() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Broken.ipa");
        std::fs::write(&ipa, b"definitely not a zip").unwrap();

        let err = list_entries(&ipa).await.unwrap_err();
        assert!(err.is_infrastructure());
        assert!(err.message().contains("Failed to read zip archive"));
    }

    #[tokio::test]
    async fn extracts_single_entry_and_subtree() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Demo.ipa");
        build_zip(
            &ipa,
            &[
                ("Payload/Demo.app/Info.plist", "plist"),
                ("Payload/Demo.app/Demo", "binary"),
                ("Payload/Demo.app/_CodeSignature/CodeResources", "res"),
                ("Symbols/Demo.symbols", "sym"),
            ],
        );

        let one = tmp.path().join("one");
        let plist = extract_entry(&ipa, "Payload/Demo.app/Info.plist", &one)
            .await
            .unwrap();
        assert_eq!(std::fs::read(&plist).unwrap(), b"plist");
        assert!(!one.join("Payload/Demo.app/Demo").exists());

        let all = tmp.path().join("all");
        let app = extract_subtree(&ipa, "Payload/Demo.app", &all).await.unwrap();
        assert_eq!(app, all.join("Payload/Demo.app"));
        assert_eq!(std::fs::read(app.join("Demo")).unwrap(), b"binary");
        assert!(app.join("_CodeSignature/CodeResources").exists());
        assert!(!all.join("Symbols").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn chained_symlinks_cannot_redirect_writes_outside_root() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Chain.ipa");
        let mut zip = zip::ZipWriter::new(File::create(&ipa).unwrap());
        let options = SimpleFileOptions::default();
        zip.add_symlink("Payload/Demo.app/l1", "..", options).unwrap();
        zip.add_symlink("Payload/Demo.app/l1/l2", "../..", options).unwrap();
        zip.start_file("Payload/Demo.app/l1/l2/escaped.txt", options)
            .unwrap();
        zip.write_all(b"outside").unwrap();
        zip.finish().unwrap();

        let outer = tmp.path().join("outer");
        let root = outer.join("root");
        std::fs::create_dir_all(&root).unwrap();

        let result = extract_subtree(&ipa, "Payload/Demo.app", &root).await;

        assert!(result.is_err());
        assert!(!outer.join("escaped.txt").exists());
        assert!(!tmp.path().join("escaped.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn symlinks_are_never_followed_when_writing() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Link.ipa");
        let mut zip = zip::ZipWriter::new(File::create(&ipa).unwrap());
        let options = SimpleFileOptions::default();
        zip.add_symlink("Payload/Demo.app/Resources", "..", options)
            .unwrap();
        zip.finish().unwrap();

        let root = tmp.path().join("root");
        let app = extract_subtree(&ipa, "Payload/Demo.app", &root).await.unwrap();

        let link = app.join("Resources");
        assert!(std::fs::symlink_metadata(&link).unwrap().file_type().is_symlink());
        let err = ensure_no_symlinks(&root, Path::new("Payload/Demo.app/Resources/evil.txt"))
            .unwrap_err();
        assert!(err.message().contains("passes through a symlink"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn framework_version_links_are_kept() {
        let tmp = tempfile::tempdir().unwrap();
        let ipa = tmp.path().join("Framework.ipa");
        let mut zip = zip::ZipWriter::new(File::create(&ipa).unwrap());
        let options = SimpleFileOptions::default();
        zip.add_symlink(
            "Payload/Demo.app/Frameworks/Lib.framework/Versions/Current",
            "A",
            options,
        )
        .unwrap();
        zip.start_file("Payload/Demo.app/Frameworks/Lib.framework/Versions/A/Lib", options)
            .unwrap();
        zip.write_all(b"lib").unwrap();
        zip.finish().unwrap();

        let root = tmp.path().join("root");
        let app = extract_subtree(&ipa, "Payload/Demo.app", &root).await.unwrap();

        let versions = app.join("Frameworks/Lib.framework/Versions");
        assert_eq!(std::fs::read_link(versions.join("Current")).unwrap(), Path::new("A"));
        assert_eq!(std::fs::read(versions.join("Current/Lib")).unwrap(), b"lib");
    }

    #[test]
    fn symlink_targets_must_stay_inside_root() {
        let link = Path::new("Payload/Demo.app/Frameworks/A.framework/Current");
        assert!(symlink_stays_inside(link, Path::new("Versions/A")));
        assert!(symlink_stays_inside(link, Path::new("../B.framework")));
        assert!(!symlink_stays_inside(link, Path::new("../../../../../etc")));
        assert!(!symlink_stays_inside(link, Path::new("/etc/passwd")));
    }
}
