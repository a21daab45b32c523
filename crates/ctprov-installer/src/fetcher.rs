use anyhow::{anyhow, Context, Result};
use ctprov_core::ArchiveType;
use ctprov_security::verify_sha256_file;
use std::fs::{self, File};
use std::path::{Component, Path, PathBuf};
use std::process::Command;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

use crate::command::{escape_ps_single_quote_path, run_checked};
use crate::fs_utils::{remove_file_if_exists, remove_path_if_exists};

const USER_AGENT: &str = concat!("ctprov/", env!("CARGO_PKG_VERSION"));

/// Downloads an archive and unpacks it into a destination directory.
///
/// Callers decide whether a fetch is needed; implementations always fetch.
pub trait ArchiveFetcher {
    fn fetch(&self, url: &str, destination: &Path, strip_components: u32) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DownloadStatus {
    CacheHit,
    Downloaded,
    Copied,
}

impl DownloadStatus {
    fn as_str(self) -> &'static str {
        match self {
            Self::CacheHit => "cache-hit",
            Self::Downloaded => "downloaded",
            Self::Copied => "copied",
        }
    }
}

/// Fetches `http(s)://` URLs with a blocking HTTP client and `file://` URLs
/// or plain paths from the local filesystem, then extracts with the host's
/// archive tools.
#[derive(Debug, Clone)]
pub struct HttpArchiveFetcher {
    cache_dir: PathBuf,
    timeout: Duration,
    expected_sha256: Option<String>,
}

impl HttpArchiveFetcher {
    pub fn new(cache_dir: impl Into<PathBuf>) -> Self {
        Self {
            cache_dir: cache_dir.into(),
            timeout: Duration::from_secs(300),
            expected_sha256: None,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_sha256(mut self, sha256: Option<String>) -> Self {
        self.expected_sha256 = sha256;
        self
    }

    fn download_to_cache(&self, url: &str) -> Result<(PathBuf, DownloadStatus)> {
        fs::create_dir_all(&self.cache_dir).with_context(|| {
            format!("failed to create cache dir: {}", self.cache_dir.display())
        })?;
        let cache_path = self.cache_dir.join(archive_file_name(url));

        if let Some(expected) = &self.expected_sha256 {
            if cache_path.is_file() && verify_sha256_file(&cache_path, expected)? {
                return Ok((cache_path, DownloadStatus::CacheHit));
            }
        }

        let status = match local_source_path(url) {
            Some(source) => {
                fs::copy(&source, &cache_path).with_context(|| {
                    format!(
                        "failed to copy archive {} to {}",
                        source.display(),
                        cache_path.display()
                    )
                })?;
                DownloadStatus::Copied
            }
            None => {
                self.download_remote(url, &cache_path)?;
                DownloadStatus::Downloaded
            }
        };

        if let Some(expected) = &self.expected_sha256 {
            if !verify_sha256_file(&cache_path, expected)? {
                let _ = remove_file_if_exists(&cache_path);
                return Err(anyhow!(
                    "sha256 mismatch for {url}: expected {expected}"
                ));
            }
        }

        Ok((cache_path, status))
    }

    fn download_remote(&self, url: &str, cache_path: &Path) -> Result<()> {
        let part_path = cache_path.with_file_name(format!(
            "{}.part",
            cache_path
                .file_name()
                .and_then(|v| v.to_str())
                .unwrap_or("archive")
        ));

        let result = self.download_remote_into(url, &part_path);
        if let Err(err) = result {
            let _ = fs::remove_file(&part_path);
            return Err(err);
        }

        remove_file_if_exists(cache_path)
            .with_context(|| format!("failed to replace cache file: {}", cache_path.display()))?;
        fs::rename(&part_path, cache_path).with_context(|| {
            format!(
                "failed to move downloaded archive into cache: {}",
                cache_path.display()
            )
        })
    }

    fn download_remote_into(&self, url: &str, out_path: &Path) -> Result<()> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(self.timeout)
            .build()
            .context("failed to create HTTP client")?;
        let mut response = client
            .get(url)
            .send()
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("download of {url} was rejected"))?;

        let mut file = File::create(out_path)
            .with_context(|| format!("failed to create {}", out_path.display()))?;
        response
            .copy_to(&mut file)
            .with_context(|| format!("failed to write {}", out_path.display()))?;
        Ok(())
    }
}

impl ArchiveFetcher for HttpArchiveFetcher {
    fn fetch(&self, url: &str, destination: &Path, strip_components: u32) -> Result<()> {
        let archive_type = ArchiveType::infer_from_url(url).ok_or_else(|| {
            anyhow!("could not infer archive type from URL '{url}'; supported: zip, tar.gz")
        })?;

        let (archive_path, status) = self.download_to_cache(url)?;
        info!(
            url,
            archive = %archive_path.display(),
            status = status.as_str(),
            "archive ready"
        );

        let unpack_dir = make_staging_dir(&self.cache_dir, "unpack")?;
        let result = extract_archive(&archive_path, &unpack_dir, archive_type).and_then(|()| {
            install_unpacked(&unpack_dir, destination, strip_components as usize)
        });
        discard_staging_dir(&unpack_dir);
        result?;

        debug!(destination = %destination.display(), "archive extracted");
        Ok(())
    }
}

/// Lays the unpacked archive out in a hidden sibling of `destination`, then
/// swaps it in. `destination` never holds a partially copied tree.
fn install_unpacked(
    unpack_dir: &Path,
    destination: &Path,
    strip_components: usize,
) -> Result<()> {
    let parent = destination
        .parent()
        .ok_or_else(|| anyhow!("destination has no parent: {}", destination.display()))?;
    let name = destination
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| anyhow!("destination has no file name: {}", destination.display()))?;

    let staged = make_staging_dir(parent, &format!(".{name}.tmp"))?;
    let result = place_stripped(unpack_dir, &staged, strip_components).and_then(|placed| {
        debug!(staged = %staged.display(), placed, "archive layout staged");
        swap_into_place(&staged, destination)
    });
    discard_staging_dir(&staged);
    result
}

fn swap_into_place(staged: &Path, destination: &Path) -> Result<()> {
    remove_path_if_exists(destination)
        .with_context(|| format!("failed to clear {}", destination.display()))?;
    if fs::rename(staged, destination).is_ok() {
        return Ok(());
    }

    if let Err(err) = place_stripped(staged, destination, 0) {
        let _ = remove_path_if_exists(destination);
        return Err(err.context(format!(
            "failed to move staged install into {}",
            destination.display()
        )));
    }
    Ok(())
}

fn discard_staging_dir(path: &Path) {
    if let Err(err) = remove_path_if_exists(path) {
        warn!(
            path = %path.display(),
            error = %err,
            "failed to clean up staging dir"
        );
    }
}

pub(crate) fn archive_file_name(url: &str) -> String {
    let without_fragment = url.split('#').next().unwrap_or(url);
    let without_query = without_fragment
        .split('?')
        .next()
        .unwrap_or(without_fragment);
    let name = without_query
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();
    if name.is_empty() || name == "." || name == ".." {
        return "archive".to_string();
    }
    name.to_string()
}

pub(crate) fn local_source_path(url: &str) -> Option<PathBuf> {
    if let Some(path) = url.strip_prefix("file://") {
        return Some(PathBuf::from(path));
    }
    if url.contains("://") {
        return None;
    }
    Some(PathBuf::from(url))
}

static STAGING_COUNTER: AtomicU64 = AtomicU64::new(0);

fn make_staging_dir(parent: &Path, prefix: &str) -> Result<PathBuf> {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .context("system clock is before unix epoch")?
        .as_nanos();
    let sequence = STAGING_COUNTER.fetch_add(1, Ordering::Relaxed);
    let dir = parent.join(format!(
        "{}-{}-{}-{}",
        prefix,
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed creating staging dir: {}", dir.display()))?;
    Ok(dir)
}

fn extract_archive(archive_path: &Path, dst: &Path, archive_type: ArchiveType) -> Result<()> {
    match archive_type {
        ArchiveType::TarGz => {
            let mut tar = Command::new("tar");
            tar.arg("-xzf").arg(archive_path).arg("-C").arg(dst);
            run_checked(&mut tar, "tar extraction")
        }
        ArchiveType::Zip => extract_zip(archive_path, dst),
    }
}

/// Tries each zip extractor available on the host in turn and reports the
/// last failure when none succeeds.
fn extract_zip(archive_path: &Path, dst: &Path) -> Result<()> {
    let mut attempts = Vec::new();
    if cfg!(windows) {
        let mut powershell = Command::new("powershell");
        powershell.arg("-NoProfile").arg("-Command").arg(format!(
            "Expand-Archive -LiteralPath '{}' -DestinationPath '{}' -Force",
            escape_ps_single_quote_path(archive_path),
            escape_ps_single_quote_path(dst)
        ));
        attempts.push(("Expand-Archive", powershell));
    }
    let mut unzip = Command::new("unzip");
    unzip.arg("-q").arg("-o").arg(archive_path).arg("-d").arg(dst);
    attempts.push(("unzip", unzip));
    let mut tar = Command::new("tar");
    tar.arg("-xf").arg(archive_path).arg("-C").arg(dst);
    attempts.push(("tar", tar));

    let mut last_error = None;
    for (tool, mut command) in attempts {
        match run_checked(&mut command, &format!("zip extraction with {tool}")) {
            Ok(()) => return Ok(()),
            Err(err) => {
                debug!(tool, error = %format!("{err:#}"), "zip extractor failed");
                last_error = Some(err);
            }
        }
    }
    Err(last_error.unwrap_or_else(|| anyhow!("no zip extractor available")))
}

/// Copies every file under `src_root` into `dst_root`, dropping the first
/// `strip_components` path segments. Returns how many entries were placed.
pub(crate) fn place_stripped(
    src_root: &Path,
    dst_root: &Path,
    strip_components: usize,
) -> Result<usize> {
    let mut pending = vec![src_root.to_path_buf()];
    let mut placed = 0;
    while let Some(dir) = pending.pop() {
        let entries =
            fs::read_dir(&dir).with_context(|| format!("failed to read {}", dir.display()))?;
        for entry in entries {
            let entry = entry.with_context(|| format!("failed to read {}", dir.display()))?;
            let path = entry.path();
            let file_type = entry
                .file_type()
                .with_context(|| format!("failed to stat {}", path.display()))?;
            if file_type.is_dir() {
                pending.push(path);
                continue;
            }

            let Some(relative) = path
                .strip_prefix(src_root)
                .ok()
                .and_then(|relative| strip_leading(relative, strip_components))
            else {
                continue;
            };
            place_entry(&path, &dst_root.join(relative), file_type)?;
            placed += 1;
        }
    }

    if placed == 0 {
        return Err(anyhow!(
            "archive left nothing to install after stripping {strip_components} leading component(s)"
        ));
    }
    Ok(placed)
}

fn place_entry(from: &Path, to: &Path, file_type: fs::FileType) -> Result<()> {
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }

    #[cfg(unix)]
    if file_type.is_symlink() {
        let target =
            fs::read_link(from).with_context(|| format!("failed to read link {}", from.display()))?;
        return std::os::unix::fs::symlink(&target, to)
            .with_context(|| format!("failed to link {} -> {}", to.display(), target.display()));
    }
    #[cfg(not(unix))]
    let _ = file_type;

    fs::copy(from, to)
        .with_context(|| format!("failed to copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Drops the first `count` normal segments of `path`; `None` when nothing is left.
pub(crate) fn strip_leading(path: &Path, count: usize) -> Option<PathBuf> {
    let kept: PathBuf = path
        .components()
        .filter(|component| matches!(component, Component::Normal(_)))
        .skip(count)
        .collect();
    (!kept.as_os_str().is_empty()).then_some(kept)
}
