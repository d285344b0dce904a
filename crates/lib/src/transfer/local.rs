//! Local filesystem transfer with HTTP fetch support.

use std::fs;
use std::io::{self, Read};
use std::path::{Component, Path, PathBuf};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use tar::{Archive, Builder, EntryType, HeaderMode};
use tracing::{debug, info};
use walkdir::WalkDir;

use super::{Transfer, TransferError, UnpackVisitor};
use crate::consts::{ARCHIVE_SUFFIX, DESCRIPTOR_FILES};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// [`Transfer`] backed by the local filesystem.
#[derive(Debug, Clone, Default)]
pub struct LocalTransfer {
  client: reqwest::Client,
}

impl LocalTransfer {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_client(client: reqwest::Client) -> Self {
    Self { client }
  }

  async fn read_source(&self, source: &str) -> Result<Vec<u8>, TransferError> {
    if source.starts_with("http://") || source.starts_with("https://") {
      return self.fetch(source).await;
    }
    let path = source.strip_prefix("file://").unwrap_or(source);
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TransferError::NotFound(PathBuf::from(path))),
      Err(e) => Err(e.into()),
    }
  }

  async fn fetch(&self, url: &str) -> Result<Vec<u8>, TransferError> {
    info!(url = %url, "fetching URL");

    let response = self.client.get(url).send().await.map_err(|e| TransferError::Fetch {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    if !response.status().is_success() {
      return Err(TransferError::Fetch {
        url: url.to_string(),
        message: format!("HTTP {}", response.status()),
      });
    }

    let bytes = response.bytes().await.map_err(|e| TransferError::Fetch {
      url: url.to_string(),
      message: e.to_string(),
    })?;

    debug!(url = %url, size = bytes.len(), "download complete");
    Ok(bytes.to_vec())
  }
}

impl Transfer for LocalTransfer {
  async fn pack(&self, dir: &Path) -> Result<Vec<u8>, TransferError> {
    let dir = dir.to_path_buf();
    blocking(move || pack_dir(&dir)).await
  }

  async fn unpack<V: UnpackVisitor>(&self, bundle: &[u8], dest: &Path, visitor: &mut V) -> Result<(), TransferError> {
    let bundle = bundle.to_vec();
    let files = blocking(move || read_bundle(&bundle)).await?;
    let files = visit_files(files, visitor)?;
    let dest = dest.to_path_buf();
    blocking(move || write_files(&dest, files)).await
  }

  async fn exists(&self, path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
  }

  async fn copy(&self, source: &str, dest: &Path) -> Result<(), TransferError> {
    let (source, extract) = match source.strip_suffix(ARCHIVE_SUFFIX) {
      Some(stripped) => (stripped, true),
      None => (source, false),
    };

    let bytes = self.read_source(source).await?;

    if extract {
      debug!(source = %source, dest = ?dest, "extracting archive");
      let dest = dest.to_path_buf();
      blocking(move || extract_archive(&bytes, &dest)).await?;
    } else {
      self.store(&bytes, dest).await?;
    }
    Ok(())
  }

  async fn download(&self, path: &Path) -> Result<Vec<u8>, TransferError> {
    match tokio::fs::read(path).await {
      Ok(bytes) => Ok(bytes),
      Err(e) if e.kind() == io::ErrorKind::NotFound => Err(TransferError::NotFound(path.to_path_buf())),
      Err(e) => Err(e.into()),
    }
  }

  async fn store(&self, data: &[u8], dest: &Path) -> Result<(), TransferError> {
    if let Some(parent) = dest.parent() {
      tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(dest, data).await?;
    Ok(())
  }
}

/// Packs `dir` into a gzip-compressed tar.
///
/// Entries are added in file-name order with normalized headers, so the same
/// tree always produces the same bytes.
fn pack_dir(dir: &Path) -> Result<Vec<u8>, TransferError> {
  if !dir.is_dir() {
    return Err(TransferError::NotFound(dir.to_path_buf()));
  }

  let encoder = GzEncoder::new(Vec::new(), Compression::default());
  let mut builder = Builder::new(encoder);
  builder.mode(HeaderMode::Deterministic);
  builder.follow_symlinks(false);

  for entry in WalkDir::new(dir).min_depth(1).sort_by_file_name() {
    let entry = entry.map_err(|e| TransferError::Io(io::Error::other(e)))?;
    let rel = entry
      .path()
      .strip_prefix(dir)
      .map_err(|_| TransferError::UnsafePath(entry.path().to_path_buf()))?;

    if entry.file_type().is_dir() {
      builder.append_dir(rel, entry.path())?;
    } else {
      builder.append_path_with_name(entry.path(), rel)?;
    }
  }

  let encoder = builder.into_inner()?;
  Ok(encoder.finish()?)
}

/// Runs archive work on the blocking pool so builds sharing a runtime keep
/// making progress.
async fn blocking<R, F>(f: F) -> Result<R, TransferError>
where
  R: Send + 'static,
  F: FnOnce() -> Result<R, TransferError> + Send + 'static,
{
  tokio::task::spawn_blocking(f)
    .await
    .map_err(|err| TransferError::Io(io::Error::other(err)))?
}

enum BundleEntry {
  Dir(PathBuf),
  File(BundleFile),
}

struct BundleFile {
  rel: PathBuf,
  name: String,
  mode: u32,
  content: Vec<u8>,
}

/// Decodes a source bundle into its directories and files.
///
/// Header sizes are not trusted: content is read until the archive ends and
/// a short entry is an error.
fn read_bundle(bundle: &[u8]) -> Result<Vec<BundleEntry>, TransferError> {
  let mut entries = Vec::new();
  let mut archive = Archive::new(reader(bundle));
  for entry in archive.entries()? {
    let mut entry = entry?;
    let rel = sanitize(&entry.path()?)?;
    if rel.as_os_str().is_empty() {
      continue;
    }

    match entry.header().entry_type() {
      EntryType::Directory => entries.push(BundleEntry::Dir(rel)),
      EntryType::Regular | EntryType::Continuous => {
        let expected = entry.size();
        let mut content = Vec::new();
        entry.read_to_end(&mut content)?;
        if content.len() as u64 != expected {
          return Err(TransferError::Truncated {
            path: rel,
            expected,
            actual: content.len() as u64,
          });
        }
        entries.push(BundleEntry::File(BundleFile {
          name: slash_path(&rel),
          mode: entry.header().mode().unwrap_or(0o644),
          rel,
          content,
        }));
      }
      other => debug!(path = ?rel, kind = ?other, "skipping unsupported entry"),
    }
  }
  Ok(entries)
}

/// Reports descriptors, then passes every file through the visitor.
fn visit_files<V: UnpackVisitor>(entries: Vec<BundleEntry>, visitor: &mut V) -> Result<Vec<BundleEntry>, TransferError> {
  for entry in &entries {
    if let BundleEntry::File(file) = entry
      && is_descriptor(&file.rel)
    {
      visitor
        .on_descriptor(&file.name, &file.content)
        .map_err(|source| TransferError::Visit {
          path: file.name.clone(),
          source,
        })?;
    }
  }

  entries
    .into_iter()
    .map(|entry| match entry {
      BundleEntry::File(mut file) => {
        let content = std::mem::take(&mut file.content);
        file.content = visitor
          .on_file(&file.name, content)
          .map_err(|source| TransferError::Visit {
            path: file.name.clone(),
            source,
          })?;
        Ok(BundleEntry::File(file))
      }
      dir => Ok(dir),
    })
    .collect()
}

fn write_files(dest: &Path, entries: Vec<BundleEntry>) -> Result<(), TransferError> {
  fs::create_dir_all(dest)?;
  for entry in entries {
    let file = match entry {
      BundleEntry::Dir(rel) => {
        fs::create_dir_all(dest.join(rel))?;
        continue;
      }
      BundleEntry::File(file) => file,
    };

    let target = dest.join(&file.rel);
    if let Some(parent) = target.parent() {
      fs::create_dir_all(parent)?;
    }
    fs::write(&target, &file.content)?;

    #[cfg(unix)]
    {
      use std::os::unix::fs::PermissionsExt;
      fs::set_permissions(&target, fs::Permissions::from_mode(file.mode))?;
    }
    #[cfg(not(unix))]
    let _ = file.mode;
  }
  Ok(())
}

/// Extracts a (possibly gzip-compressed) tar into `dest`, keeping its layout.
fn extract_archive(bytes: &[u8], dest: &Path) -> Result<(), TransferError> {
  fs::create_dir_all(dest)?;
  let mut archive = Archive::new(reader(bytes));
  archive.set_preserve_permissions(true);
  archive.unpack(dest)?;
  info!(dest = ?dest, "unpacked archive");
  Ok(())
}

fn reader(bytes: &[u8]) -> Box<dyn Read + '_> {
  if bytes.starts_with(&GZIP_MAGIC) {
    Box::new(GzDecoder::new(bytes))
  } else {
    Box::new(bytes)
  }
}

/// Keeps only plain components, rejecting anything that climbs out of the root.
fn sanitize(path: &Path) -> Result<PathBuf, TransferError> {
  let mut clean = PathBuf::new();
  for component in path.components() {
    match component {
      Component::Normal(part) => clean.push(part),
      Component::CurDir => {}
      _ => return Err(TransferError::UnsafePath(path.to_path_buf())),
    }
  }
  Ok(clean)
}

fn slash_path(path: &Path) -> String {
  path
    .components()
    .map(|c| c.as_os_str().to_string_lossy())
    .collect::<Vec<_>>()
    .join("/")
}

fn is_descriptor(path: &Path) -> bool {
  path
    .file_name()
    .and_then(|name| name.to_str())
    .is_some_and(|name| DESCRIPTOR_FILES.contains(&name))
}
