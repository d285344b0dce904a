//! Pure source transforms applied while staging a bundle.
//!
//! [`PinSet::from_descriptors`] folds the accumulated descriptors into the
//! versions and locations the build must resolve against.
//! [`rewrite_source`] rewrites one file against a pin set and
//! [`has_entry_marker`] detects program entry points. Both are pure: the same
//! bytes and pins always give the same result.

use std::collections::{BTreeMap, BTreeSet};

use super::modfile::{Block, Descriptor, ModLine, Replace, SumLine, next_block, replace_entry, require_entry};
use crate::consts::ENTRY_MARKER;

/// Dependency pins derived from descriptor fragments.
///
/// Versions come from `require` directives, locations from `replace`
/// directives whose target is a module (local directory replacements only
/// make sense inside the workspace that declared them). When several
/// fragments pin the same dependency, the first one seen wins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PinSet {
  versions: BTreeMap<String, String>,
  replaces: BTreeMap<String, Replace>,
  sums: BTreeMap<(String, String), SumLine>,
}

impl PinSet {
  pub fn from_descriptors<'a>(descriptors: impl IntoIterator<Item = &'a Descriptor>) -> Self {
    let mut set = PinSet::default();

    for descriptor in descriptors {
      match descriptor {
        Descriptor::Manifest(modfile) => {
          for require in &modfile.requires {
            set
              .versions
              .entry(require.path.clone())
              .or_insert_with(|| require.version.clone());
          }
          for replace in modfile.replaces.iter().filter(|r| !r.is_local()) {
            set
              .replaces
              .entry(replace.old_path.clone())
              .or_insert_with(|| replace.clone());
          }
        }
        Descriptor::Checksums(lines) => {
          for line in lines {
            let key = (line.path.clone(), line.version.clone());
            set.sums.entry(key).or_insert_with(|| line.clone());
          }
        }
      }
    }

    set
  }

  pub fn version(&self, path: &str) -> Option<&str> {
    self.versions.get(path).map(String::as_str)
  }

  pub fn replacement(&self, path: &str) -> Option<&Replace> {
    self.replaces.get(path)
  }

  pub fn is_empty(&self) -> bool {
    self.versions.is_empty() && self.replaces.is_empty()
  }

  /// Returns the pinned version of `path` if it differs from `version`.
  fn repinned(&self, path: &str, version: &str) -> Option<&str> {
    self.version(path).filter(|pinned| *pinned != version)
  }

  /// Known checksum lines for `path` at `version` (both the module and its `go.mod`).
  fn sums_for(&self, path: &str, version: &str) -> impl Iterator<Item = &SumLine> {
    let go_mod = format!("{version}/go.mod");
    [version.to_string(), go_mod]
      .into_iter()
      .filter_map(move |v| self.sums.get(&(path.to_string(), v)))
  }
}

/// Rewrites dependency references in one staged file.
///
/// `go.mod` and `go.sum` are reconciled with the pins. Go sources resolve
/// their imports through `go.mod`, so `.go` files come back unchanged, as
/// does anything that is not valid UTF-8.
pub fn rewrite_source(path: &str, content: &[u8], pins: &PinSet) -> Vec<u8> {
  if pins.is_empty() {
    return content.to_vec();
  }
  let Ok(text) = std::str::from_utf8(content) else {
    return content.to_vec();
  };

  let file_name = path.rsplit('/').next().unwrap_or(path);
  let rewritten = match file_name {
    "go.mod" => rewrite_mod(text, pins),
    "go.sum" => rewrite_sum(text, pins),
    _ => return content.to_vec(),
  };
  rewritten.into_bytes()
}

/// Returns true if the file declares the entry-point package.
///
/// Only the package clause counts: comments and build constraints before it
/// are skipped, and a mention inside a later comment never matches.
pub fn has_entry_marker(content: &[u8]) -> bool {
  let text = String::from_utf8_lossy(content);
  let mut in_block_comment = false;

  for line in text.lines() {
    let mut rest = line.trim();
    if in_block_comment {
      match rest.find("*/") {
        Some(end) => {
          in_block_comment = false;
          rest = rest[end + 2..].trim_start();
        }
        None => continue,
      }
    }
    while let Some(stripped) = rest.strip_prefix("/*") {
      match stripped.find("*/") {
        Some(end) => rest = stripped[end + 2..].trim_start(),
        None => {
          in_block_comment = true;
          rest = "";
        }
      }
    }
    if rest.is_empty() || rest.starts_with("//") {
      continue;
    }

    // a Go file has exactly one package clause and it is the first token
    return rest.strip_prefix(ENTRY_MARKER).is_some_and(|tail| {
      tail.is_empty()
        || tail.starts_with(char::is_whitespace)
        || tail.starts_with("//")
        || tail.starts_with("/*")
        || tail.starts_with(';')
    });
  }
  false
}

fn rewrite_mod(text: &str, pins: &PinSet) -> String {
  let mut out = Vec::new();
  let mut block = Block::None;
  let mut required = BTreeSet::new();
  let mut replaced = BTreeSet::new();

  for raw in text.lines() {
    let line = ModLine::split(raw);

    if let Some(next) = next_block(block, &line.tokens) {
      block = next;
      out.push(raw.to_string());
      continue;
    }

    if let Some((path, version)) = require_entry(block, &line.tokens) {
      let rewritten = pins.repinned(&path, &version).map(|pinned| {
        let keyword = if block == Block::None { "require " } else { "" };
        let mut rewritten = format!("{}{keyword}{path} {pinned}", line.indent);
        if let Some(comment) = line.comment {
          rewritten.push(' ');
          rewritten.push_str(comment);
        }
        rewritten
      });
      out.push(rewritten.unwrap_or_else(|| raw.to_string()));
      required.insert(path);
      continue;
    }

    if let Some(existing) = replace_entry(block, &line.tokens) {
      let rewritten = pins
        .replacement(&existing.old_path)
        .filter(|pinned| **pinned != existing)
        .map(|pinned| {
          let keyword = if block == Block::None { "replace " } else { "" };
          format!("{}{keyword}{pinned}", line.indent)
        });
      out.push(rewritten.unwrap_or_else(|| raw.to_string()));
      replaced.insert(existing.old_path);
      continue;
    }

    out.push(raw.to_string());
  }

  let missing: Vec<&Replace> = required
    .iter()
    .filter(|path| !replaced.contains(*path))
    .filter_map(|path| pins.replacement(path))
    .collect();

  let mut result = out.join("\n");
  if !missing.is_empty() {
    result = result.trim_end().to_string();
    result.push_str("\n\nreplace (\n");
    for replace in missing {
      result.push_str(&format!("\t{replace}\n"));
    }
    result.push(')');
  }
  if text.ends_with('\n') && !result.ends_with('\n') {
    result.push('\n');
  }
  result
}

fn rewrite_sum(text: &str, pins: &PinSet) -> String {
  let mut kept = BTreeSet::new();
  let mut order = Vec::new();
  let mut wanted = BTreeSet::new();

  for raw in text.lines() {
    let Some(line) = SumLine::parse(raw) else {
      if !raw.trim().is_empty() {
        order.push(raw.to_string());
      }
      continue;
    };

    if let Some(replace) = pins.replacement(&line.path) {
      if let Some(version) = &replace.new_version {
        wanted.insert((replace.new_path.clone(), version.clone()));
      }
    }

    match pins.repinned(&line.path, line.module_version()) {
      Some(pinned) => {
        wanted.insert((line.path.clone(), pinned.to_string()));
      }
      None => {
        if kept.insert(line.to_string()) {
          order.push(line.to_string());
        }
      }
    }
  }

  for (path, version) in &wanted {
    for line in pins.sums_for(path, version) {
      if kept.insert(line.to_string()) {
        order.push(line.to_string());
      }
    }
  }

  if order.is_empty() {
    return String::new();
  }
  let mut result = order.join("\n");
  result.push('\n');
  result
}
