//! Module descriptor parsing (`go.mod` and `go.sum`).
//!
//! Only the directives the builder reconciles are modelled: `module`, `go`,
//! `require` and `replace`. Everything else is accepted and ignored.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{file}:{line}: {message}")]
pub struct ModFileError {
  pub file: String,
  pub line: usize,
  pub message: String,
}

/// Which kind of descriptor a file holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
  /// `go.mod`
  Manifest,
  /// `go.sum`
  Checksums,
}

impl DescriptorKind {
  pub fn from_file_name(name: &str) -> Option<Self> {
    match name.rsplit('/').next() {
      Some("go.mod") => Some(Self::Manifest),
      Some("go.sum") => Some(Self::Checksums),
      _ => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Require {
  pub path: String,
  pub version: String,
  pub indirect: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replace {
  pub old_path: String,
  pub old_version: Option<String>,
  pub new_path: String,
  pub new_version: Option<String>,
}

impl Replace {
  /// Local directory replacements cannot be honoured inside another workspace.
  pub fn is_local(&self) -> bool {
    is_local_path(&self.new_path)
  }
}

impl fmt::Display for Replace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.old_path)?;
    if let Some(v) = &self.old_version {
      write!(f, " {v}")?;
    }
    write!(f, " => {}", self.new_path)?;
    if let Some(v) = &self.new_version {
      write!(f, " {v}")?;
    }
    Ok(())
  }
}

/// Parsed `go.mod`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModFile {
  pub module: Option<String>,
  pub go: Option<String>,
  pub requires: Vec<Require>,
  pub replaces: Vec<Replace>,
}

/// One `go.sum` line: `<path> <version>[/go.mod] <hash>`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SumLine {
  pub path: String,
  pub version: String,
  pub hash: String,
}

impl SumLine {
  pub fn parse(line: &str) -> Option<Self> {
    let mut fields = line.split_whitespace();
    let (path, version, hash) = (fields.next()?, fields.next()?, fields.next()?);
    if fields.next().is_some() {
      return None;
    }
    Some(Self {
      path: path.to_string(),
      version: version.to_string(),
      hash: hash.to_string(),
    })
  }

  /// Version without the `/go.mod` marker.
  pub fn module_version(&self) -> &str {
    self.version.strip_suffix("/go.mod").unwrap_or(&self.version)
  }
}

impl fmt::Display for SumLine {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{} {} {}", self.path, self.version, self.hash)
  }
}

/// A descriptor fragment collected while staging a bundle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Descriptor {
  Manifest(ModFile),
  Checksums(Vec<SumLine>),
}

impl Descriptor {
  pub fn parse(kind: DescriptorKind, file: &str, content: &str) -> Result<Self, ModFileError> {
    match kind {
      DescriptorKind::Manifest => parse_mod(file, content).map(Descriptor::Manifest),
      DescriptorKind::Checksums => parse_sum(file, content).map(Descriptor::Checksums),
    }
  }
}

/// Directive block currently open while scanning a `go.mod`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Block {
  None,
  Require,
  Replace,
  Other,
}

/// A `go.mod` line split into its meaningful tokens and trailing comment.
pub(crate) struct ModLine<'a> {
  pub indent: &'a str,
  pub tokens: Vec<&'a str>,
  pub comment: Option<&'a str>,
}

impl<'a> ModLine<'a> {
  pub fn split(line: &'a str) -> Self {
    let indent_len = line.len() - line.trim_start().len();
    let (body, comment) = match line.find("//") {
      Some(pos) => (&line[..pos], Some(&line[pos..])),
      None => (line, None),
    };
    Self {
      indent: &line[..indent_len],
      tokens: body.split_whitespace().collect(),
      comment,
    }
  }
}

/// Tracks `require (` / `replace (` blocks line by line.
pub(crate) fn next_block(block: Block, tokens: &[&str]) -> Option<Block> {
  match (block, tokens) {
    (Block::None, [directive, "("]) => Some(match *directive {
      "require" => Block::Require,
      "replace" => Block::Replace,
      _ => Block::Other,
    }),
    (b, [")"]) if b != Block::None => Some(Block::None),
    _ => None,
  }
}

/// Parses a require entry (`path version`), with or without the keyword.
pub(crate) fn require_entry(block: Block, tokens: &[&str]) -> Option<(String, String)> {
  match (block, tokens) {
    (Block::None, ["require", path, version]) | (Block::Require, [path, version]) => {
      Some((unquote(path), unquote(version)))
    }
    _ => None,
  }
}

/// Parses a replace entry (`old [v] => new [v]`), with or without the keyword.
pub(crate) fn replace_entry(block: Block, tokens: &[&str]) -> Option<Replace> {
  let rest = match (block, tokens) {
    (Block::None, ["replace", rest @ ..]) => rest,
    (Block::Replace, rest) => rest,
    _ => return None,
  };
  let arrow = rest.iter().position(|t| *t == "=>")?;
  let (lhs, rhs) = (&rest[..arrow], &rest[arrow + 1..]);
  let (old_path, old_version) = match lhs {
    [path] => (unquote(path), None),
    [path, version] => (unquote(path), Some(unquote(version))),
    _ => return None,
  };
  let (new_path, new_version) = match rhs {
    [path] => (unquote(path), None),
    [path, version] => (unquote(path), Some(unquote(version))),
    _ => return None,
  };
  Some(Replace {
    old_path,
    old_version,
    new_path,
    new_version,
  })
}

fn parse_mod(file: &str, content: &str) -> Result<ModFile, ModFileError> {
  let mut modfile = ModFile::default();
  let mut block = Block::None;

  for (idx, raw) in content.lines().enumerate() {
    let line = ModLine::split(raw);
    let err = |message: &str| ModFileError {
      file: file.to_string(),
      line: idx + 1,
      message: message.to_string(),
    };

    if line.tokens.is_empty() {
      continue;
    }
    if let Some(next) = next_block(block, &line.tokens) {
      block = next;
      continue;
    }
    if let Some((path, version)) = require_entry(block, &line.tokens) {
      let indirect = line.comment.is_some_and(|c| c.contains("indirect"));
      modfile.requires.push(Require {
        path,
        version,
        indirect,
      });
      continue;
    }
    if let Some(replace) = replace_entry(block, &line.tokens) {
      modfile.replaces.push(replace);
      continue;
    }

    match (block, line.tokens.as_slice()) {
      (Block::None, ["module", path]) => modfile.module = Some(unquote(path)),
      (Block::None, ["go", version]) => modfile.go = Some(version.to_string()),
      (Block::None, ["require", ..]) => return Err(err("malformed require directive")),
      (Block::None, ["replace", ..]) | (Block::Replace, _) => return Err(err("malformed replace directive")),
      (Block::Require, _) => return Err(err("malformed require entry")),
      _ => {}
    }
  }

  if block != Block::None {
    return Err(ModFileError {
      file: file.to_string(),
      line: content.lines().count(),
      message: "unterminated block".to_string(),
    });
  }

  Ok(modfile)
}

fn parse_sum(file: &str, content: &str) -> Result<Vec<SumLine>, ModFileError> {
  content
    .lines()
    .enumerate()
    .filter(|(_, line)| !line.trim().is_empty())
    .map(|(idx, line)| {
      SumLine::parse(line).ok_or_else(|| ModFileError {
        file: file.to_string(),
        line: idx + 1,
        message: "expected '<path> <version> <hash>'".to_string(),
      })
    })
    .collect()
}

fn unquote(token: &str) -> String {
  token.trim_matches(|c| c == '"' || c == '`').to_string()
}

pub(crate) fn is_local_path(path: &str) -> bool {
  path.starts_with("./") || path.starts_with("../") || path.starts_with('/') || path == "." || path == ".."
}
