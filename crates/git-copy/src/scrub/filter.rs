//! The streaming history rewrite: fast-export in, fast-import out.
//!
//! The filter rewrites refs, identities, messages and blob payloads,
//! drops excluded paths, collapses designated file histories, and elides
//! commits left with no operations, keeping the DAG consistent through a
//! mark table that redirects references to elided commits onto their
//! nearest surviving ancestor.

use std::collections::{HashMap, HashSet};
use std::io::{BufRead, BufWriter, Write};

use thiserror::Error;

use super::pattern;
use super::rules::CompiledRules;
use super::stream::{Blob, Commit, FileOp, Record, RecordReader, RecordWriter, Reset, Tag};

/// Base for marks assigned to synthetic collapse blobs; high enough that
/// exporter-chosen marks cannot collide with it.
pub const SYNTHETIC_MARK_BASE: u64 = 900_000_000;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("unsafe rename or copy from excluded path '{from}' to included path '{to}'; add an exclusion for the destination or avoid renaming excluded files")]
    UnsafeRename { from: String, to: String },

    #[error("ref name collision after scrubbing: '{first}' and '{second}' both become '{rewritten}'")]
    RefCollision {
        first: String,
        second: String,
        rewritten: String,
    },

    #[error("internal ref rewrite mismatch for '{0}'")]
    RefRewriteMismatch(String),

    #[error("invalid data length header: '{0}'")]
    MalformedDataHeader(String),

    #[error("truncated data payload: expected {expected} bytes")]
    TruncatedPayload { expected: usize },

    #[error("unexpected end of export stream")]
    UnexpectedStreamEnd,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub struct ExportFilter {
    rules: CompiledRules,

    /// Original mark token -> reference later records should use. Elided
    /// commits remap their mark to their resolved parent (possibly empty).
    mark_map: HashMap<String, String>,

    // Collision detection: original ref -> scrubbed ref and back.
    ref_forward: HashMap<String, String>,
    ref_reverse: HashMap<String, String>,

    /// Collapse paths whose first occurrence has already been emitted.
    collapse_seen: HashSet<String>,
    /// Collapse path -> synthetic blob mark.
    collapse_marks: HashMap<String, String>,
    next_synthetic_mark: u64,
    synthetics_emitted: bool,
}

impl ExportFilter {
    pub fn new(rules: CompiledRules) -> Self {
        Self {
            rules,
            mark_map: HashMap::new(),
            ref_forward: HashMap::new(),
            ref_reverse: HashMap::new(),
            collapse_seen: HashSet::new(),
            collapse_marks: HashMap::new(),
            next_synthetic_mark: SYNTHETIC_MARK_BASE,
            synthetics_emitted: false,
        }
    }

    /// Streams the whole export through the rewrite, writing a fast-import
    /// stream to `output`. Fails fast; the caller owns process cleanup.
    pub fn run<R: BufRead, W: Write>(&mut self, input: R, output: W) -> Result<(), FilterError> {
        let mut reader = RecordReader::new(input);
        let mut writer = RecordWriter::new(BufWriter::new(output));

        while let Some(record) = reader.next_record()? {
            match record {
                Record::Blob(blob) => self.emit_blob(&mut writer, blob)?,
                Record::Commit(commit) => {
                    if !self.synthetics_emitted {
                        self.emit_synthetic_blobs(&mut writer)?;
                        self.synthetics_emitted = true;
                    }
                    self.emit_commit(&mut writer, commit)?;
                }
                Record::Tag(tag) => self.emit_tag(&mut writer, tag)?,
                Record::Reset(reset) => self.emit_reset(&mut writer, reset)?,
                Record::Passthrough(line) => writer.write_raw(line.as_bytes())?,
            }
        }
        writer.flush()?;
        Ok(())
    }

    fn emit_blob<W: Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
        mut blob: Blob,
    ) -> Result<(), FilterError> {
        blob.data = self.rules.rewrite_bytes(&blob.data);
        writer.write_blob(&blob)?;
        Ok(())
    }

    /// Emits one blob per collapse path present at HEAD, before the first
    /// commit, each under a fresh synthetic mark.
    fn emit_synthetic_blobs<W: Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
    ) -> Result<(), FilterError> {
        for path in self.rules.collapse_paths().to_vec() {
            let Some(content) = self.rules.collapse_content(&path).map(<[u8]>::to_vec) else {
                continue;
            };
            let mark = format!(":{}", self.next_synthetic_mark);
            self.next_synthetic_mark += 1;
            let blob = Blob {
                mark: Some(mark.clone()),
                data: content,
                ..Blob::default()
            };
            writer.write_blob(&blob)?;
            self.collapse_marks.insert(path, mark);
        }
        Ok(())
    }

    fn emit_commit<W: Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
        commit: Commit,
    ) -> Result<(), FilterError> {
        let new_ref = self.rules.rewrite_str(&commit.ref_name);
        self.check_ref_collision(&commit.ref_name, &new_ref)?;

        if let Some(mark) = &commit.mark {
            // Default unless remapped by elision below.
            self.mark_map.insert(mark.clone(), mark.clone());
        }

        let parent = match commit.from.as_deref() {
            Some(from) => self.resolve_ref(from),
            None => String::new(),
        };

        let (ops, kept) = self.filter_ops(commit.ops)?;

        // A commit stripped of every operation and carrying no merge
        // parents is elided; the branch tip must not advance onto it.
        if kept == 0 && commit.merges.is_empty() {
            if let Some(mark) = &commit.mark {
                self.mark_map.insert(mark.clone(), parent.clone());
            }
            let reset = Reset {
                ref_name: new_ref,
                from: (!parent.is_empty()).then_some(parent),
                trailing_blank: true,
            };
            writer.write_reset(&reset)?;
            return Ok(());
        }

        let merges: Vec<String> = commit
            .merges
            .iter()
            .map(|m| self.resolve_ref(m))
            .filter(|m| !m.is_empty())
            .collect();

        let out = Commit {
            ref_name: new_ref,
            mark: commit.mark,
            original_oid: commit.original_oid,
            author: commit.author.map(|a| self.rewrite_identity(&a)),
            committer: commit.committer.map(|c| self.rewrite_identity(&c)),
            encoding: commit.encoding,
            extra_headers: commit.extra_headers,
            message: self.rules.rewrite_bytes(&commit.message),
            from: (!parent.is_empty()).then_some(parent),
            merges,
            ops,
        };
        writer.write_commit(&out)?;
        Ok(())
    }

    fn emit_tag<W: Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
        tag: Tag,
    ) -> Result<(), FilterError> {
        let new_ref = self.rules.rewrite_str(&tag.ref_name);
        self.check_ref_collision(&tag.ref_name, &new_ref)?;

        let from = tag.from.as_deref().map(|f| self.resolve_ref(f));
        let out = Tag {
            ref_name: new_ref,
            mark: tag.mark,
            original_oid: tag.original_oid,
            from: from.filter(|f| !f.is_empty()),
            tagger: tag.tagger.map(|t| self.rewrite_identity(&t)),
            extra_headers: tag.extra_headers,
            message: tag.message.map(|m| self.rules.rewrite_bytes(&m)),
        };
        writer.write_tag(&out)?;
        Ok(())
    }

    fn emit_reset<W: Write>(
        &mut self,
        writer: &mut RecordWriter<W>,
        reset: Reset,
    ) -> Result<(), FilterError> {
        let new_ref = self.rules.rewrite_str(&reset.ref_name);
        self.check_ref_collision(&reset.ref_name, &new_ref)?;

        let from = reset.from.map(|f| {
            let resolved = self.resolve_ref(&f);
            // An unborn resolution keeps the original target.
            if resolved.is_empty() {
                f
            } else {
                resolved
            }
        });
        writer.write_reset(&Reset {
            ref_name: new_ref,
            from,
            trailing_blank: reset.trailing_blank,
        })?;
        Ok(())
    }

    /// Filters and rewrites file operations, returning the surviving ops
    /// and how many were kept.
    fn filter_ops(&mut self, ops: Vec<FileOp>) -> Result<(Vec<FileOp>, usize), FilterError> {
        let mut out = Vec::with_capacity(ops.len());
        let mut kept = 0;

        for op in ops {
            match op {
                FileOp::Modify {
                    mode,
                    dataref,
                    path,
                } => {
                    if self.rules.should_exclude(&path) {
                        continue;
                    }
                    let new_path = self.rules.rewrite_str(&path);
                    let new_path = new_path.strip_prefix("./").unwrap_or(&new_path).to_string();
                    if self.rules.should_exclude(&new_path) {
                        continue;
                    }

                    let normalized = pattern::normalize(&new_path);
                    if self.rules.is_collapse_path(&normalized) {
                        let Some(mark) = self.collapse_marks.get(&normalized) else {
                            // Absent at HEAD: the file never appears.
                            continue;
                        };
                        if self.collapse_seen.contains(&normalized) {
                            // Only the first introduction survives.
                            continue;
                        }
                        self.collapse_seen.insert(normalized);
                        out.push(FileOp::Modify {
                            mode,
                            dataref: mark.clone(),
                            path: new_path,
                        });
                        kept += 1;
                        continue;
                    }

                    out.push(FileOp::Modify {
                        mode,
                        dataref,
                        path: new_path,
                    });
                    kept += 1;
                }
                FileOp::Delete { path } => {
                    if self.rules.should_exclude(&path) {
                        continue;
                    }
                    let new_path = self.rules.rewrite_str(&path);
                    if self.rules.should_exclude(&new_path) {
                        continue;
                    }
                    // Collapse paths must appear unchanged across history.
                    if self.rules.is_collapse_path(&pattern::normalize(&new_path)) {
                        continue;
                    }
                    out.push(FileOp::Delete { path: new_path });
                    kept += 1;
                }
                FileOp::Rename { from, to } => {
                    if let Some(op) = self.filter_two_path_op(&from, &to)? {
                        let (from, to) = op;
                        out.push(FileOp::Rename { from, to });
                        kept += 1;
                    }
                }
                FileOp::Copy { from, to } => {
                    if let Some(op) = self.filter_two_path_op(&from, &to)? {
                        let (from, to) = op;
                        out.push(FileOp::Copy { from, to });
                        kept += 1;
                    }
                }
                FileOp::DeleteAll => {
                    out.push(FileOp::DeleteAll);
                    kept += 1;
                }
                FileOp::Other(line) => {
                    out.push(FileOp::Other(self.rules.rewrite_str(&line)));
                    kept += 1;
                }
            }
        }
        Ok((out, kept))
    }

    /// Shared rename/copy handling. A source that is excluded while the
    /// destination is not cannot be represented: fast-import would need
    /// the absent source blob.
    fn filter_two_path_op(
        &self,
        from: &str,
        to: &str,
    ) -> Result<Option<(String, String)>, FilterError> {
        if self.rules.should_exclude(from) && !self.rules.should_exclude(to) {
            return Err(FilterError::UnsafeRename {
                from: from.to_string(),
                to: to.to_string(),
            });
        }
        if self.rules.should_exclude(to) {
            return Ok(None);
        }
        Ok(Some((
            self.rules.rewrite_str(from),
            self.rules.rewrite_str(to),
        )))
    }

    fn resolve_ref(&self, reference: &str) -> String {
        let reference = reference.trim();
        if reference.starts_with(':') {
            if let Some(mapped) = self.mark_map.get(reference) {
                return mapped.clone();
            }
        }
        reference.to_string()
    }

    /// Replaces name and email with the public identity, preserving the
    /// trailing timestamp and timezone bit-exact.
    fn rewrite_identity(&self, value: &str) -> String {
        match value.rfind('>') {
            Some(end) => {
                let suffix = value[end + 1..].trim();
                format!(
                    "{} <{}> {}",
                    self.rules.public_author_name(),
                    self.rules.public_author_email(),
                    suffix
                )
            }
            None => self.rules.rewrite_str(value),
        }
    }

    fn check_ref_collision(&mut self, orig: &str, rewritten: &str) -> Result<(), FilterError> {
        if let Some(prev) = self.ref_forward.get(orig) {
            if prev != rewritten {
                return Err(FilterError::RefRewriteMismatch(orig.to_string()));
            }
            return Ok(());
        }
        self.ref_forward
            .insert(orig.to_string(), rewritten.to_string());
        if let Some(back) = self.ref_reverse.get(rewritten) {
            if back != orig {
                return Err(FilterError::RefCollision {
                    first: back.clone(),
                    second: orig.to_string(),
                    rewritten: rewritten.to_string(),
                });
            }
        }
        self.ref_reverse
            .insert(rewritten.to_string(), orig.to_string());
        Ok(())
    }
}
