//! Record model and framing-exact parsing for the fast-export stream.
//!
//! Payloads (`data <N>`) are opaque bytes and are framed by length alone.
//! A blob payload is followed by one `\n`; a commit message payload is not
//! followed by any delimiter byte; a tag message payload is followed by one
//! `\n`. The reader and writer preserve this framing bit-exact.

use std::io::{self, BufRead, Write};

use super::filter::FilterError;

/// A `blob` record. Header lines other than `mark`/`original-oid` are kept
/// verbatim and re-emitted in place.
#[derive(Debug, Clone, Default)]
pub struct Blob {
    pub mark: Option<String>,
    pub original_oid: Option<String>,
    pub extra_headers: Vec<String>,
    pub data: Vec<u8>,
}

/// A `commit` record.
#[derive(Debug, Clone, Default)]
pub struct Commit {
    pub ref_name: String,
    pub mark: Option<String>,
    pub original_oid: Option<String>,
    /// Identity value without the `author ` keyword.
    pub author: Option<String>,
    pub committer: Option<String>,
    pub encoding: Option<String>,
    pub extra_headers: Vec<String>,
    pub message: Vec<u8>,
    pub from: Option<String>,
    pub merges: Vec<String>,
    pub ops: Vec<FileOp>,
}

/// One file operation inside a commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    Modify {
        mode: String,
        dataref: String,
        path: String,
    },
    Delete {
        path: String,
    },
    Rename {
        from: String,
        to: String,
    },
    Copy {
        from: String,
        to: String,
    },
    DeleteAll,
    /// Any line we do not model; kept verbatim (without the newline).
    Other(String),
}

/// A `tag` record. Terminated by its data payload, not by a blank line.
#[derive(Debug, Clone, Default)]
pub struct Tag {
    pub ref_name: String,
    pub mark: Option<String>,
    pub original_oid: Option<String>,
    pub from: Option<String>,
    pub tagger: Option<String>,
    pub extra_headers: Vec<String>,
    pub message: Option<Vec<u8>>,
}

/// A `reset` record. `trailing_blank` records whether the source stream
/// terminated it with an optional blank line.
#[derive(Debug, Clone, Default)]
pub struct Reset {
    pub ref_name: String,
    pub from: Option<String>,
    pub trailing_blank: bool,
}

#[derive(Debug, Clone)]
pub enum Record {
    Blob(Blob),
    Commit(Commit),
    Tag(Tag),
    Reset(Reset),
    /// progress/checkpoint/unknown lines, passed through verbatim.
    Passthrough(String),
}

/// Parses `data <N>` headers.
fn parse_data_len(line: &str) -> Result<usize, FilterError> {
    let value = line.trim_start_matches("data ").trim();
    value
        .parse::<usize>()
        .map_err(|_| FilterError::MalformedDataHeader(line.trim_end().to_string()))
}

fn trim_line(line: &str) -> &str {
    line.trim_end_matches('\n')
}

/// Reads fast-export records from a buffered stream.
pub struct RecordReader<R: BufRead> {
    inner: R,
    peeked: Option<String>,
}

impl<R: BufRead> RecordReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            peeked: None,
        }
    }

    /// Next line including its trailing `\n` (absent only at EOF).
    fn next_line(&mut self) -> io::Result<Option<String>> {
        if let Some(line) = self.peeked.take() {
            return Ok(Some(line));
        }
        let mut buf = Vec::new();
        let n = self.inner.read_until(b'\n', &mut buf)?;
        if n == 0 {
            return Ok(None);
        }
        Ok(Some(String::from_utf8_lossy(&buf).into_owned()))
    }

    fn peek_line(&mut self) -> io::Result<Option<&str>> {
        if self.peeked.is_none() {
            self.peeked = self.next_line()?;
        }
        Ok(self.peeked.as_deref())
    }

    fn read_payload(&mut self, len: usize) -> Result<Vec<u8>, FilterError> {
        debug_assert!(self.peeked.is_none(), "payload read after peek");
        let mut buf = vec![0u8; len];
        self.inner
            .read_exact(&mut buf)
            .map_err(|e| match e.kind() {
                io::ErrorKind::UnexpectedEof => FilterError::TruncatedPayload { expected: len },
                _ => FilterError::Io(e),
            })?;
        Ok(buf)
    }

    /// Consumes the single newline that follows blob and tag payloads.
    /// Returns false at EOF.
    fn consume_payload_newline(&mut self) -> Result<bool, FilterError> {
        let mut byte = [0u8; 1];
        match self.inner.read(&mut byte)? {
            0 => Ok(false),
            _ => Ok(true),
        }
    }

    /// Reads the next record, or `None` at end of stream.
    pub fn next_record(&mut self) -> Result<Option<Record>, FilterError> {
        let Some(line) = self.next_line()? else {
            return Ok(None);
        };
        let trimmed = trim_line(&line);
        if trimmed == "blob" {
            return Ok(Some(Record::Blob(self.read_blob()?)));
        }
        if let Some(rest) = trimmed.strip_prefix("commit ") {
            return Ok(Some(Record::Commit(self.read_commit(rest.trim())?)));
        }
        if let Some(rest) = trimmed.strip_prefix("tag ") {
            return Ok(Some(Record::Tag(self.read_tag(rest.trim())?)));
        }
        if let Some(rest) = trimmed.strip_prefix("reset ") {
            return Ok(Some(Record::Reset(self.read_reset(rest.trim())?)));
        }
        Ok(Some(Record::Passthrough(line)))
    }

    fn read_blob(&mut self) -> Result<Blob, FilterError> {
        let mut blob = Blob::default();
        loop {
            let Some(line) = self.next_line()? else {
                return Err(FilterError::UnexpectedStreamEnd);
            };
            let trimmed = trim_line(&line);
            if let Some(rest) = trimmed.strip_prefix("mark ") {
                blob.mark = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("original-oid ") {
                blob.original_oid = Some(rest.trim().to_string());
            } else if trimmed.starts_with("data ") {
                let len = parse_data_len(trimmed)?;
                blob.data = self.read_payload(len)?;
                if !self.consume_payload_newline()? {
                    return Err(FilterError::UnexpectedStreamEnd);
                }
                return Ok(blob);
            } else {
                blob.extra_headers.push(trimmed.to_string());
            }
        }
    }

    fn read_commit(&mut self, ref_name: &str) -> Result<Commit, FilterError> {
        let mut commit = Commit {
            ref_name: ref_name.to_string(),
            ..Commit::default()
        };
        loop {
            let Some(line) = self.next_line()? else {
                return Err(FilterError::UnexpectedStreamEnd);
            };
            let trimmed = trim_line(&line);
            if let Some(rest) = trimmed.strip_prefix("mark ") {
                commit.mark = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("original-oid ") {
                commit.original_oid = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("author ") {
                commit.author = Some(rest.to_string());
            } else if let Some(rest) = trimmed.strip_prefix("committer ") {
                commit.committer = Some(rest.to_string());
            } else if let Some(rest) = trimmed.strip_prefix("encoding ") {
                commit.encoding = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("from ") {
                // Some exporters place from before data; accept either way.
                commit.from = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("merge ") {
                commit.merges.push(rest.trim().to_string());
            } else if trimmed.starts_with("data ") {
                let len = parse_data_len(trimmed)?;
                commit.message = self.read_payload(len)?;
                // The message payload has no delimiter; trailing lines run
                // until the blank line that ends the record.
                loop {
                    let Some(line) = self.next_line()? else {
                        return Err(FilterError::UnexpectedStreamEnd);
                    };
                    if line == "\n" {
                        return Ok(commit);
                    }
                    let trimmed = trim_line(&line);
                    if let Some(rest) = trimmed.strip_prefix("from ") {
                        commit.from = Some(rest.trim().to_string());
                    } else if let Some(rest) = trimmed.strip_prefix("merge ") {
                        commit.merges.push(rest.trim().to_string());
                    } else if !trimmed.is_empty() {
                        commit.ops.push(parse_file_op(trimmed));
                    }
                }
            } else {
                commit.extra_headers.push(trimmed.to_string());
            }
        }
    }

    fn read_tag(&mut self, ref_name: &str) -> Result<Tag, FilterError> {
        let mut tag = Tag {
            ref_name: ref_name.to_string(),
            ..Tag::default()
        };
        loop {
            let Some(line) = self.next_line()? else {
                // Tag may be the last record in the stream.
                return Ok(tag);
            };
            if line == "\n" {
                return Ok(tag);
            }
            let trimmed = trim_line(&line);
            if let Some(rest) = trimmed.strip_prefix("from ") {
                tag.from = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("mark ") {
                tag.mark = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("original-oid ") {
                tag.original_oid = Some(rest.trim().to_string());
            } else if let Some(rest) = trimmed.strip_prefix("tagger ") {
                tag.tagger = Some(rest.to_string());
            } else if trimmed.starts_with("data ") {
                // The data payload terminates the tag record; there is no
                // blank sub-command terminator line.
                let len = parse_data_len(trimmed)?;
                tag.message = Some(self.read_payload(len)?);
                self.consume_payload_newline()?;
                return Ok(tag);
            } else {
                tag.extra_headers.push(trimmed.to_string());
            }
        }
    }

    fn read_reset(&mut self, ref_name: &str) -> Result<Reset, FilterError> {
        let mut reset = Reset {
            ref_name: ref_name.to_string(),
            ..Reset::default()
        };
        // A reset may be followed by `from <ref>`, a rare blank line, or the
        // next record immediately; only consume what belongs to the reset.
        let (is_blank, is_from) = match self.peek_line()? {
            None => return Ok(reset),
            Some(line) => (line == "\n", line.starts_with("from ")),
        };
        if is_blank {
            self.next_line()?;
            reset.trailing_blank = true;
        } else if is_from {
            let line = self.next_line()?.expect("peeked line");
            reset.from = Some(trim_line(&line)["from ".len()..].trim().to_string());
        }
        Ok(reset)
    }
}

fn parse_file_op(line: &str) -> FileOp {
    if line == "deleteall" {
        return FileOp::DeleteAll;
    }
    if let Some(rest) = line.strip_prefix("M ") {
        if let Some((mode, rest)) = rest.split_once(' ') {
            if let Some((dataref, path)) = rest.split_once(' ') {
                return FileOp::Modify {
                    mode: mode.to_string(),
                    dataref: dataref.to_string(),
                    path: path.trim().to_string(),
                };
            }
        }
        return FileOp::Other(line.to_string());
    }
    if let Some(rest) = line.strip_prefix("D ") {
        return FileOp::Delete {
            path: rest.trim().to_string(),
        };
    }
    if line.starts_with("R ") || line.starts_with("C ") {
        // Paths containing spaces make this form ambiguous; pass through.
        let parts: Vec<&str> = line.split_whitespace().collect();
        if parts.len() == 3 {
            return match parts[0] {
                "R" => FileOp::Rename {
                    from: parts[1].to_string(),
                    to: parts[2].to_string(),
                },
                _ => FileOp::Copy {
                    from: parts[1].to_string(),
                    to: parts[2].to_string(),
                },
            };
        }
    }
    FileOp::Other(line.to_string())
}

/// Writes fast-import records with the same framing the exporter uses.
pub struct RecordWriter<W: Write> {
    inner: W,
}

impl<W: Write> RecordWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub fn write_raw(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.inner.write_all(bytes)
    }

    pub fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }

    pub fn write_blob(&mut self, blob: &Blob) -> io::Result<()> {
        self.inner.write_all(b"blob\n")?;
        if let Some(mark) = &blob.mark {
            writeln!(self.inner, "mark {mark}")?;
        }
        if let Some(oid) = &blob.original_oid {
            writeln!(self.inner, "original-oid {oid}")?;
        }
        for header in &blob.extra_headers {
            writeln!(self.inner, "{header}")?;
        }
        writeln!(self.inner, "data {}", blob.data.len())?;
        self.inner.write_all(&blob.data)?;
        self.inner.write_all(b"\n")
    }

    pub fn write_commit(&mut self, commit: &Commit) -> io::Result<()> {
        writeln!(self.inner, "commit {}", commit.ref_name)?;
        if let Some(mark) = &commit.mark {
            writeln!(self.inner, "mark {mark}")?;
        }
        if let Some(oid) = &commit.original_oid {
            writeln!(self.inner, "original-oid {oid}")?;
        }
        if let Some(author) = &commit.author {
            writeln!(self.inner, "author {author}")?;
        }
        if let Some(committer) = &commit.committer {
            writeln!(self.inner, "committer {committer}")?;
        }
        if let Some(encoding) = &commit.encoding {
            writeln!(self.inner, "encoding {encoding}")?;
        }
        for header in &commit.extra_headers {
            writeln!(self.inner, "{header}")?;
        }
        // No delimiter after the message payload: from/merge/ops follow
        // the final payload byte immediately.
        writeln!(self.inner, "data {}", commit.message.len())?;
        self.inner.write_all(&commit.message)?;
        if let Some(from) = &commit.from {
            writeln!(self.inner, "from {from}")?;
        }
        for merge in &commit.merges {
            writeln!(self.inner, "merge {merge}")?;
        }
        for op in &commit.ops {
            self.write_file_op(op)?;
        }
        self.inner.write_all(b"\n")
    }

    fn write_file_op(&mut self, op: &FileOp) -> io::Result<()> {
        match op {
            FileOp::Modify {
                mode,
                dataref,
                path,
            } => writeln!(self.inner, "M {mode} {dataref} {path}"),
            FileOp::Delete { path } => writeln!(self.inner, "D {path}"),
            FileOp::Rename { from, to } => writeln!(self.inner, "R {from} {to}"),
            FileOp::Copy { from, to } => writeln!(self.inner, "C {from} {to}"),
            FileOp::DeleteAll => self.inner.write_all(b"deleteall\n"),
            FileOp::Other(line) => writeln!(self.inner, "{line}"),
        }
    }

    pub fn write_tag(&mut self, tag: &Tag) -> io::Result<()> {
        writeln!(self.inner, "tag {}", tag.ref_name)?;
        if let Some(oid) = &tag.original_oid {
            writeln!(self.inner, "original-oid {oid}")?;
        }
        if let Some(from) = &tag.from {
            writeln!(self.inner, "from {from}")?;
        }
        if let Some(tagger) = &tag.tagger {
            writeln!(self.inner, "tagger {tagger}")?;
        }
        if let Some(mark) = &tag.mark {
            writeln!(self.inner, "mark {mark}")?;
        }
        for header in &tag.extra_headers {
            writeln!(self.inner, "{header}")?;
        }
        // Tags carry no sub-commands after the data section, so no blank
        // terminator line is written; an extra one makes fast-import fail
        // with "Unsupported command".
        if let Some(message) = &tag.message {
            writeln!(self.inner, "data {}", message.len())?;
            self.inner.write_all(message)?;
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }

    pub fn write_reset(&mut self, reset: &Reset) -> io::Result<()> {
        writeln!(self.inner, "reset {}", reset.ref_name)?;
        if let Some(from) = &reset.from {
            writeln!(self.inner, "from {from}")?;
        }
        if reset.trailing_blank {
            self.inner.write_all(b"\n")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn read_all(input: &[u8]) -> Vec<Record> {
        let mut reader = RecordReader::new(Cursor::new(input.to_vec()));
        let mut records = Vec::new();
        while let Some(r) = reader.next_record().expect("parse") {
            records.push(r);
        }
        records
    }

    #[test]
    fn test_blob_roundtrip_framing() {
        let input = b"blob\nmark :1\ndata 6\nhello\n\n";
        let records = read_all(input);
        assert_eq!(records.len(), 1);
        let Record::Blob(blob) = &records[0] else {
            panic!("expected blob");
        };
        assert_eq!(blob.mark.as_deref(), Some(":1"));
        assert_eq!(blob.data, b"hello\n");

        let mut out = Vec::new();
        RecordWriter::new(&mut out).write_blob(blob).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_commit_message_has_no_delimiter() {
        let input = b"commit refs/heads/main\nmark :2\nauthor A <a@x> 100 +0000\ncommitter A <a@x> 100 +0000\ndata 4\nmsg\nM 100644 :1 a.txt\n\n";
        let records = read_all(input.as_slice());
        let Record::Commit(commit) = &records[0] else {
            panic!("expected commit");
        };
        assert_eq!(commit.ref_name, "refs/heads/main");
        assert_eq!(commit.message, b"msg\n");
        assert_eq!(commit.ops.len(), 1);

        let mut out = Vec::new();
        RecordWriter::new(&mut out).write_commit(commit).unwrap();
        assert_eq!(out, input);
    }

    #[test]
    fn test_commit_parses_parents_and_merges() {
        let input = b"commit refs/heads/main\ndata 2\nm\nfrom :1\nmerge :2\nmerge :3\nD old.txt\n\n";
        let records = read_all(input.as_slice());
        let Record::Commit(commit) = &records[0] else {
            panic!("expected commit");
        };
        assert_eq!(commit.from.as_deref(), Some(":1"));
        assert_eq!(commit.merges, vec![":2", ":3"]);
        assert_eq!(
            commit.ops,
            vec![FileOp::Delete {
                path: "old.txt".into()
            }]
        );
    }

    #[test]
    fn test_reset_does_not_consume_following_record() {
        let input = b"reset refs/heads/main\nblob\ndata 2\nhi\n";
        let records = read_all(input.as_slice());
        assert_eq!(records.len(), 2);
        let Record::Reset(reset) = &records[0] else {
            panic!("expected reset");
        };
        assert!(reset.from.is_none());
        assert!(matches!(&records[1], Record::Blob(b) if b.data == b"hi"));
    }

    #[test]
    fn test_reset_with_from() {
        let input = b"reset refs/heads/dev\nfrom :7\n";
        let records = read_all(input.as_slice());
        let Record::Reset(reset) = &records[0] else {
            panic!("expected reset");
        };
        assert_eq!(reset.from.as_deref(), Some(":7"));
    }

    #[test]
    fn test_tag_terminates_at_payload() {
        let input = b"tag v1.0\nfrom :2\ntagger T <t@x> 100 +0000\ndata 8\nrelease\n";
        let records = read_all(input.as_slice());
        assert_eq!(records.len(), 1);
        let Record::Tag(tag) = &records[0] else {
            panic!("expected tag");
        };
        assert_eq!(tag.ref_name, "v1.0");
        assert_eq!(tag.message.as_deref(), Some(b"release\n".as_slice()));
    }

    #[test]
    fn test_passthrough_lines_kept_verbatim() {
        let input = b"progress 50%\ncheckpoint\n";
        let records = read_all(input.as_slice());
        assert_eq!(records.len(), 2);
        assert!(matches!(&records[0], Record::Passthrough(l) if l == "progress 50%\n"));
    }

    #[test]
    fn test_malformed_data_header() {
        let mut reader = RecordReader::new(Cursor::new(b"blob\ndata abc\n".to_vec()));
        let err = reader.next_record().unwrap_err();
        assert!(matches!(err, FilterError::MalformedDataHeader(_)));
    }

    #[test]
    fn test_truncated_payload() {
        let mut reader = RecordReader::new(Cursor::new(b"blob\ndata 100\nshort".to_vec()));
        let err = reader.next_record().unwrap_err();
        assert!(matches!(
            err,
            FilterError::TruncatedPayload { expected: 100 }
        ));
    }

    #[test]
    fn test_binary_payload_preserved() {
        let mut input = b"blob\ndata 4\n".to_vec();
        input.extend_from_slice(&[0x00, 0xff, 0x0a, 0x80]);
        input.push(b'\n');
        let records = read_all(&input);
        let Record::Blob(blob) = &records[0] else {
            panic!("expected blob");
        };
        assert_eq!(blob.data, vec![0x00, 0xff, 0x0a, 0x80]);
    }
}
