use std::io::{BufRead, Read};

use anyhow::{bail, Context, Result};

use super::record::{Blob, Command, Commit, DataRef, FileOp, PathField, RawCommand};

/// Parse a complete fast-export stream into commands
pub fn parse<R: BufRead>(input: &mut R) -> Result<Vec<Command>> {
    let mut parser = Parser {
        input,
        pending: None,
    };
    let mut commands = Vec::new();
    while let Some(command) = parser.next_command()? {
        commands.push(command);
    }
    Ok(commands)
}

struct Parser<'a, R: BufRead> {
    input: &'a mut R,
    /// One line of lookahead, for commit bodies that end at the next command
    pending: Option<Vec<u8>>,
}

impl<R: BufRead> Parser<'_, R> {
    fn next_line(&mut self) -> Result<Option<Vec<u8>>> {
        if let Some(line) = self.pending.take() {
            return Ok(Some(line));
        }
        let mut line = Vec::new();
        let n = self
            .input
            .read_until(b'\n', &mut line)
            .context("failed to read from fast-export stream")?;
        if n == 0 {
            return Ok(None);
        }
        if line.last() == Some(&b'\n') {
            line.pop();
        }
        Ok(Some(line))
    }

    fn push_back(&mut self, line: Vec<u8>) {
        self.pending = Some(line);
    }

    /// Read the counted payload of a `data <n>` line, plus the optional LF
    /// that terminates the block.
    fn read_data(&mut self, data_line: &[u8]) -> Result<Vec<u8>> {
        let size_text = data_line
            .strip_prefix(b"data ")
            .context("expected a data line")?;
        if size_text.starts_with(b"<<") {
            bail!("delimited data blocks are not supported (fast-export emits counted blocks)");
        }
        let size: usize = std::str::from_utf8(size_text)
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .with_context(|| {
                format!(
                    "invalid data length in fast-export stream: {}",
                    String::from_utf8_lossy(size_text)
                )
            })?;

        let mut data = vec![0u8; size];
        self.input
            .read_exact(&mut data)
            .context("truncated data block in fast-export stream")?;

        let buffered = self.input.fill_buf()?;
        if buffered.first() == Some(&b'\n') {
            self.input.consume(1);
        }
        Ok(data)
    }

    fn next_command(&mut self) -> Result<Option<Command>> {
        loop {
            let Some(line) = self.next_line()? else {
                return Ok(None);
            };
            if line.is_empty() {
                continue;
            }
            if line == b"blob" {
                return Ok(Some(Command::Blob(self.parse_blob()?)));
            }
            if line.starts_with(b"commit ") {
                return Ok(Some(Command::Commit(self.parse_commit(line)?)));
            }
            if line.starts_with(b"tag ") {
                return Ok(Some(Command::Raw(self.parse_tag(line)?)));
            }
            if line.starts_with(b"reset ") {
                let mut lines = vec![line];
                if let Some(next) = self.next_line()? {
                    if next.starts_with(b"from ") {
                        lines.push(next);
                    } else {
                        self.push_back(next);
                    }
                }
                return Ok(Some(Command::Raw(RawCommand { lines, data: None })));
            }
            // progress, checkpoint, feature, option, done, alias, ...
            return Ok(Some(Command::Raw(RawCommand {
                lines: vec![line],
                data: None,
            })));
        }
    }

    fn parse_blob(&mut self) -> Result<Blob> {
        let mut mark = None;
        let mut extra = Vec::new();
        loop {
            let line = self
                .next_line()?
                .context("unexpected end of stream inside a blob command")?;
            if let Some(rest) = line.strip_prefix(b"mark :") {
                mark = Some(mark_number(rest)?);
            } else if line.starts_with(b"data ") {
                let data = self.read_data(&line)?;
                return Ok(Blob { mark, extra, data });
            } else {
                extra.push(line);
            }
        }
    }

    fn parse_commit(&mut self, header: Vec<u8>) -> Result<Commit> {
        let mut commit = Commit {
            header,
            mark: None,
            meta: Vec::new(),
            message: Vec::new(),
            parents: Vec::new(),
            ops: Vec::new(),
        };
        let mut have_message = false;

        loop {
            let Some(line) = self.next_line()? else {
                break;
            };
            if line.is_empty() {
                break;
            }
            if let Some(rest) = line.strip_prefix(b"mark :") {
                commit.mark = Some(mark_number(rest)?);
            } else if line.starts_with(b"original-oid ")
                || line.starts_with(b"author ")
                || line.starts_with(b"committer ")
                || line.starts_with(b"encoding ")
            {
                commit.meta.push(line);
            } else if line.starts_with(b"data ") {
                commit.message = self.read_data(&line)?;
                have_message = true;
            } else if line.starts_with(b"from ") || line.starts_with(b"merge ") {
                commit.parents.push(line);
            } else if line.starts_with(b"M ") {
                let op = self.parse_modify(&line)?;
                commit.ops.push(op);
            } else if line.starts_with(b"D ")
                || line.starts_with(b"R ")
                || line.starts_with(b"C ")
                || line == b"deleteall"
            {
                commit.ops.push(FileOp::Raw { line, data: None });
            } else if line.starts_with(b"N ") {
                let data = if line.starts_with(b"N inline") {
                    let data_line = self
                        .next_line()?
                        .context("unexpected end of stream after inline note")?;
                    if !data_line.starts_with(b"data ") {
                        bail!("inline note is not followed by a data block");
                    }
                    Some(self.read_data(&data_line)?)
                } else {
                    None
                };
                commit.ops.push(FileOp::Raw { line, data });
            } else {
                // the next top-level command ends this commit
                self.push_back(line);
                break;
            }
        }

        if !have_message {
            bail!(
                "commit without a message data block: {}",
                String::from_utf8_lossy(&commit.header)
            );
        }
        Ok(commit)
    }

    /// Parse `M <mode> <dataref> <path>`, reading the payload of an inline ref
    fn parse_modify(&mut self, line: &[u8]) -> Result<FileOp> {
        let malformed = || format!("malformed filemodify: {}", String::from_utf8_lossy(line));
        let rest = &line[2..];
        let sp1 = rest
            .iter()
            .position(|&b| b == b' ')
            .with_context(malformed)?;
        let mode = rest[..sp1].to_vec();
        let rest = &rest[sp1 + 1..];
        let sp2 = rest
            .iter()
            .position(|&b| b == b' ')
            .with_context(malformed)?;
        let ref_text = &rest[..sp2];
        let raw_path = rest[sp2 + 1..].to_vec();

        let dataref = if ref_text == b"inline" {
            let data_line = self
                .next_line()?
                .context("unexpected end of stream after inline filemodify")?;
            if !data_line.starts_with(b"data ") {
                bail!("inline filemodify is not followed by a data block");
            }
            DataRef::Inline(self.read_data(&data_line)?)
        } else if let Some(mark) = ref_text.strip_prefix(b":") {
            DataRef::Mark(mark_number(mark)?)
        } else {
            DataRef::Oid(ref_text.to_vec())
        };

        let name = unquote_path(&raw_path)?;
        Ok(FileOp::Modify {
            mode,
            dataref,
            path: PathField {
                raw: raw_path,
                name,
            },
        })
    }

    fn parse_tag(&mut self, header: Vec<u8>) -> Result<RawCommand> {
        let mut lines = vec![header];
        loop {
            let line = self
                .next_line()?
                .context("unexpected end of stream inside a tag command")?;
            if line.starts_with(b"data ") {
                let data = self.read_data(&line)?;
                return Ok(RawCommand {
                    lines,
                    data: Some(data),
                });
            }
            lines.push(line);
        }
    }
}

fn mark_number(text: &[u8]) -> Result<u64> {
    std::str::from_utf8(text)
        .ok()
        .and_then(|s| s.trim().parse().ok())
        .with_context(|| format!("invalid mark: {}", String::from_utf8_lossy(text)))
}

/// Decode a filemodify path, undoing C-style quoting when present.
///
/// Paths are compared as UTF-8 text; a path that does not decode is fatal.
fn unquote_path(raw: &[u8]) -> Result<String> {
    if raw.first() != Some(&b'"') {
        return Ok(std::str::from_utf8(raw)
            .context("filemodify path is not valid UTF-8")?
            .to_string());
    }

    let mut bytes = Vec::with_capacity(raw.len());
    let mut i = 1;
    loop {
        let b = *raw.get(i).context("unterminated quoted path")?;
        match b {
            b'"' => break,
            b'\\' => {
                i += 1;
                let escape = *raw.get(i).context("truncated escape in quoted path")?;
                match escape {
                    b'a' => bytes.push(0x07),
                    b'b' => bytes.push(0x08),
                    b'f' => bytes.push(0x0c),
                    b'n' => bytes.push(b'\n'),
                    b'r' => bytes.push(b'\r'),
                    b't' => bytes.push(b'\t'),
                    b'v' => bytes.push(0x0b),
                    b'"' => bytes.push(b'"'),
                    b'\\' => bytes.push(b'\\'),
                    b'0'..=b'7' => {
                        let mut value = (escape - b'0') as u32;
                        for _ in 0..2 {
                            match raw.get(i + 1) {
                                Some(&digit @ b'0'..=b'7') => {
                                    value = value * 8 + (digit - b'0') as u32;
                                    i += 1;
                                }
                                _ => break,
                            }
                        }
                        bytes.push(value as u8);
                    }
                    other => bail!("unsupported escape \\{} in quoted path", other as char),
                }
            }
            _ => bytes.push(b),
        }
        i += 1;
    }
    String::from_utf8(bytes).context("filemodify path is not valid UTF-8")
}
