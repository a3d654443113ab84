use std::io::Write;

use anyhow::Result;

use super::record::{Blob, Command, Commit, DataRef, FileOp, RawCommand};

/// Serialize commands back into a stream `git fast-import` accepts.
///
/// Every counted data block is followed by one LF, and every commit by a
/// blank separator line, which is the shape fast-export itself produces.
pub fn write<W: Write>(out: &mut W, commands: &[Command]) -> Result<()> {
    for command in commands {
        match command {
            Command::Blob(blob) => write_blob(out, blob)?,
            Command::Commit(commit) => write_commit(out, commit)?,
            Command::Raw(raw) => write_raw(out, raw)?,
        }
    }
    Ok(())
}

fn write_blob<W: Write>(out: &mut W, blob: &Blob) -> Result<()> {
    out.write_all(b"blob\n")?;
    if let Some(mark) = blob.mark {
        writeln!(out, "mark :{}", mark)?;
    }
    for line in &blob.extra {
        write_line(out, line)?;
    }
    write_data(out, &blob.data)
}

fn write_commit<W: Write>(out: &mut W, commit: &Commit) -> Result<()> {
    write_line(out, &commit.header)?;
    if let Some(mark) = commit.mark {
        writeln!(out, "mark :{}", mark)?;
    }
    for line in &commit.meta {
        write_line(out, line)?;
    }
    write_data(out, &commit.message)?;
    for line in &commit.parents {
        write_line(out, line)?;
    }
    for op in &commit.ops {
        match op {
            FileOp::Modify {
                mode,
                dataref,
                path,
            } => {
                out.write_all(b"M ")?;
                out.write_all(mode)?;
                out.write_all(b" ")?;
                match dataref {
                    DataRef::Mark(mark) => write!(out, ":{}", mark)?,
                    DataRef::Oid(oid) => out.write_all(oid)?,
                    DataRef::Inline(_) => out.write_all(b"inline")?,
                }
                out.write_all(b" ")?;
                write_line(out, &path.raw)?;
                if let DataRef::Inline(data) = dataref {
                    write_data(out, data)?;
                }
            }
            FileOp::Raw { line, data } => {
                write_line(out, line)?;
                if let Some(data) = data {
                    write_data(out, data)?;
                }
            }
        }
    }
    out.write_all(b"\n")?;
    Ok(())
}

fn write_raw<W: Write>(out: &mut W, raw: &RawCommand) -> Result<()> {
    for line in &raw.lines {
        write_line(out, line)?;
    }
    match &raw.data {
        Some(data) => write_data(out, data)?,
        None => out.write_all(b"\n")?,
    }
    Ok(())
}

fn write_line<W: Write>(out: &mut W, line: &[u8]) -> Result<()> {
    out.write_all(line)?;
    out.write_all(b"\n")?;
    Ok(())
}

fn write_data<W: Write>(out: &mut W, data: &[u8]) -> Result<()> {
    writeln!(out, "data {}", data.len())?;
    out.write_all(data)?;
    out.write_all(b"\n")?;
    Ok(())
}
