//! Drive the history rewrite: fast-export | filter | fast-import

use std::{
    collections::{HashMap, HashSet},
    io::BufReader,
    path::Path,
    process::{Command as Process, Stdio},
};

use anyhow::{bail, Context, Result};
use sha1::{Digest, Sha1};
use tracing::{debug, info};

use crate::filter;
use crate::stream::{self, Blob, Command, DataRef, FileOp};

/// Counts reported after a rewrite
#[derive(Debug, Default)]
pub struct ScrubStats {
    pub commits: usize,
    /// Blobs whose filtered content replaced the original
    pub blobs_rewritten: usize,
    /// Blobs shared with another path, filtered into a fresh mark
    pub blobs_cloned: usize,
}

/// Rewrite the repository at `repo` in place
pub fn run(repo: &Path) -> Result<ScrubStats> {
    ensure_repository(repo)?;

    let commands = export_history(repo)?;
    if commands.is_empty() {
        info!("repository has no history to rewrite");
        return Ok(ScrubStats::default());
    }

    let (commands, stats) = scrub_commands(repo, commands)?;
    import_history(repo, &commands)?;
    Ok(stats)
}

fn ensure_repository(repo: &Path) -> Result<()> {
    let output = Process::new("git")
        .arg("-C")
        .arg(repo)
        .args(["rev-parse", "--git-dir"])
        .output()
        .context("failed to run git rev-parse")?;
    if !output.status.success() {
        bail!(
            "{} is not a git repository: {}",
            repo.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
    }
    Ok(())
}

/// Export the full history of every ref as a parsed command list
fn export_history(repo: &Path) -> Result<Vec<Command>> {
    let mut child = Process::new("git")
        .arg("-C")
        .arg(repo)
        .args([
            "fast-export",
            "--all",
            "--reencode=no",
            "--signed-tags=strip",
        ])
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn git fast-export")?;

    let stdout = child.stdout.take().context("git fast-export had no stdout")?;
    let mut reader = BufReader::new(stdout);
    let commands = stream::parse(&mut reader)?;

    let output = child
        .wait_with_output()
        .context("failed to wait for git fast-export")?;
    if !output.status.success() {
        bail!(
            "git fast-export failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }

    debug!("exported {} stream command(s)", commands.len());
    Ok(commands)
}

/// Apply the blob filter to every reference the target path makes.
///
/// A blob referenced only by the target path is filtered in place. A blob
/// the target path shares with another path is left alone and the target
/// filemodifies are repointed at a filtered copy under a fresh mark, so
/// the other path keeps its exact bytes.
fn scrub_commands(repo: &Path, commands: Vec<Command>) -> Result<(Vec<Command>, ScrubStats)> {
    let mut stats = ScrubStats::default();

    let mut target_marks = HashSet::new();
    let mut other_marks = HashSet::new();
    for command in &commands {
        let Command::Commit(commit) = command else {
            continue;
        };
        for op in &commit.ops {
            if let FileOp::Modify {
                dataref: DataRef::Mark(mark),
                path,
                ..
            } = op
            {
                if path.name == filter::TARGET_PATH {
                    target_marks.insert(*mark);
                } else {
                    other_marks.insert(*mark);
                }
            }
        }
    }

    let mut next_mark = max_mark(&commands);
    let mut clones: HashMap<u64, u64> = HashMap::new();
    let mut out = Vec::with_capacity(commands.len());

    for command in commands {
        match command {
            Command::Blob(blob) => {
                let Some(mark) = blob.mark else {
                    out.push(Command::Blob(blob));
                    continue;
                };
                if !target_marks.contains(&mark) {
                    out.push(Command::Blob(blob));
                    continue;
                }

                let filtered = scrub_target_blob(&blob.data)?;
                if filtered == blob.data {
                    debug!("blob {} already clean", blob_id(&blob.data));
                    out.push(Command::Blob(blob));
                } else if other_marks.contains(&mark) {
                    next_mark += 1;
                    info!(
                        "cloning shared blob {} -> {} for {}",
                        blob_id(&blob.data),
                        blob_id(&filtered),
                        filter::TARGET_PATH
                    );
                    clones.insert(mark, next_mark);
                    out.push(Command::Blob(blob));
                    out.push(Command::Blob(Blob {
                        mark: Some(next_mark),
                        extra: Vec::new(),
                        data: filtered,
                    }));
                    stats.blobs_cloned += 1;
                } else {
                    info!(
                        "rewriting blob {} -> {} at {}",
                        blob_id(&blob.data),
                        blob_id(&filtered),
                        filter::TARGET_PATH
                    );
                    out.push(Command::Blob(Blob {
                        data: filtered,
                        ..blob
                    }));
                    stats.blobs_rewritten += 1;
                }
            }
            Command::Commit(mut commit) => {
                stats.commits += 1;
                for op in &mut commit.ops {
                    let FileOp::Modify { dataref, path, .. } = op else {
                        continue;
                    };
                    if path.name != filter::TARGET_PATH {
                        continue;
                    }
                    match dataref {
                        DataRef::Mark(mark) => {
                            if let Some(clone) = clones.get(mark) {
                                *mark = *clone;
                            }
                        }
                        DataRef::Inline(data) => {
                            let filtered = scrub_target_blob(data)?;
                            if filtered != *data {
                                info!(
                                    "rewriting inline blob {} -> {} at {}",
                                    blob_id(data),
                                    blob_id(&filtered),
                                    filter::TARGET_PATH
                                );
                                *data = filtered;
                                stats.blobs_rewritten += 1;
                            }
                        }
                        DataRef::Oid(oid) => {
                            let oid = std::str::from_utf8(oid)
                                .context("non-UTF-8 object id in filemodify")?
                                .to_string();
                            let original = cat_blob(repo, &oid)?;
                            let filtered = scrub_target_blob(&original)?;
                            if filtered != original {
                                info!(
                                    "rewriting blob {} -> {} at {} (inlined)",
                                    oid,
                                    blob_id(&filtered),
                                    filter::TARGET_PATH
                                );
                                *dataref = DataRef::Inline(filtered);
                                stats.blobs_rewritten += 1;
                            }
                        }
                    }
                }
                out.push(Command::Commit(commit));
            }
            other => out.push(other),
        }
    }

    Ok((out, stats))
}

fn scrub_target_blob(data: &[u8]) -> Result<Vec<u8>> {
    filter::scrub_blob(filter::TARGET_PATH.as_bytes(), data)?
        .context("target path was not matched by the filter")
}

/// Highest mark in the stream, across blobs, commits, and raw commands
fn max_mark(commands: &[Command]) -> u64 {
    let mut max = 0;
    for command in commands {
        match command {
            Command::Blob(blob) => max = max.max(blob.mark.unwrap_or(0)),
            Command::Commit(commit) => max = max.max(commit.mark.unwrap_or(0)),
            Command::Raw(raw) => {
                for line in &raw.lines {
                    if let Some(rest) = line.strip_prefix(b"mark :") {
                        if let Some(mark) = std::str::from_utf8(rest)
                            .ok()
                            .and_then(|s| s.trim().parse().ok())
                        {
                            max = max.max(mark);
                        }
                    }
                }
            }
        }
    }
    max
}

fn cat_blob(repo: &Path, oid: &str) -> Result<Vec<u8>> {
    let output = Process::new("git")
        .arg("-C")
        .arg(repo)
        .args(["cat-file", "blob", oid])
        .output()
        .with_context(|| format!("failed to run git cat-file for {}", oid))?;
    if !output.status.success() {
        bail!(
            "git cat-file blob {} failed: {}",
            oid,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(output.stdout)
}

/// Feed the rewritten stream to fast-import, moving existing refs
fn import_history(repo: &Path, commands: &[Command]) -> Result<()> {
    let mut child = Process::new("git")
        .arg("-C")
        .arg(repo)
        .args(["fast-import", "--force", "--quiet"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .context("failed to spawn git fast-import")?;

    {
        let mut stdin = child.stdin.take().context("git fast-import had no stdin")?;
        stream::write(&mut stdin, commands)?;
    }

    let output = child
        .wait_with_output()
        .context("failed to wait for git fast-import")?;
    if !output.status.success() {
        bail!(
            "git fast-import failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr)
        );
    }
    Ok(())
}

/// Git blob object ID: SHA-1 over the `blob <len>\0` header plus content
fn blob_id(data: &[u8]) -> String {
    let mut hasher = Sha1::new();
    hasher.update(format!("blob {}\0", data.len()).as_bytes());
    hasher.update(data);
    hex::encode(hasher.finalize())
}
