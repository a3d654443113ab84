/// A single command in a fast-export stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Blob(Blob),
    Commit(Commit),
    /// Any other command (tag, reset, progress, ...) carried through verbatim
    Raw(RawCommand),
}

/// A `blob` command: content plus the mark later commands reference it by
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Blob {
    pub mark: Option<u64>,
    /// Uninterpreted lines between the mark and the data (original-oid)
    pub extra: Vec<Vec<u8>>,
    pub data: Vec<u8>,
}

/// A `commit` command, split into the pieces the rewrite needs to address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Commit {
    /// The full `commit refs/...` line
    pub header: Vec<u8>,
    pub mark: Option<u64>,
    /// original-oid / author / committer / encoding lines, in stream order
    pub meta: Vec<Vec<u8>>,
    pub message: Vec<u8>,
    /// `from` and `merge` lines, in stream order
    pub parents: Vec<Vec<u8>>,
    pub ops: Vec<FileOp>,
}

/// A file operation inside a commit
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOp {
    /// `M <mode> <dataref> <path>`
    Modify {
        mode: Vec<u8>,
        dataref: DataRef,
        path: PathField,
    },
    /// Any other op (`D`, `R`, `C`, `N`, `deleteall`), with the payload of
    /// an inline note when one follows the line
    Raw {
        line: Vec<u8>,
        data: Option<Vec<u8>>,
    },
}

/// What a filemodify points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DataRef {
    Mark(u64),
    Oid(Vec<u8>),
    Inline(Vec<u8>),
}

/// A filemodify path: raw bytes as they appeared (possibly C-quoted) plus
/// the decoded name used for comparisons. The raw form is what gets
/// re-emitted, so quoting survives the round trip untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathField {
    pub raw: Vec<u8>,
    pub name: String,
}

/// A command we pass through without interpretation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawCommand {
    pub lines: Vec<Vec<u8>>,
    /// Counted payload, when the command carries one (tag messages)
    pub data: Option<Vec<u8>>,
}
