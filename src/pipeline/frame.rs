//! Byte-stream to line decoding
//!
//! Serial reads arrive in arbitrary chunks. [`FrameDecoder`] stitches them
//! back into complete lines, carrying the unterminated tail of one chunk into
//! the next call. Both `\n` and `\r` terminate a line; a `\r\n` pair simply
//! produces an empty line which is dropped.

/// Split `residue + chunk` into complete lines and the new residue.
///
/// Complete lines are trimmed and empty ones are discarded. The residue is
/// returned untrimmed so that whitespace spanning a chunk boundary survives.
pub fn split_frames(residue: &str, chunk: &str) -> (Vec<String>, String) {
    let mut combined = String::with_capacity(residue.len() + chunk.len());
    combined.push_str(residue);
    combined.extend(chunk.chars().map(|c| if c == '\r' { '\n' } else { c }));

    let mut segments: Vec<&str> = combined.split('\n').collect();
    // split() always yields at least one segment; the last one is either the
    // empty tail after a terminator or an incomplete line.
    let tail = segments.pop().unwrap_or_default().to_string();

    let lines = segments
        .into_iter()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect();

    (lines, tail)
}

/// Stateful line decoder scoped to one serial session
#[derive(Debug, Default, Clone)]
pub struct FrameDecoder {
    residue: String,
}

impl FrameDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a decoded text chunk, returning every line it completes
    pub fn handle(&mut self, chunk: &str) -> Vec<String> {
        let (lines, residue) = split_frames(&self.residue, chunk);
        self.residue = residue;
        lines
    }

    /// Text of the incomplete trailing line
    pub fn residue(&self) -> &str {
        &self.residue
    }

    /// Drop any partial line
    pub fn reset(&mut self) {
        self.residue.clear();
    }
}
