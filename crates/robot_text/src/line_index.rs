// ==============================================================================
// LineIndex: byte offsets <-> encoded positions
// ==============================================================================
//
// Builds a line-start offset table plus two per-line flags: ascii (byte ==
// UTF-16 == UTF-32 column, no translation at all) and bmp-only (UTF-16 ==
// UTF-32). Robot source is overwhelmingly ASCII, so almost every translation
// takes the flag fast path; flagged lines get a short scan of that line only.

use crate::position::{Position, PositionEncoding};

#[derive(Clone)]
pub struct LineIndex {
    /// Byte offset of the start of each line; line 0 starts at offset 0.
    line_starts: Vec<u32>,
    /// Total text length in bytes.
    len: u32,
    /// Per line: all bytes < 0x80.
    ascii: Vec<bool>,
    /// Per line: no scalar above the BMP (UTF-16 columns == scalar columns).
    bmp_only: Vec<bool>,
}

impl LineIndex {
    pub fn new(text: &str) -> Self {
        let mut line_starts = vec![0u32];
        let mut ascii = Vec::new();
        let mut bmp_only = Vec::new();
        let mut line_ascii = true;
        let mut line_bmp = true;

        for (i, c) in text.char_indices() {
            if c == '\n' {
                ascii.push(line_ascii);
                bmp_only.push(line_bmp);
                line_starts.push((i + 1) as u32);
                line_ascii = true;
                line_bmp = true;
            } else {
                if !c.is_ascii() {
                    line_ascii = false;
                }
                if c.len_utf16() > 1 {
                    line_bmp = false;
                }
            }
        }
        ascii.push(line_ascii);
        bmp_only.push(line_bmp);

        Self {
            line_starts,
            len: text.len() as u32,
            ascii,
            bmp_only,
        }
    }

    pub fn line_count(&self) -> u32 {
        self.line_starts.len() as u32
    }

    /// Byte range of a line, excluding its terminator. Returns `None` past
    /// the last line.
    pub fn line_byte_range(&self, line: u32) -> Option<(u32, u32)> {
        let start = *self.line_starts.get(line as usize)?;
        let end = self
            .line_starts
            .get(line as usize + 1)
            .map(|next| next - 1)
            .unwrap_or(self.len);
        Some((start, end))
    }

    /// Convert an encoded position to a byte offset into `text`. The
    /// character offset clamps to the line end; a line at or past the line
    /// count returns `None` (the caller decides whether that means append).
    pub fn offset(
        &self,
        text: &str,
        pos: Position,
        encoding: PositionEncoding,
    ) -> Option<u32> {
        let (start, end) = self.line_byte_range(pos.line)?;
        if pos.character == 0 {
            return Some(start);
        }
        // Fast path: one byte per unit regardless of encoding.
        if self.ascii[pos.line as usize] {
            return Some((start + pos.character).min(end));
        }
        let line = &text[start as usize..end as usize];
        let mut units = 0u32;
        for (byte_idx, c) in line.char_indices() {
            if units >= pos.character {
                return Some(start + byte_idx as u32);
            }
            units += encoding.units_of(c);
        }
        Some(end)
    }

    /// Convert a byte offset into an encoded position. Offsets inside a
    /// scalar round down to its start.
    pub fn position(&self, text: &str, offset: u32, encoding: PositionEncoding) -> Position {
        let offset = offset.min(self.len);
        let line = match self.line_starts.binary_search(&offset) {
            Ok(line) => line,
            Err(next) => next - 1,
        };
        let start = self.line_starts[line];
        if self.ascii[line] {
            return Position::new(line as u32, offset - start);
        }
        let slice = &text[start as usize..offset as usize];
        let character = match encoding {
            PositionEncoding::Utf8 => slice.len() as u32,
            PositionEncoding::Utf16 => slice.chars().map(|c| c.len_utf16() as u32).sum(),
            PositionEncoding::Utf32 => slice.chars().count() as u32,
        };
        Position::new(line as u32, character)
    }

    /// Translate a column on one line between encodings.
    pub fn transcode_column(
        &self,
        text: &str,
        line: u32,
        character: u32,
        from: PositionEncoding,
        to: PositionEncoding,
    ) -> Option<u32> {
        if from == to {
            return Some(character);
        }
        let idx = line as usize;
        if idx >= self.ascii.len() {
            return None;
        }
        if self.ascii[idx] {
            return Some(character);
        }
        // UTF-16 and UTF-32 agree on BMP-only lines.
        if self.bmp_only[idx]
            && from != PositionEncoding::Utf8
            && to != PositionEncoding::Utf8
        {
            return Some(character);
        }
        let (start, end) = self.line_byte_range(line)?;
        let slice = &text[start as usize..end as usize];
        let mut from_units = 0u32;
        let mut to_units = 0u32;
        for c in slice.chars() {
            if from_units >= character {
                break;
            }
            from_units += from.units_of(c);
            to_units += to.units_of(c);
        }
        Some(to_units)
    }
}
