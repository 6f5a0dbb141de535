//! The piece splitter.
//!
//! Input is the caller's ordered segments; their concatenation is the file
//! content. Segment boundaries are piece boundaries: a piece never spans two
//! segments, except that a tail shorter than the minimum chunk size is
//! carried forward and coalesced with the following segment. The final piece
//! of the stream may be shorter than the minimum.
//!
//! Within a segment, text-splittable content is cut just after natural
//! delimiters (newline, then whitespace, then punctuation) so that minor
//! edits keep neighbouring pieces stable; everything else is cut at fixed
//! byte offsets. Cuts always land on UTF-8 character boundaries.

use std::mem;

use vellum_core::MAX_DOC_SIZE;

use crate::ChunkError;

/// Splitter configuration.
#[derive(Debug, Clone, Copy)]
pub struct SplitterConfig {
    /// Piece size ceiling in bytes
    pub piece_size: usize,
    /// Lower bound for non-final piece bytes
    pub minimum_chunk_size: usize,
    /// Split at text delimiters instead of fixed offsets
    pub plain_split: bool,
}

impl SplitterConfig {
    /// Rejects non-positive or inverted size bounds.
    pub fn validate(&self) -> Result<(), ChunkError> {
        if self.piece_size == 0 {
            return Err(ChunkError::InvalidConfig("piece size must be positive".into()));
        }
        if self.minimum_chunk_size == 0 {
            return Err(ChunkError::InvalidConfig(
                "minimum chunk size must be positive".into(),
            ));
        }
        if self.minimum_chunk_size > self.piece_size {
            return Err(ChunkError::InvalidConfig(format!(
                "minimum chunk size {} exceeds piece size {}",
                self.minimum_chunk_size, self.piece_size
            )));
        }
        Ok(())
    }

    /// The byte length a cut aims for.
    fn target(&self) -> usize {
        if self.plain_split {
            MAX_DOC_SIZE
                .max(self.minimum_chunk_size)
                .min(self.piece_size)
        } else {
            self.piece_size
        }
    }
}

/// Splits segments into pieces under the given configuration.
///
/// Call [`SplitterConfig::validate`] first; the splitter itself assumes a
/// sane configuration.
pub fn split_segments<I>(segments: I, config: SplitterConfig) -> PieceSplitter<I::IntoIter>
where
    I: IntoIterator<Item = String>,
{
    PieceSplitter {
        segments: segments.into_iter(),
        config,
        buf: String::new(),
    }
}

/// Lazy piece iterator over a segment stream.
pub struct PieceSplitter<I> {
    segments: I,
    config: SplitterConfig,
    buf: String,
}

impl<I> PieceSplitter<I> {
    /// Finds the byte offset to cut the working buffer at.
    ///
    /// Requires `buf.len() > target`. The offset is a character boundary in
    /// `(0, target]`, or just past `target` when a single character straddles
    /// it.
    fn cut_point(&self) -> usize {
        let target = self.config.target();
        let min = self.config.minimum_chunk_size;
        let limit = floor_char_boundary(&self.buf, target);
        if limit == 0 {
            // One multi-byte character is wider than the whole target.
            return ceil_char_boundary(&self.buf, target);
        }

        if self.config.plain_split {
            let window = &self.buf[..limit];
            if let Some(idx) = window.rfind('\n') {
                if idx + 1 >= min {
                    return idx + 1;
                }
            }
            if let Some(cut) = last_delimiter(window, min, char::is_whitespace) {
                return cut;
            }
            if let Some(cut) = last_delimiter(window, min, |c| c.is_ascii_punctuation()) {
                return cut;
            }
        }

        limit
    }
}

impl<I: Iterator<Item = String>> Iterator for PieceSplitter<I> {
    type Item = String;

    fn next(&mut self) -> Option<String> {
        let target = self.config.target();
        let min = self.config.minimum_chunk_size;

        loop {
            if self.buf.is_empty() {
                match self.segments.next() {
                    Some(segment) => {
                        self.buf = segment;
                        continue;
                    }
                    None => return None,
                }
            }

            if self.buf.len() <= target {
                if self.buf.len() >= min {
                    // Segment boundaries are piece boundaries.
                    return Some(mem::take(&mut self.buf));
                }
                // Under-minimum tail: coalesce forward with the next segment.
                match self.segments.next() {
                    Some(segment) => {
                        self.buf.push_str(&segment);
                        continue;
                    }
                    None => return Some(mem::take(&mut self.buf)),
                }
            }

            let cut = self.cut_point();
            let rest = self.buf.split_off(cut);
            return Some(mem::replace(&mut self.buf, rest));
        }
    }
}

/// The end offset of the last delimiter character whose cut satisfies the
/// minimum piece size.
fn last_delimiter(window: &str, min: usize, pred: impl Fn(char) -> bool) -> Option<usize> {
    let mut best = None;
    for (idx, c) in window.char_indices() {
        let end = idx + c.len_utf8();
        if end >= min && pred(c) {
            best = Some(end);
        }
    }
    best
}

fn floor_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index -= 1;
    }
    index
}

fn ceil_char_boundary(s: &str, mut index: usize) -> usize {
    if index >= s.len() {
        return s.len();
    }
    while !s.is_char_boundary(index) {
        index += 1;
    }
    index
}
