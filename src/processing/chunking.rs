//! Character-bounded segmentation with optional overlap.
//!
//! Lengths are counted in Unicode scalar values. Each segment holds at most `chunk_size`
//! characters and repeats the last `overlap` characters of its predecessor, so dropping the
//! first `overlap` characters of every segment after the first and concatenating gives back the
//! input exactly.
//!
//! Cuts prefer a whitespace boundary found within [`BREAKPOINT_LOOKBACK`] characters before the
//! hard limit; the whitespace stays at the end of the earlier segment. Without one, the segment
//! is cut at exactly `chunk_size` characters. The choice depends only on the input and the
//! configuration, so re-deriving the sequence always yields the same segments.

use super::types::ChunkingError;

/// How far before the hard cut the segmenter looks for whitespace.
pub const BREAKPOINT_LOOKBACK: usize = 64;

/// Validated segmentation parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segmenter {
    chunk_size: usize,
    overlap: usize,
}

impl Segmenter {
    /// Validate parameters: `chunk_size > 0` and `overlap < chunk_size`.
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ChunkingError> {
        if chunk_size == 0 {
            return Err(ChunkingError::InvalidChunkSize);
        }
        if overlap >= chunk_size {
            return Err(ChunkingError::InvalidOverlap {
                overlap,
                chunk_size,
            });
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    /// Maximum segment length in characters.
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Characters shared by adjacent segments.
    pub fn overlap(&self) -> usize {
        self.overlap
    }

    /// Lazily segment `text`. The returned iterator can be cloned to restart from any point.
    pub fn segments<'a>(&self, text: &'a str) -> Segments<'a> {
        Segments {
            text,
            cursor: 0,
            chunk_size: self.chunk_size,
            overlap: self.overlap,
        }
    }
}

/// Segment `text` into runs of at most `chunk_size` characters sharing `overlap` characters.
pub fn segment(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Segments<'_>, ChunkingError> {
    Segmenter::new(chunk_size, overlap).map(|segmenter| segmenter.segments(text))
}

/// Lazy, restartable iterator over the segments of one text.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    cursor: usize,
    chunk_size: usize,
    overlap: usize,
}

impl<'a> Iterator for Segments<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.cursor >= self.text.len() {
            return None;
        }

        let rest = &self.text[self.cursor..];
        // offsets[k] is the byte offset after k characters of `rest`.
        let offsets: Vec<usize> = rest
            .char_indices()
            .map(|(offset, _)| offset)
            .take(self.chunk_size + 1)
            .collect();

        if offsets.len() <= self.chunk_size {
            self.cursor = self.text.len();
            return Some(rest);
        }

        let cut = self.breakpoint(rest, &offsets);
        let segment = &rest[..offsets[cut]];
        self.cursor += offsets[cut - self.overlap];
        Some(segment)
    }
}

impl Segments<'_> {
    /// Number of characters in the next segment when more than `chunk_size` characters remain.
    fn breakpoint(&self, rest: &str, offsets: &[usize]) -> usize {
        let floor = self
            .chunk_size
            .saturating_sub(BREAKPOINT_LOOKBACK)
            .max(self.overlap + 1);
        (floor..=self.chunk_size)
            .rev()
            .find(|&count| {
                rest[offsets[count - 1]..]
                    .chars()
                    .next()
                    .is_some_and(char::is_whitespace)
            })
            .unwrap_or(self.chunk_size)
    }
}

/// Rebuild the source text from its segments by dropping each repeated overlap.
pub fn reassemble<'a>(segments: impl IntoIterator<Item = &'a str>, overlap: usize) -> String {
    let mut output = String::new();
    for (index, segment) in segments.into_iter().enumerate() {
        if index == 0 {
            output.push_str(segment);
        } else {
            let skip = segment
                .char_indices()
                .nth(overlap)
                .map(|(offset, _)| offset)
                .unwrap_or(segment.len());
            output.push_str(&segment[skip..]);
        }
    }
    output
}
