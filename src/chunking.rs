//! Splits raw document text into ordered, bounded-length fragments.
//!
//! Fragments are produced by slicing the input at fixed character offsets.
//! Each slice is trimmed, and whitespace-only slices are dropped without
//! reserving an index: later fragments shift down to fill the gap, so a
//! fragment's index reflects its position in the *filtered* sequence, not a
//! byte offset into the raw input.

/// A bounded-length slice of a document's text, the unit of embedding and
/// storage.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Fragment {
    /// Zero-based, contiguous position after empty-fragment filtering.
    pub index: usize,
    /// Trimmed, non-empty content.
    pub content: String,
}

/// Fixed-width character chunker.
#[derive(Clone, Copy, Debug)]
pub struct Chunker {
    max_chars: usize,
}

impl Chunker {
    pub fn new(max_chars: usize) -> Self {
        Self {
            max_chars: max_chars.max(1),
        }
    }

    /// Maximum character length of any emitted fragment.
    pub fn max_chars(&self) -> usize {
        self.max_chars
    }

    /// Returns a lazy, restartable iterator over the non-empty trimmed
    /// fragments of `text`. Empty input yields an empty sequence.
    pub fn fragments<'a>(&self, text: &'a str) -> Fragments<'a> {
        Fragments {
            rest: text,
            max_chars: self.max_chars,
            next_index: 0,
        }
    }
}

/// Iterator state for [`Chunker::fragments`].
#[derive(Clone, Debug)]
pub struct Fragments<'a> {
    rest: &'a str,
    max_chars: usize,
    next_index: usize,
}

impl Iterator for Fragments<'_> {
    type Item = Fragment;

    fn next(&mut self) -> Option<Fragment> {
        while !self.rest.is_empty() {
            let split = char_boundary_at(self.rest, self.max_chars);
            let (slice, rest) = self.rest.split_at(split);
            self.rest = rest;

            let trimmed = slice.trim();
            if trimmed.is_empty() {
                // Dropped slices do not reserve an index.
                continue;
            }

            let index = self.next_index;
            self.next_index += 1;
            return Some(Fragment {
                index,
                content: trimmed.to_string(),
            });
        }
        None
    }
}

/// Byte offset of the `n`-th character boundary, clamped to the string end.
fn char_boundary_at(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map_or(text.len(), |(offset, _)| offset)
}

/// Collapses carriage returns and newlines into spaces so fixed-offset
/// slicing never splits mid-line-break sequence. Uploaded documents pass
/// through this before chunking.
pub fn normalize_newlines(text: &str) -> String {
    text.replace(['\r', '\n'], " ")
}
