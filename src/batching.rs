//! Packs ordered fragments into provider-sized batches.
//!
//! The planner is a greedy, single-pass, order-preserving bin packer. It
//! never reorders fragments and never splits one fragment across batches;
//! every fragment lands in exactly one emitted batch, and batches come out
//! in ascending starting-index order.

use crate::chunking::Fragment;

/// Caps applied to each batch sent to a synchronous embedding provider.
#[derive(Clone, Copy, Debug)]
pub struct BatchLimits {
    /// Maximum number of fragments per batch.
    pub max_items: usize,
    /// Maximum summed content length (in characters) per batch.
    pub max_total_chars: usize,
}

impl Default for BatchLimits {
    fn default() -> Self {
        Self {
            max_items: 64,
            max_total_chars: 16_000,
        }
    }
}

/// An ordered sub-sequence of fragments bound for one provider call.
#[derive(Clone, Debug, Default)]
pub struct Batch {
    fragments: Vec<Fragment>,
}

impl Batch {
    /// Index of the first fragment in this batch. Used to identify the batch
    /// in retry-exhaustion errors.
    pub fn start_index(&self) -> usize {
        self.fragments.first().map_or(0, |f| f.index)
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    pub fn fragments(&self) -> &[Fragment] {
        &self.fragments
    }

    pub fn into_fragments(self) -> Vec<Fragment> {
        self.fragments
    }

    fn total_chars(&self) -> usize {
        self.fragments.iter().map(|f| f.content.chars().count()).sum()
    }
}

/// Greedily packs `fragments` into batches respecting `limits`.
///
/// Per-fragment length caps are the chunker's job and are not re-checked
/// here; a single fragment longer than `max_total_chars` still becomes its
/// own batch.
pub fn plan(fragments: impl IntoIterator<Item = Fragment>, limits: &BatchLimits) -> Vec<Batch> {
    let max_items = limits.max_items.max(1);
    let mut batches = Vec::new();
    let mut current = Batch::default();
    let mut current_chars = 0usize;

    for fragment in fragments {
        let len = fragment.content.chars().count();
        let would_overflow = current_chars + len > limits.max_total_chars;
        if !current.is_empty() && (would_overflow || current.len() == max_items) {
            batches.push(std::mem::take(&mut current));
            current_chars = 0;
        }
        current_chars += len;
        current.fragments.push(fragment);
    }

    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fragments(lengths: &[usize]) -> Vec<Fragment> {
        lengths
            .iter()
            .enumerate()
            .map(|(index, len)| Fragment {
                index,
                content: "x".repeat(*len),
            })
            .collect()
    }

    #[test]
    fn respects_item_count_cap() {
        let limits = BatchLimits {
            max_items: 2,
            max_total_chars: 1_000,
        };
        let batches = plan(fragments(&[5, 5, 5, 5, 5]), &limits);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 2);
        assert_eq!(batches[2].len(), 1);
    }

    #[test]
    fn respects_aggregate_char_cap() {
        let limits = BatchLimits {
            max_items: 100,
            max_total_chars: 10,
        };
        let batches = plan(fragments(&[4, 4, 4]), &limits);
        // 4 + 4 fits; the third 4 would push the total to 12.
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].len(), 2);
        assert_eq!(batches[1].len(), 1);
    }

    #[test]
    fn oversized_fragment_forms_its_own_batch() {
        let limits = BatchLimits {
            max_items: 10,
            max_total_chars: 10,
        };
        let batches = plan(fragments(&[3, 25, 3]), &limits);
        assert_eq!(batches.len(), 3);
        assert_eq!(batches[1].len(), 1);
        assert_eq!(batches[1].fragments()[0].content.len(), 25);
    }

    #[test]
    fn concatenated_batches_reproduce_input_order() {
        let limits = BatchLimits {
            max_items: 3,
            max_total_chars: 12,
        };
        let input = fragments(&[4, 1, 7, 2, 9, 3, 3, 3]);
        let batches = plan(input.clone(), &limits);

        let flattened: Vec<Fragment> = batches
            .iter()
            .flat_map(|b| b.fragments().to_vec())
            .collect();
        assert_eq!(flattened, input);

        for batch in &batches {
            assert!(batch.len() <= limits.max_items);
            assert!(batch.total_chars() <= limits.max_total_chars || batch.len() == 1);
        }

        let mut starts: Vec<usize> = batches.iter().map(Batch::start_index).collect();
        let sorted = starts.clone();
        starts.sort_unstable();
        assert_eq!(starts, sorted, "batches emitted in ascending start order");
    }

    #[test]
    fn empty_input_yields_no_batches() {
        assert!(plan(Vec::new(), &BatchLimits::default()).is_empty());
    }
}
