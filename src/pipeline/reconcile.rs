//! Restores original fragment order from unordered, tag-keyed job results.

use crate::embeddings::job::TaggedEmbedding;
use crate::types::PipelineError;

/// Parses the numeric position out of an external tag (`chunk-3` → 3).
pub fn parse_tag(tag: &str) -> Result<usize, PipelineError> {
    tag.strip_prefix("chunk-")
        .and_then(|rest| rest.parse::<usize>().ok())
        .ok_or_else(|| PipelineError::Reconciliation(format!("unparseable result tag '{tag}'")))
}

/// Reorders `results` into original submission order for a job of
/// `expected` fragments.
///
/// A tag that was submitted but is absent from the output is data loss and
/// surfaces as an error rather than a silent skip; duplicate or
/// out-of-range tags are rejected the same way.
pub fn reconcile(
    expected: usize,
    results: Vec<TaggedEmbedding>,
) -> Result<Vec<Vec<f32>>, PipelineError> {
    let mut ordered: Vec<Option<Vec<f32>>> = vec![None; expected];

    for result in results {
        let position = parse_tag(&result.tag)?;
        let slot = ordered.get_mut(position).ok_or_else(|| {
            PipelineError::Reconciliation(format!(
                "result tag '{}' is outside the submitted range 0..{expected}",
                result.tag
            ))
        })?;
        if slot.is_some() {
            return Err(PipelineError::Reconciliation(format!(
                "duplicate result tag '{}'",
                result.tag
            )));
        }
        *slot = Some(result.vector);
    }

    ordered
        .into_iter()
        .enumerate()
        .map(|(index, slot)| {
            slot.ok_or_else(|| {
                PipelineError::Reconciliation(format!("missing result for tag 'chunk-{index}'"))
            })
        })
        .collect()
}
