use super::ner::{InferenceError, NerModel};

/// Find the largest batch size, at or below `start_size`, that the model
/// accepts on `sample`.
///
/// Halves the candidate on every capacity failure. Any other failure is
/// returned as-is. If even size 1 runs out of capacity the probe settles on 1
/// and leaves later batches to fail for real.
pub fn probe_batch_size<M: NerModel + ?Sized>(
    model: &mut M,
    sample: &[&str],
    start_size: usize,
) -> Result<usize, InferenceError> {
    if sample.is_empty() {
        return Ok(start_size.max(1));
    }

    let mut size = start_size;
    while size > 0 {
        match model.infer(sample, size) {
            Ok(_) => {
                tracing::info!(batch_size = size, sample = sample.len(), "Batch size probe succeeded");
                return Ok(size);
            }
            Err(InferenceError::Capacity(message)) => {
                tracing::warn!(batch_size = size, %message, "Out of capacity, halving batch size");
                size /= 2;
            }
            Err(e) => return Err(e),
        }
    }

    tracing::warn!("Every probed batch size ran out of capacity, falling back to 1");
    Ok(1)
}
