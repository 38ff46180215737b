//! Outbound batching (spec §4.6: "Outbound jobs MAY aggregate up to a
//! configured batch size... into one envelope"). Grouping records into
//! chunks is the only part owned by the scheduler — building the
//! combined body is C3's job (`htng-xml`'s per-kind `build()` already
//! accepts a `Vec` of records), and interpreting the combined response
//! (partial `Warnings` = success, any `Errors` = whole batch fails) is
//! already encoded in `htng_envelope::ParsedResponse::success`.

pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Split `records` into chunks of at most `batch_size`, preserving order.
pub fn chunk<T>(records: Vec<T>, batch_size: usize) -> Vec<Vec<T>> {
    if batch_size == 0 {
        return vec![records];
    }
    let mut chunks = Vec::new();
    let mut current = Vec::with_capacity(batch_size);
    for record in records {
        current.push(record);
        if current.len() == batch_size {
            chunks.push(std::mem::replace(&mut current, Vec::with_capacity(batch_size)));
        }
    }
    if !current.is_empty() {
        chunks.push(current);
    }
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_into_even_chunks() {
        let records: Vec<u32> = (0..250).collect();
        let chunks = chunk(records, 100);
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks[0].len(), 100);
        assert_eq!(chunks[2].len(), 50);
    }

    #[test]
    fn empty_input_yields_no_chunks() {
        let chunks: Vec<Vec<u32>> = chunk(Vec::new(), 100);
        assert!(chunks.is_empty());
    }

    #[test]
    fn default_batch_size_matches_spec() {
        assert_eq!(DEFAULT_BATCH_SIZE, 100);
    }
}
