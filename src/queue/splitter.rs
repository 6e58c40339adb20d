use std::collections::BTreeMap;

/// Upper bound on concurrent send lanes per append.
pub const MAX_SHARDS: usize = 4;

/// Splits `items` into at most [`MAX_SHARDS`] buckets of batches holding up to
/// `max_per_send` items each.
///
/// Consecutive batches go to consecutive shards, wrapping around, so a shard can
/// hold several batches. 2000 items at 500 per send use all four shards once;
/// 2500 give shard 0 a second batch; 100 yield a single batch on shard 0.
/// Order is preserved within each batch and across a shard's batches.
pub fn fill_queues<T>(items: Vec<T>, max_per_send: usize) -> BTreeMap<usize, Vec<Vec<T>>> {
    let max_per_send = max_per_send.max(1);
    let mut queues: BTreeMap<usize, Vec<Vec<T>>> = BTreeMap::new();
    let mut current_shard = 0;
    let mut remaining = items.into_iter();

    loop {
        let batch: Vec<T> = remaining.by_ref().take(max_per_send).collect();
        if batch.is_empty() {
            return queues;
        }
        queues.entry(current_shard).or_default().push(batch);
        current_shard = (current_shard + 1) % MAX_SHARDS;
    }
}
