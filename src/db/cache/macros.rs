/// Generation-checked read-through over [`Cache`](crate::db::Cache).
///
/// Serves a value only if it was stored under the key's current generation.
/// Otherwise awaits `$block` and queues its value under the generation read
/// before computing, so an invalidation that lands meanwhile outdates it.
/// When Redis cannot be read the value is computed and not stored.
///
/// # Arguments
/// * `$cache`: a `Cache`.
/// * `$key`: the `CacheKey` to read and write.
/// * `$ttl`: time-to-live of the stored value, in seconds.
/// * `$block`: a future resolving to `AppResult<T>`.
///
/// # Example
/// ```rust,ignore
/// let result: AppResult<RecommendationResult> = cached!(cache, key, 300, async move {
///     orchestrator.recommend(&user_id).await
/// });
/// ```
#[macro_export]
macro_rules! cached {
    ($cache:expr, $key:expr, $ttl:expr, $block:expr) => {{
        match $cache.lookup(&$key).await {
            $crate::db::cache::Lookup::Hit(value) => Ok(value),
            $crate::db::cache::Lookup::Miss(generation) => {
                let value = $block.await?;
                if let Some(generation) = generation {
                    $cache.set_in_background(&$key, generation, &value, $ttl);
                }
                Ok(value)
            }
        }
    }};
}
