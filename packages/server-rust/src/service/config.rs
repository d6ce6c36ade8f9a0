/// Engine-level configuration shared by every endpoint.
///
/// Controls default pagination, filter depth, save batching, and the cache
/// namespace prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Page size applied when a list request names none.
    pub default_page_size: u64,
    /// Upper bound on any requested page size.
    pub max_page_size: u64,
    /// Maximum nesting depth of a client predicate tree.
    pub max_where_depth: usize,
    /// Entities written per round trip by `create`.
    pub save_chunk_size: usize,
    /// First segment of every cache key, e.g. `CRUD` in `CRUD:list:user:…`.
    pub cache_prefix: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            default_page_size: 25,
            max_page_size: 100,
            max_where_depth: 5,
            save_chunk_size: 20,
            cache_prefix: "CRUD".to_string(),
        }
    }
}
