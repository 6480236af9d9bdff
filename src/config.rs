//! Runtime-configurable tuning parameters for the collective engine.
//!
//! Override via environment variables (prefixed `DAGCOLL_`) or by
//! constructing a custom `EngineConfig`.

/// Tuning parameters for algorithm selection and scratch memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Communicators with at least this many participants use the all-pairs
    /// algorithms. `None` never switches on participant count.
    pub all_pairs_min_participants: Option<u32>,

    /// Collectives moving at least this many payload bytes use the all-pairs
    /// algorithms. `None` never switches on payload size.
    pub all_pairs_min_bytes: Option<usize>,

    /// Number of recycled scratch buffers kept by the engine's pool.
    pub scratch_pool_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            all_pairs_min_participants: None,
            all_pairs_min_bytes: None,
            scratch_pool_size: 64,
        }
    }
}

impl EngineConfig {
    /// Load config from environment variables, falling back to defaults.
    ///
    /// Recognized variables:
    /// - `DAGCOLL_ALL_PAIRS_MIN_PARTICIPANTS`
    /// - `DAGCOLL_ALL_PAIRS_MIN_BYTES`
    /// - `DAGCOLL_SCRATCH_POOL_SIZE`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();

        if let Some(v) = lookup("DAGCOLL_ALL_PAIRS_MIN_PARTICIPANTS")
            && let Ok(n) = v.parse::<u32>()
        {
            cfg.all_pairs_min_participants = Some(n);
        }
        if let Some(v) = lookup("DAGCOLL_ALL_PAIRS_MIN_BYTES")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.all_pairs_min_bytes = Some(n);
        }
        if let Some(v) = lookup("DAGCOLL_SCRATCH_POOL_SIZE")
            && let Ok(n) = v.parse::<usize>()
        {
            cfg.scratch_pool_size = n;
        }

        cfg
    }

    /// Whether a collective of `participants` ranks moving `bytes` bytes
    /// should use the all-pairs algorithms.
    pub fn prefers_all_pairs(&self, participants: u32, bytes: usize) -> bool {
        self.all_pairs_min_participants
            .is_some_and(|min| participants >= min)
            || self.all_pairs_min_bytes.is_some_and(|min| bytes >= min)
    }
}
