use std::sync::Arc;

use shapemap_api::descriptor::{Mappable, TypeDescriptor};

use crate::cache::{CacheEntry, CacheMode, CacheStats, InsertPolicy, RoutineCache};
use crate::compiler::{CompiledRoutine, compile};
use crate::config::MapperConfig;
use crate::error::MapError;
use crate::key::TypePairKey;
use crate::planner::plan;

/// Mapping context: routine cache plus planning options.
///
/// `Send + Sync`; share one instance (e.g. behind an `Arc`) across threads.
pub struct Mapper {
    cache: RoutineCache,
    allow_recursion: bool,
}

impl Default for Mapper {
    fn default() -> Self {
        Self::new()
    }
}

impl Mapper {
    /// Unbounded cache, last-write-wins, nested mapping enabled.
    pub fn new() -> Self {
        Self {
            cache: RoutineCache::default(),
            allow_recursion: true,
        }
    }

    pub fn with_options(
        mode: CacheMode,
        policy: InsertPolicy,
        allow_recursion: bool,
    ) -> Result<Self, MapError> {
        Ok(Self {
            cache: RoutineCache::new(mode, policy)?,
            allow_recursion,
        })
    }

    pub fn from_config(config: &MapperConfig) -> Result<Self, MapError> {
        let mode = config.cache.cache_mode()?;
        tracing::info!(
            mode = ?mode,
            policy = ?config.cache.policy,
            allow_recursion = config.allow_recursion,
            "mapper configured"
        );
        Self::with_options(mode, config.cache.policy, config.allow_recursion)
    }

    pub fn allow_recursion(&self) -> bool {
        self.allow_recursion
    }

    /// Map `source` into a new `D` through the cached routine for `(S, D)`.
    ///
    /// `None` returns `Ok(None)` without planning or touching the cache.
    pub fn map<S: Mappable, D: Mappable>(&self, source: Option<&S>) -> Result<Option<D>, MapError> {
        self.map_with(source, true)
    }

    /// Like [`Mapper::map`]; with `use_cache == false` a fresh routine is
    /// built for this call and the cache is neither read nor written.
    pub fn map_with<S: Mappable, D: Mappable>(
        &self,
        source: Option<&S>,
        use_cache: bool,
    ) -> Result<Option<D>, MapError> {
        let Some(source) = source else {
            return Ok(None);
        };
        let routine = if use_cache {
            self.routine::<S, D>()?
        } else {
            Arc::new(self.build(TypePairKey::of::<S, D>(), &S::descriptor(), &D::descriptor())?)
        };
        routine.invoke(source).map(Some)
    }

    pub fn map_value<S: Mappable, D: Mappable>(&self, source: &S) -> Result<D, MapError> {
        self.routine::<S, D>()?.invoke(source)
    }

    /// Resolve or build the routine for `(S, D)` without invoking it.
    pub fn routine<S: Mappable, D: Mappable>(&self) -> Result<Arc<CompiledRoutine>, MapError> {
        let key = TypePairKey::of::<S, D>();
        self.cache
            .get_or_build(key, || self.build(key, &S::descriptor(), &D::descriptor()))
    }

    fn build(
        &self,
        key: TypePairKey,
        source: &TypeDescriptor,
        target: &TypeDescriptor,
    ) -> Result<CompiledRoutine, MapError> {
        let plan = plan(source, target, self.allow_recursion).map_err(|e| {
            tracing::warn!(pair = %key, error = %e, "failed to plan mapping");
            e
        })?;
        tracing::debug!(
            source = %key.source_name(),
            target = %key.target_name(),
            shape = plan.shape_name(),
            "compiled mapping routine"
        );
        Ok(compile(key, plan))
    }

    pub fn set_mode(&self, mode: CacheMode) -> Result<(), MapError> {
        self.cache.set_mode(mode)
    }

    pub fn mode(&self) -> CacheMode {
        self.cache.mode()
    }

    pub fn is_bounded(&self) -> bool {
        self.cache.is_bounded()
    }

    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Cached routines, oldest first.
    pub fn snapshot(&self) -> Vec<CacheEntry> {
        self.cache.snapshot()
    }

    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_source_skips_planning() {
        let mapper = Mapper::new();
        assert_eq!(mapper.map::<u8, String>(None).unwrap(), None);
        let stats = mapper.stats();
        assert_eq!((stats.misses, stats.builds, stats.entries), (0, 0, 0));
    }

    #[test]
    fn uncached_mapping_leaves_cache_untouched() {
        let mapper = Mapper::new();
        let mapped: Option<String> = mapper.map_with(Some(&7_u8), false).unwrap();
        assert_eq!(mapped.as_deref(), Some("7"));
        assert!(mapper.snapshot().is_empty());

        assert_eq!(mapper.map_value::<u8, String>(&8).unwrap(), "8");
        assert_eq!(mapper.snapshot().len(), 1);
        assert_eq!(mapper.stats().builds, 1);
    }

    #[test]
    fn config_selects_cache_mode_and_recursion() {
        let config = MapperConfig::parse(
            r#"
            allow_recursion = false

            [cache]
            mode = "bounded"
            capacity = 4
            "#,
        )
        .unwrap();
        let mapper = Mapper::from_config(&config).unwrap();
        assert!(mapper.is_bounded());
        assert_eq!(mapper.mode(), CacheMode::Bounded { capacity: 4 });
        assert!(!mapper.allow_recursion());
    }
}
