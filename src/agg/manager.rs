//! Segment cache manager
//!
//! Ties keys to the segment cache: derives a header from a key, looks up the
//! cache, and on a miss asks a loader for the body and stores it.
//!
//! ```text
//! AggregationKey ──► SegmentHeader ──► cache.get ──► hit ──► body
//!                                          │
//!                                         miss
//!                                          ▼
//!                               loader(LoadRequest) ──► cache.put ──► body
//! ```

use super::key::AggregationKey;
use crate::cache::SegmentCache;
use crate::error::Result;
use crate::metrics;
use crate::segment::{SegmentBody, SegmentColumn, SegmentHeader};
use std::sync::Arc;
use tracing::{debug, warn};

/// Schema-level fields a header needs beyond the key
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SegmentContext {
    /// Schema name
    pub schema_name: String,
    /// Checksum of the schema definition
    pub schema_checksum: Option<String>,
    /// Cube name
    pub cube_name: String,
    /// Measure name
    pub measure_name: String,
}

impl SegmentContext {
    /// Create a context without a schema checksum
    pub fn new(
        schema_name: impl Into<String>,
        cube_name: impl Into<String>,
        measure_name: impl Into<String>,
    ) -> Self {
        Self {
            schema_name: schema_name.into(),
            schema_checksum: None,
            cube_name: cube_name.into(),
            measure_name: measure_name.into(),
        }
    }
}

/// What a loader needs to compute a missing segment
#[derive(Debug)]
pub struct LoadRequest<'a> {
    /// Key of the missing segment
    pub key: &'a AggregationKey,
    /// Header the body will be stored under
    pub header: &'a SegmentHeader,
    /// SQL `WHERE` fragment, or `None` when unrestricted
    pub where_clause: Option<String>,
}

/// Lookup-then-load access to a segment cache
#[derive(Clone)]
pub struct SegmentCacheManager {
    cache: Arc<dyn SegmentCache>,
}

impl SegmentCacheManager {
    /// Wrap a cache
    pub fn new(cache: Arc<dyn SegmentCache>) -> Self {
        Self { cache }
    }

    /// Underlying cache
    pub fn cache(&self) -> &Arc<dyn SegmentCache> {
        &self.cache
    }

    /// Derive the header a key's segment is stored under
    pub fn header_for(&self, key: &AggregationKey, context: &SegmentContext) -> SegmentHeader {
        let star = key.star();
        let dialect = star.dialect();

        let mut builder = SegmentHeader::builder(
            context.schema_name.clone(),
            context.cube_name.clone(),
            star.fact_table(),
            key.constrained_columns().clone(),
        )
        .measure_name(context.measure_name.clone())
        .compound_predicates(key.compound_predicate_sql(dialect));

        if let Some(checksum) = &context.schema_checksum {
            builder = builder.schema_checksum(checksum.clone());
        }
        for pos in key.constrained_columns().iter() {
            if let Some(column) = star.column(pos) {
                builder = builder.column(SegmentColumn::wildcard(dialect.column_expression(column)));
            }
        }
        for predicate in key.non_group_by_predicates() {
            builder = builder.column(SegmentColumn::new(
                dialect.column_expression(predicate.column()),
                predicate.value_set().into_iter().cloned(),
            ));
        }
        builder.build()
    }

    /// Return the key's segment, loading and storing it on a miss
    ///
    /// Only loader errors propagate. A failed store is logged and the loaded
    /// body is still returned.
    pub fn load<F>(&self, key: &AggregationKey, context: &SegmentContext, loader: F) -> Result<SegmentBody>
    where
        F: FnOnce(&LoadRequest<'_>) -> Result<SegmentBody>,
    {
        let header = self.header_for(key, context);
        if let Some(body) = self.cache.get(&header) {
            debug!(unique_id = %header.unique_id(), "segment cache hit");
            metrics::record_load("hit");
            return Ok(body);
        }

        debug!(unique_id = %header.unique_id(), key = %key, "segment cache miss");
        metrics::record_load("miss");
        let request = LoadRequest {
            key,
            header: &header,
            where_clause: key.where_clause(key.star().dialect()),
        };
        let body = loader(&request).map_err(|e| {
            metrics::record_load("load_failed");
            e
        })?;

        if !self.cache.put(&header, &body) {
            warn!(unique_id = %header.unique_id(), "failed to store loaded segment");
            metrics::record_load("store_failed");
        }
        Ok(body)
    }
}

impl std::fmt::Debug for SegmentCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentCacheManager")
            .field("rich_index", &self.cache.supports_rich_index())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agg::AggregationKeyBuilder;
    use crate::bitkey::BitKey;
    use crate::cache::MemorySegmentCache;
    use crate::error::Error;
    use crate::predicate::StarPredicate;
    use crate::segment::SegmentData;
    use crate::star::Star;
    use crate::value::Value;
    use std::cell::Cell;

    fn key() -> AggregationKey {
        let star = Star::builder("sales_fact")
            .column("store", "state")
            .column("time", "year")
            .build();
        let state = star.column(0).unwrap().clone();
        AggregationKeyBuilder::new(Arc::clone(&star), BitKey::from_positions(2, [1]))
            .compound_predicate(StarPredicate::value(state, Value::from("CA")))
            .build()
    }

    fn body() -> SegmentBody {
        SegmentBody::new(
            vec![vec![Value::Int(1997)]],
            vec![false],
            SegmentData::Dense(vec![Some(10.0)]),
        )
    }

    #[test]
    fn test_load_then_hit() {
        let manager = SegmentCacheManager::new(Arc::new(MemorySegmentCache::new()));
        let ctx = SegmentContext::new("FoodMart", "Sales", "Unit Sales");
        let key = key();
        let calls = Cell::new(0);

        let first = manager
            .load(&key, &ctx, |req| {
                calls.set(calls.get() + 1);
                assert_eq!(req.where_clause.as_deref(), Some(r#""store"."state" = 'CA'"#));
                Ok(body())
            })
            .unwrap();
        let second = manager
            .load(&key, &ctx, |_| {
                calls.set(calls.get() + 1);
                Ok(body())
            })
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_loader_error_propagates() {
        let manager = SegmentCacheManager::new(Arc::new(MemorySegmentCache::new()));
        let ctx = SegmentContext::new("FoodMart", "Sales", "Unit Sales");
        let key = key();

        let result = manager.load(&key, &ctx, |_| Err(Error::Load("database down".into())));
        assert!(matches!(result, Err(Error::Load(_))));
        assert!(!manager.cache().contains(&manager.header_for(&key, &ctx)));
    }

    #[test]
    fn test_header_fields() {
        let manager = SegmentCacheManager::new(Arc::new(MemorySegmentCache::new()));
        let mut ctx = SegmentContext::new("FoodMart", "Sales", "Unit Sales");
        let key = key();
        let plain = manager.header_for(&key, &ctx);

        assert_eq!(plain.fact_table_name, "sales_fact");
        assert_eq!(plain.constrained_columns, BitKey::from_positions(2, [1]));
        assert_eq!(plain.compound_predicates, vec![r#""store"."state" = 'CA'"#]);
        assert_eq!(plain.columns.len(), 1);
        assert_eq!(plain, manager.header_for(&key, &ctx));

        ctx.schema_checksum = Some("v2".to_string());
        assert_ne!(plain, manager.header_for(&key, &ctx));
    }
}
