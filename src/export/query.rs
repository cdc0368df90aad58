//! Incremental export queries

use super::types::StreamDescriptor;
use crate::state::Offset;
use crate::store::Query;

/// Queries selecting every record of `stream` newer than `offset`.
///
/// Partitioned streams get one query per known partition plus a sweep for
/// partitions never seen before. Unpartitioned streams get a single query,
/// unbounded until the first cursor exists.
pub fn export_queries(stream: &StreamDescriptor, offset: &Offset) -> Vec<Query> {
    let Some(partition_key) = stream.partition_key.as_deref() else {
        return vec![match offset.get(None) {
            Some(value) => Query::range_gt(&stream.order_key, value),
            None => Query::MatchAll,
        }];
    };

    let mut queries: Vec<Query> = offset
        .cursors()
        .filter_map(|cursor| {
            let value = cursor.value?;
            let partition_filter = match cursor.partition {
                Some(partition) => Query::term(partition_key, partition),
                None => Query::not(Query::exists(partition_key)),
            };
            Some(Query::bool(
                vec![Query::range_gt(&stream.order_key, value), partition_filter],
                Vec::new(),
            ))
        })
        .collect();
    queries.push(unseen_partitions_query(partition_key, offset));
    queries
}

/// Records whose partition has no cursor yet
pub fn unseen_partitions_query(partition_key: &str, offset: &Offset) -> Query {
    let known = offset.partitions();
    let must = if offset.has_unpartitioned() {
        vec![Query::exists(partition_key)]
    } else {
        Vec::new()
    };
    let must_not = if known.is_empty() {
        Vec::new()
    } else {
        vec![Query::terms(partition_key, known)]
    };

    if must.is_empty() && must_not.is_empty() {
        Query::MatchAll
    } else {
        Query::bool(must, must_not)
    }
}
