//! Graph store gateway
//!
//! The builder talks to a store only through [`GraphGateway`]:
//! - [`EmbeddedGateway`]: in-process store, statements executed directly
//! - [`RemoteGateway`]: Neo4j HTTP endpoint, statements rendered as Cypher

use async_trait::async_trait;
use indexmap::IndexMap;

use crate::error::EkgResult;
use crate::graph::PropertyValue;
use crate::query::Statement;

pub mod embedded;
pub mod executor;
pub mod remote;

pub use embedded::EmbeddedGateway;
pub use executor::StatementExecutor;
pub use remote::RemoteGateway;

/// One result row, columns in return order
pub type Row = IndexMap<String, PropertyValue>;

/// Executes one statement at a time against a graph store.
///
/// Implementations fail fast: any store-side failure is returned as an
/// error and nothing is retried.
#[async_trait]
pub trait GraphGateway: Send + Sync {
    /// Execute a single statement and return its result rows
    async fn execute(&self, statement: &Statement) -> EkgResult<Vec<Row>>;
}

/// Integer column of the first row, zero when absent
pub fn first_count(rows: &[Row], column: &str) -> u64 {
    rows.first()
        .and_then(|row| row.get(column))
        .and_then(|v| v.as_integer())
        .map(|n| n.max(0) as u64)
        .unwrap_or(0)
}

/// Build a row from column/value pairs
pub fn row<I, K, V>(columns: I) -> Row
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<PropertyValue>,
{
    columns.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}
