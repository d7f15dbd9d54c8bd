//! Span constructors for statement execution and transaction boundaries.

use tracing::Span;

/// Span covering one executed statement
pub fn execute_query_span(sql: &str) -> Span {
    tracing::debug_span!("rowkeeper.query", sql = %sql)
}

/// Span covering a transaction boundary call
pub fn transaction_span(action: &'static str, depth: u32) -> Span {
    tracing::debug_span!("rowkeeper.transaction", action, depth)
}
