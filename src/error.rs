//! Error types for rowkeeper operations.
//!
//! Programmer errors (bad column types, empty operands, unbindable models)
//! and transaction-discipline errors are raised as `OrmError`. Field
//! validation failures are not errors in this sense: they are collected into
//! [`ValidationErrors`](crate::validation::ValidationErrors) on the model.

use crate::executor::ExecutorError;

/// Crate-wide result alias
pub type Result<T> = std::result::Result<T, OrmError>;

/// Error type for model, table and query operations
#[derive(Debug, Clone, PartialEq)]
pub enum OrmError {
    /// Column declared with a type name that is not a member of `ColumnType`
    InvalidColumnType(String),
    /// `IN` / `NOT IN` built from an empty list
    EmptyOperand {
        operator: &'static str,
        column: String,
    },
    /// Conditions could not be turned into a WHERE clause
    InvalidConditions(String),
    /// INSERT or UPDATE requested without any value
    EmptyValues { operation: &'static str, table: String },
    /// Model cannot take part in a join row (composite own primary key)
    UnbindableModel { table: String },
    /// Model has no id where one is required
    MissingId { table: String },
    /// Outer commit attempted after an inner rollback
    RollbackOnly,
    /// Commit or rollback without an open transaction
    NoActiveTransaction,
    /// Revert requested for an operation that cannot be undone
    NotRevertible(String),
    /// Column name not declared on the table
    UnknownColumn { table: String, column: String },
    /// No executor available for the configured database url
    UnsupportedDriver(String),
    /// Executor (driver) failure
    Executor(ExecutorError),
    /// Statement could not be built
    Statement(String),
}

impl std::fmt::Display for OrmError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrmError::InvalidColumnType(ty) => write!(f, "Invalid column type: {}", ty),
            OrmError::EmptyOperand { operator, column } => {
                write!(f, "Empty operand for {} on column {}", operator, column)
            }
            OrmError::InvalidConditions(msg) => write!(f, "Invalid conditions: {}", msg),
            OrmError::EmptyValues { operation, table } => {
                write!(f, "No values given for {} on table {}", operation, table)
            }
            OrmError::UnbindableModel { table } => write!(
                f,
                "Model of table {} has a composite primary key and cannot be bound",
                table
            ),
            OrmError::MissingId { table } => write!(f, "Model of table {} has no id", table),
            OrmError::RollbackOnly => write!(
                f,
                "Transaction is marked rollback-only after an inner rollback"
            ),
            OrmError::NoActiveTransaction => write!(f, "No active transaction"),
            OrmError::NotRevertible(msg) => write!(f, "Operation cannot be reverted: {}", msg),
            OrmError::UnknownColumn { table, column } => {
                write!(f, "Unknown column {} on table {}", column, table)
            }
            OrmError::UnsupportedDriver(url) => write!(f, "No driver available for {}", url),
            OrmError::Executor(e) => write!(f, "Executor error: {}", e),
            OrmError::Statement(msg) => write!(f, "Statement error: {}", msg),
        }
    }
}

impl std::error::Error for OrmError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            OrmError::Executor(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ExecutorError> for OrmError {
    fn from(err: ExecutorError) -> Self {
        OrmError::Executor(err)
    }
}

impl From<rusqlite::Error> for OrmError {
    fn from(err: rusqlite::Error) -> Self {
        OrmError::Executor(ExecutorError::from(err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = OrmError::EmptyOperand {
            operator: "IN",
            column: "id".to_string(),
        };
        assert_eq!(err.to_string(), "Empty operand for IN on column id");

        let err = OrmError::RollbackOnly;
        assert!(err.to_string().contains("rollback-only"));

        let err = OrmError::UnbindableModel {
            table: "pairs".to_string(),
        };
        assert!(err.to_string().contains("composite primary key"));
    }

    #[test]
    fn test_executor_error_conversion() {
        let err: OrmError = ExecutorError::QueryError("boom".to_string()).into();
        assert!(err.to_string().contains("boom"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
