//! ydbkit - session pooling, transactions and typed values for a query service client.
//!
//! The crate drives a remote query service through the [`Driver`] trait:
//!
//! - [`SessionPool`] lends server-side sessions with admission control and retries
//! - [`Tx`] / [`TxHandle`] run one transaction on one session
//! - [`QueryClient`] wraps begin, query execution and commit/rollback into one call
//! - [`YdbValue`] marshals typed values, including decimals and nested optionals

pub mod driver;
pub mod error;
pub mod pool;
pub mod protocol;
pub mod query;
pub mod session;
pub mod settings;
pub mod status;
pub mod tx;
pub mod value;

#[cfg(test)]
mod test_support;

pub use driver::{Driver, ResponseStream, TransportError};
pub use error::{Error, Result};
pub use pool::{ExecOnSession, PooledSession, SessionPool, SessionPoolConfig};
pub use query::{ExecuteQueryStream, QueryClient, QueryClientConfig, QueryResponse};
pub use session::{Session, SessionState};
pub use settings::{ExecMode, ExecuteQuerySettings, RequestSettings, RetrySettings, StatsMode, Syntax};
pub use status::{Issue, IssueSeverity, Status, StatusCode};
pub use tx::{Tx, TxHandle, TxMode, TxRpcKind, TxState};
pub use value::{Decimal, Params, ResultSet, Row, Type, YdbValue};
