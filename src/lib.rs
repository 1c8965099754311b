//! A line-oriented TCP computation server.
//!
//! Clients send `;`-separated requests, one per line. Computation requests describe a
//! value space over named numeric ranges and a set of arithmetic expressions; the server
//! evaluates every expression at every point of the space and replies with a single
//! aggregate (MIN, MAX, AVG) or the number of points (COUNT). Stat requests report on the
//! computations served so far.
//!
//! ```text
//! > MAX_GRID;x:0:1:2;x+1
//! < OK;0.001;3.000000
//! > FOO
//! < ERR;(IllegalCommand) Unknown request type
//! ```

pub mod computation;
pub mod config;
pub mod connection;
pub mod errors;
pub mod expression;
pub mod handler;
pub mod pool;
pub mod request;
pub mod response;
pub mod server;
pub mod stats;

pub use computation::{Computation, ComputationOutcome, ValueSpace};
pub use config::ServerConfig;
pub use errors::{ProtocolError, ServerError};
pub use expression::Expression;
pub use request::{ComputationRequest, Request, RequestKind, StatRequest, VariableDomain};
pub use response::Response;
pub use server::ComputeServer;
pub use stats::StatsStore;
