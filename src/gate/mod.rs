//! Vote gate
//!
//! Request-handling front end: validates vote submissions, resolves the
//! target attribute and delegates to its rating store. The HTTP binding in
//! [`routes`] maps results onto status codes.

pub mod handler;
pub mod routes;

pub use handler::{ValidatedVote, VoteGate};
pub use routes::create_router;
