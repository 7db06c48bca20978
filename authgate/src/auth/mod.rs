//! Authentication and authorization: password hashing, session tokens,
//! identifier resolution, the login state machine and policy enforcement.

pub mod activation;
pub mod guard;
pub mod middleware;
pub mod password;
pub mod policy;
pub mod resolver;
pub mod session;
