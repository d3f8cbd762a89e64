//! API middleware stack.
//!
//! Execution order (outermost → innermost):
//! 1. Rate limiter — reject early, save resources
//! 2. Auth validator — session token lookup
//! 3. Audit logger — logs after auth, has user and centre

pub mod audit;
pub mod auth;
pub mod rate;
