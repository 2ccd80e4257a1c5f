//! Library for postbin containing its request simulation core.
//!
//! The binary crate only wires this up to a listener, which keeps
//! every behaviour testable by driving the [`dispatch::PostbinService`]
//! with in-memory requests.

#![cfg_attr(
    not(test),
    warn(clippy::print_stdout, clippy::dbg_macro),
    deny(clippy::unwrap_used, clippy::expect_used)
)]

pub mod dispatch;
pub mod http;
pub mod pipeline;
pub mod simulate;
pub mod token;
pub mod utils;
