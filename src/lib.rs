//! Rate-limited, input-filtering proxy in front of a chat completion API.
//!
//! `POST /` takes `{"message": "..."}`, checks the caller against a
//! per-client limiter, validates the text against a prompt-injection
//! denylist and forwards it with a fixed system prompt. The reply comes
//! back as `{"reply": "..."}`; every failure is a JSON `{"error": "..."}`.

pub mod config;
pub mod error;
pub mod logging;
pub mod message;
pub mod routes;
pub mod services;
pub mod state;
