//! Session cache and request authentication for the campus resource platform.
//!
//! Sessions are stored with their PII encrypted by a deterministic field
//! cipher and indexed by one-way search hashes. Requests authenticate with
//! a `sessionId` cookie or a bearer JWT bound to a live session.

pub mod config;
pub mod db;
pub mod error;
pub mod router;
pub mod state;

pub mod crypto {
    pub mod deterministic;
    pub mod jwt;
    pub mod password;
    pub mod token;
}

pub mod models {
    pub mod session;
    pub mod user;
}

pub mod repositories {
    pub mod memory;
    pub mod session;
    pub mod user;
}

pub mod services {
    pub mod auth;
    pub mod session;
    pub mod session_manager;
}

pub mod handlers {
    pub mod admin;
    pub mod auth;
}

pub mod middleware_layer {
    pub mod auth;
    pub mod rate_limit;
}

pub mod validation {
    pub mod auth;
}

#[cfg(test)]
mod test_support;
