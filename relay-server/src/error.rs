//! Fatal startup errors. Everything else in this server is recoverable —
//! see `spec.md` §7 — so this is the only error type in the codebase that
//! ever reaches `main` as an `Err`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("invalid {name} environment variable {value:?}: {source}")]
    InvalidEnvVar {
        name: &'static str,
        value: String,
        #[source]
        source: std::num::ParseIntError,
    },

    #[error("failed to bind listener on port {port}: {source}")]
    BindFailed {
        port: u16,
        #[source]
        source: std::io::Error,
    },
}
