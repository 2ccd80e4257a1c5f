use std::num::NonZeroUsize;

pub const fn project_name() -> &'static str {
    "postbin"
}

/// Value of the `server` response header.
pub const fn server_identifier() -> &'static str {
    concat!("postbin/", env!("CARGO_PKG_VERSION"))
}

pub const DEFAULT_LISTEN_PORT: u16 = 4000;

/// Listen port taken from `POSTBIN_TOKEN_PORT` or `POSTBIN_PORT`,
/// whichever is set first, falling back to [`DEFAULT_LISTEN_PORT`].
pub fn compute_listen_port() -> u16 {
    listen_port_from_vars(
        std::env::var("POSTBIN_TOKEN_PORT").ok().as_deref(),
        std::env::var("POSTBIN_PORT").ok().as_deref(),
    )
}

fn listen_port_from_vars(token_port: Option<&str>, port: Option<&str>) -> u16 {
    token_port
        .or(port)
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(DEFAULT_LISTEN_PORT)
}

/// Worker thread count taken from `POSTBIN_SPAWN_COUNT`, at least one.
pub fn compute_worker_count() -> NonZeroUsize {
    worker_count_from_var(std::env::var("POSTBIN_SPAWN_COUNT").ok().as_deref())
}

fn worker_count_from_var(spawn_count: Option<&str>) -> NonZeroUsize {
    spawn_count
        .and_then(|v| v.trim().parse().ok())
        .and_then(NonZeroUsize::new)
        .unwrap_or(NonZeroUsize::MIN)
}
