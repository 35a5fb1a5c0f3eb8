//! Command line tool around the authentication caches.
//!
//! Resolves user names through the caching user resolution, backed by an in-memory metadata
//! authority. This is useful to try out cache configurations and to watch the cache at work in
//! the logs and metrics.

mod cli;

fn main() {
    match cli::execute() {
        Ok(()) => std::process::exit(0),
        Err(error) => {
            auth_cache::logging::ensure_log_error(&error);
            std::process::exit(1);
        }
    }
}
