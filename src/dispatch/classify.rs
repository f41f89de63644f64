//! Local-vs-public target classification.

/// How a target request leaves the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Called straight from the caller's own network context.
    Direct,
    /// Sent through the relay endpoint.
    Relay,
}

/// `true` when `url` mentions `localhost` or `127.0.0.1` anywhere.
///
/// Deliberately loose substring match: a port, path or query mentioning
/// either marker keeps the call on the caller's machine, where the relay
/// could not reach it anyway.
pub fn is_local_target(url: &str) -> bool {
    let url = url.to_ascii_lowercase();
    url.contains("localhost") || url.contains("127.0.0.1")
}

pub fn route_for(url: &str) -> Route {
    if is_local_target(url) {
        Route::Direct
    } else {
        Route::Relay
    }
}
