//! Stream endpoint construction

use url::Url;

use crate::constants::DEFAULT_WS_PATH;
use crate::error::ConfigError;

/// Build `<server><ws_path>?src=<source>` with a websocket scheme.
///
/// `http` maps to `ws` and `https` to `wss`. A path prefix on the server URL
/// is kept, so a server behind a reverse proxy at `/media/` resolves to
/// `/media/api/ws`.
pub fn stream_url(server_url: &str, ws_path: &str, source: &str) -> Result<Url, ConfigError> {
    let invalid = |reason: &str| ConfigError::InvalidUrl {
        url: server_url.to_string(),
        reason: reason.to_string(),
    };

    if source.is_empty() {
        return Err(ConfigError::Invalid {
            field: "stream.source",
            reason: "source name is empty".into(),
        });
    }

    let mut url = Url::parse(server_url).map_err(|e| invalid(&e.to_string()))?;
    let scheme = match url.scheme() {
        "ws" | "http" => "ws",
        "wss" | "https" => "wss",
        other => return Err(invalid(&format!("unsupported scheme {other}"))),
    };
    url.set_scheme(scheme)
        .map_err(|()| invalid("cannot switch to a websocket scheme"))?;

    let ws_path = if ws_path.is_empty() { DEFAULT_WS_PATH } else { ws_path };
    let path = format!(
        "{}/{}",
        url.path().trim_end_matches('/'),
        ws_path.trim_start_matches('/')
    );
    url.set_path(&path);
    url.set_fragment(None);
    url.query_pairs_mut().clear().append_pair("src", source);

    Ok(url)
}
