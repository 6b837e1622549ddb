use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid socket base URL: {0}")]
    InvalidBase(#[source] url::ParseError),
    #[error("socket base URL must use ws:// or wss://, got '{0}'")]
    UnsupportedScheme(String),
}

/// Build the socket URL for one session: base address plus bearer token
/// and canonical room ID as query parameters. The pair is bound at
/// connect time; a token or room change means teardown and reconnect.
pub fn build_socket_url(
    base: &str,
    token: Option<&str>,
    canonical_room: &str,
) -> Result<Url, EndpointError> {
    let mut url = Url::parse(base).map_err(EndpointError::InvalidBase)?;
    match url.scheme() {
        "ws" | "wss" => {}
        other => return Err(EndpointError::UnsupportedScheme(other.to_owned())),
    }

    url.set_query(None);
    {
        let mut pairs = url.query_pairs_mut();
        if let Some(token) = token {
            pairs.append_pair("token", token);
        }
        pairs.append_pair("room_id", canonical_room);
    }
    Ok(url)
}
