//! HTTP transports for the Incus API: a local Unix socket or a remote HTTPS
//! endpoint.

use bytes::Bytes;
use camino::{Utf8Path, Utf8PathBuf};
use http_body_util::{BodyExt, Full};
use hyper::client::conn::http1;
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::debug;

use super::IncusError;

/// HTTP verbs used by the client.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Verb {
    Get,
    Post,
    Put,
    Delete,
}

impl Verb {
    fn as_hyper(self) -> hyper::Method {
        match self {
            Self::Get => hyper::Method::GET,
            Self::Post => hyper::Method::POST,
            Self::Put => hyper::Method::PUT,
            Self::Delete => hyper::Method::DELETE,
        }
    }

    fn as_reqwest(self) -> reqwest::Method {
        match self {
            Self::Get => reqwest::Method::GET,
            Self::Post => reqwest::Method::POST,
            Self::Put => reqwest::Method::PUT,
            Self::Delete => reqwest::Method::DELETE,
        }
    }
}

/// Status and body of a completed HTTP exchange.
#[derive(Clone, Debug)]
pub(crate) struct RawResponse {
    pub(crate) status: u16,
    pub(crate) body: Bytes,
}

/// Connection target for the client.
#[derive(Clone, Debug)]
pub(crate) enum Transport {
    /// HTTP over the daemon's Unix socket; one connection per request.
    Local { socket: Utf8PathBuf },
    /// HTTPS to a remote daemon.
    Remote {
        http: reqwest::Client,
        base_url: String,
    },
}

impl Transport {
    /// Sends one request. `path` includes the query string.
    pub(crate) async fn send(
        &self,
        verb: Verb,
        path: &str,
        body: Option<Vec<u8>>,
    ) -> Result<RawResponse, IncusError> {
        match self {
            Self::Local { socket } => send_local(socket, verb, path, body).await,
            Self::Remote { http, base_url } => {
                send_remote(http, base_url, verb, path, body).await
            }
        }
    }
}

async fn send_local(
    socket: &Utf8Path,
    verb: Verb,
    path: &str,
    body: Option<Vec<u8>>,
) -> Result<RawResponse, IncusError> {
    let stream = UnixStream::connect(socket.as_std_path())
        .await
        .map_err(|err| IncusError::Transport {
            message: format!("dial unix {socket}: {err}"),
        })?;

    let (mut sender, connection) = http1::handshake::<_, Full<Bytes>>(TokioIo::new(stream))
        .await
        .map_err(IncusError::transport)?;
    tokio::spawn(async move {
        if let Err(err) = connection.await {
            debug!(error = %err, "incus socket connection closed with error");
        }
    });

    let request = hyper::Request::builder()
        .method(verb.as_hyper())
        .uri(path)
        .header(hyper::header::HOST, "incus")
        .header(hyper::header::CONTENT_TYPE, "application/json")
        .body(Full::new(Bytes::from(body.unwrap_or_default())))
        .map_err(IncusError::transport)?;

    let response = sender
        .send_request(request)
        .await
        .map_err(IncusError::transport)?;
    let status = response.status().as_u16();
    let bytes = response
        .into_body()
        .collect()
        .await
        .map_err(IncusError::transport)?
        .to_bytes();

    Ok(RawResponse {
        status,
        body: bytes,
    })
}

async fn send_remote(
    http: &reqwest::Client,
    base_url: &str,
    verb: Verb,
    path: &str,
    body: Option<Vec<u8>>,
) -> Result<RawResponse, IncusError> {
    let url = format!("{}{path}", base_url.trim_end_matches('/'));
    let mut request = http.request(verb.as_reqwest(), &url);
    if let Some(payload) = body {
        request = request
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(payload);
    }

    let response = request.send().await.map_err(IncusError::transport)?;
    let status = response.status().as_u16();
    let bytes = response.bytes().await.map_err(IncusError::transport)?;

    Ok(RawResponse {
        status,
        body: bytes,
    })
}
