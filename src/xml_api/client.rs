//! Blocking HTTP client for the XML API.

use super::headers::flash_player_headers;
use super::{DescriptorResponse, DescriptorSource, Episode, RequestKind, query_params};
use crate::{CrError, ErrorStage, SessionContext};
use reqwest::blocking::{Client, Request};
use reqwest::header::{COOKIE, HeaderValue};
use std::time::Duration;
use tracing::{debug, warn};

/// Endpoint every XML API request is posted to
pub const DEFAULT_ENDPOINT: &str = "http://www.crunchyroll.com/xml/";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Client for the XML API.
///
/// Each call performs exactly one POST, without retries, and returns the
/// response body as it was received.
pub struct XmlApiClient {
    http: Client,
    endpoint: String,
}

impl XmlApiClient {
    /// Creates a client for the public endpoint with the default deadline
    pub fn new() -> Result<Self, CrError> {
        Self::with_endpoint(DEFAULT_ENDPOINT, DEFAULT_TIMEOUT)
    }

    /// Creates a client posting to a custom endpoint
    ///
    /// # Arguments
    ///
    /// * `endpoint` - Full URL every request is posted to, including the `/xml/` path
    /// * `timeout` - Deadline for a whole call, from connect to the last body byte
    ///
    /// # Returns
    ///
    /// The client, or a `BuildRequest` error if the HTTP client cannot be set up
    pub fn with_endpoint(endpoint: impl Into<String>, timeout: Duration) -> Result<Self, CrError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CrError::new(ErrorStage::BuildRequest, e))?;
        Ok(Self {
            http,
            endpoint: endpoint.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Constructs the request for `kind` without sending it
    ///
    /// The request carries the kind's query parameters, the spoofed player
    /// headers, every session cookie and the `current_page` form body.
    ///
    /// # Arguments
    ///
    /// * `kind` - Which descriptor to ask for
    /// * `episode` - Supplies the media and subtitle ids and the page URL
    /// * `session` - Cookies to attach, none is fine
    ///
    /// # Returns
    ///
    /// The ready-to-send request, or a `BuildRequest` error when a cookie
    /// cannot be used as a header value
    pub fn build_request(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<Request, CrError> {
        let mut builder = self
            .http
            .post(&self.endpoint)
            .query(&query_params(kind, episode))
            .headers(flash_player_headers());

        if let Some(cookies) = session.cookie_header() {
            let value = HeaderValue::from_str(&cookies)
                .map_err(|e| CrError::new(ErrorStage::BuildRequest, e))?;
            builder = builder.header(COOKIE, value);
        }

        // form() replaces the content type from the header table, keeping a single value
        builder
            .form(&[("current_page", episode.url.as_str())])
            .build()
            .map_err(|e| CrError::new(ErrorStage::BuildRequest, e))
    }

    /// Sends one request and returns the status together with the raw body
    pub fn fetch_descriptor_response(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<DescriptorResponse, CrError> {
        let request = self.build_request(kind, episode, session)?;
        debug!(
            request = %kind,
            media_id = episode.id,
            cookies = session.cookies.len(),
            "Posting XML API request"
        );

        let response = self
            .http
            .execute(request)
            .map_err(|e| CrError::new(ErrorStage::SendRequest, e))?;

        let status = response.status();
        if !status.is_success() {
            warn!(
                request = %kind,
                status = status.as_u16(),
                "XML API answered with a non-success status"
            );
        }

        let body = response
            .text()
            .map_err(|e| CrError::new(ErrorStage::ReadResponse, e))?;
        Ok(DescriptorResponse::new(status.as_u16(), body))
    }

    /// Fetches one descriptor and returns the raw response body
    ///
    /// # Arguments
    ///
    /// * `kind` - Which descriptor to ask for
    /// * `episode` - Supplies the media and subtitle ids and the page URL
    /// * `session` - Cookies to attach, none is fine
    ///
    /// # Returns
    ///
    /// The body exactly as received, whatever the HTTP status was. Errors are
    /// tagged `BuildRequest`, `SendRequest` or `ReadResponse` depending on
    /// where the call failed.
    pub fn fetch_descriptor(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<String, CrError> {
        self.fetch_descriptor_response(kind, episode, session)
            .map(|response| response.body)
    }
}

impl DescriptorSource for XmlApiClient {
    fn fetch_response(
        &self,
        kind: &RequestKind,
        episode: &Episode,
        session: &SessionContext,
    ) -> Result<DescriptorResponse, CrError> {
        self.fetch_descriptor_response(kind, episode, session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{SessionCookie, Subtitle};
    use std::io::{Read, Write};
    use std::net::{Shutdown, TcpListener};
    use std::thread;
    use wiremock::matchers::{body_string, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn episode() -> Episode {
        Episode {
            id: 645_123,
            url: "/naruto/episode-1-645123".to_string(),
            subtitle: Subtitle { id: 77 },
        }
    }

    fn session() -> SessionContext {
        SessionContext::with_cookies(vec![
            SessionCookie::new("sess_id", "abc123"),
            SessionCookie::new("c_locale", "enUS"),
        ])
    }

    fn query_pairs(request: &Request) -> Vec<(String, String)> {
        request
            .url()
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    /// Answers one request with a body shorter than its announced length
    fn truncated_body_server() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let endpoint = format!("http://{}/xml/", listener.local_addr().unwrap());

        thread::spawn(move || {
            let (mut stream, _) = listener.accept().unwrap();
            let mut raw = Vec::new();
            let mut buf = [0u8; 4096];
            while !raw.windows(4).any(|w| w == b"\r\n\r\n") {
                match stream.read(&mut buf) {
                    Ok(0) | Err(_) => return,
                    Ok(n) => raw.extend_from_slice(&buf[..n]),
                }
            }
            stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 100\r\n\r\nshort")
                .unwrap();
            stream.shutdown(Shutdown::Write).unwrap();
            // Keep the socket open until the client gives up on the body
            while matches!(stream.read(&mut buf), Ok(n) if n > 0) {}
        });

        endpoint
    }

    #[test]
    fn test_build_subtitle_request() {
        let client = XmlApiClient::new().unwrap();
        let request = client
            .build_request(&RequestKind::SubtitleDescriptor, &episode(), &session())
            .unwrap();

        assert_eq!(request.method(), &reqwest::Method::POST);
        assert_eq!(request.url().path(), "/xml/");
        assert_eq!(
            query_pairs(&request),
            vec![
                ("req".to_string(), "RpcApiSubtitle_GetXml".to_string()),
                ("subtitle_script_id".to_string(), "77".to_string()),
            ]
        );
    }

    #[test]
    fn test_build_request_attaches_spoofed_headers_and_cookies() {
        let client = XmlApiClient::new().unwrap();
        let request = client
            .build_request(&RequestKind::StandardPlayerConfig, &episode(), &session())
            .unwrap();
        let headers = request.headers();

        for (name, value) in super::super::FLASH_PLAYER_HEADERS {
            assert_eq!(headers.get_all(*name).iter().count(), 1, "header {name}");
            assert_eq!(headers.get(*name).unwrap(), value);
        }
        assert_eq!(
            headers.get(COOKIE).unwrap(),
            "sess_id=abc123; c_locale=enUS"
        );

        let body = request.body().and_then(|b| b.as_bytes()).unwrap();
        assert_eq!(body, b"current_page=%2Fnaruto%2Fepisode-1-645123");
    }

    #[test]
    fn test_build_request_without_cookies() {
        let client = XmlApiClient::new().unwrap();
        let request = client
            .build_request(&RequestKind::default(), &episode(), &SessionContext::default())
            .unwrap();

        assert!(request.headers().get(COOKIE).is_none());
        assert!(
            query_pairs(&request)
                .contains(&("req".to_string(), "RpcApiVideoEncode_GetStreamInfo".to_string()))
        );
    }

    #[test]
    fn test_build_request_rejects_invalid_cookie() {
        let client = XmlApiClient::new().unwrap();
        let session = SessionContext::with_cookies(vec![SessionCookie::new("bad", "line\nbreak")]);

        let err = client
            .build_request(&RequestKind::SubtitleDescriptor, &episode(), &session)
            .unwrap_err();
        assert_eq!(err.stage(), ErrorStage::BuildRequest);
    }

    #[tokio::test]
    async fn test_fetch_descriptor_sends_query_headers_cookies_and_form() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xml/"))
            .and(query_param("req", "RpcApiVideoPlayer_GetStandardConfig"))
            .and(query_param("media_id", "645123"))
            .and(header("cookie", "sess_id=abc123; c_locale=enUS"))
            .and(header("x-requested-with", "ShockwaveFlash/19.0.0.245"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("current_page=%2Fnaruto%2Fepisode-1-645123"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_string("<config><media_id>645123</media_id></config>"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/xml/", server.uri());
        // The blocking client owns a runtime, so it lives and dies off the async executor
        let body = tokio::task::spawn_blocking(move || {
            let client = XmlApiClient::with_endpoint(endpoint, Duration::from_secs(5))?;
            client.fetch_descriptor(&RequestKind::StandardPlayerConfig, &episode(), &session())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(body, "<config><media_id>645123</media_id></config>");
    }

    #[tokio::test]
    async fn test_fetch_descriptor_without_cookies_still_sends() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xml/"))
            .and(query_param("req", "RpcApiSubtitle_GetXml"))
            .and(query_param("subtitle_script_id", "77"))
            .respond_with(ResponseTemplate::new(200).set_body_string("<error/>"))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/xml/", server.uri());
        let body = tokio::task::spawn_blocking(move || {
            let client = XmlApiClient::with_endpoint(endpoint, Duration::from_secs(5))?;
            client.fetch_descriptor(
                &RequestKind::SubtitleDescriptor,
                &episode(),
                &SessionContext::default(),
            )
        })
        .await
        .unwrap()
        .unwrap();
        assert_eq!(body, "<error/>");

        let requests = server.received_requests().await.unwrap();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].headers.get("cookie").is_none());
    }

    #[tokio::test]
    async fn test_fetch_descriptor_response_keeps_error_status() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/xml/"))
            .respond_with(ResponseTemplate::new(503).set_body_string("<error>maintenance</error>"))
            .expect(1)
            .mount(&server)
            .await;

        let endpoint = format!("{}/xml/", server.uri());
        let response = tokio::task::spawn_blocking(move || {
            let client = XmlApiClient::with_endpoint(endpoint, Duration::from_secs(5))?;
            client.fetch_descriptor_response(&RequestKind::SubtitleDescriptor, &episode(), &session())
        })
        .await
        .unwrap()
        .unwrap();

        assert_eq!(response, DescriptorResponse::new(503, "<error>maintenance</error>"));
        assert!(!response.is_cacheable());
    }

    #[test]
    fn test_fetch_descriptor_truncated_body() {
        let client =
            XmlApiClient::with_endpoint(truncated_body_server(), Duration::from_secs(5)).unwrap();

        let err = client
            .fetch_descriptor(&RequestKind::SubtitleDescriptor, &episode(), &session())
            .unwrap_err();
        assert_eq!(err.stage(), ErrorStage::ReadResponse);
    }

    #[test]
    fn test_fetch_descriptor_transport_failure() {
        // Bind then drop to get a port nobody listens on
        let port = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .port();
        let client = XmlApiClient::with_endpoint(
            format!("http://127.0.0.1:{port}/xml/"),
            Duration::from_secs(5),
        )
        .unwrap();

        let err = client
            .fetch_descriptor(&RequestKind::SubtitleDescriptor, &episode(), &session())
            .unwrap_err();
        assert_eq!(err.stage(), ErrorStage::SendRequest);
    }
}
