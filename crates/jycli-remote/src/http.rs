use crate::{copy_with_cancel, ArtifactSource, CancelToken, RemoteError, RepositoryConfig};
use jycli_schema::{ArtifactKind, Coordinate};
use std::io::Write;
use std::time::Duration;
use tracing::debug;

/// A remote Maven repository reached over HTTP(S).
///
/// Files are requested at their standard layout path below the base URL:
/// `GET <url>/org/python/jython-slim/2.7.4/jython-slim-2.7.4.jar`.
pub struct HttpRepository {
    config: RepositoryConfig,
    agent: ureq::Agent,
}

impl HttpRepository {
    pub fn new(config: RepositoryConfig, timeout: Duration) -> Self {
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();
        Self { config, agent }
    }

    fn url(&self, coordinate: &Coordinate, kind: ArtifactKind) -> String {
        format!(
            "{}/{}",
            self.config.url,
            coordinate.repository_path(kind.extension())
        )
    }
}

impl ArtifactSource for HttpRepository {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn fetch(
        &self,
        coordinate: &Coordinate,
        kind: ArtifactKind,
        out: &mut dyn Write,
        cancel: &CancelToken,
    ) -> Result<u64, RemoteError> {
        cancel.check()?;
        let url = self.url(coordinate, kind);
        debug!("GET {url}");

        let mut req = self.agent.get(&url).header("User-Agent", crate::USER_AGENT);
        if let Some(ref token) = self.config.auth_token {
            req = req.header("Authorization", &format!("Bearer {token}"));
        }
        let not_found = || RemoteError::NotFound {
            coordinate: coordinate.clone(),
            kind,
            source_name: self.config.name.clone(),
        };
        let resp = match req.call() {
            Ok(r) => r,
            Err(ureq::Error::StatusCode(404 | 410)) => return Err(not_found()),
            Err(ureq::Error::StatusCode(code)) => {
                return Err(RemoteError::Http(format!("HTTP {code} for {url}")));
            }
            Err(e) => {
                return Err(RemoteError::Http(format!("{url}: {e}")));
            }
        };

        let code = resp.status().as_u16();
        if code == 404 || code == 410 {
            return Err(not_found());
        }
        if code >= 400 {
            return Err(RemoteError::Http(format!("HTTP {code} for {url}")));
        }

        let mut reader = resp.into_body().into_reader();
        let size = copy_with_cancel(&mut reader, out, cancel)?;
        debug!("GET {url}: {size} bytes");
        Ok(size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::{BufRead, BufReader};
    use std::net::TcpListener;
    use std::sync::{Arc, Mutex};

    /// A captured HTTP request for header inspection.
    #[derive(Debug, Clone)]
    struct CapturedRequest {
        path: String,
        headers: HashMap<String, String>,
    }

    /// Serves a fixed set of paths; everything else is 404.
    struct MockServer {
        addr: String,
        _handle: std::thread::JoinHandle<()>,
        requests: Arc<Mutex<Vec<CapturedRequest>>>,
    }

    impl MockServer {
        fn start(files: HashMap<String, Vec<u8>>) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            let addr = format!("http://{}", listener.local_addr().unwrap());
            let files = Arc::new(files);
            let requests: Arc<Mutex<Vec<CapturedRequest>>> = Arc::new(Mutex::new(Vec::new()));

            let requests_clone = Arc::clone(&requests);
            let handle = std::thread::spawn(move || {
                for stream in listener.incoming() {
                    let Ok(mut stream) = stream else { break };
                    let files = Arc::clone(&files);
                    let reqs = Arc::clone(&requests_clone);

                    std::thread::spawn(move || {
                        let mut reader = BufReader::new(stream.try_clone().unwrap());
                        let mut request_line = String::new();
                        if reader.read_line(&mut request_line).is_err() {
                            return;
                        }
                        let parts: Vec<&str> = request_line.trim().splitn(3, ' ').collect();
                        if parts.len() < 2 {
                            return;
                        }
                        let path = parts[1].to_owned();

                        let mut headers = HashMap::new();
                        loop {
                            let mut line = String::new();
                            if reader.read_line(&mut line).is_err() || line.trim().is_empty() {
                                break;
                            }
                            if let Some((k, v)) = line.trim().split_once(": ") {
                                headers.insert(k.to_lowercase(), v.to_owned());
                            }
                        }
                        reqs.lock().unwrap().push(CapturedRequest {
                            path: path.clone(),
                            headers,
                        });

                        let status = match path.as_str() {
                            p if p.starts_with("/broken/") => "500 Internal Server Error",
                            p if files.contains_key(p) => "200 OK",
                            _ => "404 Not Found",
                        };
                        let body = files.get(&path).cloned().unwrap_or_default();
                        let head = format!(
                            "HTTP/1.1 {status}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
                            body.len()
                        );
                        let _ = stream.write_all(head.as_bytes());
                        let _ = stream.write_all(&body);
                        let _ = stream.flush();
                    });
                }
            });

            MockServer {
                addr,
                _handle: handle,
                requests,
            }
        }

        fn captured_requests(&self) -> Vec<CapturedRequest> {
            self.requests.lock().unwrap().clone()
        }
    }

    fn coord() -> Coordinate {
        Coordinate::parse("org.python:jython-slim:2.7.4").unwrap()
    }

    fn repo(url: &str, token: Option<&str>) -> HttpRepository {
        let mut config = RepositoryConfig::new("test", url);
        if let Some(token) = token {
            config = config.with_token(token);
        }
        HttpRepository::new(config, Duration::from_secs(5))
    }

    fn serving_jar(bytes: &[u8]) -> MockServer {
        let mut files = HashMap::new();
        files.insert(
            "/org/python/jython-slim/2.7.4/jython-slim-2.7.4.jar".to_owned(),
            bytes.to_vec(),
        );
        MockServer::start(files)
    }

    #[test]
    fn http_fetches_from_maven_layout_path() {
        let server = serving_jar(b"jar bytes");
        let mut out = Vec::new();
        let n = repo(&server.addr, None)
            .fetch(&coord(), ArtifactKind::Jar, &mut out, &CancelToken::new())
            .unwrap();
        assert_eq!(n, 9);
        assert_eq!(out, b"jar bytes");
    }

    #[test]
    fn http_large_body_is_streamed_whole() {
        let body = vec![0x5Au8; crate::CHUNK_SIZE * 3 + 17];
        let server = serving_jar(&body);
        let mut out = Vec::new();
        repo(&server.addr, None)
            .fetch(&coord(), ArtifactKind::Jar, &mut out, &CancelToken::new())
            .unwrap();
        assert_eq!(out.len(), body.len());
    }

    #[test]
    fn http_404_is_not_found() {
        let server = serving_jar(b"jar");
        let err = repo(&server.addr, None)
            .fetch(&coord(), ArtifactKind::Pom, &mut Vec::new(), &CancelToken::new())
            .unwrap_err();
        assert!(err.is_not_found(), "{err}");
    }

    #[test]
    fn http_server_error_is_not_not_found() {
        let server = MockServer::start(HashMap::new());
        let c = Coordinate::parse("broken:lib:1").unwrap();
        let err = repo(&server.addr, None)
            .fetch(&c, ArtifactKind::Jar, &mut Vec::new(), &CancelToken::new())
            .unwrap_err();
        assert!(!err.is_not_found(), "{err}");
        assert!(err.to_string().contains("500"), "{err}");
    }

    #[test]
    fn http_connection_refused_returns_error() {
        let err = repo("http://127.0.0.1:1", None)
            .fetch(&coord(), ArtifactKind::Jar, &mut Vec::new(), &CancelToken::new())
            .unwrap_err();
        assert!(matches!(err, RemoteError::Http(_)));
    }

    #[test]
    fn http_cancelled_token_makes_no_request() {
        let server = serving_jar(b"jar");
        let token = CancelToken::new();
        token.cancel();
        let err = repo(&server.addr, None)
            .fetch(&coord(), ArtifactKind::Jar, &mut Vec::new(), &token)
            .unwrap_err();
        assert!(matches!(err, RemoteError::Interrupted(_)));
        assert!(server.captured_requests().is_empty());
    }

    #[test]
    fn http_sends_bearer_token() {
        let server = serving_jar(b"jar");
        repo(&server.addr, Some("secret-token-42"))
            .fetch(&coord(), ArtifactKind::Jar, &mut Vec::new(), &CancelToken::new())
            .unwrap();

        let reqs = server.captured_requests();
        assert_eq!(reqs.len(), 1);
        assert_eq!(
            reqs[0].headers.get("authorization"),
            Some(&"Bearer secret-token-42".to_owned())
        );
    }

    #[test]
    fn http_no_auth_header_without_token() {
        let server = serving_jar(b"jar");
        repo(&server.addr, None)
            .fetch(&coord(), ArtifactKind::Jar, &mut Vec::new(), &CancelToken::new())
            .unwrap();
        let reqs = server.captured_requests();
        assert!(!reqs[0].headers.contains_key("authorization"));
        assert_eq!(
            reqs[0].path,
            "/org/python/jython-slim/2.7.4/jython-slim-2.7.4.jar"
        );
    }
}
