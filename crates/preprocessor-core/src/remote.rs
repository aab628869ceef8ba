//! Blocking client for the remote configuration endpoint
//!
//! The endpoint serves a config document on GET and accepts form posts with
//! a `json_config` field (saved configuration) or `json_config` plus
//! `json_result` (run log). Requests are sent once, without retries.

use reqwest::blocking::{Client, RequestBuilder, Response};
use std::fmt;

use crate::config::{ConfigDocument, LoadedConfig};
use crate::error::{Error, Result};

/// Basic-auth credentials for the endpoint
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    /// User name
    pub username: String,
    /// Password
    pub password: String,
}

impl Credentials {
    /// Credentials are only used when both halves are present
    pub fn from_parts(username: Option<&str>, password: Option<&str>) -> Option<Self> {
        match (username, password) {
            (Some(username), Some(password)) => Some(Self {
                username: username.to_string(),
                password: password.to_string(),
            }),
            _ => None,
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// HTTP client bound to one set of credentials
pub struct RemoteClient {
    client: Client,
    credentials: Option<Credentials>,
}

impl RemoteClient {
    /// Create a client with the transport's default timeout
    pub fn new(credentials: Option<Credentials>) -> Result<Self> {
        let client = Client::builder().build().map_err(|e| Error::Remote {
            url: String::new(),
            message: e.to_string(),
        })?;
        Ok(Self { client, credentials })
    }

    /// Fetch a flat config document
    pub fn load_config(&self, url: &str) -> Result<LoadedConfig> {
        let response = self.send(url, self.client.get(url))?;
        let bytes = response.bytes().map_err(|e| remote_error(url, e))?;
        let loaded = LoadedConfig::from_bytes(&bytes, url)?;
        tracing::debug!("Fetched {} keys from {}", loaded.document.len(), url);
        Ok(loaded)
    }

    /// Post a saved configuration
    pub fn save_config(&self, url: &str, config: &ConfigDocument) -> Result<()> {
        let form = [("json_config", serde_json::to_string(config)?)];
        self.send(url, self.client.post(url).form(&form))?;
        Ok(())
    }

    /// Post a configuration together with its run record
    pub fn log(&self, url: &str, config: &ConfigDocument, result: &ConfigDocument) -> Result<()> {
        let form = [
            ("json_config", serde_json::to_string(config)?),
            ("json_result", serde_json::to_string(result)?),
        ];
        self.send(url, self.client.post(url).form(&form))?;
        Ok(())
    }

    fn send(&self, url: &str, request: RequestBuilder) -> Result<Response> {
        let request = match &self.credentials {
            Some(c) => request.basic_auth(&c.username, Some(&c.password)),
            None => request,
        };
        request
            .send()
            .and_then(Response::error_for_status)
            .map_err(|e| remote_error(url, e))
    }
}

fn remote_error(url: &str, e: reqwest::Error) -> Error {
    Error::Remote {
        url: url.to_string(),
        message: e.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, BufReader, Read, Write};
    use std::net::TcpListener;
    use std::sync::mpsc;
    use std::thread;

    /// Serve one canned response and hand back the raw request
    fn one_shot(status: &str, body: &str) -> (String, mpsc::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/config", listener.local_addr().unwrap());
        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            body.len(),
            body
        );
        let (tx, rx) = mpsc::channel();

        thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = BufReader::new(stream);
            let mut head = String::new();
            let mut content_length = 0;
            loop {
                let mut line = String::new();
                reader.read_line(&mut line).unwrap();
                if let Some((name, value)) = line.split_once(':') {
                    if name.eq_ignore_ascii_case("content-length") {
                        content_length = value.trim().parse().unwrap();
                    }
                }
                head.push_str(&line);
                if line == "\r\n" || line.is_empty() {
                    break;
                }
            }
            let mut body = vec![0; content_length];
            reader.read_exact(&mut body).unwrap();
            head.push_str(&String::from_utf8_lossy(&body));

            reader.get_mut().write_all(response.as_bytes()).unwrap();
            tx.send(head).unwrap();
        });

        (url, rx)
    }

    #[test]
    fn test_load_config_with_basic_auth() {
        let (url, rx) = one_shot("200 OK", r#"{"plugin": "unbiaser", "window_size": 7}"#);
        let credentials = Credentials::from_parts(Some("alice"), Some("secret"));
        let client = RemoteClient::new(credentials).unwrap();

        let loaded = client.load_config(&url).unwrap();
        let document = &loaded.document;
        assert_eq!(document["plugin"], "unbiaser");
        assert_eq!(loaded.source.location, url);
        assert_eq!(document["window_size"], 7);

        let request = rx.recv().unwrap();
        assert!(request.starts_with("GET /config"));
        // base64("alice:secret")
        assert!(request.contains("YWxpY2U6c2VjcmV0"));
    }

    #[test]
    fn test_save_config_posts_form_field() {
        let (url, rx) = one_shot("200 OK", "{}");
        let client = RemoteClient::new(None).unwrap();

        let mut config = ConfigDocument::new();
        config.insert("plugin".into(), "cleaner".into());
        client.save_config(&url, &config).unwrap();

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /config"));
        assert!(!request.to_lowercase().contains("authorization"));
        assert!(request.contains("json_config="));
        assert!(request.contains("cleaner"));
    }

    #[test]
    fn test_log_posts_config_and_result() {
        let (url, rx) = one_shot("200 OK", "{}");
        let client = RemoteClient::new(Credentials::from_parts(Some("alice"), Some("secret"))).unwrap();

        let mut config = ConfigDocument::new();
        config.insert("plugin".into(), "trimmer".into());
        let mut result = ConfigDocument::new();
        result.insert("output_rows".into(), 42.into());
        client.log(&url, &config, &result).unwrap();

        let request = rx.recv().unwrap();
        assert!(request.starts_with("POST /config"));
        assert!(request.contains("YWxpY2U6c2VjcmV0"));
        let body = request.rsplit("\r\n\r\n").next().unwrap();
        assert!(body.contains("json_config="));
        assert!(body.contains("json_result="));
        assert!(body.contains("trimmer"));
        assert!(body.contains("output_rows"));
    }

    #[test]
    fn test_non_success_status_is_error() {
        let (url, _rx) = one_shot("500 Internal Server Error", "oops");
        let client = RemoteClient::new(None).unwrap();

        let err = client.load_config(&url).unwrap_err();
        assert!(matches!(err, Error::Remote { .. }));
    }

    #[test]
    fn test_connection_refused_is_error() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let url = format!("http://{}/config", listener.local_addr().unwrap());
        drop(listener);

        let client = RemoteClient::new(None).unwrap();
        let err = client.save_config(&url, &ConfigDocument::new()).unwrap_err();
        assert!(err.to_string().contains(&url));
    }

    #[test]
    fn test_credentials_need_both_parts() {
        assert!(Credentials::from_parts(Some("alice"), None).is_none());
        let shown = format!("{:?}", Credentials::from_parts(Some("a"), Some("pw")).unwrap());
        assert!(!shown.contains("pw"));
    }
}
