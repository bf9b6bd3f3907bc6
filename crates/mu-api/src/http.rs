//! reqwest-backed transport
//!
//! Holds the cookie jar, so an HTTP-only refresh cookie set by the login
//! endpoint rides along on later refresh and logout calls without the client
//! ever reading it.

use async_trait::async_trait;
use mu_core::{
    ApiRequest, ApiResponse, ClientConfig, FormPart, FormValue, Method, RequestBody, Transport,
    UnmixError, UnmixResult,
};
use reqwest::multipart::{Form, Part};
use url::Url;

pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> UnmixResult<Self> {
        Url::parse(&config.api_base)
            .map_err(|e| UnmixError::Config(format!("invalid api_base '{}': {}", config.api_base, e)))?;

        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| UnmixError::Config(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base: config.api_base.trim_end_matches('/').to_string(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Paths are appended verbatim so a base with a path prefix keeps it.
    pub fn url_for(&self, path: &str) -> UnmixResult<Url> {
        let joined = if path.starts_with('/') {
            format!("{}{}", self.base, path)
        } else {
            format!("{}/{}", self.base, path)
        };
        Url::parse(&joined).map_err(|e| UnmixError::Config(format!("invalid URL '{}': {}", joined, e)))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: &ApiRequest) -> UnmixResult<ApiResponse> {
        let url = self.url_for(&request.path)?;
        let mut builder = self.client.request(to_reqwest(request.method), url);

        if let Some(token) = &request.bearer {
            builder = builder.bearer_auth(token);
        }
        builder = match &request.body {
            RequestBody::Empty => builder,
            RequestBody::Json(value) => builder.json(value),
            RequestBody::Multipart(parts) => builder.multipart(build_form(parts)?),
        };

        let response = builder.send().await.map_err(|e| {
            log::debug!("[Http] {} {} failed: {}", request.method.as_str(), request.path, e);
            UnmixError::Transient(describe(&e))
        })?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| UnmixError::Transient(format!("failed to read response body: {}", e)))?
            .to_vec();

        log::debug!(
            "[Http] {} {} -> {} ({} bytes)",
            request.method.as_str(),
            request.path,
            status,
            body.len()
        );

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

fn to_reqwest(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Patch => reqwest::Method::PATCH,
        Method::Delete => reqwest::Method::DELETE,
    }
}

fn build_form(parts: &[FormPart]) -> UnmixResult<Form> {
    let mut form = Form::new();
    for part in parts {
        form = match &part.value {
            FormValue::Text(text) => form.text(part.name.clone(), text.clone()),
            FormValue::File {
                file_name,
                mime,
                bytes,
            } => {
                let mut file = Part::bytes(bytes.clone()).file_name(file_name.clone());
                if let Some(mime) = mime {
                    file = file
                        .mime_str(mime)
                        .map_err(|e| UnmixError::Serialization(format!("bad MIME type '{}': {}", mime, e)))?;
                }
                form.part(part.name.clone(), file)
            }
        };
    }
    Ok(form)
}

fn describe(err: &reqwest::Error) -> String {
    if err.is_timeout() {
        "request timed out".to_string()
    } else if err.is_connect() {
        format!("could not reach the server: {}", err)
    } else {
        format!("network error: {}", err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport(base: &str) -> HttpTransport {
        let config = ClientConfig {
            api_base: base.to_string(),
            ..Default::default()
        };
        HttpTransport::new(&config).unwrap()
    }

    #[test]
    fn test_url_join_keeps_prefix() {
        let http = transport("https://example.com/backend/");
        assert_eq!(
            http.url_for("/api/users/me/").unwrap().as_str(),
            "https://example.com/backend/api/users/me/"
        );
    }

    #[test]
    fn test_rejects_invalid_base() {
        let config = ClientConfig {
            api_base: "not a url".to_string(),
            ..Default::default()
        };
        assert!(matches!(HttpTransport::new(&config), Err(UnmixError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_transient() {
        // Port 9 (discard) on localhost is closed in test environments
        let http = transport("http://127.0.0.1:9");
        let err = http.send(&ApiRequest::get("/api/users/me/")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[test]
    fn test_multipart_form_builds() {
        let parts = vec![
            FormPart::text("duracion", "181"),
            FormPart::file("archivo", "song.mp3", Some("audio/mpeg".into()), vec![1, 2, 3]),
        ];
        assert!(build_form(&parts).is_ok());

        let bad = vec![FormPart::file("archivo", "x", Some("not a mime".into()), vec![])];
        assert!(build_form(&bad).is_err());
    }
}
