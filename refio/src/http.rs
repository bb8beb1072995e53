use std::collections::BTreeMap;
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use tracing::{debug, warn};
use url::Url;

use crate::constant::user_agent;
use crate::{ReadError, ReadRequest, Reader};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_REDIRECTS: usize = 5;

/// Settings for downloading documents over HTTP(S).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpOptions {
    pub timeout: Duration,
    /// Maximum number of redirects followed before giving up.
    pub redirects: usize,
    pub headers: BTreeMap<String, String>,
}

impl Default for HttpOptions {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            redirects: DEFAULT_REDIRECTS,
            headers: BTreeMap::new(),
        }
    }
}

/// Reads `http://` and `https://` URLs. Redirects are followed by hand so the
/// whole chain can be reported when the limit is exceeded.
pub struct HttpReader {
    options: HttpOptions,
}

impl HttpReader {
    pub fn new(options: HttpOptions) -> Self {
        Self { options }
    }

    fn client(&self, url: &Url) -> Result<reqwest::Client, ReadError> {
        let mut headers = HeaderMap::new();
        if let Ok(agent) = HeaderValue::from_str(&user_agent()) {
            headers.insert(reqwest::header::USER_AGENT, agent);
        }
        for (key, value) in &self.options.headers {
            match (
                HeaderName::from_bytes(key.as_bytes()),
                HeaderValue::from_str(value),
            ) {
                (Ok(name), Ok(val)) => {
                    headers.insert(name, val);
                }
                _ => warn!("Skipping invalid HTTP header {key}"),
            }
        }

        reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .timeout(self.options.timeout)
            .default_headers(headers)
            .build()
            .map_err(|err| ReadError::Download {
                url: url.to_string(),
                message: err.to_string(),
            })
    }

    fn timeout_ms(&self) -> u64 {
        u64::try_from(self.options.timeout.as_millis()).unwrap_or(u64::MAX)
    }
}

#[async_trait::async_trait]
impl Reader for HttpReader {
    fn name(&self) -> &str {
        "http"
    }

    fn order(&self) -> i32 {
        200
    }

    fn can_read(&self, request: &ReadRequest) -> bool {
        matches!(request.url.scheme(), "http" | "https")
    }

    async fn read(&self, request: &ReadRequest) -> Result<Vec<u8>, ReadError> {
        let client = self.client(&request.url)?;
        let mut current = request.url.clone();
        current.set_fragment(None);
        let mut chain: Vec<String> = Vec::new();

        loop {
            chain.push(current.to_string());
            debug!("GET {current}");
            let resp = match client.get(current.clone()).send().await {
                Ok(resp) => resp,
                Err(err) if err.is_timeout() => {
                    return Err(ReadError::Timeout {
                        url: current.to_string(),
                        timeout_ms: self.timeout_ms(),
                    });
                }
                Err(err) => {
                    return Err(ReadError::Download {
                        url: current.to_string(),
                        message: err.to_string(),
                    });
                }
            };

            let status = resp.status().as_u16();
            if status >= 400 {
                return Err(ReadError::Status {
                    url: current.to_string(),
                    status,
                });
            }

            if status >= 300 {
                if chain.len() > self.options.redirects {
                    return Err(ReadError::TooManyRedirects { chain });
                }
                let location = resp
                    .headers()
                    .get(reqwest::header::LOCATION)
                    .and_then(|val| val.to_str().ok())
                    .filter(|val| !val.is_empty())
                    .map(str::to_string);
                let Some(location) = location else {
                    return Err(ReadError::MissingLocation {
                        url: current.to_string(),
                        status,
                    });
                };
                current = current.join(&location).map_err(|err| ReadError::Download {
                    url: current.to_string(),
                    message: format!("invalid redirect location {location}: {err}"),
                })?;
                continue;
            }

            return match resp.bytes().await {
                Ok(body) => Ok(body.to_vec()),
                Err(err) if err.is_timeout() => Err(ReadError::Timeout {
                    url: current.to_string(),
                    timeout_ms: self.timeout_ms(),
                }),
                Err(err) => Err(ReadError::Download {
                    url: current.to_string(),
                    message: err.to_string(),
                }),
            };
        }
    }
}
