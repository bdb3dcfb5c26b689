// SPDX-License-Identifier: Apache-2.0
// Copyright (c) 2025 seektar contributors

use std::time::Duration;

use anyhow::{Result, anyhow};
use bytes::Bytes;
use futures::StreamExt;
use reqwest::{Client, header};

use super::{EntrySource, SourceChunk};
use async_trait::async_trait;

const MAX_RETRIES: u32 = 3;

/// blob served over HTTP by a store that answers range requests
pub struct HttpSource {
    client: Client,
    url: String,
    content_length: u64,
}

fn create_http_client(user_agent: Option<&str>) -> Result<Client> {
    let mut headers = header::HeaderMap::new();

    let ua = user_agent.unwrap_or(concat!("seektar/", env!("CARGO_PKG_VERSION")));
    headers.insert(
        header::USER_AGENT,
        header::HeaderValue::from_str(ua)
            .map_err(|e| anyhow!("Invalid user agent string: {}", e))?,
    );
    headers.insert(header::ACCEPT, header::HeaderValue::from_static("*/*"));
    headers.insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-transform"),
    );

    Client::builder()
        .timeout(Duration::from_secs(600))
        .connect_timeout(Duration::from_secs(30))
        .tcp_keepalive(Some(Duration::from_secs(30)))
        .http2_adaptive_window(true)
        .default_headers(headers)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()
        .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))
}

impl HttpSource {
    /// probe the object with a HEAD request and remember its size
    pub async fn new(url: String, user_agent: Option<&str>) -> Result<Self> {
        let client = create_http_client(user_agent)?;

        url::Url::parse(&url).map_err(|e| anyhow!("Invalid URL: {}", e))?;

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            match client.head(&url).send().await {
                Ok(response) => {
                    if !response.status().is_success() {
                        return Err(anyhow!("Failed to access URL: {}", response.status()));
                    }

                    let content_length = response
                        .headers()
                        .get(header::CONTENT_LENGTH)
                        .and_then(|v| v.to_str().ok())
                        .and_then(|v| v.parse::<u64>().ok())
                        .ok_or_else(|| anyhow!("Could not determine content length"))?;

                    return Ok(Self {
                        client,
                        url,
                        content_length,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(anyhow!(
            "Failed to connect after {} retries. Last error: {}",
            MAX_RETRIES,
            last_error.unwrap()
        ))
    }

    pub fn content_length(&self) -> u64 {
        self.content_length
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl EntrySource for HttpSource {
    async fn read_range(&self, offset: u64, length: u64) -> Result<SourceChunk> {
        // clamp the read to available bytes; the consumer pads the rest
        let start = offset.min(self.content_length);
        let to_read = (self.content_length - start).min(length);
        if to_read == 0 {
            return Ok(SourceChunk::Bytes(Bytes::new()));
        }

        let end = start + to_read - 1;
        let range_header = format!("bytes={}-{}", start, end);

        let mut last_error = None;
        for attempt in 0..MAX_RETRIES {
            if attempt > 0 {
                tokio::time::sleep(Duration::from_secs(2u64.pow(attempt))).await;
            }
            match self
                .client
                .get(&self.url)
                .header(header::RANGE, &range_header)
                .send()
                .await
            {
                Ok(response) => {
                    let status = response.status();
                    if !status.is_success() && status.as_u16() != 206 {
                        return Err(anyhow!("Range request failed: {}", status));
                    }

                    // a server that ignores Range sends the whole object
                    // with a 200; report the window it actually covers and
                    // let the consumer skip the lead
                    let (covered_offset, covered_length) = if status.as_u16() == 206 {
                        (start, to_read)
                    } else {
                        (0, self.content_length)
                    };

                    let stream = response.bytes_stream();
                    let reader = tokio_util::io::StreamReader::new(
                        stream.map(|result| result.map_err(std::io::Error::other)),
                    );

                    return Ok(SourceChunk::Stream {
                        reader: Box::pin(reader),
                        offset: covered_offset,
                        length: covered_length,
                    });
                }
                Err(e) => last_error = Some(e),
            }
        }

        Err(anyhow!(
            "Failed to read after {} retries. Last error: {}",
            MAX_RETRIES,
            last_error.unwrap()
        ))
    }
}
