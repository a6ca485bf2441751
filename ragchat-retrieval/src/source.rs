//! Text sources: turning an ingestion identifier into raw text.
//!
//! The ingestion pipeline accepts opaque source identifiers (URLs or text
//! blobs). A [`TextSource`] resolves one identifier to the text that gets
//! embedded.

use async_trait::async_trait;

use crate::error::{RagError, Result};

/// Resolves a source identifier to raw text.
///
/// Implementations report every failure as [`RagError::SourceFetchFailed`]
/// so that a batch can record it against the identifier and move on.
#[async_trait]
pub trait TextSource: Send + Sync {
    /// Obtain the text behind `source`.
    async fn fetch(&self, source: &str) -> Result<String>;
}

/// A [`TextSource`] whose identifiers are the text itself.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawTextSource;

#[async_trait]
impl TextSource for RawTextSource {
    async fn fetch(&self, source: &str) -> Result<String> {
        if source.trim().is_empty() {
            return Err(RagError::SourceFetchFailed {
                source_id: source.to_string(),
                message: "source text is empty".to_string(),
            });
        }
        Ok(source.to_string())
    }
}

#[cfg(feature = "fetch")]
pub use web::{WebTextSource, html_to_text};

#[cfg(feature = "fetch")]
mod web {
    use std::sync::LazyLock;
    use std::time::Duration;

    use async_trait::async_trait;
    use regex::Regex;
    use tracing::{debug, warn};

    use super::{RawTextSource, TextSource};
    use crate::error::{RagError, Result};

    const USER_AGENT: &str = "Mozilla/5.0";

    static NON_CONTENT: LazyLock<Vec<Regex>> = LazyLock::new(|| {
        ["script", "style", "noscript", "iframe"]
            .iter()
            .map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>.*?</{tag}\s*>"))
                    .expect("unreachable error: invalid element pattern")
            })
            .chain(["meta", "link"].iter().map(|tag| {
                Regex::new(&format!(r"(?is)<{tag}\b[^>]*>"))
                    .expect("unreachable error: invalid element pattern")
            }))
            .collect()
    });
    static COMMENT: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<!--.*?-->").expect("unreachable error: invalid comment pattern")
    });
    static BODY: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?is)<body\b[^>]*>(.*)</body\s*>")
            .expect("unreachable error: invalid body pattern")
    });
    static TAG: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?s)<[^>]*>").expect("unreachable error: invalid tag pattern")
    });
    static WHITESPACE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\s+").expect("unreachable error: invalid space pattern"));

    /// Reduce an HTML page to its visible body text.
    ///
    /// Drops non-content elements, strips the remaining tags, decodes the
    /// common entities and collapses runs of whitespace into single spaces.
    pub fn html_to_text(html: &str) -> String {
        let mut cleaned = COMMENT.replace_all(html, " ").into_owned();
        for pattern in NON_CONTENT.iter() {
            cleaned = pattern.replace_all(&cleaned, " ").into_owned();
        }
        let body = BODY
            .captures(&cleaned)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .unwrap_or(cleaned);
        let text = TAG.replace_all(&body, " ");
        let text = decode_entities(&text);
        WHITESPACE.replace_all(&text, " ").trim().to_string()
    }

    fn decode_entities(text: &str) -> String {
        // &amp; last so that "&amp;lt;" decodes to "&lt;" and not "<".
        text.replace("&nbsp;", " ")
            .replace("&lt;", "<")
            .replace("&gt;", ">")
            .replace("&quot;", "\"")
            .replace("&#39;", "'")
            .replace("&apos;", "'")
            .replace("&amp;", "&")
    }

    /// A [`TextSource`] that downloads `http(s)://` identifiers and treats
    /// anything else as raw text.
    ///
    /// # Example
    ///
    /// ```rust,ignore
    /// use ragchat_retrieval::{TextSource, WebTextSource};
    ///
    /// let source = WebTextSource::new();
    /// let text = source.fetch("https://en.wikipedia.org/wiki/Zomato").await?;
    /// ```
    #[derive(Debug, Clone)]
    pub struct WebTextSource {
        client: reqwest::Client,
    }

    impl Default for WebTextSource {
        fn default() -> Self {
            Self::new()
        }
    }

    impl WebTextSource {
        /// Create a source with a 30 second download timeout.
        pub fn new() -> Self {
            let client = reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .timeout(Duration::from_secs(30))
                .build()
                .unwrap_or_default();
            Self { client }
        }

        /// Use a preconfigured HTTP client.
        pub fn with_client(client: reqwest::Client) -> Self {
            Self { client }
        }

        fn failed(source: &str, message: impl Into<String>) -> RagError {
            RagError::SourceFetchFailed { source_id: source.to_string(), message: message.into() }
        }
    }

    pub(super) fn is_url(source: &str) -> bool {
        let s = source.trim_start();
        s.starts_with("http://") || s.starts_with("https://")
    }

    #[async_trait]
    impl TextSource for WebTextSource {
        async fn fetch(&self, source: &str) -> Result<String> {
            if !is_url(source) {
                return RawTextSource.fetch(source).await;
            }

            let url = source.trim();
            debug!(url, "fetching source");
            let response = self
                .client
                .get(url)
                .header(reqwest::header::USER_AGENT, USER_AGENT)
                .send()
                .await
                .map_err(|e| {
                    warn!(url, error = %e, "source download failed");
                    Self::failed(source, format!("request failed: {e}"))
                })?;

            let status = response.status();
            if !status.is_success() {
                warn!(url, %status, "source returned an error status");
                return Err(Self::failed(source, format!("server returned {status}")));
            }

            let html = response
                .text()
                .await
                .map_err(|e| Self::failed(source, format!("failed to read body: {e}")))?;
            let text = html_to_text(&html);
            if text.is_empty() {
                return Err(Self::failed(source, "page contains no text"));
            }

            debug!(url, text_len = text.len(), "extracted text");
            Ok(text)
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn strips_non_content_and_collapses_whitespace() {
            let html = r#"<html><head><title>t</title><meta charset="utf-8">
                <link rel="stylesheet" href="a.css"><style>body { color: red }</style></head>
                <body><script>var x = "<p>";</script>
                <h1>Zomato</h1>  <p>Share price
                rose&nbsp;5% &amp; more</p><noscript>enable js</noscript>
                <iframe src="ad.html">frame</iframe><!-- hidden --></body></html>"#;
            assert_eq!(html_to_text(html), "Zomato Share price rose 5% & more");
        }

        #[test]
        fn documents_without_body_keep_all_text() {
            assert_eq!(html_to_text("<p>plain</p> text"), "plain text");
        }

        #[test]
        fn only_http_schemes_are_urls() {
            assert!(is_url("https://example.com"));
            assert!(is_url("  http://example.com"));
            assert!(!is_url("ftp://example.com"));
            assert!(!is_url("Zomato share price rose 5%"));
        }

        #[tokio::test]
        async fn raw_text_passes_through() {
            let text = WebTextSource::new().fetch("Weather forecast").await.unwrap();
            assert_eq!(text, "Weather forecast");
        }
    }
}
