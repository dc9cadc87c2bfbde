//! Article scraping with SSRF protection. URLs are validated against the
//! security policy before any network request; every failure degrades to a
//! fixed sentinel so report generation keeps going.

pub mod url_validator;

pub use url_validator::validate_url;

use async_trait::async_trait;
use redlens_core::{CoreError, Scrape, ScraperConfig, ScraperError};
use regex::Regex;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, warn};

pub const SCRAPE_FAILURE_SENTINEL: &str = "Could not retrieve article content.";

pub struct ArticleScraper {
    client: Client,
    paragraph_re: Regex,
    tag_re: Regex,
}

impl ArticleScraper {
    pub fn new(config: &ScraperConfig) -> Result<Self, CoreError> {
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CoreError::Network)?;

        let paragraph_re = Regex::new(r"(?is)<p[^>]*>(.*?)</p>").map_err(|e| {
            CoreError::Internal {
                message: format!("invalid paragraph pattern: {}", e),
            }
        })?;
        let tag_re = Regex::new(r"<[^>]+>").map_err(|e| CoreError::Internal {
            message: format!("invalid tag pattern: {}", e),
        })?;

        Ok(Self {
            client,
            paragraph_re,
            tag_re,
        })
    }

    /// Scrape the text content of an article. Returns the sentinel string on
    /// validation failure or any fetch error.
    pub async fn scrape(&self, url: &str) -> String {
        match self.try_scrape(url).await {
            Ok(text) => text,
            Err(e) => {
                warn!("Scrape failed for {}: {}", url, e);
                SCRAPE_FAILURE_SENTINEL.to_string()
            }
        }
    }

    async fn try_scrape(&self, url: &str) -> Result<String, CoreError> {
        validate_url(url).map_err(CoreError::Scraper)?;

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(CoreError::Network)?;

        if !response.status().is_success() {
            return Err(CoreError::Scraper(ScraperError::FetchFailed {
                reason: format!("status {}", response.status()),
            }));
        }

        let html = response.text().await.map_err(CoreError::Network)?;
        let text = self.extract_paragraph_text(&html);

        if text.is_empty() {
            return Err(CoreError::Scraper(ScraperError::FetchFailed {
                reason: "no paragraph content found".to_string(),
            }));
        }

        debug!("Scraped {} characters from {}", text.len(), url);
        Ok(text)
    }

    /// Concatenate the text of all `<p>` elements, stripping nested markup.
    fn extract_paragraph_text(&self, html: &str) -> String {
        let paragraphs: Vec<String> = self
            .paragraph_re
            .captures_iter(html)
            .filter_map(|cap| cap.get(1))
            .map(|m| {
                self.tag_re
                    .replace_all(m.as_str(), " ")
                    .split_whitespace()
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .filter(|text| !text.is_empty())
            .collect();

        paragraphs.join(" ")
    }
}

#[async_trait]
impl Scrape for ArticleScraper {
    async fn scrape(&self, url: &str) -> String {
        ArticleScraper::scrape(self, url).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redlens_core::ScraperConfig;

    fn scraper() -> ArticleScraper {
        ArticleScraper::new(&ScraperConfig::default()).unwrap()
    }

    #[test]
    fn test_paragraph_extraction() {
        let html = r#"
            <html><body>
            <h1>Headline</h1>
            <p>First paragraph.</p>
            <div><p>Second <b>bold</b> paragraph.</p></div>
            <p></p>
            </body></html>
        "#;
        let text = scraper().extract_paragraph_text(html);
        assert_eq!(text, "First paragraph. Second bold paragraph.");
    }

    #[test]
    fn test_extraction_ignores_non_paragraph_content() {
        let html = "<div>no paragraphs here</div>";
        assert!(scraper().extract_paragraph_text(html).is_empty());
    }

    // The SSRF policy rejects these before any network call is attempted, so
    // the sentinel comes back immediately even with no server running.
    #[tokio::test]
    async fn test_ssrf_targets_return_sentinel() {
        let scraper = scraper();

        let result = scraper.scrape("http://127.0.0.1:22").await;
        assert_eq!(result, SCRAPE_FAILURE_SENTINEL);

        let result = scraper.scrape("http://169.254.169.254/").await;
        assert_eq!(result, SCRAPE_FAILURE_SENTINEL);

        let result = scraper.scrape("file:///etc/passwd").await;
        assert_eq!(result, SCRAPE_FAILURE_SENTINEL);
    }
}
