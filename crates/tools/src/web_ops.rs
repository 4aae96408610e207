//! Web operations tool: `fetch_url` and a
//! `search_web` that scrapes a privacy-respecting HTML search endpoint,
//! surfacing CAPTCHA/blocking pages as a dedicated error rather than
//! silently returning a useless page.

use agentrt_domain::error::{Error, Result};
use regex::Regex;
use serde::Deserialize;
use serde_json::Value;

const DEFAULT_TIMEOUT_SECS: u64 = 15;
const SEARCH_ENDPOINT: &str = "https://html.duckduckgo.com/html/";

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "operation", rename_all = "snake_case")]
pub enum WebOperation {
    FetchUrl {
        url: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    SearchWeb {
        query: String,
        #[serde(default)]
        max_results: Option<usize>,
    },
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

pub async fn handle(op: WebOperation) -> Result<Value> {
    match op {
        WebOperation::FetchUrl { url, timeout_secs } => fetch_url(&url, timeout_secs).await,
        WebOperation::SearchWeb { query, max_results } => search_web(&query, max_results).await,
    }
}

fn client(timeout_secs: u64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .user_agent("Mozilla/5.0 (compatible; agent-runtime/1.0)")
        .build()
        .map_err(|e| Error::Other(format!("failed to build http client: {e}")))
}

async fn fetch_url(url: &str, timeout_secs: Option<u64>) -> Result<Value> {
    validate_url(url)?;
    let client = client(timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))?;

    let response = client.get(url).send().await.map_err(classify_reqwest_error)?;
    let status = response.status();
    let body = response.text().await.map_err(classify_reqwest_error)?;

    if !status.is_success() {
        return Err(Error::Other(format!("fetch_url: {url} returned HTTP {status}")));
    }
    if looks_like_blocking_page(&body) {
        return Err(Error::Other(format!("fetch_url: {url} appears to be a CAPTCHA or blocking page")));
    }

    Ok(serde_json::json!({ "url": url, "status": status.as_u16(), "body": strip_html_tags(&body) }))
}

async fn search_web(query: &str, max_results: Option<usize>) -> Result<Value> {
    let client = client(DEFAULT_TIMEOUT_SECS)?;
    let response = client
        .post(SEARCH_ENDPOINT)
        .form(&[("q", query)])
        .send()
        .await
        .map_err(classify_reqwest_error)?;

    let status = response.status();
    let body = response.text().await.map_err(classify_reqwest_error)?;
    if !status.is_success() {
        return Err(Error::Other(format!("search_web: endpoint returned HTTP {status}")));
    }
    if looks_like_blocking_page(&body) {
        return Err(Error::Other(
            "search_web: the search endpoint returned a CAPTCHA or blocking page".to_string(),
        ));
    }

    let hits = parse_search_results(&body, max_results.unwrap_or(10));
    Ok(serde_json::json!({ "query": query, "results": hits, "count": hits.len() }))
}

fn validate_url(url: &str) -> Result<()> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(Error::InvalidInput(format!("url must be http(s): '{url}'")));
    }
    Ok(())
}

fn classify_reqwest_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::Timeout(e.to_string())
    } else {
        Error::Http(e.to_string())
    }
}

/// Cheap heuristic over the raw HTML: known CAPTCHA/anti-bot markers.
fn looks_like_blocking_page(body: &str) -> bool {
    let lowered = body.to_lowercase();
    ["captcha", "are you a human", "unusual traffic", "access denied", "verify you are a human"]
        .iter()
        .any(|marker| lowered.contains(marker))
}

fn strip_html_tags(html: &str) -> String {
    let re = Regex::new(r"(?s)<script.*?</script>|<style.*?</style>|<[^>]+>").expect("valid regex");
    let text = re.replace_all(html, " ");
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parses DuckDuckGo's lite HTML result markup: each hit is an `<a
/// class="result__a" href="...">title</a>` followed by a `result__snippet` span.
fn parse_search_results(html: &str, max_results: usize) -> Vec<SearchHit> {
    let link_re = Regex::new(r#"(?s)<a[^>]*class="result__a"[^>]*href="([^"]+)"[^>]*>(.*?)</a>"#).expect("valid regex");
    let snippet_re = Regex::new(r#"(?s)<a[^>]*class="result__snippet"[^>]*>(.*?)</a>"#).expect("valid regex");
    let tag_re = Regex::new(r"<[^>]+>").expect("valid regex");

    let mut snippets = snippet_re.captures_iter(html).map(|c| tag_re.replace_all(&c[1], "").trim().to_string());

    link_re
        .captures_iter(html)
        .take(max_results)
        .map(|c| SearchHit {
            url: c[1].to_string(),
            title: tag_re.replace_all(&c[2], "").trim().to_string(),
            snippet: snippets.next().unwrap_or_default(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_url_rejects_non_http_scheme() {
        assert!(validate_url("ftp://example.com").is_err());
        assert!(validate_url("https://example.com").is_ok());
    }

    #[test]
    fn detects_blocking_page_markers() {
        assert!(looks_like_blocking_page("<html>Please complete this CAPTCHA</html>"));
        assert!(!looks_like_blocking_page("<html>normal content</html>"));
    }

    #[test]
    fn strip_html_tags_removes_markup_and_scripts() {
        let html = "<html><script>evil()</script><body><p>hello <b>world</b></p></body></html>";
        let text = strip_html_tags(html);
        assert_eq!(text, "hello world");
    }

    #[test]
    fn parse_search_results_extracts_title_url_snippet() {
        let html = r#"<a class="result__a" href="https://example.com">Example Title</a>
            <a class="result__snippet">An example snippet</a>"#;
        let hits = parse_search_results(html, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].url, "https://example.com");
        assert_eq!(hits[0].title, "Example Title");
        assert_eq!(hits[0].snippet, "An example snippet");
    }

    #[test]
    fn parse_search_results_respects_max_results() {
        let html = r#"<a class="result__a" href="https://a.com">A</a>
            <a class="result__a" href="https://b.com">B</a>
            <a class="result__a" href="https://c.com">C</a>"#;
        let hits = parse_search_results(html, 2);
        assert_eq!(hits.len(), 2);
    }
}
