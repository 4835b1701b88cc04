//! Source acquisition: HTTP GET of a document URL, and the upstream
//! Context7-compatible mirror fetch (spec §4.D.1, §6).

use crate::errors::AppError;

pub struct FetchedDocument {
    pub body: String,
    pub source_type: String,
}

/// Fetches `url`, detecting `source_type` from `Content-Type`, falling back
/// to the URL extension, falling back to `"unknown"`. Non-2xx responses and
/// oversize bodies fail with a typed error (spec §4.D step 1-2).
pub async fn fetch_url(
    client: &reqwest::Client,
    url: &str,
    timeout: std::time::Duration,
    max_bytes: u64,
) -> Result<FetchedDocument, AppError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AppError::upstream_unavailable("document.fetch_failed", format!("GET {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::validation(
            "document.fetch_failed",
            format!("GET {url} returned {}", response.status()),
        ));
    }

    let content_type = response.headers().get(reqwest::header::CONTENT_TYPE).and_then(|v| v.to_str().ok()).map(str::to_string);
    let source_type = detect_source_type(content_type.as_deref(), url);

    let bytes = response
        .bytes()
        .await
        .map_err(|e| AppError::upstream_unavailable("document.fetch_failed", format!("reading body of {url} failed: {e}")))?;
    if bytes.len() as u64 > max_bytes {
        return Err(AppError::validation("document.too_large", format!("response from {url} exceeds the {max_bytes}-byte ceiling")));
    }

    let body = normalize_text(&bytes)?;
    Ok(FetchedDocument { body, source_type })
}

/// Fetches the upstream Context7-compatible `llms.txt` mirror (spec §6) for
/// a given `context7_id`, with `query` passed through as `topic`.
pub async fn fetch_upstream_llms_txt(
    client: &reqwest::Client,
    upstream_base: &str,
    context7_id: &str,
    query: &str,
    timeout: std::time::Duration,
) -> Result<String, AppError> {
    let trimmed_base = upstream_base.trim_end_matches('/');
    let trimmed_id = context7_id.trim_start_matches('/');
    let url = format!("{trimmed_base}/{trimmed_id}/llms.txt");

    let response = client
        .get(&url)
        .query(&[("topic", query), ("tokens", "5000")])
        .timeout(timeout)
        .send()
        .await
        .map_err(|e| AppError::upstream_unavailable("document.fetch_failed", format!("GET {url} failed: {e}")))?;

    if !response.status().is_success() {
        return Err(AppError::upstream_unavailable("document.fetch_failed", format!("upstream mirror returned {}", response.status())));
    }

    let text = response
        .text()
        .await
        .map_err(|e| AppError::upstream_unavailable("document.fetch_failed", format!("reading upstream body failed: {e}")))?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

fn detect_source_type(content_type: Option<&str>, url: &str) -> String {
    if let Some(ct) = content_type {
        if ct.contains("markdown") {
            return "markdown".to_string();
        }
        if ct.contains("html") {
            return "html".to_string();
        }
        if ct.contains("pdf") {
            return "pdf".to_string();
        }
    }
    let lower = url.to_ascii_lowercase();
    if lower.ends_with(".md") || lower.ends_with(".markdown") {
        "markdown".to_string()
    } else if lower.ends_with(".html") || lower.ends_with(".htm") {
        "html".to_string()
    } else if lower.ends_with(".pdf") {
        "pdf".to_string()
    } else {
        "unknown".to_string()
    }
}

fn normalize_text(bytes: &[u8]) -> Result<String, AppError> {
    let text = String::from_utf8(bytes.to_vec())
        .map_err(|_| AppError::validation("document.invalid_encoding", "document content is not valid UTF-8"))?;
    Ok(text.strip_prefix('\u{feff}').map(str::to_string).unwrap_or(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_markdown_by_content_type() {
        assert_eq!(detect_source_type(Some("text/markdown; charset=utf-8"), "https://x/y"), "markdown");
    }

    #[test]
    fn detects_by_extension_when_content_type_absent() {
        assert_eq!(detect_source_type(None, "https://x/y/readme.md"), "markdown");
        assert_eq!(detect_source_type(None, "https://x/y/page.html"), "html");
        assert_eq!(detect_source_type(None, "https://x/y/doc.pdf"), "pdf");
    }

    #[test]
    fn falls_back_to_unknown() {
        assert_eq!(detect_source_type(None, "https://x/y/z"), "unknown");
    }

    #[test]
    fn strips_bom_and_validates_utf8() {
        let mut bytes = vec![0xEF, 0xBB, 0xBF];
        bytes.extend_from_slice(b"hello");
        let text = normalize_text(&bytes).unwrap();
        assert_eq!(text, "hello");

        let invalid = vec![0xFF, 0xFE, 0x00];
        assert!(normalize_text(&invalid).is_err());
    }
}
