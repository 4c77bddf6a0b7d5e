// src/utils/html.rs

use url::Url;

/// Sanitizes question-bank HTML (prompts, answers, feedback, explanations).
///
/// Whitelist-based: formatting tags such as <b>, <code>, <pre> survive,
/// while <script>, event-handler attributes and the like are stripped.
pub fn sanitize_fragment(input: &str) -> String {
    ammonia::clean(input)
}

/// Keeps only reference links that parse as absolute http(s) URLs.
pub fn clean_links(links: &[String]) -> Vec<String> {
    links
        .iter()
        .filter_map(|raw| match Url::parse(raw.trim()) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => Some(url.to_string()),
            _ => {
                tracing::debug!("Dropping reference link {:?}", raw);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts_but_keeps_formatting() {
        let cleaned = sanitize_fragment("<b>SELECT</b><script>alert(1)</script>");
        assert_eq!(cleaned, "<b>SELECT</b>");
    }

    #[test]
    fn drops_non_http_links() {
        let links = vec![
            "https://docs.oracle.com/en/database/".to_string(),
            "javascript:alert(1)".to_string(),
            "not a url".to_string(),
        ];
        assert_eq!(clean_links(&links), vec!["https://docs.oracle.com/en/database/".to_string()]);
    }
}
