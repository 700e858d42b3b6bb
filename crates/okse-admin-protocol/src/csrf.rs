//! CSRF credential attached to every admin API call.
//!
//! The admin page embeds the credential as two meta tags:
//!
//! ```html
//! <meta name="_csrf_header" content="X-CSRF-TOKEN"/>
//! <meta name="_csrf" content="5f1c..."/>
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;

use crate::ConfigurationError;

pub const CSRF_TOKEN_META: &str = "_csrf";
pub const CSRF_HEADER_META: &str = "_csrf_header";

/// Header name / token pair. Read once at startup and never changed.
#[derive(Clone, PartialEq, Eq)]
pub struct CsrfCredential {
    header_name: String,
    token: String,
}

impl CsrfCredential {
    pub fn new(
        header_name: impl Into<String>,
        token: impl Into<String>,
    ) -> Result<Self, ConfigurationError> {
        let header_name = header_name.into().trim().to_string();
        let token = token.into().trim().to_string();
        if header_name.is_empty() {
            return Err(ConfigurationError::MissingCsrfCredential(
                "header name is empty".into(),
            ));
        }
        if token.is_empty() {
            return Err(ConfigurationError::MissingCsrfCredential(
                "token is empty".into(),
            ));
        }
        if !header_name
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
        {
            return Err(ConfigurationError::InvalidCsrfHeader(header_name));
        }
        Ok(Self { header_name, token })
    }

    /// Extract the credential from the `_csrf_header` / `_csrf` meta tags of
    /// an HTML page. Attribute order and quote style do not matter.
    pub fn from_page_metadata(html: &str) -> Result<Self, ConfigurationError> {
        let metas = meta_tags(html)?;
        let header = metas.get(CSRF_HEADER_META).ok_or_else(|| {
            ConfigurationError::MissingCsrfCredential(format!(
                "page has no '{CSRF_HEADER_META}' meta tag"
            ))
        })?;
        let token = metas.get(CSRF_TOKEN_META).ok_or_else(|| {
            ConfigurationError::MissingCsrfCredential(format!(
                "page has no '{CSRF_TOKEN_META}' meta tag"
            ))
        })?;
        Self::new(header.as_str(), token.as_str())
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }

    pub fn token(&self) -> &str {
        &self.token
    }
}

// The token is a secret; keep it out of logs.
impl std::fmt::Debug for CsrfCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsrfCredential")
            .field("header_name", &self.header_name)
            .field("token", &"<redacted>")
            .finish()
    }
}

struct MetaScanner {
    tag: Regex,
    name: Regex,
    content: Regex,
}

impl MetaScanner {
    fn build() -> Result<Self, regex::Error> {
        Ok(Self {
            tag: Regex::new(r"(?is)<meta\b[^>]*>")?,
            name: Regex::new(r#"(?i)\bname\s*=\s*["']([^"']*)["']"#)?,
            content: Regex::new(r#"(?i)\bcontent\s*=\s*["']([^"']*)["']"#)?,
        })
    }
}

static META_SCANNER: LazyLock<Result<MetaScanner, regex::Error>> = LazyLock::new(MetaScanner::build);

/// name → content for every `<meta>` tag carrying both attributes.
fn meta_tags(html: &str) -> Result<HashMap<String, String>, ConfigurationError> {
    let scanner = META_SCANNER.as_ref().map_err(|e| {
        ConfigurationError::MissingCsrfCredential(format!("meta tag scanner unavailable: {e}"))
    })?;

    let mut metas = HashMap::new();
    for m in scanner.tag.find_iter(html) {
        let attrs = m.as_str();
        let (Some(n), Some(c)) = (scanner.name.captures(attrs), scanner.content.captures(attrs))
        else {
            continue;
        };
        metas
            .entry(n[1].to_string())
            .or_insert_with(|| c[1].to_string());
    }
    Ok(metas)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_redacts_token() {
        let cred = CsrfCredential::new("X-CSRF-TOKEN", "secret-value").unwrap();
        let shown = format!("{cred:?}");
        assert!(shown.contains("X-CSRF-TOKEN"));
        assert!(!shown.contains("secret-value"));
    }

    #[test]
    fn test_header_name_with_spaces_rejected() {
        let err = CsrfCredential::new("X CSRF", "t").unwrap_err();
        assert_eq!(err, ConfigurationError::InvalidCsrfHeader("X CSRF".into()));
    }

    #[test]
    fn test_meta_scanner_builds_once() {
        assert!(META_SCANNER.is_ok());
        let first: *const MetaScanner = META_SCANNER.as_ref().unwrap();
        let html = r#"<meta name="_csrf_header" content="X-CSRF-TOKEN"><meta name="_csrf" content="t">"#;
        CsrfCredential::from_page_metadata(html).unwrap();
        CsrfCredential::from_page_metadata(html).unwrap();
        let second: *const MetaScanner = META_SCANNER.as_ref().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_meta_attribute_order_irrelevant() {
        let html = r#"<head>
            <meta content="abc123" name="_csrf">
            <META NAME='_csrf_header' CONTENT='X-XSRF'/>
        </head>"#;
        let cred = CsrfCredential::from_page_metadata(html).unwrap();
        assert_eq!(cred.header_name(), "X-XSRF");
        assert_eq!(cred.token(), "abc123");
    }
}
