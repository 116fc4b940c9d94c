//! Structural validation of generated documents.
//!
//! An [`Artifact`] can only be obtained from [`ArtifactValidator::validate`],
//! so anything holding one has passed validation.

use scraper::{ElementRef, Html};
use serde::Serialize;
use std::borrow::Cow;
use thiserror::Error;

/// Why a document was rejected
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    /// The parser reported errors
    #[error("{count} parse error(s), first: {first}")]
    ParseErrors { count: usize, first: String },

    /// The document has no body content
    #[error("document body is empty")]
    EmptyBody,
}

/// A validated, renderable document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Artifact {
    content: String,
}

impl Artifact {
    /// Document source
    pub fn as_str(&self) -> &str {
        &self.content
    }

    /// Take the document source
    pub fn into_string(self) -> String {
        self.content
    }
}

impl AsRef<str> for Artifact {
    fn as_ref(&self) -> &str {
        &self.content
    }
}

impl std::fmt::Display for Artifact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.content)
    }
}

/// Checks that accumulated text is a well-formed, non-empty HTML document.
///
/// Only structure is checked; whether the document shows what was asked
/// for is out of reach.
#[derive(Debug, Clone, Copy)]
pub struct ArtifactValidator {
    strict: bool,
}

impl Default for ArtifactValidator {
    fn default() -> Self {
        Self { strict: true }
    }
}

impl ArtifactValidator {
    /// Reject on any parse error
    pub fn strict() -> Self {
        Self { strict: true }
    }

    /// Tolerate recoverable parse errors, only require a non-empty body
    pub fn lenient() -> Self {
        Self { strict: false }
    }

    /// Create from a strictness flag
    pub fn with_strict(strict: bool) -> Self {
        Self { strict }
    }

    pub fn is_strict(&self) -> bool {
        self.strict
    }

    /// Check `text` without taking ownership
    pub fn check(&self, text: &str) -> Result<(), Rejection> {
        // Generated documents often omit the doctype. Supply one so that its
        // absence is not reported as a parse error.
        let source = if has_doctype(text) {
            Cow::Borrowed(text)
        } else {
            Cow::Owned(format!("<!DOCTYPE html>{}", text))
        };
        let document = Html::parse_document(&source);

        if self.strict && !document.errors.is_empty() {
            tracing::warn!("Document parse failed: {:?}", document.errors);
            return Err(Rejection::ParseErrors {
                count: document.errors.len(),
                first: document.errors[0].to_string(),
            });
        }

        let has_body_content = document
            .root_element()
            .children()
            .filter_map(ElementRef::wrap)
            .find(|element| element.value().name() == "body")
            .is_some_and(|body| !body.inner_html().trim().is_empty());

        if !has_body_content {
            tracing::warn!("Document body is empty");
            return Err(Rejection::EmptyBody);
        }

        Ok(())
    }

    /// Validate `text` and wrap it as an [`Artifact`]
    pub fn validate(&self, text: impl Into<String>) -> Result<Artifact, Rejection> {
        let content = text.into();
        self.check(&content)?;
        Ok(Artifact { content })
    }
}

fn has_doctype(text: &str) -> bool {
    text.trim_start()
        .get(..9)
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case("<!doctype"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_minimal_document() {
        let artifact = ArtifactValidator::strict()
            .validate("<html><body>x</body></html>")
            .unwrap();
        assert_eq!(artifact.as_str(), "<html><body>x</body></html>");
    }

    #[test]
    fn test_accepts_document_with_doctype() {
        let html = "<!DOCTYPE html>\n<html>\n<head><title>t</title></head>\n<body><canvas id=\"c\"></canvas></body>\n</html>\n";
        assert!(ArtifactValidator::strict().check(html).is_ok());
    }

    #[test]
    fn test_rejects_empty_string() {
        assert!(ArtifactValidator::strict().check("").is_err());
        assert!(ArtifactValidator::lenient().check("").is_err());
    }

    #[test]
    fn test_rejects_whitespace_body() {
        assert_eq!(
            ArtifactValidator::strict().check("<html><body>   \n </body></html>"),
            Err(Rejection::EmptyBody)
        );
    }

    #[test]
    fn test_rejects_broken_fragment() {
        assert!(ArtifactValidator::strict().check("</div>").is_err());
        assert!(ArtifactValidator::strict().check("<!-- never closed").is_err());
    }

    #[test]
    fn test_strictness_decides_recoverable_errors() {
        let html = "<html><body><p>x</p></span></body></html>";
        assert!(matches!(
            ArtifactValidator::strict().check(html),
            Err(Rejection::ParseErrors { .. })
        ));
        assert!(ArtifactValidator::lenient().check(html).is_ok());
    }

    #[test]
    fn test_doctype_detection() {
        assert!(has_doctype("  <!doctype html>"));
        assert!(has_doctype("<!DOCTYPE html>"));
        assert!(!has_doctype("<html>"));
        assert!(!has_doctype("<!do"));
    }
}
