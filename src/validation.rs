use crate::error::ValidationError;

/// Host fragments a URL must contain to be accepted
const HOST_FRAGMENTS: &[&str] = &["youtube.com", "youtu.be"];

/// Cheap check that the input looks like a video link.
///
/// This is a substring match, not a URL parse; the extractor does the real
/// validation when it fetches metadata.
pub fn validate_url(input: &str) -> Result<String, ValidationError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Empty);
    }
    let lower = trimmed.to_lowercase();
    if !HOST_FRAGMENTS.iter().any(|fragment| lower.contains(fragment)) {
        return Err(ValidationError::UnsupportedHost);
    }
    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_free_text() {
        let err = validate_url("not a url").unwrap_err();
        assert_eq!(err, ValidationError::UnsupportedHost);
        assert!(!err.to_string().is_empty());
    }

    #[test]
    fn rejects_blank_input() {
        assert_eq!(validate_url("   "), Err(ValidationError::Empty));
        assert_eq!(validate_url(""), Err(ValidationError::Empty));
    }

    #[test]
    fn accepts_short_links() {
        assert_eq!(
            validate_url("https://youtu.be/abc123").as_deref(),
            Ok("https://youtu.be/abc123")
        );
    }

    #[test]
    fn accepts_mixed_case_and_trims() {
        assert_eq!(
            validate_url("  https://WWW.YouTube.com/watch?v=xyz \n").as_deref(),
            Ok("https://WWW.YouTube.com/watch?v=xyz")
        );
    }
}
