//! Validation for uploaded file references.
//!
//! The portal never stores file bytes itself; callers hand us the name and
//! size reported by the upload collaborator and we gate on both.

use super::error::ValidationError;

pub const MAX_FILE_SIZE: u64 = 5_242_880;
pub const ALLOWED_EXTENSIONS: &[&str] = &[".pdf"];

/// Check a candidate attachment. Every violated rule contributes its own
/// error string and they are all reported together.
pub fn validate_file(name: &str, size: u64) -> Result<(), ValidationError> {
    let mut errors = Vec::new();

    if size > MAX_FILE_SIZE {
        errors.push(format!(
            "The file size is greater than {}MB.",
            MAX_FILE_SIZE / (1024 * 1024)
        ));
    }

    let allowed = ALLOWED_EXTENSIONS.iter().any(|ext| name.ends_with(ext));
    if !allowed {
        errors.push(format!("Only {} allowed", ALLOWED_EXTENSIONS.concat()));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ValidationError::InvalidFile(errors))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_pdf_within_limit() {
        assert!(validate_file("test.pdf", 20).is_ok());
        assert!(validate_file("test.pdf", MAX_FILE_SIZE).is_ok());
    }

    #[test]
    fn rejects_oversized_file() {
        let err = validate_file("test.pdf", MAX_FILE_SIZE + 1).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidFile(vec![
                "The file size is greater than 5MB.".to_string()
            ])
        );
    }

    #[test]
    fn rejects_wrong_extension() {
        let err = validate_file("test.xml", 20).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidFile(vec!["Only .pdf allowed".to_string()])
        );
    }

    #[test]
    fn reports_both_violations_together() {
        let err = validate_file("test.xml", MAX_FILE_SIZE + 1).unwrap_err();
        assert_eq!(
            err,
            ValidationError::InvalidFile(vec![
                "The file size is greater than 5MB.".to_string(),
                "Only .pdf allowed".to_string(),
            ])
        );
    }
}
