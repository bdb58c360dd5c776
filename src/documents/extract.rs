use crate::error::{AppError, AppResult};

/// Extract the text content of an uploaded file. Only plain text and PDF are
/// supported; anything else is refused before any parsing happens.
pub fn extract_text(bytes: &[u8], content_type: &str) -> AppResult<String> {
    match content_type {
        "text/plain" => std::str::from_utf8(bytes)
            .map(|s| s.to_string())
            .map_err(|_| AppError::Validation("File is not valid UTF-8 text".into())),
        "application/pdf" => pdf_extract::extract_text_from_mem(bytes)
            .map_err(|e| AppError::Validation(format!("Could not parse PDF: {e}"))),
        _ => Err(AppError::UnsupportedMedia),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_plain_text() {
        let text = extract_text(b"hello world", "text/plain").expect("plain text parses");
        assert_eq!(text, "hello world");
    }

    #[test]
    fn rejects_invalid_utf8_text() {
        let err = extract_text(&[0xff, 0xfe, 0x00], "text/plain").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[test]
    fn rejects_unsupported_content_type() {
        let err = extract_text(b"GIF89a", "image/gif").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedMedia));
    }

    #[test]
    fn rejects_garbage_pdf() {
        let err = extract_text(b"not a pdf", "application/pdf").unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
