use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("{code}: {message}")]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

/// Reduce a client-supplied filename to a single safe path component.
///
/// The result becomes part of the remote path on both stores and is recorded
/// on the ledger as is, so only directory components and control characters
/// are touched; every other character is kept.
pub fn sanitize_filename(filename: &str) -> Result<String, ValidationError> {
    // Only the last component, whichever separator the client used
    let name = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or("")
        .trim();

    if filename.contains("..") || filename.contains('/') || filename.contains('\\') {
        tracing::warn!("Path traversal attempt detected: {}", filename);
    }

    if name.is_empty() || name == "." || name == ".." {
        return Err(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        });
    }

    let sanitized: String = name
        .chars()
        .map(|c| if c.is_control() { '_' } else { c })
        .collect();

    // Limit length safely for UTF-8
    let sanitized = if sanitized.len() > 255 {
        let mut end = 255;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    Ok(sanitized)
}
