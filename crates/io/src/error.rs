//! Error type for decode and export operations.

use glowtex_core::TextureError;
use thiserror::Error;

/// Errors from the image decode and export paths.
#[derive(Debug, Error)]
pub enum IoError {
    /// A pixel source could not be read or decoded. The underlying
    /// decoder's message is carried verbatim, never suppressed.
    #[error("source not accessible: {0}")]
    Decode(String),

    /// Cube face images disagree on size or are not square.
    #[error("invalid cube faces: {0}")]
    FaceMismatch(String),

    /// Encoding readback pixels to PNG or base64 failed.
    #[error("encode failed: {0}")]
    Encode(String),

    /// A texture operation underneath the decode/export failed.
    #[error(transparent)]
    Texture(#[from] TextureError),

    /// Filesystem error while writing an export.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decode_carries_the_source_message_verbatim() {
        let err = IoError::Decode("unexpected EOF reading PNG chunk".into());
        let msg = format!("{err}");
        assert!(
            msg.contains("unexpected EOF reading PNG chunk"),
            "expected decoder message in: {msg}"
        );
    }

    #[test]
    fn texture_errors_convert_transparently() {
        let inner = TextureError::InvalidConfiguration("kind mismatch".into());
        let err: IoError = inner.into();
        assert!(format!("{err}").contains("kind mismatch"));
    }

    #[test]
    fn io_error_implements_std_error() {
        fn assert_std_error<T: std::error::Error>() {}
        assert_std_error::<IoError>();
    }
}
