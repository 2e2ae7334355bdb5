//! Plain-text extraction from uploaded files. Rich formats (PDF, DOCX,
//! XLSX) are decoded by the surrounding system; the pipeline only needs a
//! text source for the chunker, so the default decoder handles text-like
//! files and rejects everything else.

use async_trait::async_trait;
use common::error::AppError;
use mime_guess::mime;

#[async_trait]
pub trait DocumentDecoder: Send + Sync {
    async fn decode(&self, data: &[u8], file_name: &str) -> Result<String, AppError>;
}

pub struct PlainTextDecoder;

#[async_trait]
impl DocumentDecoder for PlainTextDecoder {
    async fn decode(&self, data: &[u8], file_name: &str) -> Result<String, AppError> {
        let guessed = mime_guess::from_path(file_name).first_or_octet_stream();

        if guessed.type_() != mime::TEXT && guessed != mime::APPLICATION_OCTET_STREAM {
            return Err(AppError::Validation(format!(
                "Unsupported document format for {file_name}: {guessed}"
            )));
        }

        match String::from_utf8(data.to_vec()) {
            Ok(text) => Ok(text),
            // Mixed or legacy encodings still yield usable question text.
            Err(err) => Ok(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_utf8_text_files() {
        let decoder = PlainTextDecoder;
        let text = decoder
            .decode("1. What is 2+2?\nA. 3\nB. 4\n".as_bytes(), "quiz.txt")
            .await
            .expect("decode");
        assert!(text.contains("What is 2+2?"));
    }

    #[tokio::test]
    async fn invalid_utf8_falls_back_to_lossy_decoding() {
        let decoder = PlainTextDecoder;
        let mut data = b"question \xff text".to_vec();
        data.push(b'!');

        let text = decoder.decode(&data, "quiz.txt").await.expect("decode");
        assert!(text.starts_with("question "));
        assert!(text.ends_with("text!"));
    }

    #[tokio::test]
    async fn rich_formats_are_rejected() {
        let decoder = PlainTextDecoder;
        let result = decoder.decode(b"%PDF-1.7", "quiz.pdf").await;
        assert!(matches!(result, Err(AppError::Validation(_))));
    }
}
