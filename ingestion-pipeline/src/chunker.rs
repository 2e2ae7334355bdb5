use common::error::AppError;

/// Splits `text` into character windows of `chunk_size`, each overlapping
/// the previous window by exactly `overlap` characters. The final window may
/// be shorter and always ends at the end of the text, so a question sitting
/// on a window boundary appears in two adjacent chunks; the deduplicator
/// absorbs the repeat.
pub fn split_with_overlap(
    text: &str,
    chunk_size: usize,
    overlap: usize,
) -> Result<Vec<String>, AppError> {
    if chunk_size == 0 {
        return Err(AppError::Validation(
            "chunk_size must be greater than zero".into(),
        ));
    }

    if overlap >= chunk_size {
        return Err(AppError::Validation(format!(
            "chunk overlap of {overlap} must be smaller than the chunk size of {chunk_size}"
        )));
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.len() <= chunk_size {
        return Ok(vec![text.to_string()]);
    }

    let step = chunk_size - overlap;
    let mut chunks = Vec::new();
    let mut start = 0;

    loop {
        let end = (start + chunk_size).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    Ok(chunks)
}
