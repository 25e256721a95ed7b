// PDF text extraction - pure Rust via lopdf
use lopdf::content::Content;
use lopdf::{Document, Object};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PdfError {
    #[error("not a PDF document")]
    NotAPdf,

    #[error("failed to parse PDF: {0}")]
    Parse(#[from] lopdf::Error),
}

const PDF_MAGIC: &[u8] = b"%PDF";

/// Extract the flat text token stream of a PDF
///
/// Walks every page's content stream in page order and emits one token per
/// text-showing operator (`Tj`, `TJ`, `'`, `"`). Tokens are joined with a
/// single space; layout (columns, tables, line breaks) is not reconstructed.
pub fn extract_text(bytes: &[u8]) -> Result<String, PdfError> {
    if !looks_like_pdf(bytes) {
        return Err(PdfError::NotAPdf);
    }

    let document = Document::load_mem(bytes)?;
    let mut tokens = Vec::new();

    for (page_number, page_id) in document.get_pages() {
        let data = document.get_page_content(page_id)?;
        let content = Content::decode(&data)?;

        let before = tokens.len();
        for operation in &content.operations {
            if let Some(token) = text_token(&operation.operator, &operation.operands) {
                tokens.push(token);
            }
        }

        tracing::debug!(
            "PDF page {}: {} text tokens",
            page_number,
            tokens.len() - before
        );
    }

    Ok(join_tokens(tokens))
}

/// Join tokens with single spaces, dropping ones that carry no text
pub fn join_tokens<I, S>(tokens: I) -> String
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut text = String::new();
    for token in tokens {
        let token = token.as_ref();
        if token.trim().is_empty() {
            continue;
        }
        if !text.is_empty() {
            text.push(' ');
        }
        text.push_str(token);
    }
    text
}

/// Readers accept the `%PDF` header anywhere in the first 1024 bytes
fn looks_like_pdf(bytes: &[u8]) -> bool {
    let window = &bytes[..bytes.len().min(1024)];
    window.windows(PDF_MAGIC.len()).any(|w| w == PDF_MAGIC)
}

fn text_token(operator: &str, operands: &[Object]) -> Option<String> {
    match operator {
        "Tj" | "'" => operands.first().and_then(string_operand),
        "\"" => operands.get(2).and_then(string_operand),
        "TJ" => match operands.first() {
            // Kerning numbers between the pieces are dropped
            Some(Object::Array(items)) => {
                let text: String = items.iter().filter_map(string_operand).collect();
                Some(text)
            }
            _ => None,
        },
        _ => None,
    }
}

fn string_operand(object: &Object) -> Option<String> {
    match object {
        Object::String(bytes, _) => Some(decode_pdf_string(bytes)),
        _ => None,
    }
}

/// Decode a PDF text string: UTF-16BE with BOM, otherwise one byte per char
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }

    bytes.iter().map(|&b| b as char).collect()
}
