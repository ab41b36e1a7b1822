//! Text extraction from uploaded email files (`.txt` and `.pdf`).

use tracing::{debug, info};

use crate::error::ExtractionError;

/// Largest accepted upload, in bytes (10 MiB).
pub const MAX_FILE_BYTES: usize = 10 * 1024 * 1024;

/// Largest accepted PDF, in pages.
pub const MAX_PDF_PAGES: usize = 100;

/// Supported upload formats, chosen by filename extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    Text,
    Pdf,
}

impl FileKind {
    /// Detect the format from a filename. Extensions match case-insensitively.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let lower = filename.to_lowercase();
        if lower.ends_with(".txt") {
            Some(Self::Text)
        } else if lower.ends_with(".pdf") {
            Some(Self::Pdf)
        } else {
            None
        }
    }
}

/// An uploaded email file.
#[derive(Debug, Clone)]
pub struct EmailFile {
    pub filename: String,
    pub data: Vec<u8>,
}

impl EmailFile {
    pub fn new(filename: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            data: data.into(),
        }
    }
}

/// Extract the text of an uploaded email file.
///
/// Format is checked before size, size before content. PDF parsing runs on
/// the blocking pool.
#[tracing::instrument(skip(file), fields(filename = %file.filename, bytes = file.data.len()))]
pub async fn extract_text(file: EmailFile) -> Result<String, ExtractionError> {
    let kind = FileKind::from_filename(&file.filename).ok_or_else(|| {
        ExtractionError::UnsupportedFormat {
            filename: file.filename.clone(),
        }
    })?;

    if file.data.len() > MAX_FILE_BYTES {
        return Err(ExtractionError::TooLarge {
            size: file.data.len(),
            max: MAX_FILE_BYTES,
        });
    }

    match kind {
        FileKind::Text => Ok(String::from_utf8_lossy(&file.data).into_owned()),
        FileKind::Pdf => {
            let data = file.data;
            tokio::task::spawn_blocking(move || extract_pdf(&data))
                .await
                .map_err(|e| ExtractionError::Pdf(format!("task join error: {e}")))?
        }
    }
}

/// Parse a PDF and join per-page text with newlines.
///
/// A page that fails to yield text contributes an empty segment.
pub fn extract_pdf(data: &[u8]) -> Result<String, ExtractionError> {
    let doc = lopdf::Document::load_mem(data).map_err(|e| ExtractionError::Pdf(e.to_string()))?;

    let pages = doc.get_pages();
    if pages.len() > MAX_PDF_PAGES {
        return Err(ExtractionError::TooManyPages {
            pages: pages.len(),
            max: MAX_PDF_PAGES,
        });
    }

    let segments: Vec<String> = pages
        .keys()
        .map(|&page_number| {
            doc.extract_text(&[page_number]).unwrap_or_else(|e| {
                debug!(page_number, error = %e, "Page yielded no text");
                String::new()
            })
        })
        .collect();

    info!(page_count = segments.len(), "PDF text extraction complete");
    Ok(segments.join("\n"))
}

#[cfg(test)]
mod tests {
    use lopdf::content::{Content, Operation};
    use lopdf::{Document, Object, Stream, dictionary};

    use super::*;

    /// Build an in-memory PDF with one line of text per page.
    fn build_pdf(page_texts: &[&str]) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });

        let mut kids: Vec<Object> = Vec::new();
        for text in page_texts {
            let content = Content {
                operations: vec![
                    Operation::new("BT", vec![]),
                    Operation::new("Tf", vec!["F1".into(), 12.into()]),
                    Operation::new("Td", vec![50.into(), 700.into()]),
                    Operation::new("Tj", vec![Object::string_literal(*text)]),
                    Operation::new("ET", vec![]),
                ],
            };
            let content_id =
                doc.add_object(Stream::new(dictionary! {}, content.encode().unwrap()));
            let page_id = doc.add_object(dictionary! {
                "Type" => "Page",
                "Parent" => pages_id,
                "Contents" => content_id,
                "Resources" => resources_id,
            });
            kids.push(page_id.into());
        }

        let pages = dictionary! {
            "Type" => "Pages",
            "Count" => kids.len() as i64,
            "Kids" => kids,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn file_kind_from_extension() {
        assert_eq!(FileKind::from_filename("email.txt"), Some(FileKind::Text));
        assert_eq!(FileKind::from_filename("EMAIL.PDF"), Some(FileKind::Pdf));
        assert_eq!(FileKind::from_filename("email.docx"), None);
        assert_eq!(FileKind::from_filename("txt"), None);
        assert_eq!(FileKind::from_filename(""), None);
    }

    #[tokio::test]
    async fn unsupported_extension_is_rejected() {
        let err = extract_text(EmailFile::new("email.docx", b"hi".to_vec()))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractionError::UnsupportedFormat { .. }));
    }

    #[tokio::test]
    async fn text_file_decodes_lossily() {
        let mut data = "Olá, tudo bem?".as_bytes().to_vec();
        data.push(0xFF);
        let text = extract_text(EmailFile::new("email.txt", data)).await.unwrap();
        assert!(text.starts_with("Olá, tudo bem?"));
        assert!(text.ends_with('\u{FFFD}'));
    }

    #[tokio::test]
    async fn oversized_file_is_rejected() {
        let data = vec![b'a'; MAX_FILE_BYTES + 1];
        let err = extract_text(EmailFile::new("email.txt", data)).await.unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::TooLarge { size, max } if size == MAX_FILE_BYTES + 1 && max == MAX_FILE_BYTES
        ));
    }

    #[tokio::test]
    async fn file_at_the_limit_is_accepted() {
        let data = vec![b'a'; MAX_FILE_BYTES];
        let text = extract_text(EmailFile::new("email.txt", data)).await.unwrap();
        assert_eq!(text.len(), MAX_FILE_BYTES);
    }

    #[tokio::test]
    async fn pdf_pages_are_joined() {
        let pdf = build_pdf(&["Primeira pagina", "Segunda pagina"]);
        let text = extract_text(EmailFile::new("email.pdf", pdf)).await.unwrap();
        assert!(text.contains("Primeira"));
        assert!(text.contains("Segunda"));
        assert!(text.contains('\n'));
    }

    #[test]
    fn pdf_over_page_limit_is_rejected() {
        let texts = vec!["x"; MAX_PDF_PAGES + 1];
        let err = extract_pdf(&build_pdf(&texts)).unwrap_err();
        assert!(matches!(
            err,
            ExtractionError::TooManyPages { pages, max } if pages == 101 && max == 100
        ));
    }

    #[test]
    fn pdf_at_page_limit_is_accepted() {
        let texts = vec!["x"; MAX_PDF_PAGES];
        assert!(extract_pdf(&build_pdf(&texts)).is_ok());
    }

    #[test]
    fn garbage_pdf_is_an_extraction_error() {
        let err = extract_pdf(b"definitely not a pdf").unwrap_err();
        assert!(matches!(err, ExtractionError::Pdf(_)));
    }
}
