use crate::attachment_store::FileAttachmentStore;
use crate::error::ExtractError;
use crate::traits::AttachmentStore;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use regex::Regex;
use std::fmt;
use std::path::PathBuf;
use std::sync::{Arc, OnceLock};

// Content-Type line of the PDF part plus any part headers directly after it
// (Content-Transfer-Encoding, Content-Disposition, folded continuations).
// Other parameters may come before `name`. Base64 lines never contain ':'
// so they are not swallowed.
const PDF_HEADER_PATTERN: &str = concat!(
    r"(?i:content-type):[ \t]*(?i:application/pdf)",
    r#"(?:;\s*[A-Za-z][A-Za-z0-9_.-]*=(?:"[^"]*"|[^;"\s]*))*"#,
    r#";\s*name="(?P<name>[A-Za-z_-]*[0-9]+\.pdf)""#,
    r"[^\r\n]*(?:\r?\n[ \t]+[^\r\n]*)*",
    r"(?:\r?\n[A-Za-z][A-Za-z0-9-]*:[^\r\n]*(?:\r?\n[ \t]+[^\r\n]*)*)*",
);

const CLOSING_BOUNDARY_PATTERN: &str = r"--[A-Za-z0-9]+--";

fn pdf_header_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(PDF_HEADER_PATTERN).expect("valid PDF header regex"))
}

fn closing_boundary_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(CLOSING_BOUNDARY_PATTERN).expect("valid boundary regex"))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedAttachment {
    pub filename: String,
    pub payload: Vec<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoPdfHeader,
    NoClosingBoundary,
    EmptyPayload,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            SkipReason::NoPdfHeader => "no PDF content-type header found",
            SkipReason::NoClosingBoundary => "no closing boundary found after PDF header",
            SkipReason::EmptyPayload => "PDF part has an empty payload",
        };
        f.write_str(reason)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum Extraction {
    Found(ExtractedAttachment),
    Skip(SkipReason),
}

#[derive(Debug, PartialEq, Eq)]
pub enum ExtractOutcome {
    Saved { path: PathBuf, size: usize },
    Skipped(SkipReason),
}

/// Carves the first PDF attachment out of a raw message body.
///
/// Only the first PDF header is considered. Its payload runs up to the
/// first `--boundary--` marker after it.
pub fn locate_pdf(raw_body: &str) -> Result<Extraction, ExtractError> {
    let Some(header) = pdf_header_regex().captures(raw_body) else {
        return Ok(Extraction::Skip(SkipReason::NoPdfHeader));
    };

    // both groups are mandatory in the pattern
    let (Some(whole), Some(name)) = (header.get(0), header.name("name")) else {
        return Ok(Extraction::Skip(SkipReason::NoPdfHeader));
    };
    let filename = name.as_str().to_string();

    let rest = &raw_body[whole.end()..];
    let Some(boundary) = closing_boundary_regex().find(rest) else {
        return Ok(Extraction::Skip(SkipReason::NoClosingBoundary));
    };

    let encoded: String = rest[..boundary.start()]
        .trim()
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    if encoded.is_empty() {
        return Ok(Extraction::Skip(SkipReason::EmptyPayload));
    }

    let payload = STANDARD
        .decode(encoded.as_bytes())
        .map_err(|source| ExtractError::Decode {
            filename: filename.clone(),
            source,
        })?;

    Ok(Extraction::Found(ExtractedAttachment { filename, payload }))
}

pub struct PdfExtractor {
    destination_folder: Option<PathBuf>,
    store: Arc<dyn AttachmentStore>,
}

impl PdfExtractor {
    pub fn new(destination_folder: Option<PathBuf>) -> Self {
        Self {
            destination_folder,
            store: Arc::new(FileAttachmentStore),
        }
    }

    // For testing
    #[allow(dead_code)]
    pub fn new_with_store(
        destination_folder: Option<PathBuf>,
        store: Arc<dyn AttachmentStore>,
    ) -> Self {
        Self {
            destination_folder,
            store,
        }
    }

    // The header pattern only admits `[A-Za-z_-]*[0-9]+.pdf`, so the name
    // cannot carry a separator or `..`
    pub fn output_path(&self, filename: &str) -> PathBuf {
        match &self.destination_folder {
            Some(folder) => folder.join(filename),
            None => PathBuf::from(filename),
        }
    }

    pub async fn extract(&self, raw_body: &str) -> Result<ExtractOutcome, ExtractError> {
        let attachment = match locate_pdf(raw_body)? {
            Extraction::Found(attachment) => attachment,
            Extraction::Skip(reason) => return Ok(ExtractOutcome::Skipped(reason)),
        };

        let path = self.output_path(&attachment.filename);
        self.store
            .save(&path, &attachment.payload)
            .await
            .map_err(|source| ExtractError::Write {
                path: path.clone(),
                source,
            })?;

        Ok(ExtractOutcome::Saved {
            path,
            size: attachment.payload.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::MockAttachmentStore;
    use std::io;

    const PDF_BYTES: &[u8] = b"%PDF-1.4\n1 0 obj\n<< /Type /Catalog >>\nendobj\n%%EOF\n";

    fn wrapped_base64(bytes: &[u8]) -> String {
        let encoded = STANDARD.encode(bytes);
        encoded
            .as_bytes()
            .chunks(20)
            .map(|line| String::from_utf8_lossy(line).into_owned())
            .collect::<Vec<_>>()
            .join("\r\n")
    }

    fn order_body(payload: &str) -> String {
        format!(
            "--BOUNDARY\r\n\
             Content-Type: text/plain; charset=utf-8\r\n\r\n\
             Thanks for your order.\r\n\r\n\
             --BOUNDARY\r\n\
             Content-Type: application/pdf; name=\"sainsburys_groceries_order_123.pdf\"\r\n\r\n\
             {}\r\n\r\n\
             --BOUNDARY--\r\n",
            payload
        )
    }

    #[test]
    fn test_round_trip() {
        let body = order_body(&wrapped_base64(PDF_BYTES));

        let extraction = locate_pdf(&body).unwrap();

        assert_eq!(
            extraction,
            Extraction::Found(ExtractedAttachment {
                filename: "sainsburys_groceries_order_123.pdf".to_string(),
                payload: PDF_BYTES.to_vec(),
            })
        );
    }

    #[test]
    fn test_part_headers_after_content_type_are_skipped() {
        let body = format!(
            "--b1\r\n\
             Content-Type: application/pdf;\r\n\tname=\"order_77.pdf\"\r\n\
             Content-Transfer-Encoding: base64\r\n\
             Content-Disposition: attachment;\r\n\tfilename=\"order_77.pdf\"\r\n\r\n\
             {}\r\n\
             --b1--\r\n",
            wrapped_base64(PDF_BYTES)
        );

        match locate_pdf(&body).unwrap() {
            Extraction::Found(attachment) => {
                assert_eq!(attachment.filename, "order_77.pdf");
                assert_eq!(attachment.payload, PDF_BYTES);
            }
            other => panic!("expected an attachment, got {:?}", other),
        }
    }

    #[test]
    fn test_digits_only_filename() {
        let body = format!(
            "Content-Type: application/pdf; name=\"4401.pdf\"\n\n{}\n--x1--",
            STANDARD.encode(b"abc")
        );
        match locate_pdf(&body).unwrap() {
            Extraction::Found(attachment) => assert_eq!(attachment.filename, "4401.pdf"),
            other => panic!("expected an attachment, got {:?}", other),
        }
    }

    #[test]
    fn test_parameters_before_name() {
        let body = format!(
            "Content-Type: application/pdf; charset=binary; name=\"order_1.pdf\"\r\n\r\n{}\r\n--B1--",
            STANDARD.encode(b"abc")
        );
        match locate_pdf(&body).unwrap() {
            Extraction::Found(attachment) => {
                assert_eq!(attachment.filename, "order_1.pdf");
                assert_eq!(attachment.payload, b"abc");
            }
            other => panic!("expected an attachment, got {:?}", other),
        }

        let quoted = format!(
            "Content-Type: application/pdf; x-note=\"a; b\";\r\n\tname=\"order_2.pdf\"\r\n\r\n{}\r\n--B1--",
            STANDARD.encode(b"abc")
        );
        match locate_pdf(&quoted).unwrap() {
            Extraction::Found(attachment) => assert_eq!(attachment.filename, "order_2.pdf"),
            other => panic!("expected an attachment, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_header_is_skip() {
        let body = "--BOUNDARY\r\nContent-Type: text/plain\r\n\r\nhello\r\n--BOUNDARY--\r\n";
        assert_eq!(
            locate_pdf(body).unwrap(),
            Extraction::Skip(SkipReason::NoPdfHeader)
        );
    }

    #[test]
    fn test_filename_without_order_number_is_skip() {
        let body = "Content-Type: application/pdf; name=\"terms.pdf\"\r\n\r\nQUJD\r\n--B--";
        assert_eq!(
            locate_pdf(body).unwrap(),
            Extraction::Skip(SkipReason::NoPdfHeader)
        );
    }

    #[test]
    fn test_missing_closing_boundary_is_skip() {
        let body = format!(
            "Content-Type: application/pdf; name=\"sainsburys_groceries_order_123.pdf\"\r\n\r\n{}\r\n--BOUNDARY\r\n",
            wrapped_base64(PDF_BYTES)
        );
        assert_eq!(
            locate_pdf(&body).unwrap(),
            Extraction::Skip(SkipReason::NoClosingBoundary)
        );
    }

    #[test]
    fn test_boundary_before_header_is_ignored() {
        let body = format!(
            "--EARLY--\r\nContent-Type: application/pdf; name=\"order_5.pdf\"\r\n\r\n{}\r\n",
            STANDARD.encode(b"abc")
        );
        assert_eq!(
            locate_pdf(&body).unwrap(),
            Extraction::Skip(SkipReason::NoClosingBoundary)
        );
    }

    #[test]
    fn test_invalid_base64_is_decode_error() {
        let body = order_body("JVBERi0x!!not*base64");
        match locate_pdf(&body) {
            Err(ExtractError::Decode { filename, .. }) => {
                assert_eq!(filename, "sainsburys_groceries_order_123.pdf")
            }
            other => panic!("expected a decode error, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_payload_is_skip() {
        let body = order_body("");
        assert_eq!(
            locate_pdf(&body).unwrap(),
            Extraction::Skip(SkipReason::EmptyPayload)
        );
    }

    #[test]
    fn test_only_first_pdf_is_extracted() {
        let body = format!(
            "Content-Type: application/pdf; name=\"order_1.pdf\"\r\n\r\n{}\r\n--A1--\r\n\
             Content-Type: application/pdf; name=\"order_2.pdf\"\r\n\r\n{}\r\n--A1--\r\n",
            STANDARD.encode(b"first"),
            STANDARD.encode(b"second")
        );
        assert_eq!(
            locate_pdf(&body).unwrap(),
            Extraction::Found(ExtractedAttachment {
                filename: "order_1.pdf".to_string(),
                payload: b"first".to_vec(),
            })
        );
    }

    #[tokio::test]
    async fn test_extract_saves_into_destination_folder() {
        let mut store = MockAttachmentStore::new();
        store
            .expect_save()
            .withf(|path, contents| {
                path.to_path_buf() == PathBuf::from("invoices/sainsburys_groceries_order_123.pdf")
                    && contents.to_vec() == PDF_BYTES.to_vec()
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let extractor =
            PdfExtractor::new_with_store(Some(PathBuf::from("invoices")), Arc::new(store));
        let outcome = extractor
            .extract(&order_body(&wrapped_base64(PDF_BYTES)))
            .await
            .unwrap();

        assert_eq!(
            outcome,
            ExtractOutcome::Saved {
                path: PathBuf::from("invoices/sainsburys_groceries_order_123.pdf"),
                size: PDF_BYTES.len(),
            }
        );
    }

    #[tokio::test]
    async fn test_extract_without_destination_uses_bare_filename() {
        let mut store = MockAttachmentStore::new();
        store
            .expect_save()
            .withf(|path, _| path.to_path_buf() == PathBuf::from("sainsburys_groceries_order_123.pdf"))
            .times(1)
            .returning(|_, _| Ok(()));

        let extractor = PdfExtractor::new_with_store(None, Arc::new(store));
        let outcome = extractor
            .extract(&order_body(&wrapped_base64(PDF_BYTES)))
            .await
            .unwrap();

        assert!(matches!(outcome, ExtractOutcome::Saved { .. }));
    }

    #[tokio::test]
    async fn test_skip_and_decode_failure_never_write() {
        let mut store = MockAttachmentStore::new();
        store.expect_save().times(0);
        let extractor = PdfExtractor::new_with_store(None, Arc::new(store));

        let skipped = extractor.extract("no attachment here").await.unwrap();
        assert_eq!(skipped, ExtractOutcome::Skipped(SkipReason::NoPdfHeader));

        let unterminated = extractor
            .extract("Content-Type: application/pdf; name=\"order_9.pdf\"\r\n\r\nQUJD\r\n")
            .await
            .unwrap();
        assert_eq!(
            unterminated,
            ExtractOutcome::Skipped(SkipReason::NoClosingBoundary)
        );

        let corrupt = extractor.extract(&order_body("@@@@")).await;
        assert!(matches!(corrupt, Err(ExtractError::Decode { .. })));
    }

    #[tokio::test]
    async fn test_write_failure_is_write_error() {
        let mut store = MockAttachmentStore::new();
        store
            .expect_save()
            .times(1)
            .returning(|_, _| Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only")));

        let extractor = PdfExtractor::new_with_store(None, Arc::new(store));
        let result = extractor.extract(&order_body(&wrapped_base64(PDF_BYTES))).await;

        match result {
            Err(ExtractError::Write { path, .. }) => {
                assert_eq!(path, PathBuf::from("sainsburys_groceries_order_123.pdf"))
            }
            other => panic!("expected a write error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_extract_writes_real_file() {
        let dir = tempfile::tempdir().unwrap();
        let extractor = PdfExtractor::new(Some(dir.path().to_path_buf()));

        extractor
            .extract(&order_body(&wrapped_base64(PDF_BYTES)))
            .await
            .unwrap();

        let written = std::fs::read(dir.path().join("sainsburys_groceries_order_123.pdf")).unwrap();
        assert_eq!(written, PDF_BYTES);
    }
}
