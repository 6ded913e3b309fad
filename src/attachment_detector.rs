use crate::traits::{MessageId, MimePartDescriptor};
use std::collections::{BTreeSet, HashMap};

const PDF_SUBTYPE: &str = "pdf";

/// Whether one of the immediate children of `descriptor` is a PDF part.
///
/// Only the first level is scanned. A PDF nested inside an inner
/// multipart container is not detected.
pub fn has_pdf_part(descriptor: &MimePartDescriptor) -> bool {
    descriptor
        .children
        .iter()
        .any(|child| child.subtype == PDF_SUBTYPE)
}

pub fn filter_messages_with_pdf(
    structures: &HashMap<MessageId, MimePartDescriptor>,
) -> BTreeSet<MessageId> {
    structures
        .iter()
        .filter(|(_, descriptor)| has_pdf_part(descriptor))
        .map(|(id, _)| *id)
        .collect()
}
