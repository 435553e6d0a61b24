//! Request body for document registration.

use serde::Serialize;

use crate::error::Result;

/// A signed document as sent to the registration endpoint.
///
/// Field order is part of the wire format: `document` first, then `sign`.
#[derive(Debug, Serialize)]
pub struct SubmissionRequest<'a, D: ?Sized> {
    /// The document itself, serialized as a nested JSON value
    pub document: &'a D,
    /// Signature over the document
    pub sign: &'a str,
}

impl<'a, D: Serialize + ?Sized> SubmissionRequest<'a, D> {
    pub fn new(document: &'a D, sign: &'a str) -> Self {
        Self { document, sign }
    }

    /// Serialize to the UTF-8 JSON request body.
    pub fn to_body(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
