//! Multipart body reconstruction.
//!
//! The inbound payload describes a form as a JSON array:
//!
//! ```text
//! [
//!   {"some-number": 4},                         → field "some-number" = "4"
//!   {"formParameterName": "data1",              → file part read from `uri`
//!    "originalFileName": "filename.txt",
//!    "contentType": "text/plain",
//!    "uri": "classpath:128b_file"}
//! ]
//! ```
//!
//! Parts are resolved to bytes here, before dispatch, so a bad reference
//! fails the request without any HTTP call.

use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::storage::resource::{ResourceError, SharedResourceStore};

const FORM_PARAMETER_NAME: &str = "formParameterName";

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("multipart payload is not valid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("multipart payload must be a JSON array")]
    NotAnArray,

    #[error("part '{0}' has neither 'uri' nor 'value'")]
    MissingContent(String),

    #[error("part '{name}' has invalid content type '{content_type}'")]
    InvalidContentType { name: String, content_type: String },

    #[error("cannot resolve '{uri}' for part '{name}': {source}")]
    Unresolvable {
        name: String,
        uri: String,
        #[source]
        source: ResourceError,
    },
}

/// True for `multipart/form-data` (parameters ignored).
pub fn is_multipart(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .map(|essence| essence.trim().eq_ignore_ascii_case("multipart/form-data"))
        .unwrap_or(false)
}

/// A described file part, as it appears in the payload.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FilePartSpec {
    form_parameter_name: String,
    original_file_name: Option<String>,
    content_type: Option<String>,
    uri: Option<String>,
    value: Option<Value>,
}

/// A resolved form part.
#[derive(Debug, Clone, PartialEq)]
pub enum MultipartPart {
    Field {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: Option<String>,
        content_type: String,
        content: Bytes,
    },
}

impl MultipartPart {
    pub fn name(&self) -> &str {
        match self {
            MultipartPart::Field { name, .. } | MultipartPart::File { name, .. } => name,
        }
    }
}

/// Ordered, fully resolved multipart body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultipartBody {
    parts: Vec<MultipartPart>,
}

impl MultipartBody {
    pub fn parts(&self) -> &[MultipartPart] {
        &self.parts
    }

    /// Sum of part content sizes (framing excluded).
    pub fn content_len(&self) -> usize {
        self.parts
            .iter()
            .map(|p| match p {
                MultipartPart::Field { value, .. } => value.len(),
                MultipartPart::File { content, .. } => content.len(),
            })
            .sum()
    }

    /// Render as a reqwest form. The form owns the boundary and sets the
    /// matching `Content-Type` when attached to a request.
    pub fn to_form(&self) -> Form {
        self.parts.iter().fold(Form::new(), |form, part| match part {
            MultipartPart::Field { name, value } => form.text(name.clone(), value.clone()),
            MultipartPart::File {
                name,
                file_name,
                content_type,
                content,
            } => {
                let mut file = Part::bytes(content.to_vec());
                if let Some(file_name) = file_name {
                    file = file.file_name(file_name.clone());
                }
                // content types were validated at assembly
                let file = match file.mime_str(content_type) {
                    Ok(typed) => typed,
                    Err(_) => Part::bytes(content.to_vec()),
                };
                form.part(name.clone(), file)
            }
        })
    }
}

/// Resolves a JSON part description into a `MultipartBody`.
#[derive(Debug, Clone)]
pub struct MultipartAssembler {
    store: SharedResourceStore,
}

impl MultipartAssembler {
    pub fn new(store: SharedResourceStore) -> Self {
        Self { store }
    }

    pub async fn assemble(&self, payload: &[u8]) -> Result<MultipartBody, AssemblyError> {
        let elements = match serde_json::from_slice::<Value>(payload)? {
            Value::Array(elements) => elements,
            _ => return Err(AssemblyError::NotAnArray),
        };

        let mut parts = Vec::with_capacity(elements.len());
        for (index, element) in elements.into_iter().enumerate() {
            match element {
                Value::Object(map) if map.contains_key(FORM_PARAMETER_NAME) => {
                    let spec: FilePartSpec = serde_json::from_value(Value::Object(map))?;
                    parts.push(self.resolve_file(spec).await?);
                }
                Value::Object(map) => {
                    for (name, value) in map {
                        parts.push(MultipartPart::Field {
                            name,
                            value: field_text(&value),
                        });
                    }
                }
                scalar => parts.push(MultipartPart::Field {
                    name: index.to_string(),
                    value: field_text(&scalar),
                }),
            }
        }

        Ok(MultipartBody { parts })
    }

    async fn resolve_file(&self, spec: FilePartSpec) -> Result<MultipartPart, AssemblyError> {
        let name = spec.form_parameter_name;
        let content_type = spec
            .content_type
            .unwrap_or_else(|| mime::APPLICATION_OCTET_STREAM.to_string());
        if content_type.parse::<mime::Mime>().is_err() {
            return Err(AssemblyError::InvalidContentType { name, content_type });
        }

        let content = match (spec.uri, spec.value) {
            (Some(uri), _) => match self.store.read(&uri).await {
                Ok(bytes) => bytes,
                Err(source) => return Err(AssemblyError::Unresolvable { name, uri, source }),
            },
            (None, Some(value)) => Bytes::from(field_text(&value)),
            (None, None) => return Err(AssemblyError::MissingContent(name)),
        };

        Ok(MultipartPart::File {
            name,
            file_name: spec.original_file_name,
            content_type,
            content,
        })
    }
}

/// Strings verbatim, everything else as compact JSON; null is empty.
fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}
