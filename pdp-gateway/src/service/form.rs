use std::collections::HashMap;

use axum::body::Bytes;
use axum::extract::Multipart;
use tracing::debug;

use crate::error::AppError;
use crate::pdp::ServiceTarget;

pub struct FilePart {
    pub filename: String,
    pub bytes: Bytes,
}

/// A multipart upload form read in full: text fields by name plus the `file` part.
#[derive(Default)]
pub struct UploadForm {
    fields: HashMap<String, String>,
    file: Option<FilePart>,
}

impl UploadForm {
    pub async fn read(mut multipart: Multipart) -> Result<Self, AppError> {
        let mut form = UploadForm::default();
        while let Some(field) = multipart.next_field().await? {
            let Some(name) = field.name().map(str::to_string) else {
                continue;
            };
            if name == "file" {
                let filename = field.file_name().unwrap_or("upload").to_string();
                let bytes = field.bytes().await?;
                debug!("Received file {} ({} bytes)", filename, bytes.len());
                form.file = Some(FilePart { filename, bytes });
            } else {
                let value = field.text().await?;
                form.fields.insert(name, value);
            }
        }
        Ok(form)
    }

    /// The trimmed field value; blank counts as absent.
    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }

    pub fn owned(&self, name: &str) -> Option<String> {
        self.field(name).map(str::to_string)
    }

    pub fn service(&self) -> ServiceTarget {
        ServiceTarget::new(
            self.field("serviceUrl").unwrap_or_default(),
            self.field("serviceName").unwrap_or_default(),
        )
    }

    pub fn take_file(&mut self) -> Result<FilePart, AppError> {
        self.file
            .take()
            .ok_or_else(|| AppError::BadRequest("file is required".to_string()))
    }
}

/// Splits a comma separated list, dropping blank entries.
pub fn split_keywords(raw: Option<&str>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_keywords() {
        assert_eq!(
            split_keywords(Some(" physics, quantum ,,optics")),
            ["physics", "quantum", "optics"]
        );
        assert!(split_keywords(None).is_empty());
        assert!(split_keywords(Some("  ")).is_empty());
    }

    #[test]
    fn test_blank_field_is_absent() {
        let mut form = UploadForm::default();
        form.fields.insert("proofSetID".into(), "  ".into());
        form.fields.insert("title".into(), " Dots ".into());
        assert_eq!(form.field("proofSetID"), None);
        assert_eq!(form.field("title"), Some("Dots"));
        assert!(form.take_file().is_err());
    }
}
