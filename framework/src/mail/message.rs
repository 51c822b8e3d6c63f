//! Rendered email ready for a [`Mailer`](super::Mailer).

use std::path::Path;

use super::MailError;

/// The body content of an email.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailBody {
    /// Plain text only.
    Text(String),
    /// HTML only.
    Html(String),
    /// Both plain text and HTML (multipart/alternative).
    Multipart { text: String, html: String },
}

/// A file attached to an email, already read into memory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub filename: String,
    pub content_type: String,
    pub content: Vec<u8>,
}

impl Attachment {
    /// Read a file from disk. The content type is guessed from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, MailError> {
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| MailError::Attachment {
                path: path.to_path_buf(),
                source,
            })?;

        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("attachment")
            .to_string();

        Ok(Self {
            filename,
            content_type: content_type(path).to_string(),
            content,
        })
    }
}

fn content_type(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase()
        .as_str()
    {
        "pdf" => "application/pdf",
        "txt" => "text/plain",
        "csv" => "text/csv",
        "html" | "htm" => "text/html",
        "json" => "application/json",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "gif" => "image/gif",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

/// A complete email message ready to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    /// Sender address. `None` uses the mailer's configured default.
    pub from: Option<String>,
    pub to: String,
    pub subject: String,
    pub body: EmailBody,
    pub attachments: Vec<Attachment>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guesses_content_type_from_extension() {
        assert_eq!(content_type(Path::new("invoice.PDF")), "application/pdf");
        assert_eq!(content_type(Path::new("notes.txt")), "text/plain");
        assert_eq!(content_type(Path::new("blob")), "application/octet-stream");
    }

    #[tokio::test]
    async fn reads_attachment_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("report.csv");
        std::fs::write(&path, "a,b\n1,2\n").unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();

        assert_eq!(attachment.filename, "report.csv");
        assert_eq!(attachment.content_type, "text/csv");
        assert_eq!(attachment.content, b"a,b\n1,2\n");
    }

    #[tokio::test]
    async fn missing_attachment_reports_path() {
        let err = Attachment::from_path(Path::new("/nonexistent/invoice.pdf"))
            .await
            .unwrap_err();

        match err {
            MailError::Attachment { path, .. } => {
                assert_eq!(path, Path::new("/nonexistent/invoice.pdf"))
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
