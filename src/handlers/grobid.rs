use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::config::ConversionSettings;
use crate::handlers::has_extension;

/// Failure talking to the GROBID conversion service.
#[derive(Error, Debug)]
pub enum ConversionError {
    /// The service could not be reached or did not answer its health check.
    #[error("Conversion service unavailable at {0}")]
    Unavailable(String),

    /// The service is up but has no free worker.
    #[error("Conversion service is busy, retry later")]
    Busy,

    /// The service refused or failed to convert the document.
    #[error("Document rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

#[derive(Debug, Clone, Copy)]
pub struct ConversionOptions {
    pub consolidate_header: bool,
    pub consolidate_citations: bool,
}

impl From<&ConversionSettings> for ConversionOptions {
    fn from(settings: &ConversionSettings) -> Self {
        Self {
            consolidate_header: settings.consolidate_header,
            consolidate_citations: settings.consolidate_citations,
        }
    }
}

#[derive(Debug, Default)]
pub struct ConversionReport {
    pub converted: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
}

pub struct GrobidClient {
    client: reqwest::Client,
    base_url: String,
}

impl GrobidClient {
    pub fn new(settings: &ConversionSettings) -> Result<Self, ConversionError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(settings.timeout))
            .build()?;

        Ok(Self {
            client,
            base_url: settings.base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn check_health(&self) -> bool {
        let url = format!("{}/api/isalive", self.base_url);
        match self.client.get(&url).timeout(Duration::from_secs(5)).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(e) => {
                debug!("Health check failed: {}", e);
                false
            }
        }
    }

    /// Convert one PDF into TEI markup.
    pub async fn process_fulltext(
        &self,
        path: &Path,
        options: &ConversionOptions,
    ) -> Result<String, ConversionError> {
        let bytes = tokio::fs::read(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "document.pdf".to_string());

        let form = Form::new()
            .part(
                "input",
                Part::bytes(bytes).file_name(file_name).mime_str("application/pdf")?,
            )
            .text("consolidateHeader", flag(options.consolidate_header))
            .text("consolidateCitations", flag(options.consolidate_citations));

        let url = format!("{}/api/processFulltextDocument", self.base_url);
        let response = self
            .client
            .post(&url)
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_connect() {
                    ConversionError::Unavailable(self.base_url.clone())
                } else {
                    ConversionError::Http(e)
                }
            })?;

        match response.status() {
            StatusCode::OK => Ok(response.text().await?),
            StatusCode::SERVICE_UNAVAILABLE => Err(ConversionError::Busy),
            status => {
                let message = response.text().await.unwrap_or_default();
                Err(ConversionError::Rejected {
                    status: status.as_u16(),
                    message,
                })
            }
        }
    }

    /// Convert every PDF below `input` into `output/<stem>.xml`. A failed
    /// document is recorded in the report and the batch continues.
    pub async fn convert_directory(
        &self,
        input: &Path,
        output: &Path,
        options: &ConversionOptions,
    ) -> Result<ConversionReport, ConversionError> {
        if !self.check_health().await {
            return Err(ConversionError::Unavailable(self.base_url.clone()));
        }

        tokio::fs::create_dir_all(output).await?;

        let mut pdfs: Vec<PathBuf> = WalkDir::new(input)
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| has_extension(path, "pdf"))
            .collect();
        pdfs.sort();

        info!("Converting {} PDF files from {}", pdfs.len(), input.display());

        let mut report = ConversionReport::default();
        for pdf in pdfs {
            let target = output.join(pdf.with_extension("xml").file_name().unwrap_or_default());
            match self.process_fulltext(&pdf, options).await {
                Ok(tei) => {
                    tokio::fs::write(&target, tei).await?;
                    debug!("Wrote {}", target.display());
                    report.converted.push(target);
                }
                Err(e) => {
                    warn!("Error processing file {}: {}", pdf.display(), e);
                    report.failed.push((pdf, e.to_string()));
                }
            }
        }

        Ok(report)
    }
}

fn flag(enabled: bool) -> &'static str {
    if enabled { "1" } else { "0" }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use std::fs;

    fn client(server: &mockito::Server) -> GrobidClient {
        GrobidClient::new(&ConversionSettings {
            base_url: format!("{}/", server.url()),
            consolidate_header: true,
            consolidate_citations: false,
            timeout: 5,
        })
        .unwrap()
    }

    const OPTIONS: ConversionOptions = ConversionOptions {
        consolidate_header: true,
        consolidate_citations: false,
    };

    #[tokio::test]
    async fn test_check_health() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/isalive")
            .with_status(200)
            .with_body("true")
            .create_async()
            .await;
        assert!(client(&server).check_health().await);
    }

    #[tokio::test]
    async fn test_process_fulltext_sends_options() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/processFulltextDocument")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#"name="consolidateHeader"\r\n\r\n1"#.to_string()),
                Matcher::Regex(r#"name="consolidateCitations"\r\n\r\n0"#.to_string()),
                Matcher::Regex(r#"filename="paper.pdf""#.to_string()),
            ]))
            .with_status(200)
            .with_body("<TEI/>")
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        let tei = client(&server).process_fulltext(&pdf, &OPTIONS).await.unwrap();
        assert_eq!(tei, "<TEI/>");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_status_codes_map_to_errors() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/processFulltextDocument")
            .with_status(503)
            .create_async()
            .await;

        let dir = tempfile::tempdir().unwrap();
        let pdf = dir.path().join("paper.pdf");
        fs::write(&pdf, b"%PDF-1.4").unwrap();

        let err = client(&server).process_fulltext(&pdf, &OPTIONS).await.unwrap_err();
        assert!(matches!(err, ConversionError::Busy));
    }

    #[tokio::test]
    async fn test_convert_directory_continues_after_failures() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/isalive")
            .with_status(200)
            .create_async()
            .await;
        server
            .mock("POST", "/api/processFulltextDocument")
            .match_body(Matcher::Regex(r#"filename="good.pdf""#.to_string()))
            .with_status(200)
            .with_body("<TEI>good</TEI>")
            .create_async()
            .await;
        server
            .mock("POST", "/api/processFulltextDocument")
            .match_body(Matcher::Regex(r#"filename="bad.pdf""#.to_string()))
            .with_status(500)
            .with_body("[NO_BLOCKS] PDF parsing failed")
            .create_async()
            .await;

        let input = tempfile::tempdir().unwrap();
        let output = tempfile::tempdir().unwrap();
        fs::write(input.path().join("good.pdf"), b"%PDF").unwrap();
        fs::write(input.path().join("bad.pdf"), b"%PDF").unwrap();
        fs::write(input.path().join("readme.txt"), b"skip").unwrap();

        let report = client(&server)
            .convert_directory(input.path(), output.path(), &OPTIONS)
            .await
            .unwrap();

        assert_eq!(report.converted, vec![output.path().join("good.xml")]);
        assert_eq!(report.failed.len(), 1);
        assert!(report.failed[0].1.contains("NO_BLOCKS"));
        assert_eq!(
            fs::read_to_string(output.path().join("good.xml")).unwrap(),
            "<TEI>good</TEI>"
        );
    }

    #[tokio::test]
    async fn test_convert_directory_requires_live_service() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/api/isalive")
            .with_status(503)
            .create_async()
            .await;

        let input = tempfile::tempdir().unwrap();
        let err = client(&server)
            .convert_directory(input.path(), input.path(), &OPTIONS)
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::Unavailable(_)));
    }
}
