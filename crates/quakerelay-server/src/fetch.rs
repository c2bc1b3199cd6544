use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};

const FETCH_TIMEOUT: Duration = Duration::from_secs(30);

const CONTENTS_XML_NAME: &str = "contents.xml";
const SUMMARY_PDF_NAME: &str = "summary.pdf";

/// Downloads report attachments from the review console into the staging
/// directory. Redirects stay enabled; the console serves these urls from
/// behind a reverse proxy.
pub(crate) struct AttachmentFetcher {
    http: reqwest::Client,
    work_dir: PathBuf,
}

impl AttachmentFetcher {
    pub(crate) fn new(work_dir: PathBuf) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .context("failed to build attachment http client")?;
        Ok(Self { http, work_dir })
    }

    /// Stages the product manifest as `<work_dir>/contents.xml`.
    pub(crate) async fn fetch_contents_xml(&self, url: &str) -> Result<PathBuf> {
        self.download(url, CONTENTS_XML_NAME).await
    }

    /// Stages the post-alert summary report as `<work_dir>/summary.pdf`.
    pub(crate) async fn fetch_summary_pdf(&self, url: &str) -> Result<PathBuf> {
        self.download(url, SUMMARY_PDF_NAME).await
    }

    async fn download(&self, url: &str, file_name: &str) -> Result<PathBuf> {
        let response = self
            .http
            .get(url)
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?
            .error_for_status()
            .with_context(|| format!("request to {url} failed"))?;
        let bytes = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;
        let target = self.work_dir.join(file_name);
        tokio::fs::write(&target, &bytes)
            .await
            .with_context(|| format!("failed to write {}", target.display()))?;
        tracing::info!(url, path = %target.display(), bytes = bytes.len(), "attachment staged");
        Ok(target)
    }
}
