use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::cancel::{self, CancelReport};
use crate::error::PdlError;
use crate::event_code::EventCode;
use crate::message::OutboundMessage;
use crate::transmitter::{stdout_tail, ProcessTransmitter, TransmissionReport, Transmitter};

/// Everything needed to drive one ProductClient installation: the JVM and
/// jar to invoke, the tool's own config and signing key, the cancellation
/// template and build workspace, plus the process-wide dry-run flag and
/// subprocess wait bound.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProductClientConfig {
    pub java_path: String,
    pub jar_path: String,
    pub config_file: String,
    pub private_key_path: String,
    pub quakeml_template: PathBuf,
    pub builds_dir: PathBuf,
    pub skip_send: bool,
    pub timeout_ms: u64,
}

/// Facade over the message flows: composes each outbound message, runs the
/// product client through the transmitter seam, and enforces the stdout
/// completion marker on every flow.
pub struct PdlClient {
    config: ProductClientConfig,
    transmitter: Box<dyn Transmitter>,
}

// The transmitter trait object has nothing useful to show.
impl fmt::Debug for PdlClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PdlClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl PdlClient {
    pub fn new(config: ProductClientConfig) -> Result<Self, PdlError> {
        Self::with_transmitter(config, Box::new(ProcessTransmitter))
    }

    /// Builds a client with an injected transmitter.
    pub fn with_transmitter(
        config: ProductClientConfig,
        transmitter: Box<dyn Transmitter>,
    ) -> Result<Self, PdlError> {
        if config.java_path.trim().is_empty() {
            return Err(PdlError::InvalidConfig("java path is empty".to_string()));
        }
        if config.jar_path.trim().is_empty() {
            return Err(PdlError::InvalidConfig(
                "product client jar path is empty".to_string(),
            ));
        }
        if config.config_file.trim().is_empty() {
            return Err(PdlError::InvalidConfig(
                "product client config path is empty".to_string(),
            ));
        }
        if config.private_key_path.trim().is_empty() {
            return Err(PdlError::InvalidConfig(
                "private key path is empty".to_string(),
            ));
        }
        if config.timeout_ms == 0 {
            return Err(PdlError::InvalidConfig(
                "transmit timeout must be greater than 0ms".to_string(),
            ));
        }
        Ok(Self {
            config,
            transmitter,
        })
    }

    pub fn config(&self) -> &ProductClientConfig {
        &self.config
    }

    /// Confirmation follow-up: the staged summary GeoJSON plus any fetched
    /// report files, sent as a CONFIRMED shake-alert product.
    pub async fn send_confirmation(
        &self,
        code: &EventCode,
        summary_json: &Path,
        extra_attachments: &[PathBuf],
    ) -> Result<TransmissionReport, PdlError> {
        let mut message = OutboundMessage::confirmation(code.clone(), summary_json);
        for attachment in extra_attachments {
            message = message.with_attachment(attachment);
        }
        self.dispatch(&message).await
    }

    /// Missed-alert follow-up: the staged html snippet, sent as a MISSED
    /// shake-alert product.
    pub async fn send_missed_alert(
        &self,
        code: &EventCode,
        follow_up_html: &Path,
    ) -> Result<TransmissionReport, PdlError> {
        self.dispatch(&OutboundMessage::missed_alert(code.clone(), follow_up_html))
            .await
    }

    /// Associates two networks' solutions for the same physical event.
    pub async fn send_association(
        &self,
        code: &EventCode,
        other: &EventCode,
    ) -> Result<TransmissionReport, PdlError> {
        self.dispatch(&OutboundMessage::association(code.clone(), other))
            .await
    }

    /// Runs the two-phase cancellation workflow: build the QuakeML delete
    /// document, send the origin cancel, then (only on success) send the
    /// false-alert follow-up text.
    pub async fn send_cancellation(
        &self,
        code: &EventCode,
        follow_up_html: &str,
    ) -> Result<CancelReport, PdlError> {
        if self.config.skip_send {
            tracing::info!(
                event_code = %code,
                "sending disabled by configuration, skipping cancellation workflow"
            );
            return Ok(CancelReport::skipped());
        }
        cancel::run_cancel_workflow(&self.config, self.transmitter.as_ref(), code, follow_up_html)
            .await
    }

    async fn dispatch(&self, message: &OutboundMessage) -> Result<TransmissionReport, PdlError> {
        if self.config.skip_send {
            tracing::info!(
                event_code = %message.code,
                kind = message.kind.label(),
                "sending disabled by configuration, skipping product client invocation"
            );
            return Ok(TransmissionReport::skipped());
        }
        let args = message.command_args(&self.config);
        tracing::info!(
            event_code = %message.code,
            kind = message.kind.label(),
            command = ?args,
            "transmitting message to pdl"
        );
        let payload = message.inline_payload.as_deref().map(str::as_bytes);
        let report = self
            .transmitter
            .transmit(&args, payload, Duration::from_millis(self.config.timeout_ms))
            .await?;
        if !report.success {
            return Err(PdlError::TransmissionFailed {
                stdout_tail: stdout_tail(&report.stdout),
            });
        }
        Ok(report)
    }
}
