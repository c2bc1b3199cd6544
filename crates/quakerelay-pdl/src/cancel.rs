use std::fmt;
use std::time::Duration;

use crate::client::ProductClientConfig;
use crate::error::PdlError;
use crate::event_code::EventCode;
use crate::message::OutboundMessage;
use crate::quakeml;
use crate::transmitter::{stdout_tail, TransmissionReport, Transmitter};

/// Phases of the two-part cancellation workflow, in execution order.
/// Failures carry the phase they happened in so an operator can tell a
/// broken template from a rejected transmission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelPhase {
    ComposingQuakeml,
    SendingOriginCancel,
    SendingDeletedText,
    Complete,
}

impl CancelPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            CancelPhase::ComposingQuakeml => "quakeml-compose",
            CancelPhase::SendingOriginCancel => "origin-cancel",
            CancelPhase::SendingDeletedText => "deleted-text",
            CancelPhase::Complete => "complete",
        }
    }
}

impl fmt::Display for CancelPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Transmission reports from both cancellation phases. Only produced when
/// the whole workflow succeeded; partial outcomes surface as
/// [`PdlError::CancelFailed`] instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CancelReport {
    pub origin_cancel: TransmissionReport,
    pub deleted_text: TransmissionReport,
}

impl CancelReport {
    pub fn skipped() -> Self {
        CancelReport {
            origin_cancel: TransmissionReport::skipped(),
            deleted_text: TransmissionReport::skipped(),
        }
    }
}

pub(crate) async fn run_cancel_workflow(
    tool: &ProductClientConfig,
    transmitter: &dyn Transmitter,
    code: &EventCode,
    follow_up_html: &str,
) -> Result<CancelReport, PdlError> {
    let mut phase = CancelPhase::ComposingQuakeml;
    tracing::info!(event_code = %code, %phase, "starting cancellation workflow");

    let quakeml_file =
        quakeml::build_cancel_document(&tool.quakeml_template, &tool.builds_dir, code)
            .map_err(|source| cancel_failed(phase, source))?;

    phase = CancelPhase::SendingOriginCancel;
    let origin_message = OutboundMessage::origin_cancellation(code.clone(), &quakeml_file);
    let origin_cancel = transmit_phase(tool, transmitter, phase, &origin_message).await?;

    // The follow-up text only makes sense once the origin has actually
    // been marked canceled upstream; a phase-1 failure stops here.
    phase = CancelPhase::SendingDeletedText;
    let text_message = OutboundMessage::deleted_text(code.clone(), follow_up_html);
    let deleted_text = transmit_phase(tool, transmitter, phase, &text_message).await?;

    tracing::info!(event_code = %code, phase = %CancelPhase::Complete, "cancellation workflow finished");
    Ok(CancelReport {
        origin_cancel,
        deleted_text,
    })
}

async fn transmit_phase(
    tool: &ProductClientConfig,
    transmitter: &dyn Transmitter,
    phase: CancelPhase,
    message: &OutboundMessage,
) -> Result<TransmissionReport, PdlError> {
    let args = message.command_args(tool);
    tracing::info!(
        event_code = %message.code,
        kind = message.kind.label(),
        %phase,
        command = ?args,
        "transmitting cancellation message"
    );
    let payload = message.inline_payload.as_deref().map(str::as_bytes);
    let report = transmitter
        .transmit(&args, payload, Duration::from_millis(tool.timeout_ms))
        .await
        .map_err(|source| cancel_failed(phase, source))?;
    if !report.success {
        tracing::warn!(
            event_code = %message.code,
            %phase,
            "phase finished without send confirmation, aborting workflow"
        );
        return Err(cancel_failed(
            phase,
            PdlError::TransmissionFailed {
                stdout_tail: stdout_tail(&report.stdout),
            },
        ));
    }
    Ok(report)
}

fn cancel_failed(phase: CancelPhase, source: PdlError) -> PdlError {
    PdlError::CancelFailed {
        phase,
        source: Box::new(source),
    }
}
