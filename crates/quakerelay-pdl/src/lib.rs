//! Core protocol for relaying alert lifecycle follow-up messages to PDL.
mod cancel;
mod client;
mod error;
mod event_code;
mod message;
mod quakeml;
mod transmitter;

pub use cancel::{CancelPhase, CancelReport};
pub use client::{PdlClient, ProductClientConfig};
pub use error::PdlError;
pub use event_code::{EventCode, KNOWN_NETWORK_PREFIXES};
pub use message::{AlertStatus, MessageKind, OutboundMessage, EIDS_INPUT_WEDGE_CLASS};
pub use quakeml::build_cancel_document;
pub use transmitter::{
    classify_transmission, ProcessTransmitter, TransmissionReport, Transmitter,
    SEND_COMPLETE_MARKER,
};
