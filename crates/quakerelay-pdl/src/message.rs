use std::path::PathBuf;

use crate::client::ProductClientConfig;
use crate::event_code::EventCode;

/// Main class handed to ProductClient for origin cancellations; routes the
/// QuakeML file through the EIDS input wedge instead of the normal sender.
pub const EIDS_INPUT_WEDGE_CLASS: &str = "gov.usgs.earthquake.eids.EIDSInputWedge";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertStatus {
    Confirmed,
    Missed,
}

impl AlertStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertStatus::Confirmed => "CONFIRMED",
            AlertStatus::Missed => "MISSED",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageKind {
    ShakeAlert { status: AlertStatus },
    Associate,
    CancelOrigin,
    DeletedText,
}

impl MessageKind {
    pub fn label(self) -> &'static str {
        match self {
            MessageKind::ShakeAlert { .. } => "shake-alert",
            MessageKind::Associate => "associate",
            MessageKind::CancelOrigin => "cancel-origin",
            MessageKind::DeletedText => "deleted-text",
        }
    }
}

/// One outbound PDL transmission: a message kind plus the event it refers
/// to, optional file attachments, extra product properties, and an optional
/// payload piped to the product client's stdin. Built per request and
/// consumed immediately by the transmitter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub kind: MessageKind,
    pub code: EventCode,
    pub attachments: Vec<PathBuf>,
    pub properties: Vec<(String, String)>,
    pub inline_payload: Option<String>,
}

fn review_status_property() -> (String, String) {
    ("review-status".to_string(), "reviewed".to_string())
}

impl OutboundMessage {
    /// Alert confirmation follow-up carrying the summary GeoJSON file.
    pub fn confirmation(code: EventCode, summary_json: impl Into<PathBuf>) -> Self {
        OutboundMessage {
            kind: MessageKind::ShakeAlert {
                status: AlertStatus::Confirmed,
            },
            code,
            attachments: vec![summary_json.into()],
            properties: vec![review_status_property()],
            inline_payload: None,
        }
    }

    /// Missed-alert follow-up carrying the html snippet file.
    pub fn missed_alert(code: EventCode, follow_up_html: impl Into<PathBuf>) -> Self {
        OutboundMessage {
            kind: MessageKind::ShakeAlert {
                status: AlertStatus::Missed,
            },
            code,
            attachments: vec![follow_up_html.into()],
            properties: vec![review_status_property()],
            inline_payload: None,
        }
    }

    /// Associates `code` with another network's solution for the same event.
    pub fn association(code: EventCode, other: &EventCode) -> Self {
        OutboundMessage {
            kind: MessageKind::Associate,
            code,
            attachments: Vec::new(),
            properties: vec![
                ("othereventsource".to_string(), other.source().to_string()),
                ("othereventsourcecode".to_string(), other.code().to_string()),
            ],
            inline_payload: None,
        }
    }

    /// Cancels the origin product by sending a QuakeML delete document
    /// through the EIDS input wedge.
    pub fn origin_cancellation(code: EventCode, quakeml_file: impl Into<PathBuf>) -> Self {
        OutboundMessage {
            kind: MessageKind::CancelOrigin,
            code,
            attachments: vec![quakeml_file.into()],
            properties: Vec::new(),
            inline_payload: None,
        }
    }

    /// False-alert follow-up text, delivered on the product client's stdin.
    pub fn deleted_text(code: EventCode, follow_up_html: impl Into<String>) -> Self {
        OutboundMessage {
            kind: MessageKind::DeletedText,
            code,
            attachments: Vec::new(),
            properties: Vec::new(),
            inline_payload: Some(follow_up_html.into()),
        }
    }

    /// Appends an attachment after any the constructor added. Order is
    /// preserved; the product client lets later files shadow earlier ones
    /// with the same logical role.
    pub fn with_attachment(mut self, path: impl Into<PathBuf>) -> Self {
        self.attachments.push(path.into());
        self
    }

    /// Renders the full ProductClient argument vector for this message.
    ///
    /// Positions 0 through 2 (java executable, `-jar`, jar path) are the
    /// only ones the tool requires literally in order; the remainder is
    /// emitted in a stable order but the tool accepts any permutation.
    /// `--privateKey=` is omitted for deleted-text messages, which the
    /// wedge-side config signs itself.
    pub fn command_args(&self, tool: &ProductClientConfig) -> Vec<String> {
        let mut args = vec![
            tool.java_path.clone(),
            "-jar".to_string(),
            tool.jar_path.clone(),
            "--send".to_string(),
            format!("--source={}", self.code.source()),
        ];

        match self.kind {
            MessageKind::ShakeAlert { status } => {
                args.push("--type=shake-alert".to_string());
                args.push(format!("--code={}", self.code.combined()));
                args.push(format!("--eventsource={}", self.code.source()));
                args.push(format!("--eventsourcecode={}", self.code.code()));
                args.push(format!("--status={}", status.as_str()));
            }
            MessageKind::Associate => {
                args.push(format!("--code={}", self.code.combined()));
                args.push("--type=associate".to_string());
                args.push(format!("--eventsource={}", self.code.source()));
                args.push(format!("--eventsourcecode={}", self.code.code()));
            }
            MessageKind::CancelOrigin => {
                args.push(format!("--code={}", self.code.combined()));
                args.push(format!("--mainclass={EIDS_INPUT_WEDGE_CLASS}"));
            }
            MessageKind::DeletedText => {
                args.push("--type=deleted-text".to_string());
                args.push(format!("--code={}", self.code.combined()));
                args.push(format!("--eventsource={}", self.code.source()));
                args.push(format!("--eventsourcecode={}", self.code.code()));
                args.push("--content".to_string());
                args.push("--content-type=text/html".to_string());
            }
        }

        for path in &self.attachments {
            args.push(format!("--file={}", path.display()));
        }
        if self.kind != MessageKind::DeletedText {
            args.push(format!("--privateKey={}", tool.private_key_path));
        }
        for (key, value) in &self.properties {
            args.push(format!("--property-{key}={value}"));
        }
        args.push(format!("--configFile={}", tool.config_file));
        args
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tool_config() -> ProductClientConfig {
        ProductClientConfig {
            java_path: "/usr/bin/java".to_string(),
            jar_path: "/opt/pdl/ProductClient.jar".to_string(),
            config_file: "/opt/pdl/ProductClient.ini".to_string(),
            private_key_path: "/opt/pdl/id_rsa".to_string(),
            quakeml_template: PathBuf::from("params/quakeml_cancel_template.xml"),
            builds_dir: PathBuf::from("builds"),
            skip_send: false,
            timeout_ms: 30_000,
        }
    }

    fn count(args: &[String], wanted: &str) -> usize {
        args.iter().filter(|arg| arg.as_str() == wanted).count()
    }

    fn parse(raw: &str) -> EventCode {
        EventCode::parse(raw).expect("event code")
    }

    #[test]
    fn functional_confirmation_args_match_tool_contract() {
        let message = OutboundMessage::confirmation(parse("ew1659991460"), "summary.json")
            .with_attachment("/staging/contents.xml")
            .with_attachment("/staging/summary.pdf");
        let args = message.command_args(&tool_config());

        assert_eq!(args[0], "/usr/bin/java");
        assert_eq!(args[1], "-jar");
        assert_eq!(args[2], "/opt/pdl/ProductClient.jar");

        let expected = [
            "--send",
            "--source=ew",
            "--type=shake-alert",
            "--code=ew1659991460",
            "--eventsource=ew",
            "--eventsourcecode=1659991460",
            "--property-review-status=reviewed",
            "--status=CONFIRMED",
            "--file=summary.json",
            "--file=/staging/contents.xml",
            "--file=/staging/summary.pdf",
            "--privateKey=/opt/pdl/id_rsa",
            "--configFile=/opt/pdl/ProductClient.ini",
        ];
        for option in expected {
            assert_eq!(count(&args, option), 1, "expected exactly one {option}");
        }
        assert_eq!(args.len(), 3 + expected.len());
    }

    #[test]
    fn unit_attachment_order_is_preserved() {
        let message = OutboundMessage::confirmation(parse("ew1659991460"), "summary.json")
            .with_attachment("first.xml")
            .with_attachment("second.pdf");
        let args = message.command_args(&tool_config());
        let files: Vec<&String> = args
            .iter()
            .filter(|arg| arg.starts_with("--file="))
            .collect();
        assert_eq!(
            files,
            ["--file=summary.json", "--file=first.xml", "--file=second.pdf"]
        );
    }

    #[test]
    fn unit_missed_alert_args_use_missed_status() {
        let message = OutboundMessage::missed_alert(parse("ci12345678"), "missing.html");
        let args = message.command_args(&tool_config());
        assert_eq!(count(&args, "--status=MISSED"), 1);
        assert_eq!(count(&args, "--type=shake-alert"), 1);
        assert_eq!(count(&args, "--file=missing.html"), 1);
        assert_eq!(count(&args, "--property-review-status=reviewed"), 1);
    }

    #[test]
    fn unit_association_args_carry_other_event_properties() {
        let message = OutboundMessage::association(parse("ew1665147160"), &parse("uw61886506123"));
        let args = message.command_args(&tool_config());
        assert_eq!(count(&args, "--type=associate"), 1);
        assert_eq!(count(&args, "--code=ew1665147160"), 1);
        assert_eq!(count(&args, "--property-othereventsource=uw"), 1);
        assert_eq!(count(&args, "--property-othereventsourcecode=61886506123"), 1);
        assert_eq!(count(&args, "--privateKey=/opt/pdl/id_rsa"), 1);
        // No status or review-status on associate messages.
        assert!(!args.iter().any(|arg| arg.starts_with("--status=")));
        assert!(!args.iter().any(|arg| arg.contains("review-status")));
    }

    #[test]
    fn unit_origin_cancellation_args_route_through_input_wedge() {
        let message = OutboundMessage::origin_cancellation(
            parse("ew1658979090"),
            "builds/quakeml_cancel_1658979090.xml",
        );
        let args = message.command_args(&tool_config());
        assert_eq!(
            count(
                &args,
                "--mainclass=gov.usgs.earthquake.eids.EIDSInputWedge"
            ),
            1
        );
        assert_eq!(count(&args, "--file=builds/quakeml_cancel_1658979090.xml"), 1);
        assert_eq!(count(&args, "--privateKey=/opt/pdl/id_rsa"), 1);
        // The input wedge path takes no --type or event source fields.
        assert!(!args.iter().any(|arg| arg.starts_with("--type=")));
        assert!(!args.iter().any(|arg| arg.starts_with("--eventsource=")));
    }

    #[test]
    fn unit_deleted_text_args_omit_private_key() {
        let message = OutboundMessage::deleted_text(parse("ew1658979090"), "<p>false alert</p>");
        let args = message.command_args(&tool_config());
        assert_eq!(count(&args, "--type=deleted-text"), 1);
        assert_eq!(count(&args, "--content"), 1);
        assert_eq!(count(&args, "--content-type=text/html"), 1);
        assert!(!args.iter().any(|arg| arg.starts_with("--privateKey=")));
        assert!(!args.iter().any(|arg| arg.starts_with("--file=")));
        assert_eq!(message.inline_payload.as_deref(), Some("<p>false alert</p>"));
    }
}
