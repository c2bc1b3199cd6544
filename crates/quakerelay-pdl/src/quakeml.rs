use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use quick_xml::events::{BytesStart, BytesText, Event};
use quick_xml::{Reader, Writer};

use crate::error::PdlError;
use crate::event_code::EventCode;

/// Public-id authority for cancellation documents. Fixed: cancellations
/// publish under the ew catalog regardless of which network produced the
/// origin being canceled.
const PUBLIC_ID_AUTHORITY: &str = "quakeml:ew.anss.org";

/// Materializes a QuakeML cancellation document for one event by rewriting
/// the template at `template_path` and writing the result under
/// `builds_dir`.
///
/// Exactly four locations change: the eventParameters public id (embeds
/// the product code and the current unix time), the creation timestamp,
/// the event public id, and the two catalog attributes on the event
/// element. Everything else, the three namespace declarations included,
/// passes through byte-for-byte. The output path is deterministic per
/// product code, so a repeated cancel for the same event overwrites the
/// previous build.
pub fn build_cancel_document(
    template_path: &Path,
    builds_dir: &Path,
    code: &EventCode,
) -> Result<PathBuf, PdlError> {
    let template = fs::read_to_string(template_path).map_err(|error| {
        template_unavailable(template_path, format!("failed to read template: {error}"))
    })?;

    let rewritten = rewrite_template(&template, code, Utc::now())
        .map_err(|reason| template_unavailable(template_path, reason))?;

    fs::create_dir_all(builds_dir).map_err(|error| {
        template_unavailable(builds_dir, format!("failed to create builds directory: {error}"))
    })?;
    let output_path = builds_dir.join(format!("quakeml_cancel_{}.xml", code.code()));
    fs::write(&output_path, rewritten).map_err(|error| {
        template_unavailable(&output_path, format!("failed to write document: {error}"))
    })?;

    tracing::debug!(path = %output_path.display(), "built quakeml cancellation document");
    Ok(output_path)
}

fn template_unavailable(path: &Path, reason: String) -> PdlError {
    PdlError::TemplateUnavailable {
        path: path.display().to_string(),
        reason,
    }
}

fn rewrite_template(
    template: &str,
    code: &EventCode,
    now: DateTime<Utc>,
) -> Result<String, String> {
    let event_parameters_id = format!(
        "{PUBLIC_ID_AUTHORITY}/eventParameters/{}/{}",
        code.code(),
        now.timestamp()
    );
    let event_id = format!("{PUBLIC_ID_AUTHORITY}/event/{}", code.code());
    let creation_time = format!("{}Z", now.format("%Y-%m-%dT%H:%M:%S%.3f"));

    let mut reader = Reader::from_str(template);
    let mut writer = Writer::new(Vec::new());

    let mut inside_event = false;
    let mut inside_creation_info = false;
    let mut in_creation_time = false;
    let mut creation_time_written = false;
    let mut saw_event_parameters = false;
    let mut saw_event = false;

    loop {
        match reader.read_event() {
            Ok(Event::Start(start)) => match start.local_name().as_ref() {
                b"eventParameters" => {
                    saw_event_parameters = true;
                    let rewritten = replace_attribute(&start, "publicID", &event_parameters_id)?;
                    writer
                        .write_event(Event::Start(rewritten))
                        .map_err(write_error)?;
                }
                b"event" => {
                    saw_event = true;
                    inside_event = true;
                    let mut rewritten = replace_attribute(&start, "publicID", &event_id)?;
                    rewritten =
                        replace_attribute(&rewritten, "catalog:eventsource", code.source())?;
                    rewritten = replace_attribute(&rewritten, "catalog:eventid", code.code())?;
                    writer
                        .write_event(Event::Start(rewritten))
                        .map_err(write_error)?;
                }
                b"creationInfo" if !inside_event => {
                    inside_creation_info = true;
                    writer
                        .write_event(Event::Start(start))
                        .map_err(write_error)?;
                }
                b"creationTime" if inside_creation_info => {
                    in_creation_time = true;
                    creation_time_written = false;
                    writer
                        .write_event(Event::Start(start))
                        .map_err(write_error)?;
                }
                _ => writer
                    .write_event(Event::Start(start))
                    .map_err(write_error)?,
            },
            Ok(Event::Empty(start)) => match start.local_name().as_ref() {
                b"eventParameters" => {
                    saw_event_parameters = true;
                    let rewritten = replace_attribute(&start, "publicID", &event_parameters_id)?;
                    writer
                        .write_event(Event::Empty(rewritten))
                        .map_err(write_error)?;
                }
                b"event" => {
                    saw_event = true;
                    let mut rewritten = replace_attribute(&start, "publicID", &event_id)?;
                    rewritten =
                        replace_attribute(&rewritten, "catalog:eventsource", code.source())?;
                    rewritten = replace_attribute(&rewritten, "catalog:eventid", code.code())?;
                    writer
                        .write_event(Event::Empty(rewritten))
                        .map_err(write_error)?;
                }
                _ => writer
                    .write_event(Event::Empty(start))
                    .map_err(write_error)?,
            },
            Ok(Event::Text(text)) => {
                if in_creation_time {
                    if !creation_time_written {
                        writer
                            .write_event(Event::Text(BytesText::new(&creation_time)))
                            .map_err(write_error)?;
                        creation_time_written = true;
                    }
                } else {
                    writer.write_event(Event::Text(text)).map_err(write_error)?;
                }
            }
            Ok(Event::End(end)) => {
                match end.local_name().as_ref() {
                    b"event" => inside_event = false,
                    b"creationInfo" => inside_creation_info = false,
                    b"creationTime" => {
                        if in_creation_time && !creation_time_written {
                            writer
                                .write_event(Event::Text(BytesText::new(&creation_time)))
                                .map_err(write_error)?;
                        }
                        in_creation_time = false;
                    }
                    _ => {}
                }
                writer.write_event(Event::End(end)).map_err(write_error)?;
            }
            Ok(Event::Eof) => break,
            Ok(other) => writer.write_event(other).map_err(write_error)?,
            Err(error) => return Err(format!("xml parse error: {error}")),
        }
    }

    if !saw_event_parameters || !saw_event {
        return Err("template has no eventParameters/event elements".to_string());
    }

    String::from_utf8(writer.into_inner())
        .map_err(|error| format!("rewritten document is not utf-8: {error}"))
}

fn replace_attribute(
    element: &BytesStart<'_>,
    name: &str,
    value: &str,
) -> Result<BytesStart<'static>, String> {
    let element_name = String::from_utf8_lossy(element.name().as_ref()).into_owned();
    let mut rewritten = BytesStart::new(element_name);
    let mut replaced = false;
    for attribute in element.attributes() {
        let attribute = attribute.map_err(|error| format!("bad attribute: {error}"))?;
        let key = String::from_utf8_lossy(attribute.key.as_ref()).into_owned();
        if key == name {
            rewritten.push_attribute((key.as_str(), value));
            replaced = true;
        } else {
            let existing = attribute
                .unescape_value()
                .map_err(|error| format!("bad attribute value: {error}"))?;
            rewritten.push_attribute((key.as_str(), existing.as_ref()));
        }
    }
    if !replaced {
        rewritten.push_attribute((name, value));
    }
    Ok(rewritten)
}

fn write_error(error: impl std::fmt::Display) -> String {
    format!("xml write error: {error}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::tempdir;

    const BED_NS: &str = "http://quakeml.org/xmlns/bed/1.2";
    const CATALOG_NS: &str = "http://anss.org/xmlns/catalog/0.1";

    fn template_path() -> PathBuf {
        Path::new(env!("CARGO_MANIFEST_DIR")).join("../../params/quakeml_cancel_template.xml")
    }

    fn parse(raw: &str) -> EventCode {
        EventCode::parse(raw).expect("event code")
    }

    #[test]
    fn functional_build_rewrites_cancellation_fields() {
        let dir = tempdir().expect("tempdir");
        let builds = dir.path().join("builds");
        let code = parse("ew1665147160");

        let path = build_cancel_document(&template_path(), &builds, &code).expect("build");
        assert_eq!(path, builds.join("quakeml_cancel_1665147160.xml"));

        let xml = std::fs::read_to_string(&path).expect("read built document");
        let doc = roxmltree::Document::parse(&xml).expect("built document parses");

        let event_parameters = doc
            .descendants()
            .find(|node| node.has_tag_name((BED_NS, "eventParameters")))
            .expect("eventParameters element");
        let public_id = event_parameters.attribute("publicID").expect("publicID");
        let unix_seconds = public_id
            .strip_prefix("quakeml:ew.anss.org/eventParameters/1665147160/")
            .expect("public id embeds the product code");
        unix_seconds.parse::<i64>().expect("unix-seconds suffix");

        let event = doc
            .descendants()
            .find(|node| node.has_tag_name((BED_NS, "event")))
            .expect("event element");
        assert_eq!(
            event.attribute("publicID"),
            Some("quakeml:ew.anss.org/event/1665147160")
        );
        assert_eq!(event.attribute((CATALOG_NS, "eventsource")), Some("ew"));
        assert_eq!(event.attribute((CATALOG_NS, "eventid")), Some("1665147160"));

        let creation_time = event_parameters
            .descendants()
            .find(|node| node.has_tag_name((BED_NS, "creationTime")))
            .expect("creationTime element");
        let stamp = creation_time.text().expect("creation time text");
        assert!(stamp.ends_with('Z'));
        chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%dT%H:%M:%S%.3fZ")
            .expect("millisecond utc timestamp");

        // Untouched parts of the template survive the rewrite.
        let event_type = event
            .children()
            .find(|node| node.has_tag_name((BED_NS, "type")))
            .expect("type element");
        assert_eq!(event_type.text(), Some("not existing"));
    }

    #[test]
    fn unit_rewrite_is_deterministic_for_a_fixed_clock() {
        let template = std::fs::read_to_string(template_path()).expect("template");
        let when = Utc.with_ymd_and_hms(2022, 10, 7, 12, 30, 45).unwrap();
        let rewritten =
            rewrite_template(&template, &parse("ew1665147160"), when).expect("rewrite");
        assert!(rewritten.contains(&format!(
            "quakeml:ew.anss.org/eventParameters/1665147160/{}",
            when.timestamp()
        )));
        assert!(rewritten.contains("2022-10-07T12:30:45.000Z"));
    }

    #[test]
    fn unit_namespace_declarations_survive_rewrite() {
        let template = std::fs::read_to_string(template_path()).expect("template");
        let when = Utc.with_ymd_and_hms(2022, 10, 7, 0, 0, 0).unwrap();
        let rewritten =
            rewrite_template(&template, &parse("nc7364917012"), when).expect("rewrite");
        assert!(rewritten.contains(r#"xmlns="http://quakeml.org/xmlns/bed/1.2""#));
        assert!(rewritten.contains(r#"xmlns:catalog="http://anss.org/xmlns/catalog/0.1""#));
        assert!(rewritten.contains(r#"xmlns:q="http://quakeml.org/xmlns/quakeml/1.2""#));
    }

    #[test]
    fn unit_repeat_builds_overwrite_the_same_path() {
        let dir = tempdir().expect("tempdir");
        let builds = dir.path().join("builds");
        let code = parse("ew1665147160");

        let first = build_cancel_document(&template_path(), &builds, &code).expect("first build");
        let second = build_cancel_document(&template_path(), &builds, &code).expect("second build");
        assert_eq!(first, second);
        let entries: Vec<_> = std::fs::read_dir(&builds).expect("read builds dir").collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn regression_missing_template_is_template_unavailable() {
        let dir = tempdir().expect("tempdir");
        let error = build_cancel_document(
            Path::new("/nonexistent/quakerelay/template.xml"),
            dir.path(),
            &parse("ew1665147160"),
        )
        .expect_err("missing template must fail");
        match error {
            PdlError::TemplateUnavailable { path, .. } => {
                assert!(path.contains("template.xml"))
            }
            other => panic!("expected template failure, got: {other}"),
        }
    }

    #[test]
    fn regression_malformed_template_is_template_unavailable() {
        let dir = tempdir().expect("tempdir");
        let bad_template = dir.path().join("broken.xml");
        std::fs::write(&bad_template, "<q:quakeml><eventParameters>").expect("write template");
        let error = build_cancel_document(&bad_template, dir.path(), &parse("ew1665147160"))
            .expect_err("malformed template must fail");
        assert!(matches!(error, PdlError::TemplateUnavailable { .. }));
    }
}
