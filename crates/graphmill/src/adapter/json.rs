use serde_json::{Map, Value};

use crate::{
    Element, ElementKind, Error, Phase, Result,
    adapter::{Decoder, Encoder},
};

/// Prefix of metadata lines in line-oriented encodings.
pub const HEADER_PREFIX: char = '#';

/// Encodes each element as one compact JSON object.
///
/// The metadata line names the kind and label of the records that follow,
/// e.g. `# vertex person`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonEncoder;

impl Encoder for JsonEncoder {
    fn encode(&self, element: &Element) -> Result<String> {
        Ok(serde_json::to_string(element)?)
    }

    fn encode_item_metadata(&self, element: &Element) -> Option<String> {
        Some(format!("{HEADER_PREFIX} {} {}", element.kind(), element.label()))
    }
}

/// Decodes JSON objects produced by [`JsonEncoder`].
///
/// Records may omit `type` and `label`: the missing fields are taken from the
/// preceding metadata line, or `type` from the phase's element kind when
/// there is no header.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecoder;

impl Decoder for JsonDecoder {
    fn decode_element(&self, raw: &str, header: Option<&str>, phase: Phase) -> Result<Element> {
        let mut object: Map<String, Value> = serde_json::from_str(raw.trim())?;

        let (kind, label) = match header.map(parse_header).transpose()? {
            Some((kind, label)) => (kind, Some(label)),
            None => (phase.kind(), None),
        };
        object
            .entry("type")
            .or_insert_with(|| Value::from(kind.as_str()));
        if let Some(label) = label {
            object
                .entry("label")
                .or_insert_with(|| Value::from(label));
        }

        Ok(serde_json::from_value(Value::Object(object))?)
    }

    fn skip_entry(&self, raw: &str) -> bool {
        let trimmed = raw.trim_start();
        trimmed.is_empty() || trimmed.starts_with(HEADER_PREFIX)
    }
}

/// Parses a `# <kind> <label>` metadata line.
pub fn parse_header(line: &str) -> Result<(ElementKind, &str)> {
    let invalid = || Error::Codec {
        reason: format!("malformed header line `{line}`"),
    };
    let body = line
        .trim()
        .strip_prefix(HEADER_PREFIX)
        .ok_or_else(invalid)?
        .trim();
    let (kind, label) = body.split_once(char::is_whitespace).ok_or_else(invalid)?;
    let kind = match kind {
        "vertex" => ElementKind::Vertex,
        "edge" => ElementKind::Edge,
        _ => return Err(invalid()),
    };
    Ok((kind, label.trim()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Edge, Vertex};

    #[test]
    fn encoded_elements_decode_back() {
        let element: Element = Vertex::new(3, "person").with_property("age", 36).into();
        let line = JsonEncoder.encode(&element).unwrap();
        assert_eq!(
            JsonDecoder.decode_element(&line, None, Phase::Two).unwrap(),
            element
        );
        assert_eq!(
            JsonEncoder.encode_item_metadata(&element).as_deref(),
            Some("# vertex person")
        );
    }

    #[test]
    fn header_fills_in_type_and_label() {
        let decoded = JsonDecoder
            .decode_element(r#"{"from":1,"to":2}"#, Some("# edge knows"), Phase::One)
            .unwrap();
        assert_eq!(decoded, Element::from(Edge::new("knows", 1, 2)));
    }

    #[test]
    fn phase_kind_is_the_fallback_type() {
        let decoded = JsonDecoder
            .decode_element(r#"{"id":9,"label":"city"}"#, None, Phase::One)
            .unwrap();
        assert_eq!(decoded, Element::from(Vertex::new(9, "city")));
    }

    #[test]
    fn malformed_input_is_a_codec_error() {
        assert!(matches!(
            JsonDecoder.decode_element("{not json", None, Phase::One),
            Err(Error::Codec { .. })
        ));
        assert!(matches!(
            JsonDecoder.decode_element("{}", Some("# thing x"), Phase::One),
            Err(Error::Codec { .. })
        ));
    }

    #[test]
    fn skips_blank_and_header_lines() {
        assert!(JsonDecoder.skip_entry("   "));
        assert!(JsonDecoder.skip_entry("# vertex person"));
        assert!(!JsonDecoder.skip_entry(r#"{"id":1}"#));
    }
}
