use crate::message::{ObjectStatus, PpsMessage, ROOT_OBJECT_NAME};
use crate::value::{Attributes, PpsValue};
use serde_json::Value;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use thiserror::Error;
use tracing::{error, warn};

const DELIMITERS: &[u8] = b"{}[]:,\"";
const RESERVED_PREFIXES: &[char] = &['-', '+', '#', '*', '!'];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Encoding {
    #[default]
    Native,
    Json,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    #[error("buffer of {len} bytes is not NUL terminated")]
    Unterminated { len: usize },
    #[error("invalid object name '{0}': expected at most one '.' separator")]
    InvalidObjectName(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CodecWarning {
    #[error("attribute '{key}': integer {value} written as double, precision may be lost")]
    PrecisionLoss { key: String, value: i64 },
    #[error("attribute '{key}': {reason}, written as string")]
    CoercedToString { key: String, reason: String },
    #[error("attribute '{key}': {reason}, written as null")]
    WroteNull { key: String, reason: String },
    #[error("object '{name}': status {status:?} cannot be expressed in JSON, dropped")]
    StatusDropped { name: String, status: ObjectStatus },
    #[error("payload is not valid UTF-8, decoded lossily")]
    InvalidUtf8,
    #[error("offset {offset}: unknown token '{token}' read as string")]
    UnknownToken { offset: usize, token: String },
    #[error("offset {offset}: unexpected '{found}' skipped")]
    UnexpectedChar { offset: usize, found: char },
    #[error("offset {offset}: invalid string literal")]
    InvalidString { offset: usize },
    #[error("offset {offset}: attribute without a name")]
    NamelessAttribute { offset: usize },
    #[error("object '{name}' ended before its closing brace")]
    Truncated { name: String },
    #[error("offset {offset}: trailing content ignored")]
    TrailingContent { offset: usize },
    #[error("invalid JSON payload: {0}")]
    Json(String),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct EncodeReport {
    pub bytes: Vec<u8>,
    pub warnings: Vec<CodecWarning>,
}

impl EncodeReport {
    pub fn is_lossless(&self) -> bool {
        self.warnings.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecodeReport {
    pub messages: Vec<PpsMessage>,
    pub warnings: Vec<CodecWarning>,
}

impl DecodeReport {
    fn push_warning(&mut self, warning: CodecWarning) {
        warn!(event = "pps_decode_warning", %warning);
        self.warnings.push(warning);
    }
}

pub fn encode(name: &str, attributes: &Attributes, encoding: Encoding) -> EncodeReport {
    let mut encoder = Encoder::default();
    match encoding {
        Encoding::Native => encoder.write_document(name, attributes),
        Encoding::Json => encoder.write_json(name, attributes),
    }
    encoder.finish()
}

pub fn encode_message(message: &PpsMessage, encoding: Encoding) -> EncodeReport {
    let name = message.name();
    let Some(flag) = message.status().flag() else {
        return encode(&name, message.attributes(), encoding);
    };

    let mut encoder = Encoder::default();
    match encoding {
        Encoding::Native => {
            encoder.out.push(flag);
            encoder.write_name(&name);
            encoder.out.push_str("{}");
        }
        Encoding::Json => {
            encoder.push_warning(CodecWarning::StatusDropped {
                name: name.clone(),
                status: message.status(),
            });
            encoder.write_json(&name, &Attributes::new());
        }
    }
    encoder.finish()
}

/// Decodes a NUL-terminated buffer into zero or more messages.
///
/// Content after the first NUL is ignored. A buffer that does not end in NUL
/// is rejected without being parsed.
pub fn decode(data: &[u8]) -> Result<DecodeReport, CodecError> {
    if data.last() != Some(&0) {
        error!(event = "pps_decode_unterminated", len = data.len());
        return Err(CodecError::Unterminated { len: data.len() });
    }

    let mut report = DecodeReport::default();
    let end = data
        .iter()
        .position(|byte| *byte == 0)
        .unwrap_or(data.len() - 1);
    let text = match std::str::from_utf8(&data[..end]) {
        Ok(text) => Cow::Borrowed(text),
        Err(_) => {
            report.push_warning(CodecWarning::InvalidUtf8);
            String::from_utf8_lossy(&data[..end])
        }
    };

    if text.trim_start().starts_with('{') {
        decode_json(&text, &mut report);
        return Ok(report);
    }

    let mut parser = Parser::new(&text);
    let result = parser.parse_stream();
    for warning in parser.warnings {
        report.push_warning(warning);
    }
    result?;
    report.messages = parser.messages;
    Ok(report)
}

fn decode_json(text: &str, report: &mut DecodeReport) {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => {
            let attributes = map
                .into_iter()
                .map(|(key, value)| (key, PpsValue::from(value)))
                .collect();
            report
                .messages
                .push(PpsMessage::new(ROOT_OBJECT_NAME, attributes));
        }
        Ok(other) => report.push_warning(CodecWarning::Json(format!(
            "expected an object, found {}",
            PpsValue::from(other).kind()
        ))),
        Err(err) => report.push_warning(CodecWarning::Json(err.to_string())),
    }
}

fn is_word_byte(byte: u8) -> bool {
    byte != 0 && !byte.is_ascii_whitespace() && !DELIMITERS.contains(&byte)
}

fn is_bare_word(text: &str) -> bool {
    !text.is_empty()
        && !text.starts_with(RESERVED_PREFIXES)
        && text.bytes().all(|byte| is_word_byte(byte) && !byte.is_ascii_control())
}

fn quote(text: &str) -> String {
    serde_json::to_string(text).unwrap_or_else(|_| String::from("\"\""))
}

#[derive(Default)]
struct Encoder {
    out: String,
    warnings: Vec<CodecWarning>,
}

impl Encoder {
    fn finish(self) -> EncodeReport {
        EncodeReport {
            bytes: self.out.into_bytes(),
            warnings: self.warnings,
        }
    }

    fn push_warning(&mut self, warning: CodecWarning) {
        warn!(event = "pps_encode_warning", %warning);
        self.warnings.push(warning);
    }

    fn write_document(&mut self, name: &str, attributes: &Attributes) {
        if name.is_empty() {
            if attributes.values().any(|value| !value.is_deleted()) {
                self.write_entries(attributes);
                return;
            }
            if attributes.is_empty() {
                return;
            }
        }
        let name = if name.is_empty() {
            ROOT_OBJECT_NAME
        } else {
            name
        };
        self.write_name(name);
        self.out.push('{');
        self.write_entries(attributes);
        self.out.push('}');
    }

    fn write_name(&mut self, name: &str) {
        if is_bare_word(name) {
            self.out.push_str(name);
        } else {
            self.out.push_str(&quote(name));
        }
    }

    // Live entries go first so a rootless list never opens with a delete
    // marker, which would read as a flagged header.
    fn write_entries(&mut self, attributes: &Attributes) {
        let live = attributes.iter().filter(|(_, value)| !value.is_deleted());
        let deleted = attributes.iter().filter(|(_, value)| value.is_deleted());
        for (index, (key, value)) in live.chain(deleted).enumerate() {
            if index > 0 {
                self.out.push(' ');
            }
            if value.is_deleted() {
                self.out.push('-');
                self.write_name(key);
                continue;
            }
            self.write_name(key);
            self.out.push(':');
            self.write_value(key, value);
        }
    }

    fn write_value(&mut self, key: &str, value: &PpsValue) {
        match value {
            PpsValue::Null => self.out.push_str("null"),
            PpsValue::Bool(value) => self.out.push_str(if *value { "true" } else { "false" }),
            PpsValue::Int(value) => {
                if i32::try_from(*value).is_ok() {
                    let _ = write!(self.out, "{value}");
                } else {
                    self.push_warning(CodecWarning::PrecisionLoss {
                        key: key.to_string(),
                        value: *value,
                    });
                    self.write_number(key, *value as f64);
                }
            }
            PpsValue::Number(value) => self.write_number(key, *value),
            PpsValue::String(value) => self.out.push_str(&quote(value)),
            PpsValue::Array(items) => {
                self.out.push('[');
                for (index, item) in items.iter().enumerate() {
                    if index > 0 {
                        self.out.push(' ');
                    }
                    self.write_value(key, item);
                }
                self.out.push(']');
            }
            PpsValue::Object(attributes) => {
                self.out.push('{');
                self.write_entries(attributes);
                self.out.push('}');
            }
            // Only reachable inside arrays; entries write the delete marker.
            PpsValue::Deleted => {
                self.push_warning(CodecWarning::WroteNull {
                    key: key.to_string(),
                    reason: "deletion marker inside an array".to_string(),
                });
                self.out.push_str("null");
            }
        }
    }

    fn write_number(&mut self, key: &str, value: f64) {
        if value.is_finite() {
            let _ = write!(self.out, "{value}");
            return;
        }
        self.push_warning(CodecWarning::CoercedToString {
            key: key.to_string(),
            reason: format!("non-finite number {value}"),
        });
        self.out.push_str(&quote(&value.to_string()));
    }

    fn write_json(&mut self, name: &str, attributes: &Attributes) {
        self.check_json_entries(attributes);
        let body = if name.is_empty() {
            serde_json::to_string(attributes)
        } else {
            let mut wrapper = BTreeMap::new();
            wrapper.insert(name, attributes);
            serde_json::to_string(&wrapper)
        };
        match body {
            Ok(body) => self.out.push_str(&body),
            Err(err) => self.push_warning(CodecWarning::Json(err.to_string())),
        }
    }

    fn check_json_entries(&mut self, attributes: &Attributes) {
        for (key, value) in attributes {
            self.check_json_value(key, value);
        }
    }

    fn check_json_value(&mut self, key: &str, value: &PpsValue) {
        match value {
            PpsValue::Deleted => self.push_warning(CodecWarning::WroteNull {
                key: key.to_string(),
                reason: "deletion marker has no JSON form".to_string(),
            }),
            PpsValue::Number(number) if !number.is_finite() => {
                self.push_warning(CodecWarning::WroteNull {
                    key: key.to_string(),
                    reason: format!("non-finite number {number}"),
                })
            }
            PpsValue::Array(items) => {
                for item in items {
                    self.check_json_value(key, item);
                }
            }
            PpsValue::Object(attributes) => self.check_json_entries(attributes),
            _ => {}
        }
    }
}

struct Truncated;

struct Parser<'a> {
    text: &'a str,
    pos: usize,
    messages: Vec<PpsMessage>,
    warnings: Vec<CodecWarning>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            text,
            pos: 0,
            messages: Vec::new(),
            warnings: Vec::new(),
        }
    }

    fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    fn skip_blank(&mut self) {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace()) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Some(byte) if byte.is_ascii_whitespace() || byte == b',') {
            self.pos += 1;
        }
    }

    fn skip_unexpected(&mut self) {
        if let Some(found) = self.text[self.pos..].chars().next() {
            self.warnings.push(CodecWarning::UnexpectedChar {
                offset: self.pos,
                found,
            });
            self.pos += found.len_utf8();
        }
    }

    fn parse_stream(&mut self) -> Result<(), CodecError> {
        let mut first = true;
        loop {
            self.skip_blank();
            let start = self.pos;
            let Some(byte) = self.peek() else {
                break;
            };

            let status = ObjectStatus::from_flag(byte as char);
            if status.is_some() {
                self.pos += 1;
            }
            let name = self.read_name();

            match (status, self.peek()) {
                (Some(status), _) => {
                    self.skip_blank();
                    if self.peek() == Some(b'{') {
                        self.skip_body();
                    }
                    self.messages.push(PpsMessage::status_only(&name, status)?);
                }
                (None, Some(b'{')) if first || !name.is_empty() => {
                    self.pos += 1;
                    match self.read_entries(Some(b'}')) {
                        Ok(attributes) => self
                            .messages
                            .push(PpsMessage::from_raw_name(&name, attributes)?),
                        Err(Truncated) => {
                            self.push_incomplete(&name)?;
                            break;
                        }
                    }
                }
                (None, Some(b':')) if first => {
                    self.pos = start;
                    match self.read_entries(None) {
                        Ok(attributes) => self
                            .messages
                            .push(PpsMessage::new(ROOT_OBJECT_NAME, attributes)),
                        Err(Truncated) => self.push_incomplete(ROOT_OBJECT_NAME)?,
                    }
                    break;
                }
                (None, _) => {
                    self.warnings
                        .push(CodecWarning::TrailingContent { offset: start });
                    break;
                }
            }
            first = false;
        }
        Ok(())
    }

    fn push_incomplete(&mut self, name: &str) -> Result<(), CodecError> {
        self.warnings.push(CodecWarning::Truncated {
            name: name.to_string(),
        });
        self.messages
            .push(PpsMessage::status_only(name, ObjectStatus::Incomplete)?);
        Ok(())
    }

    fn read_entries(&mut self, terminator: Option<u8>) -> Result<Attributes, Truncated> {
        let mut attributes = Attributes::new();
        loop {
            self.skip_separators();
            let offset = self.pos;
            match self.peek() {
                None if terminator.is_some() => return Err(Truncated),
                None => return Ok(attributes),
                Some(byte) if Some(byte) == terminator => {
                    self.pos += 1;
                    return Ok(attributes);
                }
                Some(b'-') => {
                    self.pos += 1;
                    let key = self.read_name();
                    if key.is_empty() {
                        self.warnings
                            .push(CodecWarning::NamelessAttribute { offset });
                    }
                    attributes.insert(key, PpsValue::Deleted);
                }
                Some(_) => {
                    let key = self.read_name();
                    match self.peek() {
                        Some(b':') => {
                            self.pos += 1;
                            if key.is_empty() {
                                self.warnings
                                    .push(CodecWarning::NamelessAttribute { offset });
                            }
                            if let Some(value) = self.read_value()? {
                                attributes.insert(key, value);
                            }
                        }
                        Some(b'{') if !key.is_empty() => {
                            self.pos += 1;
                            let nested = self.read_entries(Some(b'}'))?;
                            attributes.insert(key, PpsValue::Object(nested));
                        }
                        _ if key.is_empty() => self.skip_unexpected(),
                        _ => self
                            .warnings
                            .push(CodecWarning::UnknownToken { offset, token: key }),
                    }
                }
            }
        }
    }

    fn read_value(&mut self) -> Result<Option<PpsValue>, Truncated> {
        self.skip_blank();
        let offset = self.pos;
        match self.peek() {
            None => Err(Truncated),
            Some(b'"') => self.read_string().map(|text| Some(PpsValue::String(text))),
            Some(b'{') => {
                self.pos += 1;
                let attributes = self.read_entries(Some(b'}'))?;
                Ok(Some(PpsValue::Object(attributes)))
            }
            Some(b'[') => {
                self.pos += 1;
                let items = self.read_array()?;
                Ok(Some(PpsValue::Array(items)))
            }
            Some(byte) if is_word_byte(byte) => {
                let word = self.read_word();
                Ok(Some(self.word_value(offset, word)))
            }
            Some(_) => {
                self.skip_unexpected();
                Ok(None)
            }
        }
    }

    fn read_array(&mut self) -> Result<Vec<PpsValue>, Truncated> {
        let mut items = Vec::new();
        loop {
            self.skip_separators();
            match self.peek() {
                None => return Err(Truncated),
                Some(b']') => {
                    self.pos += 1;
                    return Ok(items);
                }
                Some(_) => {
                    if let Some(item) = self.read_value()? {
                        items.push(item);
                    }
                }
            }
        }
    }

    fn word_value(&mut self, offset: usize, word: &str) -> PpsValue {
        match word {
            "true" => return PpsValue::Bool(true),
            "false" => return PpsValue::Bool(false),
            "null" => return PpsValue::Null,
            _ => {}
        }
        if looks_numeric(word) {
            if let Ok(number) = word.parse::<f64>() {
                return PpsValue::Number(number);
            }
        }
        self.warnings.push(CodecWarning::UnknownToken {
            offset,
            token: word.to_string(),
        });
        PpsValue::String(word.to_string())
    }

    fn read_name(&mut self) -> String {
        if self.peek() == Some(b'"') {
            return self.read_string().unwrap_or_default();
        }
        self.read_word().to_string()
    }

    fn read_word(&mut self) -> &'a str {
        let start = self.pos;
        while matches!(self.peek(), Some(byte) if is_word_byte(byte)) {
            self.pos += 1;
        }
        &self.text[start..self.pos]
    }

    fn read_string(&mut self) -> Result<String, Truncated> {
        let start = self.pos;
        let bytes = self.text.as_bytes();
        let mut index = start + 1;
        loop {
            match bytes.get(index) {
                None => {
                    self.pos = bytes.len();
                    self.warnings
                        .push(CodecWarning::InvalidString { offset: start });
                    return Err(Truncated);
                }
                Some(b'\\') => index += 2,
                Some(b'"') => break,
                Some(_) => index += 1,
            }
        }
        self.pos = index + 1;
        let literal = &self.text[start..=index];
        match serde_json::from_str::<String>(literal) {
            Ok(text) => Ok(text),
            Err(_) => {
                self.warnings
                    .push(CodecWarning::InvalidString { offset: start });
                Ok(self.text[start + 1..index].to_string())
            }
        }
    }

    fn skip_body(&mut self) {
        let mut depth = 0usize;
        while let Some(byte) = self.peek() {
            match byte {
                b'"' => {
                    if self.read_string().is_err() {
                        return;
                    }
                    continue;
                }
                b'{' => depth += 1,
                b'}' => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        self.pos += 1;
                        return;
                    }
                }
                _ => {}
            }
            self.pos += 1;
        }
    }
}

fn looks_numeric(word: &str) -> bool {
    let bytes = word.as_bytes();
    match bytes.first() {
        Some(byte) if byte.is_ascii_digit() => true,
        Some(b'-' | b'+' | b'.') => bytes.get(1).is_some_and(|byte| {
            byte.is_ascii_digit() || (*byte == b'.' && bytes.get(2).is_some_and(u8::is_ascii_digit))
        }),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terminated(mut bytes: Vec<u8>) -> Vec<u8> {
        bytes.push(0);
        bytes
    }

    fn decode_str(text: &str) -> DecodeReport {
        decode(&terminated(text.as_bytes().to_vec())).expect("decode")
    }

    fn sample_attributes() -> Attributes {
        let mut nested = Attributes::new();
        nested.insert("depth".to_string(), PpsValue::Int(2));
        nested.insert("label".to_string(), PpsValue::from("inner \"quoted\""));

        let mut attributes = Attributes::new();
        attributes.insert("flag".to_string(), PpsValue::Bool(true));
        attributes.insert("off".to_string(), PpsValue::Bool(false));
        attributes.insert("count".to_string(), PpsValue::Int(-17));
        attributes.insert("ratio".to_string(), PpsValue::Number(0.25));
        attributes.insert("name".to_string(), PpsValue::from("héllo world"));
        attributes.insert("empty".to_string(), PpsValue::from(""));
        attributes.insert("nothing".to_string(), PpsValue::Null);
        attributes.insert("nested".to_string(), PpsValue::Object(nested));
        attributes.insert(
            "list".to_string(),
            PpsValue::Array(vec![
                PpsValue::Int(1),
                PpsValue::from("two"),
                PpsValue::Array(vec![PpsValue::Bool(false)]),
            ]),
        );
        attributes
    }

    #[test]
    fn native_round_trip_preserves_values() {
        let attributes = sample_attributes();
        let report = encode("status", &attributes, Encoding::Native);
        assert!(report.is_lossless(), "{:?}", report.warnings);

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        assert!(decoded.warnings.is_empty(), "{:?}", decoded.warnings);
        assert_eq!(decoded.messages.len(), 1);
        let message = &decoded.messages[0];
        assert_eq!(message.name(), "status");
        assert_eq!(message.status(), ObjectStatus::Undefined);
        assert_eq!(message.attributes(), &attributes);
    }

    #[test]
    fn rootless_round_trip_preserves_values() {
        let attributes = sample_attributes();
        let report = encode("", &attributes, Encoding::Native);
        assert!(!report.bytes.starts_with(b"@"));

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        assert_eq!(decoded.messages.len(), 1);
        assert_eq!(decoded.messages[0].name(), ROOT_OBJECT_NAME);
        assert_eq!(decoded.messages[0].attributes(), &attributes);
    }

    #[test]
    fn deletion_is_distinct_from_empty_string() {
        let mut attributes = Attributes::new();
        attributes.insert("gone".to_string(), PpsValue::Deleted);
        attributes.insert("blank".to_string(), PpsValue::from(""));

        let report = encode("obj", &attributes, Encoding::Native);
        let text = String::from_utf8(report.bytes.clone()).expect("utf8");
        assert!(text.contains("-gone"), "{text}");

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        let message = &decoded.messages[0];
        assert_eq!(message.get("gone"), Some(&PpsValue::Deleted));
        assert_eq!(message.get("blank"), Some(&PpsValue::from("")));
    }

    #[test]
    fn rootless_list_with_only_deletions_gets_wrapped() {
        let mut attributes = Attributes::new();
        attributes.insert("gone".to_string(), PpsValue::Deleted);

        let report = encode("", &attributes, Encoding::Native);
        assert_eq!(report.bytes, b"@{-gone}".to_vec());
    }

    #[test]
    fn decode_rejects_unterminated_buffer() {
        assert_eq!(
            decode(b"obj{a:1}"),
            Err(CodecError::Unterminated { len: 8 })
        );
        assert_eq!(decode(b""), Err(CodecError::Unterminated { len: 0 }));
    }

    #[test]
    fn delta_stream_yields_one_message_per_object() {
        let report = decode(b"obj1{a:1}obj2{b:\"x\"}\0").expect("decode");
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[0].name(), "obj1");
        assert_eq!(report.messages[0].get("a"), Some(&PpsValue::Number(1.0)));
        assert_eq!(report.messages[1].name(), "obj2");
        assert_eq!(report.messages[1].get("b"), Some(&PpsValue::from("x")));
    }

    #[test]
    fn deleted_header_is_status_only_whatever_follows() {
        for input in [
            "-obj1",
            "-obj1{a:1 b:{c:2}}",
            "-obj1 {x:1}",
            "-obj1\n\t{x:\"}\"} trailing",
        ] {
            let report = decode_str(input);
            assert_eq!(report.messages.len(), 1, "{input}: {:?}", report.messages);
            let message = &report.messages[0];
            assert_eq!(message.name(), "obj1", "{input}");
            assert_eq!(message.status(), ObjectStatus::Deleted, "{input}");
            assert!(message.attributes().is_empty(), "{input}");
        }
    }

    #[test]
    fn flagged_headers_map_to_statuses() {
        let report = decode_str("+a{} #b *c !d obj{k:1}");
        let statuses: Vec<_> = report
            .messages
            .iter()
            .map(|message| (message.name(), message.status()))
            .collect();
        assert_eq!(
            statuses,
            vec![
                ("a".to_string(), ObjectStatus::Created),
                ("b".to_string(), ObjectStatus::Truncated),
                ("c".to_string(), ObjectStatus::Purged),
                ("d".to_string(), ObjectStatus::Incomplete),
                ("obj".to_string(), ObjectStatus::Undefined),
            ]
        );
    }

    #[test]
    fn nameless_body_after_an_object_is_trailing_content() {
        let report = decode_str("obj{a:1} {b:2}");
        assert_eq!(report.messages.len(), 1);
        assert_eq!(report.messages[0].name(), "obj");
        assert!(report
            .warnings
            .iter()
            .any(|warning| matches!(warning, CodecWarning::TrailingContent { offset: 9 })));
    }

    #[test]
    fn trailing_blank_space_ends_the_stream() {
        let report = decode_str("obj{a:1}\n  \t\n");
        assert_eq!(report.messages.len(), 1);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn trailing_garbage_stops_parsing_with_warning() {
        let report = decode_str("obj{a:1} ]]");
        assert_eq!(report.messages.len(), 1);
        assert!(matches!(
            report.warnings[0],
            CodecWarning::TrailingContent { offset: 9 }
        ));
    }

    #[test]
    fn unknown_bare_word_becomes_string() {
        let report = decode_str("obj{mode:fullscreen n:-inf}");
        let message = &report.messages[0];
        assert_eq!(message.get("mode"), Some(&PpsValue::from("fullscreen")));
        assert_eq!(message.get("n"), Some(&PpsValue::from("-inf")));
        assert_eq!(report.warnings.len(), 2);
        assert!(matches!(
            &report.warnings[0],
            CodecWarning::UnknownToken { token, .. } if token == "fullscreen"
        ));
    }

    #[test]
    fn stray_delimiters_are_skipped() {
        let report = decode_str("obj{a:] b:2}");
        let message = &report.messages[0];
        assert_eq!(message.get("a"), None);
        assert_eq!(message.get("b"), Some(&PpsValue::Number(2.0)));
        assert!(matches!(
            report.warnings[0],
            CodecWarning::UnexpectedChar { found: ']', .. }
        ));
    }

    #[test]
    fn unterminated_body_marks_object_incomplete() {
        let report = decode_str("ok{a:1}cut{b:{c:1}");
        assert_eq!(report.messages.len(), 2);
        assert_eq!(report.messages[1].name(), "cut");
        assert_eq!(report.messages[1].status(), ObjectStatus::Incomplete);
        assert!(report.messages[1].attributes().is_empty());
        assert!(matches!(
            &report.warnings[0],
            CodecWarning::Truncated { name } if name == "cut"
        ));
    }

    #[test]
    fn client_id_is_split_from_header() {
        let report = decode_str("+control.9{}");
        assert_eq!(report.messages[0].object_name(), "control");
        assert_eq!(report.messages[0].client_id(), Some("9"));
        assert_eq!(report.messages[0].status(), ObjectStatus::Created);
    }

    #[test]
    fn header_with_two_client_separators_is_fatal() {
        let result = decode(b"a.b.c{x:1}\0");
        assert_eq!(
            result,
            Err(CodecError::InvalidObjectName("a.b.c".to_string()))
        );
    }

    #[test]
    fn parsing_stops_at_first_nul() {
        let report = decode(b"obj{a:1}\0junk{b:2}\0").expect("decode");
        assert_eq!(report.messages.len(), 1);
    }

    #[test]
    fn wide_integers_are_written_as_doubles_with_warning() {
        let mut attributes = Attributes::new();
        attributes.insert("small".to_string(), PpsValue::Int(7));
        attributes.insert("wide".to_string(), PpsValue::Int(1 << 40));

        let report = encode("obj", &attributes, Encoding::Native);
        assert_eq!(
            report.warnings,
            vec![CodecWarning::PrecisionLoss {
                key: "wide".to_string(),
                value: 1 << 40,
            }]
        );
        let decoded = decode(&terminated(report.bytes)).expect("decode");
        assert_eq!(
            decoded.messages[0].get("wide"),
            Some(&PpsValue::Number((1u64 << 40) as f64))
        );
    }

    #[test]
    fn unrepresentable_values_are_reported() {
        let mut attributes = Attributes::new();
        attributes.insert("nan".to_string(), PpsValue::Number(f64::NAN));
        attributes.insert(
            "list".to_string(),
            PpsValue::Array(vec![PpsValue::Int(1), PpsValue::Deleted]),
        );

        let report = encode("obj", &attributes, Encoding::Native);
        assert_eq!(report.warnings.len(), 2);
        assert!(report
            .warnings
            .iter()
            .any(|warning| matches!(warning, CodecWarning::WroteNull { key, .. } if key == "list")));
        assert!(report.warnings.iter().any(
            |warning| matches!(warning, CodecWarning::CoercedToString { key, .. } if key == "nan")
        ));

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        let message = &decoded.messages[0];
        assert_eq!(message.get("nan"), Some(&PpsValue::from("NaN")));
        assert_eq!(
            message.get("list"),
            Some(&PpsValue::Array(vec![PpsValue::Number(1.0), PpsValue::Null]))
        );
    }

    #[test]
    fn awkward_names_are_quoted() {
        let mut attributes = Attributes::new();
        attributes.insert("-dash".to_string(), PpsValue::Int(1));
        attributes.insert("two words".to_string(), PpsValue::Int(2));

        let report = encode("odd name", &attributes, Encoding::Native);
        let text = String::from_utf8(report.bytes.clone()).expect("utf8");
        assert!(text.starts_with("\"odd name\"{"), "{text}");

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        assert_eq!(decoded.messages[0].name(), "odd name");
        assert_eq!(decoded.messages[0].attributes(), &attributes);
    }

    #[test]
    fn structural_message_encodes_as_flagged_header() {
        let message = PpsMessage::status_only("obj.3", ObjectStatus::Deleted).expect("status");
        let report = message.encode(Encoding::Native);
        assert_eq!(report.bytes, b"-obj.3{}".to_vec());

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        assert_eq!(decoded.messages, vec![message]);
    }

    #[test]
    fn json_mode_wraps_named_objects() {
        let mut attributes = Attributes::new();
        attributes.insert("a".to_string(), PpsValue::Int(1));
        attributes.insert("gone".to_string(), PpsValue::Deleted);

        let report = encode("obj", &attributes, Encoding::Json);
        assert_eq!(report.bytes, br#"{"obj":{"a":1,"gone":null}}"#.to_vec());
        assert!(matches!(
            &report.warnings[..],
            [CodecWarning::WroteNull { key, .. }] if key == "gone"
        ));

        let decoded = decode(&terminated(report.bytes)).expect("decode");
        let message = &decoded.messages[0];
        assert_eq!(message.name(), ROOT_OBJECT_NAME);
        let inner = message.get("obj").and_then(PpsValue::as_object).expect("obj");
        assert_eq!(inner.get("a"), Some(&PpsValue::Number(1.0)));
        assert_eq!(inner.get("gone"), Some(&PpsValue::Null));
    }

    #[test]
    fn malformed_json_payload_yields_nothing() {
        let report = decode_str(" {\"a\": [1, 2");
        assert!(report.messages.is_empty());
        assert!(matches!(report.warnings[0], CodecWarning::Json(_)));
    }

    #[test]
    fn invalid_utf8_is_decoded_lossily() {
        let report = decode(b"obj{a:\"\xff\"}\0").expect("decode");
        assert_eq!(report.warnings[0], CodecWarning::InvalidUtf8);
        assert_eq!(
            report.messages[0].get("a"),
            Some(&PpsValue::from("\u{fffd}"))
        );
    }
}
