use std::borrow::Cow;

use nom::error::{Error, ErrorKind};
use nom::{Err, IResult};

use crate::fields::FieldTable;
use crate::parser::json_tokenizer::{JsonToken, decode_string, json_token};

/// Location of a captured value inside the record buffer. Values are
/// referenced in place; the only copies are made when a clump adopts its
/// key strings.
#[derive(Debug, Clone, Copy)]
struct Span {
    start: usize,
    len: usize,
}

#[derive(Debug, Clone, Copy)]
struct Frame {
    is_object: bool,
    expect_key: bool,
}

/// Per-record scratch state. For each interesting field it remembers where
/// the most recent top-level value for that field sits in the buffer; the
/// scratch is reset at the start of every record.
pub struct RecordExtractor {
    names: Vec<Box<str>>,
    captured: Vec<Option<Span>>,
    current: Option<usize>,
    stack: Vec<Frame>,
}

impl RecordExtractor {
    pub fn new(fields: &FieldTable) -> Self {
        let names: Vec<Box<str>> = fields.names().map(Box::from).collect();
        let captured = vec![None; names.len()];
        RecordExtractor {
            names,
            captured,
            current: None,
            stack: Vec::new(),
        }
    }

    fn reset(&mut self) {
        self.captured.fill(None);
        self.current = None;
        self.stack.clear();
    }

    /// Resolves the captured spans against the record buffer, decoding
    /// string escapes. Absent fields come back as `None`.
    pub fn values<'a>(&self, buf: &'a [u8]) -> Vec<Option<Cow<'a, str>>> {
        self.captured
            .iter()
            .map(|span| {
                span.map(|s| {
                    let raw = std::str::from_utf8(&buf[s.start..s.start + s.len])
                        .expect("captured spans point at validated token content");
                    decode_string(raw)
                })
            })
            .collect()
    }
}

/// Parses one top-level JSON object out of `buf`, recording the values of
/// interesting fields into the extractor scratch. Only string and number
/// values directly inside the top-level object are observed; nested
/// containers are parsed and skipped.
pub fn parse_record<'a>(buf: &'a [u8], ex: &mut RecordExtractor) -> IResult<&'a [u8], ()> {
    ex.reset();
    let mut i = buf;
    loop {
        let (rest, token) = json_token(i)?;
        match token {
            JsonToken::ObjectBegin => {
                if let Some(frame) = ex.stack.last_mut() {
                    if frame.is_object {
                        frame.expect_key = true;
                    }
                }
                ex.stack.push(Frame {
                    is_object: true,
                    expect_key: true,
                });
            }
            JsonToken::ArrayBegin => {
                let Some(frame) = ex.stack.last_mut() else {
                    return Err(Err::Error(Error::new(i, ErrorKind::Char)));
                };
                if frame.is_object {
                    frame.expect_key = true;
                }
                ex.stack.push(Frame {
                    is_object: false,
                    expect_key: false,
                });
            }
            JsonToken::ObjectEnd => {
                match ex.stack.pop() {
                    Some(frame) if frame.is_object => {}
                    _ => return Err(Err::Failure(Error::new(i, ErrorKind::Char))),
                }
                if ex.stack.is_empty() {
                    return Ok((rest, ()));
                }
            }
            JsonToken::ArrayEnd => match ex.stack.pop() {
                Some(frame) if !frame.is_object => {}
                _ => return Err(Err::Failure(Error::new(i, ErrorKind::Char))),
            },
            JsonToken::Str(s) => {
                let Some(frame) = ex.stack.last_mut() else {
                    return Err(Err::Error(Error::new(i, ErrorKind::Char)));
                };
                if frame.is_object && frame.expect_key {
                    frame.expect_key = false;
                    if ex.stack.len() == 1 {
                        ex.current = ex.names.iter().position(|n| **n == *s);
                    }
                } else {
                    if frame.is_object {
                        frame.expect_key = true;
                    }
                    if ex.stack.len() == 1 {
                        if let Some(field) = ex.current {
                            ex.captured[field] = Some(span_of(buf, s));
                        }
                    }
                }
            }
            JsonToken::Scalar(s) => {
                let Some(frame) = ex.stack.last_mut() else {
                    return Err(Err::Error(Error::new(i, ErrorKind::Char)));
                };
                if frame.is_object && frame.expect_key {
                    return Err(Err::Failure(Error::new(i, ErrorKind::Char)));
                }
                if frame.is_object {
                    frame.expect_key = true;
                }
                if ex.stack.len() == 1 {
                    if let Some(field) = ex.current {
                        // true, false and null leave the field unset
                        if !matches!(s.as_bytes().first(), Some(b't' | b'f' | b'n')) {
                            ex.captured[field] = Some(span_of(buf, s));
                        }
                    }
                }
            }
        }
        i = rest;
    }
}

fn span_of(buf: &[u8], content: &str) -> Span {
    let start = content.as_ptr() as usize - buf.as_ptr() as usize;
    Span {
        start,
        len: content.len(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extractor_for(keys: &[&str], others: &[&str]) -> RecordExtractor {
        let mut table = FieldTable::new();
        for k in keys {
            table.add(k, true);
        }
        for o in others {
            table.add(o, false);
        }
        table.finalize();
        RecordExtractor::new(&table)
    }

    fn extract<'a>(buf: &'a [u8], ex: &mut RecordExtractor) -> Vec<Option<String>> {
        let (rest, ()) = parse_record(buf, ex).expect("record should parse");
        assert!(rest.iter().all(|b| *b == b' '));
        ex.values(buf)
            .into_iter()
            .map(|v| v.map(Cow::into_owned))
            .collect()
    }

    #[test]
    fn captures_string_and_number_values() {
        let mut ex = extractor_for(&["x"], &["n"]);
        let vals = extract(b"{\"x\":\"a\",\"n\":12.5,\"other\":1} ", &mut ex);
        assert_eq!(vals, vec![Some("a".to_string()), Some("12.5".to_string())]);
    }

    #[test]
    fn absent_fields_stay_unset() {
        let mut ex = extractor_for(&["x", "y"], &[]);
        let vals = extract(b"{\"y\":\"b\"} ", &mut ex);
        assert_eq!(vals, vec![None, Some("b".to_string())]);
    }

    #[test]
    fn true_false_null_leave_the_field_unset() {
        let mut ex = extractor_for(&["x"], &[]);
        let vals = extract(b"{\"x\":null} ", &mut ex);
        assert_eq!(vals, vec![None]);
        let vals = extract(b"{\"x\":true} ", &mut ex);
        assert_eq!(vals, vec![None]);
    }

    #[test]
    fn nested_containers_are_skipped() {
        let mut ex = extractor_for(&["x"], &[]);
        // The nested object carries its own "x"; only the top level counts.
        let vals = extract(b"{\"a\":{\"x\":\"inner\"},\"x\":\"outer\",\"b\":[1,2]} ", &mut ex);
        assert_eq!(vals, vec![Some("outer".to_string())]);
    }

    #[test]
    fn container_value_of_interesting_field_is_ignored() {
        let mut ex = extractor_for(&["x"], &[]);
        let vals = extract(b"{\"x\":[1,2,3]} ", &mut ex);
        assert_eq!(vals, vec![None]);
    }

    #[test]
    fn latest_duplicate_key_wins() {
        let mut ex = extractor_for(&["x"], &[]);
        let vals = extract(b"{\"x\":\"first\",\"x\":\"second\"} ", &mut ex);
        assert_eq!(vals, vec![Some("second".to_string())]);
    }

    #[test]
    fn string_escapes_are_decoded() {
        let mut ex = extractor_for(&["x"], &[]);
        let vals = extract(br#"{"x":"a\"b\n"} "#, &mut ex);
        assert_eq!(vals, vec![Some("a\"b\n".to_string())]);
    }

    #[test]
    fn scratch_resets_between_records() {
        let mut ex = extractor_for(&["x"], &[]);
        let vals = extract(b"{\"x\":\"a\"} ", &mut ex);
        assert_eq!(vals, vec![Some("a".to_string())]);
        let vals = extract(b"{} ", &mut ex);
        assert_eq!(vals, vec![None]);
    }

    #[test]
    fn non_object_input_is_an_error() {
        let mut ex = extractor_for(&["x"], &[]);
        assert!(matches!(
            parse_record(b"[1,2] ", &mut ex),
            Err(Err::Error(_))
        ));
        assert!(matches!(
            parse_record(b"garbage ", &mut ex),
            Err(Err::Error(_))
        ));
    }

    #[test]
    fn leaves_the_rest_of_the_buffer_untouched() {
        let mut ex = extractor_for(&["x"], &[]);
        let buf = b"{\"x\":\"a\"}{\"x\":\"b\"} ";
        let (rest, ()) = parse_record(buf, &mut ex).unwrap();
        assert_eq!(rest, b"{\"x\":\"b\"} ".as_slice());
    }
}
