use std::borrow::Cow;

use nom::error::{Error, ErrorKind};
use nom::{Err, IResult, Needed};

/// One structural token of the input stream. String contents are returned
/// raw (escape sequences intact) and borrow from the input buffer; callers
/// decode with `decode_string` once a value is known to be interesting.
#[derive(Debug, PartialEq)]
pub enum JsonToken<'a> {
    ObjectBegin,
    ObjectEnd,
    ArrayBegin,
    ArrayEnd,
    Str(&'a str),
    Scalar(&'a str),
}

/// Streaming tokenizer step: returns `Err::Incomplete` when the buffer ends
/// before a full token, so the caller can read more input and re-parse.
/// Whitespace, commas and colons are treated uniformly as token separators.
pub fn json_token(i: &[u8]) -> IResult<&[u8], JsonToken<'_>> {
    let i = skip_filler(i);
    let Some(&first) = i.first() else {
        return Err(Err::Incomplete(Needed::new(1)));
    };
    match first {
        b'{' => Ok((&i[1..], JsonToken::ObjectBegin)),
        b'}' => Ok((&i[1..], JsonToken::ObjectEnd)),
        b'[' => Ok((&i[1..], JsonToken::ArrayBegin)),
        b']' => Ok((&i[1..], JsonToken::ArrayEnd)),
        b'"' => string_token(&i[1..]),
        b if is_scalar_byte(b) => scalar_token(i),
        _ => Err(Err::Error(Error::new(i, ErrorKind::Char))),
    }
}

pub fn is_filler_byte(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b',' | b':')
}

fn skip_filler(i: &[u8]) -> &[u8] {
    let start = i
        .iter()
        .position(|b| !is_filler_byte(*b))
        .unwrap_or(i.len());
    &i[start..]
}

fn is_scalar_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'-' | b'+' | b'.')
}

// Called just past the opening quote; consumes through the closing quote.
fn string_token(i: &[u8]) -> IResult<&[u8], JsonToken<'_>> {
    let mut escaped = false;
    for (idx, &b) in i.iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match b {
            b'\\' => escaped = true,
            b'"' => {
                let content = std::str::from_utf8(&i[..idx])
                    .map_err(|_| Err::Failure(Error::new(i, ErrorKind::Char)))?;
                return Ok((&i[idx + 1..], JsonToken::Str(content)));
            }
            _ => {}
        }
    }
    Err(Err::Incomplete(Needed::new(1)))
}

// Numbers and the bare words true/false/null/nan/inf. A scalar is only
// complete once a non-scalar byte follows it, hence Incomplete at the end
// of the buffer.
fn scalar_token(i: &[u8]) -> IResult<&[u8], JsonToken<'_>> {
    match i.iter().position(|b| !is_scalar_byte(*b)) {
        None => Err(Err::Incomplete(Needed::new(1))),
        Some(end) => {
            let text = std::str::from_utf8(&i[..end]).expect("scalar bytes are ASCII");
            Ok((&i[end..], JsonToken::Scalar(text)))
        }
    }
}

/// Decodes JSON string escapes. Borrows the input unchanged when it holds
/// no backslash; malformed escapes degrade to the replacement character
/// rather than failing the record.
pub fn decode_string(raw: &str) -> Cow<'_, str> {
    if !raw.contains('\\') {
        return Cow::Borrowed(raw);
    }
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('"') => out.push('"'),
            Some('\\') => out.push('\\'),
            Some('/') => out.push('/'),
            Some('b') => out.push('\u{0008}'),
            Some('f') => out.push('\u{000C}'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some('u') => out.push(decode_unicode_escape(&mut chars)),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    Cow::Owned(out)
}

fn decode_unicode_escape(chars: &mut std::str::Chars<'_>) -> char {
    let Some(unit) = read_hex4(chars) else {
        return char::REPLACEMENT_CHARACTER;
    };
    if (0xD800..0xDC00).contains(&unit) {
        // High surrogate: only valid as the first half of a \uXXXX pair.
        let mut lookahead = chars.clone();
        if lookahead.next() == Some('\\') && lookahead.next() == Some('u') {
            if let Some(low) = read_hex4(&mut lookahead) {
                if (0xDC00..0xE000).contains(&low) {
                    *chars = lookahead;
                    let code = 0x10000 + ((unit - 0xD800) << 10) + (low - 0xDC00);
                    return char::from_u32(code).unwrap_or(char::REPLACEMENT_CHARACTER);
                }
            }
        }
        return char::REPLACEMENT_CHARACTER;
    }
    char::from_u32(unit).unwrap_or(char::REPLACEMENT_CHARACTER)
}

fn read_hex4(chars: &mut std::str::Chars<'_>) -> Option<u32> {
    let mut value = 0;
    for _ in 0..4 {
        value = value * 16 + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_tokens(mut i: &[u8]) -> Vec<JsonToken<'_>> {
        let mut tokens = vec![];
        while let Ok((rest, token)) = json_token(i) {
            tokens.push(token);
            i = rest;
        }
        tokens
    }

    #[test]
    fn tokenizes_a_flat_object() {
        let tokens = all_tokens(b"{\"x\":\"a\",\"n\":12.5} ");
        assert_eq!(
            tokens,
            vec![
                JsonToken::ObjectBegin,
                JsonToken::Str("x"),
                JsonToken::Str("a"),
                JsonToken::Str("n"),
                JsonToken::Scalar("12.5"),
                JsonToken::ObjectEnd,
            ]
        );
    }

    #[test]
    fn tokenizes_nested_containers() {
        let tokens = all_tokens(b"{\"a\":[1,2],\"b\":{\"c\":null}} ");
        assert_eq!(
            tokens,
            vec![
                JsonToken::ObjectBegin,
                JsonToken::Str("a"),
                JsonToken::ArrayBegin,
                JsonToken::Scalar("1"),
                JsonToken::Scalar("2"),
                JsonToken::ArrayEnd,
                JsonToken::Str("b"),
                JsonToken::ObjectBegin,
                JsonToken::Str("c"),
                JsonToken::Scalar("null"),
                JsonToken::ObjectEnd,
                JsonToken::ObjectEnd,
            ]
        );
    }

    #[test]
    fn escaped_quote_does_not_end_the_string() {
        let (rest, token) = json_token(b"\"a\\\"b\" ").unwrap();
        assert_eq!(token, JsonToken::Str("a\\\"b"));
        assert_eq!(rest, b" ".as_slice());
    }

    #[test]
    fn incomplete_string_asks_for_more_input() {
        assert!(matches!(
            json_token(b"\"unterminated"),
            Err(Err::Incomplete(_))
        ));
    }

    #[test]
    fn scalar_at_end_of_buffer_is_incomplete() {
        // "12" could continue as "123" in the next chunk.
        assert!(matches!(json_token(b"12"), Err(Err::Incomplete(_))));
        let (_, token) = json_token(b"12}").unwrap();
        assert_eq!(token, JsonToken::Scalar("12"));
    }

    #[test]
    fn empty_and_filler_only_input_is_incomplete() {
        assert!(matches!(json_token(b""), Err(Err::Incomplete(_))));
        assert!(matches!(json_token(b"  \n, :"), Err(Err::Incomplete(_))));
    }

    #[test]
    fn decode_passes_plain_strings_through() {
        assert!(matches!(decode_string("plain"), Cow::Borrowed("plain")));
    }

    #[test]
    fn decode_handles_simple_escapes() {
        assert_eq!(decode_string(r#"a\"b\\c\nd"#), "a\"b\\c\nd");
        assert_eq!(decode_string(r"tab\there"), "tab\there");
    }

    #[test]
    fn decode_handles_unicode_escapes() {
        assert_eq!(decode_string("\\u0041"), "A");
        assert_eq!(decode_string("\\ud83d\\ude00"), "\u{1F600}");
        assert_eq!(decode_string("\\ud83d"), "\u{FFFD}");
    }
}
