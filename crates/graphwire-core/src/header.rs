//! Routing-header peeking.
//!
//! The routing header is the leading portion of a JSON-RPC envelope: the
//! correlation `id`, the `method` (for notifications), and the `error`
//! record. The dispatcher sees only a bounded prefix of the payload, which
//! may cut the document anywhere (typically inside `result`), so the parser
//! scans top-level fields left to right and keeps whatever it has located
//! when the prefix runs out. Captured spans are handed to serde_json, which
//! owns string unescaping and the error-record layout.

use crate::envelope::ErrorInfo;

/// Routing metadata peeked from the leading bytes of an inbound envelope.
///
/// Two mutually exclusive shapes: a response (`id`, optionally `error`) and
/// a notification (`id` plus `method`). Neither means the message is
/// malformed and gets dropped.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WsHeader {
    pub id: Option<String>,
    pub method: Option<String>,
    pub error: Option<ErrorInfo>,
}

impl WsHeader {
    /// True if the header carries a `method`, i.e. the notify shape.
    pub fn is_notify(&self) -> bool {
        self.method.is_some()
    }

    /// True if both shapes are empty (malformed inbound message).
    pub fn is_empty(&self) -> bool {
        self.id.is_none() && self.method.is_none()
    }
}

/// Parse a [`WsHeader`] from a payload prefix.
///
/// Field names are matched byte-exactly after JSON string decoding. A field
/// whose value is cut off by the end of the prefix ends the scan; fields
/// already located are kept.
pub fn peek_header(prefix: &[u8]) -> WsHeader {
    let mut header = WsHeader::default();
    let mut s = Scanner::new(prefix);

    s.skip_ws();
    if !s.eat(b'{') {
        return header;
    }

    loop {
        s.skip_ws();
        if matches!(s.peek(), Some(b'}') | None) {
            break;
        }

        let Some(key_span) = s.string_span() else {
            break;
        };
        s.skip_ws();
        if !s.eat(b':') {
            break;
        }
        s.skip_ws();

        let key: Option<String> = serde_json::from_slice(key_span).ok();
        match key.as_deref() {
            Some("id") => match s.string_span() {
                Some(span) => header.id = serde_json::from_slice(span).ok(),
                None => break,
            },
            Some("method") => match s.string_span() {
                Some(span) => header.method = serde_json::from_slice(span).ok(),
                None => break,
            },
            Some("error") => match s.value_span() {
                Some(span) => header.error = serde_json::from_slice(span).ok(),
                None => break,
            },
            _ => {
                if s.value_span().is_none() {
                    break;
                }
            }
        }

        s.skip_ws();
        if !s.eat(b',') {
            break;
        }
    }

    header
}

struct Scanner<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Scanner<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn peek(&self) -> Option<u8> {
        self.buf.get(self.pos).copied()
    }

    fn eat(&mut self, b: u8) -> bool {
        if self.peek() == Some(b) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn skip_ws(&mut self) {
        while matches!(self.peek(), Some(b' ' | b'\t' | b'\n' | b'\r')) {
            self.pos += 1;
        }
    }

    /// Span of a complete JSON string starting at the cursor, including both
    /// quotes. `None` if the cursor is not at a string or the string is cut
    /// off by the end of the prefix.
    fn string_span(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        if !self.eat(b'"') {
            return None;
        }
        while let Some(b) = self.peek() {
            self.pos += 1;
            match b {
                b'"' => return Some(&self.buf[start..self.pos]),
                b'\\' => {
                    // Skip the escaped byte; \uXXXX hex digits are plain
                    // ASCII and fall through the loop.
                    if self.peek().is_none() {
                        return None;
                    }
                    self.pos += 1;
                }
                _ => {}
            }
        }
        None
    }

    /// Span of a complete JSON value (string, object, array, number, or
    /// literal) starting at the cursor. `None` on truncation.
    fn value_span(&mut self) -> Option<&'a [u8]> {
        match self.peek()? {
            b'"' => self.string_span(),
            b'{' | b'[' => self.container_span(),
            _ => self.literal_span(),
        }
    }

    fn container_span(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        let mut depth = 0usize;
        while let Some(b) = self.peek() {
            match b {
                b'{' | b'[' => {
                    depth += 1;
                    self.pos += 1;
                }
                b'}' | b']' => {
                    depth -= 1;
                    self.pos += 1;
                    if depth == 0 {
                        return Some(&self.buf[start..self.pos]);
                    }
                }
                b'"' => {
                    self.string_span()?;
                }
                _ => self.pos += 1,
            }
        }
        None
    }

    /// Numbers, `true`, `false`, `null`. Complete only if a delimiter
    /// follows inside the prefix; a literal running into the end of the
    /// buffer may itself be cut.
    fn literal_span(&mut self) -> Option<&'a [u8]> {
        let start = self.pos;
        while let Some(b) = self.peek() {
            match b {
                b',' | b'}' | b']' | b' ' | b'\t' | b'\n' | b'\r' => {
                    return Some(&self.buf[start..self.pos]);
                }
                _ => self.pos += 1,
            }
        }
        None
    }
}
