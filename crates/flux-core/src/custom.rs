//! The donation form's `custom` correlation payload.
//!
//! The donation form embeds `base64(serialize(array(...)))` in PayPal's
//! `custom` field and PayPal echoes it back in the notification. The
//! serialized form is PHP's `serialize()` encoding of a flat associative
//! array, which the existing donation pages already produce:
//!
//! ```text
//! a:2:{s:10:"account_id";s:7:"2000001";s:11:"server_name";s:6:"FluxRO";}
//! ```
//!
//! Only scalar entries are kept; nested arrays are skipped.

use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use base64::Engine;

use crate::error::{FluxError, Result};

const ACCOUNT_ID: &str = "account_id";
const SERVER_NAME: &str = "server_name";

/// Deepest array nesting accepted.
const MAX_DEPTH: usize = 16;

/// Standard alphabet, padding optional on decode.
const LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Decoded `custom` payload.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CustomData {
    entries: Vec<(String, String)>,
}

impl CustomData {
    /// Payload carrying the account and server a donation is for.
    #[must_use]
    pub fn for_donation(account_id: impl Into<String>, server_name: impl Into<String>) -> Self {
        Self {
            entries: vec![
                (ACCOUNT_ID.to_string(), account_id.into()),
                (SERVER_NAME.to_string(), server_name.into()),
            ],
        }
    }

    /// Decode a raw `custom` field.
    ///
    /// # Errors
    ///
    /// Returns `FluxError::CustomDecode` if the field is not base64 or the
    /// decoded bytes are not a serialized array.
    pub fn decode(raw: &str) -> Result<Self> {
        // Form decoding turns an unescaped '+' into a space.
        let cleaned: String = raw
            .trim()
            .chars()
            .map(|c| if c == ' ' { '+' } else { c })
            .filter(|c| !c.is_ascii_whitespace())
            .collect();

        let bytes = LENIENT
            .decode(cleaned.as_bytes())
            .map_err(|e| FluxError::CustomDecode(format!("base64: {e}")))?;

        let entries = Parser::new(&bytes).parse_document()?;
        Ok(Self { entries })
    }

    /// Encode for embedding in a donation form.
    #[must_use]
    pub fn encode(&self) -> String {
        let mut out = format!("a:{}:{{", self.entries.len());
        for (key, value) in &self.entries {
            push_string(&mut out, key);
            push_string(&mut out, value);
        }
        out.push('}');
        LENIENT.encode(out.as_bytes())
    }

    /// Look up an entry. Empty values count as absent.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    /// The `account_id` entry, if present and non-empty.
    #[must_use]
    pub fn account_id(&self) -> Option<&str> {
        self.get(ACCOUNT_ID)
    }

    /// The `server_name` entry, if present and non-empty.
    #[must_use]
    pub fn server_name(&self) -> Option<&str> {
        self.get(SERVER_NAME)
    }
}

fn push_string(out: &mut String, s: &str) {
    out.push_str(&format!("s:{}:\"{s}\";", s.len()));
}

/// A decoded serialized value.
enum Value {
    Scalar(String),
    Array,
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn new(input: &'a [u8]) -> Self {
        Self {
            input,
            pos: 0,
            depth: 0,
        }
    }

    fn error(&self, what: &str) -> FluxError {
        FluxError::CustomDecode(format!("{what} at byte {}", self.pos))
    }

    fn parse_document(&mut self) -> Result<Vec<(String, String)>> {
        if self.peek() != Some(b'a') {
            return Err(self.error("expected array"));
        }
        let entries = self.parse_array()?;
        if self.input[self.pos..].iter().any(|b| !b.is_ascii_whitespace()) {
            return Err(self.error("trailing data"));
        }
        Ok(entries)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Result<()> {
        if self.peek() == Some(byte) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected '{}'", byte as char)))
        }
    }

    /// Read up to (and consume) `terminator`.
    fn read_until(&mut self, terminator: u8) -> Result<&'a str> {
        let input = self.input;
        let start = self.pos;
        let len = input[start..]
            .iter()
            .position(|&b| b == terminator)
            .ok_or_else(|| self.error("unterminated token"))?;
        self.pos = start + len + 1;
        std::str::from_utf8(&input[start..start + len]).map_err(|_| self.error("invalid utf-8"))
    }

    fn read_count(&mut self, terminator: u8) -> Result<usize> {
        self.read_until(terminator)?
            .parse()
            .map_err(|_| self.error("invalid length"))
    }

    fn parse_array(&mut self) -> Result<Vec<(String, String)>> {
        if self.depth == MAX_DEPTH {
            return Err(self.error("arrays nested too deeply"));
        }
        self.depth += 1;
        let entries = self.parse_array_body();
        self.depth -= 1;
        entries
    }

    fn parse_array_body(&mut self) -> Result<Vec<(String, String)>> {
        self.expect(b'a')?;
        self.expect(b':')?;
        let count = self.read_count(b':')?;
        self.expect(b'{')?;

        let mut entries = Vec::new();
        for _ in 0..count {
            let key = match self.parse_value()? {
                Value::Scalar(key) => key,
                Value::Array => return Err(self.error("array used as key")),
            };
            if let Value::Scalar(value) = self.parse_value()? {
                entries.push((key, value));
            }
        }
        self.expect(b'}')?;
        Ok(entries)
    }

    fn parse_value(&mut self) -> Result<Value> {
        match self.peek() {
            Some(b'N') => {
                self.pos += 1;
                self.expect(b';')?;
                Ok(Value::Scalar(String::new()))
            }
            Some(b'b') => {
                self.pos += 1;
                self.expect(b':')?;
                let flag = self.read_until(b';')?;
                Ok(Value::Scalar(if flag == "1" { "1".into() } else { String::new() }))
            }
            Some(b'i' | b'd') => {
                self.pos += 1;
                self.expect(b':')?;
                let number = self.read_until(b';')?;
                if number.is_empty() {
                    return Err(self.error("empty number"));
                }
                Ok(Value::Scalar(number.to_string()))
            }
            Some(b's') => {
                self.pos += 1;
                self.expect(b':')?;
                let len = self.read_count(b':')?;
                self.expect(b'"')?;
                let end = self
                    .pos
                    .checked_add(len)
                    .filter(|&end| end <= self.input.len())
                    .ok_or_else(|| self.error("string overruns input"))?;
                let text = std::str::from_utf8(&self.input[self.pos..end])
                    .map_err(|_| self.error("invalid utf-8"))?;
                self.pos = end;
                self.expect(b'"')?;
                self.expect(b';')?;
                Ok(Value::Scalar(text.to_string()))
            }
            Some(b'a') => {
                self.parse_array()?;
                Ok(Value::Array)
            }
            _ => Err(self.error("unsupported value")),
        }
    }
}
