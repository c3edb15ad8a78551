//! BibTeX codec.
//!
//! Accepted input is a sequence of `@type{key, name = value, ...}` entries
//! (parentheses work as outer delimiters too). Values are `{...}` with
//! nested braces, `"..."`, or bare integers. Field names and entry types are
//! lower-cased; values are stored without their delimiters.
//!
//! Canonical output:
//!
//! ```text
//! @article{smith2020,
//!   author = {Smith, J.},
//!   year = 2020,
//! }
//!
//! @book{doe1999,
//! }
//! ```
//!
//! Two-space indent, one field per line, a trailing comma on every field, a
//! blank line between entries and a final newline. Digit-only values are
//! written bare, everything else in braces.
//!
//! Anything the codec cannot represent faithfully is rejected rather than
//! dropped: `@string`, `@preamble` and `@comment` blocks, macro references,
//! `#` concatenation and free text between entries.

use crate::record::{KEY_FIELD, Record, RecordCollection, RecordKey, TYPE_FIELD};

use super::{CodecError, IdentityPolicy, RecordCodec};

/// [`RecordCodec`] for `.bib` files.
#[derive(Clone, Debug, Default)]
pub struct BibtexCodec {
    identity: IdentityPolicy,
}

impl BibtexCodec {
    #[must_use]
    pub const fn new(identity: IdentityPolicy) -> Self {
        Self { identity }
    }
}

impl RecordCodec for BibtexCodec {
    fn decode(&self, bytes: &[u8]) -> Result<RecordCollection, CodecError> {
        let text = std::str::from_utf8(bytes).map_err(|e| CodecError::InvalidUtf8 {
            line: line_of(&bytes[..e.valid_up_to()]),
        })?;

        let mut collection = RecordCollection::new();
        for entry in Parser::new(text).entries()? {
            let line = entry.line;
            let record = entry.into_record(&self.identity);
            collection
                .push(record)
                .map_err(|e| CodecError::DuplicateKey { line, key: e.0 })?;
        }
        Ok(collection)
    }

    fn encode(&self, records: &RecordCollection) -> Vec<u8> {
        let mut out = String::new();
        for (i, record) in records.iter().enumerate() {
            if i > 0 {
                out.push('\n');
            }
            let entry_type = record.entry_type().unwrap_or("misc");
            let key = record
                .get(KEY_FIELD)
                .or_else(|| record.key().map(RecordKey::as_str))
                .unwrap_or_default();
            out.push('@');
            out.push_str(entry_type);
            out.push('{');
            out.push_str(key);
            out.push_str(",\n");
            for field in record.fields() {
                if field.name == TYPE_FIELD || field.name == KEY_FIELD {
                    continue;
                }
                out.push_str("  ");
                out.push_str(&field.name);
                out.push_str(" = ");
                push_value(&mut out, &field.value);
                out.push_str(",\n");
            }
            out.push_str("}\n");
        }
        out.into_bytes()
    }
}

fn push_value(out: &mut String, value: &str) {
    if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
        out.push_str(value);
    } else {
        out.push('{');
        out.push_str(value);
        out.push('}');
    }
}

fn line_of(prefix: &[u8]) -> usize {
    prefix.iter().filter(|&&b| b == b'\n').count() + 1
}

const KEY_DELIMITERS: [char; 5] = ['{', '}', '(', ')', '"'];

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | ':' | '.' | '+' | '/')
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct RawEntry {
    line: usize,
    entry_type: String,
    key: String,
    fields: Vec<(String, String)>,
}

impl RawEntry {
    fn into_record(self, identity: &IdentityPolicy) -> Record {
        let mut record = Record::new(None)
            .with_field(TYPE_FIELD, &self.entry_type)
            .with_field(KEY_FIELD, &self.key);
        for (name, value) in &self.fields {
            record.set(name, value);
        }
        let key = identity.key_for(&record);
        record.with_key(key)
    }
}

struct Parser<'a> {
    src: &'a str,
    pos: usize,
}

impl<'a> Parser<'a> {
    const fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    fn error(&self, at: usize, message: impl Into<String>) -> CodecError {
        CodecError::Parse {
            line: line_of(&self.src.as_bytes()[..at]),
            message: message.into(),
        }
    }

    fn peek(&self) -> Option<char> {
        self.src[self.pos..].chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.pos += c.len_utf8();
        Some(c)
    }

    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'a str {
        let start = self.pos;
        while self.peek().is_some_and(&pred) {
            self.bump();
        }
        &self.src[start..self.pos]
    }

    fn skip_ws(&mut self) {
        self.take_while(char::is_whitespace);
    }

    fn entries(&mut self) -> Result<Vec<RawEntry>, CodecError> {
        let mut out = Vec::new();
        loop {
            self.skip_ws();
            match self.peek() {
                None => return Ok(out),
                Some('@') => out.push(self.entry()?),
                Some(_) => return Err(self.error(self.pos, "unexpected text outside an entry")),
            }
        }
    }

    fn entry(&mut self) -> Result<RawEntry, CodecError> {
        let start = self.pos;
        self.bump();
        self.skip_ws();

        let entry_type = self.take_while(is_ident_char).to_lowercase();
        if entry_type.is_empty() {
            return Err(self.error(start, "missing entry type after `@`"));
        }
        if matches!(entry_type.as_str(), "string" | "preamble" | "comment") {
            return Err(self.error(start, format!("@{entry_type} blocks are not supported")));
        }

        self.skip_ws();
        let close = match self.bump() {
            Some('{') => '}',
            Some('(') => ')',
            _ => return Err(self.error(start, format!("expected `{{` after @{entry_type}"))),
        };

        self.skip_ws();
        let key = self
            .take_while(|c| !c.is_whitespace() && c != ',' && c != close)
            .to_owned();
        if key.is_empty() {
            return Err(self.error(start, "missing citation key"));
        }
        // The encoder always writes `@type{key,`, so a key holding a
        // delimiter would not survive the trip back.
        if let Some(c) = key.chars().find(|c| KEY_DELIMITERS.contains(c)) {
            return Err(self.error(start, format!("`{c}` is not allowed in a citation key")));
        }

        let mut entry = RawEntry {
            line: line_of(&self.src.as_bytes()[..start]),
            entry_type,
            key,
            fields: Vec::new(),
        };

        self.skip_ws();
        match self.bump() {
            Some(',') => {}
            Some(c) if c == close => return Ok(entry),
            None => return Err(self.error(start, "unterminated entry")),
            Some(_) => return Err(self.error(self.pos, "expected `,` after citation key")),
        }

        loop {
            self.skip_ws();
            match self.peek() {
                None => return Err(self.error(start, "unterminated entry")),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(entry);
                }
                Some(_) => {}
            }

            let name_pos = self.pos;
            let name = self.take_while(is_ident_char).to_lowercase();
            if name.is_empty() {
                return Err(self.error(name_pos, "expected a field name"));
            }
            if entry.fields.iter().any(|(n, _)| *n == name) {
                return Err(self.error(name_pos, format!("duplicate field `{name}`")));
            }

            self.skip_ws();
            if self.bump() != Some('=') {
                return Err(self.error(name_pos, format!("expected `=` after `{name}`")));
            }
            self.skip_ws();
            let value = self.value()?;

            self.skip_ws();
            match self.peek() {
                Some('#') => {
                    return Err(self.error(self.pos, "`#` concatenation is not supported"));
                }
                Some(',') => {
                    self.bump();
                }
                Some(c) if c == close => {}
                None => return Err(self.error(start, "unterminated entry")),
                Some(_) => {
                    return Err(self.error(self.pos, format!("expected `,` after `{name}`")));
                }
            }
            entry.fields.push((name, value));
        }
    }

    fn value(&mut self) -> Result<String, CodecError> {
        let start = self.pos;
        match self.peek() {
            Some('{') => {
                self.bump();
                self.delimited(start, false)
            }
            Some('"') => {
                self.bump();
                self.delimited(start, true)
            }
            Some(c) if c.is_ascii_digit() => {
                let digits = self.take_while(|c| c.is_ascii_digit());
                if self.peek().is_some_and(is_ident_char) {
                    return Err(self.error(start, "macro references are not supported"));
                }
                Ok(digits.to_owned())
            }
            Some(c) if is_ident_char(c) => {
                Err(self.error(start, "macro references are not supported"))
            }
            _ => Err(self.error(start, "expected a field value")),
        }
    }

    /// Read up to the closing delimiter. Braces nest in both forms; a quoted
    /// value ends at the first `"` outside any braces.
    fn delimited(&mut self, start: usize, quoted: bool) -> Result<String, CodecError> {
        let content_start = self.pos;
        let mut depth = 0usize;
        loop {
            let here = self.pos;
            match self.bump() {
                None => return Err(self.error(start, "unterminated value")),
                Some('{') => depth += 1,
                Some('}') if depth > 0 => depth -= 1,
                Some('}') if quoted => {
                    return Err(self.error(here, "unbalanced `}` in quoted value"));
                }
                Some('}') => return Ok(self.src[content_start..here].to_owned()),
                Some('"') if quoted && depth == 0 => {
                    return Ok(self.src[content_start..here].to_owned());
                }
                Some(_) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn codec() -> BibtexCodec {
        BibtexCodec::default()
    }

    fn key(s: &str) -> RecordKey {
        RecordKey::new(s).unwrap()
    }

    fn parse_err(input: &str) -> CodecError {
        codec().decode(input.as_bytes()).unwrap_err()
    }

    const CANONICAL: &str = "\
@article{smith2020,
  author = {Smith, J. and {Doe}, A.},
  title = {On {BibTeX}},
  year = 2020,
  note = {},
}

@book{doe1999,
}
";

    #[test]
    fn decode_canonical() {
        let c = codec().decode(CANONICAL.as_bytes()).unwrap();
        assert_eq!(c.len(), 2);
        let smith = c.get(&key("smith2020")).unwrap();
        assert_eq!(smith.entry_type(), Some("article"));
        assert_eq!(smith.get("author"), Some("Smith, J. and {Doe}, A."));
        assert_eq!(smith.get("title"), Some("On {BibTeX}"));
        assert_eq!(smith.get("year"), Some("2020"));
        assert_eq!(smith.get("note"), Some(""));
        assert_eq!(smith.get("missing"), None);
        assert_eq!(c.get(&key("doe1999")).unwrap().fields().len(), 2);
    }

    #[test]
    fn canonical_input_roundtrips_byte_for_byte() {
        let c = codec().decode(CANONICAL.as_bytes()).unwrap();
        assert_eq!(String::from_utf8(codec().encode(&c)).unwrap(), CANONICAL);
    }

    #[test]
    fn normalizes_loose_input() {
        let input = "@ARTICLE( x ,\n Title=\"Hello {World}\" ,YEAR = {1999}\n)\n\n\n@Misc{y}";
        let c = codec().decode(input.as_bytes()).unwrap();
        let out = String::from_utf8(codec().encode(&c)).unwrap();
        assert_eq!(
            out,
            "@article{x,\n  title = {Hello {World}},\n  year = 1999,\n}\n\n@misc{y,\n}\n"
        );
        let again = codec().decode(out.as_bytes()).unwrap();
        assert_eq!(again, c);
    }

    #[test]
    fn empty_input_is_empty_collection() {
        assert!(codec().decode(b"").unwrap().is_empty());
        assert!(codec().decode(b"  \n\n").unwrap().is_empty());
        assert!(codec().encode(&RecordCollection::new()).is_empty());
    }

    #[test]
    fn field_identity_policy() {
        let codec = BibtexCodec::new(IdentityPolicy::Field("doi".into()));
        let c = codec
            .decode(b"@misc{a, doi = {10.1/X}}\n@misc{b, title = {no doi}}\n")
            .unwrap();
        assert!(c.get(&key("10.1/x")).is_some());
        assert_eq!(c.keys().count(), 1);
        assert_eq!(c.len(), 2);
    }

    #[test]
    fn non_ascii_values() {
        let c = codec().decode("@misc{k, author = {Gödel, Kurt}}".as_bytes()).unwrap();
        assert_eq!(c.get(&key("k")).unwrap().get("author"), Some("Gödel, Kurt"));
    }

    #[test]
    fn rejects_string_preamble_comment() {
        for block in ["@string{foo = {bar}}", "@preamble{\"x\"}", "@comment{hi}"] {
            assert!(matches!(parse_err(block), CodecError::Parse { line: 1, .. }));
        }
    }

    #[test]
    fn rejects_macros_and_concatenation() {
        let err = parse_err("@misc{a,\n  month = jan,\n}");
        assert_eq!(err.line(), 2);
        assert!(err.to_string().contains("macro"));

        let err = parse_err("@misc{a,\n  title = {a} # {b},\n}");
        assert_eq!(err.line(), 2);
        assert!(err.to_string().contains('#'));
    }

    #[test]
    fn rejects_text_between_entries() {
        let err = parse_err("@misc{a,\n}\n% a comment\n@misc{b,\n}\n");
        assert_eq!(err.line(), 3);
    }

    #[test]
    fn rejects_unterminated_value() {
        let err = parse_err("@misc{a,\n  title = {open {nested,\n}\n");
        assert_eq!(err.line(), 2);
        assert!(err.to_string().contains("unterminated"));
    }

    #[test]
    fn rejects_unterminated_entry() {
        assert!(parse_err("@misc{a,\n  title = {x},\n").to_string().contains("unterminated"));
    }

    #[test]
    fn rejects_duplicate_field() {
        let err = parse_err("@misc{a,\n  title = {x},\n  TITLE = {y},\n}");
        assert_eq!(err.line(), 3);
        assert!(err.to_string().contains("duplicate field"));
    }

    #[test]
    fn rejects_duplicate_key() {
        let err = parse_err("@misc{a,\n}\n\n@book{a,\n}\n");
        assert_eq!(
            err,
            CodecError::DuplicateKey {
                line: 4,
                key: key("a")
            }
        );
    }

    #[test]
    fn rejects_invalid_utf8_with_line() {
        let mut bytes = b"@misc{a,\n  title = {".to_vec();
        bytes.push(0xff);
        bytes.extend_from_slice(b"},\n}\n");
        assert_eq!(
            codec().decode(&bytes).unwrap_err(),
            CodecError::InvalidUtf8 { line: 2 }
        );
    }

    #[test]
    fn parenthesised_entry_roundtrips() {
        let c = codec().decode(b"@misc(a-b, title = {x})").unwrap();
        let out = codec().encode(&c);
        assert_eq!(String::from_utf8_lossy(&out), "@misc{a-b,\n  title = {x},\n}\n");
        assert_eq!(codec().decode(&out).unwrap(), c);
    }

    #[test]
    fn rejects_delimiters_in_key() {
        let err = parse_err("@misc(a}b, title = {x})");
        assert_eq!(err.line(), 1);
        assert!(err.to_string().contains("citation key"), "{err}");
        for input in ["@misc(a{b, title = {x})", "@misc{a(b, title = {x}}", "@misc{a\"b,}"] {
            assert!(matches!(parse_err(input), CodecError::Parse { .. }), "{input}");
        }
    }

    #[test]
    fn rejects_missing_key() {
        assert!(parse_err("@misc{, title = {x}}").to_string().contains("citation key"));
    }
}
