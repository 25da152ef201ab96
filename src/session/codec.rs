use super::value::{Record, SessionValue};
use super::CodecError;
use std::borrow::Cow;
use std::collections::BTreeMap;
use std::io::{self, BufRead, Write};

/// Nesting depth past which input is rejected rather than recursed into.
pub const MAX_DEPTH: usize = 64;

const MAX_TAG_LEN: usize = 24;

/// Write the encoding of `value` to `out`.
///
/// Values nested deeper than [`MAX_DEPTH`] are refused, since they could not
/// be decoded again.
pub fn encode<W: Write>(value: &SessionValue, out: &mut W) -> Result<(), CodecError> {
    Encoder { out, depth: 0 }.value(value)
}

/// Encode `value` into a fresh buffer.
pub fn to_vec(value: &SessionValue) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode(value, &mut out)?;
    Ok(out)
}

/// Decode exactly one value from `input`; trailing bytes are an error.
pub fn decode<R: BufRead>(input: R) -> Result<SessionValue, CodecError> {
    let mut decoder = Decoder {
        input,
        offset: 0,
        depth: 0,
    };
    let value = decoder.value()?;
    if decoder.peek()?.is_some() {
        return Err(decoder.error("trailing data after value"));
    }
    Ok(value)
}

pub fn from_slice(bytes: &[u8]) -> Result<SessionValue, CodecError> {
    decode(bytes)
}

struct Encoder<'a, W> {
    out: &'a mut W,
    /// Nesting level of the node written next; the root is level 0.
    depth: usize,
}

type Written = Result<(), CodecError>;

impl<W: Write> Encoder<'_, W> {
    fn value(&mut self, value: &SessionValue) -> Written {
        match value {
            SessionValue::Int(v) => self.int(v),
            SessionValue::Str(s) => self.string(s),
            SessionValue::IntSeq(items) => self.seq('i', items, Self::int),
            SessionValue::StrSeq(items) => self.seq('s', items, |e, s: &String| e.string(s)),
            SessionValue::AnySeq(items) => self.seq('*', items, Self::value),
            SessionValue::IntIntMap(map) => self.map("mii", map, Self::int, Self::int),
            SessionValue::IntStrMap(map) => {
                self.map("mis", map, Self::int, |e, v: &String| e.string(v))
            }
            SessionValue::IntAnyMap(map) => self.map("mi*", map, Self::int, Self::value),
            SessionValue::StrIntMap(map) => {
                self.map("msi", map, |e, k: &String| e.string(k), Self::int)
            }
            SessionValue::StrStrMap(map) => self.map(
                "mss",
                map,
                |e, k: &String| e.string(k),
                |e, v: &String| e.string(v),
            ),
            SessionValue::StrAnyMap(map) => {
                self.map("ms*", map, |e, k: &String| e.string(k), Self::value)
            }
            SessionValue::Record(record) => self.record(record),
        }
    }

    fn seq<T>(
        &mut self,
        elem: char,
        items: &[T],
        mut item: impl FnMut(&mut Self, &T) -> Written,
    ) -> Written {
        self.open(&format!("a{elem}{}", items.len()))?;
        for i in items {
            item(self, i)?;
        }
        self.close()
    }

    fn map<K, V>(
        &mut self,
        tag: &str,
        map: &BTreeMap<K, V>,
        mut key: impl FnMut(&mut Self, &K) -> Written,
        mut value: impl FnMut(&mut Self, &V) -> Written,
    ) -> Written {
        self.open(tag)?;
        for (k, v) in map {
            key(self, k)?;
            value(self, v)?;
        }
        self.close()
    }

    fn record(&mut self, record: &Record) -> Written {
        self.open("t")?;
        for (name, value) in record.fields() {
            self.string(name)?;
            self.value(value)?;
        }
        self.close()
    }

    fn check_depth(&self) -> Written {
        if self.depth >= MAX_DEPTH {
            return Err(CodecError::TooDeep { max: MAX_DEPTH });
        }
        Ok(())
    }

    fn open(&mut self, tag: &str) -> Written {
        self.check_depth()?;
        write!(self.out, "{tag}:{{")?;
        self.depth += 1;
        Ok(())
    }

    fn close(&mut self) -> Written {
        self.depth -= 1;
        self.out.write_all(b"}")?;
        Ok(())
    }

    fn int(&mut self, value: &i64) -> Written {
        self.check_depth()?;
        write!(self.out, "i:{value};")?;
        Ok(())
    }

    fn string(&mut self, value: &str) -> Written {
        self.check_depth()?;
        self.out.write_all(b"s:\"")?;
        self.out.write_all(escape(value).as_bytes())?;
        self.out.write_all(b"\";")?;
        Ok(())
    }
}

/// Backslash-escape `"` and `\`, borrowing when nothing needs escaping.
fn escape(s: &str) -> Cow<'_, str> {
    let extra = s.bytes().filter(|b| matches!(b, b'"' | b'\\')).count();
    if extra == 0 {
        return Cow::Borrowed(s);
    }
    let mut out = String::with_capacity(s.len() + extra);
    for c in s.chars() {
        if c == '"' || c == '\\' {
            out.push('\\');
        }
        out.push(c);
    }
    Cow::Owned(out)
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Kind {
    Int,
    Str,
    Any,
}

impl Kind {
    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            b'i' => Some(Kind::Int),
            b's' => Some(Kind::Str),
            b'*' => Some(Kind::Any),
            _ => None,
        }
    }
}

struct Decoder<R> {
    input: R,
    offset: usize,
    depth: usize,
}

impl<R: BufRead> Decoder<R> {
    fn error(&self, message: impl Into<String>) -> CodecError {
        self.error_at(self.offset, message)
    }

    fn error_at(&self, offset: usize, message: impl Into<String>) -> CodecError {
        CodecError::Format {
            offset,
            message: message.into(),
        }
    }

    fn peek(&mut self) -> Result<Option<u8>, CodecError> {
        loop {
            match self.input.fill_buf() {
                Ok(buf) => return Ok(buf.first().copied()),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(CodecError::Io(e)),
            }
        }
    }

    fn bump(&mut self) -> Result<Option<u8>, CodecError> {
        let byte = self.peek()?;
        if byte.is_some() {
            self.input.consume(1);
            self.offset += 1;
        }
        Ok(byte)
    }

    fn expect(&mut self, want: u8, context: &str) -> Result<(), CodecError> {
        match self.bump()? {
            Some(got) if got == want => Ok(()),
            Some(got) => Err(self.error_at(
                self.offset - 1,
                format!("expected '{}' {context}, found '{}'", want as char, got as char),
            )),
            None => Err(self.error(format!(
                "expected '{}' {context}, found end of input",
                want as char
            ))),
        }
    }

    /// Consume `byte` if it is next.
    fn eat(&mut self, byte: u8) -> Result<bool, CodecError> {
        if self.peek()? == Some(byte) {
            self.bump()?;
            return Ok(true);
        }
        Ok(false)
    }

    fn tag(&mut self) -> Result<Vec<u8>, CodecError> {
        let mut tag = Vec::new();
        loop {
            match self.bump()? {
                None => return Err(self.error("unexpected end of input in type tag")),
                Some(b':') if !tag.is_empty() => return Ok(tag),
                Some(b) if (b.is_ascii_alphanumeric() || b == b'*') && tag.len() < MAX_TAG_LEN => {
                    tag.push(b)
                }
                Some(b) => {
                    return Err(self.error_at(
                        self.offset - 1,
                        format!("unexpected '{}' in type tag", b as char),
                    ))
                }
            }
        }
    }

    fn value(&mut self) -> Result<SessionValue, CodecError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.error(format!("nesting deeper than {MAX_DEPTH} levels")));
        }
        self.depth += 1;
        let value = self.value_inner();
        self.depth -= 1;
        value
    }

    fn value_inner(&mut self) -> Result<SessionValue, CodecError> {
        let start = self.offset;
        let tag = self.tag()?;
        match tag.as_slice() {
            b"i" => Ok(SessionValue::Int(self.int_body()?)),
            b"s" => Ok(SessionValue::Str(self.string_body()?)),
            b"t" => self.record(),
            [b'a', elem, count @ ..] => self.sequence(start, *elem, count),
            [b'm', key, elem] => self.mapping(start, *key, *elem),
            _ => Err(self.error_at(
                start,
                format!("type '{}' not supported", String::from_utf8_lossy(&tag)),
            )),
        }
    }

    /// Digits (optionally signed) up to and including `;`.
    fn int_body(&mut self) -> Result<i64, CodecError> {
        let start = self.offset;
        let mut digits = String::new();
        loop {
            match self.bump()? {
                Some(b';') => break,
                Some(b) if b.is_ascii_digit() || (b == b'-' && digits.is_empty()) => {
                    digits.push(b as char)
                }
                Some(b) => {
                    return Err(self.error_at(
                        self.offset - 1,
                        format!("unexpected '{}' in integer", b as char),
                    ))
                }
                None => return Err(self.error("unexpected end of input in integer")),
            }
        }
        digits
            .parse()
            .map_err(|_| self.error_at(start, format!("invalid integer '{digits}'")))
    }

    /// A quoted, backslash-escaped string followed by `;`.
    fn string_body(&mut self) -> Result<String, CodecError> {
        let start = self.offset;
        self.expect(b'"', "to open string")?;
        let mut bytes = Vec::new();
        loop {
            match self.bump()? {
                Some(b'"') => break,
                Some(b'\\') => match self.bump()? {
                    Some(b) => bytes.push(b),
                    None => return Err(self.error("unterminated string")),
                },
                Some(b) => bytes.push(b),
                None => return Err(self.error("unterminated string")),
            }
        }
        self.expect(b';', "after string")?;
        String::from_utf8(bytes).map_err(|_| self.error_at(start, "string is not valid UTF-8"))
    }

    fn int_item(&mut self) -> Result<i64, CodecError> {
        let at = self.offset;
        match self.value()? {
            SessionValue::Int(v) => Ok(v),
            other => Err(self.error_at(at, format!("expected int, found {}", other.shape()))),
        }
    }

    fn str_item(&mut self) -> Result<String, CodecError> {
        let at = self.offset;
        match self.value()? {
            SessionValue::Str(v) => Ok(v),
            other => Err(self.error_at(at, format!("expected string, found {}", other.shape()))),
        }
    }

    fn sequence(
        &mut self,
        start: usize,
        elem: u8,
        count: &[u8],
    ) -> Result<SessionValue, CodecError> {
        let kind = Kind::from_tag(elem).ok_or_else(|| {
            self.error_at(start, format!("unsupported sequence element type '{}'", elem as char))
        })?;
        let len: usize = std::str::from_utf8(count)
            .ok()
            .filter(|c| !c.is_empty() && c.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|c| c.parse().ok())
            .ok_or_else(|| self.error_at(start, "invalid sequence length"))?;

        self.expect(b'{', "to open sequence")?;
        let value = match kind {
            Kind::Int => SessionValue::IntSeq(self.items(len, Self::int_item)?),
            Kind::Str => SessionValue::StrSeq(self.items(len, Self::str_item)?),
            Kind::Any => SessionValue::AnySeq(self.items(len, Self::value)?),
        };
        if self.peek()? != Some(b'}') {
            return Err(self.error(format!("sequence holds more than its declared {len} elements")));
        }
        self.expect(b'}', "to close sequence")?;
        Ok(value)
    }

    fn items<T>(
        &mut self,
        len: usize,
        mut item: impl FnMut(&mut Self) -> Result<T, CodecError>,
    ) -> Result<Vec<T>, CodecError> {
        let mut items = Vec::with_capacity(len.min(1024));
        for index in 0..len {
            if self.peek()? == Some(b'}') {
                return Err(self.error(format!(
                    "sequence declares {len} elements but holds {index}"
                )));
            }
            items.push(item(self)?);
        }
        Ok(items)
    }

    fn mapping(&mut self, start: usize, key: u8, elem: u8) -> Result<SessionValue, CodecError> {
        let key_kind = match Kind::from_tag(key) {
            Some(kind @ (Kind::Int | Kind::Str)) => kind,
            _ => {
                return Err(self.error_at(
                    start,
                    format!("unsupported mapping key type '{}'", key as char),
                ))
            }
        };
        let elem_kind = Kind::from_tag(elem).ok_or_else(|| {
            self.error_at(start, format!("unsupported mapping value type '{}'", elem as char))
        })?;

        self.expect(b'{', "to open mapping")?;
        Ok(match (key_kind, elem_kind) {
            (Kind::Int, Kind::Int) => {
                SessionValue::IntIntMap(self.entries(Self::int_item, Self::int_item)?)
            }
            (Kind::Int, Kind::Str) => {
                SessionValue::IntStrMap(self.entries(Self::int_item, Self::str_item)?)
            }
            (Kind::Int, Kind::Any) => {
                SessionValue::IntAnyMap(self.entries(Self::int_item, Self::value)?)
            }
            (_, Kind::Int) => {
                SessionValue::StrIntMap(self.entries(Self::str_item, Self::int_item)?)
            }
            (_, Kind::Str) => {
                SessionValue::StrStrMap(self.entries(Self::str_item, Self::str_item)?)
            }
            (_, Kind::Any) => {
                SessionValue::StrAnyMap(self.entries(Self::str_item, Self::value)?)
            }
        })
    }

    /// Key/value pairs up to and including the closing `}`.
    fn entries<K: Ord, V>(
        &mut self,
        mut key: impl FnMut(&mut Self) -> Result<K, CodecError>,
        mut value: impl FnMut(&mut Self) -> Result<V, CodecError>,
    ) -> Result<BTreeMap<K, V>, CodecError> {
        let mut map = BTreeMap::new();
        while !self.eat(b'}')? {
            if self.peek()?.is_none() {
                return Err(self.error("unterminated mapping"));
            }
            let k = key(self)?;
            let v = value(self)?;
            map.insert(k, v);
        }
        Ok(map)
    }

    fn record(&mut self) -> Result<SessionValue, CodecError> {
        self.expect(b'{', "to open record")?;
        let mut record = Record::new();
        while !self.eat(b'}')? {
            if self.peek()?.is_none() {
                return Err(self.error("unterminated record"));
            }
            let name = self.str_item()?;
            let value = self.value()?;
            record.insert(name, value);
        }
        Ok(SessionValue::Record(record))
    }
}
