//! PHP-serialized value rewriting.
//!
//! WordPress stores options and post meta as PHP `serialize()` output, where
//! every string carries its byte length (`s:19:"http://a.local/page";`). A
//! plain substitution that changes the length corrupts the value, so strings
//! inside serialized data are rewritten structurally and re-emitted with the
//! recomputed length.
//!
//! Supported grammar:
//!
//! ```text
//! N;  b:<0|1>;  i:<int>;  d:<float>;  s:<len>:"<bytes>";
//! a:<n>:{<key><value>...}  O:<len>:"<class>":<n>:{<key><value>...}
//! ```

/// Rewrite `value` if it is exactly one well-formed serialized value.
///
/// Returns the rewritten text and the number of replaced occurrences, or
/// `None` when `value` is not serialized data.
#[must_use]
pub fn rewrite(value: &str, from: &str, to: &str) -> Option<(String, usize)> {
    if !looks_serialized(value) {
        return None;
    }
    let mut parser = Parser {
        input: value.as_bytes(),
        pos: 0,
        from,
        to,
        out: Vec::with_capacity(value.len()),
        count: 0,
    };
    parser.value()?;
    if parser.pos != parser.input.len() {
        return None;
    }
    let out = String::from_utf8(parser.out).ok()?;
    Some((out, parser.count))
}

/// Cheap check before attempting a full parse.
#[must_use]
pub fn looks_serialized(value: &str) -> bool {
    let bytes = value.as_bytes();
    match bytes {
        [b'N', b';'] => true,
        [b'b' | b'i' | b'd' | b's' | b'a' | b'O', b':', ..] => value.ends_with(';') || value.ends_with('}'),
        _ => false,
    }
}

struct Parser<'a> {
    input: &'a [u8],
    pos: usize,
    from: &'a str,
    to: &'a str,
    out: Vec<u8>,
    count: usize,
}

impl<'a> Parser<'a> {
    fn value(&mut self) -> Option<()> {
        match self.peek()? {
            b'N' => {
                self.expect(b'N')?;
                self.expect(b';')?;
                self.out.extend_from_slice(b"N;");
            }
            tag @ (b'b' | b'i' | b'd') => {
                self.expect(tag)?;
                self.expect(b':')?;
                let scalar = self.until(b';')?;
                if scalar.is_empty() {
                    return None;
                }
                self.out.push(tag);
                self.out.push(b':');
                self.out.extend_from_slice(scalar);
                self.out.push(b';');
            }
            b's' => {
                self.expect(b's')?;
                self.expect(b':')?;
                let bytes = self.string_body()?;
                self.expect(b';')?;
                let text = std::str::from_utf8(bytes).ok()?;
                let (rewritten, count) = super::replace_value(text, self.from, self.to);
                self.count += count;
                self.out
                    .extend_from_slice(format!("s:{}:\"", rewritten.len()).as_bytes());
                self.out.extend_from_slice(rewritten.as_bytes());
                self.out.extend_from_slice(b"\";");
            }
            b'a' => {
                self.expect(b'a')?;
                self.expect(b':')?;
                let n = self.number()?;
                self.expect(b':')?;
                self.out.extend_from_slice(format!("a:{n}:").as_bytes());
                self.members(n)?;
            }
            b'O' => {
                self.expect(b'O')?;
                self.expect(b':')?;
                let class = self.string_body()?;
                self.expect(b':')?;
                let n = self.number()?;
                self.expect(b':')?;
                self.out
                    .extend_from_slice(format!("O:{}:\"", class.len()).as_bytes());
                self.out.extend_from_slice(class);
                self.out.extend_from_slice(format!("\":{n}:").as_bytes());
                self.members(n)?;
            }
            _ => return None,
        }
        Some(())
    }

    /// `{` followed by `n` key/value pairs and `}`.
    fn members(&mut self, n: usize) -> Option<()> {
        self.expect(b'{')?;
        self.out.push(b'{');
        for _ in 0..n {
            self.value()?;
            self.value()?;
        }
        self.expect(b'}')?;
        self.out.push(b'}');
        Some(())
    }

    /// `<len>:"<len bytes>"`, returning the bytes.
    fn string_body(&mut self) -> Option<&'a [u8]> {
        let input = self.input;
        let len = self.number()?;
        self.expect(b':')?;
        self.expect(b'"')?;
        let start = self.pos;
        let end = start.checked_add(len)?;
        if end > input.len() {
            return None;
        }
        self.pos = end;
        self.expect(b'"')?;
        Some(&input[start..end])
    }

    fn number(&mut self) -> Option<usize> {
        let start = self.pos;
        while self.peek().is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        std::str::from_utf8(&self.input[start..self.pos])
            .ok()?
            .parse()
            .ok()
    }

    fn until(&mut self, stop: u8) -> Option<&'a [u8]> {
        let input = self.input;
        let start = self.pos;
        while self.peek()? != stop {
            self.pos += 1;
        }
        let slice = &input[start..self.pos];
        self.pos += 1;
        Some(slice)
    }

    fn peek(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn expect(&mut self, byte: u8) -> Option<()> {
        if self.peek()? == byte {
            self.pos += 1;
            Some(())
        } else {
            None
        }
    }
}
