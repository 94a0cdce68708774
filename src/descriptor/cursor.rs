//! Bounds-checked token reader for one descriptor line

/// Reads comma-separated tokens from a line
///
/// Every read is bounds-checked; reading past the end yields `None` instead
/// of running into the next line.
#[derive(Clone, Debug)]
pub struct Cursor<'a> {
    text: &'a str,
    pos: usize,
}

impl<'a> Cursor<'a> {
    /// Start reading at the beginning of `text`
    pub fn new(text: &'a str) -> Self {
        Self { text, pos: 0 }
    }

    /// Next byte without consuming it
    pub fn peek(&self) -> Option<u8> {
        self.text.as_bytes().get(self.pos).copied()
    }

    /// Skip `count` bytes
    pub fn advance(&mut self, count: usize) {
        self.pos = self.pos.saturating_add(count).min(self.text.len());
    }

    /// Skip a single `byte` if it is next
    pub fn skip_if(&mut self, byte: u8) -> bool {
        if self.peek() == Some(byte) {
            self.advance(1);
            true
        } else {
            false
        }
    }

    /// Whether the whole line has been consumed
    pub fn at_end(&self) -> bool {
        self.pos >= self.text.len()
    }

    /// Unread remainder of the line
    pub fn rest(&self) -> &'a str {
        self.text.get(self.pos..).unwrap_or("")
    }

    /// Next token up to the following comma, trimmed
    pub fn next_token(&mut self) -> Option<&'a str> {
        if self.at_end() {
            return None;
        }
        let rest = self.rest();
        let (token, consumed) = match rest.find(',') {
            Some(end) => (&rest[..end], end + 1),
            None => (rest, rest.len()),
        };
        self.advance(consumed);
        Some(token.trim())
    }

    /// Next token as a signed decimal
    ///
    /// Returns `None` at the end of the line. A present but malformed token
    /// is reported as `Some(None)`.
    pub fn next_int(&mut self) -> Option<Option<i32>> {
        self.next_token().map(parse_int)
    }

    /// Next token as hexadecimal, an optional `0x` prefix is accepted
    ///
    /// Same end/malformed convention as [`next_int`](Self::next_int).
    pub fn next_hex(&mut self) -> Option<Option<u32>> {
        self.next_token().map(parse_hex)
    }
}

/// Parse a leading signed decimal, trailing garbage is ignored
pub fn parse_int(token: &str) -> Option<i32> {
    let bytes = token.as_bytes();
    let (negative, digits) = match bytes.first() {
        Some(b'-') => (true, &bytes[1..]),
        Some(b'+') => (false, &bytes[1..]),
        _ => (false, bytes),
    };
    let count = digits.iter().take_while(|b| b.is_ascii_digit()).count();
    if count == 0 {
        return None;
    }
    let mut value: i32 = 0;
    for &digit in &digits[..count] {
        value = value.checked_mul(10)?.checked_add((digit - b'0') as i32)?;
    }
    Some(if negative { -value } else { value })
}

/// Parse leading hex digits, trailing garbage is ignored
pub fn parse_hex(token: &str) -> Option<u32> {
    let digits = token
        .strip_prefix("0x")
        .or_else(|| token.strip_prefix("0X"))
        .unwrap_or(token);
    let count = digits.bytes().take_while(u8::is_ascii_hexdigit).count();
    if count == 0 {
        return None;
    }
    u32::from_str_radix(&digits[..count], 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokens_and_end() {
        let mut cursor = Cursor::new("ST7789, 240,0x2A");
        assert_eq!(cursor.next_token(), Some("ST7789"));
        assert_eq!(cursor.next_int(), Some(Some(240)));
        assert_eq!(cursor.next_hex(), Some(Some(0x2A)));
        assert!(cursor.at_end());
        assert_eq!(cursor.next_token(), None);
        assert_eq!(cursor.next_int(), None);
    }

    #[test]
    fn test_malformed_is_distinct_from_missing() {
        let mut cursor = Cursor::new("abc,zz");
        assert_eq!(cursor.next_int(), Some(None));
        assert_eq!(cursor.next_hex(), Some(None));
        assert_eq!(cursor.next_hex(), None);
    }

    #[test]
    fn test_parse_int_like_atoi() {
        assert_eq!(parse_int("-1"), Some(-1));
        assert_eq!(parse_int("42ms"), Some(42));
        assert_eq!(parse_int(""), None);
        assert_eq!(parse_int("-"), None);
        assert_eq!(parse_int("99999999999"), None);
    }

    #[test]
    fn test_parse_hex_prefix() {
        assert_eq!(parse_hex("3c"), Some(0x3C));
        assert_eq!(parse_hex("0xAE"), Some(0xAE));
        assert_eq!(parse_hex("0X1f"), Some(0x1F));
        assert_eq!(parse_hex("g1"), None);
    }

    #[test]
    fn test_peek_and_skip() {
        let mut cursor = Cursor::new("1,20");
        assert_eq!(cursor.peek(), Some(b'1'));
        assert!(!cursor.skip_if(b','));
        cursor.advance(1);
        assert!(cursor.skip_if(b','));
        assert_eq!(cursor.rest(), "20");
        cursor.advance(10);
        assert!(cursor.at_end());
    }
}
