#![forbid(unsafe_code)]

//! Character escaping for canonical output.
//!
//! Text nodes escape `& < >` and carriage return.  Attribute values escape
//! `& < "` plus tab, newline and carriage return.  PI data only escapes
//! carriage return.

/// Where a string is being written.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Escape {
    Text,
    Attr,
    Pi,
}

impl Escape {
    fn replacement(self, ch: char) -> Option<&'static str> {
        match (self, ch) {
            (_, '\r') => Some("&#xD;"),
            (Escape::Pi, _) => None,
            (_, '&') => Some("&amp;"),
            (_, '<') => Some("&lt;"),
            (Escape::Text, '>') => Some("&gt;"),
            (Escape::Attr, '"') => Some("&quot;"),
            (Escape::Attr, '\t') => Some("&#x9;"),
            (Escape::Attr, '\n') => Some("&#xA;"),
            _ => None,
        }
    }
}

/// Append `s` to `out` with the escaping rules of `kind`.
pub fn escape_into(out: &mut Vec<u8>, s: &str, kind: Escape) {
    let mut last = 0;
    for (i, ch) in s.char_indices() {
        if let Some(rep) = kind.replacement(ch) {
            out.extend_from_slice(s[last..i].as_bytes());
            out.extend_from_slice(rep.as_bytes());
            last = i + ch.len_utf8();
        }
    }
    out.extend_from_slice(s[last..].as_bytes());
}

/// Escape `s` into a new string.
pub fn escape(s: &str, kind: Escape) -> String {
    let mut out = Vec::with_capacity(s.len());
    escape_into(&mut out, s, kind);
    // Only ASCII replacements are spliced between valid UTF-8 runs.
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text() {
        assert_eq!(escape("héllo", Escape::Text), "héllo");
        assert_eq!(escape("a&b<c>d\"", Escape::Text), "a&amp;b&lt;c&gt;d\"");
        assert_eq!(escape("line\rend", Escape::Text), "line&#xD;end");
    }

    #[test]
    fn test_attr() {
        assert_eq!(escape("a&b\"c>", Escape::Attr), "a&amp;b&quot;c>");
        assert_eq!(escape("a\tb\nc\rd", Escape::Attr), "a&#x9;b&#xA;c&#xD;d");
    }

    #[test]
    fn test_pi() {
        assert_eq!(escape("a\r\nb<&>", Escape::Pi), "a&#xD;\nb<&>");
    }
}
