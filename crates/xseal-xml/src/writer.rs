#![forbid(unsafe_code)]

//! Template writing on top of uppsala's `XmlWriter`.

/// XML writer for signature and encryption templates.
///
/// Names are written as given (callers pass qualified names such as
/// `ds:Reference`); uppsala escapes attribute values and text.  Markup that
/// is already serialized, such as the content of a `ds:Object`, goes in
/// through [`XmlWriter::write_raw`].
pub struct XmlWriter {
    done: String,
    writer: uppsala::XmlWriter,
}

impl XmlWriter {
    /// Create a new XML writer.
    pub fn new() -> Self {
        Self {
            done: String::new(),
            writer: uppsala::XmlWriter::new(),
        }
    }

    /// Write the XML declaration.
    pub fn write_declaration(&mut self) {
        self.writer.write_declaration();
    }

    /// Start an element with the given name and attributes.
    pub fn start_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.writer.start_element(name, attrs);
    }

    /// Write an empty element (self-closing).
    pub fn empty_element(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.writer.empty_element(name, attrs);
    }

    /// End the element `name`.
    pub fn end_element(&mut self, name: &str) {
        self.writer.end_element(name);
    }

    /// Write an element holding only text.
    pub fn text_element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.start_element(name, attrs);
        self.write_text(text);
        self.end_element(name);
    }

    /// Write escaped text content.
    pub fn write_text(&mut self, text: &str) {
        self.writer.text(text);
    }

    /// Write already-serialized markup verbatim.
    pub fn write_raw(&mut self, xml: &str) {
        let written = std::mem::replace(&mut self.writer, uppsala::XmlWriter::new());
        self.done.push_str(&written.into_string());
        self.done.push_str(xml);
    }

    /// Finish writing and return the XML as a string.
    pub fn into_string(self) -> String {
        let mut out = self.done;
        out.push_str(&self.writer.into_string());
        out
    }
}

impl Default for XmlWriter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_writer_escapes() {
        let mut w = XmlWriter::new();
        w.start_element("ds:Object", &[("xmlns:ds", "urn:x"), ("Id", "a\"b")]);
        w.write_text("1 < 2 & 3");
        w.empty_element("ds:Empty", &[]);
        w.end_element("ds:Object");
        let s = w.into_string();
        let doc = crate::parse(&s).unwrap();
        let root = doc.root_element();
        assert!(root.has_tag_name(("urn:x", "Object")));
        assert_eq!(root.attribute("Id"), Some("a\"b"));
        assert_eq!(root.text(), Some("1 < 2 & 3"));
        assert!(root.first_element_child().unwrap().has_tag_name(("urn:x", "Empty")));
    }

    #[test]
    fn test_raw_markup_lands_in_place() {
        let mut w = XmlWriter::new();
        w.write_declaration();
        w.start_element("box", &[]);
        w.write_raw("<item n=\"1\">one</item>");
        w.text_element("item", &[("n", "2")], "<&>");
        w.end_element("box");
        let s = w.into_string();
        assert!(s.starts_with("<?xml"));
        assert!(s.contains("<item n=\"1\">one</item>"));

        let doc = crate::parse(&s).unwrap();
        let items: Vec<_> = doc.root_element().children().filter(|n| n.is_element()).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[1].attribute("n"), Some("2"));
        assert_eq!(items[1].text(), Some("<&>"));
    }
}
