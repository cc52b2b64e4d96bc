//! XML export codec.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <promptExport id="..." title="..." exportedAt="...">
//!   <metadata><totalPrompts>2</totalPrompts><exportedBy>...</exportedBy></metadata>
//!   <prompts>
//!     <prompt id="..."><projectId>...</projectId>...</prompt>
//!   </prompts>
//! </promptExport>
//! ```
//!
//! Arrays repeat an `<item>` child; every text node and attribute is escaped.
//! Object keys that are not valid XML names, such as free-form generation
//! parameters, become `<entry name="...">` elements.

use crate::io::formats::ExportHeader;
use crate::io::traits::ExportSink;
use crate::{Error, Result};
use serde_json::Value;
use std::io::Write;

/// Escapes `&`, `<`, `>`, `"` and `'` for text and attribute content.
#[must_use]
pub fn escape_xml(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Returns whether `name` can be written as an element name as-is.
///
/// Accepts a letter or `_` followed by letters, digits, `-`, `_` or `.`.
/// Colons are refused so keys never read as namespace prefixes, and names
/// starting with `xml` are reserved.
#[must_use]
pub fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    (first.is_alphabetic() || first == '_')
        && chars.all(|c| c.is_alphanumeric() || matches!(c, '-' | '_' | '.'))
        && !name.get(..3).is_some_and(|p| p.eq_ignore_ascii_case("xml"))
}

fn write_failed(e: impl std::fmt::Display) -> Error {
    Error::OperationFailed {
        operation: "write_xml".to_string(),
        cause: e.to_string(),
    }
}

/// XML export sink.
pub struct XmlExportSink<'a> {
    writer: &'a mut dyn Write,
}

impl<'a> XmlExportSink<'a> {
    /// Creates a sink and writes the prologue, root element and metadata block.
    ///
    /// # Errors
    ///
    /// Returns an error if the header cannot be written.
    pub fn new(writer: &'a mut dyn Write, header: &ExportHeader) -> Result<Self> {
        write!(
            writer,
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <promptExport id=\"{}\" title=\"{}\" exportedAt=\"{}\">\n  \
             <metadata>\n    \
             <totalPrompts>{}</totalPrompts>\n    \
             <exportedBy>{}</exportedBy>\n  \
             </metadata>\n  \
             <prompts>\n",
            escape_xml(&header.export_id),
            escape_xml(&header.title),
            escape_xml(&header.exported_at),
            header.total_prompts,
            escape_xml(&header.exported_by),
        )
        .map_err(write_failed)?;

        Ok(Self { writer })
    }

    fn field(out: &mut String, key: &str, value: &Value) {
        if is_xml_name(key) {
            Self::element(out, key, "", value);
        } else {
            Self::element(out, "entry", &format!(" name=\"{}\"", escape_xml(key)), value);
        }
    }

    fn element(out: &mut String, name: &str, attrs: &str, value: &Value) {
        match value {
            Value::Null => {},
            Value::Object(map) => {
                out.push_str(&format!("<{name}{attrs}>"));
                for (key, child) in map {
                    Self::field(out, key, child);
                }
                out.push_str(&format!("</{name}>"));
            },
            Value::Array(items) => {
                out.push_str(&format!("<{name}{attrs}>"));
                for item in items {
                    Self::element(out, "item", "", item);
                }
                out.push_str(&format!("</{name}>"));
            },
            Value::String(s) => {
                out.push_str(&format!("<{name}{attrs}>{}</{name}>", escape_xml(s)));
            },
            Value::Number(n) => out.push_str(&format!("<{name}{attrs}>{n}</{name}>")),
            Value::Bool(b) => out.push_str(&format!("<{name}{attrs}>{b}</{name}>")),
        }
    }
}

impl ExportSink for XmlExportSink<'_> {
    fn write(&mut self, record: &Value) -> Result<()> {
        let id = record.get("id").and_then(Value::as_str).unwrap_or_default();
        let mut out = format!("    <prompt id=\"{}\">", escape_xml(id));
        if let Value::Object(map) = record {
            for (key, child) in map.iter().filter(|(k, _)| k.as_str() != "id") {
                Self::field(&mut out, key, child);
            }
        }
        out.push_str("</prompt>\n");
        self.writer.write_all(out.as_bytes()).map_err(write_failed)
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        self.writer
            .write_all(b"  </prompts>\n</promptExport>\n")
            .map_err(write_failed)?;
        self.writer.flush().map_err(write_failed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::package::Compatibility;
    use serde_json::json;

    #[test]
    fn test_escape_xml() {
        assert_eq!(
            escape_xml(r#"Tom & "Jerry" <'cat'>"#),
            "Tom &amp; &quot;Jerry&quot; &lt;&apos;cat&apos;&gt;"
        );
    }

    #[test]
    fn test_document_shape() {
        let header = ExportHeader {
            export_id: "exp-1".to_string(),
            title: "R&D".to_string(),
            exported_by: "tester".to_string(),
            exported_at: "2026-01-02T03:04:05.000Z".to_string(),
            total_prompts: 1,
            categories: vec![],
            compatibility: Compatibility::default(),
        };

        let mut output = Vec::new();
        {
            let mut sink: Box<dyn ExportSink + '_> =
                Box::new(XmlExportSink::new(&mut output, &header).unwrap());
            sink.write(&json!({
                "id": "p<1>",
                "metadata": {"title": "Fish & chips", "tags": ["a", "b"]},
                "usage": null
            }))
            .unwrap();
            sink.finish().unwrap();
        }
        let xml = String::from_utf8(output).unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<promptExport id=\"exp-1\" title=\"R&amp;D\""));
        assert!(xml.contains("<totalPrompts>1</totalPrompts>"));
        assert!(xml.contains("<prompt id=\"p&lt;1&gt;\">"));
        assert!(xml.contains("<title>Fish &amp; chips</title>"));
        assert!(xml.contains("<tags><item>a</item><item>b</item></tags>"));
        assert!(!xml.contains("<usage>"));
        assert!(xml.trim_end().ends_with("</promptExport>"));
    }

    #[test]
    fn test_xml_names() {
        assert!(is_xml_name("generationSettings"));
        assert!(is_xml_name("top_p"));
        assert!(is_xml_name("seed.v2"));
        assert!(!is_xml_name(""));
        assert!(!is_xml_name("max tokens"));
        assert!(!is_xml_name("a<b/>"));
        assert!(!is_xml_name("1st"));
        assert!(!is_xml_name("ns:key"));
        assert!(!is_xml_name("XmlThing"));
    }

    #[test]
    fn test_free_form_keys_become_entries() {
        let mut out = String::new();
        XmlExportSink::field(
            &mut out,
            "parameters",
            &json!({"max tokens": 5, "a<b/>": 1, "seed": 7}),
        );

        assert_eq!(
            out,
            "<parameters><entry name=\"a&lt;b/&gt;\">1</entry>\
             <entry name=\"max tokens\">5</entry><seed>7</seed></parameters>"
        );
    }
}
