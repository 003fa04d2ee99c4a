//! HTML serialisation of the in-memory document.

use crate::{Document, NodeKind, NodeRef, attribute_text};

fn escape(text: &str, quotes: bool, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' if !quotes => out.push_str("&lt;"),
            '>' if !quotes => out.push_str("&gt;"),
            '"' if quotes => out.push_str("&quot;"),
            ch => out.push(ch),
        }
    }
}

pub(crate) fn write_node(document: &Document, node: NodeRef, out: &mut String) {
    let Some(data) = document.nodes.get(node.0) else {
        return;
    };
    match &data.kind {
        NodeKind::Text(text) => escape(text, false, out),
        NodeKind::Raw(markup) => out.push_str(markup),
        NodeKind::Element {
            tag, attributes, ..
        } => {
            out.push('<');
            out.push_str(tag);
            for (name, value) in attributes {
                let Some(text) = attribute_text(value) else {
                    continue;
                };
                out.push(' ');
                out.push_str(name);
                out.push_str("=\"");
                escape(&text, true, out);
                out.push('"');
            }
            out.push('>');
            for child in &data.children {
                write_node(document, *child, out);
            }
            out.push_str("</");
            out.push_str(tag);
            out.push('>');
        }
    }
}
