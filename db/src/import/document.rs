//! Lookups over a parsed Bible markup document.
//!
//! Element and attribute names are matched ignoring ASCII case, since
//! Bible files in the wild disagree on capitalization.
use roxmltree::{Document, Node, ParsingOptions};

use crate::DbError;

/// Parses `text` as XML. Documents with a `<!DOCTYPE>` are accepted.
pub fn parse(text: &str) -> Result<Document<'_>, DbError> {
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    Document::parse_with_options(text, options).map_err(|e| DbError::Format {
        message: format!("The document is not well-formed XML: {e}"),
    })
}

/// Whether `node` is an element with one of `names`.
pub fn is_named(node: Node, names: &[&str]) -> bool {
    node.is_element()
        && names
            .iter()
            .any(|name| node.tag_name().name().eq_ignore_ascii_case(name))
}

/// Value of the first attribute matching any of `names`.
pub fn attr<'a, 'input>(node: Node<'a, 'input>, names: &[&str]) -> Option<&'a str> {
    names.iter().find_map(|name| {
        node.attributes()
            .find(|a| a.name().eq_ignore_ascii_case(name))
            .map(|a| a.value())
    })
}

/// Elements below `node`, at any depth, with one of `names`, in document order.
pub fn descendants_named<'a, 'input: 'a>(
    node: Node<'a, 'input>,
    names: &'a [&'a str],
) -> impl Iterator<Item = Node<'a, 'input>> + 'a {
    node.descendants()
        .skip(1)
        .filter(move |n| is_named(*n, names))
}

/// All text inside `node`, including text of nested markup.
pub fn text(node: Node) -> String {
    node.descendants()
        .filter(|n| n.is_text())
        .filter_map(|n| n.text())
        .collect()
}
