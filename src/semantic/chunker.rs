//! Tree-sitter structural chunker (component I).

use sha2::{Digest, Sha256};
use tree_sitter::{Language, Node, Parser};

pub const MIN_CHUNK_CHARS: usize = 50;
pub const MAX_CHUNK_CHARS: usize = 2500;
pub const HARD_MAX_CHUNK_CHARS: usize = 5000;
const TRUNCATED_MARKER: &str = "\n...[TRUNCATED]";

/// The closed kind vocabulary a chunk may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChunkKind {
    Function,
    Method,
    Class,
    Interface,
    Type,
    Export,
    Const,
    Unknown,
}

impl ChunkKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChunkKind::Function => "function",
            ChunkKind::Method => "method",
            ChunkKind::Class => "class",
            ChunkKind::Interface => "interface",
            ChunkKind::Type => "type",
            ChunkKind::Export => "export",
            ChunkKind::Const => "const",
            ChunkKind::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone)]
pub struct Chunk {
    pub chunk_id: String,
    pub path: String,
    pub language: String,
    pub kind: ChunkKind,
    pub name: Option<String>,
    pub parent_name: Option<String>,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub file_hash: String,
}

/// Whether `chunk_file` has a tree-sitter grammar for `language` (a
/// [`crate::scan::FileEntry::language_hint`] value).
pub fn is_supported_language(language: &str) -> bool {
    get_language(language).is_some()
}

fn get_language(language: &str) -> Option<Language> {
    Some(match language {
        "rust" => tree_sitter_rust::LANGUAGE.into(),
        "python" => tree_sitter_python::LANGUAGE.into(),
        "javascript" => tree_sitter_javascript::LANGUAGE.into(),
        "typescript" => tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        "go" => tree_sitter_go::LANGUAGE.into(),
        "c" => tree_sitter_c::LANGUAGE.into(),
        _ => return None,
    })
}

/// Chunk `content` for `path`/`language`, stamping every chunk's ID from
/// `(path, kind, name, startLine, endLine, fileHash)`.
pub fn chunk_file(path: &str, language: &str, content: &str, file_hash: &str) -> Vec<Chunk> {
    let Some(ts_lang) = get_language(language) else {
        return Vec::new();
    };

    let mut parser = Parser::new();
    if parser.set_language(&ts_lang).is_err() {
        return Vec::new();
    }
    let Some(tree) = parser.parse(content, None) else {
        return Vec::new();
    };

    let mut raw_chunks = Vec::new();
    collect_chunks(tree.root_node(), content.as_bytes(), language, None, &mut raw_chunks);

    raw_chunks
        .into_iter()
        .filter(|(_, _, span)| span.2.len() >= MIN_CHUNK_CHARS)
        .map(|(kind, name, span)| {
            finalize_chunk(path, language, kind, name.0, name.1, span, file_hash)
        })
        .collect()
}

type Span = (u32, u32, String); // (start_line, end_line, text)
type NodeName = (Option<String>, Option<String>); // (name, parent_name)

fn collect_chunks(
    node: Node,
    source: &[u8],
    language: &str,
    parent_name: Option<String>,
    out: &mut Vec<(ChunkKind, NodeName, Span)>,
) {
    if let Some((kind, name)) = classify_node(node, source, language) {
        if !(kind == ChunkKind::Method && name.as_deref() == Some("constructor")) {
            let text = node.utf8_text(source).unwrap_or("").to_string();
            let start_line = node.start_position().row as u32 + 1;
            let end_line = node.end_position().row as u32 + 1;
            out.push((kind, (name.clone(), parent_name.clone()), (start_line, end_line, text)));
        }

        let next_parent = if kind == ChunkKind::Class { name } else { parent_name.clone() };
        let mut cursor = node.walk();
        for child in node.children(&mut cursor) {
            collect_chunks(child, source, language, next_parent.clone(), out);
        }
        return;
    }

    let mut cursor = node.walk();
    for child in node.children(&mut cursor) {
        collect_chunks(child, source, language, parent_name.clone(), out);
    }
}

fn classify_node(node: Node, source: &[u8], language: &str) -> Option<(ChunkKind, Option<String>)> {
    match language {
        "rust" => classify_rust(node, source),
        "python" => classify_python(node, source),
        "javascript" | "typescript" => classify_js_ts(node, source),
        "go" => classify_go(node, source),
        "c" => classify_c(node, source),
        _ => None,
    }
}

fn node_field_name(node: Node, source: &[u8], field: &str) -> Option<String> {
    node.child_by_field_name(field)?.utf8_text(source).ok().map(str::to_string)
}

fn classify_rust(node: Node, source: &[u8]) -> Option<(ChunkKind, Option<String>)> {
    let name = node_field_name(node, source, "name");
    match node.kind() {
        "function_item" => Some((ChunkKind::Function, name)),
        "struct_item" | "enum_item" => Some((ChunkKind::Class, name)),
        "trait_item" => Some((ChunkKind::Interface, name)),
        "type_item" => Some((ChunkKind::Type, name)),
        "const_item" | "static_item" => Some((ChunkKind::Const, name)),
        "impl_item" => Some((ChunkKind::Class, node_field_name(node, source, "type"))),
        _ => None,
    }
}

fn classify_python(node: Node, source: &[u8]) -> Option<(ChunkKind, Option<String>)> {
    let name = node_field_name(node, source, "name");
    match node.kind() {
        "function_definition" => {
            let is_method = node
                .parent()
                .and_then(|p| p.parent())
                .is_some_and(|gp| gp.kind() == "class_definition");
            Some((if is_method { ChunkKind::Method } else { ChunkKind::Function }, name))
        }
        "class_definition" => Some((ChunkKind::Class, name)),
        _ => None,
    }
}

fn classify_js_ts(node: Node, source: &[u8]) -> Option<(ChunkKind, Option<String>)> {
    let name = node_field_name(node, source, "name");
    match node.kind() {
        "function_declaration" => Some((ChunkKind::Function, name)),
        "method_definition" => Some((ChunkKind::Method, name)),
        "class_declaration" => Some((ChunkKind::Class, name)),
        "interface_declaration" => Some((ChunkKind::Interface, name)),
        "type_alias_declaration" => Some((ChunkKind::Type, name)),
        "export_statement" => Some((ChunkKind::Export, None)),
        "lexical_declaration" => {
            if node.parent().is_some_and(|p| p.kind() == "export_statement") {
                None
            } else {
                let name = node
                    .named_child(0)
                    .and_then(|decl| node_field_name(decl, source, "name"));
                Some((ChunkKind::Const, name))
            }
        }
        _ => None,
    }
}

fn classify_go(node: Node, source: &[u8]) -> Option<(ChunkKind, Option<String>)> {
    match node.kind() {
        "function_declaration" => Some((ChunkKind::Function, node_field_name(node, source, "name"))),
        "method_declaration" => Some((ChunkKind::Method, node_field_name(node, source, "name"))),
        "type_declaration" => Some((ChunkKind::Type, None)),
        _ => None,
    }
}

fn classify_c(node: Node, source: &[u8]) -> Option<(ChunkKind, Option<String>)> {
    match node.kind() {
        "function_definition" => {
            let name = node
                .child_by_field_name("declarator")
                .and_then(|d| d.utf8_text(source).ok())
                .map(str::to_string);
            Some((ChunkKind::Function, name))
        }
        "struct_specifier" => Some((ChunkKind::Class, node_field_name(node, source, "name"))),
        _ => None,
    }
}

fn finalize_chunk(
    path: &str,
    language: &str,
    kind: ChunkKind,
    name: Option<String>,
    parent_name: Option<String>,
    span: Span,
    file_hash: &str,
) -> Chunk {
    let (start_line, end_line, mut text) = span;
    if text.len() > HARD_MAX_CHUNK_CHARS {
        text.truncate(HARD_MAX_CHUNK_CHARS);
        text.push_str(TRUNCATED_MARKER);
    } else if text.len() > MAX_CHUNK_CHARS {
        text.truncate(MAX_CHUNK_CHARS);
        text.push_str(TRUNCATED_MARKER);
    }

    let chunk_id = chunk_id(path, kind.as_str(), name.as_deref(), start_line, end_line, file_hash);

    Chunk {
        chunk_id,
        path: path.to_string(),
        language: language.to_string(),
        kind,
        name,
        parent_name,
        start_line,
        end_line,
        content: text,
        file_hash: file_hash.to_string(),
    }
}

/// SHA-256 over `path|kind|name|startLine|endLine|fileHash`, hex-encoded.
pub fn chunk_id(path: &str, kind: &str, name: Option<&str>, start_line: u32, end_line: u32, file_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(path.as_bytes());
    hasher.update(b"|");
    hasher.update(kind.as_bytes());
    hasher.update(b"|");
    hasher.update(name.unwrap_or("").as_bytes());
    hasher.update(b"|");
    hasher.update(start_line.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(end_line.to_string().as_bytes());
    hasher.update(b"|");
    hasher.update(file_hash.as_bytes());
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    const FILE_HASH: &str = "abc123";

    #[test]
    fn chunks_rust_function() {
        let content = "fn greet_the_world_with_a_long_enough_body() {\n    println!(\"hello world, this is long enough\");\n}\n";
        let chunks = chunk_file("src/lib.rs", "rust", content, FILE_HASH);
        assert_eq!(chunks.len(), 1);
        assert_eq!(chunks[0].kind, ChunkKind::Function);
        assert_eq!(chunks[0].name.as_deref(), Some("greet_the_world_with_a_long_enough_body"));
    }

    #[test]
    fn chunks_rust_impl_methods_with_parent() {
        let content = r#"
struct Widget;

impl Widget {
    fn render_the_widget_onto_the_screen(&self) -> String {
        "rendered widget output goes right here".to_string()
    }
}
"#;
        let chunks = chunk_file("src/widget.rs", "rust", content, FILE_HASH);
        let method = chunks.iter().find(|c| c.kind == ChunkKind::Function).expect("method chunk");
        assert_eq!(method.parent_name.as_deref(), Some("Widget"));
    }

    #[test]
    fn i5_stable_chunk_ids() {
        let content = "fn stable_function_with_a_sufficiently_long_body() {\n    let x = 1 + 1 + 1 + 1 + 1;\n}\n";
        let first = chunk_file("src/a.rs", "rust", content, FILE_HASH);
        let second = chunk_file("src/a.rs", "rust", content, FILE_HASH);
        assert_eq!(first[0].chunk_id, second[0].chunk_id);

        let third = chunk_file("src/a.rs", "rust", content, "different-hash");
        assert_ne!(first[0].chunk_id, third[0].chunk_id);
    }

    #[test]
    fn skips_short_chunks_below_min_chars() {
        let content = "fn f() {}\n";
        let chunks = chunk_file("src/a.rs", "rust", content, FILE_HASH);
        assert!(chunks.is_empty(), "short chunk below MIN_CHUNK_CHARS should be skipped");
    }

    #[test]
    fn truncates_oversized_chunk_content() {
        let body = "    let value = 1;\n".repeat(400);
        let content = format!("fn very_large_function_body_for_truncation_test() {{\n{body}}}\n");
        let chunks = chunk_file("src/big.rs", "rust", &content, FILE_HASH);
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].content.len() <= HARD_MAX_CHUNK_CHARS + TRUNCATED_MARKER.len());
        assert!(chunks[0].content.ends_with("...[TRUNCATED]"));
    }

    #[test]
    fn unsupported_language_returns_no_chunks() {
        let chunks = chunk_file("README.md", "markdown", "# hello", FILE_HASH);
        assert!(chunks.is_empty());
    }
}
