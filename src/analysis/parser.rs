//! Declaration extraction with tree-sitter.
//!
//! Only declarations are interpreted: namespace, imports, classes,
//! interfaces, traits, their methods and properties, and free functions.
//! Anything else the grammar accepts (enums, constants, closures, anonymous
//! classes) is omitted. A tree containing error or missing nodes fails the
//! parse, with the line of the first one.

use tree_sitter::{Node, Parser};

use crate::error::ParseError;

use super::summary::{
    Import, MemberDeclaration, StructuralSummary, TypeDeclaration, TypeKind, Visibility,
};

/// Parse source text into its structural summary.
///
/// Text with an open tag is parsed as a PHP document (inline HTML allowed);
/// anything else as bare PHP code.
pub fn parse(source: &str) -> Result<StructuralSummary, ParseError> {
    let language = if source.contains("<?php") || source.contains("<?=") {
        tree_sitter_php::LANGUAGE_PHP
    } else {
        tree_sitter_php::LANGUAGE_PHP_ONLY
    };

    let mut parser = Parser::new();
    parser
        .set_language(&language.into())
        .map_err(|e| ParseError::new(format!("grammar unavailable: {}", e), None))?;
    let tree = parser
        .parse(source, None)
        .ok_or_else(|| ParseError::new("parser produced no tree", None))?;

    let root = tree.root_node();
    if root.has_error() {
        return Err(syntax_error(root, source));
    }

    let mut summary = StructuralSummary::default();
    visit(root, source, &mut summary);
    Ok(summary)
}

/// Point at the first error or missing node in document order.
fn syntax_error(root: Node<'_>, src: &str) -> ParseError {
    let node = first_error(root).unwrap_or(root);
    let line = node.start_position().row + 1;
    if node.is_missing() {
        return ParseError::at(format!("missing '{}'", node.kind()), line);
    }
    let snippet: String = text(node, src)
        .lines()
        .next()
        .unwrap_or_default()
        .chars()
        .take(40)
        .collect();
    ParseError::at(format!("syntax error near '{}'", snippet.trim()), line)
}

fn first_error(node: Node<'_>) -> Option<Node<'_>> {
    if node.is_error() || node.is_missing() {
        return Some(node);
    }
    if !node.has_error() {
        return None;
    }
    children(node)
        .into_iter()
        .find_map(first_error)
        .or(Some(node))
}

fn visit(node: Node<'_>, src: &str, summary: &mut StructuralSummary) {
    for child in children(node) {
        match child.kind() {
            "namespace_definition" => {
                if summary.namespace.is_none() {
                    summary.namespace = child
                        .child_by_field_name("name")
                        .map(|n| unqualify(text(n, src)));
                }
                // Braced namespaces hold their declarations in the body.
                visit(child, src, summary);
            }
            "namespace_use_declaration" => summary.imports.extend(imports(child, src)),
            "class_declaration" => summary.types.push(type_decl(child, src, TypeKind::Class)),
            "interface_declaration" => {
                summary.types.push(type_decl(child, src, TypeKind::Interface))
            }
            "trait_declaration" => summary.types.push(type_decl(child, src, TypeKind::Trait)),
            "function_definition" => {
                let (name, signature) = callable(child, src);
                summary.functions.push(MemberDeclaration {
                    name,
                    visibility: Visibility::Public,
                    signature,
                    docblock: docblock(child, src),
                });
            }
            // Not modelled; nested declarations inside them are not top-level API.
            "enum_declaration"
            | "anonymous_function"
            | "anonymous_function_creation_expression"
            | "arrow_function"
            | "object_creation_expression" => {}
            _ => visit(child, src, summary),
        }
    }
}

// ========== Imports ==========

fn imports(decl: Node<'_>, src: &str) -> Vec<Import> {
    // `use Prefix\{A, B as C};`
    let prefix = children(decl)
        .into_iter()
        .find(|c| matches!(c.kind(), "namespace_name" | "namespace_name_as_prefix"))
        .map(|n| unqualify(text(n, src)));

    let mut clauses = Vec::new();
    collect_kind(
        decl,
        &["namespace_use_clause", "namespace_use_group_clause"],
        &mut clauses,
    );

    clauses
        .into_iter()
        .filter_map(|clause| {
            let mut names = Vec::new();
            collect_kind(clause, &["name", "qualified_name", "namespace_name"], &mut names);
            let first = names.first()?;
            let name = unqualify(text(*first, src));
            let alias = clause
                .child_by_field_name("alias")
                .or_else(|| names.get(1).copied())
                .map(|n| text(n, src).to_string());
            Some(Import {
                name: match &prefix {
                    Some(prefix) => format!("{}\\{}", prefix, name),
                    None => name,
                },
                alias,
            })
        })
        .collect()
}

// ========== Types ==========

fn type_decl(node: Node<'_>, src: &str, kind: TypeKind) -> TypeDeclaration {
    let mut decl = TypeDeclaration::new(kind, name_of(node, src));
    decl.docblock = docblock(node, src);

    for child in children(node) {
        match child.kind() {
            "abstract_modifier" => decl.modifiers.is_abstract = true,
            "final_modifier" => decl.modifiers.is_final = true,
            "base_clause" => {
                let parents = names_in(child, src);
                decl.extends = (!parents.is_empty()).then(|| parents.join(", "));
            }
            "class_interface_clause" => decl.implements = names_in(child, src),
            _ => {}
        }
    }

    let Some(body) = node.child_by_field_name("body") else {
        return decl;
    };
    let mut promoted = Vec::new();
    for member in children(body) {
        match member.kind() {
            "method_declaration" => {
                let (method, params) = method(member, src);
                decl.methods.push(method);
                promoted.extend(params);
            }
            "property_declaration" => decl.properties.extend(properties(member, src)),
            _ => {}
        }
    }
    decl.properties.extend(promoted);
    decl
}

fn method(node: Node<'_>, src: &str) -> (MemberDeclaration, Vec<MemberDeclaration>) {
    let (name, mut signature) = callable(node, src);
    if has_child(node, "static_modifier") {
        signature = format!("static {}", signature);
    }
    let method = MemberDeclaration {
        name,
        visibility: visibility_of(node, src),
        signature,
        docblock: docblock(node, src),
    };

    // Constructor-promoted parameters declare properties.
    let promoted = parameters(node)
        .into_iter()
        .filter(|p| p.kind() == "property_promotion_parameter")
        .filter_map(|p| {
            let var = find_kind(p, "variable_name")?;
            Some(MemberDeclaration {
                name: variable(var, src),
                visibility: visibility_of(p, src),
                signature: p
                    .child_by_field_name("type")
                    .map(|t| normalized(t, src))
                    .unwrap_or_default(),
                docblock: None,
            })
        })
        .collect();
    (method, promoted)
}

fn properties(node: Node<'_>, src: &str) -> Vec<MemberDeclaration> {
    let doc = docblock(node, src);
    let visibility = visibility_of(node, src);
    let mut prefix = Vec::new();
    if has_child(node, "static_modifier") {
        prefix.push("static".to_string());
    }
    if let Some(ty) = node.child_by_field_name("type") {
        prefix.push(normalized(ty, src));
    }

    children(node)
        .into_iter()
        .filter(|c| c.kind() == "property_element")
        .filter_map(|element| {
            let var = find_kind(element, "variable_name")?;
            // Everything after the variable is the initializer.
            let mut tokens = Vec::new();
            for part in children(element) {
                if part != var {
                    leaves(part, src, &mut tokens);
                }
            }
            let mut parts = prefix.clone();
            if !tokens.is_empty() {
                parts.push(join(&tokens));
            }
            Some(MemberDeclaration {
                name: variable(var, src),
                visibility,
                signature: parts.join(" "),
                docblock: doc.clone(),
            })
        })
        .collect()
}

// ========== Signatures ==========

/// Name and `(params): return` signature of a function or method.
fn callable(node: Node<'_>, src: &str) -> (String, String) {
    let params: Vec<String> = parameters(node)
        .into_iter()
        .map(|p| normalized(p, src))
        .collect();
    let mut signature = format!("({})", params.join(", "));
    if let Some(ret) = node.child_by_field_name("return_type") {
        signature.push_str(": ");
        signature.push_str(&normalized(ret, src));
    }
    (name_of(node, src), signature)
}

fn parameters(node: Node<'_>) -> Vec<Node<'_>> {
    node.child_by_field_name("parameters")
        .or_else(|| find_kind(node, "formal_parameters"))
        .map(|list| {
            children(list)
                .into_iter()
                .filter(|p| p.kind().ends_with("parameter"))
                .collect()
        })
        .unwrap_or_default()
}

/// Node text with whitespace normalized, modifiers and attributes dropped.
fn normalized(node: Node<'_>, src: &str) -> String {
    let mut tokens = Vec::new();
    leaves(node, src, &mut tokens);
    join(&tokens)
}

fn leaves<'s>(node: Node<'_>, src: &'s str, out: &mut Vec<&'s str>) {
    match node.kind() {
        "comment" | "attribute_list" | "visibility_modifier" | "readonly_modifier" => {}
        "string" | "encapsed_string" | "heredoc" | "nowdoc" => out.push(text(node, src)),
        _ if node.child_count() == 0 => out.push(text(node, src)),
        _ => {
            for child in children(node) {
                leaves(child, src, out);
            }
        }
    }
}

fn join(tokens: &[&str]) -> String {
    let word_end = |t: &str| t.ends_with(|c: char| c.is_alphanumeric() || c == '_');
    let word_start = |t: &str| t.starts_with(|c: char| c.is_alphanumeric() || c == '_' || c == '$');

    let mut out = String::new();
    let mut prev: Option<&str> = None;
    for &tok in tokens {
        if let Some(p) = prev {
            let spaced = (word_end(p) && word_start(tok))
                || matches!(tok, "=" | "=>")
                || matches!(p, "=" | "=>" | ",");
            if spaced {
                out.push(' ');
            }
        }
        out.push_str(tok);
        prev = Some(tok);
    }
    out
}

// ========== Helpers ==========

fn children(node: Node<'_>) -> Vec<Node<'_>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn text<'s>(node: Node<'_>, src: &'s str) -> &'s str {
    src.get(node.byte_range()).unwrap_or_default()
}

fn unqualify(name: &str) -> String {
    name.trim().trim_start_matches('\\').to_string()
}

fn variable(node: Node<'_>, src: &str) -> String {
    text(node, src).trim_start_matches('$').to_string()
}

fn name_of(node: Node<'_>, src: &str) -> String {
    node.child_by_field_name("name")
        .or_else(|| find_kind(node, "name"))
        .map(|n| text(n, src).to_string())
        .unwrap_or_default()
}

fn has_child(node: Node<'_>, kind: &str) -> bool {
    find_kind(node, kind).is_some()
}

/// First direct child of `kind`.
fn find_kind<'t>(node: Node<'t>, kind: &str) -> Option<Node<'t>> {
    children(node).into_iter().find(|c| c.kind() == kind)
}

/// Every descendant of one of `kinds`, without descending into matches.
fn collect_kind<'t>(node: Node<'t>, kinds: &[&str], out: &mut Vec<Node<'t>>) {
    for child in children(node) {
        if kinds.contains(&child.kind()) {
            out.push(child);
        } else {
            collect_kind(child, kinds, out);
        }
    }
}

fn names_in(node: Node<'_>, src: &str) -> Vec<String> {
    children(node)
        .into_iter()
        .filter(|c| matches!(c.kind(), "name" | "qualified_name"))
        .map(|c| unqualify(text(c, src)))
        .collect()
}

fn visibility_of(node: Node<'_>, src: &str) -> Visibility {
    match find_kind(node, "visibility_modifier")
        .map(|v| text(v, src).to_ascii_lowercase())
        .as_deref()
    {
        Some("private") => Visibility::Private,
        Some("protected") => Visibility::Protected,
        _ => Visibility::Public,
    }
}

/// The `/** */` comment directly before a declaration.
fn docblock(node: Node<'_>, src: &str) -> Option<String> {
    let prev = node.prev_sibling()?;
    let body = text(prev, src);
    (prev.kind() == "comment" && body.starts_with("/**")).then(|| body.to_string())
}
