//! Documentation generators.

use std::fmt::{self, Write};

use crate::analysis::parse;
use crate::analysis::summary::{MemberDeclaration, StructuralSummary, TypeDeclaration};
use crate::error::Error;

/// Tokens spent on one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct TokenUsage {
    pub model: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedDoc {
    pub markdown: String,
    /// `None` for generators that call no model.
    pub usage: Option<TokenUsage>,
}

/// Turns one source file into Markdown.
pub trait DocGenerator {
    fn generate(&self, path: &str, source: &str) -> Result<GeneratedDoc, Error>;
}

/// Renders an API outline from the parsed structure. Calls no model.
#[derive(Debug, Default)]
pub struct OutlineGenerator;

impl DocGenerator for OutlineGenerator {
    fn generate(&self, path: &str, source: &str) -> Result<GeneratedDoc, Error> {
        let summary =
            parse(source).map_err(|e| Error::Generation(format!("{}: {}", path, e)))?;
        let mut md = String::new();
        render_summary(&mut md, path, &summary)
            .map_err(|e| Error::Generation(format!("{}: {}", path, e)))?;
        Ok(GeneratedDoc {
            markdown: md,
            usage: None,
        })
    }
}

fn render_summary(md: &mut String, path: &str, summary: &StructuralSummary) -> fmt::Result {
    writeln!(md, "# `{}`", path)?;
    if let Some(ns) = &summary.namespace {
        writeln!(md, "\nNamespace: `{}`", ns)?;
    }
    for ty in &summary.types {
        render_type(md, ty)?;
    }
    if !summary.functions.is_empty() {
        writeln!(md, "\n## Functions\n")?;
        for func in &summary.functions {
            render_member(md, "function", func)?;
        }
    }
    Ok(())
}

fn render_type(md: &mut String, ty: &TypeDeclaration) -> fmt::Result {
    writeln!(md, "\n## {} `{}`\n", ty.kind, ty.name)?;
    if let Some(doc) = ty.docblock.as_deref().map(docblock_text) {
        if !doc.is_empty() {
            writeln!(md, "{}\n", doc)?;
        }
    }
    if let Some(parent) = &ty.extends {
        writeln!(md, "- Extends: `{}`", parent)?;
    }
    if !ty.implements.is_empty() {
        writeln!(md, "- Implements: `{}`", ty.implements.join("`, `"))?;
    }
    if ty.modifiers.is_abstract {
        writeln!(md, "- Abstract")?;
    }
    if ty.modifiers.is_final {
        writeln!(md, "- Final")?;
    }

    if !ty.properties.is_empty() {
        writeln!(md, "\n### Properties\n")?;
        for prop in &ty.properties {
            writeln!(md, "- `{} ${}` {}", prop.visibility, prop.name, prop.signature)?;
        }
    }
    if !ty.methods.is_empty() {
        writeln!(md, "\n### Methods\n")?;
        for method in &ty.methods {
            render_member(md, &method.visibility.to_string(), method)?;
        }
    }
    Ok(())
}

fn render_member(md: &mut String, prefix: &str, member: &MemberDeclaration) -> fmt::Result {
    write!(md, "- `{} {}{}`", prefix, member.name, member.signature)?;
    match member.docblock.as_deref().map(docblock_text) {
        Some(doc) if !doc.is_empty() => {
            writeln!(md, ": {}", doc.lines().next().unwrap_or_default())
        }
        _ => writeln!(md),
    }
}

/// Strip `/** */` and leading asterisks, dropping `@tag` lines.
fn docblock_text(doc: &str) -> String {
    doc.trim_start_matches("/**")
        .trim_end_matches("*/")
        .lines()
        .map(|l| l.trim().trim_start_matches('*').trim())
        .filter(|l| !l.is_empty() && !l.starts_with('@'))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline() {
        let source = r#"<?php
namespace App;

/** A user account. */
final class User extends Model implements Auth {
    private ?string $name = null;

    /**
     * Display name.
     * @return string
     */
    public function name(): string { return $this->name; }
}

function helper($x) {}
"#;
        let doc = OutlineGenerator.generate("src/User.php", source).unwrap();
        assert!(doc.usage.is_none());
        let md = doc.markdown;
        assert!(md.starts_with("# `src/User.php`"));
        assert!(md.contains("Namespace: `App`"));
        assert!(md.contains("## class `User`"));
        assert!(md.contains("A user account."));
        assert!(md.contains("- Extends: `Model`"));
        assert!(md.contains("- Final"));
        assert!(md.contains("`public name(): string`: Display name."));
        assert!(md.contains("`function helper($x)`"));
    }

    #[test]
    fn test_unparseable_source_is_generation_error() {
        let err = OutlineGenerator
            .generate("bad.php", "<?php class {")
            .unwrap_err();
        assert!(matches!(err, Error::Generation(_)));
    }

    #[test]
    fn test_docblock_text() {
        assert_eq!(
            docblock_text("/**\n * First.\n * Second.\n * @param int $x\n */"),
            "First.\nSecond."
        );
    }
}
