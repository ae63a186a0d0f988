//! Structural summary of one source file.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// Member visibility.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    #[default]
    Public,
    Protected,
    Private,
}

impl std::fmt::Display for Visibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Visibility::Public => write!(f, "public"),
            Visibility::Protected => write!(f, "protected"),
            Visibility::Private => write!(f, "private"),
        }
    }
}

/// Kind of a declared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TypeKind {
    Class,
    Interface,
    Trait,
}

impl std::fmt::Display for TypeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeKind::Class => write!(f, "class"),
            TypeKind::Interface => write!(f, "interface"),
            TypeKind::Trait => write!(f, "trait"),
        }
    }
}

/// Type-level modifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TypeModifiers {
    pub is_abstract: bool,
    pub is_final: bool,
}

/// An imported name (`use Foo\Bar as Baz`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Import {
    pub name: String,
    pub alias: Option<String>,
}

/// A method, property or free function.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MemberDeclaration {
    pub name: String,
    pub visibility: Visibility,
    /// Parameter list and return type, whitespace-normalized.
    pub signature: String,
    pub docblock: Option<String>,
}

/// A class, interface or trait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeDeclaration {
    pub kind: TypeKind,
    pub name: String,
    pub extends: Option<String>,
    pub implements: Vec<String>,
    pub modifiers: TypeModifiers,
    pub methods: Vec<MemberDeclaration>,
    pub properties: Vec<MemberDeclaration>,
    pub docblock: Option<String>,
}

impl TypeDeclaration {
    pub fn new(kind: TypeKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            extends: None,
            implements: Vec::new(),
            modifiers: TypeModifiers::default(),
            methods: Vec::new(),
            properties: Vec::new(),
            docblock: None,
        }
    }
}

/// Normalized structure of a parsed file.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StructuralSummary {
    pub namespace: Option<String>,
    pub imports: Vec<Import>,
    pub types: Vec<TypeDeclaration>,
    pub functions: Vec<MemberDeclaration>,
}

impl StructuralSummary {
    /// Every symbol name a generated document could describe.
    ///
    /// Types are listed by name, members as `Type::member`, free functions by
    /// name.
    pub fn symbol_names(&self) -> Vec<String> {
        let mut names = Vec::new();
        for ty in &self.types {
            names.push(ty.name.clone());
            for member in ty.methods.iter().chain(&ty.properties) {
                names.push(qualified(&ty.name, &member.name));
            }
        }
        names.extend(self.functions.iter().map(|f| f.name.clone()));
        names
    }

    /// Qualified names of private members and private free functions.
    pub fn private_symbols(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        for ty in &self.types {
            for member in ty.methods.iter().chain(&ty.properties) {
                if member.visibility == Visibility::Private {
                    names.insert(qualified(&ty.name, &member.name));
                }
            }
        }
        names
    }
}

/// `Type::member` naming used by the symbol registry.
pub fn qualified(type_name: &str, member: &str) -> String {
    format!("{}::{}", type_name, member)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn member(name: &str, visibility: Visibility) -> MemberDeclaration {
        MemberDeclaration {
            name: name.to_string(),
            visibility,
            signature: "()".to_string(),
            docblock: None,
        }
    }

    #[test]
    fn test_symbol_names() {
        let mut ty = TypeDeclaration::new(TypeKind::Class, "Foo");
        ty.methods.push(member("bar", Visibility::Public));
        ty.properties.push(member("id", Visibility::Private));
        let summary = StructuralSummary {
            types: vec![ty],
            functions: vec![member("helper", Visibility::Public)],
            ..Default::default()
        };

        assert_eq!(
            summary.symbol_names(),
            vec!["Foo", "Foo::bar", "Foo::id", "helper"]
        );
        assert_eq!(
            summary.private_symbols().into_iter().collect::<Vec<_>>(),
            vec!["Foo::id"]
        );
    }
}
