use crate::error::{Result, SyntaxError};
use crate::language::LanguageExt;
use crate::tree::SyntaxTree;
use crate::types::{Accessibility, Declaration, DeclarationKind, MemberPath, TextRange};
use crawler_workspace::Language;
use std::collections::HashMap;
use tree_sitter::{Node, Parser};

/// Builds [`SyntaxTree`] summaries for one language
pub struct AstAnalyzer {
    parser: Parser,
    language: Language,
}

impl AstAnalyzer {
    /// Create new AST analyzer for a language
    pub fn new(language: Language) -> Result<Self> {
        if !language.supports_syntax() {
            return Err(SyntaxError::UnsupportedLanguage(language));
        }

        let ts_language = language.tree_sitter_language()?;
        let mut parser = Parser::new();
        parser
            .set_language(&ts_language)
            .map_err(|e| SyntaxError::tree_sitter(format!("Failed to set language: {e}")))?;

        Ok(Self { parser, language })
    }

    /// Parse `text` and extract its declarations
    pub fn analyze(&mut self, text: &str) -> Result<SyntaxTree> {
        let tree = self
            .parser
            .parse(text, None)
            .ok_or_else(|| SyntaxError::parse("Failed to parse source code"))?;

        let root = tree.root_node();
        let mut extractor = Extractor {
            text,
            declarations: Vec::new(),
        };
        let root_path = MemberPath::default();
        match self.language {
            Language::Rust => extractor.rust_items(root, None, &root_path, Scope::Module),
            Language::Python => extractor.python_items(root, None, &root_path, Scope::Module),
            Language::JavaScript | Language::TypeScript => {
                extractor.js_items(root, None, &root_path);
            }
            _ => {}
        }

        Ok(SyntaxTree::new(
            self.language,
            text,
            extractor.declarations,
            root.has_error(),
        ))
    }
}

/// Where a declaration sits, which drives its default accessibility
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Module,
    /// Fields and inherent impl items
    TypeBody,
    /// Trait items and trait impl items share the trait's visibility
    TraitBody,
}

struct Extractor<'a> {
    text: &'a str,
    declarations: Vec<Declaration>,
}

/// Counts same kind + name siblings so repeated `impl Foo` blocks stay addressable
#[derive(Default)]
struct Ordinals(HashMap<(DeclarationKind, String), usize>);

impl Ordinals {
    fn next(&mut self, kind: DeclarationKind, name: &str) -> usize {
        let slot = self.0.entry((kind, name.to_string())).or_insert(0);
        let ordinal = *slot;
        *slot += 1;
        ordinal
    }
}

impl<'a> Extractor<'a> {
    fn node_text(&self, node: Node) -> &'a str {
        node.utf8_text(self.text.as_bytes()).unwrap_or_default()
    }

    fn field_text(&self, node: Node, field: &str) -> Option<String> {
        node.child_by_field_name(field)
            .map(|n| self.node_text(n).to_string())
    }

    #[allow(clippy::too_many_arguments)]
    fn push(
        &mut self,
        ordinals: &mut Ordinals,
        kind: DeclarationKind,
        name: String,
        node: Node,
        body: Option<Node>,
        accessibility: Accessibility,
        parent: Option<usize>,
        parent_path: &MemberPath,
    ) -> (usize, MemberPath) {
        let ordinal = ordinals.next(kind, &name);
        let path = parent_path.child(kind, name.clone(), ordinal);
        self.declarations.push(Declaration {
            kind,
            name,
            range: node.byte_range().into(),
            body: body.map(|b| TextRange::from(b.byte_range())),
            accessibility,
            parent,
            path: path.clone(),
        });
        (self.declarations.len() - 1, path)
    }

    // ---------------------------------------------------------------- Rust

    fn rust_items(&mut self, node: Node, parent: Option<usize>, path: &MemberPath, scope: Scope) {
        let mut ordinals = Ordinals::default();
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();

        for child in children {
            let kind = match child.kind() {
                "function_item" | "function_signature_item" => {
                    if scope == Scope::Module {
                        DeclarationKind::Function
                    } else {
                        DeclarationKind::Method
                    }
                }
                "struct_item" | "union_item" => DeclarationKind::Struct,
                "enum_item" => DeclarationKind::Enum,
                "trait_item" => DeclarationKind::Trait,
                "impl_item" => DeclarationKind::Impl,
                "mod_item" => DeclarationKind::Module,
                "const_item" => DeclarationKind::Const,
                "static_item" => DeclarationKind::Static,
                "type_item" | "associated_type" => DeclarationKind::TypeAlias,
                "field_declaration" => DeclarationKind::Field,
                _ => continue,
            };

            let name = if kind == DeclarationKind::Impl {
                child
                    .child_by_field_name("type")
                    .and_then(|ty| self.rust_type_name(ty))
            } else {
                self.field_text(child, "name")
            };
            let Some(name) = name else { continue };

            let accessibility = self.rust_accessibility(child, scope);
            let body = if kind.is_function_like() {
                child.child_by_field_name("body")
            } else {
                None
            };
            let (idx, child_path) = self.push(
                &mut ordinals,
                kind,
                name,
                child,
                body,
                accessibility,
                parent,
                path,
            );

            let Some(inner) = child.child_by_field_name("body") else {
                continue;
            };
            match kind {
                DeclarationKind::Struct => {
                    self.rust_items(inner, Some(idx), &child_path, Scope::TypeBody);
                }
                DeclarationKind::Trait => {
                    self.rust_items(inner, Some(idx), &child_path, Scope::TraitBody);
                }
                DeclarationKind::Impl => {
                    let scope = if child.child_by_field_name("trait").is_some() {
                        Scope::TraitBody
                    } else {
                        Scope::TypeBody
                    };
                    self.rust_items(inner, Some(idx), &child_path, scope);
                }
                DeclarationKind::Module => {
                    self.rust_items(inner, Some(idx), &child_path, Scope::Module);
                }
                _ => {}
            }
        }
    }

    /// Base name of an impl target: `Foo`, `Foo<T>`, `crate::a::Foo`
    fn rust_type_name(&self, node: Node) -> Option<String> {
        match node.kind() {
            "type_identifier" | "primitive_type" => Some(self.node_text(node).to_string()),
            "generic_type" => node
                .child_by_field_name("type")
                .and_then(|ty| self.rust_type_name(ty)),
            "scoped_type_identifier" => self.field_text(node, "name"),
            "reference_type" => node
                .child_by_field_name("type")
                .and_then(|ty| self.rust_type_name(ty)),
            _ => Some(self.node_text(node).to_string()),
        }
    }

    fn rust_accessibility(&self, node: Node, scope: Scope) -> Accessibility {
        let mut cursor = node.walk();
        let visibility = node
            .children(&mut cursor)
            .find(|c| c.kind() == "visibility_modifier")
            .map(|c| self.node_text(c).split_whitespace().collect::<String>());

        match visibility.as_deref() {
            Some("pub") => Accessibility::Public,
            Some("pub(self)") => Accessibility::Private,
            Some(_) => Accessibility::Internal,
            None => match scope {
                Scope::Module => Accessibility::Internal,
                Scope::TypeBody => Accessibility::Private,
                Scope::TraitBody => Accessibility::Public,
            },
        }
    }

    // -------------------------------------------------------------- Python

    fn python_items(&mut self, node: Node, parent: Option<usize>, path: &MemberPath, scope: Scope) {
        let mut ordinals = Ordinals::default();
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();

        for outer in children {
            let definition = if outer.kind() == "decorated_definition" {
                match outer.child_by_field_name("definition") {
                    Some(def) => def,
                    None => continue,
                }
            } else {
                outer
            };

            let kind = match definition.kind() {
                "function_definition" if scope == Scope::Module => DeclarationKind::Function,
                "function_definition" => DeclarationKind::Method,
                "class_definition" => DeclarationKind::Class,
                _ => continue,
            };
            let Some(name) = self.field_text(definition, "name") else {
                continue;
            };

            let accessibility = python_accessibility(&name, scope);
            let body = definition.child_by_field_name("body");
            let function_body = if kind.is_function_like() { body } else { None };
            let (idx, child_path) = self.push(
                &mut ordinals,
                kind,
                name,
                outer,
                function_body,
                accessibility,
                parent,
                path,
            );

            if kind == DeclarationKind::Class {
                if let Some(block) = body {
                    self.python_items(block, Some(idx), &child_path, Scope::TypeBody);
                }
            }
        }
    }

    // ------------------------------------------------ JavaScript / TypeScript

    fn js_items(&mut self, node: Node, parent: Option<usize>, path: &MemberPath) {
        let mut ordinals = Ordinals::default();
        let mut cursor = node.walk();
        let children: Vec<_> = node.named_children(&mut cursor).collect();

        for outer in children {
            let (declaration, exported) = if outer.kind() == "export_statement" {
                match outer.child_by_field_name("declaration") {
                    Some(decl) => (decl, true),
                    None => continue,
                }
            } else {
                (outer, false)
            };
            let accessibility = if exported {
                Accessibility::Public
            } else {
                Accessibility::Private
            };

            let kind = match declaration.kind() {
                "function_declaration"
                | "generator_function_declaration"
                | "function_signature" => DeclarationKind::Function,
                "class_declaration" | "abstract_class_declaration" => DeclarationKind::Class,
                "interface_declaration" => DeclarationKind::Interface,
                "enum_declaration" => DeclarationKind::Enum,
                "type_alias_declaration" => DeclarationKind::TypeAlias,
                "lexical_declaration" | "variable_declaration" => {
                    self.js_variables(
                        &mut ordinals,
                        declaration,
                        outer,
                        accessibility,
                        parent,
                        path,
                    );
                    continue;
                }
                _ => continue,
            };
            let Some(name) = self.field_text(declaration, "name") else {
                continue;
            };

            let body = declaration.child_by_field_name("body");
            let function_body = if kind.is_function_like() { body } else { None };
            let (idx, child_path) = self.push(
                &mut ordinals,
                kind,
                name,
                outer,
                function_body,
                accessibility,
                parent,
                path,
            );

            if kind == DeclarationKind::Class {
                if let Some(class_body) = body {
                    self.js_class_members(class_body, idx, &child_path);
                }
            }
        }
    }

    /// `const a = 1, f = () => {}`: one declaration per declarator
    fn js_variables(
        &mut self,
        ordinals: &mut Ordinals,
        declaration: Node,
        outer: Node,
        accessibility: Accessibility,
        parent: Option<usize>,
        path: &MemberPath,
    ) {
        let mut cursor = declaration.walk();
        let declarators: Vec<_> = declaration
            .named_children(&mut cursor)
            .filter(|c| c.kind() == "variable_declarator")
            .collect();
        let single = declarators.len() == 1;

        for declarator in declarators {
            let Some(name_node) = declarator.child_by_field_name("name") else {
                continue;
            };
            if name_node.kind() != "identifier" {
                continue;
            }
            let name = self.node_text(name_node).to_string();
            let function_body = declarator
                .child_by_field_name("value")
                .filter(|v| matches!(v.kind(), "arrow_function" | "function_expression" | "function"))
                .and_then(|v| v.child_by_field_name("body"));
            let kind = if function_body.is_some() {
                DeclarationKind::Function
            } else {
                DeclarationKind::Variable
            };
            let range_node = if single { outer } else { declarator };
            self.push(
                ordinals,
                kind,
                name,
                range_node,
                function_body,
                accessibility,
                parent,
                path,
            );
        }
    }

    fn js_class_members(&mut self, class_body: Node, parent: usize, path: &MemberPath) {
        let mut ordinals = Ordinals::default();
        let mut cursor = class_body.walk();
        let members: Vec<_> = class_body.named_children(&mut cursor).collect();

        for member in members {
            let (kind, name_field) = match member.kind() {
                "method_definition" | "method_signature" | "abstract_method_signature" => {
                    (DeclarationKind::Method, "name")
                }
                "public_field_definition" => (DeclarationKind::Field, "name"),
                "field_definition" => (DeclarationKind::Field, "property"),
                _ => continue,
            };
            let Some(name_node) = member.child_by_field_name(name_field) else {
                continue;
            };
            let name = self.node_text(name_node).to_string();
            let accessibility = self.js_member_accessibility(member, name_node);
            let body = if kind.is_function_like() {
                member.child_by_field_name("body")
            } else {
                None
            };
            self.push(
                &mut ordinals,
                kind,
                name,
                member,
                body,
                accessibility,
                Some(parent),
                path,
            );
        }
    }

    fn js_member_accessibility(&self, member: Node, name: Node) -> Accessibility {
        if name.kind() == "private_property_identifier" {
            return Accessibility::Private;
        }
        let mut cursor = member.walk();
        let modifier = member
            .children(&mut cursor)
            .find(|c| c.kind() == "accessibility_modifier")
            .map(|c| self.node_text(c));
        match modifier {
            Some("private") => Accessibility::Private,
            Some("protected") => Accessibility::ProtectedInternal,
            _ => Accessibility::Public,
        }
    }
}

fn python_accessibility(name: &str, scope: Scope) -> Accessibility {
    let dunder = name.starts_with("__") && name.ends_with("__");
    if name.starts_with('_') && !dunder {
        match scope {
            Scope::Module => Accessibility::Private,
            _ if name.starts_with("__") => Accessibility::Private,
            _ => Accessibility::Internal,
        }
    } else {
        Accessibility::Public
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn names(tree: &SyntaxTree) -> Vec<(DeclarationKind, &str, Accessibility)> {
        tree.declarations()
            .iter()
            .map(|d| (d.kind, d.name.as_str(), d.accessibility))
            .collect()
    }

    #[test]
    fn test_rust_declarations() {
        let code = r"
pub struct Counter {
    count: u32,
    pub(crate) label: String,
}

impl Counter {
    pub fn bump(&mut self) { self.count += 1; }
    fn reset(&mut self) { self.count = 0; }
}

impl Default for Counter {
    fn default() -> Self { todo!() }
}

struct Hidden;
";
        let tree = AstAnalyzer::new(Language::Rust).unwrap().analyze(code).unwrap();
        assert!(!tree.has_errors());
        assert_eq!(
            names(&tree),
            vec![
                (DeclarationKind::Struct, "Counter", Accessibility::Public),
                (DeclarationKind::Field, "count", Accessibility::Private),
                (DeclarationKind::Field, "label", Accessibility::Internal),
                (DeclarationKind::Impl, "Counter", Accessibility::Internal),
                (DeclarationKind::Method, "bump", Accessibility::Public),
                (DeclarationKind::Method, "reset", Accessibility::Private),
                (DeclarationKind::Impl, "Counter", Accessibility::Internal),
                (DeclarationKind::Method, "default", Accessibility::Public),
                (DeclarationKind::Struct, "Hidden", Accessibility::Internal),
            ]
        );

        let second_impl = &tree.declarations()[6];
        assert_eq!(second_impl.path.segments[0].ordinal, 1);
    }

    #[test]
    fn test_nested_module_paths() {
        let code = r"
mod api {
    pub struct Car;

    impl Car {
        pub fn drive(&self) {}
    }
}
";
        let tree = AstAnalyzer::new(Language::Rust).unwrap().analyze(code).unwrap();
        let drive = tree
            .declarations()
            .iter()
            .find(|d| d.name == "drive")
            .unwrap();
        assert_eq!(drive.path.to_string(), "mod api::impl Car::method drive");
        assert!(drive.body.is_some());
    }

    #[test]
    fn test_python_declarations() {
        let code = r#"
class Store:
    def get(self, key):
        return self._data[key]

    def _evict(self):
        pass

    def __len__(self):
        return 0

def _helper():
    pass
"#;
        let tree = AstAnalyzer::new(Language::Python).unwrap().analyze(code).unwrap();
        assert_eq!(
            names(&tree),
            vec![
                (DeclarationKind::Class, "Store", Accessibility::Public),
                (DeclarationKind::Method, "get", Accessibility::Public),
                (DeclarationKind::Method, "_evict", Accessibility::Internal),
                (DeclarationKind::Method, "__len__", Accessibility::Public),
                (DeclarationKind::Function, "_helper", Accessibility::Private),
            ]
        );
    }

    #[test]
    fn test_typescript_declarations() {
        let code = r"
export class Queue {
    private items: number[] = [];
    protected limit = 10;
    push(item: number): void { this.items.push(item); }
}

function local(): number { return 1; }

export const make = () => { return new Queue(); };
";
        let tree = AstAnalyzer::new(Language::TypeScript)
            .unwrap()
            .analyze(code)
            .unwrap();
        assert_eq!(
            names(&tree),
            vec![
                (DeclarationKind::Class, "Queue", Accessibility::Public),
                (DeclarationKind::Field, "items", Accessibility::Private),
                (DeclarationKind::Field, "limit", Accessibility::ProtectedInternal),
                (DeclarationKind::Method, "push", Accessibility::Public),
                (DeclarationKind::Function, "local", Accessibility::Private),
                (DeclarationKind::Function, "make", Accessibility::Public),
            ]
        );
    }

    #[test]
    fn test_unsupported_language() {
        assert!(matches!(
            AstAnalyzer::new(Language::Go),
            Err(SyntaxError::UnsupportedLanguage(Language::Go))
        ));
    }
}
