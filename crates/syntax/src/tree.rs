use crate::ast_analyzer::AstAnalyzer;
use crate::error::Result;
use crate::types::{
    Accessibility, ChangedSymbol, ContainerSymbol, Declaration, DeclarationKind, MemberPath,
    TextRange,
};
use crawler_workspace::Language;

/// Parsed summary of one document version.
///
/// Holds only what differencing and propagation need: the declaration list,
/// whether tree-sitter had to recover from errors, and the outline (the text
/// with every function body elided and whitespace normalized). Two versions
/// with equal outlines differ only inside function bodies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyntaxTree {
    language: Language,
    text_len: usize,
    declarations: Vec<Declaration>,
    outline: String,
    has_errors: bool,
}

impl SyntaxTree {
    /// Parse `text` as `language`
    pub fn parse(language: Language, text: &str) -> Result<Self> {
        AstAnalyzer::new(language)?.analyze(text)
    }

    pub(crate) fn new(
        language: Language,
        text: &str,
        declarations: Vec<Declaration>,
        has_errors: bool,
    ) -> Self {
        let outline = build_outline(text, &declarations);
        Self {
            language,
            text_len: text.len(),
            declarations,
            outline,
            has_errors,
        }
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn text_len(&self) -> usize {
        self.text_len
    }

    pub fn declarations(&self) -> &[Declaration] {
        &self.declarations
    }

    /// Tree contains error-recovery nodes
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    pub fn outline(&self) -> &str {
        &self.outline
    }

    /// Equal declarations modulo function bodies
    pub fn same_outline(&self, other: &SyntaxTree) -> bool {
        self.language == other.language && self.outline == other.outline
    }

    /// Innermost function-like declaration whose body contains `range`
    pub fn member_at(&self, range: TextRange) -> Option<&Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.kind.is_function_like())
            .filter(|d| d.body.is_some_and(|body| body.contains_range(range)))
            .min_by_key(|d| d.body.map_or(usize::MAX, |b| b.len()))
    }

    /// Innermost declaration of any kind containing `range`
    pub fn enclosing_declaration(&self, range: TextRange) -> Option<&Declaration> {
        self.declarations
            .iter()
            .filter(|d| d.range.contains_range(range))
            .min_by_key(|d| d.range.len())
    }

    /// Find a function-like declaration by path in this version
    pub fn resolve_member(&self, path: &MemberPath) -> Option<&Declaration> {
        self.declarations
            .iter()
            .find(|d| d.kind.is_function_like() && &d.path == path)
    }

    pub fn parent(&self, declaration: &Declaration) -> Option<&Declaration> {
        declaration.parent.and_then(|idx| self.declarations.get(idx))
    }

    /// Nearest enclosing type-like declaration
    pub fn containing_type(&self, declaration: &Declaration) -> Option<&Declaration> {
        let mut current = self.parent(declaration);
        while let Some(candidate) = current {
            if candidate.kind.is_type() {
                return Some(candidate);
            }
            current = self.parent(candidate);
        }
        None
    }

    /// Accessibility of the non-impl declaration of type `name`, if this file has one
    pub fn type_accessibility(&self, name: &str) -> Option<Accessibility> {
        self.declarations
            .iter()
            .filter(|d| d.kind.is_type() && d.kind != DeclarationKind::Impl && d.name == name)
            .map(|d| d.accessibility)
            .max()
    }

    /// File contributes to type `name` (declaration, impl block or partial)
    pub fn declares_type(&self, name: &str) -> bool {
        self.declarations
            .iter()
            .any(|d| d.kind.is_type() && d.name == name)
    }

    /// Classify the declaration enclosing `range` for semantic propagation
    pub fn symbol_at(&self, range: TextRange) -> Option<ChangedSymbol> {
        let declaration = self.enclosing_declaration(range)?;
        let container = self.containing_type(declaration).map(|ty| ContainerSymbol {
            name: ty.name.clone(),
            kind: ty.kind,
            accessibility: if ty.kind == DeclarationKind::Impl {
                self.type_accessibility(&ty.name)
            } else {
                Some(ty.accessibility)
            },
        });
        Some(ChangedSymbol {
            name: declaration.name.clone(),
            kind: declaration.kind,
            accessibility: declaration.accessibility,
            container,
        })
    }
}

fn build_outline(text: &str, declarations: &[Declaration]) -> String {
    let mut bodies: Vec<TextRange> = declarations.iter().filter_map(|d| d.body).collect();
    bodies.sort_by_key(|b| b.start);

    let mut outline = String::with_capacity(text.len() / 2);
    let mut cursor = 0;
    for body in bodies {
        if body.start < cursor || body.end > text.len() {
            continue;
        }
        if let Some(segment) = text.get(cursor..body.start) {
            push_normalized(&mut outline, segment);
        }
        push_normalized(&mut outline, "{}");
        cursor = body.end;
    }
    if let Some(rest) = text.get(cursor..) {
        push_normalized(&mut outline, rest);
    }
    outline
}

fn push_normalized(out: &mut String, segment: &str) {
    for word in segment.split_whitespace() {
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const BEFORE: &str = r"
pub struct Counter {
    count: u32,
}

impl Counter {
    pub fn bump(&mut self) {
        self.count += 1;
    }
}
";

    #[test]
    fn body_edits_keep_the_outline() {
        let after = BEFORE.replace("self.count += 1;", "self.count += 2;\n        log();");
        let old = SyntaxTree::parse(Language::Rust, BEFORE).unwrap();
        let new = SyntaxTree::parse(Language::Rust, &after).unwrap();
        assert!(old.same_outline(&new));
    }

    #[test]
    fn new_declarations_change_the_outline() {
        let after = format!("{BEFORE}\npub fn extra() {{}}\n");
        let old = SyntaxTree::parse(Language::Rust, BEFORE).unwrap();
        let new = SyntaxTree::parse(Language::Rust, &after).unwrap();
        assert!(!old.same_outline(&new));
    }

    #[test]
    fn member_at_finds_enclosing_method() {
        let tree = SyntaxTree::parse(Language::Rust, BEFORE).unwrap();
        let offset = BEFORE.find("+= 1").unwrap();
        let member = tree.member_at(TextRange::new(offset, offset + 4)).unwrap();
        assert_eq!(member.name, "bump");
        assert_eq!(tree.resolve_member(&member.path), Some(member));

        let outside = BEFORE.find("count: u32").unwrap();
        assert!(tree.member_at(TextRange::new(outside, outside)).is_none());
    }

    #[test]
    fn symbol_at_reports_container_accessibility() {
        let tree = SyntaxTree::parse(Language::Rust, BEFORE).unwrap();
        let field = BEFORE.find("count: u32").unwrap();
        let symbol = tree.symbol_at(TextRange::new(field, field + 5)).unwrap();
        assert_eq!(symbol.name, "count");
        assert_eq!(symbol.accessibility, Accessibility::Private);
        assert_eq!(
            symbol.container,
            Some(ContainerSymbol {
                name: "Counter".to_string(),
                kind: DeclarationKind::Struct,
                accessibility: Some(Accessibility::Public),
            })
        );

        let method = BEFORE.find("+= 1").unwrap();
        let symbol = tree.symbol_at(TextRange::new(method, method)).unwrap();
        assert_eq!(symbol.name, "bump");
        assert_eq!(
            symbol.container.map(|c| (c.kind, c.accessibility)),
            Some((DeclarationKind::Impl, Some(Accessibility::Public)))
        );
    }

    #[test]
    fn error_recovery_is_reported() {
        let tree = SyntaxTree::parse(Language::Rust, "fn broken( {").unwrap();
        assert!(tree.has_errors());
    }

    #[test]
    fn declares_type_includes_impl_blocks() {
        let tree = SyntaxTree::parse(Language::Rust, "impl Remote { fn go(&self) {} }").unwrap();
        assert!(tree.declares_type("Remote"));
        assert_eq!(tree.type_accessibility("Remote"), None);
    }
}
