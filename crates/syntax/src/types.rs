use serde::{Deserialize, Serialize};
use std::fmt;

/// Half-open byte range into a document's text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct TextRange {
    pub start: usize,
    pub end: usize,
}

impl TextRange {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// `other` lies fully inside this range (touching edges count)
    pub const fn contains_range(&self, other: TextRange) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

impl From<std::ops::Range<usize>> for TextRange {
    fn from(range: std::ops::Range<usize>) -> Self {
        Self::new(range.start, range.end)
    }
}

/// Smallest edit turning the old text into the new one
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextChange {
    /// Replaced range in the old text
    pub old_range: TextRange,
    /// Inserted range in the new text
    pub new_range: TextRange,
}

/// Kind of declaration extracted from the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeclarationKind {
    Function,
    Method,
    Struct,
    Enum,
    Trait,
    Impl,
    Class,
    Interface,
    TypeAlias,
    Module,
    Const,
    Static,
    Field,
    Variable,
}

impl DeclarationKind {
    /// Declarations whose body can be re-analyzed in isolation
    pub const fn is_function_like(self) -> bool {
        matches!(self, DeclarationKind::Function | DeclarationKind::Method)
    }

    /// Declarations that contribute members to a named type
    pub const fn is_type(self) -> bool {
        matches!(
            self,
            DeclarationKind::Struct
                | DeclarationKind::Enum
                | DeclarationKind::Trait
                | DeclarationKind::Impl
                | DeclarationKind::Class
                | DeclarationKind::Interface
                | DeclarationKind::TypeAlias
        )
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            DeclarationKind::Function => "fn",
            DeclarationKind::Method => "method",
            DeclarationKind::Struct => "struct",
            DeclarationKind::Enum => "enum",
            DeclarationKind::Trait => "trait",
            DeclarationKind::Impl => "impl",
            DeclarationKind::Class => "class",
            DeclarationKind::Interface => "interface",
            DeclarationKind::TypeAlias => "type",
            DeclarationKind::Module => "mod",
            DeclarationKind::Const => "const",
            DeclarationKind::Static => "static",
            DeclarationKind::Field => "field",
            DeclarationKind::Variable => "var",
        }
    }
}

/// Visibility class of a declaration, from narrowest to widest
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Accessibility {
    /// Visible to its declaring type or file only
    Private,
    /// Visible inside the declaring project (and its friends)
    Internal,
    /// Visible inside the project and to derived types elsewhere
    ProtectedInternal,
    Public,
}

/// One step of a [`MemberPath`]
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PathSegment {
    pub kind: DeclarationKind,
    pub name: String,
    /// Index among siblings with the same kind and name (`impl Foo` twice)
    pub ordinal: usize,
}

/// Version-independent address of a declaration inside one file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MemberPath {
    pub segments: Vec<PathSegment>,
}

impl MemberPath {
    pub fn child(&self, kind: DeclarationKind, name: impl Into<String>, ordinal: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment {
            kind,
            name: name.into(),
            ordinal,
        });
        Self { segments }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn leaf_name(&self) -> Option<&str> {
        self.segments.last().map(|s| s.name.as_str())
    }
}

impl fmt::Display for MemberPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            write!(f, "{} {}", segment.kind.as_str(), segment.name)?;
            if segment.ordinal > 0 {
                write!(f, "#{}", segment.ordinal)?;
            }
        }
        Ok(())
    }
}

/// A declaration found in the tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Declaration {
    pub kind: DeclarationKind,
    pub name: String,
    pub range: TextRange,
    /// Body of function-like declarations
    pub body: Option<TextRange>,
    pub accessibility: Accessibility,
    /// Index of the enclosing declaration in [`crate::SyntaxTree::declarations`]
    pub parent: Option<usize>,
    pub path: MemberPath,
}

/// The type a changed member belongs to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSymbol {
    pub name: String,
    pub kind: DeclarationKind,
    /// `None` when the type is declared in another file
    pub accessibility: Option<Accessibility>,
}

/// Accessibility-classified declaration enclosing an edit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedSymbol {
    pub name: String,
    pub kind: DeclarationKind,
    pub accessibility: Accessibility,
    pub container: Option<ContainerSymbol>,
}

impl ChangedSymbol {
    pub fn is_member(&self) -> bool {
        self.container.is_some()
    }
}
