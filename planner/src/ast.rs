//! AST module - the typed syntax tree handed to the analyzer by the parser.
//!
//! Every node carries its grammar token kind, the raw lexeme for leaves that
//! have one, and its ordered children. The analyzer never mutates the tree.

use std::fmt;

/// All grammar tokens the analyzer recognizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeKind {
    // statements
    Select,
    Union,
    Except,
    Intersect,
    Store,
    Insert,
    CreateIndex,
    CreateTable,
    DropTable,
    ShowTables,
    DescTable,
    ShowFunction,

    // clauses
    From,
    SetQualifier,
    SelList,
    Where,
    GroupBy,
    Cube,
    Rollup,
    EmptyGroupingSet,
    Having,
    OrderBy,
    SortSpecifiers,
    SortKey,
    Order,
    NullOrder,

    // clause markers
    All,
    Distinct,
    Asc,
    Desc,
    First,
    Last,
    Unique,
    Using,
    On,
    Params,
    Param,
    TableDef,
    ColumnDef,
    As,

    // tables and joins
    Table,
    Join,
    NaturalJoin,
    InnerJoin,
    OuterJoin,
    CrossJoin,
    Left,
    Right,

    // expressions
    Column,
    FieldName,
    Ident,
    Digit,
    Real,
    String,
    Not,
    Like,
    And,
    Or,
    Equal,
    NotEqual,
    Lth,
    Leq,
    Gth,
    Geq,
    Plus,
    Minus,
    Multiply,
    Divide,
    Modular,
    Function,
    CountVal,
    CountRows,
    Case,
    When,
    Else,

    // primitive type tokens of a table definition
    Bool,
    Byte,
    Int,
    Long,
    Float,
    Double,
    Text,
    Bytes,
    Ipv4,
}

/// A single node of the parser-produced syntax tree.
#[derive(Debug, Clone, PartialEq)]
pub struct AstNode {
    pub kind: NodeKind,
    pub text: String,
    pub children: Vec<AstNode>,
}

impl AstNode {
    pub fn new(kind: NodeKind) -> Self {
        AstNode {
            kind,
            text: String::new(),
            children: Vec::new(),
        }
    }

    pub fn with_text(kind: NodeKind, text: impl Into<String>) -> Self {
        AstNode {
            kind,
            text: text.into(),
            children: Vec::new(),
        }
    }

    pub fn with_children(kind: NodeKind, children: Vec<AstNode>) -> Self {
        AstNode {
            kind,
            text: String::new(),
            children,
        }
    }

    pub fn full(kind: NodeKind, text: impl Into<String>, children: Vec<AstNode>) -> Self {
        AstNode {
            kind,
            text: text.into(),
            children,
        }
    }

    /// Returns the `idx`-th child, if present.
    pub fn child(&self, idx: usize) -> Option<&AstNode> {
        self.children.get(idx)
    }

    /// Returns the kind of the `idx`-th child, if present.
    pub fn child_kind(&self, idx: usize) -> Option<NodeKind> {
        self.children.get(idx).map(|c| c.kind)
    }

    pub fn child_count(&self) -> usize {
        self.children.len()
    }

    /// Renders the subtree as an s-expression, used in diagnostics.
    pub fn dump(&self) -> String {
        format!("{self}")
    }
}

impl fmt::Display for AstNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.children.is_empty() {
            match self.text.is_empty() {
                true => write!(f, "{:?}", self.kind),
                false => write!(f, "{:?}:{}", self.kind, self.text),
            }
        } else {
            write!(f, "({:?}", self.kind)?;
            if !self.text.is_empty() {
                write!(f, ":{}", self.text)?;
            }
            for child in &self.children {
                write!(f, " {child}")?;
            }
            write!(f, ")")
        }
    }
}
