//! The resolved statement model produced by the analyzer and consumed by
//! the plan generator.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

use metadata::catalog::{Column, Schema, TableDesc};

use crate::ast::NodeKind;
use crate::eval::EvalNode;

/// Key/value options attached to CREATE TABLE and CREATE INDEX statements.
pub type Options = HashMap<String, String>;

/// Root of the resolved statement tree.
#[derive(Debug, Clone, PartialEq)]
pub enum ParseTree {
    Select(QueryBlock),
    Set(SetStmt),
    CreateTable(CreateTableStmt),
    CreateIndex(CreateIndexStmt),
}

/// Statement classification of a top-level syntax tree node.
///
/// Statements beyond the analyzed subset are classified here so callers can
/// route them, even though their analysis lives elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatementKind {
    Store,
    Select,
    Union,
    Except,
    Intersect,
    Insert,
    CreateIndex,
    CreateTable,
    DropTable,
    ShowTables,
    DescTable,
    ShowFunction,
}

impl StatementKind {
    pub fn classify(kind: NodeKind) -> Option<StatementKind> {
        match kind {
            NodeKind::Store => Some(StatementKind::Store),
            NodeKind::Select => Some(StatementKind::Select),
            NodeKind::Union => Some(StatementKind::Union),
            NodeKind::Except => Some(StatementKind::Except),
            NodeKind::Intersect => Some(StatementKind::Intersect),
            NodeKind::Insert => Some(StatementKind::Insert),
            NodeKind::CreateIndex => Some(StatementKind::CreateIndex),
            NodeKind::CreateTable => Some(StatementKind::CreateTable),
            NodeKind::DropTable => Some(StatementKind::DropTable),
            NodeKind::ShowTables => Some(StatementKind::ShowTables),
            NodeKind::DescTable => Some(StatementKind::DescTable),
            NodeKind::ShowFunction => Some(StatementKind::ShowFunction),
            _ => None,
        }
    }
}

/// A single resolved SELECT scope.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryBlock {
    pub from_tables: Vec<FromTable>,
    pub join_clause: Option<JoinClause>,
    pub where_cond: Option<EvalNode>,
    pub group_by: Option<GroupByClause>,
    pub having: Option<EvalNode>,
    pub sort_specs: Vec<SortSpec>,
    pub targets: Option<Vec<Target>>,
    pub project_all: bool,
    pub distinct: bool,
    /// Set when at least one aggregate function call occurs in the targets
    /// or the HAVING condition.
    pub aggregation: bool,
}

impl QueryBlock {
    pub fn new() -> Self {
        QueryBlock::default()
    }

    pub fn set_aggregation(&mut self) {
        self.aggregation = true;
    }
}

/// A relation of the FROM clause, optionally aliased.
#[derive(Debug, Clone, PartialEq)]
pub struct FromTable {
    pub desc: TableDesc,
    pub alias: Option<String>,
}

impl FromTable {
    /// Name this table is addressed by inside the query scope.
    pub fn effective_name(&self) -> &str {
        self.alias.as_deref().unwrap_or_else(|| self.desc.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Natural,
    Inner,
    LeftOuter,
    RightOuter,
    Cross,
}

/// A left-deep explicit join tree.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub left: FromTable,
    pub right: JoinOperand,
    pub qualifier: Option<JoinQualifier>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinOperand {
    Table(FromTable),
    Join(Box<JoinClause>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum JoinQualifier {
    On(EvalNode),
    Using(Vec<Column>),
}

/// One projected expression of the select list.
#[derive(Debug, Clone, PartialEq)]
pub struct Target {
    pub expr: EvalNode,
    pub index: usize,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    GroupBy,
    Cube,
    Rollup,
}

/// One grouping set of the GROUP BY clause.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupElement {
    pub kind: GroupKind,
    pub columns: Vec<Column>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByClause {
    pub empty_grouping_set: bool,
    pub groups: Vec<GroupElement>,
}

/// One key of an ORDER BY clause or index definition.
/// Sort order defaults to ascending with nulls last.
#[derive(Debug, Clone, PartialEq)]
pub struct SortSpec {
    pub column: Column,
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortSpec {
    pub fn new(column: Column) -> Self {
        SortSpec {
            column,
            descending: false,
            nulls_first: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetKind {
    Union,
    Intersect,
    Except,
}

/// A resolved set operation over two statements.
#[derive(Debug, Clone, PartialEq)]
pub struct SetStmt {
    pub kind: SetKind,
    pub left: Box<ParseTree>,
    pub right: Box<ParseTree>,
    pub distinct: bool,
}

/// A resolved CREATE TABLE statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateTableStmt {
    pub name: String,
    pub body: CreateTableBody,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CreateTableBody {
    /// Explicit column definitions plus the backing store description.
    Definition {
        schema: Schema,
        store_kind: StoreKind,
        path: PathBuf,
        options: Option<Options>,
    },
    /// `CREATE TABLE .. AS SELECT ..`
    AsSelect(Box<QueryBlock>),
}

/// Backing store of a created table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Mem,
    Csv,
    Raw,
    RowFile,
}

impl StoreKind {
    /// Parses the store-type token, case-insensitively.
    pub fn from_token(token: &str) -> Option<StoreKind> {
        match token.to_ascii_lowercase().as_str() {
            "mem" => Some(StoreKind::Mem),
            "csv" => Some(StoreKind::Csv),
            "raw" => Some(StoreKind::Raw),
            "rowfile" => Some(StoreKind::RowFile),
            _ => None,
        }
    }
}

impl fmt::Display for StoreKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StoreKind::Mem => write!(f, "MEM"),
            StoreKind::Csv => write!(f, "CSV"),
            StoreKind::Raw => write!(f, "RAW"),
            StoreKind::RowFile => write!(f, "ROWFILE"),
        }
    }
}

/// A resolved CREATE INDEX statement.
#[derive(Debug, Clone, PartialEq)]
pub struct CreateIndexStmt {
    pub name: String,
    pub unique: bool,
    pub table: String,
    pub sort_specs: Vec<SortSpec>,
    pub method: Option<IndexMethod>,
    pub params: Option<Options>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexMethod {
    TwoLevelBinTree,
    Btree,
    Hash,
    Bitmap,
}
