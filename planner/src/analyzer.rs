use std::{path::PathBuf, sync::Arc};

use log::debug;
use metadata::{
    catalog::{Catalog, CatalogError, Column, Schema, TableDesc},
    functions::{FuncType, FunctionDesc, canonical_signature},
};
use parking_lot::RwLock;
use thiserror::Error;
use types::{data::Datum, schema::Type};

use crate::{
    ast::{AstNode, NodeKind},
    context::QueryContext,
    eval::{BinaryOp, EvalNode},
    query_block::{
        CreateIndexStmt, CreateTableBody, CreateTableStmt, FromTable, GroupByClause, GroupElement,
        GroupKind, IndexMethod, JoinClause, JoinKind, JoinOperand, JoinQualifier, Options,
        ParseTree, QueryBlock, SetKind, SetStmt, SortSpec, StatementKind, StoreKind, Target,
    },
};

/// Error for [`QueryAnalyzer`] related operations.
#[derive(Debug, Error)]
pub enum AnalyzerError {
    #[error("syntax error: {message}")]
    Syntax { message: String },
    #[error("not supported query: {message}")]
    NotSupported { message: String },
    #[error("invalid query: {message}")]
    InvalidQuery { message: String },
    #[error("column '{column}' appears in more than one input table")]
    AmbiguousField { column: String },
    #[error("undefined function: {signature}")]
    UndefinedFunction { signature: String },
    #[error("invalid eval expression: {message}")]
    InvalidEval { message: String },
    #[error("catalog failed during analysis: {0}")]
    UnexpectedCatalogError(#[from] CatalogError),
}

fn invalid_query(message: impl Into<String>) -> AnalyzerError {
    AnalyzerError::InvalidQuery {
        message: message.into(),
    }
}

fn bad_shape(ast: &AstNode) -> AnalyzerError {
    invalid_query(format!("malformed syntax tree: {}", ast.dump()))
}

/// [`QueryAnalyzer`] transforms a statement syntax tree into a [`ParseTree`].
///
/// Name and type resolution runs against the shared catalog; all scope state
/// lives in the [`QueryContext`] passed through every method, so independent
/// analyses may run concurrently against the same catalog.
pub struct QueryAnalyzer {
    catalog: Arc<RwLock<Catalog>>,
}

impl QueryAnalyzer {
    pub fn new(catalog: Arc<RwLock<Catalog>>) -> Self {
        QueryAnalyzer { catalog }
    }

    /// Analyzes a top-level statement.
    ///
    /// Statements of the analyzed subset produce `Some(ParseTree)`; other
    /// recognized statement kinds are classified only and produce `None`.
    /// An unrecognized root kind is an error.
    pub fn analyze(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
    ) -> Result<Option<ParseTree>, AnalyzerError> {
        debug!("analyzing statement: {}", ast.dump());

        let kind = StatementKind::classify(ast.kind)
            .ok_or_else(|| invalid_query(format!("unknown statement: {}", ast.dump())))?;

        let tree = match kind {
            StatementKind::Select => {
                Some(ParseTree::Select(self.parse_select_statement(ctx, ast)?))
            }
            StatementKind::Union | StatementKind::Except | StatementKind::Intersect => {
                Some(ParseTree::Set(self.parse_set_statement(ctx, ast)?))
            }
            StatementKind::CreateIndex => Some(ParseTree::CreateIndex(
                self.parse_index_statement(ctx, ast)?,
            )),
            StatementKind::CreateTable => Some(ParseTree::CreateTable(
                self.parse_create_statement(ctx, ast)?,
            )),
            // Classified for the caller; their analysis happens elsewhere.
            StatementKind::Store
            | StatementKind::Insert
            | StatementKind::DropTable
            | StatementKind::ShowTables
            | StatementKind::DescTable
            | StatementKind::ShowFunction => None,
        };

        ctx.make_hints(tree.as_ref());
        Ok(tree)
    }

    /// Analyzes a SELECT statement.
    ///
    /// FROM is handled first regardless of where it appears among the
    /// children: it populates the input tables every other clause resolves
    /// its columns against. The remaining clauses follow in AST order.
    fn parse_select_statement(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
    ) -> Result<QueryBlock, AnalyzerError> {
        let mut block = QueryBlock::new();

        for node in &ast.children {
            if node.kind == NodeKind::From {
                self.parse_from_clause(ctx, &mut block, node)?;
            }
        }

        for node in &ast.children {
            match node.kind {
                NodeKind::From => {}
                NodeKind::SetQualifier => {
                    if node.child_kind(0) == Some(NodeKind::Distinct) {
                        block.distinct = true;
                    }
                }
                NodeKind::SelList => self.parse_select_list(ctx, &mut block, node)?,
                NodeKind::Where => {
                    let cond = node.child(0).ok_or_else(|| bad_shape(node))?;
                    let eval = self.create_eval_tree(ctx, cond, &mut block)?;
                    block.where_cond = Some(eval);
                }
                NodeKind::GroupBy => self.parse_group_by_clause(ctx, &mut block, node)?,
                NodeKind::Having => {
                    let cond = node.child(0).ok_or_else(|| bad_shape(node))?;
                    let eval = self.create_eval_tree(ctx, cond, &mut block)?;
                    block.having = Some(eval);
                }
                NodeKind::OrderBy => {
                    let specs = node.child(0).ok_or_else(|| bad_shape(node))?;
                    block.sort_specs = self.parse_sort_specifiers(ctx, specs)?;
                }
                _ => {}
            }
        }

        Ok(block)
    }

    /// Analyzes a UNION/INTERSECT/EXCEPT statement. Both operands get a
    /// fresh context; the parent context absorbs both afterwards.
    fn parse_set_statement(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
    ) -> Result<SetStmt, AnalyzerError> {
        let kind = match ast.kind {
            NodeKind::Union => SetKind::Union,
            NodeKind::Except => SetKind::Except,
            NodeKind::Intersect => SetKind::Intersect,
            _ => return Err(invalid_query(format!("illegal syntax tree: {}", ast.dump()))),
        };

        let mut idx = 0;
        let mut left_ctx = QueryContext::new(self.catalog.clone());
        let left_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let left = self
            .analyze(&mut left_ctx, left_ast)?
            .ok_or_else(|| bad_shape(left_ast))?;
        idx += 1;

        // The distinct flag follows the planner's historical convention:
        // ALL sets it, DISTINCT clears it.
        let mut distinct = true;
        match ast.child_kind(idx) {
            Some(NodeKind::All) => {
                distinct = true;
                idx += 1;
            }
            Some(NodeKind::Distinct) => {
                distinct = false;
                idx += 1;
            }
            _ => {}
        }

        let mut right_ctx = QueryContext::new(self.catalog.clone());
        let right_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let right = self
            .analyze(&mut right_ctx, right_ast)?
            .ok_or_else(|| bad_shape(right_ast))?;

        ctx.merge_context(left_ctx);
        ctx.merge_context(right_ctx);

        Ok(SetStmt {
            kind,
            left: Box::new(left),
            right: Box::new(right),
            distinct,
        })
    }

    /// Analyzes a FROM clause: either a single explicit join tree or a list
    /// of (possibly aliased) table references.
    fn parse_from_clause(
        &self,
        ctx: &mut QueryContext,
        block: &mut QueryBlock,
        ast: &AstNode,
    ) -> Result<(), AnalyzerError> {
        if ast.child_kind(0) == Some(NodeKind::Join) {
            let join = ast.child(0).ok_or_else(|| bad_shape(ast))?;
            block.join_clause = Some(self.parse_explicit_join_clause(ctx, block, join)?);
            return Ok(());
        }

        for node in &ast.children {
            if node.kind == NodeKind::Table {
                let table = self.parse_table(ctx, node)?;
                ctx.rename_table(table.desc.id(), table.effective_name());
                block.from_tables.push(table);
            }
        }
        Ok(())
    }

    /// Builds the left-deep join tree of an explicit join. The right operand
    /// is either a nested join (recursion) or a table, which also lands in
    /// the block's from-table list.
    fn parse_explicit_join_clause(
        &self,
        ctx: &mut QueryContext,
        block: &mut QueryBlock,
        ast: &AstNode,
    ) -> Result<JoinClause, AnalyzerError> {
        let mut idx = 0;
        let type_node = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let kind = match type_node.kind {
            NodeKind::NaturalJoin => JoinKind::Natural,
            NodeKind::InnerJoin => JoinKind::Inner,
            NodeKind::CrossJoin => JoinKind::Cross,
            NodeKind::OuterJoin => match type_node.child_kind(0) {
                Some(NodeKind::Left) => JoinKind::LeftOuter,
                Some(NodeKind::Right) => JoinKind::RightOuter,
                _ => return Err(bad_shape(type_node)),
            },
            _ => return Err(bad_shape(type_node)),
        };
        idx += 1;

        let left_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let left = self.parse_table(ctx, left_ast)?;
        ctx.rename_table(left.desc.id(), left.effective_name());
        idx += 1;

        let right_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let right = if right_ast.kind == NodeKind::Join {
            JoinOperand::Join(Box::new(
                self.parse_explicit_join_clause(ctx, block, right_ast)?,
            ))
        } else {
            let table = self.parse_table(ctx, right_ast)?;
            ctx.rename_table(table.desc.id(), table.effective_name());
            block.from_tables.push(table.clone());
            JoinOperand::Table(table)
        };
        idx += 1;

        let qualifier = match ast.child(idx) {
            None => None,
            Some(qual) => {
                if matches!(kind, JoinKind::Natural | JoinKind::Cross) {
                    return Err(invalid_query(
                        "cross or natural join cannot have join conditions",
                    ));
                }
                match qual.kind {
                    NodeKind::On => {
                        let cond = qual.child(0).ok_or_else(|| bad_shape(qual))?;
                        Some(JoinQualifier::On(self.create_eval_tree(ctx, cond, block)?))
                    }
                    NodeKind::Using => Some(JoinQualifier::Using(
                        self.parse_join_columns(ctx, qual)?,
                    )),
                    _ => None,
                }
            }
        };

        Ok(JoinClause {
            kind,
            left,
            right,
            qualifier,
        })
    }

    fn parse_join_columns(
        &self,
        ctx: &QueryContext,
        ast: &AstNode,
    ) -> Result<Vec<Column>, AnalyzerError> {
        ast.children
            .iter()
            .map(|node| self.check_and_get_column_by_ast(ctx, node))
            .collect()
    }

    /// Resolves a list of field-name children into columns.
    fn parse_column_references(
        &self,
        ctx: &QueryContext,
        ast: &AstNode,
    ) -> Result<Vec<Column>, AnalyzerError> {
        ast.children
            .iter()
            .map(|node| self.check_and_get_column_by_ast(ctx, node))
            .collect()
    }

    /// Resolves a table reference `table (AS alias)?` against the catalog.
    fn parse_table(
        &self,
        ctx: &QueryContext,
        table_ast: &AstNode,
    ) -> Result<FromTable, AnalyzerError> {
        let name_node = table_ast.child(0).ok_or_else(|| bad_shape(table_ast))?;
        let desc = self.check_and_get_table_by_name(ctx, &name_node.text)?;
        let alias = table_ast.child(1).map(|node| node.text.clone());
        Ok(FromTable { desc, alias })
    }

    /// Analyzes the select list. `*` projects everything and allocates no
    /// targets; otherwise each derived column yields a positional target,
    /// with the alias taken from the first child of the node's last child.
    fn parse_select_list(
        &self,
        ctx: &mut QueryContext,
        block: &mut QueryBlock,
        ast: &AstNode,
    ) -> Result<(), AnalyzerError> {
        if ast.child_kind(0) == Some(NodeKind::All) {
            block.project_all = true;
            return Ok(());
        }

        let mut targets = Vec::with_capacity(ast.child_count());
        for (index, node) in ast.children.iter().enumerate() {
            let expr = self.create_eval_tree(ctx, node, block)?;
            let mut alias = None;
            if node.child_count() > 1
                && let Some(alias_node) = node.children.last()
                && let Some(name) = alias_node.child(0)
            {
                alias = Some(name.text.clone());
            }
            targets.push(Target { expr, index, alias });
        }
        block.targets = Some(targets);
        Ok(())
    }

    /// Analyzes the GROUP BY clause. Loose field references accumulate into
    /// one trailing GROUPBY element; CUBE and ROLLUP keep their own elements.
    fn parse_group_by_clause(
        &self,
        ctx: &mut QueryContext,
        block: &mut QueryBlock,
        ast: &AstNode,
    ) -> Result<(), AnalyzerError> {
        let mut clause = GroupByClause::default();

        if ast.child_kind(0) == Some(NodeKind::EmptyGroupingSet) {
            clause.empty_grouping_set = true;
        } else {
            let mut column_refs = Vec::new();
            for group in &ast.children {
                match group.kind {
                    NodeKind::Cube => clause.groups.push(GroupElement {
                        kind: GroupKind::Cube,
                        columns: self.parse_column_references(ctx, group)?,
                    }),
                    NodeKind::Rollup => clause.groups.push(GroupElement {
                        kind: GroupKind::Rollup,
                        columns: self.parse_column_references(ctx, group)?,
                    }),
                    NodeKind::FieldName => {
                        column_refs.push(self.check_and_get_column_by_ast(ctx, group)?);
                    }
                    _ => {}
                }
            }
            if !column_refs.is_empty() {
                clause.groups.push(GroupElement {
                    kind: GroupKind::GroupBy,
                    columns: column_refs,
                });
            }
        }

        block.group_by = Some(clause);
        Ok(())
    }

    /// Analyzes a CREATE INDEX statement. The optional UNIQUE, USING and
    /// params children precede the index name and table; they are detected
    /// by kind.
    fn parse_index_statement(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
    ) -> Result<CreateIndexStmt, AnalyzerError> {
        let mut idx = 0;

        let mut unique = false;
        if ast.child_kind(idx) == Some(NodeKind::Unique) {
            unique = true;
            idx += 1;
        }

        let mut method = None;
        if ast.child_kind(idx) == Some(NodeKind::Using) {
            let node = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
            method = Some(Self::index_method_from_token(&node.text)?);
            idx += 1;
        }

        let mut params = None;
        if ast.child_kind(idx) == Some(NodeKind::Params) {
            let node = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
            params = Some(Self::parse_params(node)?);
            idx += 1;
        }

        let name = ast.child(idx).ok_or_else(|| bad_shape(ast))?.text.clone();
        idx += 1;
        let table = ast.child(idx).ok_or_else(|| bad_shape(ast))?.text.clone();
        idx += 1;
        ctx.rename_table(&table, &table);

        let specs_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let sort_specs = self.parse_sort_specifiers(ctx, specs_ast)?;

        Ok(CreateIndexStmt {
            name,
            unique,
            table,
            sort_specs,
            method,
            params,
        })
    }

    fn index_method_from_token(token: &str) -> Result<IndexMethod, AnalyzerError> {
        match token {
            "bst" => Ok(IndexMethod::TwoLevelBinTree),
            "btree" => Ok(IndexMethod::Btree),
            "hash" => Ok(IndexMethod::Hash),
            "bitmap" => Ok(IndexMethod::Bitmap),
            other => Err(AnalyzerError::Syntax {
                message: format!("unknown index method: {other}"),
            }),
        }
    }

    /// Analyzes a CREATE TABLE statement, either the definition form with an
    /// explicit schema and store description or the `AS SELECT` form.
    fn parse_create_statement(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
    ) -> Result<CreateTableStmt, AnalyzerError> {
        let name = ast.child(0).ok_or_else(|| bad_shape(ast))?.text.clone();
        let body_node = ast.child(1).ok_or_else(|| bad_shape(ast))?;

        let body = match body_node.kind {
            NodeKind::TableDef => {
                let schema = Self::parse_create_table_def(&name, body_node)?;
                let store_node = ast.child(2).ok_or_else(|| bad_shape(ast))?;
                let store_kind = StoreKind::from_token(&store_node.text).ok_or_else(|| {
                    invalid_query(format!("unknown store type: {}", store_node.text))
                })?;
                let path_node = ast.child(3).ok_or_else(|| bad_shape(ast))?;
                let mut options = None;
                if let Some(params) = ast.child(4)
                    && params.kind == NodeKind::Params
                {
                    options = Some(Self::parse_params(params)?);
                }
                CreateTableBody::Definition {
                    schema,
                    store_kind,
                    path: PathBuf::from(&path_node.text),
                    options,
                }
            }
            NodeKind::Select => {
                let block = self.parse_select_statement(ctx, body_node)?;
                CreateTableBody::AsSelect(Box::new(block))
            }
            _ => {
                return Err(AnalyzerError::NotSupported {
                    message: format!("unrecognized create table body: {}", body_node.dump()),
                });
            }
        };

        Ok(CreateTableStmt { name, body })
    }

    /// Builds the schema of a definition-form CREATE TABLE. Columns are
    /// qualified with the new table's name.
    fn parse_create_table_def(table_name: &str, ast: &AstNode) -> Result<Schema, AnalyzerError> {
        let mut schema = Schema::new();
        for column_def in &ast.children {
            let name_node = column_def.child(0).ok_or_else(|| bad_shape(column_def))?;
            let type_node = column_def.child(1).ok_or_else(|| bad_shape(column_def))?;
            let ty = match type_node.kind {
                NodeKind::Bool => Type::Bool,
                NodeKind::Byte => Type::Byte,
                NodeKind::Int => Type::Int,
                NodeKind::Long => Type::Long,
                NodeKind::Float => Type::Float,
                NodeKind::Double => Type::Double,
                NodeKind::Text => Type::String,
                NodeKind::Bytes => Type::Bytes,
                NodeKind::Ipv4 => Type::Ipv4,
                _ => return Err(invalid_query(ast.dump())),
            };
            schema
                .add_column(Column::new(table_name, &name_node.text, ty))
                .map_err(|e| invalid_query(e.to_string()))?;
        }
        Ok(schema)
    }

    /// Parses a params clause into a key/value map.
    fn parse_params(ast: &AstNode) -> Result<Options, AnalyzerError> {
        let mut params = Options::new();
        for param in &ast.children {
            let key = param.child(0).ok_or_else(|| bad_shape(param))?;
            let value = param.child(1).ok_or_else(|| bad_shape(param))?;
            params.insert(key.text.clone(), value.text.clone());
        }
        Ok(params)
    }

    /// Parses a sort-specifier list. Every key defaults to ascending order
    /// with nulls last; ORDER and NULL_ORDER children override per key.
    fn parse_sort_specifiers(
        &self,
        ctx: &QueryContext,
        ast: &AstNode,
    ) -> Result<Vec<SortSpec>, AnalyzerError> {
        let mut sort_specs = Vec::with_capacity(ast.child_count());
        for node in &ast.children {
            let field = node.child(0).ok_or_else(|| bad_shape(node))?;
            let column = self.check_and_get_column_by_ast(ctx, field)?;
            let mut spec = SortSpec::new(column);
            for child in node.children.iter().skip(1) {
                match child.kind {
                    NodeKind::Order => {
                        if child.child_kind(0) == Some(NodeKind::Desc) {
                            spec.descending = true;
                        }
                    }
                    NodeKind::NullOrder => {
                        if child.child_kind(0) == Some(NodeKind::First) {
                            spec.nulls_first = true;
                        }
                    }
                    _ => {}
                }
            }
            sort_specs.push(spec);
        }
        Ok(sort_specs)
    }

    /// Converts an expression subtree into an [`EvalNode`].
    fn create_eval_tree(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
    ) -> Result<EvalNode, AnalyzerError> {
        match ast.kind {
            NodeKind::Digit => Self::const_from_text(Type::Int, &ast.text),
            NodeKind::Real => Self::const_from_text(Type::Double, &ast.text),
            NodeKind::String => Ok(EvalNode::Const(Datum::Text(ast.text.clone()))),

            NodeKind::Not => {
                let child = ast.child(0).ok_or_else(|| bad_shape(ast))?;
                Ok(EvalNode::Not(Box::new(
                    self.create_eval_tree(ctx, child, block)?,
                )))
            }

            NodeKind::Like => self.parse_like(ctx, ast, block),

            NodeKind::And
            | NodeKind::Or
            | NodeKind::Equal
            | NodeKind::NotEqual
            | NodeKind::Lth
            | NodeKind::Leq
            | NodeKind::Gth
            | NodeKind::Geq
            | NodeKind::Plus
            | NodeKind::Minus
            | NodeKind::Multiply
            | NodeKind::Divide
            | NodeKind::Modular => self.parse_binary_expr(ctx, ast, block),

            NodeKind::Column => {
                let child = ast.child(0).ok_or_else(|| bad_shape(ast))?;
                self.create_eval_tree(ctx, child, block)
            }

            NodeKind::FieldName => Ok(EvalNode::Field(
                self.check_and_get_column_by_ast(ctx, ast)?,
            )),

            NodeKind::Function => {
                let signature = ast.text.clone();
                let mut args = Vec::with_capacity(ast.child_count());
                for child in &ast.children {
                    args.push(self.create_eval_tree(ctx, child, block)?);
                }
                let param_types: Vec<Type> = args.iter().map(EvalNode::value_type).collect();
                let desc = self.resolve_function(&signature, &param_types)?;
                Self::instantiate(&desc)?;
                match desc.func_type() {
                    FuncType::General => Ok(EvalNode::FuncCall { desc, args }),
                    FuncType::Agg => {
                        block.set_aggregation();
                        ctx.set_aggregation();
                        Ok(EvalNode::AggFuncCall { desc, args })
                    }
                }
            }

            NodeKind::CountVal => {
                let child = ast.child(0).ok_or_else(|| bad_shape(ast))?;
                let col_ref = self.create_eval_tree(ctx, child, block)?;
                let desc = self.resolve_function("count", &[Type::Any])?;
                Self::instantiate(&desc)?;
                block.set_aggregation();
                ctx.set_aggregation();
                Ok(EvalNode::AggFuncCall {
                    desc,
                    args: vec![col_ref],
                })
            }

            NodeKind::CountRows => {
                let desc = self.resolve_function("count", &[])?;
                Self::instantiate(&desc)?;
                block.set_aggregation();
                ctx.set_aggregation();
                Ok(EvalNode::AggFuncCall { desc, args: vec![] })
            }

            NodeKind::Case => self.parse_case_when(ctx, ast, block),

            _ => Err(invalid_query(format!(
                "unsupported expression: {}",
                ast.dump()
            ))),
        }
    }

    fn const_from_text(ty: Type, text: &str) -> Result<EvalNode, AnalyzerError> {
        Datum::parse(ty, text)
            .map(EvalNode::Const)
            .map_err(|e| invalid_query(e.to_string()))
    }

    fn resolve_function(
        &self,
        signature: &str,
        param_types: &[Type],
    ) -> Result<FunctionDesc, AnalyzerError> {
        let catalog = self.catalog.read();
        if !catalog.contains_function(signature, param_types) {
            return Err(AnalyzerError::UndefinedFunction {
                signature: canonical_signature(signature, param_types),
            });
        }
        catalog
            .get_function(signature, param_types)
            .map_err(AnalyzerError::UnexpectedCatalogError)
    }

    /// Verifies the descriptor can be bound. A descriptor that cannot be
    /// instantiated must never reach the resolved tree.
    fn instantiate(desc: &FunctionDesc) -> Result<(), AnalyzerError> {
        desc.new_instance().map(|_| ()).map_err(|e| {
            invalid_query(format!(
                "cannot instantiate function {}: {e}",
                desc.canonical_name()
            ))
        })
    }

    /// Parses a searched CASE expression: WHEN children in order, then an
    /// optional ELSE. Zero WHEN branches is valid.
    fn parse_case_when(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
    ) -> Result<EvalNode, AnalyzerError> {
        let mut whens = Vec::new();
        let mut idx = 0;
        while let Some(when) = ast.child(idx) {
            if when.kind != NodeKind::When {
                break;
            }
            let cond_ast = when.child(0).ok_or_else(|| bad_shape(when))?;
            let result_ast = when.child(1).ok_or_else(|| bad_shape(when))?;
            let cond = self.create_eval_tree(ctx, cond_ast, block)?;
            let result = self.create_eval_tree(ctx, result_ast, block)?;
            whens.push((cond, result));
            idx += 1;
        }

        let mut else_result = None;
        if let Some(node) = ast.child(idx)
            && node.kind == NodeKind::Else
        {
            let else_ast = node.child(0).ok_or_else(|| bad_shape(node))?;
            else_result = Some(Box::new(self.create_eval_tree(ctx, else_ast, block)?));
        }

        Ok(EvalNode::CaseWhen { whens, else_result })
    }

    /// Parses `fieldName NOT? LIKE pattern`. The left operand must resolve
    /// to a field reference and the pattern must be a string constant.
    fn parse_like(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
    ) -> Result<EvalNode, AnalyzerError> {
        let mut idx = 0;
        let mut not = false;
        if ast.child_kind(idx) == Some(NodeKind::Not) {
            not = true;
            idx += 1;
        }

        let field_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let field = match self.create_eval_tree(ctx, field_ast, block)? {
            EvalNode::Field(column) => column,
            _ => {
                return Err(AnalyzerError::InvalidEval {
                    message: "left operand of LIKE must be a field reference".into(),
                });
            }
        };
        idx += 1;

        let pattern_ast = ast.child(idx).ok_or_else(|| bad_shape(ast))?;
        let pattern = match self.create_eval_tree(ctx, pattern_ast, block)? {
            EvalNode::Const(datum @ Datum::Text(_)) => datum,
            _ => {
                return Err(AnalyzerError::InvalidEval {
                    message: "pattern of LIKE must be a string constant".into(),
                });
            }
        };

        Ok(EvalNode::Like { not, field, pattern })
    }

    /// Builds a binary expression. When exactly one operand is a literal and
    /// the other a plain field reference, the literal's datum type is
    /// inferred from the field's value type; operand order is preserved.
    fn parse_binary_expr(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
    ) -> Result<EvalNode, AnalyzerError> {
        let op = BinaryOp::from_node_kind(ast.kind).ok_or_else(|| bad_shape(ast))?;
        let lhs_ast = ast.child(0).ok_or_else(|| bad_shape(ast))?;
        let rhs_ast = ast.child(1).ok_or_else(|| bad_shape(ast))?;
        let operands = [lhs_ast, rhs_ast];

        let mut const_id = None;
        let mut field_id = None;
        for (i, child) in operands.iter().enumerate() {
            if Self::is_constant(child.kind) {
                const_id = Some(i);
            } else if child.kind == NodeKind::FieldName {
                field_id = Some(i);
            }
        }

        let (lhs, rhs) = if let (Some(const_id), Some(field_id)) = (const_id, field_id) {
            let field = self.create_eval_tree(ctx, operands[field_id], block)?;
            let field_type = field.value_type();
            let const_ast = operands[const_id];
            let constant = match const_ast.kind {
                NodeKind::Digit => {
                    self.parse_digit_by_type_infer(ctx, const_ast, block, field_type)?
                }
                NodeKind::Real => {
                    self.parse_real_by_type_infer(ctx, const_ast, block, field_type)?
                }
                NodeKind::String => {
                    self.parse_string_by_type_infer(ctx, const_ast, block, field_type)?
                }
                _ => {
                    return Err(AnalyzerError::InvalidEval {
                        message: format!(
                            "operand is neither a literal nor a field: {}",
                            const_ast.dump()
                        ),
                    });
                }
            };
            if const_id == 0 {
                (constant, field)
            } else {
                (field, constant)
            }
        } else {
            (
                self.create_eval_tree(ctx, lhs_ast, block)?,
                self.create_eval_tree(ctx, rhs_ast, block)?,
            )
        };

        Ok(EvalNode::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        })
    }

    fn is_constant(kind: NodeKind) -> bool {
        matches!(kind, NodeKind::Digit | NodeKind::Real | NodeKind::String)
    }

    fn parse_digit_by_type_infer(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
        ty: Type,
    ) -> Result<EvalNode, AnalyzerError> {
        match ty {
            Type::Short | Type::Int | Type::Long => Self::const_from_text(ty, &ast.text),
            _ => self.create_eval_tree(ctx, ast, block),
        }
    }

    fn parse_real_by_type_infer(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
        ty: Type,
    ) -> Result<EvalNode, AnalyzerError> {
        match ty {
            Type::Float | Type::Double => Self::const_from_text(ty, &ast.text),
            _ => self.create_eval_tree(ctx, ast, block),
        }
    }

    fn parse_string_by_type_infer(
        &self,
        ctx: &mut QueryContext,
        ast: &AstNode,
        block: &mut QueryBlock,
        ty: Type,
    ) -> Result<EvalNode, AnalyzerError> {
        match ty {
            Type::Char | Type::String => Self::const_from_text(ty, &ast.text),
            _ => self.create_eval_tree(ctx, ast, block),
        }
    }

    /// Resolves a field-name node to a column. Qualified references go
    /// through the alias map; bare references scan the scope's input tables
    /// and must match exactly one of them.
    fn check_and_get_column_by_ast(
        &self,
        ctx: &QueryContext,
        field_node: &AstNode,
    ) -> Result<Column, AnalyzerError> {
        if field_node.kind != NodeKind::FieldName {
            return Err(invalid_query(format!(
                "expected a field name: {}",
                field_node.dump()
            )));
        }
        let column_name = &field_node.child(0).ok_or_else(|| bad_shape(field_node))?.text;
        let table_name = field_node.child(1).map(|node| node.text.as_str());

        match table_name {
            Some(table) => {
                let desc = self.check_and_get_table_by_mapped_name(ctx, table)?;
                Self::check_and_get_field_by_name(&desc, column_name)
            }
            None => Self::expect_table_by_field(ctx, column_name),
        }
    }

    fn check_and_get_table_by_mapped_name(
        &self,
        ctx: &QueryContext,
        table_name: &str,
    ) -> Result<TableDesc, AnalyzerError> {
        let real_name = ctx.get_actual_table_name(table_name);
        self.check_and_get_table_by_name(ctx, &real_name)
    }

    fn check_and_get_table_by_name(
        &self,
        ctx: &QueryContext,
        table_name: &str,
    ) -> Result<TableDesc, AnalyzerError> {
        match ctx.get_table(table_name) {
            Ok(desc) => Ok(desc),
            Err(CatalogError::TableNotFound(_)) => Err(invalid_query(format!(
                "table \"{table_name}\" does not exist"
            ))),
            Err(e) => Err(AnalyzerError::UnexpectedCatalogError(e)),
        }
    }

    fn check_and_get_field_by_name(
        desc: &TableDesc,
        column_name: &str,
    ) -> Result<Column, AnalyzerError> {
        let qualified = format!("{}.{}", desc.id(), column_name);
        desc.meta()
            .schema()
            .get_column(&qualified)
            .cloned()
            .ok_or_else(|| invalid_query(format!("column \"{column_name}\" does not exist")))
    }

    /// Determines the owning table of a bare column reference by scanning
    /// the scope's input tables. Zero matches is an error, more than one is
    /// ambiguous.
    fn expect_table_by_field(
        ctx: &QueryContext,
        column_name: &str,
    ) -> Result<Column, AnalyzerError> {
        let mut found: Option<Column> = None;
        let mut count = 0;
        for table in ctx.input_tables() {
            let desc = match ctx.get_table(table) {
                Ok(desc) => desc,
                Err(CatalogError::TableNotFound(_)) => {
                    return Err(invalid_query(format!("table \"{table}\" does not exist")));
                }
                Err(e) => return Err(AnalyzerError::UnexpectedCatalogError(e)),
            };
            let qualified = format!("{table}.{column_name}");
            let schema = desc.meta().schema();
            if schema.contains(&qualified) {
                found = schema.get_column(&qualified).cloned();
                count += 1;
            }
            if count > 1 {
                return Err(AnalyzerError::AmbiguousField {
                    column: column_name.into(),
                });
            }
        }
        found.ok_or_else(|| invalid_query(format!("column \"{column_name}\" does not exist")))
    }
}
