use std::sync::Arc;

use metadata::catalog::Catalog;
use parking_lot::RwLock;

pub mod analyzer;
pub mod ast;
pub mod context;
pub mod eval;
pub mod query_block;

pub use analyzer::{AnalyzerError, QueryAnalyzer};

use ast::AstNode;
use context::QueryContext;
use query_block::ParseTree;

/// Analyzes a single parser-produced statement tree against `catalog`.
///
/// Returns the resolved tree for statements of the analyzed subset and
/// `None` for recognized statements whose analysis happens elsewhere.
pub fn analyze_statement(
    ast: &AstNode,
    catalog: Arc<RwLock<Catalog>>,
) -> Result<Option<ParseTree>, AnalyzerError> {
    let analyzer = QueryAnalyzer::new(catalog.clone());
    let mut ctx = QueryContext::new(catalog);
    analyzer.analyze(&mut ctx, ast)
}
