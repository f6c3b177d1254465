//! Per-scope analysis state threaded through the analyzer.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexSet;
use metadata::catalog::{Catalog, CatalogError, TableDesc};
use parking_lot::RwLock;

use crate::query_block::ParseTree;

/// [`QueryContext`] carries the mutable state of one analysis scope: the
/// alias map, the set of input tables, and the aggregation flag. Every scope
/// (top-level statement, each operand of a set operation) gets its own
/// context; operand contexts are merged back into the parent.
pub struct QueryContext {
    /// Shared catalog handle used for table lookups.
    catalog: Arc<RwLock<Catalog>>,
    /// Maps the effective (in-scope) name of a table to its actual name.
    alias_to_actual: HashMap<String, String>,
    /// Effective names of all tables the scope reads from, in FROM order.
    input_tables: IndexSet<String>,
    /// Planner hints filled in by [`QueryContext::make_hints`].
    hints: QueryHints,
    /// Set when the scope contains an aggregate function call.
    aggregation: bool,
}

/// Hints handed to the plan generator after analysis. The analyzer writes
/// them through [`QueryContext::make_hints`] and never reads them back.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryHints {
    pub scan_tables: Vec<String>,
    pub aggregation: bool,
}

impl QueryContext {
    pub fn new(catalog: Arc<RwLock<Catalog>>) -> Self {
        QueryContext {
            catalog,
            alias_to_actual: HashMap::new(),
            input_tables: IndexSet::new(),
            hints: QueryHints::default(),
            aggregation: false,
        }
    }

    /// Records that the table `actual` is addressed as `effective` in this
    /// scope and adds `effective` to the input tables. Unaliased tables are
    /// recorded with an identity mapping.
    pub fn rename_table(&mut self, actual: &str, effective: &str) {
        self.alias_to_actual
            .insert(effective.into(), actual.into());
        self.input_tables.insert(effective.into());
    }

    /// Resolves an effective table name back to its actual name. A name with
    /// no recorded mapping resolves to itself.
    pub fn get_actual_table_name(&self, effective: &str) -> String {
        self.alias_to_actual
            .get(effective)
            .cloned()
            .unwrap_or_else(|| effective.to_string())
    }

    /// Looks `name` up in the catalog, resolving aliases first.
    pub fn get_table(&self, name: &str) -> Result<TableDesc, CatalogError> {
        let actual = self.get_actual_table_name(name);
        self.catalog.read().get_table(&actual)
    }

    /// Effective names of all input tables, in FROM order.
    pub fn input_tables(&self) -> impl Iterator<Item = &String> {
        self.input_tables.iter()
    }

    pub fn input_table_count(&self) -> usize {
        self.input_tables.len()
    }

    pub fn set_aggregation(&mut self) {
        self.aggregation = true;
    }

    pub fn has_aggregation(&self) -> bool {
        self.aggregation
    }

    /// Absorbs the state of a sub-scope: alias maps and input tables are
    /// unioned, the aggregation flags or-ed.
    pub fn merge_context(&mut self, child: QueryContext) {
        self.alias_to_actual.extend(child.alias_to_actual);
        for table in child.input_tables {
            self.input_tables.insert(table);
        }
        self.aggregation |= child.aggregation;
    }

    /// Post-analysis hook deriving planner hints from the finished scope.
    pub fn make_hints(&mut self, tree: Option<&ParseTree>) {
        self.hints.scan_tables = self.input_tables.iter().cloned().collect();
        self.hints.aggregation = match tree {
            Some(ParseTree::Select(block)) => block.aggregation,
            _ => self.aggregation,
        };
    }

    pub fn hints(&self) -> &QueryHints {
        &self.hints
    }
}
