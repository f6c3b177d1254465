//! Catalog module - manages table schemas and function descriptors.

use std::{
    collections::HashMap,
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    time,
};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use types::schema::Type;

use crate::consts::METADATA_FILE_NAME;
use crate::functions::{FuncType, FunctionDesc, canonical_signature};

/// [`Catalog`] is the analyzer's name service: every table descriptor and
/// function overload of one database, held fully in memory.
///
/// Tables are backed by the JSON metadata file
/// `{MAIN_DIR}/{DATABASE_NAME}/{METADATA_FILE_NAME}` and loaded once when the
/// database comes up. Function descriptors are process-local registrations
/// and never touch the file.
#[derive(Debug)]
pub struct Catalog {
    /// Metadata file the table set was loaded from and syncs back to.
    file_path: PathBuf,
    /// All tables of the database, keyed by table name.
    tables: HashMap<String, TableDesc>,
    /// Registered overloads, keyed by signature name.
    functions: HashMap<String, Vec<FunctionDesc>>,
}

/// Error returned by [`Catalog`] operations.
#[derive(Error, Debug)]
pub enum CatalogError {
    /// Lookup of a table the catalog does not know about
    #[error("no table named '{0}' in the catalog")]
    TableNotFound(String),
    /// The chosen table name is already taken
    #[error("a table named '{0}' is already cataloged")]
    TableAlreadyExists(String),
    /// No registered overload matches the requested signature and parameter types
    #[error("no function matching '{0}'")]
    FunctionNotFound(String),
    /// An overload with identical parameter types is already registered
    #[error("function overload '{0}' is already registered")]
    FunctionAlreadyExists(String),
    /// Reading or writing the metadata file failed
    #[error("metadata file io failed: {0}")]
    IoError(#[from] io::Error),
    /// The metadata file does not hold valid JSON
    #[error("metadata file is not valid json: {0}")]
    JsonError(#[from] serde_json::Error),
    /// A table schema could not be assembled
    #[error("schema error: {0}")]
    SchemaError(#[from] SchemaError),
}

impl Catalog {
    /// Loads the catalog of database `database_name` from its metadata file
    /// under `main_dir_path`. A missing or unreadable file is an error.
    ///
    /// Every catalog starts with the built-in aggregate `count` registered in
    /// both its zero-argument and wildcard single-argument form.
    pub fn new<P>(main_dir_path: P, database_name: &str) -> Result<Self, CatalogError>
    where
        P: AsRef<Path>,
    {
        let file_path = main_dir_path
            .as_ref()
            .join(database_name)
            .join(METADATA_FILE_NAME);
        let catalog_json = CatalogJson::read_from_file(&file_path)?;
        let tables = catalog_json
            .tables
            .into_iter()
            .map(|t| {
                let name = t.name.clone();
                TableDesc::try_from(t).map(|desc| (name, desc))
            })
            .collect::<Result<HashMap<_, _>, _>>()?;
        let mut catalog = Catalog {
            file_path,
            tables,
            functions: HashMap::new(),
        };
        catalog.register_builtin_functions();
        Ok(catalog)
    }

    fn register_builtin_functions(&mut self) {
        let builtins = [
            FunctionDesc::new("count", vec![], Type::Long, FuncType::Agg),
            FunctionDesc::new("count", vec![Type::Any], Type::Long, FuncType::Agg),
        ];
        for desc in builtins {
            // Built-ins are registered on a fresh map, duplicates are impossible.
            let _ = self.register_function(desc);
        }
    }

    /// Looks up the descriptor of the table named `table_name`.
    pub fn get_table(&self, table_name: &str) -> Result<TableDesc, CatalogError> {
        self.tables
            .get(table_name)
            .ok_or(CatalogError::TableNotFound(table_name.into()))
            .cloned()
    }

    /// Registers `table` under its id. The id must not be taken yet.
    pub fn add_table(&mut self, table: TableDesc) -> Result<(), CatalogError> {
        let already_exists = self.tables.contains_key(table.id());
        match already_exists {
            true => Err(CatalogError::TableAlreadyExists(table.id().into())),
            false => {
                self.tables.insert(table.id().into(), table);
                Ok(())
            }
        }
    }

    /// Drops the table named `table_name` from the catalog.
    pub fn remove_table(&mut self, table_name: &str) -> Result<(), CatalogError> {
        self.tables
            .remove(table_name)
            .ok_or(CatalogError::TableNotFound(table_name.into()))
            .map(|_| ())
    }

    /// Registers `desc` so it can be resolved by `(signature, param_types)`.
    /// Can fail if a function with the same signature and parameter types
    /// is already registered.
    pub fn register_function(&mut self, desc: FunctionDesc) -> Result<(), CatalogError> {
        let registered = self.functions.entry(desc.signature().into()).or_default();
        let duplicate = registered
            .iter()
            .any(|d| d.param_types() == desc.param_types());
        match duplicate {
            true => Err(CatalogError::FunctionAlreadyExists(desc.canonical_name())),
            false => {
                registered.push(desc);
                Ok(())
            }
        }
    }

    /// Returns `true` if a function resolvable by `(signature, param_types)` exists.
    pub fn contains_function(&self, signature: &str, param_types: &[Type]) -> bool {
        self.find_function(signature, param_types).is_some()
    }

    /// Resolves a function by `(signature, param_types)`.
    ///
    /// An exact parameter-type match wins; otherwise a descriptor whose [`Type::Any`]
    /// parameters act as wildcards is accepted, provided the arity matches.
    pub fn get_function(
        &self,
        signature: &str,
        param_types: &[Type],
    ) -> Result<FunctionDesc, CatalogError> {
        self.find_function(signature, param_types)
            .cloned()
            .ok_or_else(|| {
                CatalogError::FunctionNotFound(canonical_signature(signature, param_types))
            })
    }

    fn find_function(&self, signature: &str, param_types: &[Type]) -> Option<&FunctionDesc> {
        let registered = self.functions.get(signature)?;
        registered
            .iter()
            .find(|d| d.matches_exact(param_types))
            .or_else(|| registered.iter().find(|d| d.matches(param_types)))
    }

    /// Writes the current table set back to the metadata file.
    ///
    /// The serialized catalog goes to a scratch file first and is renamed over
    /// the metadata file only once it is fully on disk, so an interrupted
    /// write cannot truncate the previous contents.
    pub fn sync_to_disk(&mut self) -> Result<(), CatalogError> {
        let content = serde_json::to_string_pretty(&CatalogJson::from(&*self))?;

        let stamp = time::SystemTime::now()
            .duration_since(time::UNIX_EPOCH)
            .map(|since| since.as_millis())
            .unwrap_or(0);
        let scratch_path = self.file_path.with_extension(format!("scratch-{stamp}"));

        let mut scratch = fs::File::create(&scratch_path)?;
        scratch.write_all(content.as_bytes())?;
        scratch.sync_data()?;
        drop(scratch);
        fs::rename(&scratch_path, &self.file_path)?;

        Ok(())
    }
}

/// [`TableDesc`] describes a single table known to the catalog.
#[derive(Debug, Clone, PartialEq)]
pub struct TableDesc {
    id: String,
    meta: TableMeta,
}

impl TableDesc {
    pub fn new(id: impl Into<String>, schema: Schema) -> Self {
        TableDesc {
            id: id.into(),
            meta: TableMeta { schema },
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }
}

/// Table-level metadata. Currently only the schema, kept as its own level
/// so storage details can attach here without touching descriptor users.
#[derive(Debug, Clone, PartialEq)]
pub struct TableMeta {
    schema: Schema,
}

impl TableMeta {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }
}

/// Error returned by [`Schema`] operations.
#[derive(Error, Debug)]
pub enum SchemaError {
    /// A second column was added under an already-present qualified name
    #[error("duplicate column '{0}' in schema")]
    DuplicatedColumn(String),
}

/// [`Schema`] is an ordered list of columns addressable by their qualified name
/// `"<table_id>.<column_name>"`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    /// All columns sorted by their position in the table.
    columns: Vec<Column>,
    /// Maps each qualified column name to its index in `columns`.
    columns_by_name: HashMap<String, usize>,
}

impl Schema {
    pub fn new() -> Self {
        Schema::default()
    }

    /// Appends `column` to the schema.
    /// Can fail if a column with the same qualified name already exists.
    pub fn add_column(&mut self, column: Column) -> Result<(), SchemaError> {
        let qualified = column.qualified_name();
        if self.columns_by_name.contains_key(&qualified) {
            return Err(SchemaError::DuplicatedColumn(qualified));
        }
        self.columns_by_name.insert(qualified, self.columns.len());
        self.columns.push(column);
        Ok(())
    }

    /// Returns the column addressed by `qualified_name`, if present.
    pub fn get_column(&self, qualified_name: &str) -> Option<&Column> {
        self.columns_by_name
            .get(qualified_name)
            .map(|&idx| &self.columns[idx])
    }

    /// Returns `true` if the schema has a column addressed by `qualified_name`.
    pub fn contains(&self, qualified_name: &str) -> bool {
        self.columns_by_name.contains_key(qualified_name)
    }

    /// Returns all columns in table order.
    pub fn columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }
}

/// A fully qualified column: owning table id, bare name and value type.
///
/// Two columns are equal when their qualified names are equal; the value type
/// does not participate in identity.
#[derive(Debug, Clone)]
pub struct Column {
    table_id: String,
    name: String,
    ty: Type,
}

impl Column {
    pub fn new(table_id: impl Into<String>, name: impl Into<String>, ty: Type) -> Self {
        Column {
            table_id: table_id.into(),
            name: name.into(),
            ty,
        }
    }

    pub fn table_id(&self) -> &str {
        &self.table_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> Type {
        self.ty
    }

    /// The canonical schema-lookup key of this column.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.table_id, self.name)
    }
}

impl PartialEq for Column {
    fn eq(&self, other: &Self) -> bool {
        self.table_id == other.table_id && self.name == other.name
    }
}

impl Eq for Column {}

impl std::hash::Hash for Column {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.table_id.hash(state);
        self.name.hash(state);
    }
}

/// On-disk shape of the catalog's table set, mirrored through serde.
#[derive(Serialize, Deserialize)]
struct CatalogJson {
    tables: Vec<TableJson>,
}

impl CatalogJson {
    fn read_from_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let content = fs::read_to_string(path)?;
        let catalog_json = serde_json::from_str(&content)?;
        Ok(catalog_json)
    }
}

impl From<&Catalog> for CatalogJson {
    fn from(value: &Catalog) -> Self {
        CatalogJson {
            tables: value.tables.values().map(TableJson::from).collect(),
        }
    }
}

/// On-disk shape of one table. Column names are stored bare and qualified
/// with the table name on load.
#[derive(Serialize, Deserialize)]
struct TableJson {
    name: String,
    columns: Vec<ColumnJson>,
}

impl From<&TableDesc> for TableJson {
    fn from(value: &TableDesc) -> Self {
        TableJson {
            name: value.id.clone(),
            columns: value
                .meta
                .schema
                .columns()
                .map(|c| ColumnJson {
                    name: c.name().into(),
                    ty: c.ty(),
                })
                .collect(),
        }
    }
}

impl TryFrom<TableJson> for TableDesc {
    type Error = SchemaError;

    fn try_from(value: TableJson) -> Result<Self, Self::Error> {
        let mut schema = Schema::new();
        for column in value.columns {
            schema.add_column(Column::new(&value.name, column.name, column.ty))?;
        }
        Ok(TableDesc::new(value.name, schema))
    }
}

#[derive(Serialize, Deserialize)]
struct ColumnJson {
    name: String,
    ty: Type,
}
