//! Function descriptors used by the analyzer to resolve function calls.

use types::schema::Type;

use crate::catalog::CatalogError;

/// Execution class of a function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FuncType {
    /// Row-at-a-time scalar function.
    General,
    /// Aggregate function consuming a group of rows.
    Agg,
}

/// [`FunctionDesc`] describes a single resolvable function overload:
/// its signature name, parameter types, return type and execution class.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDesc {
    signature: String,
    param_types: Vec<Type>,
    return_type: Type,
    func_type: FuncType,
}

impl FunctionDesc {
    pub fn new(
        signature: impl Into<String>,
        param_types: Vec<Type>,
        return_type: Type,
        func_type: FuncType,
    ) -> Self {
        FunctionDesc {
            signature: signature.into(),
            param_types,
            return_type,
            func_type,
        }
    }

    pub fn signature(&self) -> &str {
        &self.signature
    }

    pub fn param_types(&self) -> &[Type] {
        &self.param_types
    }

    pub fn return_type(&self) -> Type {
        self.return_type
    }

    pub fn func_type(&self) -> FuncType {
        self.func_type
    }

    /// The canonical `name(Type,Type)` form of this overload.
    pub fn canonical_name(&self) -> String {
        canonical_signature(&self.signature, &self.param_types)
    }

    /// Returns `true` if `args` matches the declared parameter types exactly.
    pub fn matches_exact(&self, args: &[Type]) -> bool {
        self.param_types == args
    }

    /// Returns `true` if `args` matches the declared parameter types, with
    /// declared [`Type::Any`] parameters accepting any argument type.
    /// Arity must match.
    pub fn matches(&self, args: &[Type]) -> bool {
        self.param_types.len() == args.len()
            && self
                .param_types
                .iter()
                .zip(args)
                .all(|(param, arg)| *param == Type::Any || param == arg)
    }

    /// Binds the descriptor to an executable instance.
    pub fn new_instance(&self) -> Result<FunctionInstance, CatalogError> {
        Ok(FunctionInstance { desc: self.clone() })
    }
}

/// A bound, executable function. The analyzer only instantiates it to verify
/// that a resolved descriptor can actually be bound; evaluation happens in
/// the executor.
#[derive(Debug)]
pub struct FunctionInstance {
    desc: FunctionDesc,
}

impl FunctionInstance {
    pub fn desc(&self) -> &FunctionDesc {
        &self.desc
    }
}

/// Formats `(name, param_types)` as the canonical `name(Type,Type)` key used
/// in diagnostics.
pub fn canonical_signature(name: &str, param_types: &[Type]) -> String {
    let params = param_types
        .iter()
        .map(Type::to_string)
        .collect::<Vec<_>>()
        .join(",");
    format!("{name}({params})")
}
