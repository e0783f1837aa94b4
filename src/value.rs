//! Runtime value model as seen by the compiler.
//!
//! At runtime every Lambda value is an `Item`: a 64-bit tagged slot holding
//! either an immediate scalar or a tagged pointer. The compiler never builds
//! Items itself — emitted code does, through the runtime helper families —
//! but it must know the runtime type-id ordering (numeric lattice checks are
//! range checks) and it owns the per-script constants pool that emitted code
//! indexes into.

use std::collections::HashMap;
use std::fmt::{self, Display, Formatter};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Runtime type ids.
///
/// The discriminant order is part of the contract: `Int`, `Int64` and
/// `Float` are contiguous so the numeric fast paths can test
/// `Int <= id <= Float`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum TypeId {
    Null,
    Bool,
    Int,
    Int64,
    Float,
    Number,
    Decimal,
    DateTime,
    String,
    Symbol,
    Binary,
    List,
    Range,
    ArrayInt,
    ArrayInt64,
    ArrayFloat,
    Array,
    Map,
    Element,
    Type,
    Func,
    Pattern,
    Any,
    Error,
}

impl TypeId {
    /// Whether this id sits inside the numeric promotion lattice.
    pub fn is_numeric(self) -> bool {
        TypeId::Int <= self && self <= TypeId::Float
    }

    /// Whether values of this id are containers (pointer-shaped Items).
    pub fn is_container(self) -> bool {
        matches!(
            self,
            TypeId::List
                | TypeId::Range
                | TypeId::ArrayInt
                | TypeId::ArrayInt64
                | TypeId::ArrayFloat
                | TypeId::Array
                | TypeId::Map
                | TypeId::Element
                | TypeId::Type
                | TypeId::Func
                | TypeId::Pattern
        )
    }

    /// The C type emitted for unboxed values of this id.
    pub fn c_type(self) -> &'static str {
        match self {
            TypeId::Null => "Item",
            TypeId::Bool => "bool",
            TypeId::Int => "int32_t",
            TypeId::Int64 => "int64_t",
            TypeId::Float => "double",
            TypeId::Number => "Item",
            TypeId::Decimal => "Decimal*",
            TypeId::DateTime => "DateTime*",
            TypeId::String => "String*",
            TypeId::Symbol => "String*",
            TypeId::Binary => "String*",
            TypeId::List => "List*",
            TypeId::Range => "Range*",
            TypeId::ArrayInt => "ArrayInt*",
            TypeId::ArrayInt64 => "ArrayInt64*",
            TypeId::ArrayFloat => "ArrayFloat*",
            TypeId::Array => "Array*",
            TypeId::Map => "Map*",
            TypeId::Element => "Element*",
            TypeId::Type => "Type*",
            TypeId::Func => "Function*",
            TypeId::Pattern => "Pattern*",
            TypeId::Any => "Item",
            TypeId::Error => "Item",
        }
    }

    /// The runtime enum name used when emitted code tests type ids.
    pub fn runtime_name(self) -> &'static str {
        match self {
            TypeId::Null => "LMD_TYPE_NULL",
            TypeId::Bool => "LMD_TYPE_BOOL",
            TypeId::Int => "LMD_TYPE_INT",
            TypeId::Int64 => "LMD_TYPE_INT64",
            TypeId::Float => "LMD_TYPE_FLOAT",
            TypeId::Number => "LMD_TYPE_NUMBER",
            TypeId::Decimal => "LMD_TYPE_DECIMAL",
            TypeId::DateTime => "LMD_TYPE_DTIME",
            TypeId::String => "LMD_TYPE_STRING",
            TypeId::Symbol => "LMD_TYPE_SYMBOL",
            TypeId::Binary => "LMD_TYPE_BINARY",
            TypeId::List => "LMD_TYPE_LIST",
            TypeId::Range => "LMD_TYPE_RANGE",
            TypeId::ArrayInt => "LMD_TYPE_ARRAY_INT",
            TypeId::ArrayInt64 => "LMD_TYPE_ARRAY_INT64",
            TypeId::ArrayFloat => "LMD_TYPE_ARRAY_FLOAT",
            TypeId::Array => "LMD_TYPE_ARRAY",
            TypeId::Map => "LMD_TYPE_MAP",
            TypeId::Element => "LMD_TYPE_ELEMENT",
            TypeId::Type => "LMD_TYPE_TYPE",
            TypeId::Func => "LMD_TYPE_FUNC",
            TypeId::Pattern => "LMD_TYPE_PATTERN",
            TypeId::Any => "LMD_TYPE_ANY",
            TypeId::Error => "LMD_TYPE_ERROR",
        }
    }
}

impl Display for TypeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.runtime_name())
    }
}

/// An immutable literal interned into a script's constants table.
///
/// Floats are compared and hashed by bit pattern so that interning is
/// deterministic.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ConstValue {
    String(String),
    Symbol(String),
    Binary(Vec<u8>),
    DateTime(String),
    Decimal(Decimal),
    Int64(i64),
    Float(f64),
}

impl PartialEq for ConstValue {
    fn eq(&self, other: &Self) -> bool {
        use ConstValue::*;
        match (self, other) {
            (String(a), String(b)) => a == b,
            (Symbol(a), Symbol(b)) => a == b,
            (Binary(a), Binary(b)) => a == b,
            (DateTime(a), DateTime(b)) => a == b,
            (Decimal(a), Decimal(b)) => a == b,
            (Int64(a), Int64(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            _ => false,
        }
    }
}

impl Eq for ConstValue {}

impl std::hash::Hash for ConstValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        use ConstValue::*;
        std::mem::discriminant(self).hash(state);
        match self {
            String(s) | Symbol(s) | DateTime(s) => s.hash(state),
            Binary(b) => b.hash(state),
            Decimal(d) => d.hash(state),
            Int64(i) => i.hash(state),
            Float(f) => f.to_bits().hash(state),
        }
    }
}

/// Append-only interned constants table for one script.
///
/// Indices are stable for the life of the script; interning the same value
/// twice yields the same index.
#[derive(Clone, Debug, Default)]
pub struct ConstPool {
    items: Vec<ConstValue>,
    index: HashMap<ConstValue, u32>,
}

impl ConstPool {
    pub fn new() -> ConstPool {
        ConstPool::default()
    }

    pub fn intern(&mut self, value: ConstValue) -> u32 {
        if let Some(&index) = self.index.get(&value) {
            return index;
        }
        let index = self.items.len() as u32;
        self.items.push(value.clone());
        self.index.insert(value, index);
        index
    }

    pub fn get(&self, index: u32) -> Option<&ConstValue> {
        self.items.get(index as usize)
    }

    /// Index of an already-interned value.
    pub fn find(&self, value: &ConstValue) -> Option<u32> {
        self.index.get(value).copied()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &ConstValue)> {
        self.items.iter().enumerate().map(|(i, v)| (i as u32, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_lattice_range() {
        assert!(TypeId::Int.is_numeric());
        assert!(TypeId::Int64.is_numeric());
        assert!(TypeId::Float.is_numeric());
        assert!(!TypeId::Bool.is_numeric());
        assert!(!TypeId::Number.is_numeric());
        assert!(TypeId::Int < TypeId::Int64 && TypeId::Int64 < TypeId::Float);
    }

    #[test]
    fn test_intern_is_stable() {
        let mut pool = ConstPool::new();
        let a = pool.intern(ConstValue::String("hello".into()));
        let b = pool.intern(ConstValue::Symbol("hello".into()));
        let c = pool.intern(ConstValue::String("hello".into()));

        assert_eq!(a, c);
        assert_ne!(a, b);
        assert_eq!(pool.len(), 2);
        assert_eq!(pool.get(a), Some(&ConstValue::String("hello".into())));
    }

    #[test]
    fn test_float_interning_by_bits() {
        let mut pool = ConstPool::new();
        let a = pool.intern(ConstValue::Float(1.5));
        let b = pool.intern(ConstValue::Float(1.5));
        let c = pool.intern(ConstValue::Float(-1.5));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
