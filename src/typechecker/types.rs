//! Semantic types assigned to AST nodes during checking.

use std::rc::Rc;

use serde::Serialize;

use crate::value::TypeId;

/// Canonical semantic type. Structural where the runtime is structural
/// (arrays, maps, elements, function signatures), nominal-by-id everywhere
/// else.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub enum Type {
    Null,
    Bool,
    Int,
    Int64,
    Float,
    /// Union of int and float; produced by mixed numeric expressions that
    /// route through the runtime.
    Number,
    Decimal,
    DateTime,
    String,
    Symbol,
    Binary,
    List,
    Range,
    /// Homogeneous array with a known element type. `Array(Any)` is the
    /// generic boxed array; int/int64/float element types select the
    /// specialized unboxed representations.
    Array(Box<Type>),
    Map(Rc<MapShape>),
    Element(Rc<ElementShape>),
    Function(Rc<FuncSignature>),
    /// A type used as a runtime value (reflection).
    TypeValue(Box<Type>),
    /// A compiled string/symbol pattern value.
    Pattern,
    Any,
    Error,
}

/// Field layout of a map literal; interned into the script type list so
/// emitted code can allocate by type index.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MapShape {
    pub fields: Vec<(String, Type)>,
}

/// Tag, attributes and content arity of an element literal.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct ElementShape {
    pub tag: String,
    pub attrs: Vec<(String, Type)>,
    pub content_length: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ParamSig {
    pub name: String,
    pub ty: Type,
    pub is_optional: bool,
    pub has_default: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FuncSignature {
    pub params: Vec<ParamSig>,
    pub returned: Type,
    pub is_variadic: bool,
    pub is_public: bool,
    pub is_anonymous: bool,
}

impl FuncSignature {
    pub fn param_count(&self) -> usize {
        self.params.len()
    }
}

/// How an argument reaches a parameter slot. The checker classifies, the
/// emitter turns the classification into casts or bridge calls.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coercion {
    /// Exact primitive match, or a position that takes the value as-is.
    Identity,
    /// Widening inside the numeric lattice; C promotes implicitly.
    Widen,
    /// Narrowing demanded by the parameter type; the emitter records a cast.
    Narrow(TypeId),
    /// ANY argument into a typed slot; unbox with the proven type.
    Unbox(TypeId),
    /// Typed argument into an ANY slot; goes through the box bridge.
    Box,
    Incompatible,
}

impl Type {
    pub fn type_id(&self) -> TypeId {
        match self {
            Type::Null => TypeId::Null,
            Type::Bool => TypeId::Bool,
            Type::Int => TypeId::Int,
            Type::Int64 => TypeId::Int64,
            Type::Float => TypeId::Float,
            Type::Number => TypeId::Number,
            Type::Decimal => TypeId::Decimal,
            Type::DateTime => TypeId::DateTime,
            Type::String => TypeId::String,
            Type::Symbol => TypeId::Symbol,
            Type::Binary => TypeId::Binary,
            Type::List => TypeId::List,
            Type::Range => TypeId::Range,
            Type::Array(elem) => match elem.as_ref() {
                Type::Int => TypeId::ArrayInt,
                Type::Int64 => TypeId::ArrayInt64,
                Type::Float => TypeId::ArrayFloat,
                _ => TypeId::Array,
            },
            Type::Map(_) => TypeId::Map,
            Type::Element(_) => TypeId::Element,
            Type::Function(_) => TypeId::Func,
            Type::TypeValue(_) => TypeId::Type,
            Type::Pattern => TypeId::Pattern,
            Type::Any => TypeId::Any,
            Type::Error => TypeId::Error,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.type_id().is_numeric()
    }

    /// Join of two numeric types: FLOAT dominates INT64 dominates INT.
    /// `None` when either side leaves the lattice.
    pub fn numeric_join(left: &Type, right: &Type) -> Option<Type> {
        if !left.is_numeric() || !right.is_numeric() {
            return None;
        }
        Some(if left.type_id() >= right.type_id() {
            left.clone()
        } else {
            right.clone()
        })
    }

    /// Classify passing a value of type `self` into a slot of type `wanted`.
    pub fn coerce_to(&self, wanted: &Type) -> Coercion {
        if wanted == self {
            return Coercion::Identity;
        }
        match (wanted.type_id(), self.type_id()) {
            // ANY slots accept everything through the box bridge.
            (TypeId::Any, TypeId::Any) => Coercion::Identity,
            (TypeId::Any, _) => Coercion::Box,
            // Typed slots accept ANY through unboxing with the proven type.
            (want, TypeId::Any) => Coercion::Unbox(want),
            // NUMBER results are runtime-tagged; typed numeric slots unbox.
            (want, TypeId::Number) if want.is_numeric() => Coercion::Unbox(want),
            // Widening within the lattice.
            (want, have) if want.is_numeric() && have.is_numeric() && have < want => Coercion::Widen,
            // Narrowing only when the parameter demands it.
            (want, have) if want.is_numeric() && have.is_numeric() && have > want => {
                Coercion::Narrow(want)
            }
            // NUMBER slots take any numeric through the box bridge.
            (TypeId::Number, have) if have.is_numeric() => Coercion::Box,
            // Same runtime representation (e.g. two map shapes).
            (want, have) if want == have => Coercion::Identity,
            _ => Coercion::Incompatible,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Null => write!(f, "null"),
            Type::Bool => write!(f, "bool"),
            Type::Int => write!(f, "int"),
            Type::Int64 => write!(f, "int64"),
            Type::Float => write!(f, "float"),
            Type::Number => write!(f, "number"),
            Type::Decimal => write!(f, "decimal"),
            Type::DateTime => write!(f, "datetime"),
            Type::String => write!(f, "string"),
            Type::Symbol => write!(f, "symbol"),
            Type::Binary => write!(f, "binary"),
            Type::List => write!(f, "list"),
            Type::Range => write!(f, "range"),
            Type::Array(elem) => write!(f, "array<{elem}>"),
            Type::Map(shape) => {
                write!(f, "map{{")?;
                for (i, (name, ty)) in shape.fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{name}: {ty}")?;
                }
                write!(f, "}}")
            }
            Type::Element(shape) => write!(f, "<{}>", shape.tag),
            Type::Function(sig) => {
                write!(f, "fn(")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ") -> {}", sig.returned)
            }
            Type::TypeValue(inner) => write!(f, "type<{inner}>"),
            Type::Pattern => write!(f, "pattern"),
            Type::Any => write!(f, "any"),
            Type::Error => write!(f, "error"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_join() {
        assert_eq!(Type::numeric_join(&Type::Int, &Type::Int), Some(Type::Int));
        assert_eq!(
            Type::numeric_join(&Type::Int, &Type::Int64),
            Some(Type::Int64)
        );
        assert_eq!(
            Type::numeric_join(&Type::Float, &Type::Int64),
            Some(Type::Float)
        );
        assert_eq!(Type::numeric_join(&Type::Int, &Type::String), None);
        assert_eq!(Type::numeric_join(&Type::Number, &Type::Int), None);
    }

    #[test]
    fn test_array_specialization_ids() {
        assert_eq!(Type::Array(Box::new(Type::Int)).type_id(), TypeId::ArrayInt);
        assert_eq!(
            Type::Array(Box::new(Type::Float)).type_id(),
            TypeId::ArrayFloat
        );
        assert_eq!(Type::Array(Box::new(Type::Any)).type_id(), TypeId::Array);
        assert_eq!(Type::Array(Box::new(Type::String)).type_id(), TypeId::Array);
    }

    #[test]
    fn test_coercions() {
        assert_eq!(Type::Int.coerce_to(&Type::Int), Coercion::Identity);
        assert_eq!(Type::Int.coerce_to(&Type::Float), Coercion::Widen);
        assert_eq!(
            Type::Float.coerce_to(&Type::Int64),
            Coercion::Narrow(TypeId::Int64)
        );
        assert_eq!(Type::Int.coerce_to(&Type::Any), Coercion::Box);
        assert_eq!(
            Type::Any.coerce_to(&Type::Int),
            Coercion::Unbox(TypeId::Int)
        );
        assert_eq!(Type::String.coerce_to(&Type::Int), Coercion::Incompatible);
    }
}
