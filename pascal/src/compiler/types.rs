//! Type table and compatibility rules.
use std::fmt;

use smol_str::SmolStr;

use crate::error::{PascalError, PascalResult};

/// Index into the [`TypeTable`]. Types reference each other through
/// indices, so cyclic pointer types never need owning references.
pub type TypeId = usize;

/// Primitive type codes. The discriminant doubles as the type operand
/// in comparison, load and return instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SimpleType {
    Address = 0,
    Boolean = 1,
    Char = 2,
    Integer = 3,
    Real = 4,
    String = 5,
    Set = 6,
    Void = 7,
    Any = 8,
}

impl SimpleType {
    pub fn code(self) -> u32 {
        self as u32
    }

    pub fn from_code(code: u32) -> Option<Self> {
        use SimpleType as T;
        match code {
            0 => Some(T::Address),
            1 => Some(T::Boolean),
            2 => Some(T::Char),
            3 => Some(T::Integer),
            4 => Some(T::Real),
            5 => Some(T::String),
            6 => Some(T::Set),
            7 => Some(T::Void),
            8 => Some(T::Any),
            _ => None,
        }
    }
}

impl fmt::Display for SimpleType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let text = format!("{self:?}").to_ascii_lowercase();
        write!(f, "{text}")
    }
}

// Pre-interned ids of the simple types, in discriminant order.
pub const TYPE_ADDRESS: TypeId = 0;
pub const TYPE_BOOLEAN: TypeId = 1;
pub const TYPE_CHAR: TypeId = 2;
pub const TYPE_INTEGER: TypeId = 3;
pub const TYPE_REAL: TypeId = 4;
pub const TYPE_STRING: TypeId = 5;
pub const TYPE_SET: TypeId = 6;
pub const TYPE_VOID: TypeId = 7;
pub const TYPE_ANY: TypeId = 8;

#[derive(Debug, Clone, PartialEq)]
pub enum TypeNode {
    Simple(SimpleType),
    /// Members are integer-valued constants of this type.
    Enum { names: Vec<SmolStr> },
    /// `array [R1, R2, ...] of T`, flattened row-major.
    Array { ranges: Vec<(i32, i32)>, elem: TypeId },
    Record { fields: Vec<Field> },
    /// `^Name`. The pointee is filled in when the enclosing type
    /// section closes; `None` past that point is a parse error, not a
    /// valid state.
    Pointer { name: SmolStr, pointee: Option<TypeId> },
    /// Procedures, functions and natives. `ret` is `TYPE_VOID` for
    /// procedures.
    Subprogram { params: Vec<Param>, ret: TypeId },
}

/// Record field with its word offset from the record base.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
    pub name: SmolStr,
    pub ty: TypeId,
    pub offset: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Param {
    pub name: SmolStr,
    pub ty: TypeId,
    pub by_ref: bool,
}

/// What an implicit cast costs at run time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CastKind {
    /// Identical representation; nothing is emitted.
    NoOp,
    /// Numeric widening, lowered to `FLT`.
    IntToReal,
}

pub struct TypeTable {
    entries: Vec<TypeNode>,
}

impl TypeTable {
    pub fn new() -> Self {
        use SimpleType as T;
        let entries = [
            T::Address,
            T::Boolean,
            T::Char,
            T::Integer,
            T::Real,
            T::String,
            T::Set,
            T::Void,
            T::Any,
        ]
        .into_iter()
        .map(TypeNode::Simple)
        .collect();
        Self { entries }
    }

    pub fn add(&mut self, node: TypeNode) -> TypeId {
        self.entries.push(node);
        self.entries.len() - 1
    }

    pub fn node(&self, id: TypeId) -> &TypeNode {
        &self.entries[id]
    }

    pub fn node_mut(&mut self, id: TypeId) -> &mut TypeNode {
        &mut self.entries[id]
    }

    /// Size in data-store words.
    pub fn size_of(&self, id: TypeId) -> u32 {
        match self.node(id) {
            TypeNode::Simple(_) | TypeNode::Enum { .. } => 1,
            TypeNode::Pointer { .. } | TypeNode::Subprogram { .. } => 1,
            TypeNode::Array { ranges, elem } => {
                let elements: u32 = ranges
                    .iter()
                    .map(|(low, high)| (high - low + 1).max(0) as u32)
                    .product();
                elements * self.size_of(*elem)
            }
            TypeNode::Record { fields } => fields.iter().map(|f| self.size_of(f.ty)).sum(),
        }
    }

    /// Type code used as an instruction operand for values of this type.
    pub fn code_of(&self, id: TypeId) -> SimpleType {
        match self.node(id) {
            TypeNode::Simple(simple) => *simple,
            TypeNode::Enum { .. } => SimpleType::Integer,
            TypeNode::Pointer { .. } => SimpleType::Address,
            TypeNode::Array { .. } | TypeNode::Record { .. } => SimpleType::Any,
            TypeNode::Subprogram { .. } => SimpleType::Void,
        }
    }

    pub fn is_simple(&self, id: TypeId) -> bool {
        matches!(
            self.node(id),
            TypeNode::Simple(_) | TypeNode::Enum { .. } | TypeNode::Pointer { .. }
        )
    }

    /// Pointer family: typed pointers plus the generic `Pointer` (which
    /// is also the type of `nil`).
    pub fn is_pointer(&self, id: TypeId) -> bool {
        id == TYPE_ADDRESS || matches!(self.node(id), TypeNode::Pointer { .. })
    }

    pub fn pointee(&self, id: TypeId) -> Option<TypeId> {
        match self.node(id) {
            TypeNode::Pointer { pointee, .. } => *pointee,
            _ => None,
        }
    }

    /// Legal implicit casts: identity, integer→real widening,
    /// char→string, `any` in either direction, and pointer casts where
    /// one side is generic (`Pointer` / `nil`) or the pointee names
    /// match. Everything else is a hard error.
    pub fn implicit_cast(&self, from: TypeId, to: TypeId) -> PascalResult<CastKind> {
        use SimpleType as T;
        if from == to {
            return Ok(CastKind::NoOp);
        }
        match (self.node(from), self.node(to)) {
            (TypeNode::Simple(T::Integer), TypeNode::Simple(T::Real)) => Ok(CastKind::IntToReal),
            (TypeNode::Simple(T::Char), TypeNode::Simple(T::String)) => Ok(CastKind::NoOp),
            (TypeNode::Simple(T::Any), _) | (_, TypeNode::Simple(T::Any)) => Ok(CastKind::NoOp),
            _ if self.is_pointer(from) && self.is_pointer(to) => {
                if from == TYPE_ADDRESS || to == TYPE_ADDRESS {
                    return Ok(CastKind::NoOp);
                }
                let (TypeNode::Pointer { name: l, .. }, TypeNode::Pointer { name: r, .. }) =
                    (self.node(from), self.node(to))
                else {
                    unreachable!("pointer family is address or pointer nodes");
                };
                if l.eq_ignore_ascii_case(r) {
                    Ok(CastKind::NoOp)
                } else {
                    Err(self.cast_error(from, to))
                }
            }
            _ => Err(self.cast_error(from, to)),
        }
    }

    fn cast_error(&self, from: TypeId, to: TypeId) -> PascalError {
        PascalError::new(format!(
            "cannot cast {} to {}",
            self.describe(from),
            self.describe(to)
        ))
    }

    /// Short human name for error messages.
    pub fn describe(&self, id: TypeId) -> String {
        match self.node(id) {
            TypeNode::Simple(simple) => simple.to_string(),
            TypeNode::Enum { .. } => "enumeration".to_string(),
            TypeNode::Array { .. } => "array".to_string(),
            TypeNode::Record { .. } => "record".to_string(),
            TypeNode::Pointer { name, .. } => format!("^{name}"),
            TypeNode::Subprogram { .. } => "subprogram".to_string(),
        }
    }
}

impl Default for TypeTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_simple_type_codes_roundtrip() {
        for code in 0..9 {
            let simple = SimpleType::from_code(code).unwrap();
            assert_eq!(simple.code(), code);
        }
        assert_eq!(SimpleType::from_code(9), None);
    }

    #[test]
    fn test_array_size_is_row_major_product() {
        let mut types = TypeTable::new();
        let matrix = types.add(TypeNode::Array {
            ranges: vec![(1, 3), (0, 4)],
            elem: TYPE_INTEGER,
        });
        assert_eq!(types.size_of(matrix), 15);
    }

    #[test]
    fn test_record_size_sums_fields() {
        let mut types = TypeTable::new();
        let arr = types.add(TypeNode::Array {
            ranges: vec![(1, 2)],
            elem: TYPE_REAL,
        });
        let rec = types.add(TypeNode::Record {
            fields: vec![
                Field {
                    name: "x".into(),
                    ty: TYPE_INTEGER,
                    offset: 0,
                },
                Field {
                    name: "v".into(),
                    ty: arr,
                    offset: 1,
                },
            ],
        });
        assert_eq!(types.size_of(rec), 3);
    }

    #[test]
    fn test_integer_widens_to_real() {
        let types = TypeTable::new();
        assert_eq!(
            types.implicit_cast(TYPE_INTEGER, TYPE_REAL).unwrap(),
            CastKind::IntToReal
        );
        assert!(types.implicit_cast(TYPE_REAL, TYPE_INTEGER).is_err());
    }

    #[test]
    fn test_char_to_string_is_free() {
        let types = TypeTable::new();
        assert_eq!(
            types.implicit_cast(TYPE_CHAR, TYPE_STRING).unwrap(),
            CastKind::NoOp
        );
    }

    #[test]
    fn test_pointer_casts() {
        let mut types = TypeTable::new();
        let p_node = types.add(TypeNode::Pointer {
            name: "Node".into(),
            pointee: Some(TYPE_INTEGER),
        });
        let p_node2 = types.add(TypeNode::Pointer {
            name: "NODE".into(),
            pointee: Some(TYPE_INTEGER),
        });
        let p_other = types.add(TypeNode::Pointer {
            name: "Other".into(),
            pointee: Some(TYPE_INTEGER),
        });
        // nil / generic Pointer mix with any pointer type.
        assert!(types.implicit_cast(TYPE_ADDRESS, p_node).is_ok());
        assert!(types.implicit_cast(p_node, TYPE_ADDRESS).is_ok());
        // Same pointee name, case-insensitive.
        assert!(types.implicit_cast(p_node, p_node2).is_ok());
        assert!(types.implicit_cast(p_node, p_other).is_err());
    }

    #[test]
    fn test_string_does_not_cast_to_integer() {
        let types = TypeTable::new();
        assert!(types.implicit_cast(TYPE_STRING, TYPE_INTEGER).is_err());
    }
}
