//! The Virex type model.
//!
//! [`Type`] is an owned value enum: cloning produces a deep copy, equality
//! is structural, and [`Type::substitute`] returns a fresh tree with
//! generic parameter names replaced. The `Display` form is the round-trip
//! representation used in diagnostics and in instantiation mangling
//! (`Pair<i32, i64>` mangles to `Pair_i32_i64` via this form).

use std::fmt;

use smallvec::SmallVec;
use strum::{Display, EnumString, IntoStaticStr};

use crate::token::TokenKind;

/// Generic argument lists are almost always one or two entries.
pub type TypeArgs = SmallVec<[Type; 2]>;

/// Primitive type kinds, spelled as in source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, IntoStaticStr)]
pub enum Prim {
    #[strum(serialize = "i8")]
    I8,
    #[strum(serialize = "i16")]
    I16,
    #[strum(serialize = "i32")]
    I32,
    #[strum(serialize = "i64")]
    I64,
    #[strum(serialize = "u8")]
    U8,
    #[strum(serialize = "u16")]
    U16,
    #[strum(serialize = "u32")]
    U32,
    #[strum(serialize = "u64")]
    U64,
    #[strum(serialize = "f32")]
    F32,
    #[strum(serialize = "f64")]
    F64,
    #[strum(serialize = "bool")]
    Bool,
    #[strum(serialize = "void")]
    Void,
    #[strum(serialize = "c_char")]
    CChar,
    #[strum(serialize = "c_short")]
    CShort,
    #[strum(serialize = "c_ushort")]
    CUShort,
    #[strum(serialize = "c_int")]
    CInt,
    #[strum(serialize = "c_uint")]
    CUInt,
    #[strum(serialize = "c_long")]
    CLong,
    #[strum(serialize = "c_ulong")]
    CULong,
    #[strum(serialize = "c_longlong")]
    CLongLong,
    #[strum(serialize = "c_ulonglong")]
    CULongLong,
    #[strum(serialize = "c_longdouble")]
    CLongDouble,
    #[strum(serialize = "cstring")]
    CString,
}

impl Prim {
    /// Maps a primitive type-name token onto its kind.
    pub fn from_token(kind: TokenKind) -> Option<Self> {
        Some(match kind {
            TokenKind::I8 => Self::I8,
            TokenKind::I16 => Self::I16,
            TokenKind::I32 => Self::I32,
            TokenKind::I64 => Self::I64,
            TokenKind::U8 => Self::U8,
            TokenKind::U16 => Self::U16,
            TokenKind::U32 => Self::U32,
            TokenKind::U64 => Self::U64,
            TokenKind::F32 => Self::F32,
            TokenKind::F64 => Self::F64,
            TokenKind::Bool => Self::Bool,
            TokenKind::Void => Self::Void,
            TokenKind::CChar => Self::CChar,
            TokenKind::CShort => Self::CShort,
            TokenKind::CUShort => Self::CUShort,
            TokenKind::CInt => Self::CInt,
            TokenKind::CUInt => Self::CUInt,
            TokenKind::CLong => Self::CLong,
            TokenKind::CULong => Self::CULong,
            TokenKind::CLongLong => Self::CLongLong,
            TokenKind::CULongLong => Self::CULongLong,
            TokenKind::CLongDouble => Self::CLongDouble,
            TokenKind::CString => Self::CString,
            _ => return None,
        })
    }

    /// The fixed-width Virex integers. C-ABI integers are deliberately not
    /// part of the widening set.
    pub fn is_integer(self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16 | Self::I32 | Self::I64 | Self::U8 | Self::U16 | Self::U32 | Self::U64
        )
    }

    pub fn is_numeric(self) -> bool {
        self.is_integer() || matches!(self, Self::F32 | Self::F64)
    }
}

/// A Virex type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Type {
    Prim(Prim),
    Pointer { base: Box<Type>, non_null: bool },
    Array { elem: Box<Type>, size: usize },
    Slice { elem: Box<Type> },
    Struct { name: String, args: TypeArgs },
    Enum { name: String, args: TypeArgs },
    Function { ret: Box<Type>, params: Vec<Type> },
    Result { ok: Box<Type>, err: Box<Type> },
}

impl Type {
    pub fn prim(kind: Prim) -> Self {
        Self::Prim(kind)
    }

    pub fn pointer(base: Self, non_null: bool) -> Self {
        Self::Pointer {
            base: Box::new(base),
            non_null,
        }
    }

    pub fn array(elem: Self, size: usize) -> Self {
        Self::Array {
            elem: Box::new(elem),
            size,
        }
    }

    pub fn slice(elem: Self) -> Self {
        Self::Slice { elem: Box::new(elem) }
    }

    pub fn named_struct(name: impl Into<String>, args: TypeArgs) -> Self {
        Self::Struct {
            name: name.into(),
            args,
        }
    }

    pub fn named_enum(name: impl Into<String>, args: TypeArgs) -> Self {
        Self::Enum {
            name: name.into(),
            args,
        }
    }

    pub fn function(ret: Self, params: Vec<Self>) -> Self {
        Self::Function {
            ret: Box::new(ret),
            params,
        }
    }

    pub fn result(ok: Self, err: Self) -> Self {
        Self::Result {
            ok: Box::new(ok),
            err: Box::new(err),
        }
    }

    /// The universal null pointer type, `*void` (nullable).
    pub fn null_pointer() -> Self {
        Self::pointer(Self::Prim(Prim::Void), false)
    }

    pub fn is_void(&self) -> bool {
        matches!(self, Self::Prim(Prim::Void))
    }

    pub fn is_bool(&self) -> bool {
        matches!(self, Self::Prim(Prim::Bool))
    }

    pub fn is_integer(&self) -> bool {
        matches!(self, Self::Prim(p) if p.is_integer())
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Prim(p) if p.is_numeric())
    }

    /// The name of a struct or enum reference, if this is one.
    pub fn nominal_name(&self) -> Option<&str> {
        match self {
            Self::Struct { name, .. } | Self::Enum { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Compatibility of an `actual` type where `self` is expected.
    ///
    /// Widens fixed-width integers among themselves, accepts a non-null
    /// pointer where a nullable one is expected (not the reverse), treats
    /// `*void` as compatible with any pointer base, and treats `void` on
    /// either side of a `result` slot as the bottom type.
    pub fn compatible(&self, actual: &Self) -> bool {
        match (self, actual) {
            (
                Self::Pointer {
                    base: expected_base,
                    non_null: expected_non_null,
                },
                Self::Pointer {
                    base: actual_base,
                    non_null: actual_non_null,
                },
            ) => {
                if *expected_non_null && !actual_non_null {
                    return false;
                }
                if expected_base.is_void() || actual_base.is_void() {
                    return true;
                }
                expected_base == actual_base
            }
            (
                Self::Result {
                    ok: expected_ok,
                    err: expected_err,
                },
                Self::Result {
                    ok: actual_ok,
                    err: actual_err,
                },
            ) => {
                let ok_compat =
                    expected_ok.compatible(actual_ok) || actual_ok.is_void() || expected_ok.is_void();
                let err_compat =
                    expected_err.compatible(actual_err) || actual_err.is_void() || expected_err.is_void();
                ok_compat && err_compat
            }
            _ => {
                if self.is_integer() && actual.is_integer() {
                    return true;
                }
                self == actual
            }
        }
    }

    /// Replaces any struct/enum reference whose name equals a generic
    /// parameter name with the corresponding argument type, recursing into
    /// composites. Returns a fresh tree.
    pub fn substitute(&self, params: &[String], args: &[Self]) -> Self {
        if let Some(name) = self.nominal_name()
            && let Some(pos) = params.iter().position(|p| p == name)
            && let Some(replacement) = args.get(pos)
        {
            return replacement.clone();
        }

        match self {
            Self::Prim(p) => Self::Prim(*p),
            Self::Pointer { base, non_null } => Self::pointer(base.substitute(params, args), *non_null),
            Self::Array { elem, size } => Self::array(elem.substitute(params, args), *size),
            Self::Slice { elem } => Self::slice(elem.substitute(params, args)),
            Self::Struct { name, args: targs } => Self::Struct {
                name: name.clone(),
                args: targs.iter().map(|t| t.substitute(params, args)).collect(),
            },
            Self::Enum { name, args: targs } => Self::Enum {
                name: name.clone(),
                args: targs.iter().map(|t| t.substitute(params, args)).collect(),
            },
            Self::Function { ret, params: fparams } => Self::Function {
                ret: Box::new(ret.substitute(params, args)),
                params: fparams.iter().map(|t| t.substitute(params, args)).collect(),
            },
            Self::Result { ok, err } => {
                Self::result(ok.substitute(params, args), err.substitute(params, args))
            }
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Prim(p) => write!(f, "{p}"),
            Self::Pointer { base, non_null } => {
                write!(f, "{base}*{}", if *non_null { "!" } else { "" })
            }
            Self::Array { elem, size } => write!(f, "{elem}[{size}]"),
            Self::Slice { elem } => write!(f, "[]{elem}"),
            Self::Function { .. } => write!(f, "function"),
            Self::Struct { name, args } | Self::Enum { name, args } => {
                if args.is_empty() {
                    return write!(f, "{name}");
                }
                write!(f, "{name}<")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ">")
            }
            Self::Result { ok, err } => write!(f, "result<{ok}, {err}>"),
        }
    }
}

/// Display helper for optional types in diagnostics.
pub fn display_type(ty: Option<&Type>) -> String {
    ty.map_or_else(|| "unknown".to_owned(), ToString::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn i32_ty() -> Type {
        Type::prim(Prim::I32)
    }

    #[test]
    fn equality_is_structural() {
        let a = Type::named_struct("Pair", [i32_ty(), Type::prim(Prim::I64)].into_iter().collect());
        let b = Type::named_struct("Pair", [i32_ty(), Type::prim(Prim::I64)].into_iter().collect());
        let c = Type::named_struct("Pair", [i32_ty(), i32_ty()].into_iter().collect());
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn integer_widening_is_compatible_but_not_equal() {
        let a = Type::prim(Prim::I64);
        let b = i32_ty();
        assert!(a.compatible(&b));
        assert!(b.compatible(&a));
        assert_ne!(a, b);
        assert!(!Type::prim(Prim::F32).compatible(&b));
    }

    #[test]
    fn non_null_flows_into_nullable_only() {
        let nullable = Type::pointer(i32_ty(), false);
        let non_null = Type::pointer(i32_ty(), true);
        assert!(nullable.compatible(&non_null));
        assert!(!non_null.compatible(&nullable));
    }

    #[test]
    fn void_pointer_is_universal() {
        let p = Type::pointer(i32_ty(), false);
        assert!(p.compatible(&Type::null_pointer()));
        assert!(Type::null_pointer().compatible(&p));
    }

    #[test]
    fn result_void_is_bottom() {
        let expected = Type::result(i32_ty(), Type::named_enum("Error", TypeArgs::new()));
        let from_ok = Type::result(i32_ty(), Type::prim(Prim::Void));
        let from_err = Type::result(Type::prim(Prim::Void), Type::named_enum("Error", TypeArgs::new()));
        assert!(expected.compatible(&from_ok));
        assert!(expected.compatible(&from_err));
        let mismatched = Type::result(Type::prim(Prim::F64), Type::prim(Prim::Void));
        assert!(!expected.compatible(&mismatched));
    }

    #[test]
    fn substitute_replaces_named_parameters_recursively() {
        let params = vec!["T".to_owned(), "U".to_owned()];
        let args = vec![i32_ty(), Type::prim(Prim::F64)];
        let template = Type::pointer(
            Type::named_struct("T", TypeArgs::new()),
            true,
        );
        assert_eq!(template.substitute(&params, &args), Type::pointer(i32_ty(), true));

        let nested = Type::named_struct(
            "Pair",
            [
                Type::named_struct("T", TypeArgs::new()),
                Type::slice(Type::named_struct("U", TypeArgs::new())),
            ]
            .into_iter()
            .collect(),
        );
        let expected = Type::named_struct(
            "Pair",
            [i32_ty(), Type::slice(Type::prim(Prim::F64))].into_iter().collect(),
        );
        assert_eq!(nested.substitute(&params, &args), expected);
    }

    #[test]
    fn display_round_trip_forms() {
        assert_eq!(Type::pointer(i32_ty(), true).to_string(), "i32*!");
        assert_eq!(Type::pointer(i32_ty(), false).to_string(), "i32*");
        assert_eq!(Type::slice(Type::prim(Prim::U8)).to_string(), "[]u8");
        assert_eq!(Type::array(i32_ty(), 4).to_string(), "i32[4]");
        assert_eq!(
            Type::result(i32_ty(), Type::prim(Prim::Void)).to_string(),
            "result<i32, void>"
        );
        let pair = Type::named_struct("Pair", [i32_ty(), Type::prim(Prim::I64)].into_iter().collect());
        assert_eq!(pair.to_string(), "Pair<i32, i64>");
    }
}
