//! Virex type → C type mapping.
//!
//! Bit-exact widths matter: the fixed-width integers map onto `<stdint.h>`
//! names (except `i64`, which stays `long long` for printf-compatibility
//! with the runtime helpers). Slices materialize as per-element-type
//! structs; results are boxed.

use crate::mangle;
use crate::types::{Prim, Type};

pub fn prim_c_type(prim: Prim) -> &'static str {
    match prim {
        Prim::I8 => "int8_t",
        Prim::I16 => "int16_t",
        Prim::I32 => "int32_t",
        Prim::I64 => "long long",
        Prim::U8 => "uint8_t",
        Prim::U16 => "uint16_t",
        Prim::U32 => "uint32_t",
        Prim::U64 => "uint64_t",
        Prim::F32 => "float",
        Prim::F64 => "double",
        Prim::Bool => "int",
        Prim::Void => "void",
        Prim::CChar => "char",
        Prim::CShort => "short",
        Prim::CUShort => "unsigned short",
        Prim::CInt => "int",
        Prim::CUInt => "unsigned int",
        Prim::CLong => "long",
        Prim::CULong => "unsigned long",
        Prim::CLongLong => "long long",
        Prim::CULongLong => "unsigned long long",
        Prim::CLongDouble => "long double",
        Prim::CString => "const char*",
    }
}

/// True for a bare single-uppercase-letter type name, the shape of an
/// unsubstituted generic parameter. These lower as `long` slots.
fn is_type_param_name(name: &str) -> bool {
    name.len() == 1 && name.as_bytes()[0].is_ascii_uppercase()
}

/// The C spelling of a Virex type. `None` (an unresolved expression) maps
/// to `long`, the generic value slot.
pub fn c_type(ty: Option<&Type>) -> String {
    let Some(ty) = ty else {
        return "long".to_owned();
    };
    match ty {
        Type::Prim(prim) => prim_c_type(*prim).to_owned(),
        Type::Pointer { base, .. } => format!("{}*", c_type(Some(base))),
        Type::Array { elem, size } => format!("{}[{size}]", c_type(Some(elem))),
        Type::Slice { elem } => format!("struct {}", slice_struct_name(&c_type(Some(elem)))),
        Type::Struct { name, .. } => {
            if is_type_param_name(name) {
                "long".to_owned()
            } else {
                format!("struct {name}")
            }
        }
        Type::Enum { name, .. } => format!("enum {name}"),
        Type::Function { .. } => "void*".to_owned(),
        Type::Result { .. } => "struct Result*".to_owned(),
    }
}

/// `Slice_<clean_elem>` for a given element C type: `*` becomes `ptr`,
/// whitespace becomes `_`, everything else is sanitized.
pub fn slice_struct_name(elem_c_type: &str) -> String {
    let cleaned = elem_c_type.replace('*', "_ptr").replace(' ', "_");
    format!("Slice_{}", mangle::sanitize(&cleaned))
}

/// Splits a C type for declaration printing: array types carry a postfix
/// part (`int32_t x[4];`), everything else declares inline.
pub fn split_declarator(c_type: &str) -> (&str, &str) {
    match c_type.find('[') {
        Some(pos) => (&c_type[..pos], &c_type[pos..]),
        None => (c_type, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_width_mapping() {
        assert_eq!(c_type(Some(&Type::prim(Prim::I8))), "int8_t");
        assert_eq!(c_type(Some(&Type::prim(Prim::I64))), "long long");
        assert_eq!(c_type(Some(&Type::prim(Prim::U64))), "uint64_t");
        assert_eq!(c_type(Some(&Type::prim(Prim::Bool))), "int");
        assert_eq!(c_type(None), "long");
    }

    #[test]
    fn composites() {
        let p = Type::pointer(Type::prim(Prim::I32), true);
        assert_eq!(c_type(Some(&p)), "int32_t*");
        let a = Type::array(Type::prim(Prim::I32), 4);
        assert_eq!(c_type(Some(&a)), "int32_t[4]");
        let s = Type::slice(Type::prim(Prim::U8));
        assert_eq!(c_type(Some(&s)), "struct Slice_uint8_t");
        let r = Type::result(Type::prim(Prim::I32), Type::prim(Prim::Void));
        assert_eq!(c_type(Some(&r)), "struct Result*");
    }

    #[test]
    fn generic_parameters_become_long_slots() {
        let t = Type::named_struct("T", Default::default());
        assert_eq!(c_type(Some(&t)), "long");
        let named = Type::named_struct("Point", Default::default());
        assert_eq!(c_type(Some(&named)), "struct Point");
    }

    #[test]
    fn slice_names_stay_identifiers() {
        assert_eq!(slice_struct_name("uint8_t"), "Slice_uint8_t");
        assert_eq!(slice_struct_name("int32_t*"), "Slice_int32_t_ptr");
        assert_eq!(slice_struct_name("struct Pair"), "Slice_struct_Pair");
    }

    #[test]
    fn declarator_split() {
        assert_eq!(split_declarator("int32_t[4]"), ("int32_t", "[4]"));
        assert_eq!(split_declarator("double"), ("double", ""));
    }
}
