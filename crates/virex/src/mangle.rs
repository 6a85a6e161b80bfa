//! Name mangling.
//!
//! All emitted names are built here so the module prefix, separator, and
//! instantiation encoding stay consistent between the analyzer, the IR
//! generator, and the C emitter. Module prefixes sanitize `.` and `:` to
//! `_` (module names may come from dotted paths like `std.math`).

use crate::types::Type;

/// Replaces every non-identifier character with `_`.
pub fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// `<module>__<name>`, with the module part sanitized.
pub fn qualified(module: &str, name: &str) -> String {
    format!("{}__{}", sanitize(module), name)
}

/// `Base_arg1_arg2`, using each argument type's display form.
///
/// With no arguments the base name is returned untouched, so non-generic
/// symbols round-trip through this unchanged.
pub fn instantiation(base: &str, args: &[Type]) -> String {
    if args.is_empty() {
        return base.to_owned();
    }
    let mut out = base.to_owned();
    for arg in args {
        out.push('_');
        out.push_str(&arg.to_string());
    }
    out
}

/// Mangled name for a function as emitted into C.
///
/// `main` in the main module stays `main`; `main` elsewhere and every other
/// function gets the module prefix.
pub fn function(module: &str, name: &str, is_main_module: bool) -> String {
    if name == "main" && is_main_module {
        "main".to_owned()
    } else {
        qualified(module, name)
    }
}
