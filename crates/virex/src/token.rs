//! Token model for the Virex lexer.
//!
//! Token kinds cover the full keyword set (including the C-ABI interop
//! types), the operator set used by the AST (`->`, `=>`, `::`, `..`, `...`),
//! delimiters, and literals. The keyword table is the `EnumString` derive:
//! kinds whose serialized form is a source spelling parse from that
//! spelling, everything else lexes as an identifier.

use std::fmt;

use strum::{EnumString, IntoStaticStr};

/// All token kinds produced by the lexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, IntoStaticStr)]
pub enum TokenKind {
    // --- Keywords ---
    #[strum(serialize = "var")]
    Var,
    #[strum(serialize = "const")]
    Const,
    #[strum(serialize = "func")]
    Func,
    #[strum(serialize = "if")]
    If,
    #[strum(serialize = "else")]
    Else,
    #[strum(serialize = "while")]
    While,
    #[strum(serialize = "for")]
    For,
    #[strum(serialize = "return")]
    Return,
    #[strum(serialize = "struct")]
    Struct,
    #[strum(serialize = "enum")]
    Enum,
    #[strum(serialize = "unsafe")]
    Unsafe,
    #[strum(serialize = "break")]
    Break,
    #[strum(serialize = "continue")]
    Continue,
    #[strum(serialize = "public")]
    Public,
    #[strum(serialize = "module")]
    Module,
    #[strum(serialize = "import")]
    Import,
    #[strum(serialize = "extern")]
    Extern,
    #[strum(serialize = "as")]
    As,
    #[strum(serialize = "match")]
    Match,
    #[strum(serialize = "result")]
    Result,
    #[strum(serialize = "packed")]
    Packed,
    #[strum(serialize = "fail")]
    Fail,
    #[strum(serialize = "null")]
    Null,
    #[strum(serialize = "in")]
    In,
    #[strum(serialize = "cast")]
    Cast,

    // --- Primitive type names ---
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

    // --- C ABI interop types ---
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

    // --- Operators ---
    #[strum(serialize = "+")]
    Plus,
    #[strum(serialize = "-")]
    Minus,
    #[strum(serialize = "*")]
    Star,
    #[strum(serialize = "/")]
    Slash,
    #[strum(serialize = "%")]
    Percent,
    #[strum(serialize = "=")]
    Eq,
    #[strum(serialize = "==")]
    EqEq,
    #[strum(serialize = "!")]
    Bang,
    #[strum(serialize = "!=")]
    BangEq,
    #[strum(serialize = "<")]
    Lt,
    #[strum(serialize = "<=")]
    LtEq,
    #[strum(serialize = ">")]
    Gt,
    #[strum(serialize = ">=")]
    GtEq,
    #[strum(serialize = "&")]
    Amp,
    #[strum(serialize = "&&")]
    AmpAmp,
    #[strum(serialize = "|")]
    Pipe,
    #[strum(serialize = "||")]
    PipePipe,
    #[strum(serialize = "->")]
    Arrow,
    #[strum(serialize = "=>")]
    FatArrow,

    // --- Delimiters ---
    #[strum(serialize = "{")]
    LBrace,
    #[strum(serialize = "}")]
    RBrace,
    #[strum(serialize = "(")]
    LParen,
    #[strum(serialize = ")")]
    RParen,
    #[strum(serialize = "[")]
    LBracket,
    #[strum(serialize = "]")]
    RBracket,
    #[strum(serialize = ";")]
    Semicolon,
    #[strum(serialize = ",")]
    Comma,
    #[strum(serialize = ".")]
    Dot,
    #[strum(serialize = ":")]
    Colon,
    #[strum(serialize = "::")]
    ColonColon,
    #[strum(serialize = "..")]
    DotDot,
    #[strum(serialize = "...")]
    Ellipsis,

    // --- Literals ---
    #[strum(serialize = "integer")]
    Integer,
    #[strum(serialize = "float")]
    Float,
    #[strum(serialize = "string")]
    Str,
    #[strum(serialize = "true")]
    True,
    #[strum(serialize = "false")]
    False,

    // --- Special ---
    #[strum(serialize = "identifier")]
    Identifier,
    #[strum(serialize = "eof")]
    Eof,
    #[strum(serialize = "error")]
    Error,
}

impl TokenKind {
    /// Returns the token kind for a keyword spelling, or `None` for a plain
    /// identifier.
    ///
    /// Literal and special kinds share serialized forms with identifiers
    /// that are never keywords (`integer`, `eof`, ...), so the few of them
    /// that could collide are filtered here rather than made reserved words.
    pub fn keyword(ident: &str) -> Option<Self> {
        let kind: Self = ident.parse().ok()?;
        match kind {
            Self::Integer | Self::Float | Self::Str | Self::Identifier | Self::Eof | Self::Error => None,
            other => Some(other),
        }
    }

    /// True for the primitive type name tokens (`i8` .. `cstring`).
    pub fn is_type_name(self) -> bool {
        matches!(
            self,
            Self::I8
                | Self::I16
                | Self::I32
                | Self::I64
                | Self::U8
                | Self::U16
                | Self::U32
                | Self::U64
                | Self::F32
                | Self::F64
                | Self::Bool
                | Self::Void
                | Self::CChar
                | Self::CShort
                | Self::CUShort
                | Self::CInt
                | Self::CUInt
                | Self::CLong
                | Self::CULong
                | Self::CLongLong
                | Self::CULongLong
                | Self::CLongDouble
                | Self::CString
        )
    }
}

/// Literal payload attached to a token.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum TokenValue {
    #[default]
    None,
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

/// A single lexed token with its source location (1-indexed).
#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub lexeme: String,
    pub line: usize,
    pub column: usize,
    pub value: TokenValue,
}

impl Token {
    pub fn new(kind: TokenKind, lexeme: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            kind,
            lexeme: lexeme.into(),
            line,
            column,
            value: TokenValue::None,
        }
    }

    /// The integer payload, or 0 when the token is not an integer literal.
    pub fn int_value(&self) -> i64 {
        match self.value {
            TokenValue::Int(v) => v,
            _ => 0,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} '{}' at {}:{}", self.kind, self.lexeme, self.line, self.column)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keywords_parse_from_spelling() {
        assert_eq!(TokenKind::keyword("func"), Some(TokenKind::Func));
        assert_eq!(TokenKind::keyword("i32"), Some(TokenKind::I32));
        assert_eq!(TokenKind::keyword("cstring"), Some(TokenKind::CString));
        assert_eq!(TokenKind::keyword("true"), Some(TokenKind::True));
        assert_eq!(TokenKind::keyword("main"), None);
        assert_eq!(TokenKind::keyword("integer"), None);
    }

    #[test]
    fn kind_display_round_trips_type_names() {
        for kind in [TokenKind::I8, TokenKind::U64, TokenKind::F32, TokenKind::Bool] {
            assert_eq!(TokenKind::keyword(&kind.to_string()), Some(kind));
        }
    }
}
