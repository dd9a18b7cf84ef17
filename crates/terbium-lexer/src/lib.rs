//! terbium-lexer — analyse lexicale pour Terbium
//!
//! Faits saillants :
//! - `Lexer` + `LexerOptions` : commentaires `//`, `/* */` (imbriqués), ident/keywords, nombres
//!   (2/8/10/16, `_`, floats + exposant), **chaînes** avec échappements
//! - chaque `Token` porte son genre, son lexème (tranche de la source) et un `Span`
//!   (offsets + ligne/colonne calculées via **LineMap**)
//! - les erreurs ne coupent pas le flux : un caractère inconnu ou un littéral
//!   malformé produit un jeton `TokenKind::Error` et l’analyse continue
//! - `Lexer` est un `Iterator` fini qui se termine par un unique `Eof`
//!
//! Exemple éclair :
//! ```
//! use terbium_lexer::{Lexer, TokenKind};
//!
//! let kinds: Vec<_> = Lexer::new("let x = 1;").map(|t| t.kind).collect();
//! assert_eq!(kinds.last(), Some(&TokenKind::Eof));
//! ```

#![warn(missing_docs)]

use core::fmt;
use std::num::IntErrorKind;

use terbium_core::{Pos, Position, Span};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ─────────────────────────── Options & LineMap ─────────────────────────── */

/// Options du lexer.
#[derive(Debug, Clone, Copy)]
pub struct LexerOptions {
    /// Autoriser commentaires blocs imbriqués `/* ... /* .. */ ... */`.
    pub nested_block_comments: bool,
}

impl Default for LexerOptions {
    fn default() -> Self {
        Self { nested_block_comments: true }
    }
}

/// Table des lignes pour (byte offset) → (ligne, colonne).
#[derive(Debug, Clone)]
pub struct LineMap {
    /// Offsets des débuts de lignes (toujours contient 0).
    pub line_starts: Vec<u32>,
}

impl LineMap {
    /// Construit la table à partir d’un `&str`.
    pub fn new(src: &str) -> Self {
        let mut ls = Vec::with_capacity(64);
        ls.push(0);
        for (i, b) in src.bytes().enumerate() {
            if b == b'\n' {
                ls.push(offset(i + 1));
            }
        }
        Self { line_starts: ls }
    }

    /// Convertit un `Pos` en (ligne, colonne), 1-based.
    pub fn line_col(&self, pos: Pos) -> (u32, u32) {
        let off = pos.0;
        let idx = match self.line_starts.binary_search(&off) {
            Ok(i) => i,
            Err(i) => i.saturating_sub(1),
        };
        let line_start = self.line_starts.get(idx).copied().unwrap_or(0);
        let col = off.saturating_sub(line_start) + 1;
        (offset(idx) + 1, col)
    }

    /// Position complète d’un offset.
    pub fn position(&self, pos: Pos) -> Position {
        let (line, column) = self.line_col(pos);
        Position { line, column, offset: pos.0 }
    }

    /// Span `[start, end)` annoté de la ligne/colonne du début.
    pub fn span(&self, start: Pos, end: Pos) -> Span {
        let (line, column) = self.line_col(start);
        Span::new(start, end, line, column)
    }
}

/* ─────────────────────────── Tokens ─────────────────────────── */

/// Mots-clés reconnus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Keyword {
    /// `fn`
    Fn,
    /// `let`
    Let,
    /// `if`
    If,
    /// `else`
    Else,
    /// `while`
    While,
    /// `return`
    Return,
    /// `break`
    Break,
    /// `continue`
    Continue,
    /// `true`
    True,
    /// `false`
    False,
    /// `null`
    Null,
}

impl Keyword {
    /// Texte source du mot-clé.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Fn => "fn",
            Self::Let => "let",
            Self::If => "if",
            Self::Else => "else",
            Self::While => "while",
            Self::Return => "return",
            Self::Break => "break",
            Self::Continue => "continue",
            Self::True => "true",
            Self::False => "false",
            Self::Null => "null",
        }
    }
}

/// Genre de jeton lexical.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind<'a> {
    /// Fin de la source (toujours le dernier jeton).
    Eof,
    /// Jeton invalide : l’erreur est portée par le jeton, le flux continue.
    Error(LexErrorKind),
    /// Identifiant (les mots-clés sont reclassés dans `Kw`).
    Ident(&'a str),
    /// Mot-clé.
    Kw(Keyword),
    /// Littéral entier (i64).
    Int(i64),
    /// Littéral flottant (f64).
    Float(f64),
    /// Littéral chaîne (décodée).
    Str(String),
    /// `(`
    LParen,
    /// `)`
    RParen,
    /// `{`
    LBrace,
    /// `}`
    RBrace,
    /// `[`
    LBracket,
    /// `]`
    RBracket,
    /// `,`
    Comma,
    /// `;`
    Semi,
    /// `+`
    Plus,
    /// `-`
    Minus,
    /// `*`
    Star,
    /// `/`
    Slash,
    /// `%`
    Percent,
    /// `=`
    Eq,
    /// `==`
    EqEq,
    /// `!=`
    Ne,
    /// `<`
    Lt,
    /// `<=`
    Le,
    /// `>`
    Gt,
    /// `>=`
    Ge,
    /// `&&`
    AndAnd,
    /// `||`
    OrOr,
    /// `!`
    Bang,
}

impl TokenKind<'_> {
    /// Description courte pour les messages « attendu … ».
    pub fn describe(&self) -> String {
        match self {
            Self::Eof => "end of input".into(),
            Self::Error(e) => format!("invalid token ({e})"),
            Self::Ident(s) => format!("identifier `{s}`"),
            Self::Kw(k) => format!("`{}`", k.as_str()),
            Self::Int(i) => format!("integer `{i}`"),
            Self::Float(x) => format!("float `{x:?}`"),
            Self::Str(_) => "string literal".into(),
            other => format!("`{}`", other.punct().unwrap_or("?")),
        }
    }

    /// Texte d’une ponctuation ou d’un opérateur.
    pub const fn punct(&self) -> Option<&'static str> {
        Some(match self {
            Self::LParen => "(",
            Self::RParen => ")",
            Self::LBrace => "{",
            Self::RBrace => "}",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::Comma => ",",
            Self::Semi => ";",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Star => "*",
            Self::Slash => "/",
            Self::Percent => "%",
            Self::Eq => "=",
            Self::EqEq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::AndAnd => "&&",
            Self::OrOr => "||",
            Self::Bang => "!",
            _ => return None,
        })
    }
}

/// Jeton : genre, lexème (tranche de la source) et localisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Token<'a> {
    /// Genre.
    pub kind: TokenKind<'a>,
    /// Texte source exact du jeton (vide pour `Eof`).
    pub lexeme: &'a str,
    /// Localisation (offsets + ligne/colonne du début).
    pub span: Span,
}

impl Token<'_> {
    /// Position du début du jeton.
    pub const fn position(&self) -> Position { self.span.position() }
    /// Vrai pour le jeton de fin.
    pub const fn is_eof(&self) -> bool { matches!(self.kind, TokenKind::Eof) }
}

/* ─────────────────────────── Erreurs ─────────────────────────── */

/// Genre d’erreur lexicale (porté par `TokenKind::Error`).
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LexErrorKind {
    /// Caractère inattendu.
    UnexpectedChar(char),
    /// Commentaire bloc non terminé.
    UnterminatedBlockComment,
    /// Chaîne non terminée.
    UnterminatedString,
    /// Séquence d’échappement invalide.
    InvalidEscape,
    /// Littéral numérique invalide.
    InvalidNumber,
    /// Dépassement entier i64.
    IntOverflow,
}

impl fmt::Display for LexErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedChar(c) => write!(f, "unexpected character {c:?}"),
            Self::UnterminatedBlockComment => f.write_str("unterminated block comment"),
            Self::UnterminatedString => f.write_str("unterminated string literal"),
            Self::InvalidEscape => f.write_str("invalid escape sequence"),
            Self::InvalidNumber => f.write_str("invalid number literal"),
            Self::IntOverflow => f.write_str("integer literal overflows i64"),
        }
    }
}

/* ─────────────────────────── Lexer ─────────────────────────── */

/// Analyseur lexical (itératif, paresseux).
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    src: &'a str,
    bytes: &'a [u8],
    /// Position courante en bytes.
    off: usize,
    /// Options.
    opts: LexerOptions,
    /// `Eof` déjà rendu par l’itérateur.
    done: bool,
    /// Table des lignes (exposée pour diagnostics).
    pub lines: LineMap,
}

impl<'a> Lexer<'a> {
    /// Crée un lexer avec options par défaut.
    pub fn new(src: &'a str) -> Self {
        Self::with_options(src, LexerOptions::default())
    }

    /// Crée un lexer avec `LexerOptions`.
    pub fn with_options(src: &'a str, opts: LexerOptions) -> Self {
        Self { src, bytes: src.as_bytes(), off: 0, opts, done: false, lines: LineMap::new(src) }
    }

    /// Source analysée.
    pub const fn source(&self) -> &'a str { self.src }

    /// Prochain jeton. Une fois la fin atteinte, renvoie `Eof` indéfiniment.
    pub fn next_token(&mut self) -> Token<'a> {
        if let Some(tok) = self.skip_ws_and_comments() {
            return tok;
        }
        let start = self.off;
        let Some(c) = self.bump_char() else {
            return self.make(TokenKind::Eof, start);
        };

        let kind = match c {
            ch if is_ident_start(ch) => {
                self.consume_while(|b| is_ident_continue(b as char));
                let s = &self.src[start..self.off];
                keyword_of(s).map_or(TokenKind::Ident(s), TokenKind::Kw)
            }
            ch if ch.is_ascii_digit() => self.lex_number(start, ch),
            '"' => self.lex_string(),

            '=' => if self.eat('=') { TokenKind::EqEq } else { TokenKind::Eq },
            '!' => if self.eat('=') { TokenKind::Ne } else { TokenKind::Bang },
            '<' => if self.eat('=') { TokenKind::Le } else { TokenKind::Lt },
            '>' => if self.eat('=') { TokenKind::Ge } else { TokenKind::Gt },
            '&' => if self.eat('&') { TokenKind::AndAnd } else { TokenKind::Error(LexErrorKind::UnexpectedChar('&')) },
            '|' => if self.eat('|') { TokenKind::OrOr } else { TokenKind::Error(LexErrorKind::UnexpectedChar('|')) },

            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,

            other => TokenKind::Error(LexErrorKind::UnexpectedChar(other)),
        };

        self.make(kind, start)
    }

    /// Tokenise toute la source (le dernier jeton est `Eof`).
    pub fn tokenize(self) -> Vec<Token<'a>> {
        self.collect()
    }

    /* ────────── Primitives internes ────────── */

    #[inline] fn is_eof(&self) -> bool { self.off >= self.bytes.len() }
    #[inline] fn peek(&self) -> Option<u8> { self.bytes.get(self.off).copied() }
    #[inline] fn peek2(&self) -> Option<u8> { self.bytes.get(self.off + 1).copied() }
    #[inline] fn peek_char(&self) -> Option<char> { self.src[self.off..].chars().next() }
    #[inline] fn bump_char(&mut self) -> Option<char> {
        let c = self.peek_char()?;
        self.off += c.len_utf8();
        Some(c)
    }
    #[inline] fn eat(&mut self, ch: char) -> bool {
        if self.peek_char() == Some(ch) { self.off += ch.len_utf8(); true } else { false }
    }

    fn consume_while(&mut self, mut p: impl FnMut(u8) -> bool) {
        while let Some(b) = self.peek() {
            if p(b) { self.off += 1; } else { break; }
        }
    }

    fn skip_ws_and_comments(&mut self) -> Option<Token<'a>> {
        loop {
            while let Some(c) = self.peek_char() {
                if c.is_whitespace() { self.off += c.len_utf8(); } else { break; }
            }
            if self.peek() == Some(b'/') && self.peek2() == Some(b'/') {
                self.off += 2;
                while let Some(c) = self.bump_char() {
                    if c == '\n' { break; }
                }
                continue;
            }
            if self.peek() == Some(b'/') && self.peek2() == Some(b'*') {
                let start = self.off;
                self.off += 2;
                let mut depth = 1u32;
                loop {
                    if self.is_eof() {
                        return Some(self.make(TokenKind::Error(LexErrorKind::UnterminatedBlockComment), start));
                    }
                    if self.opts.nested_block_comments && self.peek() == Some(b'/') && self.peek2() == Some(b'*') {
                        self.off += 2; depth += 1; continue;
                    }
                    if self.peek() == Some(b'*') && self.peek2() == Some(b'/') {
                        self.off += 2; depth -= 1;
                        if depth == 0 { break; }
                        continue;
                    }
                    self.bump_char();
                }
                continue;
            }
            return None;
        }
    }

    /// Le `"` ouvrant est déjà consommé. En cas d’échappement invalide on lit
    /// quand même jusqu’au `"` fermant pour repartir proprement.
    fn lex_string(&mut self) -> TokenKind<'a> {
        let mut out = String::new();
        let mut bad_escape = false;
        loop {
            let Some(c) = self.bump_char() else {
                return TokenKind::Error(LexErrorKind::UnterminatedString);
            };
            match c {
                '"' => break,
                '\\' => match self.read_escape() {
                    Some(ch) => out.push(ch),
                    None => bad_escape = true,
                },
                other => out.push(other),
            }
        }
        if bad_escape {
            TokenKind::Error(LexErrorKind::InvalidEscape)
        } else {
            TokenKind::Str(out)
        }
    }

    fn read_escape(&mut self) -> Option<char> {
        // ne consomme jamais le `"` fermant
        match self.peek_char()? {
            '"' => { self.off += 1; Some('"') }
            _ => match self.bump_char()? {
                '\\' => Some('\\'),
                '\'' => Some('\''),
                'n' => Some('\n'),
                'r' => Some('\r'),
                't' => Some('\t'),
                '0' => Some('\0'),
                'x' => {
                    let h1 = hex_val(self.peek_char()?)?;
                    self.off += 1;
                    let h2 = hex_val(self.peek_char()?)?;
                    self.off += 1;
                    Some(char::from((h1 << 4) | h2))
                }
                'u' => self.read_unicode_escape(),
                _ => None,
            },
        }
    }

    fn read_unicode_escape(&mut self) -> Option<char> {
        if !self.eat('{') { return None; }
        let start = self.off;
        while let Some(c) = self.peek_char() {
            if c == '}' || c == '"' { break; }
            if !(c.is_ascii_hexdigit() || c == '_') { return None; }
            self.off += 1;
        }
        let raw = self.src[start..self.off].replace('_', "");
        if !self.eat('}') { return None; }
        let v = u32::from_str_radix(&raw, 16).ok()?;
        char::from_u32(v)
    }

    fn lex_number(&mut self, start: usize, first: char) -> TokenKind<'a> {
        if first == '0' {
            let radix = match self.peek() {
                Some(b'x' | b'X') => Some(16),
                Some(b'b' | b'B') => Some(2),
                Some(b'o' | b'O') => Some(8),
                _ => None,
            };
            if let Some(radix) = radix {
                self.off += 1;
                self.consume_while(|b| is_digit_base(b as char, radix) || b == b'_');
                let raw = self.src[start + 2..self.off].replace('_', "");
                return match i64::from_str_radix(&raw, radix) {
                    Ok(v) => TokenKind::Int(v),
                    Err(e) => TokenKind::Error(int_error(e.kind())),
                };
            }
        }

        // Décimal / flottant
        self.consume_while(|b| b.is_ascii_digit() || b == b'_');
        let mut is_float = false;
        if self.peek() == Some(b'.') && self.peek2().is_some_and(|d| d.is_ascii_digit()) {
            is_float = true;
            self.off += 1;
            self.consume_while(|b| b.is_ascii_digit() || b == b'_');
        }
        if matches!(self.peek(), Some(b'e' | b'E')) {
            is_float = true;
            self.off += 1;
            if matches!(self.peek(), Some(b'+' | b'-')) { self.off += 1; }
            self.consume_while(|b| b.is_ascii_digit() || b == b'_');
        }

        let raw = self.src[start..self.off].replace('_', "");
        if is_float {
            // `1e999` déborde vers l’infini : refusé, aucun littéral ne l’écrit
            raw.parse::<f64>()
                .ok()
                .filter(|x| x.is_finite())
                .map_or(TokenKind::Error(LexErrorKind::InvalidNumber), TokenKind::Float)
        } else {
            match raw.parse::<i64>() {
                Ok(v) => TokenKind::Int(v),
                Err(e) => TokenKind::Error(int_error(e.kind())),
            }
        }
    }

    /* ────────── Spans ────────── */

    fn make(&self, kind: TokenKind<'a>, start: usize) -> Token<'a> {
        Token {
            kind,
            lexeme: &self.src[start..self.off],
            span: self.lines.span(Pos(offset(start)), Pos(offset(self.off))),
        }
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Token<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let tok = self.next_token();
        self.done = tok.is_eof();
        Some(tok)
    }
}

/// Tokenise `src` avec les options par défaut.
pub fn tokenize(src: &str) -> Vec<Token<'_>> {
    Lexer::new(src).tokenize()
}

/* ─────────────────────────── Helpers ─────────────────────────── */

#[inline]
#[allow(clippy::cast_possible_truncation)]
const fn offset(i: usize) -> u32 {
    // les sources de plus de 4 Gio saturent
    if i > u32::MAX as usize { u32::MAX } else { i as u32 }
}

#[inline]
fn is_ident_start(c: char) -> bool { c == '_' || c.is_ascii_alphabetic() }

#[inline]
fn is_ident_continue(c: char) -> bool { c == '_' || c.is_ascii_alphanumeric() }

#[inline]
fn is_digit_base(c: char, base: u32) -> bool {
    match base {
        2 => matches!(c, '0' | '1'),
        8 => matches!(c, '0'..='7'),
        16 => c.is_ascii_hexdigit(),
        _ => c.is_ascii_digit(),
    }
}

const fn int_error(kind: &IntErrorKind) -> LexErrorKind {
    match kind {
        IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => LexErrorKind::IntOverflow,
        _ => LexErrorKind::InvalidNumber,
    }
}

#[inline]
fn keyword_of(s: &str) -> Option<Keyword> {
    Some(match s {
        "fn" => Keyword::Fn,
        "let" => Keyword::Let,
        "if" => Keyword::If,
        "else" => Keyword::Else,
        "while" => Keyword::While,
        "return" => Keyword::Return,
        "break" => Keyword::Break,
        "continue" => Keyword::Continue,
        "true" => Keyword::True,
        "false" => Keyword::False,
        "null" => Keyword::Null,
        _ => return None,
    })
}

#[inline]
fn hex_val(c: char) -> Option<u8> {
    c.to_digit(16).and_then(|d| u8::try_from(d).ok())
}

/* ─────────────────────────── Tests ─────────────────────────── */

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn toks(src: &str) -> Vec<TokenKind<'_>> {
        Lexer::new(src).map(|t| t.kind).collect()
    }

    #[test]
    fn idents_keywords() {
        use Keyword::*;
        use TokenKind::*;
        let v = toks("fn let if else while return break continue true false null ident _x x1");
        assert_eq!(
            v,
            vec![
                Kw(Fn), Kw(Let), Kw(If), Kw(Else), Kw(While), Kw(Return), Kw(Break), Kw(Continue),
                Kw(True), Kw(False), Kw(Null), Ident("ident"), Ident("_x"), Ident("x1"), Eof,
            ]
        );
    }

    #[test]
    fn numbers_and_floats() {
        use TokenKind::*;
        let v = toks("0xFF 0o77 0b1010 123 1_234 12.34 1e3 2.5e-2");
        assert_eq!(v[0], Int(255));
        assert_eq!(v[1], Int(63));
        assert_eq!(v[2], Int(10));
        assert_eq!(v[3], Int(123));
        assert_eq!(v[4], Int(1234));
        assert_eq!(v[5], Float(12.34));
        assert_eq!(v[6], Float(1000.0));
        assert_eq!(v[7], Float(0.025));
    }

    #[test]
    fn number_errors_are_tokens() {
        use TokenKind::*;
        let v = toks("9223372036854775807 9223372036854775808 0x 1e+");
        assert_eq!(v[0], Int(i64::MAX));
        assert_eq!(v[1], Error(LexErrorKind::IntOverflow));
        assert_eq!(v[2], Error(LexErrorKind::InvalidNumber));
        assert_eq!(v[3], Error(LexErrorKind::InvalidNumber));
        assert_eq!(v[4], Eof);
    }

    #[test]
    fn float_overflow_is_invalid() {
        use TokenKind::*;
        let v = toks("1e999 2e308 1.7976931348623157e308");
        assert_eq!(v[0], Error(LexErrorKind::InvalidNumber));
        assert_eq!(v[1], Error(LexErrorKind::InvalidNumber));
        assert_eq!(v[2], Float(f64::MAX));
    }

    #[test]
    fn strings_escapes() {
        use TokenKind::*;
        let v = toks(r#""hi" "\n" "\x41" "\u{1F600}" "a\"b" "tab\there" "é""#);
        assert_eq!(v[0], Str("hi".into()));
        assert_eq!(v[1], Str("\n".into()));
        assert_eq!(v[2], Str("A".into()));
        assert_eq!(v[3], Str("😀".into()));
        assert_eq!(v[4], Str("a\"b".into()));
        assert_eq!(v[5], Str("tab\there".into()));
        assert_eq!(v[6], Str("é".into()));
    }

    #[test]
    fn bad_escape_resyncs_after_string() {
        use TokenKind::*;
        let v = toks(r#""a\qb" 1"#);
        assert_eq!(v, vec![Error(LexErrorKind::InvalidEscape), Int(1), Eof]);
    }

    #[test]
    fn unterminated_string() {
        let v = toks("\"abc");
        assert_eq!(v, vec![TokenKind::Error(LexErrorKind::UnterminatedString), TokenKind::Eof]);
    }

    #[test]
    fn comments_ws() {
        use TokenKind::*;
        let v = toks("/* a /* nested */ still */ + // line\n 1");
        assert_eq!(v, vec![Plus, Int(1), Eof]);
        assert_eq!(toks("  // only a comment"), vec![Eof]);
        assert_eq!(toks(""), vec![Eof]);
    }

    #[test]
    fn unterminated_block_comment() {
        let v = toks("1 /* never closed");
        assert_eq!(v[1], TokenKind::Error(LexErrorKind::UnterminatedBlockComment));
        assert_eq!(v[2], TokenKind::Eof);
    }

    #[test]
    fn ops_punct_maximal_munch() {
        use TokenKind::*;
        let v = toks("== != <= >= && || ! + - * / % ( ) { } [ ] , ; < > = ===");
        assert_eq!(
            v,
            vec![
                EqEq, Ne, Le, Ge, AndAnd, OrOr, Bang, Plus, Minus, Star, Slash, Percent, LParen, RParen,
                LBrace, RBrace, LBracket, RBracket, Comma, Semi, Lt, Gt, Eq, EqEq, Eq, Eof,
            ]
        );
    }

    #[test]
    fn unexpected_chars_do_not_abort() {
        use TokenKind::*;
        let v = toks("1 @ 2 & 3 § 4");
        assert_eq!(
            v,
            vec![
                Int(1),
                Error(LexErrorKind::UnexpectedChar('@')),
                Int(2),
                Error(LexErrorKind::UnexpectedChar('&')),
                Int(3),
                Error(LexErrorKind::UnexpectedChar('§')),
                Int(4),
                Eof,
            ]
        );
    }

    #[test]
    fn lexemes_and_positions() {
        let toks: Vec<Token<'_>> = tokenize("let x =\n  42;");
        assert_eq!(toks[0].lexeme, "let");
        assert_eq!(toks[3].lexeme, "42");
        assert_eq!(toks[3].position(), Position { line: 2, column: 3, offset: 10 });
        let eof = toks.last().unwrap();
        assert!(eof.is_eof());
        assert_eq!(eof.lexeme, "");
        assert_eq!(eof.span.start, Pos(13));
    }

    #[test]
    fn iterator_is_finite() {
        let mut lx = Lexer::new("x");
        assert!(lx.next().is_some());
        assert!(lx.next().is_some_and(|t| t.is_eof()));
        assert!(lx.next().is_none());
        // l’API bas niveau continue de rendre Eof
        assert!(lx.next_token().is_eof());
    }

    #[test]
    fn linemap_basic() {
        let src = "a\nbb\nccc";
        let lm = LineMap::new(src);
        assert_eq!(lm.line_col(Pos(0)), (1, 1));
        assert_eq!(lm.line_col(Pos(2)), (2, 1));
        assert_eq!(lm.line_col(Pos(4)), (2, 3));
        assert_eq!(lm.line_col(Pos(5)), (3, 1));
        assert_eq!(lm.line_col(Pos(7)), (3, 3));
    }

    proptest::proptest! {
        #[test]
        fn never_panics_and_ends_with_eof(src in "\\PC{0,64}") {
            let toks = tokenize(&src);
            proptest::prop_assert!(toks.last().is_some_and(Token::is_eof));
            proptest::prop_assert_eq!(toks.iter().filter(|t| t.is_eof()).count(), 1);
        }
    }
}
