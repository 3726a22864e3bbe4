//! Placeholder aware sql scanner.
//!
//! The scanner only understands the lexical constructs where a `?` or a `;`
//! must not be interpreted: string literals, quoted identifiers, comments
//! and dollar quoted strings. Everything else is passed through untouched.
use std::fmt;

/// Split `sql` on its `?` placeholders.
///
/// `??` is an escaped `?`, it is folded into the current fragment.
///
/// When `standard_conforming_strings` is `false`, backslash escapes are
/// active in every string literal, otherwise only in `E'...'` literals.
pub fn split(sql: &str, standard_conforming_strings: bool) -> Result<Fragments, ParseError> {
    let mut statements = Scanner::new(sql, standard_conforming_strings, false).scan()?;
    Ok(statements.pop().unwrap_or_default())
}

/// Split `sql` into statements on top level `;`, then each statement on its placeholders.
///
/// Blank statements are dropped, a blank input returns a single empty statement.
pub fn split_statements(
    sql: &str,
    standard_conforming_strings: bool,
) -> Result<Vec<Fragments>, ParseError> {
    let mut statements = Scanner::new(sql, standard_conforming_strings, true).scan()?;
    statements.retain(|e| !e.is_empty());
    if statements.is_empty() {
        statements.push(Fragments::default());
    }
    Ok(statements)
}

/// Literal sql text between placeholders.
///
/// There is always one more fragment than placeholders.
#[derive(Clone, PartialEq, Eq)]
pub struct Fragments {
    parts: Vec<String>,
}

impl Fragments {
    pub(crate) fn from_parts(parts: Vec<String>) -> Fragments {
        debug_assert!(!parts.is_empty(), "fragments cannot be empty");
        Self { parts }
    }

    /// Returns the fragments.
    pub fn as_slice(&self) -> &[String] {
        &self.parts
    }

    /// Returns the number of placeholders.
    pub fn placeholder_count(&self) -> usize {
        self.parts.len() - 1
    }

    /// Returns `true` if there is no placeholder and only whitespace.
    pub fn is_empty(&self) -> bool {
        self.parts.len() == 1 && self.parts[0].trim().is_empty()
    }

    /// Render the sql with postgres positional parameters `$1`, `$2`, ...
    pub fn native_sql(&self) -> String {
        let count = self.placeholder_count();
        let len = self.parts.iter().map(String::len).sum::<usize>() + placeholders_len(1, count);

        let mut sql = String::with_capacity(len);
        let mut b = itoa::Buffer::new();
        sql.push_str(&self.parts[0]);
        for (i, part) in self.parts[1..].iter().enumerate() {
            sql.push('$');
            sql.push_str(b.format(i + 1));
            sql.push_str(part);
        }

        debug_assert_eq!(sql.len(), len);
        sql
    }

    /// Returns `true` if the sql is a single row `INSERT .. VALUES (?, ..)` where the
    /// values group consists only of placeholders and nothing follows it.
    pub fn is_rewritable_insert(&self) -> bool {
        let Some((first, rest)) = self.parts.split_first() else {
            return false;
        };
        let Some((last, middle)) = rest.split_last() else {
            return false;
        };

        let head = first.trim_start();
        if !starts_with_keyword(head, "insert") {
            return false;
        }

        let Some(head) = head.trim_end().strip_suffix('(') else {
            return false;
        };
        if !ends_with_keyword(head.trim_end(), "values") {
            return false;
        }

        middle.iter().all(|e| e.trim() == ",") && last.trim() == ")"
    }
}

impl Default for Fragments {
    fn default() -> Self {
        Self { parts: vec![String::new()] }
    }
}

impl fmt::Debug for Fragments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(&self.parts).finish()
    }
}

fn starts_with_keyword(sql: &str, keyword: &str) -> bool {
    sql.get(..keyword.len()).is_some_and(|e| e.eq_ignore_ascii_case(keyword))
        && !sql.as_bytes().get(keyword.len()).copied().is_some_and(is_ident_char)
}

fn ends_with_keyword(sql: &str, keyword: &str) -> bool {
    let Some(start) = sql.len().checked_sub(keyword.len()) else {
        return false;
    };
    sql.get(start..).is_some_and(|e| e.eq_ignore_ascii_case(keyword))
        && !start.checked_sub(1).is_some_and(|i| is_ident_char(sql.as_bytes()[i]))
}

/// Total length of rendered placeholders `$from` through `$to` inclusive.
pub(crate) fn placeholders_len(from: usize, to: usize) -> usize {
    if to < from {
        return 0;
    }
    // a `$` for each, plus the digits
    (to - from + 1) + digits_upto(to) - digits_upto(from - 1)
}

/// Sum of decimal widths of every number in `1..=n`.
fn digits_upto(n: usize) -> usize {
    let mut total = 0;
    let mut lo = 1usize;
    let mut width = 1;
    while lo <= n {
        let next = lo.checked_mul(10);
        let hi = match next {
            Some(next) => (next - 1).min(n),
            None => n,
        };
        total += (hi - lo + 1) * width;
        match next {
            Some(next) => lo = next,
            None => break,
        }
        width += 1;
    }
    total
}

fn is_ident_char(b: u8) -> bool {
    b.is_ascii_alphanumeric() || matches!(b, b'_' | b'$') || b >= 0x80
}

struct Scanner<'a> {
    sql: &'a str,
    bytes: &'a [u8],
    scs: bool,
    split_statements: bool,
    /// Start of the text not yet copied into `current`.
    start: usize,
    current: String,
    parts: Vec<String>,
    statements: Vec<Fragments>,
}

impl<'a> Scanner<'a> {
    fn new(sql: &'a str, scs: bool, split_statements: bool) -> Self {
        Self {
            sql,
            bytes: sql.as_bytes(),
            scs,
            split_statements,
            start: 0,
            current: String::new(),
            parts: vec![],
            statements: vec![],
        }
    }

    fn scan(mut self) -> Result<Vec<Fragments>, ParseError> {
        let len = self.bytes.len();
        let mut i = 0;

        while i < len {
            i = match self.bytes[i] {
                b'\'' => self.single_quote(i)?,
                b'"' => self.double_quote(i)?,
                b'-' if self.peek(i + 1) == Some(b'-') => self.line_comment(i),
                b'/' if self.peek(i + 1) == Some(b'*') => self.block_comment(i)?,
                b'$' => self.dollar_quote(i)?,
                b'?' if self.peek(i + 1) == Some(b'?') => {
                    // keep one `?`, drop the escape
                    self.current.push_str(&self.sql[self.start..i + 1]);
                    self.start = i + 2;
                    i + 2
                },
                b'?' => {
                    self.current.push_str(&self.sql[self.start..i]);
                    self.parts.push(std::mem::take(&mut self.current));
                    self.start = i + 1;
                    i + 1
                },
                b';' if self.split_statements => {
                    self.end_statement(i);
                    self.start = i + 1;
                    i + 1
                },
                _ => i + 1,
            };
        }

        self.end_statement(len);
        Ok(self.statements)
    }

    fn end_statement(&mut self, end: usize) {
        self.current.push_str(&self.sql[self.start..end]);
        self.parts.push(std::mem::take(&mut self.current));
        let parts = std::mem::take(&mut self.parts);
        self.statements.push(Fragments::from_parts(parts));
    }

    fn peek(&self, i: usize) -> Option<u8> {
        self.bytes.get(i).copied()
    }

    /// `E'..'` where `E` is not the tail of an identifier.
    fn is_escape_string(&self, quote: usize) -> bool {
        let Some(prefix) = quote.checked_sub(1) else {
            return false;
        };
        matches!(self.bytes[prefix], b'e' | b'E')
            && !prefix.checked_sub(1).is_some_and(|i| is_ident_char(self.bytes[i]))
    }

    fn single_quote(&self, open: usize) -> Result<usize, ParseError> {
        let escapes = !self.scs || self.is_escape_string(open);
        let mut i = open + 1;
        while i < self.bytes.len() {
            match self.bytes[i] {
                b'\\' if escapes => i += 2,
                // doubled quote continues the literal
                b'\'' if self.peek(i + 1) == Some(b'\'') => i += 2,
                b'\'' => return Ok(i + 1),
                _ => i += 1,
            }
        }
        Err(ParseError::UnterminatedQuote { offset: open })
    }

    fn double_quote(&self, open: usize) -> Result<usize, ParseError> {
        match self.bytes[open + 1..].iter().position(|e| *e == b'"') {
            Some(i) => Ok(open + 1 + i + 1),
            None => Err(ParseError::UnterminatedIdentifier { offset: open }),
        }
    }

    fn line_comment(&self, open: usize) -> usize {
        match self.bytes[open..].iter().position(|e| matches!(e, b'\n' | b'\r')) {
            Some(i) => open + i + 1,
            None => self.bytes.len(),
        }
    }

    fn block_comment(&self, open: usize) -> Result<usize, ParseError> {
        let mut depth = 1;
        let mut i = open + 2;
        while i < self.bytes.len() {
            match (self.bytes[i], self.peek(i + 1)) {
                (b'/', Some(b'*')) => {
                    depth += 1;
                    i += 2;
                },
                (b'*', Some(b'/')) => {
                    depth -= 1;
                    i += 2;
                    if depth == 0 {
                        return Ok(i);
                    }
                },
                _ => i += 1,
            }
        }
        Err(ParseError::UnterminatedComment { offset: open })
    }

    fn dollar_quote(&self, open: usize) -> Result<usize, ParseError> {
        // `a$b` is an identifier, `$1` is a positional parameter
        if open.checked_sub(1).is_some_and(|i| is_ident_char(self.bytes[i]))
            || self.peek(open + 1).is_some_and(|e| e.is_ascii_digit())
        {
            return Ok(open + 1);
        }

        let mut end = open + 1;
        while self.peek(end).is_some_and(|e| is_ident_char(e) && e != b'$') {
            end += 1;
        }
        if self.peek(end) != Some(b'$') {
            return Ok(open + 1);
        }

        let tag = &self.sql[open..end + 1];
        match self.sql[end + 1..].find(tag) {
            Some(i) => Ok(end + 1 + i + tag.len()),
            None => Err(ParseError::UnterminatedDollarQuote {
                offset: open,
                tag: tag.to_owned(),
            }),
        }
    }
}

/// An error when sql cannot be scanned.
///
/// Contains the byte offset where the unterminated construct starts.
pub enum ParseError {
    UnterminatedQuote { offset: usize },
    UnterminatedIdentifier { offset: usize },
    UnterminatedComment { offset: usize },
    UnterminatedDollarQuote { offset: usize, tag: String },
}

impl std::error::Error for ParseError { }

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnterminatedQuote { offset } => {
                write!(f, "unterminated string literal started at offset {offset}")
            },
            Self::UnterminatedIdentifier { offset } => {
                write!(f, "unterminated quoted identifier started at offset {offset}")
            },
            Self::UnterminatedComment { offset } => {
                write!(f, "unterminated block comment started at offset {offset}")
            },
            Self::UnterminatedDollarQuote { offset, tag } => {
                write!(f, "unterminated dollar quote `{tag}` started at offset {offset}")
            },
        }
    }
}

impl fmt::Debug for ParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "\"{self}\"")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn parts(sql: &str) -> Vec<String> {
        split(sql, true).unwrap().as_slice().to_vec()
    }

    #[test]
    fn placeholder_count() {
        assert_eq!(parts("SELECT ?, ?, ?").len(), 4);
        assert_eq!(parts("SELECT 1").len(), 1);
        assert_eq!(parts("?").len(), 2);
        assert_eq!(parts(""), [""]);
    }

    #[test]
    fn escaped_placeholder() {
        assert_eq!(parts("SELECT ?? FROM t"), ["SELECT ? FROM t"]);
        assert_eq!(parts("SELECT ???"), ["SELECT ?", ""]);
        assert_eq!(split("a ?? b ? c", true).unwrap().placeholder_count(), 1);
    }

    #[test]
    fn quote_aware() {
        assert_eq!(parts("SELECT '?' , ? "), ["SELECT '?' , ", " "]);
        assert_eq!(parts("SELECT \"a?\" FROM t WHERE x = ?").len(), 2);
        assert_eq!(parts("SELECT 'it''s ?', ?").len(), 2);
        assert_eq!(parts("SELECT ? -- what?\n, ?").len(), 3);
        assert_eq!(parts("SELECT /* ? /* ? */ ? */ ?").len(), 2);
        assert_eq!(parts("SELECT $$?$$, $a$ $$ ? $a$, ?").len(), 2);
        assert_eq!(parts("SELECT a$b, ?, $1").len(), 2);
    }

    #[test]
    fn backslash_escapes() {
        // not standard conforming, backslash escapes the quote
        let frags = split(r"SELECT 'a\'?', ?", false).unwrap();
        assert_eq!(frags.placeholder_count(), 1);

        // standard conforming, backslash is literal
        let frags = split(r"SELECT 'a\', ?", true).unwrap();
        assert_eq!(frags.placeholder_count(), 1);

        // escape string prefix
        let frags = split(r"SELECT E'a\'?', ?", true).unwrap();
        assert_eq!(frags.placeholder_count(), 1);

        // `e` ending an identifier is not a prefix
        let frags = split(r"SELECT some'a\', ?", true).unwrap();
        assert_eq!(frags.placeholder_count(), 1);
    }

    #[test]
    fn unterminated() {
        assert!(matches!(split("SELECT 'abc", true), Err(ParseError::UnterminatedQuote { offset: 7 })));
        assert!(matches!(split("SELECT \"abc", true), Err(ParseError::UnterminatedIdentifier { .. })));
        assert!(matches!(split("SELECT /* /* */", true), Err(ParseError::UnterminatedComment { .. })));
        assert!(matches!(
            split("SELECT $x$ abc $y$", true),
            Err(ParseError::UnterminatedDollarQuote { ref tag, .. }) if tag == "$x$"
        ));
        // line comment ends at eof
        assert!(split("SELECT 1 -- done", true).is_ok());
    }

    #[test]
    fn native_sql() {
        let frags = split("INSERT INTO t VALUES (?,?)", true).unwrap();
        assert_eq!(frags.native_sql(), "INSERT INTO t VALUES ($1,$2)");

        let sql = vec!["?"; 12].join(",");
        let native = split(&sql, true).unwrap().native_sql();
        assert!(native.ends_with("$9,$10,$11,$12"));
    }

    #[test]
    fn statements() {
        let stmts = split_statements("SELECT ?; SELECT ';', ?;", true).unwrap();
        assert_eq!(stmts.len(), 2);
        assert_eq!(stmts[0].placeholder_count(), 1);
        assert_eq!(stmts[1].as_slice()[0], " SELECT ';', ");

        let stmts = split_statements(" ; ", true).unwrap();
        assert_eq!(stmts.len(), 1);
        assert!(stmts[0].is_empty());
    }

    #[test]
    fn rewritable_insert() {
        let ok = |sql| split(sql, true).unwrap().is_rewritable_insert();
        assert!(ok("INSERT INTO t VALUES (?,?)"));
        assert!(ok("insert into t(a, b) values(?, ?) "));
        assert!(!ok("INSERT INTO t VALUES (?, 1)"));
        assert!(!ok("INSERT INTO t VALUES (?) RETURNING id"));
        assert!(!ok("INSERT INTO t VALUES (1),(?)"));
        assert!(!ok("INSERT INTO t SELECT ?"));
        assert!(!ok("UPDATE t SET a = ?"));
        assert!(!ok("INSERT INTO t VALUES (1)"));
        assert!(!ok("INSERT INTO myvalues (?)"));
    }

    #[test]
    fn placeholder_len() {
        for count in 0..150 {
            let rendered: usize = (1..=count).map(|i| format!("${i}").len()).sum();
            assert_eq!(placeholders_len(1, count), rendered);
        }
        assert_eq!(placeholders_len(9, 10), "$9$10".len());
        assert_eq!(placeholders_len(99, 100), "$99$100".len());
        assert_eq!(placeholders_len(5, 4), 0);
    }
}
