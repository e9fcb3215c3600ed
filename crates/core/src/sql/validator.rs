use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

use super::tokenizer::{tokenize, Token, TokenKind};

/// Keywords that may never appear as a bare word, whatever the statement type.
pub const DENIED_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "INSERT", "UPDATE", "ALTER", "TRUNCATE", "CREATE", "REPLACE", "GRANT",
    "REVOKE", "EXECUTE", "EXEC", "CALL", "COPY", "IMPORT", "LOAD",
];

pub const DEFAULT_ALLOWED_TABLES: &[&str] = &["managers", "issuers", "filings", "holdings"];

pub const DEFAULT_MAX_LIMIT: u32 = 1000;

/// Words that end a FROM source list or follow a source without being an alias.
const CLAUSE_KEYWORDS: &[&str] = &[
    "WHERE", "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "OUTER", "ON", "USING",
    "GROUP", "ORDER", "LIMIT", "OFFSET", "HAVING", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
    "INDEXED", "NOT",
];

/// Words that end an ON expression.
const CONSTRAINT_TERMINATORS: &[&str] = &[
    "JOIN", "INNER", "LEFT", "RIGHT", "FULL", "CROSS", "NATURAL", "WHERE", "GROUP", "ORDER",
    "LIMIT", "HAVING", "UNION", "EXCEPT", "INTERSECT", "WINDOW",
];

/// First words of a parenthesized source that make it a subquery.
const SUBQUERY_KEYWORDS: &[&str] = &["SELECT", "VALUES", "WITH"];

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum SafetyError {
    #[error("Empty SQL query")]
    Empty,
    #[error("Multiple SQL statements not allowed (SQL injection prevention)")]
    MultipleStatements,
    #[error("Only SELECT statements allowed, got {keyword}")]
    NotSelect { keyword: String },
    #[error("Dangerous keyword not allowed: {keyword}")]
    ForbiddenKeyword { keyword: String },
    #[error("No tables found in query")]
    NoTables,
    #[error("Invalid table(s): {}. Allowed tables: {}", tables.join(", "), allowed.join(", "))]
    DisallowedTables { tables: Vec<String>, allowed: Vec<String> },
    #[error("LIMIT {requested} exceeds maximum allowed ({max})")]
    LimitTooLarge { requested: u64, max: u32 },
    #[error("Invalid LIMIT value: {raw}")]
    InvalidLimit { raw: String },
    #[error("Unterminated string literal or quoted identifier")]
    UnterminatedLiteral,
}

/// A single, whitelisted, bounded SELECT. Only the validator can build one.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SanitizedQuery {
    sql: String,
}

impl SanitizedQuery {
    pub fn as_str(&self) -> &str {
        &self.sql
    }

    pub fn into_string(self) -> String {
        self.sql
    }
}

impl fmt::Display for SanitizedQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SqlValidator {
    allowed_tables: BTreeSet<String>,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_TABLES.iter().copied())
    }
}

impl SqlValidator {
    pub fn new<I, S>(allowed_tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let allowed_tables =
            allowed_tables.into_iter().map(|table| table.as_ref().trim().to_lowercase()).collect();
        Self { allowed_tables }
    }

    pub fn allowed_tables(&self) -> impl Iterator<Item = &str> {
        self.allowed_tables.iter().map(String::as_str)
    }

    pub fn is_allowed(&self, table: &str) -> bool {
        self.allowed_tables.contains(&table.to_lowercase())
    }

    /// Checks `raw` and returns the text that may be executed.
    ///
    /// A statement without a top-level LIMIT gets `LIMIT {max_limit}` appended
    /// to its semicolon-stripped text; a statement with a compliant LIMIT is
    /// returned unchanged.
    pub fn validate(&self, raw: &str, max_limit: u32) -> Result<SanitizedQuery, SafetyError> {
        if raw.trim().is_empty() {
            return Err(SafetyError::Empty);
        }

        let tokens = tokenize(raw).map_err(|_| SafetyError::UnterminatedLiteral)?;
        let body = single_statement(&tokens)?;

        let first = body.first().ok_or(SafetyError::Empty)?;
        if !first.is_keyword("SELECT") {
            return Err(SafetyError::NotSelect { keyword: leading_keyword(first) });
        }

        if let Some(denied) = body.iter().find_map(denied_keyword) {
            return Err(SafetyError::ForbiddenKeyword { keyword: denied.to_string() });
        }

        self.check_tables(&source_tables(body))?;

        match top_level_limit(body) {
            Some(position) => {
                check_limit(&body[position + 1..], max_limit)?;
                Ok(SanitizedQuery { sql: raw.to_string() })
            }
            None => {
                let end = body.last().map_or(raw.len(), |token| token.span.end);
                let statement = raw[..end].trim_end();
                Ok(SanitizedQuery { sql: format!("{statement} LIMIT {max_limit}") })
            }
        }
    }

    fn check_tables(&self, tables: &BTreeSet<String>) -> Result<(), SafetyError> {
        if tables.is_empty() {
            return Err(SafetyError::NoTables);
        }

        let disallowed: Vec<String> =
            tables.iter().filter(|table| !self.allowed_tables.contains(*table)).cloned().collect();
        if disallowed.is_empty() {
            return Ok(());
        }

        Err(SafetyError::DisallowedTables {
            tables: disallowed,
            allowed: self.allowed_tables.iter().cloned().collect(),
        })
    }
}

/// Validates against the default Form 13F whitelist.
pub fn validate(raw: &str, max_limit: u32) -> Result<SanitizedQuery, SafetyError> {
    SqlValidator::default().validate(raw, max_limit)
}

/// Returns the tokens of the only statement, rejecting anything after the
/// first semicolon.
fn single_statement<'t, 'a>(tokens: &'t [Token<'a>]) -> Result<&'t [Token<'a>], SafetyError> {
    match tokens.iter().position(|token| token.kind == TokenKind::Semicolon) {
        Some(position) if position + 1 < tokens.len() => Err(SafetyError::MultipleStatements),
        Some(position) => Ok(&tokens[..position]),
        None => Ok(tokens),
    }
}

fn leading_keyword(token: &Token<'_>) -> String {
    token.text.chars().take(20).collect::<String>().to_uppercase()
}

fn denied_keyword(token: &Token<'_>) -> Option<&'static str> {
    if token.kind != TokenKind::Word {
        return None;
    }
    DENIED_KEYWORDS.iter().copied().find(|keyword| token.text.eq_ignore_ascii_case(keyword))
}

fn is_clause_keyword(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Word
        && CLAUSE_KEYWORDS.iter().any(|keyword| token.text.eq_ignore_ascii_case(keyword))
}

/// Collects every relation named in a FROM or JOIN source list, at any
/// nesting depth. Comma-separated sources, parenthesized sources and sources
/// that follow a join constraint are all included. Names are case-folded and
/// stripped of schema qualification.
fn source_tables(tokens: &[Token<'_>]) -> BTreeSet<String> {
    let mut tables = BTreeSet::new();

    for (index, token) in tokens.iter().enumerate() {
        if token.is_keyword("FROM") || token.is_keyword("JOIN") {
            collect_source_list(tokens, index + 1, &mut tables);
        }
    }

    tables
}

/// Walks `source [alias] [hint] [constraint] (, source ...)*` from `index`.
/// JOINs inside the list are picked up by the caller's scan.
fn collect_source_list(tokens: &[Token<'_>], mut cursor: usize, tables: &mut BTreeSet<String>) {
    loop {
        let Some(next) = read_source(tokens, cursor, tables) else {
            return;
        };
        let next = skip_join_constraint(tokens, skip_index_hint(tokens, skip_alias(tokens, next)));
        match tokens.get(next) {
            Some(separator) if separator.is_punct(',') => cursor = next + 1,
            _ => return,
        }
    }
}

/// Reads one source at `index` and returns the index just past it. A
/// parenthesized source that is not a subquery is walked as a source list,
/// so `(sqlite_master)` counts as a table.
fn read_source(tokens: &[Token<'_>], index: usize, tables: &mut BTreeSet<String>) -> Option<usize> {
    let token = tokens.get(index)?;

    if token.is_punct('(') {
        let subquery = tokens.get(index + 1).is_some_and(|inner| {
            SUBQUERY_KEYWORDS.iter().any(|keyword| inner.is_keyword(keyword))
        });
        if !subquery {
            collect_source_list(tokens, index + 1, tables);
        }
        return Some(skip_parenthesized(tokens, index));
    }

    let (name, next) = qualified_name(tokens, index)?;
    tables.insert(name.to_lowercase());
    Some(skip_parenthesized(tokens, next))
}

/// Reads `name` or `schema.name` starting at `index`. Returns the last part
/// and the index just past it.
fn qualified_name(tokens: &[Token<'_>], index: usize) -> Option<(String, usize)> {
    let mut name = tokens.get(index)?.identifier()?;
    let mut cursor = index + 1;

    while tokens.get(cursor).is_some_and(|token| token.is_punct('.')) {
        match tokens.get(cursor + 1).and_then(Token::identifier) {
            Some(part) => {
                name = part;
                cursor += 2;
            }
            None => break,
        }
    }

    Some((name, cursor))
}

/// Skips a parenthesized group starting at `index`, such as the arguments of
/// `FROM json_each(...)` or a derived table.
fn skip_parenthesized(tokens: &[Token<'_>], index: usize) -> usize {
    if !tokens.get(index).is_some_and(|token| token.is_punct('(')) {
        return index;
    }

    let mut depth = 0usize;
    for (offset, token) in tokens[index..].iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth = depth.saturating_sub(1);
            if depth == 0 {
                return index + offset + 1;
            }
        }
    }
    tokens.len()
}

fn skip_alias(tokens: &[Token<'_>], index: usize) -> usize {
    match tokens.get(index) {
        Some(token) if token.is_keyword("AS") => index + 2,
        Some(token)
            if matches!(token.kind, TokenKind::Word | TokenKind::QuotedIdent)
                && !is_clause_keyword(token) =>
        {
            index + 1
        }
        _ => index,
    }
}

/// Skips `INDEXED BY name` or `NOT INDEXED` after a source.
fn skip_index_hint(tokens: &[Token<'_>], index: usize) -> usize {
    match (tokens.get(index), tokens.get(index + 1)) {
        (Some(first), Some(second)) if first.is_keyword("INDEXED") && second.is_keyword("BY") => {
            index + 3
        }
        (Some(first), Some(second)) if first.is_keyword("NOT") && second.is_keyword("INDEXED") => {
            index + 2
        }
        _ => index,
    }
}

/// Skips `USING (...)` or an `ON` expression. The expression ends at a comma,
/// a closing parenthesis or a keyword that starts the next join or clause,
/// all at the expression's own depth.
fn skip_join_constraint(tokens: &[Token<'_>], index: usize) -> usize {
    match tokens.get(index) {
        Some(token) if token.is_keyword("USING") => skip_parenthesized(tokens, index + 1),
        Some(token) if token.is_keyword("ON") => {
            let mut depth = 0usize;
            for (offset, token) in tokens[index + 1..].iter().enumerate() {
                if token.is_punct('(') {
                    depth += 1;
                } else if token.is_punct(')') {
                    if depth == 0 {
                        return index + 1 + offset;
                    }
                    depth -= 1;
                } else if depth == 0 && (token.is_punct(',') || ends_join_constraint(token)) {
                    return index + 1 + offset;
                }
            }
            tokens.len()
        }
        _ => index,
    }
}

fn ends_join_constraint(token: &Token<'_>) -> bool {
    token.kind == TokenKind::Word
        && CONSTRAINT_TERMINATORS.iter().any(|keyword| token.text.eq_ignore_ascii_case(keyword))
}

/// Position of the last LIMIT keyword outside any parentheses.
fn top_level_limit(tokens: &[Token<'_>]) -> Option<usize> {
    let mut depth = 0i32;
    let mut found = None;

    for (index, token) in tokens.iter().enumerate() {
        if token.is_punct('(') {
            depth += 1;
        } else if token.is_punct(')') {
            depth -= 1;
        } else if depth == 0 && token.is_keyword("LIMIT") {
            found = Some(index);
        }
    }

    found
}

/// Accepts `LIMIT n`, `LIMIT n OFFSET m` and `LIMIT m, n`; the row count `n`
/// must be a plain integer no larger than `max_limit`.
fn check_limit(after_limit: &[Token<'_>], max_limit: u32) -> Result<(), SafetyError> {
    let invalid = |token: Option<&Token<'_>>| SafetyError::InvalidLimit {
        raw: token.map(|token| token.text.to_string()).unwrap_or_default(),
    };

    let first = after_limit.first();
    let first_value = first.and_then(integer_value).ok_or_else(|| invalid(first))?;

    let row_count = match after_limit.get(1) {
        None => first_value,
        Some(token) if token.is_keyword("OFFSET") => first_value,
        Some(token) if token.is_punct(',') => {
            let count = after_limit.get(2);
            let value = count.and_then(integer_value).ok_or_else(|| invalid(count))?;
            if after_limit.len() > 3 {
                return Err(invalid(after_limit.get(3)));
            }
            value
        }
        Some(other) => return Err(invalid(Some(other))),
    };

    if row_count > u64::from(max_limit) {
        return Err(SafetyError::LimitTooLarge { requested: row_count, max: max_limit });
    }

    Ok(())
}

fn integer_value(token: &Token<'_>) -> Option<u64> {
    if token.kind != TokenKind::Number {
        return None;
    }
    token.text.parse::<u64>().ok()
}
