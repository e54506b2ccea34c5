//! Query classifier - read-only gate for caller-supplied SQL
//!
//! Decides whether SQL text may be sent to the database. The check is
//! syntactic: the text is tokenized with PostgreSQL's lexical rules, comments
//! are dropped, whitespace collapsed, and the result is matched against a
//! leading-keyword rule, a keyword denylist and a per-statement rule.
//!
//! Tokenizing with the server's own rules means dollar-quoted strings
//! (`$$…$$`, `$tag$…$tag$`) and escape strings (`E'…'`) are literals here
//! too, so comment markers or `;` inside them cannot hide what follows. Text
//! the tokenizer cannot close (an unterminated literal or comment) is rejected.
//!
//! This is a denylist, not a grammar-complete guarantee. Keywords inside quoted
//! literals are still matched, so `SELECT 'DROP' AS label` is rejected, and a
//! side-effecting function called from a SELECT is not detected at all.
//! Callers exposing the gateway to untrusted multi-tenant input should also
//! connect with a read-only role.

use std::sync::LazyLock;

use regex::Regex;
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};
use thiserror::Error;

static WHITESPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static LEADING_SELECT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^SELECT\b").expect("Invalid select regex"));

static FORBIDDEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"\b(INSERT|UPDATE|DELETE|MERGE|CREATE|ALTER|DROP|TRUNCATE|EXECUTE|EXEC|BULK|GRANT|REVOKE|DENY|SP_\w*|XP_\w*)\b",
    )
    .expect("Invalid denylist regex")
});

/// The rule a rejected query broke
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Rejection {
    #[error("query is empty after removing comments and whitespace")]
    Empty,

    #[error("query cannot be tokenized: {0}")]
    Malformed(String),

    #[error("only SELECT queries are allowed")]
    NotSelect,

    #[error("forbidden keyword '{0}'")]
    ForbiddenKeyword(String),

    #[error("every statement must be a SELECT")]
    TrailingStatement,
}

impl Rejection {
    /// Stable machine-readable rule name
    pub fn rule(&self) -> &'static str {
        match self {
            Self::Empty => "empty",
            Self::Malformed(_) => "malformed",
            Self::NotSelect => "not_select",
            Self::ForbiddenKeyword(_) => "forbidden_keyword",
            Self::TrailingStatement => "trailing_statement",
        }
    }
}

/// Outcome of classifying one query
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allowed,
    Rejected(Rejection),
}

impl Verdict {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed)
    }

    pub fn into_result(self) -> Result<(), Rejection> {
        match self {
            Self::Allowed => Ok(()),
            Self::Rejected(rejection) => Err(rejection),
        }
    }
}

/// Classify `query`. Pure: the same text always yields the same verdict.
pub fn classify(query: &str) -> Verdict {
    match check(query) {
        Ok(()) => Verdict::Allowed,
        Err(rejection) => Verdict::Rejected(rejection),
    }
}

/// Strip comments, collapse whitespace and trim. Literals keep their content.
pub fn normalize(query: &str) -> Result<String, Rejection> {
    tokenize(query).map(|tokens| render(&tokens))
}

fn check(query: &str) -> Result<(), Rejection> {
    let tokens = tokenize(query)?;

    let folded = render(&tokens).to_uppercase();
    if folded.is_empty() {
        return Err(Rejection::Empty);
    }

    if !LEADING_SELECT_RE.is_match(&folded) {
        return Err(Rejection::NotSelect);
    }

    if let Some(found) = FORBIDDEN_RE.find(&folded) {
        return Err(Rejection::ForbiddenKeyword(found.as_str().to_string()));
    }

    let statements: Vec<String> = tokens
        .split(|token| matches!(token, Token::SemiColon))
        .map(|statement| render(statement).to_uppercase())
        .filter(|statement| !statement.is_empty())
        .collect();

    if statements.len() > 1
        && !statements
            .iter()
            .all(|statement| LEADING_SELECT_RE.is_match(statement))
    {
        return Err(Rejection::TrailingStatement);
    }

    Ok(())
}

fn tokenize(query: &str) -> Result<Vec<Token>, Rejection> {
    Tokenizer::new(&PostgreSqlDialect {}, query)
        .tokenize()
        .map_err(|e| Rejection::Malformed(e.to_string()))
}

/// Render tokens back to text, comments replaced by a single space
fn render(tokens: &[Token]) -> String {
    let text: String = tokens
        .iter()
        .map(|token| match token {
            Token::Whitespace(
                Whitespace::SingleLineComment { .. } | Whitespace::MultiLineComment(_),
            ) => " ".to_string(),
            Token::EOF => String::new(),
            other => other.to_string(),
        })
        .collect();

    WHITESPACE_RE.replace_all(&text, " ").trim().to_string()
}
