//! Filter expression compiler for the store boundary.
//!
//! Consumes the small predicate grammar accepted by search and query
//! operations (`field = value`, `field IN [v1, v2]`, combined with
//! `AND`/`OR`) and translates it into a parameterized SQL fragment.
//! Only the enumerated chunk fields are filterable; anything else is
//! rejected before it can reach SQL.

use crate::error::{StoreError, StoreResult};
use rusqlite::types::Value as SqlValue;

/// A compiled predicate: SQL with `?` placeholders plus bind values in
/// placeholder order. Columns are qualified with the `c.` alias used
/// by every store query.
#[derive(Debug, Clone)]
pub struct CompiledFilter {
    pub sql: String,
    pub params: Vec<SqlValue>,
}

/// Compile a filter expression, or return a match-all filter for `None`.
pub fn compile(expr: Option<&str>) -> StoreResult<CompiledFilter> {
    match expr {
        Some(expr) if !expr.trim().is_empty() => Parser::new(expr)?.parse(),
        _ => Ok(CompiledFilter {
            sql: "1=1".to_string(),
            params: Vec::new(),
        }),
    }
}

fn column_for(field: &str) -> StoreResult<&'static str> {
    match field {
        "relativePath" | "relative_path" => Ok("c.relative_path"),
        "fileExtension" | "file_extension" => Ok("c.file_extension"),
        "startLine" | "start_line" => Ok("c.start_line"),
        "endLine" | "end_line" => Ok("c.end_line"),
        other => Err(StoreError::InvalidFilter {
            reason: format!(
                "field '{other}' is not filterable; use relativePath, fileExtension, startLine, or endLine"
            ),
        }),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Str(String),
    Num(i64),
    Eq,
    In,
    And,
    Or,
    LBracket,
    RBracket,
    LParen,
    RParen,
    Comma,
}

fn tokenize(input: &str) -> StoreResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = input.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            c if c.is_whitespace() => {
                chars.next();
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                // Accept both `=` and `==`.
                if chars.peek().is_some_and(|&(_, c)| c == '=') {
                    chars.next();
                }
                tokens.push(Token::Eq);
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut value = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    if c == quote {
                        closed = true;
                        break;
                    }
                    value.push(c);
                }
                if !closed {
                    return Err(StoreError::InvalidFilter {
                        reason: format!("unterminated string starting at byte {i}"),
                    });
                }
                tokens.push(Token::Str(value));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut value = String::new();
                value.push(c);
                chars.next();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_ascii_digit() {
                        value.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num = value.parse().map_err(|_| StoreError::InvalidFilter {
                    reason: format!("invalid number '{value}'"),
                })?;
                tokens.push(Token::Num(num));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut word = String::new();
                while let Some(&(_, c)) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        word.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                match word.to_ascii_uppercase().as_str() {
                    "IN" => tokens.push(Token::In),
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    _ => tokens.push(Token::Ident(word)),
                }
            }
            other => {
                return Err(StoreError::InvalidFilter {
                    reason: format!("unexpected character '{other}' at byte {i}"),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn new(input: &str) -> StoreResult<Self> {
        Ok(Self {
            tokens: tokenize(input)?,
            pos: 0,
        })
    }

    fn parse(mut self) -> StoreResult<CompiledFilter> {
        let mut filter = CompiledFilter {
            sql: String::new(),
            params: Vec::new(),
        };
        self.or_expr(&mut filter)?;
        if self.pos < self.tokens.len() {
            return Err(StoreError::InvalidFilter {
                reason: format!("trailing tokens after expression: {:?}", self.tokens[self.pos]),
            });
        }
        Ok(filter)
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> StoreResult<Token> {
        let token = self.tokens.get(self.pos).cloned().ok_or_else(|| {
            StoreError::InvalidFilter {
                reason: "unexpected end of expression".to_string(),
            }
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn or_expr(&mut self, out: &mut CompiledFilter) -> StoreResult<()> {
        self.and_expr(out)?;
        while matches!(self.peek(), Some(Token::Or)) {
            self.pos += 1;
            out.sql.push_str(" OR ");
            self.and_expr(out)?;
        }
        Ok(())
    }

    fn and_expr(&mut self, out: &mut CompiledFilter) -> StoreResult<()> {
        self.primary(out)?;
        while matches!(self.peek(), Some(Token::And)) {
            self.pos += 1;
            out.sql.push_str(" AND ");
            self.primary(out)?;
        }
        Ok(())
    }

    fn primary(&mut self, out: &mut CompiledFilter) -> StoreResult<()> {
        if matches!(self.peek(), Some(Token::LParen)) {
            self.pos += 1;
            out.sql.push('(');
            self.or_expr(out)?;
            match self.next()? {
                Token::RParen => {
                    out.sql.push(')');
                    Ok(())
                }
                other => Err(StoreError::InvalidFilter {
                    reason: format!("expected ')', found {other:?}"),
                }),
            }
        } else {
            self.condition(out)
        }
    }

    fn condition(&mut self, out: &mut CompiledFilter) -> StoreResult<()> {
        let field = match self.next()? {
            Token::Ident(name) => name,
            other => {
                return Err(StoreError::InvalidFilter {
                    reason: format!("expected a field name, found {other:?}"),
                });
            }
        };
        let column = column_for(&field)?;

        match self.next()? {
            Token::Eq => {
                let value = self.value()?;
                out.sql.push_str(column);
                out.sql.push_str(" = ?");
                out.params.push(value);
                Ok(())
            }
            Token::In => {
                match self.next()? {
                    Token::LBracket => {}
                    other => {
                        return Err(StoreError::InvalidFilter {
                            reason: format!("expected '[' after IN, found {other:?}"),
                        });
                    }
                }
                let mut values = vec![self.value()?];
                loop {
                    match self.next()? {
                        Token::Comma => values.push(self.value()?),
                        Token::RBracket => break,
                        other => {
                            return Err(StoreError::InvalidFilter {
                                reason: format!("expected ',' or ']', found {other:?}"),
                            });
                        }
                    }
                }
                out.sql.push_str(column);
                out.sql.push_str(" IN (");
                for (i, value) in values.into_iter().enumerate() {
                    if i > 0 {
                        out.sql.push_str(", ");
                    }
                    out.sql.push('?');
                    out.params.push(value);
                }
                out.sql.push(')');
                Ok(())
            }
            other => Err(StoreError::InvalidFilter {
                reason: format!("expected '=' or IN after '{field}', found {other:?}"),
            }),
        }
    }

    fn value(&mut self) -> StoreResult<SqlValue> {
        match self.next()? {
            Token::Str(s) => Ok(SqlValue::Text(s)),
            Token::Num(n) => Ok(SqlValue::Integer(n)),
            // Bare words are accepted as string values, e.g. `.ts`
            // written without quotes never reaches here, but `ts` can.
            Token::Ident(s) => Ok(SqlValue::Text(s)),
            other => Err(StoreError::InvalidFilter {
                reason: format!("expected a value, found {other:?}"),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_compiles_to_match_all() {
        let filter = compile(None).unwrap();
        assert_eq!(filter.sql, "1=1");
        assert!(filter.params.is_empty());
    }

    #[test]
    fn test_equality() {
        let filter = compile(Some("fileExtension = \".ts\"")).unwrap();
        assert_eq!(filter.sql, "c.file_extension = ?");
        assert_eq!(filter.params, vec![SqlValue::Text(".ts".to_string())]);
    }

    #[test]
    fn test_in_list() {
        let filter = compile(Some("fileExtension in [\".ts\", \".py\"]")).unwrap();
        assert_eq!(filter.sql, "c.file_extension IN (?, ?)");
        assert_eq!(filter.params.len(), 2);
    }

    #[test]
    fn test_and_or_combination() {
        let filter = compile(Some(
            "relativePath = 'src/lib.rs' AND startLine = 10 OR endLine = 20",
        ))
        .unwrap();
        assert_eq!(
            filter.sql,
            "c.relative_path = ? AND c.start_line = ? OR c.end_line = ?"
        );
        assert_eq!(filter.params.len(), 3);
    }

    #[test]
    fn test_parenthesized_groups() {
        let filter = compile(Some(
            "(fileExtension = '.ts' OR fileExtension = '.py') AND startLine = 1",
        ))
        .unwrap();
        assert!(filter.sql.starts_with('('));
        assert!(filter.sql.contains(") AND "));
    }

    #[test]
    fn test_double_equals_accepted() {
        let filter = compile(Some("relativePath == \"src/lib.rs\"")).unwrap();
        assert_eq!(filter.sql, "c.relative_path = ?");
    }

    #[test]
    fn test_unknown_field_rejected() {
        let err = compile(Some("content = 'x'")).unwrap_err();
        assert!(matches!(err, StoreError::InvalidFilter { .. }));
        assert!(err.to_string().contains("content"));
    }

    #[test]
    fn test_malformed_expressions_rejected() {
        assert!(compile(Some("fileExtension =")).is_err());
        assert!(compile(Some("fileExtension in .ts")).is_err());
        assert!(compile(Some("fileExtension in ['.ts'")).is_err());
        assert!(compile(Some("= '.ts'")).is_err());
        assert!(compile(Some("fileExtension = 'unterminated")).is_err());
    }

    #[test]
    fn test_snake_case_aliases() {
        let filter = compile(Some("file_extension = '.rs' AND relative_path = 'a.rs'")).unwrap();
        assert_eq!(filter.sql, "c.file_extension = ? AND c.relative_path = ?");
    }
}
