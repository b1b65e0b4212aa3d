//! Parameter-bound SQL statements

use crate::value::Value;

/// SQL text plus its positional parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

impl Statement {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    pub fn with_params(sql: impl Into<String>, params: Vec<Value>) -> Self {
        Self {
            sql: sql.into(),
            params,
        }
    }
}

/// Identifier quoting format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Delimiter {
    open: char,
    close: char,
}

impl Delimiter {
    /// `"name"` quoting (SQLite, PostgreSQL)
    pub const DOUBLE_QUOTE: Self = Self {
        open: '"',
        close: '"',
    };

    /// `[name]` quoting
    pub const BRACKET: Self = Self {
        open: '[',
        close: ']',
    };

    pub const fn new(open: char, close: char) -> Self {
        Self { open, close }
    }

    /// Quote an identifier, doubling any embedded closing delimiter
    pub fn quote(&self, ident: &str) -> String {
        let mut quoted = String::with_capacity(ident.len() + 2);
        quoted.push(self.open);
        for c in ident.chars() {
            if c == self.close {
                quoted.push(c);
            }
            quoted.push(c);
        }
        quoted.push(self.close);
        quoted
    }
}

impl Default for Delimiter {
    fn default() -> Self {
        Self::DOUBLE_QUOTE
    }
}
