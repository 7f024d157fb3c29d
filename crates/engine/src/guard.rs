//! Guard-expression evaluation.
//!
//! Steps can carry a `when` expression gating whether their deeper
//! resolution is needed. The grammar is a small closed language over named
//! symbols meaning "artifact X is bound":
//!
//! ```text
//! expr := or
//! or   := and ( "||" and )*
//! and  := cmp ( "&&" cmp )*
//! cmp  := ident "==" "nil" | ident "!=" "nil" | "(" expr ")"
//! ```
//!
//! A symbol absent from the supplied table evaluates as unbound. The
//! expression states the condition under which deeper resolution IS
//! required, so a `false` result means the step is satisfied by inputs
//! already at hand. Alongside the boolean the evaluator reports the
//! *witness*: the last symbol it accessed and found bound, which is the
//! artifact a satisfied step republishes.

use indexmap::IndexSet;
use thiserror::Error;

/// Result of evaluating a guard expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Evaluation {
    /// True when the guard is satisfied by already-bound inputs, i.e. the
    /// expression evaluated to `false` and deeper resolution can be skipped.
    pub satisfied: bool,
    /// Last symbol accessed during evaluation that was bound.
    pub witness: Option<String>,
}

/// Guard parse failures; always fatal to the render.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum GuardError {
    /// A character outside the grammar.
    #[error("unexpected character {character:?} at byte {position}")]
    UnexpectedCharacter {
        /// The offending character.
        character: char,
        /// Byte offset in the expression.
        position: usize,
    },
    /// A token where another was required.
    #[error("unexpected {found:?}, expected {expected}")]
    UnexpectedToken {
        /// What was found.
        found: String,
        /// What the grammar required.
        expected: &'static str,
    },
    /// The expression ended mid-production.
    #[error("expression ended unexpectedly, expected {expected}")]
    UnexpectedEnd {
        /// What the grammar required.
        expected: &'static str,
    },
}

/// Evaluates `expression` against the set of bound symbol names.
pub fn evaluate(expression: &str, bound: &IndexSet<String>) -> Result<Evaluation, GuardError> {
    let tokens = tokenize(expression)?;
    let mut parser = Parser { tokens, position: 0 };
    let tree = parser.parse_or()?;
    if let Some(token) = parser.peek() {
        return Err(GuardError::UnexpectedToken {
            found: token.describe(),
            expected: "end of expression",
        });
    }

    let mut witness = None;
    let value = eval(&tree, bound, &mut witness);
    Ok(Evaluation {
        satisfied: !value,
        witness,
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Nil,
    Eq,
    Neq,
    And,
    Or,
    Open,
    Close,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Ident(name) => name.clone(),
            Token::Nil => "nil".to_string(),
            Token::Eq => "==".to_string(),
            Token::Neq => "!=".to_string(),
            Token::And => "&&".to_string(),
            Token::Or => "||".to_string(),
            Token::Open => "(".to_string(),
            Token::Close => ")".to_string(),
        }
    }
}

fn is_symbol_char(character: char) -> bool {
    character.is_ascii_alphanumeric() || matches!(character, '_' | '-' | '.')
}

fn tokenize(expression: &str) -> Result<Vec<Token>, GuardError> {
    let mut tokens = Vec::new();
    let mut chars = expression.char_indices().peekable();

    while let Some((position, character)) = chars.next() {
        match character {
            ' ' | '\t' => {}
            '(' => tokens.push(Token::Open),
            ')' => tokens.push(Token::Close),
            '=' => match chars.next() {
                Some((_, '=')) => tokens.push(Token::Eq),
                _ => return Err(GuardError::UnexpectedCharacter { character, position }),
            },
            '!' => match chars.next() {
                Some((_, '=')) => tokens.push(Token::Neq),
                _ => return Err(GuardError::UnexpectedCharacter { character, position }),
            },
            '&' => match chars.next() {
                Some((_, '&')) => tokens.push(Token::And),
                _ => return Err(GuardError::UnexpectedCharacter { character, position }),
            },
            '|' => match chars.next() {
                Some((_, '|')) => tokens.push(Token::Or),
                _ => return Err(GuardError::UnexpectedCharacter { character, position }),
            },
            _ if is_symbol_char(character) => {
                let mut symbol = String::new();
                symbol.push(character);
                while let Some((_, next)) = chars.peek() {
                    if !is_symbol_char(*next) {
                        break;
                    }
                    symbol.push(*next);
                    chars.next();
                }
                if symbol == "nil" {
                    tokens.push(Token::Nil);
                } else {
                    tokens.push(Token::Ident(symbol));
                }
            }
            _ => return Err(GuardError::UnexpectedCharacter { character, position }),
        }
    }

    Ok(tokens)
}

#[derive(Debug)]
enum Expr {
    Unbound(String),
    Bound(String),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
}

struct Parser {
    tokens: Vec<Token>,
    position: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.position).cloned();
        if token.is_some() {
            self.position += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, GuardError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, GuardError> {
        let mut left = self.parse_comparison()?;
        while self.peek() == Some(&Token::And) {
            self.advance();
            let right = self.parse_comparison()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, GuardError> {
        match self.advance() {
            Some(Token::Open) => {
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::Close) => Ok(inner),
                    Some(token) => Err(GuardError::UnexpectedToken {
                        found: token.describe(),
                        expected: "')'",
                    }),
                    None => Err(GuardError::UnexpectedEnd { expected: "')'" }),
                }
            }
            Some(Token::Ident(symbol)) => {
                let negated = match self.advance() {
                    Some(Token::Eq) => false,
                    Some(Token::Neq) => true,
                    Some(token) => {
                        return Err(GuardError::UnexpectedToken {
                            found: token.describe(),
                            expected: "'==' or '!='",
                        });
                    }
                    None => return Err(GuardError::UnexpectedEnd { expected: "'==' or '!='" }),
                };
                match self.advance() {
                    Some(Token::Nil) => {
                        if negated {
                            Ok(Expr::Bound(symbol))
                        } else {
                            Ok(Expr::Unbound(symbol))
                        }
                    }
                    Some(token) => Err(GuardError::UnexpectedToken {
                        found: token.describe(),
                        expected: "'nil'",
                    }),
                    None => Err(GuardError::UnexpectedEnd { expected: "'nil'" }),
                }
            }
            Some(token) => Err(GuardError::UnexpectedToken {
                found: token.describe(),
                expected: "a symbol or '('",
            }),
            None => Err(GuardError::UnexpectedEnd {
                expected: "a symbol or '('",
            }),
        }
    }
}

fn eval(expression: &Expr, bound: &IndexSet<String>, witness: &mut Option<String>) -> bool {
    match expression {
        Expr::Unbound(symbol) => {
            if bound.contains(symbol) {
                *witness = Some(symbol.clone());
                false
            } else {
                true
            }
        }
        Expr::Bound(symbol) => {
            if bound.contains(symbol) {
                *witness = Some(symbol.clone());
                true
            } else {
                false
            }
        }
        Expr::And(left, right) => eval(left, bound, witness) && eval(right, bound, witness),
        Expr::Or(left, right) => eval(left, bound, witness) || eval(right, bound, witness),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound(symbols: &[&str]) -> IndexSet<String> {
        symbols.iter().map(|symbol| symbol.to_string()).collect()
    }

    #[test]
    fn bound_symbol_satisfies_unbound_check() {
        let evaluation = evaluate("postgresql == nil", &bound(&["postgresql"])).unwrap();
        assert!(evaluation.satisfied);
        assert_eq!(evaluation.witness.as_deref(), Some("postgresql"));
    }

    #[test]
    fn absent_symbol_keeps_the_deeper_path() {
        let evaluation = evaluate("postgresql == nil", &bound(&[])).unwrap();
        assert!(!evaluation.satisfied);
        assert_eq!(evaluation.witness, None);
    }

    #[test]
    fn negated_check_inverts() {
        let evaluation = evaluate("config != nil", &bound(&["config"])).unwrap();
        assert!(!evaluation.satisfied);
        assert_eq!(evaluation.witness.as_deref(), Some("config"));

        let evaluation = evaluate("config != nil", &bound(&[])).unwrap();
        assert!(evaluation.satisfied);
        assert_eq!(evaluation.witness, None);
    }

    #[test]
    fn conjunction_needs_every_symbol_unbound() {
        let table = bound(&["config"]);
        let evaluation = evaluate("postgresql == nil && config == nil", &table).unwrap();
        assert!(evaluation.satisfied);
        assert_eq!(evaluation.witness.as_deref(), Some("config"));

        let evaluation = evaluate("postgresql == nil && config == nil", &bound(&[])).unwrap();
        assert!(!evaluation.satisfied);
    }

    #[test]
    fn disjunction_short_circuits_on_the_first_unbound() {
        let evaluation = evaluate("postgresql == nil || config == nil", &bound(&["config"])).unwrap();
        assert!(!evaluation.satisfied);
    }

    #[test]
    fn parentheses_group_subexpressions() {
        let table = bound(&["a", "b"]);
        let evaluation = evaluate("(a == nil || b == nil) && c != nil", &table).unwrap();
        assert!(evaluation.satisfied);
    }

    #[test]
    fn symbols_with_dashes_and_dots_are_accepted() {
        let evaluation = evaluate("app-config.v1 == nil", &bound(&["app-config.v1"])).unwrap();
        assert!(evaluation.satisfied);
        assert_eq!(evaluation.witness.as_deref(), Some("app-config.v1"));
    }

    #[test]
    fn malformed_expressions_are_rejected() {
        assert!(evaluate("", &bound(&[])).is_err());
        assert!(evaluate("postgresql ==", &bound(&[])).is_err());
        assert!(evaluate("postgresql = nil", &bound(&[])).is_err());
        assert!(evaluate("postgresql == nil &&", &bound(&[])).is_err());
        assert!(evaluate("(postgresql == nil", &bound(&[])).is_err());
        assert!(evaluate("postgresql == nil nil", &bound(&[])).is_err());
        assert!(evaluate("a == b", &bound(&[])).is_err());
    }

    #[test]
    fn witness_tracks_the_last_bound_access() {
        let table = bound(&["a", "b"]);
        let evaluation = evaluate("a != nil && b == nil", &table).unwrap();
        assert!(evaluation.satisfied);
        assert_eq!(evaluation.witness.as_deref(), Some("b"));
    }
}
