//! Propositional formula syntax.
//!
//! Grammar, loosest binding first:
//!
//! ```text
//! iff     := implies ( IFF iff )?
//! implies := or ( IMPLIES implies )?
//! or      := and ( OR and )*
//! and     := unary ( AND unary )*
//! unary   := NOT unary | atom
//! atom    := IDENT | '(' iff ')'
//! ```
//!
//! Every operator accepts its Unicode and ASCII spellings (`¬ ~ !`, `∧ & &&`,
//! `∨ | ||`, `⇒ → ⟹ -> =>`, `⇔ ↔ ⟺ <-> <=>`). Positions are character offsets.

use std::collections::BTreeSet;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use thiserror::Error;

/// Deepest chain of negations, parentheses and right-nested `⇒`/`⇔` accepted.
pub const MAX_NESTING: usize = 256;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("Empty formula")]
    Empty,

    #[error("Unknown token '{token}' at position {position}")]
    UnknownToken { token: char, position: usize },

    #[error("Unbalanced parenthesis at position {position}")]
    UnbalancedParenthesis { position: usize },

    #[error("Unexpected {found} at position {position}")]
    UnexpectedToken { found: String, position: usize },

    #[error("Unexpected end of formula at position {position}")]
    UnexpectedEnd { position: usize },

    #[error("Formula nested deeper than {} levels at position {position}", MAX_NESTING)]
    NestingTooDeep { position: usize },
}

impl ParseError {
    pub fn position(&self) -> usize {
        match self {
            ParseError::Empty => 0,
            ParseError::UnknownToken { position, .. }
            | ParseError::UnbalancedParenthesis { position }
            | ParseError::UnexpectedToken { position, .. }
            | ParseError::UnexpectedEnd { position }
            | ParseError::NestingTooDeep { position } => *position,
        }
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Formula {
    Atom { name: String, position: usize },
    Not(Box<Formula>),
    And(Vec<Formula>),
    Or(Vec<Formula>),
    Implies(Box<Formula>, Box<Formula>),
    Iff(Box<Formula>, Box<Formula>),
}

impl Formula {
    pub fn atom(name: &str) -> Self {
        Formula::Atom { name: name.to_string(), position: 0 }
    }

    pub fn negated(self) -> Self {
        Formula::Not(Box::new(self))
    }

    /// Names of all propositions referenced, in lexicographic order.
    pub fn atoms(&self) -> BTreeSet<&str> {
        let mut names = BTreeSet::new();
        self.collect_atoms(&mut names);
        names
    }

    fn collect_atoms<'a>(&'a self, names: &mut BTreeSet<&'a str>) {
        match self {
            Formula::Atom { name, .. } => { names.insert(name.as_str()); },
            Formula::Not(inner) => inner.collect_atoms(names),
            Formula::And(children) | Formula::Or(children) => {
                for child in children {
                    child.collect_atoms(names);
                }
            }
            Formula::Implies(lhs, rhs) | Formula::Iff(lhs, rhs) => {
                lhs.collect_atoms(names);
                rhs.collect_atoms(names);
            }
        }
    }

    /// Atom occurrences together with their positions in the source text.
    pub fn occurrences(&self) -> Vec<(&str, usize)> {
        let mut found = Vec::new();
        let mut stack = vec![self];
        while let Some(f) = stack.pop() {
            match f {
                Formula::Atom { name, position } => found.push((name.as_str(), *position)),
                Formula::Not(inner) => stack.push(inner),
                Formula::And(children) | Formula::Or(children) => stack.extend(children.iter().rev()),
                Formula::Implies(lhs, rhs) | Formula::Iff(lhs, rhs) => {
                    stack.push(rhs);
                    stack.push(lhs);
                }
            }
        }
        found
    }

    /// Truth value under an assignment of the atoms.
    pub fn evaluate<F>(&self, assignment: &F) -> bool
    where F: Fn(&str) -> bool
    {
        match self {
            Formula::Atom { name, .. } => assignment(name),
            Formula::Not(inner) => !inner.evaluate(assignment),
            Formula::And(children) => children.iter().all(|c| c.evaluate(assignment)),
            Formula::Or(children) => children.iter().any(|c| c.evaluate(assignment)),
            Formula::Implies(lhs, rhs) => !lhs.evaluate(assignment) || rhs.evaluate(assignment),
            Formula::Iff(lhs, rhs) => lhs.evaluate(assignment) == rhs.evaluate(assignment),
        }
    }

    /// Number of nodes in the syntax tree.
    pub fn size(&self) -> usize {
        match self {
            Formula::Atom { .. } => 1,
            Formula::Not(inner) => 1 + inner.size(),
            Formula::And(children) | Formula::Or(children) => {
                1 + children.iter().map(Formula::size).sum::<usize>()
            }
            Formula::Implies(lhs, rhs) | Formula::Iff(lhs, rhs) => 1 + lhs.size() + rhs.size(),
        }
    }
}

impl Display for Formula {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let join = |f: &mut Formatter<'_>, children: &[Formula], op: &str| {
            write!(f, "(")?;
            for (i, child) in children.iter().enumerate() {
                if i > 0 {
                    write!(f, " {op} ")?;
                }
                write!(f, "{child}")?;
            }
            write!(f, ")")
        };

        match self {
            Formula::Atom { name, .. } => write!(f, "{name}"),
            Formula::Not(inner) => write!(f, "¬{inner}"),
            Formula::And(children) => join(f, children, "∧"),
            Formula::Or(children) => join(f, children, "∨"),
            Formula::Implies(lhs, rhs) => write!(f, "({lhs} ⇒ {rhs})"),
            Formula::Iff(lhs, rhs) => write!(f, "({lhs} ⇔ {rhs})"),
        }
    }
}

impl FromStr for Formula {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        parse_formula(s)
    }
}


#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Not,
    And,
    Or,
    Implies,
    Iff,
    LParen,
    RParen,
}

impl Display for Token {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Ident(name) => write!(f, "proposition '{name}'"),
            Token::Not => write!(f, "operator '¬'"),
            Token::And => write!(f, "operator '∧'"),
            Token::Or => write!(f, "operator '∨'"),
            Token::Implies => write!(f, "operator '⇒'"),
            Token::Iff => write!(f, "operator '⇔'"),
            Token::LParen => write!(f, "'('"),
            Token::RParen => write!(f, "')'"),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<(Token, usize)>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    // Matches the ASCII operator spelled by `rest` at the cursor
    let follows = |i: usize, rest: &str| {
        rest.chars().enumerate().all(|(k, c)| chars.get(i + k) == Some(&c))
    };

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        let token = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '(' => { i += 1; Token::LParen }
            ')' => { i += 1; Token::RParen }
            '¬' | '~' | '!' => { i += 1; Token::Not }
            '∧' => { i += 1; Token::And }
            '∨' => { i += 1; Token::Or }
            '⇒' | '→' | '⟹' => { i += 1; Token::Implies }
            '⇔' | '↔' | '⟺' => { i += 1; Token::Iff }
            '&' => { i += if follows(i, "&&") { 2 } else { 1 }; Token::And }
            '|' => { i += if follows(i, "||") { 2 } else { 1 }; Token::Or }
            '-' if follows(i, "->") => { i += 2; Token::Implies }
            '=' if follows(i, "=>") => { i += 2; Token::Implies }
            '<' if follows(i, "<->") || follows(i, "<=>") => { i += 3; Token::Iff }
            c if c.is_ascii_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                Token::Ident(chars[start..i].iter().collect())
            }
            other => return Err(ParseError::UnknownToken { token: other, position: start }),
        };
        tokens.push((token, start));
    }

    Ok(tokens)
}


struct Parser {
    tokens: Vec<(Token, usize)>,
    cursor: usize,
    depth: usize,
    /// Character length of the input, reported for errors at the end of input
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.cursor).map(|(t, _)| t)
    }

    fn next(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.cursor).cloned();
        if token.is_some() {
            self.cursor += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        if self.peek() == Some(expected) {
            self.cursor += 1;
            true
        } else {
            false
        }
    }

    /// Position of the token just consumed
    fn last_position(&self) -> usize {
        self.cursor.checked_sub(1).and_then(|i| self.tokens.get(i)).map_or(self.end, |(_, p)| *p)
    }

    /// Runs `parse` one nesting level deeper.
    fn nested<F>(&mut self, parse: F) -> Result<Formula, ParseError>
    where F: FnOnce(&mut Self) -> Result<Formula, ParseError>
    {
        if self.depth >= MAX_NESTING {
            return Err(ParseError::NestingTooDeep { position: self.last_position() });
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn parse_iff(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_implies()?;
        if self.eat(&Token::Iff) {
            let rhs = self.nested(Self::parse_iff)?;
            return Ok(Formula::Iff(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_implies(&mut self) -> Result<Formula, ParseError> {
        let lhs = self.parse_or()?;
        if self.eat(&Token::Implies) {
            let rhs = self.nested(Self::parse_implies)?;
            return Ok(Formula::Implies(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn parse_or(&mut self) -> Result<Formula, ParseError> {
        let mut operands = vec![self.parse_and()?];
        while self.eat(&Token::Or) {
            operands.push(self.parse_and()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { Formula::Or(operands) })
    }

    fn parse_and(&mut self) -> Result<Formula, ParseError> {
        let mut operands = vec![self.parse_unary()?];
        while self.eat(&Token::And) {
            operands.push(self.parse_unary()?);
        }
        Ok(if operands.len() == 1 { operands.remove(0) } else { Formula::And(operands) })
    }

    fn parse_unary(&mut self) -> Result<Formula, ParseError> {
        if self.eat(&Token::Not) {
            let inner = self.nested(Self::parse_unary)?;
            return Ok(inner.negated());
        }
        self.parse_atom()
    }

    fn parse_atom(&mut self) -> Result<Formula, ParseError> {
        match self.next() {
            Some((Token::Ident(name), position)) => Ok(Formula::Atom { name, position }),
            Some((Token::LParen, open)) => {
                let inner = self.nested(Self::parse_iff)?;
                match self.next() {
                    Some((Token::RParen, _)) => Ok(inner),
                    Some((found, position)) => Err(ParseError::UnexpectedToken { found: found.to_string(), position }),
                    None => Err(ParseError::UnbalancedParenthesis { position: open }),
                }
            }
            Some((Token::RParen, position)) => Err(ParseError::UnbalancedParenthesis { position }),
            Some((found, position)) => Err(ParseError::UnexpectedToken { found: found.to_string(), position }),
            None => Err(ParseError::UnexpectedEnd { position: self.end }),
        }
    }
}

/// Parses a propositional formula.
pub fn parse_formula(text: &str) -> Result<Formula, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser { tokens, cursor: 0, depth: 0, end: text.chars().count() };
    let formula = parser.parse_iff()?;

    // Anything left over after a complete formula
    match parser.next() {
        None => Ok(formula),
        Some((Token::RParen, position)) => Err(ParseError::UnbalancedParenthesis { position }),
        Some((found, position)) => Err(ParseError::UnexpectedToken { found: found.to_string(), position }),
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    fn atom(name: &str, position: usize) -> Formula {
        Formula::Atom { name: name.to_string(), position }
    }

    #[test]
    fn precedence() {
        // ¬ binds tighter than ∧, ∧ tighter than ∨, ∨ tighter than ⇒, ⇒ tighter than ⇔
        let f = parse_formula("¬a ∧ b ∨ c ⇒ d ⇔ e").unwrap();
        let expected = Formula::Iff(
            Box::new(Formula::Implies(
                Box::new(Formula::Or(vec![
                    Formula::And(vec![atom("a", 1).negated(), atom("b", 5)]),
                    atom("c", 9),
                ])),
                Box::new(atom("d", 13)),
            )),
            Box::new(atom("e", 17)),
        );
        assert_eq!(f, expected);
    }

    #[test]
    fn right_associative_implication() {
        let f = parse_formula("a => b => c").unwrap();
        let expected = Formula::Implies(
            Box::new(atom("a", 0)),
            Box::new(Formula::Implies(Box::new(atom("b", 5)), Box::new(atom("c", 10)))),
        );
        assert_eq!(f, expected);

        let g = parse_formula("a <-> b <-> c").unwrap();
        assert!(matches!(g, Formula::Iff(_, ref rhs) if matches!(**rhs, Formula::Iff(_, _))));
    }

    #[test]
    fn ascii_and_unicode_spellings_agree() {
        let pairs = [
            ("¬P_1 ∧ P_2", "~P_1 & P_2"),
            ("P_1 ∨ P_2", "P_1 || P_2"),
            ("P_1 ⟹ P_2", "P_1 -> P_2"),
            ("P_1 → P_2", "P_1 => P_2"),
            ("P_1 ⟺ ¬P_2", "P_1 <=> !P_2"),
            ("P_1 ↔ P_2", "P_1 <-> P_2"),
            ("P_1 && P_2", "P_1 & P_2"),
        ];
        for (unicode, ascii) in pairs {
            let u = parse_formula(unicode).unwrap();
            let a = parse_formula(ascii).unwrap();
            assert_eq!(u.to_string(), a.to_string(), "{unicode} vs {ascii}");
        }
    }

    #[test]
    fn parentheses_override_precedence() {
        let f = parse_formula("¬(P_1 ∧ P_2)").unwrap();
        assert_eq!(f.to_string(), "¬(P_1 ∧ P_2)");
        assert_eq!(f.size(), 4);
        assert_eq!(f.atoms().into_iter().collect::<Vec<_>>(), vec!["P_1", "P_2"]);
    }

    #[test]
    fn evaluation() {
        let f = parse_formula("(a ⇒ b) ∧ (b ⇔ ¬c)").unwrap();
        let assign = |t: &'static [&'static str]| move |name: &str| t.iter().any(|&n| n == name);
        assert!(f.evaluate(&assign(&["a", "b"])));
        assert!(!f.evaluate(&assign(&["a"])));
        assert!(f.evaluate(&assign(&["c"])));
        assert!(!f.evaluate(&assign(&["b", "c"])));
    }

    #[test]
    fn occurrences_report_positions() {
        let f = parse_formula("P_1 ∧ (P_22 ∨ ¬P_1)").unwrap();
        assert_eq!(f.occurrences(), vec![("P_1", 0), ("P_22", 7), ("P_1", 15)]);
    }

    #[test]
    fn errors_carry_positions() {
        assert_eq!(parse_formula(""), Err(ParseError::Empty));
        assert_eq!(parse_formula("   "), Err(ParseError::Empty));
        assert_eq!(
            parse_formula("P_1 ∧ P_2 # P_3"),
            Err(ParseError::UnknownToken { token: '#', position: 10 })
        );
        assert_eq!(
            parse_formula("(P_1 ∧ P_2"),
            Err(ParseError::UnbalancedParenthesis { position: 0 })
        );
        assert_eq!(
            parse_formula("P_1 ∧ P_2)"),
            Err(ParseError::UnbalancedParenthesis { position: 9 })
        );
        assert_eq!(
            parse_formula("P_1 ∧"),
            Err(ParseError::UnexpectedEnd { position: 5 })
        );
        assert!(matches!(
            parse_formula("P_1 P_2"),
            Err(ParseError::UnexpectedToken { position: 4, .. })
        ));
        assert!(matches!(
            parse_formula("∨ P_1"),
            Err(ParseError::UnexpectedToken { position: 0, .. })
        ));
        // a lone '-' is not an operator
        assert_eq!(
            parse_formula("P_1 - P_2"),
            Err(ParseError::UnknownToken { token: '-', position: 4 })
        );
    }

    #[test]
    fn nesting_is_bounded() {
        let deep = format!("{}a ∨ b{}", "(".repeat(10_000), ")".repeat(10_000));
        assert_eq!(parse_formula(&deep), Err(ParseError::NestingTooDeep { position: MAX_NESTING }));

        let negations = format!("{}a", "¬".repeat(200_000));
        assert_eq!(parse_formula(&negations), Err(ParseError::NestingTooDeep { position: MAX_NESTING }));

        let chain = vec!["a"; 2 * MAX_NESTING].join(" ⇒ ");
        assert!(matches!(parse_formula(&chain), Err(ParseError::NestingTooDeep { .. })));

        // the limit itself is still accepted
        let limit = format!("{}a{}", "(".repeat(MAX_NESTING), ")".repeat(MAX_NESTING));
        assert_eq!(parse_formula(&limit), Ok(atom("a", MAX_NESTING)));

        // long flat chains do not nest
        let flat = vec!["a"; 10_000].join(" ∨ ");
        assert!(matches!(parse_formula(&flat), Ok(Formula::Or(ref c)) if c.len() == 10_000));
    }
}
