//! Safe condition evaluation for branch nodes.
//!
//! Expressions are authored by end users in the visual builder, so the
//! language is deliberately tiny: comparisons joined by `&&`. There is no
//! function call syntax, no assignment, and no access to anything beyond the
//! run's variable store. Evaluation is total and fails closed — any parse
//! problem, missing operand, or non-numeric ordering comparison yields
//! `false` with a diagnostic, never an error or panic.
//!
//! Supported comparisons: `==`, `!=`, `>=`, `<=`, `>`, `<`, `contains`,
//! `not contains`. Operands are `{variable}` templates, quoted strings, or
//! bare literals; both sides are template-resolved before comparison, and
//! ordering operators require both sides to parse as numbers.

use crate::variables::VariableStore;

/// The outcome of evaluating a condition expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verdict {
    /// Whether the condition holds.
    pub holds: bool,
    /// A diagnostic recorded when evaluation failed closed.
    pub diagnostic: Option<String>,
}

impl Verdict {
    fn holds() -> Self {
        Self {
            holds: true,
            diagnostic: None,
        }
    }

    fn fails() -> Self {
        Self {
            holds: false,
            diagnostic: None,
        }
    }

    fn fails_closed(diagnostic: impl Into<String>) -> Self {
        Self {
            holds: false,
            diagnostic: Some(diagnostic.into()),
        }
    }
}

/// Evaluates a condition expression against the run's variables.
///
/// Event context fields are available through the variables seeded at
/// admission (`{name}`, `{service}`, `{date}`, `{time}`, `{message}`).
#[must_use]
pub fn evaluate(expression: &str, variables: &VariableStore) -> Verdict {
    let tokens = tokenize(expression);
    if tokens.is_empty() {
        return Verdict::fails_closed("empty condition expression");
    }

    for clause in tokens.split(|t| !t.quoted && t.text == "&&") {
        let verdict = evaluate_clause(clause, variables);
        if !verdict.holds {
            return verdict;
        }
    }

    Verdict::holds()
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token {
    text: String,
    quoted: bool,
}

/// Comparison operators of the expression language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Comparator {
    Eq,
    Ne,
    Ge,
    Le,
    Gt,
    Lt,
    Contains,
    NotContains,
}

impl Comparator {
    fn symbol(self) -> &'static str {
        match self {
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Ge => ">=",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Lt => "<",
            Self::Contains => "contains",
            Self::NotContains => "not contains",
        }
    }
}

fn tokenize(expression: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut chars = expression.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c == '"' || c == '\'' {
            let quote = c;
            chars.next();
            let mut text = String::new();
            for inner in chars.by_ref() {
                if inner == quote {
                    break;
                }
                text.push(inner);
            }
            tokens.push(Token { text, quoted: true });
        } else {
            let mut text = String::new();
            while let Some(&c) = chars.peek() {
                if c.is_whitespace() || c == '"' || c == '\'' {
                    break;
                }
                text.push(c);
                chars.next();
            }
            tokens.push(Token {
                text,
                quoted: false,
            });
        }
    }

    tokens
}

fn evaluate_clause(tokens: &[Token], variables: &VariableStore) -> Verdict {
    let Some((comparator, op_start, op_len)) = find_comparator(tokens) else {
        return Verdict::fails_closed(format!(
            "no comparison operator in clause '{}'",
            render(tokens)
        ));
    };

    let left = render(&tokens[..op_start]);
    let right = render(&tokens[op_start + op_len..]);

    if left.is_empty() || right.is_empty() {
        return Verdict::fails_closed(format!(
            "missing operand around '{}'",
            comparator.symbol()
        ));
    }

    let left = variables.resolve_template(&left);
    let right = variables.resolve_template(&right);

    if let Some(name) = unresolved_placeholder(&left).or_else(|| unresolved_placeholder(&right)) {
        return Verdict::fails_closed(format!("variable '{{{name}}}' is not set"));
    }

    compare(&left, &right, comparator)
}

fn find_comparator(tokens: &[Token]) -> Option<(Comparator, usize, usize)> {
    for (i, token) in tokens.iter().enumerate() {
        if token.quoted {
            continue;
        }
        let op = match token.text.as_str() {
            "==" => Some(Comparator::Eq),
            "!=" => Some(Comparator::Ne),
            ">=" => Some(Comparator::Ge),
            "<=" => Some(Comparator::Le),
            ">" => Some(Comparator::Gt),
            "<" => Some(Comparator::Lt),
            "contains" => Some(Comparator::Contains),
            _ => None,
        };
        if let Some(op) = op {
            return Some((op, i, 1));
        }
        if token.text == "not"
            && tokens
                .get(i + 1)
                .is_some_and(|next| !next.quoted && next.text == "contains")
        {
            return Some((Comparator::NotContains, i, 2));
        }
    }
    None
}

fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

fn unresolved_placeholder(operand: &str) -> Option<&str> {
    let mut rest = operand;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        if let Some(close) = after.find('}') {
            let name = &after[..close];
            if !name.is_empty()
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
            {
                return Some(name);
            }
            rest = &after[close + 1..];
        } else {
            return None;
        }
    }
    None
}

fn compare(left: &str, right: &str, comparator: Comparator) -> Verdict {
    let numbers = match (left.trim().parse::<f64>(), right.trim().parse::<f64>()) {
        (Ok(l), Ok(r)) => Some((l, r)),
        _ => None,
    };

    match comparator {
        Comparator::Eq => {
            let equal = numbers.map_or(left == right, |(l, r)| l == r);
            if equal { Verdict::holds() } else { Verdict::fails() }
        }
        Comparator::Ne => {
            let equal = numbers.map_or(left == right, |(l, r)| l == r);
            if equal { Verdict::fails() } else { Verdict::holds() }
        }
        Comparator::Ge | Comparator::Le | Comparator::Gt | Comparator::Lt => {
            let Some((l, r)) = numbers else {
                return Verdict::fails_closed(format!(
                    "'{}' requires numeric operands, got '{left}' and '{right}'",
                    comparator.symbol()
                ));
            };
            let holds = match comparator {
                Comparator::Ge => l >= r,
                Comparator::Le => l <= r,
                Comparator::Gt => l > r,
                Comparator::Lt => l < r,
                _ => unreachable!(),
            };
            if holds { Verdict::holds() } else { Verdict::fails() }
        }
        Comparator::Contains => {
            if left.to_lowercase().contains(&right.to_lowercase()) {
                Verdict::holds()
            } else {
                Verdict::fails()
            }
        }
        Comparator::NotContains => {
            if left.to_lowercase().contains(&right.to_lowercase()) {
                Verdict::fails()
            } else {
                Verdict::holds()
            }
        }
    }
}
