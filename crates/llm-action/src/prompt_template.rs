//! Render `{{.NAME}}`-style prompt templates against the process environment.
//!
//! Actions are parsed here and lowered onto a Tera template, which does the
//! evaluation. Every piece of user text and every string literal travels
//! through the Tera context rather than the template source, so nothing the
//! user writes is ever interpreted as Tera syntax.

use serde::Serialize;
use std::collections::BTreeMap;
use tera::{Context, Tera};

use crate::errors::TemplateError;

/// Environment variables with this prefix are also visible without it.
pub const INPUT_PREFIX: &str = "INPUT_";

/// Printed in place of a key that is not set.
pub const NO_VALUE: &str = "<no value>";

const TEMPLATE_NAME: &str = "prompt";

/// Snapshot of the variables a template can reference.
///
/// `INPUT_FOO=bar` is reachable as both `{{.INPUT_FOO}}` and `{{.FOO}}`. When
/// a literal `FOO` variable also exists, the literal one wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct TemplateEnv {
    vars: BTreeMap<String, String>,
}

impl TemplateEnv {
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let literal: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();

        let mut vars = literal.clone();
        for (key, value) in &literal {
            if let Some(stripped) = key.strip_prefix(INPUT_PREFIX) {
                if !stripped.is_empty() {
                    vars.entry(stripped.to_string())
                        .or_insert_with(|| value.clone());
                }
            }
        }

        Self { vars }
    }

    /// Snapshot the current process environment. Variables whose name or
    /// value is not valid unicode are skipped.
    pub fn from_process() -> Self {
        Self::from_vars(
            std::env::vars_os()
                .filter_map(|(key, value)| Some((key.into_string().ok()?, value.into_string().ok()?))),
        )
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }
}

pub fn render_template(template: &str, env: &TemplateEnv) -> Result<String, TemplateError> {
    if !template.contains("{{") {
        return Ok(template.to_string());
    }

    let items = Lexer::new(template).lex()?;
    let nodes = Parser::new(items).parse()?;

    let mut program = Program::default();
    program.lower(&nodes);

    let mut tera = Tera::default();
    tera.autoescape_on(vec![]);
    tera.add_raw_template(TEMPLATE_NAME, &program.source)
        .map_err(TemplateError::Compile)?;

    let mut context = Context::new();
    context.insert("env", env);
    for (index, literal) in program.literals.iter().enumerate() {
        context.insert(format!("lit_{}", index), literal);
    }

    tera.render(TEMPLATE_NAME, &context)
        .map_err(TemplateError::Execute)
}

fn syntax(line: usize, message: impl Into<String>) -> TemplateError {
    TemplateError::Syntax {
        line,
        message: message.into(),
    }
}

fn is_space(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n')
}

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Field(String),
    Dot,
    Str(String),
    Ident(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Field(name) => write!(f, ".{}", name),
            Token::Dot => write!(f, "."),
            Token::Str(value) => write!(f, "{:?}", value),
            Token::Ident(name) => write!(f, "{}", name),
        }
    }
}

#[derive(Debug)]
enum Item {
    Text(String),
    Action { line: usize, tokens: Vec<Token> },
}

struct Lexer<'a> {
    src: &'a str,
    pos: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(src: &'a str) -> Self {
        Self {
            src,
            pos: 0,
            line: 1,
        }
    }

    fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    fn advance(&mut self, bytes: usize) {
        let consumed = &self.src[self.pos..self.pos + bytes];
        self.line += consumed.matches('\n').count();
        self.pos += bytes;
    }

    fn lex(mut self) -> Result<Vec<Item>, TemplateError> {
        let mut items = Vec::new();
        let mut trim_leading = false;

        loop {
            let rest = self.rest();
            let Some(start) = rest.find("{{") else {
                let text = if trim_leading {
                    rest.trim_start_matches(is_space)
                } else {
                    rest
                };
                if !text.is_empty() {
                    items.push(Item::Text(text.to_string()));
                }
                return Ok(items);
            };

            let after = &rest[start + 2..];
            let trim_trailing = after.starts_with('-') && after[1..].starts_with(is_space);

            let mut text = &rest[..start];
            if trim_leading {
                text = text.trim_start_matches(is_space);
            }
            if trim_trailing {
                text = text.trim_end_matches(is_space);
            }
            if !text.is_empty() {
                items.push(Item::Text(text.to_string()));
            }

            self.advance(start + 2 + if trim_trailing { 2 } else { 0 });
            let line = self.line;
            let (tokens, trim) = self.lex_action(line)?;
            trim_leading = trim;
            if let Some(tokens) = tokens {
                items.push(Item::Action { line, tokens });
            }
        }
    }

    /// Lex one action after its opening delimiter. Comments yield `None`.
    /// The flag reports a ` -}}` closing delimiter.
    fn lex_action(&mut self, line: usize) -> Result<(Option<Vec<Token>>, bool), TemplateError> {
        if self.rest().starts_with("/*") {
            let Some(end) = self.rest().find("*/") else {
                return Err(syntax(line, "unclosed comment"));
            };
            self.advance(end + 2);
            let rest = self.rest();
            if rest.starts_with("}}") {
                self.advance(2);
                return Ok((None, false));
            }
            if rest.starts_with(is_space) && rest[1..].starts_with("-}}") {
                self.advance(4);
                return Ok((None, true));
            }
            return Err(syntax(line, "comment ends before closing delimiter"));
        }

        let mut tokens = Vec::new();
        loop {
            let rest = self.rest();
            let Some(c) = rest.chars().next() else {
                return Err(syntax(line, "unclosed action"));
            };

            if is_space(c) {
                if rest[1..].starts_with("-}}") {
                    self.advance(4);
                    return Ok((Some(tokens), true));
                }
                self.advance(1);
                continue;
            }
            if rest.starts_with("}}") {
                self.advance(2);
                return Ok((Some(tokens), false));
            }

            match c {
                '.' => {
                    let name: String = rest[1..].chars().take_while(|c| is_ident_char(*c)).collect();
                    if name.is_empty() {
                        self.advance(1);
                        tokens.push(Token::Dot);
                    } else if name.starts_with(|c: char| c.is_ascii_digit()) {
                        return Err(syntax(line, format!("bad field name .{}", name)));
                    } else {
                        self.advance(1 + name.len());
                        if self.rest().starts_with('.') {
                            return Err(syntax(
                                line,
                                format!("can't evaluate a field of .{}: values are strings", name),
                            ));
                        }
                        tokens.push(Token::Field(name));
                    }
                }
                '"' => {
                    let literal = quoted_literal(rest).ok_or_else(|| syntax(line, "unterminated quoted string"))?;
                    let value: String = serde_json::from_str(literal)
                        .map_err(|_| syntax(line, format!("invalid string literal {}", literal)))?;
                    self.advance(literal.len());
                    tokens.push(Token::Str(value));
                }
                '`' => {
                    let Some(end) = rest[1..].find('`') else {
                        return Err(syntax(line, "unterminated raw quoted string"));
                    };
                    tokens.push(Token::Str(rest[1..1 + end].to_string()));
                    self.advance(end + 2);
                }
                c if c.is_ascii_alphabetic() || c == '_' => {
                    let name: String = rest.chars().take_while(|c| is_ident_char(*c)).collect();
                    self.advance(name.len());
                    tokens.push(Token::Ident(name));
                }
                other => {
                    return Err(syntax(line, format!("unexpected {:?} in action", other)));
                }
            }
        }
    }
}

/// The quoted literal at the start of `s`, quotes included.
fn quoted_literal(s: &str) -> Option<&str> {
    let mut escaped = false;
    for (index, c) in s.char_indices().skip(1) {
        match c {
            '\n' => return None,
            '\\' if !escaped => escaped = true,
            '"' if !escaped => return Some(&s[..=index]),
            _ => escaped = false,
        }
    }
    None
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Key(String),
    Dot,
    Literal(String),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Value(Operand),
    Not(Operand),
    Eq(Operand, Vec<Operand>),
    Ne(Operand, Operand),
    And(Vec<Operand>),
    Or(Vec<Operand>),
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Text(String),
    Output(Operand),
    If {
        branches: Vec<(Condition, Vec<Node>)>,
        otherwise: Option<Vec<Node>>,
    },
    With {
        value: Operand,
        body: Vec<Node>,
        otherwise: Option<Vec<Node>>,
    },
}

#[derive(Debug)]
enum Terminator {
    End,
    Else,
    ElseIf(Condition),
}

impl Terminator {
    fn describe(&self) -> &'static str {
        match self {
            Terminator::End => "{{end}}",
            Terminator::Else => "{{else}}",
            Terminator::ElseIf(_) => "{{else if}}",
        }
    }
}

enum Action {
    Node(Node),
    Terminator(Terminator),
}

const UNSUPPORTED_KEYWORDS: &[&str] = &[
    "range", "define", "template", "block", "break", "continue", "nil",
];

struct Parser {
    items: std::vec::IntoIter<Item>,
    // true while `.` is bound to a string by an enclosing `with`
    dot_scopes: Vec<bool>,
}

impl Parser {
    fn new(items: Vec<Item>) -> Self {
        Self {
            items: items.into_iter(),
            dot_scopes: vec![false],
        }
    }

    fn parse(mut self) -> Result<Vec<Node>, TemplateError> {
        let (nodes, terminator) = self.parse_list()?;
        match terminator {
            None => Ok(nodes),
            Some((terminator, line)) => Err(syntax(
                line,
                format!("unexpected {}", terminator.describe()),
            )),
        }
    }

    fn parse_list(&mut self) -> Result<(Vec<Node>, Option<(Terminator, usize)>), TemplateError> {
        let mut nodes = Vec::new();
        while let Some(item) = self.items.next() {
            match item {
                Item::Text(text) => nodes.push(Node::Text(text)),
                Item::Action { line, tokens } => match self.action(line, tokens)? {
                    Action::Node(node) => nodes.push(node),
                    Action::Terminator(terminator) => return Ok((nodes, Some((terminator, line)))),
                },
            }
        }
        Ok((nodes, None))
    }

    fn action(&mut self, line: usize, tokens: Vec<Token>) -> Result<Action, TemplateError> {
        match tokens.as_slice() {
            [] => Err(syntax(line, "missing value for command")),
            [Token::Ident(keyword), rest @ ..] => match keyword.as_str() {
                "if" => {
                    let condition = self.condition(line, rest)?;
                    self.parse_if(line, condition).map(Action::Node)
                }
                "with" => {
                    let value = match rest {
                        [token] => self.operand(line, token)?,
                        _ => return Err(syntax(line, "with takes exactly one value")),
                    };
                    self.parse_with(line, value).map(Action::Node)
                }
                "else" => match rest {
                    [] => Ok(Action::Terminator(Terminator::Else)),
                    [Token::Ident(next), condition @ ..] if next == "if" => Ok(Action::Terminator(
                        Terminator::ElseIf(self.condition(line, condition)?),
                    )),
                    _ => Err(syntax(line, "unexpected tokens after else")),
                },
                "end" if rest.is_empty() => Ok(Action::Terminator(Terminator::End)),
                "end" => Err(syntax(line, "unexpected tokens after end")),
                "not" | "eq" | "ne" | "and" | "or" => Err(syntax(
                    line,
                    format!("function {:?} can only be used as a condition", keyword),
                )),
                kw if UNSUPPORTED_KEYWORDS.contains(&kw) => {
                    Err(syntax(line, format!("unsupported action {:?}", kw)))
                }
                other => Err(syntax(line, format!("function {:?} not defined", other))),
            },
            [token] => Ok(Action::Node(Node::Output(self.operand(line, token)?))),
            [first, ..] => Err(syntax(
                line,
                format!("can't give argument to non-function {}", first),
            )),
        }
    }

    fn parse_if(&mut self, line: usize, first: Condition) -> Result<Node, TemplateError> {
        let mut branches = Vec::new();
        let mut condition = first;
        loop {
            let (body, terminator) = self.parse_list()?;
            branches.push((condition, body));
            match terminator {
                Some((Terminator::End, _)) => {
                    return Ok(Node::If {
                        branches,
                        otherwise: None,
                    })
                }
                Some((Terminator::Else, _)) => {
                    let otherwise = self.parse_else(line, "if")?;
                    return Ok(Node::If {
                        branches,
                        otherwise: Some(otherwise),
                    });
                }
                Some((Terminator::ElseIf(next), _)) => condition = next,
                None => return Err(syntax(line, "unexpected EOF: if is never closed with {{end}}")),
            }
        }
    }

    fn parse_with(&mut self, line: usize, value: Operand) -> Result<Node, TemplateError> {
        self.dot_scopes.push(true);
        let parsed = self.parse_list();
        self.dot_scopes.pop();
        let (body, terminator) = parsed?;

        let otherwise = match terminator {
            Some((Terminator::End, _)) => None,
            Some((Terminator::Else, _)) => Some(self.parse_else(line, "with")?),
            Some((Terminator::ElseIf(_), else_line)) => {
                return Err(syntax(else_line, "else if is not allowed inside with"))
            }
            None => return Err(syntax(line, "unexpected EOF: with is never closed with {{end}}")),
        };

        Ok(Node::With {
            value,
            body,
            otherwise,
        })
    }

    fn parse_else(&mut self, line: usize, block: &str) -> Result<Vec<Node>, TemplateError> {
        let (body, terminator) = self.parse_list()?;
        match terminator {
            Some((Terminator::End, _)) => Ok(body),
            Some((other, else_line)) => Err(syntax(
                else_line,
                format!("expected {{{{end}}}}; found {}", other.describe()),
            )),
            None => Err(syntax(
                line,
                format!("unexpected EOF: {} is never closed with {{{{end}}}}", block),
            )),
        }
    }

    fn operand(&self, line: usize, token: &Token) -> Result<Operand, TemplateError> {
        let dot_is_value = self.dot_scopes.last().copied().unwrap_or(false);
        match token {
            Token::Field(name) if dot_is_value => Err(syntax(
                line,
                format!("can't evaluate field {} in type string", name),
            )),
            Token::Field(name) => Ok(Operand::Key(name.clone())),
            Token::Dot if dot_is_value => Ok(Operand::Dot),
            Token::Dot => Err(syntax(
                line,
                "\".\" is the whole environment here; reference a variable such as {{.NAME}}",
            )),
            Token::Str(value) => Ok(Operand::Literal(value.clone())),
            Token::Ident(name) => Err(syntax(
                line,
                format!("{:?} is not a value; use a field such as .{}", name, name),
            )),
        }
    }

    fn operands(&self, line: usize, tokens: &[Token]) -> Result<Vec<Operand>, TemplateError> {
        tokens
            .iter()
            .map(|token| self.operand(line, token))
            .collect()
    }

    fn condition(&self, line: usize, tokens: &[Token]) -> Result<Condition, TemplateError> {
        let arity = |name: &str, want: &str, got: usize| {
            syntax(
                line,
                format!("wrong number of args for {}: want {} got {}", name, want, got),
            )
        };

        match tokens {
            [] => Err(syntax(line, "missing value for condition")),
            [token] => Ok(Condition::Value(self.operand(line, token)?)),
            [Token::Ident(function), args @ ..] => match function.as_str() {
                "not" => match args {
                    [arg] => Ok(Condition::Not(self.operand(line, arg)?)),
                    _ => Err(arity("not", "1", args.len())),
                },
                "eq" => match args {
                    [first, rest @ ..] if !rest.is_empty() => Ok(Condition::Eq(
                        self.operand(line, first)?,
                        self.operands(line, rest)?,
                    )),
                    _ => Err(arity("eq", "at least 2", args.len())),
                },
                "ne" => match args {
                    [a, b] => Ok(Condition::Ne(self.operand(line, a)?, self.operand(line, b)?)),
                    _ => Err(arity("ne", "2", args.len())),
                },
                "and" => Ok(Condition::And(self.operands(line, args)?)),
                "or" => Ok(Condition::Or(self.operands(line, args)?)),
                other => Err(syntax(line, format!("function {:?} not defined", other))),
            },
            [first, ..] => Err(syntax(
                line,
                format!("can't give argument to non-function {}", first),
            )),
        }
    }
}

/// Tera source plus the literal values it refers to by name.
#[derive(Default)]
struct Program {
    source: String,
    literals: Vec<String>,
    dots: Vec<String>,
    scopes: usize,
}

impl Program {
    fn literal(&mut self, value: &str) -> String {
        let name = format!("lit_{}", self.literals.len());
        self.literals.push(value.to_string());
        name
    }

    fn emit_output(&mut self, expr: &str) {
        self.source.push_str("{{ ");
        self.source.push_str(expr);
        self.source.push_str(" }}");
    }

    fn emit_tag(&mut self, tag: &str) {
        self.source.push_str("{% ");
        self.source.push_str(tag);
        self.source.push_str(" %}");
    }

    fn current_dot(&self) -> String {
        // the parser only admits `.` inside a with block
        self.dots.last().cloned().unwrap_or_default()
    }

    /// Expression whose truthiness matches the operand; unset keys are falsy.
    fn value(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Key(key) => format!("env.{}", key),
            Operand::Dot => self.current_dot(),
            Operand::Literal(value) => self.literal(value),
        }
    }

    /// Expression used in comparisons; unset keys compare as "".
    fn comparable(&mut self, operand: &Operand) -> String {
        match operand {
            Operand::Key(key) => format!("env.{} | default(value=\"\")", key),
            other => self.value(other),
        }
    }

    fn condition(&mut self, condition: &Condition) -> String {
        match condition {
            Condition::Value(operand) => self.value(operand),
            Condition::Not(operand) => format!("not {}", self.value(operand)),
            Condition::Eq(first, others) => {
                let lhs = self.comparable(first);
                others
                    .iter()
                    .map(|other| format!("{} == {}", lhs, self.comparable(other)))
                    .collect::<Vec<_>>()
                    .join(" or ")
            }
            Condition::Ne(a, b) => format!("{} != {}", self.comparable(a), self.comparable(b)),
            Condition::And(operands) => self.join(operands, " and "),
            Condition::Or(operands) => self.join(operands, " or "),
        }
    }

    fn join(&mut self, operands: &[Operand], separator: &str) -> String {
        operands
            .iter()
            .map(|operand| self.value(operand))
            .collect::<Vec<_>>()
            .join(separator)
    }

    fn lower(&mut self, nodes: &[Node]) {
        for node in nodes {
            match node {
                Node::Text(text) => {
                    let name = self.literal(text);
                    self.emit_output(&name);
                }
                Node::Output(Operand::Key(key)) => {
                    self.emit_output(&format!("env.{} | default(value=\"{}\")", key, NO_VALUE));
                }
                Node::Output(operand) => {
                    let expr = self.value(operand);
                    self.emit_output(&expr);
                }
                Node::If {
                    branches,
                    otherwise,
                } => {
                    for (index, (condition, body)) in branches.iter().enumerate() {
                        let keyword = if index == 0 { "if" } else { "elif" };
                        let condition = self.condition(condition);
                        self.emit_tag(&format!("{} {}", keyword, condition));
                        self.lower(body);
                    }
                    if let Some(otherwise) = otherwise {
                        self.emit_tag("else");
                        self.lower(otherwise);
                    }
                    self.emit_tag("endif");
                }
                Node::With {
                    value,
                    body,
                    otherwise,
                } => {
                    let value = self.value(value);
                    let dot = format!("dot_{}", self.scopes);
                    self.scopes += 1;

                    self.emit_tag(&format!("if {}", value));
                    self.emit_tag(&format!("set {} = {}", dot, value));
                    self.dots.push(dot);
                    self.lower(body);
                    self.dots.pop();
                    if let Some(otherwise) = otherwise {
                        self.emit_tag("else");
                        self.lower(otherwise);
                    }
                    self.emit_tag("endif");
                }
            }
        }
    }
}
