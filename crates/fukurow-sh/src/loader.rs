//! OWL 関数型構文ローダー
//!
//! `Ontology(` ヘッダー以降の公理を読み込み、推論セッションへ登録します。
//! 複数行にまたがる公理は括弧の対応で結合されます。

use crate::model::{ConceptId, RoleId};
use crate::reasoner::ShReasoner;
use crate::{Result, ShError};
use logos::Logos;
use serde::Serialize;
use std::collections::BTreeSet;
use std::io::BufRead;
use tracing::{debug, info, warn};

/// Axiom source feeding a reasoning session
pub trait AxiomLoader {
    fn load<R: BufRead>(&self, reader: R, reasoner: &mut ShReasoner) -> Result<LoadReport>;
}

/// Summary of one load
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadReport {
    /// Logical axioms registered
    pub axioms: usize,
    /// Axioms skipped because they were malformed or unsupported
    pub skipped: usize,
    /// Constructor names that caused skips
    pub unsupported: BTreeSet<String>,
}

/// Loader for the functional-syntax subset covering SH
#[derive(Debug, Clone, Copy, Default)]
pub struct FunctionalSyntaxLoader;

/// 関数型構文トークン
#[derive(Logos, Debug, Clone, Copy, PartialEq, Eq)]
#[logos(skip r"[ \t\r\n\f]+")]
enum Token<'a> {
    #[token("(")]
    Open,

    #[token(")")]
    Close,

    #[regex(r"<[^<>\s]*>", |lex| lex.slice())]
    Iri(&'a str),

    #[regex(r#""([^"\\]|\\.)*"(\^\^[^\s()]+|@[A-Za-z0-9\-]+)?"#, |lex| lex.slice())]
    Literal(&'a str),

    #[regex(r#"[^\s()<>"]+"#, |lex| lex.slice())]
    Word(&'a str),
}

/// Parsed functional-syntax term: a bare name or `Head(args...)`
#[derive(Debug, Clone, PartialEq, Eq)]
enum Expr {
    Name(String),
    Apply(String, Vec<Expr>),
}

enum Rejection {
    Malformed(String),
    Unsupported(String),
    Fatal(ShError),
}

impl From<ShError> for Rejection {
    fn from(error: ShError) -> Self {
        Rejection::Fatal(error)
    }
}

type Parsed<T> = std::result::Result<T, Rejection>;

/// Non-logical statements accepted and ignored
const IGNORED: &[&str] = &[
    "Declaration",
    "Annotation",
    "AnnotationAssertion",
    "SubAnnotationPropertyOf",
    "AnnotationPropertyDomain",
    "AnnotationPropertyRange",
    "Prefix",
    "Import",
];

impl AxiomLoader for FunctionalSyntaxLoader {
    fn load<R: BufRead>(&self, reader: R, reasoner: &mut ShReasoner) -> Result<LoadReport> {
        let mut report = LoadReport::default();
        let mut lines = reader.lines().enumerate().map(|(n, line)| (n + 1, line));

        let mut header_rest = None;
        for (_, line) in lines.by_ref() {
            let line = line?;
            if let Some(rest) = line.trim_start().strip_prefix("Ontology") {
                if let Some(rest) = rest.trim_start().strip_prefix('(') {
                    header_rest = Some(rest.to_string());
                    break;
                }
            }
        }
        let Some(header_rest) = header_rest else {
            return Err(ShError::Loader("missing Ontology( header".to_string()));
        };

        let mut pending = String::new();
        let mut start = 0;
        let mut depth = 0i64;
        let body = std::iter::once((0, Ok::<_, std::io::Error>(header_rest))).chain(lines);
        for (number, line) in body {
            let line = line?;
            let text = line.trim();
            if depth == 0 {
                if text.is_empty() || text.starts_with("//") || text.starts_with('<') {
                    continue;
                }
                if text.starts_with(')') {
                    break;
                }
                start = number;
            }
            pending.push_str(text);
            pending.push(' ');
            depth += paren_balance(text);
            if depth < 0 {
                return Err(ShError::Loader(format!("unbalanced ')' at line {}", number)));
            }
            if depth == 0 {
                self.axiom(&pending, start, reasoner, &mut report)?;
                pending.clear();
            }
        }
        if depth > 0 {
            return Err(ShError::Loader(format!("unterminated axiom starting at line {}", start)));
        }

        info!("Loaded {} axioms ({} skipped)", report.axioms, report.skipped);
        if !report.unsupported.is_empty() {
            let names: Vec<&str> = report.unsupported.iter().map(String::as_str).collect();
            warn!("Unsupported constructs ignored: {}", names.join(", "));
        }
        Ok(report)
    }
}

impl FunctionalSyntaxLoader {
    pub fn new() -> Self {
        Self
    }

    fn axiom(&self, text: &str, line: usize, reasoner: &mut ShReasoner, report: &mut LoadReport) -> Result<()> {
        let outcome = tokenize(text)
            .and_then(|tokens| parse(&tokens))
            .map_err(Rejection::Malformed)
            .and_then(|expr| apply(&expr, reasoner));
        match outcome {
            Ok(true) => report.axioms += 1,
            Ok(false) => {}
            Err(Rejection::Malformed(message)) => {
                warn!("Skipping line {}: {}", line, message);
                report.skipped += 1;
            }
            Err(Rejection::Unsupported(name)) => {
                debug!("Skipping line {}: unsupported {}", line, name);
                report.unsupported.insert(name);
                report.skipped += 1;
            }
            Err(Rejection::Fatal(error)) => return Err(error),
        }
        Ok(())
    }
}

/// Read goal queries, one per line, each a whitespace-separated list of class names
pub fn read_goals<R: BufRead>(reader: R, reasoner: &mut ShReasoner) -> Result<Vec<ConceptId>> {
    let mut goals = Vec::new();
    for (number, line) in reader.lines().enumerate() {
        let line = line?;
        let names: Vec<&str> = line.split_whitespace().collect();
        if names.is_empty() {
            continue;
        }
        for name in &names {
            if reasoner.terms().find_atomic(name).is_none() {
                warn!("Goal line {}: unknown class {}", number + 1, name);
            }
        }
        goals.push(reasoner.conjunctive_goal(&names)?);
    }
    info!("Read {} goals", goals.len());
    Ok(goals)
}

/// Parenthesis depth change of a line, ignoring IRIs and quoted literals
fn paren_balance(text: &str) -> i64 {
    Token::lexer(text)
        .map(|token| match token {
            Ok(Token::Open) => 1,
            Ok(Token::Close) => -1,
            _ => 0,
        })
        .sum()
}

fn tokenize(text: &str) -> std::result::Result<Vec<Token<'_>>, String> {
    let mut lexer = Token::lexer(text);
    let mut tokens = Vec::new();
    while let Some(token) = lexer.next() {
        match token {
            Ok(token) => tokens.push(token),
            Err(()) => return Err(format!("unexpected input {:?}", lexer.slice())),
        }
    }
    Ok(tokens)
}

fn parse(tokens: &[Token<'_>]) -> std::result::Result<Expr, String> {
    let (expr, rest) = parse_expr(tokens)?;
    if !rest.is_empty() {
        return Err("trailing input after axiom".to_string());
    }
    Ok(expr)
}

fn parse_expr<'t, 'a>(tokens: &'t [Token<'a>]) -> std::result::Result<(Expr, &'t [Token<'a>]), String> {
    match tokens {
        [Token::Word(head), Token::Open, rest @ ..] => {
            let mut args = Vec::new();
            let mut rest = rest;
            loop {
                match rest {
                    [Token::Close, tail @ ..] => return Ok((Expr::Apply(head.to_string(), args), tail)),
                    [] => return Err(format!("missing ')' for {}", head)),
                    _ => {
                        let (arg, tail) = parse_expr(rest)?;
                        args.push(arg);
                        rest = tail;
                    }
                }
            }
        }
        [Token::Word(name) | Token::Iri(name) | Token::Literal(name), rest @ ..] => {
            Ok((Expr::Name(name.to_string()), rest))
        }
        [Token::Open, ..] => Err("unexpected '('".to_string()),
        [Token::Close, ..] => Err("unexpected ')'".to_string()),
        [] => Err("empty axiom".to_string()),
    }
}

/// Class expression checked against the supported constructors, not yet interned
#[derive(Debug, Clone, PartialEq, Eq)]
enum ClassExpr {
    Thing,
    Nothing,
    Named(String),
    Not(Box<ClassExpr>),
    And(Vec<ClassExpr>),
    Or(Vec<ClassExpr>),
    Exists(String, Box<ClassExpr>),
    Forall(String, Box<ClassExpr>),
}

/// Accepted logical axiom
#[derive(Debug, Clone, PartialEq, Eq)]
enum Axiom {
    SubClassOf(ClassExpr, ClassExpr),
    EquivalentClasses(Vec<ClassExpr>),
    DisjointClasses(Vec<ClassExpr>),
    SubObjectPropertyOf(String, String),
    EquivalentObjectProperties(Vec<String>),
    TransitiveObjectProperty(String),
    ObjectPropertyDomain(String, ClassExpr),
    ObjectPropertyRange(String, ClassExpr),
}

/// Register one axiom; `false` for ignored non-logical statements.
///
/// Nothing is interned unless the whole axiom is accepted.
fn apply(expr: &Expr, reasoner: &mut ShReasoner) -> Parsed<bool> {
    match axiom(expr)? {
        Some(axiom) => {
            register(&axiom, reasoner)?;
            Ok(true)
        }
        None => Ok(false),
    }
}

fn axiom(expr: &Expr) -> Parsed<Option<Axiom>> {
    let Expr::Apply(head, args) = expr else {
        return Err(Rejection::Malformed("expected an axiom".to_string()));
    };
    if IGNORED.contains(&head.as_str()) {
        return Ok(None);
    }
    // axiom annotations precede the operands
    let args: Vec<&Expr> = args
        .iter()
        .filter(|arg| !matches!(arg, Expr::Apply(name, _) if name == "Annotation"))
        .collect();

    let axiom = match head.as_str() {
        "SubClassOf" => {
            let [sub, sup] = exactly::<2>(head, &args)?;
            Axiom::SubClassOf(class(sub)?, class(sup)?)
        }
        "EquivalentClasses" => Axiom::EquivalentClasses(classes(at_least(head, &args, 2)?)?),
        "DisjointClasses" => Axiom::DisjointClasses(classes(at_least(head, &args, 2)?)?),
        "SubObjectPropertyOf" => {
            let [sub, sup] = exactly::<2>(head, &args)?;
            Axiom::SubObjectPropertyOf(role(sub)?, role(sup)?)
        }
        "EquivalentObjectProperties" => Axiom::EquivalentObjectProperties(
            at_least(head, &args, 2)?
                .iter()
                .map(|arg| role(arg))
                .collect::<Parsed<Vec<_>>>()?,
        ),
        "TransitiveObjectProperty" => {
            let [r] = exactly::<1>(head, &args)?;
            Axiom::TransitiveObjectProperty(role(r)?)
        }
        "ObjectPropertyDomain" => {
            let [r, domain] = exactly::<2>(head, &args)?;
            Axiom::ObjectPropertyDomain(role(r)?, class(domain)?)
        }
        "ObjectPropertyRange" => {
            let [r, range] = exactly::<2>(head, &args)?;
            Axiom::ObjectPropertyRange(role(r)?, class(range)?)
        }
        other => return Err(Rejection::Unsupported(other.to_string())),
    };
    Ok(Some(axiom))
}

fn exactly<'e, const N: usize>(head: &str, args: &[&'e Expr]) -> Parsed<[&'e Expr; N]> {
    <[&Expr; N]>::try_from(args).map_err(|_| {
        Rejection::Malformed(format!("{} expects {} operands, found {}", head, N, args.len()))
    })
}

fn at_least<'a, 'e>(head: &str, args: &'a [&'e Expr], min: usize) -> Parsed<&'a [&'e Expr]> {
    if args.len() < min {
        return Err(Rejection::Malformed(format!(
            "{} expects at least {} operands, found {}",
            head,
            min,
            args.len()
        )));
    }
    Ok(args)
}

fn classes(args: &[&Expr]) -> Parsed<Vec<ClassExpr>> {
    args.iter().map(|arg| class(arg)).collect()
}

fn class(expr: &Expr) -> Parsed<ClassExpr> {
    match expr {
        Expr::Name(name) => Ok(match name.as_str() {
            "owl:Thing" => ClassExpr::Thing,
            "owl:Nothing" => ClassExpr::Nothing,
            _ => ClassExpr::Named(name.clone()),
        }),
        Expr::Apply(head, args) => {
            let args: Vec<&Expr> = args.iter().collect();
            match head.as_str() {
                "ObjectComplementOf" => {
                    let [operand] = exactly::<1>(head, &args)?;
                    Ok(ClassExpr::Not(Box::new(class(operand)?)))
                }
                "ObjectIntersectionOf" => Ok(ClassExpr::And(classes(at_least(head, &args, 1)?)?)),
                "ObjectUnionOf" => Ok(ClassExpr::Or(classes(at_least(head, &args, 1)?)?)),
                "ObjectSomeValuesFrom" | "ObjectAllValuesFrom" => {
                    let [r, filler] = exactly::<2>(head, &args)?;
                    let (r, filler) = (role(r)?, Box::new(class(filler)?));
                    Ok(if head == "ObjectSomeValuesFrom" {
                        ClassExpr::Exists(r, filler)
                    } else {
                        ClassExpr::Forall(r, filler)
                    })
                }
                other => Err(Rejection::Unsupported(other.to_string())),
            }
        }
    }
}

fn role(expr: &Expr) -> Parsed<String> {
    match expr {
        Expr::Name(name) => Ok(name.clone()),
        Expr::Apply(head, _) => Err(Rejection::Unsupported(head.clone())),
    }
}

fn register(axiom: &Axiom, reasoner: &mut ShReasoner) -> Result<()> {
    match axiom {
        Axiom::SubClassOf(sub, sup) => {
            let sub = intern(sub, reasoner);
            let sup = intern(sup, reasoner);
            reasoner.subsumption(sub, sup)
        }
        Axiom::EquivalentClasses(operands) => {
            let concepts: Vec<ConceptId> = operands.iter().map(|c| intern(c, reasoner)).collect();
            reasoner.equivalent(&concepts)
        }
        Axiom::DisjointClasses(operands) => {
            let concepts: Vec<ConceptId> = operands.iter().map(|c| intern(c, reasoner)).collect();
            for (i, &first) in concepts.iter().enumerate() {
                for &second in &concepts[i + 1..] {
                    reasoner.disjoint(first, second)?;
                }
            }
            Ok(())
        }
        Axiom::SubObjectPropertyOf(sub, sup) => {
            let sub = reasoner.terms_mut().role(sub);
            let sup = reasoner.terms_mut().role(sup);
            reasoner.role_inclusion(sub, sup)
        }
        Axiom::EquivalentObjectProperties(names) => {
            let roles: Vec<RoleId> = names.iter().map(|name| reasoner.terms_mut().role(name)).collect();
            for (i, &first) in roles.iter().enumerate() {
                for &second in &roles[i + 1..] {
                    reasoner.role_inclusion(first, second)?;
                    reasoner.role_inclusion(second, first)?;
                }
            }
            Ok(())
        }
        Axiom::TransitiveObjectProperty(name) => {
            let r = reasoner.terms_mut().role(name);
            reasoner.transitive_role(r)
        }
        Axiom::ObjectPropertyDomain(name, domain) => {
            let r = reasoner.terms_mut().role(name);
            let domain = intern(domain, reasoner);
            let terms = reasoner.terms_mut();
            let top = terms.top();
            let some = terms.existential(r, top);
            reasoner.subsumption(some, domain)
        }
        Axiom::ObjectPropertyRange(name, range) => {
            let r = reasoner.terms_mut().role(name);
            let range = intern(range, reasoner);
            let terms = reasoner.terms_mut();
            let top = terms.top();
            let all = terms.universal(r, range);
            reasoner.subsumption(top, all)
        }
    }
}

fn intern(expr: &ClassExpr, reasoner: &mut ShReasoner) -> ConceptId {
    match expr {
        ClassExpr::Thing => reasoner.terms().top(),
        ClassExpr::Nothing => reasoner.terms().bottom(),
        ClassExpr::Named(name) => reasoner.terms_mut().atomic(name),
        ClassExpr::Not(operand) => {
            let operand = intern(operand, reasoner);
            reasoner.terms_mut().negation(operand)
        }
        ClassExpr::And(operands) => {
            let operands = operands.iter().map(|c| intern(c, reasoner)).collect();
            reasoner.terms_mut().improper_conjunction(operands)
        }
        ClassExpr::Or(operands) => {
            let operands = operands.iter().map(|c| intern(c, reasoner)).collect();
            reasoner.terms_mut().improper_disjunction(operands)
        }
        ClassExpr::Exists(name, filler) => {
            let r = reasoner.terms_mut().role(name);
            let filler = intern(filler, reasoner);
            reasoner.terms_mut().existential(r, filler)
        }
        ClassExpr::Forall(name, filler) => {
            let r = reasoner.terms_mut().role(name);
            let filler = intern(filler, reasoner);
            reasoner.terms_mut().universal(r, filler)
        }
    }
}
