use std::fmt::{self, Display};

use symbolic_expressions::{parser::parse_str, Sexp};

use crate::util::IndexSet;
use crate::{Error, OpKind, Result, Symbol};

/// Index of a node within a [`Pattern`]'s arena.
pub type PatId = u32;

/// One node of a pattern tree.
///
/// `Place` carries the index of its variable in the owning rule's place
/// table; the same table is shared by both sides of a rule, so bindings made
/// while matching the left-hand side line up with right-hand-side lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PatternNode {
    /// Matches a constant node with exactly this value.
    Constant(u128),
    /// Matches a childless node with this operator tag (and width, if given).
    Op { name: Symbol, width: Option<u32> },
    /// Matches any e-class, binding it on first use.
    Place(u32),
    /// An application: the head atom constrains the node's tag, the children
    /// match its child classes in order.
    List {
        head: Symbol,
        width: Option<u32>,
        children: Vec<PatId>,
    },
}

/// A pattern over the circuit operator set, stored as a flat arena.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    pub(crate) nodes: Vec<PatternNode>,
    pub(crate) root: PatId,
    pub(crate) n_places: usize,
}

impl Pattern {
    pub(crate) fn node(&self, id: PatId) -> &PatternNode {
        &self.nodes[id as usize]
    }

    fn add(&mut self, node: PatternNode) -> PatId {
        self.nodes.push(node);
        (self.nodes.len() - 1) as PatId
    }
}

impl Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn go(pat: &Pattern, id: PatId, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            match pat.node(id) {
                PatternNode::Constant(v) => write!(f, "{}", v),
                PatternNode::Op { name, width: None } => write!(f, "{}", name),
                PatternNode::Op {
                    name,
                    width: Some(w),
                } => write!(f, "{}:{}", name, w),
                PatternNode::Place(p) => write!(f, "?{}", p),
                PatternNode::List {
                    head,
                    width,
                    children,
                } => {
                    write!(f, "({}", head)?;
                    if let Some(w) = width {
                        write!(f, ":{}", w)?;
                    }
                    for &c in children {
                        write!(f, " ")?;
                        go(pat, c, f)?;
                    }
                    write!(f, ")")
                }
            }
        }
        go(self, self.root, f)
    }
}

/// Op tags that are matchable on a left-hand side but carry immediates a
/// pattern cannot spell, so a right-hand side cannot construct them.
const MATCH_ONLY_TAGS: &[&str] = &["const", "extract", "in_reg", "out_reg"];

struct ParseCtx<'a> {
    places: &'a mut IndexSet<Symbol>,
    /// `false` on a right-hand side: every place must already be bound.
    allow_new_places: bool,
    /// `true` on a right-hand side: op atoms must be constructible.
    constructible_only: bool,
}

fn parse_op_atom(s: &str, ctx: &ParseCtx) -> Result<(Symbol, Option<u32>)> {
    let (name, width) = match s.split_once(':') {
        Some((name, w)) => {
            let w = w
                .parse::<u32>()
                .map_err(|_| Error::RuleParse(format!("bad width suffix in `{}`", s)))?;
            (name, Some(w))
        }
        None => (s, None),
    };
    let known = OpKind::from_name(name).is_some();
    let match_only = MATCH_ONLY_TAGS.contains(&name);
    if !known && !match_only {
        return Err(Error::RuleParse(format!("unknown operator `{}`", name)));
    }
    if ctx.constructible_only && match_only {
        return Err(Error::RuleParse(format!(
            "`{}` cannot be constructed on a right-hand side",
            name
        )));
    }
    Ok((Symbol::from(name), width))
}

fn parse_into(pat: &mut Pattern, sexp: &Sexp, ctx: &mut ParseCtx) -> Result<PatId> {
    match sexp {
        Sexp::Empty => Err(Error::RuleParse("empty s-expression".into())),
        Sexp::String(s) => {
            let s = s.trim();
            if s.is_empty() {
                return Err(Error::RuleParse("empty atom".into()));
            }
            if let Some(name) = s.strip_prefix('?') {
                if name.is_empty() {
                    return Err(Error::RuleParse("place with no name".into()));
                }
                let sym = Symbol::from(s);
                let (index, fresh) = ctx.places.insert_full(sym);
                if fresh && !ctx.allow_new_places {
                    return Err(Error::RuleParse(format!(
                        "place {} is unbound on the right-hand side",
                        s
                    )));
                }
                return Ok(pat.add(PatternNode::Place(index as u32)));
            }
            if s.starts_with('$') {
                return Err(Error::UnimplementedPatternNode("label"));
            }
            if s.chars().next().unwrap().is_ascii_digit() {
                let value = parse_int(s)
                    .ok_or_else(|| Error::RuleParse(format!("bad constant `{}`", s)))?;
                return Ok(pat.add(PatternNode::Constant(value)));
            }
            let (name, width) = parse_op_atom(s, ctx)?;
            Ok(pat.add(PatternNode::Op { name, width }))
        }
        Sexp::List(list) => {
            let (head, args) = match list.split_first() {
                Some(x) => x,
                None => return Err(Error::RuleParse("empty list".into())),
            };
            let head = match head {
                Sexp::String(s) => s.trim(),
                _ => return Err(Error::RuleParse("expected operator in head position".into())),
            };
            if head == "match" {
                return Err(Error::UnimplementedPatternNode("match_expr"));
            }
            let (name, width) = parse_op_atom(head, ctx)?;
            let children = args
                .iter()
                .map(|s| parse_into(pat, s, ctx))
                .collect::<Result<Vec<_>>>()?;
            Ok(pat.add(PatternNode::List {
                head: name,
                width,
                children,
            }))
        }
    }
}

fn parse_int(s: &str) -> Option<u128> {
    if let Some(hex) = s.strip_prefix("0x") {
        u128::from_str_radix(hex, 16).ok()
    } else {
        s.parse().ok()
    }
}

pub(crate) fn parse_pattern(
    sexp: &Sexp,
    places: &mut IndexSet<Symbol>,
    rhs: bool,
) -> Result<Pattern> {
    let mut pattern = Pattern {
        nodes: vec![],
        root: 0,
        n_places: 0,
    };
    let mut ctx = ParseCtx {
        places,
        allow_new_places: !rhs,
        constructible_only: rhs,
    };
    pattern.root = parse_into(&mut pattern, sexp, &mut ctx)?;
    pattern.n_places = count_places(&pattern);
    Ok(pattern)
}

fn count_places(pattern: &Pattern) -> usize {
    let mut seen: IndexSet<u32> = IndexSet::default();
    for node in &pattern.nodes {
        if let PatternNode::Place(p) = node {
            seen.insert(*p);
        }
    }
    seen.len()
}

/// Strips `;`-to-end-of-line comments.
fn strip_comments(src: &str) -> String {
    src.lines()
        .map(|line| line.split(';').next().unwrap_or(""))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Parses a rule-set file: any number of `(rule LHS RHS)` forms, whitespace
/// and `;` comments permitted. Fails as a whole on the first bad rule.
pub fn parse_rules(src: &str) -> Result<Vec<crate::Rewrite>> {
    let stripped = strip_comments(src);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return Ok(vec![]);
    }
    let wrapped = format!("({})", stripped);
    let sexp = parse_str(&wrapped).map_err(|e| Error::RuleParse(e.to_string()))?;
    let forms = match sexp {
        Sexp::List(forms) => forms,
        _ => return Err(Error::RuleParse("expected a list of rules".into())),
    };

    let mut rules = Vec::with_capacity(forms.len());
    for (i, form) in forms.iter().enumerate() {
        let list = match form {
            Sexp::List(list) if list.len() == 3 => list,
            _ => {
                return Err(Error::RuleParse(format!(
                    "form {} is not a `(rule LHS RHS)`",
                    i
                )))
            }
        };
        match &list[0] {
            Sexp::String(s) if s == "rule" => {}
            _ => return Err(Error::RuleParse(format!("form {} does not begin with `rule`", i))),
        }
        let mut places: IndexSet<Symbol> = IndexSet::default();
        let lhs = parse_pattern(&list[1], &mut places, false)?;
        let rhs = parse_pattern(&list[2], &mut places, true)?;
        rules.push(crate::Rewrite::new(format!("rule-{}", i), lhs, rhs, places));
    }
    Ok(rules)
}

/// Parses a single pattern, mostly useful in tests.
pub fn pattern_of_str(src: &str) -> Result<Pattern> {
    let stripped = strip_comments(src);
    let sexp = parse_str(stripped.trim()).map_err(|e| Error::RuleParse(e.to_string()))?;
    let mut places: IndexSet<Symbol> = IndexSet::default();
    parse_pattern(&sexp, &mut places, false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_a_rule_set() {
        let rules = parse_rules(
            "; identities\n\
             (rule (add ?x 0) ?x)\n\
             (rule (xor ?x ?x) 0)",
        )
        .unwrap();
        assert_eq!(rules.len(), 2);
        assert_eq!(rules[0].lhs.to_string(), "(add ?0 0)");
        assert_eq!(rules[0].rhs.to_string(), "?0");
        assert_eq!(rules[0].places(), &[crate::Symbol::from("?x")]);
    }

    #[test]
    fn unbound_rhs_place_is_rejected() {
        let err = parse_rules("(rule (add ?x 0) ?y)").unwrap_err();
        assert!(matches!(err, Error::RuleParse(_)));
    }

    #[test]
    fn labels_are_unimplemented() {
        let err = parse_rules("(rule (add $l 0) 0)").unwrap_err();
        assert!(matches!(err, Error::UnimplementedPatternNode("label")));
    }

    #[test]
    fn match_expr_is_unimplemented() {
        let err = parse_rules("(rule (match (add ?x 0)) ?x)").unwrap_err();
        assert!(matches!(err, Error::UnimplementedPatternNode("match_expr")));
    }

    #[test]
    fn unknown_ops_are_rejected() {
        let err = parse_rules("(rule (bogus ?x) ?x)").unwrap_err();
        assert!(matches!(err, Error::RuleParse(_)));
    }
}
