use crate::pattern::parse_rules;
use crate::Rewrite;

/// The rule sets applied between deserialization and emission.
///
/// `popcount-parity` rewrites population counts that only feed a parity-like
/// use into the dedicated parity node; `popcount-strength` pushes population
/// counts below zero extensions so they operate on the original narrow
/// value. The identities exist so the two of them can fire at all once the
/// lifter has normalized expressions.
#[rustfmt::skip]
const DEFAULT_RULES: &str = "\
; popcount strength reduction
(rule (popcount (zext ?x)) (zext (popcount ?x)))
; a popcount masked to its lowest bit is a parity
(rule (and (popcount ?x) 1) (zext (parity ?x)))

; bitvector identities
(rule (add ?x 0) ?x)
(rule (add ?x ?y) (add ?y ?x))
(rule (mul ?x 1) ?x)
(rule (and ?x ?x) ?x)
(rule (or ?x ?x) ?x)
(rule (or ?x 0) ?x)
(rule (xor ?x 0) ?x)
(rule (xor ?x ?y) (xor ?y ?x))
(rule (xor ?x ?x) 0)
";

/// Parses the built-in rule set. The text is fixed, so failure here is a
/// programming error.
pub fn default_rules() -> Vec<Rewrite> {
    parse_rules(DEFAULT_RULES).expect("built-in rules must parse")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn built_in_rules_parse() {
        let rules = default_rules();
        assert!(rules.len() >= 10);
    }
}
