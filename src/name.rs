//! Message names and binding patterns (part of C3).
//!
//! A name is a dotted path of alphanumeric atoms rooted at `$.`, e.g.
//! `$.Fred.Jim`. A binding pattern is the same grammar with an optional
//! trailing wildcard atom: `*` (matches any continuation, including none)
//! or `%` (matches exactly one further atom).
//!
//! Grounded on the teacher's `global.rs` `SocketType::matches`/`peer`
//! structural-compatibility check: there, two enum variants are
//! compatible iff they're declared peers of each other; here, two dotted
//! patterns are compatible (for the replier-conflict test) iff some
//! literal name matches both. Implemented directly as a small state
//! machine over atoms, per the spec's design note against using regex.

use std::fmt;

use crate::error::SwitchError;

const ROOT: &str = "$";

/// A validated literal or pattern name, stored as its atoms (the root `$`
/// is implicit and not stored as an atom).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Name {
    atoms: Vec<Atom>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Atom {
    Literal(String),
    /// `%` — matches exactly one atom. Only valid as the final atom of a
    /// binding pattern.
    AnyOne,
    /// `*` — matches zero or more atoms. Only valid as the final atom of
    /// a binding pattern.
    AnyRest,
}

impl Name {
    /// Parses and validates a name that must be fully literal (no
    /// wildcards) — the form required for a message's own `name` field.
    pub fn parse_literal(s: &str) -> Result<Name, SwitchError> {
        let name = Self::parse(s, false)?;
        Ok(name)
    }

    /// Parses and validates a binding pattern, which may end in `*` or
    /// `%`.
    pub fn parse_pattern(s: &str) -> Result<Name, SwitchError> {
        Self::parse(s, true)
    }

    fn parse(s: &str, allow_wildcard: bool) -> Result<Name, SwitchError> {
        if s.len() < 3 {
            return Err(SwitchError::NameInvalid(s.to_owned()));
        }

        let mut parts = s.split('.');
        match parts.next() {
            Some(ROOT) => {}
            _ => return Err(SwitchError::NameInvalid(s.to_owned())),
        }

        let rest: Vec<&str> = parts.collect();
        if rest.is_empty() {
            return Err(SwitchError::NameInvalid(s.to_owned()));
        }

        let mut atoms = Vec::with_capacity(rest.len());
        for (i, part) in rest.iter().enumerate() {
            let is_last = i == rest.len() - 1;
            let atom = match *part {
                "*" if allow_wildcard && is_last => Atom::AnyRest,
                "%" if allow_wildcard && is_last => Atom::AnyOne,
                "*" | "%" => return Err(SwitchError::NameInvalid(s.to_owned())),
                lit => {
                    if lit.is_empty() || !lit.chars().all(|c| c.is_ascii_alphanumeric()) {
                        return Err(SwitchError::NameInvalid(s.to_owned()));
                    }
                    Atom::Literal(lit.to_owned())
                }
            };
            atoms.push(atom);
        }

        Ok(Name { atoms })
    }

    pub fn is_reserved(&self) -> bool {
        matches!(self.atoms.first(), Some(Atom::Literal(a)) if a == "KBUS")
    }

    pub fn is_wildcard(&self) -> bool {
        matches!(self.atoms.last(), Some(Atom::AnyOne) | Some(Atom::AnyRest))
    }

    /// True if this pattern matches the given literal name.
    pub fn matches_literal(&self, literal: &Name) -> bool {
        debug_assert!(!literal.is_wildcard());
        match_atoms(&self.atoms, &literal.atoms)
    }

    /// True if some literal name could match both `self` and `other`
    /// (used for the replier-conflict test). Two patterns intersect iff
    /// one is a "prefix" of the other modulo wildcards, walked atom by
    /// atom.
    pub fn intersects(&self, other: &Name) -> bool {
        patterns_intersect(&self.atoms, &other.atoms)
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "$")?;
        for atom in &self.atoms {
            write!(f, ".")?;
            match atom {
                Atom::Literal(s) => write!(f, "{}", s)?,
                Atom::AnyOne => write!(f, "%")?,
                Atom::AnyRest => write!(f, "*")?,
            }
        }
        Ok(())
    }
}

fn match_atoms(pattern: &[Atom], literal: &[Atom]) -> bool {
    match pattern.first() {
        None => literal.is_empty(),
        Some(Atom::AnyRest) => true,
        Some(Atom::AnyOne) => {
            !literal.is_empty() && match_atoms(&pattern[1..], &literal[1..])
        }
        Some(Atom::Literal(p)) => match literal.first() {
            Some(Atom::Literal(l)) if l == p => match_atoms(&pattern[1..], &literal[1..]),
            _ => false,
        },
    }
}

fn patterns_intersect(a: &[Atom], b: &[Atom]) -> bool {
    match (a.first(), b.first()) {
        (None, None) => true,
        (None, Some(Atom::AnyRest)) | (Some(Atom::AnyRest), None) => true,
        (None, _) | (_, None) => false,
        (Some(Atom::AnyRest), _) | (_, Some(Atom::AnyRest)) => true,
        (Some(Atom::AnyOne), _) => patterns_intersect(&a[1..], &b[1..]),
        (_, Some(Atom::AnyOne)) => patterns_intersect(&a[1..], &b[1..]),
        (Some(Atom::Literal(x)), Some(Atom::Literal(y))) => {
            x == y && patterns_intersect(&a[1..], &b[1..])
        }
    }
}

#[cfg(test)]
mod tests {
    use super::Name;

    fn lit(s: &str) -> Name {
        Name::parse_literal(s).unwrap()
    }

    fn pat(s: &str) -> Name {
        Name::parse_pattern(s).unwrap()
    }

    #[test]
    fn rejects_names_without_dollar_root() {
        assert!(Name::parse_literal("Fred.Jim").is_err());
    }

    #[test]
    fn rejects_empty_atoms() {
        assert!(Name::parse_literal("$.Fred..Jim").is_err());
    }

    #[test]
    fn literal_name_rejects_wildcards() {
        assert!(Name::parse_literal("$.Fred.*").is_err());
        assert!(Name::parse_literal("$.Fred.%").is_err());
    }

    #[test]
    fn star_matches_any_continuation_including_empty() {
        let p = pat("$.*");
        assert!(p.matches_literal(&lit("$.Fred")));
        assert!(p.matches_literal(&lit("$.Fred.Jim")));
    }

    #[test]
    fn percent_matches_exactly_one_atom() {
        let p = pat("$.%");
        assert!(p.matches_literal(&lit("$.Fred")));
        assert!(!p.matches_literal(&lit("$.Fred.Jim")));
    }

    #[test]
    fn disjoint_literals_do_not_intersect() {
        assert!(!pat("$.Fred").intersects(&pat("$.Jim")));
    }

    #[test]
    fn star_intersects_any_prefix() {
        assert!(pat("$.Fred.*").intersects(&pat("$.Fred.Jim")));
        assert!(pat("$.*").intersects(&pat("$.Fred.Jim.Sheila")));
    }

    #[test]
    fn reserved_names_are_detected() {
        assert!(lit("$.KBUS.ReplierBindEvent").is_reserved());
        assert!(!lit("$.Fred").is_reserved());
    }
}
