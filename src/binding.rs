//! The binding table (C3): which endpoints are bound, as Listener or
//! Replier, to which name patterns.
//!
//! Grounded on the teacher's `global.rs` `SocketType::matches`/`peer`
//! pairing check, generalised from "two enum variants are declared
//! peers" to "two dotted-wildcard patterns both match some literal name"
//! (the replier-conflict test, spec §4.1).

use crate::endpoint::EndpointId;
use crate::error::{Result, SwitchError};
use crate::name::Name;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Listener,
    Replier,
}

#[derive(Debug, Clone)]
struct Entry {
    endpoint: EndpointId,
    pattern: Name,
}

#[derive(Default)]
pub struct BindingTable {
    listeners: Vec<Entry>,
    repliers: Vec<Entry>,
}

/// The outcome of resolving a literal name against the table: the sole
/// replier (if any), and every listener binding that matches — with
/// repeats for an endpoint holding more than one matching pattern
/// (spec §4.1: "the count of listener matches ... determines how many
/// copies that endpoint is scheduled to receive").
pub struct Resolution {
    pub replier: Option<EndpointId>,
    pub listeners: Vec<EndpointId>,
}

impl BindingTable {
    pub fn new() -> BindingTable {
        BindingTable::default()
    }

    pub fn bind(&mut self, endpoint: EndpointId, pattern: Name, role: Role) -> Result<()> {
        if role == Role::Replier {
            if pattern.is_reserved() && pattern.to_string() == "$.KBUS.ReplierBindEvent" {
                return Err(SwitchError::Invalid(
                    "binding as replier to $.KBUS.ReplierBindEvent is forbidden",
                ));
            }
            for existing in &self.repliers {
                if existing.pattern.intersects(&pattern) {
                    return Err(SwitchError::ReplierConflict {
                        new: pattern,
                        existing: existing.pattern.clone(),
                    });
                }
            }
            self.repliers.push(Entry { endpoint, pattern });
        } else {
            self.listeners.push(Entry { endpoint, pattern });
        }
        Ok(())
    }

    pub fn unbind(&mut self, endpoint: EndpointId, pattern: &Name, role: Role) -> Result<()> {
        let list = match role {
            Role::Replier => &mut self.repliers,
            Role::Listener => &mut self.listeners,
        };
        let pos = list
            .iter()
            .position(|e| e.endpoint == endpoint && &e.pattern == pattern);
        match pos {
            Some(i) => {
                list.remove(i);
                Ok(())
            }
            None => Err(SwitchError::NoSuchBinding {
                endpoint,
                role,
                name: pattern.to_string(),
            }),
        }
    }

    pub fn resolve(&self, literal: &Name) -> Resolution {
        let replier = self
            .repliers
            .iter()
            .find(|e| e.pattern.matches_literal(literal))
            .map(|e| e.endpoint);

        let listeners = self
            .listeners
            .iter()
            .filter(|e| e.pattern.matches_literal(literal))
            .map(|e| e.endpoint)
            .collect();

        Resolution { replier, listeners }
    }

    pub fn replier_for(&self, literal: &Name) -> Option<EndpointId> {
        self.repliers
            .iter()
            .find(|e| e.pattern.matches_literal(literal))
            .map(|e| e.endpoint)
    }

    /// Removes every binding owned by `endpoint` (on close), returning
    /// the removed entries as `(pattern, role)` pairs so the caller can
    /// generate the appropriate synthetic/bind-event notifications.
    pub fn remove_endpoint(&mut self, endpoint: EndpointId) -> Vec<(Name, Role)> {
        let mut removed = Vec::new();

        self.repliers.retain(|e| {
            if e.endpoint == endpoint {
                removed.push((e.pattern.clone(), Role::Replier));
                false
            } else {
                true
            }
        });
        self.listeners.retain(|e| {
            if e.endpoint == endpoint {
                removed.push((e.pattern.clone(), Role::Listener));
                false
            } else {
                true
            }
        });

        removed
    }

    /// One `(endpoint, role, pattern)` row per binding, for the
    /// introspection surface (spec §6).
    pub fn rows(&self) -> Vec<(EndpointId, Role, String)> {
        let mut rows: Vec<(EndpointId, Role, String)> = self
            .repliers
            .iter()
            .map(|e| (e.endpoint, Role::Replier, e.pattern.to_string()))
            .collect();
        rows.extend(
            self.listeners
                .iter()
                .map(|e| (e.endpoint, Role::Listener, e.pattern.to_string())),
        );
        rows
    }

    /// Endpoints subscribed (as Listener) to the given reserved event
    /// name, e.g. `$.KBUS.ReplierBindEvent`.
    pub fn subscribers_of(&self, literal: &Name) -> Vec<EndpointId> {
        self.listeners
            .iter()
            .filter(|e| e.pattern.matches_literal(literal))
            .map(|e| e.endpoint)
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pat(s: &str) -> Name {
        Name::parse_pattern(s).unwrap()
    }
    fn lit(s: &str) -> Name {
        Name::parse_literal(s).unwrap()
    }

    #[test]
    fn only_one_replier_may_bind_an_intersecting_pattern() {
        let mut table = BindingTable::new();
        table.bind(1, pat("$.Foo"), Role::Replier).unwrap();
        let err = table.bind(2, pat("$.Foo"), Role::Replier).unwrap_err();
        assert!(matches!(err, SwitchError::ReplierConflict { .. }));
    }

    #[test]
    fn disjoint_replier_patterns_may_coexist() {
        let mut table = BindingTable::new();
        table.bind(1, pat("$.Foo"), Role::Replier).unwrap();
        table.bind(2, pat("$.Bar"), Role::Replier).unwrap();
    }

    #[test]
    fn replier_copy_is_reported_before_listener_copies() {
        let mut table = BindingTable::new();
        table.bind(1, pat("$.Foo"), Role::Replier).unwrap();
        table.bind(1, pat("$.Foo"), Role::Listener).unwrap();

        let res = table.resolve(&lit("$.Foo"));
        assert_eq!(res.replier, Some(1));
        assert_eq!(res.listeners, vec![1]);
    }

    #[test]
    fn remove_endpoint_frees_its_patterns_for_reuse() {
        let mut table = BindingTable::new();
        table.bind(1, pat("$.Foo"), Role::Replier).unwrap();
        table.remove_endpoint(1);
        table.bind(2, pat("$.Foo"), Role::Replier).unwrap();
    }
}
