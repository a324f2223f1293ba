// variant.rs — Capability variants and their registry
//
// A capability variant selects which derivative orders a generated function
// computes. The toggle set is a closed, versioned record: adding an order is a
// schema change to `Toggle` and `CapabilityVariant`, checked exhaustively by
// the compiler and by strict text decoding.
//
// The registry maps canonical short names (`d0`, `d1`, `d2`) to variants. It is
// built once on first access and never mutated.

use std::fmt;
use std::sync::OnceLock;

use serde_json::{Map, Value};

use crate::error::{HeaderError, Result};
use crate::ident::is_valid_identifier;

/// One derivative-order switch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Toggle {
    FirstOrder,
    SecondOrder,
}

impl Toggle {
    /// Declaration order; also the canonical key order of the text encoding.
    pub const ALL: [Toggle; 2] = [Toggle::FirstOrder, Toggle::SecondOrder];

    /// Key used in the text encoding.
    pub fn key(self) -> &'static str {
        match self {
            Toggle::FirstOrder => "enable_1st_order_derivative",
            Toggle::SecondOrder => "enable_2nd_order_derivative",
        }
    }

    /// Title-cased label used when decorating function names.
    pub fn label(self) -> &'static str {
        match self {
            Toggle::FirstOrder => "First",
            Toggle::SecondOrder => "Second",
        }
    }

    pub fn from_key(key: &str) -> Option<Self> {
        Toggle::ALL.into_iter().find(|t| t.key() == key)
    }
}

/// Which derivative orders a function variant exposes.
///
/// The default value (all toggles off) is the plain function.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct CapabilityVariant {
    pub first_order: bool,
    pub second_order: bool,
}

impl CapabilityVariant {
    pub const fn new(first_order: bool, second_order: bool) -> Self {
        CapabilityVariant {
            first_order,
            second_order,
        }
    }

    pub fn get(&self, toggle: Toggle) -> bool {
        match toggle {
            Toggle::FirstOrder => self.first_order,
            Toggle::SecondOrder => self.second_order,
        }
    }

    pub fn with(mut self, toggle: Toggle, on: bool) -> Self {
        match toggle {
            Toggle::FirstOrder => self.first_order = on,
            Toggle::SecondOrder => self.second_order = on,
        }
        self
    }

    pub fn is_default(&self) -> bool {
        *self == CapabilityVariant::default()
    }

    /// Active toggles in declaration order.
    pub fn active(&self) -> impl Iterator<Item = Toggle> + '_ {
        Toggle::ALL.into_iter().filter(move |t| self.get(*t))
    }

    /// Toggle-wise OR.
    pub fn union(self, other: Self) -> Self {
        Toggle::ALL
            .into_iter()
            .fold(self, |acc, t| acc.with(t, self.get(t) || other.get(t)))
    }

    /// `Name`, `NameWithFirstOrderDerivatives`, `NameWithFirstSecondOrderDerivatives`.
    pub fn decorate(&self, base_name: &str) -> Result<String> {
        if !is_valid_identifier(base_name) {
            return Err(HeaderError::InvalidIdentifier(base_name.to_string()));
        }
        if self.is_default() {
            return Ok(base_name.to_string());
        }
        let labels: String = self.active().map(Toggle::label).collect();
        Ok(format!("{}With{}OrderDerivatives", base_name, labels))
    }

    /// Canonical encoding: a JSON object with every toggle key, in key order,
    /// indented by two spaces.
    pub fn to_text(&self) -> String {
        let map: Map<String, Value> = Toggle::ALL
            .into_iter()
            .map(|t| (t.key().to_string(), Value::Bool(self.get(t))))
            .collect();
        format!("{:#}", Value::Object(map))
    }

    /// Decode `to_text` output. Starts from the default variant and applies
    /// only known toggles; with `strict`, the key set must match exactly.
    pub fn from_text(text: &str, strict: bool) -> Result<Self> {
        let map: Map<String, Value> = serde_json::from_str(text)
            .map_err(|e| HeaderError::InvalidVariantText(e.to_string()))?;

        if strict {
            let unknown: Vec<&str> = map
                .keys()
                .filter(|k| Toggle::from_key(k).is_none())
                .map(String::as_str)
                .collect();
            let missing: Vec<&str> = Toggle::ALL
                .into_iter()
                .filter(|t| !map.contains_key(t.key()))
                .map(Toggle::key)
                .collect();
            if !unknown.is_empty() || !missing.is_empty() {
                return Err(HeaderError::InvalidVariantText(format!(
                    "key set mismatch (unknown: [{}], missing: [{}])",
                    unknown.join(", "),
                    missing.join(", ")
                )));
            }
        }

        let mut variant = CapabilityVariant::default();
        for (key, value) in &map {
            let Some(toggle) = Toggle::from_key(key) else {
                continue;
            };
            let on = value.as_bool().ok_or_else(|| {
                HeaderError::InvalidVariantText(format!("'{}' must be a boolean, found {}", key, value))
            })?;
            variant = variant.with(toggle, on);
        }
        Ok(variant)
    }
}

impl fmt::Display for CapabilityVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match registry().short_name(self) {
            Some(name) => f.write_str(name),
            None => {
                let parts: Vec<String> = Toggle::ALL
                    .into_iter()
                    .map(|t| format!("{}={}", t.key(), self.get(t)))
                    .collect();
                write!(f, "{{{}}}", parts.join(", "))
            }
        }
    }
}

// ── Registry ────────────────────────────────────────────────────────────────

/// Ordered table of canonical variants. Its order is the print order of
/// variant blocks in a header.
#[derive(Debug)]
pub struct VariantRegistry {
    entries: Vec<(&'static str, CapabilityVariant)>,
    widest: CapabilityVariant,
}

pub const DEFAULT_VARIANT: CapabilityVariant = CapabilityVariant::new(false, false);

/// The process-wide registry.
pub fn registry() -> &'static VariantRegistry {
    static REGISTRY: OnceLock<VariantRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| {
        let entries = vec![
            ("d0", DEFAULT_VARIANT),
            ("d1", CapabilityVariant::new(true, false)),
            ("d2", CapabilityVariant::new(true, true)),
        ];
        let widest = entries
            .iter()
            .fold(DEFAULT_VARIANT, |acc, (_, v)| acc.union(*v));
        VariantRegistry { entries, widest }
    })
}

impl VariantRegistry {
    pub fn lookup(&self, short_name: &str) -> Option<CapabilityVariant> {
        self.entries
            .iter()
            .find(|(n, _)| *n == short_name)
            .map(|(_, v)| *v)
    }

    pub fn short_name(&self, variant: &CapabilityVariant) -> Option<&'static str> {
        self.entries
            .iter()
            .find(|(_, v)| v == variant)
            .map(|(n, _)| *n)
    }

    /// Registry position, used to order variant blocks.
    pub fn position(&self, variant: &CapabilityVariant) -> Option<usize> {
        self.entries.iter().position(|(_, v)| v == variant)
    }

    /// The variant with every toggle on; it has the largest channel universe.
    pub fn widest(&self) -> CapabilityVariant {
        self.widest
    }

    pub fn iter(&self) -> impl Iterator<Item = (&'static str, CapabilityVariant)> + '_ {
        self.entries.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn resolve<S: AsRef<str>>(&self, names: &[S]) -> Result<Vec<CapabilityVariant>> {
        names
            .iter()
            .map(|n| {
                self.lookup(n.as_ref())
                    .ok_or_else(|| HeaderError::UnknownVariant(n.as_ref().to_string()))
            })
            .collect()
    }

    pub fn names_of(&self, variants: &[CapabilityVariant]) -> Result<Vec<&'static str>> {
        variants
            .iter()
            .map(|v| {
                self.short_name(v)
                    .ok_or_else(|| HeaderError::UnregisteredVariant(v.to_string()))
            })
            .collect()
    }
}
