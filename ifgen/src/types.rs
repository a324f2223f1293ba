// types.rs — Numeric element type lattice
//
// A fixed, totally ordered set of numeric element types. The order (promotion
// rank) drives type combination and transferability; a cheap subset is passed
// by value in generated prototypes, everything else by const reference.
//
// Types that are not in the lattice (user types such as `UserType`) are still
// legal port types: they have no rank and always pass by const reference.

use std::fmt;

use crate::error::{HeaderError, Result};
use crate::ident::is_valid_identifier;

/// Element types known to the promotion lattice, in rank order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ElementType {
    Int,
    Float,
    Double,
    ArrayXd,
}

impl ElementType {
    pub const ALL: [ElementType; 4] = [
        ElementType::Int,
        ElementType::Float,
        ElementType::Double,
        ElementType::ArrayXd,
    ];

    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(ElementType::Int),
            "float" => Some(ElementType::Float),
            "double" => Some(ElementType::Double),
            "ArrayXd" => Some(ElementType::ArrayXd),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ElementType::Int => "int",
            ElementType::Float => "float",
            ElementType::Double => "double",
            ElementType::ArrayXd => "ArrayXd",
        }
    }

    /// Promotion rank; larger ranks absorb smaller ones.
    pub fn rank(self) -> u32 {
        match self {
            ElementType::Int => 1,
            ElementType::Float => 2,
            ElementType::Double => 3,
            ElementType::ArrayXd => 4,
        }
    }

    fn is_cheap(self) -> bool {
        matches!(self, ElementType::Int | ElementType::Double)
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How a parameter of a given type appears in a generated prototype.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassingConvention {
    ByValue,
    ByConstReference,
}

/// Rank of a type name, `None` when the name is outside the lattice.
pub fn rank(type_name: &str) -> Option<u32> {
    ElementType::from_name(type_name).map(ElementType::rank)
}

pub fn is_numeric(type_name: &str) -> bool {
    ElementType::from_name(type_name).is_some()
}

/// The highest-ranked recognized type among `types`; unrecognized entries
/// are skipped. `None` if nothing was recognized.
pub fn combine<'a, I>(types: I) -> Option<ElementType>
where
    I: IntoIterator<Item = &'a str>,
{
    types
        .into_iter()
        .filter_map(ElementType::from_name)
        .max_by_key(|t| t.rank())
}

/// `rank(from) <= rank(to)`; false if either side is unrecognized.
pub fn is_transferable(from: &str, to: &str) -> bool {
    match (rank(from), rank(to)) {
        (Some(a), Some(b)) => a <= b,
        _ => false,
    }
}

pub fn passing_convention(type_name: &str) -> Result<PassingConvention> {
    if !is_valid_identifier(type_name) {
        return Err(HeaderError::InvalidIdentifier(type_name.to_string()));
    }
    match ElementType::from_name(type_name) {
        Some(t) if t.is_cheap() => Ok(PassingConvention::ByValue),
        _ => Ok(PassingConvention::ByConstReference),
    }
}

/// Render an input parameter: `double x` or `const UserType& c`.
pub fn render_param(type_name: &str, name: &str) -> Result<String> {
    Ok(match passing_convention(type_name)? {
        PassingConvention::ByValue => format!("{} {}", type_name, name),
        PassingConvention::ByConstReference => format!("const {}& {}", type_name, name),
    })
}
