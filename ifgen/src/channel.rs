// channel.rs — Output channels and their names
//
// A channel addresses one value a function writes: an output itself, its
// partial derivative with respect to one input, or its second partial with
// respect to an (unordered) pair of inputs.
//
// Naming grammar (port names are lowercase, so the uppercase markers never
// collide with them):
//
//   (o)        out
//   (o, i)     D_out_D_in
//   (o, a, b)  D2_out_D_ina_D_inb      with a <= b
//
// Preconditions: none.
// Postconditions: `Channel::from_name(c.name(..)) == c` for every canonical `c`,
//                 and `Channel::from_name(n)?.name(..) == n` for every name
//                 whose second-order pair is already in order.
// Failure modes: invalid port names, out-of-range indices, and names that do
//                not match one of the three shapes.
// Side effects: none.

use std::fmt;

use crate::error::{HeaderError, Result};
use crate::ident::is_valid_field_name;

const FIRST_PREFIX: &str = "D_";
const SECOND_PREFIX: &str = "D2_";
const SEPARATOR: &str = "_D_";

/// Address of one output value or partial derivative.
///
/// The derived `Ord` is the canonical emission order: all values, then all
/// first-order channels, then all second-order channels, each output-major.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Channel {
    /// Output `o` itself.
    Value(usize),
    /// `d out[o] / d in[i]`.
    First(usize, usize),
    /// `d² out[o] / d in[a] d in[b]`, canonical when `a <= b`.
    Second(usize, usize, usize),
}

impl Channel {
    /// Second-order channel with the input pair put in canonical order.
    pub fn second(output: usize, a: usize, b: usize) -> Self {
        Channel::Second(output, a.min(b), a.max(b))
    }

    pub fn output(&self) -> usize {
        match *self {
            Channel::Value(o) | Channel::First(o, _) | Channel::Second(o, _, _) => o,
        }
    }

    /// Derivative order: 0, 1 or 2.
    pub fn order(&self) -> usize {
        match self {
            Channel::Value(_) => 0,
            Channel::First(..) => 1,
            Channel::Second(..) => 2,
        }
    }

    pub fn is_canonical(&self) -> bool {
        match *self {
            Channel::Second(_, a, b) => a <= b,
            _ => true,
        }
    }

    /// Whether every index lies inside the given dimensions.
    pub fn fits(&self, in_dim: usize, out_dim: usize) -> bool {
        match *self {
            Channel::Value(o) => o < out_dim,
            Channel::First(o, i) => o < out_dim && i < in_dim,
            Channel::Second(o, a, b) => o < out_dim && a < in_dim && b < in_dim,
        }
    }

    /// Generated-code name of this channel.
    pub fn name<S: AsRef<str>>(&self, outputs: &[S], inputs: &[S]) -> Result<String> {
        let out_of_range = || HeaderError::ChannelOutOfRange {
            channel: self.to_string(),
            outputs: outputs.len(),
            inputs: inputs.len(),
        };
        let lookup = |names: &[S], idx: usize| -> Result<String> {
            let name = names.get(idx).ok_or_else(out_of_range)?.as_ref();
            if !is_valid_field_name(name) {
                return Err(HeaderError::InvalidFieldName(name.to_string()));
            }
            Ok(name.to_string())
        };

        Ok(match *self {
            Channel::Value(o) => lookup(outputs, o)?,
            Channel::First(o, i) => format!(
                "{FIRST_PREFIX}{}{SEPARATOR}{}",
                lookup(outputs, o)?,
                lookup(inputs, i)?
            ),
            Channel::Second(o, a, b) => format!(
                "{SECOND_PREFIX}{}{SEPARATOR}{}{SEPARATOR}{}",
                lookup(outputs, o)?,
                lookup(inputs, a)?,
                lookup(inputs, b)?
            ),
        })
    }

    /// Decode a channel name against the given port names. Out-of-order
    /// second-order pairs are canonicalized.
    pub fn from_name<S: AsRef<str>>(name: &str, outputs: &[S], inputs: &[S]) -> Result<Self> {
        let malformed = || HeaderError::MalformedChannelName(name.to_string());

        let (expected, body) = if let Some(rest) = name.strip_prefix(SECOND_PREFIX) {
            (3, rest)
        } else if let Some(rest) = name.strip_prefix(FIRST_PREFIX) {
            (2, rest)
        } else {
            (1, name)
        };

        let segments: Vec<&str> = if expected == 1 {
            vec![body]
        } else {
            body.split(SEPARATOR).collect()
        };
        if segments.len() != expected || !segments.iter().all(|s| is_valid_field_name(s)) {
            return Err(malformed());
        }

        let index_of = |names: &[S], port: &str| -> Result<usize> {
            names
                .iter()
                .position(|n| n.as_ref() == port)
                .ok_or_else(|| HeaderError::UnknownPort {
                    port: port.to_string(),
                    name: name.to_string(),
                })
        };

        let out = index_of(outputs, segments[0])?;
        Ok(match segments.len() {
            1 => Channel::Value(out),
            2 => Channel::First(out, index_of(inputs, segments[1])?),
            _ => Channel::second(
                out,
                index_of(inputs, segments[1])?,
                index_of(inputs, segments[2])?,
            ),
        })
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Value(o) => write!(f, "({})", o),
            Channel::First(o, i) => write!(f, "({}, {})", o, i),
            Channel::Second(o, a, b) => write!(f, "({}, {}, {})", o, a, b),
        }
    }
}

/// All channels of a function with `in_dim` inputs and `out_dim` outputs, in
/// canonical emission order.
pub fn enumerate_channels(
    in_dim: usize,
    out_dim: usize,
    first_order: bool,
    second_order: bool,
) -> Vec<Channel> {
    let mut channels: Vec<Channel> = (0..out_dim).map(Channel::Value).collect();

    if first_order {
        for o in 0..out_dim {
            channels.extend((0..in_dim).map(|i| Channel::First(o, i)));
        }
    }

    if second_order {
        for o in 0..out_dim {
            for j in 0..in_dim {
                channels.extend((j..in_dim).map(|k| Channel::Second(o, j, k)));
            }
        }
    }

    channels
}

/// Number of channels `enumerate_channels` yields.
pub fn channel_count(in_dim: usize, out_dim: usize, first_order: bool, second_order: bool) -> usize {
    let mut n = out_dim;
    if first_order {
        n += out_dim * in_dim;
    }
    if second_order {
        n += out_dim * in_dim * (in_dim + 1) / 2;
    }
    n
}
