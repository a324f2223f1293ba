// header/callsite.rs — Call statement generation
//
// Produces the statement a graph compiler inlines to call one variant of a
// header. Every emitted channel needs an output argument; channels the caller
// does not consume are routed into a throwaway local, one per element type.
//
//   {
//     double G_UNUSED_double;
//     RadiusWithFirstOrderDerivatives(px, py, &radius, &G_UNUSED_double);
//   }
//
// Preconditions: the header is validated.
// Postconditions: one argument per input expression, then one `&dest` per
//                 emitted channel in canonical order.
// Failure modes: unsupported variant, wrong input count, a consumed channel
//                the variant never produces, a consumed channel without a
//                destination.
// Side effects: none.

use std::collections::{BTreeMap, BTreeSet};

use super::Header;
use crate::channel::Channel;
use crate::error::{HeaderError, Result};
use crate::ident::is_valid_qualified_path;
use crate::variant::CapabilityVariant;

/// Prefix of the throwaway locals that absorb unconsumed outputs.
pub const UNUSED_PREFIX: &str = "G_UNUSED_";

const INDENT: &str = "  ";

/// What the surrounding code offers a call: input expressions, the channels
/// it reads, and where each of them goes.
pub trait UsageContext {
    fn input_expressions(&self) -> &[String];
    fn consumed_channels(&self) -> &BTreeSet<Channel>;
    fn destination(&self, channel: &Channel) -> Option<&str>;
}

/// Plain `UsageContext` built up by the caller.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallContext {
    inputs: Vec<String>,
    consumed: BTreeSet<Channel>,
    destinations: BTreeMap<Channel, String>,
}

impl CallContext {
    pub fn new<I, S>(inputs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        CallContext {
            inputs: inputs.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Consume `channel` and write it to `destination`.
    pub fn bind(mut self, channel: Channel, destination: impl Into<String>) -> Self {
        self.consumed.insert(channel);
        self.destinations.insert(channel, destination.into());
        self
    }

    /// Consume `channel` without a destination; only valid for constants.
    pub fn require(mut self, channel: Channel) -> Self {
        self.consumed.insert(channel);
        self
    }
}

impl UsageContext for CallContext {
    fn input_expressions(&self) -> &[String] {
        &self.inputs
    }

    fn consumed_channels(&self) -> &BTreeSet<Channel> {
        &self.consumed
    }

    fn destination(&self, channel: &Channel) -> Option<&str> {
        self.destinations.get(channel).map(String::as_str)
    }
}

/// A generated call statement plus the consumed channels that resolved to
/// compile-time constants instead of call outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub lines: Vec<String>,
    pub resolved_constants: BTreeMap<Channel, f64>,
}

impl CallSite {
    pub fn text(&self) -> String {
        self.lines.join("\n")
    }
}

impl Header {
    pub fn generate_call_site(
        &self,
        variant: &CapabilityVariant,
        ctx: &impl UsageContext,
    ) -> Result<CallSite> {
        self.build_call_site(variant, ctx, None)
    }

    /// Same as `generate_call_site`, calling `namespace::Name` instead.
    pub fn generate_qualified_call_site(
        &self,
        variant: &CapabilityVariant,
        ctx: &impl UsageContext,
        namespace: &str,
    ) -> Result<CallSite> {
        if !is_valid_qualified_path(namespace) {
            return Err(HeaderError::InvalidQualifiedPath(namespace.to_string()));
        }
        self.build_call_site(variant, ctx, Some(namespace))
    }

    fn build_call_site(
        &self,
        variant: &CapabilityVariant,
        ctx: &impl UsageContext,
        namespace: Option<&str>,
    ) -> Result<CallSite> {
        if !self.supports(variant) {
            return Err(HeaderError::UnsupportedVariant(variant.to_string()));
        }
        let inputs = ctx.input_expressions();
        if inputs.len() != self.inputs.len() {
            return Err(HeaderError::ArityMismatch {
                what: "input expressions",
                expected: self.inputs.len(),
                found: inputs.len(),
            });
        }

        let full: BTreeSet<Channel> = self.full_channels(variant).into_iter().collect();
        let consumed = ctx.consumed_channels();
        if let Some(channel) = consumed.iter().find(|c| !full.contains(c)) {
            return Err(HeaderError::UnavailableChannel {
                channel: self.describe(channel),
                variant: variant.to_string(),
            });
        }

        let mut args: Vec<String> = inputs.to_vec();
        let mut unused_types: Vec<&str> = Vec::new();
        for channel in self.emitted_channels(variant) {
            if consumed.contains(&channel) {
                let dest = ctx
                    .destination(&channel)
                    .ok_or_else(|| HeaderError::MissingDestination(self.describe(&channel)))?;
                args.push(format!("&{}", dest));
            } else {
                let ty = self.channel_type(&channel)?;
                if !unused_types.contains(&ty) {
                    unused_types.push(ty);
                }
                args.push(format!("&{}{}", UNUSED_PREFIX, ty));
            }
        }

        let callee = match namespace {
            Some(ns) => format!("{}::{}", ns, variant.decorate(&self.name)?),
            None => variant.decorate(&self.name)?,
        };

        let mut lines = vec!["{".to_string()];
        lines.extend(
            unused_types
                .iter()
                .map(|ty| format!("{INDENT}{ty} {UNUSED_PREFIX}{ty};")),
        );
        lines.push(format!("{INDENT}{}({});", callee, args.join(", ")));
        lines.push("}".to_string());

        let resolved_constants = self
            .constants
            .iter()
            .filter(|(c, _)| full.contains(c) && consumed.contains(c))
            .map(|(c, v)| (*c, *v))
            .collect();

        Ok(CallSite {
            lines,
            resolved_constants,
        })
    }
}
