// header/mod.rs — Function interface model
//
// A `Header` is the complete interface of one differentiable function: its
// name, ordered input and output ports, the capability variants it is
// generated for, and the derivative channels known to be constant (usually
// zero) and therefore left out of every generated prototype.
//
// Sub-modules:
//   codec     — textual round-trip with the generated header format
//   callsite  — call statement generation for the graph compiler
//
// Preconditions: none.
// Postconditions: every `Header` handed out has passed `validate`; it is never
//                 mutated afterwards.
// Failure modes: invalid identifiers, duplicate port names, unregistered or
//                duplicate variants, a missing default variant, constants that
//                are non-finite, zero-order, or outside the supported channels.
// Side effects: debug logging only.

pub mod callsite;
pub mod codec;

use std::collections::{BTreeMap, BTreeSet};

use chumsky::span::{SimpleSpan, Span as _};
use serde::Serialize;

use crate::channel::{enumerate_channels, Channel};
use crate::error::{HeaderError, Result};
use crate::ident::{is_valid_field_name, is_valid_identifier};
use crate::parser::{line_of, parse_decls};
use crate::variant::{registry, CapabilityVariant, DEFAULT_VARIANT};

pub use callsite::{CallContext, CallSite, UsageContext};

/// Decimal digits a constant literal keeps in header text.
pub const CONSTANT_PRECISION: usize = 6;

/// The value a literal reads back as after printing at `CONSTANT_PRECISION`.
/// Negative zero becomes zero.
pub fn round_literal(value: f64) -> f64 {
    let rounded: f64 = format!("{:.*}", CONSTANT_PRECISION, value)
        .parse()
        .unwrap_or(value);
    rounded + 0.0
}

// ── Data types ──────────────────────────────────────────────────────────────

/// A typed, named function parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Port {
    #[serde(rename = "type")]
    pub ty: String,
    pub name: String,
}

impl Port {
    pub fn new(ty: impl Into<String>, name: impl Into<String>) -> Self {
        Port {
            ty: ty.into(),
            name: name.into(),
        }
    }
}

/// Compact textual description of a header.
///
/// `derivatives` lists derivative channels by name: a bare name is computed
/// at runtime, `name = literal` is constant. Derivative channels of the
/// supported variants that are not mentioned are constant zero.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HeaderSpec {
    pub name: String,
    pub inputs: String,
    pub outputs: String,
    pub derivatives: String,
    pub variants: Vec<String>,
}

/// Interface of one function across its capability variants.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    name: String,
    inputs: Vec<Port>,
    outputs: Vec<Port>,
    variants: Vec<CapabilityVariant>,
    constants: BTreeMap<Channel, f64>,
}

// ── Construction ────────────────────────────────────────────────────────────

impl Header {
    /// Build and validate a header. Variants are reordered into registry
    /// order, which is also the order their blocks are printed in.
    pub fn new(
        name: impl Into<String>,
        inputs: Vec<Port>,
        outputs: Vec<Port>,
        variants: Vec<CapabilityVariant>,
        constants: BTreeMap<Channel, f64>,
    ) -> Result<Self> {
        let header = Header {
            name: name.into(),
            inputs,
            outputs,
            variants: canonical_variants(variants)?,
            constants: constants
                .into_iter()
                .map(|(channel, value)| (channel, round_literal(value)))
                .collect(),
        };
        header.validate()?;
        log::debug!(
            "header {}: {} inputs, {} outputs, {} variants, {} constant channels",
            header.name,
            header.inputs.len(),
            header.outputs.len(),
            header.variants.len(),
            header.constants.len()
        );
        Ok(header)
    }

    /// Build a header from its compact textual description.
    pub fn from_spec(spec: &HeaderSpec) -> Result<Self> {
        let inputs = ports_from_decls(&spec.inputs, "inputs")?;
        let outputs = ports_from_decls(&spec.outputs, "outputs")?;
        let variants = registry().resolve(&spec.variants)?;
        let base = Header::new(spec.name.clone(), inputs, outputs, variants, BTreeMap::new())?;

        let universe: BTreeSet<Channel> = base.derivative_universe().collect();
        let mut ledger = ChannelLedger::default();
        for decl in parse_decls(&spec.derivatives, "derivatives")? {
            let channel = base.channel_from_name(&decl.name.name)?;
            if channel.order() > 0 && !universe.contains(&channel) {
                return Err(HeaderError::ChannelOutsideVariants(decl.name.name));
            }
            if let Some(ty) = &decl.ty {
                base.check_channel_type(&channel, &decl.name.name, &ty.name)?;
            }
            match decl.value {
                Some(value) => ledger.mark_constant(&base, channel, value)?,
                None => ledger.mark_runtime(&base, channel)?,
            }
        }
        for channel in universe {
            if !ledger.mentions(&channel) {
                ledger.mark_constant(&base, channel, 0.0)?;
            }
        }

        let header = Header {
            constants: ledger.into_constants(),
            ..base
        };
        header.validate_constants()?;
        log::debug!(
            "header {}: built from description with {} constant channels",
            header.name,
            header.constants.len()
        );
        Ok(header)
    }

    /// The compact description this header can be rebuilt from.
    pub fn to_spec(&self) -> Result<HeaderSpec> {
        let render = |ports: &[Port]| {
            ports
                .iter()
                .map(|p| format!("{} {}", p.ty, p.name))
                .collect::<Vec<_>>()
                .join(", ")
        };

        let mut derivatives = Vec::new();
        for channel in self.derivative_universe() {
            let name = self.channel_name(&channel)?;
            match self.constants.get(&channel) {
                None => derivatives.push(name),
                Some(value) if *value != 0.0 => derivatives.push(format!("{} = {:?}", name, value)),
                Some(_) => {}
            }
        }

        Ok(HeaderSpec {
            name: self.name.clone(),
            inputs: render(&self.inputs),
            outputs: render(&self.outputs),
            derivatives: derivatives.join(", "),
            variants: registry()
                .names_of(&self.variants)?
                .into_iter()
                .map(str::to_string)
                .collect(),
        })
    }

    fn validate(&self) -> Result<()> {
        if !is_valid_identifier(&self.name) {
            return Err(HeaderError::InvalidIdentifier(self.name.clone()));
        }
        let mut seen = BTreeSet::new();
        for port in self.inputs.iter().chain(&self.outputs) {
            if !is_valid_identifier(&port.ty) {
                return Err(HeaderError::InvalidIdentifier(port.ty.clone()));
            }
            if !is_valid_field_name(&port.name) {
                return Err(HeaderError::InvalidFieldName(port.name.clone()));
            }
            if !seen.insert(port.name.as_str()) {
                return Err(HeaderError::DuplicatePort(port.name.clone()));
            }
        }
        self.validate_constants()
    }

    fn validate_constants(&self) -> Result<()> {
        let universe: BTreeSet<Channel> = self.full_channels(&self.widest_supported()).into_iter().collect();
        for (channel, value) in &self.constants {
            if channel.order() == 0 {
                return Err(HeaderError::ConstantValueChannel(self.describe(channel)));
            }
            if !universe.contains(channel) {
                return Err(HeaderError::ChannelOutsideVariants(self.describe(channel)));
            }
            if !value.is_finite() {
                return Err(HeaderError::NonFiniteLiteral {
                    channel: self.describe(channel),
                    value: *value,
                });
            }
        }
        Ok(())
    }
}

/// Check registration and uniqueness, require the default variant, and sort
/// into registry order.
fn canonical_variants(variants: Vec<CapabilityVariant>) -> Result<Vec<CapabilityVariant>> {
    let reg = registry();
    let mut keyed = Vec::with_capacity(variants.len());
    for variant in variants {
        let position = reg
            .position(&variant)
            .ok_or_else(|| HeaderError::UnregisteredVariant(variant.to_string()))?;
        if keyed.iter().any(|(_, v)| *v == variant) {
            return Err(HeaderError::DuplicateVariant(variant.to_string()));
        }
        keyed.push((position, variant));
    }
    if !keyed.iter().any(|(_, v)| *v == DEFAULT_VARIANT) {
        return Err(HeaderError::MissingDefaultVariant);
    }
    keyed.sort_by_key(|(position, _)| *position);
    Ok(keyed.into_iter().map(|(_, v)| v).collect())
}

fn ports_from_decls(source: &str, what: &str) -> Result<Vec<Port>> {
    parse_decls(source, what)?
        .into_iter()
        .map(|decl| {
            let syntax = |span: SimpleSpan, message: String| HeaderError::Syntax {
                line: line_of(source, span.start()),
                message,
            };
            if decl.value.is_some() {
                return Err(syntax(
                    decl.span,
                    format!("{}: port '{}' cannot have a value", what, decl.name.name),
                ));
            }
            let ty = decl.ty.ok_or_else(|| {
                syntax(
                    decl.name.span,
                    format!("{}: port '{}' needs a type", what, decl.name.name),
                )
            })?;
            Ok(Port::new(ty.name, decl.name.name))
        })
        .collect()
}

// ── Queries ─────────────────────────────────────────────────────────────────

impl Header {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn inputs(&self) -> &[Port] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[Port] {
        &self.outputs
    }

    /// Supported variants in registry order.
    pub fn supported_variants(&self) -> &[CapabilityVariant] {
        &self.variants
    }

    /// Constant derivative channels shared by every variant.
    pub fn constant_channels(&self) -> &BTreeMap<Channel, f64> {
        &self.constants
    }

    pub fn input_names(&self) -> Vec<&str> {
        self.inputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn output_names(&self) -> Vec<&str> {
        self.outputs.iter().map(|p| p.name.as_str()).collect()
    }

    pub fn supports(&self, variant: &CapabilityVariant) -> bool {
        self.variants.contains(variant)
    }

    /// Union of the supported variants' toggles; its enumeration is the
    /// universe constant channels are drawn from.
    pub fn widest_supported(&self) -> CapabilityVariant {
        self.variants
            .iter()
            .fold(DEFAULT_VARIANT, |acc, v| acc.union(*v))
    }

    /// Every channel of `variant`, constant or not.
    pub fn full_channels(&self, variant: &CapabilityVariant) -> Vec<Channel> {
        enumerate_channels(
            self.inputs.len(),
            self.outputs.len(),
            variant.first_order,
            variant.second_order,
        )
    }

    /// Channels that appear in the generated interface of `variant`.
    pub fn emitted_channels(&self, variant: &CapabilityVariant) -> Vec<Channel> {
        self.full_channels(variant)
            .into_iter()
            .filter(|c| !self.constants.contains_key(c))
            .collect()
    }

    /// Channels of `variant` not in `given`.
    pub fn missing_channels(
        &self,
        variant: &CapabilityVariant,
        given: &BTreeSet<Channel>,
    ) -> Vec<Channel> {
        self.full_channels(variant)
            .into_iter()
            .filter(|c| !given.contains(c))
            .collect()
    }

    pub fn channel_name(&self, channel: &Channel) -> Result<String> {
        channel.name(&self.output_names(), &self.input_names())
    }

    pub fn channel_from_name(&self, name: &str) -> Result<Channel> {
        Channel::from_name(name, &self.output_names(), &self.input_names())
    }

    /// Element type of a channel: the type of the output it belongs to.
    pub fn channel_type(&self, channel: &Channel) -> Result<&str> {
        self.outputs
            .get(channel.output())
            .map(|p| p.ty.as_str())
            .ok_or_else(|| HeaderError::ChannelOutOfRange {
                channel: channel.to_string(),
                outputs: self.outputs.len(),
                inputs: self.inputs.len(),
            })
    }

    fn check_channel_type(&self, channel: &Channel, name: &str, found: &str) -> Result<()> {
        let expected = self.channel_type(channel)?;
        if expected != found {
            return Err(HeaderError::ChannelTypeMismatch {
                channel: name.to_string(),
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Derivative channels (order >= 1) of the widest supported variant.
    fn derivative_universe(&self) -> impl Iterator<Item = Channel> {
        self.full_channels(&self.widest_supported())
            .into_iter()
            .filter(|c| c.order() > 0)
    }

    /// Channel name when it resolves, tuple form otherwise.
    fn describe(&self, channel: &Channel) -> String {
        self.channel_name(channel)
            .unwrap_or_else(|_| channel.to_string())
    }
}

// ── Channel ledger ──────────────────────────────────────────────────────────

/// Accumulates runtime and constant channels while a header is being built
/// or parsed, rejecting any channel given two different meanings.
#[derive(Debug, Default)]
pub(crate) struct ChannelLedger {
    runtime: BTreeSet<Channel>,
    constants: BTreeMap<Channel, f64>,
}

impl ChannelLedger {
    pub(crate) fn mentions(&self, channel: &Channel) -> bool {
        self.runtime.contains(channel) || self.constants.contains_key(channel)
    }

    pub(crate) fn mark_runtime(&mut self, header: &Header, channel: Channel) -> Result<()> {
        if let Some(value) = self.constants.get(&channel) {
            return Err(HeaderError::ConflictingConstant {
                channel: header.describe(&channel),
                first: format!("{:?}", value),
                second: "runtime".to_string(),
            });
        }
        self.runtime.insert(channel);
        Ok(())
    }

    /// Record a constant at the precision it prints with.
    pub(crate) fn mark_constant(&mut self, header: &Header, channel: Channel, value: f64) -> Result<()> {
        let value = round_literal(value);
        if self.runtime.contains(&channel) {
            return Err(HeaderError::ConflictingConstant {
                channel: header.describe(&channel),
                first: "runtime".to_string(),
                second: format!("{:?}", value),
            });
        }
        match self.constants.get(&channel) {
            Some(existing) if *existing != value => Err(HeaderError::ConflictingConstant {
                channel: header.describe(&channel),
                first: format!("{:?}", existing),
                second: format!("{:?}", value),
            }),
            _ => {
                self.constants.insert(channel, value);
                Ok(())
            }
        }
    }

    pub(crate) fn into_constants(self) -> BTreeMap<Channel, f64> {
        self.constants
    }
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn radius_spec(derivatives: &str, variants: &[&str]) -> HeaderSpec {
        HeaderSpec {
            name: "Radius".to_string(),
            inputs: "double x, double y".to_string(),
            outputs: "double r".to_string(),
            derivatives: derivatives.to_string(),
            variants: variants.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn d(name: &str) -> CapabilityVariant {
        registry().lookup(name).unwrap()
    }

    #[test]
    fn from_spec_marks_runtime_constant_and_implicit_zero() {
        let h = Header::from_spec(&radius_spec("D_r_D_x, D_r_D_y = 2.0", &["d0", "d1", "d2"])).unwrap();
        let expected: BTreeMap<Channel, f64> = [
            (Channel::First(0, 1), 2.0),
            (Channel::Second(0, 0, 0), 0.0),
            (Channel::Second(0, 0, 1), 0.0),
            (Channel::Second(0, 1, 1), 0.0),
        ]
        .into_iter()
        .collect();
        assert_eq!(h.constant_channels(), &expected);
        assert_eq!(
            h.emitted_channels(&d("d2")),
            vec![Channel::Value(0), Channel::First(0, 0)]
        );
    }

    #[test]
    fn bare_channel_name_stays_runtime() {
        // `D_r_D_x, D_r_D_y=2.0` lists D_r_D_x by name, so it is computed at
        // runtime; only unmentioned channels become constant zero.
        let h = Header::from_spec(&radius_spec("D_r_D_x, D_r_D_y=2.0", &["d0", "d1"])).unwrap();
        let expected: BTreeMap<Channel, f64> = [(Channel::First(0, 1), 2.0)].into_iter().collect();
        assert_eq!(h.constant_channels(), &expected);
        assert_eq!(
            h.emitted_channels(&d("d1")),
            vec![Channel::Value(0), Channel::First(0, 0)]
        );
    }

    #[test]
    fn implicit_zero_limited_to_supported_variants() {
        // D_r_D_x is left out, so it is the implicit zero; compare
        // `bare_channel_name_stays_runtime`.
        let h = Header::from_spec(&radius_spec("D_r_D_y = 2.0", &["d0", "d1"])).unwrap();
        let expected: BTreeMap<Channel, f64> = [(Channel::First(0, 0), 0.0), (Channel::First(0, 1), 2.0)]
            .into_iter()
            .collect();
        assert_eq!(h.constant_channels(), &expected);
        assert_eq!(h.emitted_channels(&d("d1")), vec![Channel::Value(0)]);
    }

    #[test]
    fn variants_are_sorted_into_registry_order() {
        let h = Header::from_spec(&radius_spec("", &["d2", "d0"])).unwrap();
        assert_eq!(h.supported_variants(), &[d("d0"), d("d2")]);
        assert_eq!(h.widest_supported(), d("d2"));
    }

    #[test]
    fn default_variant_required() {
        assert!(matches!(
            Header::from_spec(&radius_spec("", &["d1"])),
            Err(HeaderError::MissingDefaultVariant)
        ));
    }

    #[test]
    fn duplicate_variants_rejected() {
        assert!(matches!(
            Header::from_spec(&radius_spec("", &["d0", "d1", "d1"])),
            Err(HeaderError::DuplicateVariant(n)) if n == "d1"
        ));
    }

    #[test]
    fn unknown_variant_name_rejected() {
        assert!(matches!(
            Header::from_spec(&radius_spec("", &["d0", "d7"])),
            Err(HeaderError::UnknownVariant(_))
        ));
    }

    #[test]
    fn duplicate_port_names_rejected() {
        let err = Header::new(
            "F",
            vec![Port::new("double", "x")],
            vec![Port::new("double", "x")],
            vec![DEFAULT_VARIANT],
            BTreeMap::new(),
        )
        .unwrap_err();
        assert!(matches!(err, HeaderError::DuplicatePort(n) if n == "x"));
    }

    #[test]
    fn invalid_names_rejected() {
        let bad_fn = Header::new("9F", vec![], vec![], vec![DEFAULT_VARIANT], BTreeMap::new());
        assert!(matches!(bad_fn, Err(HeaderError::InvalidIdentifier(_))));

        let bad_port = Header::new(
            "F",
            vec![Port::new("double", "X")],
            vec![],
            vec![DEFAULT_VARIANT],
            BTreeMap::new(),
        );
        assert!(matches!(bad_port, Err(HeaderError::InvalidFieldName(_))));

        let bad_type = Header::new(
            "F",
            vec![Port::new("std::vector", "x")],
            vec![],
            vec![DEFAULT_VARIANT],
            BTreeMap::new(),
        );
        assert!(matches!(bad_type, Err(HeaderError::InvalidIdentifier(_))));
    }

    #[test]
    fn constant_outside_supported_variants_rejected() {
        let constants = [(Channel::Second(0, 0, 0), 1.0)].into_iter().collect();
        let err = Header::new(
            "F",
            vec![Port::new("double", "x")],
            vec![Port::new("double", "r")],
            vec![d("d0"), d("d1")],
            constants,
        )
        .unwrap_err();
        assert!(matches!(err, HeaderError::ChannelOutsideVariants(n) if n == "D2_r_D_x_D_x"));
    }

    #[test]
    fn zero_order_and_non_finite_constants_rejected() {
        let ports = || (vec![Port::new("double", "x")], vec![Port::new("double", "r")]);
        let (i, o) = ports();
        let err = Header::new("F", i, o, vec![d("d0"), d("d1")], [(Channel::Value(0), 1.0)].into_iter().collect());
        assert!(matches!(err, Err(HeaderError::ConstantValueChannel(_))));

        let (i, o) = ports();
        let err = Header::new(
            "F",
            i,
            o,
            vec![d("d0"), d("d1")],
            [(Channel::First(0, 0), f64::NAN)].into_iter().collect(),
        );
        assert!(matches!(err, Err(HeaderError::NonFiniteLiteral { .. })));

        assert!(matches!(
            Header::from_spec(&radius_spec("r = 1.0", &["d0", "d1"])),
            Err(HeaderError::ConstantValueChannel(_))
        ));
    }

    #[test]
    fn derivative_spec_errors() {
        assert!(matches!(
            Header::from_spec(&radius_spec("D_r_D_x, D_r_D_x = 1.0", &["d0", "d1"])),
            Err(HeaderError::ConflictingConstant { .. })
        ));
        assert!(matches!(
            Header::from_spec(&radius_spec("D2_r_D_x_D_x", &["d0", "d1"])),
            Err(HeaderError::ChannelOutsideVariants(_))
        ));
        assert!(matches!(
            Header::from_spec(&radius_spec("D_r_D_q", &["d0", "d1"])),
            Err(HeaderError::UnknownPort { .. })
        ));
        assert!(matches!(
            Header::from_spec(&radius_spec("float D_r_D_x", &["d0", "d1"])),
            Err(HeaderError::ChannelTypeMismatch { .. })
        ));
        assert!(Header::from_spec(&radius_spec("double D_r_D_x", &["d0", "d1"])).is_ok());
    }

    #[test]
    fn port_list_errors() {
        let mut spec = radius_spec("", &["d0"]);
        spec.inputs = "x, double y".to_string();
        assert!(matches!(Header::from_spec(&spec), Err(HeaderError::Syntax { .. })));

        let mut spec = radius_spec("", &["d0"]);
        spec.outputs = "double r = 1.0".to_string();
        assert!(matches!(Header::from_spec(&spec), Err(HeaderError::Syntax { .. })));
    }

    #[test]
    fn port_list_errors_report_their_line() {
        let mut spec = radius_spec("", &["d0"]);
        spec.inputs = "double x,\n double y,\n z".to_string();
        assert!(matches!(
            Header::from_spec(&spec),
            Err(HeaderError::Syntax { line: 3, .. })
        ));

        let mut spec = radius_spec("", &["d0"]);
        spec.outputs = "\ndouble r = 1.0".to_string();
        assert!(matches!(
            Header::from_spec(&spec),
            Err(HeaderError::Syntax { line: 2, .. })
        ));
    }

    #[test]
    fn constants_keep_printed_precision() {
        assert_eq!(round_literal(2.0), 2.0);
        assert_eq!(round_literal(0.1234564), 0.123456);
        assert_eq!(round_literal(1e-7), 0.0);
        assert!(round_literal(-1e-7).is_sign_positive());

        let h = Header::from_spec(&radius_spec("D_r_D_x = 0.0000001, D_r_D_y = -1.0000004", &["d0", "d1"]))
            .unwrap();
        let expected: BTreeMap<Channel, f64> = [(Channel::First(0, 0), 0.0), (Channel::First(0, 1), -1.0)]
            .into_iter()
            .collect();
        assert_eq!(h.constant_channels(), &expected);

        let explicit = Header::new(
            "F",
            vec![Port::new("double", "x")],
            vec![Port::new("double", "r")],
            vec![d("d0"), d("d1")],
            [(Channel::First(0, 0), 2.5000001)].into_iter().collect(),
        )
        .unwrap();
        assert_eq!(explicit.constant_channels()[&Channel::First(0, 0)], 2.5);
    }

    #[test]
    fn literals_equal_after_rounding_do_not_conflict() {
        let h = Header::from_spec(&radius_spec("D_r_D_x = 1.0, D_r_D_x = 1.0000001", &["d0", "d1"]));
        assert!(h.is_ok());
    }

    #[test]
    fn compact_description_roundtrip() {
        let h = Header::from_spec(&radius_spec("D_r_D_x, D_r_D_y = 2.5, D2_r_D_y_D_x", &["d0", "d1", "d2"]))
            .unwrap();
        let spec = h.to_spec().unwrap();
        assert_eq!(spec.derivatives, "D_r_D_x, D_r_D_y = 2.5, D2_r_D_x_D_y");
        assert_eq!(spec.inputs, "double x, double y");
        assert_eq!(spec.variants, vec!["d0", "d1", "d2"]);
        assert_eq!(Header::from_spec(&spec).unwrap(), h);
    }

    #[test]
    fn missing_channels() {
        let h = Header::from_spec(&radius_spec("", &["d0", "d1"])).unwrap();
        let given: BTreeSet<Channel> = [Channel::Value(0), Channel::First(0, 1)].into_iter().collect();
        assert_eq!(h.missing_channels(&d("d1"), &given), vec![Channel::First(0, 0)]);
        assert_eq!(h.channel_type(&Channel::First(0, 1)).unwrap(), "double");
        assert!(h.channel_type(&Channel::Value(3)).is_err());
    }
}
