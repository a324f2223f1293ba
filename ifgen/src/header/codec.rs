// header/codec.rs — Textual round-trip between `Header` and generated C++
//
// Format version 1. Each supported variant is one block:
//
//   //=====[Option]=====
//   //{
//   //  "enable_1st_order_derivative": true,
//   //  "enable_2nd_order_derivative": false
//   //}
//   //=====[Option]=====
//   void RadiusWithFirstOrderDerivatives(double x,
//                                        double y,
//                                        double* r,
//                                        double* D_r_D_x
//                                        /* D_r_D_y = 2.000000 */);
//   <blank line>
//
// The marker line is printed before and after the toggle comments. A block
// opened by a marker and never closed is rejected.
//
// Preconditions: `print` takes a validated header; `parse` takes any text.
// Postconditions: `parse(print(h)) == h` with literals at six decimal digits,
//                 and `print(parse(t)) == t` for text produced by `print`.
// Failure modes: missing or misplaced default block, unterminated markers,
//                unrecognized fields, unknown ports, conflicting constants.
// Side effects: debug logging only.

use std::collections::BTreeSet;

use super::{ChannelLedger, Header, Port, CONSTANT_PRECISION};
use crate::channel::Channel;
use crate::error::{HeaderError, Result};
use crate::lexer::{lex, Token};
use crate::types::{passing_convention, render_param, PassingConvention};
use crate::variant::{CapabilityVariant, DEFAULT_VARIANT};

pub const FORMAT_VERSION: u32 = 1;

/// Delimits the toggle comments of a variant block.
pub const VARIANT_MARKER: &str = "//=====[Option]=====";

const COMMENT_PREFIX: &str = "//";

/// One parameter slot of a prototype.
#[derive(Debug, Clone, PartialEq)]
enum Field {
    /// A real parameter, separated by commas.
    Param(String),
    /// A comment-only constant annotation; never takes a comma.
    Comment(String),
}

impl Field {
    fn text(&self) -> &str {
        match self {
            Field::Param(s) | Field::Comment(s) => s,
        }
    }
}

// ── Printing ────────────────────────────────────────────────────────────────

impl Header {
    /// Header text, one block per supported variant.
    pub fn print(&self) -> Result<String> {
        Ok(self.print_lines()?.join("\n"))
    }

    pub fn print_lines(&self) -> Result<Vec<String>> {
        let mut lines = Vec::new();
        for variant in &self.variants {
            lines.push(VARIANT_MARKER.to_string());
            for line in variant.to_text().lines() {
                lines.push(format!("{}{}", COMMENT_PREFIX, line));
            }
            lines.push(VARIANT_MARKER.to_string());

            let fields = self.prototype_fields(variant, true)?;
            lines.extend(prototype_lines(&variant.decorate(&self.name)?, &fields));
            lines.push(String::new());
        }
        Ok(lines)
    }

    /// Opening of a definition for `variant`: the prototype without constant
    /// annotations, ending in `) {`.
    pub fn implementation_head(&self, variant: &CapabilityVariant) -> Result<Vec<String>> {
        if !self.supports(variant) {
            return Err(HeaderError::UnsupportedVariant(variant.to_string()));
        }
        let fields = self.prototype_fields(variant, false)?;
        let mut lines = prototype_lines(&variant.decorate(&self.name)?, &fields);
        if let Some(last) = lines.last_mut() {
            if let Some(stripped) = last.strip_suffix(';') {
                *last = format!("{} {{", stripped);
            }
        }
        Ok(lines)
    }

    fn prototype_fields(&self, variant: &CapabilityVariant, with_constants: bool) -> Result<Vec<Field>> {
        let mut fields = Vec::new();
        for port in &self.inputs {
            fields.push(Field::Param(render_param(&port.ty, &port.name)?));
        }
        for channel in self.emitted_channels(variant) {
            fields.push(Field::Param(format!(
                "{}* {}",
                self.channel_type(&channel)?,
                self.channel_name(&channel)?
            )));
        }
        if with_constants {
            for channel in self.full_channels(variant) {
                match self.constants.get(&channel) {
                    Some(value) if *value != 0.0 => fields.push(Field::Comment(format!(
                        "/* {} = {:.*} */",
                        self.channel_name(&channel)?,
                        CONSTANT_PRECISION,
                        value
                    ))),
                    _ => {}
                }
            }
        }
        Ok(fields)
    }
}

/// Lay out `void name(fields);`. Two or more fields wrap one per line,
/// aligned under the first.
fn prototype_lines(function_name: &str, fields: &[Field]) -> Vec<String> {
    let head = format!("void {}(", function_name);
    match fields {
        [] => vec![format!("{});", head)],
        [only] => vec![format!("{}{});", head, only.text())],
        _ => {
            let last_param = fields.iter().rposition(|f| matches!(f, Field::Param(_)));
            let indent = " ".repeat(head.len());
            let last = fields.len() - 1;
            fields
                .iter()
                .enumerate()
                .map(|(i, field)| {
                    let lead = if i == 0 { head.as_str() } else { indent.as_str() };
                    let comma = matches!(field, Field::Param(_)) && Some(i) != last_param;
                    let tail = if i == last { ");" } else { "" };
                    format!(
                        "{}{}{}{}",
                        lead,
                        field.text(),
                        if comma { "," } else { "" },
                        tail
                    )
                })
                .collect()
        }
    }
}

// ── Parsing ─────────────────────────────────────────────────────────────────

/// A variant block located in the text; `body` holds (line number, text).
struct Block<'a> {
    variant: CapabilityVariant,
    marker_line: usize,
    body: Vec<(usize, &'a str)>,
}

/// A prototype field after classification.
#[derive(Debug, Clone, PartialEq)]
enum ParsedField {
    Input { ty: String, name: String },
    Output { ty: String, name: String },
    Constant { name: String, value: f64 },
}

/// A prototype recovered from block text.
struct Prototype {
    name: String,
    fields: Vec<(usize, ParsedField)>,
}

fn syntax(line: usize, message: impl Into<String>) -> HeaderError {
    HeaderError::Syntax {
        line,
        message: message.into(),
    }
}

impl Header {
    /// Rebuild a header from text produced by `print`. Lines before the first
    /// marker are ignored.
    pub fn parse(text: &str) -> Result<Header> {
        let blocks = split_blocks(text)?;
        log::debug!("found {} variant blocks", blocks.len());

        let first = blocks.first().ok_or(HeaderError::MissingDefaultVariant)?;
        if first.variant != DEFAULT_VARIANT {
            return Err(HeaderError::MissingDefaultVariant);
        }

        // The default block alone defines the function name and the ports.
        let default_proto = parse_prototype(first)?;
        let mut inputs = Vec::new();
        let mut outputs = Vec::new();
        for (line, field) in &default_proto.fields {
            match field {
                ParsedField::Input { ty, name } => inputs.push(Port::new(ty.clone(), name.clone())),
                ParsedField::Output { ty, name } => outputs.push(Port::new(ty.clone(), name.clone())),
                ParsedField::Constant { name, .. } => {
                    return Err(syntax(
                        *line,
                        format!("default block cannot hold constant '{}'", name),
                    ))
                }
            }
        }

        let variants = blocks.iter().map(|b| b.variant).collect();
        let base = Header::new(
            default_proto.name.clone(),
            inputs,
            outputs,
            variants,
            Default::default(),
        )?;

        let mut ledger = ChannelLedger::default();
        for block in &blocks {
            let proto = if block.marker_line == first.marker_line {
                Prototype {
                    name: default_proto.name.clone(),
                    fields: default_proto.fields.clone(),
                }
            } else {
                parse_prototype(block)?
            };
            base.collect_block(block, &proto, &mut ledger)?;
        }

        let header = Header {
            constants: ledger.into_constants(),
            ..base
        };
        header.validate_constants()?;
        log::debug!(
            "parsed header {}: {} constant channels",
            header.name,
            header.constants.len()
        );
        Ok(header)
    }

    /// Check one block against the ports and record what it says about each
    /// channel: present, constant with a literal, or absent (constant zero).
    fn collect_block(
        &self,
        block: &Block<'_>,
        proto: &Prototype,
        ledger: &mut ChannelLedger,
    ) -> Result<()> {
        let expected_name = block.variant.decorate(&self.name)?;
        if proto.name != expected_name {
            return Err(syntax(
                block.marker_line,
                format!(
                    "block for variant {} declares '{}', expected '{}'",
                    block.variant, proto.name, expected_name
                ),
            ));
        }

        let full: BTreeSet<Channel> = self.full_channels(&block.variant).into_iter().collect();
        let mut seen_inputs = Vec::new();
        let mut seen = BTreeSet::new();

        for (line, field) in &proto.fields {
            let line = *line;
            match field {
                ParsedField::Input { ty, name } => seen_inputs.push(Port::new(ty.clone(), name.clone())),
                ParsedField::Output { ty, name } => {
                    let channel = self.block_channel(name, &full, line)?;
                    let expected = self.channel_type(&channel)?;
                    if expected != ty {
                        return Err(HeaderError::ChannelTypeMismatch {
                            channel: name.clone(),
                            expected: expected.to_string(),
                            found: ty.clone(),
                        });
                    }
                    if !seen.insert(channel) {
                        return Err(syntax(line, format!("channel '{}' listed twice", name)));
                    }
                    ledger.mark_runtime(self, channel)?;
                }
                ParsedField::Constant { name, value } => {
                    let channel = self.block_channel(name, &full, line)?;
                    if !seen.insert(channel) {
                        return Err(syntax(line, format!("channel '{}' listed twice", name)));
                    }
                    ledger.mark_constant(self, channel, *value)?;
                }
            }
        }

        if seen_inputs != self.inputs {
            return Err(syntax(
                block.marker_line,
                format!("inputs of variant {} differ from the default block", block.variant),
            ));
        }

        let missing = self.missing_channels(&block.variant, &seen);
        log::trace!(
            "variant {}: {} channels present, {} implicitly zero",
            block.variant,
            seen.len(),
            missing.len()
        );
        for channel in missing {
            ledger.mark_constant(self, channel, 0.0)?;
        }
        Ok(())
    }

    fn block_channel(&self, name: &str, full: &BTreeSet<Channel>, line: usize) -> Result<Channel> {
        let channel = self.channel_from_name(name)?;
        if !full.contains(&channel) {
            return Err(syntax(
                line,
                format!("channel '{}' does not belong to this variant", name),
            ));
        }
        Ok(channel)
    }
}

/// Locate the variant blocks. Each block's body runs from its closing marker
/// to the next opening marker or the end of the text.
fn split_blocks(text: &str) -> Result<Vec<Block<'_>>> {
    let mut blocks: Vec<Block<'_>> = Vec::new();
    let mut open: Option<(usize, Vec<&str>)> = None;

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        let is_marker = line == VARIANT_MARKER;

        match open.take() {
            Some((marker_line, mut comments)) => {
                if is_marker {
                    let variant = CapabilityVariant::from_text(&comments.join("\n"), true)
                        .map_err(|e| syntax(marker_line, e.to_string()))?;
                    blocks.push(Block {
                        variant,
                        marker_line,
                        body: Vec::new(),
                    });
                } else if let Some(comment) = line.strip_prefix(COMMENT_PREFIX) {
                    comments.push(comment);
                    open = Some((marker_line, comments));
                } else {
                    return Err(syntax(
                        line_no,
                        format!("variant marker opened on line {} is never closed", marker_line),
                    ));
                }
            }
            None => {
                if is_marker {
                    open = Some((line_no, Vec::new()));
                } else if let Some(block) = blocks.last_mut() {
                    block.body.push((line_no, raw));
                }
            }
        }
    }

    if let Some((marker_line, _)) = open {
        return Err(syntax(marker_line, "variant marker is never closed"));
    }
    Ok(blocks)
}

/// Read `void name(...);` from a block body, one field per line.
fn parse_prototype(block: &Block<'_>) -> Result<Prototype> {
    let mut lines = block
        .body
        .iter()
        .map(|(n, l)| (*n, l.trim()))
        .skip_while(|(_, l)| !matches!(lex(l).tokens.first(), Some((Token::Void, _))));

    let (head_line, head) = lines.next().ok_or_else(|| {
        syntax(
            block.marker_line,
            format!("no prototype for variant {}", block.variant),
        )
    })?;
    let (name, open) = match lex(head).tokens.as_slice() {
        [(Token::Void, _), (Token::Ident(name), _), (Token::LParen, paren), ..] => (name.clone(), paren.end),
        _ => return Err(syntax(head_line, "expected 'void name(' to open the prototype")),
    };

    let mut raw_fields: Vec<(usize, &str)> = Vec::new();
    let mut closed = push_field(head_line, head[open..].trim(), &mut raw_fields);
    if !closed {
        for (line, text) in lines.by_ref() {
            if text.is_empty() {
                continue;
            }
            if push_field(line, text, &mut raw_fields) {
                closed = true;
                break;
            }
        }
    }
    if !closed {
        return Err(syntax(head_line, format!("prototype of '{}' is never closed", name)));
    }

    let fields = raw_fields
        .into_iter()
        .map(|(line, text)| Ok((line, classify_field(text, line)?)))
        .collect::<Result<Vec<_>>>()?;
    Ok(Prototype { name, fields })
}

/// Record the field on one prototype line; true when the line ends in `);`.
fn push_field<'a>(line: usize, text: &'a str, fields: &mut Vec<(usize, &'a str)>) -> bool {
    let (body, closes) = match lex(text).tokens.as_slice() {
        [.., (Token::RParen, paren), (Token::Semi, _)] => (text[..paren.start].trim_end(), true),
        _ => (text, false),
    };
    let body = body.strip_suffix(',').unwrap_or(body).trim_end();
    if !body.is_empty() {
        fields.push((line, body));
    }
    closes
}

/// Classify one field by its token shape.
fn classify_field(text: &str, line: usize) -> Result<ParsedField> {
    let lexed = lex(text);
    if let Some(err) = lexed.errors.first() {
        return Err(syntax(line, err.message.clone()));
    }
    let tokens: Vec<Token> = lexed.tokens.into_iter().map(|(t, _)| t).collect();

    let input = |ty: &str, name: &str, by_value: bool| -> Result<ParsedField> {
        let expected = if by_value {
            PassingConvention::ByValue
        } else {
            PassingConvention::ByConstReference
        };
        if passing_convention(ty)? != expected {
            return Err(syntax(
                line,
                format!("input '{}' of type {} uses the wrong passing convention", name, ty),
            ));
        }
        Ok(ParsedField::Input {
            ty: ty.to_string(),
            name: name.to_string(),
        })
    };

    match tokens.as_slice() {
        [Token::Ident(ty), Token::Ident(name)] => input(ty, name, true),
        [Token::Const, Token::Ident(ty), Token::Amp, Token::Ident(name)] => input(ty, name, false),
        [Token::Ident(ty), Token::Star, Token::Ident(name)] => Ok(ParsedField::Output {
            ty: ty.clone(),
            name: name.clone(),
        }),
        [Token::CommentOpen, Token::Ident(name), Token::Equals, Token::Number(value), Token::CommentClose] => {
            Ok(ParsedField::Constant {
                name: name.clone(),
                value: *value,
            })
        }
        _ => Err(syntax(line, format!("unrecognized field '{}'", text))),
    }
}

/// The part of `text` starting at the first variant marker, which is what
/// `print` produces for a header embedded in a larger file.
pub fn variant_region(text: &str) -> Option<&str> {
    let mut offset = 0;
    for line in text.split_inclusive('\n') {
        if line.trim() == VARIANT_MARKER {
            return Some(&text[offset..]);
        }
        offset += line.len();
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::HeaderSpec;
    use crate::variant::registry;

    fn radius(derivatives: &str, variants: &[&str]) -> Header {
        Header::from_spec(&HeaderSpec {
            name: "Radius".to_string(),
            inputs: "double x, double y".to_string(),
            outputs: "double r".to_string(),
            derivatives: derivatives.to_string(),
            variants: variants.iter().map(|s| s.to_string()).collect(),
        })
        .unwrap()
    }

    const RADIUS_D0_D1: &str = "//=====[Option]=====
//{
//  \"enable_1st_order_derivative\": false,
//  \"enable_2nd_order_derivative\": false
//}
//=====[Option]=====
void Radius(double x,
            double y,
            double* r);

//=====[Option]=====
//{
//  \"enable_1st_order_derivative\": true,
//  \"enable_2nd_order_derivative\": false
//}
//=====[Option]=====
void RadiusWithFirstOrderDerivatives(double x,
                                     double y,
                                     double* r,
                                     double* D_r_D_x
                                     /* D_r_D_y = 2.000000 */);
";

    #[test]
    fn print_matches_format() {
        let h = radius("D_r_D_x, D_r_D_y = 2.0", &["d0", "d1"]);
        assert_eq!(h.print().unwrap(), RADIUS_D0_D1);
    }

    #[test]
    fn parse_recovers_header() {
        let parsed = Header::parse(RADIUS_D0_D1).unwrap();
        assert_eq!(parsed, radius("D_r_D_x, D_r_D_y = 2.0", &["d0", "d1"]));
        assert_eq!(parsed.print().unwrap(), RADIUS_D0_D1);
    }

    #[test]
    fn prototype_layout() {
        assert_eq!(prototype_lines("F", &[]), vec!["void F();"]);
        assert_eq!(
            prototype_lines("F", &[Field::Param("double x".into())]),
            vec!["void F(double x);"]
        );
        assert_eq!(
            prototype_lines(
                "F",
                &[
                    Field::Param("double x".into()),
                    Field::Param("double* r".into()),
                ]
            ),
            vec!["void F(double x,", "       double* r);"]
        );
    }

    #[test]
    fn comment_fields_never_take_commas() {
        let lines = prototype_lines(
            "G",
            &[
                Field::Param("int n".into()),
                Field::Comment("/* D_r_D_n = 1.000000 */".into()),
                Field::Comment("/* D_e_D_n = 3.000000 */".into()),
            ],
        );
        assert_eq!(
            lines,
            vec![
                "void G(int n",
                "       /* D_r_D_n = 1.000000 */",
                "       /* D_e_D_n = 3.000000 */);",
            ]
        );
    }

    #[test]
    fn const_reference_inputs_roundtrip() {
        let h = Header::from_spec(&HeaderSpec {
            name: "Scale".to_string(),
            inputs: "UserType c, double x".to_string(),
            outputs: "double s".to_string(),
            derivatives: "D_s_D_x, D_s_D_c = 0.5".to_string(),
            variants: vec!["d0".to_string(), "d1".to_string(), "d2".to_string()],
        })
        .unwrap();
        let text = h.print().unwrap();
        assert!(text.contains("void Scale(const UserType& c,"));
        let parsed = Header::parse(&text).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.print().unwrap(), text);
    }

    #[test]
    fn implementation_head_drops_constants() {
        let h = radius("D_r_D_x, D_r_D_y = 2.0", &["d0", "d1"]);
        let d1 = registry().lookup("d1").unwrap();
        assert_eq!(
            h.implementation_head(&d1).unwrap(),
            vec![
                "void RadiusWithFirstOrderDerivatives(double x,",
                "                                     double y,",
                "                                     double* r,",
                "                                     double* D_r_D_x) {",
            ]
        );
        let d2 = registry().lookup("d2").unwrap();
        assert!(matches!(
            h.implementation_head(&d2),
            Err(HeaderError::UnsupportedVariant(_))
        ));
    }

    #[test]
    fn parse_requires_default_block_first() {
        let d1_only: String = RADIUS_D0_D1
            .split("\n\n")
            .nth(1)
            .unwrap()
            .to_string();
        assert!(matches!(
            Header::parse(&d1_only),
            Err(HeaderError::MissingDefaultVariant)
        ));
        assert!(matches!(
            Header::parse("void Radius(double x);\n"),
            Err(HeaderError::MissingDefaultVariant)
        ));
    }

    #[test]
    fn parse_rejects_bare_marker_convention() {
        let bare = "//=====[Option]=====
//{
//  \"enable_1st_order_derivative\": false,
//  \"enable_2nd_order_derivative\": false
//}
void Radius(double x);
";
        assert!(matches!(
            Header::parse(bare),
            Err(HeaderError::Syntax { line: 6, .. })
        ));
    }

    #[test]
    fn parse_rejects_conflicting_constants() {
        let h = radius("D_r_D_x = 1.0", &["d0", "d1", "d2"]);
        let text = h.print().unwrap();
        let tampered = text.replacen("/* D_r_D_x = 1.000000 */", "/* D_r_D_x = 3.000000 */", 1);
        assert_ne!(tampered, text);
        assert!(matches!(
            Header::parse(&tampered),
            Err(HeaderError::ConflictingConstant { .. })
        ));
    }

    #[test]
    fn parse_rejects_runtime_constant_conflict() {
        // d1 omits D_r_D_y (implicit zero) while d2 still emits it.
        let h = radius("D_r_D_x, D_r_D_y", &["d0", "d1", "d2"]);
        let text = h.print().unwrap();
        let tampered = text.replacen(
            "                                     double* D_r_D_x,\n                                     double* D_r_D_y);",
            "                                     double* D_r_D_x);",
            1,
        );
        assert_ne!(tampered, text);
        assert!(matches!(
            Header::parse(&tampered),
            Err(HeaderError::ConflictingConstant { .. })
        ));
    }

    #[test]
    fn parse_rejects_unknown_port() {
        let text = RADIUS_D0_D1.replace("double* D_r_D_x", "double* D_r_D_q");
        assert!(matches!(
            Header::parse(&text),
            Err(HeaderError::UnknownPort { .. })
        ));
    }

    #[test]
    fn parse_rejects_wrong_decoration() {
        let text = RADIUS_D0_D1.replace("RadiusWithFirstOrderDerivatives", "RadiusD1");
        assert!(matches!(Header::parse(&text), Err(HeaderError::Syntax { .. })));
    }

    #[test]
    fn parse_rejects_garbage_field() {
        let text = RADIUS_D0_D1.replacen("double y,", "double y z,", 1);
        assert!(matches!(Header::parse(&text), Err(HeaderError::Syntax { .. })));
    }

    #[test]
    fn parse_rejects_malformed_prototype_head() {
        let text = RADIUS_D0_D1.replacen("void Radius(double x,", "void Radius double x,", 1);
        assert!(matches!(
            Header::parse(&text),
            Err(HeaderError::Syntax { line: 7, .. })
        ));
        let unclosed = RADIUS_D0_D1.replacen("double* r);", "double* r)", 1);
        assert!(matches!(Header::parse(&unclosed), Err(HeaderError::Syntax { .. })));
    }

    #[test]
    fn sub_precision_literals_roundtrip() {
        for literal in ["0.0000001", "-0.0000001"] {
            let h = radius(&format!("D_r_D_x = {}", literal), &["d0", "d1"]);
            let text = h.print().unwrap();
            assert!(!text.contains("0.000000 */"), "{text}");
            let parsed = Header::parse(&text).unwrap();
            assert_eq!(parsed, h);
            assert_eq!(parsed.print().unwrap(), text);
        }

        let h = radius("D_r_D_x, D_r_D_y = 1.2345678", &["d0", "d1"]);
        let text = h.print().unwrap();
        assert!(text.contains("/* D_r_D_y = 1.234568 */"));
        let parsed = Header::parse(&text).unwrap();
        assert_eq!(parsed, h);
        assert_eq!(parsed.print().unwrap(), text);
    }

    #[test]
    fn variant_region_skips_preamble() {
        let file = format!("#pragma once\n\n{}", RADIUS_D0_D1);
        assert_eq!(variant_region(&file), Some(RADIUS_D0_D1));
        assert_eq!(variant_region("#pragma once\n"), None);
        assert_eq!(Header::parse(&file).unwrap(), Header::parse(RADIUS_D0_D1).unwrap());
    }
}
