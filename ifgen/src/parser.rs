// Parser for compact declaration lists.
//
// Parses the comma-separated lists a header is built from:
//
//   inputs       "double x, double y, UserType c"
//   outputs      "double r"
//   derivatives  "D_r_D_x, double D_r_D_y = 2.0"
//
// Grammar:  list := decl (',' decl)* ','?      decl := IDENT IDENT? ('=' NUMBER)?
//
// In a two-identifier decl the first is the type. Which parts are required
// depends on the list and is checked by the header builder. Uses chumsky
// combinators over the `lexer::Token` stream.
//
// Preconditions: none.
// Postconditions: returns declarations plus any lex/parse errors.
// Failure modes: syntax errors produce `Rich` diagnostics.
// Side effects: none.

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;
use chumsky::span::SimpleSpan;

use crate::error::{HeaderError, Result};
use crate::lexer::Token;

/// An identifier with its source span.
#[derive(Debug, Clone, PartialEq)]
pub struct Ident {
    pub name: String,
    pub span: SimpleSpan,
}

/// One `type name = literal` entry; type and literal are optional.
#[derive(Debug, Clone, PartialEq)]
pub struct Decl {
    pub ty: Option<Ident>,
    pub name: Ident,
    pub value: Option<f64>,
    pub span: SimpleSpan,
}

/// Result of parsing: declarations plus any errors.
#[derive(Debug)]
pub struct ParseResult {
    pub decls: Option<Vec<Decl>>,
    pub errors: Vec<Rich<'static, Token, SimpleSpan>>,
}

/// Parse a declaration list. Lexes then parses.
pub fn parse(source: &str) -> ParseResult {
    let lex_result = crate::lexer::lex(source);
    let len = source.len();

    // Convert lexer output to chumsky stream.
    let token_iter = lex_result.tokens.into_iter().map(|(tok, span)| {
        let cspan: SimpleSpan = (span.start..span.end).into();
        (tok, cspan)
    });
    let eoi: SimpleSpan = (len..len).into();
    let stream = Stream::from_iter(token_iter).map(eoi, |(t, s): (_, _)| (t, s));

    let (decls, parse_errors) = decl_list_parser().parse(stream).into_output_errors();

    // Merge lex errors + parse errors.
    let mut all_errors: Vec<Rich<'static, Token, SimpleSpan>> = lex_result
        .errors
        .into_iter()
        .map(|e| {
            let span: SimpleSpan = (e.span.start..e.span.end).into();
            Rich::custom(span, e.message)
        })
        .collect();
    all_errors.extend(parse_errors.into_iter().map(|e| e.into_owned()));

    ParseResult {
        decls,
        errors: all_errors,
    }
}

/// Parse a declaration list, failing on the first error. `what` names the
/// list in the error message.
pub fn parse_decls(source: &str, what: &str) -> Result<Vec<Decl>> {
    let result = parse(source);
    if let Some(err) = result.errors.first() {
        return Err(HeaderError::Syntax {
            line: line_of(source, err.span().start()),
            message: format!("{}: {}", what, err),
        });
    }
    result.decls.ok_or_else(|| HeaderError::Syntax {
        line: 1,
        message: format!("{}: parse failed with no output", what),
    })
}

/// 1-based line of a byte offset into `source`.
pub fn line_of(source: &str, offset: usize) -> usize {
    source[..offset.min(source.len())].matches('\n').count() + 1
}

fn decl_list_parser<'tokens, I>(
) -> impl Parser<'tokens, I, Vec<Decl>, extra::Err<Rich<'tokens, Token, SimpleSpan>>>
where
    I: ValueInput<'tokens, Token = Token, Span = SimpleSpan>,
{
    let ident = select! {
        Token::Ident(name) = e => Ident { name, span: e.span() },
    };

    let literal = select! {
        Token::Number(n) => n,
    };

    let decl = ident
        .clone()
        .then(ident.or_not())
        .then(just(Token::Equals).ignore_then(literal).or_not())
        .map_with(|((first, second), value), e| match second {
            Some(name) => Decl {
                ty: Some(first),
                name,
                value,
                span: e.span(),
            },
            None => Decl {
                ty: None,
                name: first,
                value,
                span: e.span(),
            },
        });

    decl.separated_by(just(Token::Comma))
        .allow_trailing()
        .collect::<Vec<_>>()
}

// ── Tests ──
