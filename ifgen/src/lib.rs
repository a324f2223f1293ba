// ifgen — interface generator for differentiable C++ functions
//
// Library root. A `header::Header` models one function across its capability
// variants; the codec prints and parses generated headers, and call sites are
// generated from a header plus a usage context.

pub mod channel;
pub mod error;
pub mod header;
pub mod ident;
pub mod lexer;
pub mod library;
pub mod parser;
pub mod types;
pub mod variant;
