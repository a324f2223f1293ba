// ident.rs — Identifier predicates for generated C++ code
//
// Classifies strings as identifiers usable in the generated headers: function
// and type names, lowercase field names (ports), and `::`-qualified paths.
//
// Preconditions: none.
// Postconditions: every predicate is total; the empty string is never valid.
// Failure modes: none.
// Side effects: none.

/// `[A-Za-z_][A-Za-z0-9_]*`
pub fn is_valid_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// `[a-z_][a-z0-9_]*` — port names. Excluding uppercase keeps channel names
/// (`D_out_D_in`) separable from the port names they embed.
pub fn is_valid_field_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// `ident(::ident)*`, each segment an identifier.
pub fn is_valid_qualified_path(s: &str) -> bool {
    s.split("::").all(is_valid_identifier)
}
