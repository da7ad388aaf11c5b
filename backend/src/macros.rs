//! Crate-internal macros.

/// Implement `fmt::Debug` for a struct while hiding secret fields.
///
/// Each field is prefixed with how it should be printed:
///
/// - `show field` prints the value
/// - `redact field` prints `"[REDACTED]"`
/// - `redact_option field` prints `Some("[REDACTED]")` or `None`
///
/// ```ignore
/// redacted_debug!(Config {
///     show bind_address,
///     redact encryption_key,
/// });
/// ```
macro_rules! redacted_debug {
    ($name:ident { $( $kind:ident $field:ident ),* $(,)? }) => {
        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                let mut s = f.debug_struct(stringify!($name));
                $( redacted_debug!(@field s, self, $kind, $field); )*
                s.finish_non_exhaustive()
            }
        }
    };
    (@field $s:ident, $self:ident, show, $field:ident) => {
        $s.field(stringify!($field), &$self.$field);
    };
    (@field $s:ident, $self:ident, redact, $field:ident) => {
        $s.field(stringify!($field), &"[REDACTED]");
    };
    (@field $s:ident, $self:ident, redact_option, $field:ident) => {
        $s.field(stringify!($field), &$self.$field.as_ref().map(|_| "[REDACTED]"));
    };
}
