mod unit_kind;

/// Implements `gum::UnitKind` for a struct or enum.
///
/// The kind defaults to the type's own identifier and can be overridden with
/// `#[unit(kind = "...")]`.
#[proc_macro_derive(UnitKind, attributes(unit))]
pub fn unit_kind(item: proc_macro::TokenStream) -> proc_macro::TokenStream {
    match unit_kind::unit_kind(item.into()) {
        Ok(x) => x,
        Err(x) => x.to_compile_error(),
    }
    .into()
}
