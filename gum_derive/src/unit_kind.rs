use proc_macro2::TokenStream;
use quote::quote;
use syn::DeriveInput;
use syn::LitStr;

pub(crate) fn unit_kind(item: TokenStream) -> Result<TokenStream, syn::Error> {
    let body: DeriveInput = syn::parse2(item)?;
    let name = &body.ident;
    let kind = match find_kind(&body)? {
        Some(kind) => kind,
        None => LitStr::new(&name.to_string(), name.span()),
    };

    let (impl_generics, ty_generics, where_clause) = body.generics.split_for_impl();
    Ok(quote! {
        impl #impl_generics ::gum::UnitKind for #name #ty_generics #where_clause {
            const KIND: &'static str = #kind;
        }
    })
}

fn find_kind(body: &DeriveInput) -> Result<Option<LitStr>, syn::Error> {
    let mut kind: Option<LitStr> = None;
    for attr in body.attrs.iter().filter(|x| x.path().is_ident("unit")) {
        attr.parse_nested_meta(|meta| {
            if !meta.path.is_ident("kind") {
                return Err(meta.error("unsupported #[unit] key, expected `kind`"));
            }

            let lit: LitStr = meta.value()?.parse()?;
            if lit.value().is_empty() {
                return Err(syn::Error::new(lit.span(), "unit kind must not be empty"));
            }

            if kind.replace(lit).is_some() {
                return Err(meta.error("`kind` is specified more than once"));
            }

            Ok(())
        })?;
    }

    Ok(kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_defaults_to_type_name() {
        let out = unit_kind(quote! {
            struct Ticker {
                every: u64,
            }
        })
        .unwrap();

        let expected = quote! {
            impl ::gum::UnitKind for Ticker {
                const KIND: &'static str = "Ticker";
            }
        };
        assert_eq!(out.to_string(), expected.to_string());
    }

    #[test]
    fn kind_attribute_overrides_name() {
        let out = unit_kind(quote! {
            #[unit(kind = "http-listener")]
            enum Listener {
                Tcp,
                Unix,
            }
        })
        .unwrap();

        let expected = quote! {
            impl ::gum::UnitKind for Listener {
                const KIND: &'static str = "http-listener";
            }
        };
        assert_eq!(out.to_string(), expected.to_string());
    }

    #[test]
    fn generics_are_forwarded() {
        let out = unit_kind(quote! {
            struct Pool<T: Send> where T: Clone {
                items: Vec<T>,
            }
        })
        .unwrap();

        let expected = quote! {
            impl<T: Send> ::gum::UnitKind for Pool<T> where T: Clone {
                const KIND: &'static str = "Pool";
            }
        };
        assert_eq!(out.to_string(), expected.to_string());
    }

    #[test]
    fn rejects_bad_attributes() {
        let unknown = unit_kind(quote! {
            #[unit(name = "x")]
            struct A;
        });
        assert!(unknown.is_err());

        let empty = unit_kind(quote! {
            #[unit(kind = "")]
            struct B;
        });
        assert!(empty.is_err());

        let twice = unit_kind(quote! {
            #[unit(kind = "a", kind = "b")]
            struct C;
        });
        assert!(twice.is_err());
    }
}
