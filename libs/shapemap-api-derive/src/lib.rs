use proc_macro::TokenStream;
use quote::{format_ident, quote};
use syn::ext::IdentExt;
use syn::{Data, DeriveInput, Fields, parse_macro_input};

/// Derive macro for mapper type metadata.
///
/// Generates `impl shapemap_api::Mappable` returning an object descriptor:
/// one `FieldDescriptor` per named field, with plain `fn` accessors over
/// `dyn Any` and a `Default`-based constructor.
///
/// The struct must implement `Clone` (and `Default`, unless marked
/// `#[mapper(no_default)]`, in which case it can only be mapped *from*).
///
/// # Example
///
/// ```ignore
/// #[derive(Mappable, Clone, Default)]
/// pub struct OrderDto {
///     pub id: u64,
///
///     #[mapper(read_only)]
///     pub total: f64,
///
///     #[mapper(skip)]
///     pub scratch: Vec<u8>,
/// }
/// ```
///
/// Field attributes: `skip`, `read_only` (never written as a destination),
/// `write_only` (never read as a source).
#[proc_macro_derive(Mappable, attributes(mapper))]
pub fn derive_mappable(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match derive_impl(&input) {
        Ok(tokens) => tokens,
        Err(e) => e.to_compile_error().into(),
    }
}

#[derive(Default)]
struct FieldOptions {
    skip: bool,
    read_only: bool,
    write_only: bool,
}

fn derive_impl(input: &DeriveInput) -> Result<TokenStream, syn::Error> {
    let name = &input.ident;

    if !input.generics.params.is_empty() {
        return Err(syn::Error::new_spanned(
            &input.generics,
            "Mappable cannot be derived for generic structs",
        ));
    }

    let fields = match &input.data {
        Data::Struct(data) => match &data.fields {
            Fields::Named(fields) => &fields.named,
            _ => {
                return Err(syn::Error::new_spanned(
                    name,
                    "Mappable only supports structs with named fields",
                ))
            }
        },
        _ => {
            return Err(syn::Error::new_spanned(
                name,
                "Mappable only supports structs",
            ))
        }
    };

    // Parse #[mapper(...)] on the struct.
    let mut no_default = false;
    for attr in &input.attrs {
        if !attr.path().is_ident("mapper") {
            continue;
        }
        attr.parse_nested_meta(|meta| {
            if meta.path.is_ident("no_default") {
                no_default = true;
                Ok(())
            } else {
                Err(meta.error("unknown mapper option (expected 'no_default')"))
            }
        })?;
    }

    let mut accessor_tokens = Vec::new();
    let mut field_tokens = Vec::new();

    for field in fields {
        let field_name = field.ident.as_ref().ok_or_else(|| {
            syn::Error::new_spanned(field, "expected named field")
        })?;
        let field_name_str = field_name.unraw().to_string();
        let field_ty = &field.ty;

        let mut options = FieldOptions::default();
        for attr in &field.attrs {
            if !attr.path().is_ident("mapper") {
                continue;
            }
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("skip") {
                    options.skip = true;
                } else if meta.path.is_ident("read_only") {
                    options.read_only = true;
                } else if meta.path.is_ident("write_only") {
                    options.write_only = true;
                } else {
                    return Err(meta.error(
                        "unknown mapper option (expected 'skip', 'read_only' or 'write_only')",
                    ));
                }
                Ok(())
            })?;
        }

        if options.read_only && options.write_only {
            return Err(syn::Error::new_spanned(
                field_name,
                "a field cannot be both read_only and write_only",
            ));
        }
        if options.skip {
            continue;
        }

        let read_fn = format_ident!("__shapemap_read_{}", field_name_str);
        let write_fn = format_ident!("__shapemap_write_{}", field_name_str);

        let read_expr = if options.write_only {
            quote! { ::std::option::Option::None }
        } else {
            accessor_tokens.push(quote! {
                fn #read_fn(
                    this: &dyn ::std::any::Any,
                ) -> ::std::option::Option<&dyn ::std::any::Any> {
                    this.downcast_ref::<#name>()
                        .map(|this| &this.#field_name as &dyn ::std::any::Any)
                }
            });
            quote! { ::std::option::Option::Some(#read_fn) }
        };

        let write_expr = if options.read_only {
            quote! { ::std::option::Option::None }
        } else {
            accessor_tokens.push(quote! {
                fn #write_fn(
                    this: &mut dyn ::std::any::Any,
                ) -> ::std::option::Option<&mut dyn ::std::any::Any> {
                    this.downcast_mut::<#name>()
                        .map(|this| &mut this.#field_name as &mut dyn ::std::any::Any)
                }
            });
            quote! { ::std::option::Option::Some(#write_fn) }
        };

        field_tokens.push(quote! {
            ::shapemap_api::descriptor::FieldDescriptor::new::<#field_ty>(
                #field_name_str,
                #read_expr,
                #write_expr,
            )
        });
    }

    let construct_expr = if no_default {
        quote! { ::std::option::Option::None }
    } else {
        quote! {
            ::std::option::Option::Some(
                ::shapemap_api::descriptor::construct_default::<#name>
                    as ::shapemap_api::descriptor::ConstructFn
            )
        }
    };

    let expanded = quote! {
        impl ::shapemap_api::descriptor::Mappable for #name {
            fn descriptor() -> ::shapemap_api::descriptor::TypeDescriptor {
                #(#accessor_tokens)*

                ::shapemap_api::descriptor::TypeDescriptor::object::<#name>(
                    ::std::vec![
                        #(#field_tokens),*
                    ],
                    #construct_expr,
                )
            }
        }
    };

    Ok(TokenStream::from(expanded))
}
