//! `#[derive(Wire)]` for plain structs and enums.
//!
//! - Structs with named fields become records, fields in declaration order.
//! - Enums may mix unit variants and single-field tuple variants; each
//!   becomes a named variant carrying `Unit` or its payload.
//!
//! Generated code refers to `::polywire`.

use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::Data;
use syn::DeriveInput;
use syn::Fields;
use syn::parse_macro_input;
use syn::parse_quote;

#[proc_macro_derive(Wire)]
pub fn derive_wire(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match expand(input) {
        Ok(tokens) => tokens.into(),
        Err(e) => e.to_compile_error().into(),
    }
}

fn expand(mut input: DeriveInput) -> syn::Result<TokenStream2> {
    for param in input.generics.type_params_mut() {
        param.bounds.push(parse_quote!(::polywire::Wire));
    }

    let name = &input.ident;
    let name_str = name.to_string();
    let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();

    let body = match &input.data {
        Data::Struct(data) => expand_struct(&name_str, &data.fields)?,
        Data::Enum(data) => expand_enum(&name_str, data)?,
        Data::Union(_) => {
            return Err(syn::Error::new_spanned(name, "Wire cannot be derived for unions"));
        }
    };

    Ok(quote! {
        impl #impl_generics ::polywire::Wire for #name #ty_generics #where_clause {
            #body
        }
    })
}

fn expand_struct(name: &str, fields: &Fields) -> syn::Result<TokenStream2> {
    let Fields::Named(named) = fields else {
        return Err(syn::Error::new_spanned(fields, "Wire structs need named fields"));
    };

    let idents: Vec<_> = named.named.iter().filter_map(|f| f.ident.clone()).collect();
    let tys: Vec<_> = named.named.iter().map(|f| f.ty.clone()).collect();
    let keys: Vec<_> = idents.iter().map(|i| i.to_string()).collect();

    Ok(quote! {
        fn value_type() -> ::polywire::ValueType {
            ::polywire::ValueType::Record(
                ::std::string::String::from(#name),
                ::std::vec![
                    #( (::std::string::String::from(#keys), <#tys as ::polywire::Wire>::value_type()) ),*
                ],
            )
        }

        fn to_value(&self) -> ::polywire::Value {
            ::polywire::Value::Record(::std::vec![
                #( (::std::string::String::from(#keys), ::polywire::Wire::to_value(&self.#idents)) ),*
            ])
        }

        fn from_value(value: ::polywire::Value) -> ::polywire::Result<Self> {
            let mut fields = ::polywire::wire::Fields::new(value, #name, <Self as ::polywire::Wire>::value_type())?;
            ::std::result::Result::Ok(Self {
                #( #idents: fields.take(#keys)? ),*
            })
        }
    })
}

fn expand_enum(name: &str, data: &syn::DataEnum) -> syn::Result<TokenStream2> {
    let mut cases = Vec::new();
    let mut to_arms = Vec::new();
    let mut from_arms = Vec::new();

    for variant in &data.variants {
        let ident = &variant.ident;
        let key = ident.to_string();
        match &variant.fields {
            Fields::Unit => {
                cases.push(quote! {
                    (::std::string::String::from(#key), ::polywire::ValueType::Unit)
                });
                to_arms.push(quote! {
                    Self::#ident => ::polywire::Value::Variant(
                        ::std::string::String::from(#key),
                        ::std::boxed::Box::new(::polywire::Value::Unit),
                    )
                });
                from_arms.push(quote! {
                    #key => ::std::result::Result::Ok(Self::#ident)
                });
            }
            Fields::Unnamed(unnamed) if unnamed.unnamed.len() == 1 => {
                let ty = &unnamed.unnamed[0].ty;
                cases.push(quote! {
                    (::std::string::String::from(#key), <#ty as ::polywire::Wire>::value_type())
                });
                to_arms.push(quote! {
                    Self::#ident(inner) => ::polywire::Value::Variant(
                        ::std::string::String::from(#key),
                        ::std::boxed::Box::new(::polywire::Wire::to_value(inner)),
                    )
                });
                from_arms.push(quote! {
                    #key => ::std::result::Result::Ok(Self::#ident(<#ty as ::polywire::Wire>::from_value(payload)?))
                });
            }
            other => {
                return Err(syn::Error::new_spanned(
                    other,
                    "Wire enum variants must be unit or carry exactly one field",
                ));
            }
        }
    }

    Ok(quote! {
        fn value_type() -> ::polywire::ValueType {
            ::polywire::ValueType::Variant(
                ::std::string::String::from(#name),
                ::std::vec![ #(#cases),* ],
            )
        }

        fn to_value(&self) -> ::polywire::Value {
            match self {
                #(#to_arms),*
            }
        }

        #[allow(unused_variables)]
        fn from_value(value: ::polywire::Value) -> ::polywire::Result<Self> {
            let (case, payload) = ::polywire::wire::variant_parts(value, <Self as ::polywire::Wire>::value_type())?;
            match case.as_str() {
                #(#from_arms,)*
                _ => ::std::result::Result::Err(::polywire::WireError::UnknownVariant {
                    type_name: ::std::string::String::from(#name),
                    variant: case.clone(),
                }),
            }
        }
    })
}
