//! `#[patch_operation]` expansion
//!
//! Input:
//! ```ignore
//! #[patch_operation(resource = "Patient")]
//! async fn patch_patient(id: ResourceIdentity, enc: PatchEncoding, #[body] body: Bytes)
//!     -> Result<Option<HandlerOutcome>> { ... }
//! ```
//!
//! Generated output:
//! ```ignore
//! fn patch_patient() -> Box<dyn ::restbind_server::OperationHandler> {
//!     async fn inner_operation(id: ResourceIdentity, enc: PatchEncoding, body: Bytes)
//!         -> Result<Option<HandlerOutcome>> { ... }
//!
//!     let signature = ::restbind_server::__private::HandlerSignature::patch("patch_patient")
//!         .resource_type("Patient")
//!         .param(::restbind_server::__private::ParameterDecl::identity().named("id"))
//!         .param(::restbind_server::__private::ParameterDecl::patch_type().named("enc"))
//!         .param(::restbind_server::__private::ParameterDecl::body().named("body"));
//!
//!     ::restbind_server::from_fn(signature, |mut args| async move {
//!         let arg0 = args.take_as::<ResourceIdentity>(0usize)?;
//!         let arg1 = args.take_as::<PatchEncoding>(1usize)?;
//!         let arg2 = args.take_as::<Bytes>(2usize)?;
//!         inner_operation(arg0, arg1, arg2).await
//!     })
//! }
//! ```
//!
//! Every generated path starts at the server crate, `::restbind_server` unless
//! `crate = "..."` names another path to it (such as `restbind::server`).

use proc_macro2::TokenStream;
use quote::{format_ident, quote};
use syn::{
    parse::Parser, parse_quote, spanned::Spanned, Attribute, Error, FnArg, ItemFn, LitStr, Pat,
    PatType, Path, Result, Type,
};

/// Role a parameter plays, decided from its type or its attribute
#[derive(Debug, Clone, PartialEq, Eq)]
enum Role {
    Identity,
    PatchType,
    Body,
    Query(String),
}

/// Options given inside `#[patch_operation(...)]`
struct OperationArgs {
    resource: Option<LitStr>,
    server: Path,
}

impl Default for OperationArgs {
    fn default() -> Self {
        Self {
            resource: None,
            server: parse_quote!(::restbind_server),
        }
    }
}

pub fn patch_operation_impl(attr: TokenStream, item: TokenStream) -> TokenStream {
    match expand(attr, item) {
        Ok(tokens) => tokens,
        Err(error) => error.to_compile_error(),
    }
}

fn expand(attr: TokenStream, item: TokenStream) -> Result<TokenStream> {
    let args = parse_args(attr)?;
    let server = &args.server;
    let private = quote! { #server::__private };
    let mut input_fn: ItemFn = syn::parse2(item)?;

    if input_fn.sig.asyncness.is_none() {
        return Err(Error::new_spanned(
            input_fn.sig.fn_token,
            "#[patch_operation] requires an async fn",
        ));
    }

    let mut decls = Vec::new();
    let mut extractions = Vec::new();
    let mut call_args = Vec::new();

    for (index, input) in input_fn.sig.inputs.iter_mut().enumerate() {
        let pat_type = match input {
            FnArg::Typed(pat_type) => pat_type,
            FnArg::Receiver(receiver) => {
                return Err(Error::new_spanned(
                    receiver,
                    "#[patch_operation] cannot be used on methods",
                ))
            }
        };

        let role = classify(pat_type)?;
        strip_role_attrs(&mut pat_type.attrs);

        let ty = &pat_type.ty;
        let decl = match &role {
            Role::Identity => quote! { #private::ParameterDecl::identity() },
            Role::PatchType => quote! { #private::ParameterDecl::patch_type() },
            Role::Body => quote! { #private::ParameterDecl::body() },
            Role::Query(name) => quote! {
                #private::ParameterDecl::new(#private::ParamRole::Query(
                    #private::QueryParamSpec::new(
                        #name,
                        <#ty as #private::QueryArgument>::PARAM_TYPE,
                        <#ty as #private::QueryArgument>::REQUIRED,
                    ),
                ))
            },
        };
        let decl = match label(&pat_type.pat) {
            Some(label) => quote! { #decl.named(#label) },
            None => decl,
        };
        decls.push(decl);

        let binding = format_ident!("arg{}", index);
        extractions.push(quote! {
            let #binding = args.take_as::<#ty>(#index)?;
        });
        call_args.push(binding);
    }

    let fn_name = &input_fn.sig.ident;
    let fn_vis = &input_fn.vis;
    let fn_attrs = &input_fn.attrs;
    let name = fn_name.to_string();
    let resource = args.resource.as_ref().map(|lit| quote! { .resource_type(#lit) });

    let mut inner_sig = input_fn.sig.clone();
    inner_sig.ident = format_ident!("inner_operation");
    let fn_block = &input_fn.block;

    let args_pat = if call_args.is_empty() {
        quote! { _args }
    } else {
        quote! { mut args }
    };

    Ok(quote! {
        #(#fn_attrs)*
        #fn_vis fn #fn_name() -> ::std::boxed::Box<dyn #server::OperationHandler> {
            #inner_sig #fn_block

            let signature = #private::HandlerSignature::patch(#name)
                #resource
                #(.param(#decls))*;

            #server::from_fn(signature, |#args_pat: #private::CallArguments| async move {
                #(#extractions)*
                inner_operation(#(#call_args),*).await
            })
        }
    })
}

fn parse_args(attr: TokenStream) -> Result<OperationArgs> {
    let mut args = OperationArgs::default();
    let parser = syn::meta::parser(|meta| {
        if meta.path.is_ident("resource") {
            let value: LitStr = meta.value()?.parse()?;
            if value.value().is_empty() {
                return Err(Error::new_spanned(value, "resource type can not be empty"));
            }
            args.resource = Some(value);
            Ok(())
        } else if meta.path.is_ident("crate") {
            let value: LitStr = meta.value()?.parse()?;
            args.server = value.parse()?;
            Ok(())
        } else {
            Err(meta.error(
                "unsupported patch_operation argument, expected `resource = \"...\"` or `crate = \"...\"`",
            ))
        }
    });
    parser.parse2(attr)?;
    Ok(args)
}

/// Decide a parameter's role; attributes win over the type
fn classify(param: &PatType) -> Result<Role> {
    for attr in &param.attrs {
        if attr.path().is_ident("body") {
            attr.meta.require_path_only()?;
            return Ok(Role::Body);
        }
        if attr.path().is_ident("query") {
            let name: LitStr = attr.parse_args()?;
            if name.value().is_empty() {
                return Err(Error::new_spanned(name, "query parameter name can not be empty"));
            }
            return Ok(Role::Query(name.value()));
        }
    }

    match type_name(&param.ty).as_deref() {
        Some("ResourceIdentity") => Ok(Role::Identity),
        Some("PatchEncoding") => Ok(Role::PatchType),
        _ => Err(Error::new(
            param.span(),
            "cannot infer the role of this parameter: use a ResourceIdentity or \
             PatchEncoding type, or tag it with #[body] or #[query(\"name\")]",
        )),
    }
}

fn strip_role_attrs(attrs: &mut Vec<Attribute>) {
    attrs.retain(|attr| !attr.path().is_ident("body") && !attr.path().is_ident("query"));
}

/// Last path segment of a plain path type
fn type_name(ty: &Type) -> Option<String> {
    match ty {
        Type::Path(path) if path.qself.is_none() => {
            path.path.segments.last().map(|segment| segment.ident.to_string())
        }
        _ => None,
    }
}

fn label(pat: &Pat) -> Option<String> {
    match pat {
        Pat::Ident(ident) => Some(ident.ident.to_string().trim_start_matches('_').to_string()),
        _ => None,
    }
}
