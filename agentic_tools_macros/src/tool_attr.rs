use proc_macro::TokenStream;
use proc_macro2::{Span, TokenStream as TokenStream2};
use quote::{format_ident, quote};
use syn::{parse_macro_input, Attribute, Expr, FnArg, ItemFn, Meta, Pat, ReturnType, Type};

pub(crate) fn expand(attr: TokenStream, item: TokenStream) -> TokenStream {
    if !attr.is_empty() {
        return syn::Error::new(Span::call_site(), "#[tool] takes no arguments")
            .to_compile_error()
            .into();
    }
    let mut function = parse_macro_input!(item as ItemFn);
    match expand_fn(&mut function) {
        Ok(tokens) => tokens.into(),
        Err(err) => err.to_compile_error().into(),
    }
}

fn expand_fn(function: &mut ItemFn) -> syn::Result<TokenStream2> {
    let fn_ident = function.sig.ident.clone();
    let name = fn_ident.to_string();
    let builder = format_ident!("{}_tool", fn_ident);
    let vis = function.vis.clone();
    let arity = function.sig.inputs.len();

    let mut bindings = Vec::new();
    let mut idents = Vec::new();
    for (index, input) in function.sig.inputs.iter_mut().enumerate() {
        let FnArg::Typed(param) = input else {
            return Err(syn::Error::new_spanned(input, "#[tool] functions cannot take `self`"));
        };
        let Pat::Ident(pat) = param.pat.as_ref() else {
            return Err(syn::Error::new_spanned(
                &param.pat,
                "#[tool] parameters must be plain identifiers",
            ));
        };
        if let Type::Reference(reference) = param.ty.as_ref() {
            return Err(syn::Error::new_spanned(
                reference,
                "#[tool] parameters must be owned types",
            ));
        }

        let ident = pat.ident.clone();
        let key = ident.to_string().trim_start_matches("r#").to_string();
        let default = match take_default(&mut param.attrs) {
            Some(expr) => quote!(::std::option::Option::Some(::agentic_tools::serde_json::json!(#expr))),
            None => quote!(::std::option::Option::None),
        };
        let ty = &param.ty;
        bindings.push(quote! {
            let #ident: #ty = args.take(#index, #key, #arity, #default)?;
        });
        idents.push(ident);
    }

    let call = if function.sig.asyncness.is_some() {
        quote!(#fn_ident(#(#idents),*).await)
    } else {
        quote!(#fn_ident(#(#idents),*))
    };
    let output = if returns_result(&function.sig.output) {
        quote! {
            let output = #call.map_err(|err| {
                ::agentic_tools::AgentError::ToolExecution(err.to_string())
            })?;
        }
    } else {
        quote!(let output = #call;)
    };
    let args = if idents.is_empty() {
        quote!(_args)
    } else {
        quote!(args)
    };
    let doc = format!("Tool wrapper for [`{name}`].");

    Ok(quote! {
        #function

        #[doc = #doc]
        #vis fn #builder() -> ::agentic_tools::tools::ToolFunction {
            ::agentic_tools::tools::ToolFunction::from_async(
                #name,
                |#args: ::agentic_tools::tools::ToolArgs| async move {
                    #(#bindings)*
                    #output
                    ::agentic_tools::tools::to_tool_value(output)
                },
            )
        }
    })
}

/// Remove a `#[default = <expr>]` attribute, returning its value.
fn take_default(attrs: &mut Vec<Attribute>) -> Option<Expr> {
    let mut default = None;
    attrs.retain(|attr| match &attr.meta {
        Meta::NameValue(nv) if nv.path.is_ident("default") => {
            default = Some(nv.value.clone());
            false
        }
        _ => true,
    });
    default
}

fn returns_result(output: &ReturnType) -> bool {
    match output {
        ReturnType::Type(_, ty) => match ty.as_ref() {
            Type::Path(path) => path
                .path
                .segments
                .last()
                .map(|segment| segment.ident == "Result")
                .unwrap_or(false),
            _ => false,
        },
        ReturnType::Default => false,
    }
}
