mod tool_attr;

use proc_macro::TokenStream;
use quote::quote;
use syn::parse_macro_input;

/// Turn an ordinary function into a tool.
///
/// Keeps the function as written and adds `<name>_tool()`, returning a
/// `ToolFunction` that accepts positional or object arguments, fills
/// `#[default = <literal>]` parameters, awaits async bodies and maps `Err`
/// returns to tool errors.
#[proc_macro_attribute]
pub fn tool(attr: TokenStream, item: TokenStream) -> TokenStream {
    tool_attr::expand(attr, item)
}

/// Defines a type implementing `Tool` with a schema derived from `params`
/// and an async closure as the executor.
#[proc_macro]
pub fn define_tool(input: TokenStream) -> TokenStream {
    let input = parse_macro_input!(input as ToolDefinition);

    let name = input.name;
    let description = input.description;
    let params_type = input.params_type;
    let execute_body = input.execute_body;

    // snake_case name -> PascalCase struct
    let struct_name = name
        .value()
        .split('_')
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<String>();

    let tool_struct = quote::format_ident!("{}", struct_name);

    let expanded = quote! {
        #[derive(Debug, Clone, Copy, Default)]
        pub struct #tool_struct;

        impl ::agentic_tools::tools::Tool for #tool_struct {
            fn name(&self) -> &str {
                #name
            }

            fn description(&self) -> &str {
                #description
            }

            fn input_schema(&self) -> ::agentic_tools::schemas::InputSchema {
                ::agentic_tools::schemas::input_schema_for::<#params_type>()
            }

            fn execute(
                &self,
                args: ::agentic_tools::tools::ToolArgs,
            ) -> ::std::pin::Pin<
                Box<
                    dyn ::std::future::Future<
                            Output = ::agentic_tools::Result<
                                ::std::option::Option<::agentic_tools::serde_json::Value>,
                            >,
                        > + Send
                        + '_,
                >,
            > {
                Box::pin(async move {
                    let params: #params_type =
                        ::agentic_tools::schemas::deserialize_args(args.into_value())?;

                    let handler = #execute_body;
                    let output = handler(params)
                        .await
                        .map_err(::agentic_tools::AgentError::ToolExecution)?;
                    ::agentic_tools::tools::to_tool_value(output)
                })
            }
        }
    };

    TokenStream::from(expanded)
}

struct ToolDefinition {
    name: syn::LitStr,
    description: syn::LitStr,
    params_type: syn::Type,
    execute_body: syn::ExprClosure,
}

fn parse_named_assignment<T: syn::parse::Parse>(
    input: syn::parse::ParseStream,
    keyword: &str,
) -> syn::Result<T> {
    let ident: syn::Ident = input.parse()?;
    if ident != keyword {
        return Err(syn::Error::new_spanned(
            ident,
            format!("expected '{keyword}'"),
        ));
    }
    input.parse::<syn::Token![=]>()?;
    let value = input.parse::<T>()?;
    input.parse::<syn::Token![,]>()?;
    Ok(value)
}

impl syn::parse::Parse for ToolDefinition {
    fn parse(input: syn::parse::ParseStream) -> syn::Result<Self> {
        let name = parse_named_assignment::<syn::LitStr>(input, "name")?;
        let description = parse_named_assignment::<syn::LitStr>(input, "description")?;
        let params_type = parse_named_assignment::<syn::Type>(input, "params")?;
        let execute_body: syn::ExprClosure = input.parse()?;

        Ok(ToolDefinition {
            name,
            description,
            params_type,
            execute_body,
        })
    }
}
