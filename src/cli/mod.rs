use crate::{
    config::ChatConfig,
    core::assistant::{ChatAssistant, ChatOptions},
    extract::{RustSourceExtractor, SchemaExtractor},
    schemas::param_spec::parse_params,
    services::ResponsesClient,
};
use anyhow::{anyhow, Context};
use clap::{Arg, ArgAction, ArgMatches, Command};
use serde_json::Value;
use std::{fs, time::Duration};
use tracing::info;

fn command() -> Command {
    Command::new("agentic-tools")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Inspect tool schemas and talk to a chat endpoint")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("extract")
                .about("Print the tool schemas of the public functions in a Rust source file")
                .arg(Arg::new("file").help("Rust source file").required(true).index(1))
                .arg(
                    Arg::new("no-flatten")
                        .long("no-flatten")
                        .action(ArgAction::SetTrue)
                        .help("Keep a lone struct parameter nested instead of lifting its fields"),
                ),
        )
        .subcommand(
            Command::new("params")
                .about("Print the JSON Schema produced by compact parameter specs")
                .arg(
                    Arg::new("spec")
                        .help("Specs such as 'zip!:/^\\d{5}$/@Zip code'")
                        .required(true)
                        .num_args(1..),
                ),
        )
        .subcommand(
            Command::new("chat")
                .about("Send a one-off prompt to the configured chat endpoint")
                .arg(Arg::new("prompt").help("The prompt to send").required(true).index(1))
                .arg(
                    Arg::new("model")
                        .short('m')
                        .long("model")
                        .value_name("MODEL")
                        .help("Model name (or set AGENTIC_MODEL)"),
                )
                .arg(
                    Arg::new("api-key")
                        .short('k')
                        .long("api-key")
                        .value_name("KEY")
                        .help("API key (or set OPENAI_API_KEY)"),
                )
                .arg(
                    Arg::new("base-url")
                        .short('u')
                        .long("base-url")
                        .value_name("URL")
                        .help("Endpoint base URL (or set OPENAI_BASE_URL)"),
                )
                .arg(
                    Arg::new("timeout")
                        .short('t')
                        .long("timeout")
                        .value_name("SECONDS")
                        .value_parser(clap::value_parser!(u64))
                        .help("Request timeout in seconds"),
                ),
        )
}

/// CLI entry point
pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let matches = command().get_matches();
    match matches.subcommand() {
        Some(("extract", args)) => extract(args),
        Some(("params", args)) => params(args),
        Some(("chat", args)) => chat(args).await,
        _ => Err(anyhow!("unknown subcommand")),
    }
}

fn print_json(value: &Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn extract(args: &ArgMatches) -> anyhow::Result<()> {
    let file = args
        .get_one::<String>("file")
        .ok_or_else(|| anyhow!("missing file"))?;
    let source = fs::read_to_string(file).with_context(|| format!("reading {file}"))?;
    let extractor = RustSourceExtractor::new().with_flatten(!args.get_flag("no-flatten"));
    let tools = extractor.extract(&source);
    info!(file = %file, tools = tools.len(), "extracted tool schemas");
    print_json(&Value::Array(tools.iter().map(|tool| tool.to_wire()).collect()))
}

fn params(args: &ArgMatches) -> anyhow::Result<()> {
    let specs: Vec<&String> = args.get_many::<String>("spec").into_iter().flatten().collect();
    let params = parse_params(&specs)?;
    print_json(&params.to_input_schema().to_wire())
}

async fn chat(args: &ArgMatches) -> anyhow::Result<()> {
    let prompt = args
        .get_one::<String>("prompt")
        .ok_or_else(|| anyhow!("missing prompt"))?;

    let mut config = match args.get_one::<String>("api-key") {
        Some(key) => ChatConfig::new(key.clone()),
        None => ChatConfig::from_env()?,
    };
    if let Some(model) = args.get_one::<String>("model") {
        config = config.with_model(model.clone());
    }
    if let Some(base_url) = args.get_one::<String>("base-url") {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(timeout) = args.get_one::<u64>("timeout") {
        config = config.with_timeout(Duration::from_secs(*timeout));
    }

    info!(model = %config.model, base_url = %config.base_url, "sending prompt");
    let assistant = ChatAssistant::new(ResponsesClient::new(&config)?).with_model(config.model.clone());
    let outcome = assistant.solo(prompt.as_str(), ChatOptions::new()).await?;
    println!("{}", outcome.text);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_is_well_formed() {
        command().debug_assert();
    }

    #[test]
    fn parses_params_subcommand() {
        let matches = command()
            .try_get_matches_from(["agentic-tools", "params", "a!:int", "b:{x,y}"])
            .unwrap();
        let (name, args) = matches.subcommand().unwrap();
        assert_eq!(name, "params");
        assert_eq!(args.get_many::<String>("spec").unwrap().count(), 2);
    }

    #[test]
    fn extract_flag_defaults_to_flattening() {
        let matches = command()
            .try_get_matches_from(["agentic-tools", "extract", "lib.rs"])
            .unwrap();
        let (_, args) = matches.subcommand().unwrap();
        assert!(!args.get_flag("no-flatten"));
    }
}
