use agentic_tools::{
    core::{ChatResponse, FunctionCall, ScriptedChat},
    schemas::param_spec::parse_params,
    server::ToolReply,
    tools::{to_tool_value, ToolArgs, ToolFunction},
    Chain, ChainContext, ChainOps, ChatAssistant, ChatOptions, NextOptions, Outcome, RunOptions,
    RustSourceExtractor, SchemaExtractor, ToolBinder, ToolModule, ToolServer,
};
use serde_json::{json, Map, Value};
use std::sync::Arc;

fn bump(ctx: &ChainContext, key: &str) -> i64 {
    ctx.memory()
        .update(key, |value| json!(value.and_then(Value::as_i64).unwrap_or(0) + 1))
        .as_i64()
        .unwrap_or(0)
}

#[tokio::test]
async fn test_two_state_chain_resolves_with_second_state() {
    let chain = Chain::new()
        .state("first", |ctx: ChainContext| async move {
            ctx.set("x", 1);
            Ok("second")
        })
        .state("second", |ctx: ChainContext| async move {
            assert_eq!(ctx.get("x"), Some(json!(1)));
            ctx.set_last("done");
            Ok(())
        });

    let outcome = chain.run_from("first").await.unwrap();
    assert_eq!(outcome, Outcome::from("done"));
    assert_eq!(chain.memory().snapshot().get("x"), Some(&json!(1)));
}

#[tokio::test]
async fn test_max_steps_counts_exact_transitions() {
    let chain = Chain::new()
        .state("A", |ctx: ChainContext| async move {
            bump(&ctx, "runs");
            Ok("B")
        })
        .state("B", |ctx: ChainContext| async move {
            bump(&ctx, "runs");
            Ok("A")
        });

    let err = chain
        .run(Some("A"), RunOptions::new().with_max_steps(3))
        .await
        .unwrap_err();
    assert!(err.is_max_steps());
    assert_eq!(err.error_code(), "MAX_STEPS_EXCEEDED");
    assert_eq!(chain.memory().get("runs"), Some(json!(3)));
}

#[tokio::test]
async fn test_goto_beats_a_passing_next() {
    let chain = Chain::new()
        .state("start", |ctx: ChainContext| async move {
            ctx.next("soft", NextOptions::new().after("start"));
            ctx.goto("hard");
            Ok("returned")
        })
        .state("soft", |ctx: ChainContext| async move {
            ctx.set("path", "soft");
            Ok(())
        })
        .state("hard", |ctx: ChainContext| async move {
            ctx.set("path", "hard");
            Ok(())
        })
        .state("returned", |ctx: ChainContext| async move {
            ctx.set("path", "returned");
            Ok(())
        });

    chain.run_from("start").await.unwrap();
    assert_eq!(chain.memory().get("path"), Some(json!("hard")));
}

#[tokio::test]
async fn test_nested_sub_chain_navigation_stays_local() {
    // The inner chain jumps around its own states; the outer one must only
    // see the shared memory, never the inner goto.
    let inner = Chain::new()
        .state("inner_a", |ctx: ChainContext| async move {
            ctx.goto("inner_b");
            Ok(())
        })
        .state("inner_b", |ctx: ChainContext| async move {
            ctx.set("inner", true);
            Ok(())
        });
    let middle = Chain::new()
        .then_step(inner.into_step_from(Some("inner_a".into())))
        .into_step();

    let outer = Chain::new()
        .state("outer", move |ctx: ChainContext| {
            let middle = Arc::clone(&middle);
            async move {
                middle(ctx.clone()).await?;
                Ok("after")
            }
        })
        .state("after", |ctx: ChainContext| async move {
            ctx.set("after", true);
            Ok(())
        })
        .state("inner_b", |ctx: ChainContext| async move {
            ctx.set("leaked", true);
            Ok(())
        });

    outer.run_from("outer").await.unwrap();
    assert_eq!(outer.memory().get("inner"), Some(json!(true)));
    assert_eq!(outer.memory().get("after"), Some(json!(true)));
    assert_eq!(outer.memory().get("leaked"), None);
}

#[test]
fn test_zip_pattern_and_mode_enum_params() {
    let params = parse_params(&["zip!:/^\\d{5}$/@Zip code", "mode:{auto,manual}=manual@Mode"]).unwrap();

    let zip = params.get("zip").unwrap();
    assert!(zip.check(Some(&json!("12345"))).is_ok());
    assert!(zip.check(Some(&json!("1234"))).is_err());
    assert!(zip.check(None).is_err());

    let mode = params.get("mode").unwrap();
    assert_eq!(mode.check(None).unwrap(), Some(json!("manual")));
    assert_eq!(mode.check(Some(&json!("auto"))).unwrap(), Some(json!("auto")));
    assert!(mode.check(Some(&json!("xyz"))).is_err());
}

#[test]
fn test_typed_defaults_and_numeric_enums() {
    let params = parse_params(&["count:int=3", "loud:boolean=true", "level:{1,2,3}"]).unwrap();
    assert_eq!(params.get("count").unwrap().check(None).unwrap(), Some(json!(3)));
    assert_eq!(params.get("loud").unwrap().check(None).unwrap(), Some(json!(true)));

    let level = params.get("level").unwrap();
    assert!(level.check(Some(&json!("2"))).is_ok());
    assert!(level.check(Some(&json!(2))).is_ok());
    assert!(level.check(Some(&json!(4))).is_err());
}

#[test]
fn test_extractor_required_and_property_counts() {
    let source = r#"
        pub fn book(city: String, nights: u32, note: Option<String>, #[default = false] pets: bool) {}
        pub fn greet(name: _, #[default = "Hello"] greeting: _) {}
    "#;
    let tools = RustSourceExtractor::new().extract(source);

    let book = &tools[0];
    assert_eq!(book.input_schema.required.len(), 2);
    assert_eq!(book.input_schema.properties.len(), 4);

    let greet = tools[1].input_schema.to_wire();
    assert_eq!(greet["required"], json!(["name"]));
    assert_eq!(greet["properties"]["greeting"]["type"], "string");

    let again = RustSourceExtractor::new().extract(source);
    assert_eq!(
        serde_json::to_string(&tools).unwrap(),
        serde_json::to_string(&again).unwrap()
    );
}

fn weather_module() -> ToolModule {
    let source = r#"
        /// Current weather for a city
        pub fn weather(city: String) -> String { city }
        pub fn silent() {}
    "#;
    let weather = ToolFunction::from_async("weather", |args: ToolArgs| async move {
        let city: String = args.take(0, "city", 1, None)?;
        to_tool_value(json!({ "city": city, "temp": 21 }))
    });
    let silent = ToolFunction::from_async("silent", |_args: ToolArgs| async move { Ok(None) });
    ToolModule::new("crate::weather", source).with_functions([weather, silent])
}

#[tokio::test]
async fn test_assistant_runs_bound_tools_and_captures_failures() {
    let registry = ToolBinder::new().bind(&weather_module(), &[]);
    assert_eq!(registry.names(), ["weather", "silent"]);

    let script = ScriptedChat::new()
        .reply(ChatResponse::calls(vec![
            FunctionCall {
                name: "weather".into(),
                arguments: r#"{"city":"Oslo"}"#.into(),
                call_id: "c1".into(),
            },
            FunctionCall {
                name: "silent".into(),
                arguments: "{}".into(),
                call_id: "c2".into(),
            },
        ]))
        .reply(ChatResponse::text("It is 21 degrees in Oslo."));
    let assistant = ChatAssistant::new(script.clone()).with_tools(registry);

    let outcome = assistant.chat("Weather in Oslo?", ChatOptions::new()).await.unwrap();
    assert!(outcome.is_tool());
    assert_eq!(outcome.name.as_deref(), Some("weather"));
    assert_eq!(outcome.result, Some(json!({"city": "Oslo", "temp": 21})));
    assert_eq!(outcome.calls.len(), 2);

    let failure = outcome.error.expect("silent tool error");
    assert_eq!(failure.tool, "silent");
    assert_eq!(failure.message, "Tool returned undefined");
    assert_eq!(outcome.text, "It is 21 degrees in Oslo.");
    assert_eq!(script.requests().len(), 2);
}

#[tokio::test]
async fn test_chain_drives_the_assistant() {
    let registry = ToolBinder::new().bind(&weather_module(), &[]);
    let script = ScriptedChat::new()
        .reply(ChatResponse::calls(vec![FunctionCall {
            name: "weather".into(),
            arguments: r#"{"city":"Lima"}"#.into(),
            call_id: "c1".into(),
        }]))
        .reply(ChatResponse::text("Warm."));
    let assistant = Arc::new(ChatAssistant::new(script).with_tools(registry));

    let chain = Chain::with_assistant(assistant)
        .set("city", "Lima")
        .chat("What is the weather?")
        .set_last("report");
    chain.run(None, RunOptions::default()).await.unwrap();

    let report = chain.memory().get("report").unwrap();
    assert_eq!(report["type"], "tool");
    assert_eq!(report["result"]["city"], "Lima");
}

#[tokio::test]
async fn test_served_registry_and_inline_tools_share_one_server() {
    let registry = ToolBinder::new().bind(&weather_module(), &[]);
    let mut server = ToolServer::new("weather", "1.0.0");
    server.register_registry(&registry);
    server
        .tool(
            "visit @ Count city visits",
            &["city!"],
            |args: Map<String, Value>, memory: Map<String, Value>| async move {
                let city = args["city"].as_str().unwrap_or_default().to_string();
                let seen = memory.get(&city).and_then(Value::as_i64).unwrap_or(0) + 1;
                Ok(ToolReply::new(json!({ "visits": seen })).with_delta(city, seen))
            },
        )
        .unwrap();

    let listed = server
        .handle(json!({"jsonrpc": "2.0", "id": 1, "method": "tools/list"}))
        .await
        .unwrap();
    let names: Vec<_> = listed["result"]["tools"]
        .as_array()
        .unwrap()
        .iter()
        .map(|tool| tool["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(names, ["weather", "silent", "visit"]);

    let weather = server
        .handle(json!({"jsonrpc": "2.0", "id": 2, "method": "tools/call", "params": {"name": "weather", "arguments": {"city": "Rome"}}}))
        .await
        .unwrap();
    assert_eq!(weather["result"]["structuredContent"]["temp"], 21);

    let silent = server
        .handle(json!({"jsonrpc": "2.0", "id": 3, "method": "tools/call", "params": {"name": "silent"}}))
        .await
        .unwrap();
    assert_eq!(silent["result"]["isError"], true);
    assert!(silent["result"]["content"].as_str().unwrap().contains("Tool returned undefined"));

    let visit = json!({"jsonrpc": "2.0", "id": 4, "method": "tools/call", "params": {"name": "visit", "arguments": {"city": "Rome"}}});
    server.handle(visit.clone()).await.unwrap();
    let second = server.handle(visit).await.unwrap();
    assert_eq!(second["result"]["structuredContent"], json!({"visits": 2}));
    assert_eq!(second["result"]["_meta"]["stateDelta"], json!({"Rome": 2}));
}
