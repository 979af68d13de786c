//! aion-gen: run and inspect cached generations from the command line.
//!
//! Usage:
//!   aion-gen generate <kind> [key=value ...] [--prompt <text>]   Generate (or read from cache)
//!   aion-gen generate <kind> --raw [key=value ...]               Same, keeping every value a string
//!   aion-gen extract <file>                                      Extract the JSON payload from raw output
//!   aion-gen validate <kind> <file>                              Validate a JSON file against a catalog schema
//!   aion-gen kinds                                               List catalog kinds and their fields

use aion_generation::cache::{CacheParams, ParamValue};
use aion_generation::structured::{extract_payload, ResponseSchema};
use aion_generation::telemetry::{init_tracing, TracingObserver};
use aion_generation::{GenerationConfig, GenerationServiceBuilder, Kind};
use anyhow::{anyhow, bail, Context};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() {
    init_tracing("warn");

    let args: Vec<String> = std::env::args().collect();
    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    let result = match args[1].as_str() {
        "generate" => cmd_generate(&args[2..]).await,
        "extract" => cmd_extract(&args[2..]),
        "validate" => cmd_validate(&args[2..]),
        "kinds" => cmd_kinds(),
        "version" | "--version" | "-V" => {
            cmd_version();
            Ok(())
        }
        "help" | "--help" | "-h" => {
            print_usage();
            Ok(())
        }
        other => {
            eprintln!("Unknown command: {other}");
            eprintln!();
            print_usage();
            std::process::exit(1);
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn print_usage() {
    println!(
        r#"aion-gen — cached, schema-validated generation

USAGE:
    aion-gen <COMMAND> [OPTIONS]

COMMANDS:
    generate <kind> [key=value ...]   Generate a payload, reading the cache first
        --prompt <text>               Prompt to send (required for non-catalog kinds)
        --schema <file>               JSON Schema for non-catalog kinds
        --config <file>               YAML configuration file
        --fallback                    Print the static fallback on generation failure
        --raw                         Keep every key=value as a string

    Values are typed before they reach the cache key: `week=3` and `week=3.0`
    are the integer 3, `done=true` is a boolean, `date=2024-03-01` is a calendar
    day. Use --raw when an identifier such as `zip=02134` must stay text.
    extract <file>                    Extract the JSON payload from raw model output
    validate <kind> <file>            Validate a JSON file against a catalog schema
    kinds                             List catalog kinds and their fields
    version                           Show version information
    help                              Show this help message

ENVIRONMENT:
    AION_BASE_URL, AION_MODEL, AION_API_KEY, AION_CACHE_DIR, ...
    RUST_LOG                          Log filter (default: warn)"#
    );
}

fn cmd_version() {
    println!("aion-gen {}", env!("CARGO_PKG_VERSION"));
}

#[derive(Debug, Default)]
struct GenerateArgs {
    kind: String,
    params: CacheParams,
    prompt: Option<String>,
    schema: Option<PathBuf>,
    config: Option<PathBuf>,
    fallback: bool,
    raw: bool,
}

fn parse_generate_args(args: &[String]) -> anyhow::Result<GenerateArgs> {
    let mut parsed = GenerateArgs::default();
    let mut pairs = Vec::new();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--prompt" => parsed.prompt = Some(flag_value(&mut iter, "--prompt")?),
            "--schema" => parsed.schema = Some(flag_value(&mut iter, "--schema")?.into()),
            "--config" => parsed.config = Some(flag_value(&mut iter, "--config")?.into()),
            "--fallback" => parsed.fallback = true,
            "--raw" => parsed.raw = true,
            flag if flag.starts_with("--") => bail!("unknown option {flag}"),
            positional if parsed.kind.is_empty() => parsed.kind = positional.to_string(),
            pair => {
                let pair = pair
                    .split_once('=')
                    .ok_or_else(|| anyhow!("expected key=value, got {pair:?}"))?;
                pairs.push(pair);
            }
        }
    }
    if parsed.kind.is_empty() {
        bail!("missing <kind>");
    }
    // --raw may follow the pairs it applies to.
    for (name, value) in pairs {
        let value = if parsed.raw {
            ParamValue::Str(value.to_string())
        } else {
            ParamValue::infer(value)
        };
        parsed.params.insert(name, value);
    }
    Ok(parsed)
}

fn flag_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> anyhow::Result<String> {
    iter.next()
        .cloned()
        .ok_or_else(|| anyhow!("{flag} needs a value"))
}

async fn cmd_generate(args: &[String]) -> anyhow::Result<()> {
    let args = parse_generate_args(args)?;
    let config = GenerationConfig::load(args.config.as_deref())?;
    let service = GenerationServiceBuilder::from_config(&config)?
        .observer(Arc::new(TracingObserver))
        .build();

    let payload = match args.kind.parse::<Kind>() {
        Ok(kind) => {
            let prompt = args.prompt.unwrap_or_else(|| kind.prompt(&args.params));
            let schema = kind.schema();
            if args.fallback {
                service
                    .generate_or_fallback(kind.as_str(), &args.params, &schema, &prompt, kind.fallback())
                    .await?
            } else {
                service
                    .generate(kind.as_str(), &args.params, &schema, &prompt)
                    .await?
            }
        }
        Err(_) => {
            let prompt = args
                .prompt
                .ok_or_else(|| anyhow!("--prompt is required for kind '{}'", args.kind))?;
            let schema = match &args.schema {
                Some(path) => ResponseSchema::from_json_schema(&args.kind, read_json(path)?)?,
                None => ResponseSchema::from_json_schema(&args.kind, json!({"type": "object"}))?,
            };
            service
                .generate(&args.kind, &args.params, &schema, &prompt)
                .await?
        }
    };

    println!("{}", serde_json::to_string_pretty(&payload)?);
    Ok(())
}

fn cmd_extract(args: &[String]) -> anyhow::Result<()> {
    let path = args.first().ok_or_else(|| anyhow!("missing <file>"))?;
    let raw = std::fs::read_to_string(path).with_context(|| format!("cannot read {path}"))?;
    let extracted = extract_payload(&raw)?;
    eprintln!("source: {:?}", extracted.source);
    println!("{}", serde_json::to_string_pretty(&extracted.value)?);
    Ok(())
}

fn cmd_validate(args: &[String]) -> anyhow::Result<()> {
    let (kind, path) = match args {
        [kind, path, ..] => (kind, path),
        _ => bail!("usage: aion-gen validate <kind> <file>"),
    };
    let kind: Kind = kind.parse().map_err(|e: String| anyhow!(e))?;
    let payload = read_json(&PathBuf::from(path))?;

    let result = kind.schema().validate(&payload);
    if result.is_valid() {
        println!("✓ {path} is a valid {kind} payload");
        return Ok(());
    }
    println!("✗ {path} is not a valid {kind} payload");
    println!("  offending fields: {}", result.offending_fields().join(", "));
    for message in result.error_messages() {
        println!("  - {message}");
    }
    std::process::exit(1);
}

fn cmd_kinds() -> anyhow::Result<()> {
    for kind in Kind::ALL {
        println!("{kind}");
        for field in kind.schema().field_summaries() {
            let necessity = if field.required { "required" } else { "optional" };
            println!("  {:<22} {:<16} {necessity}", field.name, field.type_label);
        }
        println!();
    }
    Ok(())
}

fn read_json(path: &PathBuf) -> anyhow::Result<Value> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not valid JSON", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_values_are_typed_by_default() {
        let parsed = parse_generate_args(&args(&["practice_detail", "week=3", "zip=02134"])).unwrap();
        assert_eq!(parsed.kind, "practice_detail");
        assert_eq!(parsed.params.get("week"), Some(&ParamValue::Int(3)));
        assert_eq!(parsed.params.get("zip"), Some(&ParamValue::Int(2134)));
    }

    #[test]
    fn test_raw_keeps_values_as_text() {
        let parsed =
            parse_generate_args(&args(&["practice_detail", "zip=02134", "flag=true", "--raw"])).unwrap();
        assert!(parsed.raw);
        assert_eq!(parsed.params.get("zip"), Some(&ParamValue::Str("02134".into())));
        assert_eq!(parsed.params.get("flag"), Some(&ParamValue::Str("true".into())));
    }

    #[test]
    fn test_rejects_bad_arguments() {
        assert!(parse_generate_args(&args(&[])).is_err());
        assert!(parse_generate_args(&args(&["kind", "novalue"])).is_err());
        assert!(parse_generate_args(&args(&["kind", "--bogus"])).is_err());
        assert!(parse_generate_args(&args(&["kind", "--prompt"])).is_err());
    }
}
