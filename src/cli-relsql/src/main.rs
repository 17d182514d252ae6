extern crate clap;
use clap::{App, Arg};
use env_logger::Env;
use log::error;
use serde::Deserialize;

use common::plan::{PlanDoc, SimpleCatalog};
use common::CompiledQuery;
use sqlgen::{build, build_count, build_delete, BuildOptions, OrderBy};
use std::fs;
use std::process;

#[derive(Deserialize, Debug, Default)]
struct CliConfig {
    catalog: Option<String>,
    plan: Option<String>,
}

fn read_file(path: &str, what: &str) -> String {
    match fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            error!("cannot read {} file {}: {}", what, path, e);
            process::exit(1);
        }
    }
}

fn parse_number(text: &str, what: &str) -> u64 {
    match text.parse::<u64>() {
        Ok(n) => n,
        Err(_) => {
            error!("{} must be a non-negative integer, got {}", what, text);
            process::exit(1);
        }
    }
}

/// Parses a comma-separated ordering spec; a leading `-` means descending.
fn parse_order_by(spec: &str) -> Vec<OrderBy> {
    spec.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            if let Some(attr) = s.strip_prefix('-') {
                OrderBy::desc(attr)
            } else {
                OrderBy::asc(s)
            }
        })
        .collect()
}

/// Entry point for the plan compiler.
///
/// Reads a JSON catalog and a JSON plan, lowers the plan through the
/// validating constructors, and prints the compiled SQL plus its bound
/// parameters.
fn main() {
    // Configure log environment
    env_logger::from_env(Env::default().default_filter_or("info")).init();

    let matches = App::new(env!("CARGO_PKG_NAME"))
        .version(env!("CARGO_PKG_VERSION"))
        .author(env!("CARGO_PKG_AUTHORS"))
        .about("Compiles a JSON query plan into a single SQL statement")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("FILE")
                .help("Sets a custom config file")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("catalog")
                .short("s")
                .long("catalog")
                .value_name("FILE")
                .help("JSON catalog of table headings and foreign keys")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("plan")
                .short("p")
                .long("plan")
                .value_name("FILE")
                .help("JSON plan document")
                .takes_value(true)
                .required(false),
        )
        .arg(
            Arg::with_name("delete")
                .long("delete")
                .help("Compile a DELETE for the plan root")
                .conflicts_with("count"),
        )
        .arg(
            Arg::with_name("count")
                .long("count")
                .help("Compile a COUNT(*) over the plan root"),
        )
        .arg(
            Arg::with_name("limit")
                .long("limit")
                .value_name("N")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("offset")
                .long("offset")
                .value_name("N")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("order-by")
                .long("order-by")
                .value_name("ATTRS")
                .help("Comma-separated attributes, prefix with - for descending")
                .takes_value(true),
        )
        .get_matches();

    let config: CliConfig = match matches.value_of("config") {
        Some(path) => match serde_json::from_str(&read_file(path, "config")) {
            Ok(config) => config,
            Err(e) => {
                error!("malformatted config file {}: {}", path, e);
                process::exit(1);
            }
        },
        None => CliConfig::default(),
    };

    let catalog_path = match matches
        .value_of("catalog")
        .map(str::to_string)
        .or(config.catalog)
    {
        Some(path) => path,
        None => {
            error!("no catalog file given; use --catalog or a config file");
            process::exit(1);
        }
    };
    let plan_path = match matches.value_of("plan").map(str::to_string).or(config.plan) {
        Some(path) => path,
        None => {
            error!("no plan file given; use --plan or a config file");
            process::exit(1);
        }
    };

    let catalog = match SimpleCatalog::from_json(&read_file(&catalog_path, "catalog")) {
        Ok(catalog) => catalog,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let plan = match PlanDoc::from_json(&read_file(&plan_path, "plan")) {
        Ok(plan) => plan,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };
    let root = match plan.build(&catalog) {
        Ok(root) => root,
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    };

    let compiled: Result<CompiledQuery, _> = if matches.is_present("delete") {
        build_delete(&root)
    } else if matches.is_present("count") {
        build_count(&root)
    } else {
        let options = BuildOptions {
            order_by: matches
                .value_of("order-by")
                .map(parse_order_by)
                .unwrap_or_default(),
            limit: matches.value_of("limit").map(|s| parse_number(s, "limit")),
            offset: matches
                .value_of("offset")
                .map(|s| parse_number(s, "offset")),
        };
        build(&root, &options)
    };

    match compiled {
        Ok(query) => {
            println!("{}", query.sql);
            if !query.params.is_empty() {
                println!("-- params: {:?}", query.params);
            }
        }
        Err(e) => {
            error!("{}", e);
            process::exit(1);
        }
    }
}
