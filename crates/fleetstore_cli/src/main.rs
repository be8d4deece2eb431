//! Command-line entry point for a fleet store.
//!
//! # Responsibility
//! - Open a store from a JSON config file (or environment defaults).
//! - Run one accessor operation per invocation and print JSON to stdout.

use clap::{Parser, Subcommand};
use fleetstore_core::{
    get_or_insert_id, init_logging, parse_credential_scope, record_from_json, update_or_insert,
    ApiError, CredentialScope, Filter, Passthrough, RequestContext, ResourceAccessor, Store,
    StoreConfig,
};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::process::ExitCode;

/// Fleet resource store command-line tools
#[derive(Debug, Parser, PartialEq)]
#[command(name = "fleetstore", version)]
struct Invocation {
    /// JSON config file; defaults plus FLEETSTORE_* variables when omitted
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Credential scope for the request
    #[arg(long, global = true, default_value = "root", value_parser = parse_scope)]
    scope: CredentialScope,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, PartialEq, Subcommand)]
enum Command {
    /// Check that the core library is linked
    Ping,

    /// List rows of a resource
    Get {
        resource: String,
        /// Filter object, e.g. '{"uuid": {"$in": ["a", "b"]}}'
        #[arg(default_value = "{}", value_parser = parse_filter)]
        filter: Filter,
    },

    /// Return the id of a matching row, inserting it when absent
    GetOrInsert {
        resource: String,
        #[arg(value_parser = parse_json)]
        body: Value,
    },

    /// Update the single row matching a filter, or insert filter plus update
    Upsert {
        resource: String,
        #[arg(value_parser = parse_filter)]
        filter: Filter,
        #[arg(value_parser = parse_json)]
        update: Value,
    },

    /// Delete matching rows together with their registered dependents
    Delete {
        resource: String,
        #[arg(value_parser = parse_filter)]
        filter: Filter,
    },
}

fn main() -> ExitCode {
    let invocation = Invocation::parse();

    match run(invocation) {
        Ok(output) => {
            println!("{output}");
            ExitCode::SUCCESS
        }
        Err(message) => {
            eprintln!("{message}");
            ExitCode::FAILURE
        }
    }
}

fn parse_scope(input: &str) -> Result<CredentialScope, String> {
    parse_credential_scope(input).map_err(|err| err.to_string())
}

fn parse_json(input: &str) -> Result<Value, String> {
    serde_json::from_str(input).map_err(|err| format!("invalid JSON argument: {err}"))
}

fn parse_filter(input: &str) -> Result<Filter, String> {
    Filter::from_json(&parse_json(input)?).map_err(|err| err.to_string())
}

fn run(invocation: Invocation) -> Result<Value, String> {
    if invocation.command == Command::Ping {
        return Ok(json!({
            "ping": fleetstore_core::ping(),
            "version": fleetstore_core::core_version(),
        }));
    }

    let config = match &invocation.config {
        Some(path) => StoreConfig::load(path),
        None => StoreConfig::from_env(),
    }
    .map_err(|err| err.to_string())?;
    if config.logging.dir.is_some() {
        init_logging(&config.logging)?;
    }

    let store = Store::open(&config).map_err(|err| describe(&err))?;
    let request = RequestContext::new();
    log::info!(
        "event=cli_command module=cli status=start scope={} request_id={}",
        invocation.scope.as_str(),
        request.request_id()
    );
    execute(&store, &request, invocation.scope, invocation.command).map_err(|err| describe(&err))
}

fn execute(
    store: &Store,
    request: &RequestContext,
    scope: CredentialScope,
    command: Command,
) -> Result<Value, ApiError> {
    match command {
        Command::Ping => Ok(json!({ "ping": fleetstore_core::ping() })),
        Command::Get { resource, filter } => {
            let rows = store
                .accessor(request, Passthrough::scope(scope))
                .get(&resource, &filter, None)?;
            Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
        }
        Command::GetOrInsert { resource, body } => {
            let body = record_from_json(body)?;
            let result = store.run_in_transaction(|tx| {
                let accessor = store.accessor(request, Passthrough::new(scope, Some(tx)));
                get_or_insert_id(&accessor, &resource, &body)
            })?;
            Ok(json!({ "id": result.id, "inserted": result.inserted }))
        }
        Command::Upsert {
            resource,
            filter,
            update,
        } => {
            let update = record_from_json(update)?;
            let id = store.run_in_transaction(|tx| {
                let accessor = store.accessor(request, Passthrough::new(scope, Some(tx)));
                update_or_insert(&accessor, &resource, &filter, &update)
            })?;
            Ok(json!({ "id": id }))
        }
        Command::Delete { resource, filter } => {
            store.delete_in_transaction(request, scope, &resource, &filter)?;
            Ok(json!({ "deleted": resource, "filter": filter.to_json() }))
        }
    }
}

fn describe(err: &ApiError) -> String {
    format!("error_code={} error={err}", err.code())
}
