// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <j.d.a.jewell@open.ac.uk>
//!
//! carto-shell: run one core CLI command and print its result.
//!
//! ```text
//! carto-shell --url https://localhost:8900 --psk changeme search is(account) | count
//! ```
//!
//! Strings are printed as they arrive, everything else as pretty JSON.
//! Logging goes to stderr and is controlled by `RUST_LOG`.

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use carto_client::{BlockingClient, CliOptions, ClientConfig};
use clap::Parser;
use serde_json::Value;
use tracing::{debug, error};
use tracing_subscriber::EnvFilter;

/// Version string, pulled from Cargo.toml at compile time.
const VERSION: &str = env!("CARGO_PKG_VERSION");

// ---------------------------------------------------------------------------
// CLI argument parsing
// ---------------------------------------------------------------------------

/// Run a command against a Cartograph core.
#[derive(Parser, Debug)]
#[command(name = "carto-shell", version = VERSION, about = "Run Cartograph core CLI commands")]
struct Cli {
    /// Base URL of the core.
    #[arg(long, env = "CARTO_CORE_URL", default_value = "https://localhost:8900")]
    url: String,

    /// Pre-shared key of the core.
    #[arg(long, env = "CARTO_PSK", hide_env_values = true)]
    psk: Option<String>,

    /// PEM file with the CA certificate, instead of fetching it from the core.
    #[arg(long, env = "CARTO_CA_CERT")]
    ca_cert: Option<PathBuf>,

    /// Skip TLS certificate verification.
    #[arg(long)]
    no_verify: bool,

    /// Graph the command runs against.
    #[arg(long, env = "CARTO_GRAPH")]
    graph: Option<String>,

    /// Section paths are relative to.
    #[arg(long)]
    section: Option<String>,

    /// Upload a file as NAME=PATH; the command refers to it by NAME.
    #[arg(long = "upload", value_parser = parse_pair)]
    uploads: Vec<(String, String)>,

    /// Command environment entry as KEY=VALUE.
    #[arg(long = "env", value_parser = parse_pair)]
    env: Vec<(String, String)>,

    /// The command line, e.g. `search is(account) | count`.
    #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
    command: Vec<String>,
}

fn parse_pair(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .ok_or_else(|| format!("expected KEY=VALUE, got `{raw}`"))
}

impl Cli {
    fn client_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new(&self.url).with_verify(!self.no_verify);
        if let Some(psk) = &self.psk {
            config = config.with_psk(psk);
        }
        if let Some(path) = &self.ca_cert {
            config = config.with_custom_ca_cert(path);
        }
        if let Some(graph) = &self.graph {
            config = config.with_graph(graph);
        }
        config
    }

    fn cli_options(&self) -> CliOptions {
        let mut options = CliOptions::default();
        if let Some(graph) = &self.graph {
            options = options.graph(graph);
        }
        if let Some(section) = &self.section {
            options = options.section(section);
        }
        for (name, path) in &self.uploads {
            options = options.file(name, path);
        }
        for (key, value) in &self.env {
            options = options.env(key, value);
        }
        options
    }
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!(error = %err, "command failed");
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: &Cli) -> anyhow::Result<()> {
    let command = cli.command.join(" ");
    let client = BlockingClient::new(cli.client_config()).context("invalid connection settings")?;
    debug!(url = %cli.url, session = %client.session_id(), %command, "executing");

    let items = client
        .cli_execute(&command, &cli.cli_options())
        .with_context(|| format!("failed to execute `{command}`"))?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for item in items {
        let item = item.context("failed to read result")?;
        print_item(&mut out, &item)?;
    }
    out.flush()?;
    client.shutdown();
    Ok(())
}

fn print_item(out: &mut impl Write, item: &Value) -> io::Result<()> {
    match item {
        Value::String(text) => writeln!(out, "{text}"),
        other => {
            let pretty = serde_json::to_string_pretty(other).map_err(io::Error::other)?;
            writeln!(out, "{pretty}")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_words_are_collected() {
        let cli = Cli::parse_from(["carto-shell", "--no-verify", "search", "is(account)", "|", "count"]);
        assert_eq!(cli.command.join(" "), "search is(account) | count");
        assert!(cli.no_verify);
    }

    #[test]
    fn test_pairs_are_split_once() {
        assert_eq!(parse_pair("a=b=c").unwrap(), ("a".into(), "b=c".into()));
        assert!(parse_pair("nokey").is_err());
    }

    #[test]
    fn test_strings_print_raw() {
        let mut out = Vec::new();
        print_item(&mut out, &Value::String("hello".into())).unwrap();
        print_item(&mut out, &serde_json::json!({"a": 1})).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "hello\n{\n  \"a\": 1\n}\n");
    }

    #[test]
    fn test_options_carry_graph_and_uploads() {
        let cli = Cli::parse_from([
            "carto-shell",
            "--graph",
            "staging",
            "--upload",
            "nodes=/tmp/nodes.csv",
            "import",
        ]);
        let options = cli.cli_options();
        assert_eq!(options.graph.as_deref(), Some("staging"));
        assert_eq!(options.files["nodes"], PathBuf::from("/tmp/nodes.csv"));
        assert_eq!(cli.client_config().graph, "staging");
    }
}
