use std::{error::Error, process::ExitCode};

use clap::Parser;
use courier::{Client, ClientConfig, Configurable, LogLogger, Logger, Value};

#[derive(Debug, Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Server address as host:port
    address: String,
    /// Name of the remote service to call
    service: String,
    /// Call params as key=value pairs
    params: Vec<String>,
    /// Seconds to wait for a response [default: $COURIER_TIMEOUT or 60]
    #[arg(short, long)]
    timeout: Option<f64>,
    /// Print the status code and message instead of classifying the response
    #[arg(long)]
    raw: bool,
}

fn main() -> ExitCode {
    // Initialize env_logger; summary lines go out at info level
    env_logger::init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let (host, port) = cli
        .address
        .rsplit_once(':')
        .ok_or_else(|| format!("'{}' is not a host:port address", cli.address))?;
    let port: u16 = port.parse()?;

    let client = Client::new(ClientConfig::from_env(host, port));
    let mut runner = client.logger(Logger::new(LogLogger));
    if let Some(seconds) = cli.timeout {
        runner.timeout(seconds);
    }

    let params = parse_params(&cli.params)?;
    if cli.raw {
        let response = runner.call_with(&cli.service, params, |r| r)?;
        println!("{}", response.code);
        if let Some(message) = response.message {
            println!("{message}");
        }
        println!("{}", response.data);
    } else {
        println!("{}", runner.call(&cli.service, params)?);
    }

    Ok(())
}

fn parse_params(pairs: &[String]) -> Result<Value, String> {
    pairs
        .iter()
        .map(|pair| {
            pair.split_once('=')
                .map(|(key, raw)| (key.to_string(), parse_value(raw)))
                .ok_or_else(|| format!("invalid param '{pair}', expected key=value"))
        })
        .collect::<Result<Vec<_>, _>>()
        .map(|pairs| pairs.into_iter().collect())
}

fn parse_value(raw: &str) -> Value {
    if let Ok(b) = raw.parse::<bool>() {
        Value::Bool(b)
    } else if let Ok(i) = raw.parse::<i64>() {
        Value::Int(i)
    } else if let Ok(f) = raw.parse::<f64>() {
        Value::Float(f)
    } else {
        Value::String(raw.to_string())
    }
}
