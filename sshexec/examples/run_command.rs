//! Run a single command on a remote host and print its result.
//!
//! # Usage
//!
//! ```bash
//! cargo run --example run_command -- --host build-01 --user deploy -- uname -a
//! ```
//!
//! With a specific key, skipping host key verification (lab use only):
//! ```bash
//! cargo run --example run_command -- --host 10.0.0.5 --key ~/.ssh/id_ed25519 --insecure -- 'df -h'
//! ```

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use sshexec::RemoteExecutor;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging (set RUST_LOG=debug for verbose output)
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    if args.command.is_empty() {
        eprintln!("Error: no command given");
        Args::print_help();
        std::process::exit(2);
    }

    let mut builder = RemoteExecutor::builder()
        .port(args.port)
        .connect_timeout(Duration::from_secs(args.timeout));
    if let Some(key) = &args.key {
        builder = builder.private_key(key);
    }
    if args.insecure {
        builder = builder.insecure_skip_host_key_check();
    }
    if args.no_pty {
        builder = builder.no_pty();
    }

    let executor = builder.build()?;
    let result = executor
        .execute(&args.user, &args.host, &args.command)
        .await?;

    print!("{}", result.stdout());
    eprint!("{}", result.stderr());
    if let Some(signal) = result.exit_signal() {
        eprintln!("killed by signal {}", signal);
    }

    std::process::exit(result.status());
}

/// Simple argument parser (avoiding external dependencies)
struct Args {
    host: String,
    port: u16,
    user: String,
    key: Option<PathBuf>,
    timeout: u64,
    insecure: bool,
    no_pty: bool,
    command: String,
}

impl Args {
    fn parse() -> Self {
        let args: Vec<String> = env::args().collect();
        let mut host = "localhost".to_string();
        let mut port = 22u16;
        let mut user = env::var("USER").unwrap_or_else(|_| "root".to_string());
        let mut key = None;
        let mut timeout = 30u64;
        let mut insecure = false;
        let mut no_pty = false;
        let mut command = Vec::new();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    i += 1;
                    if i < args.len() {
                        host = args[i].clone();
                    }
                }
                "--port" | "-p" => {
                    i += 1;
                    if i < args.len() {
                        port = args[i].parse().unwrap_or(22);
                    }
                }
                "--user" | "-u" => {
                    i += 1;
                    if i < args.len() {
                        user = args[i].clone();
                    }
                }
                "--key" | "-k" => {
                    i += 1;
                    if i < args.len() {
                        key = Some(PathBuf::from(&args[i]));
                    }
                }
                "--timeout" | "-t" => {
                    i += 1;
                    if i < args.len() {
                        timeout = args[i].parse().unwrap_or(30);
                    }
                }
                "--insecure" => insecure = true,
                "--no-pty" => no_pty = true,
                "--help" => {
                    Self::print_help();
                    std::process::exit(0);
                }
                "--" => {
                    command.extend(args[i + 1..].iter().cloned());
                    break;
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                }
            }
            i += 1;
        }

        Self {
            host,
            port,
            user,
            key,
            timeout,
            insecure,
            no_pty,
            command: command.join(" "),
        }
    }

    fn print_help() {
        println!(
            r#"sshexec run_command example

USAGE:
    cargo run --example run_command -- [OPTIONS] -- <COMMAND>...

OPTIONS:
    -h, --host <HOST>        Target host [default: localhost]
    -p, --port <PORT>        SSH port [default: 22]
    -u, --user <USER>        Username [default: $USER]
    -k, --key <PATH>         Path to SSH private key [default: ~/.ssh/id_rsa]
    -t, --timeout <SECS>     Connection timeout [default: 30]
    --insecure               Accept any host key
    --no-pty                 Run without a pseudo-terminal
    --help                   Print this help message
"#
        );
    }
}
