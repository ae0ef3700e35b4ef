use std::io::{self, BufRead, BufReader, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use afkbot_client::client::Credential;
use afkbot_client::config::BotConfig;
use afkbot_client::transport::TcpConnector;
use afkbot_runner::logging::init_logging;
use afkbot_runner::{ConsoleBridge, SessionRunner};
use anyhow::{Context, bail};
use clap::Parser;
use tracing::info;

#[derive(Parser)]
#[command(version = env!("AFKBOT_VERSION"), about, long_about = None)]
pub struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Server host (overrides config)
    #[arg(long)]
    host: Option<String>,

    /// Server port (overrides config)
    #[arg(short, long)]
    port: Option<u16>,

    /// Player name (overrides config)
    #[arg(short, long)]
    username: Option<String>,

    /// Also write logs to a file in the data directory
    #[arg(long)]
    log_file: bool,

    /// Write the effective config to the default location and exit
    #[arg(long)]
    init_config: bool,
}

impl Cli {
    fn apply_overrides(&self, config: &mut BotConfig) {
        if let Some(host) = &self.host {
            config.server.host = host.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StartupError {
    #[error("no password entered, exiting")]
    NoCredential,
}

/// Ask for the shared secret used for /register and /login.
///
/// Empty input or end of input aborts startup.
fn prompt_secret(input: &mut impl BufRead, output: &mut impl Write) -> anyhow::Result<Credential> {
    write!(output, "Bot password (for /login and /register): ")?;
    output.flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let secret = line.trim_end_matches(['\r', '\n']);

    Ok(Credential::new(secret).ok_or(StartupError::NoCredential)?)
}

/// Read console lines on a plain thread. It is never joined, so a read
/// blocked on the terminal cannot keep the process alive after shutdown.
fn spawn_console<R>(bridge: ConsoleBridge, input: R) -> io::Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    thread::Builder::new()
        .name("console".to_string())
        .spawn(move || bridge.run(input))
}

fn init_config(config: &BotConfig) -> anyhow::Result<()> {
    let path = BotConfig::config_path();
    if path.exists() {
        bail!(
            "Config file already exists at {}. Edit it manually or delete it first.",
            path.display()
        );
    }
    config
        .save()
        .map_err(|e| anyhow::anyhow!("Failed to write config: {}", e))?;
    eprintln!("Config file created at: {}", path.display());
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let _log_guard = init_logging("cli", cli.log_file).context("Failed to initialize logging")?;

    let mut config =
        BotConfig::load_or_default(cli.config.as_deref()).context("Failed to load config")?;
    cli.apply_overrides(&mut config);

    if cli.init_config {
        return init_config(&config);
    }

    info!("Starting afkbot...");

    let credential = prompt_secret(&mut io::stdin().lock(), &mut io::stdout())?;

    let connector = Arc::new(TcpConnector::new(config.connect_timeout()));
    let runner = SessionRunner::new(connector, &config, credential);

    let console = ConsoleBridge::new(runner.active_session());
    spawn_console(console, BufReader::new(io::stdin())).context("Failed to start console")?;

    runner.run(None).await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_reads_one_line() {
        let mut input = &b"hunter2\r\nnext line\n"[..];
        let mut output = Vec::new();

        let credential = prompt_secret(&mut input, &mut output).unwrap();
        assert_eq!(credential.expose(), "hunter2");
        assert!(String::from_utf8(output).unwrap().contains("password"));
    }

    #[test]
    fn test_prompt_aborts_on_empty_or_eof() {
        for raw in [&b"\n"[..], &b""[..]] {
            let mut input = raw;
            let err = prompt_secret(&mut input, &mut Vec::new()).unwrap_err();
            assert!(matches!(
                err.downcast_ref::<StartupError>(),
                Some(StartupError::NoCredential)
            ));
        }
    }

    /// Input that blocks until its feeding side is dropped, like a terminal
    struct HeldOpenInput(std::sync::mpsc::Receiver<Vec<u8>>);

    impl io::Read for HeldOpenInput {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.0.recv() {
                Ok(bytes) => {
                    let n = bytes.len().min(buf.len());
                    buf[..n].copy_from_slice(&bytes[..n]);
                    Ok(n)
                }
                Err(_) => Ok(0),
            }
        }
    }

    #[test]
    fn test_runtime_shutdown_does_not_wait_for_console() {
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let (active, _) = tokio::sync::watch::channel(None);
        let (feed, input) = std::sync::mpsc::channel();

        let console = runtime.block_on(async {
            spawn_console(
                ConsoleBridge::new(active.subscribe()),
                BufReader::new(HeldOpenInput(input)),
            )
            .unwrap()
        });

        // The console thread is parked in a read; dropping the runtime
        // must still return
        drop(runtime);
        assert!(!console.is_finished());

        drop(feed);
        console.join().unwrap();
    }

    #[test]
    fn test_flags_override_config() {
        let cli = Cli::parse_from(["afkbot", "--host", "mc.example.net", "-p", "25570"]);
        let mut config = BotConfig::default();
        cli.apply_overrides(&mut config);

        assert_eq!(config.server.host, "mc.example.net");
        assert_eq!(config.server.port, 25570);
        assert_eq!(config.username, "BotAFK");
    }
}
