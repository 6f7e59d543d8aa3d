use anyhow::{Context, Result, bail};
use clap::Parser;
use linepacer::{
    CompanionMessage, Engine, EngineConfig, HostContext, PlaybackEvent, PollStatus, PtyHost,
    StartRequest, dispatch, spawn_reader,
};
use linepacer::transport::EvalHook;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_HOST: &str = "tclsh";

/// Commands a bare `tclsh` lacks, so playback output is readable there.
const TCL_PRELUDE: &str = r#"proc echo {text {target ""}} { puts $text }; proc /msg {channel text} { puts "<$channel> $text" }"#;

#[derive(Parser, Debug)]
#[command(
    name = "linepacer",
    about = "Play a text file line by line into an interpreter or a chat client",
    version
)]
struct Args {
    /// Text file to play
    #[arg(short, long, required_unless_present = "line", conflicts_with = "line")]
    file: Option<PathBuf>,

    /// Deliver this single line instead of a file
    #[arg(short, long)]
    line: Option<String>,

    /// Destination channel; "status" targets the status window
    #[arg(short, long, default_value = "status")]
    channel: String,

    /// Milliseconds between lines
    #[arg(short, long, default_value_t = 1500)]
    interval: u64,

    /// Peer service to deliver to instead of the host interpreter
    #[arg(short, long)]
    service: Option<String>,

    /// Path to a TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Also read host commands (play, poll, version, ex, chan) from stdin
    #[arg(long)]
    interactive: bool,

    /// Log at debug level
    #[arg(short, long)]
    verbose: bool,

    /// Host interpreter and its arguments
    #[arg(trailing_var_arg = true)]
    host: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let config = match &args.config {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("Failed to load config: {}", path.display()))?,
        None => EngineConfig::default(),
    };
    let engine = Engine::new(config);

    let mut request = match (&args.file, &args.line) {
        (Some(path), _) => {
            let interval = i64::try_from(args.interval).context("Interval is too large")?;
            StartRequest::file(path.display().to_string(), interval)
        }
        (None, Some(line)) => StartRequest::line(line.as_str()),
        (None, None) => bail!("Either --file or --line is required"),
    };
    request = request.channel(args.channel.as_str());

    match &args.service {
        Some(service) => run_peer(&engine, request.service(service.as_str())).await,
        None => run_host(&engine, request, &args).await,
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "linepacer=debug" } else { "linepacer=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Drive a peer-bound playback until it ends.
async fn run_peer(engine: &Engine, request: StartRequest) -> Result<()> {
    let mut events = engine.subscribe();
    engine
        .try_start(request)
        .await
        .context("Failed to start playback")?;

    while engine.has_session().await {
        tokio::select! {
            event = events.recv() => match event {
                Ok(PlaybackEvent::Ended | PlaybackEvent::Stopped) => break,
                Ok(PlaybackEvent::Failed { reason }) => bail!("Playback aborted: {reason}"),
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break;
            }
        }
    }
    engine.shutdown().await;
    Ok(())
}

/// Host an interpreter in a PTY and feed it through the engine's poll.
async fn run_host(engine: &Engine, request: StartRequest, args: &Args) -> Result<()> {
    engine
        .try_start(request)
        .await
        .context("Failed to start playback")?;

    let (command, host_args) = match args.host.split_first() {
        Some((command, rest)) => (command.as_str(), rest),
        None => (DEFAULT_HOST, &[][..]),
    };
    let (mut host, reader) = match PtyHost::spawn(command, host_args) {
        Ok(spawned) => spawned,
        Err(err) => {
            engine.shutdown().await;
            return Err(err);
        }
    };
    let mut output = spawn_reader(reader);
    if command == DEFAULT_HOST {
        host.eval(TCL_PRELUDE.as_bytes())
            .context("Failed to prepare host interpreter")?;
    }

    let (companion, mut companion_requests) = mpsc::unbounded_channel::<CompanionMessage>();
    let mut stdin = args
        .interactive
        .then(|| BufReader::new(tokio::io::stdin()).lines());
    let mut ticker = tokio::time::interval(Duration::from_millis(engine.config().host.tick_ms.max(1)));

    let result = loop {
        tokio::select! {
            _ = ticker.tick() => match engine.poll(&mut host).await {
                PollStatus::Aborted(reason) => break Err(anyhow::anyhow!("Playback aborted: {reason}")),
                PollStatus::Idle if !args.interactive => break Ok(()),
                _ => {}
            },
            Some(chunk) = output.recv() => write_output(&chunk)?,
            line = next_line(&mut stdin) => match line.context("Failed to read stdin")? {
                Some(line) => {
                    let mut ctx = HostContext::new(engine, &mut host, &companion);
                    match dispatch(&line, &mut ctx).await {
                        Ok(Some(result)) => println!("{result}"),
                        Ok(None) => {}
                        Err(err) => warn!("{err:#}"),
                    }
                }
                None => break Ok(()),
            },
            Some(message) = companion_requests.recv() => {
                info!(?message, "companion request (no companion attached)");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                break Ok(());
            }
        }
    };

    engine.shutdown().await;
    // let the interpreter flush what it printed last
    tokio::time::sleep(Duration::from_millis(100)).await;
    while let Ok(chunk) = output.try_recv() {
        write_output(&chunk)?;
    }
    host.kill()?;
    result
}

async fn next_line(stdin: &mut Option<Lines<BufReader<Stdin>>>) -> std::io::Result<Option<String>> {
    match stdin {
        Some(lines) => lines.next_line().await,
        None => std::future::pending().await,
    }
}

fn write_output(data: &[u8]) -> Result<()> {
    let mut stdout = std::io::stdout();
    stdout.write_all(data)?;
    stdout.flush()?;
    Ok(())
}
