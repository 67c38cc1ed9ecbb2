use anyhow::{bail, Context};
use chime::notification::{Action, Priority};
use chime::plugins::frontends::socket::{Request, Response, DEFAULT_ADDRESS};
use clap::{Parser, ValueEnum};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

#[derive(Parser, Debug)]
#[command(name = "chime-send")]
#[command(about = "Send a notification to a running chime daemon")]
#[command(version)]
struct Cli {
    title: String,

    #[arg(default_value = "")]
    text: String,

    /// Application name the notification is sent as
    #[arg(short, long, default_value = "chime-send")]
    app: String,

    /// Icon file path or http(s) URL
    #[arg(short, long)]
    icon: Option<String>,

    #[arg(short, long, value_enum)]
    priority: Option<PriorityArg>,

    /// Seconds until the notification closes; 0 keeps it open
    #[arg(short, long)]
    timeout: Option<u64>,

    /// Action label, repeatable. Actions are numbered from 1.
    #[arg(long = "action")]
    actions: Vec<String>,

    /// Wait until the notification is closed and print what happened
    #[arg(short, long)]
    wait: bool,

    #[arg(long, default_value = DEFAULT_ADDRESS)]
    address: String,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum PriorityArg {
    Lowest,
    Low,
    Normal,
    High,
    Emergency,
}

impl From<PriorityArg> for Priority {
    fn from(value: PriorityArg) -> Self {
        match value {
            PriorityArg::Lowest => Priority::Lowest,
            PriorityArg::Low => Priority::Low,
            PriorityArg::Normal => Priority::Normal,
            PriorityArg::High => Priority::High,
            PriorityArg::Emergency => Priority::Emergency,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let request = Request::Notify {
        application: cli.app,
        title: cli.title,
        text: cli.text,
        icon: cli.icon,
        priority: cli.priority.map(Priority::from),
        timeout: cli.timeout,
        actions: cli
            .actions
            .iter()
            .enumerate()
            .map(|(i, name)| Action::new(i as u32 + 1, name.clone()))
            .collect(),
    };

    let stream = TcpStream::connect(&cli.address)
        .await
        .with_context(|| format!("is chime running? cannot connect to {}", cli.address))?;
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    write.write_all(line.as_bytes()).await?;
    log::debug!("Sent {}", line.trim_end());

    let id = match next_response(&mut lines).await? {
        Response::Accepted { id } => id,
        Response::Rejected { reason } => bail!("notification rejected: {}", reason),
        other => bail!("unexpected response: {:?}", other),
    };
    println!("{}", id);

    if !cli.wait {
        return Ok(());
    }
    loop {
        match next_response(&mut lines).await? {
            Response::ActionInvoked { action: Some(action), .. } => println!("action {}", action.name),
            Response::ActionInvoked { action: None, .. } => println!("activated"),
            Response::Closed { reason, .. } => {
                println!("closed: {}", reason);
                return Ok(());
            }
            other => log::debug!("Ignoring {:?}", other),
        }
    }
}

async fn next_response(
    lines: &mut tokio::io::Lines<BufReader<tokio::net::tcp::OwnedReadHalf>>,
) -> anyhow::Result<Response> {
    let line = lines
        .next_line()
        .await?
        .context("daemon closed the connection")?;
    Ok(serde_json::from_str(&line)?)
}
