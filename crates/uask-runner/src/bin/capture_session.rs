use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::info;
use uask_agent::SessionSnapshot;
use uask_runner::operator::{self, Release};
use uask_runner::{logging, Settings};

/// Open a visible browser, let a human get past the disclaimer and CAPTCHA,
/// then save cookies and localStorage for later runs.
#[derive(Parser)]
#[command(name = "uask-capture-session")]
#[command(about = "Capture a browser session for reuse with --session-file")]
#[command(version)]
struct Cli {
    /// Page to open (defaults to the chat URL for LANGUAGE)
    #[arg(long)]
    url: Option<String>,

    /// Where to write the session
    #[arg(long, default_value = "session.json")]
    out: PathBuf,

    /// Capture automatically after this many seconds
    #[arg(long, default_value_t = 300)]
    wait_secs: u64,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

#[tokio::main]
async fn main() -> uask_runner::Result<()> {
    let cli = Cli::parse();
    let settings = Settings::load()?;

    let console = logging::console_directive(false, cli.verbose, &settings.log_level);
    let _guard = logging::init(&settings.logs_dir(), &console)?;

    let url = cli.url.clone().unwrap_or_else(|| settings.chat_url());
    let profile = settings.launch_profile().headless(false);
    let browser = profile.launch().await?;
    let page = browser.new_page(&url).await?;
    let driver = profile.driver(page);

    println!("Opened {}", url);
    println!("Dismiss the disclaimer, solve any CAPTCHA, then press Enter.");
    println!("(capturing automatically in {}s)", cli.wait_secs);

    let stdin = BufReader::new(tokio::io::stdin());
    match operator::wait_for_enter(stdin, Duration::from_secs(cli.wait_secs)).await {
        Release::Enter => info!("capturing on request"),
        Release::Elapsed => info!("wait elapsed; capturing"),
    }

    let snapshot = SessionSnapshot::capture(&driver).await?;
    snapshot.save(&cli.out)?;
    println!(
        "Saved {} cookies and {} storage entries to {}",
        snapshot.cookies.len(),
        snapshot.local_storage.len(),
        cli.out.display()
    );

    browser.close().await?;
    Ok(())
}
