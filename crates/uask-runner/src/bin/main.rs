use clap::Parser;
use std::path::PathBuf;
use uask_runner::{logging, Engine, Language, Params, Runner, Settings, Suite};

#[derive(Parser)]
#[command(name = "uask-runner")]
#[command(about = "Run U-Ask chatbot QA suites")]
#[command(version)]
struct Cli {
    /// Suite file to run
    suite: PathBuf,

    /// Browser engine (only chromium can be driven)
    #[arg(long, value_name = "NAME")]
    browser: Option<String>,

    /// Run in headless mode (overrides HEADLESS and the suite)
    #[arg(long)]
    headless: bool,

    /// Chat language: en or ar (overrides TEST_LANGUAGE)
    #[arg(long, value_name = "LANG")]
    language: Option<String>,

    /// Delay after every page action, in milliseconds
    #[arg(long, value_name = "MS")]
    slow_mo: Option<u64>,

    /// Launch a patched Chrome with a desktop user agent
    #[arg(long)]
    stealth: bool,

    /// Session file saved by uask-capture-session
    #[arg(long, value_name = "PATH")]
    session_file: Option<PathBuf>,

    /// Test-data fixture (overrides TEST_DATA_FILE)
    #[arg(long, value_name = "PATH")]
    data: Option<PathBuf>,

    /// Set a parameter (can be used multiple times)
    #[arg(short = 'P', long = "param", value_name = "KEY=VALUE")]
    params: Vec<String>,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Validate the suite without running
    #[arg(long)]
    check: bool,

    /// Quiet mode (only errors)
    #[arg(short, long)]
    quiet: bool,
}

impl Cli {
    fn apply(&self, settings: &mut Settings) -> uask_runner::Result<()> {
        if let Some(ref name) = self.browser {
            settings.engine = name.parse::<Engine>()?;
        }
        if let Some(ref lang) = self.language {
            settings.language = lang.parse::<Language>()?;
        }
        if let Some(ms) = self.slow_mo {
            settings.slow_mo_ms = ms;
        }
        if let Some(ref path) = self.data {
            settings.test_data_file = path.clone();
        }
        settings.headless |= self.headless;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> uask_runner::Result<()> {
    let cli = Cli::parse();

    let mut settings = Settings::load()?;
    cli.apply(&mut settings)?;

    let console = logging::console_directive(cli.quiet, cli.verbose, &settings.log_level);
    let guard = logging::init(&settings.logs_dir(), &console)?;

    let params = settings.params().merge(Params::from_args(&cli.params)?);
    let mut suite = Suite::load_with_params(&cli.suite, &params)?;

    if cli.check {
        println!("Suite valid: {}", suite.name);
        println!("  Target: {}", suite.target.url);
        println!("  Cases: {}", suite.cases.len());
        for case in &suite.cases {
            println!("    - {} ({} steps)", case.name, case.steps.len());
        }
        if !suite.params.is_empty() {
            println!("  Parameters: {}", suite.params.len());
            for (name, def) in &suite.params {
                let req = if def.required { " (required)" } else { "" };
                let desc = def.description.as_deref().unwrap_or("");
                println!("    - {}{}: {}", name, req, desc);
            }
        }
        let (retry, screenshot) = suite.failure_policy(&settings);
        println!("  Attempts per case: {}", retry.attempts);
        println!("  Failure screenshots: {}", screenshot);
        if suite.uses_test_data() {
            println!("  Test data: {}", settings.test_data_file.display());
        }
        return Ok(());
    }

    suite.browser.stealth |= cli.stealth;

    println!("Running: {} ({}, {})", suite.name, settings.engine, settings.language);

    let mut runner = Runner::launch(&suite, &settings).await?;
    if let Some(ref path) = cli.session_file {
        runner = runner.with_session_file(path)?;
    }
    let result = runner.run(&suite).await;
    runner.close().await?;
    let result = result?;

    println!();
    for case in &result.results {
        if case.success {
            println!("✓ {} ({}ms)", case.name, case.duration_ms);
        } else {
            println!("✗ {}", case.name);
            if let Some(ref error) = case.error {
                println!("  Error: {}", error);
            }
            println!("  Steps completed: {}", case.steps_executed);
            if let Some(ref shot) = case.screenshot {
                println!("  Screenshot: {}", shot.display());
            }
        }
        if case.retries > 0 {
            println!("  Retries: {}", case.retries);
        }
    }
    println!();
    println!(
        "{} passed, {} failed ({})",
        result.passed(),
        result.failed(),
        settings.summary_path().display()
    );

    if !result.success() {
        drop(guard);
        std::process::exit(1);
    }

    Ok(())
}
