use std::io::{self, BufRead, Write as _};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::Context;
use clap::Parser;

use card::{Card, CardConfig};
use firmware::console::{Console, Outcome};
use firmware::transport::SharedIcc;
use firmware::wake::{NoopCpuFreq, Waker};
use firmware::{u2f, usb};

#[derive(Parser)]
#[command(about = "USB security token firmware")]
struct Args {
    /// Path to the TOML card bundle (personalization data + armored secret key).
    #[arg(long, default_value = "card.toml")]
    config: PathBuf,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    let raw = std::fs::read_to_string(&args.config)
        .with_context(|| format!("reading card config {}", args.config.display()))?;
    let config: CardConfig = toml::from_str(&raw).context("parsing card config")?;

    // No real SNVS-backed master is available on this host; SoftwareMaster
    // stands in regardless of `config.snvs` (see DESIGN.md).
    let master = Box::new(keywrap::SoftwareMaster::default());
    let card = Arc::new(Mutex::new(Card::new(config, master).context("loading card identity")?));

    for iface in usb::INTERFACES {
        tracing::debug!(?iface, "composite interface registered");
    }

    let waker = Arc::new(Waker::new(Arc::new(NoopCpuFreq)));
    let u2f = Arc::new(u2f::StubU2f::new());
    let console = Console::new(card.clone(), u2f, waker.clone());

    // The CCID endpoint is driven by the (out-of-scope) USB gadget driver;
    // SharedIcc is the seam it would call into via ccid::rx.
    let _ccid = SharedIcc::new(card, waker);

    tracing::info!("management console ready");
    run_console(&console)
}

/// Stands in for the real SSH transport (out of scope): an interactive
/// stdin/stdout loop driving the same command dispatcher.
fn run_console(console: &Console) -> anyhow::Result<()> {
    let stdin = io::stdin();
    let mut stdout = io::stdout();

    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        match console.handle(&line) {
            Outcome::Reply(text) => {
                if !text.is_empty() {
                    println!("{text}");
                }
            }
            Outcome::Exit => break,
        }
        print!("> ");
        stdout.flush()?;
    }
    Ok(())
}
