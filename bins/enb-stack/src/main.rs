mod shims;

use clap::Parser;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use enb_config::{toml_config, SharedConfig};
use enb_core::TtiPoint;
use enb_entities::Stack;
use enb_saps::events::StackEvent;

use shims::{LogPdcp, LogS1ap, LoopbackRlc};

/// Load configuration file
fn load_config_from_toml(cfg_path: &str) -> SharedConfig {
    match toml_config::from_file(cfg_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration from {}: {}", cfg_path, e);
            std::process::exit(1);
        }
    }
}

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "LTE eNB control-plane stack",
    long_about = "Runs the eNB control-plane stack (MAC scheduler + RRC) using the provided TOML configuration"
)]
struct Args {
    /// Config file (required)
    #[arg(help = "TOML config with station/cell parameters")]
    config: String,

    /// Stop after this many TTIs instead of running until Ctrl+C
    #[arg(long)]
    ttis: Option<u64>,

    /// CFI handed to the scheduler when the PHY offers no estimate
    #[arg(long, default_value_t = 3)]
    cfi: u8,
}

/// Drives the per-TTI scheduler the way the PHY would: one downlink and
/// one uplink invocation per carrier per millisecond, plus the timer tick.
fn tti_loop(stack: Arc<Stack>, running: Arc<AtomicBool>, max_ttis: Option<u64>, cfi: u8) {
    let cc_idxs: Vec<u32> = stack.mac().cells().iter().map(|c| c.cc_idx).collect();
    let tx = stack.sender();
    let mut count: u64 = 0;
    while running.load(Ordering::SeqCst) {
        let tti = TtiPoint::new((count % 10240) as u32);
        for &cc in &cc_idxs {
            if let Err(e) = stack.get_dl_sched(tti, cc, cfi) {
                tracing::error!("dl_sched cc={} failed: {:?}", cc, e);
            }
            if let Err(e) = stack.get_ul_sched(tti, cc) {
                tracing::error!("ul_sched cc={} failed: {:?}", cc, e);
            }
        }
        let _ = tx.send(StackEvent::TtiTick { tti });

        count += 1;
        if let Some(max) = max_ttis {
            if count >= max {
                running.store(false, Ordering::SeqCst);
                break;
            }
        }
        std::thread::sleep(Duration::from_millis(1));
    }
}

fn main() {
    let args = Args::parse();
    let cfg = load_config_from_toml(&args.config);
    let _log_guard = enb_core::debug::setup_logging_default(cfg.config().debug_log.clone());

    tracing::info!("eNB stack {} starting, {} cell(s)", enb_core::STACK_VERSION, cfg.config().cells.len());
    for cell in cfg.config().cells.iter() {
        tracing::info!("  {}", cell);
    }

    let rlc = Arc::new(LoopbackRlc::default());
    let pdcp = Arc::new(LogPdcp);
    let s1ap = Arc::new(LogS1ap);
    let stack = Arc::new(Stack::new(cfg, rlc, pdcp, s1ap));

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .expect("failed to set Ctrl+C handler");

    // PHY-side driver thread; the main thread is the dispatch consumer
    let tti_stack = stack.clone();
    let tti_running = running.clone();
    let tti_handle = std::thread::spawn(move || tti_loop(tti_stack, tti_running, args.ttis, args.cfi));

    stack.run(&running);
    tti_handle.join().expect("tti thread panicked");
    tracing::info!("eNB stack stopped");
}
