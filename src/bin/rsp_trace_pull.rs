use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use clap_num::maybe_hex;
use ctrlc;

use rsp_trace_tools::libs::common::hex_parser;
use rsp_trace_tools::libs::console::Console;
use rsp_trace_tools::libs::executor::run_script;
use rsp_trace_tools::libs::filter_names::load_filter_names;
use rsp_trace_tools::libs::interactive::InteractiveLoop;
use rsp_trace_tools::libs::session::Session;
use rsp_trace_tools::libs::target_control::{Parameters, TargetControl};

/// Struct representing the CLI arguments
///
/// `log`, `priority`, and `driver` are accepted for compatibility with
/// the external log-file/process-priority/helper-process collaborators
/// (out of scope per this repository's core) and are not otherwise
/// read here.
#[allow(dead_code)]
#[derive(Parser, Debug)]
#[command(
    about = "Pull a header+circular-buffer log structure off a target over GDB RSP.",
    long_about = None,
    after_help = " Example usage - one-shot pull from a running target:\n
                    rsp-trace-pull 3333 0x24000000 0 -bin=data.bin"
)]
struct Cli {
    /// TCP port of the GDB server.
    port: u16,
    /// Hex, word-aligned address of the target structure.
    #[arg(value_parser = maybe_hex::<u64>)]
    addr: u64,
    /// Hex total structure size, or 0 to trust the header's buffer_size.
    #[arg(value_parser = maybe_hex::<u64>)]
    size: u64,

    #[arg(long = "bin", default_value = "data.bin")]
    bin: PathBuf,
    #[arg(long = "filter", value_parser = hex_parser)]
    filter: Option<u32>,
    #[arg(long = "filter_names")]
    filter_names: Option<PathBuf>,
    #[arg(long = "clear", action = ArgAction::SetTrue)]
    clear: bool,
    #[arg(short = 'p', long = "persistent", action = ArgAction::SetTrue)]
    persistent: bool,
    #[arg(long = "delay", default_value_t = 0)]
    delay: u64,
    #[arg(long = "ip", default_value = "127.0.0.1")]
    ip: Ipv4Addr,
    #[arg(long = "log")]
    log: Option<PathBuf>,
    #[arg(long = "start")]
    start: Option<PathBuf>,
    #[arg(long = "detach", action = ArgAction::SetTrue)]
    detach: bool,
    #[arg(long = "decode")]
    decode: Option<PathBuf>,
    #[arg(long = "debug", action = ArgAction::SetTrue)]
    debug: bool,
    #[arg(long = "priority", action = ArgAction::SetTrue)]
    priority: bool,
    #[arg(long = "driver", action = ArgAction::Append, num_args = 1..=5)]
    driver: Vec<String>,
    #[arg(long = "msgsize")]
    msgsize: Option<u32>,
}

fn init_logging(debug: bool) {
    if debug && std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "rsp_trace_tools=debug");
    }
    env_logger::init();
}

fn run(cli: Cli) -> rsp_trace_tools::libs::error::RspResult<()> {
    let msgsize = cli.msgsize.filter(|n| (256..=65535).contains(n));
    let session = Session::connect(cli.ip, cli.port, msgsize)?;

    let params = Parameters {
        start_address: cli.addr,
        size: cli.size,
        filter_override: cli.filter,
        clear: cli.clear,
        delay_ms: cli.delay,
        bin_path: cli.bin.clone(),
    };
    let mut target = TargetControl::new(session, params);

    if let Some(start_path) = &cli.start {
        run_script(&mut target, start_path)?;
    }

    if cli.persistent {
        let filter_names = match &cli.filter_names {
            Some(path) => load_filter_names(path)?,
            None => vec![None; rsp_trace_tools::libs::filter_names::FILTER_BIT_COUNT],
        };
        let console = Console::new();
        let loop_ = InteractiveLoop::new(
            target,
            console,
            cli.start.clone(),
            cli.decode.clone(),
            filter_names,
            PathBuf::from("speed_test.csv"),
        );
        loop_.run();
    } else {
        target.snapshot()?;
    }

    if cli.detach {
        target.session_mut().detach();
    }
    target.session_mut().cleanup();

    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    ctrlc::set_handler(|| {
        log::info!("keyboard interrupt received (ctrl+C), exiting");
        std::process::exit(130);
    })
    .expect("Error setting Ctrl-C handler");

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}
