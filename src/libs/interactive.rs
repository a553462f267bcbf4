#![allow(dead_code)]

use std::io::{self, Write as _};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crate::libs::console::Console;
use crate::libs::error::RspResult;
use crate::libs::executor::{execute, run_script};
use crate::libs::filter_names::describe_filter;
use crate::libs::target_control::TargetControl;

const KEY_POLL_INTERVAL: Duration = Duration::from_millis(50);
const STATUS_REFRESH_INTERVAL: Duration = Duration::from_millis(350);

/// Drives the persistent-mode key-dispatch table against a
/// `TargetControl`, polling the keyboard roughly every 50 ms and
/// refreshing a status line roughly every 350 ms.
pub struct InteractiveLoop {
    target: TargetControl,
    console: Console,
    start_script: Option<PathBuf>,
    decode_script: Option<PathBuf>,
    filter_names: Vec<Option<String>>,
    benchmark_csv: PathBuf,
    last_error: Option<String>,
}

impl InteractiveLoop {
    pub fn new(
        target: TargetControl,
        console: Console,
        start_script: Option<PathBuf>,
        decode_script: Option<PathBuf>,
        filter_names: Vec<Option<String>>,
        benchmark_csv: PathBuf,
    ) -> InteractiveLoop {
        InteractiveLoop {
            target,
            console,
            start_script,
            decode_script,
            filter_names,
            benchmark_csv,
            last_error: None,
        }
    }

    /// Runs until the user confirms exit via `Esc` then `Y`.
    pub fn run(mut self) {
        let mut last_key_poll = Instant::now();
        let mut last_status = Instant::now();
        let mut awaiting_exit_confirm = false;

        loop {
            self.target.session_mut().drain_unsolicited();

            if last_key_poll.elapsed() >= KEY_POLL_INTERVAL {
                last_key_poll = Instant::now();
                if let Some(key) = self.console.poll() {
                    if awaiting_exit_confirm {
                        if key == b'Y' || key == b'y' {
                            break;
                        }
                        awaiting_exit_confirm = false;
                    } else if key == 0x1b {
                        println!("Exit? (Y to confirm)");
                        awaiting_exit_confirm = true;
                    } else {
                        self.dispatch(key);
                    }
                }
            }

            if last_status.elapsed() >= STATUS_REFRESH_INTERVAL {
                last_status = Instant::now();
                self.print_status();
            }
        }
    }

    fn dispatch(&mut self, key: u8) {
        let result: RspResult<()> = match key {
            b'?' => {
                print_help();
                Ok(())
            }
            b' ' => self.cmd_snapshot(),
            b'F' | b'f' => self.cmd_set_filter(),
            b'S' | b's' => self.target.switch_to_single_shot(),
            b'P' | b'p' => self.target.switch_to_post_mortem(),
            b'H' | b'h' => self.cmd_header_summary(),
            b'B' | b'b' => self
                .target
                .benchmark(&self.console, &self.benchmark_csv)
                .map(|_| ()),
            b'L' | b'l' => {
                println!("file logging toggle is handled by the external logger collaborator");
                Ok(())
            }
            b'0' => self.cmd_run_start_script(),
            b'1'..=b'9' => self.cmd_run_numbered_script(key - b'0'),
            b'R' | b'r' => {
                println!("reconnect requested; not implemented in this session");
                Ok(())
            }
            _ => {
                println!("Unknown command");
                Ok(())
            }
        };

        if let Err(e) = result {
            log::error!("command failed: {}", e);
            self.last_error = Some(e.to_string());
            println!("error: {}", e);
        }
    }

    fn cmd_snapshot(&mut self) -> RspResult<()> {
        self.target.snapshot()?;
        if let Some(decode_path) = &self.decode_script {
            invoke_decoder(decode_path);
        }
        Ok(())
    }

    fn cmd_set_filter(&mut self) -> RspResult<()> {
        print!("new filter hex (Enter = keep current): ");
        io::stdout().flush().ok();
        let mut input = String::new();
        if io::stdin().read_line(&mut input).is_err() {
            return Ok(());
        }
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Ok(());
        }
        let parsed = u32::from_str_radix(trimmed.trim_start_matches("0x"), 16)
            .map_err(|_| crate::libs::error::RspError::BadInput)?;
        self.target.set_filter_override(Some(parsed));
        self.target.restore_filter(parsed)
    }

    fn cmd_header_summary(&mut self) -> RspResult<()> {
        self.target.load_header()?;
        if let Some(header) = self.target.header() {
            println!(
                "last_index={} filter={:#010x} ({}) buffer_size={}",
                header.last_index,
                header.filter,
                describe_filter(header.filter, &self.filter_names),
                header.buffer_size
            );
        }
        Ok(())
    }

    fn cmd_run_start_script(&mut self) -> RspResult<()> {
        match self.start_script.clone() {
            Some(path) => run_script(&mut self.target, &path),
            None => {
                println!("no -start script configured");
                Ok(())
            }
        }
    }

    fn cmd_run_numbered_script(&mut self, n: u8) -> RspResult<()> {
        let path = PathBuf::from(format!("{}.cmd", n));
        run_script(&mut self.target, &path)
    }

    fn print_status(&mut self) {
        if let Some(header) = self.target.header() {
            let fill = if header.rte_cfg().single_shot_active() && header.buffer_size > 0 {
                format!(
                    " fill={:.1}%",
                    header.last_index as f64 / header.buffer_size as f64 * 100.0
                )
            } else {
                String::new()
            };
            println!(
                "status: last_index={} filter={:#010x}{}",
                header.last_index, header.filter, fill
            );
        }
    }
}

fn print_help() {
    println!(
        "?       print this help\n\
         Space   run snapshot\n\
         F       set filter\n\
         S       switch to single-shot\n\
         P       switch to post-mortem\n\
         H       load header and print summary\n\
         B       run benchmark\n\
         L       toggle file logging\n\
         0       re-run -start script\n\
         1-9     run N.cmd script\n\
         R       reconnect\n\
         Esc     exit (with confirmation)"
    );
}

/// Invokes the decoder batch file named by `-decode=FILE`.
///
/// The decoder itself is out of scope (spec.md §1 places "the decoder
/// batch-file invocation" among the external collaborators); this just
/// runs it as a subprocess and logs the outcome.
fn invoke_decoder(path: &Path) {
    match std::process::Command::new(path).status() {
        Ok(status) if status.success() => log::info!("decoder finished: {:?}", path),
        Ok(status) => log::warn!("decoder exited with {:?}", status),
        Err(e) => log::warn!("failed to invoke decoder {:?}: {}", path, e),
    }
}
