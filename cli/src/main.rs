//! Command-line front-end: parses device/image/breakpoint options, then
//! either serves the GDB remote protocol or free-runs the loaded program.

use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;

use anyhow::{ensure, Context, Result};
use avrsim_arch::{CoreOps, StepResult};
use avrsim_core::{device, Core};
use clap::Parser;
use log::{info, trace, warn};

/// Virtual AVR-like core simulator with a GDB remote serial protocol
/// debug server.
#[derive(Parser, Debug)]
#[command(name = "avrsim", version)]
struct Cli {
    /// Raw flash firmware image.
    image: Option<PathBuf>,

    /// MCU variant to simulate.
    #[arg(short = 'd', long = "device", default_value = "atmega328p")]
    device: String,

    /// List supported devices and exit.
    #[arg(short = 'L')]
    list_devices: bool,

    /// Enable the GDB remote serial protocol server.
    #[arg(short = 'g')]
    gdb: bool,

    /// TCP port for the GDB server.
    #[arg(short = 'p', long = "port", default_value_t = 1212)]
    port: u16,

    /// Log every RSP packet exchanged.
    #[arg(short = 'G')]
    trace_rsp: bool,

    /// EEPROM image to preload.
    #[arg(short = 'e', long = "eeprom")]
    eeprom: Option<PathBuf>,

    /// EEPROM image format; only `raw` is supported.
    #[arg(short = 'E', long = "eeprom-format", default_value = "raw")]
    eeprom_format: String,

    /// Flash image format; only `raw` is supported.
    #[arg(short = 'F', long = "flash-format", default_value = "raw")]
    flash_format: String,

    /// Preset a breakpoint at this byte address (repeatable).
    #[arg(short = 'B', long = "break")]
    breakpoints: Vec<String>,

    /// Cosmetic clock-frequency annotation in Hz.
    #[arg(short = 'c', long = "clock")]
    clock_hz: Option<u64>,

    /// On exit, write a core-dump file.
    #[arg(short = 'C')]
    core_dump: bool,
}

fn main() -> ExitCode {
    env_logger::init();
    let args = match Cli::try_parse() {
        Ok(args) => args,
        Err(e) => {
            // clap's own `exit()` maps usage errors to code 2 and --help/--version
            // to 0; map everything but help/version to 1 instead, per the spec's
            // "0 on clean exit, 1 on usage or fatal error" contract.
            let _ = e.print();
            return if e.exit_code() == 0 {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            };
        }
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("avrsim: error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<()> {
    trace!("{args:?}");

    if args.list_devices {
        for d in device::table() {
            println!("{}", d.name);
        }
        return Ok(());
    }

    ensure!(
        args.eeprom_format.eq_ignore_ascii_case("raw"),
        "unsupported EEPROM image format: {}",
        args.eeprom_format
    );
    ensure!(
        args.flash_format.eq_ignore_ascii_case("raw"),
        "unsupported flash image format: {}",
        args.flash_format
    );

    let variant =
        device::lookup(&args.device).with_context(|| format!("unknown device: {}", args.device))?;
    let mut core = Core::new(variant);

    if let Some(path) = &args.image {
        let image = load_image(path)?;
        core.load_flash(&image);
    }
    if let Some(path) = &args.eeprom {
        let image = load_image(path)?;
        core.load_eeprom(&image);
    }
    for addr in &args.breakpoints {
        let byte_addr = parse_addr(addr)?;
        core.insert_break(byte_addr / 2)
            .with_context(|| format!("could not set breakpoint at {addr}"))?;
    }
    if let Some(hz) = args.clock_hz {
        info!("clock frequency: {hz} Hz (cosmetic)");
    }

    let cancel =
        avrsim_gdbserver::install_cancel_handler().context("could not install Ctrl-C handler")?;

    if args.gdb {
        let config = avrsim_gdbserver::ServerConfig {
            port: args.port,
            trace: args.trace_rsp,
        };
        avrsim_gdbserver::serve(&mut core, &config, &cancel).context("gdb server failed")?;
    } else {
        ensure!(
            args.image.is_some(),
            "no flash image given and -g was not passed; nothing to run"
        );
        free_run(&mut core, &cancel);
    }

    if args.core_dump {
        let text = avrsim_core::dump::render(&core);
        fs::write("core_avr_dump.core", text).context("could not write core dump")?;
    }

    Ok(())
}

/// Runs the loaded program to completion (an illegal opcode, or
/// cancellation) with no attached debugger.
fn free_run(core: &mut Core, cancel: &std::sync::Arc<std::sync::atomic::AtomicBool>) {
    loop {
        match core.step() {
            Ok(StepResult::Ok(_) | StepResult::Break) => {}
            Err(e) => {
                warn!("halted at pc={:#06x}: {e}", core.read_pc());
                return;
            }
        }
        if cancel.swap(false, Ordering::SeqCst) {
            info!("interrupted");
            return;
        }
    }
}

fn load_image(path: &PathBuf) -> Result<Vec<u8>> {
    fs::read(path).with_context(|| format!("failed to read image: {}", path.display()))
}

fn parse_addr(s: &str) -> Result<u32> {
    let digits = s.strip_prefix("0x").unwrap_or(s);
    u32::from_str_radix(digits, 16).map_err(|_| {
        anyhow::anyhow!("invalid breakpoint address: {s} (expected a hex byte address)")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hex_addresses_with_or_without_prefix() {
        assert_eq!(parse_addr("0x100").unwrap(), 0x100);
        assert_eq!(parse_addr("100").unwrap(), 0x100);
        assert!(parse_addr("zz").is_err());
    }

    #[test]
    fn cli_accepts_known_flags() {
        let args = Cli::parse_from(["avrsim", "-d", "atmega8", "-g", "-p", "9000", "fw.bin"]);
        assert_eq!(args.device, "atmega8");
        assert!(args.gdb);
        assert_eq!(args.port, 9000);
        assert_eq!(args.image, Some(PathBuf::from("fw.bin")));
    }

    #[test]
    fn usage_error_maps_to_exit_code_one_not_claps_default_two() {
        // clap's own `exit_code()` would be 2 here; `main` maps any nonzero
        // code to `ExitCode::FAILURE` (1) instead of trusting it directly.
        let err = Cli::try_parse_from(["avrsim", "--not-a-flag"]).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert_ne!(err.exit_code(), 0, "main() maps this to ExitCode::FAILURE, not SUCCESS");
    }

    #[test]
    fn help_exit_code_is_zero() {
        let err = Cli::try_parse_from(["avrsim", "--help"]).unwrap_err();
        assert_eq!(err.exit_code(), 0);
    }
}
