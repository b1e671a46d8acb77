//! Command-line driver for the EFEX/FEL/FES protocol: argument parsing, hex
//! dumping, progress reporting, and the file I/O glue for `read`/`write`.
//! No protocol logic lives here — everything below calls into `efex_core`.

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use env_logger::Env;
use log::Level;

use efex_core::{Error, Session};
use efex_usb::UsbBackendKind;

use crate::progress_bar::ProgressBarReporter;

mod progress_bar;

#[derive(Parser, Debug)]
#[clap(version, about, long_about = None, author = "Bjorn Beishline")]
struct Opts {
    /// Verbose: raise the log filter from info to debug
    #[clap(short, long)]
    verbose: bool,

    /// Payload architecture (arm, aarch64, riscv, e907). Switches
    /// read32/write32 to payload-injected RPC instead of direct FEL access.
    #[clap(short = 'p', long, value_parser = arch_parser)]
    payload: Option<String>,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the device's chip id, firmware version, mode, and scratch RAM base
    Version,
    /// Hex+ASCII dump of device memory
    Hexdump {
        #[clap(value_parser = num_parser)]
        addr: u32,
        #[clap(value_parser = num_parser)]
        len: u32,
    },
    /// Binary dump of device memory to stdout
    Dump {
        #[clap(value_parser = num_parser)]
        addr: u32,
        #[clap(value_parser = num_parser)]
        len: u32,
    },
    /// Read a 32-bit word
    Read32 {
        #[clap(value_parser = num_parser)]
        addr: u32,
    },
    /// Write a 32-bit word
    Write32 {
        #[clap(value_parser = num_parser)]
        addr: u32,
        #[clap(value_parser = num_parser)]
        value: u32,
    },
    /// Read `len` bytes starting at `addr` into `file`
    Read {
        #[clap(value_parser = num_parser)]
        addr: u32,
        #[clap(value_parser = num_parser)]
        len: u32,
        file: String,
    },
    /// Write the contents of `file` to `addr`
    Write {
        #[clap(value_parser = num_parser)]
        addr: u32,
        file: String,
    },
    /// Execute code at `addr`
    Exec {
        #[clap(value_parser = num_parser)]
        addr: u32,
    },
}

/// Accepts decimal or `0x`-prefixed hex, used for every numeric argument
/// this CLI takes (addresses, lengths, values).
fn num_parser(s: &str) -> Result<u32, String> {
    let trimmed = s.trim();
    if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        u32::from_str_radix(hex, 16).map_err(|_| format!("Invalid address: {s}"))
    } else {
        trimmed.parse::<u32>().map_err(|_| format!("Invalid address: {s}"))
    }
}

fn arch_parser(s: &str) -> Result<String, String> {
    if efex_core::payload::arch_from_name(s).is_some() {
        Ok(s.to_string())
    } else {
        Err(format!(
            "unknown payload architecture '{s}' (expected arm, aarch64, riscv, or e907)"
        ))
    }
}

fn init_logging(verbose: bool) {
    if verbose {
        env_logger::Builder::from_env(Env::default().default_filter_or("debug")).init();
    } else {
        env_logger::Builder::from_env(Env::default().default_filter_or("info"))
            .format(|buf, record| {
                let level = record.level();
                if level == Level::Info {
                    writeln!(buf, "{}", record.args())
                } else {
                    writeln!(buf, "{}: {}", record.level(), record.args())
                }
            })
            .init();
    }
}

/// Exit codes: 0 success, 1 usage/argument error, 2 device not found, 3 USB
/// init failure, 4 EFEX init failure, 5 operation failure.
fn classify_open_error(err: &Error) -> u8 {
    match err {
        Error::Usb(efex_usb::Error::DeviceNotFound { .. }) => 2,
        Error::Usb(_) => 3,
        _ => 4,
    }
}

fn main() -> ExitCode {
    let opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(err) => {
            eprintln!("{err}");
            return ExitCode::from(1);
        }
    };

    init_logging(opts.verbose);

    let mut session = match Session::open(UsbBackendKind::Auto) {
        Ok(session) => session,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::from(classify_open_error(&err));
        }
    };

    if let Some(name) = opts.payload.as_deref() {
        if let Some(arch) = efex_core::payload::arch_from_name(name) {
            session.init_payloads(arch);
        }
    }

    let result = run(&mut session, &opts.command);
    session.close();

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            ExitCode::from(5)
        }
    }
}

fn run(session: &mut Session, command: &Command) -> efex_core::Result<()> {
    match command {
        Command::Version => {
            let resp = session.device_response();
            println!("mode:         {}", session.mode().as_str());
            println!("chip id:      {:#010x}", resp.id);
            println!("firmware:     {:#010x}", resp.firmware);
            println!("scratch ram:  {:#010x}", resp.data_start_address);
            Ok(())
        }
        Command::Hexdump { addr, len } => {
            let mut buf = vec![0u8; *len as usize];
            efex_core::fel::read(session, *addr, &mut buf)?;
            hexdump(*addr, &buf);
            Ok(())
        }
        Command::Dump { addr, len } => {
            #[cfg(windows)]
            set_stdout_binary();

            let mut buf = vec![0u8; *len as usize];
            efex_core::fel::read(session, *addr, &mut buf)?;
            io::stdout().write_all(&buf).map_err(Error::FileWrite)?;
            Ok(())
        }
        Command::Read32 { addr } => {
            let value = if session.has_payload_arch() {
                session.payload_readl(*addr)?
            } else {
                let mut buf = [0u8; 4];
                efex_core::fel::read(session, *addr, &mut buf)?;
                u32::from_le_bytes(buf)
            };
            println!("{value:#010x}");
            Ok(())
        }
        Command::Write32 { addr, value } => {
            if session.has_payload_arch() {
                session.payload_writel(*value, *addr)?;
            } else {
                efex_core::fel::write(session, *addr, &value.to_le_bytes())?;
            }
            Ok(())
        }
        Command::Read { addr, len, file } => {
            let mut buf = vec![0u8; *len as usize];
            let mut progress = ProgressBarReporter::new();
            efex_core::fel::read_with_progress(session, *addr, &mut buf, &mut progress)?;

            let out = File::create(file).map_err(Error::FileWrite)?;
            BufWriter::new(out).write_all(&buf).map_err(Error::FileWrite)?;
            Ok(())
        }
        Command::Write { addr, file } => {
            let mut buf = Vec::new();
            File::open(file)
                .map_err(Error::FileOpen)?
                .read_to_end(&mut buf)
                .map_err(Error::FileRead)?;

            let mut progress = ProgressBarReporter::new();
            efex_core::fel::write_with_progress(session, *addr, &buf, &mut progress)
        }
        Command::Exec { addr } => efex_core::fel::exec(session, *addr),
    }
}

/// 16 bytes per line: offset, hex, ASCII. Grounded on `efex_usb::trace`'s
/// diagnostic dump, minus the `log::trace!` gate — this one always prints
/// to stdout, since it *is* the `hexdump` subcommand's output.
fn hexdump(base_addr: u32, buf: &[u8]) {
    for (i, chunk) in buf.chunks(16).enumerate() {
        let mut hex = String::with_capacity(16 * 3);
        let mut ascii = String::with_capacity(16);
        for byte in chunk {
            hex.push_str(&format!("{byte:02x} "));
            ascii.push(if byte.is_ascii_graphic() || *byte == b' ' {
                *byte as char
            } else {
                '.'
            });
        }
        println!("{:08x}  {:<48} {}", base_addr as usize + i * 16, hex, ascii);
    }
}

/// Windows text-mode stdio translates `\n` to `\r\n` unless switched to
/// binary mode, which would corrupt `dump`'s raw byte stream. Translated
/// from the original C `_setmode(_fileno(stdout), _O_BINARY)`.
#[cfg(windows)]
fn set_stdout_binary() {
    unsafe extern "C" {
        fn _setmode(fd: i32, mode: i32) -> i32;
    }
    const STDOUT_FILENO: i32 = 1;
    const O_BINARY: i32 = 0x8000;
    unsafe {
        _setmode(STDOUT_FILENO, O_BINARY);
    }
}
