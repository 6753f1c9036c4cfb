//! Command-line tool for flashing firmware, uploading fonts/VM programs, and
//! driving one-off device operations against an OSD co-processor.

use std::fs::File;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::LevelFilter;
use pixelosd_core::{from_uri, parse_mcm, Arg, Session, SessionOptions};

#[derive(Parser, Debug)]
#[command(name = "pixelosd-tool", about = "Driver tool for an OSD co-processor")]
struct Cli {
	/// OSD port: either a serial device path (e.g. /dev/ttyUSB0) or a host:port pair.
	port: String,

	/// Print debugging information.
	#[arg(long)]
	debug: bool,

	/// Print all data sent/received.
	#[arg(long)]
	trace: bool,

	/// Font file to upload.
	#[arg(long, value_name = "PATH")]
	upload_font: Option<PathBuf>,

	/// Program file to upload for the VM.
	#[arg(long, value_name = "PATH")]
	upload_program: Option<PathBuf>,

	/// Download the VM program and store it in the given file.
	#[arg(long, value_name = "PATH")]
	download_program: Option<PathBuf>,

	/// Start the currently-uploaded VM program.
	#[arg(long)]
	start_program: bool,

	/// Erase firmware.
	#[arg(long)]
	erase: bool,

	/// Firmware update file to flash.
	#[arg(long, value_name = "PATH")]
	flash: Option<PathBuf>,

	/// Skip rebooting into bootloader mode before flashing.
	#[arg(long)]
	flash_nr: bool,

	/// Connect to the OSD and print its hardware version.
	#[arg(long)]
	hw_version: bool,

	/// Reboot the OSD.
	#[arg(long)]
	reboot: bool,

	/// Reboot the OSD and stay in bootloader mode.
	#[arg(long)]
	reboot_to_bootloader: bool,

	/// Use MSP passthrough via INAV/Betaflight to reach the OSD.
	#[arg(long)]
	msp_passthrough: bool,

	/// Upload a program to the VM and start it.
	#[arg(long, value_name = "PATH")]
	run: Option<PathBuf>,

	/// Run a function from the VM program. Syntax: "<name>[,arg1]...[,argn]".
	#[arg(long, value_name = "NAME[,ARG]...")]
	run_function: Option<String>,
}

fn init_logging(cli: &Cli) {
	let mut builder = env_logger::Builder::from_default_env();
	if std::env::var("RUST_LOG").is_err() {
		let floor = if cli.trace {
			LevelFilter::Trace
		} else if cli.debug {
			LevelFilter::Debug
		} else {
			LevelFilter::Info
		};
		builder.filter_level(floor);
	}
	builder.init();
}

fn run(cli: &Cli) -> Result<()> {
	let transport = from_uri(&cli.port, pixelosd_core::DEFAULT_BAUD_RATE)
		.with_context(|| format!("opening {}", cli.port))?;
	let opts = SessionOptions { trace: cli.trace, debug: cli.debug, msp_passthrough: cli.msp_passthrough, ..Default::default() };
	let mut session = Session::new(transport, pixelosd_core::DEFAULT_BAUD_RATE, opts);

	if cli.reboot || cli.reboot_to_bootloader {
		session.connect(false)?;
		if cli.reboot_to_bootloader {
			session.reboot_to_bootloader()?;
		} else {
			session.reboot()?;
		}
	}

	if cli.erase {
		session.connect(false)?;
		session.erase_firmware()?;
	}

	if let Some(path) = &cli.flash {
		session.connect(false)?;
		let firmware = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
		session.flash_firmware(&firmware, !cli.flash_nr)?;
	}

	if let Some(path) = &cli.upload_font {
		session.connect(false)?;
		let file = File::open(path).with_context(|| format!("reading {}", path.display()))?;
		let font_bytes = parse_mcm(BufReader::new(file))?;
		session.upload_font(&font_bytes, |addr| log::debug!("uploaded glyph at {addr}"))?;
	}

	if let Some(path) = &cli.upload_program {
		session.connect(false)?;
		let program = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
		session.upload_program(&program)?;
	}

	if let Some(path) = &cli.download_program {
		session.connect(false)?;
		let mut out = Vec::new();
		session.download_program(&mut out)?;
		std::fs::write(path, &out).with_context(|| format!("writing {}", path.display()))?;
	}

	if cli.start_program {
		session.connect(false)?;
		session.start_program()?;
	}

	if cli.hw_version {
		session.connect(false)?;
		if let Some(info) = session.info() {
			println!("firmware {}.{}.{}, grid {}x{}, pixels {}x{}", info.major, info.minor, info.patch, info.grid_columns, info.grid_rows, info.pixel_width, info.pixel_height);
		}
	}

	if let Some(path) = &cli.run {
		session.connect(false)?;
		let mut program = Vec::new();
		File::open(path)
			.with_context(|| format!("reading {}", path.display()))?
			.read_to_end(&mut program)?;
		session.run_program(&program)?;
	}

	if let Some(spec) = &cli.run_function {
		session.connect(false)?;
		let mut parts = spec.splitn(2, ',');
		let name = parts.next().unwrap_or_default();
		let args: Vec<Arg> = match parts.next() {
			Some(rest) => rest.split(',').map(Arg::parse_cli_token).collect::<Result<_, _>>()?,
			None => Vec::new(),
		};
		if let Some(ret) = session.call_function(name, &args, true)? {
			println!("return value: {ret}");
		}
	}

	session.close()?;
	Ok(())
}

fn main() {
	let cli = Cli::parse();
	init_logging(&cli);
	if let Err(e) = run(&cli) {
		eprintln!("error: {e:#}");
		std::process::exit(1);
	}
}
