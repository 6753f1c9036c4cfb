//! Dispatch shell for on-device drawing demos. Ships no concrete demo
//! bodies — `Demo` is the seam a downstream crate plugs real drawing
//! routines into.

use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::LevelFilter;
use pixelosd_core::{from_uri, DEFAULT_BAUD_RATE};
use pixelosd_core::{Error, ProfilePoint, Session, SessionOptions};

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
#[value(rename_all = "snake_case")]
enum DemoName {
	Ahi,
	AhiLine,
	Sidebar,
	Graph,
	Compass,
	HomeArrow,
	Grid,
	Logo,
}

impl DemoName {
	fn as_str(self) -> &'static str {
		match self {
			DemoName::Ahi => "ahi",
			DemoName::AhiLine => "ahi_line",
			DemoName::Sidebar => "sidebar",
			DemoName::Graph => "graph",
			DemoName::Compass => "compass",
			DemoName::HomeArrow => "home_arrow",
			DemoName::Grid => "grid",
			DemoName::Logo => "logo",
		}
	}
}

/// Seam for a concrete drawing loop. No implementations ship in this crate.
trait Demo {
	fn run(&mut self, session: &mut Session) -> Result<(), Error>;
}

fn demo_for(name: DemoName) -> Result<Box<dyn Demo>, Error> {
	Err(Error::Config(format!("demo '{}' is not implemented by this build", name.as_str())))
}

#[derive(Parser, Debug)]
#[command(name = "pixelosd-demo", about = "Run an on-device drawing demo")]
struct Cli {
	/// OSD port: either a serial device path or a host:port pair.
	port: String,

	/// Which demo to run.
	draw: DemoName,

	/// Print all data sent/received.
	#[arg(long)]
	trace: bool,

	/// Draw device-side profiling info at the given screen point, "X,Y".
	#[arg(long, value_name = "X,Y")]
	profile_at: Option<ProfilePoint>,
}

fn init_logging(cli: &Cli) {
	let mut builder = env_logger::Builder::from_default_env();
	if std::env::var("RUST_LOG").is_err() {
		builder.filter_level(if cli.trace { LevelFilter::Trace } else { LevelFilter::Info });
	}
	builder.init();
}

fn run(cli: &Cli) -> Result<()> {
	let transport = from_uri(&cli.port, DEFAULT_BAUD_RATE)?;
	let opts = SessionOptions { trace: cli.trace, profile_at: cli.profile_at, ..Default::default() };
	let mut session = Session::new(transport, DEFAULT_BAUD_RATE, opts);
	session.connect(false)?;

	let mut demo = demo_for(cli.draw)?;
	demo.run(&mut session)?;

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
