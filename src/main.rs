#[macro_use]
extern crate tracing;

use std::io;
use std::process::ExitCode;

use clap::Parser;

use rtp_decoder::capture::{Filter, PcapSource};
use rtp_decoder::config::Args;
use rtp_decoder::decoder::DecoderContext;
use rtp_decoder::policy::{resolve, SsrcRestriction};
use rtp_decoder::srtp::{LogLevel, ProtectionContext, ProtectionEngine, SrtpEngine};
use rtp_decoder::{ConfigError, Error};

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(v) => v,
        Err(e) => {
            let _ = e.print();
            // Help and version go to stdout and are not failures.
            return if e.use_stderr() {
                ExitCode::from(1)
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    init_log(!args.debug_modules.is_empty());

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

fn run(args: &Args) -> Result<(), Error> {
    info!("Using {}", SrtpEngine::version());

    let mut engine = SrtpEngine::new();
    engine.install_log_handler(forward_engine_log);

    for name in &args.debug_modules {
        engine
            .set_debug_module(name, true)
            .map_err(|_| ConfigError::UnknownDebugModule(name.clone()))?;
    }

    args.validate()?;

    if let Some(f) = &args.filter {
        info!("Setting filter as {}", f);
    }

    let req = args.policy_request()?;
    req.resolved_tag_size()?;

    if args.list_debug_modules {
        // Stdout is reserved for decoded packets.
        engine.write_debug_modules(&mut io::stderr())?;
        return Ok(());
    }

    req.check_key_presence()?;
    info!("security services: {}", req.services);

    let policy = resolve(&req, engine.capabilities())?;

    let mut source = PcapSource::open(&args.pcap_path())?;
    let filter = Filter::compile(args.filter_expr())?;
    source.set_filter(filter);

    let mode = args.operating_mode()?;
    let offset = args.payload_offset(source.datalink());
    debug!("Payload offset {} for {:?}", offset, source.datalink());

    let mut context = engine.create(&policy)?;
    if let (SsrcRestriction::Specific(ssrc), Some(roc)) = (policy.ssrc, policy.roc) {
        context.set_rollover_counter(ssrc, roc)?;
    }

    info!("Starting decoder");
    let mut decoder = DecoderContext::new(context, mode, offset);

    let stdout = io::stdout();
    let mut out = stdout.lock();
    decoder.run(&mut source, &mut out)?;

    eprintln!("{}", decoder.stats().summary(mode));

    Ok(())
}

fn forward_engine_log(level: LogLevel, msg: &str) {
    let c = level.as_char();
    match level {
        LogLevel::Error => error!(target: "srtp", "SRTP-LOG [{}]: {}", c, msg),
        LogLevel::Warning => warn!(target: "srtp", "SRTP-LOG [{}]: {}", c, msg),
        LogLevel::Info => info!(target: "srtp", "SRTP-LOG [{}]: {}", c, msg),
        LogLevel::Debug => debug!(target: "srtp", "SRTP-LOG [{}]: {}", c, msg),
    }
}

fn init_log(engine_debug: bool) {
    use tracing_subscriber::filter::Directive;
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let mut env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("rtp_decoder=info,srtp=info"));

    if engine_debug {
        if let Ok(d) = "srtp=debug".parse::<Directive>() {
            env_filter = env_filter.add_directive(d);
        }
    }

    // Stdout carries the decoded packets.
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(env_filter)
        .init();
}
