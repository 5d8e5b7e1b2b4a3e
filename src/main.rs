use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use cwdecode::audio::source::SampleSource;
use cwdecode::audio::synth::write_pattern_wav;
use cwdecode::audio::wav::WavSource;
use cwdecode::cli::{Cli, Commands, ConfigAction, OutputFormat};
use cwdecode::config::Config;
use cwdecode::pipeline::{
    Decoder, JsonLinesSink, Pipeline, PipelineReport, TokenSink, TrailingPolicy, WriterSink,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose)?;
    tracing::debug!(version = %cwdecode::version_string(), "cwdecode starting");

    match cli.command {
        Commands::Decode {
            input,
            format,
            window,
            group_size,
            chunk_size,
            discard_trailing,
            single_threaded,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_stream_overrides(&mut config, window, group_size, chunk_size);
            if discard_trailing {
                config.stream.trailing = TrailingPolicy::Discard;
            }
            config.validate()?;

            let report = run_decode(&config, input.as_deref(), format, single_threaded)?;
            if !cli.quiet {
                print_summary(&report);
            }
        }
        #[cfg(feature = "cpal-audio")]
        Commands::Listen {
            device,
            format,
            window,
            group_size,
            chunk_size,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            apply_stream_overrides(&mut config, window, group_size, chunk_size);
            config.validate()?;

            let report = run_listen(&config, device.as_deref(), format, cli.quiet)?;
            if !cli.quiet {
                print_summary(&report);
            }
        }
        #[cfg(feature = "cpal-audio")]
        Commands::Devices => {
            list_audio_devices()?;
        }
        Commands::Synth {
            pattern,
            output,
            unit_ms,
            tone_hz,
            sample_rate,
        } => {
            let mut config = load_config(cli.config.as_deref())?;
            if let Some(unit_ms) = unit_ms {
                config.synth.unit_ms = unit_ms;
            }
            if let Some(tone_hz) = tone_hz {
                config.synth.tone_hz = tone_hz;
            }
            if let Some(sample_rate) = sample_rate {
                config.synth.sample_rate = sample_rate;
            }
            config.validate()?;

            let samples = write_pattern_wav(&output, &pattern, &config.synth)
                .with_context(|| format!("failed to write {}", output.display()))?;
            if !cli.quiet {
                eprintln!(
                    "cwdecode: wrote {} samples at {} Hz to {}",
                    samples,
                    config.synth.sample_rate,
                    output.display()
                );
            }
        }
        Commands::Config { action } => {
            handle_config_command(action, cli.config.as_deref())?;
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "cwdecode", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn apply_stream_overrides(
    config: &mut Config,
    window: Option<usize>,
    group_size: Option<usize>,
    chunk_size: Option<usize>,
) {
    if let Some(window) = window {
        config.detector.window = window;
    }
    if let Some(group_size) = group_size {
        config.normalizer.group_size = group_size;
    }
    if let Some(chunk_size) = chunk_size {
        config.stream.chunk_size = chunk_size;
    }
}

fn print_summary(report: &PipelineReport) {
    eprintln!(
        "cwdecode: {} tokens ({} dits, {} dahs, {} errors)",
        report.tokens, report.dits, report.dahs, report.errors
    );
}

fn make_sink(format: OutputFormat) -> Box<dyn TokenSink> {
    match format {
        OutputFormat::Text => Box::new(WriterSink::stdout()),
        OutputFormat::Json => Box::new(JsonLinesSink::new(std::io::stdout())),
    }
}

/// Installs the stderr subscriber. `RUST_LOG` wins over `-v`.
fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let subscriber = tracing_subscriber::Registry::default().with(env_filter).with(
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false),
    );

    tracing::subscriber::set_global_default(subscriber)
        .context("failed to set tracing subscriber")?;
    Ok(())
}

/// Load configuration from file or use defaults.
///
/// Priority order:
/// 1. Custom config path from CLI (--config), which must exist
/// 2. Default config path (~/.config/cwdecode/config.toml)
/// 3. Built-in defaults with environment variable overrides
fn load_config(custom_path: Option<&Path>) -> Result<Config> {
    let config = match custom_path {
        Some(path) => {
            if !path.exists() {
                return Err(cwdecode::CwError::ConfigFileNotFound {
                    path: path.display().to_string(),
                }
                .into());
            }
            Config::load(path)
                .with_context(|| format!("failed to load config from {}", path.display()))?
        }
        None => match Config::default_path() {
            Some(path) => Config::load_or_default(&path)?,
            None => Config::default(),
        },
    };

    Ok(config.with_env_overrides())
}

fn config_path(custom_path: Option<&Path>) -> Result<PathBuf> {
    match custom_path {
        Some(path) => Ok(path.to_path_buf()),
        None => Config::default_path().context("could not determine config directory"),
    }
}

fn run_decode(
    config: &Config,
    input: Option<&Path>,
    format: OutputFormat,
    single_threaded: bool,
) -> Result<PipelineReport> {
    let chunk_size = config.stream.chunk_size;
    let source = match input {
        Some(path) if path != Path::new("-") => WavSource::from_path(path, chunk_size)
            .with_context(|| format!("failed to open {}", path.display()))?,
        _ => WavSource::from_stdin(chunk_size).context("failed to read WAV from stdin")?,
    };
    tracing::info!(
        sample_rate = source.sample_rate(),
        channels = source.channels(),
        duration_ms = source.duration_ms(),
        "decoding"
    );

    let sink = make_sink(format);

    if single_threaded {
        return decode_inline(config, source, sink);
    }
    Ok(Pipeline::new(config.pipeline_config()).run(Box::new(source), sink)?)
}

/// Decodes a live input device until Ctrl-C, then drains and flushes.
#[cfg(feature = "cpal-audio")]
fn run_listen(
    config: &Config,
    device: Option<&str>,
    format: OutputFormat,
    quiet: bool,
) -> Result<PipelineReport> {
    use cwdecode::audio::capture::CaptureSource;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    let interrupted = Arc::new(AtomicBool::new(false));
    {
        let interrupted = interrupted.clone();
        ctrlc::set_handler(move || interrupted.store(true, Ordering::SeqCst))
            .context("failed to install Ctrl-C handler")?;
    }

    let source = CaptureSource::open(device, config.stream.chunk_size)
        .context("failed to open audio input")?;
    if !quiet {
        eprintln!("cwdecode: listening on {} (Ctrl-C to stop)", source.device_name());
    }

    let handle = Pipeline::new(config.pipeline_config()).start(Box::new(source), make_sink(format))?;
    while handle.is_running() && !interrupted.load(Ordering::SeqCst) {
        std::thread::sleep(std::time::Duration::from_millis(100));
    }
    tracing::debug!("stopping capture");
    Ok(handle.stop()?)
}

#[cfg(feature = "cpal-audio")]
fn list_audio_devices() -> Result<()> {
    let devices = cwdecode::audio::capture::list_devices()?;
    if devices.is_empty() {
        anyhow::bail!("no audio input devices found");
    }
    for device in devices {
        println!("{device}");
    }
    Ok(())
}

/// Same stages as the threaded pipeline, driven from this thread.
fn decode_inline(
    config: &Config,
    mut source: impl SampleSource,
    mut sink: Box<dyn TokenSink>,
) -> Result<PipelineReport> {
    let mut decoder = Decoder::new(&config.pipeline_config());
    let mut report = PipelineReport::default();
    let mut tokens = Vec::new();

    while let Some(samples) = source.next_chunk()? {
        decoder.push_samples(samples, &mut tokens)?;
        deliver(&mut *sink, &mut tokens, &mut report)?;
    }
    decoder.finish(&mut tokens);
    deliver(&mut *sink, &mut tokens, &mut report)?;

    report.output = sink.finish();
    Ok(report)
}

fn deliver(
    sink: &mut dyn TokenSink,
    tokens: &mut Vec<cwdecode::Token>,
    report: &mut PipelineReport,
) -> Result<()> {
    for token in tokens.drain(..) {
        sink.handle(token)?;
        report.record(token);
    }
    Ok(())
}

fn handle_config_command(action: ConfigAction, custom_path: Option<&Path>) -> Result<()> {
    match action {
        ConfigAction::Show => {
            let config = load_config(custom_path)?;
            print!("{}", config.to_toml()?);
        }
        ConfigAction::Path => {
            println!("{}", config_path(custom_path)?.display());
        }
        ConfigAction::Init { force } => {
            let path = config_path(custom_path)?;
            if path.exists() && !force {
                anyhow::bail!(
                    "{} already exists (use --force to overwrite)",
                    path.display()
                );
            }
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("failed to create {}", parent.display()))?;
            }
            std::fs::write(&path, Config::default().to_toml()?)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("cwdecode: wrote default configuration to {}", path.display());
        }
    }
    Ok(())
}
