mod config;
mod error;
mod wav;

use apcp_core::{ApcpError, Codec, FrequencyPlan, ProtocolConfig};
use clap::{Parser, Subcommand};
use error::CliError;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use wav::{WavSink, WavSource};

#[derive(Parser)]
#[command(name = "apcp")]
#[command(about = "APCP: send text as layered audio tones and decode it back")]
struct Cli {
    /// JSON protocol configuration (defaults to ./config.json when present)
    #[arg(long, global = true, value_name = "FILE.JSON")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Encode text into a WAV file
    Send {
        /// The message to encode
        text: String,

        /// Output WAV file
        #[arg(short, long, value_name = "OUTPUT.WAV", default_value = "output_audio.wav")]
        output: PathBuf,
    },

    /// Decode the first message in a WAV file
    Receive {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,
    },

    /// Decode every message in a WAV file, in order
    Listen {
        /// Input WAV file
        #[arg(value_name = "INPUT.WAV")]
        input: PathBuf,
    },

    /// Print the frequency plan
    Plan,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<(), CliError> {
    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Send { text, output } => send_command(&config, &text, &output),
        Commands::Receive { input } => receive_command(&config, &input),
        Commands::Listen { input } => listen_command(&config, &input),
        Commands::Plan => plan_command(&config),
    }
}

fn send_command(config: &ProtocolConfig, text: &str, output_path: &Path) -> Result<(), CliError> {
    let codec = Codec::new(config)?;

    let mut sink = WavSink::create(output_path);
    codec.modulator.encode(text, &mut sink)?;
    let written = sink.finalize()?;

    println!(
        "Encoded {} characters into {} samples ({:.2} s)",
        text.chars().count(),
        written,
        written as f32 / config.sample_rate as f32
    );
    println!("Audio data saved to {}", output_path.display());
    Ok(())
}

fn open_source(config: &ProtocolConfig, input_path: &Path) -> Result<WavSource, CliError> {
    let source = WavSource::open(input_path)?;
    if source.sample_rate() != config.sample_rate {
        log::warn!(
            "{} is {} Hz but the protocol expects {} Hz; frequencies will be misread",
            input_path.display(),
            source.sample_rate(),
            config.sample_rate
        );
    }
    Ok(source)
}

fn receive_command(config: &ProtocolConfig, input_path: &Path) -> Result<(), CliError> {
    let codec = Codec::new(config)?;
    let source = open_source(config, input_path)?;

    let message = codec.demodulator.decode(source)?;
    println!("Decoded message: {}", message);
    Ok(())
}

fn listen_command(config: &ProtocolConfig, input_path: &Path) -> Result<(), CliError> {
    let codec = Codec::new(config)?;
    let source = open_source(config, input_path)?;

    let mut frames = 0;
    for (index, result) in codec.demodulator.stream(source).enumerate() {
        frames += 1;
        match result {
            Ok(message) => println!("Decoded message {}: {}", index + 1, message),
            Err(ApcpError::EndToneNotFound) => {
                eprintln!("Frame {} was cut off before its end tone", index + 1)
            }
            Err(e) => eprintln!("Frame {} failed to decode: {}", index + 1, e),
        }
    }

    if frames == 0 {
        return Err(CliError::NoFrames(input_path.to_path_buf()));
    }
    println!("{} frame(s) found", frames);
    Ok(())
}

fn plan_command(config: &ProtocolConfig) -> Result<(), CliError> {
    config.validate()?;
    let plan = FrequencyPlan::from_config(config)?;
    print!("{}", describe_plan(&plan));
    Ok(())
}

fn describe_plan(plan: &FrequencyPlan) -> String {
    let width = plan.bits_per_tone();
    let mut out = format!(
        "{} channels, {} bits per tone, {} Hz steps\n",
        plan.num_channels(),
        width,
        plan.freq_steps()
    );
    out.push_str(&format!(
        "control {}: START={} END={}\n",
        plan.control_range(),
        plan.start_frequency(),
        plan.end_frequency()
    ));

    for channel in plan.channels() {
        let all = channel.tones();
        let tones: Vec<String> = all[..all.len().saturating_sub(1)]
            .iter()
            .enumerate()
            .map(|(value, frequency)| format!("{:0width$b}={}", value, frequency, width = width))
            .collect();
        out.push_str(&format!(
            "channel {} {}: {} SEPARATE={}\n",
            channel.index(),
            channel.range(),
            tones.join(" "),
            channel.separate_frequency()
        ));
    }
    out
}
