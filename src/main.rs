//! sidkit command line: render or play a JSON chip patch

use std::env;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

use sidkit::nodes::ChipParams;
use sidkit::SamplingMethod;

const DEFAULT_SECONDS: f64 = 4.0;
const DEFAULT_RATE: u32 = 48_000;

const USAGE: &str = "Usage:
  sidkit render <patch.json> <out.wav> [--seconds S] [--rate R] [--method fast|interpolate|resample]
  sidkit play <patch.json> [--seconds S] [--rate R]

Gates all three voices at the start and releases them at 3/4 of the duration.

Flags:
  --seconds <S>    Duration in seconds (default 4)
  --rate <R>       Sample rate in Hz (default 48000)
  --method <M>     Sampling method for render (default fast)
  -h, --help       Show this help
";

/// Parsed command line
#[derive(Debug)]
struct Options {
    command: String,
    positional: Vec<String>,
    seconds: f64,
    rate: u32,
    method: SamplingMethod,
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<Option<Options>> {
    let Some(command) = args.next() else {
        return Ok(None);
    };
    if command == "-h" || command == "--help" {
        return Ok(None);
    }

    let mut options = Options {
        command,
        positional: Vec::new(),
        seconds: DEFAULT_SECONDS,
        rate: DEFAULT_RATE,
        method: SamplingMethod::default(),
    };

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(None),
            "--seconds" => {
                let value = args.next().context("--seconds requires a value")?;
                options.seconds = value
                    .parse()
                    .with_context(|| format!("invalid duration: {value}"))?;
            }
            "--rate" => {
                let value = args.next().context("--rate requires a value")?;
                options.rate = value
                    .parse()
                    .with_context(|| format!("invalid sample rate: {value}"))?;
            }
            "--method" => {
                let value = args.next().context("--method requires a value")?;
                options.method = value.parse()?;
            }
            _ if arg.starts_with('-') => bail!("unknown flag: {arg}"),
            _ => options.positional.push(arg),
        }
    }
    Ok(Some(options))
}

fn load_patch(path: &Path) -> Result<ChipParams> {
    let text =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("invalid patch {}", path.display()))
}

#[cfg(feature = "export-wav")]
fn render(options: &Options) -> Result<()> {
    let [patch, out] = options.positional.as_slice() else {
        bail!("render takes <patch.json> <out.wav>\n\n{USAGE}");
    };
    let params = load_patch(Path::new(patch))?;
    let config = sidkit::SamplingConfig::pal(options.rate as f64).with_method(options.method);

    println!(
        "Rendering {} ({}, {:.1} s, {} Hz, {})",
        patch, params.chip_model, options.seconds, options.rate, options.method
    );
    let samples = sidkit::render_patch(&params, &config, options.seconds)?;
    let out = Path::new(out);
    sidkit::write_wav(out, &samples, options.rate)
        .with_context(|| format!("failed to write {}", out.display()))?;
    println!("Wrote {} samples to {}", samples.len(), out.display());
    Ok(())
}

#[cfg(not(feature = "export-wav"))]
fn render(_options: &Options) -> Result<()> {
    bail!("render requires the \"export-wav\" feature")
}

#[cfg(feature = "streaming")]
fn play(options: &Options) -> Result<()> {
    let [patch] = options.positional.as_slice() else {
        bail!("play takes <patch.json>\n\n{USAGE}");
    };
    let params = load_patch(Path::new(patch))?;
    println!(
        "Playing {} ({}, {:.1} s)",
        patch, params.chip_model, options.seconds
    );
    sidkit::play_patch(params, options.rate, options.seconds)?;
    Ok(())
}

#[cfg(not(feature = "streaming"))]
fn play(_options: &Options) -> Result<()> {
    bail!("play requires the \"streaming\" feature; rebuild with `--features streaming`")
}

fn main() -> Result<()> {
    let Some(options) = parse_args(env::args().skip(1))? else {
        eprint!("{USAGE}");
        return Ok(());
    };

    match options.command.as_str() {
        "render" => render(&options),
        "play" => play(&options),
        other => bail!("unknown command: {other}\n\n{USAGE}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> impl Iterator<Item = String> {
        list.iter().map(|s| s.to_string()).collect::<Vec<_>>().into_iter()
    }

    #[test]
    fn test_parse_render() {
        let options = parse_args(args(&[
            "render", "a.json", "b.wav", "--seconds", "2.5", "--rate", "44100", "--method",
            "resample",
        ]))
        .expect("valid")
        .expect("options");
        assert_eq!(options.command, "render");
        assert_eq!(options.positional, vec!["a.json", "b.wav"]);
        assert_eq!(options.seconds, 2.5);
        assert_eq!(options.rate, 44_100);
        assert_eq!(options.method, SamplingMethod::Resample);
    }

    #[test]
    fn test_parse_help_and_errors() {
        assert!(parse_args(args(&[])).expect("ok").is_none());
        assert!(parse_args(args(&["play", "--help"])).expect("ok").is_none());
        assert!(parse_args(args(&["render", "--rate"])).is_err());
        assert!(parse_args(args(&["render", "--method", "cubic"])).is_err());
        assert!(parse_args(args(&["render", "--loud"])).is_err());
    }
}
