use anyhow::{Context, Result, bail};
use clap::Parser;

use std::fs::File;
use std::io::{self, BufWriter, Read, Write};
use std::path::PathBuf;

use flac_pull::logging;
use flac_pull::{Decoder, DecoderOpts, DecoderState, PcmPolicy, ReaderSource};

fn main() -> Result<()> {
    logging::init();
    let params = get_params()?;

    let input: Box<dyn Read + Send> = match params.input.as_deref() {
        None | Some("-") => Box::new(io::stdin()),
        Some(path) => Box::new(
            File::open(path).with_context(|| format!("failed to open input file: {path}"))?,
        ),
    };

    let opts = DecoderOpts {
        pcm_policy: params.pcm_policy,
        ..DecoderOpts::default()
    };
    let mut decoder = Decoder::builder(ReaderSource::new(input))
        .opts(opts)
        .build()
        .context("failed to create decoder")?;

    let info = decoder
        .info()
        .with_context(|| format!("no FLAC stream info (decoder {})", decoder.state()))?;

    if params.info {
        let stdout = io::stdout();
        let mut writer = BufWriter::new(stdout.lock());
        serde_json::to_writer_pretty(&mut writer, &info).context("failed to write stream info")?;
        writeln!(writer)?;
        writer.flush()?;
    }

    let mut wav = match &params.wav {
        Some(path) => {
            let spec = hound::WavSpec {
                channels: u16::try_from(info.channels).context("too many channels for WAV")?,
                sample_rate: info.sample_rate,
                bits_per_sample: u16::try_from(info.bits_per_sample)
                    .context("invalid bits per sample")?,
                sample_format: hound::SampleFormat::Int,
            };
            Some(
                hound::WavWriter::create(path, spec)
                    .with_context(|| format!("failed to create WAV file: {}", path.display()))?,
            )
        }
        None => None,
    };

    let mut raw = match &params.raw {
        Some(path) => Some(BufWriter::new(File::create(path).with_context(|| {
            format!("failed to create raw PCM file: {}", path.display())
        })?)),
        None => None,
    };

    if wav.is_none() && raw.is_none() {
        return Ok(());
    }

    // WAV needs the raw integers and raw PCM needs S16LE; read_frame serves both.
    while let Some(frame) = decoder.read_frame().context("decode step failed")? {
        if let Some(writer) = wav.as_mut() {
            for i in 0..frame.block_size() {
                for channel in &frame.channels {
                    writer
                        .write_sample(channel[i] as i32)
                        .context("failed to write WAV sample")?;
                }
            }
        }

        if let Some(writer) = raw.as_mut() {
            let bytes = frame
                .to_s16le(params.pcm_policy)
                .context("failed to convert frame to S16LE")?;
            writer
                .write_all(&bytes)
                .context("failed to write raw PCM")?;
        }
    }

    if let Some(writer) = wav {
        writer.finalize().context("failed to finalize WAV file")?;
    }
    if let Some(mut writer) = raw {
        writer.flush().context("failed to flush raw PCM")?;
    }

    finish(&decoder)
}

fn finish(decoder: &Decoder) -> Result<()> {
    match decoder.state() {
        DecoderState::EndOfStream => Ok(()),
        state => bail!("decoding stopped early: {state}"),
    }
}

#[derive(Parser, Debug)]
#[command(name = "flac-pull")]
#[command(about = "Decode a FLAC stream frame by frame")]
struct Params {
    /// Input FLAC file, or `-` for stdin.
    pub input: Option<String>,

    /// Print stream info as JSON.
    #[arg(short = 'i', long = "info", default_value_t = false)]
    pub info: bool,

    /// Write decoded audio to this WAV file.
    #[arg(short = 'w', long = "wav")]
    pub wav: Option<PathBuf>,

    /// Write decoded audio to this file as raw interleaved S16LE.
    #[arg(short = 'r', long = "raw")]
    pub raw: Option<PathBuf>,

    #[arg(
        short = 'p',
        long = "pcm-policy",
        value_enum,
        default_value_t = PcmPolicy::Strict
    )]
    pub pcm_policy: PcmPolicy,
}

fn get_params() -> Result<Params> {
    Ok(Params::parse())
}
