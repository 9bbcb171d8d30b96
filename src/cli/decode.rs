use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use log::Level;

use flacd::process::stream::StreamDecoder;

use super::command::{AudioFormat, Cli, DecodeArgs};
use crate::input;
use crate::wav::WavWriter;

const READ_CHUNK_SIZE: usize = 64 * 1024;

enum Sink {
    Wav(WavWriter<File>),
    Raw(File),
}

impl Sink {
    fn write(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        match self {
            Sink::Wav(wav) => wav.write_pcm_bytes(bytes),
            Sink::Raw(file) => file.write_all(bytes),
        }
    }

    fn finish(self) -> std::io::Result<()> {
        match self {
            Sink::Wav(mut wav) => wav.finish(),
            Sink::Raw(mut file) => file.flush(),
        }
    }
}

pub fn cmd_decode(args: &DecodeArgs, cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Decoding FLAC stream: {}", args.input.display());

    let input = input::open(&args.input)?;
    let mut decoder = if args.no_seek_scan {
        StreamDecoder::new(input)?
    } else {
        StreamDecoder::with_seek_index(input)?
    };

    if cli.strict {
        decoder.set_fail_level(Level::Warn);
    }

    let format = decoder.wave_format();
    log::info!(
        "{} Hz, {} channel(s), {} bits per sample",
        format.sample_rate,
        format.channels,
        format.bits_per_sample
    );

    let output_path = output_path(args);
    let output = File::create(&output_path)?;

    let mut sink = match args.format {
        AudioFormat::Wav => {
            let mut wav = WavWriter::new(output);
            wav.configure_audio_format(
                format.sample_rate,
                format.channels as u32,
                format.bits_per_sample as u32,
            )?;
            wav.write_header()?;
            Sink::Wav(wav)
        }
        AudioFormat::Pcm => Sink::Raw(output),
    };

    let pb = multi.map(|multi| create_progress_bar(multi, decoder.len_bytes()));

    let started = Instant::now();
    let mut buffer = vec![0u8; READ_CHUNK_SIZE];
    let mut total = 0u64;

    loop {
        let read = decoder.read(&mut buffer)?;
        if read == 0 {
            break;
        }

        sink.write(&buffer[..read])?;

        total += read as u64;
        if let Some(pb) = &pb {
            pb.set_position(total);
        }
    }

    sink.finish()?;
    if let Some(pb) = &pb {
        pb.finish_and_clear();
    }

    let elapsed = started.elapsed();
    let samples = total / format.block_align().max(1) as u64;
    let duration = samples as f64 / format.sample_rate as f64;

    log::info!(
        "Wrote {total} bytes ({samples} samples, {duration:.2}s of audio) to {} in {:.2}s",
        output_path.display(),
        elapsed.as_secs_f64()
    );

    Ok(())
}

fn output_path(args: &DecodeArgs) -> PathBuf {
    if let Some(path) = &args.output_path {
        return path.clone();
    }

    let extension = match args.format {
        AudioFormat::Wav => "wav",
        AudioFormat::Pcm => "pcm",
    };

    if args.input.to_string_lossy() == "-" {
        return PathBuf::from(format!("out.{extension}"));
    }

    args.input.with_extension(extension)
}

fn create_progress_bar(multi: &MultiProgress, total_bytes: Option<u64>) -> ProgressBar {
    let pb = match total_bytes {
        Some(total) => {
            let pb = multi.add(ProgressBar::new(total));
            pb.set_style(
                ProgressStyle::with_template(
                    "{bar:40.cyan/blue} {bytes}/{total_bytes} ({percent}%) | ETA: {eta_precise}",
                )
                .expect("valid progress template"),
            );
            pb
        }
        None => {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {bytes} decoded")
                    .expect("valid progress template"),
            );
            pb
        }
    };

    pb.enable_steady_tick(std::time::Duration::from_millis(100));
    pb
}
