use anyhow::Result;
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};

use flacd::process::scan::SeekIndex;
use flacd::structs::stream_info::{StreamInfo, read_stream_start};

use super::command::{Cli, InfoArgs};
use crate::input;
use crate::timestamp::time_str;

pub fn cmd_info(args: &InfoArgs, _cli: &Cli, multi: Option<&MultiProgress>) -> Result<()> {
    log::info!("Analyzing FLAC stream: {}", args.input.display());

    let mut input = input::open(&args.input)?;
    let (stream_info, first_frame_offset) = read_stream_start(&mut input)?;

    println!();
    println!("FLAC Stream Information");
    println!("=======================");
    println!();
    display_stream_info(&stream_info, first_frame_offset);

    if args.scan {
        let pb = multi.map(|multi| {
            let pb = multi.add(ProgressBar::new_spinner());
            pb.set_style(
                ProgressStyle::with_template("{spinner:.green} {msg}")
                    .expect("valid progress template"),
            );
            pb.enable_steady_tick(std::time::Duration::from_millis(100));
            pb.set_message("Scanning frames...");
            pb
        });

        let index = SeekIndex::scan(&mut input, first_frame_offset, &stream_info)?;

        if let Some(pb) = &pb {
            pb.finish_and_clear();
        }

        display_scan_summary(&stream_info, &index);
    }

    Ok(())
}

fn display_stream_info(info: &StreamInfo, first_frame_offset: u64) {
    println!("Stream Information");
    println!("  Sample rate               {} Hz", info.sample_rate);
    println!("  Channels                  {}", info.channels);
    println!("  Bits per sample           {}", info.bits_per_sample);

    if info.is_variable_block_size() {
        println!(
            "  Block size                {} - {} samples (variable)",
            info.min_block_size, info.max_block_size
        );
    } else {
        println!("  Block size                {} samples", info.min_block_size);
    }

    if info.min_frame_size > 0 || info.max_frame_size > 0 {
        println!(
            "  Frame size                {} - {} bytes",
            info.min_frame_size, info.max_frame_size
        );
    }

    if info.total_samples > 0 {
        let duration = info.total_samples as f64 / info.sample_rate as f64;
        println!("  Total samples             {}", info.total_samples);
        println!("  Duration                  {}", time_str(duration));
    } else {
        println!("  Total samples             unknown");
    }

    let md5 = info.md5.iter().map(|b| format!("{b:02x}")).collect::<String>();
    println!("  MD5 signature             {md5}");
    println!("  Audio data offset         {first_frame_offset}");
    println!();
}

fn display_scan_summary(info: &StreamInfo, index: &SeekIndex) {
    println!("Scan Summary");
    println!("  Frames found              {}", index.len());
    println!("  Samples covered           {}", index.total_samples());

    if index.total_samples() > 0 {
        let duration = index.total_samples() as f64 / info.sample_rate as f64;
        println!("  Scanned duration          {}", time_str(duration));
    }

    if let (Some(first), Some(last)) = (index.frames().first(), index.frames().last()) {
        let span = last.stream_offset - first.stream_offset;
        if index.len() > 1 {
            let mean = span as f64 / (index.len() - 1) as f64;
            println!("  Mean frame size           {mean:.0} bytes");
        }
    }

    if info.total_samples > 0 && info.total_samples == index.total_samples() {
        println!("  StreamInfo total matches the scan");
    }

    println!();
}
