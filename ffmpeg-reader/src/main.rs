use std::time::Duration;

use ffmpeg_reader::{OpenOptions, Progress, StreamConfig, StreamReader};

/// Decodes the best audio and video stream of a source and prints what
/// comes out of each output stream.
///
/// Usage: `ffmpeg-reader <url> [format]`
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let mut args = std::env::args().skip(1);
    let url = args
        .next()
        .ok_or_else(|| anyhow::anyhow!("usage: ffmpeg-reader <url> [format]"))?;
    let options = OpenOptions {
        format: args.next(),
        ..Default::default()
    };

    ffmpeg_reader::init()?;
    let mut reader = StreamReader::open(&url, &options)?;
    match reader.demuxer().duration() {
        Some(duration) => log::info!("{}: {:.3}s", reader.demuxer().format_name(), duration),
        None => log::info!("{}: unknown duration", reader.demuxer().format_name()),
    }
    println!("{}", serde_json::to_string_pretty(&reader.get_metadata())?);
    for index in 0..reader.num_src_streams() {
        let info = reader.get_src_stream_info(index)?;
        println!("stream {}: {}", index, serde_json::to_string(&info)?);
    }

    if let Some(index) = reader.find_best_audio_stream() {
        reader.add_audio_stream(index, &StreamConfig::new(Some(4096), Some(8)))?;
    }
    if let Some(index) = reader.find_best_video_stream() {
        let config = StreamConfig::new(Some(1), Some(30)).with_filter("format=rgb24");
        reader.add_video_stream(index, &config, None)?;
    }
    for index in 0..reader.num_out_streams() {
        let info = reader.get_out_stream_info(index)?;
        println!("output {}: {}", index, serde_json::to_string(&info)?);
    }

    let mut chunks = vec![0usize; reader.num_out_streams()];
    let mut bytes = vec![0usize; reader.num_out_streams()];
    loop {
        let progress = reader
            .process_packet_block_async(Some(Duration::from_secs(10)), Duration::from_millis(10))
            .await?;
        if progress == Progress::Again {
            anyhow::bail!("no data from {} for 10s", url);
        }
        if !reader.is_buffer_ready() {
            continue;
        }
        loop {
            let popped = reader.pop_chunks()?;
            if popped.iter().all(Option::is_none) {
                break;
            }
            for (index, chunk) in popped.iter().enumerate() {
                if let Some(chunk) = chunk {
                    log::debug!("output {}: {}", index, chunk);
                    chunks[index] += 1;
                    bytes[index] += chunk.data.len();
                }
            }
            if progress != Progress::Finished {
                break;
            }
        }
        if progress == Progress::Finished {
            break;
        }
    }

    for index in 0..reader.num_out_streams() {
        log::info!(
            "output {}: {} chunks, {} bytes",
            index,
            chunks[index],
            bytes[index]
        );
    }
    Ok(())
}
