use clap::Parser;
use num::complex::Complex32;
use psk::psk_demodulator::{PskDemodulator, PskSettings};
use psk::psk_stream::{as_interleaved, InputPacket, PortEvent, StreamInfo, StreamMode};
use std::io::{BufWriter, Read, Write};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct AppArguments {
    /// Input samples per transmitted symbol
    #[arg(long, default_value_t = 10)]
    samples_per_baud: usize,
    /// Number of symbols in the timing energy average
    #[arg(long, default_value_t = 100)]
    num_avg: usize,
    /// M for M-PSK. Supported sizes are \[2,4,8\]
    #[arg(short, long, default_value_t = 4)]
    constellation_size: usize,
    /// Window length of the phase tracker in symbols
    #[arg(long, default_value_t = 50)]
    phase_avg: usize,
    /// Decode each symbol against the previous one instead of the phase estimate
    #[arg(short, long)]
    differential_decoding: bool,
    /// Sample rate of the input stream in Hz
    #[arg(short, long, default_value_t = 1.0)]
    sample_rate: f64,
    /// Number of complex samples to read in chunks from input file
    #[arg(short, long, default_value_t = 4096*8)]
    number_of_input_samples: usize,
    /// Input filepath with interleaved float32 IQ. If not provided uses stdin by default.
    #[arg(short, long)]
    input_filepath: Option<String>,
    /// Output filepath for interleaved float32 soft decisions. If not provided uses stdout by default.
    #[arg(short, long)]
    output_filepath: Option<String>,
    /// Optional output filepath for hard bits as little endian int16
    #[arg(short, long)]
    bits_filepath: Option<String>,
    /// Logging verbosity. Repeat for more detail.
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), String> {
    let args = AppArguments::parse();

    stderrlog::new()
        .verbosity(1 + args.verbose as usize)
        .init()
        .map_err(|err| format!("Failed to initialise logging: {}", err))?;

    // Parse arguments
    let number_of_input_samples = match args.number_of_input_samples {
        length if length == 0 => return Err("Number of input samples cannot be zero.".into()),
        length => length,
    };
    if args.samples_per_baud == 0 {
        return Err("Samples per baud cannot be zero.".into());
    }
    if args.num_avg == 0 {
        return Err("Timing average length cannot be zero.".into());
    }
    if args.phase_avg == 0 {
        return Err("Phase average length cannot be zero.".into());
    }
    if !(args.sample_rate > 0.0) {
        return Err("Sample rate must be positive.".into());
    }
    let mut input_file: Box<dyn Read + Send + Sync> = match &args.input_filepath {
        None => Box::new(std::io::stdin()),
        Some(filepath) => match std::fs::File::open(filepath) {
            Ok(file) => Box::new(file),
            Err(err) => return Err(format!("Failed to open input file {}: {}", filepath, err)),
        },
    };
    let mut output_file: Box<dyn Write + Send + Sync> = match &args.output_filepath {
        None => Box::new(BufWriter::new(std::io::stdout())),
        Some(filepath) => match std::fs::File::create(filepath) {
            Ok(file) => Box::new(BufWriter::new(file)),
            Err(err) => return Err(format!("Failed to open file {}: {}", filepath, err)),
        },
    };
    let mut bits_file: Option<Box<dyn Write + Send + Sync>> = match &args.bits_filepath {
        None => None,
        Some(filepath) => match std::fs::File::create(filepath) {
            Ok(file) => Some(Box::new(BufWriter::new(file))),
            Err(err) => return Err(format!("Failed to open file {}: {}", filepath, err)),
        },
    };

    // Setup PSK demodulator
    let mut demodulator = PskDemodulator::new(PskSettings {
        samples_per_baud: args.samples_per_baud,
        num_avg: args.num_avg,
        constellation_size: args.constellation_size,
        phase_avg: args.phase_avg,
        differential_decoding: args.differential_decoding,
    });

    // These callbacks are invoked through demodulator.process(...) in the main thread
    demodulator.subscribe_soft_out(move |event| {
        if let PortEvent::Packet { data, .. } = event {
            let floats = as_interleaved(data);
            let data_out = unsafe {
                std::slice::from_raw_parts(floats.as_ptr() as *const u8, floats.len() * 4)
            };
            if let Err(err) = output_file.write_all(data_out) {
                eprintln!("[soft_out] Error while writing to output: {}", err);
            }
        }
    });
    if let Some(mut bits_out) = bits_file.take() {
        demodulator.subscribe_bits_out(move |event| {
            if let PortEvent::Packet { data, .. } = event {
                let data_out = unsafe {
                    std::slice::from_raw_parts(data.as_ptr() as *const u8, data.len() * 2)
                };
                if let Err(err) = bits_out.write_all(data_out) {
                    eprintln!("[bits_out] Error while writing to bits output: {}", err);
                }
            }
        });
    }

    // Setup input buffers
    let bytes_per_sample = 8;
    let mut input_bytes_buffer = vec![0u8; number_of_input_samples * bytes_per_sample];
    let mut input_samples_buffer = vec![Complex32::default(); number_of_input_samples];
    let info = StreamInfo {
        stream_id: "psk_demod_in".to_owned(),
        xdelta: 1.0 / args.sample_rate,
        mode: StreamMode::Complex,
    };

    let mut total_processed: usize = 0;
    let mut first_packet = true;
    loop {
        let total_bytes = match read_chunk(input_file.as_mut(), &mut input_bytes_buffer) {
            Ok(0) => {
                eprintln!("[psk_demod] Finished reading samples from input");
                break;
            }
            Ok(length) => length,
            Err(err) => {
                eprintln!("[psk_demod] Error while reading from input: {}", err);
                break;
            }
        };
        let total_samples = total_bytes / bytes_per_sample;
        if total_samples == 0 {
            eprintln!("[psk_demod] Discarding trailing partial sample");
            break;
        }
        input_bytes_buffer[0..total_samples * bytes_per_sample]
            .chunks_exact(bytes_per_sample)
            .enumerate()
            .for_each(|(i, x)| {
                let re = f32::from_le_bytes(x[0..4].try_into().unwrap());
                let im = f32::from_le_bytes(x[4..8].try_into().unwrap());
                input_samples_buffer[i] = Complex32::new(re, im);
            });

        let packet = InputPacket {
            data: &input_samples_buffer[..total_samples],
            info: &info,
            sri_changed: first_packet,
            timestamp: total_processed as f64 / args.sample_rate,
            eos: false,
            queue_flushed: false,
        };
        demodulator.process(&packet);
        first_packet = false;
        total_processed += total_samples;
    }
    eprintln!("[psk_demod] Processed {} samples", total_processed);
    Ok(())
}

/// Fills as much of the buffer as the reader can provide, so chunk boundaries
/// cannot split an 8 byte complex sample short of end of input.
fn read_chunk(reader: &mut dyn Read, buffer: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buffer.len() {
        match reader.read(&mut buffer[filled..]) {
            Ok(0) => break,
            Ok(length) => filled += length,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}
