use crate::circular_deque::CircularDeque;
use crate::linear_fit::{FitReset, LinearFit};
use crate::psk_bit_mapper;
use crate::psk_stream::{InputPacket, PortEvent, StreamInfo, StreamMode};
use itertools::izip;
use log::{debug, warn};
use num::complex::Complex32;
use std::f64::consts::PI;

const M_2PI: f64 = 2.0 * PI;

/// Number of symbol decisions between full rebuilds of the per-position
/// energy sums, cancelling accumulated floating point error.
const RESYNC_INTERVAL: usize = 1 << 20;

#[derive(Debug, Clone)]
pub struct PskSettings {
    /// Symbol oversampling factor: input samples per transmitted symbol.
    pub samples_per_baud: usize,
    /// Number of trailing symbols over which timing energies accumulate.
    pub num_avg: usize,
    /// M for M-PSK. Sizes 2, 4 and 8 produce bits; other sizes still produce
    /// soft decisions and phase estimates but the bits stream stays silent.
    pub constellation_size: usize,
    /// Window length of the linear-fit phase tracker, in symbols.
    pub phase_avg: usize,
    /// Decode each symbol against the previous one instead of rotating by the
    /// estimated phase.
    pub differential_decoding: bool,
}

impl Default for PskSettings {
    fn default() -> Self {
        Self {
            samples_per_baud: 10,
            num_avg: 100,
            constellation_size: 4,
            phase_avg: 50,
            differential_decoding: false,
        }
    }
}

/// Partial settings update; absent fields leave the current value unchanged.
/// Updates only mark state for reset — the actual mutation happens at the top
/// of the next packet, the sole safe observation point.
#[derive(Debug, Default, Clone)]
pub struct PskSettingsUpdate {
    pub samples_per_baud: Option<usize>,
    pub num_avg: Option<usize>,
    pub constellation_size: Option<usize>,
    pub phase_avg: Option<usize>,
    pub differential_decoding: Option<bool>,
    /// Setting this true forces a full state reset on the next packet.
    pub reset_state: Option<bool>,
}

type PortCallback<T> = Box<dyn FnMut(PortEvent<T>) + Send + Sync + 'static>;

/// Streaming soft-decision demodulator for M-PSK complex baseband.
///
/// Feed packets of complex samples through [`PskDemodulator::process`]. Per
/// transmitted symbol the demodulator emits a timing- and phase-corrected
/// soft sample, the unwrapped M-fold phase estimate, the chosen intra-symbol
/// sample index and the hard decision bits, each on its own output port.
pub struct PskDemodulator {
    settings: PskSettings,
    /// Most recent input samples, front aligned to intra-symbol position 0.
    pub samples: CircularDeque<Complex32>,
    /// Squared magnitude of each buffered sample.
    pub energy: CircularDeque<f64>,
    /// Summed energy per intra-symbol position across the buffered window.
    pub symbol_energy: Vec<f64>,
    /// Intra-symbol position of the next incoming sample.
    index: usize,
    /// Previous chosen sample, the divisor for differential decoding.
    last: Complex32,
    reset_samples_per_baud: bool,
    reset_num_symbols: bool,
    reset_phase_avg: bool,
    reset_state: bool,
    /// Current estimate of the M-fold phase, in radians.
    pub phase_estimate: f64,
    sample_rate: f64,
    count: usize,
    phase_estimator: LinearFit,
    soft_out_callbacks: Vec<PortCallback<Complex32>>,
    bits_out_callbacks: Vec<PortCallback<i16>>,
    phase_out_callbacks: Vec<PortCallback<f32>>,
    sample_index_out_callbacks: Vec<PortCallback<i16>>,
}

impl PskDemodulator {
    pub fn new(settings: PskSettings) -> Self {
        assert!(settings.samples_per_baud >= 1, "samples per baud must be at least 1");
        assert!(settings.num_avg >= 1, "timing average must cover at least 1 symbol");
        assert!(settings.phase_avg >= 1, "phase average must cover at least 1 symbol");
        let window = settings.samples_per_baud * settings.num_avg;
        // Placeholder rate until the first packet's metadata arrives.
        let sample_rate = 1.0;
        Self {
            samples: CircularDeque::new(window),
            energy: CircularDeque::new(window),
            symbol_energy: vec![0.0; settings.samples_per_baud],
            index: 0,
            last: Complex32::new(1.0, 0.0),
            reset_samples_per_baud: false,
            reset_num_symbols: false,
            reset_phase_avg: false,
            reset_state: false,
            phase_estimate: 0.0,
            sample_rate,
            count: 0,
            phase_estimator: LinearFit::new(settings.phase_avg, sample_rate),
            settings,
            soft_out_callbacks: vec![],
            bits_out_callbacks: vec![],
            phase_out_callbacks: vec![],
            sample_index_out_callbacks: vec![],
        }
    }

    pub fn settings(&self) -> &PskSettings {
        &self.settings
    }

    /// Number of symbols currently held by the phase tracker.
    pub fn phase_window_len(&self) -> usize {
        self.phase_estimator.len()
    }

    /// Registers a callback for the corrected soft-decision symbol stream.
    pub fn subscribe_soft_out(&mut self, callback: impl FnMut(PortEvent<Complex32>) + Send + Sync + 'static) {
        self.soft_out_callbacks.push(Box::new(callback));
    }

    /// Registers a callback for the unpacked hard bit stream, LSB first.
    pub fn subscribe_bits_out(&mut self, callback: impl FnMut(PortEvent<i16>) + Send + Sync + 'static) {
        self.bits_out_callbacks.push(Box::new(callback));
    }

    /// Registers a callback for the per-symbol M-fold phase estimate stream.
    pub fn subscribe_phase_out(&mut self, callback: impl FnMut(PortEvent<f32>) + Send + Sync + 'static) {
        self.phase_out_callbacks.push(Box::new(callback));
    }

    /// Registers a callback for the chosen intra-symbol sample index stream.
    pub fn subscribe_sample_index_out(&mut self, callback: impl FnMut(PortEvent<i16>) + Send + Sync + 'static) {
        self.sample_index_out_callbacks.push(Box::new(callback));
    }

    /// Applies a partial settings update. Only flags and values change here;
    /// buffers are reorganised at the start of the next packet.
    pub fn configure(&mut self, update: &PskSettingsUpdate) {
        if let Some(samples_per_baud) = update.samples_per_baud {
            if samples_per_baud == 0 {
                warn!("ignoring samplesPerBaud of 0");
            } else {
                debug!("samplesPerBaud changed to {}", samples_per_baud);
                self.settings.samples_per_baud = samples_per_baud;
                self.reset_samples_per_baud = samples_per_baud != self.symbol_energy.len();
            }
        }
        if let Some(num_avg) = update.num_avg {
            if num_avg == 0 {
                warn!("ignoring numAvg of 0");
            } else {
                // No flag: the buffer length check at packet entry picks the
                // new window size up.
                self.settings.num_avg = num_avg;
            }
        }
        if let Some(constellation_size) = update.constellation_size {
            debug!("constelationSize changed to {}", constellation_size);
            self.settings.constellation_size = constellation_size;
            self.reset_num_symbols = true;
        }
        if let Some(phase_avg) = update.phase_avg {
            if phase_avg == 0 {
                warn!("ignoring phaseAvg of 0");
            } else {
                debug!("phaseAvg changed to {}", phase_avg);
                self.settings.phase_avg = phase_avg;
                self.reset_phase_avg = true;
            }
        }
        if let Some(differential_decoding) = update.differential_decoding {
            self.settings.differential_decoding = differential_decoding;
        }
        if let Some(reset_state) = update.reset_state {
            self.reset_state = reset_state;
        }
    }

    /// Runs one packet of complex baseband samples through the pipeline,
    /// invoking the output subscriptions for everything it produces.
    pub fn process(&mut self, packet: &InputPacket) {
        if packet.queue_flushed {
            warn!("input queue flushed - data has been thrown on the floor, flushing internal buffers");
            self.reset_state = true;
        }
        if packet.info.mode != StreamMode::Complex {
            warn!("cannot work with real data");
            return;
        }
        if self.reset_state {
            debug!("resetting demodulator state");
            self.reset_samples_per_baud = true;
            self.reset_num_symbols = true;
            self.reset_phase_avg = true;
            // Decisions restart only after a full window of fresh samples.
            self.samples.clear();
            self.energy.clear();
            self.reset_state = false;
        }

        // Capture packet-local copies so a configure() during the processing
        // loop cannot skew derived quantities within a single packet.
        let samples_per_symbol = self.settings.samples_per_baud;
        let num_data_pts = samples_per_symbol * self.settings.num_avg;
        let num_syms = self.settings.constellation_size;
        let bits_per_baud = psk_bit_mapper::bits_per_baud(num_syms);

        // Catches warm-up refills, a grown averaging window and parameter
        // shrinkage below the buffered volume alike.
        if num_data_pts != self.samples.len() || num_data_pts != self.samples.capacity() {
            self.reset_samples_per_baud = true;
        }

        // Metadata must go out before any data it describes.
        if packet.sri_changed || self.reset_num_symbols || self.reset_samples_per_baud {
            // The raw interval is compared against the cached rate scalar; the
            // tracker only clears its history when the derived rate really
            // changed.
            if packet.info.xdelta != self.sample_rate {
                self.sample_rate = 1.0 / packet.info.xdelta;
                self.phase_estimator.reset(FitReset {
                    sample_rate: Some(self.sample_rate),
                    ..FitReset::default()
                });
            }
            self.push_sri(packet.info, samples_per_symbol, bits_per_baud);
        }

        // The oversample factor changed - resize the energy window and
        // re-populate it from the retained energies.
        if self.reset_samples_per_baud {
            self.resync_energy(samples_per_symbol, num_data_pts);
            self.reset_samples_per_baud = false;
        }
        // All phase calculations are invalid once the constellation changes.
        if self.reset_num_symbols {
            self.phase_estimator.reset(FitReset {
                clear_history: true,
                ..FitReset::default()
            });
            self.reset_num_symbols = false;
        }
        if self.reset_phase_avg {
            self.phase_estimator.reset(FitReset {
                num_pts: Some(self.settings.phase_avg),
                ..FitReset::default()
            });
            self.reset_phase_avg = false;
        }

        let mut out: Vec<Complex32> =
            Vec::with_capacity((packet.data.len() + self.index) / samples_per_symbol);
        let mut bits: Vec<i16> = Vec::with_capacity(out.capacity() * bits_per_baud);
        let mut phase_vec: Vec<f32> = Vec::with_capacity(out.capacity());
        let mut sample_index_out: Vec<i16> = Vec::with_capacity(out.capacity());

        let last_sample = samples_per_symbol - 1;
        for &value in packet.data {
            if samples_per_symbol > 1 {
                let sample_energy = f64::from(value.norm_sqr());
                self.samples.push_back(value);
                self.energy.push_back(sample_energy);
                self.symbol_energy[self.index] += sample_energy;
            }
            // End of a symbol epoch.
            if self.index == last_sample {
                let chosen = if samples_per_symbol > 1 {
                    // Only output once there are enough samples for meaningful
                    // averages.
                    if self.samples.len() == num_data_pts {
                        let sample_index = peak_energy_position(&self.symbol_energy);
                        sample_index_out.push(sample_index as i16);
                        Some(self.samples[sample_index])
                    } else {
                        None
                    }
                } else {
                    // No timing search at one sample per symbol.
                    Some(value)
                };

                if let Some(sample) = chosen {
                    // The phase offset estimate runs even under differential
                    // decoding since the phase port stays live.
                    let mut this_phase = f64::from(sample.powu(num_syms as u32).arg());
                    // Unwrap against the running estimate to stay continuous
                    // across the branch cut.
                    let num_wraps = ((self.phase_estimate - this_phase) / M_2PI).round();
                    this_phase += num_wraps * M_2PI;
                    self.phase_estimate = self.phase_estimator.next(this_phase);
                    phase_vec.push(self.phase_estimate as f32);

                    let mut decoded = sample;
                    let mut phase_correction = 0.0f64;
                    if self.settings.differential_decoding {
                        decoded = sample / self.last;
                        self.last = sample;
                    } else {
                        phase_correction = -self.phase_estimate / num_syms as f64;
                    }
                    // Offset QPSK so samples land at (+/-1, +/-j) instead of
                    // on the axes.
                    if num_syms == 4 {
                        phase_correction += PI / 4.0;
                    }
                    let corrected = decoded * Complex32::from_polar(1.0, phase_correction as f32);
                    out.push(corrected);

                    if bits_per_baud > 0 {
                        psk_bit_mapper::map_symbol(num_syms, corrected, &mut bits);
                    } else {
                        warn!("constellation size {} not supported - no bits out", num_syms);
                    }

                    if samples_per_symbol > 1 {
                        // Retire the front symbol from the running sums.
                        for (total, used) in izip!(self.symbol_energy.iter_mut(), self.energy.iter()) {
                            *total -= used;
                        }
                        self.energy.drain_front(samples_per_symbol);
                        self.samples.drain_front(samples_per_symbol);
                        self.count += 1;
                        if self.count == RESYNC_INTERVAL {
                            self.resync_energy(samples_per_symbol, num_data_pts);
                        }
                    }
                }
                self.index = 0;
            } else {
                self.index += 1;
            }
        }

        // Keep the estimate bounded. Wrapping happens at numSyms*2pi and not
        // at 2pi: the estimate lives in the M-fold phase domain and a 2pi wrap
        // would shift the corrected output by 2pi/M.
        let wrap_value = M_2PI * num_syms as f64;
        if self.phase_estimate.abs() > wrap_value {
            let num_wraps = (self.phase_estimate / wrap_value).round();
            // Subtracting inside the estimator rewrites the history too.
            self.phase_estimate = self.phase_estimator.subtract_const(num_wraps * wrap_value);
        }

        if !out.is_empty() {
            dispatch(
                &mut self.soft_out_callbacks,
                PortEvent::Packet {
                    data: &out,
                    timestamp: packet.timestamp,
                    eos: packet.eos,
                    stream_id: &packet.info.stream_id,
                },
            );
        }
        if !bits.is_empty() {
            dispatch(
                &mut self.bits_out_callbacks,
                PortEvent::Packet {
                    data: &bits,
                    timestamp: packet.timestamp,
                    eos: packet.eos,
                    stream_id: &packet.info.stream_id,
                },
            );
        }
        if !phase_vec.is_empty() {
            dispatch(
                &mut self.phase_out_callbacks,
                PortEvent::Packet {
                    data: &phase_vec,
                    timestamp: packet.timestamp,
                    eos: packet.eos,
                    stream_id: &packet.info.stream_id,
                },
            );
        }
        if !sample_index_out.is_empty() {
            dispatch(
                &mut self.sample_index_out_callbacks,
                PortEvent::Packet {
                    data: &sample_index_out,
                    timestamp: packet.timestamp,
                    eos: packet.eos,
                    stream_id: &packet.info.stream_id,
                },
            );
        }
    }

    /// Publishes the decimated stream metadata on every output port.
    fn push_sri(&mut self, info: &StreamInfo, samples_per_symbol: usize, bits_per_baud: usize) {
        // Output streams carry one value per symbol.
        let xdelta = info.xdelta * samples_per_symbol as f64;
        let soft_info = StreamInfo {
            stream_id: info.stream_id.clone(),
            xdelta,
            mode: StreamMode::Complex,
        };
        dispatch(&mut self.soft_out_callbacks, PortEvent::Sri(&soft_info));
        let phase_info = StreamInfo {
            mode: StreamMode::Real,
            ..soft_info
        };
        dispatch(&mut self.phase_out_callbacks, PortEvent::Sri(&phase_info));
        if bits_per_baud > 0 {
            // An unsupported constellation produces no bits, and pushing its
            // metadata would divide the interval by zero.
            let bits_info = StreamInfo {
                xdelta: xdelta / bits_per_baud as f64,
                ..phase_info
            };
            dispatch(&mut self.bits_out_callbacks, PortEvent::Sri(&bits_info));
        }
    }

    /// Resizes the buffers for the current parameters and rebuilds the
    /// per-position energy sums from the retained energies.
    fn resync_energy(&mut self, samples_per_symbol: usize, num_data_pts: usize) {
        self.symbol_energy.clear();
        self.symbol_energy.resize(samples_per_symbol, 0.0);
        if self.samples.len() > num_data_pts {
            self.samples.truncate(num_data_pts);
            self.energy.truncate(num_data_pts);
        }
        // A buffer left exactly full would never line up with a symbol-end
        // decision again; retire one symbol so the window can refill.
        if self.samples.len() == num_data_pts && !self.samples.is_empty() {
            self.samples.drain_front(samples_per_symbol);
            self.energy.drain_front(samples_per_symbol);
        }
        if self.samples.capacity() != num_data_pts {
            self.samples.set_capacity(num_data_pts);
            self.energy.set_capacity(num_data_pts);
        }
        let mut index = 0;
        for &sample_energy in self.energy.iter() {
            self.symbol_energy[index] += sample_energy;
            index += 1;
            if index == samples_per_symbol {
                index = 0;
            }
        }
        self.index = index;
        self.count = 0;
    }
}

fn dispatch<T: Copy>(callbacks: &mut [PortCallback<T>], event: PortEvent<T>) {
    for callback in callbacks.iter_mut() {
        callback(event);
    }
}

/// Position of the largest accumulated energy; ties go to the earliest
/// position.
fn peak_energy_position(symbol_energy: &[f64]) -> usize {
    let mut peak = 0;
    for (position, &value) in symbol_energy.iter().enumerate() {
        if value > symbol_energy[peak] {
            peak = position;
        }
    }
    peak
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn stream_info(xdelta: f64, mode: StreamMode) -> StreamInfo {
        StreamInfo {
            stream_id: "test_stream".to_owned(),
            xdelta,
            mode,
        }
    }

    fn packet<'a>(data: &'a [Complex32], info: &'a StreamInfo) -> InputPacket<'a> {
        InputPacket {
            data,
            info,
            sri_changed: false,
            timestamp: 0.0,
            eos: false,
            queue_flushed: false,
        }
    }

    /// Oversampled QPSK test signal: each symbol held for `samples_per_baud`
    /// samples under a triangular amplitude ramp peaking mid-symbol.
    fn ramped_qpsk(total_symbols: usize, samples_per_baud: usize) -> Vec<Complex32> {
        let constellation = [
            Complex32::new(1.0, 1.0),
            Complex32::new(-1.0, 1.0),
            Complex32::new(-1.0, -1.0),
            Complex32::new(1.0, -1.0),
        ];
        let mut data = Vec::with_capacity(total_symbols * samples_per_baud);
        for symbol in 0..total_symbols {
            let point = constellation[symbol % constellation.len()];
            for position in 0..samples_per_baud {
                let distance = (position as f32 - samples_per_baud as f32 / 2.0).abs();
                let ramp = 1.0 - distance / samples_per_baud as f32;
                data.push(point * ramp);
            }
        }
        data
    }

    #[test]
    fn peak_energy_ties_break_towards_the_front() {
        assert_eq!(peak_energy_position(&[1.0, 3.0, 3.0, 2.0]), 1);
        assert_eq!(peak_energy_position(&[5.0, 5.0, 5.0]), 0);
        assert_eq!(peak_energy_position(&[0.0]), 0);
    }

    #[test]
    fn real_mode_packets_are_dropped() {
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud: 2,
            num_avg: 2,
            ..PskSettings::default()
        });
        let emitted = Arc::new(Mutex::new(0usize));
        let sink = emitted.clone();
        demod.subscribe_soft_out(move |event| {
            if let PortEvent::Packet { .. } = event {
                *sink.lock().unwrap() += 1;
            }
        });
        let info = stream_info(1.0, StreamMode::Real);
        let data = ramped_qpsk(8, 2);
        demod.process(&packet(&data, &info));
        assert_eq!(*emitted.lock().unwrap(), 0);
        assert!(demod.samples.is_empty());
    }

    #[test]
    fn buffers_track_each_other_and_stay_bounded() {
        let samples_per_baud = 5;
        let num_avg = 7;
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud,
            num_avg,
            ..PskSettings::default()
        });
        let info = stream_info(1e-3, StreamMode::Complex);
        let data = ramped_qpsk(40, samples_per_baud);
        // Deliver in uneven chunks so packet boundaries cut through symbols.
        for chunk in data.chunks(23) {
            demod.process(&packet(chunk, &info));
            assert_eq!(demod.samples.len(), demod.energy.len());
            assert!(demod.samples.len() <= samples_per_baud * num_avg);
            assert!(demod.index < samples_per_baud);

            // The per-position sums must match a rebuild from the energies.
            let mut rebuilt = vec![0.0f64; samples_per_baud];
            for (position, &sample_energy) in demod.energy.iter().enumerate() {
                rebuilt[position % samples_per_baud] += sample_energy;
            }
            for (position, (&kept, &fresh)) in
                demod.symbol_energy.iter().zip(rebuilt.iter()).enumerate()
            {
                let scale = fresh.abs().max(1.0);
                assert!(
                    (kept - fresh).abs() / scale < 1e-3,
                    "position {}: {} vs {}",
                    position,
                    kept,
                    fresh
                );
            }
        }
    }

    #[test]
    fn one_sample_per_symbol_passes_straight_through() {
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud: 1,
            num_avg: 1,
            constellation_size: 2,
            ..PskSettings::default()
        });
        let soft = Arc::new(Mutex::new(Vec::<Complex32>::new()));
        let indices = Arc::new(Mutex::new(0usize));
        let soft_sink = soft.clone();
        demod.subscribe_soft_out(move |event| {
            if let PortEvent::Packet { data, .. } = event {
                soft_sink.lock().unwrap().extend_from_slice(data);
            }
        });
        let index_sink = indices.clone();
        demod.subscribe_sample_index_out(move |event| {
            if let PortEvent::Packet { data, .. } = event {
                *index_sink.lock().unwrap() += data.len();
            }
        });

        let info = stream_info(1.0, StreamMode::Complex);
        let data = [
            Complex32::new(1.0, 0.0),
            Complex32::new(-1.0, 0.0),
            Complex32::new(1.0, 0.0),
        ];
        demod.process(&packet(&data, &info));

        let soft = soft.lock().unwrap();
        assert_eq!(soft.len(), 3);
        // No buffering and no timing search took place.
        assert!(demod.samples.is_empty());
        assert_eq!(*indices.lock().unwrap(), 0);
    }

    #[test]
    fn configure_defers_buffer_changes_to_the_next_packet() {
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud: 4,
            num_avg: 2,
            ..PskSettings::default()
        });
        let info = stream_info(1.0, StreamMode::Complex);
        let data = ramped_qpsk(4, 4);
        demod.process(&packet(&data, &info));
        let buffered = demod.samples.len();

        demod.configure(&PskSettingsUpdate {
            samples_per_baud: Some(2),
            ..PskSettingsUpdate::default()
        });
        // Nothing moved yet.
        assert_eq!(demod.samples.len(), buffered);
        assert_eq!(demod.symbol_energy.len(), 4);

        demod.process(&packet(&data[..0], &info));
        assert_eq!(demod.symbol_energy.len(), 2);
    }

    #[test]
    fn decision_outputs_keep_a_fixed_per_symbol_ratio() {
        let samples_per_baud = 4;
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud,
            num_avg: 2,
            constellation_size: 4,
            ..PskSettings::default()
        });
        let counts = Arc::new(Mutex::new([0usize; 4]));
        macro_rules! count_into {
            ($subscribe:ident, $slot:expr) => {
                let sink = counts.clone();
                demod.$subscribe(move |event| {
                    if let PortEvent::Packet { data, .. } = event {
                        sink.lock().unwrap()[$slot] += data.len();
                    }
                });
            };
        }
        count_into!(subscribe_soft_out, 0);
        count_into!(subscribe_bits_out, 1);
        count_into!(subscribe_phase_out, 2);
        count_into!(subscribe_sample_index_out, 3);

        let info = stream_info(1.0, StreamMode::Complex);
        let data = ramped_qpsk(10, samples_per_baud);
        demod.process(&packet(&data, &info));

        let counts = counts.lock().unwrap();
        let decisions = counts[0];
        assert!(decisions > 0);
        assert_eq!(counts[1], decisions * 2);
        assert_eq!(counts[2], decisions);
        assert_eq!(counts[3], decisions);
    }

    #[test]
    fn unsupported_constellations_keep_the_bits_port_silent() {
        let mut demod = PskDemodulator::new(PskSettings {
            samples_per_baud: 1,
            num_avg: 1,
            constellation_size: 16,
            ..PskSettings::default()
        });
        let bits_events = Arc::new(Mutex::new(0usize));
        let soft_count = Arc::new(Mutex::new(0usize));
        let bits_sink = bits_events.clone();
        demod.subscribe_bits_out(move |_| {
            *bits_sink.lock().unwrap() += 1;
        });
        let soft_sink = soft_count.clone();
        demod.subscribe_soft_out(move |event| {
            if let PortEvent::Packet { data, .. } = event {
                *soft_sink.lock().unwrap() += data.len();
            }
        });

        let info = stream_info(1.0, StreamMode::Complex);
        let data = [Complex32::new(1.0, 0.0), Complex32::new(0.0, 1.0)];
        demod.process(&packet(&data, &info));

        // Neither metadata nor data reached the bits port, but the soft
        // decisions still flowed.
        assert_eq!(*bits_events.lock().unwrap(), 0);
        assert_eq!(*soft_count.lock().unwrap(), 2);
    }
}
