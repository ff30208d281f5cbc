use num::complex::Complex32;

/// Whether a stream carries real scalars or interleaved complex pairs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamMode {
    Real,
    Complex,
}

/// Metadata accompanying a sample stream.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamInfo {
    pub stream_id: String,
    /// Seconds between consecutive samples.
    pub xdelta: f64,
    pub mode: StreamMode,
}

/// One chunk of baseband input together with its stream metadata.
pub struct InputPacket<'a> {
    pub data: &'a [Complex32],
    pub info: &'a StreamInfo,
    /// True when `info` differs from the previous packet on this stream.
    pub sri_changed: bool,
    pub timestamp: f64,
    pub eos: bool,
    /// True when upstream dropped samples before delivering this packet.
    pub queue_flushed: bool,
}

/// Event delivered to an output port subscriber. A metadata push always
/// precedes the data it describes.
#[derive(Clone, Copy)]
pub enum PortEvent<'a, T> {
    Sri(&'a StreamInfo),
    Packet {
        data: &'a [T],
        timestamp: f64,
        eos: bool,
        stream_id: &'a str,
    },
}

/// Reinterprets complex samples as the interleaved floats they are laid out
/// as. `Complex32` is repr(C) over two f32, so both views share one
/// allocation and no copy is made.
pub fn as_interleaved(data: &[Complex32]) -> &[f32] {
    unsafe { std::slice::from_raw_parts(data.as_ptr() as *const f32, data.len() * 2) }
}
