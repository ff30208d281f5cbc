pub mod circular_deque;
pub mod linear_fit;
pub mod psk_bit_mapper;
pub mod psk_demodulator;
pub mod psk_stream;
