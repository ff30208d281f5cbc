use num::complex::Complex32;
use std::f32::consts::PI;

/// Bits carried by one symbol, or 0 for an unsupported constellation size.
pub fn bits_per_baud(constellation_size: usize) -> usize {
    match constellation_size {
        2 => 1,
        4 => 2,
        8 => 3,
        _ => 0,
    }
}

/// Appends the bit pattern for one corrected symbol, least significant bit
/// first. Unsupported constellation sizes append nothing.
///
/// The mappings assume the corrected constellations below. QPSK points sit at
/// (+/-1, +/-j) because the corrector adds a pi/4 offset for that size.
pub fn map_symbol(constellation_size: usize, symbol: Complex32, bits: &mut Vec<i16>) {
    match constellation_size {
        2 => {
            //
            //                  |             // A -> 0
            //                  |             // B -> 1
            //             B---------A
            //                  |
            //                  |
            bits.push(i16::from(symbol.re < 0.0));
        }
        4 => {
            //
            //             B    |    A       // A -> 00 (0)
            //                  |            // B -> 01 (1)
            //              ---------        // C -> 10 (2)
            //                  |            // D -> 11 (3)
            //             C    |    D
            let real = symbol.re > 0.0;
            let imag = symbol.im > 0.0;
            bits.push(i16::from(real ^ imag));
            bits.push(i16::from(!imag));
        }
        8 => {
            //                  C
            //             D    |    B       // A -> 000 (0)   E -> 100 (4)
            //                  |            // B -> 001 (1)   F -> 101 (5)
            //            E  --------- A     // C -> 010 (2)   G -> 110 (6)
            //                  |            // D -> 011 (3)   H -> 111 (7)
            //             F    |    H
            //                  G

            // Clusters sit at multiples of pi/4, but arg() lives on (-pi, pi]
            // so phases near -pi and +pi belong to the same cluster. Wrap the
            // negative lobe onto the positive end before rounding; 0 and 8
            // share the same three low bits, which folds the wrap-around
            // cluster back onto A.
            let theta = symbol.arg();
            let mut soft_sym = theta / PI * 4.0;
            if soft_sym < -0.5 {
                soft_sym += 8.0;
            }
            let mut sym = soft_sym.round() as u16;
            for _ in 0..3 {
                bits.push((sym & 1) as i16);
                sym >>= 1;
            }
        }
        _ => {}
    }
}
