//! Inverse JPEG2000-RCT color transform
//!
//! RGB streams code their planes in a reversible YCbCr-like space one bit
//! wider than the sample depth. After a slice's lines are entropy decoded,
//! the transform folds them back to planar GBR. Three precision regimes:
//! 8-bit samples decode through a u16 scratch, 9-15 bit samples transform
//! in place, and 16-bit samples need a u32 scratch for the 17-bit
//! intermediate values.

/// Convert 9-bit RCT planes to 8-bit planar GBR.
///
/// `src` holds the decoded Y/Cb/Cr planes (plus alpha when present);
/// all planes share `width` x `height`.
pub fn rct_to_gbr8(dst: &mut [Vec<u8>], src: &[Vec<u16>], width: usize, height: usize) {
    let offset = 1i32 << 8;
    for y in 0..height {
        for x in 0..width {
            let pos = y * width + x;
            let cb = i32::from(src[1][pos]) - offset;
            let cr = i32::from(src[2][pos]) - offset;
            let green = i32::from(src[0][pos]) - ((cb + cr) >> 2);
            let red = cr + green;
            let blue = cb + green;
            dst[0][pos] = green as u8;
            dst[1][pos] = blue as u8;
            dst[2][pos] = red as u8;
        }
    }
    if src.len() == 4 {
        for (d, s) in dst[3].iter_mut().zip(src[3].iter()) {
            *d = *s as u8;
        }
    }
}

/// Convert 10- to 16-bit RCT planes to planar GBR in place.
pub fn rct_to_gbr16_in_place(planes: &mut [Vec<u16>], width: usize, height: usize, bits: u32) {
    let offset = 1i32 << bits;
    for y in 0..height {
        for x in 0..width {
            let pos = y * width + x;
            let cb = i32::from(planes[1][pos]) - offset;
            let cr = i32::from(planes[2][pos]) - offset;
            let green = i32::from(planes[0][pos]) - ((cb + cr) >> 2);
            let red = cr + green;
            let blue = cb + green;
            planes[0][pos] = green as u16;
            planes[1][pos] = blue as u16;
            planes[2][pos] = red as u16;
        }
    }
}

/// Convert wide RCT planes to planar GBR through a u32 scratch.
///
/// Used for 16-bit streams, whose intermediates need 17 bits, and for
/// mid-depth streams carrying an alpha plane.
pub fn rct_to_gbr16(dst: &mut [Vec<u16>], src: &[Vec<u32>], width: usize, height: usize, bits: u32) {
    let offset = 1i32 << bits;
    for y in 0..height {
        for x in 0..width {
            let pos = y * width + x;
            let cb = src[1][pos] as i32 - offset;
            let cr = src[2][pos] as i32 - offset;
            let green = src[0][pos] as i32 - ((cb + cr) >> 2);
            let red = cr + green;
            let blue = cb + green;
            dst[0][pos] = green as u16;
            dst[1][pos] = blue as u16;
            dst[2][pos] = red as u16;
        }
    }
    if src.len() == 4 {
        for (d, s) in dst[3].iter_mut().zip(src[3].iter()) {
            *d = *s as u16;
        }
    }
}
